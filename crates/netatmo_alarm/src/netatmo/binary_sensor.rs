//! Netatmo binary sensors for sirens and door tags

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;
use strum::Display;
use tracing::debug;
use tracing::warn;

use super::consts::CONF_URL_SECURITY;
use super::consts::EVENT_TYPE_DOOR_TAG_BIG_MOVE;
use super::consts::EVENT_TYPE_DOOR_TAG_OPEN;
use super::consts::EVENT_TYPE_DOOR_TAG_SMALL_MOVE;
use super::consts::EVENT_TYPE_HOME_ALARM;
use super::consts::NETATMO_CREATE_OPENING_SENSOR;
use super::consts::NETATMO_CREATE_SIREN_SENSOR;
use super::consts::home_signal;
use super::consts::webhook_signal;
use super::data_handler::NetatmoDevice;
use super::data_handler::Publisher;
use super::data_handler::Signals;
use super::entity::NetatmoEntity;
use super::entity::NetatmoModuleEntity;
use super::entity::added_to_platform;
use super::home::AttrValue;
use super::webhook::WebhookEvent;
use crate::engine::ConfigEntry;
use crate::engine::Entity;
use crate::engine::EntityPlatform;
use crate::engine::FromIntegrationMessage;
use crate::engine::StateWriter;

/// Device class for binary sensors, matching Home Assistant's binary_sensor device classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BinarySensorDeviceClass {
    Connectivity,
    Motion,
    Safety,
    Sound,
    Vibration,
    Window,
}

#[derive(Debug)]
pub struct NetatmoBinarySensorEntityDescription {
    pub key: &'static str,
    pub netatmo_name: &'static str,
    pub device_class: BinarySensorDeviceClass,
    pub value_fn: fn(&AttrValue) -> Option<bool>,
}

fn truthy(value: &AttrValue) -> Option<bool> {
    match value {
        AttrValue::Bool(b) => Some(*b),
        AttrValue::Str(s) => Some(!s.is_empty()),
    }
}

/// Door tag status: `"open"` means open, any other string closed
pub fn process_open_status(value: &AttrValue) -> Option<bool> {
    match value {
        AttrValue::Str(s) => Some(s == "open"),
        AttrValue::Bool(_) => None,
    }
}

/// Siren monitoring is reported as a problem when monitoring is off
pub fn process_monitoring_status(value: &AttrValue) -> Option<bool> {
    match value {
        AttrValue::Bool(b) => Some(!b),
        AttrValue::Str(_) => None,
    }
}

pub fn process_sound_status(value: &AttrValue) -> Option<bool> {
    match value {
        AttrValue::Str(s) => Some(s == "sound"),
        AttrValue::Bool(_) => None,
    }
}

/// Motion and vibration only ever turn on through webhook events
fn always_off(_: &AttrValue) -> Option<bool> {
    Some(false)
}

const REACHABLE: NetatmoBinarySensorEntityDescription = NetatmoBinarySensorEntityDescription {
    key: "reachable",
    netatmo_name: "reachable",
    device_class: BinarySensorDeviceClass::Connectivity,
    value_fn: truthy,
};

pub const BINARY_SENSOR_OPENING_TYPES: &[NetatmoBinarySensorEntityDescription] = &[
    NetatmoBinarySensorEntityDescription {
        key: "opening",
        netatmo_name: "status",
        device_class: BinarySensorDeviceClass::Window,
        value_fn: process_open_status,
    },
    REACHABLE,
    NetatmoBinarySensorEntityDescription {
        key: "motion",
        netatmo_name: "status",
        device_class: BinarySensorDeviceClass::Motion,
        value_fn: always_off,
    },
    NetatmoBinarySensorEntityDescription {
        key: "vibration",
        netatmo_name: "status",
        device_class: BinarySensorDeviceClass::Vibration,
        value_fn: always_off,
    },
];

pub const BINARY_SENSOR_SIREN_TYPES: &[NetatmoBinarySensorEntityDescription] = &[
    NetatmoBinarySensorEntityDescription {
        key: "monitoring",
        netatmo_name: "monitoring",
        device_class: BinarySensorDeviceClass::Safety,
        value_fn: process_monitoring_status,
    },
    NetatmoBinarySensorEntityDescription {
        key: "sound",
        netatmo_name: "status",
        device_class: BinarySensorDeviceClass::Sound,
        value_fn: process_sound_status,
    },
    REACHABLE,
];

/// Door tag webhook events, by the description key they switch on
const OPENING_KEYS_TO_EVENT: [(&str, &str); 3] = [
    ("motion", EVENT_TYPE_DOOR_TAG_BIG_MOVE),
    ("opening", EVENT_TYPE_DOOR_TAG_OPEN),
    ("vibration", EVENT_TYPE_DOOR_TAG_SMALL_MOVE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Opening,
    Siren,
}

/// Create sensors for door tags and sirens announced on the device signals
pub fn setup_entry(entry: &ConfigEntry, signals: &Signals, platform: Arc<EntityPlatform>) {
    for (signal, kind, descriptions) in [
        (
            NETATMO_CREATE_OPENING_SENSOR,
            SensorKind::Opening,
            BINARY_SENSOR_OPENING_TYPES,
        ),
        (
            NETATMO_CREATE_SIREN_SENSOR,
            SensorKind::Siren,
            BINARY_SENSOR_SIREN_TYPES,
        ),
    ] {
        let platform = platform.clone();
        let unsub = signals.devices.connect(signal, move |device| {
            let features: &[&str] = device
                .home
                .read()
                .modules
                .get(&device.device_id)
                .map(|m| m.features())
                .unwrap_or_default();

            let entities: Vec<Arc<dyn Entity>> = descriptions
                .iter()
                .filter(|d| features.contains(&d.netatmo_name))
                .map(|d| {
                    Arc::new(NetatmoBinarySensor::new(device.clone(), d, kind)) as Arc<dyn Entity>
                })
                .collect();
            platform.add_entities(entities);
        });
        entry.on_unload(unsub);
    }
}

#[derive(Debug)]
struct SensorAttrs {
    on: Option<bool>,
    available: bool,
}

pub struct NetatmoBinarySensor {
    base: NetatmoModuleEntity,
    description: &'static NetatmoBinarySensorEntityDescription,
    kind: SensorKind,
    unique_id: String,
    attrs: Mutex<SensorAttrs>,
}

impl NetatmoBinarySensor {
    pub fn new(
        device: NetatmoDevice,
        description: &'static NetatmoBinarySensorEntityDescription,
        kind: SensorKind,
    ) -> Self {
        let unique_id = format!("{}-{}", device.device_id, description.key);
        let home_id = device.home.entity_id().to_string();

        let mut base = NetatmoModuleEntity::new(device);
        base.add_publisher(Publisher::home(&home_id));

        Self {
            base,
            description,
            kind,
            unique_id,
            attrs: Mutex::new(SensorAttrs {
                on: None,
                available: true,
            }),
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.attrs.lock().unwrap_or_else(PoisonError::into_inner).on
    }

    fn write_current_state(&self) {
        let (on, available) = {
            let attrs = self.attrs.lock().unwrap_or_else(PoisonError::into_inner);
            (attrs.on, attrs.available)
        };
        self.base
            .write_state(FromIntegrationMessage::BinarySensorStateChanged {
                entity_id: self.unique_id.clone(),
                on,
                available,
            });
    }

    /// A door tag event for this module switches the sensor on
    fn handle_opening_event(&self, event: &WebhookEvent) {
        if event.home_id.as_deref() != Some(self.base.home().entity_id())
            || event.module_id.as_deref() != Some(self.base.device_id())
        {
            return;
        }

        self.attrs.lock().unwrap_or_else(PoisonError::into_inner).on = Some(true);
        self.write_current_state();
    }

    /// An alarm on the camera this siren is bridged to triggers a refresh of
    /// the whole home
    fn handle_siren_event(&self, event: &WebhookEvent) {
        let bridge = self.base.with_module(|m| m.bridge.clone()).flatten();
        if event.home_id.as_deref() != Some(self.base.home().entity_id())
            || bridge.is_none()
            || bridge != event.device_id
        {
            return;
        }

        let data_handler = self.base.data_handler().clone();
        let signal = home_signal(self.base.home().entity_id());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = data_handler.force_update(&signal).await {
                        warn!("Failed to refresh {} after home alarm: {}", signal, e);
                    }
                });
            }
            Err(_) => warn!("No runtime available to refresh {}", signal),
        }
    }
}

impl NetatmoEntity for NetatmoBinarySensor {
    fn base(&self) -> &NetatmoModuleEntity {
        &self.base
    }

    fn update_callback(&self) {
        let netatmo_name = self.description.netatmo_name;
        let (reachable, value) = self
            .base
            .with_module(|m| (m.reachable.unwrap_or(false), m.attribute(netatmo_name)))
            .unwrap_or((false, None));

        if !reachable {
            let was_available = {
                let mut attrs = self.attrs.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::replace(&mut attrs.available, false)
            };
            if was_available {
                debug!("{} is unreachable", self.unique_id);
                self.write_current_state();
            }
            return;
        }

        {
            let mut attrs = self.attrs.lock().unwrap_or_else(PoisonError::into_inner);
            attrs.on = value.map(|v| (self.description.value_fn)(&v).unwrap_or(false));
            attrs.available = true;
        }
        self.write_current_state();
    }
}

impl Entity for NetatmoBinarySensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn platform(&self) -> &'static str {
        "binary_sensor"
    }

    fn available(&self) -> bool {
        self.attrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .available
    }

    fn state_json(&self) -> serde_json::Value {
        let (on, available) = {
            let attrs = self.attrs.lock().unwrap_or_else(PoisonError::into_inner);
            (attrs.on, attrs.available)
        };
        serde_json::json!({
            "entity_id": self.unique_id,
            "platform": self.platform(),
            "device_class": self.description.device_class,
            "is_on": on,
            "available": available,
            "translation_key": self.description.netatmo_name,
            "configuration_url": CONF_URL_SECURITY,
        })
    }

    fn added_to_platform(self: Arc<Self>, writer: StateWriter) {
        added_to_platform(&self, writer);

        let events: Vec<&str> = match self.kind {
            SensorKind::Opening => OPENING_KEYS_TO_EVENT
                .iter()
                .filter(|(key, _)| *key == self.description.key)
                .map(|(_, event)| *event)
                .collect(),
            SensorKind::Siren if self.description.key == "monitoring" => {
                vec![EVENT_TYPE_HOME_ALARM]
            }
            SensorKind::Siren => Vec::new(),
        };

        for event in events {
            let weak = Arc::downgrade(&self);
            let kind = self.kind;
            let unsub = self
                .base
                .data_handler()
                .signals()
                .webhooks
                .connect(&webhook_signal(event), move |event| {
                    let Some(sensor) = weak.upgrade() else {
                        return;
                    };
                    match kind {
                        SensorKind::Opening => sensor.handle_opening_event(event),
                        SensorKind::Siren => sensor.handle_siren_event(event),
                    }
                });
            self.base.on_remove(unsub);
        }
    }

    fn will_remove_from_platform(&self) {
        self.base.remove();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::FromIntegrationReceiver;
    use crate::netatmo::config::EntryOptions;
    use crate::netatmo::data_handler::DataHandler;
    use crate::netatmo::home::Home;
    use crate::netatmo::home::HomeStatus;
    use crate::netatmo::home::ModuleStatus;
    use crate::netatmo::home::SharedHome;
    use crate::netatmo::home::mock::*;
    use crate::netatmo::webhook::handle_webhook;

    struct Harness {
        api: Arc<MockHomeApi>,
        signals: Signals,
        data_handler: Arc<DataHandler>,
        home: SharedHome,
        platform: Arc<EntityPlatform>,
        rx: FromIntegrationReceiver,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_home(fixture_home())
        }

        fn with_home(home: Home) -> Self {
            let api = Arc::new(MockHomeApi::default());
            let signals = Signals::default();
            let data_handler = Arc::new(DataHandler::new(
                api.clone(),
                EntryOptions::default(),
                signals.clone(),
            ));
            let home = SharedHome::new(home, api.clone());
            data_handler.add_home(home.clone());

            let (tx, rx) = mpsc::channel(64);
            let platform = Arc::new(EntityPlatform::new("netatmo", tx));
            let entry = ConfigEntry::new("entry");
            setup_entry(&entry, &signals, platform.clone());
            data_handler.discover(&home);

            Self {
                api,
                signals,
                data_handler,
                home,
                platform,
                rx,
            }
        }

        fn sensor(&self, device_id: &str, key: &str) -> Arc<dyn Entity> {
            self.platform
                .get(&format!("{}-{}", device_id, key))
                .unwrap()
        }

        fn drain(&mut self) -> Vec<FromIntegrationMessage> {
            let mut msgs = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                msgs.push(msg);
            }
            msgs
        }
    }

    #[test]
    fn test_value_fns() {
        let open = AttrValue::Str("open".to_string());
        let closed = AttrValue::Str("closed".to_string());
        assert_eq!(process_open_status(&open), Some(true));
        assert_eq!(process_open_status(&closed), Some(false));
        assert_eq!(process_open_status(&AttrValue::Bool(true)), None);

        assert_eq!(process_monitoring_status(&AttrValue::Bool(true)), Some(false));
        assert_eq!(process_monitoring_status(&AttrValue::Bool(false)), Some(true));
        assert_eq!(process_monitoring_status(&open), None);

        assert_eq!(
            process_sound_status(&AttrValue::Str("sound".to_string())),
            Some(true)
        );
        assert_eq!(
            process_sound_status(&AttrValue::Str("no_sound".to_string())),
            Some(false)
        );
        assert_eq!(process_sound_status(&AttrValue::Bool(false)), None);
    }

    #[test]
    fn test_entities_created_per_feature() {
        let harness = Harness::new();
        let mut expected = vec![
            format!("{}-monitoring", SIREN_ID),
            format!("{}-sound", SIREN_ID),
            format!("{}-reachable", SIREN_ID),
            format!("{}-opening", DOOR_TAG_ID),
            format!("{}-reachable", DOOR_TAG_ID),
            format!("{}-motion", DOOR_TAG_ID),
            format!("{}-vibration", DOOR_TAG_ID),
        ];
        expected.sort();
        assert_eq!(harness.platform.entity_ids(), expected);
    }

    #[test]
    fn test_initial_states() {
        let harness = Harness::new();
        let state = |device_id: &str, key: &str| {
            let json = harness.sensor(device_id, key).state_json();
            (json["is_on"].as_bool(), json["available"].as_bool())
        };

        // Monitoring on means no problem
        assert_eq!(state(SIREN_ID, "monitoring"), (Some(false), Some(true)));
        assert_eq!(state(SIREN_ID, "sound"), (Some(false), Some(true)));
        assert_eq!(state(SIREN_ID, "reachable"), (Some(true), Some(true)));
        assert_eq!(state(DOOR_TAG_ID, "opening"), (Some(false), Some(true)));
        assert_eq!(state(DOOR_TAG_ID, "motion"), (Some(false), Some(true)));
    }

    #[test]
    fn test_status_update_and_unreachable() {
        let mut harness = Harness::new();
        harness.drain();
        let signal = home_signal(HOME_ID);
        let sound_id = format!("{}-sound", SIREN_ID);

        harness.home.write().modules.get_mut(SIREN_ID).unwrap().status = Some("sound".to_string());
        harness.data_handler.notify(&signal);

        let msgs = harness.drain();
        assert!(msgs.contains(&FromIntegrationMessage::BinarySensorStateChanged {
            entity_id: sound_id.clone(),
            on: Some(true),
            available: true,
        }));

        harness.home.write().modules.get_mut(SIREN_ID).unwrap().reachable = Some(false);
        harness.data_handler.notify(&signal);
        harness.data_handler.notify(&signal);

        // Unavailability is written once, on the transition
        let unavailable: Vec<_> = harness
            .drain()
            .into_iter()
            .filter(|m| {
                matches!(m, FromIntegrationMessage::BinarySensorStateChanged { entity_id, .. } if *entity_id == sound_id)
            })
            .collect();
        assert_eq!(
            unavailable,
            vec![FromIntegrationMessage::BinarySensorStateChanged {
                entity_id: sound_id.clone(),
                on: Some(true),
                available: false,
            }]
        );
        assert!(!harness.sensor(SIREN_ID, "sound").available());
    }

    #[test]
    fn test_opening_webhook_switches_sensor_on() {
        let mut harness = Harness::new();
        harness.drain();

        let body = format!(
            r#"{{"event_type": "tag_open", "home_id": "{}", "device_id": "{}", "module_id": "{}"}}"#,
            HOME_ID, CAMERA_ID, DOOR_TAG_ID
        );
        handle_webhook(&harness.signals, body.as_bytes()).unwrap();

        assert_eq!(
            harness.drain(),
            vec![FromIntegrationMessage::BinarySensorStateChanged {
                entity_id: format!("{}-opening", DOOR_TAG_ID),
                on: Some(true),
                available: true,
            }]
        );

        // Events for another module are ignored
        let body = format!(
            r#"{{"event_type": "tag_big_move", "home_id": "{}", "module_id": "other"}}"#,
            HOME_ID
        );
        handle_webhook(&harness.signals, body.as_bytes()).unwrap();
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn test_opening_webhook_ignores_other_homes() {
        let mut harness = Harness::new();
        harness.drain();

        let body = format!(
            r#"{{"event_type": "tag_open", "home_id": "other-home", "module_id": "{}"}}"#,
            DOOR_TAG_ID
        );
        handle_webhook(&harness.signals, body.as_bytes()).unwrap();

        // No home at all: still dispatched, matched by nobody
        let body = format!(
            r#"{{"event_type": "tag_open", "module_id": "{}"}}"#,
            DOOR_TAG_ID
        );
        let event = handle_webhook(&harness.signals, body.as_bytes()).unwrap();
        assert_eq!(event.home_id, None);

        assert!(harness.drain().is_empty());
        assert_eq!(
            harness.sensor(DOOR_TAG_ID, "opening").state_json()["is_on"],
            false
        );
    }

    #[tokio::test]
    async fn test_home_alarm_webhook_forces_update() {
        let mut harness = Harness::new();
        harness.drain();
        harness.api.set_status(
            HOME_ID,
            HomeStatus {
                persons: vec![],
                modules: vec![ModuleStatus {
                    id: SIREN_ID.to_string(),
                    status: Some("sound".to_string()),
                    ..Default::default()
                }],
            },
        );

        let body = format!(
            r#"{{"event_type": "home_alarm", "home_id": "{}", "device_id": "{}"}}"#,
            HOME_ID, CAMERA_ID
        );
        handle_webhook(&harness.signals, body.as_bytes()).unwrap();

        for _ in 0..10 {
            if harness.sensor(SIREN_ID, "sound").state_json()["is_on"] == true {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(
            harness.api.calls(),
            vec![ApiCall::HomeStatus(HOME_ID.to_string())]
        );
        assert_eq!(
            harness.sensor(SIREN_ID, "sound").state_json()["is_on"],
            true
        );
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_home_alarm_webhook_ignores_unrelated_events() {
        let mut harness = Harness::new();
        harness.drain();

        for body in [
            // Another home
            format!(
                r#"{{"event_type": "home_alarm", "home_id": "other-home", "device_id": "{}"}}"#,
                CAMERA_ID
            ),
            // A camera the siren isn't bridged to
            format!(
                r#"{{"event_type": "home_alarm", "home_id": "{}", "device_id": "12:34:56:00:00:01"}}"#,
                HOME_ID
            ),
            // No camera at all
            format!(r#"{{"event_type": "home_alarm", "home_id": "{}"}}"#, HOME_ID),
        ] {
            handle_webhook(&harness.signals, body.as_bytes()).unwrap();
        }
        settle().await;

        assert!(harness.api.calls().is_empty());
        assert!(harness.drain().is_empty());
    }

    #[tokio::test]
    async fn test_home_alarm_webhook_ignored_by_unbridged_siren() {
        let mut home = fixture_home();
        home.modules.get_mut(SIREN_ID).unwrap().bridge = None;
        let mut harness = Harness::with_home(home);
        harness.drain();

        let body = format!(r#"{{"event_type": "home_alarm", "home_id": "{}"}}"#, HOME_ID);
        handle_webhook(&harness.signals, body.as_bytes()).unwrap();
        settle().await;

        assert!(harness.api.calls().is_empty());
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn test_state_json() {
        let harness = Harness::new();
        insta::assert_snapshot!(
            serde_json::to_string_pretty(&harness.sensor(SIREN_ID, "monitoring").state_json()).unwrap(),
            @r#"
        {
          "available": true,
          "configuration_url": "https://home.netatmo.com/security",
          "device_class": "safety",
          "entity_id": "12:34:56:00:e3:9b-monitoring",
          "is_on": false,
          "platform": "binary_sensor",
          "translation_key": "monitoring"
        }
        "#
        );
    }
}
