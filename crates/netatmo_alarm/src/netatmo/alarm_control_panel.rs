//! Netatmo alarm control panel
//!
//! Exposes a siren and the camera it is paired with as an arm-away/disarm
//! panel. Arming marks everyone in the home away, disarming marks them home;
//! the displayed state is derived from whether everyone is out of sight.

use std::error::Error;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;

use super::consts::CONF_URL_SECURITY;
use super::consts::HOME;
use super::consts::NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL;
use super::consts::home_signal;
use super::data_handler::NetatmoDevice;
use super::data_handler::Publisher;
use super::data_handler::Signals;
use super::entity::NetatmoEntity;
use super::entity::NetatmoModuleEntity;
use super::entity::added_to_platform;
use crate::engine::AlarmControlPanel;
use crate::engine::AlarmControlPanelFeature;
use crate::engine::AlarmState;
use crate::engine::ConfigEntry;
use crate::engine::Entity;
use crate::engine::EntityPlatform;
use crate::engine::FromIntegrationMessage;
use crate::engine::StateWriter;

/// Describes a Netatmo alarm control panel entity
#[derive(Debug)]
pub struct NetatmoAlarmControlPanelEntityDescription {
    pub key: &'static str,
    pub netatmo_name: &'static str,
    /// Labels indexed unknown, disarmed, armed away, armed home
    pub netatmo_alarm_states: [Option<AlarmState>; 4],
}

pub const ALARM_TYPE: NetatmoAlarmControlPanelEntityDescription =
    NetatmoAlarmControlPanelEntityDescription {
        key: "netatmo_alarm",
        netatmo_name: "alarm",
        netatmo_alarm_states: [
            None,
            Some(AlarmState::Disarmed),
            Some(AlarmState::ArmedAway),
            Some(AlarmState::ArmedHome),
        ],
    };

/// Create an alarm panel for every siren announced on the device signal
pub fn setup_entry(entry: &ConfigEntry, signals: &Signals, platform: Arc<EntityPlatform>) {
    let unsub = signals
        .devices
        .connect(NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL, move |device| {
            let entity = Arc::new(NetatmoAlarmEntity::new(device.clone(), &ALARM_TYPE));
            platform.add_entities(vec![entity as Arc<dyn Entity>]);
        });
    entry.on_unload(unsub);
}

#[derive(Debug)]
struct AlarmAttrs {
    state: Option<AlarmState>,
    available: bool,
}

pub struct NetatmoAlarmEntity {
    base: NetatmoModuleEntity,
    description: &'static NetatmoAlarmControlPanelEntityDescription,
    unique_id: String,
    signal_name: String,
    attrs: Mutex<AlarmAttrs>,
}

impl NetatmoAlarmEntity {
    pub fn new(
        device: NetatmoDevice,
        description: &'static NetatmoAlarmControlPanelEntityDescription,
    ) -> Self {
        let home_id = device.home.entity_id().to_string();
        let signal_name = home_signal(&home_id);
        let unique_id = format!("{}-{}", device.device_id, description.key);

        let mut base = NetatmoModuleEntity::new(device);
        base.add_publisher(Publisher {
            name: HOME,
            home_id,
            signal_name: signal_name.clone(),
        });

        Self {
            base,
            description,
            unique_id,
            signal_name,
            attrs: Mutex::new(AlarmAttrs {
                state: None,
                available: true,
            }),
        }
    }

    pub fn translation_key(&self) -> &'static str {
        self.description.netatmo_name
    }

    pub fn state(&self) -> Option<AlarmState> {
        self.attrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// True when every person of the home is out of sight
    pub fn is_house_empty(&self) -> bool {
        self.base
            .home()
            .read()
            .persons
            .values()
            .all(|p| p.out_of_sight)
    }

    /// Monitoring flag of the camera this siren is bridged to
    pub fn is_camera_monitoring(&self) -> bool {
        let home = self.base.home().read();
        home.modules
            .get(self.base.device_id())
            .and_then(|siren| siren.bridge.as_ref())
            .and_then(|parent_id| home.modules.get(parent_id))
            .and_then(|camera| camera.monitoring)
            .unwrap_or(false)
    }

    pub fn is_siren_monitoring(&self) -> bool {
        self.base
            .with_module(|siren| siren.monitoring)
            .flatten()
            .unwrap_or(false)
    }

    /// Persons marked home on disarm, filtered by the entry options if set
    fn disarm_person_ids(&self) -> Vec<String> {
        let selected = self
            .base
            .data_handler()
            .options()
            .alarm_disarm_persons
            .as_ref();

        self.base
            .home()
            .read()
            .persons
            .values()
            .filter(|p| match selected {
                None => true,
                Some(pseudos) => p.pseudo.as_ref().is_some_and(|ps| pseudos.contains(ps)),
            })
            .map(|p| p.entity_id.clone())
            .collect()
    }
}

impl NetatmoEntity for NetatmoAlarmEntity {
    fn base(&self) -> &NetatmoModuleEntity {
        &self.base
    }

    fn update_callback(&self) {
        let available = self.is_camera_monitoring() && self.is_siren_monitoring();
        let state = if self.is_house_empty() {
            AlarmState::ArmedAway
        } else {
            AlarmState::Disarmed
        };

        {
            let mut attrs = self.attrs.lock().unwrap_or_else(PoisonError::into_inner);
            attrs.available = available;
            attrs.state = Some(state);
        }

        debug!(
            "Alarm {} refreshed: state={}, available={}",
            self.unique_id, state, available
        );
        self.base
            .write_state(FromIntegrationMessage::AlarmStateChanged {
                entity_id: self.unique_id.clone(),
                state: Some(state),
                available,
            });
    }
}

impl Entity for NetatmoAlarmEntity {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn platform(&self) -> &'static str {
        "alarm_control_panel"
    }

    fn available(&self) -> bool {
        self.attrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .available
    }

    fn state_json(&self) -> serde_json::Value {
        let (state, available) = {
            let attrs = self.attrs.lock().unwrap_or_else(PoisonError::into_inner);
            (attrs.state, attrs.available)
        };
        serde_json::json!({
            "entity_id": self.unique_id,
            "platform": self.platform(),
            "state": state,
            "available": available,
            "translation_key": self.translation_key(),
            "has_entity_name": true,
            "configuration_url": CONF_URL_SECURITY,
            "supported_features": self.supported_features().bits(),
            "code_arm_required": self.code_arm_required(),
        })
    }

    fn added_to_platform(self: Arc<Self>, writer: StateWriter) {
        added_to_platform(&self, writer);
    }

    fn will_remove_from_platform(&self) {
        self.base.remove();
    }

    fn as_alarm_control_panel(&self) -> Option<&dyn AlarmControlPanel> {
        Some(self)
    }
}

#[async_trait]
impl AlarmControlPanel for NetatmoAlarmEntity {
    fn supported_features(&self) -> AlarmControlPanelFeature {
        AlarmControlPanelFeature::ARM_AWAY
    }

    fn code_arm_required(&self) -> bool {
        false
    }

    async fn alarm_disarm(&self, _code: Option<&str>) -> Result<(), Box<dyn Error + Send>> {
        let person_ids = self.disarm_person_ids();
        info!(
            "Disarming {}: marking {} person(s) home",
            self.unique_id,
            person_ids.len()
        );

        self.base
            .home()
            .set_persons_home(&person_ids)
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        {
            let mut home = self.base.home().write();
            for person_id in &person_ids {
                if let Some(person) = home.persons.get_mut(person_id) {
                    person.out_of_sight = false;
                }
            }
        }

        self.base.data_handler().notify(&self.signal_name);
        Ok(())
    }

    async fn alarm_arm_away(&self, _code: Option<&str>) -> Result<(), Box<dyn Error + Send>> {
        info!("Arming {} away", self.unique_id);

        self.base
            .home()
            .set_persons_away()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        {
            let mut home = self.base.home().write();
            for person in home.persons.values_mut() {
                person.out_of_sight = true;
            }
        }

        self.base.data_handler().notify(&self.signal_name);
        Ok(())
    }
}
