//! Shared state of one Netatmo config entry
//!
//! The data handler owns the API client, the homes fetched from it and the
//! publisher registry entities subscribe through. It announces discovered
//! modules on the device-creation signals the platforms listen to.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::debug;
use tracing::info;

use super::config::EntryOptions;
use super::consts::HOME;
use super::consts::NETATMO_CREATE_OPENING_SENSOR;
use super::consts::NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL;
use super::consts::NETATMO_CREATE_SIREN_SENSOR;
use super::consts::home_signal;
use super::home::ApiError;
use super::home::HomeApi;
use super::home::ModuleType;
use super::home::SharedHome;
use super::webhook::WebhookEvent;
use crate::engine::Dispatcher;

/// Dispatchers shared by the data handler and the platforms
#[derive(Clone, Default)]
pub struct Signals {
    /// Device-creation signals, carrying the discovered module
    pub devices: Dispatcher<NetatmoDevice>,

    /// Per-home update notifications
    pub updates: Dispatcher<()>,

    /// Webhook events, one signal per event type
    pub webhooks: Dispatcher<WebhookEvent>,
}

/// A module announced on a device-creation signal
#[derive(Clone)]
pub struct NetatmoDevice {
    pub data_handler: Arc<DataHandler>,
    pub device_id: String,
    pub home: SharedHome,
    pub signal_name: String,
}

impl std::fmt::Debug for NetatmoDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetatmoDevice")
            .field("device_id", &self.device_id)
            .field("home", &self.home.entity_id())
            .field("signal_name", &self.signal_name)
            .finish()
    }
}

/// A data source entities subscribe to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publisher {
    pub name: &'static str,
    pub home_id: String,
    pub signal_name: String,
}

impl Publisher {
    pub fn home(home_id: &str) -> Self {
        Self {
            name: HOME,
            home_id: home_id.to_string(),
            signal_name: home_signal(home_id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("No publisher registered for signal {0}")]
    UnknownPublisher(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct DataHandler {
    api: Arc<dyn HomeApi>,
    options: EntryOptions,
    signals: Signals,
    homes: Mutex<HashMap<String, SharedHome>>,
    /// signal name -> (publisher, subscriber count)
    publishers: Mutex<HashMap<String, (Publisher, usize)>>,
}

impl DataHandler {
    pub fn new(api: Arc<dyn HomeApi>, options: EntryOptions, signals: Signals) -> Self {
        Self {
            api,
            options,
            signals,
            homes: Mutex::new(HashMap::new()),
            publishers: Mutex::new(HashMap::new()),
        }
    }

    pub fn api(&self) -> &Arc<dyn HomeApi> {
        &self.api
    }

    pub fn options(&self) -> &EntryOptions {
        &self.options
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn add_home(&self, home: SharedHome) {
        self.homes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(home.entity_id().to_string(), home);
    }

    pub fn home(&self, home_id: &str) -> Option<SharedHome> {
        self.homes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(home_id)
            .cloned()
    }

    pub fn register_publisher(&self, publisher: Publisher) {
        let mut publishers = self.publishers.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = publishers
            .entry(publisher.signal_name.clone())
            .or_insert_with(|| {
                info!(
                    "Publisher {} added for home {}",
                    publisher.name, publisher.home_id
                );
                (publisher, 0)
            });
        entry.1 += 1;
    }

    /// Drop one subscription; the publisher goes away with its last subscriber
    pub fn unregister_publisher(&self, signal_name: &str) {
        let mut publishers = self.publishers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = publishers.get_mut(signal_name) else {
            return;
        };
        entry.1 = entry.1.saturating_sub(1);
        if entry.1 == 0 {
            publishers.remove(signal_name);
            info!("Publisher {} removed", signal_name);
        }
    }

    pub fn subscriber_count(&self, signal_name: &str) -> usize {
        self.publishers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signal_name)
            .map_or(0, |(_, count)| *count)
    }

    /// Tell every entity listening on `signal_name` to refresh
    pub fn notify(&self, signal_name: &str) {
        debug!("Notifying {}", signal_name);
        self.signals.updates.send(signal_name, &());
    }

    /// Fetch fresh status for the publisher behind `signal_name`, then notify
    pub async fn force_update(&self, signal_name: &str) -> Result<(), UpdateError> {
        let home_id = self
            .publishers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signal_name)
            .map(|(publisher, _)| publisher.home_id.clone())
            .ok_or_else(|| UpdateError::UnknownPublisher(signal_name.to_string()))?;

        let home = self
            .home(&home_id)
            .ok_or_else(|| UpdateError::Api(ApiError::UnknownHome(home_id.clone())))?;

        home.update_status().await?;
        self.notify(signal_name);
        Ok(())
    }

    /// Announce the modules of `home` on their device-creation signals
    pub fn discover(self: &Arc<Self>, home: &SharedHome) {
        let modules: Vec<(String, ModuleType)> = home
            .read()
            .modules
            .values()
            .map(|m| (m.entity_id.clone(), m.module_type))
            .collect();

        for (device_id, module_type) in modules {
            let signals: &[&str] = match module_type {
                ModuleType::Siren => &[
                    NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL,
                    NETATMO_CREATE_SIREN_SENSOR,
                ],
                ModuleType::DoorTag => &[NETATMO_CREATE_OPENING_SENSOR],
                _ => continue,
            };

            info!("Discovered {:?} module {}", module_type, device_id);
            let device = NetatmoDevice {
                data_handler: self.clone(),
                device_id,
                home: home.clone(),
                signal_name: home_signal(home.entity_id()),
            };
            for signal in signals {
                self.signals.devices.send(signal, &device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::netatmo::home::HomeStatus;
    use crate::netatmo::home::PersonStatus;
    use crate::netatmo::home::mock::*;

    fn handler(api: Arc<MockHomeApi>) -> (Arc<DataHandler>, SharedHome) {
        let dh = Arc::new(DataHandler::new(
            api.clone(),
            EntryOptions::default(),
            Signals::default(),
        ));
        let home = SharedHome::new(fixture_home(), api);
        dh.add_home(home.clone());
        (dh, home)
    }

    #[test]
    fn test_publisher_refcount() {
        let (dh, _) = handler(Arc::new(MockHomeApi::default()));
        let signal = home_signal(HOME_ID);

        dh.register_publisher(Publisher::home(HOME_ID));
        dh.register_publisher(Publisher::home(HOME_ID));
        assert_eq!(dh.subscriber_count(&signal), 2);

        dh.unregister_publisher(&signal);
        assert_eq!(dh.subscriber_count(&signal), 1);
        dh.unregister_publisher(&signal);
        assert_eq!(dh.subscriber_count(&signal), 0);

        // Unknown signals are ignored
        dh.unregister_publisher(&signal);
    }

    #[test]
    fn test_discover_dispatches_per_module_type() {
        let (dh, home) = handler(Arc::new(MockHomeApi::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for signal in [
            NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL,
            NETATMO_CREATE_SIREN_SENSOR,
            NETATMO_CREATE_OPENING_SENSOR,
        ] {
            let seen = seen.clone();
            let _unsub = dh.signals().devices.connect(signal, move |device| {
                seen.lock()
                    .unwrap()
                    .push((signal, device.device_id.clone()));
            });
        }

        dh.discover(&home);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                (NETATMO_CREATE_OPENING_SENSOR, DOOR_TAG_ID.to_string()),
                (NETATMO_CREATE_SIREN_ALARM_CONTROL_PANEL, SIREN_ID.to_string()),
                (NETATMO_CREATE_SIREN_SENSOR, SIREN_ID.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_force_update_fetches_and_notifies() {
        let api = Arc::new(MockHomeApi::default());
        api.set_status(
            HOME_ID,
            HomeStatus {
                persons: vec![PersonStatus {
                    id: PERSON_A.to_string(),
                    out_of_sight: true,
                }],
                modules: vec![],
            },
        );
        let (dh, home) = handler(api);
        let signal = home_signal(HOME_ID);
        dh.register_publisher(Publisher::home(HOME_ID));

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let _unsub = dh.signals().updates.connect(&signal, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dh.force_update(&signal).await.unwrap();

        assert!(home.read().persons[PERSON_A].out_of_sight);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_update_unknown_signal() {
        let (dh, _) = handler(Arc::new(MockHomeApi::default()));
        let err = dh.force_update("home-nope").await.unwrap_err();
        assert!(matches!(err, UpdateError::UnknownPublisher(_)));
    }
}
