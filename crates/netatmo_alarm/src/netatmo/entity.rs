use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;

use tracing::warn;

use super::data_handler::DataHandler;
use super::data_handler::NetatmoDevice;
use super::data_handler::Publisher;
use super::home::Module;
use super::home::SharedHome;
use crate::engine::FromIntegrationMessage;
use crate::engine::StateWriter;
use crate::engine::Unsubscribe;

/// State shared by every entity backed by a Netatmo module
pub struct NetatmoModuleEntity {
    device: NetatmoDevice,
    publishers: Vec<Publisher>,
    writer: OnceLock<StateWriter>,
    on_remove: Mutex<Vec<Unsubscribe>>,
}

impl NetatmoModuleEntity {
    pub fn new(device: NetatmoDevice) -> Self {
        Self {
            device,
            publishers: Vec::new(),
            writer: OnceLock::new(),
            on_remove: Mutex::new(Vec::new()),
        }
    }

    pub fn add_publisher(&mut self, publisher: Publisher) {
        self.publishers.push(publisher);
    }

    pub fn device_id(&self) -> &str {
        &self.device.device_id
    }

    pub fn home(&self) -> &SharedHome {
        &self.device.home
    }

    pub fn data_handler(&self) -> &Arc<DataHandler> {
        &self.device.data_handler
    }

    /// Run `f` against this entity's module, if the home still has it
    pub fn with_module<R>(&self, f: impl FnOnce(&Module) -> R) -> Option<R> {
        self.home().read().modules.get(self.device_id()).map(f)
    }

    /// Push state to the engine. A no-op until the entity has been added.
    pub fn write_state(&self, msg: FromIntegrationMessage) {
        if let Some(writer) = self.writer.get() {
            writer.write(msg);
        }
    }

    /// Register a handle released when the entity is removed
    pub fn on_remove(&self, unsub: Unsubscribe) {
        self.on_remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unsub);
    }

    /// Release subscriptions and publishers
    pub fn remove(&self) {
        let handles: Vec<Unsubscribe> = self
            .on_remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for unsub in handles {
            unsub();
        }

        for publisher in &self.publishers {
            self.data_handler()
                .unregister_publisher(&publisher.signal_name);
        }
    }
}

/// Netatmo entities refresh themselves from the shared home on notification
pub trait NetatmoEntity: Send + Sync + 'static {
    fn base(&self) -> &NetatmoModuleEntity;

    fn update_callback(&self);
}

/// Subscribe `entity` to its publishers' signals and run a first update
pub fn added_to_platform<E: NetatmoEntity>(entity: &Arc<E>, writer: StateWriter) {
    let base = entity.base();
    if base.writer.set(writer).is_err() {
        warn!("Entity for {} added twice", base.device_id());
        return;
    }

    for publisher in &base.publishers {
        base.data_handler().register_publisher(publisher.clone());

        let weak = Arc::downgrade(entity);
        let unsub = base.data_handler().signals().updates.connect(
            &publisher.signal_name,
            move |_| {
                if let Some(entity) = weak.upgrade() {
                    entity.update_callback();
                }
            },
        );
        base.on_remove(unsub);
    }

    entity.update_callback();
}
