use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::mpsc::error::TrySendError;
use tracing::info;
use tracing::warn;

use super::entity::Entity;
use super::integration::FromIntegrationSender;
use super::message::FromIntegrationMessage;

/// Non-blocking handle entities use to push state to the engine.
///
/// State writes happen from synchronous signal callbacks, so a full channel
/// drops the write instead of waiting on the engine.
#[derive(Clone)]
pub struct StateWriter {
    tx: FromIntegrationSender,
}

impl StateWriter {
    pub fn new(tx: FromIntegrationSender) -> Self {
        Self { tx }
    }

    pub fn write(&self, msg: FromIntegrationMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                warn!("Engine channel full, dropping {:?}", msg);
            }
            Err(TrySendError::Closed(msg)) => {
                warn!("Engine channel closed, dropping {:?}", msg);
            }
        }
    }
}

/// Entities added by one integration, keyed by unique id.
pub struct EntityPlatform {
    integration_name: String,
    writer: StateWriter,
    entities: Mutex<HashMap<String, Arc<dyn Entity>>>,
}

impl EntityPlatform {
    pub fn new(integration_name: impl Into<String>, tx: FromIntegrationSender) -> Self {
        Self {
            integration_name: integration_name.into(),
            writer: StateWriter::new(tx),
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Register entities with the engine and let them subscribe to updates.
    ///
    /// An entity whose unique id is already registered is skipped.
    pub fn add_entities(&self, entities: Vec<Arc<dyn Entity>>) {
        for entity in entities {
            let entity_id = entity.unique_id().to_string();
            {
                let mut guard = self.entities.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.contains_key(&entity_id) {
                    warn!("Entity {} already registered, skipping", entity_id);
                    continue;
                }
                guard.insert(entity_id.clone(), entity.clone());
            }

            info!(
                "Adding {} entity: {} (from {})",
                entity.platform(),
                entity_id,
                self.integration_name
            );
            self.writer.write(FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name: self.integration_name.clone(),
            });

            // Outside the map lock: subscribing may run an initial update
            // that dispatches further signals.
            entity.added_to_platform(self.writer.clone());
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<dyn Entity>> {
        self.entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Remove every entity, letting each release its subscriptions first
    pub fn remove_all(&self) {
        let entities: Vec<(String, Arc<dyn Entity>)> = self
            .entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (entity_id, entity) in entities {
            entity.will_remove_from_platform();
            info!("Removed entity: {}", entity_id);
            self.writer
                .write(FromIntegrationMessage::EntityRemoved { entity_id });
        }
    }
}
