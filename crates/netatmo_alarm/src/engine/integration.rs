use std::error::Error;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use crate::config::Config;
use crate::netatmo::NetatmoConfig;

/// Discovery and state writes from entities to the engine. Bounded; entities
/// write with `try_send` through a `StateWriter`.
pub type FromIntegrationSender = mpsc::Sender<FromIntegrationMessage>;
pub type FromIntegrationReceiver = mpsc::Receiver<FromIntegrationMessage>;

/// Alarm commands routed by the engine to the integration owning the entity
pub type ToIntegrationSender = mpsc::UnboundedSender<ToIntegrationMessage>;

/// `Ok(None)` when the integration isn't configured
pub type IntegrationFactoryResult = anyhow::Result<Option<Box<dyn Integration>>>;

/// What an integration factory gets to build its integration from
pub struct IntegrationContext<'a> {
    pub config: &'a Config,
}

impl IntegrationContext<'_> {
    pub fn netatmo(&self) -> Option<&NetatmoConfig> {
        self.config.integrations.netatmo.as_ref()
    }
}

/// A source of entities, driven by the engine on its own task
#[async_trait]
pub trait Integration: Send + Sync {
    /// Name entities are registered under (e.g. "netatmo")
    fn name(&self) -> &str;

    /// Fetch homes, create entities and run their first refresh.
    ///
    /// Entities keep `tx` to report discovery and state for as long as the
    /// integration runs.
    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>>;

    /// Execute a command against one of this integration's entities.
    ///
    /// Errors from the remote API are returned unchanged in the box.
    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Remove every entity and release the config entry's subscriptions
    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>>;
}
