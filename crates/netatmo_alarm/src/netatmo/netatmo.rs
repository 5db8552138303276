use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use super::NetatmoConfig;
use super::alarm_control_panel;
use super::binary_sensor;
use super::consts::DOMAIN;
use super::data_handler::DataHandler;
use super::data_handler::Signals;
use super::home::HomeApi;
use super::home::SharedHome;
use super::webhook::WebhookError;
use super::webhook::WebhookEvent;
use super::webhook::handle_webhook;
use crate::engine::ConfigEntry;
use crate::engine::EntityError;
use crate::engine::EntityPlatform;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;
use crate::engine::handle_alarm_command;

/// Netatmo integration
///
/// Discovers the homes of one config entry and exposes their sirens as alarm
/// control panels, with binary sensors for sirens and door tags.
pub struct NetatmoIntegration {
    config: NetatmoConfig,
    entry: ConfigEntry,
    signals: Signals,
    data_handler: Arc<DataHandler>,
    platform: Option<Arc<EntityPlatform>>,
}

impl NetatmoIntegration {
    pub fn new(api: Arc<dyn HomeApi>, config: &NetatmoConfig) -> Self {
        let signals = Signals::default();
        let data_handler = Arc::new(DataHandler::new(
            api,
            config.options.clone(),
            signals.clone(),
        ));

        Self {
            config: config.clone(),
            entry: ConfigEntry::new(config.entry_id.clone()),
            signals,
            data_handler,
            platform: None,
        }
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Feed a webhook body pushed by the Netatmo cloud to the entities
    pub fn handle_webhook(&self, body: &[u8]) -> Result<WebhookEvent, WebhookError> {
        handle_webhook(&self.signals, body)
    }

    fn platform(&self) -> Result<&Arc<EntityPlatform>, Box<dyn Error + Send>> {
        self.platform.as_ref().ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::other(format!(
                "Netatmo entry {} is not set up",
                self.config.entry_id
            )))
        })
    }
}

#[async_trait]
impl Integration for NetatmoIntegration {
    fn name(&self) -> &str {
        DOMAIN
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        info!("Setting up Netatmo entry {}", self.config.entry_id);

        let platform = Arc::new(EntityPlatform::new(DOMAIN, tx));
        alarm_control_panel::setup_entry(&self.entry, &self.signals, platform.clone());
        binary_sensor::setup_entry(&self.entry, &self.signals, platform.clone());
        self.platform = Some(platform);

        let api = self.data_handler.api().clone();
        let homes = api
            .homes_data()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        for home in homes {
            let home = SharedHome::new(home, api.clone());
            if let Err(e) = home.update_status().await {
                warn!("Failed to fetch status for home {}: {}", home.entity_id(), e);
            }

            info!(
                "Adding home {} ({})",
                home.entity_id(),
                home.read().name
            );
            self.data_handler.add_home(home.clone());
            self.data_handler.discover(&home);
        }

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::AlarmCommand { entity_id, command } => {
                let entity = self.platform()?.get(&entity_id).ok_or_else(
                    || -> Box<dyn Error + Send> { Box::new(EntityError::NotFound(entity_id.clone())) },
                )?;
                let panel = entity.as_alarm_control_panel().ok_or_else(
                    || -> Box<dyn Error + Send> {
                        Box::new(EntityError::NotAlarmControlPanel(entity_id.clone()))
                    },
                )?;

                info!("Alarm command for {}: {:?}", entity_id, command);
                handle_alarm_command(panel, command).await
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Unloading Netatmo entry {}", self.config.entry_id);
        if let Some(platform) = self.platform.take() {
            platform.remove_all();
        }
        self.entry.unload();
        Ok(())
    }
}
