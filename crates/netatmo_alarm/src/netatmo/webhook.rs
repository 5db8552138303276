use serde::Deserialize;
use tracing::debug;
use tracing::info;

use super::consts::webhook_signal;
use super::data_handler::Signals;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Event pushed by the Netatmo cloud
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,

    /// Absent on account-level pushes such as webhook activation
    #[serde(default)]
    pub home_id: Option<String>,

    /// Camera (bridge) the event was reported through
    #[serde(default)]
    pub device_id: Option<String>,

    /// Module the event is about
    #[serde(default)]
    pub module_id: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Parse a webhook body and dispatch it on its event-type signal
pub fn handle_webhook(signals: &Signals, body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event: WebhookEvent = serde_json::from_slice(body)?;

    let signal = webhook_signal(&event.event_type);
    if signals.webhooks.listener_count(&signal) == 0 {
        debug!("No listener for webhook event {}", event.event_type);
    } else {
        info!(
            "Webhook event {} for home {}",
            event.event_type,
            event.home_id.as_deref().unwrap_or("<none>")
        );
    }
    signals.webhooks.send(&signal, &event);
    Ok(event)
}
