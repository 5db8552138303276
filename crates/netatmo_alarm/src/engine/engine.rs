use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::entity::EntityError;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::AlarmCommand;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::AlarmPanelState;
use super::state::BinarySensorState;
use super::state::State;

/// Engine
///
/// Routes commands to the integration owning an entity and folds the state
/// integrations report into a snapshot of the world.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: HashMap<String, ToIntegrationSender>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

/// Capacity for the integration→engine message channel
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: HashMap::new(),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: Vec::new(),
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process. Command failures are logged here; this
    /// is where they surface to the user.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .insert(name.clone(), to_integration_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.push(handle);
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), Box<dyn Error + Send>> {
        let integration_name = {
            let map = self
                .entity_integration_map
                .lock()
                .map_err(|e| -> Box<dyn Error + Send> {
                    Box::new(std::io::Error::other(e.to_string()))
                })?;

            map.get(msg.entity_id())
                .cloned()
                .ok_or_else(|| -> Box<dyn Error + Send> {
                    Box::new(EntityError::NotFound(msg.entity_id().to_string()))
                })?
        };

        let tx = self.integration_channels.get(&integration_name).ok_or_else(
            || -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Integration channel not found: {}", integration_name),
                ))
            },
        )?;

        tx.send(msg)
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }

    /// Send a command to an alarm control panel entity
    pub fn send_alarm_command(
        &self,
        entity_id: String,
        command: AlarmCommand,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.send_command(ToIntegrationMessage::AlarmCommand { entity_id, command })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // State is not populated until the first state-change message arrives.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.insert(entity_id, integration_name);
                }
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                self.update_state(|state| {
                    state.alarm_panels.remove(&entity_id);
                    state.binary_sensors.remove(&entity_id);
                });

                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.remove(&entity_id);
                }
            }
            FromIntegrationMessage::AlarmStateChanged {
                entity_id,
                state,
                available,
            } => {
                info!(
                    "Alarm state changed: {} -> state={:?}, available={}",
                    entity_id, state, available
                );
                self.update_state(|s| {
                    s.alarm_panels
                        .insert(entity_id, AlarmPanelState { state, available });
                });
            }
            FromIntegrationMessage::BinarySensorStateChanged {
                entity_id,
                on,
                available,
            } => {
                info!(
                    "Binary sensor state changed: {} -> on={:?}, available={}",
                    entity_id, on, available
                );
                self.update_state(|s| {
                    s.binary_sensors
                        .insert(entity_id, BinarySensorState { on, available });
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
