//! Type-safe message system
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::state::AlarmState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone, PartialEq)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
    },

    /// An entity was removed (integration unloaded, device gone, etc.)
    EntityRemoved { entity_id: String },

    /// An alarm control panel wrote a new state
    AlarmStateChanged {
        entity_id: String,
        state: Option<AlarmState>,
        available: bool,
    },

    /// A binary sensor wrote a new state
    BinarySensorStateChanged {
        entity_id: String,
        on: Option<bool>,
        available: bool,
    },
}

/// Alarm control panel commands. The code is forwarded untouched; panels
/// that don't require one ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmCommand {
    Disarm { code: Option<String> },
    ArmAway { code: Option<String> },
    ArmHome { code: Option<String> },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToIntegrationMessage {
    /// Command to change an alarm control panel's state
    AlarmCommand {
        entity_id: String,
        command: AlarmCommand,
    },
}

impl ToIntegrationMessage {
    /// Entity the command is addressed to, used for routing.
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::AlarmCommand { entity_id, .. } => entity_id,
        }
    }
}
