//! Entity abstraction
//!
//! All entities (alarm panels, binary sensors, etc.) implement the Entity trait.
//! Platform-specific behaviour is layered on top as extension traits.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use bitflags::bitflags;

use super::message::AlarmCommand;
use super::platform::StateWriter;

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("Entity {entity_id} does not support {feature}")]
    NotSupported {
        entity_id: String,
        feature: &'static str,
    },

    #[error("No entity found for id: {0}")]
    NotFound(String),

    #[error("Entity {0} is not an alarm control panel")]
    NotAlarmControlPanel(String),
}

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Stable identifier, also used as the engine-side entity id
    fn unique_id(&self) -> &str;

    /// Return the platform type of this entity (e.g. "alarm_control_panel")
    fn platform(&self) -> &'static str;

    fn available(&self) -> bool;

    /// Serialize current state and metadata to JSON
    fn state_json(&self) -> serde_json::Value;

    /// Called once the platform has registered the entity. Entities subscribe
    /// to their update signals here and keep `writer` for state writes.
    fn added_to_platform(self: Arc<Self>, writer: StateWriter);

    /// Called before the entity is dropped by the platform.
    fn will_remove_from_platform(&self) {}

    fn as_alarm_control_panel(&self) -> Option<&dyn AlarmControlPanel> {
        None
    }
}

bitflags! {
    /// Feature flags an alarm control panel can advertise, with Home
    /// Assistant's values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AlarmControlPanelFeature: u32 {
        const ARM_HOME          = 1;
        const ARM_AWAY          = 2;
        const ARM_NIGHT         = 4;
        const TRIGGER           = 8;
        const ARM_CUSTOM_BYPASS = 16;
        const ARM_VACATION      = 32;
    }
}

/// Alarm control panel entity
#[async_trait]
pub trait AlarmControlPanel: Entity {
    fn supported_features(&self) -> AlarmControlPanelFeature;

    /// Whether a code must be supplied to arm the panel
    fn code_arm_required(&self) -> bool {
        true
    }

    async fn alarm_disarm(&self, code: Option<&str>) -> Result<(), Box<dyn Error + Send>>;

    async fn alarm_arm_away(&self, _code: Option<&str>) -> Result<(), Box<dyn Error + Send>> {
        Err(Box::new(EntityError::NotSupported {
            entity_id: self.unique_id().to_string(),
            feature: "arm_away",
        }))
    }

    async fn alarm_arm_home(&self, _code: Option<&str>) -> Result<(), Box<dyn Error + Send>> {
        Err(Box::new(EntityError::NotSupported {
            entity_id: self.unique_id().to_string(),
            feature: "arm_home",
        }))
    }
}

/// Run `command` against `panel`, rejecting features the panel doesn't
/// advertise before any remote call is made.
pub async fn handle_alarm_command(
    panel: &dyn AlarmControlPanel,
    command: AlarmCommand,
) -> Result<(), Box<dyn Error + Send>> {
    let features = panel.supported_features();
    let unsupported = |feature: &'static str| -> Box<dyn Error + Send> {
        Box::new(EntityError::NotSupported {
            entity_id: panel.unique_id().to_string(),
            feature,
        })
    };

    match command {
        AlarmCommand::Disarm { code } => panel.alarm_disarm(code.as_deref()).await,
        AlarmCommand::ArmAway { code } => {
            if !features.contains(AlarmControlPanelFeature::ARM_AWAY) {
                return Err(unsupported("arm_away"));
            }
            panel.alarm_arm_away(code.as_deref()).await
        }
        AlarmCommand::ArmHome { code } => {
            if !features.contains(AlarmControlPanelFeature::ARM_HOME) {
                return Err(unsupported("arm_home"));
            }
            panel.alarm_arm_home(code.as_deref()).await
        }
    }
}
