use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use strum::Display;

/// States an alarm control panel can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlarmState {
    Disarmed,
    ArmedHome,
    ArmedAway,
}

/// State of an alarm control panel entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlarmPanelState {
    /// Current alarm state, `None` while unknown.
    pub state: Option<AlarmState>,

    /// Whether the panel is currently usable.
    pub available: bool,
}

/// State of a binary sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinarySensorState {
    /// Whether the sensor is active (meaning depends on device class:
    /// siren sounding, window open, monitoring disabled, etc.)
    pub on: Option<bool>,

    pub available: bool,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub alarm_panels: HashMap<String, AlarmPanelState>,
    pub binary_sensors: HashMap<String, BinarySensorState>,
}
