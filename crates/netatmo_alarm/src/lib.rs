pub mod config;
pub mod engine;
pub mod netatmo;

pub use config::Config;
pub use config::LogLevel;
pub use config::init_tracing;
pub use engine::AlarmPanelState;
pub use engine::AlarmState;
pub use engine::BinarySensorState;
pub use engine::Engine;
pub use engine::State;
