mod config_entry;
mod dispatcher;
#[allow(clippy::module_inception)]
mod engine;
mod entity;
mod integration;
mod message;
mod platform;
pub mod state;

pub use config_entry::ConfigEntry;
pub use dispatcher::Dispatcher;
pub use dispatcher::Unsubscribe;
pub use engine::Engine;
pub use entity::AlarmControlPanel;
pub use entity::AlarmControlPanelFeature;
pub use entity::Entity;
pub use entity::EntityError;
pub use entity::handle_alarm_command;
pub use integration::FromIntegrationReceiver;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use message::AlarmCommand;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use platform::EntityPlatform;
pub use platform::StateWriter;
pub use state::AlarmPanelState;
pub use state::AlarmState;
pub use state::BinarySensorState;
pub use state::State;
