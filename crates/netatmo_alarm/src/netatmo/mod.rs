pub mod alarm_control_panel;
pub mod binary_sensor;
mod config;
pub mod consts;
pub mod data_handler;
mod entity;
pub mod home;
#[allow(clippy::module_inception)]
mod netatmo;
pub mod webhook;

use std::sync::Arc;

pub use config::Config as NetatmoConfig;
pub use config::EntryOptions;
pub use home::HomeApi;
pub use netatmo::NetatmoIntegration;

use crate::engine;

/// Build the Netatmo integration if it is configured, talking to the cloud
/// through `api`.
pub fn init_netatmo(
    ctx: &engine::IntegrationContext,
    api: Arc<dyn HomeApi>,
) -> engine::IntegrationFactoryResult {
    let Some(netatmo_config) = ctx.netatmo() else {
        return Ok(None);
    };

    anyhow::ensure!(
        !netatmo_config.entry_id.is_empty(),
        "Netatmo entry_id must not be empty"
    );
    Ok(Some(Box::new(NetatmoIntegration::new(api, netatmo_config))))
}
