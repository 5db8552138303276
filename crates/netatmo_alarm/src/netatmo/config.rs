use serde::Deserialize;

/// Options that can be changed on a configured Netatmo entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntryOptions {
    /// Pseudos of the persons marked home on disarm. When unset, every
    /// person known to the home is marked home.
    #[serde(default)]
    pub alarm_disarm_persons: Option<Vec<String>>,
}

/// Configuration for the Netatmo integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Identifier of the config entry this integration runs as
    pub entry_id: String,

    #[serde(default)]
    pub options: EntryOptions,
}
