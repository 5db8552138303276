use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::debug;

use super::dispatcher::Unsubscribe;

/// A configured instance of an integration.
///
/// Platforms hang their signal subscriptions off the entry so that unloading
/// the entry tears all of them down.
pub struct ConfigEntry {
    pub entry_id: String,
    on_unload: Mutex<Vec<Unsubscribe>>,
}

impl ConfigEntry {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            on_unload: Mutex::new(Vec::new()),
        }
    }

    /// Register a handle to run when the entry is unloaded
    pub fn on_unload(&self, unsub: Unsubscribe) {
        self.on_unload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unsub);
    }

    /// Run every registered unload handle. Handles run at most once.
    pub fn unload(&self) {
        let handles: Vec<Unsubscribe> = self
            .on_unload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        debug!(
            "Unloading config entry {} ({} handle(s))",
            self.entry_id,
            handles.len()
        );
        for unsub in handles {
            unsub();
        }
    }
}

impl std::fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEntry")
            .field("entry_id", &self.entry_id)
            .field("on_unload", &"<handles>")
            .finish()
    }
}
