//! Named-signal dispatcher
//!
//! Integrations use signals to decouple discovery from entity creation and to
//! fan out update notifications: any number of callbacks connect to a signal
//! name and every `send` on that name reaches all of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::trace;

/// Handle returned by a subscription. Calling it disconnects the callback.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Listeners<T> = HashMap<String, Vec<(u64, Callback<T>)>>;

/// Dispatcher for signals carrying a payload of type `T`.
pub struct Dispatcher<T> {
    listeners: Arc<Mutex<Listeners<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: 'static> Dispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a callback to `signal`
    pub fn connect<F>(&self, signal: &str, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(signal.to_string())
            .or_default()
            .push((id, Arc::new(callback)));

        let listeners = Arc::downgrade(&self.listeners);
        let signal = signal.to_string();
        Box::new(move || {
            let Some(listeners) = listeners.upgrade() else {
                return;
            };
            let mut guard = listeners.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(callbacks) = guard.get_mut(&signal) {
                callbacks.retain(|(cid, _)| *cid != id);
                if callbacks.is_empty() {
                    guard.remove(&signal);
                }
            }
        })
    }

    /// Send `payload` to every callback connected to `signal`
    ///
    /// Callbacks run synchronously on the caller's task. They are collected
    /// before any of them runs, so a callback may connect or disconnect
    /// listeners without deadlocking.
    pub fn send(&self, signal: &str, payload: &T) {
        let callbacks: Vec<Callback<T>> = {
            let guard = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.get(signal) {
                Some(callbacks) => callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
                None => Vec::new(),
            }
        };

        trace!("Dispatching {} to {} listener(s)", signal, callbacks.len());
        for callback in callbacks {
            callback(payload);
        }
    }

    /// Number of callbacks currently connected to `signal`
    pub fn listener_count(&self, signal: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signal)
            .map_or(0, Vec::len)
    }
}
