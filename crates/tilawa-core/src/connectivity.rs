//! Connectivity signal
//!
//! Advisory only: when the signal says offline the repository skips the
//! network and reads the cache directly. Being "online" is never trusted as a
//! guarantee; a request can still fail and fall back.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Reports whether the network is believed to be reachable
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity that never reports offline
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Settable connectivity state with change notifications
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Update the state; subscribers are only woken on an actual change
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }
}
