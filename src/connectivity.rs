//! Online/offline observer.
//!
//! The platform reports transitions; UI code subscribes. Buffering is always
//! local-first, so nothing in the engine changes behavior when offline.

use std::sync::Arc;

use log::info;
use tokio::sync::watch;

/// Tracks whether the host currently has network connectivity.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Record a connectivity change reported by the platform.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(
                "[Connectivity] {}",
                if online { "Back online" } else { "Went offline" }
            );
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let monitor = ConnectivityMonitor::default();
        assert!(monitor.is_online());

        let mut rx = monitor.subscribe();
        monitor.set_online(false);
        assert!(!monitor.is_online());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());

        // Repeating the same state is not a change
        monitor.set_online(false);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectivityMonitor::new(false);
        let other = monitor.clone();
        other.set_online(true);
        assert!(monitor.is_online());
    }
}
