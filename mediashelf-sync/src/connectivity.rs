//! Online/offline tracking
//!
//! A two-state monitor fed by the platform's connectivity signal. Listeners
//! fire on actual transitions only; feeding the same state twice is a no-op.
//! The state is not persisted — it is re-derived from the platform probe at
//! startup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct MonitorState {
    online: bool,
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// Tracks the current connectivity signal and notifies on transitions.
pub struct ConnectivityMonitor {
    state: Mutex<MonitorState>,
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded with the platform's current signal.
    pub fn new(initially_online: bool) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                online: initially_online,
                next_id: 0,
                listeners: HashMap::new(),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Feeds the raw platform signal.
    ///
    /// Listeners run outside the internal lock, so they may call back into
    /// the monitor.
    pub fn set_online(&self, online: bool) {
        let listeners: Vec<Listener> = {
            let mut state = self.state.lock();
            if state.online == online {
                return;
            }
            state.online = online;
            state.listeners.values().cloned().collect()
        };

        if online {
            tracing::info!("Connectivity restored");
        } else {
            tracing::warn!("Connectivity lost");
        }
        for listener in listeners {
            listener(online);
        }
    }

    /// Registers a transition listener; it receives the new state.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Removes a listener; returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.lock().listeners.remove(&id.0).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_initial_state() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
    }

    #[test]
    fn test_listeners_fire_on_transitions_only() {
        let monitor = ConnectivityMonitor::new(false);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        monitor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_online(false); // already offline, no transition
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        monitor.set_online(true);
        monitor.set_online(true); // repeated signal, no transition
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        monitor.set_online(false);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_receives_new_state() {
        let monitor = ConnectivityMonitor::new(false);
        let seen_online = Arc::new(AtomicUsize::new(99));
        let seen = seen_online.clone();
        monitor.subscribe(move |online| {
            seen.store(usize::from(online), Ordering::SeqCst);
        });

        monitor.set_online(true);
        assert_eq!(seen_online.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let monitor = ConnectivityMonitor::new(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let id = monitor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(monitor.unsubscribe(id));
        assert!(!monitor.unsubscribe(id));

        monitor.set_online(false);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_may_reenter_monitor() {
        let monitor = Arc::new(ConnectivityMonitor::new(false));
        let seen = Arc::new(AtomicUsize::new(0));
        let inner = monitor.clone();
        let seen_clone = seen.clone();
        monitor.subscribe(move |_| {
            // must not deadlock
            seen_clone.store(usize::from(inner.is_online()), Ordering::SeqCst);
        });

        monitor.set_online(true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
