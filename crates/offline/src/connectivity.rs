//! Connectivity monitor
//!
//! Holds the device's advisory online/offline flag. The platform layer feeds
//! native connectivity events into [`ConnectivityMonitor::set_state`]; the
//! flag is never polled and may lag the real network.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Network connectivity state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Connected to network
    Online,

    /// Disconnected from network
    Offline,
}

impl ConnectivityState {
    /// State for a boolean online flag
    pub fn from_online(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

struct Inner {
    state: RwLock<ConnectivityState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    events: broadcast::Sender<ConnectivityState>,
}

/// Shared online/offline flag with change notifications
///
/// Construct one at application start and clone it into every component
/// that needs it; clones share state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    /// Create a monitor starting in `initial`
    pub fn new(initial: ConnectivityState) -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.read()
    }

    /// Whether the device is believed to be online
    pub fn is_online(&self) -> bool {
        self.state() == ConnectivityState::Online
    }

    /// Record a connectivity report from the platform
    ///
    /// Returns `true` if the report was a transition. Every transition
    /// notifies all listeners and async watchers; there is no debouncing.
    pub fn set_state(&self, state: ConnectivityState) -> bool {
        {
            let mut current = self.inner.state.write();
            if *current == state {
                return false;
            }
            *current = state;
        }

        tracing::info!(%state, "connectivity changed");

        // Listeners run outside the lock so they may unsubscribe themselves
        let listeners: Vec<Listener> =
            self.inner.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(state);
        }

        let _ = self.inner.events.send(state);
        true
    }

    /// Shorthand for [`Self::set_state`] with a boolean
    pub fn set_online(&self, online: bool) -> bool {
        self.set_state(ConnectivityState::from_online(online))
    }

    /// Register a callback invoked on every transition
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback; returns `false` if it was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered callbacks
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Receive transitions asynchronously
    ///
    /// Dropping the receiver unsubscribes it.
    pub fn watch(&self) -> broadcast::Receiver<ConnectivityState> {
        self.inner.events.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
