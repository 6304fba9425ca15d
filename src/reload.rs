//! Live-reload broadcaster.
//!
//! A single [`ReloadSignal`] is created per process and handed by reference to
//! every task. Tasks call [`ReloadSignal::notify`] after writing output; the
//! dev server subscribes and forwards events to browsers over SSE.

use crate::asset::AssetClass;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow clients skip missed events.
const CHANNEL_CAPACITY: usize = 64;

/// Event sent to connected browsers after a task wrote output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadEvent {
    /// Class whose task produced the output
    pub class: AssetClass,
    /// Written files, relative to the served root
    pub paths: Vec<PathBuf>,
    /// True when only stylesheets changed and the page can keep its state
    pub css_only: bool,
}

/// Process-wide live-reload broadcaster.
#[derive(Debug, Clone)]
pub struct ReloadSignal {
    tx: broadcast::Sender<ReloadEvent>,
}

impl ReloadSignal {
    /// Create a broadcaster with no connected clients.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Notify connected clients that `class` wrote `paths`.
    ///
    /// Returns the number of clients that received the event. Having no
    /// clients connected is not an error.
    pub fn notify(&self, class: AssetClass, paths: Vec<PathBuf>) -> usize {
        let event = ReloadEvent { class, paths, css_only: class == AssetClass::Styles };
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(task = %class, clients = receivers, "reload signal sent");
                receivers
            }
            Err(_) => 0,
        }
    }

    /// Subscribe to reload events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    /// Number of currently subscribed clients.
    pub fn connections(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_clients() {
        let signal = ReloadSignal::new();
        assert_eq!(signal.connections(), 0);
        assert_eq!(signal.notify(AssetClass::Templates, vec![]), 0);
    }

    #[test]
    fn test_subscriber_receives_event() {
        let signal = ReloadSignal::new();
        let mut rx = signal.subscribe();
        assert_eq!(signal.connections(), 1);

        let delivered = signal.notify(AssetClass::Styles, vec![PathBuf::from("styles/main.css")]);
        assert_eq!(delivered, 1);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.class, AssetClass::Styles);
        assert!(event.css_only);
        assert_eq!(event.paths, vec![PathBuf::from("styles/main.css")]);
    }

    #[test]
    fn test_non_style_events_reload_page() {
        let signal = ReloadSignal::new();
        let mut rx = signal.subscribe();
        signal.notify(AssetClass::Scripts, vec![]);
        assert!(!rx.try_recv().unwrap().css_only);
    }

    #[test]
    fn test_clones_share_channel() {
        let signal = ReloadSignal::new();
        let clone = signal.clone();
        let mut rx = signal.subscribe();
        clone.notify(AssetClass::Templates, vec![]);
        assert_eq!(rx.try_recv().unwrap().class, AssetClass::Templates);
    }

    #[test]
    fn test_event_serializes_class_lowercase() {
        let event =
            ReloadEvent { class: AssetClass::Styles, paths: vec![], css_only: true };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"class\":\"styles\""));
    }
}
