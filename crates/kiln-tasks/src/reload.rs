//! Live-reload notification channel

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of buffered events per subscriber
const DEFAULT_CAPACITY: usize = 64;

/// A push notification for connected browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadEvent {
    /// Swap the listed stylesheets in place
    Inject { paths: Vec<String> },
    /// Reload the whole page
    Reload,
}

/// Broadcast channel for live-reload events.
///
/// Cloning shares the channel. Sending without subscribers is not an error.
#[derive(Debug, Clone)]
pub struct ReloadChannel {
    sender: broadcast::Sender<ReloadEvent>,
}

impl ReloadChannel {
    /// Create a channel with the default buffer size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a channel buffering `capacity` events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.sender.subscribe()
    }

    /// Number of connected subscribers
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send an event, returning how many subscribers received it
    pub fn notify(&self, event: ReloadEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "no live-reload subscribers");
                0
            }
        }
    }

    /// Ask clients for a full page reload
    pub fn reload(&self) -> usize {
        self.notify(ReloadEvent::Reload)
    }

    /// Notify clients about rebuilt files; stylesheets are injected, anything
    /// else triggers a full reload
    pub fn changed(&self, paths: Vec<String>) -> usize {
        if paths.is_empty() {
            return 0;
        }
        if paths.iter().all(|p| p.to_ascii_lowercase().ends_with(".css")) {
            self.notify(ReloadEvent::Inject { paths })
        } else {
            self.reload()
        }
    }
}

impl Default for ReloadChannel {
    fn default() -> Self {
        Self::new()
    }
}
