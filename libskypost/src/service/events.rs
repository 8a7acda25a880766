//! Progress events
//!
//! An in-process broadcast bus. Emitting never blocks: with no subscribers the
//! event is dropped, and a lagging subscriber loses the oldest events.
//!
//! ```no_run
//! use libskypost::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PublishStarted {
//!     post_id: "5".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// What happened to a post or the session
///
/// Events never carry tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PublishStarted {
        post_id: String,
    },

    SessionRefreshed {
        actor_id: String,
    },

    /// Session refresh failed outside a publish (timer or manual)
    RefreshFailed {
        error: String,
    },

    PublishSent {
        post_id: String,
        record_uri: String,
    },

    /// The write call was made and did not succeed
    PublishFailed {
        post_id: String,
        error: String,
    },

    /// Given up before the write call
    PublishAborted {
        post_id: String,
        reason: String,
    },
}

impl Event {
    pub fn post_id(&self) -> Option<&str> {
        match self {
            Event::PublishStarted { post_id }
            | Event::PublishSent { post_id, .. }
            | Event::PublishFailed { post_id, .. }
            | Event::PublishAborted { post_id, .. } => Some(post_id),
            Event::SessionRefreshed { .. } | Event::RefreshFailed { .. } => None,
        }
    }
}
