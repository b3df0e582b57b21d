//! Persistence trigger.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

/// Requests a durable save of the user profile. Fire-and-forget.
pub trait SaveRequester: Send + Sync {
    /// Ask for the profile to be saved. Never blocks.
    fn request_save(&self);
}

/// Counts save requests without saving anything.
#[derive(Debug, Default)]
pub struct SaveCounter {
    requests: AtomicUsize,
}

impl SaveCounter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves requested so far.
    pub fn count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl SaveRequester for SaveCounter {
    fn request_save(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }
}

/// A save request forwarded to the persistence task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRequest;

/// Forwards save requests to a persistence task over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSaver {
    sender: mpsc::UnboundedSender<SaveRequest>,
}

impl ChannelSaver {
    /// Create the saver and the receiving end for the persistence task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SaveRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl SaveRequester for ChannelSaver {
    fn request_save(&self) {
        if self.sender.send(SaveRequest).is_err() {
            warn!("Save requested but the persistence task is gone");
        }
    }
}
