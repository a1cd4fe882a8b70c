//! Observable queue events

use tokio::sync::mpsc;

use super::QueueState;
use crate::{Error, Passage};

/// Receives the queue's side effects
///
/// Callbacks run on the task driving the queue and must not block. They may
/// call back into the queue.
pub trait QueueObserver: Send + Sync {
    /// A passage started playing
    fn on_passage_started(&self, _passage: &Passage) {}

    /// A passage finished playing
    fn on_passage_ended(&self, _passage: &Passage) {}

    /// Every passage has been played
    fn on_queue_ended(&self) {}

    /// Synthesis or playback failed for one passage
    fn on_entry_error(&self, _passage: &Passage, _error: &Error) {}

    /// The queue changed state
    fn on_state_changed(&self, _state: QueueState) {}
}

/// Observer that ignores every event
#[derive(Debug, Default)]
pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

/// A queue side effect, as delivered by [`EventChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A passage started playing
    PassageStarted(Passage),
    /// A passage finished playing
    PassageEnded(Passage),
    /// Every passage has been played
    QueueEnded,
    /// Synthesis or playback failed for one passage
    EntryError {
        /// The failed passage
        passage: Passage,
        /// Rendered error
        message: String,
    },
    /// The queue changed state
    StateChanged(QueueState),
}

/// Observer forwarding events into a channel
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl EventChannel {
    /// Create an observer and the receiver its events arrive on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: QueueEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

impl QueueObserver for EventChannel {
    fn on_passage_started(&self, passage: &Passage) {
        self.send(QueueEvent::PassageStarted(passage.clone()));
    }

    fn on_passage_ended(&self, passage: &Passage) {
        self.send(QueueEvent::PassageEnded(passage.clone()));
    }

    fn on_queue_ended(&self) {
        self.send(QueueEvent::QueueEnded);
    }

    fn on_entry_error(&self, passage: &Passage, error: &Error) {
        self.send(QueueEvent::EntryError {
            passage: passage.clone(),
            message: error.to_string(),
        });
    }

    fn on_state_changed(&self, state: QueueState) {
        self.send(QueueEvent::StateChanged(state));
    }
}
