//! Queue entry lifecycle

use std::sync::Arc;

use serde::Serialize;

use crate::Passage;

/// Lifecycle of one queue entry
///
/// Audio lives inside the variants that own it, so a `Pending` or `Done`
/// entry cannot hold a stale payload.
#[derive(Debug, Clone)]
pub(crate) enum EntryState {
    /// Not yet synthesized
    Pending,
    /// Synthesis in flight, started under this fetch epoch
    Fetching { epoch: u64 },
    /// Synthesized, waiting to be played
    Ready(Arc<[u8]>),
    /// Handed to the sink (backend mode) or being spoken (system voice, no audio)
    Playing(Option<Arc<[u8]>>),
    /// Finished playing
    Done,
    /// Synthesis or playback failed
    Error,
}

impl EntryState {
    pub(crate) const fn status(&self) -> EntryStatus {
        match self {
            Self::Pending => EntryStatus::Pending,
            Self::Fetching { .. } => EntryStatus::Fetching,
            Self::Ready(_) => EntryStatus::Ready,
            Self::Playing(_) => EntryStatus::Playing,
            Self::Done => EntryStatus::Done,
            Self::Error => EntryStatus::Error,
        }
    }

    /// Whether synthesized audio would be stale under new voice parameters
    pub(crate) const fn is_synthesized_unplayed(&self) -> bool {
        matches!(self, Self::Fetching { .. } | Self::Ready(_))
    }
}

/// Payload-free view of an entry's lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Not yet synthesized
    Pending,
    /// Synthesis in flight
    Fetching,
    /// Synthesized, waiting to be played
    Ready,
    /// Currently playing
    Playing,
    /// Finished playing
    Done,
    /// Synthesis or playback failed
    Error,
}

/// One passage and its lifecycle state
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub(crate) passage: Passage,
    pub(crate) state: EntryState,
}

impl QueueEntry {
    pub(crate) const fn new(passage: Passage) -> Self {
        Self {
            passage,
            state: EntryState::Pending,
        }
    }

    /// Whether a fetch started under `epoch` may still store its result here
    pub(crate) const fn awaits_fetch(&self, epoch: u64) -> bool {
        matches!(self.state, EntryState::Fetching { epoch: e } if e == epoch)
    }
}
