//! Narrator - read long-form text aloud
//!
//! This library provides the narration pipeline:
//! - Text segmentation for the synthesis engine's request limit
//! - WAV splicing of per-chunk synthesis results
//! - A synthesis client for the local speech engine, plus a system-voice fallback
//! - A playback queue with lookahead synthesis and pause/seek/stop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Front end (narrate)                │
//! │   Passages  │  Settings  │  Commands  │  Events     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Playback queue                     │
//! │   Prefetch window  │  Play loop  │  Generations     │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │
//! ┌──────────▼──────────────┐   ┌──────────▼────────────┐
//! │   Synthesis client      │   │   Output              │
//! │   Segment │ Splice      │   │   Device │ System     │
//! │   HTTP backend          │   │   sink   │ voice      │
//! └─────────────────────────┘   └───────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod passage;
pub mod queue;
pub mod settings;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use passage::{OriginHandle, Passage, passages_from_text};
pub use queue::{
    EntryStatus, EventChannel, PlaybackQueue, QueueConfig, QueueEvent, QueueObserver, QueueState,
};
pub use settings::{SettingsStore, UserSettings};
pub use voice::{
    AudioSink, HttpBackend, SpeechRequest, Synthesize, SynthesisClient, SystemVoice, VoiceParams,
};
