//! Playback queue
//!
//! Owns the ordered passages of a narration session, synthesizes a small
//! window ahead of the play cursor and plays entries strictly in order
//! through the audio sink, or through the system voice when the speaker
//! selects it.
//!
//! Every (re)start of playback mints a generation. A play loop captures the
//! generation it was started under and, at each suspension point, exits
//! without side effects once the current generation differs or a stop was
//! requested. Synthesis in flight is never aborted: each fetch carries the
//! epoch it started under, and results arriving after the epoch moved on are
//! dropped.

mod entry;
mod events;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

pub use entry::EntryStatus;
pub use events::{EventChannel, NoopObserver, QueueEvent, QueueObserver};

use entry::{EntryState, QueueEntry};

use crate::voice::{AudioSink, Engine, SpeechRequest, Synthesize, SystemVoice, VoiceParams};
use crate::{Error, Passage};

/// Default number of entries synthesized ahead, cursor included
pub const DEFAULT_PREFETCH_WINDOW: usize = 2;

/// Default number of consecutive failed entries that halts playback
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: usize = 3;

/// Overall queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing playing
    Idle,
    /// Playback requested, waiting for the first audio
    Loading,
    /// An entry is playing
    Playing,
    /// Output suspended in place
    Paused,
}

/// Queue tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Entries synthesized ahead, starting at the cursor
    pub prefetch_window: usize,
    /// Consecutive failed entries that halt playback
    pub max_consecutive_errors: usize,
    /// Poll interval while waiting on an in-flight fetch
    pub fetch_poll_interval: Duration,
    /// Poll interval while paused
    pub pause_poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefetch_window: DEFAULT_PREFETCH_WINDOW,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            fetch_poll_interval: Duration::from_millis(50),
            pause_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Mutable queue state, guarded by one lock
struct Inner {
    entries: Vec<QueueEntry>,
    cursor: usize,
    params: Option<VoiceParams>,
    state: QueueState,
    generation: u64,
    fetch_epoch: u64,
    stop_requested: bool,
    pause_requested: bool,
}

impl Inner {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            params: None,
            state: QueueState::Idle,
            generation: 0,
            fetch_epoch: 0,
            stop_requested: false,
            pause_requested: false,
        }
    }

    const fn is_superseded(&self, generation: u64) -> bool {
        self.stop_requested || self.generation != generation
    }

    fn engine(&self) -> Engine {
        self.params.as_ref().map_or(Engine::Backend, VoiceParams::engine)
    }

    /// Move a pending entry to fetching and describe the work
    fn begin_fetch(&mut self, index: usize) -> Option<FetchJob> {
        let params = self.params.clone()?;
        let epoch = self.fetch_epoch;
        let entry = self.entries.get_mut(index)?;
        if !matches!(entry.state, EntryState::Pending) {
            return None;
        }

        entry.state = EntryState::Fetching { epoch };
        Some(FetchJob {
            index,
            epoch,
            params,
            passage: entry.passage.clone(),
        })
    }

    fn reset_entries(&mut self) {
        for entry in &mut self.entries {
            entry.state = EntryState::Pending;
        }
    }
}

/// A synthesis request detached from the lock
struct FetchJob {
    index: usize,
    epoch: u64,
    params: VoiceParams,
    passage: Passage,
}

/// How playing one entry ended
enum Outcome {
    Finished,
    Failed,
    Superseded,
}

struct Shared {
    inner: Mutex<Inner>,
    synthesizer: Arc<dyn Synthesize>,
    sink: Arc<dyn AudioSink>,
    voice: Option<Arc<dyn SystemVoice>>,
    observer: Arc<dyn QueueObserver>,
    config: QueueConfig,
}

/// Builds a [`PlaybackQueue`]
pub struct QueueBuilder {
    synthesizer: Arc<dyn Synthesize>,
    sink: Arc<dyn AudioSink>,
    voice: Option<Arc<dyn SystemVoice>>,
    observer: Arc<dyn QueueObserver>,
    config: QueueConfig,
}

impl QueueBuilder {
    /// Use `voice` for speakers selecting the system voice
    #[must_use]
    pub fn system_voice(mut self, voice: Arc<dyn SystemVoice>) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Deliver side effects to `observer`
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the default tuning
    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the queue
    #[must_use]
    pub fn build(self) -> PlaybackQueue {
        PlaybackQueue {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::new()),
                synthesizer: self.synthesizer,
                sink: self.sink,
                voice: self.voice,
                observer: self.observer,
                config: self.config,
            }),
        }
    }
}

/// Sequential narration of passages with lookahead synthesis
///
/// Cheap to clone; clones share the same queue. [`play`](Self::play) runs
/// until the queue ends or is superseded, so callers usually spawn it and
/// drive the other controls from elsewhere. Prefetching spawns Tokio tasks,
/// so the queue must be used inside a Tokio runtime.
#[derive(Clone)]
pub struct PlaybackQueue {
    shared: Arc<Shared>,
}

impl PlaybackQueue {
    /// Start building a queue over a synthesizer and an audio sink
    #[must_use]
    pub fn builder(synthesizer: Arc<dyn Synthesize>, sink: Arc<dyn AudioSink>) -> QueueBuilder {
        QueueBuilder {
            synthesizer,
            sink,
            voice: None,
            observer: Arc::new(NoopObserver),
            config: QueueConfig::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current queue state
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.lock().state
    }

    /// Play cursor
    #[must_use]
    pub fn index(&self) -> usize {
        self.lock().cursor
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no passages are loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Lifecycle status of the entry at `index`
    #[must_use]
    pub fn entry_status(&self, index: usize) -> Option<EntryStatus> {
        self.lock().entries.get(index).map(|e| e.state.status())
    }

    /// Current voice parameters
    #[must_use]
    pub fn params(&self) -> Option<VoiceParams> {
        self.lock().params.clone()
    }

    /// Replace the queue with `passages`, all pending, cursor at 0
    ///
    /// Any running playback is superseded.
    pub fn load(&self, passages: Vec<Passage>, params: VoiceParams) {
        let (count, was_paused) = {
            let mut inner = self.lock();
            inner.entries = passages.into_iter().map(QueueEntry::new).collect();
            inner.cursor = 0;
            inner.params = Some(params);
            inner.generation += 1;
            inner.fetch_epoch += 1;
            inner.stop_requested = false;
            (inner.entries.len(), std::mem::take(&mut inner.pause_requested))
        };

        self.silence(was_paused);
        self.set_state(QueueState::Idle);
        tracing::debug!(passages = count, "queue loaded");
    }

    /// Play from the cursor until the queue ends, halts or is superseded
    pub async fn play(&self) {
        let (generation, engine, was_paused) = {
            let mut inner = self.lock();
            if inner.params.is_none() || inner.entries.is_empty() {
                return;
            }
            inner.stop_requested = false;
            inner.generation += 1;
            (
                inner.generation,
                inner.engine(),
                std::mem::take(&mut inner.pause_requested),
            )
        };

        if was_paused {
            self.resume_output(engine);
        }

        tracing::debug!(generation, ?engine, "playback started");
        if !self.set_state_for(generation, QueueState::Loading) {
            return;
        }

        if engine == Engine::Backend {
            self.prefetch();
        }
        self.play_from(generation).await;
    }

    /// Suspend output in place
    pub fn pause(&self) {
        let engine = {
            let mut inner = self.lock();
            if matches!(inner.state, QueueState::Idle | QueueState::Paused) {
                return;
            }
            inner.pause_requested = true;
            inner.engine()
        };

        let result = match engine {
            Engine::Backend => self.shared.sink.suspend(),
            Engine::SystemVoice => self.shared.voice.as_ref().map_or(Ok(()), |v| v.pause()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to suspend output");
        }

        self.set_state(QueueState::Paused);
    }

    /// Continue after [`pause`](Self::pause)
    pub fn resume(&self) {
        let engine = {
            let mut inner = self.lock();
            if inner.state != QueueState::Paused {
                return;
            }
            inner.pause_requested = false;
            inner.engine()
        };

        self.resume_output(engine);
        self.set_state(QueueState::Playing);
    }

    /// Stop playback, reset every entry to pending and the cursor to 0
    pub fn stop(&self) {
        let was_paused = {
            let mut inner = self.lock();
            inner.stop_requested = true;
            inner.generation += 1;
            inner.fetch_epoch += 1;
            inner.cursor = 0;
            inner.reset_entries();
            std::mem::take(&mut inner.pause_requested)
        };

        self.silence(was_paused);
        self.set_state(QueueState::Idle);
    }

    /// Stop, then move the cursor to `index` clamped to the queue
    ///
    /// The queue is left idle; call [`play`](Self::play) to continue from there.
    pub fn seek_to(&self, index: usize) {
        self.stop();
        let mut inner = self.lock();
        inner.cursor = index.min(inner.entries.len().saturating_sub(1));
    }

    /// Replace the voice parameters
    ///
    /// Entries fetching or ready revert to pending so they are synthesized
    /// again; playing and done entries are left alone. Switching between
    /// the backend and the system voice supersedes playback and leaves the
    /// queue idle.
    pub fn update_params(&self, params: VoiceParams) {
        let new_engine = params.engine();
        let (engine_changed, was_paused, active) = {
            let mut inner = self.lock();
            let engine_changed = inner.params.is_some() && inner.engine() != new_engine;
            inner.params = Some(params);
            inner.fetch_epoch += 1;
            for entry in &mut inner.entries {
                if entry.state.is_synthesized_unplayed() {
                    entry.state = EntryState::Pending;
                }
            }

            let was_paused = if engine_changed {
                inner.generation += 1;
                std::mem::take(&mut inner.pause_requested)
            } else {
                false
            };
            (engine_changed, was_paused, inner.state != QueueState::Idle)
        };

        if engine_changed {
            tracing::info!(engine = ?new_engine, "voice engine switched, playback stopped");
            self.silence(was_paused);
            self.set_state(QueueState::Idle);
        } else if active && new_engine == Engine::Backend {
            self.prefetch();
        }
    }

    /// Start synthesizing pending entries in the window at the cursor
    ///
    /// Does nothing when the system voice is selected.
    pub fn prefetch(&self) {
        let jobs: Vec<FetchJob> = {
            let mut inner = self.lock();
            if inner.engine() != Engine::Backend {
                return;
            }
            let start = inner.cursor;
            let end = start
                .saturating_add(self.shared.config.prefetch_window)
                .min(inner.entries.len());
            (start..end).filter_map(|i| inner.begin_fetch(i)).collect()
        };

        for job in jobs {
            tracing::trace!(index = job.index, "prefetching");
            let queue = self.clone();
            tokio::spawn(async move { queue.run_fetch(job).await });
        }
    }

    /// Synthesize one entry and store the result if it is still wanted
    async fn run_fetch(&self, job: FetchJob) {
        let result = self
            .shared
            .synthesizer
            .synthesize(&job.params, &job.passage.text)
            .await;

        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(job.index) else {
            return;
        };
        if !entry.awaits_fetch(job.epoch) {
            tracing::debug!(index = job.index, "discarding stale synthesis result");
            return;
        }

        match result {
            Ok(audio) => {
                tracing::trace!(index = job.index, bytes = audio.len(), "entry ready");
                entry.state = EntryState::Ready(Arc::from(audio));
            }
            Err(e) if e.is_fatal() => {
                drop(inner);
                tracing::warn!(index = job.index, error = %e, "synthesis host gone, stopping queue");
                self.stop();
            }
            Err(e) => {
                entry.state = EntryState::Error;
                drop(inner);
                tracing::warn!(index = job.index, error = %e, "synthesis failed");
                self.shared.observer.on_entry_error(&job.passage, &e);
            }
        }
    }

    /// The play loop for one generation
    async fn play_from(&self, generation: u64) {
        let max_errors = self.shared.config.max_consecutive_errors;
        let mut index = self.lock().cursor;
        let mut consecutive_errors = 0;

        loop {
            if !self.wait_while_paused(generation).await {
                return;
            }

            let (status, engine) = {
                let inner = self.lock();
                if inner.is_superseded(generation) {
                    return;
                }
                match inner.entries.get(index) {
                    Some(entry) => (entry.state.status(), inner.engine()),
                    None => break,
                }
            };

            let outcome = match status {
                EntryStatus::Done => {
                    index += 1;
                    continue;
                }
                EntryStatus::Error => Outcome::Failed,
                _ => match engine {
                    Engine::Backend => self.play_with_sink(index, generation).await,
                    Engine::SystemVoice => self.play_with_system_voice(index, generation).await,
                },
            };

            match outcome {
                Outcome::Superseded => return,
                Outcome::Failed => {
                    consecutive_errors += 1;
                    if consecutive_errors >= max_errors {
                        tracing::warn!(
                            consecutive_errors,
                            "too many consecutive failures, halting playback"
                        );
                        self.set_state_for(generation, QueueState::Idle);
                        return;
                    }
                    index += 1;
                    continue;
                }
                Outcome::Finished => consecutive_errors = 0,
            }

            if !self.wait_while_paused(generation).await {
                return;
            }

            let passage = {
                let mut inner = self.lock();
                if inner.is_superseded(generation) {
                    return;
                }
                let last = inner.entries.len().saturating_sub(1);
                inner.cursor = (index + 1).min(last);
                let entry = &mut inner.entries[index];
                entry.state = EntryState::Done;
                entry.passage.clone()
            };
            if !self.notify_current(generation, |o| o.on_passage_ended(&passage)) {
                return;
            }
            index += 1;

            if engine == Engine::Backend {
                self.prefetch();
            }
        }

        if self.set_state_for(generation, QueueState::Idle) {
            tracing::debug!(generation, "queue finished");
            self.notify_current(generation, |o| o.on_queue_ended());
        }
    }

    /// Wait for the entry's audio, then play it through the sink
    async fn play_with_sink(&self, index: usize, generation: u64) -> Outcome {
        let audio = loop {
            let job = {
                let mut inner = self.lock();
                if inner.is_superseded(generation) {
                    return Outcome::Superseded;
                }
                match inner.entries[index].state.status() {
                    EntryStatus::Error => return Outcome::Failed,
                    EntryStatus::Done => return Outcome::Finished,
                    EntryStatus::Fetching => None,
                    EntryStatus::Pending => inner.begin_fetch(index),
                    EntryStatus::Ready | EntryStatus::Playing => {
                        match &inner.entries[index].state {
                            EntryState::Ready(audio) | EntryState::Playing(Some(audio)) => {
                                break Arc::clone(audio);
                            }
                            // Spoken by the system voice before an engine switch
                            _ => {
                                inner.entries[index].state = EntryState::Pending;
                                inner.begin_fetch(index)
                            }
                        }
                    }
                }
            };

            match job {
                Some(job) => self.run_fetch(job).await,
                None => tokio::time::sleep(self.shared.config.fetch_poll_interval).await,
            }
        };

        let (passage, paused) = {
            let mut inner = self.lock();
            if inner.is_superseded(generation) {
                return Outcome::Superseded;
            }
            inner.cursor = index;
            let paused = inner.pause_requested;
            if !paused {
                inner.state = QueueState::Playing;
            }
            let entry = &mut inner.entries[index];
            entry.state = EntryState::Playing(Some(Arc::clone(&audio)));
            (entry.passage.clone(), paused)
        };

        if !self.announce_start(generation, &passage, paused) {
            return Outcome::Superseded;
        }

        let result = self.shared.sink.play(audio).await;
        if self.is_superseded(generation) {
            return Outcome::Superseded;
        }

        match result {
            Ok(()) => Outcome::Finished,
            Err(e) => self.fail_entry(index, generation, &e),
        }
    }

    /// Speak the entry with the system voice; synthesis and playback in one step
    async fn play_with_system_voice(&self, index: usize, generation: u64) -> Outcome {
        let (request, passage, paused) = {
            let mut inner = self.lock();
            if inner.is_superseded(generation) {
                return Outcome::Superseded;
            }
            let Some(params) = inner.params.clone() else {
                return Outcome::Superseded;
            };
            inner.cursor = index;
            let paused = inner.pause_requested;
            if !paused {
                inner.state = QueueState::Playing;
            }
            let entry = &mut inner.entries[index];
            entry.state = EntryState::Playing(None);
            (
                SpeechRequest::from_params(&params, &entry.passage.text),
                entry.passage.clone(),
                paused,
            )
        };

        if !self.announce_start(generation, &passage, paused) {
            return Outcome::Superseded;
        }

        let result = match &self.shared.voice {
            Some(voice) => voice.speak(&request).await,
            None => Err(Error::Speech("no system voice available".to_string())),
        };
        if self.is_superseded(generation) {
            return Outcome::Superseded;
        }

        match result {
            Ok(()) => Outcome::Finished,
            Err(e) => self.fail_entry(index, generation, &e),
        }
    }

    /// Mark the entry failed and report it, unless `generation` is stale
    fn fail_entry(&self, index: usize, generation: u64, error: &Error) -> Outcome {
        let passage = {
            let mut inner = self.lock();
            if inner.is_superseded(generation) {
                return Outcome::Superseded;
            }
            if error.is_fatal() {
                None
            } else {
                let Some(entry) = inner.entries.get_mut(index) else {
                    return Outcome::Superseded;
                };
                entry.state = EntryState::Error;
                Some(entry.passage.clone())
            }
        };

        let Some(passage) = passage else {
            tracing::warn!(index, error = %error, "host gone, stopping queue");
            self.stop();
            return Outcome::Superseded;
        };

        tracing::warn!(index, error = %error, "passage failed");
        if self.notify_current(generation, |o| o.on_entry_error(&passage, error)) {
            Outcome::Failed
        } else {
            Outcome::Superseded
        }
    }

    /// Report the start of a passage; `false` once `generation` is stale
    ///
    /// The queue state was already set under the lock. Observers may call
    /// back into the queue; each notification re-checks the generation.
    fn announce_start(&self, generation: u64, passage: &Passage, paused: bool) -> bool {
        if !paused
            && !self.notify_current(generation, |o| o.on_state_changed(QueueState::Playing))
        {
            return false;
        }
        self.notify_current(generation, |o| o.on_passage_started(passage))
    }

    /// Deliver one observer callback if `generation` is still current
    fn notify_current(&self, generation: u64, notify: impl FnOnce(&dyn QueueObserver)) -> bool {
        if self.is_superseded(generation) {
            return false;
        }
        notify(self.shared.observer.as_ref());
        true
    }

    /// Block while paused; `false` once this generation is superseded
    async fn wait_while_paused(&self, generation: u64) -> bool {
        loop {
            {
                let inner = self.lock();
                if inner.is_superseded(generation) {
                    return false;
                }
                if !inner.pause_requested {
                    return true;
                }
            }
            tokio::time::sleep(self.shared.config.pause_poll_interval).await;
        }
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.lock().is_superseded(generation)
    }

    fn set_state(&self, state: QueueState) {
        self.lock().state = state;
        self.shared.observer.on_state_changed(state);
    }

    /// [`set_state`](Self::set_state) on behalf of a play loop; `false` once
    /// `generation` is stale, in which case nothing changes
    fn set_state_for(&self, generation: u64, state: QueueState) -> bool {
        {
            let mut inner = self.lock();
            if inner.is_superseded(generation) {
                return false;
            }
            inner.state = state;
        }
        self.shared.observer.on_state_changed(state);
        true
    }

    fn resume_output(&self, engine: Engine) {
        let result = match engine {
            Engine::Backend => self.shared.sink.resume(),
            Engine::SystemVoice => self.shared.voice.as_ref().map_or(Ok(()), |v| v.resume()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to resume output");
        }
    }

    /// Stop whatever is sounding on either engine
    fn silence(&self, resume_output: bool) {
        self.shared.sink.stop();
        if let Some(voice) = &self.shared.voice {
            voice.cancel();
        }

        if resume_output {
            self.resume_output(Engine::Backend);
            self.resume_output(Engine::SystemVoice);
        }
    }
}
