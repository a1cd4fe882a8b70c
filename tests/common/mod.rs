//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use narrator::voice::{SynthesisBackend, SystemVoice};
use narrator::{
    AudioSink, Error, EventChannel, OriginHandle, Passage, PlaybackQueue, QueueConfig, QueueEvent,
    Result, SpeechRequest, Synthesize, VoiceParams,
};

/// How long any single wait may take before the test fails
pub const WAIT_LIMIT: Duration = Duration::from_secs(2);

const TICK: Duration = Duration::from_millis(2);

/// Encode 16-bit mono samples as a WAV file
#[must_use]
pub fn wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
    for &s in samples {
        writer.write_sample(s).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    cursor.into_inner()
}

/// Number of samples in a WAV file
#[must_use]
pub fn wav_duration(bytes: &[u8]) -> u32 {
    hound::WavReader::new(Cursor::new(bytes))
        .expect("valid wav")
        .duration()
}

/// Passages with origins equal to their index
#[must_use]
pub fn passages(texts: &[&str]) -> Vec<Passage> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Passage::new(*text, OriginHandle(i as u64), i))
        .collect()
}

/// Parameters selecting the synthesis backend
#[must_use]
pub fn backend_params() -> VoiceParams {
    VoiceParams {
        speaker_uuid: "3c37646f-3881-5374-2a83-149267990abc".to_string(),
        ..VoiceParams::default()
    }
}

/// Parameters selecting the system voice
#[must_use]
pub fn system_params() -> VoiceParams {
    VoiceParams {
        speaker_uuid: "system:Kyoko".to_string(),
        ..VoiceParams::default()
    }
}

/// Queue tuning with short poll intervals
#[must_use]
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        fetch_poll_interval: TICK,
        pause_poll_interval: TICK,
        ..QueueConfig::default()
    }
}

/// Poll `cond` until it holds
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !cond() {
            tokio::time::sleep(TICK).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Events received so far, without state changes
pub fn drain_events(rx: &mut UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if !matches!(event, QueueEvent::StateChanged(_)) {
            events.push(event);
        }
    }
    events
}

/// Receive events, without state changes, up to and including the queue end
pub async fn events_until_end(rx: &mut UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
    tokio::time::timeout(WAIT_LIMIT, async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                QueueEvent::StateChanged(_) => {}
                QueueEvent::QueueEnded => {
                    events.push(event);
                    break;
                }
                other => events.push(other),
            }
        }
        events
    })
    .await
    .expect("queue did not end in time")
}

/// Wait while a gate flag is raised
async fn wait_gate(gate: &AtomicBool) {
    while gate.load(Ordering::SeqCst) {
        tokio::time::sleep(TICK).await;
    }
}

/// Synthesizer answering every passage with a short WAV
#[derive(Default)]
pub struct MockSynth {
    failing: HashSet<String>,
    invalidating: HashSet<String>,
    held: AtomicBool,
    calls: Mutex<Vec<(String, f64)>>,
    finished: AtomicUsize,
}

impl MockSynth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail synthesis of these passages
    #[must_use]
    pub fn failing(mut self, texts: &[&str]) -> Self {
        self.failing = texts.iter().map(ToString::to_string).collect();
        self
    }

    /// Report the host context as gone for these passages
    #[must_use]
    pub fn invalidating(mut self, texts: &[&str]) -> Self {
        self.invalidating = texts.iter().map(ToString::to_string).collect();
        self
    }

    /// Keep requests in flight until [`release`](Self::release)
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    /// Texts requested so far, with the speed they were requested at
    #[must_use]
    pub fn calls(&self) -> Vec<(String, f64)> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts requested so far
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|(text, _)| text).collect()
    }

    /// Requests that have completed
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesize for MockSynth {
    async fn synthesize(&self, params: &VoiceParams, text: &str) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), params.speed_scale));
        wait_gate(&self.held).await;
        self.finished.fetch_add(1, Ordering::SeqCst);

        if self.invalidating.contains(text) {
            return Err(Error::HostContextInvalidated);
        }
        if self.failing.contains(text) {
            return Err(Error::BackendError {
                status: 500,
                body: format!("cannot synthesize {text}"),
            });
        }
        Ok(wav(&[0, 1, 2, 3], 24000))
    }
}

/// Backend answering each chunk with one sample per character
#[derive(Default)]
pub struct MockBackend {
    fail_on_call: Option<usize>,
    chunks: Mutex<Vec<String>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th request (1-based)
    #[must_use]
    pub fn failing_on_call(n: usize) -> Self {
        Self {
            fail_on_call: Some(n),
            ..Self::default()
        }
    }

    /// Chunk texts requested so far, in order
    #[must_use]
    pub fn chunks(&self) -> Vec<String> {
        self.chunks.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisBackend for MockBackend {
    async fn synthesize_chunk(&self, _params: &VoiceParams, text: &str) -> Result<Vec<u8>> {
        let call = {
            let mut chunks = self.chunks.lock().unwrap();
            chunks.push(text.to_string());
            chunks.len()
        };
        if self.fail_on_call == Some(call) {
            return Err(Error::BackendUnreachable("connection refused".to_string()));
        }
        Ok(wav(&vec![100; text.chars().count()], 24000))
    }
}

/// Sink that "plays" until released or stopped
#[derive(Default)]
pub struct MockSink {
    held: AtomicBool,
    suspended: AtomicBool,
    fail: AtomicBool,
    stops: AtomicUsize,
    played: AtomicUsize,
}

impl MockSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep sounds playing until [`release`](Self::release)
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    /// Make every play fail
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for MockSink {
    async fn play(&self, _audio: Arc<[u8]>) -> Result<()> {
        let stops_at_start = self.stops();
        self.played.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Audio("device unplugged".to_string()));
        }

        loop {
            if self.stops() != stops_at_start {
                return Ok(());
            }
            if !self.held.load(Ordering::SeqCst) && !self.is_suspended() {
                return Ok(());
            }
            tokio::time::sleep(TICK).await;
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn suspend(&self) -> Result<()> {
        self.suspended.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// System voice that records what it was asked to say
#[derive(Default)]
pub struct MockVoice {
    held: AtomicBool,
    paused: AtomicBool,
    fail: AtomicBool,
    cancels: AtomicUsize,
    spoken: Mutex<Vec<SpeechRequest>>,
}

impl MockVoice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    /// Make every utterance fail
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<SpeechRequest> {
        self.spoken.lock().unwrap().clone()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SystemVoice for MockVoice {
    async fn speak(&self, request: &SpeechRequest) -> Result<()> {
        let cancels_at_start = self.cancels.load(Ordering::SeqCst);
        self.spoken.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Speech("no such voice".to_string()));
        }

        loop {
            if self.cancels.load(Ordering::SeqCst) != cancels_at_start {
                return Ok(());
            }
            if !self.held.load(Ordering::SeqCst) && !self.is_paused() {
                return Ok(());
            }
            tokio::time::sleep(TICK).await;
        }
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A queue wired to mocks
pub struct Harness {
    pub queue: PlaybackQueue,
    pub synth: Arc<MockSynth>,
    pub sink: Arc<MockSink>,
    pub voice: Arc<MockVoice>,
    pub events: UnboundedReceiver<QueueEvent>,
}

impl Harness {
    #[must_use]
    pub fn new(synth: MockSynth) -> Self {
        let synth = Arc::new(synth);
        let sink = Arc::new(MockSink::new());
        let voice = Arc::new(MockVoice::new());
        let (observer, events) = EventChannel::new();

        let queue = PlaybackQueue::builder(synth.clone(), sink.clone())
            .system_voice(voice.clone())
            .observer(Arc::new(observer))
            .config(fast_config())
            .build();

        Self {
            queue,
            synth,
            sink,
            voice,
            events,
        }
    }

    /// Run playback on its own task
    pub fn spawn_play(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        tokio::spawn(async move { queue.play().await })
    }
}
