//! Synthesis client: segmentation, sequential chunk synthesis and splicing

use std::sync::Arc;

use async_trait::async_trait;

use super::{VoiceParams, segment_text, splice_wav};
use crate::Result;

/// One request/response exchange with a synthesis backend
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize a single chunk that already fits the backend's input limit
    ///
    /// Returns WAV bytes.
    async fn synthesize_chunk(&self, params: &VoiceParams, text: &str) -> Result<Vec<u8>>;
}

/// Whole-passage synthesis, as consumed by the playback queue
#[async_trait]
pub trait Synthesize: Send + Sync {
    /// Synthesize `text` of any length into one playable WAV
    async fn synthesize(&self, params: &VoiceParams, text: &str) -> Result<Vec<u8>>;
}

/// Segments passages and splices the per-chunk audio
pub struct SynthesisClient {
    backend: Arc<dyn SynthesisBackend>,
    max_chunk_chars: usize,
}

impl SynthesisClient {
    /// Create a client over `backend` cutting text at `max_chunk_chars`
    #[must_use]
    pub fn new(backend: Arc<dyn SynthesisBackend>, max_chunk_chars: usize) -> Self {
        Self {
            backend,
            max_chunk_chars,
        }
    }

    /// Maximum characters sent per backend request
    #[must_use]
    pub const fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }
}

#[async_trait]
impl Synthesize for SynthesisClient {
    async fn synthesize(&self, params: &VoiceParams, text: &str) -> Result<Vec<u8>> {
        let chunks = segment_text(text, self.max_chunk_chars);

        if let [only] = chunks.as_slice() {
            return self.backend.synthesize_chunk(params, only).await;
        }

        tracing::debug!(
            chunks = chunks.len(),
            chars = text.chars().count(),
            "synthesizing passage in chunks"
        );

        // Strictly in order, one request at a time
        let mut buffers = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let audio = self.backend.synthesize_chunk(params, chunk).await?;
            tracing::trace!(chunk = i, bytes = audio.len(), "chunk synthesized");
            buffers.push(audio);
        }

        splice_wav(&buffers)
    }
}
