//! Text-to-speech (TTS) backend over HTTP
//!
//! Talks to a local synthesis engine exposing `/v1/synthesis` and
//! `/v1/speakers`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{SynthesisBackend, VoiceParams};
use crate::{Error, Result};

/// Default synthesis engine URL
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:50032";

/// A speaker offered by the synthesis engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speaker {
    /// Display name
    pub speaker_name: String,
    /// Identity passed back as [`VoiceParams::speaker_uuid`]
    pub speaker_uuid: String,
    /// Available styles
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

/// One style of a [`Speaker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerStyle {
    /// Display name
    pub style_name: String,
    /// Identity passed back as [`VoiceParams::style_id`]
    pub style_id: i64,
}

/// Synthesizes speech through the engine's REST API
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    speakers: RwLock<Option<Vec<Speaker>>>,
}

impl HttpBackend {
    /// Create a backend for the engine at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(Error::Config("synthesis backend URL required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            speakers: RwLock::new(None),
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List speakers, fetching them on first use
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be reached or answers with an error
    pub async fn speakers(&self) -> Result<Vec<Speaker>> {
        {
            let cached = self.speakers.read().await;
            if let Some(speakers) = cached.as_ref() {
                return Ok(speakers.clone());
            }
        }

        let mut cache = self.speakers.write().await;
        if let Some(speakers) = cache.as_ref() {
            return Ok(speakers.clone());
        }
        let speakers = self.fetch_speakers().await?;
        *cache = Some(speakers.clone());
        Ok(speakers)
    }

    /// Drop the cached speaker list and fetch it again
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be reached or answers with an error
    pub async fn reload_speakers(&self) -> Result<Vec<Speaker>> {
        let mut cache = self.speakers.write().await;
        *cache = None;
        let speakers = self.fetch_speakers().await?;
        *cache = Some(speakers.clone());
        Ok(speakers)
    }

    async fn fetch_speakers(&self) -> Result<Vec<Speaker>> {
        let response = self
            .client
            .get(format!("{}/v1/speakers", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let speakers: Vec<Speaker> = response.json().await?;
        tracing::debug!(count = speakers.len(), "fetched speakers");
        Ok(speakers)
    }
}

#[async_trait]
impl SynthesisBackend for HttpBackend {
    async fn synthesize_chunk(&self, params: &VoiceParams, text: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SynthesisRequest<'a> {
            #[serde(flatten)]
            params: &'a VoiceParams,
            text: &'a str,
        }

        let response = self
            .client
            .post(format!("{}/v1/synthesis", self.base_url))
            .json(&SynthesisRequest { params, text })
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let audio = response.bytes().await?;
        tracing::trace!(bytes = audio.len(), chars = text.chars().count(), "chunk audio received");
        Ok(audio.to_vec())
    }
}

/// Map a send failure; connection and timeout failures mean the engine is unreachable
fn transport_error(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::BackendUnreachable(e.to_string())
    } else {
        Error::Http(e)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::BackendError { status, body })
}
