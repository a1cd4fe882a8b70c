//! Voice processing module
//!
//! Turns passage text into audio and renders it: segmentation, synthesis
//! through the backend, WAV splicing, device playback and the system-native
//! voice fallback.

mod client;
mod playback;
mod segment;
mod splice;
mod system;
mod tts;

use serde::{Deserialize, Serialize};

pub use client::{Synthesize, SynthesisBackend, SynthesisClient};
pub use playback::{AudioSink, DevicePlayback};
pub use segment::{DEFAULT_MAX_CHUNK_CHARS, segment_text};
pub use splice::{WAV_HEADER_LEN, WavFormat, splice_wav};
pub use system::{CommandVoice, SystemVoice};
pub use tts::{DEFAULT_BACKEND_URL, HttpBackend, Speaker, SpeakerStyle};

/// Speaker UUID prefix selecting the system-native voice
pub const SYSTEM_VOICE_PREFIX: &str = "system:";

/// Which engine renders a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Synthesis backend returning encoded audio, played through an [`AudioSink`]
    Backend,
    /// System-native voice that synthesizes and plays in one step
    SystemVoice,
}

/// How to synthesize speech
///
/// Serialized in camelCase, which is the request body shape the synthesis
/// backend expects (minus the `text` field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoiceParams {
    /// Speaker identity; `system:<name>` selects the system voice
    pub speaker_uuid: String,
    /// Speaker style
    pub style_id: i64,
    /// Speech rate multiplier
    pub speed_scale: f64,
    /// Volume multiplier
    pub volume_scale: f64,
    /// Pitch offset
    pub pitch_scale: f64,
    /// Intonation strength
    pub intonation_scale: f64,
    /// Leading silence, in seconds
    pub pre_phoneme_length: f64,
    /// Trailing silence, in seconds
    pub post_phoneme_length: f64,
    /// Output sample rate in Hz
    pub output_sampling_rate: u32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            speaker_uuid: String::new(),
            style_id: 0,
            speed_scale: 1.0,
            volume_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
            pre_phoneme_length: 0.1,
            post_phoneme_length: 0.1,
            output_sampling_rate: 24000,
        }
    }
}

impl VoiceParams {
    /// Engine selected by the speaker UUID
    #[must_use]
    pub fn engine(&self) -> Engine {
        if self.system_voice_name().is_some() {
            Engine::SystemVoice
        } else {
            Engine::Backend
        }
    }

    /// Name of the system voice, when the speaker UUID selects one
    #[must_use]
    pub fn system_voice_name(&self) -> Option<&str> {
        self.speaker_uuid.strip_prefix(SYSTEM_VOICE_PREFIX)
    }
}

/// A request to the system-native voice, with parameters translated to its scales
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak
    pub text: String,
    /// Voice name; empty for the platform default
    pub voice_name: String,
    /// Rate multiplier (0.1 to 10)
    pub rate: f64,
    /// Volume (0 to 1)
    pub volume: f64,
    /// Pitch (0 to 2, 1 is neutral)
    pub pitch: f64,
}

impl SpeechRequest {
    /// Translate backend-scale voice parameters into a system voice request
    #[must_use]
    pub fn from_params(params: &VoiceParams, text: &str) -> Self {
        Self {
            text: text.to_string(),
            voice_name: params.system_voice_name().unwrap_or_default().to_string(),
            rate: params.speed_scale.clamp(0.1, 10.0),
            volume: (params.volume_scale / 2.0).clamp(0.0, 1.0),
            pitch: params.pitch_scale.mul_add(5.0, 1.0).clamp(0.0, 2.0),
        }
    }
}
