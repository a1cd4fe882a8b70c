//! WAV splicing
//!
//! Multi-chunk passages come back from the backend as several WAV files.
//! They are joined into one by keeping the first header, appending every
//! PCM payload and patching the two size fields.

use crate::{Error, Result};

/// Length of the canonical RIFF/WAVE header preceding the PCM payload
pub const WAV_HEADER_LEN: usize = 44;

/// Offset of the RIFF chunk size (file length minus 8)
const RIFF_SIZE_OFFSET: usize = 4;

/// Header bytes counted by the RIFF chunk size
const RIFF_HEADER_REMAINDER: u32 = 36;

/// Offset of the `data` chunk size (payload length)
const DATA_SIZE_OFFSET: usize = 40;

/// Format fields read from a canonical WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Number of interleaved channels
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl WavFormat {
    /// Read the format fields of a canonical 44-byte header
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleFormat` if the buffer is shorter than a header
    /// or does not start with a RIFF/WAVE signature
    pub fn parse(wav: &[u8]) -> Result<Self> {
        if wav.len() < WAV_HEADER_LEN {
            return Err(Error::IncompatibleFormat(format!(
                "buffer of {} bytes is shorter than a WAV header",
                wav.len()
            )));
        }
        if &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
            return Err(Error::IncompatibleFormat(
                "missing RIFF/WAVE signature".to_string(),
            ));
        }

        Ok(Self {
            channels: read_u16(wav, 22),
            sample_rate: read_u32(wav, 24),
            bits_per_sample: read_u16(wav, 34),
        })
    }
}

/// Concatenate WAV buffers into one playable WAV
///
/// A single buffer is returned unchanged. Otherwise the first header is
/// copied verbatim apart from its two size fields, which are rewritten to
/// cover the summed payload.
///
/// # Errors
///
/// Returns `IncompatibleFormat` if no buffers are given, a buffer is not a
/// canonical WAV, or the buffers disagree on channels, sample rate or bit
/// depth
pub fn splice_wav<B: AsRef<[u8]>>(buffers: &[B]) -> Result<Vec<u8>> {
    let Some(first) = buffers.first() else {
        return Err(Error::IncompatibleFormat("nothing to splice".to_string()));
    };
    let first = first.as_ref();

    if buffers.len() == 1 {
        return Ok(first.to_vec());
    }

    let format = WavFormat::parse(first)?;
    for (i, buffer) in buffers.iter().enumerate().skip(1) {
        let other = WavFormat::parse(buffer.as_ref())?;
        if other != format {
            return Err(Error::IncompatibleFormat(format!(
                "chunk {i} is {} Hz/{} ch/{} bit, expected {} Hz/{} ch/{} bit",
                other.sample_rate,
                other.channels,
                other.bits_per_sample,
                format.sample_rate,
                format.channels,
                format.bits_per_sample
            )));
        }
    }

    let payload_len: usize = buffers
        .iter()
        .map(|b| b.as_ref().len() - WAV_HEADER_LEN)
        .sum();
    let data_size = u32::try_from(payload_len)
        .map_err(|_| Error::IncompatibleFormat("spliced audio exceeds 4 GiB".to_string()))?;
    let riff_size = data_size
        .checked_add(RIFF_HEADER_REMAINDER)
        .ok_or_else(|| Error::IncompatibleFormat("spliced audio exceeds 4 GiB".to_string()))?;

    let mut merged = Vec::with_capacity(WAV_HEADER_LEN + payload_len);
    merged.extend_from_slice(&first[..WAV_HEADER_LEN]);
    merged[RIFF_SIZE_OFFSET..RIFF_SIZE_OFFSET + 4].copy_from_slice(&riff_size.to_le_bytes());
    merged[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&data_size.to_le_bytes());

    for buffer in buffers {
        merged.extend_from_slice(&buffer.as_ref()[WAV_HEADER_LEN..]);
    }

    tracing::debug!(
        chunks = buffers.len(),
        payload_bytes = payload_len,
        "spliced WAV chunks"
    );

    Ok(merged)
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
