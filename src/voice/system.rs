//! System-native voice
//!
//! Synthesis and playback happen in one blocking step through an OS speech
//! command. There is no audio payload to prefetch.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;

use super::SpeechRequest;
use crate::{Error, Result};

/// Words per minute the speech commands use at rate 1.0
const BASE_WORDS_PER_MINUTE: f64 = 175.0;

/// A voice that speaks text directly
#[async_trait]
pub trait SystemVoice: Send + Sync {
    /// Speak, resolving when speech ends
    ///
    /// Cancellation is not an error: a cancelled utterance resolves `Ok`.
    async fn speak(&self, request: &SpeechRequest) -> Result<()>;

    /// Cancel the current utterance, if any
    fn cancel(&self);

    /// Pause the current utterance in place
    ///
    /// # Errors
    ///
    /// Returns error if the utterance cannot be paused
    fn pause(&self) -> Result<()>;

    /// Continue a paused utterance
    ///
    /// # Errors
    ///
    /// Returns error if the utterance cannot be resumed
    fn resume(&self) -> Result<()>;
}

/// Speech command flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeechProgram {
    /// macOS `say`
    Say,
    /// `espeak-ng` or `espeak`
    Espeak,
}

/// Speaks through the platform's speech command
pub struct CommandVoice {
    program: SpeechProgram,
    path: PathBuf,
    cancels: watch::Sender<u64>,
    pid: Mutex<Option<u32>>,
}

impl CommandVoice {
    /// Locate a speech command on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if neither `say`, `espeak-ng` nor `espeak` is installed
    pub fn detect() -> Result<Self> {
        let found = which::which("say")
            .map(|p| (SpeechProgram::Say, p))
            .or_else(|_| which::which("espeak-ng").map(|p| (SpeechProgram::Espeak, p)))
            .or_else(|_| which::which("espeak").map(|p| (SpeechProgram::Espeak, p)))
            .map_err(|_| Error::Speech("no speech command found on PATH".to_string()))?;

        tracing::debug!(path = %found.1.display(), "system voice detected");
        Ok(Self::with_program(found.0, found.1))
    }

    fn with_program(program: SpeechProgram, path: PathBuf) -> Self {
        let (cancels, _) = watch::channel(0);
        Self {
            program,
            path,
            cancels,
            pid: Mutex::new(None),
        }
    }

    /// Command-line arguments for `request`
    fn args(&self, request: &SpeechRequest) -> Vec<String> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wpm = (request.rate * BASE_WORDS_PER_MINUTE).round() as u32;
        let mut args = Vec::new();

        match self.program {
            SpeechProgram::Say => {
                if !request.voice_name.is_empty() {
                    args.extend(["-v".to_string(), request.voice_name.clone()]);
                }
                args.extend(["-r".to_string(), wpm.to_string()]);
            }
            SpeechProgram::Espeak => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let amplitude = (request.volume * 200.0).round() as u32;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let pitch = (request.pitch * 50.0).round().min(99.0) as u32;
                if !request.voice_name.is_empty() {
                    args.extend(["-v".to_string(), request.voice_name.clone()]);
                }
                args.extend([
                    "-s".to_string(),
                    wpm.to_string(),
                    "-a".to_string(),
                    amplitude.to_string(),
                    "-p".to_string(),
                    pitch.to_string(),
                ]);
            }
        }

        // A leading dash would be read as an option
        if request.text.starts_with('-') {
            args.push(format!(" {}", request.text));
        } else {
            args.push(request.text.clone());
        }
        args
    }

    fn set_pid(&self, pid: Option<u32>) {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner) = pid;
    }

    fn current_pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(unix)]
    fn signal(&self, signal: &str) -> Result<()> {
        let Some(pid) = self.current_pid() else {
            return Ok(());
        };

        let status = std::process::Command::new("kill")
            .arg(signal)
            .arg(pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Speech(format!("kill {signal} {pid} failed: {status}")))
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: &str) -> Result<()> {
        Err(Error::Speech(
            "pausing the system voice is not supported on this platform".to_string(),
        ))
    }
}

#[async_trait]
impl SystemVoice for CommandVoice {
    async fn speak(&self, request: &SpeechRequest) -> Result<()> {
        self.cancel();
        let mut cancelled = self.cancels.subscribe();

        let mut child = Command::new(&self.path)
            .args(self.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Speech(format!("failed to start {}: {e}", self.path.display())))?;
        self.set_pid(child.id());

        let result = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(Error::Speech(format!("speech command exited with {status}"))),
                Err(e) => Err(Error::Io(e)),
            },
            _ = cancelled.changed() => {
                tracing::debug!("system voice cancelled");
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(())
            }
        };

        self.set_pid(None);
        result
    }

    fn cancel(&self) {
        self.cancels.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn pause(&self) -> Result<()> {
        self.signal("-STOP")
    }

    fn resume(&self) -> Result<()> {
        self.signal("-CONT")
    }
}
