// Error types for the sound player
use thiserror::Error;

/// Errors reported by the registry and the audio engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Asset missing, unreadable or undecodable
    #[error("Source unavailable: {name}: {reason}")]
    SourceUnavailable { name: String, reason: String },

    /// Seek target outside [0, duration]
    #[error("Invalid position: {position}s (duration {duration}s)")]
    InvalidPosition { position: f64, duration: f64 },

    /// Playback cut off after it started (audio session interruption, device loss)
    #[error("Device interrupted: {0}")]
    DeviceInterrupted(String),

    /// No usable output device or stream
    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),
}

impl AudioError {
    pub fn source_unavailable(name: impl Into<String>, reason: impl ToString) -> Self {
        AudioError::SourceUnavailable {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable error code used across the host boundary
    pub fn code(&self) -> &'static str {
        match self {
            AudioError::SourceUnavailable { .. } => "SourceUnavailable",
            AudioError::InvalidPosition { .. } => "InvalidPosition",
            AudioError::DeviceInterrupted(_) => "DeviceInterrupted",
            AudioError::OutputUnavailable(_) => "OutputUnavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;
