//! Error types for live music session operations.

use thiserror::Error;

/// Convenience type alias for results that may contain a [`SessionError`].
pub type SessionResult<T> = Result<T, SessionError>;

/// Error types that can occur while driving a live music session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No prompt has a positive weight and an unfiltered text.
    ///
    /// The streaming service refuses to generate without at least one
    /// active prompt, so the manager pauses instead of submitting.
    #[error("At least one active prompt is required to play")]
    NoActivePrompts,

    /// Opening a session with the streaming service failed.
    #[error("Failed to connect to model '{model}': {reason}")]
    Connect {
        /// Model identifier the connection was opened for.
        model: String,
        /// Reason reported by the client.
        reason: String,
    },

    /// The live connection reported an error or closed unexpectedly.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service rejected a weighted prompt update.
    #[error("Failed to set prompts: {0}")]
    Submission(String),

    /// An inbound audio chunk could not be decoded.
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// A session primitive (play, pause, stop) failed.
    #[error("Session error: {0}")]
    Session(String),

    /// Volume outside the accepted range.
    #[error("Volume out of range: {volume}, valid range: {min} to {max}")]
    VolumeOutOfRange {
        /// Requested volume.
        volume: f32,
        /// Lower bound (inclusive).
        min: f32,
        /// Upper bound (inclusive).
        max: f32,
    },

    /// Invalid session configuration.
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    /// Audio backend errors (cpal, etc.)
    #[error("Backend error: {backend} - {details}")]
    Backend {
        /// Name of the backend.
        backend: &'static str,
        /// Backend-specific details.
        details: String,
    },
}

impl SessionError {
    /// Create a connection error
    pub fn connect(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(details: impl Into<String>) -> Self {
        Self::Transport(details.into())
    }

    /// Create a prompt submission error
    pub fn submission(details: impl Into<String>) -> Self {
        Self::Submission(details.into())
    }

    /// Create a decode error
    pub fn decode(details: impl Into<String>) -> Self {
        Self::Decode(details.into())
    }

    /// Create a backend error
    pub fn backend(backend: &'static str, details: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            details: details.into(),
        }
    }

    /// Create a volume out of range error for the `0.0..=1.0` range
    pub const fn volume_out_of_range(volume: f32) -> Self {
        Self::VolumeOutOfRange {
            volume,
            min: 0.0,
            max: 1.0,
        }
    }

    /// Check if this error can be recovered from by retrying or reconnecting
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Transport(_) | Self::Submission(_) | Self::Decode(_)
        )
    }

    /// Check if this error is a transport-level failure handled by reconnection
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Transport(_))
    }
}

// A memoized connection future is shared between callers, so its error output
// has to be cloneable.
impl Clone for SessionError {
    fn clone(&self) -> Self {
        match self {
            Self::NoActivePrompts => Self::NoActivePrompts,
            Self::Connect { model, reason } => Self::Connect {
                model: model.clone(),
                reason: reason.clone(),
            },
            Self::Transport(msg) => Self::Transport(msg.clone()),
            Self::Submission(msg) => Self::Submission(msg.clone()),
            Self::Decode(msg) => Self::Decode(msg.clone()),
            Self::Session(msg) => Self::Session(msg.clone()),
            Self::VolumeOutOfRange { volume, min, max } => Self::VolumeOutOfRange {
                volume: *volume,
                min: *min,
                max: *max,
            },
            Self::InvalidConfig(msg) => Self::InvalidConfig(msg.clone()),
            Self::Backend { backend, details } => Self::Backend {
                backend: *backend,
                details: details.clone(),
            },
        }
    }
}

#[cfg(feature = "playback")]
impl From<cpal::BuildStreamError> for SessionError {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::backend("cpal", format!("Failed to build stream: {}", err))
    }
}

#[cfg(feature = "playback")]
impl From<cpal::PlayStreamError> for SessionError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::backend("cpal", format!("Failed to play stream: {}", err))
    }
}
