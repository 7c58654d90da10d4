//! Playback state machine values and the reconnection context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current playback state of a session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No session, nothing scheduled
    #[default]
    Stopped,
    /// Connecting, pre-rolling or recovering from an underrun
    Loading,
    /// Audio is being scheduled and heard
    Playing,
    /// Session paused, incoming chunks are dropped
    Paused,
}

impl PlaybackState {
    /// Whether incoming audio chunks are dropped in this state
    pub const fn drops_audio(&self) -> bool {
        matches!(self, Self::Stopped | Self::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for bounded automatic reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionContext {
    attempts: u32,
    max_attempts: u32,
    previous_state: PlaybackState,
    in_cycle: bool,
}

impl ReconnectionContext {
    /// Create a context allowing `max_attempts` attempts per failure cycle.
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            previous_state: PlaybackState::Stopped,
            in_cycle: false,
        }
    }

    /// Attempts made since the last successful setup
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempt cap
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Playback state captured when the connection dropped
    pub const fn previous_state(&self) -> PlaybackState {
        self.previous_state
    }

    /// Whether a failure cycle is in progress
    pub const fn in_cycle(&self) -> bool {
        self.in_cycle
    }

    /// Capture the playback state at a transport failure.
    ///
    /// Only the first failure of a cycle is captured: later failures happen
    /// while already stopped and must not erase the intent to resume.
    pub fn record_disconnect(&mut self, current: PlaybackState) {
        if !self.in_cycle {
            self.previous_state = current;
            self.in_cycle = true;
        }
    }

    /// Claim the next attempt number, or `None` once the cap is reached.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    /// The service confirmed a new connection.
    pub fn connection_established(&mut self) {
        self.attempts = 0;
        self.in_cycle = false;
    }

    /// Whether the next `play()` resumes interrupted playback
    pub fn should_resume(&self) -> bool {
        self.previous_state == PlaybackState::Playing
    }

    /// Playback resumed, forget the captured state.
    pub fn resumed(&mut self) {
        self.previous_state = PlaybackState::Stopped;
    }
}
