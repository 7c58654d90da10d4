//! Configuration for live music sessions.

use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "lyria-realtime-exp";

/// Configuration for session, scheduling and reconnection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Model identifier passed to the streaming client on connect
    pub model: String,

    /// Engine sample rate every chunk is decoded at
    pub sample_rate: u32,

    /// Engine channel count every chunk is decoded with
    pub channels: usize,

    /// Pre-roll added in front of the first chunk after a (re)start
    pub buffer_time: Duration,

    /// Length of the gain ramps used at play and pause boundaries
    pub gain_ramp: Duration,

    /// Fixed delay before each reconnection attempt
    pub reconnect_delay: Duration,

    /// Maximum number of reconnection attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Wait after the session is ready and before prompts are submitted
    pub settle_delay: Duration,

    /// Minimum interval between two weighted prompt submissions
    pub prompt_throttle: Duration,

    /// Output volume before the caller sets one (0.0 to 1.0)
    pub initial_volume: f32,

    /// Whether to call `play()` automatically when a connection is restored
    /// after it dropped during playback
    pub auto_resume: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            sample_rate: 48000,
            channels: 2,
            buffer_time: Duration::from_secs(2),
            gain_ramp: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_attempts: 3,
            settle_delay: Duration::from_millis(100),
            prompt_throttle: Duration::from_millis(200),
            initial_volume: 0.5,
            auto_resume: true,
        }
    }
}

impl SessionConfig {
    /// Create a default configuration for the given model
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Create configuration trading jitter tolerance for lower latency
    pub fn low_latency() -> Self {
        Self {
            buffer_time: Duration::from_millis(500),
            gain_ramp: Duration::from_millis(50),
            reconnect_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Create configuration for unreliable networks
    pub fn resilient() -> Self {
        Self {
            buffer_time: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            ..Self::default()
        }
    }

    /// Pre-roll in audio clock seconds
    pub fn buffer_time_secs(&self) -> f64 {
        self.buffer_time.as_secs_f64()
    }

    /// Gain ramp length in audio clock seconds
    pub fn gain_ramp_secs(&self) -> f64 {
        self.gain_ramp.as_secs_f64()
    }

    /// Check the configuration for values the session cannot run with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.model.is_empty() {
            return Err(SessionError::InvalidConfig(
                "model must not be empty".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(SessionError::InvalidConfig(
                "sample_rate must be > 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(SessionError::InvalidConfig(
                "channels must be > 0".to_string(),
            ));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(SessionError::InvalidConfig(
                "max_reconnect_attempts must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(SessionError::volume_out_of_range(self.initial_volume));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_observed_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.buffer_time, Duration::from_secs(2));
        assert_eq!(config.gain_ramp, Duration::from_millis(100));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.initial_volume, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(SessionConfig::low_latency().validate().is_ok());
        assert!(SessionConfig::resilient().validate().is_ok());
        assert!(SessionConfig::low_latency().buffer_time < SessionConfig::default().buffer_time);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SessionConfig::default();
        config.sample_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig(_))
        ));

        let mut config = SessionConfig::default();
        config.max_reconnect_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.initial_volume = 1.2;
        assert!(matches!(
            config.validate(),
            Err(SessionError::VolumeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "model": "custom-model", "max_reconnect_attempts": 5 }"#)
                .unwrap();
        assert_eq!(config.model, "custom-model");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.buffer_time, Duration::from_secs(2));
        assert!(config.auto_resume);
    }
}
