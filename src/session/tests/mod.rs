//! Tests for the session manager.
//!
//! Every test runs on a paused tokio clock, so back-off timers, the pre-roll
//! window and the prompt throttle elapse instantly and deterministically. The
//! audio clock is the [`RecordingOutput`]'s manual clock and never moves on
//! its own.

use super::super::*;
use crate::config::SessionConfig;
use crate::events::SessionEvent;
use crate::prompt::{PromptMap, WeightedPrompt, prompt_map};
use crate::testing::{FakeClient, RecordingOutput, silent_chunk};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

mod reconnect_tests;

/// Longer than the prompt throttle window.
pub(crate) const PAST_THROTTLE: Duration = Duration::from_millis(250);

/// Longer than the settle delay plus the throttle window.
pub(crate) const PAST_PLAY_SETTLE: Duration = Duration::from_millis(150);

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Let every spawned task run until it blocks.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn default_prompts() -> PromptMap {
    prompt_map([
        WeightedPrompt::new("p0", "Bossa Nova", 1.0).with_color("#9900ff"),
        WeightedPrompt::new("p1", "Chillwave", 0.0).with_color("#5200ff"),
    ])
}

pub(crate) struct Harness {
    pub manager: SessionManager,
    pub client: Arc<FakeClient>,
    pub output: Arc<RecordingOutput>,
    pub events: broadcast::Receiver<SessionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(FakeClient::new())
    }

    pub fn with_client(client: Arc<FakeClient>) -> Self {
        Self::build(client, SessionConfig::default())
    }

    pub fn build(client: Arc<FakeClient>, config: SessionConfig) -> Self {
        init_tracing();
        let output = RecordingOutput::new();
        let manager = SessionManager::new(client.clone(), output.clone(), config)
            .expect("default config is valid");
        let events = manager.subscribe();
        Self {
            manager,
            client,
            output,
            events,
        }
    }

    /// Install the default prompts and wait out the throttle window so the
    /// next submission goes through immediately.
    pub async fn with_prompts(self) -> Self {
        self.manager.set_weighted_prompts(default_prompts()).await;
        tokio::time::sleep(PAST_THROTTLE).await;
        self
    }

    /// Play and return once the manager is loading on a live session.
    pub async fn start(&mut self) {
        self.manager.play().await.expect("play succeeds");
        settle().await;
        assert_eq!(self.manager.playback_state(), PlaybackState::Loading);
    }

    /// Play and push one chunk, then wait out the pre-roll.
    pub async fn start_playing(&mut self) {
        self.start().await;
        self.push_chunk(0.5).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(self.manager.playback_state(), PlaybackState::Playing);
    }

    /// Push a silent chunk on the latest connection.
    pub async fn push_chunk(&self, seconds: f64) {
        let index = self.client.connection_count() - 1;
        self.client
            .send_audio(index, vec![silent_chunk(seconds, 48000, 2)]);
        settle().await;
    }

    /// Every event received since the last drain.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn drain_errors(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn drain_states(&mut self) -> Vec<PlaybackState> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::PlaybackStateChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}
