//! Seam to the external streaming music service.
//!
//! The vendor SDK is modeled as two narrow traits so the manager can run
//! against any transport, including the in-memory fakes in
//! [`testing`](crate::testing). Server pushes travel over an unbounded
//! channel handed to the client at connect time; the manager drains it on its
//! own task, in arrival order.

use crate::chunk::AudioChunk;
use crate::error::SessionResult;
use crate::prompt::{FilteredPrompt, WeightedPrompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half of a connection's event channel.
pub type TransportSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a connection's event channel.
pub type TransportReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Audio content pushed by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Chunks in playback order
    #[serde(default)]
    pub audio_chunks: Vec<AudioChunk>,
}

/// One message from the service. Any combination of parts may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// The service finished setting up the connection
    #[serde(default)]
    pub setup_complete: bool,
    /// A prompt was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_prompt: Option<FilteredPrompt>,
    /// Generated audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
}

impl ServerMessage {
    /// A setup-complete notice
    pub fn setup_complete() -> Self {
        Self {
            setup_complete: true,
            ..Self::default()
        }
    }

    /// A filtered-prompt notice
    pub fn filtered(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            filtered_prompt: Some(FilteredPrompt {
                text: text.into(),
                filtered_reason: reason.into(),
            }),
            ..Self::default()
        }
    }

    /// An audio content message
    pub fn audio(audio_chunks: Vec<AudioChunk>) -> Self {
        Self {
            server_content: Some(ServerContent { audio_chunks }),
            ..Self::default()
        }
    }
}

/// Everything a live connection can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A server message
    Message(ServerMessage),
    /// The connection failed
    Error(String),
    /// The connection closed
    Close,
}

/// Opens live music sessions.
#[async_trait]
pub trait MusicClient: Send + Sync {
    /// Open a session for `model`. Server pushes for this session are sent on
    /// `events` until it is dropped or the connection ends.
    async fn connect(
        &self,
        model: &str,
        events: TransportSender,
    ) -> SessionResult<Arc<dyn LiveSession>>;
}

/// An open live music session.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Start or resume generation.
    fn play(&self) -> SessionResult<()>;

    /// Pause generation.
    fn pause(&self) -> SessionResult<()>;

    /// Stop generation.
    fn stop(&self) -> SessionResult<()>;

    /// Replace the prompts steering generation.
    async fn set_weighted_prompts(&self, prompts: &[WeightedPrompt]) -> SessionResult<()>;
}
