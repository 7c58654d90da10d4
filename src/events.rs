//! Observable events published by the session manager.
//!
//! The UI side subscribes to a broadcast channel instead of registering
//! listeners on the manager. Every subscriber sees every event emitted after it
//! subscribed; a slow subscriber that falls behind by more than the channel
//! capacity loses the oldest events (`RecvError::Lagged`).

use crate::prompt::FilteredPrompt;
use crate::session::state::PlaybackState;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// User-facing notification texts.
pub mod messages {
    /// Submission refused because no prompt is active.
    pub const NO_ACTIVE_PROMPTS: &str = "At least one active prompt is required to play.";
    /// Transport reported an error.
    pub const CONNECTION_ERROR: &str =
        "Connection error detected. Trying to reconnect automatically...";
    /// Transport closed unexpectedly.
    pub const CONNECTION_LOST: &str = "Connection lost. Trying to reconnect automatically...";
    /// Every reconnection attempt failed.
    pub const RECONNECT_FAILED: &str = "Reconnection failed. Please restart the audio manually.";
    /// Connection restored, playback was active before it dropped.
    pub const RESTORED_RESUMING: &str = "Connection restored successfully! Resuming the music...";
    /// Connection restored.
    pub const RESTORED: &str = "Connection restored successfully!";
    /// Playback could not be restarted after a restored connection.
    pub const RESUME_FAILED: &str = "Could not resume the music. Press play to try again.";

    /// Progress notice for a reconnection attempt.
    pub fn reconnect_attempt(attempt: u32, max: u32) -> String {
        format!("Reconnection attempt {attempt}/{max}...")
    }

    /// A prompt update was rejected by the service.
    pub fn prompt_submission_failed(reason: &str) -> String {
        format!("Failed to set prompts: {reason}")
    }
}

/// Events exposed to the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The playback state changed.
    PlaybackStateChanged(PlaybackState),
    /// The service rejected a prompt.
    FilteredPrompt(FilteredPrompt),
    /// A human-readable error or progress notice.
    Error(String),
    /// The service finished setting up a (new) connection.
    ConnectionRestored {
        /// Human-readable notice
        message: String,
        /// Whether playback was active before the connection dropped, i.e.
        /// whether the caller should expect playback to resume
        resume: bool,
    },
}

impl SessionEvent {
    /// Name of the event as seen by UI listeners
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PlaybackStateChanged(_) => "playback-state-changed",
            Self::FilteredPrompt(_) => "filtered-prompt",
            Self::Error(_) => "error",
            Self::ConnectionRestored { .. } => "connection-restored",
        }
    }
}

/// Fan-out of [`SessionEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        trace!(event = event.name(), "emitting session event");
        let _ = self.sender.send(event);
    }

    /// Publish an error notice.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Error(message.into()));
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.error("nobody listening");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_every_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(SessionEvent::PlaybackStateChanged(PlaybackState::Loading));

        assert_eq!(
            a.try_recv().unwrap(),
            SessionEvent::PlaybackStateChanged(PlaybackState::Loading)
        );
        assert_eq!(
            b.try_recv().unwrap(),
            SessionEvent::PlaybackStateChanged(PlaybackState::Loading)
        );
        assert_eq!(a.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::Error(String::new()).name(), "error");
        assert_eq!(
            SessionEvent::ConnectionRestored {
                message: messages::RESTORED.to_string(),
                resume: false
            }
            .name(),
            "connection-restored"
        );
    }

    #[test]
    fn test_reconnect_attempt_message() {
        assert_eq!(
            messages::reconnect_attempt(2, 3),
            "Reconnection attempt 2/3..."
        );
    }
}
