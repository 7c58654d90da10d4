//! Connection loss, bounded reconnection and automatic resume.

use super::*;
use crate::events::messages;
use crate::session::client::{ServerMessage, TransportEvent};
use crate::testing::SessionCall;

const BACKOFF: Duration = Duration::from_secs(2);

async fn wait_backoff() {
    tokio::time::sleep(BACKOFF).await;
    settle().await;
}

fn restored(resume: bool) -> SessionEvent {
    let message = if resume {
        messages::RESTORED_RESUMING
    } else {
        messages::RESTORED
    };
    SessionEvent::ConnectionRestored {
        message: message.to_string(),
        resume,
    }
}

#[tokio::test(start_paused = true)]
async fn test_setup_complete_clears_connection_error() {
    let mut h = Harness::new().with_prompts().await;
    assert!(h.manager.has_connection_error());

    h.start().await;
    assert!(!h.manager.has_connection_error());
    assert!(h.drain().contains(&restored(false)));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_stops_and_notifies() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;
    h.drain();

    h.client.send(0, TransportEvent::Error("socket reset".to_string()));
    settle().await;

    assert_eq!(h.manager.playback_state(), PlaybackState::Stopped);
    assert!(h.manager.has_connection_error());
    assert!(!h.manager.has_session());
    assert_eq!(h.client.session(0).count(&SessionCall::Stop), 1);
    assert_eq!(
        h.drain(),
        vec![
            SessionEvent::PlaybackStateChanged(PlaybackState::Stopped),
            SessionEvent::Error(messages::CONNECTION_ERROR.to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_reports_connection_lost() {
    let mut h = Harness::new().with_prompts().await;
    h.start().await;
    h.drain();

    h.client.send(0, TransportEvent::Close);
    settle().await;

    assert_eq!(
        h.drain_errors(),
        vec![messages::CONNECTION_LOST.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_backoff_and_resumes_playback() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;
    h.client.send(0, TransportEvent::Error("socket reset".to_string()));
    settle().await;
    h.drain();

    tokio::time::sleep(BACKOFF - Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(h.client.connect_attempts(), 1);

    tokio::time::sleep(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(h.client.connect_attempts(), 2);
    assert_eq!(h.manager.reconnect_attempts(), 0);
    assert!(!h.manager.has_connection_error());

    tokio::time::sleep(PAST_PLAY_SETTLE).await;
    settle().await;

    let events = h.drain();
    assert_eq!(
        events[..2],
        [
            SessionEvent::Error(messages::reconnect_attempt(1, 3)),
            restored(true),
        ]
    );
    assert!(events.contains(&SessionEvent::PlaybackStateChanged(PlaybackState::Loading)));

    let session = h.client.session(1);
    assert_eq!(session.count(&SessionCall::Play), 1);
    assert_eq!(session.submitted_prompts().len(), 1);
    assert_eq!(h.manager.playback_state(), PlaybackState::Loading);

    h.push_chunk(0.5).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_paused_session_is_not_resumed() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;
    h.manager.pause();

    h.client.send(0, TransportEvent::Close);
    settle().await;
    wait_backoff().await;
    tokio::time::sleep(PAST_PLAY_SETTLE).await;
    settle().await;

    assert!(h.drain().contains(&restored(false)));
    assert_eq!(h.manager.playback_state(), PlaybackState::Stopped);
    assert_eq!(h.client.session(1).count(&SessionCall::Play), 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_resume_can_be_disabled() {
    let config = SessionConfig {
        auto_resume: false,
        ..SessionConfig::default()
    };
    let mut h = Harness::build(FakeClient::new(), config).with_prompts().await;
    h.start_playing().await;

    h.client.send(0, TransportEvent::Close);
    settle().await;
    wait_backoff().await;
    tokio::time::sleep(PAST_PLAY_SETTLE).await;
    settle().await;

    assert!(h.drain().contains(&restored(true)));
    assert_eq!(h.manager.playback_state(), PlaybackState::Stopped);

    // The next manual play takes the resume path.
    h.start().await;
    assert_eq!(h.client.session(1).submitted_prompts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reconnects_are_bounded() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;
    h.client.fail_next_connects(10);

    h.client.send(0, TransportEvent::Error("socket reset".to_string()));
    settle().await;
    h.drain();

    for _ in 0..3 {
        wait_backoff().await;
    }
    assert_eq!(h.client.connect_attempts(), 4);
    assert_eq!(h.manager.reconnect_attempts(), 3);
    assert_eq!(
        h.drain_errors(),
        vec![
            messages::reconnect_attempt(1, 3),
            messages::reconnect_attempt(2, 3),
            messages::reconnect_attempt(3, 3),
            messages::RECONNECT_FAILED.to_string(),
        ]
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(h.client.connect_attempts(), 4);
    assert_eq!(h.manager.playback_state(), PlaybackState::Stopped);
    assert!(h.manager.has_connection_error());
}

#[tokio::test(start_paused = true)]
async fn test_connections_failing_before_setup_exhaust_attempts() {
    let mut h = Harness::with_client(FakeClient::without_setup())
        .with_prompts()
        .await;
    h.start().await;
    assert!(h.manager.has_connection_error());

    for index in 0..3 {
        h.client
            .send(index, TransportEvent::Error("handshake failed".to_string()));
        settle().await;
        wait_backoff().await;
        assert_eq!(h.client.connection_count(), index + 2);
    }
    h.drain();

    h.client
        .send(3, TransportEvent::Error("handshake failed".to_string()));
    settle().await;
    assert_eq!(
        h.drain_errors(),
        vec![
            messages::CONNECTION_ERROR.to_string(),
            messages::RECONNECT_FAILED.to_string(),
        ]
    );

    wait_backoff().await;
    assert_eq!(h.client.connect_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_successful_setup_resets_attempt_budget() {
    let mut h = Harness::new().with_prompts().await;
    h.start().await;

    h.client.send(0, TransportEvent::Close);
    settle().await;
    wait_backoff().await;
    assert_eq!(h.client.connection_count(), 2);
    assert_eq!(h.manager.reconnect_attempts(), 0);
    h.drain();

    h.client.send(1, TransportEvent::Close);
    settle().await;
    wait_backoff().await;
    assert!(
        h.drain_errors()
            .contains(&messages::reconnect_attempt(1, 3))
    );
}

#[tokio::test(start_paused = true)]
async fn test_events_from_a_stopped_session_are_ignored() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;
    h.manager.stop();
    h.drain();

    h.client.send_audio(0, vec![silent_chunk(0.5, 48000, 2)]);
    h.client.send(0, TransportEvent::Error("late error".to_string()));
    h.client.send_message(0, ServerMessage::setup_complete());
    settle().await;
    wait_backoff().await;

    assert!(h.drain().is_empty());
    assert_eq!(h.client.connect_attempts(), 1);
    assert_eq!(h.output.sources().len(), 1);
    assert_eq!(h.manager.playback_state(), PlaybackState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_resume_submission_failure_falls_back_to_throttled_path() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;
    h.client.set_prompt_failures(1);

    h.client.send(0, TransportEvent::Close);
    settle().await;
    wait_backoff().await;
    tokio::time::sleep(PAST_PLAY_SETTLE).await;
    settle().await;

    let session = h.client.session(1);
    assert_eq!(session.submitted_prompts().len(), 2);
    assert_eq!(session.count(&SessionCall::Play), 1);
    assert_eq!(h.manager.playback_state(), PlaybackState::Loading);
    assert!(
        h.drain_errors()
            .contains(&messages::prompt_submission_failed("rejected"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_manager_cancels_pending_reconnect() {
    let mut h = Harness::new().with_prompts().await;
    let client = Arc::clone(&h.client);
    h.start().await;

    h.client.send(0, TransportEvent::Close);
    settle().await;
    drop(h);

    wait_backoff().await;
    assert_eq!(client.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_play_during_backoff_ends_the_reconnection_cycle() {
    let mut h = Harness::new().with_prompts().await;
    h.start_playing().await;

    h.client.send(0, TransportEvent::Close);
    settle().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    h.start().await;
    assert_eq!(h.client.connect_attempts(), 2);
    assert_eq!(h.manager.reconnect_attempts(), 0);
    h.drain();

    // Past the moment the pending back-off would have fired.
    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;

    assert!(h.drain_errors().is_empty());
    assert_eq!(h.client.connect_attempts(), 2);
    assert!(h.manager.has_session());

    let session = h.client.session(1);
    assert_eq!(
        session.calls(),
        vec![
            SessionCall::SetWeightedPrompts(h.manager.active_prompts()),
            SessionCall::Play,
        ]
    );

    h.push_chunk(0.5).await;
    assert_eq!(h.output.sources().len(), 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(h.manager.playback_state(), PlaybackState::Playing);
}
