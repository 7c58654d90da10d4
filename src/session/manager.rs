//! The live music session manager.

use super::client::{LiveSession, MusicClient, TransportEvent, TransportReceiver};
use super::jitter::{Admission, JitterBuffer};
use super::state::{PlaybackState, ReconnectionContext};
use crate::chunk::{AudioChunk, decode_chunk};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::events::{EventBus, SessionEvent, messages};
use crate::output::{AudioOutput, Destination, GainId};
use crate::prompt::{FilteredPrompt, FilteredPromptSet, PromptMap, WeightedPrompt, active_prompts};
use crate::throttle::{Throttle, ThrottleDecision};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};

type SessionFuture = Shared<BoxFuture<'static, SessionResult<Arc<dyn LiveSession>>>>;

#[derive(Debug, Clone, Copy)]
enum Disconnect {
    Error,
    Closed,
}

struct State {
    playback: PlaybackState,
    prompts: PromptMap,
    filtered: FilteredPromptSet,

    session: Option<Arc<dyn LiveSession>>,
    pending: Option<(u64, SessionFuture)>,
    // Bumped whenever the current session is discarded; events and connect
    // results from older generations are ignored.
    generation: u64,

    connection_error: bool,
    reconnect: ReconnectionContext,
    reconnect_timer: Option<(u64, JoinHandle<()>)>,
    next_timer_id: u64,

    jitter: JitterBuffer,
    gain: GainId,
    volume: f32,
    extra_destination: Option<Destination>,

    throttle: Throttle,
}

struct Inner {
    config: SessionConfig,
    client: Arc<dyn MusicClient>,
    output: Arc<dyn AudioOutput>,
    events: EventBus,
    state: Mutex<State>,
}

/// Drives one logical live music session over an external streaming client.
///
/// The manager owns the connection (connect on demand, bounded automatic
/// reconnection), turns pushed audio chunks into gapless playback on an
/// [`AudioOutput`], tracks the [`PlaybackState`] and submits the active
/// weighted prompts. Everything the UI needs to mirror is published as
/// [`SessionEvent`]s; see [`subscribe`](Self::subscribe).
///
/// Cloning is cheap and yields another handle to the same session. Methods
/// that start background work must be called from within a tokio runtime.
///
/// # Example
///
/// ```rust,ignore
/// let manager = SessionManager::new(client, output, SessionConfig::default())?;
/// let mut events = manager.subscribe();
///
/// manager
///     .set_weighted_prompts(prompt_map([WeightedPrompt::new("p0", "Ambient", 0.8)]))
///     .await;
/// manager.play().await?;
/// ```
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager for the given client and output graph.
    pub fn new(
        client: Arc<dyn MusicClient>,
        output: Arc<dyn AudioOutput>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        config.validate()?;

        let gain = output.create_gain(config.initial_volume);
        let state = State {
            playback: PlaybackState::Stopped,
            prompts: PromptMap::new(),
            filtered: FilteredPromptSet::new(),
            session: None,
            pending: None,
            generation: 0,
            connection_error: true,
            reconnect: ReconnectionContext::new(config.max_reconnect_attempts),
            reconnect_timer: None,
            next_timer_id: 0,
            jitter: JitterBuffer::new(config.buffer_time_secs()),
            gain,
            volume: config.initial_volume,
            extra_destination: None,
            throttle: Throttle::new(config.prompt_throttle),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                output,
                events: EventBus::default(),
                state: Mutex::new(state),
            }),
        })
    }

    /// Create a manager with [`SessionConfig::default`].
    pub fn with_defaults(
        client: Arc<dyn MusicClient>,
        output: Arc<dyn AudioOutput>,
    ) -> SessionResult<Self> {
        Self::new(client, output, SessionConfig::default())
    }

    /// Subscribe to state changes, filtered prompts, errors and restored
    /// connections.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Start playback.
    ///
    /// Connects if needed, submits the active prompts, starts the session and
    /// fades the output in. On failure the state falls back to
    /// [`PlaybackState::Stopped`] and the error is returned.
    pub async fn play(&self) -> SessionResult<()> {
        self.inner.play().await
    }

    /// Pause the session and fade the output out.
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Stop the session and release the connection.
    ///
    /// The next [`play`](Self::play) opens a new connection.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Toggle playback: playing pauses, paused or stopped plays, and a
    /// session still loading is stopped.
    pub async fn play_pause(&self) -> SessionResult<()> {
        let current = self.playback_state();
        match current {
            PlaybackState::Playing => {
                self.pause();
                Ok(())
            }
            PlaybackState::Paused | PlaybackState::Stopped => self.play().await,
            PlaybackState::Loading => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Replace the prompt snapshot and submit its active subset.
    ///
    /// Submissions are throttled. With no active prompt an error event is
    /// emitted and playback pauses; without a session the prompts are kept
    /// for the next [`play`](Self::play).
    pub async fn set_weighted_prompts(&self, prompts: PromptMap) {
        self.inner.state.lock().prompts = prompts;
        self.inner.submit_prompts_throttled().await;
    }

    /// Set the output volume immediately, without a ramp.
    pub fn set_volume(&self, volume: f32) -> SessionResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SessionError::volume_out_of_range(volume));
        }
        let mut state = self.inner.state.lock();
        state.volume = volume;
        let now = self.inner.output.current_time();
        self.inner.output.set_gain_at(state.gain, volume, now);
        Ok(())
    }

    /// Target output volume
    pub fn volume(&self) -> f32 {
        self.inner.state.lock().volume
    }

    /// Route output to an extra destination as well, starting with the next
    /// [`play`](Self::play). `None` removes it for subsequent plays.
    pub fn set_extra_destination(&self, destination: Option<Destination>) {
        self.inner.state.lock().extra_destination = destination;
    }

    /// Current playback state
    pub fn playback_state(&self) -> PlaybackState {
        self.inner.state.lock().playback
    }

    /// Prompts that would be submitted right now
    pub fn active_prompts(&self) -> Vec<WeightedPrompt> {
        let state = self.inner.state.lock();
        active_prompts(&state.prompts, &state.filtered)
    }

    /// Current prompt snapshot
    pub fn prompts(&self) -> PromptMap {
        self.inner.state.lock().prompts.clone()
    }

    /// Prompt texts rejected by the service so far
    pub fn filtered_prompts(&self) -> Vec<String> {
        self.inner.state.lock().filtered.texts()
    }

    /// Whether the connection is down or has not finished setup yet
    pub fn has_connection_error(&self) -> bool {
        self.inner.state.lock().connection_error
    }

    /// Whether a session handle is held
    pub fn has_session(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }

    /// Reconnection attempts since the last successful setup
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect.attempts()
    }

    /// Audio clock time the next chunk will start at, 0 when nothing is
    /// scheduled
    pub fn next_start_time(&self) -> f64 {
        self.inner.state.lock().jitter.next_start_time()
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl Inner {
    fn transition(&self, state: &mut State, next: PlaybackState) {
        if state.playback != next {
            debug!(from = %state.playback, to = %next, "playback state changed");
        }
        state.playback = next;
        self.events.emit(SessionEvent::PlaybackStateChanged(next));
    }

    fn set_playback_state(&self, next: PlaybackState) {
        let mut state = self.state.lock();
        self.transition(&mut state, next);
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Resolve the current session, connecting if nothing is established or
    /// in flight. Concurrent callers share one connection attempt.
    async fn get_session(self: &Arc<Self>) -> SessionResult<(u64, Arc<dyn LiveSession>)> {
        let (generation, future) = {
            let mut state = self.state.lock();
            match state.pending.clone() {
                Some(pending) => pending,
                None => {
                    let pending = self.connect(&mut state);
                    state.pending = Some(pending.clone());
                    pending
                }
            }
        };
        let session = future.await?;
        Ok((generation, session))
    }

    fn connect(self: &Arc<Self>, state: &mut State) -> (u64, SessionFuture) {
        state.generation += 1;
        let generation = state.generation;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_transport_events(
            Arc::downgrade(self),
            generation,
            events_rx,
        ));

        let weak = Arc::downgrade(self);
        let client = Arc::clone(&self.client);
        let model = self.config.model.clone();

        let future = async move {
            info!(model = %model, generation, "connecting to music service");
            let result = client.connect(&model, events_tx).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_connect_result(generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        (generation, future)
    }

    fn on_connect_result(&self, generation: u64, result: &SessionResult<Arc<dyn LiveSession>>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation, "connection finished for a discarded session");
            if let Ok(session) = result {
                if let Err(err) = session.stop() {
                    warn!(%err, generation, "stopping discarded session failed");
                }
            }
            return;
        }
        match result {
            Ok(session) => {
                state.session = Some(Arc::clone(session));
            }
            Err(err) => {
                warn!(%err, generation, "connection failed");
                state.pending = None;
            }
        }
    }

    /// Forget the session and any pending connection without stopping it.
    fn discard_session(&self) {
        let mut state = self.state.lock();
        state.session = None;
        state.pending = None;
        state.generation += 1;
    }

    fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => {
                if message.setup_complete {
                    self.handle_setup_complete();
                }
                if let Some(filtered) = message.filtered_prompt {
                    self.handle_filtered_prompt(filtered);
                }
                if let Some(content) = message.server_content {
                    for chunk in &content.audio_chunks {
                        self.process_audio_chunk(chunk);
                    }
                }
            }
            TransportEvent::Error(reason) => {
                warn!(%reason, "transport error");
                self.handle_disconnect(Disconnect::Error);
            }
            TransportEvent::Close => {
                warn!("transport closed");
                self.handle_disconnect(Disconnect::Closed);
            }
        }
    }

    fn handle_setup_complete(self: &Arc<Self>) {
        let (resume, can_resume) = {
            let mut state = self.state.lock();
            state.connection_error = false;
            state.reconnect.connection_established();
            (
                state.reconnect.should_resume(),
                state.playback == PlaybackState::Stopped,
            )
        };

        info!(resume, "music service setup complete");
        let message = if resume {
            messages::RESTORED_RESUMING
        } else {
            messages::RESTORED
        };
        self.events.emit(SessionEvent::ConnectionRestored {
            message: message.to_string(),
            resume,
        });

        if resume && can_resume && self.config.auto_resume {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = inner.play().await {
                    warn!(%err, "automatic resume failed");
                    inner.events.error(messages::RESUME_FAILED);
                }
            });
        }
    }

    fn handle_filtered_prompt(&self, filtered: FilteredPrompt) {
        let inserted = self.state.lock().filtered.insert(filtered.text.clone());
        if inserted {
            info!(text = %filtered.text, reason = %filtered.filtered_reason, "prompt filtered");
        }
        self.events.emit(SessionEvent::FilteredPrompt(filtered));
    }

    fn handle_disconnect(self: &Arc<Self>, kind: Disconnect) {
        {
            let mut state = self.state.lock();
            state.connection_error = true;
            let current = state.playback;
            state.reconnect.record_disconnect(current);
        }

        self.stop();

        let message = match kind {
            Disconnect::Error => messages::CONNECTION_ERROR,
            Disconnect::Closed => messages::CONNECTION_LOST,
        };
        self.events.error(message);
        self.attempt_reconnect();
    }

    /// Schedule the next reconnection attempt, or give up once the cap is
    /// reached. A new timer replaces any pending one.
    fn attempt_reconnect(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let max = state.reconnect.max_attempts();
        let Some(attempt) = state.reconnect.next_attempt() else {
            drop(state);
            warn!(max, "reconnection attempts exhausted");
            self.events.error(messages::RECONNECT_FAILED);
            return;
        };

        if let Some((_, timer)) = state.reconnect_timer.take() {
            timer.abort();
        }
        state.next_timer_id += 1;
        let timer_id = state.next_timer_id;

        let weak = Arc::downgrade(self);
        let delay = self.config.reconnect_delay;
        debug!(attempt, max, ?delay, "scheduling reconnection");

        let timer = tokio::spawn(async move {
            sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            {
                let mut state = inner.state.lock();
                if !state.reconnect.in_cycle() {
                    // Restored by another connect while waiting.
                    debug!(attempt, "connection already restored, skipping reconnection");
                    if matches!(state.reconnect_timer, Some((id, _)) if id == timer_id) {
                        state.reconnect_timer = None;
                    }
                    return;
                }
            }

            inner.events.error(messages::reconnect_attempt(attempt, max));
            info!(attempt, max, "reconnecting");
            inner.discard_session();
            let result = inner.get_session().await;

            {
                let mut state = inner.state.lock();
                if matches!(state.reconnect_timer, Some((id, _)) if id == timer_id) {
                    state.reconnect_timer = None;
                }
            }

            if let Err(err) = result {
                warn!(%err, attempt, "reconnection attempt failed");
                inner.attempt_reconnect();
            }
        });
        state.reconnect_timer = Some((timer_id, timer));
    }

    // ------------------------------------------------------------------
    // Audio scheduling
    // ------------------------------------------------------------------

    fn process_audio_chunk(self: &Arc<Self>, chunk: &AudioChunk) {
        if self.state.lock().playback.drops_audio() {
            trace!("dropping audio chunk while not playing");
            return;
        }

        let buffer = match decode_chunk(chunk, self.config.sample_rate, self.config.channels) {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!(%err, "dropping undecodable audio chunk");
                return;
            }
        };

        let mut state = self.state.lock();
        if state.playback.drops_audio() {
            return;
        }

        let now = self.output.current_time();
        match state.jitter.admit(now, buffer.duration()) {
            Admission::Scheduled { start_at, preroll } => {
                trace!(start_at, duration = buffer.duration(), "scheduling chunk");
                self.output.start_source(buffer, state.gain, start_at);
                if preroll {
                    self.schedule_preroll_complete(state.jitter.epoch());
                }
            }
            Admission::Underrun => {
                warn!(now, "playback buffer underrun, re-buffering");
                self.transition(&mut state, PlaybackState::Loading);
            }
        }
    }

    fn schedule_preroll_complete(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.config.buffer_time;
        tokio::spawn(async move {
            sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.jitter.epoch() == epoch && state.playback == PlaybackState::Loading {
                inner.transition(&mut state, PlaybackState::Playing);
            }
        });
    }

    // ------------------------------------------------------------------
    // Playback control
    // ------------------------------------------------------------------

    async fn play(self: &Arc<Self>) -> SessionResult<()> {
        let result = self.start_playback().await;
        if let Err(err) = &result {
            warn!(%err, "play failed");
            self.set_playback_state(PlaybackState::Stopped);
        }
        result
    }

    async fn start_playback(self: &Arc<Self>) -> SessionResult<()> {
        let has_active = {
            let mut state = self.state.lock();
            self.transition(&mut state, PlaybackState::Loading);
            !active_prompts(&state.prompts, &state.filtered).is_empty()
        };
        if !has_active {
            self.events.error(messages::NO_ACTIVE_PROMPTS);
            return Err(SessionError::NoActivePrompts);
        }

        let (generation, session) = self.get_session().await?;
        sleep(self.config.settle_delay).await;
        if self.is_cancelled(generation) {
            debug!("play cancelled while connecting");
            return Ok(());
        }

        let resuming = self.state.lock().reconnect.should_resume();
        if resuming {
            match self.submit_prompts_for_resume(session.as_ref()).await {
                Ok(()) => self.state.lock().reconnect.resumed(),
                Err(err) => {
                    warn!(%err, "resume submission failed, using the throttled path");
                    self.submit_prompts_throttled().await;
                }
            }
        } else {
            self.submit_prompts_throttled().await;
        }

        if self.is_cancelled(generation) {
            debug!("play cancelled during prompt submission");
            return Ok(());
        }

        self.output.resume();
        session.play()?;

        let state = self.state.lock();
        self.output.connect(state.gain, Destination::Primary);
        if let Some(extra) = state.extra_destination {
            self.output.connect(state.gain, extra);
        }
        let now = self.output.current_time();
        self.output.set_gain_at(state.gain, 0.0, now);
        self.output
            .ramp_gain_to(state.gain, state.volume, now + self.config.gain_ramp_secs());

        info!(resumed = resuming, "playback started");
        Ok(())
    }

    fn is_cancelled(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation != generation || state.playback.drops_audio()
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(session) = &state.session {
            if let Err(err) = session.pause() {
                warn!(%err, "session pause failed");
            }
        }
        self.transition(&mut state, PlaybackState::Paused);
        self.fade_out_and_replace_gain(&mut state);
        state.jitter.reset();
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(session) = state.session.take() {
            if let Err(err) = session.stop() {
                warn!(%err, "session stop failed");
            }
        }
        self.transition(&mut state, PlaybackState::Stopped);
        self.fade_out_and_replace_gain(&mut state);
        state.jitter.reset();
        state.pending = None;
        state.generation += 1;
    }

    /// Ramp the current gain node to silence and route future sources through
    /// a fresh node pre-set to the target volume.
    fn fade_out_and_replace_gain(&self, state: &mut State) {
        let now = self.output.current_time();
        let old = state.gain;
        self.output.set_gain_at(old, state.volume, now);
        self.output
            .ramp_gain_to(old, 0.0, now + self.config.gain_ramp_secs());
        self.output.release_gain(old);
        state.gain = self.output.create_gain(state.volume);
    }

    // ------------------------------------------------------------------
    // Prompt submission
    // ------------------------------------------------------------------

    /// Standard submission path, used by `set_weighted_prompts` and by `play`.
    ///
    /// Rate limited; failures are reported as events and pause playback.
    async fn submit_prompts_throttled(self: &Arc<Self>) {
        let decision = self.state.lock().throttle.poll(Instant::now());
        match decision {
            ThrottleDecision::Fire => self.apply_prompts().await,
            ThrottleDecision::Defer(delay) => {
                trace!(?delay, "prompt submission deferred");
                let weak = Arc::downgrade(self);
                tokio::spawn(async move {
                    sleep(delay).await;
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    inner.state.lock().throttle.trailing_fired(Instant::now());
                    inner.apply_prompts().await;
                });
            }
            ThrottleDecision::Coalesced => trace!("prompt submission coalesced"),
        }
    }

    async fn apply_prompts(&self) {
        let (active, session) = {
            let state = self.state.lock();
            (
                active_prompts(&state.prompts, &state.filtered),
                state.session.clone(),
            )
        };

        if active.is_empty() {
            self.events.error(messages::NO_ACTIVE_PROMPTS);
            self.pause();
            return;
        }

        let Some(session) = session else {
            debug!(count = active.len(), "no session yet, prompts kept for play");
            return;
        };

        debug!(count = active.len(), "submitting weighted prompts");
        if let Err(err) = session.set_weighted_prompts(&active).await {
            warn!(%err, "prompt submission failed");
            self.events
                .error(messages::prompt_submission_failed(&failure_detail(&err)));
            self.pause();
        }
    }

    /// Unthrottled submission used only by `play` when resuming after a
    /// dropped connection. Failures are returned so `play` can fall back to
    /// the throttled path.
    async fn submit_prompts_for_resume(&self, session: &dyn LiveSession) -> SessionResult<()> {
        let active = {
            let state = self.state.lock();
            active_prompts(&state.prompts, &state.filtered)
        };
        if active.is_empty() {
            return Err(SessionError::NoActivePrompts);
        }

        debug!(count = active.len(), "resubmitting weighted prompts after reconnect");
        session.set_weighted_prompts(&active).await.map_err(|err| {
            self.events
                .error(messages::prompt_submission_failed(&failure_detail(&err)));
            err
        })
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some((_, timer)) = self.state.get_mut().reconnect_timer.take() {
            timer.abort();
        }
    }
}

fn failure_detail(err: &SessionError) -> String {
    match err {
        SessionError::Submission(detail) => detail.clone(),
        other => other.to_string(),
    }
}

/// Drain one connection's events in arrival order until the connection ends
/// or the manager moves on to another session.
async fn pump_transport_events(inner: Weak<Inner>, generation: u64, mut events: TransportReceiver) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.state.lock().generation != generation {
            debug!(generation, "ignoring events from a discarded session");
            break;
        }
        inner.handle_transport_event(event);
    }
    trace!(generation, "transport event pump finished");
}
