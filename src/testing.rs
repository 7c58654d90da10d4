//! In-memory fakes for driving a [`SessionManager`](crate::SessionManager)
//! without a network or an audio device.
//!
//! Available to this crate's tests and, with the `test-support` feature, to
//! downstream crates.

use crate::chunk::{AudioChunk, PcmBuffer};
use crate::error::{SessionError, SessionResult};
use crate::output::{AudioOutput, Destination, GainId};
use crate::prompt::WeightedPrompt;
use crate::session::client::{
    LiveSession, MusicClient, ServerMessage, TransportEvent, TransportSender,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A call received by a [`FakeSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    /// `play()`
    Play,
    /// `pause()`
    Pause,
    /// `stop()`
    Stop,
    /// `set_weighted_prompts()` with the submitted list
    SetWeightedPrompts(Vec<WeightedPrompt>),
}

/// Records every call and optionally rejects prompt submissions.
#[derive(Debug, Default)]
pub struct FakeSession {
    calls: Mutex<Vec<SessionCall>>,
    prompt_failures: Mutex<u32>,
}

impl FakeSession {
    fn with_prompt_failures(failures: u32) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            prompt_failures: Mutex::new(failures),
        }
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    /// Prompt lists submitted so far, including rejected ones
    pub fn submitted_prompts(&self) -> Vec<Vec<WeightedPrompt>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SessionCall::SetWeightedPrompts(prompts) => Some(prompts.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of times `call` was received
    pub fn count(&self, call: &SessionCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Reject the next `n` prompt submissions.
    pub fn fail_next_prompts(&self, n: u32) {
        *self.prompt_failures.lock() = n;
    }
}

#[async_trait]
impl LiveSession for FakeSession {
    fn play(&self) -> SessionResult<()> {
        self.calls.lock().push(SessionCall::Play);
        Ok(())
    }

    fn pause(&self) -> SessionResult<()> {
        self.calls.lock().push(SessionCall::Pause);
        Ok(())
    }

    fn stop(&self) -> SessionResult<()> {
        self.calls.lock().push(SessionCall::Stop);
        Ok(())
    }

    async fn set_weighted_prompts(&self, prompts: &[WeightedPrompt]) -> SessionResult<()> {
        self.calls
            .lock()
            .push(SessionCall::SetWeightedPrompts(prompts.to_vec()));

        let mut failures = self.prompt_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(SessionError::submission("rejected"));
        }
        Ok(())
    }
}

/// One successful `connect` call.
#[derive(Debug, Clone)]
pub struct FakeConnection {
    /// Model requested by the manager
    pub model: String,
    /// Channel the manager drains for this connection
    pub events: TransportSender,
    /// Session handed back to the manager
    pub session: Arc<FakeSession>,
}

#[derive(Debug, Default)]
struct ClientState {
    manual_setup: bool,
    connect_delay: Option<Duration>,
    connect_failures: u32,
    prompt_failures: u32,
    connect_attempts: usize,
    connections: Vec<FakeConnection>,
}

/// A [`MusicClient`] whose connections are fully scripted by the test.
///
/// By default every connection succeeds and immediately reports setup
/// complete.
#[derive(Debug, Default)]
pub struct FakeClient {
    state: Mutex<ClientState>,
}

impl FakeClient {
    /// A client whose connections succeed and report setup complete.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A client whose connections never report setup complete on their own.
    pub fn without_setup() -> Arc<Self> {
        let client = Self::default();
        client.state.lock().manual_setup = true;
        Arc::new(client)
    }

    /// Delay every connect by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Fail the next `n` connect calls.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().connect_failures = n;
    }

    /// Sessions opened from now on reject their first `n` prompt submissions.
    pub fn set_prompt_failures(&self, n: u32) {
        self.state.lock().prompt_failures = n;
    }

    /// Connect calls so far, failed ones included
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Successful connections so far
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// The `index`-th successful connection
    pub fn connection(&self, index: usize) -> FakeConnection {
        self.state.lock().connections[index].clone()
    }

    /// Session of the `index`-th successful connection
    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.connection(index).session
    }

    /// Session of the most recent successful connection
    ///
    /// # Panics
    ///
    /// Panics if no connection has succeeded yet.
    pub fn latest_session(&self) -> Arc<FakeSession> {
        let state = self.state.lock();
        let last = state
            .connections
            .last()
            .expect("latest_session called before any successful connect");
        Arc::clone(&last.session)
    }

    /// Push an event on the `index`-th connection. Events sent to a
    /// connection the manager has already dropped are discarded.
    pub fn send(&self, index: usize, event: TransportEvent) {
        let _ = self.connection(index).events.send(event);
    }

    /// Push a server message on the `index`-th connection.
    pub fn send_message(&self, index: usize, message: ServerMessage) {
        self.send(index, TransportEvent::Message(message));
    }

    /// Push audio on the `index`-th connection.
    pub fn send_audio(&self, index: usize, chunks: Vec<AudioChunk>) {
        self.send_message(index, ServerMessage::audio(chunks));
    }
}

#[async_trait]
impl MusicClient for FakeClient {
    async fn connect(
        &self,
        model: &str,
        events: TransportSender,
    ) -> SessionResult<Arc<dyn LiveSession>> {
        let delay = self.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(SessionError::connect(model, "connection refused"));
        }

        let session = Arc::new(FakeSession::with_prompt_failures(state.prompt_failures));
        if !state.manual_setup {
            let _ = events.send(TransportEvent::Message(ServerMessage::setup_complete()));
        }
        state.connections.push(FakeConnection {
            model: model.to_string(),
            events,
            session: Arc::clone(&session),
        });
        let session: Arc<dyn LiveSession> = session;
        Ok(session)
    }
}

/// An operation received by a [`RecordingOutput`], mirroring the
/// [`AudioOutput`] method it came from.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum OutputOp {
    Resume,
    CreateGain { gain: GainId, initial: f32 },
    Connect { gain: GainId, destination: Destination },
    SetGain { gain: GainId, value: f32, time: f64 },
    RampGain { gain: GainId, value: f32, end_time: f64 },
    StartSource { gain: GainId, when: f64, duration: f64 },
    ReleaseGain(GainId),
}

/// A scheduled buffer source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    /// Gain node the source plays through
    pub gain: GainId,
    /// Start time on the audio clock
    pub when: f64,
    /// Length in seconds
    pub duration: f64,
}

#[derive(Debug, Default)]
struct OutputState {
    time: f64,
    next_gain: u64,
    ops: Vec<OutputOp>,
}

/// An [`AudioOutput`] that renders nothing and records every call.
///
/// Its clock only moves when the test moves it.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    state: Mutex<OutputState>,
}

impl RecordingOutput {
    /// An output whose clock reads 0.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move the audio clock to `time`.
    pub fn set_time(&self, time: f64) {
        self.state.lock().time = time;
    }

    /// Move the audio clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.state.lock().time += seconds;
    }

    /// Operations received so far
    pub fn ops(&self) -> Vec<OutputOp> {
        self.state.lock().ops.clone()
    }

    /// Operations received after the first `skip`
    pub fn ops_since(&self, skip: usize) -> Vec<OutputOp> {
        self.state.lock().ops.iter().skip(skip).cloned().collect()
    }

    /// Number of operations received so far
    pub fn op_count(&self) -> usize {
        self.state.lock().ops.len()
    }

    /// Scheduled sources in call order
    pub fn sources(&self) -> Vec<ScheduledSource> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match *op {
                OutputOp::StartSource {
                    gain,
                    when,
                    duration,
                } => Some(ScheduledSource {
                    gain,
                    when,
                    duration,
                }),
                _ => None,
            })
            .collect()
    }

    /// Most recently created gain node
    pub fn latest_gain(&self) -> Option<GainId> {
        self.state.lock().ops.iter().rev().find_map(|op| match op {
            OutputOp::CreateGain { gain, .. } => Some(*gain),
            _ => None,
        })
    }
}

impl AudioOutput for RecordingOutput {
    fn current_time(&self) -> f64 {
        self.state.lock().time
    }

    fn resume(&self) {
        self.state.lock().ops.push(OutputOp::Resume);
    }

    fn create_gain(&self, initial: f32) -> GainId {
        let mut state = self.state.lock();
        state.next_gain += 1;
        let gain = GainId(state.next_gain);
        state.ops.push(OutputOp::CreateGain { gain, initial });
        gain
    }

    fn connect(&self, gain: GainId, destination: Destination) {
        self.state
            .lock()
            .ops
            .push(OutputOp::Connect { gain, destination });
    }

    fn set_gain_at(&self, gain: GainId, value: f32, time: f64) {
        self.state
            .lock()
            .ops
            .push(OutputOp::SetGain { gain, value, time });
    }

    fn ramp_gain_to(&self, gain: GainId, value: f32, end_time: f64) {
        self.state.lock().ops.push(OutputOp::RampGain {
            gain,
            value,
            end_time,
        });
    }

    fn start_source(&self, buffer: PcmBuffer, gain: GainId, when: f64) {
        self.state.lock().ops.push(OutputOp::StartSource {
            gain,
            when,
            duration: buffer.duration(),
        });
    }

    fn release_gain(&self, gain: GainId) {
        self.state.lock().ops.push(OutputOp::ReleaseGain(gain));
    }
}

/// A silent chunk lasting `seconds` at the given format.
pub fn silent_chunk(seconds: f64, sample_rate: u32, channels: usize) -> AudioChunk {
    let frames = (seconds * sample_rate as f64).round() as usize;
    AudioChunk::from_pcm16(&vec![0i16; frames * channels])
}
