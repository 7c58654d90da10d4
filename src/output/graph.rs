//! In-memory implementation of the audio output graph.

use super::{AudioOutput, Destination, GainId};
use crate::chunk::PcmBuffer;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
enum AutomationKind {
    Set,
    LinearRamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AutomationEvent {
    kind: AutomationKind,
    time: f64,
    value: f32,
}

/// Gain parameter with Web Audio style automation.
#[derive(Debug, Clone)]
struct GainParam {
    // Last automation point already in the past; ramps start from here.
    anchor_time: f64,
    anchor_value: f32,
    events: Vec<AutomationEvent>,
}

impl GainParam {
    fn new(initial: f32) -> Self {
        Self {
            anchor_time: 0.0,
            anchor_value: initial,
            events: Vec::new(),
        }
    }

    fn insert(&mut self, event: AutomationEvent) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }

    fn value_at(&self, t: f64) -> f32 {
        let mut prev_time = self.anchor_time;
        let mut prev_value = self.anchor_value;

        for event in &self.events {
            if event.time <= t {
                prev_time = event.time;
                prev_value = event.value;
                continue;
            }
            if event.kind == AutomationKind::LinearRamp {
                let span = event.time - prev_time;
                if span <= 0.0 {
                    return event.value;
                }
                let progress = ((t - prev_time) / span) as f32;
                return prev_value + (event.value - prev_value) * progress;
            }
            break;
        }

        prev_value
    }

    // Fold every event at or before `now` into the anchor.
    fn compact(&mut self, now: f64) {
        let consumed = self.events.partition_point(|e| e.time <= now);
        if consumed == 0 {
            return;
        }
        let last = self.events[consumed - 1];
        self.anchor_time = last.time;
        self.anchor_value = last.value;
        self.events.drain(..consumed);
    }
}

#[derive(Debug)]
struct GainNode {
    param: GainParam,
    destinations: HashSet<Destination>,
    released: bool,
}

#[derive(Debug)]
struct ScheduledSource {
    buffer: PcmBuffer,
    gain: GainId,
    start_frame: u64,
}

impl ScheduledSource {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.buffer.frames() as u64
    }
}

#[derive(Debug)]
struct GraphState {
    running: bool,
    frames_rendered: u64,
    next_gain: u64,
    gains: HashMap<GainId, GainNode>,
    sources: Vec<ScheduledSource>,
    aux_peaks: HashMap<u32, f32>,
}

/// A sample-clocked mixing graph.
///
/// The clock advances only while rendering: each call to
/// [`render`](Self::render) produces the next block of interleaved output and
/// moves [`current_time`](AudioOutput::current_time) forward by that block.
/// Sources whose start time falls inside a block begin on the exact frame.
/// Auxiliary destinations do not produce samples; the graph keeps the peak
/// level each one received during the last rendered block.
#[derive(Debug)]
pub struct SoftwareGraph {
    sample_rate: u32,
    channels: usize,
    state: Mutex<GraphState>,
}

impl SoftwareGraph {
    /// Create a suspended graph rendering `channels` interleaved channels.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            state: Mutex::new(GraphState {
                running: false,
                frames_rendered: 0,
                next_gain: 0,
                gains: HashMap::new(),
                sources: Vec::new(),
                aux_peaks: HashMap::new(),
            }),
        }
    }

    /// Output sample rate
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output channel count
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the clock is running
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Number of sources scheduled or still playing
    pub fn active_sources(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Current value of a gain node
    pub fn gain_value(&self, gain: GainId) -> Option<f32> {
        let state = self.state.lock();
        let now = state.frames_rendered as f64 / self.sample_rate as f64;
        state.gains.get(&gain).map(|node| node.param.value_at(now))
    }

    /// Peak absolute level an auxiliary destination received in the last block
    pub fn auxiliary_peak(&self, id: u32) -> f32 {
        self.state.lock().aux_peaks.get(&id).copied().unwrap_or(0.0)
    }

    /// Render the next block into `out` (interleaved, `channels` wide).
    ///
    /// While suspended the block is silent and the clock does not move.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let mut state = self.state.lock();
        if !state.running {
            return;
        }

        let frames = out.len() / self.channels;
        let block_start = state.frames_rendered;
        let block_end = block_start + frames as u64;
        let rate = self.sample_rate as f64;

        let mut aux_peaks: HashMap<u32, f32> = HashMap::new();

        for source in &state.sources {
            if source.end_frame() <= block_start || source.start_frame >= block_end {
                continue;
            }
            let Some(node) = state.gains.get(&source.gain) else {
                continue;
            };
            if node.destinations.is_empty() {
                continue;
            }

            let first = source.start_frame.max(block_start);
            let last = source.end_frame().min(block_end);
            for abs_frame in first..last {
                let gain = node.param.value_at(abs_frame as f64 / rate);
                let src_frame = (abs_frame - source.start_frame) as usize;
                let out_frame = (abs_frame - block_start) as usize;

                for ch in 0..self.channels {
                    let src_ch = if ch < source.buffer.channels() { ch } else { 0 };
                    let sample = source.buffer.sample(src_ch, src_frame) * gain;

                    for destination in &node.destinations {
                        match destination {
                            Destination::Primary => {
                                out[out_frame * self.channels + ch] += sample;
                            }
                            Destination::Auxiliary(id) => {
                                let peak = aux_peaks.entry(*id).or_insert(0.0);
                                *peak = peak.max(sample.abs());
                            }
                        }
                    }
                }
            }
        }

        state.frames_rendered = block_end;
        state.aux_peaks = aux_peaks;
        state.sources.retain(|s| s.end_frame() > block_end);

        let now = block_end as f64 / rate;
        for node in state.gains.values_mut() {
            node.param.compact(now);
        }

        let GraphState { gains, sources, .. } = &mut *state;
        gains.retain(|id, node| !node.released || sources.iter().any(|s| s.gain == *id));
    }

    fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    fn with_gain(&self, gain: GainId, f: impl FnOnce(&mut GainNode)) {
        let mut state = self.state.lock();
        match state.gains.get_mut(&gain) {
            Some(node) => f(node),
            None => trace!(?gain, "automation on unknown gain node ignored"),
        }
    }
}

impl AudioOutput for SoftwareGraph {
    fn current_time(&self) -> f64 {
        self.state.lock().frames_rendered as f64 / self.sample_rate as f64
    }

    fn resume(&self) {
        self.state.lock().running = true;
    }

    fn create_gain(&self, initial: f32) -> GainId {
        let mut state = self.state.lock();
        let id = GainId(state.next_gain);
        state.next_gain += 1;
        state.gains.insert(
            id,
            GainNode {
                param: GainParam::new(initial),
                destinations: HashSet::new(),
                released: false,
            },
        );
        id
    }

    fn connect(&self, gain: GainId, destination: Destination) {
        self.with_gain(gain, |node| {
            node.destinations.insert(destination);
        });
    }

    fn set_gain_at(&self, gain: GainId, value: f32, time: f64) {
        self.with_gain(gain, |node| {
            node.param.insert(AutomationEvent {
                kind: AutomationKind::Set,
                time,
                value,
            });
        });
    }

    fn ramp_gain_to(&self, gain: GainId, value: f32, end_time: f64) {
        self.with_gain(gain, |node| {
            node.param.insert(AutomationEvent {
                kind: AutomationKind::LinearRamp,
                time: end_time,
                value,
            });
        });
    }

    fn start_source(&self, buffer: PcmBuffer, gain: GainId, when: f64) {
        let start_frame = self.seconds_to_frame(when);
        let mut state = self.state.lock();
        // A source scheduled in the past starts immediately, as in Web Audio.
        let start_frame = start_frame.max(state.frames_rendered);
        state.sources.push(ScheduledSource {
            buffer,
            gain,
            start_frame,
        });
    }

    fn release_gain(&self, gain: GainId) {
        self.with_gain(gain, |node| node.released = true);
    }
}
