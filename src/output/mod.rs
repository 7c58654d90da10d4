//! Audio output graph abstraction.
//!
//! The session manager never touches an audio device directly. It schedules
//! decoded buffers and gain automation against an [`AudioOutput`], which owns
//! the audio clock:
//!
//! - buffer sources start at an exact clock time and play once
//! - each source feeds a gain node; gain nodes feed destinations
//! - gain values change either instantly at a time or by a linear ramp
//!
//! [`SoftwareGraph`] implements the graph in memory and can be rendered by any
//! pull-based backend; with the `playback` feature [`DeviceOutput`] renders it
//! to the default output device through cpal.

pub mod graph;

#[cfg(feature = "playback")]
pub mod device;

pub use graph::SoftwareGraph;

#[cfg(feature = "playback")]
pub use device::DeviceOutput;

use crate::chunk::PcmBuffer;

/// Handle to a gain node owned by an [`AudioOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GainId(pub u64);

/// Where a gain node sends its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The speakers
    Primary,
    /// An extra tap registered by the caller, e.g. a level analyser
    Auxiliary(u32),
}

/// A clocked audio graph that buffers can be scheduled on.
///
/// Times are audio clock seconds as returned by [`current_time`](Self::current_time).
pub trait AudioOutput: Send + Sync {
    /// Current audio clock in seconds.
    fn current_time(&self) -> f64;

    /// Let the clock run. Output created while suspended stays silent.
    fn resume(&self);

    /// Create a gain node set to `initial`, connected to nothing.
    fn create_gain(&self, initial: f32) -> GainId;

    /// Route a gain node to a destination. Connecting twice is a no-op.
    fn connect(&self, gain: GainId, destination: Destination);

    /// Set the gain to `value` from `time` on.
    fn set_gain_at(&self, gain: GainId, value: f32, time: f64);

    /// Ramp the gain linearly from the previous automation point to `value`
    /// at `end_time`.
    fn ramp_gain_to(&self, gain: GainId, value: f32, end_time: f64);

    /// Play `buffer` through `gain` starting exactly at `when`.
    fn start_source(&self, buffer: PcmBuffer, gain: GainId, when: f64);

    /// The caller will no longer reference `gain`. Sources already routed
    /// through it keep playing until they end.
    fn release_gain(&self, gain: GainId) {
        let _ = gain;
    }
}
