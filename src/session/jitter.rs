//! Fixed-delay jitter buffer for gapless chunk scheduling.
//!
//! The first chunk after a (re)start is placed `buffer_time` seconds ahead of
//! the audio clock. Every later chunk starts exactly where the previous one
//! ends. If the clock overtakes the schedule the anchor is dropped and the next
//! chunk pre-rolls again; late chunks are never played.

/// Outcome of offering a chunk to the jitter buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Start the chunk at `start_at` (audio clock seconds).
    Scheduled {
        /// Exact start time
        start_at: f64,
        /// Whether this chunk opened a new pre-roll window
        preroll: bool,
    },
    /// The schedule fell behind the clock; the chunk is dropped.
    Underrun,
}

/// Tracks where the next chunk should start.
#[derive(Debug, Clone)]
pub struct JitterBuffer {
    buffer_time: f64,
    next_start_time: Option<f64>,
    epoch: u64,
}

impl JitterBuffer {
    /// Create a buffer with `buffer_time` seconds of pre-roll.
    pub const fn new(buffer_time: f64) -> Self {
        Self {
            buffer_time,
            next_start_time: None,
            epoch: 0,
        }
    }

    /// Pre-roll in seconds
    pub const fn buffer_time(&self) -> f64 {
        self.buffer_time
    }

    /// Start time of the next chunk, 0 when nothing is scheduled
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time.unwrap_or(0.0)
    }

    /// Counter bumped every time the anchor is dropped.
    ///
    /// A deferred pre-roll completion is only valid if the epoch it was
    /// created in is still current.
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Place a chunk of `duration` seconds given the clock reads `now`.
    pub fn admit(&mut self, now: f64, duration: f64) -> Admission {
        let (next, preroll) = match self.next_start_time {
            Some(next) => (next, false),
            None => (now + self.buffer_time, true),
        };

        if next < now {
            self.reset();
            return Admission::Underrun;
        }

        self.next_start_time = Some(next + duration);
        Admission::Scheduled {
            start_at: next,
            preroll,
        }
    }

    /// Drop the anchor so the next chunk pre-rolls.
    pub fn reset(&mut self) {
        self.next_start_time = None;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_chunk_prerolls() {
        let mut jitter = JitterBuffer::new(2.0);
        assert_eq!(
            jitter.admit(10.0, 0.5),
            Admission::Scheduled {
                start_at: 12.0,
                preroll: true
            }
        );
        assert_eq!(jitter.next_start_time(), 12.5);
    }

    #[test]
    fn test_chunks_are_back_to_back() {
        let mut jitter = JitterBuffer::new(2.0);
        let durations = [0.5, 0.25, 1.0, 0.125];
        let mut starts = Vec::new();
        let mut now = 0.0;

        for duration in durations {
            match jitter.admit(now, duration) {
                Admission::Scheduled { start_at, .. } => starts.push(start_at),
                Admission::Underrun => panic!("unexpected underrun"),
            }
            now += 0.3;
        }

        assert_eq!(starts, vec![2.0, 2.5, 2.75, 3.75]);
        for pair in starts.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_underrun_drops_chunk_and_forces_new_preroll() {
        let mut jitter = JitterBuffer::new(2.0);
        jitter.admit(0.0, 0.5);
        let epoch = jitter.epoch();

        assert_eq!(jitter.admit(3.0, 0.5), Admission::Underrun);
        assert_eq!(jitter.next_start_time(), 0.0);
        assert_ne!(jitter.epoch(), epoch);

        assert_eq!(
            jitter.admit(3.0, 0.5),
            Admission::Scheduled {
                start_at: 5.0,
                preroll: true
            }
        );
    }

    #[test]
    fn test_chunk_exactly_on_time_is_not_an_underrun() {
        let mut jitter = JitterBuffer::new(1.0);
        jitter.admit(0.0, 0.5);
        assert_eq!(
            jitter.admit(1.5, 0.5),
            Admission::Scheduled {
                start_at: 1.5,
                preroll: false
            }
        );
    }

    #[test]
    fn test_reset_forces_preroll() {
        let mut jitter = JitterBuffer::new(2.0);
        jitter.admit(0.0, 0.5);
        jitter.reset();
        assert!(matches!(
            jitter.admit(0.1, 0.5),
            Admission::Scheduled { preroll: true, .. }
        ));
    }
}
