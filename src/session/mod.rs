//! Live session lifecycle: connection, chunk scheduling, playback state and
//! prompt submission.

pub mod client;
pub mod jitter;
pub mod manager;
pub mod state;

#[cfg(test)]
mod tests;

pub use client::{
    LiveSession, MusicClient, ServerContent, ServerMessage, TransportEvent, TransportReceiver,
    TransportSender,
};
pub use jitter::{Admission, JitterBuffer};
pub use manager::SessionManager;
pub use state::{PlaybackState, ReconnectionContext};
