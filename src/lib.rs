// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)] // Duplicate match arms

// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains

// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![cfg_attr(not(test), warn(clippy::unwrap_used))] // Avoids using `unwrap()`

// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_const_for_fn)] // Suggests making eligible functions `const`
#![deny(missing_docs)] // Documentation is a must for release

//! # live_music_session
//!
//! Client-side session manager for real-time generative music streams that are
//! steered by weighted text prompts.
//!
//! ## Overview
//!
//! A remote service pushes short chunks of 16-bit PCM audio over a live
//! connection. [`SessionManager`] sits between that connection and the audio
//! output:
//!
//! - connects on demand and shares one in-flight connection between callers
//! - schedules decoded chunks back to back behind a fixed pre-roll so short
//!   network jitter is never heard
//! - tracks playback as one of `stopped`, `loading`, `playing` or `paused`
//! - reconnects automatically after a dropped connection, a bounded number of
//!   times with a fixed back-off, and resumes playback if it was playing
//! - submits the active weighted prompts, rate limited while the user drags a
//!   knob
//!
//! The UI side never calls back into the manager to learn what happened; it
//! subscribes to [`SessionEvent`]s.
//!
//! ## Seams
//!
//! The streaming service is reached through the [`MusicClient`] and
//! [`LiveSession`] traits and audio leaves through [`AudioOutput`]. The crate
//! ships [`SoftwareGraph`], an in-memory implementation of the output graph,
//! and with the `playback` feature `DeviceOutput`, which renders it to the
//! default output device via `cpal`.
//!
//! ## Features
//!
//! - `playback`: hardware output through `cpal`
//! - `test-support`: exposes the in-memory fakes in `testing` to other crates
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use live_music_session::{
//!     SessionConfig, SessionEvent, SessionManager, SoftwareGraph, WeightedPrompt, prompt_map,
//! };
//! use std::sync::Arc;
//!
//! let graph = Arc::new(SoftwareGraph::new(48000, 2));
//! let manager = SessionManager::new(client, graph, SessionConfig::default())?;
//! let mut events = manager.subscribe();
//!
//! manager
//!     .set_weighted_prompts(prompt_map([
//!         WeightedPrompt::new("p0", "Bossa Nova", 1.0),
//!         WeightedPrompt::new("p1", "Chillwave", 0.4),
//!     ]))
//!     .await;
//! manager.play().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::Error(message) = event {
//!         eprintln!("{message}");
//!     }
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through `tracing`: connection and state changes at `info`
//! and `debug`, recoverable faults at `warn`, per-chunk scheduling at `trace`.
//! Install any `tracing` subscriber to see them.

pub mod chunk;
pub mod config;
pub mod error;
pub mod events;
pub mod output;
pub mod prompt;
pub mod session;
pub mod throttle;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crate::chunk::{AudioChunk, PcmBuffer, decode_chunk};
pub use crate::config::{DEFAULT_MODEL, SessionConfig};
pub use crate::error::{SessionError, SessionResult};
pub use crate::events::{EventBus, SessionEvent, messages};
#[cfg(feature = "playback")]
pub use crate::output::DeviceOutput;
pub use crate::output::{AudioOutput, Destination, GainId, SoftwareGraph};
pub use crate::prompt::{
    FilteredPrompt, FilteredPromptSet, PromptMap, WeightedPrompt, active_prompts, prompt_map,
};
pub use crate::session::{
    LiveSession, MusicClient, PlaybackState, ServerContent, ServerMessage, SessionManager,
    TransportEvent, TransportReceiver, TransportSender,
};
pub use crate::throttle::{Throttle, ThrottleDecision};
