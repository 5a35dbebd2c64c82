//! Look-ahead playback scheduler for streamed speech audio
//!
//! This crate provides the real-time half of the engine:
//! - An output-device contract mirroring a schedulable audio sink with a
//!   rampable gain stage and a suspendable clock
//! - A FIFO look-ahead scheduler that turns irregularly arriving chunks into
//!   gap-free playback, with a start gate and defined underrun behavior
//! - A deterministic virtual device for tests

pub mod device;
pub mod scheduler;

pub use device::{OutputDevice, ScheduledSource, SourceId, VirtualOutputDevice};
pub use scheduler::{PlaybackScheduler, PlaybackState};

use thiserror::Error;

/// Audio scheduling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Operation on a scheduler that has been disposed.
    #[error("scheduler is disposed")]
    Disposed,
}
