//! Turns live clicks and typing into a replayable [`retrace::Script`].
//!
//! The [`Recorder`] consumes raw events from a [`RawInputSource`] (a global
//! hook) and, as a redundancy net, from a fixed-interval
//! [`retrace::InputStatePoller`]. Both feed the same locked state, so a click
//! seen twice is debounced into one step.

pub mod error;
pub mod events;
pub mod input;
pub mod recorder;

pub use error::*;
pub use events::*;
pub use input::{ManualInputSource, RawInputSource};
#[cfg(feature = "rdev-hook")]
pub use input::rdev_hook::RdevInputSource;
pub use recorder::{Recorder, RecorderConfig, RecorderState};
