use image::RgbaImage;
use retrace::{Key, Point, Step};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Represents a mouse button
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Which input path observed an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputOrigin {
    /// The global event hook
    Hook,
    /// The fixed-interval state poll
    Poll,
}

/// What happened on the keyboard or pointer
#[derive(Debug, Clone, PartialEq)]
pub enum RawInputKind {
    MouseDown { button: MouseButton, position: Point },
    KeyDown(Key),
    KeyUp(Key),
    /// Text produced by a key press, after layout and shift state.
    Char(char),
}

/// A single notification from an input source
#[derive(Debug, Clone, PartialEq)]
pub struct RawInputEvent {
    pub kind: RawInputKind,
    pub origin: InputOrigin,
    pub at: Instant,
}

impl RawInputEvent {
    pub fn new(kind: RawInputKind, origin: InputOrigin) -> Self {
        Self {
            kind,
            origin,
            at: Instant::now(),
        }
    }

    pub fn click(position: Point) -> Self {
        Self::new(
            RawInputKind::MouseDown {
                button: MouseButton::Left,
                position,
            },
            InputOrigin::Hook,
        )
    }

    pub fn key_down(key: Key) -> Self {
        Self::new(RawInputKind::KeyDown(key), InputOrigin::Hook)
    }

    pub fn key_up(key: Key) -> Self {
        Self::new(RawInputKind::KeyUp(key), InputOrigin::Hook)
    }

    pub fn char(c: char) -> Self {
        Self::new(RawInputKind::Char(c), InputOrigin::Hook)
    }

    pub fn with_origin(mut self, origin: InputOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Overrides the observation time.
    pub fn at(mut self, at: Instant) -> Self {
        self.at = at;
        self
    }
}

/// Notifications published while recording
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Started,
    /// A step was appended to the script.
    StepAppended {
        index: usize,
        step: Step,
        /// Virtual-screen capture with the clicked bounds highlighted. Display only.
        timeline: Option<Arc<RgbaImage>>,
    },
    /// The stop hotkey was pressed; the owner is expected to call `stop`.
    StopRequested,
    Paused,
    Resumed,
    /// A capture or save failed and the event was recorded without it.
    CaptureFailed { reason: String },
    Stopped { steps: usize },
}
