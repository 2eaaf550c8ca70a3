//! Raw input sources feeding the recorder

use crate::error::Result;
use crate::events::RawInputEvent;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[cfg(feature = "rdev-hook")]
pub mod rdev_hook;

/// Callback invoked for every raw event, on the source's own thread.
pub type InputSink = Arc<dyn Fn(RawInputEvent) + Send + Sync>;

/// A global stream of pointer and keyboard events
pub trait RawInputSource: Send + Sync {
    /// Begins delivering events to `sink` until [`RawInputSource::stop`].
    fn start(&self, sink: InputSink) -> Result<()>;

    /// Detaches the sink. Events arriving afterwards are dropped.
    fn stop(&self);
}

/// A source driven by its owner, for hosts with their own hook or for tests
#[derive(Default)]
pub struct ManualInputSource {
    sink: Mutex<Option<InputSink>>,
}

impl ManualInputSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` if the source is started; returns whether it was delivered.
    pub fn emit(&self, event: RawInputEvent) -> bool {
        let sink = self.sink.lock().ok().and_then(|s| s.clone());
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => {
                debug!("Dropping {:?}: source not started", event.kind);
                false
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl RawInputSource for ManualInputSource {
    fn start(&self, sink: InputSink) -> Result<()> {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = None;
        }
    }
}
