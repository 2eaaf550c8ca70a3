use crate::error::{RecorderError, Result};
use crate::events::{InputOrigin, MouseButton, RawInputEvent, RawInputKind, RecorderEvent};
use crate::input::{InputSink, RawInputSource};
use futures::Stream;
use image::RgbaImage;
use retrace::{
    Action, Desktop, Hotkey, InputStatePoller, Key, Point, Rect, ScreenshotResult, Script, Step,
    UIElement,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

mod debounce;
mod timeline;
mod typing;

pub use debounce::ClickDebouncer;
pub use typing::TypingBuffer;

/// Configuration for the recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Input arriving this soon after start is ignored (milliseconds)
    pub settle_window_ms: u64,

    /// Two click notifications closer than this in time are one click (milliseconds)
    pub debounce_ms: u64,

    /// ...and closer than this in space (pixels)
    pub debounce_distance_px: u32,

    /// Pending typed text is committed after this much silence (milliseconds)
    pub idle_flush_ms: u64,

    /// Interval of the redundancy poll and idle check (milliseconds)
    pub poll_interval_ms: u64,

    pub stop_hotkey: Hotkey,

    /// Only record clicks landing in this process. `None` records everything.
    pub process_name: Option<String>,

    /// Attach a reference image to every click, not only weak targets
    pub capture_images: bool,

    /// Where reference images are written. Without one, no image is attached.
    pub image_dir: Option<PathBuf>,

    /// Margin around element bounds when cropping a reference image (pixels)
    pub crop_padding_px: u32,

    /// Side of the square cropped around a click with no element (pixels)
    pub fallback_crop_size: u32,

    /// Publish a highlighted full-screen frame with every click
    pub capture_timeline: bool,

    /// RGBA of the timeline highlight
    pub highlight_color: [u8; 4],
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            settle_window_ms: 400,
            debounce_ms: 250,
            debounce_distance_px: 4,
            idle_flush_ms: 1500,
            poll_interval_ms: 50,
            stop_hotkey: Hotkey::default(),
            process_name: None,
            capture_images: false,
            image_dir: None,
            crop_padding_px: 6,
            fallback_crop_size: 48,
            capture_timeline: true,
            highlight_color: [255, 0, 0, 255],
        }
    }
}

/// Primary recorder state. Pausing is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopping,
}

/// Everything the hook thread, the poll thread and the owner mutate.
struct Session {
    state: RecorderState,
    paused: bool,
    started_at: Option<Instant>,
    script: Script,
    debouncer: ClickDebouncer,
    typing: TypingBuffer,
    /// Tab moved focus; the next typed char re-resolves where it lands.
    focus_moved: bool,
    last_click: Option<Point>,
    modifiers: HashSet<Key>,
    poll_button_down: bool,
    stop_requested: bool,
}

impl Session {
    fn idle(config: &RecorderConfig) -> Self {
        Self {
            state: RecorderState::Idle,
            paused: false,
            started_at: None,
            script: Script::new(config.process_name.clone().unwrap_or_default()),
            debouncer: ClickDebouncer::new(
                Duration::from_millis(config.debounce_ms),
                config.debounce_distance_px as f64,
            ),
            typing: TypingBuffer::new(),
            focus_moved: false,
            last_click: None,
            modifiers: HashSet::new(),
            poll_button_down: false,
            stop_requested: false,
        }
    }
}

struct Shared {
    config: RecorderConfig,
    desktop: Desktop,
    session: Mutex<Session>,
    event_tx: broadcast::Sender<RecorderEvent>,
}

/// Records clicks and typing into a [`Script`].
///
/// Raw events from the hook and from the poll are serialized through one
/// lock; no step is appended outside it.
pub struct Recorder {
    shared: Arc<Shared>,
    source: Option<Arc<dyn RawInputSource>>,
    poller: Option<Arc<dyn InputStatePoller>>,
    stop_indicator: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn new(desktop: Desktop, config: RecorderConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let session = Mutex::new(Session::idle(&config));
        Self {
            shared: Arc::new(Shared {
                config,
                desktop,
                session,
                event_tx,
            }),
            source: None,
            poller: None,
            stop_indicator: Arc::new(AtomicBool::new(false)),
            ticker: None,
        }
    }

    pub fn with_input_source(mut self, source: Arc<dyn RawInputSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds the fixed-interval poll that backs up the hook for clicks and the
    /// stop hotkey.
    pub fn with_poller(mut self, poller: Arc<dyn InputStatePoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Get a stream of events
    pub fn event_stream(&self) -> impl Stream<Item = RecorderEvent> {
        let mut rx = self.shared.event_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Recorder event stream lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn state(&self) -> RecorderState {
        self.shared.session().state
    }

    pub fn is_paused(&self) -> bool {
        self.shared.session().paused
    }

    /// True once the stop hotkey was seen in this session.
    pub fn stop_requested(&self) -> bool {
        self.shared.session().stop_requested
    }

    pub fn last_click(&self) -> Option<Point> {
        self.shared.session().last_click
    }

    /// Steps recorded so far.
    pub fn steps(&self) -> Vec<Step> {
        self.shared.session().script.steps.clone()
    }

    /// Start recording
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        {
            let mut session = self.shared.session();
            if session.state != RecorderState::Idle {
                return Err(RecorderError::InvalidState(format!(
                    "cannot start while {:?}",
                    session.state
                )));
            }
            *session = Session::idle(&self.shared.config);
            session.state = RecorderState::Recording;
            session.started_at = Some(Instant::now());
        }

        if let Some(source) = &self.source {
            let shared = Arc::clone(&self.shared);
            let sink: InputSink = Arc::new(move |event| shared.handle_event(event));
            if let Err(e) = source.start(sink) {
                self.shared.session().state = RecorderState::Idle;
                return Err(e);
            }
        }

        self.stop_indicator.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let poller = self.poller.clone();
        let stop_indicator = Arc::clone(&self.stop_indicator);
        let interval = Duration::from_millis(self.shared.config.poll_interval_ms.max(1));
        let ticker = thread::Builder::new()
            .name("retrace-recorder-poll".to_string())
            .spawn(move || {
                debug!("Recorder poll thread started");
                while !stop_indicator.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if let Some(poller) = &poller {
                        shared.poll(poller.as_ref(), now);
                    }
                    shared.tick(now);
                    thread::sleep(interval);
                }
                debug!("Recorder poll thread stopped");
            });
        match ticker {
            Ok(handle) => self.ticker = Some(handle),
            Err(e) => {
                if let Some(source) = &self.source {
                    source.stop();
                }
                self.shared.session().state = RecorderState::Idle;
                return Err(RecorderError::InitializationError(format!(
                    "failed to spawn poll thread: {e}"
                )));
            }
        }

        info!(
            "Recording started (scope: {})",
            self.shared
                .config
                .process_name
                .as_deref()
                .unwrap_or("desktop")
        );
        self.shared.emit(RecorderEvent::Started);
        Ok(())
    }

    /// Suppresses capture until [`Recorder::resume`].
    pub fn pause(&self) -> Result<()> {
        self.set_paused(true)
    }

    pub fn resume(&self) -> Result<()> {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        let mut session = self.shared.session();
        if session.state != RecorderState::Recording {
            return Err(RecorderError::InvalidState(format!(
                "cannot {} while {:?}",
                if paused { "pause" } else { "resume" },
                session.state
            )));
        }
        if session.paused == paused {
            return Ok(());
        }
        session.paused = paused;
        info!("Recording {}", if paused { "paused" } else { "resumed" });
        self.shared.emit(if paused {
            RecorderEvent::Paused
        } else {
            RecorderEvent::Resumed
        });
        Ok(())
    }

    /// Feeds one raw event, as an input source would.
    pub fn handle_event(&self, event: RawInputEvent) {
        self.shared.handle_event(event);
    }

    /// Runs the idle-flush check at `now`. The poll thread calls this on
    /// every tick.
    pub fn tick(&self, now: Instant) {
        self.shared.tick(now);
    }

    /// Resolves once the stop hotkey has been pressed.
    pub async fn wait_for_stop_request(&self) {
        let mut rx = self.shared.event_tx.subscribe();
        if self.stop_requested() {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(RecorderEvent::StopRequested) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.stop_requested() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Stop recording: detach inputs, flush pending text and hand back the script.
    #[instrument(skip(self))]
    pub fn stop(&mut self) -> Result<Script> {
        {
            let mut session = self.shared.session();
            if session.state != RecorderState::Recording {
                return Err(RecorderError::InvalidState(format!(
                    "cannot stop while {:?}",
                    session.state
                )));
            }
            session.state = RecorderState::Stopping;
        }

        if let Some(source) = &self.source {
            source.stop();
        }
        self.stop_indicator.store(true, Ordering::SeqCst);
        if let Some(handle) = self.ticker.take() {
            if handle.join().is_err() {
                error!("Recorder poll thread panicked");
            }
        }

        let mut session = self.shared.session();
        if let Some(step) = session.typing.commit() {
            self.shared.append(&mut session, step, None);
        }
        let script = std::mem::replace(&mut session.script, Script::new(""));
        session.state = RecorderState::Idle;
        drop(session);

        info!("Recording stopped with {} steps", script.steps.len());
        self.shared.emit(RecorderEvent::Stopped {
            steps: script.steps.len(),
        });
        Ok(script)
    }

    /// [`Recorder::stop`], then write the script as JSON.
    pub fn stop_and_save(&mut self, path: impl AsRef<Path>) -> Result<Script> {
        let script = self.stop()?;
        script
            .save_to_file(path.as_ref())
            .map_err(|e| RecorderError::SaveError(e.to_string()))?;
        Ok(script)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.shared.session().state == RecorderState::Recording {
            if let Some(source) = &self.source {
                source.stop();
            }
        }
        self.stop_indicator.store(true, Ordering::SeqCst);
    }
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn handle_event(&self, event: RawInputEvent) {
        let mut session = self.session();
        self.process(&mut session, event);
    }

    fn process(&self, session: &mut Session, event: RawInputEvent) {
        match &event.kind {
            RawInputKind::KeyDown(key) if key.is_modifier() => {
                session.modifiers.insert(*key);
            }
            RawInputKind::KeyUp(key) => {
                session.modifiers.remove(key);
            }
            _ => {}
        }
        if session.state != RecorderState::Recording {
            return;
        }

        if let RawInputKind::KeyDown(key) = &event.kind {
            let mut pressed = session.modifiers.clone();
            pressed.insert(*key);
            if self.config.stop_hotkey.is_pressed(&pressed) {
                self.request_stop(session);
                return;
            }
        }

        if session.paused {
            return;
        }
        let settle = Duration::from_millis(self.config.settle_window_ms);
        if session
            .started_at
            .is_some_and(|started| event.at < started + settle)
        {
            debug!("Ignoring {:?} inside the settle window", event.kind);
            return;
        }

        match event.kind {
            RawInputKind::MouseDown { button, position } => {
                self.on_click(session, button, position, event.origin, event.at)
            }
            RawInputKind::KeyDown(Key::Enter) => self.on_commit_key(session, "{ENTER}"),
            RawInputKind::KeyDown(Key::Tab) => {
                self.on_commit_key(session, "{TAB}");
                session.typing.unbind();
                session.focus_moved = true;
            }
            RawInputKind::KeyDown(Key::Backspace) => session.typing.backspace(event.at),
            RawInputKind::Char(c) => {
                let chorded = [Key::Control, Key::Alt, Key::Meta]
                    .iter()
                    .any(|k| session.modifiers.contains(k));
                if chorded || c.is_control() {
                    return;
                }
                if std::mem::take(&mut session.focus_moved) {
                    self.bind_focused(session);
                }
                session.typing.push(c, event.at);
            }
            RawInputKind::KeyDown(_) | RawInputKind::KeyUp(_) => {}
        }
    }

    fn request_stop(&self, session: &mut Session) {
        if session.stop_requested {
            return;
        }
        session.stop_requested = true;
        info!("Stop hotkey {} pressed", self.config.stop_hotkey);
        self.emit(RecorderEvent::StopRequested);
    }

    fn poll(&self, poller: &dyn InputStatePoller, now: Instant) {
        let snapshot = poller.snapshot();
        let mut session = self.session();
        if session.state != RecorderState::Recording {
            return;
        }
        if self.config.stop_hotkey.is_pressed(&snapshot.pressed_keys) {
            self.request_stop(&mut session);
        }

        let was_down = session.poll_button_down;
        session.poll_button_down = snapshot.left_button_down;
        if was_down || !snapshot.left_button_down {
            return;
        }
        if let Some(position) = snapshot.cursor {
            let event = RawInputEvent::new(
                RawInputKind::MouseDown {
                    button: MouseButton::Left,
                    position,
                },
                InputOrigin::Poll,
            )
            .at(now);
            self.process(&mut session, event);
        }
    }

    fn tick(&self, now: Instant) {
        let mut session = self.session();
        if session.state != RecorderState::Recording || session.paused {
            return;
        }
        let idle = Duration::from_millis(self.config.idle_flush_ms);
        if session.typing.is_idle(now, idle) {
            if let Some(step) = session.typing.commit() {
                debug!("Flushing typed text after {:?} idle", idle);
                self.append(&mut session, step, None);
            }
        }
    }

    fn on_commit_key(&self, session: &mut Session, token: &str) {
        if let Some(step) = session.typing.commit() {
            self.append(session, step, None);
        }
        self.append(session, Step::new(Action::TypeText).with_value(token), None);
    }

    /// Binds typing to the focused element when it takes a value. The hook
    /// sees Tab before the application moves focus, so this runs lazily.
    fn bind_focused(&self, session: &mut Session) {
        match self.desktop.focused_element() {
            Ok(Some(element)) if element.supports_value() => {
                let target = element.to_target();
                if target.is_weak() {
                    // Weak targets replay as keystrokes at focus.
                    session.typing.unbind();
                } else {
                    debug!("Typing follows focus to {}", target);
                    session.typing.bind(target);
                }
            }
            Ok(_) => session.typing.unbind(),
            Err(e) => {
                warn!("Focused element lookup failed: {}", e);
                session.typing.unbind();
            }
        }
    }

    fn on_click(
        &self,
        session: &mut Session,
        button: MouseButton,
        position: Point,
        origin: InputOrigin,
        at: Instant,
    ) {
        if button != MouseButton::Left {
            debug!("Ignoring {:?} click at {}", button, position);
            return;
        }
        if !session.debouncer.accept(button, position, at) {
            debug!("Debounced duplicate click at {} from {:?}", position, origin);
            return;
        }

        let element = match self.desktop.engine().element_at_point(position) {
            Ok(element) => element,
            Err(e) => {
                warn!("Element lookup at {} failed: {}", position, e);
                None
            }
        };
        if !self.in_scope(element.as_ref()) {
            debug!("Click at {} is outside the recorded process", position);
            return;
        }

        if let Some(step) = session.typing.commit() {
            self.append(session, step, None);
        }

        let bounds = element
            .as_ref()
            .and_then(|e| e.bounds().ok())
            .filter(|b| !b.is_empty());
        let mut target = element.as_ref().map(UIElement::to_target).unwrap_or_default();
        let weak = target.is_weak();
        let want_image = weak || self.config.capture_images;
        let crop_rect = match bounds {
            Some(b) => b.inflate(self.config.crop_padding_px as i32),
            None => {
                let side = self.config.fallback_crop_size as i32;
                Rect::new(position.x - side / 2, position.y - side / 2, side, side)
            }
        };

        let shot = if want_image || self.config.capture_timeline {
            match self.desktop.screen().capture_virtual_screen() {
                Ok(shot) => Some(shot),
                Err(e) => {
                    warn!("Screen capture for click at {} failed: {}", position, e);
                    self.emit(RecorderEvent::CaptureFailed {
                        reason: e.to_string(),
                    });
                    None
                }
            }
        } else {
            None
        };

        let index = session.script.steps.len();
        if want_image {
            if let Some(shot) = &shot {
                target.image_path = self.save_crop(shot, crop_rect, index);
            }
        }
        let timeline = match (&shot, self.config.capture_timeline) {
            (Some(shot), true) => Some(Arc::new(timeline::highlight(
                shot,
                bounds.unwrap_or(crop_rect),
                self.config.highlight_color,
            ))),
            _ => None,
        };

        let mut step = Step::new(Action::Click);
        if element.is_none() || weak {
            // Last resort for replay when nothing else resolves.
            step = step.with_value(position.to_string());
        }

        session.focus_moved = false;
        match element.as_ref() {
            Some(e) if e.supports_value() => session.typing.bind(target.clone()),
            _ => session.typing.unbind(),
        }
        session.last_click = Some(position);
        self.append(session, step.with_target(target), timeline);
    }

    fn in_scope(&self, element: Option<&UIElement>) -> bool {
        let Some(wanted) = self.config.process_name.as_deref() else {
            return true;
        };
        let engine = self.desktop.engine();
        let owner = element
            .and_then(UIElement::process_id)
            .and_then(|pid| engine.process_name(pid))
            .or_else(|| {
                let window = self.desktop.screen().foreground_window()?;
                window
                    .process_id
                    .and_then(|pid| engine.process_name(pid))
                    .or(Some(window.app_name))
            });
        owner.is_some_and(|name| same_process(&name, wanted))
    }

    fn save_crop(&self, shot: &ScreenshotResult, region: Rect, index: usize) -> Option<String> {
        let Some(dir) = self.config.image_dir.as_ref() else {
            debug!("No image directory configured; step {} gets no reference image", index);
            return None;
        };
        let Some(crop) = shot.crop(&region) else {
            warn!("Crop {:?} lies outside the captured screen", region);
            self.emit(RecorderEvent::CaptureFailed {
                reason: format!("crop {region:?} is off screen"),
            });
            return None;
        };
        let path = dir.join(format!(
            "step{index:03}_{}.png",
            uuid::Uuid::new_v4().simple()
        ));
        let saved = std::fs::create_dir_all(dir)
            .map_err(|e| e.to_string())
            .and_then(|_| save_png(&crop.image, &path));
        match saved {
            Ok(()) => {
                debug!("Saved reference image {:?}", path);
                Some(path.to_string_lossy().into_owned())
            }
            Err(e) => {
                warn!("Failed to save reference image {:?}: {}", path, e);
                self.emit(RecorderEvent::CaptureFailed { reason: e });
                None
            }
        }
    }

    fn append(&self, session: &mut Session, step: Step, timeline: Option<Arc<RgbaImage>>) {
        let index = session.script.push(step.clone());
        info!("Recorded step {}: {} {}", index, step.action, step.value);
        self.emit(RecorderEvent::StepAppended {
            index,
            step,
            timeline,
        });
    }
}

fn save_png(image: &RgbaImage, path: &Path) -> std::result::Result<(), String> {
    image.save(path).map_err(|e| e.to_string())
}

/// Compares process names ignoring case and a trailing `.exe`.
fn same_process(a: &str, b: &str) -> bool {
    fn normalize(s: &str) -> String {
        let lower = s.trim().to_ascii_lowercase();
        lower
            .strip_suffix(".exe")
            .map(str::to_string)
            .unwrap_or(lower)
    }
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_process() {
        assert!(same_process("Notepad.exe", "notepad"));
        assert!(same_process(" calc ", "CALC.EXE"));
        assert!(!same_process("notepad++.exe", "notepad.exe"));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: RecorderConfig =
            serde_json::from_str(r#"{"process_name": "notepad.exe", "stop_hotkey": "Ctrl+Q"}"#)
                .unwrap();
        assert_eq!(config.process_name.as_deref(), Some("notepad.exe"));
        assert_eq!(config.stop_hotkey.to_string(), "CTRL+Q");
        assert_eq!(config.settle_window_ms, 400);
        assert_eq!(config.debounce_ms, 250);
        assert!(config.capture_timeline);
    }
}
