//! In-memory collaborators for tests
//!
//! Everything here is deterministic and records what it was asked to do, so
//! tests can assert on the calls a run or a recording made.

use crate::element::{UIElement, UIElementImpl};
use crate::errors::AutomationError;
use crate::input::{InputSnapshot, Key};
use crate::platforms::{
    AccessibilityEngine, ForegroundWindow, InputInjector, InputStatePoller, OcrEngine, OcrResult,
    OcrWord, ScreenCapturer,
};
use crate::selector::Selector;
use crate::types::{Point, Rect, Scope, ScreenshotResult};
use image::RgbaImage;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A configurable element. Clones share their value and invoke counter.
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    automation_id: Option<String>,
    name: Option<String>,
    class_name: Option<String>,
    control_type: Option<String>,
    bounds: Option<Rect>,
    pid: Option<u32>,
    invokable: bool,
    editable: bool,
    text: Option<String>,
    value: Arc<Mutex<Option<String>>>,
    invocations: Arc<AtomicUsize>,
}

impl MockElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            bounds: Some(Rect::new(0, 0, 10, 10)),
            ..Self::default()
        }
    }

    /// An element with no name at all.
    pub fn anonymous() -> Self {
        Self {
            bounds: Some(Rect::new(0, 0, 10, 10)),
            ..Self::default()
        }
    }

    pub fn with_automation_id(mut self, id: &str) -> Self {
        self.automation_id = Some(id.to_string());
        self
    }

    pub fn with_class_name(mut self, class: &str) -> Self {
        self.class_name = Some(class.to_string());
        self
    }

    pub fn with_control_type(mut self, control_type: &str) -> Self {
        self.control_type = Some(control_type.to_string());
        self
    }

    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Bounds lookups fail, as they do for elements that went off screen.
    pub fn without_bounds(mut self) -> Self {
        self.bounds = None;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn invokable(mut self) -> Self {
        self.invokable = true;
        self
    }

    /// Exposes a value pattern holding `value`.
    pub fn editable(mut self, value: &str) -> Self {
        self.editable = true;
        self.value = Arc::new(Mutex::new(Some(value.to_string())));
        self
    }

    pub fn current_value(&self) -> Option<String> {
        self.value.lock().ok().and_then(|v| v.clone())
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn to_element(&self) -> UIElement {
        UIElement::new(self.clone())
    }
}

impl UIElementImpl for MockElement {
    fn automation_id(&self) -> Option<String> {
        self.automation_id.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn class_name(&self) -> Option<String> {
        self.class_name.clone()
    }

    fn control_type(&self) -> Option<String> {
        self.control_type.clone()
    }

    fn bounds(&self) -> Result<Rect, AutomationError> {
        self.bounds
            .ok_or_else(|| AutomationError::PlatformError("element has no bounds".to_string()))
    }

    fn process_id(&self) -> Option<u32> {
        self.pid
    }

    fn supports_invoke(&self) -> bool {
        self.invokable
    }

    fn invoke(&self) -> Result<(), AutomationError> {
        if !self.invokable {
            return Err(AutomationError::UnsupportedOperation("not invokable".into()));
        }
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_value(&self) -> bool {
        self.editable
    }

    fn value(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.current_value())
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        if !self.editable {
            return Err(AutomationError::UnsupportedOperation("read only".into()));
        }
        if let Ok(mut v) = self.value.lock() {
            *v = Some(value.to_string());
        }
        Ok(())
    }

    fn text(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.text.clone())
    }
}

/// A flat UI tree keyed by process name.
#[derive(Default)]
pub struct MockEngine {
    elements: Mutex<Vec<(String, UIElement)>>,
    focused: Mutex<Option<UIElement>>,
    processes: Mutex<HashMap<u32, String>>,
    find_calls: AtomicUsize,
    transient_failures: AtomicU32,
    partial_matches: AtomicBool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element owned by `process` (empty for "any process").
    pub fn add(&self, process: &str, element: UIElement) {
        if let Some(pid) = element.process_id() {
            if !process.is_empty() {
                self.register_process(pid, process);
            }
        }
        if let Ok(mut elements) = self.elements.lock() {
            elements.push((process.to_string(), element));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut elements) = self.elements.lock() {
            elements.clear();
        }
    }

    pub fn register_process(&self, pid: u32, name: &str) {
        if let Ok(mut p) = self.processes.lock() {
            p.insert(pid, name.to_string());
        }
    }

    pub fn set_focused(&self, element: Option<UIElement>) {
        if let Ok(mut f) = self.focused.lock() {
            *f = element;
        }
    }

    /// The next `n` queries fail with a transient timeout.
    pub fn fail_next_queries(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Misbehave by answering with the first element sharing any field.
    pub fn return_partial_matches(&self, enabled: bool) {
        self.partial_matches.store(enabled, Ordering::SeqCst);
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    fn in_scope(scope: &Scope, process: &str) -> bool {
        match scope {
            Scope::Desktop => true,
            Scope::Process(name) => process.is_empty() || process.eq_ignore_ascii_case(name),
        }
    }
}

fn shares_any_field(selector: &Selector, element: &UIElement) -> bool {
    let eq = |want: &Option<String>, have: Option<String>| {
        want.as_deref()
            .is_some_and(|w| have.as_deref().is_some_and(|h| h.trim() == w))
    };
    eq(&selector.automation_id, element.automation_id())
        || eq(&selector.name, element.name())
        || eq(&selector.class_name, element.class_name())
        || eq(&selector.control_type, element.control_type())
}

impl AccessibilityEngine for MockEngine {
    fn find_first(
        &self,
        scope: &Scope,
        selector: &Selector,
    ) -> Result<Option<UIElement>, AutomationError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(AutomationError::TransientQueryTimeout(
                "mock provider busy".to_string(),
            ));
        }
        let partial = self.partial_matches.load(Ordering::SeqCst);
        let elements = self
            .elements
            .lock()
            .map_err(|_| AutomationError::PlatformError("mock tree poisoned".into()))?;
        Ok(elements
            .iter()
            .filter(|(process, _)| Self::in_scope(scope, process))
            .map(|(_, el)| el)
            .find(|el| {
                if partial {
                    shares_any_field(selector, el)
                } else {
                    selector.matches(el)
                }
            })
            .cloned())
    }

    fn element_at_point(&self, point: Point) -> Result<Option<UIElement>, AutomationError> {
        let elements = self
            .elements
            .lock()
            .map_err(|_| AutomationError::PlatformError("mock tree poisoned".into()))?;
        Ok(elements
            .iter()
            .map(|(_, el)| el)
            .find(|el| el.bounds().is_ok_and(|b| b.contains(point)))
            .cloned())
    }

    fn focused_element(&self) -> Result<Option<UIElement>, AutomationError> {
        Ok(self.focused.lock().ok().and_then(|f| f.clone()))
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.processes.lock().ok()?.get(&pid).cloned()
    }
}

/// OCR that answers from a script instead of looking at pixels.
///
/// Results are consumed in order; the last one repeats.
pub struct ScriptedOcr {
    results: Mutex<VecDeque<OcrResult>>,
    available: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<ScreenshotResult>>,
}

impl ScriptedOcr {
    pub fn new(results: Vec<OcrResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            available: true,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always returns these image-local words.
    pub fn words(words: &[(&str, Rect)]) -> Self {
        Self::new(vec![ocr_result(words)])
    }

    /// Always returns `text` with no word boxes.
    pub fn text(text: &str) -> Self {
        Self::new(vec![OcrResult {
            full_text: text.to_string(),
            words: Vec::new(),
        }])
    }

    /// Reports a missing recognition engine.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Images passed to `recognize`, in order.
    pub fn seen(&self) -> Vec<ScreenshotResult> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub fn ocr_result(words: &[(&str, Rect)]) -> OcrResult {
    OcrResult {
        full_text: words
            .iter()
            .map(|(t, _)| *t)
            .collect::<Vec<_>>()
            .join(" "),
        words: words
            .iter()
            .map(|(t, r)| OcrWord {
                text: t.to_string(),
                bounds: *r,
            })
            .collect(),
    }
}

#[async_trait::async_trait]
impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, image: &ScreenshotResult) -> Result<OcrResult, AutomationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(AutomationError::RecognitionUnavailable(
                "no language pack installed".to_string(),
            ));
        }
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(image.clone());
        }
        let mut results = self
            .results
            .lock()
            .map_err(|_| AutomationError::PlatformError("mock ocr poisoned".into()))?;
        Ok(if results.len() > 1 {
            results.pop_front().unwrap_or_default()
        } else {
            results.front().cloned().unwrap_or_default()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InjectedAction {
    Click(Point),
    Type(String),
    Clipboard(String),
    Keys(Vec<Key>),
}

/// Records every injection; can be told to fail the next few clicks.
#[derive(Default)]
pub struct RecordingInjector {
    actions: Mutex<Vec<InjectedAction>>,
    failing_clicks: AtomicU32,
    click_attempts: AtomicUsize,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_clicks(&self, n: u32) {
        self.failing_clicks.store(n, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<InjectedAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                InjectedAction::Click(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Successful and failed click calls.
    pub fn click_attempts(&self) -> usize {
        self.click_attempts.load(Ordering::SeqCst)
    }

    fn push(&self, action: InjectedAction) {
        if let Ok(mut a) = self.actions.lock() {
            a.push(action);
        }
    }
}

impl InputInjector for RecordingInjector {
    fn click_at(&self, point: Point) -> Result<(), AutomationError> {
        self.click_attempts.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_clicks.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_clicks.store(pending - 1, Ordering::SeqCst);
            return Err(AutomationError::InjectionFailed(format!(
                "click at {point} rejected"
            )));
        }
        self.push(InjectedAction::Click(point));
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        self.push(InjectedAction::Type(text.to_string()));
        Ok(())
    }

    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError> {
        self.push(InjectedAction::Clipboard(text.to_string()));
        Ok(())
    }

    fn send_key_combo(&self, keys: &[Key]) -> Result<(), AutomationError> {
        self.push(InjectedAction::Keys(keys.to_vec()));
        Ok(())
    }
}

/// A fixed virtual screen with an optional active-window rectangle.
pub struct SyntheticScreen {
    screen: Mutex<ScreenshotResult>,
    window: Mutex<Option<Rect>>,
    foreground: Mutex<Option<ForegroundWindow>>,
    failing: AtomicBool,
    captures: AtomicUsize,
}

impl SyntheticScreen {
    pub fn new(image: RgbaImage) -> Self {
        Self::at(image, 0, 0)
    }

    /// A virtual screen whose top-left pixel sits at `(x, y)`.
    pub fn at(image: RgbaImage, x: i32, y: i32) -> Self {
        Self {
            screen: Mutex::new(ScreenshotResult::new(image, x, y)),
            window: Mutex::new(None),
            foreground: Mutex::new(None),
            failing: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
        }
    }

    /// A blank screen of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255])))
    }

    pub fn set_image(&self, image: RgbaImage) {
        if let Ok(mut s) = self.screen.lock() {
            s.image = image;
        }
    }

    pub fn set_active_window(&self, rect: Rect) {
        if let Ok(mut w) = self.window.lock() {
            *w = Some(rect);
        }
    }

    pub fn set_foreground(&self, window: ForegroundWindow) {
        if let Ok(mut f) = self.foreground.lock() {
            *f = Some(window);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl ScreenCapturer for SyntheticScreen {
    fn capture_virtual_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AutomationError::PlatformError("capture blocked".to_string()));
        }
        self.screen
            .lock()
            .map(|s| s.clone())
            .map_err(|_| AutomationError::PlatformError("mock screen poisoned".into()))
    }

    fn capture_active_window(&self) -> Result<ScreenshotResult, AutomationError> {
        let screen = self.capture_virtual_screen()?;
        match self.window.lock().ok().and_then(|w| *w) {
            Some(rect) => screen.crop(&rect).ok_or_else(|| {
                AutomationError::PlatformError("active window is off screen".to_string())
            }),
            None => Ok(screen),
        }
    }

    fn foreground_window(&self) -> Option<ForegroundWindow> {
        self.foreground.lock().ok().and_then(|f| f.clone())
    }
}

/// Input state that tests set directly.
#[derive(Default)]
pub struct MockPoller {
    state: Mutex<InputSnapshot>,
}

impl MockPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, keys: &[Key]) {
        if let Ok(mut s) = self.state.lock() {
            s.pressed_keys.extend(keys.iter().copied());
        }
    }

    pub fn release_all(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.pressed_keys = HashSet::new();
        }
    }

    pub fn set_cursor(&self, point: Point) {
        if let Ok(mut s) = self.state.lock() {
            s.cursor = Some(point);
        }
    }

    pub fn set_left_button(&self, down: bool) {
        if let Ok(mut s) = self.state.lock() {
            s.left_button_down = down;
        }
    }
}

impl InputStatePoller for MockPoller {
    fn snapshot(&self) -> InputSnapshot {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Collaborators bundled for a test, with typed handles kept alongside.
pub struct MockDesktop {
    pub engine: Arc<MockEngine>,
    pub input: Arc<RecordingInjector>,
    pub screen: Arc<SyntheticScreen>,
}

impl MockDesktop {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(MockEngine::new()),
            input: Arc::new(RecordingInjector::new()),
            screen: Arc::new(SyntheticScreen::blank(200, 150)),
        }
    }

    pub fn with_screen(mut self, screen: SyntheticScreen) -> Self {
        self.screen = Arc::new(screen);
        self
    }

    pub fn desktop(&self) -> crate::Desktop {
        crate::Desktop::new(self.engine.clone(), self.input.clone(), self.screen.clone())
    }
}

impl Default for MockDesktop {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a debug-level subscriber writing through the test harness.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

fn noise_at(x: u32, y: u32) -> u64 {
    let mut v = ((x as u64) << 32 | y as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    v ^= v >> 31;
    v = v.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    v ^ (v >> 29)
}

/// Deterministic hashed pixels; no two small patches coincide.
pub fn noise_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = noise_at(x, y);
        image::Rgba([v as u8, (v >> 8) as u8, (v >> 16) as u8, 255])
    })
}

/// Single-channel counterpart of [`noise_rgba`].
pub fn noise_gray(width: u32, height: u32) -> image::GrayImage {
    image::GrayImage::from_fn(width, height, |x, y| image::Luma([noise_at(x, y) as u8]))
}
