//! Collaborator seams: everything platform-owned lives behind these traits

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::input::{InputSnapshot, Key};
use crate::selector::Selector;
use crate::types::{Point, Rect, Scope, ScreenshotResult};

#[cfg(feature = "native-capture")]
pub mod xcap_screen;

#[cfg(feature = "native-capture")]
pub use xcap_screen::XcapScreen;

/// The structural query provider (OS UI tree)
pub trait AccessibilityEngine: Send + Sync {
    /// First element under `scope` matching every field of `selector`.
    ///
    /// Must return quickly; the caller owns the bounded wait. Infrastructure
    /// hiccups are reported as [`AutomationError::TransientQueryTimeout`].
    fn find_first(
        &self,
        scope: &Scope,
        selector: &Selector,
    ) -> Result<Option<UIElement>, AutomationError>;

    /// Deepest element at a screen point
    fn element_at_point(&self, point: Point) -> Result<Option<UIElement>, AutomationError>;

    /// Get the currently focused element
    fn focused_element(&self) -> Result<Option<UIElement>, AutomationError>;

    /// Process name for a process id, used to scope recordings
    fn process_name(&self, pid: u32) -> Option<String>;
}

/// A recognised word (or merged phrase) and where it sits in the image
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// Image-local pixel bounds.
    pub bounds: Rect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResult {
    pub full_text: String,
    pub words: Vec<OcrWord>,
}

/// The text recognition provider
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise text in an image. Reports a missing engine as
    /// [`AutomationError::RecognitionUnavailable`].
    async fn recognize(&self, image: &ScreenshotResult) -> Result<OcrResult, AutomationError>;
}

/// The input injection provider
pub trait InputInjector: Send + Sync {
    fn click_at(&self, point: Point) -> Result<(), AutomationError>;
    fn type_text(&self, text: &str) -> Result<(), AutomationError>;
    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError>;
    fn send_key_combo(&self, keys: &[Key]) -> Result<(), AutomationError>;
}

/// Identity of the foreground window, recorded in diagnostics
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForegroundWindow {
    pub title: String,
    pub app_name: String,
    pub process_id: Option<u32>,
}

/// Screen pixel capture. Every call returns an owned snapshot.
pub trait ScreenCapturer: Send + Sync {
    /// All monitors stitched into one image, origin at the virtual-screen corner
    fn capture_virtual_screen(&self) -> Result<ScreenshotResult, AutomationError>;

    /// Rendered pixels of the foreground window
    fn capture_active_window(&self) -> Result<ScreenshotResult, AutomationError>;

    fn capture_region(&self, region: Rect) -> Result<ScreenshotResult, AutomationError> {
        self.capture_virtual_screen()?.crop(&region).ok_or_else(|| {
            AutomationError::InvalidArgument(format!("region {region:?} is off screen"))
        })
    }

    fn foreground_window(&self) -> Option<ForegroundWindow>;
}

/// Fixed-interval reader of key and button state
pub trait InputStatePoller: Send + Sync {
    fn snapshot(&self) -> InputSnapshot;
}
