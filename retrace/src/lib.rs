//! Record-and-replay of desktop GUI interactions
//!
//! A [`Script`] is an ordered list of [`Step`]s. The [`runner::Runner`] replays
//! it, resolving each step's [`Target`] through the [`Locator`] cascade:
//! structural lookup, OCR fuzzy text, template pixels, then literal
//! coordinates. Platform access goes through the collaborator traits in
//! [`platforms`], bundled together in a [`Desktop`].

use std::sync::Arc;
use tracing::instrument;

pub mod diagnostics;
pub mod element;
pub mod errors;
pub mod extract;
pub mod fuzzy;
pub mod helpers;
pub mod input;
pub mod locator;
pub mod platforms;
pub mod runner;
pub mod selector;
pub mod template;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;

pub use element::{UIElement, UIElementAttributes, UIElementImpl};
pub use errors::{AutomationError, FailureKind, RunFailure};
pub use input::{Hotkey, InputSnapshot, Key};
pub use locator::{Locator, LocatorOptions, MatchResult, Strategy};
pub use platforms::{
    AccessibilityEngine, ForegroundWindow, InputInjector, InputStatePoller, OcrEngine, OcrResult,
    OcrWord, ScreenCapturer,
};
pub use runner::{RunEvent, RunOutcome, RunState, Runner, RunnerConfig};
pub use selector::Selector;
pub use types::{Action, Offset, Point, Rect, Scope, ScreenshotResult, Script, Step, Target};

/// The platform collaborators a run or a recording talks to
#[derive(Clone)]
pub struct Desktop {
    engine: Arc<dyn AccessibilityEngine>,
    input: Arc<dyn InputInjector>,
    screen: Arc<dyn ScreenCapturer>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl Desktop {
    pub fn new(
        engine: Arc<dyn AccessibilityEngine>,
        input: Arc<dyn InputInjector>,
        screen: Arc<dyn ScreenCapturer>,
    ) -> Self {
        Self {
            engine,
            input,
            screen,
            ocr: None,
        }
    }

    /// Attach a text recognition provider. Without one, OCR strategies miss
    /// and OCR actions fail with `RecognitionUnavailable`.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    pub fn input(&self) -> &Arc<dyn InputInjector> {
        &self.input
    }

    pub fn screen(&self) -> &Arc<dyn ScreenCapturer> {
        &self.screen
    }

    pub fn ocr(&self) -> Result<&Arc<dyn OcrEngine>, AutomationError> {
        self.ocr.as_ref().ok_or_else(|| {
            AutomationError::RecognitionUnavailable("no OCR engine configured".to_string())
        })
    }

    #[instrument(skip(self, target))]
    pub fn locator(&self, target: Target) -> Locator {
        Locator::new(self.clone(), target)
    }

    #[instrument(skip(self))]
    pub fn focused_element(&self) -> Result<Option<UIElement>, AutomationError> {
        self.engine.focused_element()
    }

    #[instrument(skip(self, screenshot))]
    pub async fn ocr_screenshot(
        &self,
        screenshot: &ScreenshotResult,
    ) -> Result<OcrResult, AutomationError> {
        self.ocr()?.recognize(screenshot).await
    }
}

impl std::fmt::Debug for Desktop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desktop")
            .field("ocr", &self.ocr.is_some())
            .finish_non_exhaustive()
    }
}
