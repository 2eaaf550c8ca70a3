//! The locator cascade: structural lookup, OCR fuzzy text, template pixels,
//! then literal coordinates. Each strategy runs only when the previous one
//! found nothing.

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::fuzzy;
use crate::helpers::sleep_cancellable;
use crate::selector::Selector;
use crate::template::{self, DEFAULT_MAX_DISSIMILARITY, DEFAULT_SCALES};
use crate::types::{Point, Rect, Scope, Target};
use crate::Desktop;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(6);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Which strategy produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Structural,
    OcrFuzzy,
    Template,
    LiteralCoordinate,
}

/// Fixed priority order of the cascade.
pub const CASCADE: [Strategy; 4] = [
    Strategy::Structural,
    Strategy::OcrFuzzy,
    Strategy::Template,
    Strategy::LiteralCoordinate,
];

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Structural => "structural",
            Strategy::OcrFuzzy => "ocr",
            Strategy::Template => "template",
            Strategy::LiteralCoordinate => "coordinates",
        };
        f.write_str(s)
    }
}

/// Why a strategy produced nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MissReason {
    EmptyTarget,
    Timeout(Duration),
    QueryError(String),
    NoBounds(String),
    Disabled,
    NoPrompt,
    NoImage,
    ImageUnreadable(String),
    CaptureFailed(String),
    RecognitionUnavailable(String),
    RecognitionFailed(String),
    BelowThreshold,
    NoCoordinates,
    UnparsableCoordinates(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::EmptyTarget => f.write_str("no structural fields"),
            MissReason::Timeout(d) => write!(f, "timed out after {d:?}"),
            MissReason::QueryError(e) => write!(f, "query error: {e}"),
            MissReason::NoBounds(e) => write!(f, "matched element has no bounds: {e}"),
            MissReason::Disabled => f.write_str("disabled"),
            MissReason::NoPrompt => f.write_str("no prompt"),
            MissReason::NoImage => f.write_str("no image"),
            MissReason::ImageUnreadable(e) => write!(f, "reference image unreadable: {e}"),
            MissReason::CaptureFailed(e) => write!(f, "capture failed: {e}"),
            MissReason::RecognitionUnavailable(e) => write!(f, "recognition unavailable: {e}"),
            MissReason::RecognitionFailed(e) => write!(f, "recognition failed: {e}"),
            MissReason::BelowThreshold => f.write_str("no candidate above threshold"),
            MissReason::NoCoordinates => f.write_str("no coordinates"),
            MissReason::UnparsableCoordinates(v) => write!(f, "unparsable coordinates '{v}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    pub reason: MissReason,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// A resolved screen location. Lives for one resolution attempt.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub strategy: Strategy,
    /// Where a physical click should land, before any target offset.
    pub point: Point,
    pub bounds: Rect,
    /// 1.0 for structural and literal hits, the fuzzy score for OCR,
    /// `1 - dissimilarity` for templates.
    pub score: f64,
    /// Only set for structural matches.
    pub element: Option<UIElement>,
}

/// Result of a single strategy. Errors are reserved for cancellation.
#[derive(Debug)]
pub enum StrategyOutcome {
    Found(MatchResult),
    Miss(MissReason),
}

/// Tuning knobs for the cascade
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub enable_ocr: bool,
    pub ocr_min_score: f64,
    pub ocr_fuzzy: bool,
    pub enable_template: bool,
    pub template_threshold: f64,
    pub template_scales: Vec<f64>,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            enable_ocr: true,
            ocr_min_score: 0.6,
            ocr_fuzzy: true,
            enable_template: true,
            template_threshold: DEFAULT_MAX_DISSIMILARITY,
            template_scales: DEFAULT_SCALES.to_vec(),
        }
    }
}

/// Resolves one [`Target`] to at most one screen location
#[derive(Clone)]
pub struct Locator {
    desktop: Desktop,
    target: Target,
    scope: Scope,
    options: LocatorOptions,
    prompt: Option<String>,
    literal: Option<String>,
}

impl Locator {
    pub(crate) fn new(desktop: Desktop, target: Target) -> Self {
        Self {
            desktop,
            target,
            scope: Scope::Desktop,
            options: LocatorOptions::default(),
            prompt: None,
            literal: None,
        }
    }

    /// Root structural lookups at a process instead of the whole desktop.
    pub fn within(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_options(mut self, options: LocatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Free text for the OCR strategy.
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Raw `x,y` value for the last-resort coordinate strategy.
    pub fn with_literal(mut self, literal: Option<String>) -> Self {
        self.literal = literal;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Runs the cascade in [`CASCADE`] order and returns the first hit.
    #[instrument(level = "debug", skip(self, cancel), fields(target = %self.target))]
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<MatchResult, AutomationError> {
        let mut attempts = Vec::with_capacity(CASCADE.len());
        for strategy in CASCADE {
            if cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }
            let outcome = match strategy {
                Strategy::Structural => self.find_structural(cancel).await?,
                Strategy::OcrFuzzy => self.find_by_ocr(cancel).await?,
                Strategy::Template => self.find_by_template(cancel).await?,
                Strategy::LiteralCoordinate => self.find_literal(),
            };
            match outcome {
                StrategyOutcome::Found(m) => {
                    info!(
                        "Resolved {} via {} at {} (score {:.3})",
                        self.target, m.strategy, m.point, m.score
                    );
                    return Ok(m);
                }
                StrategyOutcome::Miss(reason) => {
                    debug!("{strategy} strategy missed: {reason}");
                    attempts.push(StrategyAttempt { strategy, reason });
                }
            }
        }
        Err(AutomationError::TargetNotFound {
            target: self.target.describe(),
            attempts,
        })
    }

    /// Bounded poll of the structural provider with the conjunction of all
    /// non-empty target fields.
    pub async fn find_structural(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StrategyOutcome, AutomationError> {
        let selector = Selector::from_target(&self.target);
        if selector.is_empty() {
            return Ok(StrategyOutcome::Miss(MissReason::EmptyTarget));
        }

        let timeout = self.options.timeout;
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }

            // The provider call blocks; keep it off the async workers.
            let engine = self.desktop.engine().clone();
            let scope = self.scope.clone();
            let query = selector.clone();
            let found = task::spawn_blocking(move || engine.find_first(&scope, &query))
                .await
                .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?;

            match found {
                Ok(Some(element)) if selector.matches(&element) => {
                    // Without bounds there is no point to click; let the
                    // cascade fall through.
                    let bounds = match element.bounds() {
                        Ok(b) if !b.is_empty() => b,
                        Ok(b) => {
                            warn!("Matched element has empty bounds {b:?}");
                            return Ok(StrategyOutcome::Miss(MissReason::NoBounds(format!(
                                "empty rectangle {b:?}"
                            ))));
                        }
                        Err(e) => {
                            warn!("Matched element has no bounds: {e}");
                            return Ok(StrategyOutcome::Miss(MissReason::NoBounds(e.to_string())));
                        }
                    };
                    return Ok(StrategyOutcome::Found(MatchResult {
                        strategy: Strategy::Structural,
                        point: bounds.center(),
                        bounds,
                        score: 1.0,
                        element: Some(element),
                    }));
                }
                Ok(Some(element)) => {
                    warn!(
                        "Provider returned {:?} which does not satisfy {selector}; ignoring",
                        element
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Structural query for {selector} failed: {e}");
                    return Ok(StrategyOutcome::Miss(MissReason::QueryError(e.to_string())));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(StrategyOutcome::Miss(MissReason::Timeout(timeout)));
            }
            sleep_cancellable(self.options.poll_interval.min(deadline - now), cancel).await?;
        }
    }

    async fn find_by_ocr(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StrategyOutcome, AutomationError> {
        if !self.options.enable_ocr {
            return Ok(StrategyOutcome::Miss(MissReason::Disabled));
        }
        let Some(prompt) = self.prompt.as_deref() else {
            return Ok(StrategyOutcome::Miss(MissReason::NoPrompt));
        };
        find_text(
            &self.desktop,
            prompt,
            self.options.ocr_min_score,
            self.options.ocr_fuzzy,
            cancel,
        )
        .await
    }

    async fn find_by_template(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StrategyOutcome, AutomationError> {
        if !self.options.enable_template {
            return Ok(StrategyOutcome::Miss(MissReason::Disabled));
        }
        let Some(path) = self.target.image_path() else {
            return Ok(StrategyOutcome::Miss(MissReason::NoImage));
        };
        let reference = match image::open(path) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                warn!("Reference image {path} unreadable: {e}");
                return Ok(StrategyOutcome::Miss(MissReason::ImageUnreadable(e.to_string())));
            }
        };
        let screen = match self.desktop.screen().capture_virtual_screen() {
            Ok(s) => s,
            Err(e) => return Ok(StrategyOutcome::Miss(MissReason::CaptureFailed(e.to_string()))),
        };
        if cancel.is_cancelled() {
            return Err(AutomationError::Cancelled);
        }

        let threshold = self.options.template_threshold;
        let scales = self.options.template_scales.clone();
        let (origin_x, origin_y) = (screen.x, screen.y);
        let found = task::spawn_blocking(move || {
            let screen_gray = template::to_luminance(&screen.image);
            let tpl_gray = template::to_luminance(&reference);
            template::find_on_screen_multiscale(&screen_gray, &tpl_gray, threshold, &scales)
        })
        .await
        .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?;

        if cancel.is_cancelled() {
            return Err(AutomationError::Cancelled);
        }
        Ok(match found {
            Some(m) => {
                let bounds = Rect::new(
                    origin_x + m.x as i32,
                    origin_y + m.y as i32,
                    m.width as i32,
                    m.height as i32,
                );
                StrategyOutcome::Found(MatchResult {
                    strategy: Strategy::Template,
                    point: bounds.center(),
                    bounds,
                    score: 1.0 - m.dissimilarity,
                    element: None,
                })
            }
            None => StrategyOutcome::Miss(MissReason::BelowThreshold),
        })
    }

    fn find_literal(&self) -> StrategyOutcome {
        let Some(raw) = self.literal.as_deref().filter(|v| !v.trim().is_empty()) else {
            return StrategyOutcome::Miss(MissReason::NoCoordinates);
        };
        match Point::parse(raw) {
            Some(point) => StrategyOutcome::Found(MatchResult {
                strategy: Strategy::LiteralCoordinate,
                point,
                bounds: Rect::new(point.x, point.y, 1, 1),
                score: 1.0,
                element: None,
            }),
            None => StrategyOutcome::Miss(MissReason::UnparsableCoordinates(raw.to_string())),
        }
    }
}

/// OCR the foreground window and return the centroid of the best phrase for
/// `prompt`. Used by the cascade and by explicit smart clicks.
pub async fn find_text(
    desktop: &Desktop,
    prompt: &str,
    min_score: f64,
    fuzzy: bool,
    cancel: &CancellationToken,
) -> Result<StrategyOutcome, AutomationError> {
    let ocr = match desktop.ocr() {
        Ok(ocr) => ocr.clone(),
        Err(e) => {
            return Ok(StrategyOutcome::Miss(MissReason::RecognitionUnavailable(
                e.to_string(),
            )))
        }
    };
    let shot = match desktop.screen().capture_active_window() {
        Ok(s) => s,
        Err(e) => return Ok(StrategyOutcome::Miss(MissReason::CaptureFailed(e.to_string()))),
    };
    if cancel.is_cancelled() {
        return Err(AutomationError::Cancelled);
    }
    let result = match ocr.recognize(&shot).await {
        Ok(r) => r,
        Err(AutomationError::RecognitionUnavailable(e)) => {
            return Ok(StrategyOutcome::Miss(MissReason::RecognitionUnavailable(e)))
        }
        Err(e) => return Ok(StrategyOutcome::Miss(MissReason::RecognitionFailed(e.to_string()))),
    };
    if cancel.is_cancelled() {
        return Err(AutomationError::Cancelled);
    }

    let prompt_words = fuzzy::normalize_prompt(prompt).split(' ').count().max(1);
    let candidates = fuzzy::phrase_candidates(&result.words, prompt_words + 1);
    let best = fuzzy::best_match(
        candidates.iter().map(|w| w.text.as_str()),
        prompt,
        min_score,
        fuzzy,
    );
    Ok(match best {
        Some(m) => {
            let word = &candidates[m.index];
            let bounds = word.bounds.translate(shot.x, shot.y);
            debug!("OCR matched '{}' for prompt '{prompt}' ({:.3})", word.text, m.score);
            StrategyOutcome::Found(MatchResult {
                strategy: Strategy::OcrFuzzy,
                point: bounds.center(),
                bounds,
                score: m.score,
                element: None,
            })
        }
        None => StrategyOutcome::Miss(MissReason::BelowThreshold),
    })
}
