//! Sequential replay of a [`Script`]
//!
//! A [`Runner`] moves `Idle -> Running -> {Completed, Cancelled, Failed}`.
//! Steps run strictly in order; a failing step is retried from scratch
//! (target re-resolved) until the retry budget is spent. Every wait checks the
//! run's [`CancellationToken`], which the stop-hotkey watcher cancels.

use crate::diagnostics::{self, DiagnosticsReport};
use crate::errors::{AutomationError, FailureKind, RunFailure};
use crate::extract::{ExtractArgs, SmartFindArgs};
use crate::helpers::{sleep_cancellable, substitute_variables, variable_name};
use crate::input::{parse_key_sequence, Hotkey, Key, KeyChunk};
use crate::locator::{self, LocatorOptions, MatchResult, Strategy, StrategyAttempt, StrategyOutcome};
use crate::platforms::InputStatePoller;
use crate::types::{Action, Offset, Point, Scope, ScreenshotResult, Script, Step, Target};
use crate::Desktop;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Replay settings. Every field has a default, so partial JSON is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Extra attempts after the first failure of a step.
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub locator_timeout_ms: u64,
    pub locator_poll_interval_ms: u64,
    pub enable_ocr_fallback: bool,
    pub ocr_min_score: f64,
    pub ocr_fuzzy: bool,
    pub enable_template_fallback: bool,
    pub template_threshold: f64,
    pub template_scales: Vec<f64>,
    /// Default attempts for `OcrRead` when the recognised text is empty.
    pub ocr_read_retries: u32,
    pub ocr_read_delay_ms: u64,
    /// Where failure bundles go. `None` disables them.
    pub diagnostics_dir: Option<PathBuf>,
    pub stop_hotkey: Hotkey,
    pub hotkey_poll_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let locator = LocatorOptions::default();
        Self {
            retry_count: 2,
            retry_delay_ms: 500,
            locator_timeout_ms: locator.timeout.as_millis() as u64,
            locator_poll_interval_ms: locator.poll_interval.as_millis() as u64,
            enable_ocr_fallback: locator.enable_ocr,
            ocr_min_score: locator.ocr_min_score,
            ocr_fuzzy: locator.ocr_fuzzy,
            enable_template_fallback: locator.enable_template,
            template_threshold: locator.template_threshold,
            template_scales: locator.template_scales,
            ocr_read_retries: 3,
            ocr_read_delay_ms: 500,
            diagnostics_dir: None,
            stop_hotkey: Hotkey::default(),
            hotkey_poll_interval_ms: 100,
        }
    }
}

impl RunnerConfig {
    pub fn locator_options(&self) -> LocatorOptions {
        LocatorOptions {
            timeout: Duration::from_millis(self.locator_timeout_ms),
            poll_interval: Duration::from_millis(self.locator_poll_interval_ms.max(1)),
            enable_ocr: self.enable_ocr_fallback,
            ocr_min_score: self.ocr_min_score,
            ocr_fuzzy: self.ocr_fuzzy,
            enable_template: self.enable_template_fallback,
            template_threshold: self.template_threshold,
            template_scales: self.template_scales.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

/// Mutable state owned by one run
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Reference point for relative OCR regions.
    pub last_click: Option<Point>,
    pub variables: HashMap<String, String>,
    pub cancel: CancellationToken,
    pub diagnostics_dir: Option<PathBuf>,
}

/// Progress notifications for UIs and logs
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RowStarted {
        row: usize,
    },
    StepStarted {
        index: usize,
        action: Action,
    },
    StepRetrying {
        index: usize,
        attempt: u32,
        error: String,
    },
    StepSucceeded {
        index: usize,
        attempts: u32,
    },
    StepFailed {
        index: usize,
        attempts: u32,
        kind: FailureKind,
        error: String,
    },
    RunFinished {
        state: RunState,
    },
}

/// What a completed run leaves behind
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: RunState,
    pub steps_completed: usize,
    pub variables: HashMap<String, String>,
}

pub struct Runner {
    desktop: Desktop,
    config: RunnerConfig,
    poller: Option<Arc<dyn InputStatePoller>>,
    cancel: CancellationToken,
    state: Arc<Mutex<RunState>>,
    event_tx: broadcast::Sender<RunEvent>,
    run_id: String,
}

impl Runner {
    pub fn new(desktop: Desktop, config: RunnerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            desktop,
            config,
            poller: None,
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(RunState::Idle)),
            event_tx,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Watch the configured stop hotkey through this poller while running.
    pub fn with_poller(mut self, poller: Arc<dyn InputStatePoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Cancelling this token stops the run at its next wait or step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Failed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    pub fn event_stream(&self) -> impl Stream<Item = RunEvent> {
        let mut rx = self.event_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Run event stream lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Runs `script` once against one row of input variables.
    #[instrument(skip(self, script, variables), fields(run_id = %self.run_id, app = %script.app))]
    pub async fn run(
        &self,
        script: &Script,
        variables: HashMap<String, String>,
    ) -> Result<RunOutcome, RunFailure> {
        {
            let mut state = self.state.lock().map_err(|_| RunFailure {
                step_index: 0,
                attempts: 0,
                source: AutomationError::PlatformError("runner state poisoned".to_string()),
                diagnostics: None,
            })?;
            if *state != RunState::Idle {
                return Err(RunFailure {
                    step_index: 0,
                    attempts: 0,
                    source: AutomationError::InvalidStep(format!(
                        "runner already used (state {:?})",
                        *state
                    )),
                    diagnostics: None,
                });
            }
            *state = RunState::Running;
        }

        info!(
            "Run started: {} steps, scope {}",
            script.steps.len(),
            script.scope()
        );
        let watcher_done = CancellationToken::new();
        let watcher = self.spawn_hotkey_watcher(watcher_done.clone());

        let mut ctx = RunContext {
            last_click: None,
            variables,
            cancel: self.cancel.clone(),
            diagnostics_dir: self.config.diagnostics_dir.clone(),
        };
        let result = self.run_steps(script, &mut ctx).await;

        watcher_done.cancel();
        if let Some(handle) = watcher {
            let _ = handle.await;
        }

        let state = match &result {
            Ok(_) => RunState::Completed,
            Err(f) if f.kind() == FailureKind::Cancelled => RunState::Cancelled,
            Err(_) => RunState::Failed,
        };
        self.set_state(state);
        self.emit(RunEvent::RunFinished { state });
        match &result {
            Ok(_) => info!("Run completed"),
            Err(f) if state == RunState::Cancelled => warn!("Run cancelled at step {}", f.step_index),
            Err(f) => error!("Run failed: {}", f),
        }

        result.map(|steps_completed| RunOutcome {
            state,
            steps_completed,
            variables: ctx.variables,
        })
    }

    /// Runs the script once per data row, strictly in sequence, each row on
    /// a fresh runner. A failed row is reported and the batch moves on; a
    /// cancelled row ends the batch.
    #[instrument(skip(self, script, rows), fields(rows = rows.len()))]
    pub async fn run_rows(
        &self,
        script: &Script,
        rows: &[HashMap<String, String>],
    ) -> Vec<Result<RunOutcome, RunFailure>> {
        self.set_state(RunState::Running);
        let mut results = Vec::with_capacity(rows.len());
        let mut any_failed = false;
        let mut cancelled = false;
        for (row, variables) in rows.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            info!("Data row {}/{}", row + 1, rows.len());
            self.emit(RunEvent::RowStarted { row });
            let result = self.fork().run(script, variables.clone()).await;
            if let Err(f) = &result {
                if f.kind() == FailureKind::Cancelled {
                    cancelled = true;
                } else {
                    warn!("Row {} failed: {}", row, f);
                    any_failed = true;
                }
            }
            results.push(result);
            if cancelled {
                break;
            }
        }
        self.set_state(if cancelled {
            RunState::Cancelled
        } else if any_failed {
            RunState::Failed
        } else {
            RunState::Completed
        });
        results
    }

    /// A fresh runner sharing collaborators, events and the stop signal.
    fn fork(&self) -> Runner {
        Runner {
            desktop: self.desktop.clone(),
            config: self.config.clone(),
            poller: self.poller.clone(),
            cancel: self.cancel.child_token(),
            state: Arc::new(Mutex::new(RunState::Idle)),
            event_tx: self.event_tx.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn spawn_hotkey_watcher(&self, done: CancellationToken) -> Option<task::JoinHandle<()>> {
        let poller = self.poller.clone()?;
        let hotkey = self.config.stop_hotkey.clone();
        let cancel = self.cancel.clone();
        let interval = Duration::from_millis(self.config.hotkey_poll_interval_ms.max(1));
        Some(tokio::spawn(async move {
            loop {
                if hotkey.is_pressed(&poller.snapshot().pressed_keys) {
                    warn!("Stop hotkey {} pressed, cancelling run", hotkey);
                    cancel.cancel();
                    return;
                }
                tokio::select! {
                    _ = done.cancelled() => return,
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }))
    }

    async fn run_steps(&self, script: &Script, ctx: &mut RunContext) -> Result<usize, RunFailure> {
        let scope = script.scope();
        for (index, step) in script.steps.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(RunFailure {
                    step_index: index,
                    attempts: 0,
                    source: AutomationError::Cancelled,
                    diagnostics: None,
                });
            }
            match self.run_step(ctx, &scope, index, step).await {
                Ok(attempts) => {
                    info!("Step {} END action={} attempts={}", index, step.action, attempts);
                    self.emit(RunEvent::StepSucceeded { index, attempts });
                }
                Err((attempts, source)) => {
                    self.emit(RunEvent::StepFailed {
                        index,
                        attempts,
                        kind: source.kind(),
                        error: source.to_string(),
                    });
                    let diagnostics = if source.kind() == FailureKind::Cancelled {
                        None
                    } else {
                        self.write_diagnostics(ctx, index, step, attempts, &source)
                            .await
                    };
                    return Err(RunFailure {
                        step_index: index,
                        attempts,
                        source,
                        diagnostics,
                    });
                }
            }
        }
        Ok(script.steps.len())
    }

    /// Returns the number of attempts made, with the last error on failure.
    async fn run_step(
        &self,
        ctx: &mut RunContext,
        scope: &Scope,
        index: usize,
        step: &Step,
    ) -> Result<u32, (u32, AutomationError)> {
        self.emit(RunEvent::StepStarted {
            index,
            action: step.action,
        });
        if let Some(delay) = step.delay_ms.filter(|d| *d > 0) {
            debug!("Step {} pre-delay {}ms", index, delay);
            sleep_cancellable(Duration::from_millis(delay), &ctx.cancel)
                .await
                .map_err(|e| (0, e))?;
        }

        let retries = self.config.retry_count;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            info!(
                "Step {} BEGIN action={} attempt={}/{}",
                index,
                step.action,
                attempt,
                retries + 1
            );
            let err = match self.execute(ctx, scope, step).await {
                Ok(()) => return Ok(attempt),
                Err(e) => e,
            };
            if matches!(err, AutomationError::Cancelled) || !err.is_retryable() || attempt > retries
            {
                return Err((attempt, err));
            }
            warn!(
                "Step {} failed on attempt {}/{}: {}. Retrying...",
                index,
                attempt,
                retries + 1,
                err
            );
            self.emit(RunEvent::StepRetrying {
                index,
                attempt,
                error: err.to_string(),
            });
            sleep_cancellable(Duration::from_millis(self.config.retry_delay_ms), &ctx.cancel)
                .await
                .map_err(|e| (attempt, e))?;
        }
    }

    async fn write_diagnostics(
        &self,
        ctx: &RunContext,
        index: usize,
        step: &Step,
        attempts: u32,
        error: &AutomationError,
    ) -> Option<PathBuf> {
        let dir = ctx.diagnostics_dir.clone()?;
        let report = DiagnosticsReport::new(&self.run_id, index, step, attempts, error);
        let screen = self.desktop.screen().clone();
        match task::spawn_blocking(move || diagnostics::write_bundle(&dir, screen.as_ref(), report))
            .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!("Diagnostics task failed: {}", e);
                None
            }
        }
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        scope: &Scope,
        step: &Step,
    ) -> Result<(), AutomationError> {
        let value = substitute_variables(&step.value, &ctx.variables);
        match step.action {
            Action::Click => self.click(ctx, scope, step, &value).await,
            Action::SetText => self.set_text(ctx, scope, step, &value).await,
            Action::TypeText => self.type_text(ctx, &value).await,
            Action::PasteVar => self.paste_var(ctx, &step.value),
            Action::AssertExists => {
                let target = self.target_of(step, ctx)?;
                match self.locate(ctx, scope, target, None).await {
                    Ok(m) => {
                        debug!("Target exists via {}", m.strategy);
                        Ok(())
                    }
                    Err(AutomationError::TargetNotFound { target, attempts }) => {
                        Err(AutomationError::AssertionFailed(format!(
                            "expected {target} to exist ({})",
                            attempts
                                .iter()
                                .map(|a| a.to_string())
                                .collect::<Vec<_>>()
                                .join("; ")
                        )))
                    }
                    Err(e) => Err(e),
                }
            }
            Action::AssertTextEquals | Action::AssertTextContains => {
                let expected = value;
                let target = self.target_of(step, ctx)?;
                let m = self.locate(ctx, scope, target, None).await?;
                let actual = self.read_text(&m).await?;
                let pass = if step.action == Action::AssertTextEquals {
                    actual.trim() == expected.trim()
                } else {
                    actual.contains(expected.trim())
                };
                if pass {
                    Ok(())
                } else {
                    Err(AutomationError::AssertionFailed(format!(
                        "{}: expected '{}', found '{}'",
                        step.action, expected, actual
                    )))
                }
            }
            Action::SmartFindClick => self.smart_find_click(ctx, step, &value).await,
            Action::SmartExtract | Action::OcrRead => self.extract(ctx, step).await,
            Action::Delay => {
                let raw = value.trim();
                let ms = if raw.is_empty() {
                    0
                } else {
                    raw.parse::<u64>().map_err(|_| {
                        AutomationError::InvalidStep(format!("invalid delay '{raw}'"))
                    })?
                };
                debug!("Delay {}ms", ms);
                sleep_cancellable(Duration::from_millis(ms), &ctx.cancel).await
            }
        }
    }

    /// The step's target with `{{var}}` placeholders filled in.
    fn target_of(&self, step: &Step, ctx: &RunContext) -> Result<Target, AutomationError> {
        let target = step.target.clone().unwrap_or_default();
        let fill = |v: Option<String>| v.map(|s| substitute_variables(&s, &ctx.variables));
        Ok(Target {
            automation_id: fill(target.automation_id),
            name: fill(target.name),
            class_name: fill(target.class_name),
            control_type: fill(target.control_type),
            image_path: target.image_path,
            offset: target.offset,
        })
    }

    async fn locate(
        &self,
        ctx: &RunContext,
        scope: &Scope,
        target: Target,
        literal: Option<&str>,
    ) -> Result<MatchResult, AutomationError> {
        let has_literal = literal.is_some_and(|v| Point::parse(v).is_some());
        if target.is_empty() && !has_literal {
            return Err(AutomationError::InvalidStep(
                "target has no fields to resolve".to_string(),
            ));
        }
        let prompt = target.name().map(str::to_string);
        self.desktop
            .locator(target)
            .within(scope.clone())
            .with_options(self.config.locator_options())
            .with_prompt(prompt)
            .with_literal(literal.map(str::to_string))
            .resolve(&ctx.cancel)
            .await
    }

    async fn click(
        &self,
        ctx: &mut RunContext,
        scope: &Scope,
        step: &Step,
        value: &str,
    ) -> Result<(), AutomationError> {
        let target = self.target_of(step, ctx)?;
        let offset = target.offset;
        let m = self.locate(ctx, scope, target, Some(value)).await?;
        let point = click_point(&m, offset);

        if let Some(element) = m.element.as_ref().filter(|e| e.supports_invoke()) {
            match element.invoke() {
                Ok(()) => {
                    debug!("Invoked {:?}", element);
                    ctx.last_click = Some(point);
                    return Ok(());
                }
                Err(e) => warn!("Invoke failed, falling back to a physical click: {}", e),
            }
        }
        self.desktop.input().click_at(point).map_err(injection)?;
        ctx.last_click = Some(point);
        Ok(())
    }

    async fn set_text(
        &self,
        ctx: &mut RunContext,
        scope: &Scope,
        step: &Step,
        value: &str,
    ) -> Result<(), AutomationError> {
        let target = self.target_of(step, ctx)?;
        let offset = target.offset;
        let m = self.locate(ctx, scope, target, None).await?;
        let point = click_point(&m, offset);

        if let Some(element) = m.element.as_ref().filter(|e| e.supports_value()) {
            match element.set_value(value) {
                Ok(()) => {
                    ctx.last_click = Some(point);
                    return Ok(());
                }
                Err(e) => warn!("Value set failed, typing instead: {}", e),
            }
        }
        let input = self.desktop.input();
        input.click_at(point).map_err(injection)?;
        ctx.last_click = Some(point);
        input
            .send_key_combo(&[Key::Control, Key::Char('a')])
            .map_err(injection)?;
        input.type_text(value).map_err(injection)
    }

    async fn type_text(&self, ctx: &RunContext, value: &str) -> Result<(), AutomationError> {
        let input = self.desktop.input();
        for chunk in parse_key_sequence(value) {
            if ctx.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }
            match chunk {
                KeyChunk::Text(text) => input.type_text(&text).map_err(injection)?,
                KeyChunk::Combo(keys) => input.send_key_combo(&keys).map_err(injection)?,
            }
        }
        Ok(())
    }

    fn paste_var(&self, ctx: &RunContext, raw: &str) -> Result<(), AutomationError> {
        let name = variable_name(raw);
        let text = ctx.variables.get(name).ok_or_else(|| {
            AutomationError::InvalidStep(format!("unknown variable '{name}'"))
        })?;
        let input = self.desktop.input();
        input.set_clipboard(text).map_err(injection)?;
        input
            .send_key_combo(&[Key::Control, Key::Char('v')])
            .map_err(injection)
    }

    /// Structural matches read from the element; anything else is read back
    /// by OCR over the matched rectangle.
    async fn read_text(&self, m: &MatchResult) -> Result<String, AutomationError> {
        if let Some(element) = &m.element {
            return element.read_text();
        }
        let shot = self.desktop.screen().capture_region(m.bounds)?;
        let result = self.desktop.ocr_screenshot(&shot).await?;
        Ok(result.full_text.trim().to_string())
    }

    async fn smart_find_click(
        &self,
        ctx: &mut RunContext,
        step: &Step,
        value: &str,
    ) -> Result<(), AutomationError> {
        let args = SmartFindArgs::parse(value)?;
        let min_score = args.min_score.unwrap_or(self.config.ocr_min_score);
        let fuzzy = args.fuzzy.unwrap_or(self.config.ocr_fuzzy);
        match locator::find_text(&self.desktop, &args.prompt, min_score, fuzzy, &ctx.cancel).await? {
            StrategyOutcome::Found(m) => {
                let offset = step.target.as_ref().and_then(|t| t.offset);
                let point = click_point(&m, offset);
                self.desktop.input().click_at(point).map_err(injection)?;
                ctx.last_click = Some(point);
                Ok(())
            }
            StrategyOutcome::Miss(locator::MissReason::RecognitionUnavailable(msg)) => {
                Err(AutomationError::RecognitionUnavailable(msg))
            }
            StrategyOutcome::Miss(reason) => Err(AutomationError::TargetNotFound {
                target: format!("text '{}'", args.prompt),
                attempts: vec![StrategyAttempt {
                    strategy: Strategy::OcrFuzzy,
                    reason,
                }],
            }),
        }
    }

    async fn extract(&self, ctx: &mut RunContext, step: &Step) -> Result<(), AutomationError> {
        let args = ExtractArgs::parse(&step.value)?;
        let region = args.region(ctx.last_click)?;
        let default_retries = if step.action == Action::OcrRead {
            self.config.ocr_read_retries
        } else {
            0
        };
        let retries = args.retries.unwrap_or(default_retries);
        let delay = Duration::from_millis(args.delay_ms.unwrap_or(self.config.ocr_read_delay_ms));

        let mut text = String::new();
        for attempt in 0..=retries {
            let shot = self.desktop.screen().capture_region(region)?;
            let shot = if args.preprocess.is_noop() {
                shot
            } else {
                ScreenshotResult::new(args.preprocess.apply(&shot.image), shot.x, shot.y)
            };
            let result = self.desktop.ocr_screenshot(&shot).await?;
            text = args.post_process(&result.full_text);
            if !text.is_empty() || attempt == retries {
                break;
            }
            debug!(
                "OCR read empty on attempt {}/{}, retrying",
                attempt + 1,
                retries + 1
            );
            sleep_cancellable(delay, &ctx.cancel).await?;
        }

        let var = args.variable().to_string();
        if text.is_empty() {
            warn!("{} stored empty text into '{}'", step.action, var);
        } else {
            info!("{} stored '{}' into '{}'", step.action, text, var);
        }
        ctx.variables.insert(var, text);
        Ok(())
    }
}

/// Literal coordinates are exact; every other match honours the target offset.
fn click_point(m: &MatchResult, offset: Option<Offset>) -> Point {
    match (m.strategy, offset) {
        (Strategy::LiteralCoordinate, _) | (_, None) => m.point,
        (_, Some(off)) => m.point.offset(off.dx, off.dy),
    }
}

fn injection(e: AutomationError) -> AutomationError {
    match e {
        AutomationError::InjectionFailed(_) | AutomationError::Cancelled => e,
        other => AutomationError::InjectionFailed(other.to_string()),
    }
}
