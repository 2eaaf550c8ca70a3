//! Forensic bundle written when a run halts on a failing step

use crate::errors::{AutomationError, FailureKind};
use crate::locator::StrategyAttempt;
use crate::platforms::{ForegroundWindow, ScreenCapturer};
use crate::types::Step;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SCREENSHOT_FILE: &str = "screen.png";
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub step_index: usize,
    pub action: String,
    pub target: String,
    pub value: String,
    pub attempts: u32,
    pub failure_kind: FailureKind,
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<StrategyAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_window: Option<ForegroundWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl DiagnosticsReport {
    pub fn new(
        run_id: &str,
        step_index: usize,
        step: &Step,
        attempts: u32,
        error: &AutomationError,
    ) -> Self {
        let strategies = match error {
            AutomationError::TargetNotFound { attempts, .. } => attempts.clone(),
            _ => Vec::new(),
        };
        Self {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            step_index,
            action: step.action.to_string(),
            target: step
                .target
                .as_ref()
                .map(|t| t.describe())
                .unwrap_or_else(|| "<none>".to_string()),
            value: step.value.clone(),
            attempts,
            failure_kind: error.kind(),
            error: error.to_string(),
            strategies,
            foreground_window: None,
            screenshot: None,
        }
    }
}

/// Writes `<dir>/<timestamp>_<run id>_step<N>/{screen.png,report.json}`.
///
/// Every failure in here is logged and swallowed; the caller only learns
/// whether a bundle directory exists.
pub fn write_bundle(
    dir: &Path,
    screen: &dyn ScreenCapturer,
    mut report: DiagnosticsReport,
) -> Option<PathBuf> {
    let folder = dir.join(format!(
        "{}_{}_step{}",
        report.timestamp.format("%Y%m%d_%H%M%S%.3f"),
        report.run_id,
        report.step_index
    ));
    if let Err(e) = std::fs::create_dir_all(&folder) {
        warn!("Failed to create diagnostics folder {:?}: {}", folder, e);
        return None;
    }

    report.foreground_window = screen.foreground_window();

    match screen.capture_virtual_screen() {
        Ok(shot) => {
            let path = folder.join(SCREENSHOT_FILE);
            match shot.image.save(&path) {
                Ok(()) => report.screenshot = Some(SCREENSHOT_FILE.to_string()),
                Err(e) => warn!("Failed to save diagnostics screenshot: {}", e),
            }
        }
        Err(e) => warn!("Failed to capture screen for diagnostics: {}", e),
    }

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            if let Err(e) = std::fs::write(folder.join(REPORT_FILE), json) {
                warn!("Failed to write diagnostics report: {}", e);
            }
        }
        Err(e) => warn!("Failed to serialize diagnostics report: {}", e),
    }

    info!("Diagnostics written to {:?}", folder);
    Some(folder)
}
