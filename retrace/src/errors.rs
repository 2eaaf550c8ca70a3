use crate::locator::StrategyAttempt;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Target not found: {target} (tried: {})", format_attempts(.attempts))]
    TargetNotFound {
        target: String,
        attempts: Vec<StrategyAttempt>,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Text recognition unavailable: {0}")]
    RecognitionUnavailable(String),

    #[error("Input injection failed: {0}")]
    InjectionFailed(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Structural query timed out: {0}")]
    TransientQueryTimeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "nothing".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Caller-facing failure taxonomy of a halted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    TargetNotFound,
    AssertionFailed,
    RecognitionUnavailable,
    InjectionFailed,
    Cancelled,
    InvalidStep,
    Platform,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl AutomationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AutomationError::TargetNotFound { .. }
            | AutomationError::ElementNotFound(_)
            | AutomationError::TransientQueryTimeout(_) => FailureKind::TargetNotFound,
            AutomationError::AssertionFailed(_) => FailureKind::AssertionFailed,
            AutomationError::RecognitionUnavailable(_) => FailureKind::RecognitionUnavailable,
            AutomationError::InjectionFailed(_) => FailureKind::InjectionFailed,
            AutomationError::Cancelled => FailureKind::Cancelled,
            AutomationError::InvalidStep(_) | AutomationError::InvalidArgument(_) => {
                FailureKind::InvalidStep
            }
            AutomationError::PlatformError(_)
            | AutomationError::UnsupportedOperation(_)
            | AutomationError::Io(_)
            | AutomationError::Image(_)
            | AutomationError::Serialization(_) => FailureKind::Platform,
        }
    }

    /// Whether a failed step attempt may be retried from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::TargetNotFound | FailureKind::AssertionFailed | FailureKind::InjectionFailed
        )
    }
}

/// A run that halted on a step after exhausting its retry budget.
#[derive(Error, Debug)]
#[error("step {step_index} failed after {attempts} attempt(s): {source}")]
pub struct RunFailure {
    pub step_index: usize,
    pub attempts: u32,
    #[source]
    pub source: AutomationError,
    pub diagnostics: Option<PathBuf>,
}

impl RunFailure {
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}
