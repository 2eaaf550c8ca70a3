use retrace::AutomationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Invalid recorder state: {0}")]
    InvalidState(String),

    #[error("Input source error: {0}")]
    InputSource(String),

    #[error("Save error: {0}")]
    SaveError(String),

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
