use std::error::Error;

/// Errors surfaced by the scheduler facade.
#[derive(Debug)]
pub enum SchedulerError {
    InvalidArgument(String),
    AssetNotFound(String),
    NoRuntime(String),
    TaskJoinError(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::InvalidArgument(s) => write!(f, "Invalid argument: {}", s),
            SchedulerError::AssetNotFound(s) => write!(f, "Sound asset not found: {}", s),
            SchedulerError::NoRuntime(s) => write!(f, "No async runtime available: {}", s),
            SchedulerError::TaskJoinError(e) => write!(f, "Processing loop join error: {}", e),
        }
    }
}

impl Error for SchedulerError {}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(e: tokio::task::JoinError) -> Self {
        SchedulerError::TaskJoinError(e.to_string())
    }
}
