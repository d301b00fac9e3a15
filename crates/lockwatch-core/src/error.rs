use thiserror::Error;

/// Core error type for watchdog operations.
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WatchdogError {
    fn from(e: serde_json::Error) -> Self {
        WatchdogError::Serialization(e.to_string())
    }
}

/// Result type alias using WatchdogError.
pub type Result<T> = std::result::Result<T, WatchdogError>;
