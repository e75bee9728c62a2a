use thiserror::Error;

/// Rejections raised when a request tries to change runtime settings.
///
/// The `Display` text is returned verbatim to HTTP clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Unsupported language code: {0}")]
    UnsupportedLanguage(String),
    #[error("Speech rate must be between {min} and {max} words per minute, got {rate}")]
    RateOutOfRange { rate: i64, min: u32, max: u32 },
    #[error("Detection interval must be at least 1 second, got {0}")]
    IntervalTooShort(i64),
    #[error("Invalid {field} {value:?}: expected a whole number")]
    NotANumber { field: &'static str, value: String },
}

/// Failures while producing or serving analysis reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("No conversation data available. Please have some conversations first.")]
    EmptyMemory,
    #[error("Invalid report name: {0}")]
    InvalidName(String),
    #[error("Report file not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
