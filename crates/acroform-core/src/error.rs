use thiserror::Error;

/// Fatal failures of a survey or injection run
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Failed to parse PDF: {0}")]
    Unreadable(String),

    #[error("Failed to serialize PDF: {0}")]
    Serialization(String),

    #[error("Malformed document structure: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-field write failures. Never fatal for a whole injection run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Field not found: {0}")]
    NotFound(String),

    #[error("Field '{name}' is a {actual} field, not {expected}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Field '{0}' has an unusable structure")]
    Malformed(String),
}
