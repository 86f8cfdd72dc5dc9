use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Structured validation errors with field-level error mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationErrors {
    Single { field: String, message: String },
    Multiple { fields: HashMap<String, String> },
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationErrors::Single { field, message } => {
                write!(f, "{}: {}", field, message)
            }
            ValidationErrors::Multiple { fields } => {
                let errors: Vec<String> = fields
                    .iter()
                    .map(|(field, message)| format!("{}: {}", field, message))
                    .collect();
                write!(f, "Validation errors: {}", errors.join(", "))
            }
        }
    }
}

/// The custom error type for the crate.
///
/// Variants correspond to the error kinds in the taxonomy: most DB/IO/JSON
/// failures are `TransientBackendError` candidates at the call site (the
/// caller decides whether to retry), `NotFound`/`Conflict`/`Validation` map to
/// `PermanentBackendError`/`ValidationError`, and `FormatDetection`/`DuplicateSkip`
/// are spelled out explicitly because callers branch on them directly.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from the sqlx library.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// An error originating from IO operations (archive file reads).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A validation error with field-level details.
    #[error("validation error: {0}")]
    Validation(ValidationErrors),

    /// A not found error (resource does not exist).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict error (e.g. unique constraint already satisfied).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An archive did not match any registered extractor.
    #[error("format not recognized: tried {tried:?}")]
    FormatDetection { tried: Vec<String> },

    /// A backend failure judged transient (timeout, connection reset).
    #[error("transient backend error: {0}")]
    TransientBackend(String),

    /// A backend failure judged permanent (schema violation, dangling id).
    #[error("permanent backend error: {0}")]
    PermanentBackend(String),

    /// An internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An embedding-provider error.
    #[error("embedder error: {0}")]
    Embedder(String),
}

/// A type alias for `Result<T, Error>` to simplify function signatures.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Status code an external HTTP layer would use for this error.
    /// The core never depends on an HTTP crate; this is a plain mapping table.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::FormatDetection { .. } => 400,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::TransientBackend(_) => 503,
            _ => 500,
        }
    }

    /// Stable machine-readable code for logging/metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::FormatDetection { .. } => "FORMAT_DETECTION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::TransientBackend(_) => "TRANSIENT_BACKEND_ERROR",
            Error::PermanentBackend(_) => "PERMANENT_BACKEND_ERROR",
            Error::Sqlx(_) => "TRANSIENT_BACKEND_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Embedder(_) => "EMBEDDER_ERROR",
        }
    }
}
