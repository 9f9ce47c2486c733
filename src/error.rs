use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Migration failed ({reason}); store restored from snapshot {snapshot}")]
    Migration { snapshot: String, reason: String },

    #[error("Store is locked by another process: {0}")]
    Locked(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Job '{0}' exceeded its time budget")]
    JobTimeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Process exit code for job-scope failures. Record-scope problems never
    /// surface as an `AppError`; quarantine (exit 1) is decided by the run report.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Schema(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Transport failures raised by the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("could not decompress {url}: {message}")]
    Decompress { url: String, message: String },
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decompress { .. } => false,
        }
    }
}

/// A payload-level parse failure: the extractor could not find the structure
/// it needs at all. The job logs it and moves on with zero records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("section '{0}' not found")]
    MissingSection(String),

    #[error("no table found after '{0}'")]
    MissingTable(String),

    #[error("invalid selector '{0}'")]
    BadSelector(String),

    #[error("payload is not valid UTF-8")]
    Encoding,
}

/// Record-scope failure. Logged and counted, never propagated past the linker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("parse: {0}")]
    Parse(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("unlinked: {0}")]
    Linkage(String),
}
