use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected locally, never sent over the wire.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Server error: HTTP {status}")]
    Server { status: u16 },
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    /// The dashboard tree had no entries at the named level.
    #[error("Dashboard has no {0}")]
    EmptyHierarchy(&'static str),
    #[error("Dashboard entry is missing `{0}`")]
    MissingField(&'static str),
    #[error("Failed to dispense water")]
    DispenseFailed,
}

impl Error {
    /// Whether a caller may reasonably try the same operation again
    /// (after refreshing the token for `Auth`, or backing off for `Server`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Server { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
