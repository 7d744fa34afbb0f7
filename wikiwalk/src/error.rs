use thiserror::Error;

/// The error taxonomy used across the builder, the read store, the search
/// engine, and (via `server`) the HTTP boundary. Each variant maps to
/// exactly one HTTP status in the server crate's `ResponseError` impl.
#[derive(Debug, Error)]
pub enum WikiwalkError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("cancelled")]
    Cancelled,

    #[error("corrupt database: {0}")]
    Corruption(String),

    #[error("build failed: {0}")]
    BuildFailure(String),

    #[error("store read failed: {0}")]
    Transient(String),
}

impl WikiwalkError {
    pub fn not_found(what: impl Into<String>) -> Self {
        WikiwalkError::NotFound(what.into())
    }

    pub fn bad_request(what: impl Into<String>) -> Self {
        WikiwalkError::BadRequest(what.into())
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        WikiwalkError::Corruption(what.into())
    }
}

pub type Result<T> = std::result::Result<T, WikiwalkError>;
