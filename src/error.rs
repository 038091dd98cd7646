//! Error types for LodeDB
//!
//! Provides a unified error type for all operations. Every variant maps to
//! one of the wire protocol error kinds via [`LodeError::wire_kind`]; I/O
//! and invariant failures collapse into `internal_error` on the wire.

use thiserror::Error;

/// Result type alias using LodeError
pub type Result<T> = std::result::Result<T, LodeError>;

/// Unified error type for LodeDB operations
#[derive(Debug, Error)]
pub enum LodeError {
    // -------------------------------------------------------------------------
    // I/O and storage errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt storage: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Statement errors
    // -------------------------------------------------------------------------
    #[error("parse error: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    // -------------------------------------------------------------------------
    // Authentication / authorization errors
    // -------------------------------------------------------------------------
    #[error("authentication required")]
    Unauthorized,

    #[error("bad credentials")]
    BadAuth,

    #[error("forbidden")]
    Forbidden,

    // -------------------------------------------------------------------------
    // Configuration and internal errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LodeError {
    /// Wire protocol error kind for the `"error"` field of a failure response.
    pub fn wire_kind(&self) -> &'static str {
        match self {
            LodeError::Parse(_) => "parse_error",
            LodeError::Schema(_) => "schema_error",
            LodeError::NotFound(_) => "not_found",
            LodeError::AlreadyExists(_) => "already_exists",
            LodeError::Unauthorized => "unauthorized",
            LodeError::BadAuth => "bad_auth",
            LodeError::Forbidden => "forbidden",
            LodeError::Io(_)
            | LodeError::Corrupt(_)
            | LodeError::Config(_)
            | LodeError::Internal(_) => "internal_error",
        }
    }
}
