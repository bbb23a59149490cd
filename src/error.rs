//! Error types for the provider setup flow.

use serde::Serialize;

/// A validation rejection: the first rule the step violates.
///
/// Only one reason is surfaced per attempt (product choice — the user fixes
/// one thing at a time instead of facing a wall of errors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct Rejection {
    /// The field the rejection concerns, e.g. `"business_name"`.
    pub field: &'static str,
    /// Human-readable reason, shown to the user as-is.
    pub message: String,
}

impl Rejection {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the flow controller.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// User-correctable input problem. Never escalated beyond showing the
    /// reason.
    #[error("{0}")]
    Validation(#[from] Rejection),

    /// Persistence-layer rejection of a unique field (e.g. the username is
    /// already taken by another provider). Distinct from validation so the
    /// UI can name the field instead of showing a generic error.
    #[error("The {field} is already taken")]
    Conflict { field: String },

    /// Network/backend failure. Retryable; shown as "try again".
    #[error("Temporary failure, try again: {0}")]
    Transient(String),

    /// The session expired mid-flow; the caller should redirect to login.
    #[error("Session expired, sign in again")]
    AuthExpired,

    /// The setup record is closed; no transitions remain.
    #[error("Setup is already completed")]
    Completed,

    /// `advance()` was called on the final step; the only transition out of
    /// it is `complete()`.
    #[error("Already at the final step")]
    FinalStep,
}

/// Errors from the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("No stored progress for owner {0}")]
    NotFound(String),

    /// A unique constraint rejected the write. Carries the field name so the
    /// flow can map it to a specific user message.
    #[error("Unique constraint violated on {field}")]
    Conflict { field: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Authentication expired")]
    AuthExpired,
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => FlowError::Conflict { field },
            StoreError::AuthExpired => FlowError::AuthExpired,
            other => FlowError::Transient(other.to_string()),
        }
    }
}

/// Result type alias for the flow controller.
pub type Result<T> = std::result::Result<T, FlowError>;
