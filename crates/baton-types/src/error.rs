use thiserror::Error;

/// Errors produced while constructing or parsing baton types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid AVU: {0}")]
    InvalidAvu(String),

    #[error("invalid metadata operation: {0}")]
    InvalidOperation(String),

    #[error("invalid access level: {0}")]
    InvalidAccessLevel(String),

    #[error("invalid access control entry: {0}")]
    InvalidAccess(String),
}
