use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use baton_rpc::{error_name, status, RpcError};
use baton_types::{EntityKind, TypeError};

/// Code reported for failures detected locally rather than by the server.
pub const LOCAL_ERROR_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum BatonError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("'{path}' is a {actual}, expected a {expected}")]
    WrongKind {
        path: String,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("{context}: error {status} {name}")]
    Rpc {
        context: String,
        status: i32,
        name: &'static str,
    },

    #[error("read {read} bytes but wrote {written} bytes to '{path}'")]
    ShortWrite { path: String, read: u64, written: u64 },

    #[error("checksum mismatch for '{path}': local MD5 {local}, server {remote}")]
    ChecksumMismatch {
        path: String,
        local: String,
        remote: String,
    },

    #[error("path '{0}' does not exist")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatonError {
    /// Numeric code: the server status for RPC failures, `-1` for local ones.
    pub fn code(&self) -> i32 {
        match self {
            Self::Rpc { status, .. } => *status,
            Self::NotFound(_) => status::USER_FILE_DOES_NOT_EXIST,
            Self::ChecksumMismatch { .. } => status::USER_CHKSUM_MISMATCH,
            _ => LOCAL_ERROR_CODE,
        }
    }

    /// Wrap an RPC failure with a description of what was attempted.
    pub fn rpc(context: impl Into<String>, err: RpcError) -> Self {
        Self::Rpc {
            context: context.into(),
            status: err.status,
            name: error_name(err.status),
        }
    }

    pub fn is_rpc_status(&self, code: i32) -> bool {
        matches!(self, Self::Rpc { status, .. } if RpcError::new(*status).is(code))
    }
}

impl From<TypeError> for BatonError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidPath { path, reason } => Self::InvalidPath { path, reason },
            TypeError::InvalidAccessLevel(level) => {
                Self::InvalidArgument(format!("unknown access level '{level}'"))
            }
            other => Self::InvalidJson(other.to_string()),
        }
    }
}

pub type BatonResult<T> = Result<T, BatonError>;

/// Log `err` at ERROR and hand it back.
pub(crate) fn logged(err: impl Into<BatonError>) -> BatonError {
    let err = err.into();
    error!(code = err.code(), "{err}");
    err
}

/// Fail the current operation with `err`, logging it.
pub(crate) fn fail<T>(err: impl Into<BatonError>) -> BatonResult<T> {
    Err(logged(err))
}

/// Attach context to RPC results, logging failures.
pub(crate) trait RpcResultExt<T> {
    fn rpc_context<F>(self, context: F) -> BatonResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> RpcResultExt<T> for Result<T, RpcError> {
    fn rpc_context<F>(self, context: F) -> BatonResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| logged(BatonError::rpc(context(), err)))
    }
}

/// The outcome of one operation as a code and message.
///
/// A zero code always comes with an empty message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: i32,
    pub message: String,
}

impl ErrorReport {
    /// The success report.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    pub fn from_result<T>(result: &BatonResult<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::from(err),
        }
    }
}

impl From<&BatonError> for ErrorReport {
    fn from(err: &BatonError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_carries_status_and_name() {
        let err = BatonError::rpc(
            "Failed to put data object: '/z/f'",
            RpcError::new(status::CAT_NO_ACCESS_PERMISSION),
        );
        assert_eq!(err.code(), -818000);
        let message = err.to_string();
        assert!(message.contains("/z/f"));
        assert!(message.contains("CAT_NO_ACCESS_PERMISSION"));
        assert!(message.contains("-818000"));
    }

    #[test]
    fn rpc_status_comparison_ignores_errno() {
        let err = BatonError::rpc("x", RpcError::new(status::CAT_NO_ROWS_FOUND - 2));
        assert!(err.is_rpc_status(status::CAT_NO_ROWS_FOUND));
        assert!(!BatonError::NotFound("/z".into()).is_rpc_status(status::CAT_NO_ROWS_FOUND));
    }

    #[test]
    fn local_errors_use_local_code() {
        assert_eq!(BatonError::InvalidArgument("x".into()).code(), LOCAL_ERROR_CODE);
        let short = BatonError::ShortWrite {
            path: "/z/f".into(),
            read: 10,
            written: 8,
        };
        assert_eq!(short.code(), LOCAL_ERROR_CODE);
        assert_eq!(short.to_string(), "read 10 bytes but wrote 8 bytes to '/z/f'");
    }

    #[test]
    fn type_errors_map_to_local_variants() {
        let err: BatonError = TypeError::InvalidAvu("missing value".into()).into();
        assert!(matches!(err, BatonError::InvalidJson(_)));
        let err: BatonError = TypeError::InvalidAccessLevel("admin".into()).into();
        assert!(matches!(err, BatonError::InvalidArgument(_)));
        let err: BatonError = TypeError::InvalidPath {
            path: "".into(),
            reason: "empty".into(),
        }
        .into();
        assert!(matches!(err, BatonError::InvalidPath { .. }));
    }

    // -----------------------------------------------------------------------
    // ErrorReport
    // -----------------------------------------------------------------------

    #[test]
    fn ok_report_is_empty() {
        let report = ErrorReport::ok();
        assert!(report.is_ok());
        assert!(report.message.is_empty());
        assert_eq!(ErrorReport::from_result(&Ok::<_, BatonError>(())), report);
    }

    #[test]
    fn failure_report() {
        let result: BatonResult<()> = Err(BatonError::NotFound("/z/missing".into()));
        let report = ErrorReport::from_result(&result);
        assert_eq!(report.code, status::USER_FILE_DOES_NOT_EXIST);
        assert_eq!(report.message, "path '/z/missing' does not exist");
    }

    #[test]
    fn report_serializes() {
        let report = ErrorReport {
            code: -1,
            message: "bad".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({"code": -1, "message": "bad"}));
    }
}
