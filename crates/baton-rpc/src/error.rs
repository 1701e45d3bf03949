use std::fmt;

/// Server status codes used by baton.
///
/// Status codes are negative multiples of 1000; the server may add a small
/// sub-code (usually an errno), which [`error_name`] ignores.
pub mod status {
    pub const SYS_COPY_LEN_ERR: i32 = -27000;
    pub const SYS_INVALID_INPUT_PARAM: i32 = -130000;
    pub const USER_FILE_DOES_NOT_EXIST: i32 = -310000;
    pub const OVERWRITE_WITHOUT_FORCE_FLAG: i32 = -312000;
    pub const USER_CHKSUM_MISMATCH: i32 = -314000;
    pub const USER_INPUT_PATH_ERR: i32 = -317000;
    pub const CAT_NO_ROWS_FOUND: i32 = -808000;
    pub const CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME: i32 = -809000;
    pub const CAT_UNKNOWN_COLLECTION: i32 = -814000;
    pub const CAT_INVALID_ARGUMENT: i32 = -816000;
    pub const CAT_UNKNOWN_FILE: i32 = -817000;
    pub const CAT_NO_ACCESS_PERMISSION: i32 = -818000;
    pub const CAT_SUCCESS_BUT_WITH_NO_INFO: i32 = -819000;
    pub const CAT_COLLECTION_NOT_EMPTY: i32 = -821000;
    pub const CAT_INVALID_USER: i32 = -827000;
    pub const CAT_UNKNOWN_SPECIFIC_QUERY: i32 = -853000;
}

const ERROR_NAMES: &[(i32, &str)] = &[
    (status::SYS_COPY_LEN_ERR, "SYS_COPY_LEN_ERR"),
    (status::SYS_INVALID_INPUT_PARAM, "SYS_INVALID_INPUT_PARAM"),
    (status::USER_FILE_DOES_NOT_EXIST, "USER_FILE_DOES_NOT_EXIST"),
    (status::OVERWRITE_WITHOUT_FORCE_FLAG, "OVERWRITE_WITHOUT_FORCE_FLAG"),
    (status::USER_CHKSUM_MISMATCH, "USER_CHKSUM_MISMATCH"),
    (status::USER_INPUT_PATH_ERR, "USER_INPUT_PATH_ERR"),
    (status::CAT_NO_ROWS_FOUND, "CAT_NO_ROWS_FOUND"),
    (
        status::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME,
        "CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME",
    ),
    (status::CAT_UNKNOWN_COLLECTION, "CAT_UNKNOWN_COLLECTION"),
    (status::CAT_INVALID_ARGUMENT, "CAT_INVALID_ARGUMENT"),
    (status::CAT_UNKNOWN_FILE, "CAT_UNKNOWN_FILE"),
    (status::CAT_NO_ACCESS_PERMISSION, "CAT_NO_ACCESS_PERMISSION"),
    (status::CAT_SUCCESS_BUT_WITH_NO_INFO, "CAT_SUCCESS_BUT_WITH_NO_INFO"),
    (status::CAT_COLLECTION_NOT_EMPTY, "CAT_COLLECTION_NOT_EMPTY"),
    (status::CAT_INVALID_USER, "CAT_INVALID_USER"),
    (status::CAT_UNKNOWN_SPECIFIC_QUERY, "CAT_UNKNOWN_SPECIFIC_QUERY"),
];

/// Resolve a status code to its symbolic name.
pub fn error_name(code: i32) -> &'static str {
    let base = (code / 1000) * 1000;
    ERROR_NAMES
        .iter()
        .find(|(c, _)| *c == base)
        .map(|(_, name)| *name)
        .unwrap_or("UNKNOWN_ERROR")
}

/// A failed RPC: the negative status returned by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RpcError {
    pub status: i32,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.status)
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    pub fn new(status: i32) -> Self {
        Self { status }
    }

    /// Symbolic name of the status.
    pub fn name(&self) -> &'static str {
        error_name(self.status)
    }

    /// Whether this error is `code`, ignoring any sub-code.
    pub fn is(&self, code: i32) -> bool {
        (self.status / 1000) * 1000 == code
    }
}

/// Result alias for RPC calls.
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names() {
        assert_eq!(error_name(status::CAT_NO_ROWS_FOUND), "CAT_NO_ROWS_FOUND");
        assert_eq!(error_name(status::USER_FILE_DOES_NOT_EXIST), "USER_FILE_DOES_NOT_EXIST");
    }

    #[test]
    fn sub_code_is_ignored() {
        assert_eq!(error_name(-310002), "USER_FILE_DOES_NOT_EXIST");
        assert!(RpcError::new(-310002).is(status::USER_FILE_DOES_NOT_EXIST));
    }

    #[test]
    fn unknown_code() {
        assert_eq!(error_name(-999000), "UNKNOWN_ERROR");
    }

    #[test]
    fn display_includes_name_and_status() {
        let err = RpcError::new(status::CAT_UNKNOWN_FILE);
        assert_eq!(err.to_string(), "CAT_UNKNOWN_FILE (-817000)");
    }
}
