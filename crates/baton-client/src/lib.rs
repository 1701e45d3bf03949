//! baton client library.
//!
//! Operations take a [`Connection`](baton_rpc::Connection) and a resolved
//! [`RemotePath`](baton_types::RemotePath), make the requests the operation
//! needs, and return a [`BatonResult`]. Failures are logged where they are
//! raised and carry the server's status and symbolic error name where one
//! exists; [`ErrorReport`] turns a result into the code and message reported
//! to JSON callers.
//!
//! ```no_run
//! use baton_client::{resolve_path, modify_metadata, ClientEnv};
//! use baton_rpc::InMemoryServer;
//! use baton_types::MetadataOp;
//!
//! let mut conn = InMemoryServer::default();
//! let env = ClientEnv::default();
//! let path = resolve_path(&mut conn, &env, "/testZone/home/irods")?;
//! modify_metadata(&mut conn, &path, MetadataOp::Add, "study", "1234", "")?;
//! # Ok::<(), baton_client::BatonError>(())
//! ```

pub mod env;
pub mod error;
pub mod json;
pub mod metadata;
pub mod namespace;
pub mod permissions;
pub mod query;
pub mod read;
pub mod resolve;
pub mod write;

pub use env::ClientEnv;
pub use error::{BatonError, BatonResult, ErrorReport, LOCAL_ERROR_CODE};
pub use metadata::{
    apply_json_operations, atomic_apply_json_operations, maybe_modify_json_metadata,
    modify_json_metadata, modify_metadata, supersede_metadata,
};
pub use namespace::{create_collection, remove_collection, remove_data_object};
pub use permissions::{list_permissions, modify_json_permissions, modify_permissions};
pub use query::{list_metadata, list_path, search_metadata, search_specific};
pub use read::{read_data_obj, slurp_data_obj, ReadSummary};
pub use resolve::{lookup_path, require_kind, resolve_path, resolve_target, set_path};
pub use write::{put_data_obj, write_data_obj, DataObjectHandle, WriteSummary};

// Re-export the types callers need alongside the operations
pub use baton_types::{
    AccessLevel, Avu, ChecksumPolicy, EntityKind, ListOptions, MetadataOp, OperationOptions,
    RemotePath,
};
