//! RPC contract between baton and a data-management server.
//!
//! Every server interaction baton performs is one synchronous call on the
//! [`Connection`] trait. Each call either succeeds with call-specific output or
//! fails with an [`RpcError`] carrying the server's negative status code, whose
//! symbolic name is available from [`RpcError::name`].
//!
//! # Backends
//!
//! - [`InMemoryServer`]: a catalog held in memory, with server-side semantics
//!   for namespace, metadata, ACL and query calls. Used by the tests, by
//!   embedders, and by the CLI's sandbox mode. It records every request and
//!   supports fault injection.
//!
//! A native transport to a production server implements the same trait.

pub mod catalog;
pub mod error;
mod evaluate;
pub mod memory;
pub mod messages;
pub mod query;
pub mod traits;

pub use catalog::{Catalog, CatalogEntry, SpecificQueryDefinition};
pub use error::{error_name, status, RpcError, RpcResult};
pub use memory::{InMemoryServer, RpcKind, RpcRequest};
pub use messages::{
    keywords, AtomicMetadataInp, CollInp, DataObjInp, KeyValPairs, ModAccessControlInp,
    ModAvuMetadataInp, ObjStat, OpenMode, OpenedDataObjInp,
};
pub use query::{
    Column, ColumnScope, Condition, GenQueryInp, GenQueryOut, QueryOperator, SpecificQueryInp,
    DEFAULT_MAX_ROWS,
};
pub use traits::Connection;
