//! Foundation types for baton.
//!
//! This crate provides the value types shared by the RPC layer, the client
//! library and the command-line tool. Every other baton crate depends on
//! `baton-types`.
//!
//! # Key Types
//!
//! - [`RemotePath`]: a user-supplied path resolved against the server
//! - [`EntityKind`]: the two kinds of namespace entity, collection and data object
//! - [`Avu`]: an attribute-value-unit metadata triple
//! - [`MetadataOp`] / [`MetadataOperation`]: AVU add/remove requests
//! - [`AccessControlEntry`] / [`AccessLevel`]: ACL changes
//! - [`OperationOptions`] / [`ListOptions`]: options for transfers, removal and listing
//! - [`ContentDigest`]: incremental MD5 used to verify transfers

pub mod acl;
pub mod avu;
pub mod checksum;
pub mod error;
pub mod options;
pub mod path;

pub use acl::{parse_owner_specifier, AccessControlEntry, AccessLevel};
pub use avu::{Avu, MetadataOp, MetadataOperation};
pub use checksum::{checksums_match, md5_hex, ContentDigest};
pub use error::TypeError;
pub use options::{ChecksumPolicy, ListOptions, OperationOptions};
pub use path::{join_path, normalize_path, split_path, EntityKind, RemotePath, MAX_NAME_LEN};
