use std::path::Path;

use crate::error::RpcResult;
use crate::messages::{
    AtomicMetadataInp, CollInp, DataObjInp, ModAccessControlInp, ModAvuMetadataInp, ObjStat,
    OpenedDataObjInp,
};
use crate::query::{GenQueryInp, GenQueryOut, SpecificQueryInp};

/// An authenticated session with a data-management server.
///
/// Every method is exactly one blocking round trip. Implementations must
/// satisfy these rules:
/// - A failed call returns the server's negative status and has no partial
///   effect beyond what the server itself applied.
/// - Calls are never retried by the implementation.
/// - A session has a single owner and is used sequentially; methods take
///   `&mut self` so sharing across threads needs external synchronisation.
pub trait Connection {
    /// Look up a path. Fails with `USER_FILE_DOES_NOT_EXIST` if absent.
    fn obj_stat(&mut self, path: &str) -> RpcResult<ObjStat>;

    /// Upload a whole local file as a data object.
    fn data_obj_put(&mut self, inp: &DataObjInp, local_path: &Path) -> RpcResult<()>;

    /// Open a data object and return its descriptor.
    ///
    /// Opening for writing creates the object if it does not exist.
    fn data_obj_open(&mut self, inp: &DataObjInp) -> RpcResult<i32>;

    /// Write `inp.len` bytes from `buf`. Returns the number of bytes the
    /// server stored.
    fn data_obj_write(&mut self, inp: &OpenedDataObjInp, buf: &[u8]) -> RpcResult<usize>;

    /// Read up to `inp.len` bytes. An empty result means end of object.
    fn data_obj_read(&mut self, inp: &OpenedDataObjInp) -> RpcResult<Vec<u8>>;

    /// Close a descriptor, committing any written content.
    fn data_obj_close(&mut self, inp: &OpenedDataObjInp) -> RpcResult<()>;

    /// Return the server's checksum for a data object, computing it if needed.
    fn data_obj_checksum(&mut self, inp: &DataObjInp) -> RpcResult<String>;

    /// Remove a data object.
    fn data_obj_unlink(&mut self, inp: &DataObjInp) -> RpcResult<()>;

    /// Create a collection.
    fn coll_create(&mut self, inp: &CollInp) -> RpcResult<()>;

    /// Remove a collection.
    fn rm_coll(&mut self, inp: &CollInp) -> RpcResult<()>;

    /// Add or remove one AVU.
    fn mod_avu_metadata(&mut self, inp: &ModAvuMetadataInp) -> RpcResult<()>;

    /// Apply a batch of AVU operations, all or none.
    fn atomic_apply_metadata_operations(&mut self, inp: &AtomicMetadataInp) -> RpcResult<()>;

    /// Change an access control list.
    fn mod_access_control(&mut self, inp: &ModAccessControlInp) -> RpcResult<()>;

    /// Run one page of a general query. Fails with `CAT_NO_ROWS_FOUND` when
    /// nothing matches.
    fn gen_query(&mut self, inp: &GenQueryInp) -> RpcResult<GenQueryOut>;

    /// Run one page of a registered specific query. Fails with
    /// `CAT_NO_ROWS_FOUND` when nothing matches.
    fn specific_query(&mut self, inp: &SpecificQueryInp) -> RpcResult<GenQueryOut>;
}
