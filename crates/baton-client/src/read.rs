use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use baton_rpc::{Connection, OpenMode};
use baton_types::{ChecksumPolicy, ContentDigest, EntityKind, OperationOptions, RemotePath};

use crate::error::{fail, logged, BatonError, BatonResult};
use crate::resolve::require_exact_kind;
use crate::write::{verify_checksum, DataObjectHandle};

/// Outcome of a streamed read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSummary {
    pub path: String,
    pub bytes: u64,
    pub md5: String,
    pub checksum_verified: bool,
}

/// Stream the content of the data object at `path` into `output`.
///
/// The checksum of the bytes received is compared with the server's under
/// `policy`, as for writes.
pub fn read_data_obj<C, W>(
    conn: &mut C,
    path: &RemotePath,
    output: &mut W,
    chunk_size: usize,
    policy: ChecksumPolicy,
) -> BatonResult<ReadSummary>
where
    C: Connection + ?Sized,
    W: Write + ?Sized,
{
    if chunk_size == 0 {
        return fail(BatonError::InvalidArgument(format!(
            "invalid buffer size {chunk_size}"
        )));
    }
    require_exact_kind(path, EntityKind::DataObject)?;

    let target = path.resolved();
    let (bytes, md5) = {
        let mut handle = DataObjectHandle::open(
            conn,
            target,
            OpenMode::ReadOnly,
            &OperationOptions::default(),
            chunk_size,
        )?;
        let mut digest = ContentDigest::new();
        loop {
            let chunk = handle.read_chunk()?;
            if chunk.is_empty() {
                break;
            }
            output.write_all(&chunk).map_err(logged)?;
            digest.update(&chunk);
        }
        let bytes = digest.bytes();
        let md5 = digest.finalize();
        handle.set_md5_last_read(md5.clone());
        handle.close()?;
        (bytes, md5)
    };
    output.flush().map_err(logged)?;
    debug!(path = target, bytes, "read complete");

    let checksum_verified = verify_checksum(conn, target, &md5, policy)?;
    info!(path = target, bytes, md5 = %md5, "read data object");

    Ok(ReadSummary {
        path: target.to_string(),
        bytes,
        md5,
        checksum_verified,
    })
}

/// Read the whole data object at `path` into memory.
pub fn slurp_data_obj<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    chunk_size: usize,
) -> BatonResult<Vec<u8>> {
    let mut content = Vec::new();
    read_data_obj(conn, path, &mut content, chunk_size, ChecksumPolicy::Warn)?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_rpc::{status, InMemoryServer, RpcKind};

    const TARGET: &str = "/z/home/u/f.txt";

    fn setup(content: &[u8]) -> (InMemoryServer, RemotePath) {
        let mut s = InMemoryServer::new("z", "u");
        s.seed_data_object(TARGET, content);
        (s, RemotePath::existing(TARGET, TARGET, EntityKind::DataObject))
    }

    #[test]
    fn reads_all_chunks() {
        let (mut s, path) = setup(b"hello world");
        let mut out = Vec::new();
        let summary = read_data_obj(&mut s, &path, &mut out, 4, ChecksumPolicy::Fail).unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(summary.bytes, 11);
        assert!(summary.checksum_verified);
        assert_eq!(s.count(RpcKind::DataObjClose), 1);
    }

    #[test]
    fn read_failure_still_closes() {
        let (mut s, path) = setup(b"hello world");
        s.fail_nth(RpcKind::DataObjRead, 2, status::SYS_INVALID_INPUT_PARAM);
        let err = slurp_data_obj(&mut s, &path, 4).unwrap_err();
        assert!(err.is_rpc_status(status::SYS_INVALID_INPUT_PARAM));
        assert_eq!(s.count(RpcKind::DataObjClose), 1);
        assert_eq!(s.open_handles(), 0);
    }

    #[test]
    fn collection_cannot_be_read() {
        let (mut s, _) = setup(b"");
        let coll = RemotePath::existing("/z/home/u", "/z/home/u", EntityKind::Collection);
        assert!(matches!(
            slurp_data_obj(&mut s, &coll, 4),
            Err(BatonError::WrongKind { .. })
        ));
    }

    #[test]
    fn mismatch_fails_under_fail_policy() {
        let (mut s, path) = setup(b"abc");
        s.override_checksum(TARGET, "00000000000000000000000000000000");
        let mut out = Vec::new();
        let err = read_data_obj(&mut s, &path, &mut out, 2, ChecksumPolicy::Fail).unwrap_err();
        assert_eq!(err.code(), status::USER_CHKSUM_MISMATCH);
        // Warn policy returns the content.
        assert_eq!(slurp_data_obj(&mut s, &path, 2).unwrap(), b"abc");
    }
}
