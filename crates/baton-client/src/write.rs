//! Uploading data objects.
//!
//! [`put_data_obj`] hands a whole local file to the server in one request.
//! [`write_data_obj`] streams from any reader in fixed-size chunks, digesting
//! the bytes as they are read so the result can be checked against the
//! checksum the server records.

use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use baton_rpc::{keywords, Connection, DataObjInp, OpenMode, OpenedDataObjInp};
use baton_types::{checksums_match, ChecksumPolicy, ContentDigest, EntityKind, OperationOptions, RemotePath};

use crate::error::{fail, logged, BatonError, BatonResult, RpcResultExt};

/// Outcome of a streamed write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub path: String,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// MD5 of the bytes read from the input.
    pub md5: String,
    /// Whether the server's checksum matched `md5`.
    pub checksum_verified: bool,
}

/// A data object open on the server.
///
/// The descriptor is closed exactly once: by [`close`](Self::close), or when
/// the handle is dropped on an early return.
pub struct DataObjectHandle<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    path: String,
    opened: OpenedDataObjInp,
    buffer_size: usize,
    md5_last_read: Option<String>,
    closed: bool,
}

impl<'c, C: Connection + ?Sized> DataObjectHandle<'c, C> {
    /// Open `path` in `mode`. Write opens honour the checksum and lock options.
    pub fn open(
        conn: &'c mut C,
        path: &str,
        mode: OpenMode,
        options: &OperationOptions,
        buffer_size: usize,
    ) -> BatonResult<Self> {
        let mut inp = DataObjInp::new(path).with_mode(mode);
        if mode == OpenMode::WriteOnly {
            if options.checksum_on_write {
                debug!(path, "calculating checksum server-side");
                inp = inp.with_keyword(keywords::REG_CHKSUM_KW, "");
            }
            if options.write_lock {
                debug!(path, "enabling write lock");
                inp = inp.with_keyword(keywords::LOCK_TYPE_KW, keywords::WRITE_LOCK_TYPE);
            }
        }

        debug!(path, ?mode, "opening data object");
        let fd = conn
            .data_obj_open(&inp)
            .rpc_context(|| format!("Failed to open data object: '{path}'"))?;

        Ok(Self {
            conn,
            path: path.to_string(),
            opened: OpenedDataObjInp { fd, len: 0 },
            buffer_size,
            md5_last_read: None,
            closed: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn descriptor(&self) -> i32 {
        self.opened.fd
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Send `buf` as one write. Returns the byte count the server reports.
    pub fn write_chunk(&mut self, buf: &[u8]) -> BatonResult<usize> {
        self.opened.len = buf.len();
        let written = self.conn.data_obj_write(&self.opened, buf).rpc_context(|| {
            format!("Failed to write {} bytes to '{}'", buf.len(), self.path)
        })?;
        debug!(path = %self.path, written, "wrote chunk");
        Ok(written)
    }

    /// Read up to `buffer_size` bytes. An empty result means end of object.
    pub fn read_chunk(&mut self) -> BatonResult<Vec<u8>> {
        self.opened.len = self.buffer_size;
        let chunk = self
            .conn
            .data_obj_read(&self.opened)
            .rpc_context(|| format!("Failed to read from '{}'", self.path))?;
        debug!(path = %self.path, read = chunk.len(), "read chunk");
        Ok(chunk)
    }

    /// Record the hex MD5 of the content that passed through this handle.
    pub fn set_md5_last_read(&mut self, md5: String) {
        self.md5_last_read = Some(md5);
    }

    pub fn md5_last_read(&self) -> Option<&str> {
        self.md5_last_read.as_deref()
    }

    /// Close the descriptor, committing written content.
    pub fn close(mut self) -> BatonResult<()> {
        self.closed = true;
        debug!(path = %self.path, fd = self.opened.fd, "closing data object");
        self.conn
            .data_obj_close(&self.opened)
            .rpc_context(|| format!("Failed to close data object: '{}'", self.path))
    }
}

impl<C: Connection + ?Sized> Drop for DataObjectHandle<'_, C> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(path = %self.path, fd = self.opened.fd, "closing abandoned data object");
        if let Err(err) = self.conn.data_obj_close(&self.opened) {
            warn!(path = %self.path, "failed to close data object: {err}");
        }
    }
}

/// Upload the local file at `local` to `path` in one request.
///
/// Existing objects are overwritten.
pub fn put_data_obj<C: Connection + ?Sized>(
    conn: &mut C,
    local: &Path,
    path: &RemotePath,
    options: &OperationOptions,
) -> BatonResult<()> {
    if path.is_collection() {
        return fail(BatonError::WrongKind {
            path: path.resolved().to_string(),
            expected: EntityKind::DataObject,
            actual: EntityKind::Collection,
        });
    }

    let target = path.resolved();
    let mut inp = DataObjInp::new(target).with_mode(OpenMode::WriteOnly);
    if options.checksum_on_write {
        debug!(path = target, "calculating checksum server-side");
        inp = inp.with_keyword(keywords::REG_CHKSUM_KW, "");
    }
    if options.write_lock {
        debug!(path = target, "enabling put write lock");
        inp = inp.with_keyword(keywords::LOCK_TYPE_KW, keywords::WRITE_LOCK_TYPE);
    }
    inp = inp.with_keyword(keywords::FORCE_FLAG_KW, "");

    conn.data_obj_put(&inp, local)
        .rpc_context(|| format!("Failed to put data object: '{target}'"))?;
    info!(local = %local.display(), path = target, "put data object");
    Ok(())
}

/// Stream `input` to `path` in chunks of `chunk_size` bytes.
///
/// The descriptor is closed whether or not the transfer succeeds. After a
/// successful close the byte counts must agree, and the MD5 of the input is
/// compared with the server's checksum under `options.checksum_policy`.
pub fn write_data_obj<C, R>(
    conn: &mut C,
    input: &mut R,
    path: &RemotePath,
    chunk_size: usize,
    options: &OperationOptions,
) -> BatonResult<WriteSummary>
where
    C: Connection + ?Sized,
    R: Read + ?Sized,
{
    if chunk_size == 0 {
        return fail(BatonError::InvalidArgument(format!(
            "invalid buffer size {chunk_size}"
        )));
    }
    if path.is_collection() {
        return fail(BatonError::WrongKind {
            path: path.resolved().to_string(),
            expected: EntityKind::DataObject,
            actual: EntityKind::Collection,
        });
    }

    let target = path.resolved();
    let (bytes_read, bytes_written, md5) = {
        let mut buffer = vec![0u8; chunk_size];
        let mut handle =
            DataObjectHandle::open(conn, target, OpenMode::WriteOnly, options, chunk_size)?;
        let mut digest = ContentDigest::new();
        let mut bytes_written = 0u64;

        loop {
            let n = fill_buffer(input, &mut buffer).map_err(logged)?;
            if n == 0 {
                break;
            }
            debug!(path = target, bytes = n, "writing from stream");
            bytes_written += handle.write_chunk(&buffer[..n])? as u64;
            digest.update(&buffer[..n]);
            buffer.fill(0);
        }

        let bytes_read = digest.bytes();
        let md5 = digest.finalize();
        handle.set_md5_last_read(md5.clone());
        handle.close()?;
        (bytes_read, bytes_written, md5)
    };

    if bytes_read != bytes_written {
        return fail(BatonError::ShortWrite {
            path: target.to_string(),
            read: bytes_read,
            written: bytes_written,
        });
    }

    let checksum_verified = verify_checksum(conn, target, &md5, options.checksum_policy)?;
    info!(path = target, bytes = bytes_written, md5 = %md5, "wrote data object");

    Ok(WriteSummary {
        path: target.to_string(),
        bytes_read,
        bytes_written,
        md5,
        checksum_verified,
    })
}

/// Read until `buf` is full or the input ends.
fn fill_buffer<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Compare `local_md5` with the checksum the server reports for `path`.
///
/// Returns whether they matched. A mismatch, or a failure to obtain the
/// server's checksum, is a warning under [`ChecksumPolicy::Warn`] and an
/// error under [`ChecksumPolicy::Fail`].
pub(crate) fn verify_checksum<C: Connection + ?Sized>(
    conn: &mut C,
    path: &str,
    local_md5: &str,
    policy: ChecksumPolicy,
) -> BatonResult<bool> {
    let remote = match conn.data_obj_checksum(&DataObjInp::new(path)) {
        Ok(remote) => remote,
        Err(err) if policy == ChecksumPolicy::Warn => {
            warn!(path, "could not obtain server checksum: {err}");
            return Ok(false);
        }
        Err(err) => {
            return Err(logged(BatonError::rpc(
                format!("Failed to checksum data object: '{path}'"),
                err,
            )))
        }
    };

    if checksums_match(local_md5, &remote) {
        return Ok(true);
    }
    match policy {
        ChecksumPolicy::Warn => {
            warn!(path, local = local_md5, remote = %remote, "checksum mismatch for data object");
            Ok(false)
        }
        ChecksumPolicy::Fail => fail(BatonError::ChecksumMismatch {
            path: path.to_string(),
            local: local_md5.to_string(),
            remote,
        }),
    }
}
