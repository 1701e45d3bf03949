use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use baton_types::{md5_hex, split_path, AccessLevel, Avu, EntityKind, MetadataOp};

use crate::catalog::{Catalog, CatalogEntry, SpecificQueryDefinition};
use crate::error::{status, RpcError, RpcResult};
use crate::evaluate::evaluate;
use crate::messages::{
    keywords, AtomicMetadataInp, CollInp, DataObjInp, ModAccessControlInp, ModAvuMetadataInp,
    ObjStat, OpenMode, OpenedDataObjInp,
};
use crate::query::{GenQueryInp, GenQueryOut, SpecificQueryInp, DEFAULT_MAX_ROWS};
use crate::traits::Connection;

/// The kind of an RPC, for counting and fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcKind {
    ObjStat,
    DataObjPut,
    DataObjOpen,
    DataObjWrite,
    DataObjRead,
    DataObjClose,
    DataObjChecksum,
    DataObjUnlink,
    CollCreate,
    RmColl,
    ModAvuMetadata,
    AtomicApplyMetadata,
    ModAccessControl,
    GenQuery,
    SpecificQuery,
}

/// A recorded request, in the order it was received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcRequest {
    ObjStat(String),
    DataObjPut { inp: DataObjInp, local_path: PathBuf },
    DataObjOpen(DataObjInp),
    DataObjWrite(OpenedDataObjInp),
    DataObjRead(OpenedDataObjInp),
    DataObjClose(OpenedDataObjInp),
    DataObjChecksum(DataObjInp),
    DataObjUnlink(DataObjInp),
    CollCreate(CollInp),
    RmColl(CollInp),
    ModAvuMetadata(ModAvuMetadataInp),
    AtomicApplyMetadata(AtomicMetadataInp),
    ModAccessControl(ModAccessControlInp),
    GenQuery(GenQueryInp),
    SpecificQuery(SpecificQueryInp),
}

impl RpcRequest {
    pub fn kind(&self) -> RpcKind {
        match self {
            Self::ObjStat(_) => RpcKind::ObjStat,
            Self::DataObjPut { .. } => RpcKind::DataObjPut,
            Self::DataObjOpen(_) => RpcKind::DataObjOpen,
            Self::DataObjWrite(_) => RpcKind::DataObjWrite,
            Self::DataObjRead(_) => RpcKind::DataObjRead,
            Self::DataObjClose(_) => RpcKind::DataObjClose,
            Self::DataObjChecksum(_) => RpcKind::DataObjChecksum,
            Self::DataObjUnlink(_) => RpcKind::DataObjUnlink,
            Self::CollCreate(_) => RpcKind::CollCreate,
            Self::RmColl(_) => RpcKind::RmColl,
            Self::ModAvuMetadata(_) => RpcKind::ModAvuMetadata,
            Self::AtomicApplyMetadata(_) => RpcKind::AtomicApplyMetadata,
            Self::ModAccessControl(_) => RpcKind::ModAccessControl,
            Self::GenQuery(_) => RpcKind::GenQuery,
            Self::SpecificQuery(_) => RpcKind::SpecificQuery,
        }
    }
}

#[derive(Clone, Debug)]
enum Fault {
    /// The call of `kind` whose running count reaches `at` fails.
    Fail { kind: RpcKind, at: usize, status: i32 },
    /// The write whose running count reaches `at` stores only `written` bytes.
    ShortWrite { at: usize, written: usize },
    /// Checksum calls for `path` report `checksum`.
    Checksum { path: String, checksum: String },
}

#[derive(Debug)]
struct OpenObject {
    path: String,
    mode: OpenMode,
    buffer: Vec<u8>,
    read_pos: usize,
    register_checksum: bool,
}

/// In-memory data-management server.
///
/// Holds a [`Catalog`] and applies server-side rules to it: parent
/// collections must exist, duplicate AVUs are rejected, mutations need
/// sufficient access, and so on. Every request is recorded so tests can
/// assert on the exact RPC sequence, and failures can be injected per call.
pub struct InMemoryServer {
    catalog: Catalog,
    open: HashMap<i32, OpenObject>,
    next_fd: i32,
    log: Vec<RpcRequest>,
    counts: HashMap<RpcKind, usize>,
    faults: Vec<Fault>,
}

impl InMemoryServer {
    /// A server for `user` in `zone` with an empty home collection.
    pub fn new(zone: &str, user: &str) -> Self {
        Self::from_catalog(Catalog::new(zone, user))
    }

    /// A server over an existing catalog.
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self {
            catalog,
            open: HashMap::new(),
            next_fd: 3,
            log: Vec::new(),
            counts: HashMap::new(),
            faults: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Direct catalog access for seeding state. Changes are not logged.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    pub fn zone(&self) -> &str {
        &self.catalog.zone
    }

    pub fn user(&self) -> &str {
        &self.catalog.user
    }

    pub fn home(&self) -> String {
        self.catalog.home()
    }

    // ---- Seeding ----

    pub fn seed_collection(&mut self, path: &str) {
        self.catalog.create_collection_all(path);
    }

    pub fn seed_data_object(&mut self, path: &str, content: &[u8]) {
        self.catalog.insert_data_object(path, content);
    }

    pub fn seed_avu(&mut self, path: &str, avu: Avu) {
        if let Some(entry) = self.catalog.get_mut(path) {
            entry.avus.push(avu);
        }
    }

    /// Set the session user's own access on `path`.
    pub fn seed_user_access(&mut self, path: &str, level: AccessLevel) {
        let user = self.catalog.user.clone();
        let zone = self.catalog.zone.clone();
        if let Some(entry) = self.catalog.get_mut(path) {
            entry.set_access(&user, &zone, level);
        }
    }

    pub fn register_specific_query(
        &mut self,
        sql: &str,
        arg_columns: Vec<usize>,
        rows: Vec<Vec<String>>,
    ) {
        self.catalog
            .specific_queries
            .insert(sql.to_string(), SpecificQueryDefinition { arg_columns, rows });
    }

    // ---- Inspection ----

    /// Every request received, oldest first.
    pub fn calls(&self) -> &[RpcRequest] {
        &self.log
    }

    /// Number of requests of `kind` received.
    pub fn count(&self, kind: RpcKind) -> usize {
        self.log.iter().filter(|r| r.kind() == kind).count()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// AVU requests received, oldest first.
    pub fn avu_requests(&self) -> Vec<&ModAvuMetadataInp> {
        self.log
            .iter()
            .filter_map(|r| match r {
                RpcRequest::ModAvuMetadata(inp) => Some(inp),
                _ => None,
            })
            .collect()
    }

    /// Descriptors currently open.
    pub fn open_handles(&self) -> usize {
        self.open.len()
    }

    pub fn content(&self, path: &str) -> Option<&[u8]> {
        self.catalog.get(path).map(|e| e.content.as_slice())
    }

    pub fn avus(&self, path: &str) -> Option<&[Avu]> {
        self.catalog.get(path).map(|e| e.avus.as_slice())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.catalog.get(path).is_some()
    }

    // ---- Fault injection ----

    /// Make the `nth` (1-based) call of `kind` from now on fail with `status`.
    pub fn fail_nth(&mut self, kind: RpcKind, nth: usize, status: i32) {
        let at = self.counts.get(&kind).copied().unwrap_or(0) + nth;
        self.faults.push(Fault::Fail { kind, at, status });
    }

    /// Make the `nth` (1-based) write from now on store only `written` bytes.
    pub fn short_write(&mut self, nth: usize, written: usize) {
        let at = self.counts.get(&RpcKind::DataObjWrite).copied().unwrap_or(0) + nth;
        self.faults.push(Fault::ShortWrite { at, written });
    }

    /// Report `checksum` for `path` regardless of its content.
    pub fn override_checksum(&mut self, path: &str, checksum: &str) {
        self.faults.push(Fault::Checksum {
            path: path.to_string(),
            checksum: checksum.to_string(),
        });
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    // ---- Internals ----

    /// Log the request and apply any failure scheduled for it.
    fn receive(&mut self, request: RpcRequest) -> RpcResult<usize> {
        let kind = request.kind();
        debug!(?kind, "in-memory server received request");
        self.log.push(request);
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        let count = *count;

        for fault in &self.faults {
            if let Fault::Fail { kind: k, at, status } = fault {
                if *k == kind && *at == count {
                    return Err(RpcError::new(*status));
                }
            }
        }
        Ok(count)
    }

    fn require_access(&self, path: &str, level: AccessLevel) -> RpcResult<()> {
        if self.catalog.user_access(path).permits(level) {
            Ok(())
        } else {
            Err(RpcError::new(status::CAT_NO_ACCESS_PERMISSION))
        }
    }

    fn require_parent(&self, path: &str) -> RpcResult<String> {
        let parent = split_path(path).0.to_string();
        if self.catalog.is_collection(&parent) {
            Ok(parent)
        } else {
            Err(RpcError::new(status::CAT_UNKNOWN_COLLECTION))
        }
    }

    fn require_entity(&self, path: &str, kind: EntityKind) -> RpcResult<&CatalogEntry> {
        match self.catalog.get(path) {
            Some(entry) if entry.kind == kind => Ok(entry),
            _ => Err(RpcError::new(match kind {
                EntityKind::Collection => status::CAT_UNKNOWN_COLLECTION,
                EntityKind::DataObject => status::CAT_UNKNOWN_FILE,
            })),
        }
    }

    /// Prepare `path` to receive new content: checks parent, kind, overwrite
    /// rules and access, and creates the entry if needed.
    fn prepare_data_object(&mut self, path: &str, force: bool) -> RpcResult<()> {
        let parent = self.require_parent(path)?;
        match self.catalog.get(path) {
            Some(entry) if entry.kind == EntityKind::Collection => {
                Err(RpcError::new(status::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME))
            }
            Some(_) if !force => Err(RpcError::new(status::OVERWRITE_WITHOUT_FORCE_FLAG)),
            Some(_) => self.require_access(path, AccessLevel::Write),
            None => {
                self.require_access(&parent, AccessLevel::Write)?;
                let entry =
                    CatalogEntry::new(EntityKind::DataObject, &self.catalog.user, &self.catalog.zone);
                self.catalog.entries.insert(path.to_string(), entry);
                Ok(())
            }
        }
    }

    fn opened(&mut self, fd: i32) -> RpcResult<&mut OpenObject> {
        self.open
            .get_mut(&fd)
            .ok_or(RpcError::new(status::SYS_INVALID_INPUT_PARAM))
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new("testZone", "irods")
    }
}

impl std::fmt::Debug for InMemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryServer")
            .field("zone", &self.catalog.zone)
            .field("user", &self.catalog.user)
            .field("entry_count", &self.catalog.entries.len())
            .field("open_handles", &self.open.len())
            .finish()
    }
}

fn apply_avu_operation(avus: &mut Vec<Avu>, op: MetadataOp, avu: &Avu) -> RpcResult<()> {
    if avu.attribute.is_empty() || avu.value.is_empty() {
        return Err(RpcError::new(status::CAT_INVALID_ARGUMENT));
    }
    match op {
        MetadataOp::Add => {
            if avus.contains(avu) {
                return Err(RpcError::new(status::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME));
            }
            avus.push(avu.clone());
        }
        MetadataOp::Remove => {
            let before = avus.len();
            avus.retain(|a| a != avu);
            if avus.len() == before {
                return Err(RpcError::new(status::CAT_SUCCESS_BUT_WITH_NO_INFO));
            }
        }
    }
    Ok(())
}

fn page(rows: Vec<Vec<String>>, max_rows: usize, start: usize) -> RpcResult<GenQueryOut> {
    let max_rows = if max_rows == 0 { DEFAULT_MAX_ROWS } else { max_rows };
    if start >= rows.len() {
        return Err(RpcError::new(status::CAT_NO_ROWS_FOUND));
    }
    let end = (start + max_rows).min(rows.len());
    Ok(GenQueryOut {
        continue_index: (end < rows.len()).then_some(end),
        rows: rows[start..end].to_vec(),
    })
}

impl Connection for InMemoryServer {
    fn obj_stat(&mut self, path: &str) -> RpcResult<ObjStat> {
        self.receive(RpcRequest::ObjStat(path.to_string()))?;
        let entry = self
            .catalog
            .get(path)
            .ok_or(RpcError::new(status::USER_FILE_DOES_NOT_EXIST))?;
        Ok(ObjStat {
            kind: entry.kind,
            size: entry.content.len() as u64,
            owner: entry.owner.clone(),
            checksum: entry.checksum.clone(),
        })
    }

    fn data_obj_put(&mut self, inp: &DataObjInp, local_path: &Path) -> RpcResult<()> {
        self.receive(RpcRequest::DataObjPut {
            inp: inp.clone(),
            local_path: local_path.to_path_buf(),
        })?;
        let content = std::fs::read(local_path)
            .map_err(|_| RpcError::new(status::USER_FILE_DOES_NOT_EXIST))?;
        self.prepare_data_object(&inp.path, inp.cond.contains(keywords::FORCE_FLAG_KW))?;
        if let Some(entry) = self.catalog.get_mut(&inp.path) {
            entry.set_content(content, inp.cond.contains(keywords::REG_CHKSUM_KW));
        }
        Ok(())
    }

    fn data_obj_open(&mut self, inp: &DataObjInp) -> RpcResult<i32> {
        self.receive(RpcRequest::DataObjOpen(inp.clone()))?;
        let buffer = match inp.open_mode {
            OpenMode::WriteOnly => {
                self.prepare_data_object(&inp.path, true)?;
                Vec::new()
            }
            OpenMode::ReadOnly => {
                let content = self
                    .require_entity(&inp.path, EntityKind::DataObject)?
                    .content
                    .clone();
                self.require_access(&inp.path, AccessLevel::Read)?;
                content
            }
        };

        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(
            fd,
            OpenObject {
                path: inp.path.clone(),
                mode: inp.open_mode,
                buffer,
                read_pos: 0,
                register_checksum: inp.cond.contains(keywords::REG_CHKSUM_KW),
            },
        );
        Ok(fd)
    }

    fn data_obj_write(&mut self, inp: &OpenedDataObjInp, buf: &[u8]) -> RpcResult<usize> {
        let count = self.receive(RpcRequest::DataObjWrite(*inp))?;
        if inp.len > buf.len() {
            return Err(RpcError::new(status::SYS_COPY_LEN_ERR));
        }
        let short = self.faults.iter().find_map(|f| match f {
            Fault::ShortWrite { at, written } if *at == count => Some(*written),
            _ => None,
        });
        let len = short.map_or(inp.len, |w| w.min(inp.len));

        let object = self.opened(inp.fd)?;
        if object.mode != OpenMode::WriteOnly {
            return Err(RpcError::new(status::SYS_INVALID_INPUT_PARAM));
        }
        object.buffer.extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn data_obj_read(&mut self, inp: &OpenedDataObjInp) -> RpcResult<Vec<u8>> {
        self.receive(RpcRequest::DataObjRead(*inp))?;
        let object = self.opened(inp.fd)?;
        if object.mode != OpenMode::ReadOnly {
            return Err(RpcError::new(status::SYS_INVALID_INPUT_PARAM));
        }
        let start = object.read_pos.min(object.buffer.len());
        let end = (start + inp.len).min(object.buffer.len());
        object.read_pos = end;
        Ok(object.buffer[start..end].to_vec())
    }

    fn data_obj_close(&mut self, inp: &OpenedDataObjInp) -> RpcResult<()> {
        self.receive(RpcRequest::DataObjClose(*inp))?;
        let object = self
            .open
            .remove(&inp.fd)
            .ok_or(RpcError::new(status::SYS_INVALID_INPUT_PARAM))?;
        if object.mode == OpenMode::WriteOnly {
            if let Some(entry) = self.catalog.get_mut(&object.path) {
                entry.set_content(object.buffer, object.register_checksum);
            }
        }
        Ok(())
    }

    fn data_obj_checksum(&mut self, inp: &DataObjInp) -> RpcResult<String> {
        self.receive(RpcRequest::DataObjChecksum(inp.clone()))?;
        self.require_entity(&inp.path, EntityKind::DataObject)?;
        self.require_access(&inp.path, AccessLevel::Read)?;

        let overridden = self.faults.iter().find_map(|f| match f {
            Fault::Checksum { path, checksum } if *path == inp.path => Some(checksum.clone()),
            _ => None,
        });
        if let Some(checksum) = overridden {
            return Ok(checksum);
        }

        let entry = self
            .catalog
            .get_mut(&inp.path)
            .ok_or(RpcError::new(status::CAT_UNKNOWN_FILE))?;
        let checksum = md5_hex(&entry.content);
        entry.checksum = Some(checksum.clone());
        Ok(checksum)
    }

    fn data_obj_unlink(&mut self, inp: &DataObjInp) -> RpcResult<()> {
        self.receive(RpcRequest::DataObjUnlink(inp.clone()))?;
        self.require_entity(&inp.path, EntityKind::DataObject)?;
        self.require_access(&inp.path, AccessLevel::Write)?;
        self.catalog.entries.remove(&inp.path);
        Ok(())
    }

    fn coll_create(&mut self, inp: &CollInp) -> RpcResult<()> {
        self.receive(RpcRequest::CollCreate(inp.clone()))?;
        let recursive = inp.cond.contains(keywords::RECURSIVE_OPR_KW);

        if let Some(entry) = self.catalog.get(&inp.path) {
            return if recursive && entry.kind == EntityKind::Collection {
                Ok(())
            } else {
                Err(RpcError::new(status::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME))
            };
        }

        if recursive {
            // Nearest existing ancestor must be a writable collection.
            let mut ancestor = split_path(&inp.path).0.to_string();
            while self.catalog.get(&ancestor).is_none() {
                if ancestor == "/" {
                    return Err(RpcError::new(status::CAT_UNKNOWN_COLLECTION));
                }
                ancestor = split_path(&ancestor).0.to_string();
            }
            if !self.catalog.is_collection(&ancestor) {
                return Err(RpcError::new(status::CAT_UNKNOWN_COLLECTION));
            }
            self.require_access(&ancestor, AccessLevel::Write)?;
            self.catalog.create_collection_all(&inp.path);
        } else {
            let parent = self.require_parent(&inp.path)?;
            self.require_access(&parent, AccessLevel::Write)?;
            let entry =
                CatalogEntry::new(EntityKind::Collection, &self.catalog.user, &self.catalog.zone);
            self.catalog.entries.insert(inp.path.clone(), entry);
        }
        Ok(())
    }

    fn rm_coll(&mut self, inp: &CollInp) -> RpcResult<()> {
        self.receive(RpcRequest::RmColl(inp.clone()))?;
        // The root and the zone collection are never removable.
        if inp.path == "/" || inp.path == format!("/{}", self.catalog.zone) {
            return Err(RpcError::new(status::CAT_INVALID_ARGUMENT));
        }
        self.require_entity(&inp.path, EntityKind::Collection)?;
        self.require_access(&inp.path, AccessLevel::Write)?;

        let descendants = self.catalog.descendants(&inp.path);
        if !descendants.is_empty() && !inp.cond.contains(keywords::RECURSIVE_OPR_KW) {
            return Err(RpcError::new(status::CAT_COLLECTION_NOT_EMPTY));
        }
        for path in descendants {
            self.catalog.entries.remove(&path);
        }
        self.catalog.entries.remove(&inp.path);
        Ok(())
    }

    fn mod_avu_metadata(&mut self, inp: &ModAvuMetadataInp) -> RpcResult<()> {
        self.receive(RpcRequest::ModAvuMetadata(inp.clone()))?;
        self.require_entity(&inp.path, inp.entity)?;
        self.require_access(&inp.path, AccessLevel::Write)?;
        let entry = self
            .catalog
            .get_mut(&inp.path)
            .ok_or(RpcError::new(status::CAT_UNKNOWN_FILE))?;
        apply_avu_operation(&mut entry.avus, inp.operation, &inp.avu())
    }

    fn atomic_apply_metadata_operations(&mut self, inp: &AtomicMetadataInp) -> RpcResult<()> {
        self.receive(RpcRequest::AtomicApplyMetadata(inp.clone()))?;
        self.require_entity(&inp.path, inp.entity)?;
        self.require_access(&inp.path, AccessLevel::Write)?;
        let entry = self
            .catalog
            .get_mut(&inp.path)
            .ok_or(RpcError::new(status::CAT_UNKNOWN_FILE))?;

        let mut staged = entry.avus.clone();
        for operation in &inp.operations {
            apply_avu_operation(&mut staged, operation.operation, &operation.avu)?;
        }
        entry.avus = staged;
        Ok(())
    }

    fn mod_access_control(&mut self, inp: &ModAccessControlInp) -> RpcResult<()> {
        self.receive(RpcRequest::ModAccessControl(inp.clone()))?;
        if inp.user_name.is_empty() {
            return Err(RpcError::new(status::CAT_INVALID_USER));
        }
        let kind = self
            .catalog
            .get(&inp.path)
            .map(|e| e.kind)
            .ok_or(RpcError::new(status::USER_FILE_DOES_NOT_EXIST))?;
        self.require_access(&inp.path, AccessLevel::Own)?;

        let zone = inp.zone.clone().unwrap_or_else(|| self.catalog.zone.clone());
        let mut targets = vec![inp.path.clone()];
        if inp.recursive && kind == EntityKind::Collection {
            targets.extend(self.catalog.descendants(&inp.path));
        }
        for path in targets {
            if let Some(entry) = self.catalog.get_mut(&path) {
                entry.set_access(&inp.user_name, &zone, inp.access_level);
            }
        }
        Ok(())
    }

    fn gen_query(&mut self, inp: &GenQueryInp) -> RpcResult<GenQueryOut> {
        self.receive(RpcRequest::GenQuery(inp.clone()))?;
        let rows = evaluate(&self.catalog, inp)?;
        page(rows, inp.max_rows, inp.continue_index)
    }

    fn specific_query(&mut self, inp: &SpecificQueryInp) -> RpcResult<GenQueryOut> {
        self.receive(RpcRequest::SpecificQuery(inp.clone()))?;
        if let Some(zone) = &inp.zone {
            if *zone != self.catalog.zone {
                return Err(RpcError::new(status::CAT_NO_ROWS_FOUND));
            }
        }
        let definition = self
            .catalog
            .specific_queries
            .get(&inp.sql)
            .ok_or(RpcError::new(status::CAT_UNKNOWN_SPECIFIC_QUERY))?;
        if definition.arg_columns.len() != inp.args.len() {
            return Err(RpcError::new(status::CAT_INVALID_ARGUMENT));
        }
        let rows = definition
            .rows
            .iter()
            .filter(|row| {
                definition
                    .arg_columns
                    .iter()
                    .zip(&inp.args)
                    .all(|(col, arg)| row.get(*col) == Some(arg))
            })
            .cloned()
            .collect();
        page(rows, inp.max_rows, inp.continue_index)
    }
}
