use serde_json::Value;
use tracing::{debug, info};

use baton_rpc::{Connection, ModAccessControlInp};
use baton_types::{AccessControlEntry, AccessLevel, EntityKind, RemotePath};

use crate::error::{logged, BatonResult, RpcResultExt};
use crate::query::fetch_access;
use crate::resolve::require_kind;

/// Grant `level` on `path` to the owner named by `owner` (`user` or
/// `user#zone`).
///
/// `recursive` applies the change below a collection. It has no meaning for
/// a data object and is dropped there rather than rejected.
pub fn modify_permissions<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    recursive: bool,
    owner: &str,
    level: &str,
) -> BatonResult<()> {
    let level: AccessLevel = level.parse().map_err(logged)?;
    let entry = AccessControlEntry::from_specifier(owner, level).map_err(logged)?;
    apply_entry(conn, path, recursive, &entry)
}

/// As [`modify_permissions`], with the change given as `{owner, level, zone?}`.
pub fn modify_json_permissions<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    recursive: bool,
    acl: &Value,
) -> BatonResult<()> {
    let entry = AccessControlEntry::from_json(acl).map_err(logged)?;
    apply_entry(conn, path, recursive, &entry)
}

fn apply_entry<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    recursive: bool,
    entry: &AccessControlEntry,
) -> BatonResult<()> {
    let kind = require_kind(path)?;
    let recursive = if recursive && kind == EntityKind::DataObject {
        debug!(path = %path, "ignoring recursive flag for a data object");
        false
    } else {
        recursive
    };

    let inp = ModAccessControlInp {
        recursive,
        access_level: entry.level,
        user_name: entry.owner.clone(),
        zone: entry.zone.clone(),
        path: path.resolved().to_string(),
    };
    let owner = entry.owner_specifier();
    debug!(path = %path, %owner, level = %entry.level, recursive, "modifying permissions");
    conn.mod_access_control(&inp).rpc_context(|| {
        format!(
            "Failed to set permissions '{owner}:{}' on '{}'",
            entry.level,
            path.resolved()
        )
    })?;
    info!(path = %path, %owner, level = %entry.level, "modified permissions");
    Ok(())
}

/// The ACL of `path` as a JSON array of `{owner, zone, level}`.
pub fn list_permissions<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
) -> BatonResult<Value> {
    let kind = require_kind(path)?;
    Ok(Value::Array(fetch_access(conn, kind, path.resolved())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatonError;
    use baton_rpc::{status, InMemoryServer, RpcRequest};
    use serde_json::json;

    fn setup() -> InMemoryServer {
        let mut s = InMemoryServer::new("z", "u");
        s.seed_data_object("/z/home/u/c/f.txt", b"");
        s
    }

    fn obj() -> RemotePath {
        RemotePath::existing("/z/home/u/c/f.txt", "/z/home/u/c/f.txt", EntityKind::DataObject)
    }

    fn coll() -> RemotePath {
        RemotePath::existing("/z/home/u/c", "/z/home/u/c", EntityKind::Collection)
    }

    fn last_acl_request(s: &InMemoryServer) -> &ModAccessControlInp {
        match s.calls().last() {
            Some(RpcRequest::ModAccessControl(inp)) => inp,
            other => panic!("expected ACL request, got {other:?}"),
        }
    }

    #[test]
    fn grant_read() {
        let mut s = setup();
        modify_permissions(&mut s, &obj(), false, "public", "read").unwrap();
        let acl = list_permissions(&mut s, &obj()).unwrap();
        assert!(acl
            .as_array()
            .unwrap()
            .contains(&json!({"owner": "public", "zone": "z", "level": "read"})));
    }

    #[test]
    fn recursive_is_cleared_for_data_objects() {
        let mut s = setup();
        modify_permissions(&mut s, &obj(), true, "public", "read").unwrap();
        assert!(!last_acl_request(&s).recursive);
    }

    #[test]
    fn recursive_applies_below_collections() {
        let mut s = setup();
        modify_permissions(&mut s, &coll(), true, "public#z", "write").unwrap();
        let inp = last_acl_request(&s);
        assert!(inp.recursive);
        assert_eq!(inp.zone.as_deref(), Some("z"));
        let acl = list_permissions(&mut s, &obj()).unwrap();
        assert!(acl
            .as_array()
            .unwrap()
            .contains(&json!({"owner": "public", "zone": "z", "level": "write"})));
    }

    #[test]
    fn unknown_level_rejected_before_request() {
        let mut s = setup();
        let err = modify_permissions(&mut s, &obj(), false, "public", "admin").unwrap_err();
        assert!(matches!(err, BatonError::InvalidArgument(_)));
        assert!(s.calls().is_empty());
    }

    #[test]
    fn json_entry() {
        let mut s = setup();
        modify_json_permissions(
            &mut s,
            &obj(),
            false,
            &json!({"owner": "bob", "zone": "z", "level": "own"}),
        )
        .unwrap();
        assert_eq!(last_acl_request(&s).access_level, AccessLevel::Own);

        let err = modify_json_permissions(&mut s, &obj(), false, &json!({"level": "own"}))
            .unwrap_err();
        assert!(matches!(err, BatonError::InvalidJson(_)));
    }

    #[test]
    fn null_level_removes_grant() {
        let mut s = setup();
        modify_permissions(&mut s, &obj(), false, "public", "read").unwrap();
        modify_permissions(&mut s, &obj(), false, "public", "null").unwrap();
        let acl = list_permissions(&mut s, &obj()).unwrap();
        assert_eq!(acl, json!([{"owner": "u", "zone": "z", "level": "own"}]));
    }

    #[test]
    fn server_refusal_is_reported() {
        let mut s = setup();
        s.seed_user_access("/z/home/u/c/f.txt", AccessLevel::Read);
        let err = modify_permissions(&mut s, &obj(), false, "public", "read").unwrap_err();
        assert_eq!(err.code(), status::CAT_NO_ACCESS_PERMISSION);
        assert!(err.to_string().contains("public:read"));
    }
}
