//! Turning user-supplied path strings into typed [`RemotePath`]s.
//!
//! The kind of an existing path always comes from the server's stat
//! response, never from the shape of the string.

use serde_json::Value;
use tracing::debug;

use baton_rpc::{status, Connection};
use baton_types::{normalize_path, EntityKind, RemotePath, MAX_NAME_LEN};

use crate::env::ClientEnv;
use crate::error::{fail, logged, BatonError, BatonResult};
use crate::json::target_path;

/// Normalise `raw` against the session and stat it.
///
/// Fails with [`BatonError::NotFound`] if the server has no such path. Makes
/// no changes and may be repeated freely.
pub fn resolve_path<C: Connection + ?Sized>(
    conn: &mut C,
    env: &ClientEnv,
    raw: &str,
) -> BatonResult<RemotePath> {
    let path = lookup_path(conn, env, raw)?;
    if !path.exists() {
        return fail(BatonError::NotFound(path.resolved().to_string()));
    }
    Ok(path)
}

/// As [`resolve_path`], but a missing path is returned with
/// `exists() == false` instead of failing.
pub fn lookup_path<C: Connection + ?Sized>(
    conn: &mut C,
    env: &ClientEnv,
    raw: &str,
) -> BatonResult<RemotePath> {
    let resolved = normalize_path(raw, &env.cwd).map_err(logged)?;
    debug!(input = raw, path = %resolved, "resolving path");

    match conn.obj_stat(&resolved) {
        Ok(stat) => {
            debug!(path = %resolved, kind = %stat.kind, "resolved path");
            Ok(RemotePath::existing(raw, resolved, stat.kind))
        }
        Err(err) if err.is(status::USER_FILE_DOES_NOT_EXIST) => {
            debug!(path = %resolved, "path does not exist");
            Ok(RemotePath::missing(raw, resolved))
        }
        Err(err) => Err(logged(BatonError::rpc(
            format!("Failed to stat '{resolved}'"),
            err,
        ))),
    }
}

/// Use an already-known absolute path as both input and resolved form.
///
/// No request is made, so the server validates the path only when an
/// operation uses it.
pub fn set_path(raw: &str, kind: EntityKind) -> BatonResult<RemotePath> {
    let reason = if !raw.starts_with('/') {
        Some("path must be absolute".to_string())
    } else if raw.contains('\0') {
        Some("path must not contain NUL".to_string())
    } else if raw.len() > MAX_NAME_LEN {
        Some(format!("longer than {MAX_NAME_LEN} bytes"))
    } else {
        None
    };
    if let Some(reason) = reason {
        return fail(BatonError::InvalidPath {
            path: raw.to_string(),
            reason,
        });
    }
    Ok(RemotePath::existing(raw, raw, kind))
}

/// Resolve a `{collection, data_object?}` target.
pub fn resolve_target<C: Connection + ?Sized>(
    conn: &mut C,
    env: &ClientEnv,
    target: &Value,
) -> BatonResult<RemotePath> {
    let raw = target_path(target)?;
    resolve_path(conn, env, &raw)
}

/// The kind of an existing path; a missing path cannot be operated on.
pub fn require_kind(path: &RemotePath) -> BatonResult<EntityKind> {
    match path.kind() {
        Some(kind) => Ok(kind),
        None => fail(BatonError::NotFound(path.resolved().to_string())),
    }
}

/// Fail with [`BatonError::WrongKind`] unless `path` exists as `expected`.
pub fn require_exact_kind(path: &RemotePath, expected: EntityKind) -> BatonResult<()> {
    let actual = require_kind(path)?;
    if actual != expected {
        return fail(BatonError::WrongKind {
            path: path.resolved().to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_rpc::{InMemoryServer, RpcKind};
    use serde_json::json;

    fn setup() -> (InMemoryServer, ClientEnv) {
        let mut server = InMemoryServer::new("z", "u");
        server.seed_data_object("/z/home/u/f.txt", b"abc");
        (server, ClientEnv::new("z", "u"))
    }

    #[test]
    fn kind_comes_from_server() {
        let (mut server, env) = setup();
        let obj = resolve_path(&mut server, &env, "/z/home/u/f.txt").unwrap();
        assert_eq!(obj.kind(), Some(EntityKind::DataObject));
        let coll = resolve_path(&mut server, &env, "/z/home/u/").unwrap();
        assert_eq!(coll.kind(), Some(EntityKind::Collection));
        assert_eq!(coll.resolved(), "/z/home/u");
        assert_eq!(coll.input(), "/z/home/u/");
    }

    #[test]
    fn relative_paths_use_cwd() {
        let (mut server, env) = setup();
        let path = resolve_path(&mut server, &env, "./f.txt").unwrap();
        assert_eq!(path.resolved(), "/z/home/u/f.txt");
    }

    #[test]
    fn missing_path_is_not_found() {
        let (mut server, env) = setup();
        let err = resolve_path(&mut server, &env, "/z/home/u/nope").unwrap_err();
        assert!(matches!(err, BatonError::NotFound(ref p) if p == "/z/home/u/nope"));

        let looked_up = lookup_path(&mut server, &env, "/z/home/u/nope").unwrap();
        assert!(!looked_up.exists());
        assert!(require_kind(&looked_up).is_err());
    }

    #[test]
    fn resolution_is_repeatable() {
        let (mut server, env) = setup();
        let first = resolve_path(&mut server, &env, "f.txt").unwrap();
        let second = resolve_path(&mut server, &env, "f.txt").unwrap();
        assert_eq!(first, second);
        assert_eq!(server.count(RpcKind::ObjStat), 2);
        assert!(server.calls().iter().all(|c| c.kind() == RpcKind::ObjStat));
    }

    #[test]
    fn malformed_path_is_rejected_before_stat() {
        let (mut server, env) = setup();
        let err = resolve_path(&mut server, &env, "").unwrap_err();
        assert!(matches!(err, BatonError::InvalidPath { .. }));
        assert_eq!(server.count(RpcKind::ObjStat), 0);
    }

    #[test]
    fn other_stat_failures_are_rpc_errors() {
        let (mut server, env) = setup();
        server.fail_nth(RpcKind::ObjStat, 1, status::CAT_NO_ACCESS_PERMISSION);
        let err = resolve_path(&mut server, &env, "f.txt").unwrap_err();
        assert!(err.is_rpc_status(status::CAT_NO_ACCESS_PERMISSION));
    }

    #[test]
    fn set_path_makes_no_requests() {
        let path = set_path("/z/home/u/listed.txt", EntityKind::DataObject).unwrap();
        assert_eq!(path.input(), path.resolved());
        assert!(path.is_data_object());
        assert!(set_path("relative", EntityKind::Collection).is_err());
    }

    #[test]
    fn targets() {
        let (mut server, env) = setup();
        let target = json!({"collection": "/z/home/u", "data_object": "f.txt"});
        let path = resolve_target(&mut server, &env, &target).unwrap();
        assert_eq!(path.resolved(), "/z/home/u/f.txt");
        assert!(path.is_data_object());
    }

    #[test]
    fn exact_kind() {
        let (mut server, env) = setup();
        let coll = resolve_path(&mut server, &env, "/z/home/u").unwrap();
        assert!(require_exact_kind(&coll, EntityKind::Collection).is_ok());
        let err = require_exact_kind(&coll, EntityKind::DataObject).unwrap_err();
        assert!(matches!(err, BatonError::WrongKind { .. }));
    }
}
