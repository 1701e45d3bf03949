use tracing::{debug, info};

use baton_rpc::{keywords, CollInp, Connection, DataObjInp};
use baton_types::{EntityKind, OperationOptions, RemotePath};

use crate::error::{fail, BatonError, BatonResult, RpcResultExt};
use crate::resolve::require_exact_kind;

/// Create the collection at `path`, with missing parents when `recursive`.
pub fn create_collection<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    options: &OperationOptions,
) -> BatonResult<()> {
    if path.is_data_object() {
        return fail(BatonError::WrongKind {
            path: path.resolved().to_string(),
            expected: EntityKind::Collection,
            actual: EntityKind::DataObject,
        });
    }

    let target = path.resolved();
    let mut inp = CollInp::new(target);
    if options.recursive {
        debug!(path = target, "creating collection recursively");
        inp = inp.with_keyword(keywords::RECURSIVE_OPR_KW, "");
    }
    conn.coll_create(&inp)
        .rpc_context(|| format!("Failed to create collection: '{target}'"))?;
    info!(path = target, "created collection");
    Ok(())
}

/// Remove the data object at `path`.
pub fn remove_data_object<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
) -> BatonResult<()> {
    require_exact_kind(path, EntityKind::DataObject)?;

    let target = path.resolved();
    debug!(path = target, "removing data object");
    let inp = DataObjInp::new(target).with_keyword(keywords::FORCE_FLAG_KW, "");
    conn.data_obj_unlink(&inp)
        .rpc_context(|| format!("Failed to remove data object: '{target}'"))?;
    info!(path = target, "removed data object");
    Ok(())
}

/// Remove the collection at `path`. A non-empty collection needs `recursive`.
pub fn remove_collection<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    options: &OperationOptions,
) -> BatonResult<()> {
    require_exact_kind(path, EntityKind::Collection)?;

    let target = path.resolved();
    debug!(path = target, "removing collection");
    let mut inp = CollInp::new(target);
    if options.recursive {
        debug!(path = target, "enabling recursive removal");
        inp = inp.with_keyword(keywords::RECURSIVE_OPR_KW, "");
    }
    if options.force {
        debug!(path = target, "enabling forced removal");
        inp = inp.with_keyword(keywords::FORCE_FLAG_KW, "");
    }
    conn.rm_coll(&inp)
        .rpc_context(|| format!("Failed to remove collection: '{target}'"))?;
    info!(path = target, "removed collection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_rpc::{status, InMemoryServer, RpcKind, RpcRequest};

    fn server() -> InMemoryServer {
        let mut s = InMemoryServer::new("z", "u");
        s.seed_data_object("/z/home/u/a/f.txt", b"x");
        s
    }

    fn coll(path: &str) -> RemotePath {
        RemotePath::existing(path, path, EntityKind::Collection)
    }

    #[test]
    fn create_plain_and_recursive() {
        let mut s = server();
        create_collection(&mut s, &RemotePath::missing("/z/home/u/b", "/z/home/u/b"), &OperationOptions::default())
            .unwrap();
        assert!(s.exists("/z/home/u/b"));

        let deep = RemotePath::missing("/z/home/u/c/d/e", "/z/home/u/c/d/e");
        let err = create_collection(&mut s, &deep, &OperationOptions::default()).unwrap_err();
        assert!(err.is_rpc_status(status::CAT_UNKNOWN_COLLECTION));
        create_collection(&mut s, &deep, &OperationOptions::default().with_recursive()).unwrap();
        assert!(s.exists("/z/home/u/c/d"));

        let RpcRequest::CollCreate(inp) = s.calls().last().unwrap() else {
            panic!("expected collection create");
        };
        assert!(inp.cond.contains(keywords::RECURSIVE_OPR_KW));
    }

    #[test]
    fn remove_data_object_forces() {
        let mut s = server();
        let obj = RemotePath::existing("/z/home/u/a/f.txt", "/z/home/u/a/f.txt", EntityKind::DataObject);
        remove_data_object(&mut s, &obj).unwrap();
        assert!(!s.exists("/z/home/u/a/f.txt"));
        let RpcRequest::DataObjUnlink(inp) = &s.calls()[0] else {
            panic!("expected unlink");
        };
        assert!(inp.cond.contains(keywords::FORCE_FLAG_KW));
    }

    #[test]
    fn wrong_kind_makes_no_request() {
        let mut s = server();
        let err = remove_data_object(&mut s, &coll("/z/home/u/a")).unwrap_err();
        assert!(matches!(err, BatonError::WrongKind { .. }));
        assert!(s.calls().is_empty());
    }

    #[test]
    fn non_empty_collection_needs_recursion() {
        let mut s = server();
        let err = remove_collection(&mut s, &coll("/z/home/u/a"), &OperationOptions::default())
            .unwrap_err();
        assert!(err.is_rpc_status(status::CAT_COLLECTION_NOT_EMPTY));

        let options = OperationOptions::default().with_recursive().with_force();
        remove_collection(&mut s, &coll("/z/home/u/a"), &options).unwrap();
        assert!(!s.exists("/z/home/u/a/f.txt"));
        assert_eq!(s.count(RpcKind::RmColl), 2);
    }
}
