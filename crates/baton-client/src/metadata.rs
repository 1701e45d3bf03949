//! Adding and removing AVUs.
//!
//! Batches are applied one request per AVU, in order, and stop at the first
//! failure. Requests already applied are not undone; use
//! [`atomic_apply_json_operations`] when all-or-nothing is needed.

use serde_json::Value;
use tracing::{debug, info};

use baton_rpc::{AtomicMetadataInp, Connection, ModAvuMetadataInp};
use baton_types::{Avu, MetadataOp, MetadataOperation, RemotePath};

use crate::error::{logged, BatonResult, RpcResultExt};
use crate::query::fetch_avus;
use crate::resolve::require_kind;

/// Apply `op` to one AVU on `path`. An empty `unit` is sent as `""`.
pub fn modify_metadata<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    op: MetadataOp,
    attribute: &str,
    value: &str,
    unit: &str,
) -> BatonResult<()> {
    modify_avu(conn, path, op, &Avu::with_unit(attribute, value, unit))
}

fn modify_avu<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    op: MetadataOp,
    avu: &Avu,
) -> BatonResult<()> {
    let kind = require_kind(path)?;
    let inp = ModAvuMetadataInp::new(op, kind, path.resolved(), avu);
    debug!(path = %path, %op, %avu, "modifying metadata");
    conn.mod_avu_metadata(&inp).rpc_context(|| {
        format!("Failed to {op} AVU {avu} on {kind} '{}'", path.resolved())
    })
}

/// As [`modify_metadata`], with the AVU given as `{attribute, value, unit?}`.
///
/// A malformed AVU is rejected before any request is made.
pub fn modify_json_metadata<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    op: MetadataOp,
    avu: &Value,
) -> BatonResult<()> {
    let avu = Avu::from_json(avu).map_err(logged)?;
    modify_avu(conn, path, op, &avu)
}

/// Apply `op` to each candidate AVU that is not in `reference`, in order.
///
/// Returns the number of requests made. Candidates present in `reference`
/// are skipped, so applying the same sets twice changes nothing the second
/// time.
pub fn maybe_modify_json_metadata<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    op: MetadataOp,
    candidates: &Value,
    reference: &Value,
) -> BatonResult<usize> {
    let candidates = Avu::list_from_json(candidates).map_err(logged)?;
    let reference = Avu::list_from_json(reference).map_err(logged)?;
    apply_difference(conn, path, op, &candidates, &reference)
}

fn apply_difference<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    op: MetadataOp,
    candidates: &[Avu],
    reference: &[Avu],
) -> BatonResult<usize> {
    let mut applied = 0;
    for avu in candidates {
        if reference.contains(avu) {
            debug!(path = %path, %avu, "skipping AVU already in reference set");
            continue;
        }
        modify_avu(conn, path, op, avu)?;
        applied += 1;
    }
    Ok(applied)
}

/// Replace AVUs on `path` with `new_avus`, attribute by attribute.
///
/// Current AVUs whose attribute appears in `new_avus` are removed unless they
/// are also in `new_avus`; then the new AVUs not already present are added.
/// AVUs with other attributes are untouched.
pub fn supersede_metadata<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    new_avus: &Value,
) -> BatonResult<()> {
    let new_avus = Avu::list_from_json(new_avus).map_err(logged)?;
    let current = fetch_avus(conn, path, None)?;

    let superseded: Vec<Avu> = current
        .iter()
        .filter(|avu| new_avus.iter().any(|n| n.attribute == avu.attribute))
        .cloned()
        .collect();
    let removed = apply_difference(conn, path, MetadataOp::Remove, &superseded, &new_avus)?;
    let added = apply_difference(conn, path, MetadataOp::Add, &new_avus, &current)?;
    info!(path = %path, removed, added, "superseded metadata");
    Ok(())
}

/// Apply `{operation, attribute, value, unit?}` operations in order.
///
/// All operations are parsed before the first request. Returns the number
/// applied.
pub fn apply_json_operations<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    operations: &Value,
) -> BatonResult<usize> {
    let operations = MetadataOperation::list_from_json(operations).map_err(logged)?;
    for operation in &operations {
        modify_avu(conn, path, operation.operation, &operation.avu)?;
    }
    Ok(operations.len())
}

/// Apply operations as a single request that the server applies entirely or
/// not at all.
pub fn atomic_apply_json_operations<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    operations: &Value,
) -> BatonResult<()> {
    let operations = MetadataOperation::list_from_json(operations).map_err(logged)?;
    let kind = require_kind(path)?;
    let count = operations.len();
    let inp = AtomicMetadataInp {
        entity: kind,
        path: path.resolved().to_string(),
        operations,
    };
    debug!(path = %path, count, "applying metadata operations atomically");
    conn.atomic_apply_metadata_operations(&inp).rpc_context(|| {
        format!("Failed to apply {count} metadata operations to {kind} '{}'", path.resolved())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatonError;
    use baton_rpc::{status, InMemoryServer, RpcKind};
    use baton_types::EntityKind;
    use serde_json::json;

    const OBJ: &str = "/z/home/u/f.txt";

    fn setup() -> (InMemoryServer, RemotePath) {
        let mut s = InMemoryServer::new("z", "u");
        s.seed_data_object(OBJ, b"");
        (s, RemotePath::existing(OBJ, OBJ, EntityKind::DataObject))
    }

    // -----------------------------------------------------------------------
    // Single AVUs
    // -----------------------------------------------------------------------

    #[test]
    fn empty_unit_is_sent_as_empty_string() {
        let (mut s, path) = setup();
        modify_metadata(&mut s, &path, MetadataOp::Add, "attr", "val", "").unwrap();
        let requests = s.avu_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].unit, "");
        assert_eq!(requests[0].entity, EntityKind::DataObject);
        assert_eq!(requests[0].operation, MetadataOp::Add);
        assert_eq!(s.avus(OBJ).unwrap(), &[Avu::new("attr", "val")]);
    }

    #[test]
    fn entity_kind_follows_path() {
        let (mut s, _) = setup();
        let coll = RemotePath::existing("/z/home/u", "/z/home/u", EntityKind::Collection);
        modify_metadata(&mut s, &coll, MetadataOp::Add, "a", "1", "kb").unwrap();
        assert_eq!(s.avu_requests()[0].entity, EntityKind::Collection);
        assert_eq!(s.avus("/z/home/u").unwrap(), &[Avu::with_unit("a", "1", "kb")]);
    }

    #[test]
    fn failure_names_the_server_error() {
        let (mut s, path) = setup();
        modify_metadata(&mut s, &path, MetadataOp::Add, "a", "1", "").unwrap();
        let err = modify_metadata(&mut s, &path, MetadataOp::Add, "a", "1", "").unwrap_err();
        assert_eq!(err.code(), status::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME);
        assert!(err.to_string().contains("CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME"));
    }

    #[test]
    fn missing_path_cannot_be_modified() {
        let (mut s, _) = setup();
        let missing = RemotePath::missing("/z/home/u/nope", "/z/home/u/nope");
        let err = modify_metadata(&mut s, &missing, MetadataOp::Add, "a", "1", "").unwrap_err();
        assert!(matches!(err, BatonError::NotFound(_)));
        assert!(s.calls().is_empty());
    }

    #[test]
    fn json_avu_validated_before_request() {
        let (mut s, path) = setup();
        for bad in [
            json!({"value": "1"}),
            json!({"attribute": "a"}),
            json!({"attribute": 1, "value": "1"}),
            json!("a=1"),
        ] {
            let err = modify_json_metadata(&mut s, &path, MetadataOp::Add, &bad).unwrap_err();
            assert!(matches!(err, BatonError::InvalidJson(_)), "{bad}");
        }
        assert!(s.calls().is_empty());

        modify_json_metadata(
            &mut s,
            &path,
            MetadataOp::Add,
            &json!({"attribute": "a", "value": "1", "units": "m"}),
        )
        .unwrap();
        assert_eq!(s.avus(OBJ).unwrap(), &[Avu::with_unit("a", "1", "m")]);
    }

    // -----------------------------------------------------------------------
    // Difference application
    // -----------------------------------------------------------------------

    #[test]
    fn identical_sets_issue_no_requests() {
        let (mut s, path) = setup();
        let avus = json!([
            {"attribute": "a", "value": "1"},
            {"attribute": "b", "value": "2", "unit": "kg"},
        ]);
        let applied =
            maybe_modify_json_metadata(&mut s, &path, MetadataOp::Add, &avus, &avus).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(s.count(RpcKind::ModAvuMetadata), 0);
    }

    #[test]
    fn disjoint_sets_issue_one_request_each_in_order() {
        let (mut s, path) = setup();
        let candidates = json!([
            {"attribute": "c", "value": "3"},
            {"attribute": "a", "value": "1"},
            {"attribute": "b", "value": "2"},
        ]);
        let reference = json!([{"attribute": "z", "value": "9"}]);
        let applied =
            maybe_modify_json_metadata(&mut s, &path, MetadataOp::Add, &candidates, &reference)
                .unwrap();
        assert_eq!(applied, 3);
        let attributes: Vec<&str> = s
            .avu_requests()
            .iter()
            .map(|r| r.attribute.as_str())
            .collect();
        assert_eq!(attributes, vec!["c", "a", "b"]);
    }

    #[test]
    fn unit_distinguishes_avus() {
        let (mut s, path) = setup();
        let candidates = json!([{"attribute": "a", "value": "1", "unit": "kg"}]);
        let reference = json!([{"attribute": "a", "value": "1"}]);
        let applied =
            maybe_modify_json_metadata(&mut s, &path, MetadataOp::Add, &candidates, &reference)
                .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn first_failure_aborts_remaining() {
        let (mut s, path) = setup();
        s.fail_nth(RpcKind::ModAvuMetadata, 2, status::CAT_NO_ACCESS_PERMISSION);
        let candidates = json!([
            {"attribute": "a", "value": "1"},
            {"attribute": "b", "value": "2"},
            {"attribute": "c", "value": "3"},
        ]);
        let err = maybe_modify_json_metadata(&mut s, &path, MetadataOp::Add, &candidates, &json!([]))
            .unwrap_err();
        assert!(err.is_rpc_status(status::CAT_NO_ACCESS_PERMISSION));
        assert_eq!(s.count(RpcKind::ModAvuMetadata), 2);
        // No rollback of the first.
        assert_eq!(s.avus(OBJ).unwrap(), &[Avu::new("a", "1")]);
    }

    #[test]
    fn malformed_candidates_rejected() {
        let (mut s, path) = setup();
        let err = maybe_modify_json_metadata(
            &mut s,
            &path,
            MetadataOp::Remove,
            &json!([{"attribute": "a"}]),
            &json!([]),
        )
        .unwrap_err();
        assert!(matches!(err, BatonError::InvalidJson(_)));
        assert!(s.calls().is_empty());
    }

    // -----------------------------------------------------------------------
    // Supersede
    // -----------------------------------------------------------------------

    #[test]
    fn supersede_replaces_by_attribute() {
        let (mut s, path) = setup();
        s.seed_avu(OBJ, Avu::new("colour", "red"));
        s.seed_avu(OBJ, Avu::new("colour", "blue"));
        s.seed_avu(OBJ, Avu::new("keep", "me"));

        supersede_metadata(
            &mut s,
            &path,
            &json!([
                {"attribute": "colour", "value": "blue"},
                {"attribute": "colour", "value": "green"},
            ]),
        )
        .unwrap();

        let mut avus = s.avus(OBJ).unwrap().to_vec();
        avus.sort();
        assert_eq!(
            avus,
            vec![
                Avu::new("colour", "blue"),
                Avu::new("colour", "green"),
                Avu::new("keep", "me"),
            ]
        );
        // One removal (red) and one addition (green).
        assert_eq!(s.count(RpcKind::ModAvuMetadata), 2);
    }

    #[test]
    fn supersede_with_current_set_is_a_no_op() {
        let (mut s, path) = setup();
        s.seed_avu(OBJ, Avu::new("a", "1"));
        supersede_metadata(&mut s, &path, &json!([{"attribute": "a", "value": "1"}])).unwrap();
        assert_eq!(s.count(RpcKind::ModAvuMetadata), 0);
    }

    // -----------------------------------------------------------------------
    // Operation lists
    // -----------------------------------------------------------------------

    #[test]
    fn operations_apply_in_order() {
        let (mut s, path) = setup();
        s.seed_avu(OBJ, Avu::new("old", "1"));
        let ops = json!([
            {"operation": "add", "attribute": "new", "value": "2"},
            {"operation": "rm", "attribute": "old", "value": "1"},
        ]);
        assert_eq!(apply_json_operations(&mut s, &path, &ops).unwrap(), 2);
        assert_eq!(s.avus(OBJ).unwrap(), &[Avu::new("new", "2")]);
    }

    #[test]
    fn unknown_operation_rejected_before_requests() {
        let (mut s, path) = setup();
        let ops = json!([
            {"operation": "add", "attribute": "a", "value": "1"},
            {"operation": "replace", "attribute": "b", "value": "2"},
        ]);
        let err = apply_json_operations(&mut s, &path, &ops).unwrap_err();
        assert!(matches!(err, BatonError::InvalidJson(_)));
        assert!(s.calls().is_empty());
    }

    #[test]
    fn atomic_failure_changes_nothing() {
        let (mut s, path) = setup();
        s.seed_avu(OBJ, Avu::new("a", "1"));
        let ops = json!([
            {"operation": "add", "attribute": "b", "value": "2"},
            {"operation": "add", "attribute": "a", "value": "1"},
        ]);
        let err = atomic_apply_json_operations(&mut s, &path, &ops).unwrap_err();
        assert!(err.is_rpc_status(status::CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME));
        assert_eq!(s.count(RpcKind::AtomicApplyMetadata), 1);
        assert_eq!(s.avus(OBJ).unwrap(), &[Avu::new("a", "1")]);
    }

    #[test]
    fn atomic_success() {
        let (mut s, path) = setup();
        let ops = json!([
            {"operation": "add", "attribute": "b", "value": "2"},
            {"operation": "add", "attribute": "c", "value": "3", "unit": "s"},
        ]);
        atomic_apply_json_operations(&mut s, &path, &ops).unwrap();
        assert_eq!(s.avus(OBJ).unwrap().len(), 2);
    }
}
