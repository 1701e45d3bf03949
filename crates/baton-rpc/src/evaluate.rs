//! General query evaluation over a [`Catalog`].

use std::collections::HashSet;

use baton_types::{split_path, AccessControlEntry, AccessLevel, Avu, EntityKind};

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{status, RpcError, RpcResult};
use crate::query::{Column, ColumnScope, Condition, GenQueryInp};

/// Evaluate `inp` and return every matching row, ignoring the page window.
pub(crate) fn evaluate(catalog: &Catalog, inp: &GenQueryInp) -> RpcResult<Vec<Vec<String>>> {
    if inp.select.is_empty() {
        return Err(RpcError::new(status::CAT_INVALID_ARGUMENT));
    }
    if let Some(zone) = &inp.zone {
        if *zone != catalog.zone {
            return Ok(Vec::new());
        }
    }

    let target = target_kind(inp)?;

    let mut entity_conditions = Vec::new();
    let mut avu_groups: Vec<Vec<&Condition>> = Vec::new();
    let mut access_conditions = Vec::new();
    for condition in &inp.conditions {
        if condition.column.is_metadata() {
            let opens_group = matches!(
                condition.column,
                Column::MetaCollAttrName | Column::MetaDataAttrName
            );
            if opens_group || avu_groups.is_empty() {
                avu_groups.push(Vec::new());
            }
            if let Some(group) = avu_groups.last_mut() {
                group.push(condition);
            }
        } else if condition.column.is_access() {
            access_conditions.push(condition);
        } else {
            entity_conditions.push(condition);
        }
    }

    let selects_avus = inp.select.iter().any(Column::is_metadata);
    let selects_access = inp.select.iter().any(Column::is_access);

    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (path, entry) in &catalog.entries {
        if entry.kind != target {
            continue;
        }
        let matches_entity = entity_conditions
            .iter()
            .all(|c| c.matches(&entity_value(c.column, path, entry)));
        let matches_avus = avu_groups
            .iter()
            .all(|group| entry.avus.iter().any(|avu| avu_matches(group, avu)));
        let matches_access = access_conditions.is_empty()
            || entry
                .acl
                .iter()
                .any(|ace| access_matches(&access_conditions, ace));
        if !(matches_entity && matches_avus && matches_access) {
            continue;
        }

        let mut emit = |row: Vec<String>| {
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        };

        if selects_avus {
            let first_group = avu_groups.first();
            for avu in &entry.avus {
                if first_group.map_or(true, |group| avu_matches(group, avu)) {
                    emit(select_row(&inp.select, path, entry, Some(avu), None));
                }
            }
        } else if selects_access {
            for ace in &entry.acl {
                if access_matches(&access_conditions, ace) {
                    emit(select_row(&inp.select, path, entry, None, Some(ace)));
                }
            }
        } else {
            emit(select_row(&inp.select, path, entry, None, None));
        }
    }

    Ok(rows)
}

fn target_kind(inp: &GenQueryInp) -> RpcResult<EntityKind> {
    let mut data = false;
    let mut collection = false;
    let columns = inp
        .select
        .iter()
        .chain(inp.conditions.iter().map(|c| &c.column));
    for column in columns {
        match column.scope() {
            ColumnScope::DataObject => data = true,
            ColumnScope::Collection => collection = true,
            ColumnScope::Either => {}
        }
    }
    match (data, collection) {
        (true, true) => Err(RpcError::new(status::CAT_INVALID_ARGUMENT)),
        (true, false) => Ok(EntityKind::DataObject),
        _ => Ok(EntityKind::Collection),
    }
}

fn avu_matches(group: &[&Condition], avu: &Avu) -> bool {
    group
        .iter()
        .all(|c| c.matches(avu_value(c.column, avu).unwrap_or("")))
}

fn access_matches(conditions: &[&Condition], ace: &AccessControlEntry) -> bool {
    conditions
        .iter()
        .all(|c| c.matches(&access_value(c.column, ace).unwrap_or_default()))
}

fn entity_value(column: Column, path: &str, entry: &CatalogEntry) -> String {
    match column {
        Column::CollName => match entry.kind {
            EntityKind::Collection => path.to_string(),
            EntityKind::DataObject => split_path(path).0.to_string(),
        },
        Column::CollParentName => split_path(path).0.to_string(),
        Column::DataName => split_path(path).1.to_string(),
        Column::DataSize => entry.content.len().to_string(),
        Column::DataChecksum => entry.checksum.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

fn avu_value(column: Column, avu: &Avu) -> Option<&str> {
    match column {
        Column::MetaCollAttrName | Column::MetaDataAttrName => Some(&avu.attribute),
        Column::MetaCollAttrValue | Column::MetaDataAttrValue => Some(&avu.value),
        Column::MetaCollAttrUnits | Column::MetaDataAttrUnits => Some(&avu.unit),
        _ => None,
    }
}

fn access_value(column: Column, ace: &AccessControlEntry) -> Option<String> {
    match column {
        Column::CollAccessUserName | Column::DataAccessUserName => Some(ace.owner.clone()),
        Column::CollAccessUserZone | Column::DataAccessUserZone => {
            Some(ace.zone.clone().unwrap_or_default())
        }
        Column::CollAccessName | Column::DataAccessName => Some(access_name(ace.level).to_string()),
        _ => None,
    }
}

/// The server's long names for access levels.
fn access_name(level: AccessLevel) -> &'static str {
    match level {
        AccessLevel::Null => "null",
        AccessLevel::Read => "read object",
        AccessLevel::Write => "modify object",
        AccessLevel::Own => "own",
    }
}

fn select_row(
    select: &[Column],
    path: &str,
    entry: &CatalogEntry,
    avu: Option<&Avu>,
    ace: Option<&AccessControlEntry>,
) -> Vec<String> {
    select
        .iter()
        .map(|column| {
            if column.is_metadata() {
                avu.and_then(|a| avu_value(*column, a))
                    .unwrap_or_default()
                    .to_string()
            } else if column.is_access() {
                ace.and_then(|a| access_value(*column, a)).unwrap_or_default()
            } else {
                entity_value(*column, path, entry)
            }
        })
        .collect()
}
