//! Metadata search, specific queries and listings.
//!
//! Every query is paged: pages are requested with the server's continuation
//! index until it reports no more, and concatenated. A query matching nothing
//! yields an empty result rather than an error.

use serde_json::{json, Map, Value};
use tracing::debug;

use baton_rpc::{
    status, Column, Condition, Connection, GenQueryInp, QueryOperator, SpecificQueryInp,
};
use baton_types::{AccessLevel, Avu, EntityKind, ListOptions, RemotePath};

use crate::error::{fail, logged, BatonError, BatonResult};
use crate::json::{
    entity_json, optional_str, optional_str_array, path_json, required_str, ACCESS_KEY, AVUS_KEY,
    CHECKSUM_KEY, CONTENTS_KEY, SIZE_KEY,
};
use crate::resolve::require_kind;

/// Run a general query to completion.
pub(crate) fn run_gen_query<C: Connection + ?Sized>(
    conn: &mut C,
    mut inp: GenQueryInp,
) -> BatonResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    loop {
        match conn.gen_query(&inp) {
            Ok(page) => {
                debug!(rows = page.rows.len(), start = inp.continue_index, "query page");
                rows.extend(page.rows);
                match page.continue_index {
                    Some(next) if next > inp.continue_index => inp.continue_index = next,
                    _ => break,
                }
            }
            Err(err) if err.is(status::CAT_NO_ROWS_FOUND) => break,
            Err(err) => {
                return Err(logged(BatonError::rpc("Failed to execute general query", err)))
            }
        }
    }
    Ok(rows)
}

/// Run a specific query to completion.
pub(crate) fn run_specific_query<C: Connection + ?Sized>(
    conn: &mut C,
    mut inp: SpecificQueryInp,
) -> BatonResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    loop {
        match conn.specific_query(&inp) {
            Ok(page) => {
                rows.extend(page.rows);
                match page.continue_index {
                    Some(next) if next > inp.continue_index => inp.continue_index = next,
                    _ => break,
                }
            }
            Err(err) if err.is(status::CAT_NO_ROWS_FOUND) => break,
            Err(err) => {
                return Err(logged(BatonError::rpc(
                    format!("Failed to execute specific query '{}'", inp.sql),
                    err,
                )))
            }
        }
    }
    Ok(rows)
}

/// Conditions selecting the entity at `path`.
fn entity_conditions(kind: EntityKind, path: &str) -> Vec<Condition> {
    match kind {
        EntityKind::Collection => vec![Condition::equals(Column::CollName, path)],
        EntityKind::DataObject => {
            let (collection, name) = baton_types::split_path(path);
            vec![
                Condition::equals(Column::CollName, collection),
                Condition::equals(Column::DataName, name),
            ]
        }
    }
}

fn avu_columns(kind: EntityKind) -> [Column; 3] {
    match kind {
        EntityKind::Collection => [
            Column::MetaCollAttrName,
            Column::MetaCollAttrValue,
            Column::MetaCollAttrUnits,
        ],
        EntityKind::DataObject => [
            Column::MetaDataAttrName,
            Column::MetaDataAttrValue,
            Column::MetaDataAttrUnits,
        ],
    }
}

/// AVUs on `path`, optionally only those with attribute `attribute`.
pub(crate) fn fetch_avus<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    attribute: Option<&str>,
) -> BatonResult<Vec<Avu>> {
    let kind = require_kind(path)?;
    let columns = avu_columns(kind);
    let mut inp = GenQueryInp::new(columns.to_vec());
    inp.conditions = entity_conditions(kind, path.resolved());
    if let Some(attribute) = attribute {
        inp = inp.with_condition(Condition::equals(columns[0], attribute));
    }

    let rows = run_gen_query(conn, inp)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.as_slice() {
            [attribute, value, unit] => Some(Avu::with_unit(attribute, value, unit)),
            _ => None,
        })
        .collect())
}

/// The AVUs of `path` as a JSON array, filtered by attribute on the server.
pub fn list_metadata<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    attribute: Option<&str>,
) -> BatonResult<Value> {
    let avus = fetch_avus(conn, path, attribute)?;
    Ok(Value::Array(avus.iter().map(Avu::to_json).collect()))
}

/// ACL entries on `path` as `{owner, zone, level}` objects.
pub(crate) fn fetch_access<C: Connection + ?Sized>(
    conn: &mut C,
    kind: EntityKind,
    path: &str,
) -> BatonResult<Vec<Value>> {
    let select = match kind {
        EntityKind::Collection => vec![
            Column::CollAccessUserName,
            Column::CollAccessUserZone,
            Column::CollAccessName,
        ],
        EntityKind::DataObject => vec![
            Column::DataAccessUserName,
            Column::DataAccessUserZone,
            Column::DataAccessName,
        ],
    };
    let mut inp = GenQueryInp::new(select);
    inp.conditions = entity_conditions(kind, path);

    let rows = run_gen_query(conn, inp)?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        if let [owner, zone, level] = row.as_slice() {
            let level = level
                .parse::<AccessLevel>()
                .map(|l| l.as_str().to_string())
                .unwrap_or_else(|_| level.clone());
            entries.push(json!({"owner": owner, "zone": zone, "level": level}));
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Metadata search
// ---------------------------------------------------------------------------

/// One `{attribute, value, o?}` clause of a metadata search.
#[derive(Clone, Debug, PartialEq, Eq)]
struct SearchClause {
    attribute: String,
    values: Vec<String>,
    unit: Option<String>,
    operator: QueryOperator,
}

impl SearchClause {
    fn from_json(json: &Value) -> BatonResult<Self> {
        let attribute = required_str(json, "attribute")?.to_string();
        let operator = match optional_str(json, "o")?.or(optional_str(json, "operator")?) {
            Some(op) => op
                .parse::<QueryOperator>()
                .map_err(|e| logged(BatonError::InvalidJson(e)))?,
            None => QueryOperator::Equals,
        };
        let values = match (json.get("value"), operator) {
            (Some(Value::String(v)), _) => vec![v.clone()],
            (Some(Value::Array(_)), QueryOperator::In) => {
                optional_str_array(json, "value")?.unwrap_or_default()
            }
            (Some(other), _) => {
                return fail(BatonError::InvalidJson(format!("value is not a string: {other}")))
            }
            (None, _) => return fail(BatonError::InvalidJson(format!("missing value in {json}"))),
        };
        let unit = optional_str(json, "unit")?
            .or(optional_str(json, "units")?)
            .map(str::to_string);
        Ok(Self {
            attribute,
            values,
            unit,
            operator,
        })
    }

    fn conditions(&self, kind: EntityKind) -> Vec<Condition> {
        let [name, value, units] = avu_columns(kind);
        let mut conditions = vec![
            Condition::equals(name, self.attribute.clone()),
            Condition {
                column: value,
                operator: self.operator,
                values: self.values.clone(),
            },
        ];
        if let Some(unit) = &self.unit {
            conditions.push(Condition::equals(units, unit.clone()));
        }
        conditions
    }
}

fn parse_search(query: &Value) -> BatonResult<(Vec<SearchClause>, Option<String>)> {
    if !query.is_object() {
        return fail(BatonError::InvalidJson(format!("query is not a JSON object: {query}")));
    }
    let clauses = match query.get(AVUS_KEY) {
        Some(Value::Array(avus)) => avus
            .iter()
            .map(SearchClause::from_json)
            .collect::<BatonResult<Vec<_>>>()?,
        Some(other) => {
            return fail(BatonError::InvalidJson(format!("avus is not an array: {other}")))
        }
        None if query.get("attribute").is_some() => vec![SearchClause::from_json(query)?],
        None => Vec::new(),
    };
    if clauses.is_empty() {
        return fail(BatonError::InvalidJson(format!(
            "query has no AVU clauses: {query}"
        )));
    }
    let collection = optional_str(query, "collection")?.map(|c| c.trim_end_matches('/').to_string());
    Ok((clauses, collection))
}

/// Find collections and data objects whose AVUs satisfy every clause of
/// `query`.
///
/// Accepts `{avus: [{attribute, value, o?}, ...], collection?}` or a single
/// top-level clause. `collection` restricts results to that subtree.
pub fn search_metadata<C: Connection + ?Sized>(
    conn: &mut C,
    query: &Value,
    zone: Option<&str>,
    options: &ListOptions,
) -> BatonResult<Value> {
    let (clauses, collection) = parse_search(query)?;
    let mut results = Vec::new();

    for kind in [EntityKind::Collection, EntityKind::DataObject] {
        let select = match kind {
            EntityKind::Collection => vec![Column::CollName],
            EntityKind::DataObject => vec![Column::CollName, Column::DataName],
        };
        let mut inp = GenQueryInp::new(select).with_zone(zone);
        for clause in &clauses {
            inp.conditions.extend(clause.conditions(kind));
        }
        if let Some(collection) = &collection {
            inp = inp.with_condition(Condition::new(
                Column::CollName,
                QueryOperator::Like,
                format!("{collection}%"),
            ));
        }

        debug!(%kind, clauses = clauses.len(), "searching metadata");
        for row in run_gen_query(conn, inp)? {
            let path = match (kind, row.as_slice()) {
                (EntityKind::Collection, [coll]) => coll.clone(),
                (EntityKind::DataObject, [coll, name]) => baton_types::join_path(coll, name),
                _ => continue,
            };
            let mut item = entity_json(kind, &path);
            decorate(conn, &mut item, kind, &path, options)?;
            results.push(item);
        }
    }
    Ok(Value::Array(results))
}

// ---------------------------------------------------------------------------
// Specific queries
// ---------------------------------------------------------------------------

/// Run a registered SQL query: `{sql, args?, labels?}`, optionally wrapped as
/// `{specific: {...}}`.
///
/// With `labels` each row becomes an object keyed by label; without, each row
/// is an array of strings.
pub fn search_specific<C: Connection + ?Sized>(
    conn: &mut C,
    query: &Value,
    zone: Option<&str>,
) -> BatonResult<Value> {
    let body = query.get("specific").unwrap_or(query);
    if !body.is_object() {
        return fail(BatonError::InvalidJson(format!(
            "specific query is not a JSON object: {body}"
        )));
    }
    let sql = required_str(body, "sql")?;
    let args = optional_str_array(body, "args")?.unwrap_or_default();
    let labels = optional_str_array(body, "labels")?;

    let mut inp = SpecificQueryInp::new(sql, args);
    inp.zone = zone.map(str::to_string);
    debug!(sql, "running specific query");
    let rows = run_specific_query(conn, inp)?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        match &labels {
            None => results.push(json!(row)),
            Some(labels) => {
                if labels.len() != row.len() {
                    return fail(BatonError::InvalidJson(format!(
                        "{} labels for {} columns in query '{sql}'",
                        labels.len(),
                        row.len()
                    )));
                }
                let obj: Map<String, Value> = labels
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(Value::String))
                    .collect();
                results.push(Value::Object(obj));
            }
        }
    }
    Ok(Value::Array(results))
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Add the members requested by `options` to `item`.
fn decorate<C: Connection + ?Sized>(
    conn: &mut C,
    item: &mut Value,
    kind: EntityKind,
    path: &str,
    options: &ListOptions,
) -> BatonResult<()> {
    if !options.any_decoration() {
        return Ok(());
    }
    let mut extra = Map::new();

    if options.avu {
        let listed = RemotePath::existing(path, path, kind);
        let avus = fetch_avus(conn, &listed, None)?;
        extra.insert(AVUS_KEY.into(), Value::Array(avus.iter().map(Avu::to_json).collect()));
    }
    if options.acl {
        extra.insert(ACCESS_KEY.into(), Value::Array(fetch_access(conn, kind, path)?));
    }
    if kind == EntityKind::DataObject && (options.checksum || options.size) {
        let mut inp = GenQueryInp::new(vec![Column::DataChecksum, Column::DataSize]);
        inp.conditions = entity_conditions(kind, path);
        if let Some([checksum, size]) = run_gen_query(conn, inp)?.first().map(|r| r.as_slice()) {
            if options.checksum {
                let checksum = if checksum.is_empty() {
                    Value::Null
                } else {
                    Value::String(checksum.clone())
                };
                extra.insert(CHECKSUM_KEY.into(), checksum);
            }
            if options.size {
                let size = size.parse::<u64>().map(Value::from).unwrap_or(Value::Null);
                extra.insert(SIZE_KEY.into(), size);
            }
        }
    }

    if let Some(obj) = item.as_object_mut() {
        obj.extend(extra);
    }
    Ok(())
}

/// Describe `path` as JSON, decorated per `options`. A collection listed with
/// `contents` includes its immediate children, each decorated likewise.
pub fn list_path<C: Connection + ?Sized>(
    conn: &mut C,
    path: &RemotePath,
    options: &ListOptions,
) -> BatonResult<Value> {
    let kind = require_kind(path)?;
    let target = path.resolved();
    let mut item = path_json(path);
    decorate(conn, &mut item, kind, target, options)?;

    if kind == EntityKind::Collection && options.contents {
        let child_options = ListOptions {
            contents: false,
            ..*options
        };
        let mut contents = Vec::new();

        let inp = GenQueryInp::new(vec![Column::CollName])
            .with_condition(Condition::equals(Column::CollParentName, target));
        for row in run_gen_query(conn, inp)? {
            if let Some(child) = row.first().filter(|c| c.as_str() != target) {
                let mut entry = entity_json(EntityKind::Collection, child);
                decorate(conn, &mut entry, EntityKind::Collection, child, &child_options)?;
                contents.push(entry);
            }
        }

        let inp = GenQueryInp::new(vec![Column::DataName])
            .with_condition(Condition::equals(Column::CollName, target));
        for row in run_gen_query(conn, inp)? {
            if let Some(name) = row.first() {
                let child = baton_types::join_path(target, name);
                let mut entry = entity_json(EntityKind::DataObject, &child);
                decorate(conn, &mut entry, EntityKind::DataObject, &child, &child_options)?;
                contents.push(entry);
            }
        }

        if let Some(obj) = item.as_object_mut() {
            obj.insert(CONTENTS_KEY.into(), Value::Array(contents));
        }
    }
    Ok(item)
}
