//! General and specific query requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Page size used when a request does not set one.
pub const DEFAULT_MAX_ROWS: usize = 256;

/// Which kind of entity a column belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnScope {
    /// Usable when querying either kind (the collection name).
    Either,
    Collection,
    DataObject,
}

/// Catalog columns that may be selected or constrained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    CollName,
    CollParentName,
    DataName,
    DataSize,
    DataChecksum,
    MetaCollAttrName,
    MetaCollAttrValue,
    MetaCollAttrUnits,
    MetaDataAttrName,
    MetaDataAttrValue,
    MetaDataAttrUnits,
    CollAccessUserName,
    CollAccessUserZone,
    CollAccessName,
    DataAccessUserName,
    DataAccessUserZone,
    DataAccessName,
}

impl Column {
    pub fn scope(&self) -> ColumnScope {
        use Column::*;
        match self {
            CollName => ColumnScope::Either,
            CollParentName | MetaCollAttrName | MetaCollAttrValue | MetaCollAttrUnits
            | CollAccessUserName | CollAccessUserZone | CollAccessName => ColumnScope::Collection,
            DataName | DataSize | DataChecksum | MetaDataAttrName | MetaDataAttrValue
            | MetaDataAttrUnits | DataAccessUserName | DataAccessUserZone | DataAccessName => {
                ColumnScope::DataObject
            }
        }
    }

    pub fn is_metadata(&self) -> bool {
        use Column::*;
        matches!(
            self,
            MetaCollAttrName
                | MetaCollAttrValue
                | MetaCollAttrUnits
                | MetaDataAttrName
                | MetaDataAttrValue
                | MetaDataAttrUnits
        )
    }

    pub fn is_access(&self) -> bool {
        use Column::*;
        matches!(
            self,
            CollAccessUserName
                | CollAccessUserZone
                | CollAccessName
                | DataAccessUserName
                | DataAccessUserZone
                | DataAccessName
        )
    }
}

/// Comparison applied by a query condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Equals,
    NotEquals,
    Like,
    NotLike,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    NumLessThan,
    NumGreaterThan,
    NumLessOrEqual,
    NumGreaterOrEqual,
    In,
}

impl QueryOperator {
    pub fn as_str(&self) -> &'static str {
        use QueryOperator::*;
        match self {
            Equals => "=",
            NotEquals => "!=",
            Like => "like",
            NotLike => "not like",
            LessThan => "<",
            GreaterThan => ">",
            LessOrEqual => "<=",
            GreaterOrEqual => ">=",
            NumLessThan => "n<",
            NumGreaterThan => "n>",
            NumLessOrEqual => "n<=",
            NumGreaterOrEqual => "n>=",
            In => "in",
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use QueryOperator::*;
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Equals,
            "!=" | "<>" => NotEquals,
            "like" => Like,
            "not like" => NotLike,
            "<" => LessThan,
            ">" => GreaterThan,
            "<=" => LessOrEqual,
            ">=" => GreaterOrEqual,
            "n<" => NumLessThan,
            "n>" => NumGreaterThan,
            "n<=" => NumLessOrEqual,
            "n>=" => NumGreaterOrEqual,
            "in" => In,
            other => return Err(format!("unknown query operator '{other}'")),
        };
        Ok(op)
    }
}

/// One `column op value` constraint.
///
/// `values` holds exactly one element except for [`QueryOperator::In`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub column: Column,
    pub operator: QueryOperator,
    pub values: Vec<String>,
}

impl Condition {
    pub fn new(column: Column, operator: QueryOperator, value: impl Into<String>) -> Self {
        Self {
            column,
            operator,
            values: vec![value.into()],
        }
    }

    pub fn equals(column: Column, value: impl Into<String>) -> Self {
        Self::new(column, QueryOperator::Equals, value)
    }

    pub fn one_of(column: Column, values: Vec<String>) -> Self {
        Self {
            column,
            operator: QueryOperator::In,
            values,
        }
    }

    /// Whether `actual` satisfies this condition.
    pub fn matches(&self, actual: &str) -> bool {
        use QueryOperator::*;
        let value = self.values.first().map(String::as_str).unwrap_or("");
        match self.operator {
            Equals => actual == value,
            NotEquals => actual != value,
            Like => like_match(actual, value),
            NotLike => !like_match(actual, value),
            LessThan => actual < value,
            GreaterThan => actual > value,
            LessOrEqual => actual <= value,
            GreaterOrEqual => actual >= value,
            NumLessThan => numeric(actual, value, |a, b| a < b),
            NumGreaterThan => numeric(actual, value, |a, b| a > b),
            NumLessOrEqual => numeric(actual, value, |a, b| a <= b),
            NumGreaterOrEqual => numeric(actual, value, |a, b| a >= b),
            In => self.values.iter().any(|v| v == actual),
        }
    }
}

fn numeric(actual: &str, value: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.trim().parse::<f64>(), value.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => cmp(a, b),
        _ => false,
    }
}

/// SQL `LIKE` matching: `%` matches any run, `_` matches one character.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen = seen || dp[j];
                    next[j] = seen;
                }
            }
            '_' => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1];
                }
            }
            c => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && text[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}

/// A general query: selected columns, constraints and a page window.
///
/// Metadata conditions are grouped: each attribute-name condition opens a new
/// group, and following value/unit conditions join it. An entity matches when
/// every group is satisfied by one of its AVUs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenQueryInp {
    pub select: Vec<Column>,
    pub conditions: Vec<Condition>,
    pub max_rows: usize,
    pub continue_index: usize,
    pub zone: Option<String>,
}

impl GenQueryInp {
    pub fn new(select: Vec<Column>) -> Self {
        Self {
            select,
            conditions: Vec::new(),
            max_rows: DEFAULT_MAX_ROWS,
            continue_index: 0,
            zone: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_zone(mut self, zone: Option<&str>) -> Self {
        self.zone = zone.map(str::to_string);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }
}

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenQueryOut {
    pub rows: Vec<Vec<String>>,
    /// Where the next page starts, if there is one.
    pub continue_index: Option<usize>,
}

/// A pre-registered SQL query with bind arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificQueryInp {
    pub sql: String,
    pub args: Vec<String>,
    pub max_rows: usize,
    pub continue_index: usize,
    pub zone: Option<String>,
}

impl SpecificQueryInp {
    pub fn new(sql: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            args,
            max_rows: DEFAULT_MAX_ROWS,
            continue_index: 0,
            zone: None,
        }
    }
}
