//! Validated Query Tree
//!
//! The JSON query a client submits is checked once by the validator and
//! turned into these types; the filter evaluator, the transformation engine
//! and the executor only ever see a `Query`.
//!
//! # Example Query
//!
//! ```text
//! {
//!   "WHERE": { "AND": [ { "IS": { "sections_dept": "cp*" } },
//!                       { "GT": { "sections_avg": 90 } } ] },
//!   "OPTIONS": {
//!     "COLUMNS": ["sections_dept", "overallAvg"],
//!     "ORDER": { "dir": "DOWN", "keys": ["overallAvg"] }
//!   },
//!   "TRANSFORMATIONS": {
//!     "GROUP": ["sections_dept"],
//!     "APPLY": [ { "overallAvg": { "AVG": "sections_avg" } } ]
//!   }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::query::error::{QueryError, QueryResult};

/// A validated query, bound to a single dataset
#[derive(Debug, Clone)]
pub struct Query {
    /// Dataset every qualified key refers to
    pub dataset_id: String,
    /// WHERE tree
    pub filter: Filter,
    /// Selected columns, in request order
    pub columns: Vec<Column>,
    /// Optional ordering over selected columns
    pub order: Option<Order>,
    /// Optional GROUP + APPLY stage
    pub transformations: Option<Transformations>,
}

impl Query {
    /// Output column names, in request order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }
}

/// A dataset-qualified field reference such as `sections_avg`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    key: String,
    field: String,
}

impl FieldKey {
    pub fn new(dataset_id: &str, field: &str) -> Self {
        Self {
            key: format!("{}{}{}", dataset_id, crate::storage::KEY_SEPARATOR, field),
            field: field.to_string(),
        }
    }

    /// The full key, as written in the query and in result rows
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The unqualified record field name
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// A selectable output column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Raw record field (no transformations) or GROUP key
    Field(FieldKey),
    /// Name introduced by an APPLY rule
    Apply(String),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Field(key) => key.key(),
            Column::Apply(name) => name,
        }
    }
}

/// WHERE tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `{}`: matches every record
    All,
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// `LT`/`GT`/`EQ` on a measure field
    Compare {
        op: Comparator,
        field: FieldKey,
        value: f64,
    },
    /// `IS` on a string field
    Is {
        field: FieldKey,
        pattern: WildcardPattern,
    },
}

/// Numeric comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Gt,
    Eq,
}

impl Comparator {
    /// Apply as `record_value <op> operand`
    pub fn compare(&self, record_value: f64, operand: f64) -> bool {
        match self {
            Comparator::Lt => record_value < operand,
            Comparator::Gt => record_value > operand,
            Comparator::Eq => record_value == operand,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "LT" => Some(Comparator::Lt),
            "GT" => Some(Comparator::Gt),
            "EQ" => Some(Comparator::Eq),
            _ => None,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Lt => write!(f, "LT"),
            Comparator::Gt => write!(f, "GT"),
            Comparator::Eq => write!(f, "EQ"),
        }
    }
}

/// An `IS` pattern: a literal with an optional `*` at either end.
///
/// `*` alone matches every value, including the empty string.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    raw: String,
    regex: Regex,
}

impl WildcardPattern {
    /// Compile `raw`, rejecting `*` anywhere but the first and last position
    pub fn new(raw: &str) -> QueryResult<Self> {
        let (leading, rest) = match raw.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (trailing, literal) = match rest.strip_suffix('*') {
            Some(literal) => (true, literal),
            None => (false, rest),
        };

        if literal.contains('*') {
            return Err(QueryError::validation(format!(
                "wildcard '*' may only appear at the start or end of an IS pattern: {:?}",
                raw
            )));
        }

        let pattern = format!(
            "(?s)^{}{}{}$",
            if leading { ".*" } else { "" },
            regex::escape(literal),
            if trailing { ".*" } else { "" },
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| QueryError::Internal(format!("wildcard pattern {:?}: {}", raw, e)))?;

        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    /// Full-string, case-sensitive match
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for WildcardPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// ORDER clause
#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    /// `"ORDER": "key"`: ascending on one column
    Single(String),
    /// `"ORDER": {"dir": ..., "keys": [...]}`: first key is primary
    Multi { direction: Direction, keys: Vec<String> },
}

impl Order {
    pub fn direction(&self) -> Direction {
        match self {
            Order::Single(_) => Direction::Up,
            Order::Multi { direction, .. } => *direction,
        }
    }

    /// Sort keys in priority order
    pub fn keys(&self) -> &[String] {
        match self {
            Order::Single(key) => std::slice::from_ref(key),
            Order::Multi { keys, .. } => keys,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            other => Err(QueryError::validation(format!(
                "ORDER dir must be UP or DOWN, got {:?}",
                other
            ))),
        }
    }
}

/// GROUP + APPLY stage
#[derive(Debug, Clone, PartialEq)]
pub struct Transformations {
    /// Grouping keys, in request order
    pub group: Vec<FieldKey>,
    /// Aggregates computed per group
    pub apply: Vec<ApplyRule>,
}

impl Transformations {
    /// Whether `name` is a GROUP key or an APPLY name
    pub fn defines(&self, name: &str) -> bool {
        self.group.iter().any(|k| k.key() == name) || self.apply.iter().any(|r| r.name == name)
    }
}

/// One named aggregate: `{ name: { TOKEN: key } }`
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRule {
    pub name: String,
    pub token: ApplyToken,
    pub field: FieldKey,
}

/// Aggregation function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyToken {
    Max,
    Min,
    Avg,
    Sum,
    /// Number of distinct values
    Count,
}

impl ApplyToken {
    /// Whether the target must be a measure field
    pub fn requires_measure(&self) -> bool {
        !matches!(self, ApplyToken::Count)
    }
}

impl FromStr for ApplyToken {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAX" => Ok(ApplyToken::Max),
            "MIN" => Ok(ApplyToken::Min),
            "AVG" => Ok(ApplyToken::Avg),
            "SUM" => Ok(ApplyToken::Sum),
            "COUNT" => Ok(ApplyToken::Count),
            other => Err(QueryError::validation(format!(
                "unknown APPLY token {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ApplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyToken::Max => write!(f, "MAX"),
            ApplyToken::Min => write!(f, "MIN"),
            ApplyToken::Avg => write!(f, "AVG"),
            ApplyToken::Sum => write!(f, "SUM"),
            ApplyToken::Count => write!(f, "COUNT"),
        }
    }
}
