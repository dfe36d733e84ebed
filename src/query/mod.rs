//! Campus Insight Query Engine
//!
//! Validates and runs structured JSON queries against one dataset:
//!
//! - **AST**: Validated query tree types
//! - **Validator**: JSON tree → `Query`, checked against a field schema
//! - **Filter**: WHERE evaluation over records
//! - **Transform**: GROUP / APPLY
//! - **Executor**: Projection, ordering, result cap
//!
//! # Query Language
//!
//! ```text
//! Query      := { WHERE: Filter, OPTIONS: Options, TRANSFORMATIONS?: Transform }
//! Options    := { COLUMNS: [Key], ORDER?: Key | { dir: "UP"|"DOWN", keys: [Key] } }
//! Transform  := { GROUP: [Key], APPLY: [{ name: { Token: Key } }] }
//! Token      := "MAX" | "MIN" | "AVG" | "SUM" | "COUNT"
//! Filter     := {} | { NOT: Filter } | { AND: [Filter,...] } | { OR: [Filter,...] }
//!             | { LT|GT|EQ: {Key: number} } | { IS: {Key: string} }
//! Key        := "<datasetId>_<field>" | "<applyName>"
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_insight::query::QueryExecutor;
//!
//! let executor = QueryExecutor::new(store, 5000);
//! let result = executor.perform_query(&serde_json::json!({
//!     "WHERE": { "GT": { "sections_avg": 97 } },
//!     "OPTIONS": { "COLUMNS": ["sections_dept", "sections_avg"], "ORDER": "sections_avg" }
//! })).await?;
//! ```

mod ast;
mod error;
mod executor;
mod filter;
mod transform;
mod validator;

pub use ast::{
    ApplyRule, ApplyToken, Column, Comparator, Direction, FieldKey, Filter, Order, Query,
    Transformations, WildcardPattern,
};
pub use error::{QueryError, QueryResult};
pub use executor::{execute, sort_rows, QueryExecutor, QueryOutput, ResultRow, DEFAULT_MAX_RESULTS};
pub use filter::FilterEvaluator;
pub use transform::{aggregate, apply, group, round, Group, AGGREGATE_SCALE};
pub use validator::{dataset_id, validate};
