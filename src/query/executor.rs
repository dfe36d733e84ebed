//! Query Executor
//!
//! Runs a JSON query tree against the dataset store:
//! 1. Validate the whole tree against the union of all field schemas
//! 2. Load the dataset and re-validate against its own schema
//! 3. Filter records with the WHERE tree
//! 4. Group and aggregate when TRANSFORMATIONS is present
//! 5. Enforce the result cap, project COLUMNS, apply ORDER
//!
//! # Execution Pipeline
//!
//! ```text
//! JSON → Validate → Load Snapshot → Validate (kind) → Filter → [Group → Cap → Aggregate | Cap] → Project → Order
//! ```

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::query::ast::{Column, Direction, Order, Query};
use crate::query::error::{QueryError, QueryResult};
use crate::query::filter::FilterEvaluator;
use crate::query::{transform, validator};
use crate::storage::{DatasetStore, FieldLookup, Schema, Value};

/// Default cap on filtered records or groups
pub const DEFAULT_MAX_RESULTS: usize = 5000;

/// Result of a query execution
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryOutput {
    /// Column names, in COLUMNS order
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<ResultRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
    /// Number of records in the queried dataset
    pub records_scanned: usize,
}

impl QueryOutput {
    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A single result row: column name to value, in column order.
///
/// Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    values: Vec<(String, Value)>,
}

impl ResultRow {
    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Set `column`, replacing any previous value
    pub fn insert(&mut self, column: &str, value: Value) {
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
    }

    /// Column names, in insertion order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A new row holding only `columns`, in that order
    fn project(&self, columns: &[Column]) -> QueryResult<ResultRow> {
        let mut row = ResultRow::default();
        for column in columns {
            let value = self.get(column.name()).ok_or_else(|| {
                QueryError::Internal(format!("group row has no column {}", column.name()))
            })?;
            row.insert(column.name(), value.clone());
        }
        Ok(row)
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Query executor
pub struct QueryExecutor {
    /// Dataset snapshots
    store: Arc<DatasetStore>,
    /// Largest accepted filtered-record or group count
    max_results: usize,
}

impl QueryExecutor {
    /// Create a new query executor
    pub fn new(store: Arc<DatasetStore>, max_results: usize) -> Self {
        Self { store, max_results }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Validate and run a JSON query tree
    pub async fn perform_query(&self, tree: &serde_json::Value) -> QueryResult<QueryOutput> {
        let start = Instant::now();

        // 1. Validate the shape against every known field, before any I/O
        let query = validator::validate(tree, &Schema::any())?;

        // 2. Load the snapshot and re-check fields against its kind
        let dataset = self
            .store
            .get(&query.dataset_id)
            .await?
            .ok_or_else(|| QueryError::DatasetNotFound(query.dataset_id.clone()))?;
        let query = validator::validate(tree, &dataset.kind().schema())?;

        // 3-5. Run against the snapshot
        let mut output = execute(&query, dataset.records(), self.max_results)?;
        output.execution_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            dataset = %query.dataset_id,
            rows = output.rows.len(),
            elapsed_ms = output.execution_time_ms,
            "Query executed"
        );

        Ok(output)
    }
}

/// Run a validated query over `records`
pub fn execute<R: FieldLookup>(
    query: &Query,
    records: &[R],
    max_results: usize,
) -> QueryResult<QueryOutput> {
    let matched = FilterEvaluator::new(records).evaluate(&query.filter)?;
    tracing::debug!(matched = matched.len(), total = records.len(), "Filter applied");

    let mut rows = match &query.transformations {
        Some(transformations) => {
            let groups = transform::group(&matched, &transformations.group)?;
            check_cap(groups.len(), max_results)?;
            tracing::debug!(groups = groups.len(), "Records grouped");

            transform::aggregate(&groups, transformations)?
                .iter()
                .map(|row| row.project(&query.columns))
                .collect::<QueryResult<Vec<_>>>()?
        }
        None => {
            check_cap(matched.len(), max_results)?;
            matched
                .iter()
                .map(|record| project_record(*record, &query.columns))
                .collect::<QueryResult<Vec<_>>>()?
        }
    };

    if let Some(order) = &query.order {
        sort_rows(&mut rows, order);
    }

    Ok(QueryOutput {
        columns: query.column_names(),
        rows,
        execution_time_ms: 0,
        records_scanned: records.len(),
    })
}

/// Stable sort by the ORDER keys, first key primary
pub fn sort_rows(rows: &mut [ResultRow], order: &Order) {
    let direction = order.direction();
    let keys = order.keys();

    rows.sort_by(|a, b| {
        for key in keys {
            let ordering = match (a.get(key), b.get(key)) {
                (Some(x), Some(y)) => x.order_cmp(y),
                _ => Ordering::Equal,
            };
            let ordering = match direction {
                Direction::Up => ordering,
                Direction::Down => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn check_cap(rows: usize, limit: usize) -> QueryResult<()> {
    if rows > limit {
        return Err(QueryError::ResultTooLarge { rows, limit });
    }
    Ok(())
}

fn project_record<R: FieldLookup>(record: &R, columns: &[Column]) -> QueryResult<ResultRow> {
    let mut row = ResultRow::default();
    for column in columns {
        let value = match column {
            Column::Field(key) => record.field(key.field()).map(|v| v.to_value()),
            Column::Apply(_) => None,
        }
        .ok_or_else(|| {
            QueryError::Internal(format!("record has no field for column {}", column.name()))
        })?;
        row.insert(column.name(), value);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dataset::fixtures;
    use crate::storage::{RecordSet, Section};
    use serde_json::json;
    use tempfile::tempdir;

    async fn create_test_executor() -> (QueryExecutor, Arc<DatasetStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(DatasetStore::open(dir.path()).await.unwrap());
        store
            .add("sections", RecordSet::Sections(fixtures::sections()))
            .await
            .unwrap();
        store
            .add("rooms", RecordSet::Rooms(fixtures::rooms()))
            .await
            .unwrap();
        let executor = QueryExecutor::new(Arc::clone(&store), DEFAULT_MAX_RESULTS);
        (executor, store, dir)
    }

    fn column<'a>(output: &'a QueryOutput, name: &str) -> Vec<&'a Value> {
        output.rows.iter().map(|r| r.get(name).unwrap()).collect()
    }

    fn numbers(output: &QueryOutput, name: &str) -> Vec<f64> {
        column(output, name).iter().map(|v| v.as_f64().unwrap()).collect()
    }

    fn texts<'a>(output: &'a QueryOutput, name: &str) -> Vec<&'a str> {
        column(output, name).iter().map(|v| v.as_str().unwrap()).collect()
    }

    fn generated(n: usize) -> Vec<Section> {
        (0..n)
            .map(|i| {
                let dept = if i % 2 == 0 { "even" } else { "odd" };
                fixtures::section(&i.to_string(), dept, "100", "t", "i", 2015.0, 80.0, 10.0)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_filter_and_project() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": { "GT": { "sections_avg": 97 } },
                "OPTIONS": { "COLUMNS": ["sections_dept", "sections_avg"] }
            }))
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["sections_dept", "sections_avg"]);
        assert_eq!(result.records_scanned, 8);
        assert_eq!(texts(&result, "sections_dept"), vec!["cpsc", "cpsc", "cpsc", "epse", "cpsc"]);
        assert_eq!(numbers(&result, "sections_avg"), vec![97.5, 98.0, 98.0, 99.0, 98.0]);
        assert!(result.rows.iter().all(|r| r.len() == 2));
    }

    #[tokio::test]
    async fn test_group_average_per_dept() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["sections_dept", "avgAvg"] },
                "TRANSFORMATIONS": {
                    "GROUP": ["sections_dept"],
                    "APPLY": [ { "avgAvg": { "AVG": "sections_avg" } } ]
                }
            }))
            .await
            .unwrap();

        assert_eq!(texts(&result, "sections_dept"), vec!["cpsc", "math", "epse"]);
        assert_eq!(numbers(&result, "avgAvg"), vec![95.3, 84.63, 99.0]);
    }

    #[tokio::test]
    async fn test_order_down_with_tiebreak() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": { "GT": { "sections_avg": 90 } },
                "OPTIONS": {
                    "COLUMNS": ["sections_dept", "sections_avg", "sections_uuid"],
                    "ORDER": { "dir": "DOWN", "keys": ["sections_avg", "sections_dept"] }
                }
            }))
            .await
            .unwrap();

        assert_eq!(numbers(&result, "sections_avg"), vec![99.0, 98.0, 98.0, 98.0, 97.5, 97.0]);
        assert_eq!(texts(&result, "sections_dept"), vec!["epse", "cpsc", "cpsc", "cpsc", "cpsc", "math"]);
        // Full ties keep filter order
        assert_eq!(texts(&result, "sections_uuid"), vec!["7", "3", "6", "3", "1", "5"]);
    }

    #[tokio::test]
    async fn test_order_secondary_key_descending() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": {
                    "COLUMNS": ["sections_year", "sections_dept", "sections_uuid"],
                    "ORDER": { "dir": "DOWN", "keys": ["sections_year", "sections_dept"] }
                }
            }))
            .await
            .unwrap();

        assert_eq!(texts(&result, "sections_uuid"), vec!["5", "6", "4", "7", "1", "3", "2", "3"]);
    }

    #[tokio::test]
    async fn test_order_single_key_ascending() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["sections_uuid", "sections_avg"], "ORDER": "sections_avg" }
            }))
            .await
            .unwrap();

        assert_eq!(texts(&result, "sections_uuid"), vec!["4", "2", "5", "1", "3", "6", "3", "7"]);
    }

    #[tokio::test]
    async fn test_order_by_string_and_aggregate() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": {
                    "COLUMNS": ["rooms_type", "totalSeats", "rooms"],
                    "ORDER": { "dir": "UP", "keys": ["totalSeats"] }
                },
                "TRANSFORMATIONS": {
                    "GROUP": ["rooms_type"],
                    "APPLY": [
                        { "totalSeats": { "SUM": "rooms_seats" } },
                        { "rooms": { "COUNT": "rooms_name" } }
                    ]
                }
            }))
            .await
            .unwrap();

        assert_eq!(texts(&result, "rooms_type"), vec!["Small Group", "Tiered Large Group"]);
        assert_eq!(numbers(&result, "totalSeats"), vec![40.0, 380.0]);
        assert_eq!(numbers(&result, "rooms"), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_group_columns_subset() {
        let (executor, _store, _dir) = create_test_executor().await;

        // GROUP has two keys, COLUMNS selects one
        let result = executor
            .perform_query(&json!({
                "WHERE": { "IS": { "sections_dept": "cpsc" } },
                "OPTIONS": { "COLUMNS": ["maxPass"] },
                "TRANSFORMATIONS": {
                    "GROUP": ["sections_dept", "sections_id"],
                    "APPLY": [ { "maxPass": { "MAX": "sections_pass" } } ]
                }
            }))
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["maxPass"]);
        assert_eq!(numbers(&result, "maxPass"), vec![45.0, 200.0]);
        assert!(result.rows.iter().all(|r| r.len() == 1));
    }

    #[tokio::test]
    async fn test_no_matches() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": { "LT": { "rooms_seats": 0 } },
                "OPTIONS": { "COLUMNS": ["rooms_name"] }
            }))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_dataset_not_found() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["missing_avg"] }
            }))
            .await;
        assert!(matches!(result, Err(QueryError::DatasetNotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_validation_precedes_not_found() {
        let (executor, _store, _dir) = create_test_executor().await;

        let result = executor
            .perform_query(&json!({
                "WHERE": { "IS": { "missing_dept": "a*b" } },
                "OPTIONS": { "COLUMNS": ["missing_avg"] }
            }))
            .await;
        assert!(matches!(result, Err(QueryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_validation_precedes_dataset_load() {
        let (executor, store, dir) = create_test_executor().await;
        std::fs::write(dir.path().join("datasets").join("bad.json"), "corrupt").unwrap();
        let loaded = store.loaded_count().await;

        // Malformed query never reads the file
        let result = executor
            .perform_query(&json!({
                "WHERE": { "IS": { "bad_dept": "a*b" } },
                "OPTIONS": { "COLUMNS": ["bad_dept"] }
            }))
            .await;
        assert!(matches!(result, Err(QueryError::Validation(_))));
        assert_eq!(store.loaded_count().await, loaded);

        // A well-formed query surfaces the broken file as a storage error
        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["bad_dept"] }
            }))
            .await;
        assert!(matches!(result, Err(QueryError::Storage(_))));
    }

    #[tokio::test]
    async fn test_schema_follows_dataset_kind() {
        let (executor, _store, _dir) = create_test_executor().await;

        // Section field on a rooms dataset
        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["rooms_avg"] }
            }))
            .await;
        assert!(matches!(result, Err(QueryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_result_too_large_via_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DatasetStore::open(dir.path()).await.unwrap());
        store
            .add("big", RecordSet::Sections(generated(5001)))
            .await
            .unwrap();
        let executor = QueryExecutor::new(Arc::clone(&store), DEFAULT_MAX_RESULTS);

        let result = executor
            .perform_query(&json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["big_uuid"], "ORDER": "big_uuid" }
            }))
            .await;
        assert!(matches!(
            result,
            Err(QueryError::ResultTooLarge { rows: 5001, limit: 5000 })
        ));

        // Narrowed below the cap
        let result = executor
            .perform_query(&json!({
                "WHERE": { "IS": { "big_dept": "odd" } },
                "OPTIONS": { "COLUMNS": ["big_uuid"] }
            }))
            .await
            .unwrap();
        assert_eq!(result.len(), 2500);
    }

    #[test]
    fn test_cap_boundary() {
        let schema = crate::storage::DatasetKind::Sections.schema();
        let query = validator::validate(
            &json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": ["s_uuid"] } }),
            &schema,
        )
        .unwrap();

        let exact = generated(5000);
        assert_eq!(execute(&query, &exact, 5000).unwrap().len(), 5000);

        let over = generated(5001);
        assert!(matches!(
            execute(&query, &over, 5000),
            Err(QueryError::ResultTooLarge { .. })
        ));
    }

    #[test]
    fn test_cap_counts_groups() {
        let schema = crate::storage::DatasetKind::Sections.schema();
        let query = validator::validate(
            &json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["s_dept", "n"] },
                "TRANSFORMATIONS": {
                    "GROUP": ["s_dept"],
                    "APPLY": [ { "n": { "COUNT": "s_uuid" } } ]
                }
            }),
            &schema,
        )
        .unwrap();

        let result = execute(&query, &generated(5001), 5000).unwrap();
        assert_eq!(texts(&result, "s_dept"), vec!["even", "odd"]);
        assert_eq!(numbers(&result, "n"), vec![2501.0, 2500.0]);

        // One group per record
        let query = validator::validate(
            &json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": ["s_uuid"] },
                "TRANSFORMATIONS": { "GROUP": ["s_uuid"], "APPLY": [] }
            }),
            &schema,
        )
        .unwrap();
        assert!(matches!(
            execute(&query, &generated(5001), 5000),
            Err(QueryError::ResultTooLarge { rows: 5001, .. })
        ));
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let mut row = ResultRow::default();
        row.insert("z", Value::from("last"));
        row.insert("a", Value::Number(1.5));
        row.insert("z", Value::from("replaced"));

        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"z":"replaced","a":1.5}"#);
    }
}
