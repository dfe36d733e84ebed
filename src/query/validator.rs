//! Query Validator
//!
//! Checks a JSON query tree against a field schema and turns it into a
//! [`Query`]. Nothing is read from a dataset until validation succeeds.
//!
//! # Validation Order
//!
//! ```text
//! top-level keys → TRANSFORMATIONS → COLUMNS → ORDER → WHERE
//! ```
//!
//! The dataset id every qualified key must use comes from the first GROUP
//! key when TRANSFORMATIONS is present, otherwise from the first column.

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryResult};
use crate::storage::{validate_id, FieldKind, Schema, KEY_SEPARATOR};

const WHERE: &str = "WHERE";
const OPTIONS: &str = "OPTIONS";
const TRANSFORMATIONS: &str = "TRANSFORMATIONS";
const COLUMNS: &str = "COLUMNS";
const ORDER: &str = "ORDER";
const GROUP: &str = "GROUP";
const APPLY: &str = "APPLY";

/// Determine which dataset `tree` queries, without validating the rest
pub fn dataset_id(tree: &Json) -> QueryResult<String> {
    let root = as_object(tree, "query")?;

    let first_key = match root.get(TRANSFORMATIONS) {
        Some(transformations) => as_object(transformations, TRANSFORMATIONS)?
            .get(GROUP)
            .and_then(Json::as_array)
            .and_then(|group| group.first())
            .and_then(Json::as_str)
            .ok_or_else(|| QueryError::validation("GROUP must start with a dataset key"))?,
        None => root
            .get(OPTIONS)
            .and_then(Json::as_object)
            .and_then(|options| options.get(COLUMNS))
            .and_then(Json::as_array)
            .and_then(|columns| columns.first())
            .and_then(Json::as_str)
            .ok_or_else(|| QueryError::validation("COLUMNS must start with a dataset key"))?,
    };

    let (id, _) = first_key.split_once(KEY_SEPARATOR).ok_or_else(|| {
        QueryError::validation(format!("{:?} is not a dataset-qualified key", first_key))
    })?;
    validate_id(id).map_err(|e| QueryError::validation(e.to_string()))?;

    Ok(id.to_string())
}

/// Validate `tree` against `schema`
pub fn validate(tree: &Json, schema: &Schema) -> QueryResult<Query> {
    let root = as_object(tree, "query")?;

    let allowed = [WHERE, OPTIONS, TRANSFORMATIONS];
    if let Some(unknown) = root.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(QueryError::validation(format!(
            "unexpected top-level key {:?}",
            unknown
        )));
    }
    let where_clause = root
        .get(WHERE)
        .ok_or_else(|| QueryError::validation("missing WHERE"))?;
    let options = as_object(
        root.get(OPTIONS)
            .ok_or_else(|| QueryError::validation("missing OPTIONS"))?,
        OPTIONS,
    )?;

    let validator = Validator {
        dataset_id: dataset_id(tree)?,
        schema,
    };

    let transformations = root
        .get(TRANSFORMATIONS)
        .map(|t| validator.transformations(t))
        .transpose()?;

    if let Some(unknown) = options.keys().find(|k| *k != COLUMNS && *k != ORDER) {
        return Err(QueryError::validation(format!(
            "unexpected OPTIONS key {:?}",
            unknown
        )));
    }
    let columns = validator.columns(
        options
            .get(COLUMNS)
            .ok_or_else(|| QueryError::validation("missing COLUMNS"))?,
        transformations.as_ref(),
    )?;
    let order = options
        .get(ORDER)
        .map(|o| validator.order(o, &columns))
        .transpose()?;

    let filter = validator.filter(as_object(where_clause, WHERE)?)?;

    Ok(Query {
        dataset_id: validator.dataset_id,
        filter,
        columns,
        order,
        transformations,
    })
}

struct Validator<'s> {
    dataset_id: String,
    schema: &'s Schema,
}

impl Validator<'_> {
    /// Resolve a qualified key given as a JSON value
    fn field_key_value(&self, key: &Json, expected: Option<FieldKind>) -> QueryResult<FieldKey> {
        let key = key
            .as_str()
            .ok_or_else(|| QueryError::validation(format!("key must be a string, got {}", key)))?;
        self.field_key(key, expected)
    }

    /// Resolve a qualified key on the active dataset
    fn field_key(&self, key: &str, expected: Option<FieldKind>) -> QueryResult<FieldKey> {
        let (id, field) = key.split_once(KEY_SEPARATOR).ok_or_else(|| {
            QueryError::validation(format!("{:?} is not a dataset-qualified key", key))
        })?;
        if id != self.dataset_id {
            return Err(QueryError::validation(format!(
                "key {:?} references dataset {:?}, but the query uses {:?}",
                key, id, self.dataset_id
            )));
        }

        let kind = self
            .schema
            .field_kind(field)
            .ok_or_else(|| QueryError::validation(format!("unknown field in key {:?}", key)))?;
        if let Some(expected) = expected {
            if kind != expected {
                let wanted = match expected {
                    FieldKind::Measure => "numeric",
                    FieldKind::Text => "string",
                };
                return Err(QueryError::validation(format!(
                    "key {:?} must reference a {} field",
                    key, wanted
                )));
            }
        }

        Ok(FieldKey::new(id, field))
    }

    fn transformations(&self, value: &Json) -> QueryResult<Transformations> {
        let obj = as_object(value, TRANSFORMATIONS)?;
        if obj.len() != 2 || !obj.contains_key(GROUP) || !obj.contains_key(APPLY) {
            return Err(QueryError::validation(
                "TRANSFORMATIONS must have exactly GROUP and APPLY",
            ));
        }

        let group = as_array(&obj[GROUP], GROUP)?;
        if group.is_empty() {
            return Err(QueryError::validation("GROUP must be a non-empty array"));
        }
        let group = group
            .iter()
            .map(|k| self.field_key_value(k, None))
            .collect::<QueryResult<Vec<_>>>()?;

        let mut names = HashSet::new();
        let mut apply = Vec::new();
        for rule in as_array(&obj[APPLY], APPLY)? {
            let rule = self.apply_rule(rule)?;
            if !names.insert(rule.name.clone()) {
                return Err(QueryError::validation(format!(
                    "duplicate APPLY name {:?}",
                    rule.name
                )));
            }
            apply.push(rule);
        }

        Ok(Transformations { group, apply })
    }

    fn apply_rule(&self, value: &Json) -> QueryResult<ApplyRule> {
        let (name, body) = single_entry(value, "APPLY rule")?;
        if name.is_empty() || name.contains(KEY_SEPARATOR) {
            return Err(QueryError::validation(format!(
                "APPLY name {:?} must be non-empty and contain no '{}'",
                name, KEY_SEPARATOR
            )));
        }

        let (token, target) = single_entry(body, "APPLY body")?;
        let token: ApplyToken = token.parse()?;
        let expected = token.requires_measure().then_some(FieldKind::Measure);
        let field = self.field_key_value(target, expected)?;

        Ok(ApplyRule {
            name: name.to_string(),
            token,
            field,
        })
    }

    fn columns(
        &self,
        value: &Json,
        transformations: Option<&Transformations>,
    ) -> QueryResult<Vec<Column>> {
        let columns = as_array(value, COLUMNS)?;
        if columns.is_empty() {
            return Err(QueryError::validation("COLUMNS must be a non-empty array"));
        }

        columns
            .iter()
            .map(|column| match transformations {
                Some(t) => {
                    let name = column.as_str().ok_or_else(|| {
                        QueryError::validation(format!("column must be a string, got {}", column))
                    })?;
                    if let Some(key) = t.group.iter().find(|k| k.key() == name) {
                        Ok(Column::Field(key.clone()))
                    } else if t.defines(name) {
                        Ok(Column::Apply(name.to_string()))
                    } else {
                        Err(QueryError::validation(format!(
                            "column {:?} is neither a GROUP key nor an APPLY name",
                            name
                        )))
                    }
                }
                None => self.field_key_value(column, None).map(Column::Field),
            })
            .collect()
    }

    fn order(&self, value: &Json, columns: &[Column]) -> QueryResult<Order> {
        let in_columns = |key: &Json| -> QueryResult<String> {
            let key = key.as_str().ok_or_else(|| {
                QueryError::validation(format!("ORDER key must be a string, got {}", key))
            })?;
            if !columns.iter().any(|c| c.name() == key) {
                return Err(QueryError::validation(format!(
                    "ORDER key {:?} is not in COLUMNS",
                    key
                )));
            }
            Ok(key.to_string())
        };

        match value {
            Json::String(_) => Ok(Order::Single(in_columns(value)?)),
            Json::Object(obj) => {
                if obj.len() != 2 {
                    return Err(QueryError::validation("ORDER must have exactly dir and keys"));
                }
                let direction: Direction = obj
                    .get("dir")
                    .and_then(Json::as_str)
                    .ok_or_else(|| QueryError::validation("ORDER dir must be a string"))?
                    .parse()?;
                let keys = as_array(
                    obj.get("keys")
                        .ok_or_else(|| QueryError::validation("ORDER is missing keys"))?,
                    "ORDER keys",
                )?;
                if keys.is_empty() {
                    return Err(QueryError::validation("ORDER keys must be non-empty"));
                }
                let keys = keys.iter().map(&in_columns).collect::<QueryResult<Vec<_>>>()?;
                Ok(Order::Multi { direction, keys })
            }
            other => Err(QueryError::validation(format!(
                "ORDER must be a string or an object, got {}",
                other
            ))),
        }
    }

    fn filter(&self, node: &Map<String, Json>) -> QueryResult<Filter> {
        if node.is_empty() {
            return Ok(Filter::All);
        }
        if node.len() != 1 {
            return Err(QueryError::validation(format!(
                "filter must have exactly one key, got {}",
                node.len()
            )));
        }

        let (tag, body) = node
            .iter()
            .next()
            .ok_or_else(|| QueryError::Internal("empty filter node".to_string()))?;

        match tag.as_str() {
            "NOT" => Ok(Filter::Not(Box::new(self.filter(as_object(body, "NOT")?)?))),
            "AND" => Ok(Filter::And(self.filter_list(body, "AND")?)),
            "OR" => Ok(Filter::Or(self.filter_list(body, "OR")?)),
            "IS" => {
                let (key, pattern) = single_entry(body, "IS")?;
                let field = self.field_key(key, Some(FieldKind::Text))?;
                let pattern = pattern.as_str().ok_or_else(|| {
                    QueryError::validation(format!("IS value must be a string, got {}", pattern))
                })?;
                Ok(Filter::Is {
                    field,
                    pattern: WildcardPattern::new(pattern)?,
                })
            }
            tag => {
                let op = Comparator::from_tag(tag).ok_or_else(|| {
                    QueryError::validation(format!("unknown filter {:?}", tag))
                })?;
                let (key, operand) = single_entry(body, tag)?;
                let field = self.field_key(key, Some(FieldKind::Measure))?;
                let value = operand.as_f64().ok_or_else(|| {
                    QueryError::validation(format!("{} value must be a number, got {}", op, operand))
                })?;
                Ok(Filter::Compare { op, field, value })
            }
        }
    }

    fn filter_list(&self, value: &Json, tag: &str) -> QueryResult<Vec<Filter>> {
        let nodes = as_array(value, tag)?;
        if nodes.is_empty() {
            return Err(QueryError::validation(format!(
                "{} must be a non-empty array",
                tag
            )));
        }
        nodes
            .iter()
            .map(|n| self.filter(as_object(n, tag)?))
            .collect()
    }
}

fn as_object<'a>(value: &'a Json, what: &str) -> QueryResult<&'a Map<String, Json>> {
    value
        .as_object()
        .ok_or_else(|| QueryError::validation(format!("{} must be an object", what)))
}

fn as_array<'a>(value: &'a Json, what: &str) -> QueryResult<&'a Vec<Json>> {
    value
        .as_array()
        .ok_or_else(|| QueryError::validation(format!("{} must be an array", what)))
}

/// The only entry of a single-key object
fn single_entry<'a>(value: &'a Json, what: &str) -> QueryResult<(&'a str, &'a Json)> {
    let obj = as_object(value, what)?;
    match obj.iter().next() {
        Some((k, v)) if obj.len() == 1 => Ok((k.as_str(), v)),
        _ => Err(QueryError::validation(format!(
            "{} must have exactly one key, got {}",
            what,
            obj.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatasetKind;
    use serde_json::json;

    fn sections() -> Schema {
        DatasetKind::Sections.schema()
    }

    fn assert_invalid(tree: Json) {
        let result = validate(&tree, &sections());
        assert!(
            matches!(result, Err(QueryError::Validation(_))),
            "expected validation error for {}, got {:?}",
            tree,
            result
        );
    }

    #[test]
    fn test_simple_query() {
        let tree = json!({
            "WHERE": { "GT": { "sections_avg": 97 } },
            "OPTIONS": { "COLUMNS": ["sections_dept", "sections_avg"], "ORDER": "sections_avg" }
        });
        let query = validate(&tree, &sections()).unwrap();

        assert_eq!(query.dataset_id, "sections");
        assert_eq!(query.column_names(), vec!["sections_dept", "sections_avg"]);
        assert_eq!(query.order, Some(Order::Single("sections_avg".to_string())));
        assert!(query.transformations.is_none());
        assert_eq!(
            query.filter,
            Filter::Compare {
                op: Comparator::Gt,
                field: FieldKey::new("sections", "avg"),
                value: 97.0,
            }
        );
    }

    #[test]
    fn test_empty_where_matches_all() {
        let tree = json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_uuid"] } });
        assert_eq!(validate(&tree, &sections()).unwrap().filter, Filter::All);
    }

    #[test]
    fn test_nested_logic() {
        let tree = json!({
            "WHERE": { "OR": [
                { "AND": [ { "IS": { "sections_dept": "cp*" } }, { "NOT": { "LT": { "sections_year": 2015 } } } ] },
                { "EQ": { "sections_pass": 20 } },
                {}
            ] },
            "OPTIONS": { "COLUMNS": ["sections_dept"] }
        });
        let query = validate(&tree, &sections()).unwrap();
        match query.filter {
            Filter::Or(branches) => {
                assert_eq!(branches.len(), 3);
                assert!(matches!(&branches[0], Filter::And(inner) if inner.len() == 2));
                assert_eq!(branches[2], Filter::All);
            }
            other => panic!("expected OR, got {:?}", other),
        }
    }

    #[test]
    fn test_transformations() {
        let tree = json!({
            "WHERE": {},
            "OPTIONS": {
                "COLUMNS": ["sections_dept", "avgAvg", "uuids"],
                "ORDER": { "dir": "DOWN", "keys": ["avgAvg", "sections_dept"] }
            },
            "TRANSFORMATIONS": {
                "GROUP": ["sections_dept", "sections_year"],
                "APPLY": [
                    { "avgAvg": { "AVG": "sections_avg" } },
                    { "uuids": { "COUNT": "sections_uuid" } }
                ]
            }
        });
        let query = validate(&tree, &sections()).unwrap();

        let t = query.transformations.unwrap();
        assert_eq!(t.group.len(), 2);
        assert_eq!(t.apply[0].token, ApplyToken::Avg);
        assert_eq!(t.apply[1].field.field(), "uuid");
        assert_eq!(
            query.columns,
            vec![
                Column::Field(FieldKey::new("sections", "dept")),
                Column::Apply("avgAvg".to_string()),
                Column::Apply("uuids".to_string()),
            ]
        );
        assert_eq!(query.order.unwrap().direction(), Direction::Down);
    }

    #[test]
    fn test_empty_apply_is_allowed() {
        let tree = json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_dept"] },
            "TRANSFORMATIONS": { "GROUP": ["sections_dept"], "APPLY": [] }
        });
        assert!(validate(&tree, &sections()).is_ok());
    }

    #[test]
    fn test_dataset_id_resolution() {
        let plain = json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": ["ubc_avg"] } });
        assert_eq!(dataset_id(&plain).unwrap(), "ubc");

        let grouped = json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["total"] },
            "TRANSFORMATIONS": { "GROUP": ["rooms_type"], "APPLY": [ { "total": { "SUM": "rooms_seats" } } ] }
        });
        assert_eq!(dataset_id(&grouped).unwrap(), "rooms");

        let unqualified = json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": ["avg"] } });
        assert!(dataset_id(&unqualified).is_err());

        let blank = json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": [" _avg"] } });
        assert!(dataset_id(&blank).is_err());
    }

    #[test]
    fn test_rejects_bad_top_level() {
        assert_invalid(json!([]));
        assert_invalid(json!({ "OPTIONS": { "COLUMNS": ["sections_avg"] } }));
        assert_invalid(json!({ "WHERE": {} }));
        assert_invalid(json!({
            "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_avg"] }, "LIMIT": 5
        }));
        assert_invalid(json!({ "WHERE": [], "OPTIONS": { "COLUMNS": ["sections_avg"] } }));
    }

    #[test]
    fn test_rejects_bad_options() {
        assert_invalid(json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": [] } }));
        assert_invalid(json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": "sections_avg" } }));
        assert_invalid(json!({ "WHERE": {}, "OPTIONS": { "ORDER": "sections_avg" } }));
        assert_invalid(json!({
            "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_avg"], "LIMIT": 1 }
        }));
        assert_invalid(json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_grade"] } }));
    }

    #[test]
    fn test_rejects_order_outside_columns() {
        assert_invalid(json!({
            "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_avg"], "ORDER": "sections_dept" }
        }));
        assert_invalid(json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_avg"], "ORDER": { "dir": "DOWN", "keys": ["sections_dept"] } }
        }));
        assert_invalid(json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_avg"], "ORDER": { "dir": "DOWN", "keys": [] } }
        }));
        assert_invalid(json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_avg"], "ORDER": { "dir": "down", "keys": ["sections_avg"] } }
        }));
        assert_invalid(json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_avg"], "ORDER": { "keys": ["sections_avg"] } }
        }));
        assert_invalid(json!({
            "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_avg"], "ORDER": 3 }
        }));
    }

    #[test]
    fn test_rejects_mixed_datasets() {
        assert_invalid(json!({
            "WHERE": {}, "OPTIONS": { "COLUMNS": ["sections_avg", "other_dept"] }
        }));
        assert_invalid(json!({
            "WHERE": { "GT": { "other_avg": 1 } },
            "OPTIONS": { "COLUMNS": ["sections_avg"] }
        }));
        assert_invalid(json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_dept"] },
            "TRANSFORMATIONS": { "GROUP": ["sections_dept", "other_id"], "APPLY": [] }
        }));
    }

    #[test]
    fn test_rejects_bad_comparisons() {
        let cases = [
            json!({ "GT": { "sections_dept": 1 } }),
            json!({ "GT": { "sections_avg": "97" } }),
            json!({ "EQ": { "sections_avg": true } }),
            json!({ "LT": {} }),
            json!({ "LT": { "sections_avg": 1, "sections_pass": 2 } }),
            json!({ "IS": { "sections_avg": "9*" } }),
            json!({ "IS": { "sections_dept": 5 } }),
            json!({ "IS": { "sections_dept": "c*p*" } }),
            json!({ "GTE": { "sections_avg": 1 } }),
            json!({ "gt": { "sections_avg": 1 } }),
        ];
        for filter in cases {
            assert_invalid(json!({ "WHERE": filter, "OPTIONS": { "COLUMNS": ["sections_avg"] } }));
        }
    }

    #[test]
    fn test_rejects_bad_logic() {
        let cases = [
            json!({ "AND": [] }),
            json!({ "OR": {} }),
            json!({ "NOT": [] }),
            json!({ "AND": [ { "GT": { "sections_avg": 1 } }, 5 ] }),
            json!({ "GT": { "sections_avg": 1 }, "LT": { "sections_avg": 5 } }),
            json!({ "NOT": { "NOT": { "IS": { "sections_dept": "a*b" } } } }),
        ];
        for filter in cases {
            assert_invalid(json!({ "WHERE": filter, "OPTIONS": { "COLUMNS": ["sections_avg"] } }));
        }
    }

    #[test]
    fn test_rejects_bad_transformations() {
        let base = |transformations: Json, columns: Json| {
            json!({
                "WHERE": {},
                "OPTIONS": { "COLUMNS": columns },
                "TRANSFORMATIONS": transformations
            })
        };

        // Missing APPLY
        assert_invalid(base(json!({ "GROUP": ["sections_dept"] }), json!(["sections_dept"])));
        // Empty GROUP
        assert_invalid(base(json!({ "GROUP": [], "APPLY": [] }), json!(["sections_dept"])));
        // Raw field in COLUMNS
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [] }),
            json!(["sections_dept", "sections_avg"]),
        ));
        // Duplicate APPLY name
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [
                { "x": { "MAX": "sections_avg" } }, { "x": { "MIN": "sections_avg" } }
            ] }),
            json!(["sections_dept", "x"]),
        ));
        // APPLY name with separator
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [ { "max_avg": { "MAX": "sections_avg" } } ] }),
            json!(["sections_dept"]),
        ));
        // Empty APPLY name
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [ { "": { "MAX": "sections_avg" } } ] }),
            json!(["sections_dept"]),
        ));
        // Numeric aggregate on a string field
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [ { "s": { "SUM": "sections_title" } } ] }),
            json!(["sections_dept", "s"]),
        ));
        // Unknown token
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [ { "m": { "MEDIAN": "sections_avg" } } ] }),
            json!(["sections_dept", "m"]),
        ));
        // Two tokens in one rule
        assert_invalid(base(
            json!({ "GROUP": ["sections_dept"], "APPLY": [ { "m": { "MAX": "sections_avg", "MIN": "sections_avg" } } ] }),
            json!(["sections_dept", "m"]),
        ));
    }

    #[test]
    fn test_count_accepts_string_fields() {
        let tree = json!({
            "WHERE": {},
            "OPTIONS": { "COLUMNS": ["sections_dept", "n"] },
            "TRANSFORMATIONS": {
                "GROUP": ["sections_dept"],
                "APPLY": [ { "n": { "COUNT": "sections_instructor" } } ]
            }
        });
        assert!(validate(&tree, &sections()).is_ok());
    }

    #[test]
    fn test_schema_is_per_kind() {
        let tree = json!({ "WHERE": {}, "OPTIONS": { "COLUMNS": ["rooms_seats"] } });
        assert!(validate(&tree, &sections()).is_err());
        assert!(validate(&tree, &DatasetKind::Rooms.schema()).is_ok());
        assert!(validate(&tree, &Schema::any()).is_ok());
    }
}
