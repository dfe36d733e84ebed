//! Filter Evaluator
//!
//! Runs a validated WHERE tree over a record slice. Works on record
//! positions internally, so record identity is the position in the slice
//! and two equal records at different positions stay distinct.
//!
//! - `{}` keeps its input
//! - `NOT` is a set difference against its input
//! - `AND` narrows its input branch by branch
//! - `OR` unions its branches in first-seen order

use std::collections::HashSet;

use crate::query::ast::{FieldKey, Filter};
use crate::query::error::{QueryError, QueryResult};
use crate::storage::FieldLookup;

/// Evaluates WHERE trees against one record slice
pub struct FilterEvaluator<'r, R> {
    records: &'r [R],
}

impl<'r, R: FieldLookup> FilterEvaluator<'r, R> {
    pub fn new(records: &'r [R]) -> Self {
        Self { records }
    }

    /// Records matching `filter`
    pub fn evaluate(&self, filter: &Filter) -> QueryResult<Vec<&'r R>> {
        let all = (0..self.records.len()).collect();
        let matched = self.eval(filter, all)?;
        Ok(matched.into_iter().map(|i| &self.records[i]).collect())
    }

    fn eval(&self, filter: &Filter, input: Vec<usize>) -> QueryResult<Vec<usize>> {
        match filter {
            Filter::All => Ok(input),
            Filter::Not(inner) => {
                let excluded: HashSet<usize> = self.eval(inner, input.clone())?.into_iter().collect();
                Ok(input.into_iter().filter(|i| !excluded.contains(i)).collect())
            }
            Filter::And(branches) => branches
                .iter()
                .try_fold(input, |narrowed, branch| self.eval(branch, narrowed)),
            Filter::Or(branches) => {
                let mut seen = HashSet::new();
                let mut union = Vec::new();
                for branch in branches {
                    for i in self.eval(branch, input.clone())? {
                        if seen.insert(i) {
                            union.push(i);
                        }
                    }
                }
                Ok(union)
            }
            Filter::Compare { op, field, value } => self.retain(input, |i| {
                let actual = self.number(i, field)?;
                Ok(op.compare(actual, *value))
            }),
            Filter::Is { field, pattern } => self.retain(input, |i| {
                let actual = self.text(i, field)?;
                Ok(pattern.is_match(actual))
            }),
        }
    }

    fn retain(
        &self,
        input: Vec<usize>,
        mut keep: impl FnMut(usize) -> QueryResult<bool>,
    ) -> QueryResult<Vec<usize>> {
        let mut out = Vec::with_capacity(input.len());
        for i in input {
            if keep(i)? {
                out.push(i);
            }
        }
        Ok(out)
    }

    fn number(&self, i: usize, key: &FieldKey) -> QueryResult<f64> {
        self.records[i]
            .field(key.field())
            .and_then(|v| v.as_number())
            .ok_or_else(|| missing_field(key, "numeric"))
    }

    fn text(&self, i: usize, key: &FieldKey) -> QueryResult<&'r str> {
        let records: &'r [R] = self.records;
        records[i]
            .field(key.field())
            .and_then(|v| v.as_text())
            .ok_or_else(|| missing_field(key, "string"))
    }
}

fn missing_field(key: &FieldKey, kind: &str) -> QueryError {
    QueryError::Internal(format!("record has no {} field for key {}", kind, key))
}
