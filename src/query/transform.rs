//! Transformation Engine
//!
//! GROUP partitions matched records by the tuple of their GROUP field
//! values; APPLY folds each group into one aggregate per rule.
//!
//! Group keys are typed tuples (`Vec<FieldRef>`) compared structurally, so
//! `("a_b", "c")` and `("a", "b_c")` stay separate groups. Groups come out
//! in the order their first record was seen.
//!
//! # Aggregates
//!
//! ```text
//! MAX / MIN   numeric max / min
//! SUM         exact decimal sum, 2 dp
//! AVG         exact decimal sum / group size, 2 dp
//! COUNT       number of distinct values
//! ```
//!
//! Rounding is to 2 decimal places, midpoint away from zero.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::query::ast::{ApplyRule, ApplyToken, FieldKey, Transformations};
use crate::query::error::{QueryError, QueryResult};
use crate::query::executor::ResultRow;
use crate::storage::{FieldLookup, FieldRef, Value};

/// Decimal places kept by SUM and AVG
pub const AGGREGATE_SCALE: u32 = 2;

/// Records sharing one GROUP key tuple
#[derive(Debug)]
pub struct Group<'r, R> {
    /// GROUP field values, in GROUP order
    pub key: Vec<FieldRef<'r>>,
    /// Member records, in input order
    pub records: Vec<&'r R>,
}

/// Partition `records` by the values at `keys`, in first-seen group order
pub fn group<'r, R: FieldLookup>(
    records: &[&'r R],
    keys: &[FieldKey],
) -> QueryResult<Vec<Group<'r, R>>> {
    let mut index: HashMap<Vec<FieldRef<'r>>, usize> = HashMap::new();
    let mut groups: Vec<Group<'r, R>> = Vec::new();

    for &record in records {
        let key = keys
            .iter()
            .map(|k| lookup(record, k))
            .collect::<QueryResult<Vec<_>>>()?;

        match index.get(&key) {
            Some(&i) => groups[i].records.push(record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    records: vec![record],
                });
            }
        }
    }

    Ok(groups)
}

/// One row per group: GROUP keys plus every APPLY aggregate
pub fn aggregate<R: FieldLookup>(
    groups: &[Group<'_, R>],
    transformations: &Transformations,
) -> QueryResult<Vec<ResultRow>> {
    groups
        .iter()
        .map(|group| {
            let mut row = ResultRow::default();
            for (key, value) in transformations.group.iter().zip(&group.key) {
                row.insert(key.key(), value.to_value());
            }
            for rule in &transformations.apply {
                row.insert(&rule.name, apply(rule, &group.records)?);
            }
            Ok(row)
        })
        .collect()
}

/// Evaluate one APPLY rule over a non-empty group
pub fn apply<R: FieldLookup>(rule: &ApplyRule, records: &[&R]) -> QueryResult<Value> {
    let mut acc = accumulator(rule.token);
    for record in records {
        acc.add(lookup(*record, &rule.field)?)?;
    }
    acc.finalize()
}

/// Round to the aggregate scale, midpoint away from zero
pub fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AGGREGATE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn lookup<'r, R: FieldLookup>(record: &'r R, key: &FieldKey) -> QueryResult<FieldRef<'r>> {
    record
        .field(key.field())
        .ok_or_else(|| QueryError::Internal(format!("record has no field for key {}", key)))
}

fn accumulator(token: ApplyToken) -> Box<dyn Accumulator> {
    match token {
        ApplyToken::Max => Box::new(ExtremumAccumulator::new(f64::max)),
        ApplyToken::Min => Box::new(ExtremumAccumulator::new(f64::min)),
        ApplyToken::Sum => Box::new(SumAccumulator::default()),
        ApplyToken::Avg => Box::new(AvgAccumulator::default()),
        ApplyToken::Count => Box::new(CountAccumulator::default()),
    }
}

/// Running state of one aggregate over one group
trait Accumulator {
    fn add(&mut self, value: FieldRef<'_>) -> QueryResult<()>;
    fn finalize(self: Box<Self>) -> QueryResult<Value>;
}

struct ExtremumAccumulator {
    pick: fn(f64, f64) -> f64,
    current: Option<f64>,
}

impl ExtremumAccumulator {
    fn new(pick: fn(f64, f64) -> f64) -> Self {
        Self {
            pick,
            current: None,
        }
    }
}

impl Accumulator for ExtremumAccumulator {
    fn add(&mut self, value: FieldRef<'_>) -> QueryResult<()> {
        let n = number(value)?;
        self.current = Some(match self.current {
            Some(current) => (self.pick)(current, n),
            None => n,
        });
        Ok(())
    }

    fn finalize(self: Box<Self>) -> QueryResult<Value> {
        self.current
            .map(Value::Number)
            .ok_or_else(|| QueryError::Internal("aggregate over an empty group".to_string()))
    }
}

#[derive(Default)]
struct SumAccumulator {
    sum: Decimal,
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, value: FieldRef<'_>) -> QueryResult<()> {
        self.sum = checked_add(self.sum, to_decimal(number(value)?)?)?;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> QueryResult<Value> {
        from_decimal(round(self.sum))
    }
}

#[derive(Default)]
struct AvgAccumulator {
    sum: Decimal,
    count: u64,
}

impl Accumulator for AvgAccumulator {
    fn add(&mut self, value: FieldRef<'_>) -> QueryResult<()> {
        self.sum = checked_add(self.sum, to_decimal(number(value)?)?)?;
        self.count += 1;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> QueryResult<Value> {
        if self.count == 0 {
            return Err(QueryError::Internal("aggregate over an empty group".to_string()));
        }
        let avg = self
            .sum
            .checked_div(Decimal::from(self.count))
            .ok_or_else(|| QueryError::Internal("decimal overflow in AVG".to_string()))?;
        from_decimal(round(avg))
    }
}

#[derive(Default)]
struct CountAccumulator {
    // Numbers by bit pattern, with -0.0 folded into 0.0
    numbers: HashSet<u64>,
    texts: HashSet<String>,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, value: FieldRef<'_>) -> QueryResult<()> {
        match value {
            FieldRef::Number(n) => {
                let n = if n == 0.0 { 0.0 } else { n };
                self.numbers.insert(n.to_bits());
            }
            FieldRef::Text(s) => {
                if !self.texts.contains(s) {
                    self.texts.insert(s.to_string());
                }
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> QueryResult<Value> {
        Ok(Value::Number((self.numbers.len() + self.texts.len()) as f64))
    }
}

fn number(value: FieldRef<'_>) -> QueryResult<f64> {
    value
        .as_number()
        .ok_or_else(|| QueryError::Internal("numeric aggregate over a string field".to_string()))
}

/// Exact decimal form of `value`'s shortest round-trip representation
fn to_decimal(value: f64) -> QueryResult<Decimal> {
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
        .ok_or_else(|| QueryError::Internal(format!("{} has no decimal representation", value)))
}

fn from_decimal(value: Decimal) -> QueryResult<Value> {
    value
        .to_f64()
        .map(Value::Number)
        .ok_or_else(|| QueryError::Internal(format!("{} does not fit in f64", value)))
}

fn checked_add(a: Decimal, b: Decimal) -> QueryResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| QueryError::Internal("decimal overflow in aggregate".to_string()))
}
