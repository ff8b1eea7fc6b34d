use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::common::{DbError, RecordId, Result};
use crate::tuple::{Column, DataType, Schema, SchemaRef, Tuple, Value};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::expression::{is_true, Expression};
use super::plan::{AggregationPlan, AggregationType};

/// Group-by key with hashing that treats doubles by bit pattern, so the
/// map's Eq/Hash contract holds even for NaN.
#[derive(Debug, Clone)]
struct GroupKey(Vec<Value>);

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        (Value::String(x), Value::String(y)) => x == y,
        _ => false,
    }
}

fn value_hash<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Boolean(v) => (1u8, v).hash(state),
        Value::Integer(v) => (2u8, v).hash(state),
        Value::BigInt(v) => (3u8, v).hash(state),
        Value::Double(v) => (4u8, v.to_bits()).hash(state),
        Value::String(v) => (5u8, v).hash(state),
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| value_eq(a, b))
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            value_hash(value, state);
        }
    }
}

/// Running state of one aggregate within one group. NULL inputs are
/// skipped by every aggregate.
enum AggState {
    Count(i64),
    CountDistinct(HashSet<GroupKey>),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
}

impl AggState {
    fn new(op: AggregationType) -> Self {
        match op {
            AggregationType::Count => AggState::Count(0),
            AggregationType::CountDistinct => AggState::CountDistinct(HashSet::new()),
            AggregationType::Sum => AggState::Sum(None),
            AggregationType::Min => AggState::Min(None),
            AggregationType::Max => AggState::Max(None),
        }
    }

    fn update(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            AggState::Count(count) => *count += 1,
            AggState::CountDistinct(seen) => {
                seen.insert(GroupKey(vec![value.clone()]));
            }
            AggState::Sum(acc) => {
                let next = match (acc.take(), value) {
                    (None, Value::Integer(v)) => Value::BigInt(*v as i64),
                    (None, Value::BigInt(v)) => Value::BigInt(*v),
                    (None, Value::Double(v)) => Value::Double(*v),
                    (Some(Value::BigInt(a)), Value::Integer(v)) => Value::BigInt(a + *v as i64),
                    (Some(Value::BigInt(a)), Value::BigInt(v)) => Value::BigInt(a + v),
                    (Some(Value::BigInt(a)), Value::Double(v)) => Value::Double(a as f64 + v),
                    (Some(Value::Double(a)), Value::Integer(v)) => Value::Double(a + *v as f64),
                    (Some(Value::Double(a)), Value::BigInt(v)) => Value::Double(a + *v as f64),
                    (Some(Value::Double(a)), Value::Double(v)) => Value::Double(a + v),
                    _ => {
                        return Err(DbError::Expression(
                            "SUM over a non-numeric value".into(),
                        ))
                    }
                };
                *acc = Some(next);
            }
            AggState::Min(acc) => match acc {
                None => *acc = Some(value.clone()),
                Some(current) => {
                    if matches!(value.compare(current), Some(std::cmp::Ordering::Less)) {
                        *acc = Some(value.clone());
                    }
                }
            },
            AggState::Max(acc) => match acc {
                None => *acc = Some(value.clone()),
                Some(current) => {
                    if matches!(value.compare(current), Some(std::cmp::Ordering::Greater)) {
                        *acc = Some(value.clone());
                    }
                }
            },
        }
        Ok(())
    }

    fn output(&self) -> Value {
        match self {
            AggState::Count(count) => Value::BigInt(*count),
            AggState::CountDistinct(seen) => Value::BigInt(seen.len() as i64),
            AggState::Sum(acc) | AggState::Min(acc) | AggState::Max(acc) => {
                acc.clone().unwrap_or(Value::Null)
            }
        }
    }
}

/// Hash aggregation. `init` drains the child into a hash table keyed by
/// the group-by columns; `next` walks the groups, applying HAVING to the
/// composed `[group-bys…, aggregates…]` row.
pub struct AggregationExecutor {
    plan: AggregationPlan,
    child: Box<dyn Executor>,
    out_schema: SchemaRef,
    results: Vec<(GroupKey, Vec<AggState>)>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(plan: AggregationPlan, ctx: ExecutorContext) -> Self {
        let child = build_executor((*plan.child).clone(), ctx);
        Self {
            plan,
            child,
            out_schema: Arc::new(Schema::new(vec![])),
            results: Vec::new(),
            cursor: 0,
        }
    }

    fn build_output_schema(&self, child_schema: &Schema) -> Result<Schema> {
        let mut columns = Vec::new();
        for &index in &self.plan.group_by {
            let column = child_schema.column(index).ok_or_else(|| {
                DbError::Expression(format!("group-by column {} out of range", index))
            })?;
            columns.push(column.clone());
        }
        for aggregate in &self.plan.aggregates {
            let data_type = match aggregate.op {
                AggregationType::Count | AggregationType::CountDistinct => DataType::BigInt,
                AggregationType::Sum => match arg_type(&aggregate.arg, child_schema) {
                    DataType::Double => DataType::Double,
                    _ => DataType::BigInt,
                },
                AggregationType::Min | AggregationType::Max => {
                    arg_type(&aggregate.arg, child_schema)
                }
            };
            columns.push(Column::new(aggregate.alias.clone(), data_type, true));
        }
        Ok(Schema::new(columns))
    }
}

fn arg_type(expr: &Expression, schema: &Schema) -> DataType {
    match expr {
        Expression::Column(index) => schema
            .column(*index)
            .map(|c| *c.data_type())
            .unwrap_or(DataType::BigInt),
        Expression::Constant(Value::Integer(_)) => DataType::Integer,
        Expression::Constant(Value::Double(_)) => DataType::Double,
        Expression::Constant(Value::String(_)) => DataType::VarChar(u16::MAX),
        _ => DataType::BigInt,
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.out_schema = Arc::new(self.build_output_schema(self.child.output_schema())?);

        let mut groups: HashMap<GroupKey, Vec<AggState>> = HashMap::new();
        while let Some((tuple, _rid)) = self.child.next()? {
            let key_values: Result<Vec<Value>> = self
                .plan
                .group_by
                .iter()
                .map(|&i| {
                    tuple.value(i).cloned().ok_or_else(|| {
                        DbError::Expression(format!("group-by column {} out of range", i))
                    })
                })
                .collect();
            let key = GroupKey(key_values?);

            let states = groups.entry(key).or_insert_with(|| {
                self.plan
                    .aggregates
                    .iter()
                    .map(|a| AggState::new(a.op))
                    .collect()
            });
            for (aggregate, state) in self.plan.aggregates.iter().zip(states.iter_mut()) {
                let value = aggregate.arg.evaluate(&tuple)?;
                state.update(&value)?;
            }
        }

        // A grand aggregate over no rows still produces one row.
        if groups.is_empty() && self.plan.group_by.is_empty() {
            groups.insert(
                GroupKey(Vec::new()),
                self.plan
                    .aggregates
                    .iter()
                    .map(|a| AggState::new(a.op))
                    .collect(),
            );
        }

        self.results = groups.into_iter().collect();
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        while self.cursor < self.results.len() {
            let (key, states) = &self.results[self.cursor];
            self.cursor += 1;

            let mut values = key.0.clone();
            values.extend(states.iter().map(|s| s.output()));
            let tuple = Tuple::new(Arc::clone(&self.out_schema), values);

            if let Some(having) = &self.plan.having {
                if !is_true(&having.evaluate(&tuple)?) {
                    continue;
                }
            }
            return Ok(Some((tuple, RecordId::invalid())));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
