use crate::tuple::Value;

use super::expression::{Expression, UpdateAction};

/// Physical plan tree consumed by `build_executor`.
#[derive(Debug, Clone)]
pub enum Plan {
    SeqScan(SeqScanPlan),
    IndexScan(IndexScanPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    Limit(LimitPlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    NestedIndexJoin(NestedIndexJoinPlan),
    Aggregation(AggregationPlan),
}

/// Full-table scan with an optional filter and output projection.
#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table: String,
    pub predicate: Option<Expression>,
    /// Columns of the table schema to emit, in order; None emits all.
    pub output_columns: Option<Vec<usize>>,
}

/// Whole-index scan in key order; tuples are fetched back from the heap.
#[derive(Debug, Clone)]
pub struct IndexScanPlan {
    pub index: String,
    pub predicate: Option<Expression>,
    pub output_columns: Option<Vec<usize>>,
}

/// Rows to insert: literal values from the plan, or a child pipeline.
#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Vec<Value>>),
    Child(Box<Plan>),
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table: String,
    pub source: InsertSource,
}

/// The child must emit full-schema tuples of the target table together
/// with their heap record ids (an unprojected SeqScan, typically).
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table: String,
    pub updates: Vec<(usize, UpdateAction)>,
    pub child: Box<Plan>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table: String,
    pub child: Box<Plan>,
}

#[derive(Debug, Clone)]
pub struct LimitPlan {
    pub limit: usize,
    pub offset: usize,
    pub child: Box<Plan>,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub left: Box<Plan>,
    pub right: Box<Plan>,
    /// Evaluated with `evaluate_join`; None makes a cross product.
    pub predicate: Option<Expression>,
}

/// For each outer tuple, probes the index with a key built from the named
/// outer columns; at most one inner match is expected per probe.
#[derive(Debug, Clone)]
pub struct NestedIndexJoinPlan {
    pub outer: Box<Plan>,
    pub index: String,
    pub outer_key_attrs: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    Count,
    CountDistinct,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub op: AggregationType,
    pub arg: Expression,
    /// Output column name
    pub alias: String,
}

/// Hash aggregation. Output columns are the group-by columns followed by
/// one column per aggregate; `having` is evaluated against that composed
/// row.
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub child: Box<Plan>,
    /// Child columns to group by
    pub group_by: Vec<usize>,
    pub aggregates: Vec<AggregateExpr>,
    pub having: Option<Expression>,
}
