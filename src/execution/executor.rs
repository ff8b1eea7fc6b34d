use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::catalog::Catalog;
use crate::common::{RecordId, Result};
use crate::concurrency::Transaction;
use crate::tuple::{SchemaRef, Tuple};

use super::aggregation::AggregationExecutor;
use super::delete::DeleteExecutor;
use super::index_scan::IndexScanExecutor;
use super::insert::InsertExecutor;
use super::limit::LimitExecutor;
use super::nested_index_join::NestedIndexJoinExecutor;
use super::nested_loop_join::NestedLoopJoinExecutor;
use super::plan::Plan;
use super::seq_scan::SeqScanExecutor;
use super::update::UpdateExecutor;

/// Shared state every executor in a query pipeline carries.
#[derive(Clone)]
pub struct ExecutorContext {
    pub catalog: Arc<Catalog>,
    pub bpm: Arc<BufferPoolManager>,
    pub txn: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn new(catalog: Arc<Catalog>, bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            catalog,
            bpm,
            txn: Arc::new(Transaction::new()),
        }
    }
}

/// Volcano-style pull executor. `init` resets state (and may
/// pre-materialize); `next` emits one tuple at a time. Parents call
/// `init`/`next` on their children; `output_schema` is valid after `init`.
pub trait Executor {
    fn init(&mut self) -> Result<()>;

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>>;

    fn output_schema(&self) -> &SchemaRef;
}

/// Converts a plan tree into an executor tree. Name resolution against the
/// catalog is deferred to `init`.
pub fn build_executor(plan: Plan, ctx: ExecutorContext) -> Box<dyn Executor> {
    match plan {
        Plan::SeqScan(plan) => Box::new(SeqScanExecutor::new(plan, ctx)),
        Plan::IndexScan(plan) => Box::new(IndexScanExecutor::new(plan, ctx)),
        Plan::Insert(plan) => Box::new(InsertExecutor::new(plan, ctx)),
        Plan::Update(plan) => Box::new(UpdateExecutor::new(plan, ctx)),
        Plan::Delete(plan) => Box::new(DeleteExecutor::new(plan, ctx)),
        Plan::Limit(plan) => Box::new(LimitExecutor::new(plan, ctx)),
        Plan::NestedLoopJoin(plan) => Box::new(NestedLoopJoinExecutor::new(plan, ctx)),
        Plan::NestedIndexJoin(plan) => Box::new(NestedIndexJoinExecutor::new(plan, ctx)),
        Plan::Aggregation(plan) => Box::new(AggregationExecutor::new(plan, ctx)),
    }
}
