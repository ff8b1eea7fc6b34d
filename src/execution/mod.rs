mod aggregation;
mod delete;
mod executor;
mod expression;
mod index_scan;
mod insert;
mod limit;
mod nested_index_join;
mod nested_loop_join;
mod plan;
mod seq_scan;
mod update;

pub use aggregation::AggregationExecutor;
pub use delete::DeleteExecutor;
pub use executor::{build_executor, Executor, ExecutorContext};
pub use expression::{apply_updates, is_true, CompareOp, Expression, JoinSide, UpdateAction};
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use nested_index_join::NestedIndexJoinExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use plan::{
    AggregateExpr, AggregationPlan, AggregationType, DeletePlan, IndexScanPlan, InsertPlan,
    InsertSource, LimitPlan, NestedIndexJoinPlan, NestedLoopJoinPlan, Plan, SeqScanPlan,
    UpdatePlan,
};
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;
