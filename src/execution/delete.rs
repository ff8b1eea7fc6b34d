use std::sync::Arc;

use log::warn;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{RecordId, Result};
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::plan::DeletePlan;

/// Tombstones each tuple produced by the child and removes its entries
/// from every index on the table. Emits no tuples.
pub struct DeleteExecutor {
    plan: DeletePlan,
    ctx: ExecutorContext,
    child: Box<dyn Executor>,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    out_schema: SchemaRef,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(plan: DeletePlan, ctx: ExecutorContext) -> Self {
        let child = build_executor((*plan.child).clone(), ctx.clone());
        Self {
            plan,
            ctx,
            child,
            table: None,
            indexes: Vec::new(),
            out_schema: Arc::new(Schema::new(vec![])),
            done: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.table = Some(self.ctx.catalog.table(&self.plan.table)?);
        self.indexes = self.ctx.catalog.table_indexes(&self.plan.table);
        self.done = false;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table = self.table.as_ref().expect("init() not called");

        while let Some((tuple, rid)) = self.child.next()? {
            table.heap.mark_delete(rid, &self.ctx.txn)?;

            for index in &self.indexes {
                let key = index.key_from_tuple(&tuple)?;
                if !index.index.remove(&key)? {
                    // A stale entry is benign; the delete still succeeds.
                    warn!("index {} had no entry for the deleted key", index.name);
                }
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
