use std::sync::Arc;

use log::warn;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{RecordId, Result};
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::expression::apply_updates;
use super::plan::UpdatePlan;

/// Rewrites each tuple produced by the child in the heap, then refreshes
/// every index: the old key is removed and the new key inserted under the
/// tuple's (possibly new) record id. Emits no tuples.
pub struct UpdateExecutor {
    plan: UpdatePlan,
    ctx: ExecutorContext,
    child: Box<dyn Executor>,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    out_schema: SchemaRef,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(plan: UpdatePlan, ctx: ExecutorContext) -> Self {
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

impl Executor for UpdateExecutor {
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

        while let Some((old_tuple, rid)) = self.child.next()? {
            let new_tuple = apply_updates(&old_tuple, &self.plan.updates)?;
            let new_rid = table.heap.update_tuple(&new_tuple, rid, &self.ctx.txn)?;

            for index in &self.indexes {
                let old_key = index.key_from_tuple(&old_tuple)?;
                if !index.index.remove(&old_key)? {
                    // A stale entry is benign; the update still succeeds.
                    warn!("index {} had no entry for the old key", index.name);
                }
                let new_key = index.key_from_tuple(&new_tuple)?;
                index.index.insert(&new_key, new_rid)?;
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
