use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::{RecordId, Result};
use crate::index::BTreeIterator;
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{Executor, ExecutorContext};
use super::expression::is_true;
use super::plan::IndexScanPlan;

/// Walks a B+tree in key order, fetching each tuple back from the heap by
/// its record id, then filters and projects.
pub struct IndexScanExecutor {
    plan: IndexScanPlan,
    ctx: ExecutorContext,
    table: Option<Arc<TableInfo>>,
    iter: Option<BTreeIterator>,
    out_schema: SchemaRef,
}

impl IndexScanExecutor {
    pub fn new(plan: IndexScanPlan, ctx: ExecutorContext) -> Self {
        Self {
            plan,
            ctx,
            table: None,
            iter: None,
            out_schema: Arc::new(Schema::new(vec![])),
        }
    }
}

impl Executor for IndexScanExecutor {
    fn init(&mut self) -> Result<()> {
        let index = self.ctx.catalog.index(&self.plan.index)?;
        let table = self.ctx.catalog.table(&index.table_name)?;

        self.out_schema = match &self.plan.output_columns {
            Some(indices) => Arc::new(table.schema.project(indices).ok_or_else(|| {
                crate::common::DbError::Expression("projection column out of range".into())
            })?),
            None => Arc::clone(&table.schema),
        };
        self.iter = Some(index.index.begin()?);
        self.table = Some(table);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self.iter.as_mut().expect("init() not called");
        let table = self.table.as_ref().expect("init() not called");

        while let Some((_key, rid)) = iter.next()? {
            // A stale entry whose tuple is gone is skipped, not an error.
            let Some(tuple) = table.heap.get_tuple(rid, &table.schema, &self.ctx.txn)? else {
                continue;
            };

            if let Some(predicate) = &self.plan.predicate {
                if !is_true(&predicate.evaluate(&tuple)?) {
                    continue;
                }
            }

            let out = match &self.plan.output_columns {
                Some(indices) => tuple.project(indices, &self.out_schema).ok_or_else(|| {
                    crate::common::DbError::Expression("projection column out of range".into())
                })?,
                None => tuple,
            };
            return Ok(Some((out, rid)));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
