use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::storage::TableIterator;
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{Executor, ExecutorContext};
use super::expression::is_true;
use super::plan::SeqScanPlan;

/// Walks the table heap in storage order, filters, and projects.
pub struct SeqScanExecutor {
    plan: SeqScanPlan,
    ctx: ExecutorContext,
    iter: Option<TableIterator>,
    out_schema: SchemaRef,
}

impl SeqScanExecutor {
    pub fn new(plan: SeqScanPlan, ctx: ExecutorContext) -> Self {
        Self {
            plan,
            ctx,
            iter: None,
            out_schema: Arc::new(Schema::new(vec![])),
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        let table = self.ctx.catalog.table(&self.plan.table)?;

        self.out_schema = match &self.plan.output_columns {
            Some(indices) => Arc::new(table.schema.project(indices).ok_or_else(|| {
                crate::common::DbError::Expression("projection column out of range".into())
            })?),
            None => Arc::clone(&table.schema),
        };
        self.iter = Some(table.heap.iter(Arc::clone(&table.schema)));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self.iter.as_mut().expect("init() not called");

        while let Some((tuple, rid)) = iter.next()? {
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
