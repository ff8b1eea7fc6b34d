use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{DbError, RecordId, Result};
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::plan::NestedIndexJoinPlan;

/// Index nested-loop join: each outer tuple's join columns are serialized
/// into an index key and probed for at most one inner match.
pub struct NestedIndexJoinExecutor {
    plan: NestedIndexJoinPlan,
    ctx: ExecutorContext,
    outer: Box<dyn Executor>,
    index: Option<Arc<IndexInfo>>,
    inner_table: Option<Arc<TableInfo>>,
    out_schema: SchemaRef,
}

impl NestedIndexJoinExecutor {
    pub fn new(plan: NestedIndexJoinPlan, ctx: ExecutorContext) -> Self {
        let outer = build_executor((*plan.outer).clone(), ctx.clone());
        Self {
            plan,
            ctx,
            outer,
            index: None,
            inner_table: None,
            out_schema: Arc::new(Schema::new(vec![])),
        }
    }
}

impl Executor for NestedIndexJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.outer.init()?;

        let index = self.ctx.catalog.index(&self.plan.index)?;
        let inner_table = self.ctx.catalog.table(&index.table_name)?;
        self.out_schema = Arc::new(Schema::join(
            self.outer.output_schema(),
            &inner_table.schema,
        ));
        self.index = Some(index);
        self.inner_table = Some(inner_table);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let index = self.index.as_ref().expect("init() not called");
        let inner_table = self.inner_table.as_ref().expect("init() not called");

        while let Some((outer_tuple, _)) = self.outer.next()? {
            let key = outer_tuple
                .key_bytes(&self.plan.outer_key_attrs)
                .ok_or_else(|| {
                    DbError::Serialization("cannot build probe key from outer tuple".into())
                })?;

            let Some(rid) = index.index.get_value(&key)? else {
                continue;
            };
            let Some(inner_tuple) =
                inner_table
                    .heap
                    .get_tuple(rid, &inner_table.schema, &self.ctx.txn)?
            else {
                continue;
            };

            let values = outer_tuple
                .values()
                .iter()
                .chain(inner_tuple.values().iter())
                .cloned()
                .collect();
            let joined = Tuple::new(Arc::clone(&self.out_schema), values);
            return Ok(Some((joined, RecordId::invalid())));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
