use std::sync::Arc;

use log::debug;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{RecordId, Result};
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::plan::{InsertPlan, InsertSource};

/// Inserts rows into a table and maintains every index on it. Emits no
/// tuples; all work happens on the first `next` call.
pub struct InsertExecutor {
    plan: InsertPlan,
    ctx: ExecutorContext,
    child: Option<Box<dyn Executor>>,
    table: Option<Arc<TableInfo>>,
    indexes: Vec<Arc<IndexInfo>>,
    out_schema: SchemaRef,
    done: bool,
}

impl InsertExecutor {
    pub fn new(plan: InsertPlan, ctx: ExecutorContext) -> Self {
        let child = match &plan.source {
            InsertSource::Child(child_plan) => {
                Some(build_executor((**child_plan).clone(), ctx.clone()))
            }
            InsertSource::Values(_) => None,
        };
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

    fn insert_row(&self, tuple: &Tuple) -> Result<()> {
        let table = self.table.as_ref().expect("init() not called");
        let rid = table.heap.insert_tuple(tuple, &self.ctx.txn)?;

        for index in &self.indexes {
            let key = index.key_from_tuple(tuple)?;
            if !index.index.insert(&key, rid)? {
                debug!("index {} already holds this key", index.name);
            }
        }
        Ok(())
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        let table = self.ctx.catalog.table(&self.plan.table)?;
        self.indexes = self.ctx.catalog.table_indexes(&self.plan.table);
        self.table = Some(table);
        self.done = false;

        if let Some(child) = self.child.as_mut() {
            child.init()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        match &self.plan.source {
            InsertSource::Values(rows) => {
                let schema = Arc::clone(&self.table.as_ref().expect("init() not called").schema);
                for row in rows.clone() {
                    let tuple = Tuple::new(Arc::clone(&schema), row);
                    self.insert_row(&tuple)?;
                }
            }
            InsertSource::Child(_) => {
                let mut child = self.child.take().expect("child executor missing");
                while let Some((tuple, _rid)) = child.next()? {
                    self.insert_row(&tuple)?;
                }
                self.child = Some(child);
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
