use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::plan::LimitPlan;

/// Skips `offset` child tuples, then passes through at most `limit`.
pub struct LimitExecutor {
    plan: LimitPlan,
    child: Box<dyn Executor>,
    out_schema: SchemaRef,
    skipped: usize,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(plan: LimitPlan, ctx: ExecutorContext) -> Self {
        let child = build_executor((*plan.child).clone(), ctx);
        Self {
            plan,
            child,
            out_schema: Arc::new(Schema::new(vec![])),
            skipped: 0,
            emitted: 0,
        }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> Result<()> {
        self.skipped = 0;
        self.emitted = 0;
        self.child.init()?;
        self.out_schema = Arc::clone(self.child.output_schema());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            if self.emitted >= self.plan.limit {
                return Ok(None);
            }
            match self.child.next()? {
                Some(out) => {
                    if self.skipped < self.plan.offset {
                        self.skipped += 1;
                        continue;
                    }
                    self.emitted += 1;
                    return Ok(Some(out));
                }
                None => return Ok(None),
            }
        }
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
