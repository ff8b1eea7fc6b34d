use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::tuple::{Schema, SchemaRef, Tuple};

use super::executor::{build_executor, Executor, ExecutorContext};
use super::expression::is_true;
use super::plan::NestedLoopJoinPlan;

/// Classic nested-loop join: for every outer tuple the inner child is
/// re-initialized and scanned in full; matching pairs are emitted as
/// concatenated tuples.
pub struct NestedLoopJoinExecutor {
    plan: NestedLoopJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    out_schema: SchemaRef,
    outer: Option<Tuple>,
}

impl NestedLoopJoinExecutor {
    pub fn new(plan: NestedLoopJoinPlan, ctx: ExecutorContext) -> Self {
        let left = build_executor((*plan.left).clone(), ctx.clone());
        let right = build_executor((*plan.right).clone(), ctx);
        Self {
            plan,
            left,
            right,
            out_schema: Arc::new(Schema::new(vec![])),
            outer: None,
        }
    }

    fn joined(&self, left: &Tuple, right: &Tuple) -> Tuple {
        let values = left
            .values()
            .iter()
            .chain(right.values().iter())
            .cloned()
            .collect();
        Tuple::new(Arc::clone(&self.out_schema), values)
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;
        self.out_schema = Arc::new(Schema::join(
            self.left.output_schema(),
            self.right.output_schema(),
        ));
        self.outer = self.left.next()?.map(|(tuple, _)| tuple);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            let Some(outer) = self.outer.clone() else {
                return Ok(None);
            };

            match self.right.next()? {
                Some((inner, _)) => {
                    let matches = match &self.plan.predicate {
                        Some(predicate) => is_true(&predicate.evaluate_join(&outer, &inner)?),
                        None => true,
                    };
                    if matches {
                        return Ok(Some((self.joined(&outer, &inner), RecordId::invalid())));
                    }
                }
                None => {
                    // Inner exhausted: advance the outer side and restart
                    // the inner child.
                    self.outer = self.left.next()?.map(|(tuple, _)| tuple);
                    if self.outer.is_some() {
                        self.right.init()?;
                    }
                }
            }
        }
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.out_schema
    }
}
