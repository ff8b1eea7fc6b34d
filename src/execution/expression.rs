use std::cmp::Ordering;

use crate::common::{DbError, Result};
use crate::tuple::{Tuple, Value};

/// Comparison operators for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn matches(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Which input of a join a column reference addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// A scalar expression evaluated against one tuple (or a pair of tuples
/// for join predicates). Comparisons involving NULL yield NULL, which
/// predicates treat as false.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Value of the column at the given position
    Column(usize),
    /// Column of one side of a join
    JoinColumn { side: JoinSide, index: usize },
    /// A literal
    Constant(Value),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn column(index: usize) -> Self {
        Expression::Column(index)
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant(value.into())
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluates against a single tuple.
    pub fn evaluate(&self, tuple: &Tuple) -> Result<Value> {
        self.eval(&|side, index| {
            let value = match side {
                None | Some(JoinSide::Left) => tuple.value(index),
                Some(JoinSide::Right) => None,
            };
            value.cloned().ok_or_else(|| {
                DbError::Expression(format!("column {} out of range", index))
            })
        })
    }

    /// Evaluates against a pair of tuples; `JoinColumn` picks the side,
    /// plain `Column` addresses the left input.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> Result<Value> {
        self.eval(&|side, index| {
            let value = match side {
                None | Some(JoinSide::Left) => left.value(index),
                Some(JoinSide::Right) => right.value(index),
            };
            value.cloned().ok_or_else(|| {
                DbError::Expression(format!("join column {} out of range", index))
            })
        })
    }

    fn eval(
        &self,
        resolve: &dyn Fn(Option<JoinSide>, usize) -> Result<Value>,
    ) -> Result<Value> {
        match self {
            Expression::Column(index) => resolve(None, *index),
            Expression::JoinColumn { side, index } => resolve(Some(*side), *index),
            Expression::Constant(value) => Ok(value.clone()),
            Expression::Compare { op, left, right } => {
                let lhs = left.eval(resolve)?;
                let rhs = right.eval(resolve)?;
                Ok(match lhs.compare(&rhs) {
                    Some(ord) => Value::Boolean(op.matches(ord)),
                    None => Value::Null,
                })
            }
            Expression::And(left, right) => {
                let lhs = left.eval(resolve)?;
                let rhs = right.eval(resolve)?;
                Ok(Value::Boolean(is_true(&lhs) && is_true(&rhs)))
            }
            Expression::Or(left, right) => {
                let lhs = left.eval(resolve)?;
                let rhs = right.eval(resolve)?;
                Ok(Value::Boolean(is_true(&lhs) || is_true(&rhs)))
            }
        }
    }
}

/// Predicate semantics: only an actual true passes; false and NULL fail.
pub fn is_true(value: &Value) -> bool {
    matches!(value, Value::Boolean(true))
}

/// How an Update executor rewrites one column.
#[derive(Debug, Clone)]
pub enum UpdateAction {
    /// Replace the column with a literal
    Set(Value),
    /// Add a delta to a numeric column
    Add(i64),
}

/// Applies per-column update actions, producing the new tuple.
pub fn apply_updates(tuple: &Tuple, updates: &[(usize, UpdateAction)]) -> Result<Tuple> {
    let mut values = tuple.values().to_vec();
    for (index, action) in updates {
        let old = values
            .get(*index)
            .ok_or_else(|| DbError::Expression(format!("column {} out of range", index)))?;
        let new = match action {
            UpdateAction::Set(value) => value.clone(),
            UpdateAction::Add(delta) => match old {
                Value::Integer(v) => Value::Integer(v + *delta as i32),
                Value::BigInt(v) => Value::BigInt(v + delta),
                Value::Double(v) => Value::Double(v + *delta as f64),
                Value::Null => Value::Null,
                other => {
                    return Err(DbError::Expression(format!(
                        "cannot add to non-numeric value {}",
                        other
                    )))
                }
            },
        };
        values[*index] = new;
    }
    Ok(Tuple::new(tuple.schema().clone(), values))
}
