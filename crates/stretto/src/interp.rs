//! The tree-walking execution tiers.
//!
//! One walker serves both: with `profiling` set it records the produced
//! value's kind at every call and every variable read and bumps the branch
//! counters; without it, it is the plain tier installed while compilation is
//! in progress. Entry bookkeeping (invocation counting, the compile
//! trigger) lives in the dispatcher, which owns tier selection.

use crate::{
    error::{ExecResult, FrameExit},
    function::FunctionImpl,
    node::{Expr, Node},
    value::Value,
};

/// Executes `func`'s body over an initialized frame.
pub(crate) fn run(func: &FunctionImpl, frame: &mut [Value], profiling: bool) -> Result<Value, crate::error::Error> {
    let walker = Walker { profiling };
    match walker.eval(&func.body, frame) {
        Ok(value) | Err(FrameExit::Return(value)) => Ok(value),
        Err(FrameExit::Error(err)) => Err(err),
        Err(FrameExit::SquarePeg(_)) => unreachable!("interpreters do not raise square-peg"),
    }
}

struct Walker {
    profiling: bool,
}

impl Walker {
    fn eval(&self, node: &Node, frame: &mut [Value]) -> ExecResult {
        match &node.expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::GetVar(var) => {
                let value = frame[var.index()].clone();
                if self.profiling {
                    var.profile.record(&value);
                }
                Ok(value)
            }
            Expr::SetVar { var, value } => {
                let value = self.eval(value, frame)?;
                frame[var.index()] = value.clone();
                Ok(value)
            }
            Expr::Let { var, init, body } => {
                let init = self.eval(init, frame)?;
                frame[var.index()] = init;
                self.eval(body, frame)
            }
            Expr::If {
                cond,
                then,
                alt,
                true_count,
                false_count,
            } => {
                let cond = self.eval(cond, frame)?;
                if cond.expect_condition().map_err(FrameExit::from)? {
                    if self.profiling {
                        true_count.bump();
                    }
                    self.eval(then, frame)
                } else {
                    if self.profiling {
                        false_count.bump();
                    }
                    self.eval(alt, frame)
                }
            }
            Expr::While { cond, body } => {
                let mut last = Value::Void;
                loop {
                    let cond = self.eval(cond, frame)?;
                    if !cond.expect_condition().map_err(FrameExit::from)? {
                        return Ok(last);
                    }
                    last = self.eval(body, frame)?;
                }
            }
            Expr::Block(exprs) => {
                let mut last = Value::Void;
                for e in exprs {
                    last = self.eval(e, frame)?;
                }
                Ok(last)
            }
            Expr::Return(value) => {
                let value = self.eval(value, frame)?;
                Err(FrameExit::Return(value))
            }
            Expr::Call { callee, args, profile } => {
                let callee = self.eval(callee, frame)?;
                let mut arg_values = smallvec::SmallVec::<[Value; 2]>::new();
                for a in args {
                    arg_values.push(self.eval(a, frame)?);
                }
                let result = callee.invoke(&arg_values).map_err(FrameExit::from)?;
                if self.profiling {
                    profile.record(&result);
                }
                Ok(result)
            }
            Expr::Prim1 { op, arg } => {
                let arg = self.eval(arg, frame)?;
                Ok(op.eval1(&arg).map_err(FrameExit::from)?)
            }
            Expr::Prim2 { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                Ok(op.eval2(&lhs, &rhs).map_err(FrameExit::from)?)
            }
            Expr::Closure(c) => {
                let captured = c
                    .captures
                    .iter()
                    .map(|&slot| frame[slot as usize].clone())
                    .collect();
                Ok(Value::closure(c.func, captured))
            }
            Expr::FreeFunctionRef(id) => Ok(Value::closure(*id, Vec::new())),
            Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
        }
    }
}
