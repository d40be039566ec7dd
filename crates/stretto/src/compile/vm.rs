//! The target machine executing compiled code.
//!
//! A small stack VM over tagged values. Generic entries use only the
//! dynamic instructions; specialized entries additionally use typed fast
//! paths and `Require` checkpoints. A failed checkpoint exits the frame
//! with the square-peg variant, which the dispatch guard converts into a
//! generic retry — it is never an error.

use crate::{
    error::{ExecResult, FrameExit},
    function::registry,
    primitive::Primitive,
    value::Value,
};

use super::{
    code::Code,
    op::{Op, SiteTarget},
};

/// Executes `code` over an initialized frame.
pub(crate) fn run(code: &Code, frame: &mut [Value]) -> ExecResult {
    let mut stack: Vec<Value> = Vec::with_capacity(code.max_stack);
    let mut ip = 0usize;
    loop {
        let op = code.ops[ip];
        ip += 1;
        match op {
            Op::Const(i) => stack.push(code.constants[i as usize].clone()),
            Op::Load(i) => stack.push(frame[i as usize].clone()),
            Op::Store(i) => frame[i as usize] = pop(&mut stack),
            Op::Dup => {
                let top = stack.last().expect("operand stack underflow").clone();
                stack.push(top);
            }
            Op::Pop => {
                pop(&mut stack);
            }
            Op::Jump(target) => ip = target as usize,
            Op::JumpIfFalse(target) => {
                let cond = pop(&mut stack);
                if !cond.expect_condition().map_err(FrameExit::from)? {
                    ip = target as usize;
                }
            }
            Op::JumpCmpFalse(cmp, target) => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                let holds = match (&lhs, &rhs) {
                    (Value::Int(a), Value::Int(b)) => cmp.apply(*a, *b),
                    _ => match cmp.primitive().eval2(&lhs, &rhs).map_err(FrameExit::from)? {
                        Value::Bool(b) => b,
                        _ => unreachable!("comparisons produce booleans"),
                    },
                };
                if !holds {
                    ip = target as usize;
                }
            }
            Op::Prim1(p) => {
                let arg = pop(&mut stack);
                stack.push(p.eval1(&arg).map_err(FrameExit::from)?);
            }
            Op::Prim2(p) => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(p.eval2(&lhs, &rhs).map_err(FrameExit::from)?);
            }
            Op::AddInt => int_op(&mut stack, Primitive::Add, i64::wrapping_add)?,
            Op::SubInt => int_op(&mut stack, Primitive::Sub, i64::wrapping_sub)?,
            Op::MulInt => int_op(&mut stack, Primitive::Mul, i64::wrapping_mul)?,
            Op::CmpInt(cmp) => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                let result = match (&lhs, &rhs) {
                    (Value::Int(a), Value::Int(b)) => Value::Bool(cmp.apply(*a, *b)),
                    _ => cmp.primitive().eval2(&lhs, &rhs).map_err(FrameExit::from)?,
                };
                stack.push(result);
            }
            Op::MakeClosure(i) => {
                let template = &code.closures[i as usize];
                let captured = template
                    .capture_slots
                    .iter()
                    .map(|&slot| frame[slot as usize].clone())
                    .collect();
                stack.push(Value::closure(template.func, captured));
            }
            Op::CallSite(i) => {
                let site = code.call_sites[i as usize];
                let split = stack.len() - site.argc as usize;
                let args: smallvec::SmallVec<[Value; 2]> = stack.drain(split..).collect();
                let result = match site.target {
                    SiteTarget::Value => {
                        let callee = pop(&mut stack);
                        callee.invoke(&args).map_err(FrameExit::from)?
                    }
                    SiteTarget::User(id) => {
                        let func = registry::try_get(id).ok_or_else(undefined)?;
                        crate::dispatch::call(&func, &[], &args).map_err(FrameExit::from)?
                    }
                    SiteTarget::Specialized(id) => {
                        let func = registry::try_get(id).ok_or_else(undefined)?;
                        crate::dispatch::call_specialized(&func, &args).map_err(FrameExit::from)?
                    }
                };
                stack.push(result);
            }
            Op::Require(kind) => {
                let top = stack.last().expect("operand stack underflow");
                if top.kind() != kind {
                    return Err(FrameExit::SquarePeg(pop(&mut stack)));
                }
            }
            Op::Ret => return Ok(pop(&mut stack)),
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Value {
    stack.pop().expect("operand stack underflow")
}

fn undefined() -> FrameExit {
    crate::error::RuntimeError::new("called function was never defined").into()
}

/// Typed integer fast path; falls back to the primitive's interpreter for
/// the error message when a tag does not match.
fn int_op(stack: &mut Vec<Value>, prim: Primitive, apply: fn(i64, i64) -> i64) -> Result<(), FrameExit> {
    let rhs = pop(stack);
    let lhs = pop(stack);
    let result = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => Value::Int(apply(*a, *b)),
        _ => prim.eval2(&lhs, &rhs).map_err(FrameExit::from)?,
    };
    stack.push(result);
    Ok(())
}
