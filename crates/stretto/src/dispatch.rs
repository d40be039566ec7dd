//! The dispatch machinery: every call enters here.
//!
//! Each function's mutable call target is its atomic state byte plus the
//! write-once compiled artifact: an acquire load of the state selects the
//! tier, and because states flip to `Compiled` only after the whole unit's
//! artifacts are installed (release stores), no thread ever observes a
//! partially retargeted unit.
//!
//! - `Profiling` — the profiling interpreter; entries are counted and the
//!   crossing of the compile threshold triggers compilation of the
//!   enclosing top-level unit, synchronously on this thread.
//! - `Compiling` — the plain interpreter, installed for the whole unit
//!   while compilation is in progress (or after it failed).
//! - `Compiled` — the generic entry, or the specialization guard when a
//!   specialized entry exists: the guard tests each specialized-parameter
//!   slot against its declared kind, dispatches to the specialized entry on
//!   a full match, and converts an escaping square-peg signal into exactly
//!   one retry through the generic entry with the original arguments.

use std::{cell::Cell, sync::Arc};

use crate::{
    compile::{self, SpecializedCode},
    error::{Error, FrameExit, RuntimeError},
    function::{CompileState, FunctionImpl, registry},
    interp,
    kind::Kind,
    value::Value,
};

/// Hard bound on interpreter/VM call nesting, shared by all tiers.
pub(crate) const MAX_CALL_DEPTH: usize = 1024;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, RuntimeError> {
        let depth = CALL_DEPTH.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new("maximum call depth exceeded"));
        }
        CALL_DEPTH.set(depth + 1);
        Ok(Self)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.set(CALL_DEPTH.get() - 1);
    }
}

fn make_frame(func: &FunctionImpl, captured: &[Value], args: &[Value]) -> Vec<Value> {
    let mut frame = Vec::with_capacity(func.frame_size);
    frame.extend(captured.iter().cloned());
    frame.extend(args.iter().cloned());
    frame.resize(func.frame_size, Value::Void);
    frame
}

/// Invokes a function through its mutable call target.
///
/// `captured` holds the values of the synthetic parameters (empty for
/// top-level functions); `args` the declared arguments.
pub(crate) fn call(func: &Arc<FunctionImpl>, captured: &[Value], args: &[Value]) -> Result<Value, Error> {
    if args.len() != func.arity() {
        return Err(RuntimeError::new(format!(
            "`{}` takes {} argument(s), got {}",
            func.name,
            func.arity(),
            args.len()
        ))
        .into());
    }
    debug_assert_eq!(captured.len(), func.synthetic.len());
    let _depth = DepthGuard::enter()?;

    match func.state() {
        CompileState::Profiling => {
            let count = func.profile.record_call(args);
            if count == compile::COMPILE_THRESHOLD {
                log::debug!("`{}` crossed the compile threshold", func.name);
                let root = if func.top_level == func.id {
                    Arc::clone(func)
                } else {
                    registry::get(func.top_level)
                };
                compile::compile_unit(&root)?;
            }
            let mut frame = make_frame(func, captured, args);
            interp::run(func, &mut frame, true)
        }
        CompileState::Compiling => {
            let mut frame = make_frame(func, captured, args);
            interp::run(func, &mut frame, false)
        }
        CompileState::Compiled => {
            let compiled = func.compiled();
            match &compiled.specialized {
                Some(spec) if guard_matches(spec, args) => {
                    log::trace!("`{}`: guard matched, entering specialized code", func.name);
                    run_specialized(spec, func, captured, args)
                }
                _ => run_generic(func, captured, args),
            }
        }
    }
}

/// Directly invokes a callee's specialized entry, as requested by compiled
/// callers whose static signature matched exactly. The caller has already
/// checked each specialized argument, so the guard is skipped; an escaping
/// square-peg signal still falls back to the callee's generic entry.
pub(crate) fn call_specialized(func: &Arc<FunctionImpl>, args: &[Value]) -> Result<Value, Error> {
    let Some(spec) = func.compiled_opt().and_then(|c| c.specialized.as_ref()) else {
        // The signature match was made against installed code, so this only
        // happens if dispatch raced an in-progress install; fall back.
        return call(func, &[], args);
    };
    debug_assert!(guard_matches(spec, args));
    let _depth = DepthGuard::enter()?;
    run_specialized(spec, func, &[], args)
}

/// The specialization guard predicate: every specialized-typed parameter
/// slot must hold a value of its declared kind; `Ref` slots accept
/// anything.
fn guard_matches(spec: &SpecializedCode, args: &[Value]) -> bool {
    spec.param_kinds
        .iter()
        .zip(args)
        .all(|(kind, arg)| *kind == Kind::Ref || arg.kind() == *kind)
}

/// Runs the specialized entry, converting an escaping square-peg signal
/// into exactly one retry through the generic entry with the original
/// argument list.
fn run_specialized(
    spec: &SpecializedCode,
    func: &FunctionImpl,
    captured: &[Value],
    args: &[Value],
) -> Result<Value, Error> {
    let mut frame = make_frame(func, captured, args);
    match compile::run(&spec.code, &mut frame) {
        Ok(value) => Ok(value),
        Err(FrameExit::Error(err)) => Err(err),
        Err(FrameExit::SquarePeg(peg)) => {
            log::debug!(
                "`{}`: square peg ({} of kind `{}`), retrying generic entry",
                func.name,
                peg,
                peg.kind()
            );
            run_generic(func, captured, args)
        }
        Err(FrameExit::Return(_)) => unreachable!("compiled code returns through `Ret`"),
    }
}

fn run_generic(func: &FunctionImpl, captured: &[Value], args: &[Value]) -> Result<Value, Error> {
    let mut frame = make_frame(func, captured, args);
    match compile::run(&func.compiled().generic, &mut frame) {
        Ok(value) => Ok(value),
        Err(FrameExit::Error(err)) => Err(err),
        Err(FrameExit::SquarePeg(_)) => unreachable!("generic code does not raise square-peg"),
        Err(FrameExit::Return(_)) => unreachable!("compiled code returns through `Ret`"),
    }
}
