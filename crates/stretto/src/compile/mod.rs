//! The compiling tier: code objects, the generator, the target machine,
//! and the compilation-unit driver.
//!
//! # Module Structure
//!
//! - `op` - instruction definitions
//! - `code` - code objects and specialized signatures
//! - `builder` - instruction emission with jump patching
//! - `compiler` - the per-function code generator
//! - `vm` - the stack machine executing compiled code

pub(crate) use builder::CodeBuilder;
pub(crate) use code::{CompiledFunction, Signature, SpecializedCode};
pub(crate) use op::{CmpOp, Op};
pub(crate) use vm::run;

mod builder;
mod code;
mod compiler;
mod op;
mod vm;

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    error::CompileError,
    function::{CompileState, FunctionImpl, registry},
    kind::{ExprType, Kind},
    node::{Expr, Node},
    observe, prepare,
};

/// Profiled entries of a top-level function before its unit is compiled.
pub(crate) const COMPILE_THRESHOLD: u32 = 10;

/// The most precise kind implied by the observed type, falling back to the
/// inferred type, falling back to `Ref`.
pub(crate) fn specialized_type(observed: ExprType, inferred: ExprType) -> Kind {
    observed.kind().or_else(|| inferred.kind()).unwrap_or(Kind::Ref)
}

/// Compiles a whole unit: the top-level function and every function nested
/// inside it.
///
/// Serialized per unit by the root's compile lock and idempotent: once the
/// root has left `Profiling`, later requests are no-ops. On entry every
/// member is retargeted to the plain interpreter; on success the compiled
/// artifacts are installed for all members before any member's state flips
/// to `Compiled`, so no caller can observe a partially retargeted unit. A
/// failure leaves the unit on the plain interpreter and surfaces the error
/// to the caller whose entry tripped the threshold.
pub(crate) fn compile_unit(root: &Arc<FunctionImpl>) -> Result<(), CompileError> {
    let _guard = root.compile_lock.lock().expect("compile lock poisoned");
    if root.state() != CompileState::Profiling {
        return Ok(());
    }
    debug_assert_eq!(root.top_level, root.id, "only unit roots are compiled");
    let unit: Vec<Arc<FunctionImpl>> = root.unit.iter().map(|&id| registry::get(id)).collect();
    log::debug!("compiling `{}` ({} function(s))", root.name, unit.len());
    for func in &unit {
        func.set_state(CompileState::Compiling);
    }
    compile_members(&unit)?;
    for func in &unit {
        func.set_state(CompileState::Compiled);
    }
    log::debug!("installed compiled code for `{}`", root.name);
    Ok(())
}

fn compile_members(unit: &[Arc<FunctionImpl>]) -> Result<(), CompileError> {
    prepare::revalidate(unit)?;
    crate::infer::infer_unit(unit)?;
    for func in unit {
        observe::observe_function(func);
    }
    let mut unit_sigs: AHashMap<u32, Signature> = AHashMap::new();
    for func in unit {
        if let Some(sig) = specialized_signature(func) {
            log::debug!(
                "specializing `{}` for ({}) -> {}",
                func.name,
                sig.param_kinds
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                sig.ret
            );
            unit_sigs.insert(func.id.0, sig);
        }
    }
    for func in unit {
        let compiled = compiler::generate(func, &unit_sigs);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("generic code for `{}`:\n{}", func.name, compiled.generic);
            if let Some(spec) = &compiled.specialized {
                log::trace!("specialized code for `{}`:\n{}", func.name, spec.code);
            }
        }
        func.install_compiled(compiled);
    }
    Ok(())
}

/// Assigns every variable's specialized type and derives the function's
/// specialized signature, when at least one parameter is non-reference.
fn specialized_signature(func: &FunctionImpl) -> Option<Signature> {
    let mut param_kinds = Vec::with_capacity(func.params.len());
    for param in &func.params {
        let kind = specialized_type(param.observed.get(), param.inferred.get());
        param.specialized.set(ExprType::Known(kind));
        param_kinds.push(kind);
    }
    for copied in &func.synthetic {
        let kind = specialized_type(copied.observed.get(), copied.inferred.get());
        copied.specialized.set(ExprType::Known(kind));
    }
    assign_let_types(&func.body);
    let ret = specialized_type(func.observed_return.get(), func.inferred_return.get());
    if param_kinds.iter().any(|k| *k != Kind::Ref) {
        Some(Signature { param_kinds, ret })
    } else {
        None
    }
}

fn assign_let_types(body: &Node) {
    crate::node::walk(body, &mut |node| {
        if let Expr::Let { var, .. } = &node.expr {
            let kind = specialized_type(var.observed.get(), var.inferred.get());
            var.specialized.set(ExprType::Known(kind));
        }
    });
}
