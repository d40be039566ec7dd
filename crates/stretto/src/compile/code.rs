//! Compiled code objects.

use std::fmt;

use crate::{function::FunctionId, kind::Kind, value::Value};

use super::op::{CallSiteDesc, Op};

/// Capture template of one closure-creation site: the nested function plus
/// the enclosing-frame slots whose values are captured, in the nested
/// function's synthetic-parameter order.
#[derive(Debug, Clone)]
pub(crate) struct CaptureTemplate {
    pub func: FunctionId,
    pub capture_slots: Vec<u32>,
}

/// One compiled entry: instructions plus the pools they index.
#[derive(Debug)]
pub(crate) struct Code {
    pub ops: Vec<Op>,
    pub constants: Vec<Value>,
    pub closures: Vec<CaptureTemplate>,
    pub call_sites: Vec<CallSiteDesc>,
    /// Operand-stack high-water mark, tracked by the builder.
    pub max_stack: usize,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{i:4}  {op}")?;
        }
        Ok(())
    }
}

/// The specialized entry of a function, valid only for arguments matching
/// its parameter kinds.
#[derive(Debug)]
pub(crate) struct SpecializedCode {
    /// Declared-parameter kinds the guard tests; `Ref` slots accept any
    /// value.
    pub param_kinds: Vec<Kind>,
    pub ret: Kind,
    pub code: Code,
}

/// The compiled artifacts of one function: the generic entry, and the
/// specialized entry when profiling justified one.
#[derive(Debug)]
pub(crate) struct CompiledFunction {
    pub generic: Code,
    pub specialized: Option<SpecializedCode>,
}

/// A specialized signature, used to answer invoker requests from compiled
/// callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Signature {
    pub param_kinds: Vec<Kind>,
    pub ret: Kind,
}
