//! Instruction set of the compiled tiers.
//!
//! The generic entry of a function uses only the dynamic instructions
//! (`Prim1`/`Prim2`, `JumpIfFalse`, dispatched call sites). The specialized
//! entry additionally uses the typed arithmetic/comparison instructions, the
//! fused compare-and-branch, `Require` checkpoints, and direct call sites.
//!
//! Typed instructions are speculative fast paths: when an operand does not
//! carry the expected tag they fall back to the primitive's interpretation,
//! so every tier raises identical errors for identical inputs.

use std::fmt;

use crate::{function::FunctionId, kind::Kind, primitive::Primitive};

/// An integer comparison, as fused into `CmpInt` and `JumpCmpFalse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CmpOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
        }
    }

    /// The primitive whose semantics this comparison fuses; its interpreter
    /// is the slow path and the source of error messages.
    pub fn primitive(self) -> Primitive {
        match self {
            Self::Lt => Primitive::Lt,
            Self::Le => Primitive::Le,
            Self::Gt => Primitive::Gt,
            Self::Ge => Primitive::Ge,
            Self::Eq => Primitive::Eq,
        }
    }
}

/// One instruction of a compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    /// Push `constants[i]`.
    Const(u16),
    /// Push `frame[i]`.
    Load(u16),
    /// Pop into `frame[i]`.
    Store(u16),
    Dup,
    Pop,
    /// Unconditional jump to an instruction index.
    Jump(u32),
    /// Pop; jump when false. Raises when the value is not a boolean.
    JumpIfFalse(u32),
    /// Fused compare-and-branch: pop two operands, jump to the false side
    /// when the comparison does not hold.
    JumpCmpFalse(CmpOp, u32),
    /// Dynamic unary primitive application.
    Prim1(Primitive),
    /// Dynamic binary primitive application.
    Prim2(Primitive),
    AddInt,
    SubInt,
    MulInt,
    /// Typed integer comparison, pushing a boolean.
    CmpInt(CmpOp),
    /// Create a closure from `closures[i]`, capturing the listed frame
    /// slots.
    MakeClosure(u16),
    /// Invoke `call_sites[i]`; arguments (and for value targets, the callee
    /// beneath them) are popped, the result is pushed.
    CallSite(u16),
    /// Square-peg checkpoint: abort this specialized frame when the value on
    /// top of the stack is not of the given kind.
    Require(Kind),
    /// Return the value on top of the stack.
    Ret,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(i) => write!(f, "const {i}"),
            Self::Load(i) => write!(f, "load {i}"),
            Self::Store(i) => write!(f, "store {i}"),
            Self::Dup => f.write_str("dup"),
            Self::Pop => f.write_str("pop"),
            Self::Jump(t) => write!(f, "jump {t}"),
            Self::JumpIfFalse(t) => write!(f, "jump-if-false {t}"),
            Self::JumpCmpFalse(cmp, t) => write!(f, "jump-unless {} {t}", cmp.primitive()),
            Self::Prim1(p) | Self::Prim2(p) => write!(f, "prim {p}"),
            Self::AddInt => f.write_str("add-int"),
            Self::SubInt => f.write_str("sub-int"),
            Self::MulInt => f.write_str("mul-int"),
            Self::CmpInt(cmp) => write!(f, "cmp-int {}", cmp.primitive()),
            Self::MakeClosure(i) => write!(f, "make-closure {i}"),
            Self::CallSite(i) => write!(f, "call {i}"),
            Self::Require(kind) => write!(f, "require {kind}"),
            Self::Ret => f.write_str("ret"),
        }
    }
}

/// How a compiled call site reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SiteTarget {
    /// The callee value sits on the stack beneath the arguments.
    Value,
    /// A user function, dispatched through its mutable call target.
    User(FunctionId),
    /// A user function whose specialized entry the caller's signature
    /// matches exactly; invoked directly, bypassing the guard.
    Specialized(FunctionId),
}

/// Call-site descriptor resolved by the dispatch machinery at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallSiteDesc {
    pub argc: u8,
    pub target: SiteTarget,
}
