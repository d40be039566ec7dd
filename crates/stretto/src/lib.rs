//! An adaptive three-tier runtime for a small Lisp-like expression
//! language.
//!
//! Functions are built as expression trees ([`ast`]), defined in a
//! [`Library`], and executed through a per-function mutable call target
//! that steps through three tiers:
//!
//! 1. a **profiling interpreter** that records value kinds at calls and
//!    variable reads and counts branches,
//! 2. a **plain interpreter**, installed while compilation is in progress,
//! 3. **compiled code**: always a generic entry taking opaque values, plus —
//!    when the recorded profiles justify it — a type-specialized entry
//!    protected by a runtime guard.
//!
//! Specialized code re-checks nothing it was promised and everything it
//! wasn't: when a runtime value fails to fit a declared kind at a return or
//! a specialized call argument, the frame unwinds with an internal
//! square-peg signal and the call is retried once through the generic
//! entry, so every tier computes the same results and raises the same
//! errors.
//!
//! ```
//! use stretto::{Library, Primitive, Value, ast};
//!
//! let mut lib = Library::new();
//! let n = ast::var("n");
//! let double = lib
//!     .define(
//!         "double",
//!         ast::lambda(&[n.clone()], ast::prim2(Primitive::Add, ast::get(&n), ast::get(&n))),
//!     )
//!     .unwrap();
//! assert_eq!(double.call1(Value::Int(21)).unwrap(), Value::Int(42));
//! ```

pub mod ast;
mod compile;
mod dispatch;
mod error;
mod function;
mod infer;
mod interp;
mod kind;
mod library;
mod node;
mod observe;
mod prepare;
mod primitive;
mod profile;
mod report;
mod value;
mod variable;

pub use crate::{
    error::{CompileError, Error, RuntimeError},
    kind::{ExprType, Kind},
    library::{Library, UserFunction},
    node::Node,
    primitive::Primitive,
    report::{BranchReport, ParamReport, ProfileReport},
    value::{Obj, Value},
};
