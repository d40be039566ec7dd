//! Error types for the runtime.
//!
//! Two failure kinds are user-visible: [`RuntimeError`] (raised by executing
//! code, unwinding to the outermost invocation) and [`CompileError`] (raised
//! by the static passes, surfaced at definition time or to whichever caller
//! tripped compilation). The square-peg signal that specialized code uses to
//! abort to its generic form is *not* an error: it lives in the internal
//! frame-exit enum and is consumed by the dispatch guard before any caller
//! can see it.

use crate::{kind::Kind, primitive::Primitive, value::Value};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RuntimeError>;

/// A failure raised while executing user code.
///
/// Carries a descriptive message; stack-trace mechanics are the host's
/// concern. All execution tiers raise the same errors for the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    message: String,
}

impl RuntimeError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The descriptive message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A failure raised by the static passes over the IR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("variable `{0}` is not in scope")]
    UnboundVariable(String),
    #[error("variable `{0}` shadows an existing binding")]
    ShadowedVariable(String),
    #[error("condition has non-boolean type `{0}`")]
    BadConditionType(Kind),
    #[error("call target must be a closure or a function reference")]
    UnexpectedCallTarget,
    #[error("primitive `{0}` expects {1} argument(s)")]
    PrimitiveArity(Primitive, usize),
    #[error("calls accept at most two arguments")]
    TooManyArguments,
    #[error("expected a lambda expression")]
    NotALambda,
    #[error("function `{0}` was referenced but never defined")]
    UndefinedFunction(String),
}

/// Any user-visible failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// How a frame stopped executing, other than by producing a value normally.
///
/// `Return` implements the `return` expression's non-local exit within the
/// tree-walking tiers; it never escapes a function invocation. `SquarePeg`
/// is raised by specialized code when a runtime value does not fit its
/// declared kind; the dispatch guard converts it into a retry through the
/// generic entry. Only `Error` is ever surfaced to callers.
#[derive(Debug)]
pub(crate) enum FrameExit {
    Return(Value),
    Error(Error),
    SquarePeg(Value),
}

impl From<RuntimeError> for FrameExit {
    fn from(err: RuntimeError) -> Self {
        Self::Error(Error::Runtime(err))
    }
}

impl From<Error> for FrameExit {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

/// Result of evaluating one node or one compiled frame.
pub(crate) type ExecResult = Result<Value, FrameExit>;
