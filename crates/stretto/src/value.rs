//! Runtime values.
//!
//! Values use a hybrid design: small immediate values (`Int`, `Bool`,
//! `Void`) are stored inline, while reference values (strings, closures)
//! are shared behind an [`Obj`] handle. The four machine-level kinds of
//! [`Kind`](crate::Kind) partition this space: every value answers its kind
//! in O(1), which is what the specialization guard and the value profiles
//! are built on.

use std::{fmt, sync::Arc};

use crate::{
    error::{Error, RuntimeError},
    function::FunctionId,
    kind::Kind,
};

/// Primary value type produced and consumed by all execution tiers.
#[derive(Debug, Clone)]
pub enum Value {
    /// The result of evaluating code for effect (empty blocks, loops that
    /// never ran).
    Void,
    Int(i64),
    Bool(bool),
    /// A shared reference value.
    Obj(Obj),
}

/// A shared reference value: a string or a closure.
///
/// `Obj` is a cheap clone (one atomic increment). Identity — used by value
/// profiles to detect monomorphic call sites — is pointer identity of the
/// shared allocation, not structural equality.
#[derive(Debug, Clone)]
pub struct Obj(Arc<ObjData>);

#[derive(Debug)]
pub(crate) enum ObjData {
    Str(String),
    Closure(Closure),
}

/// A runtime closure: a function paired with the captured values of its
/// synthetic parameters, in declaration order.
///
/// Closures reference their function by registry id, never by pointer, so
/// mutually recursive compilation units carry no ownership cycles.
#[derive(Debug)]
pub(crate) struct Closure {
    pub func: FunctionId,
    pub captured: Vec<Value>,
}

impl Value {
    /// Creates a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Obj(Obj(Arc::new(ObjData::Str(s.into()))))
    }

    pub(crate) fn closure(func: FunctionId, captured: Vec<Self>) -> Self {
        Self::Obj(Obj(Arc::new(ObjData::Closure(Closure { func, captured }))))
    }

    /// The machine-level kind of this value.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Void => Kind::Void,
            Self::Int(_) => Kind::Int,
            Self::Bool(_) => Kind::Bool,
            Self::Obj(_) => Kind::Ref,
        }
    }

    /// The string contents, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Obj(obj) => match obj.0.as_ref() {
                ObjData::Str(s) => Some(s),
                ObjData::Closure(_) => None,
            },
            _ => None,
        }
    }

    pub(crate) fn as_closure(&self) -> Option<&Closure> {
        match self {
            Self::Obj(obj) => match obj.0.as_ref() {
                ObjData::Closure(c) => Some(c),
                ObjData::Str(_) => None,
            },
            _ => None,
        }
    }

    /// Stable address of the shared allocation, for reference values.
    ///
    /// Used by value profiles to track whether a site only ever saw a single
    /// object.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Self::Obj(obj) => Some(Arc::as_ptr(&obj.0) as usize),
            _ => None,
        }
    }

    /// Invokes this value as a zero-argument callable.
    pub fn call0(&self) -> Result<Self, Error> {
        self.invoke(&[])
    }

    /// Invokes this value as a one-argument callable.
    pub fn call1(&self, arg: Self) -> Result<Self, Error> {
        self.invoke(&[arg])
    }

    /// Invokes this value as a two-argument callable.
    pub fn call2(&self, a: Self, b: Self) -> Result<Self, Error> {
        self.invoke(&[a, b])
    }

    /// Interprets this value as an `if`/`while` condition. All execution
    /// tiers share this check so they raise identical errors.
    pub(crate) fn expect_condition(&self) -> Result<bool, RuntimeError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(RuntimeError::new(format!(
                "condition must be a boolean, got `{}`",
                other.kind()
            ))),
        }
    }

    pub(crate) fn invoke(&self, args: &[Self]) -> Result<Self, Error> {
        match self.as_closure() {
            Some(closure) => {
                let func = crate::function::registry::try_get(closure.func)
                    .ok_or_else(|| RuntimeError::new("called function was never defined"))?;
                crate::dispatch::call(&func, &closure.captured, args)
            }
            None => Err(RuntimeError::new(format!("value of kind `{}` is not callable", self.kind())).into()),
        }
    }
}

/// Structural equality for immediates and strings; identity for closures.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Void, Self::Void) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Obj(a), Self::Obj(b)) => match (a.0.as_ref(), b.0.as_ref()) {
                (ObjData::Str(x), ObjData::Str(y)) => x == y,
                _ => Arc::ptr_eq(&a.0, &b.0),
            },
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Obj(obj) => match obj.0.as_ref() {
                ObjData::Str(s) => write!(f, "{s:?}"),
                ObjData::Closure(c) => write!(f, "<closure {}>", c.func),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::str(v)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Value::Int(1).kind(), Kind::Int);
        assert_eq!(Value::Bool(true).kind(), Kind::Bool);
        assert_eq!(Value::str("x").kind(), Kind::Ref);
        assert_eq!(Value::Void.kind(), Kind::Void);
    }

    #[test]
    fn string_equality_is_structural() {
        assert_eq!(Value::str("abc"), Value::str("abc"));
        assert!(Value::str("abc") != Value::str("abd"));
    }

    #[test]
    fn identity_tracks_the_allocation() {
        let a = Value::str("abc");
        let b = a.clone();
        assert_eq!(a.identity(), b.identity());
        assert!(a.identity() != Value::str("abc").identity());
        assert_eq!(Value::Int(3).identity(), None);
    }

    #[test]
    fn non_callables_refuse_invocation() {
        let err = Value::Int(3).call0().unwrap_err();
        assert_eq!(err.to_string(), "value of kind `int` is not callable");
    }
}
