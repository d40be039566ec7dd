//! Built-in primitive operations.
//!
//! A primitive declares its arity, its static inference rule, its
//! interpretation over values, and how to emit code for it given the static
//! kinds of its arguments. Comparison primitives additionally expose the
//! fused compare-and-branch capability the code generator uses for `if`
//! conditions.

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    compile::{CmpOp, CodeBuilder, Op},
    error::{RunResult, RuntimeError},
    kind::{ExprType, Kind},
    value::Value,
};

/// The closed set of built-in primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum Primitive {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "not")]
    Not,
}

impl Primitive {
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::Not => 1,
            _ => 2,
        }
    }

    /// The kind this primitive produces when it produces a value at all.
    /// Failing argument checks raise instead of producing, so the rule does
    /// not depend on the argument types.
    pub(crate) fn result_kind(self) -> Kind {
        match self {
            Self::Add | Self::Sub | Self::Mul => Kind::Int,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Not => Kind::Bool,
        }
    }

    /// Static inference rule.
    pub(crate) fn infer(self, _args: &[ExprType]) -> ExprType {
        ExprType::Known(self.result_kind())
    }

    /// The fused compare-and-branch capability: comparison primitives yield
    /// the integer comparison the generator can test and branch on in one
    /// instruction.
    pub(crate) fn cmp_op(self) -> Option<CmpOp> {
        match self {
            Self::Lt => Some(CmpOp::Lt),
            Self::Le => Some(CmpOp::Le),
            Self::Gt => Some(CmpOp::Gt),
            Self::Ge => Some(CmpOp::Ge),
            Self::Eq => Some(CmpOp::Eq),
            _ => None,
        }
    }

    fn int_operands(self, a: &Value, b: &Value) -> RunResult<(i64, i64)> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok((*x, *y)),
            _ => Err(RuntimeError::new(format!(
                "`{self}` expects integer operands, got `{}` and `{}`",
                a.kind(),
                b.kind()
            ))),
        }
    }

    /// Interprets a unary primitive.
    pub(crate) fn eval1(self, arg: &Value) -> RunResult<Value> {
        match self {
            Self::Not => match arg {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                _ => Err(RuntimeError::new(format!(
                    "`not` expects a boolean operand, got `{}`",
                    arg.kind()
                ))),
            },
            _ => unreachable!("`{self}` is not unary"),
        }
    }

    /// Interprets a binary primitive.
    pub(crate) fn eval2(self, lhs: &Value, rhs: &Value) -> RunResult<Value> {
        match self {
            Self::Add => self.int_operands(lhs, rhs).map(|(a, b)| Value::Int(a.wrapping_add(b))),
            Self::Sub => self.int_operands(lhs, rhs).map(|(a, b)| Value::Int(a.wrapping_sub(b))),
            Self::Mul => self.int_operands(lhs, rhs).map(|(a, b)| Value::Int(a.wrapping_mul(b))),
            Self::Lt => self.int_operands(lhs, rhs).map(|(a, b)| Value::Bool(a < b)),
            Self::Le => self.int_operands(lhs, rhs).map(|(a, b)| Value::Bool(a <= b)),
            Self::Gt => self.int_operands(lhs, rhs).map(|(a, b)| Value::Bool(a > b)),
            Self::Ge => self.int_operands(lhs, rhs).map(|(a, b)| Value::Bool(a >= b)),
            Self::Eq => Ok(Value::Bool(lhs == rhs)),
            Self::Not => unreachable!("`not` is not binary"),
        }
    }

    /// Emits code for a unary primitive whose argument is already on the
    /// stack, returning the produced kind.
    pub(crate) fn emit1(self, builder: &mut CodeBuilder, _arg: Kind) -> Kind {
        builder.emit(Op::Prim1(self));
        self.result_kind()
    }

    /// Emits code for a binary primitive whose arguments are already on the
    /// stack, picking the typed instruction when both argument kinds are
    /// integer, returning the produced kind.
    pub(crate) fn emit2(self, builder: &mut CodeBuilder, lhs: Kind, rhs: Kind) -> Kind {
        if lhs == Kind::Int && rhs == Kind::Int {
            match self {
                Self::Add => builder.emit(Op::AddInt),
                Self::Sub => builder.emit(Op::SubInt),
                Self::Mul => builder.emit(Op::MulInt),
                Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq => {
                    builder.emit(Op::CmpInt(self.cmp_op().expect("comparison primitive")));
                }
                Self::Not => unreachable!("`not` is not binary"),
            }
        } else {
            builder.emit(Op::Prim2(self));
        }
        self.result_kind()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn arithmetic_requires_integers() {
        assert_eq!(
            Primitive::Add.eval2(&Value::Int(2), &Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        let err = Primitive::Add.eval2(&Value::Int(2), &Value::Bool(true)).unwrap_err();
        assert_eq!(err.message(), "`+` expects integer operands, got `int` and `bool`");
    }

    #[test]
    fn comparisons_produce_booleans() {
        assert_eq!(
            Primitive::Lt.eval2(&Value::Int(1), &Value::Int(2)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            Primitive::Ge.eval2(&Value::Int(1), &Value::Int(2)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn equality_is_generic() {
        assert_eq!(
            Primitive::Eq.eval2(&Value::str("a"), &Value::str("a")).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            Primitive::Eq.eval2(&Value::Int(1), &Value::str("a")).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(Primitive::Add.to_string(), "+");
        assert_eq!("<".parse::<Primitive>().unwrap(), Primitive::Lt);
    }
}
