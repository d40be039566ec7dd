//! The machine-level value kinds and their join rules.
//!
//! Every value the runtime manipulates belongs to one of four kinds. `Ref` is
//! the top of the primitive/reference join: mixing distinct primitives, or
//! mixing anything with a reference, yields `Ref`. `Void` contributes nothing
//! when folding return types.
//!
//! [`ExprType`] layers "do we know the kind at all" on top: static inference
//! joins pessimistically (an unknown operand poisons the result), while the
//! profile observer joins opportunistically (an unreached branch contributes
//! nothing), so unexecuted code cannot forbid specialization.

use std::sync::atomic::{AtomicU8, Ordering};

use strum::{Display, EnumString, IntoStaticStr};

/// A machine-level value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Kind {
    Int,
    Bool,
    /// Any reference value (strings, closures, function values). Top of the
    /// kind join.
    Ref,
    /// The kind of statements evaluated for effect. Identity under join, so
    /// `return`-laden bodies fold to the kind of the values they produce.
    Void,
}

impl Kind {
    /// Least upper bound of two kinds.
    ///
    /// `join(a, a) == a`; `Void` is the identity; any other mix widens to
    /// `Ref`.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Void, k) | (k, Self::Void) => k,
            _ => Self::Ref,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Bool => 1,
            Self::Ref => 2,
            Self::Void => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Int,
            1 => Self::Bool,
            2 => Self::Ref,
            3 => Self::Void,
            _ => unreachable!("invalid kind encoding {raw}"),
        }
    }
}

/// A possibly-unknown expression type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExprType {
    /// No kind information. Calls and never-executed nodes sit here.
    #[default]
    Unknown,
    Known(Kind),
}

impl ExprType {
    /// Pessimistic join, used by static inference: `Unknown` absorbs, two
    /// known kinds join in the [`Kind`] lattice.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Known(a), Self::Known(b)) => Self::Known(a.join(b)),
            _ => Self::Unknown,
        }
    }

    /// Opportunistic join, used by the profile observer: `Unknown` is the
    /// identity, so branches that never ran do not pollute the result.
    #[must_use]
    pub fn opportunistic_union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Known(a), Self::Known(b)) => Self::Known(a.join(b)),
            (Self::Unknown, t) | (t, Self::Unknown) => t,
        }
    }

    /// The kind, if known.
    #[must_use]
    pub fn kind(self) -> Option<Kind> {
        match self {
            Self::Unknown => None,
            Self::Known(k) => Some(k),
        }
    }
}

impl std::fmt::Display for ExprType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Known(k) => write!(f, "{k}"),
        }
    }
}

/// Encoding of [`TypeCell`] contents: `EMPTY` means "never written", which
/// reads back as `Unknown` but acts as the identity under widening. This is
/// what lets a variable's type climb from nothing through `Known(_)` up to
/// `Unknown` (the absorbing top of the pessimistic order) monotonically.
const EMPTY: u8 = u8::MAX;
const UNKNOWN: u8 = u8::MAX - 1;

/// A shared, atomically updated [`ExprType`] annotation slot.
///
/// IR nodes and variables are shared between concurrently running
/// interpreters and the compiling thread, so annotations live in atomic
/// cells. All widening is monotone within the finite lattice, so lost
/// updates between relaxed read-modify-write sequences can only delay a
/// widening that a later pass will redo.
#[derive(Debug)]
pub(crate) struct TypeCell(AtomicU8);

impl Default for TypeCell {
    fn default() -> Self {
        Self(AtomicU8::new(EMPTY))
    }
}

impl TypeCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(raw: u8) -> ExprType {
        match raw {
            EMPTY | UNKNOWN => ExprType::Unknown,
            k => ExprType::Known(Kind::from_u8(k)),
        }
    }

    fn encode(t: ExprType) -> u8 {
        match t {
            ExprType::Unknown => UNKNOWN,
            ExprType::Known(k) => k.to_u8(),
        }
    }

    pub fn get(&self) -> ExprType {
        Self::decode(self.0.load(Ordering::Relaxed))
    }

    /// Overwrites the cell. Used by per-pass annotations (a pass writes each
    /// node exactly once).
    pub fn set(&self, t: ExprType) {
        self.0.store(Self::encode(t), Ordering::Relaxed);
    }

    /// Pessimistic widen: folds `t` into the cell with `Unknown` absorbing.
    /// Returns true when the stored value changed, which is what drives the
    /// inferencer's fixed point.
    pub fn widen(&self, t: ExprType) -> bool {
        let mut changed = false;
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |raw| {
                let next = if raw == EMPTY {
                    Self::encode(t)
                } else {
                    Self::encode(Self::decode(raw).union(t))
                };
                changed = next != raw;
                (next != raw).then_some(next)
            });
        changed
    }

    /// Opportunistic widen: folds `t` into the cell with `Unknown` as the
    /// identity. Used when folding observed return types.
    pub fn widen_opportunistic(&self, t: ExprType) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |raw| {
                let next = if raw == EMPTY {
                    Self::encode(t)
                } else {
                    Self::encode(Self::decode(raw).opportunistic_union(t))
                };
                (next != raw).then_some(next)
            });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const KINDS: [Kind; 4] = [Kind::Int, Kind::Bool, Kind::Ref, Kind::Void];

    #[test]
    fn join_is_commutative_and_idempotent() {
        for a in KINDS {
            assert_eq!(a.join(a), a);
            for b in KINDS {
                assert_eq!(a.join(b), b.join(a));
                for c in KINDS {
                    assert_eq!(a.join(b).join(c), a.join(b.join(c)));
                }
            }
        }
    }

    #[test]
    fn void_is_join_identity() {
        for k in KINDS {
            assert_eq!(Kind::Void.join(k), k);
        }
    }

    #[test]
    fn distinct_primitives_join_to_ref() {
        assert_eq!(Kind::Int.join(Kind::Bool), Kind::Ref);
        assert_eq!(Kind::Int.join(Kind::Ref), Kind::Ref);
    }

    #[test]
    fn pessimistic_union_absorbs_unknown() {
        assert_eq!(ExprType::Unknown.union(ExprType::Known(Kind::Int)), ExprType::Unknown);
        assert_eq!(
            ExprType::Known(Kind::Int).union(ExprType::Known(Kind::Int)),
            ExprType::Known(Kind::Int)
        );
    }

    #[test]
    fn opportunistic_union_ignores_unknown() {
        assert_eq!(
            ExprType::Unknown.opportunistic_union(ExprType::Known(Kind::Int)),
            ExprType::Known(Kind::Int)
        );
        assert_eq!(
            ExprType::Known(Kind::Bool).opportunistic_union(ExprType::Unknown),
            ExprType::Known(Kind::Bool)
        );
    }

    #[test]
    fn widen_is_monotone_and_reports_changes() {
        let cell = TypeCell::new();
        assert_eq!(cell.get(), ExprType::Unknown);
        assert!(cell.widen(ExprType::Known(Kind::Int)));
        assert_eq!(cell.get(), ExprType::Known(Kind::Int));
        assert!(!cell.widen(ExprType::Known(Kind::Int)));
        assert!(cell.widen(ExprType::Known(Kind::Bool)));
        assert_eq!(cell.get(), ExprType::Known(Kind::Ref));
        assert!(cell.widen(ExprType::Unknown));
        assert_eq!(cell.get(), ExprType::Unknown);
        // Unknown is absorbing: nothing lowers it again.
        assert!(!cell.widen(ExprType::Known(Kind::Int)));
    }
}
