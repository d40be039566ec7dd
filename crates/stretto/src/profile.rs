//! Value and invocation profiles recorded by the profiling interpreter.
//!
//! Profiles accumulate monotonically and are written with relaxed atomics:
//! concurrent interpreters may lose the occasional update, which can only
//! delay specialization, never mis-specialize — the dispatch guard re-checks
//! every assumption at runtime.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicUsize, Ordering};

use crate::{
    kind::{ExprType, Kind},
    value::Value,
};

/// Sentinel states for the monomorphic-object tracker.
const NO_OBJECT: usize = 0;
const POLYMORPHIC: usize = usize::MAX;

/// Records the kinds of values observed at one program point.
///
/// For reference values it additionally tracks whether only a single object
/// was ever seen, which is what monomorphic inline caches key on.
#[derive(Debug, Default)]
pub(crate) struct ValueProfile {
    /// Bitmask of observed [`Kind`]s.
    kinds: AtomicU8,
    /// `NO_OBJECT` until a reference value is recorded, then its identity,
    /// then `POLYMORPHIC` once a second identity shows up.
    object: AtomicUsize,
}

impl ValueProfile {
    pub fn new() -> Self {
        Self::default()
    }

    fn kind_bit(kind: Kind) -> u8 {
        match kind {
            Kind::Int => 1,
            Kind::Bool => 2,
            Kind::Ref => 4,
            Kind::Void => 8,
        }
    }

    /// Records one observed value.
    pub fn record(&self, value: &Value) {
        self.kinds.fetch_or(Self::kind_bit(value.kind()), Ordering::Relaxed);
        if let Some(identity) = value.identity() {
            let _ = self
                .object
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seen| match seen {
                    NO_OBJECT => Some(identity),
                    s if s == identity => None,
                    _ => Some(POLYMORPHIC),
                });
        }
    }

    /// True once at least one value has been recorded.
    pub fn has_data(&self) -> bool {
        self.kinds.load(Ordering::Relaxed) != 0
    }

    /// The join of all observed kinds, or `Unknown` when nothing was
    /// recorded.
    pub fn observed_kind(&self) -> ExprType {
        let mask = self.kinds.load(Ordering::Relaxed);
        let mut result = ExprType::Unknown;
        for kind in [Kind::Int, Kind::Bool, Kind::Ref, Kind::Void] {
            if mask & Self::kind_bit(kind) != 0 {
                result = result.opportunistic_union(ExprType::Known(kind));
            }
        }
        result
    }

    /// True when every recorded reference value was the same object.
    pub fn is_monomorphic(&self) -> bool {
        !matches!(self.object.load(Ordering::Relaxed), NO_OBJECT | POLYMORPHIC)
    }
}

/// Per-function invocation counter plus per-parameter value profiles.
#[derive(Debug)]
pub(crate) struct FunctionProfile {
    invocations: AtomicU32,
    params: Vec<ValueProfile>,
}

impl FunctionProfile {
    pub fn new(param_count: usize) -> Self {
        Self {
            invocations: AtomicU32::new(0),
            params: (0..param_count).map(|_| ValueProfile::new()).collect(),
        }
    }

    /// Records one entry: bumps the invocation counter and folds each
    /// argument into its parameter profile. Returns the new count.
    pub fn record_call(&self, args: &[Value]) -> u32 {
        for (profile, arg) in self.params.iter().zip(args) {
            profile.record(arg);
        }
        self.invocations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn param(&self, index: usize) -> &ValueProfile {
        &self.params[index]
    }
}

/// A monotone counter on one side of an `if`.
#[derive(Debug, Default)]
pub(crate) struct BranchCounter(AtomicU32);

impl BranchCounter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}
