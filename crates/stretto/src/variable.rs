//! Variable descriptors.
//!
//! Three variants share one descriptor: declared parameters (owned by
//! exactly one function), let-bound locals, and *copied* variables that
//! closure conversion synthesizes for free references. A copied variable
//! remembers its original and, once the analyzer resolves it, the
//! *supplier* — the variable in the enclosing function whose frame slot is
//! read when the closure is created.
//!
//! Variables are shared (`Arc`) between the nodes that reference them, the
//! function that owns them, and any copied variables derived from them, so
//! every mutable field is an atomic or a write-once cell.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicI32, Ordering},
};

use crate::{
    function::FunctionId,
    kind::TypeCell,
    profile::ValueProfile,
};

#[derive(Debug)]
pub(crate) enum VarKind {
    /// Declared parameter of a function definition.
    Param,
    /// Introduced by a `let` inside a function body; stack-allocated.
    Let,
    /// Synthesized by closure conversion for a free reference.
    Copied {
        original: Arc<Variable>,
        /// The enclosing function's variable whose value is copied at
        /// closure creation. Resolved during closure conversion.
        supplier: OnceLock<Arc<Variable>>,
    },
}

#[derive(Debug)]
pub(crate) struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// The function this variable belongs to. Assigned during scope
    /// validation (params, lets) or at creation (copied variables).
    owner: OnceLock<FunctionId>,
    /// Frame slot, assigned by the indexer. Negative until assigned.
    index: AtomicI32,
    pub inferred: TypeCell,
    pub observed: TypeCell,
    pub specialized: TypeCell,
    /// Kinds seen at reads of this variable during profiling.
    pub profile: ValueProfile,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VarKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            owner: OnceLock::new(),
            index: AtomicI32::new(-1),
            inferred: TypeCell::new(),
            observed: TypeCell::new(),
            specialized: TypeCell::new(),
            profile: ValueProfile::new(),
        })
    }

    pub fn copied(original: &Arc<Self>, owner: FunctionId) -> Arc<Self> {
        let var = Self::new(
            original.name.clone(),
            VarKind::Copied {
                original: Arc::clone(original),
                supplier: OnceLock::new(),
            },
        );
        var.set_owner(owner);
        var
    }

    /// Marks this variable as belonging to `func`. Idempotent: the re-run of
    /// the analysis passes at compile time re-asserts the same owner.
    pub fn set_owner(&self, func: FunctionId) {
        let owner = *self.owner.get_or_init(|| func);
        debug_assert_eq!(owner, func, "variable `{}` changed owner", self.name);
    }

    pub fn owner(&self) -> Option<FunctionId> {
        self.owner.get().copied()
    }

    /// Stores the frame index. Re-indexing recomputes the same value.
    pub fn set_index(&self, index: usize) {
        self.index
            .store(i32::try_from(index).expect("frame index overflow"), Ordering::Relaxed);
    }

    /// The frame slot of this variable.
    ///
    /// # Panics
    /// Panics when called before the indexer ran.
    pub fn index(&self) -> usize {
        let raw = self.index.load(Ordering::Relaxed);
        debug_assert!(raw >= 0, "variable `{}` has no frame index", self.name);
        usize::try_from(raw).expect("variable read before indexing")
    }

    /// Resolves the supplier of a copied variable. Idempotent: the re-run of
    /// closure conversion resolves to the same supplier.
    pub fn set_supplier(&self, supplier_var: Arc<Self>) {
        match &self.kind {
            VarKind::Copied { supplier, .. } => {
                let _ = supplier.set(supplier_var);
            }
            _ => unreachable!("`{}` is not a copied variable", self.name),
        }
    }

    pub fn supplier(&self) -> Option<&Arc<Self>> {
        match &self.kind {
            VarKind::Copied { supplier, .. } => supplier.get(),
            _ => None,
        }
    }

    pub fn original(&self) -> Option<&Arc<Self>> {
        match &self.kind {
            VarKind::Copied { original, .. } => Some(original),
            _ => None,
        }
    }

    /// Pointer identity, used to key analysis tables.
    pub fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}
