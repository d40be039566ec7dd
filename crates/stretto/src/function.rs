//! Function implementations and the process-wide registry.
//!
//! Every lambda in a definition becomes one [`FunctionImpl`]. The top-level
//! one additionally owns the topologically ordered list of the functions
//! nested inside it — the *compilation unit*, compiled as one batch.
//!
//! Functions reference each other through dense registry ids, never through
//! pointers: closures hold an id plus captured values, call descriptors in
//! compiled code hold ids, and the unit list holds ids. The registry is the
//! only owner-of-record of `Arc<FunctionImpl>`s.

use std::{
    fmt,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicU8, Ordering},
    },
};

use crate::{
    compile::CompiledFunction,
    kind::TypeCell,
    node::Node,
    profile::FunctionProfile,
    variable::Variable,
};

/// Dense process-wide id of a [`FunctionImpl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FunctionId(pub(crate) u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Where a function sits in its one-way compilation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum CompileState {
    /// Initial state: calls run the profiling interpreter.
    Profiling = 0,
    /// Compilation in progress somewhere: calls run the plain interpreter.
    Compiling = 1,
    /// Compiled code installed: calls run the guard or the generic entry.
    Compiled = 2,
}

impl CompileState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Profiling,
            1 => Self::Compiling,
            2 => Self::Compiled,
            _ => unreachable!("invalid compile state {raw}"),
        }
    }
}

/// One compiled/compilable function.
#[derive(Debug)]
pub(crate) struct FunctionImpl {
    pub id: FunctionId,
    /// Qualified name, e.g. `fib` or `make-adder.<lambda 1>`.
    pub name: String,
    /// Declared parameters, in order.
    pub params: Vec<Arc<Variable>>,
    /// Synthetic (copied) parameters filled by closure conversion, in
    /// insertion order. Their frame slots precede the declared parameters'.
    pub synthetic: Vec<Arc<Variable>>,
    pub body: Node,
    /// High-water frame size computed by the indexer.
    pub frame_size: usize,
    pub profile: FunctionProfile,
    /// The root of this function's compilation unit (itself, when top-level).
    pub top_level: FunctionId,
    /// On the unit root: all member ids in topological order, self first.
    /// Empty on nested functions.
    pub unit: Vec<FunctionId>,
    pub inferred_return: TypeCell,
    pub observed_return: TypeCell,
    state: AtomicU8,
    /// Serializes the transition into `Compiling` and the installation of
    /// compiled code for the whole unit. Locked on the unit root only.
    pub compile_lock: Mutex<()>,
    compiled: OnceLock<CompiledFunction>,
}

impl FunctionImpl {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        id: FunctionId,
        name: String,
        params: Vec<Arc<Variable>>,
        synthetic: Vec<Arc<Variable>>,
        body: Node,
        frame_size: usize,
        top_level: FunctionId,
        unit: Vec<FunctionId>,
    ) -> Self {
        let profile = FunctionProfile::new(params.len());
        Self {
            id,
            name,
            params,
            synthetic,
            body,
            frame_size,
            profile,
            top_level,
            unit,
            inferred_return: TypeCell::new(),
            observed_return: TypeCell::new(),
            state: AtomicU8::new(CompileState::Profiling as u8),
            compile_lock: Mutex::new(()),
            compiled: OnceLock::new(),
        }
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Acquire-loads the dispatch state. Pairs with the release store in
    /// [`set_state`](Self::set_state) so a caller that observes `Compiled`
    /// also observes the installed code.
    pub fn state(&self) -> CompileState {
        CompileState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Release-stores the dispatch state. State only ever moves forward.
    pub fn set_state(&self, state: CompileState) {
        debug_assert!(state as u8 >= self.state.load(Ordering::Relaxed));
        self.state.store(state as u8, Ordering::Release);
    }

    /// Installs the compiled artifact. Called once per function, before the
    /// unit-wide flip to `Compiled`.
    pub fn install_compiled(&self, compiled: CompiledFunction) {
        let installed = self.compiled.set(compiled).is_ok();
        debug_assert!(installed, "compiled code installed twice for {}", self.name);
    }

    /// The compiled artifact. Only meaningful once the state is `Compiled`.
    pub fn compiled(&self) -> &CompiledFunction {
        self.compiled.get().expect("compiled code not installed")
    }

    /// The compiled artifact, if installed.
    pub fn compiled_opt(&self) -> Option<&CompiledFunction> {
        self.compiled.get()
    }
}

/// The process-wide function registry.
///
/// Ids are dense and assigned at reservation time, so self-references and
/// mutual recursion can be wired before the functions exist. Inserts are
/// serialized by the write lock; lookups take the read lock only.
pub(crate) mod registry {
    use std::sync::{Arc, RwLock};

    use super::{FunctionId, FunctionImpl};

    static FUNCTIONS: RwLock<Vec<Option<Arc<FunctionImpl>>>> = RwLock::new(Vec::new());

    /// Reserves a fresh id whose function will be installed later.
    pub fn reserve() -> FunctionId {
        let mut funcs = FUNCTIONS.write().expect("function registry poisoned");
        let id = FunctionId(u32::try_from(funcs.len()).expect("function registry overflow"));
        funcs.push(None);
        id
    }

    /// Installs a function at its reserved id.
    pub fn install(func: Arc<FunctionImpl>) {
        let mut funcs = FUNCTIONS.write().expect("function registry poisoned");
        let slot = usize::try_from(func.id.0).expect("function id range");
        debug_assert!(funcs[slot].is_none(), "function {} installed twice", func.id);
        funcs[slot] = Some(func);
    }

    /// Looks up an installed function.
    ///
    /// # Panics
    /// Panics when the id was reserved but never installed; `Library::define`
    /// rejects such references before execution can reach them.
    pub fn get(id: FunctionId) -> Arc<FunctionImpl> {
        try_get(id).expect("function referenced before definition")
    }

    pub fn try_get(id: FunctionId) -> Option<Arc<FunctionImpl>> {
        let funcs = FUNCTIONS.read().expect("function registry poisoned");
        funcs.get(usize::try_from(id.0).expect("function id range"))?.clone()
    }
}
