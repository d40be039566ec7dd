//! Named top-level definitions and the translator.
//!
//! A [`Library`] stores named lambda definitions. `define` translates the
//! lambda tree into its compilation unit — one [`FunctionImpl`] per lambda,
//! in topological order with the top level first — runs the analyzer, and
//! installs the unit in the process-wide registry. `self_ref` hands out a
//! free-function reference before the definition exists, which is how
//! direct recursion is wired.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    dispatch,
    error::{CompileError, Error},
    function::{FunctionId, FunctionImpl, registry},
    node::{Expr, Node},
    prepare,
    report::ProfileReport,
    value::Value,
};

/// Named top-level function definitions.
#[derive(Debug, Default)]
pub struct Library {
    entries: IndexMap<String, FunctionId>,
}

impl Library {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, name: &str) -> FunctionId {
        *self
            .entries
            .entry(name.to_owned())
            .or_insert_with(registry::reserve)
    }

    /// A reference to the named function, usable before (or inside) its
    /// definition. Calling it before `define` ran raises a runtime error.
    pub fn self_ref(&mut self, name: &str) -> Node {
        Node::new(Expr::FreeFunctionRef(self.entry(name)))
    }

    /// Translates and analyzes a lambda, installing it under `name`.
    ///
    /// On success the whole unit is in the profiling state and ready to be
    /// called. Scope violations and malformed trees surface here.
    pub fn define(&mut self, name: &str, lambda: Node) -> Result<UserFunction, Error> {
        let Expr::Lambda(lambda) = lambda.expr else {
            return Err(CompileError::NotALambda.into());
        };
        let id = match self.entries.get(name).copied() {
            // A name can be redefined; references handed out earlier keep
            // pointing at the previous definition.
            Some(id) if registry::try_get(id).is_none() => id,
            _ => {
                let fresh = registry::reserve();
                self.entries.insert(name.to_owned(), fresh);
                fresh
            }
        };
        let mut protos = prepare::translate(name, id, lambda.params, lambda.body);
        prepare::analyze(&mut protos).map_err(Error::Compile)?;
        let unit = freeze(protos);
        log::debug!("defined `{name}` as {} ({} function(s))", id, unit.len());
        Ok(UserFunction {
            func: Arc::clone(&unit[0]),
        })
    }

    /// Looks up a previously defined function.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<UserFunction> {
        let id = self.entries.get(name)?;
        registry::try_get(*id).map(|func| UserFunction { func })
    }
}

/// Freezes analyzed prototypes into registered [`FunctionImpl`]s.
///
/// The first prototype is the unit root and receives the full member list;
/// nested functions carry only their root id.
pub(crate) fn freeze(protos: Vec<prepare::ProtoFunction>) -> Vec<Arc<FunctionImpl>> {
    let unit_ids: Vec<FunctionId> = protos.iter().map(|p| p.id).collect();
    let top_level = unit_ids[0];
    protos
        .into_iter()
        .enumerate()
        .map(|(i, proto)| {
            let unit = if i == 0 { unit_ids.clone() } else { Vec::new() };
            let func = Arc::new(FunctionImpl::new(
                proto.id,
                proto.name,
                proto.params,
                proto.synthetic.into_values().collect(),
                proto.body,
                proto.frame_size,
                top_level,
                unit,
            ));
            registry::install(Arc::clone(&func));
            func
        })
        .collect()
}

/// A callable top-level function.
#[derive(Debug, Clone)]
pub struct UserFunction {
    func: Arc<FunctionImpl>,
}

impl UserFunction {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.func.name
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.func.arity()
    }

    /// Invokes with no arguments.
    pub fn call0(&self) -> Result<Value, Error> {
        dispatch::call(&self.func, &[], &[])
    }

    /// Invokes with one argument.
    pub fn call1(&self, arg: Value) -> Result<Value, Error> {
        dispatch::call(&self.func, &[], &[arg])
    }

    /// Invokes with two arguments.
    pub fn call2(&self, a: Value, b: Value) -> Result<Value, Error> {
        dispatch::call(&self.func, &[], &[a, b])
    }

    /// Summarizes the profiles recorded so far for this function.
    #[must_use]
    pub fn profile_report(&self) -> ProfileReport {
        ProfileReport::for_function(&self.func)
    }

    pub(crate) fn id(&self) -> FunctionId {
        self.func.id
    }
}
