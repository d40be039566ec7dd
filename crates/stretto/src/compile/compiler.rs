//! The code generator.
//!
//! Emits, per function, a generic entry — all operands opaque, dynamic
//! instructions only — and, when the function's specialized signature says
//! at least one parameter is non-reference, a specialized entry that:
//!
//! - assigns each node a static kind seeded by the guarded parameter kinds,
//! - picks typed instructions where the static kinds allow it,
//! - fuses comparison conditions into a single compare-and-branch,
//! - requests direct invokers for call targets whose specialized signature
//!   exactly matches the static argument kinds,
//! - widens to `Ref` at every join whose arms disagree, and
//! - plants square-peg checkpoints where a value must fit a declared kind:
//!   specialized returns and arguments of directly invoked specialized
//!   callees.
//!
//! Static kinds for variables come from a small fixed point: a variable
//! starts at its specialized kind and is demoted to `Ref` as soon as any
//! assignment's static kind disagrees, which is the "widening to Ref on a
//! mismatched store" coercion.

use ahash::AHashMap;

use crate::{
    function::{CompileState, FunctionId, FunctionImpl, registry},
    kind::Kind,
    node::{Expr, Node, walk},
    value::Value,
};

use super::{
    builder::{CodeBuilder, JumpLabel},
    code::{Code, CompiledFunction, Signature, SpecializedCode},
    op::{Op, SiteTarget},
    specialized_type,
};

/// Generates the compiled artifacts for one function of a unit.
///
/// `unit_sigs` carries the specialized signatures of every
/// specialization-eligible member of the unit being compiled, keyed by
/// function id; targets outside the unit are resolved through the registry.
pub(crate) fn generate(func: &FunctionImpl, unit_sigs: &AHashMap<u32, Signature>) -> CompiledFunction {
    let generic = Emit::generic(func, unit_sigs).function();
    let specialized = unit_sigs.get(&func.id.0).map(|sig| {
        let vars = plan_variables(func, sig, unit_sigs);
        let code = Emit::specialized(func, sig, vars, unit_sigs).function();
        SpecializedCode {
            param_kinds: sig.param_kinds.clone(),
            ret: sig.ret,
            code,
        }
    });
    CompiledFunction { generic, specialized }
}

/// Resolves the specialized signature a caller may link against: a member
/// of the unit being compiled, or an already compiled function.
fn resolve_specialized(id: FunctionId, unit_sigs: &AHashMap<u32, Signature>) -> Option<Signature> {
    if let Some(sig) = unit_sigs.get(&id.0) {
        return Some(sig.clone());
    }
    let func = registry::try_get(id)?;
    if func.state() != CompileState::Compiled {
        return None;
    }
    func.compiled_opt()?.specialized.as_ref().map(|s| Signature {
        param_kinds: s.param_kinds.clone(),
        ret: s.ret,
    })
}

/// How a call site will be emitted, decided from static argument kinds.
enum CallMode {
    /// Direct invocation of the target's specialized entry.
    Direct(FunctionId, Vec<Kind>, Kind),
    /// Adapter over the target's mutable call target.
    Dispatch(FunctionId),
    /// The callee is a closure value on the stack.
    Value,
}

fn call_mode(
    callee: &Node,
    args: &[Box<Node>],
    vars: &AHashMap<usize, Kind>,
    unit_sigs: &AHashMap<u32, Signature>,
) -> CallMode {
    match &callee.expr {
        Expr::FreeFunctionRef(id) => {
            if let Some(sig) = resolve_specialized(*id, unit_sigs) {
                let arg_kinds: Vec<Kind> = args.iter().map(|a| static_kind(a, vars, unit_sigs)).collect();
                if arg_kinds == sig.param_kinds {
                    return CallMode::Direct(*id, sig.param_kinds, sig.ret);
                }
            }
            CallMode::Dispatch(*id)
        }
        Expr::Closure(_) => CallMode::Value,
        _ => unreachable!("call targets are validated by the analyzer"),
    }
}

/// The static kind of a node under the specialized emission plan.
fn static_kind(node: &Node, vars: &AHashMap<usize, Kind>, unit_sigs: &AHashMap<u32, Signature>) -> Kind {
    match &node.expr {
        Expr::Const(v) => v.kind(),
        Expr::GetVar(var) => vars.get(&var.id()).copied().unwrap_or(Kind::Ref),
        Expr::SetVar { value, .. } => static_kind(value, vars, unit_sigs),
        Expr::Let { body, .. } => static_kind(body, vars, unit_sigs),
        Expr::If { then, alt, .. } => {
            let then_kind = static_kind(then, vars, unit_sigs);
            let alt_kind = static_kind(alt, vars, unit_sigs);
            if then_kind == alt_kind { then_kind } else { Kind::Ref }
        }
        Expr::While { .. } => Kind::Ref,
        Expr::Block(exprs) => exprs
            .last()
            .map_or(Kind::Void, |e| static_kind(e, vars, unit_sigs)),
        Expr::Return(_) => Kind::Void,
        Expr::Call { callee, args, .. } => match call_mode(callee, args, vars, unit_sigs) {
            CallMode::Direct(_, _, ret) => ret,
            CallMode::Dispatch(_) | CallMode::Value => {
                specialized_type(node.observed.get(), node.inferred.get())
            }
        },
        Expr::Prim1 { op, .. } | Expr::Prim2 { op, .. } => op.result_kind(),
        Expr::Closure(_) | Expr::FreeFunctionRef(_) => Kind::Ref,
        Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
    }
}

/// Computes the storage kind of every variable for specialized emission.
///
/// Parameters take their guarded kinds; synthetic parameters are captured
/// unchecked, so they stay `Ref`; a `let` variable keeps its specialized
/// kind until some assignment disagrees, at which point it is demoted.
fn plan_variables(
    func: &FunctionImpl,
    sig: &Signature,
    unit_sigs: &AHashMap<u32, Signature>,
) -> AHashMap<usize, Kind> {
    let mut vars: AHashMap<usize, Kind> = AHashMap::new();
    for (param, kind) in func.params.iter().zip(&sig.param_kinds) {
        vars.insert(param.id(), *kind);
    }
    for copied in &func.synthetic {
        vars.insert(copied.id(), Kind::Ref);
    }
    seed_lets(&func.body, &mut vars);
    loop {
        let mut changed = false;
        demote_mismatches(&func.body, &mut vars, unit_sigs, &mut changed);
        if !changed {
            return vars;
        }
    }
}

fn seed_lets(node: &Node, vars: &mut AHashMap<usize, Kind>) {
    walk(node, &mut |n| {
        if let Expr::Let { var, .. } = &n.expr {
            vars.insert(var.id(), specialized_type(var.observed.get(), var.inferred.get()));
        }
    });
}

/// One round of the storage-kind fixed point. A demotion collected during
/// the walk is applied afterwards, so the borrow of `vars` stays shared
/// while static kinds are computed.
fn demote_mismatches(
    node: &Node,
    vars: &mut AHashMap<usize, Kind>,
    unit_sigs: &AHashMap<u32, Signature>,
    changed: &mut bool,
) {
    let mut demote: Vec<usize> = Vec::new();
    walk(node, &mut |n| {
        let (var, value) = match &n.expr {
            Expr::Let { var, init, .. } => (var, init),
            Expr::SetVar { var, value } => (var, value),
            _ => return,
        };
        let value_kind = static_kind(value, vars, unit_sigs);
        let current = vars.get(&var.id()).copied().unwrap_or(Kind::Ref);
        if current != Kind::Ref && value_kind != current {
            demote.push(var.id());
        }
    });
    for id in demote {
        vars.insert(id, Kind::Ref);
        *changed = true;
    }
}

struct Emit<'a> {
    func: &'a FunctionImpl,
    builder: CodeBuilder,
    /// Specialized signature and variable plan; `None` in generic mode.
    spec: Option<(&'a Signature, AHashMap<usize, Kind>)>,
    unit_sigs: &'a AHashMap<u32, Signature>,
}

impl<'a> Emit<'a> {
    fn generic(func: &'a FunctionImpl, unit_sigs: &'a AHashMap<u32, Signature>) -> Self {
        Self {
            func,
            builder: CodeBuilder::new(),
            spec: None,
            unit_sigs,
        }
    }

    fn specialized(
        func: &'a FunctionImpl,
        sig: &'a Signature,
        vars: AHashMap<usize, Kind>,
        unit_sigs: &'a AHashMap<u32, Signature>,
    ) -> Self {
        Self {
            func,
            builder: CodeBuilder::new(),
            spec: Some((sig, vars)),
            unit_sigs,
        }
    }

    fn function(mut self) -> Code {
        let func = self.func;
        let kind = self.emit(&func.body);
        self.emit_return(kind);
        self.builder.build()
    }

    fn slot(var: &crate::variable::Variable) -> u16 {
        u16::try_from(var.index()).expect("frame slot range")
    }

    /// The static kind the emitted value will have; `Ref` throughout in
    /// generic mode.
    fn kind_of(&self, node: &Node) -> Kind {
        match &self.spec {
            Some((_, vars)) => static_kind(node, vars, self.unit_sigs),
            None => Kind::Ref,
        }
    }

    fn emit_return(&mut self, kind: Kind) {
        let declared = self.spec.as_ref().map(|(sig, _)| sig.ret);
        if let Some(ret) = declared {
            if matches!(ret, Kind::Int | Kind::Bool) && kind != ret {
                self.builder.emit(Op::Require(ret));
            }
        }
        self.builder.emit(Op::Ret);
    }

    /// Emits a condition and the branch to its false side, fusing a
    /// comparison primitive into one instruction when the specialized plan
    /// knows both operands are integers.
    fn emit_condition(&mut self, cond: &Node) -> JumpLabel {
        if self.spec.is_some() {
            if let Expr::Prim2 { op, lhs, rhs } = &cond.expr {
                if let Some(cmp) = op.cmp_op() {
                    if self.kind_of(lhs) == Kind::Int && self.kind_of(rhs) == Kind::Int {
                        self.emit(lhs);
                        self.emit(rhs);
                        return self.builder.emit_jump_cmp_false(cmp);
                    }
                }
            }
        }
        self.emit(cond);
        self.builder.emit_jump_if_false()
    }

    fn emit(&mut self, node: &Node) -> Kind {
        let specialized = self.spec.is_some();
        match &node.expr {
            Expr::Const(v) => {
                self.builder.emit_const(v.clone());
                if specialized { v.kind() } else { Kind::Ref }
            }
            Expr::GetVar(var) => {
                self.builder.emit(Op::Load(Self::slot(var)));
                match &self.spec {
                    Some((_, vars)) => vars.get(&var.id()).copied().unwrap_or(Kind::Ref),
                    None => Kind::Ref,
                }
            }
            Expr::SetVar { var, value } => {
                let kind = self.emit(value);
                self.builder.emit(Op::Dup);
                self.builder.emit(Op::Store(Self::slot(var)));
                kind
            }
            Expr::Let { var, init, body } => {
                self.emit(init);
                self.builder.emit(Op::Store(Self::slot(var)));
                self.emit(body)
            }
            Expr::If { cond, then, alt, .. } => {
                let else_label = self.emit_condition(cond);
                let depth = self.builder.depth();
                let then_kind = self.emit(then);
                let end_label = self.builder.emit_jump();
                self.builder.patch(else_label);
                self.builder.rewind_depth(depth);
                let alt_kind = self.emit(alt);
                self.builder.patch(end_label);
                if specialized && then_kind == alt_kind {
                    then_kind
                } else {
                    Kind::Ref
                }
            }
            Expr::While { cond, body } => {
                self.builder.emit_const(Value::Void);
                let head = self.builder.position();
                let exit = self.emit_condition(cond);
                self.builder.emit(Op::Pop);
                self.emit(body);
                self.builder.emit_jump_back(head);
                self.builder.patch(exit);
                Kind::Ref
            }
            Expr::Block(exprs) => match exprs.split_last() {
                None => {
                    self.builder.emit_const(Value::Void);
                    if specialized { Kind::Void } else { Kind::Ref }
                }
                Some((last, rest)) => {
                    for e in rest {
                        self.emit(e);
                        self.builder.emit(Op::Pop);
                    }
                    self.emit(last)
                }
            },
            Expr::Return(value) => {
                let kind = self.emit(value);
                self.emit_return(kind);
                // Unreachable filler keeping the operand stack shape of an
                // expression position.
                self.builder.emit_const(Value::Void);
                if specialized { Kind::Void } else { Kind::Ref }
            }
            Expr::Call { callee, args, .. } => {
                let vars_mode = match &self.spec {
                    Some((_, vars)) => call_mode(callee, args, vars, self.unit_sigs),
                    None => match &callee.expr {
                        Expr::FreeFunctionRef(id) => CallMode::Dispatch(*id),
                        Expr::Closure(_) => CallMode::Value,
                        _ => unreachable!("call targets are validated by the analyzer"),
                    },
                };
                let argc = u8::try_from(args.len()).expect("arity range");
                match vars_mode {
                    CallMode::Direct(id, param_kinds, ret) => {
                        for (arg, param_kind) in args.iter().zip(&param_kinds) {
                            self.emit(arg);
                            // Square-peg checkpoint: a specialized argument
                            // must carry its declared kind at runtime.
                            if *param_kind != Kind::Ref {
                                self.builder.emit(Op::Require(*param_kind));
                            }
                        }
                        self.builder.emit_call_site(argc, SiteTarget::Specialized(id));
                        ret
                    }
                    CallMode::Dispatch(id) => {
                        for arg in args {
                            self.emit(arg);
                        }
                        self.builder.emit_call_site(argc, SiteTarget::User(id));
                        if specialized {
                            specialized_type(node.observed.get(), node.inferred.get())
                        } else {
                            Kind::Ref
                        }
                    }
                    CallMode::Value => {
                        self.emit(callee);
                        for arg in args {
                            self.emit(arg);
                        }
                        self.builder.emit_call_site(argc, SiteTarget::Value);
                        if specialized {
                            specialized_type(node.observed.get(), node.inferred.get())
                        } else {
                            Kind::Ref
                        }
                    }
                }
            }
            Expr::Prim1 { op, arg } => {
                let arg_kind = self.emit(arg);
                let result = op.emit1(&mut self.builder, arg_kind);
                if specialized { result } else { Kind::Ref }
            }
            Expr::Prim2 { op, lhs, rhs } => {
                let lhs_kind = self.emit(lhs);
                let rhs_kind = self.emit(rhs);
                let result = op.emit2(&mut self.builder, lhs_kind, rhs_kind);
                if specialized { result } else { Kind::Ref }
            }
            Expr::Closure(c) => {
                self.builder.emit_make_closure(c.func, c.captures.clone());
                Kind::Ref
            }
            Expr::FreeFunctionRef(id) => {
                self.builder.emit_make_closure(*id, Vec::new());
                Kind::Ref
            }
            Expr::Lambda(_) => unreachable!("lambdas are extracted before analysis"),
        }
    }
}
