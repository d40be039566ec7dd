//! Builder for emitting instructions during code generation.
//!
//! Handles forward jumps with patching, pools for constants, capture
//! templates and call sites, and operand-stack depth tracking so the VM can
//! preallocate its stack.

use crate::{function::FunctionId, value::Value};

use super::{
    code::{CaptureTemplate, Code},
    op::{CallSiteDesc, CmpOp, Op, SiteTarget},
};

/// A forward jump waiting for its target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JumpLabel(usize);

#[derive(Debug, Default)]
pub(crate) struct CodeBuilder {
    ops: Vec<Op>,
    constants: Vec<Value>,
    closures: Vec<CaptureTemplate>,
    call_sites: Vec<CallSiteDesc>,
    depth: usize,
    max_depth: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust(&mut self, effect: i32) {
        if effect >= 0 {
            self.depth += usize::try_from(effect).expect("stack effect range");
        } else {
            let drop = usize::try_from(-effect).expect("stack effect range");
            debug_assert!(self.depth >= drop, "operand stack underflow during emission");
            self.depth -= drop;
        }
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn effect(&self, op: Op) -> i32 {
        match op {
            Op::Const(_) | Op::Load(_) | Op::Dup | Op::MakeClosure(_) => 1,
            Op::Store(_) | Op::Pop | Op::JumpIfFalse(_) | Op::Ret => -1,
            Op::JumpCmpFalse(..) => -2,
            Op::Prim2(_) | Op::AddInt | Op::SubInt | Op::MulInt | Op::CmpInt(_) => -1,
            Op::Prim1(_) | Op::Jump(_) | Op::Require(_) => 0,
            Op::CallSite(i) => {
                let site = &self.call_sites[i as usize];
                let callee = i32::from(matches!(site.target, SiteTarget::Value));
                1 - i32::from(site.argc) - callee
            }
        }
    }

    /// Emits one instruction and tracks its stack effect.
    pub fn emit(&mut self, op: Op) {
        self.adjust(self.effect(op));
        self.ops.push(op);
    }

    /// Pushes a constant.
    pub fn emit_const(&mut self, value: Value) {
        let index = u16::try_from(self.constants.len()).expect("constant pool overflow");
        self.constants.push(value);
        self.emit(Op::Const(index));
    }

    pub fn emit_make_closure(&mut self, func: FunctionId, capture_slots: Vec<u32>) {
        let index = u16::try_from(self.closures.len()).expect("closure pool overflow");
        self.closures.push(CaptureTemplate { func, capture_slots });
        self.emit(Op::MakeClosure(index));
    }

    pub fn emit_call_site(&mut self, argc: u8, target: SiteTarget) {
        let index = u16::try_from(self.call_sites.len()).expect("call-site pool overflow");
        self.call_sites.push(CallSiteDesc { argc, target });
        self.emit(Op::CallSite(index));
    }

    /// Emits a forward jump to be patched later.
    pub fn emit_jump(&mut self) -> JumpLabel {
        let label = JumpLabel(self.ops.len());
        self.emit(Op::Jump(u32::MAX));
        label
    }

    pub fn emit_jump_if_false(&mut self) -> JumpLabel {
        let label = JumpLabel(self.ops.len());
        self.emit(Op::JumpIfFalse(u32::MAX));
        label
    }

    pub fn emit_jump_cmp_false(&mut self, cmp: CmpOp) -> JumpLabel {
        let label = JumpLabel(self.ops.len());
        self.emit(Op::JumpCmpFalse(cmp, u32::MAX));
        label
    }

    /// Resolves a forward jump to the next instruction.
    pub fn patch(&mut self, label: JumpLabel) {
        let target = u32::try_from(self.ops.len()).expect("code length overflow");
        match &mut self.ops[label.0] {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpCmpFalse(_, t) => *t = target,
            other => unreachable!("patching non-jump instruction {other}"),
        }
    }

    /// The index of the next instruction, for backward jumps.
    pub fn position(&self) -> u32 {
        u32::try_from(self.ops.len()).expect("code length overflow")
    }

    pub fn emit_jump_back(&mut self, to: u32) {
        self.emit(Op::Jump(to));
    }

    /// Current operand-stack depth, used to sanity-check join points.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Rewinds the tracked depth to a branch point so both arms of a
    /// conditional are accounted from the same baseline.
    pub fn rewind_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn build(self) -> Code {
        Code {
            ops: self.ops,
            constants: self.constants,
            closures: self.closures,
            call_sites: self.call_sites,
            max_stack: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn forward_jumps_are_patched_to_the_next_instruction() {
        let mut b = CodeBuilder::new();
        b.emit_const(Value::Bool(true));
        let label = b.emit_jump_if_false();
        b.emit_const(Value::Int(1));
        b.emit(Op::Ret);
        b.patch(label);
        b.emit_const(Value::Int(2));
        b.emit(Op::Ret);
        let code = b.build();
        assert_eq!(code.ops[1], Op::JumpIfFalse(4));
    }

    #[test]
    fn stack_depth_tracks_the_high_water_mark() {
        let mut b = CodeBuilder::new();
        b.emit_const(Value::Int(1));
        b.emit_const(Value::Int(2));
        b.emit(Op::AddInt);
        b.emit(Op::Ret);
        let code = b.build();
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn call_sites_account_for_callee_and_arguments() {
        let mut b = CodeBuilder::new();
        b.emit_const(Value::Int(0)); // stand-in for a callee value
        b.emit_const(Value::Int(1));
        b.emit_const(Value::Int(2));
        b.emit_call_site(2, SiteTarget::Value);
        assert_eq!(b.depth(), 1);
    }
}
