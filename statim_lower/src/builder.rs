//! A thin cursor over a [`Function`] being built: "current block" plus
//! one emit helper per instruction shape, mirroring the
//! `GenerationContext`/register-counter cursor pattern a hand-written
//! recursive-descent IR generator uses (the allocation counters live in
//! `Function`/`TypeContext` themselves here, so this only tracks position).

use statim_common::Span;
use statim_ir::{Block, Function, Immediate, Inst, Instruction, Opcode, TypeId, Value};

pub struct InstBuilder<'f> {
    func: &'f mut Function,
    cur: Block,
}

impl<'f> InstBuilder<'f> {
    pub fn new(func: &'f mut Function, entry: Block) -> Self {
        Self { func, cur: entry }
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }

    pub fn current_block(&self) -> Block {
        self.cur
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.cur = block;
    }

    pub fn create_block(&mut self) -> Block {
        self.func.create_block()
    }

    pub fn is_terminated(&self) -> bool {
        self.func.terminator(self.cur).is_some()
    }

    fn append(&mut self, inst: Instruction) -> (Inst, Option<Value>) {
        self.func.append_inst(self.cur, inst)
    }

    /// `opcode(operands) -> result`, for every opcode that yields a value.
    pub fn emit(&mut self, opcode: Opcode, operands: &[Value], ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(opcode, self.cur);
        inst.operands = operands.iter().copied().collect();
        inst.ty = Some(ty);
        inst.span = Some(span);
        self.append(inst).1.expect("opcode passed to emit() must have a result")
    }

    /// A constant integer (`ConstInt`) or boolean/char literal, all of
    /// which share the same `Immediate::Int` carrier.
    pub fn const_int(&mut self, value: i64, ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(Opcode::ConstInt, self.cur);
        inst.imm = Some(Immediate::Int(value));
        inst.ty = Some(ty);
        inst.span = Some(span);
        self.append(inst).1.expect("ConstInt has a result")
    }

    pub fn const_float(&mut self, bits: u64, ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(Opcode::ConstFloat, self.cur);
        inst.imm = Some(Immediate::Float(bits));
        inst.ty = Some(ty);
        inst.span = Some(span);
        self.append(inst).1.expect("ConstFloat has a result")
    }

    pub fn const_null(&mut self, ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(Opcode::ConstNull, self.cur);
        inst.ty = Some(ty);
        inst.span = Some(span);
        self.append(inst).1.expect("ConstNull has a result")
    }

    pub fn const_string(&mut self, string_index: u32, ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(Opcode::ConstString, self.cur);
        inst.imm = Some(Immediate::Int(string_index as i64));
        inst.ty = Some(ty);
        inst.span = Some(span);
        self.append(inst).1.expect("ConstString has a result")
    }

    pub fn load(&mut self, addr: Value, ty: TypeId, span: Span) -> Value {
        self.emit(Opcode::Load, &[addr], ty, span)
    }

    /// `STORE(value, address)`, per spec §4.4's operand order.
    pub fn store(&mut self, value: Value, addr: Value, span: Span) {
        let mut inst = Instruction::new(Opcode::Store, self.cur);
        inst.operands = [value, addr].into_iter().collect();
        inst.span = Some(span);
        self.append(inst);
    }

    /// `ACCESS_PTR` into a struct field by constant index.
    pub fn gep_field(&mut self, base: Value, field_index: u32, ptr_ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(Opcode::GetElementPtr, self.cur);
        inst.operands = [base].into_iter().collect();
        inst.imm = Some(Immediate::Int(field_index as i64));
        inst.ty = Some(ptr_ty);
        inst.span = Some(span);
        self.append(inst).1.expect("GetElementPtr has a result")
    }

    /// `ACCESS_PTR` by a runtime index (array subscript / pointer offset).
    pub fn gep_index(&mut self, base: Value, index: Value, ptr_ty: TypeId, span: Span) -> Value {
        self.emit(Opcode::GetElementPtr, &[base, index], ptr_ty, span)
    }

    /// Direct or indirect call; `callee` is a `GlobalRef` value for a
    /// direct call by symbol, or any other pointer-typed value for an
    /// indirect call (spec §4.8's "CALL with symbol/register operand").
    pub fn call(&mut self, callee: Value, args: &[Value], return_ty: TypeId, span: Span) -> Option<Value> {
        let mut inst = Instruction::new(Opcode::Call, self.cur);
        inst.operands = std::iter::once(callee).chain(args.iter().copied()).collect();
        inst.ty = Some(return_ty);
        inst.span = Some(span);
        self.append(inst).1
    }

    pub fn jump(&mut self, target: Block, span: Span) {
        let mut inst = Instruction::new(Opcode::Jump, self.cur);
        inst.targets = [target].into_iter().collect();
        inst.span = Some(span);
        self.append(inst);
        self.func.add_successor(self.cur, target);
    }

    pub fn branch_if(&mut self, cond: Value, if_true: Block, if_false: Block, span: Span) {
        let mut inst = Instruction::new(Opcode::BranchIf, self.cur);
        inst.operands = [cond].into_iter().collect();
        inst.targets = [if_true, if_false].into_iter().collect();
        inst.span = Some(span);
        self.append(inst);
        self.func.add_successor(self.cur, if_true);
        self.func.add_successor(self.cur, if_false);
    }

    pub fn ret(&mut self, value: Option<Value>, span: Span) {
        let mut inst = Instruction::new(Opcode::Ret, self.cur);
        inst.operands = value.into_iter().collect();
        inst.span = Some(span);
        self.append(inst);
    }

    /// A never-reached marker (spec §4.4), emitted at the tail of a
    /// non-void function whose body falls off the end without an
    /// explicit `ret` — `statim_sema` doesn't itself reject such
    /// functions, so lowering closes the block instead of leaving it
    /// without a terminator.
    pub fn unreachable(&mut self, span: Span) {
        let mut inst = Instruction::new(Opcode::Unreachable, self.cur);
        inst.span = Some(span);
        self.append(inst);
    }

    /// A reachable trap. Unlike `unreachable`, nothing in `statim_lower`
    /// currently has a source-level construct that emits this; kept for
    /// parity with the opcode's place in the terminator set.
    pub fn abort(&mut self, span: Span) {
        let mut inst = Instruction::new(Opcode::Abort, self.cur);
        inst.span = Some(span);
        self.append(inst);
    }

    /// `PHI`: `values[i]` arrives from `preds[i]`, per spec §3.3(ii).
    pub fn phi(&mut self, incoming: &[(Value, Block)], ty: TypeId, span: Span) -> Value {
        let mut inst = Instruction::new(Opcode::Phi, self.cur);
        inst.operands = incoming.iter().map(|(v, _)| *v).collect();
        inst.targets = incoming.iter().map(|(_, b)| *b).collect();
        inst.ty = Some(ty);
        inst.span = Some(span);
        self.append(inst).1.expect("Phi has a result")
    }
}
