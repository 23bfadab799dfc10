//! A function body: its blocks, instructions, values and the use-edges
//! between them (spec §4.3/§4.5/§4.6).
//!
//! `Function` is the unit of ownership the spec's Value/Use graph is
//! scoped to — block, instruction and value ids are only meaningful
//! relative to the `Function` that minted them. A `Cfg` (module.rs) owns
//! a set of `Function`s plus the shared `TypeContext` and globals.

use crate::block::BasicBlockData;
use crate::instruction::{Block, Inst, Instruction, Opcode};
use crate::types::TypeId;
use crate::value::{GlobalId, LocalId, Use, Value, ValueData, ValueRecord};
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use statim_common::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(u32);
entity_impl!(FuncId, "func");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Defined in this translation unit and visible to others.
    Export,
    /// Defined here, not visible outside this module.
    Local,
    /// Declared `external`: no body, resolved at link time.
    Import,
}

#[derive(Debug, Clone)]
pub struct LocalData {
    pub name: String,
    pub ty: TypeId,
}

pub struct Function {
    pub name: String,
    pub params: Vec<TypeId>,
    pub return_ty: TypeId,
    pub linkage: Linkage,
    /// Set by `statim_lower` when the declaration carries a `$inline` rune
    /// (SPEC_FULL.md Open Question 3). A hint only: nothing in this crate
    /// or `statim_x64` inlines call sites on it.
    pub inline_hint: bool,

    blocks: PrimaryMap<Block, BasicBlockData>,
    first_block: Option<Block>,
    last_block: Option<Block>,

    insts: PrimaryMap<Inst, Instruction>,

    values: PrimaryMap<Value, ValueRecord>,
    uses: SecondaryMap<Value, Vec<Use>>,

    /// `None` entries are removed locals; `cranelift_entity::PrimaryMap`
    /// is append-only, so `remove_local` tombstones the slot instead of
    /// shrinking the arena (keeps every previously-minted `LocalId` valid
    /// to index with, matching the "never leak/invalidate other nodes"
    /// discipline of §4.5).
    locals: PrimaryMap<LocalId, Option<LocalData>>,

    arg_values: Vec<Value>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<TypeId>, return_ty: TypeId, linkage: Linkage) -> Self {
        let mut values = PrimaryMap::new();
        let mut arg_values = Vec::with_capacity(params.len());
        for (i, &ty) in params.iter().enumerate() {
            let v = values.push(ValueRecord { data: ValueData::Arg(i as u32), ty });
            arg_values.push(v);
        }
        Self {
            name: name.into(),
            params,
            return_ty,
            linkage,
            inline_hint: false,
            blocks: PrimaryMap::new(),
            first_block: None,
            last_block: None,
            insts: PrimaryMap::new(),
            values,
            uses: SecondaryMap::new(),
            locals: PrimaryMap::new(),
            arg_values,
        }
    }

    pub fn arg(&self, index: usize) -> Value {
        self.arg_values[index]
    }

    pub fn args(&self) -> &[Value] {
        &self.arg_values
    }

    /// Rebinds the `index`-th argument to a different `Value` (e.g. after
    /// an argument-promotion transform). Does not touch existing uses of
    /// the old argument value; callers that need that should
    /// `replace_all_uses_with` first.
    pub fn set_arg(&mut self, index: usize, value: Value) {
        self.arg_values[index] = value;
    }

    // -- blocks -----------------------------------------------------------

    pub fn create_block(&mut self) -> Block {
        let block = self.blocks.push(BasicBlockData::default());
        if let Some(last) = self.last_block {
            self.blocks[last].next = Some(block);
            self.blocks[block].prev = Some(last);
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
        block
    }

    pub fn block(&self, block: Block) -> &BasicBlockData {
        &self.blocks[block]
    }

    pub fn first_block(&self) -> Option<Block> {
        self.first_block
    }

    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        std::iter::successors(self.first_block, move |&b| self.blocks[b].next)
    }

    pub fn add_successor(&mut self, from: Block, to: Block) {
        self.blocks[from].successors.push(to);
        self.blocks[to].predecessors.push(from);
    }

    /// Position of `block` within this function, counted by walking
    /// backward from it to the entry block (spec §4.5 `get_number`).
    pub fn block_number(&self, block: Block) -> usize {
        let mut n = 0usize;
        let mut cur = block;
        while let Some(prev) = self.blocks[cur].prev {
            cur = prev;
            n += 1;
        }
        n
    }

    // -- locals -------------------------------------------------------------

    /// Adds a stack-named local. Fails with `DuplicateLocal` if `name` is
    /// already taken in this function (spec §4.5).
    pub fn add_local(&mut self, name: impl Into<String>, ty: TypeId) -> Result<LocalId, CompileError> {
        let name = name.into();
        if self.locals.values().flatten().any(|l| l.name == name) {
            return Err(CompileError::DuplicateLocal { name, function: self.name.clone() });
        }
        Ok(self.locals.push(Some(LocalData { name, ty })))
    }

    /// Removes a local by id, freeing its name for reuse. Any `Value`
    /// still referring to it (`ValueData::Local`) becomes a dangling
    /// reference the caller is responsible for not dereferencing further
    /// — callers only remove locals with no remaining references.
    pub fn remove_local(&mut self, id: LocalId) {
        self.locals[id] = None;
    }

    pub fn local(&self, id: LocalId) -> &LocalData {
        self.locals[id].as_ref().expect("local already removed")
    }

    pub fn locals(&self) -> impl Iterator<Item = (LocalId, &LocalData)> {
        self.locals.iter().filter_map(|(id, data)| data.as_ref().map(|d| (id, d)))
    }

    // -- values -------------------------------------------------------------

    fn create_value(&mut self, data: ValueData, ty: TypeId) -> Value {
        self.values.push(ValueRecord { data, ty })
    }

    pub fn value_ty(&self, value: Value) -> TypeId {
        self.values[value].ty
    }

    pub fn value_data(&self, value: Value) -> ValueData {
        self.values[value].data
    }

    pub fn local_ref(&mut self, local: LocalId, pointer_ty: TypeId) -> Value {
        self.create_value(ValueData::Local(local), pointer_ty)
    }

    pub fn global_ref(&mut self, global: GlobalId, pointer_ty: TypeId) -> Value {
        self.create_value(ValueData::GlobalRef(global), pointer_ty)
    }

    /// Every use-edge pointing at `value`, in no particular order.
    pub fn uses_of(&self, value: Value) -> &[Use] {
        &self.uses[value]
    }

    pub fn is_unused(&self, value: Value) -> bool {
        self.uses[value].is_empty()
    }

    fn add_use(&mut self, value: Value, user: Inst, operand_index: u32) {
        self.uses[value].push(Use { value, user, operand_index });
    }

    fn del_use(&mut self, value: Value, user: Inst, operand_index: u32) {
        if let Some(pos) = self.uses[value]
            .iter()
            .position(|u| u.user == user && u.operand_index == operand_index)
        {
            self.uses[value].swap_remove(pos);
        }
    }

    /// Redirects every current use of `old` to `new`, per spec §4.3's
    /// `replace_all_uses_with`. Takes a snapshot of `old`'s use-list
    /// before mutating so that patching an operand (which itself calls
    /// `add_use`/`del_use`) can never walk a list it is concurrently
    /// rewriting.
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }
        let snapshot: Vec<Use> = self.uses[old].clone();
        for u in snapshot {
            let operands = &mut self.insts[u.user].operands;
            if let Some(slot) = operands.get_mut(u.operand_index as usize) {
                *slot = new;
            }
            self.del_use(old, u.user, u.operand_index);
            self.add_use(new, u.user, u.operand_index);
        }
    }

    // -- instructions -------------------------------------------------------

    /// Appends `inst` to the end of `block`, wiring use-edges for every
    /// operand currently on it. Returns the new instruction's id and, if
    /// `opcode.has_result()`, its result value.
    pub fn append_inst(&mut self, block: Block, mut inst: Instruction) -> (Inst, Option<Value>) {
        inst.parent = block;
        let has_result = inst.opcode.has_result();
        let result_ty = inst.ty;
        let operands = inst.operands.clone();

        let id = self.insts.push(inst);

        for (i, operand) in operands.iter().enumerate() {
            self.add_use(*operand, id, i as u32);
        }

        let prev_tail = self.blocks[block].last_inst;
        self.insts[id].prev = prev_tail;
        if let Some(prev) = prev_tail {
            self.insts[prev].next = Some(id);
        } else {
            self.blocks[block].first_inst = Some(id);
        }
        self.blocks[block].last_inst = Some(id);

        let result = if has_result {
            let ty = result_ty.unwrap_or_else(|| panic!("instruction with a result must carry a TypeId"));
            let value = self.create_value(ValueData::InstResult(id), ty);
            self.insts[id].result = Some(value);
            Some(value)
        } else {
            None
        };

        (id, result)
    }

    pub fn inst(&self, inst: Inst) -> &Instruction {
        &self.insts[inst]
    }

    pub fn insts_in(&self, block: Block) -> impl Iterator<Item = Inst> + '_ {
        std::iter::successors(self.blocks[block].first_inst, move |&i| self.insts[i].next)
    }

    pub fn terminator(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.filter(|&i| self.insts[i].opcode.is_terminator())
    }

    /// Detaches `inst` from its block's instruction list and drops the
    /// use-edges its operands held. Does not reclaim the `Inst` id (the
    /// arena never shrinks) and does not check whether `inst` itself still
    /// has uses — callers (the DCE pass) are expected to check
    /// `is_unused` on its result first.
    pub fn remove_inst(&mut self, inst: Inst) -> Result<(), CompileError> {
        let block = self.insts[inst].parent;
        let prev = self.insts[inst].prev;
        let next = self.insts[inst].next;

        match prev {
            Some(p) => self.insts[p].next = next,
            None => self.blocks[block].first_inst = next,
        }
        match next {
            Some(n) => self.insts[n].prev = prev,
            None => self.blocks[block].last_inst = prev,
        }

        let operands = self.insts[inst].operands.clone();
        for (i, operand) in operands.iter().enumerate() {
            self.del_use(*operand, inst, i as u32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeContext;

    fn func() -> (TypeContext, Function) {
        let mut types = TypeContext::new();
        let i32_ty = types.int32();
        (types, Function::new("f", vec![], i32_ty, Linkage::Local))
    }

    #[test]
    fn duplicate_local_name_is_rejected() {
        let (types, mut func) = func();
        let i32_ty = types.int32();
        func.add_local("x", i32_ty).unwrap();
        let err = func.add_local("x", i32_ty).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateLocal { .. }));
    }

    #[test]
    fn removed_local_name_can_be_reused() {
        let (types, mut func) = func();
        let i32_ty = types.int32();
        let x = func.add_local("x", i32_ty).unwrap();
        func.remove_local(x);
        assert!(func.add_local("x", i32_ty).is_ok());
    }

    #[test]
    fn block_number_counts_position_from_entry() {
        let (_, mut func) = func();
        let b0 = func.create_block();
        let b1 = func.create_block();
        let b2 = func.create_block();
        assert_eq!(func.block_number(b0), 0);
        assert_eq!(func.block_number(b1), 1);
        assert_eq!(func.block_number(b2), 2);
    }
}
