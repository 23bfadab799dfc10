//! `MachineFunction`: owns machine blocks, the frame layout
//! (`FunctionStackInfo`) and the register bookkeeping
//! (`FunctionRegisterInfo`) spec §3.7 asks for — the last stop before a
//! register allocator (out of scope, §1) and the printer.

use crate::block::{MachineBasicBlockData, MachineBlockId};
use crate::inst::{MachineInst, MachineInstId};
use crate::register::{MachineRegister, RegisterClass};
use cranelift_entity::PrimaryMap;
use hashbrown::HashMap;

/// One stack frame slot: a function local or spilled value given a
/// fixed offset/size/align within the frame. Slots are pushed in
/// allocation order ("ordered frame slots", spec §3.7); `offset` is
/// relative to the frame base (`RBP`) and grows downward (negative) the
/// way a SystemV prologue lays out locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    pub offset: i32,
    pub size: u32,
    pub align: u32,
}

/// Ordered frame slots for one function's stack locals/spills.
#[derive(Debug, Clone, Default)]
pub struct FunctionStackInfo {
    slots: Vec<StackSlot>,
    cursor: i32,
}

impl FunctionStackInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `size` bytes aligned to `align`, growing the frame
    /// downward, and returns the new slot's index and `RBP`-relative
    /// offset.
    pub fn allocate(&mut self, size: u32, align: u32) -> (usize, i32) {
        debug_assert!(align.is_power_of_two());
        self.cursor -= size as i32;
        let rem = self.cursor.rem_euclid(align as i32);
        if rem != 0 {
            self.cursor -= rem;
        }
        let slot = StackSlot { offset: self.cursor, size, align };
        let index = self.slots.len();
        self.slots.push(slot);
        (index, self.cursor)
    }

    pub fn slot(&self, index: usize) -> StackSlot {
        self.slots[index]
    }

    pub fn slots(&self) -> &[StackSlot] {
        &self.slots
    }

    /// Total frame size, aligned to 16 bytes per the SystemV ABI's call
    /// alignment requirement at the point of a `call`.
    pub fn frame_size(&self) -> u32 {
        let raw = (-self.cursor) as u32;
        (raw + 15) & !15
    }
}

/// Per-virtual-register bookkeeping: its class, a `[start, end]`
/// instruction-index live range (left to the absent register allocator
/// to fill precisely; instruction selection seeds `start == end == 0`),
/// and its final physical assignment once allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VRegInfo {
    pub class: RegisterClass,
    pub live_start: u32,
    pub live_end: u32,
    pub assigned: Option<MachineRegister>,
}

/// Maps every virtual register minted by instruction selection back to
/// its class and (eventually) its physical assignment.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegisterInfo {
    vregs: HashMap<u32, VRegInfo>,
    next_virtual: u32,
}

impl FunctionRegisterInfo {
    pub fn new() -> Self {
        Self { vregs: HashMap::new(), next_virtual: 0 }
    }

    /// Mints a fresh virtual register of the given class.
    pub fn create_vreg(&mut self, class: RegisterClass) -> MachineRegister {
        let index = self.next_virtual;
        self.next_virtual += 1;
        let reg = MachineRegister::new(MachineRegister::VIRTUAL_BARRIER + index);
        self.vregs.insert(index, VRegInfo { class, live_start: 0, live_end: 0, assigned: None });
        reg
    }

    pub fn info(&self, reg: MachineRegister) -> Option<&VRegInfo> {
        self.vregs.get(&reg.virtual_index())
    }

    pub fn info_mut(&mut self, reg: MachineRegister) -> Option<&mut VRegInfo> {
        self.vregs.get_mut(&reg.virtual_index())
    }

    pub fn set_assigned(&mut self, reg: MachineRegister, phys: MachineRegister) {
        if let Some(info) = self.vregs.get_mut(&reg.virtual_index()) {
            info.assigned = Some(phys);
        }
    }

    pub fn len(&self) -> usize {
        self.vregs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vregs.is_empty()
    }
}

pub struct MachineFunction {
    pub name: String,
    blocks: PrimaryMap<MachineBlockId, MachineBasicBlockData>,
    first_block: Option<MachineBlockId>,
    last_block: Option<MachineBlockId>,
    insts: PrimaryMap<MachineInstId, MachineInst>,
    origin_to_block: HashMap<statim_ir::Block, MachineBlockId>,
    stack: FunctionStackInfo,
    registers: FunctionRegisterInfo,
}

impl MachineFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: PrimaryMap::new(),
            first_block: None,
            last_block: None,
            insts: PrimaryMap::new(),
            origin_to_block: HashMap::new(),
            stack: FunctionStackInfo::new(),
            registers: FunctionRegisterInfo::new(),
        }
    }

    pub fn stack_info(&self) -> &FunctionStackInfo {
        &self.stack
    }

    pub fn stack_info_mut(&mut self) -> &mut FunctionStackInfo {
        &mut self.stack
    }

    pub fn register_info(&self) -> &FunctionRegisterInfo {
        &self.registers
    }

    pub fn register_info_mut(&mut self) -> &mut FunctionRegisterInfo {
        &mut self.registers
    }

    /// Creates a new machine block corresponding 1:1 with IR block
    /// `origin`, appended at the end of this function's block list.
    pub fn create_block(&mut self, origin: statim_ir::Block) -> MachineBlockId {
        let block = self.blocks.push(MachineBasicBlockData::new(origin));
        if let Some(last) = self.last_block {
            self.blocks[last].next = Some(block);
            self.blocks[block].prev = Some(last);
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
        self.origin_to_block.insert(origin, block);
        block
    }

    pub fn block_for_ir(&self, ir_block: statim_ir::Block) -> Option<MachineBlockId> {
        self.origin_to_block.get(&ir_block).copied()
    }

    /// Creates a machine block for control flow instruction selection
    /// synthesizes mid-lowering (e.g. splitting a block to select
    /// `SELECT`) that has no 1:1 SIIR counterpart of its own. Unlike
    /// [`Self::create_block`], this does not register (or overwrite) an
    /// `origin_to_block` entry, so `block_for_ir(origin)` keeps resolving
    /// to whichever real machine block actually begins that IR block.
    pub fn create_aux_block(&mut self, origin: statim_ir::Block) -> MachineBlockId {
        let block = self.blocks.push(MachineBasicBlockData::new(origin));
        if let Some(last) = self.last_block {
            self.blocks[last].next = Some(block);
            self.blocks[block].prev = Some(last);
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
        block
    }

    pub fn block(&self, id: MachineBlockId) -> &MachineBasicBlockData {
        &self.blocks[id]
    }

    pub fn first_block(&self) -> Option<MachineBlockId> {
        self.first_block
    }

    pub fn next_block(&self, id: MachineBlockId) -> Option<MachineBlockId> {
        self.blocks[id].next
    }

    pub fn blocks(&self) -> impl Iterator<Item = MachineBlockId> + '_ {
        std::iter::successors(self.first_block, move |&b| self.blocks[b].next)
    }

    /// Position of `block` within this function, by walking backward —
    /// the `.LBB<n>` number the printer emits (spec §4.8).
    pub fn block_number(&self, block: MachineBlockId) -> usize {
        let mut n = 0usize;
        let mut cur = block;
        while let Some(prev) = self.blocks[cur].prev {
            cur = prev;
            n += 1;
        }
        n
    }

    pub fn append_inst(&mut self, block: MachineBlockId, mut inst: MachineInst) -> MachineInstId {
        inst.parent = block;
        let id = self.insts.push(inst);
        let prev_tail = self.blocks[block].last_inst;
        self.insts[id].prev = prev_tail;
        if let Some(prev) = prev_tail {
            self.insts[prev].next = Some(id);
        } else {
            self.blocks[block].first_inst = Some(id);
        }
        self.blocks[block].last_inst = Some(id);
        id
    }

    pub fn inst(&self, id: MachineInstId) -> &MachineInst {
        &self.insts[id]
    }

    pub fn insts_in(&self, block: MachineBlockId) -> impl Iterator<Item = MachineInstId> + '_ {
        std::iter::successors(self.blocks[block].first_inst, move |&i| self.insts[i].next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_slots_grow_downward_and_respect_alignment() {
        let mut stack = FunctionStackInfo::new();
        let (_, off1) = stack.allocate(1, 1);
        let (_, off2) = stack.allocate(4, 4);
        assert_eq!(off1, -1);
        assert_eq!(off2 % 4, 0);
        assert!(off2 < off1);
    }

    #[test]
    fn vreg_creation_is_monotonic_and_keeps_its_class() {
        let mut regs = FunctionRegisterInfo::new();
        let a = regs.create_vreg(RegisterClass::GeneralPurpose);
        let b = regs.create_vreg(RegisterClass::FloatingPoint);
        assert_ne!(a, b);
        assert_eq!(regs.info(a).unwrap().class, RegisterClass::GeneralPurpose);
        assert_eq!(regs.info(b).unwrap().class, RegisterClass::FloatingPoint);
    }

    #[test]
    fn blocks_created_for_distinct_ir_blocks_are_findable_by_origin() {
        use cranelift_entity::EntityRef;
        let mut mf = MachineFunction::new("f");
        let ir_b0 = statim_ir::Block::new(0);
        let ir_b1 = statim_ir::Block::new(1);
        let m0 = mf.create_block(ir_b0);
        let m1 = mf.create_block(ir_b1);
        assert_eq!(mf.block_for_ir(ir_b0), Some(m0));
        assert_eq!(mf.block_for_ir(ir_b1), Some(m1));
        assert_eq!(mf.block_number(m1), 1);
    }
}
