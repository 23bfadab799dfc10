//! `MachineBasicBlock`: a doubly-linked list of `MachineInst`s mirroring
//! `statim_ir::block`'s structure one layer down the pipeline (spec
//! §3.7). Each machine block remembers the SIIR block it was lowered
//! from ("tracks bytecode block origin") so the printer and instruction
//! selection can recover `.LBB<n>` numbering and jump targets without a
//! second side table.

use crate::inst::MachineInstId;
use cranelift_entity::entity_impl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineBlockId(u32);
entity_impl!(MachineBlockId, "mbb");

#[derive(Debug, Clone)]
pub struct MachineBasicBlockData {
    pub(crate) first_inst: Option<MachineInstId>,
    pub(crate) last_inst: Option<MachineInstId>,
    pub(crate) prev: Option<MachineBlockId>,
    pub(crate) next: Option<MachineBlockId>,
    /// The SIIR block this was lowered from.
    pub origin: statim_ir::Block,
}

impl MachineBasicBlockData {
    pub fn new(origin: statim_ir::Block) -> Self {
        Self { first_inst: None, last_inst: None, prev: None, next: None, origin }
    }

    pub fn is_empty(&self) -> bool {
        self.first_inst.is_none()
    }

    pub fn first_inst(&self) -> Option<MachineInstId> {
        self.first_inst
    }
}
