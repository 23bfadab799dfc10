//! `MachineInst`: a target-independent envelope around an opcode and its
//! operand list (spec §3.7). The opcode itself is a bare `u32` here —
//! `statim_machine` knows nothing about what opcodes an actual target
//! defines; `statim_x64::Opcode` (and its `From`/`Into<u32>` conversion)
//! is the only crate that interprets the value. This mirrors
//! `original_source/compiler/include/machine/inst.hpp`'s own `u32
//! m_opcode` field, which the amd64 target casts to/from its own enum.

use crate::block::MachineBlockId;
use crate::operand::MachineOperand;
use cranelift_entity::entity_impl;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineInstId(u32);
entity_impl!(MachineInstId, "minst");

#[derive(Debug, Clone)]
pub struct MachineInst {
    pub opcode: u32,
    pub operands: SmallVec<[MachineOperand; 4]>,
    pub(crate) parent: MachineBlockId,
    pub(crate) prev: Option<MachineInstId>,
    pub(crate) next: Option<MachineInstId>,
}

impl MachineInst {
    pub fn new(opcode: u32, parent: MachineBlockId) -> Self {
        Self { opcode, operands: SmallVec::new(), parent, prev: None, next: None }
    }

    pub fn with_operands(opcode: u32, parent: MachineBlockId, operands: impl IntoIterator<Item = MachineOperand>) -> Self {
        Self { opcode, operands: operands.into_iter().collect(), parent, prev: None, next: None }
    }

    pub fn parent(&self) -> MachineBlockId {
        self.parent
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn operand(&self, idx: usize) -> &MachineOperand {
        &self.operands[idx]
    }

    /// Explicit def operands only (register operands with `is_def` and
    /// not `is_implicit`).
    pub fn defs(&self) -> impl Iterator<Item = &MachineOperand> {
        self.operands.iter().filter(|op| matches!(op.as_reg(), Some(r) if r.is_def && !r.is_implicit))
    }

    /// Explicit use operands only.
    pub fn uses(&self) -> impl Iterator<Item = &MachineOperand> {
        self.operands.iter().filter(|op| matches!(op.as_reg(), Some(r) if !r.is_def && !r.is_implicit))
    }

    pub fn all_defs(&self) -> impl Iterator<Item = &MachineOperand> {
        self.operands.iter().filter(|op| matches!(op.as_reg(), Some(r) if r.is_def))
    }

    pub fn all_uses(&self) -> impl Iterator<Item = &MachineOperand> {
        self.operands.iter().filter(|op| matches!(op.as_reg(), Some(r) if !r.is_def))
    }

    pub fn num_defs(&self) -> usize {
        self.defs().count()
    }

    pub fn num_implicit_operands(&self) -> usize {
        self.operands.iter().filter(|op| matches!(op.as_reg(), Some(r) if r.is_implicit)).count()
    }

    pub fn num_explicit_operands(&self) -> usize {
        self.num_operands() - self.num_implicit_operands()
    }

    pub fn num_implicit_defs(&self) -> usize {
        self.operands.iter().filter(|op| matches!(op.as_reg(), Some(r) if r.is_def && r.is_implicit)).count()
    }

    pub fn num_explicit_defs(&self) -> usize {
        self.num_defs()
    }

    pub fn has_implicit_def(&self) -> bool {
        self.num_implicit_defs() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::MachineRegister;

    #[test]
    fn def_use_counts_separate_implicit_from_explicit() {
        let parent = MachineBlockId::from_u32(0);
        let mut inst = MachineInst::new(0, parent);
        inst.operands.push(MachineOperand::reg(MachineRegister::new(1), 32, true));
        inst.operands.push(MachineOperand::reg(MachineRegister::new(2), 32, false));
        inst.operands.push(MachineOperand::implicit_reg(MachineRegister::new(3), true));

        assert_eq!(inst.num_defs(), 1);
        assert_eq!(inst.num_implicit_operands(), 1);
        assert_eq!(inst.num_explicit_operands(), 2);
        assert!(inst.has_implicit_def());
    }
}
