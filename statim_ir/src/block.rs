//! Basic blocks: a doubly-linked instruction list plus the CFG edges that
//! hang off it (spec §4.5). Linkage is first/last + prev/next index
//! fields rather than raw pointers, per Design Notes §9 — the same
//! arena-handle substitution used for the instruction and value graphs.

use crate::instruction::{Block, Inst};
use smallvec::SmallVec;

#[derive(Debug, Clone, Default)]
pub struct BasicBlockData {
    pub(crate) first_inst: Option<Inst>,
    pub(crate) last_inst: Option<Inst>,
    pub(crate) prev: Option<Block>,
    pub(crate) next: Option<Block>,
    pub predecessors: SmallVec<[Block; 4]>,
    pub successors: SmallVec<[Block; 2]>,
}

impl BasicBlockData {
    pub fn is_empty(&self) -> bool {
        self.first_inst.is_none()
    }

    pub fn first_inst(&self) -> Option<Inst> {
        self.first_inst
    }

    pub fn last_inst(&self) -> Option<Inst> {
        self.last_inst
    }
}
