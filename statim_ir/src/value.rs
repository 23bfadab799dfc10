//! SSA values and their use-edges (spec §4.3).
//!
//! The spec describes an LLVm-style intrusive `Value`/`Use`/`User` graph
//! where a `Use` is a node threaded into its value's use-list by its own
//! constructor and unthreaded by its destructor. Design Notes §9 sanctions
//! an arena-with-index-handles alternative for exactly this shape; we take
//! it. A [`Value`] is a `cranelift_entity` handle into a `Function`'s
//! value arena, and each `Function` keeps an explicit `uses` side-table
//! (`Value -> Vec<Use>`) that `add_use`/`del_use`/`replace_all_uses_with`
//! maintain by hand instead of relying on ctor/dtor registration.

use crate::instruction::Inst;
use crate::types::TypeId;
use cranelift_entity::entity_impl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u32);
entity_impl!(LocalId, "local");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(u32);
entity_impl!(GlobalId, "global");

/// What a `Value` denotes. Every value carries a `TypeId` alongside its
/// data (kept in `ValueRecord`, not here) so type lookups never need to
/// walk the defining instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueData {
    /// The (single) result of an instruction within the same function.
    InstResult(Inst),
    /// The `index`-th incoming argument of the function.
    Arg(u32),
    /// The address of a stack-allocated local.
    Local(LocalId),
    /// The address of a module-level global.
    GlobalRef(GlobalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRecord {
    pub data: ValueData,
    pub ty: TypeId,
}

/// One use-edge: `user` consumes `value` as its `operand_index`-th
/// operand. Stored in the using value's use-list; `user`/`operand_index`
/// together identify exactly which operand slot to patch during RAUW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    pub value: Value,
    pub user: Inst,
    pub operand_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_ids_are_distinct() {
        let a = Value::from_u32(0);
        let b = Value::from_u32(1);
        assert_ne!(a, b);
    }
}
