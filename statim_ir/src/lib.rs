//! SIIR: the linear, typed, use-edge SSA intermediate representation at
//! the core of statim (spec §4). A [`module::Cfg`] owns every
//! [`function::Function`], global and the shared [`types::TypeContext`];
//! a `Function` owns its own blocks, instructions and values.
//!
//! Pass order on a freshly-lowered `Cfg` is [`dce::run_trivial_dce`] before
//! instruction selection (spec §5) — selection does not itself simplify,
//! so anything left dead at that point would otherwise reach the machine
//! layer.

pub mod block;
pub mod dce;
pub mod function;
pub mod instruction;
pub mod module;
pub mod printer;
pub mod target;
pub mod types;
pub mod value;
pub mod verify;

pub use block::BasicBlockData;
pub use function::{FuncId, Function, Linkage, LocalData};
pub use instruction::{Block, Immediate, Inst, Instruction, Opcode};
pub use module::{Cfg, GlobalData};
pub use target::{Abi, Arch, Layout, LayoutOracle, Os, Target};
pub use types::{ScopeHandle, TypeContext, TypeId, TypeView};
pub use value::{GlobalId, LocalId, Use, Value, ValueData};
