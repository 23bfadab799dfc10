//! x86-64 instruction selection (spec §4.8's table) and the machine
//! textual form (§4.8 "Printer", §6.3) built on top of
//! `statim_machine`'s target-independent register/operand/function
//! model.

pub mod opcode;
pub mod printer;
pub mod select;

pub use opcode::Opcode;
pub use printer::print_module;
pub use select::{InstSelection, MachineModule};
