//! Target-independent machine layer: physical/virtual registers,
//! operands, basic blocks and functions one level below SIIR (spec
//! §3.7). `statim_x64` builds the concrete amd64 opcode set and
//! instruction selection on top of the types exported here.

pub mod amd64;
pub mod block;
pub mod function;
pub mod inst;
pub mod operand;
pub mod register;

pub use amd64::Register;
pub use block::{MachineBasicBlockData, MachineBlockId};
pub use function::{FunctionRegisterInfo, FunctionStackInfo, MachineFunction, StackSlot, VRegInfo};
pub use inst::{MachineInst, MachineInstId};
pub use operand::{MachineOperand, RegisterOperand};
pub use register::{MachineRegister, RegisterClass};
