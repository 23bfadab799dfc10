//! amd64 physical register set, calling convention tables, and naming —
//! the target-specific half of spec §4.8's "Register model" that is
//! reusable independent of instruction selection itself. Selection and
//! the opcode set live in `statim_x64`; this module is the thing that
//! crate depends on (and the thing `statim_machine` can test in
//! isolation, since it has no opinions about IR opcodes).
//!
//! Grounded on `compiler/include/target/amd64.hpp` /
//! `source/machine/register.hpp` in `original_source/`: `get_class`,
//! `is_callee_saved`, `is_caller_saved` and `to_string` become inherent
//! methods on a plain Rust enum instead of free functions over a C `enum
//! Register : u32`.

use crate::register::{MachineRegister, RegisterClass};

/// Recognized amd64 physical registers (spec §4.8 "Register model").
/// Discriminants start at 1 so every variant maps directly onto the
/// physical namespace of [`MachineRegister`] (`[1, 2^31)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Register {
    Rax = 1,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rsp,
    Rbp,
    Rip,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

/// Every [`Register`] variant in discriminant order, for lookups keyed
/// on `MachineRegister::id()`.
const ALL: [Register; 33] = [
    Register::Rax,
    Register::Rbx,
    Register::Rcx,
    Register::Rdx,
    Register::Rdi,
    Register::Rsi,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
    Register::Rsp,
    Register::Rbp,
    Register::Rip,
    Register::Xmm0,
    Register::Xmm1,
    Register::Xmm2,
    Register::Xmm3,
    Register::Xmm4,
    Register::Xmm5,
    Register::Xmm6,
    Register::Xmm7,
    Register::Xmm8,
    Register::Xmm9,
    Register::Xmm10,
    Register::Xmm11,
    Register::Xmm12,
    Register::Xmm13,
    Register::Xmm14,
    Register::Xmm15,
];

impl Register {
    pub const fn to_machine(self) -> MachineRegister {
        MachineRegister::new(self as u32)
    }

    pub fn from_machine(reg: MachineRegister) -> Option<Register> {
        ALL.iter().copied().find(|&r| r as u32 == reg.id())
    }

    /// §4.8: general-purpose set vs. the `XMM0..XMM15` floating-point set.
    pub fn class(self) -> RegisterClass {
        match self {
            Register::Rax
            | Register::Rbx
            | Register::Rcx
            | Register::Rdx
            | Register::Rdi
            | Register::Rsi
            | Register::R8
            | Register::R9
            | Register::R10
            | Register::R11
            | Register::R12
            | Register::R13
            | Register::R14
            | Register::R15
            | Register::Rsp
            | Register::Rbp
            | Register::Rip => RegisterClass::GeneralPurpose,
            _ => RegisterClass::FloatingPoint,
        }
    }

    /// SystemV convention per SPEC_FULL.md Open Question 1: callee-saved =
    /// `{RBX, R12..R15, RSP, RBP}`.
    pub fn is_callee_saved(self) -> bool {
        matches!(
            self,
            Register::Rbx | Register::R12 | Register::R13 | Register::R14 | Register::R15 | Register::Rsp | Register::Rbp
        )
    }

    /// Everything not callee-saved: `{RAX, RCX, RDX, RDI, RSI, R8..R11,
    /// XMM0..XMM15}`.
    pub fn is_caller_saved(self) -> bool {
        !self.is_callee_saved() && self != Register::Rip
    }

    /// Rendered name for a given subregister bit-width (8/16/32/64 for
    /// GPRs; XMM registers ignore `subreg` since SSE scalar ops always
    /// address the full register).
    pub fn name(self, subreg: u16) -> &'static str {
        match self {
            Register::Rax => gpr_name(["al", "ax", "eax", "rax"], subreg),
            Register::Rbx => gpr_name(["bl", "bx", "ebx", "rbx"], subreg),
            Register::Rcx => gpr_name(["cl", "cx", "ecx", "rcx"], subreg),
            Register::Rdx => gpr_name(["dl", "dx", "edx", "rdx"], subreg),
            Register::Rdi => gpr_name(["dil", "di", "edi", "rdi"], subreg),
            Register::Rsi => gpr_name(["sil", "si", "esi", "rsi"], subreg),
            Register::R8 => gpr_name(["r8b", "r8w", "r8d", "r8"], subreg),
            Register::R9 => gpr_name(["r9b", "r9w", "r9d", "r9"], subreg),
            Register::R10 => gpr_name(["r10b", "r10w", "r10d", "r10"], subreg),
            Register::R11 => gpr_name(["r11b", "r11w", "r11d", "r11"], subreg),
            Register::R12 => gpr_name(["r12b", "r12w", "r12d", "r12"], subreg),
            Register::R13 => gpr_name(["r13b", "r13w", "r13d", "r13"], subreg),
            Register::R14 => gpr_name(["r14b", "r14w", "r14d", "r14"], subreg),
            Register::R15 => gpr_name(["r15b", "r15w", "r15d", "r15"], subreg),
            Register::Rsp => gpr_name(["spl", "sp", "esp", "rsp"], subreg),
            Register::Rbp => gpr_name(["bpl", "bp", "ebp", "rbp"], subreg),
            Register::Rip => "rip",
            Register::Xmm0 => "xmm0",
            Register::Xmm1 => "xmm1",
            Register::Xmm2 => "xmm2",
            Register::Xmm3 => "xmm3",
            Register::Xmm4 => "xmm4",
            Register::Xmm5 => "xmm5",
            Register::Xmm6 => "xmm6",
            Register::Xmm7 => "xmm7",
            Register::Xmm8 => "xmm8",
            Register::Xmm9 => "xmm9",
            Register::Xmm10 => "xmm10",
            Register::Xmm11 => "xmm11",
            Register::Xmm12 => "xmm12",
            Register::Xmm13 => "xmm13",
            Register::Xmm14 => "xmm14",
            Register::Xmm15 => "xmm15",
        }
    }
}

fn gpr_name(widths: [&'static str; 4], subreg: u16) -> &'static str {
    match subreg {
        8 => widths[0],
        16 => widths[1],
        32 => widths[2],
        _ => widths[3], // 64 and "no subreg specified" both mean the full register
    }
}

/// SystemV integer argument registers, in order (§4.8 "the stack/register
/// bookkeeping needed by later passes"; not named explicitly in spec.md's
/// table but required to lower `CALL`/function prologues under the
/// chosen ABI).
pub const INTEGER_ARG_REGISTERS: [Register; 6] =
    [Register::Rdi, Register::Rsi, Register::Rdx, Register::Rcx, Register::R8, Register::R9];

/// SystemV floating-point argument registers, in order.
pub const FLOAT_ARG_REGISTERS: [Register; 8] = [
    Register::Xmm0,
    Register::Xmm1,
    Register::Xmm2,
    Register::Xmm3,
    Register::Xmm4,
    Register::Xmm5,
    Register::Xmm6,
    Register::Xmm7,
];

pub const RETURN_INTEGER_REGISTER: Register = Register::Rax;
pub const RETURN_FLOAT_REGISTER: Register = Register::Xmm0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callee_and_caller_saved_partition_the_gpr_and_xmm_sets() {
        assert!(Register::Rbx.is_callee_saved());
        assert!(!Register::Rbx.is_caller_saved());
        assert!(Register::Rax.is_caller_saved());
        assert!(!Register::Rax.is_callee_saved());
        assert!(Register::Xmm3.is_caller_saved());
    }

    #[test]
    fn subregister_names_follow_width() {
        assert_eq!(Register::Rax.name(8), "al");
        assert_eq!(Register::Rax.name(32), "eax");
        assert_eq!(Register::Rax.name(64), "rax");
        assert_eq!(Register::R12.name(32), "r12d");
    }

    #[test]
    fn machine_register_round_trips_through_the_physical_namespace() {
        let mr = Register::R9.to_machine();
        assert!(mr.is_physical());
        assert_eq!(Register::from_machine(mr), Some(Register::R9));
    }

    #[test]
    fn class_partitions_gpr_from_xmm() {
        assert_eq!(Register::Rdi.class(), RegisterClass::GeneralPurpose);
        assert_eq!(Register::Xmm0.class(), RegisterClass::FloatingPoint);
    }
}
