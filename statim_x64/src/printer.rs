//! The machine textual form of spec §4.8 "Printer" / §6.3: a
//! deterministic dump of a [`MachineModule`], used the same way
//! `statim_ir::printer` is used for SIIR — a greppable debugging aid,
//! not a format anything re-parses.

use crate::select::MachineModule;
use statim_machine::amd64::Register;
use statim_machine::{MachineFunction, MachineOperand};
use statim_ir::{Arch, Target};
use std::fmt::Write as _;

pub fn print_module(module: &MachineModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "MACHINE CODE {}", arch_name(module.target));
    for func in &module.functions {
        print_function(&mut out, func);
        out.push('\n');
    }
    out
}

fn arch_name(target: Target) -> &'static str {
    match target.arch {
        Arch::X64 => "x86-64",
    }
}

fn print_function(out: &mut String, mf: &MachineFunction) {
    let _ = writeln!(out, "{}:", mf.name);
    for block in mf.blocks() {
        let _ = writeln!(out, ".LBB{}:", mf.block_number(block));
        for inst in mf.insts_in(block) {
            print_inst(out, mf, mf.inst(inst));
        }
    }
}

fn print_inst(out: &mut String, mf: &MachineFunction, inst: &statim_machine::MachineInst) {
    let op = crate::opcode::Opcode::from_u32(inst.opcode);
    let (explicit, implicit): (Vec<_>, Vec<_>) = inst.operands.iter().partition(|o| !matches!(o.as_reg(), Some(r) if r.is_implicit));

    let _ = write!(out, "{}", op.mnemonic());
    if !explicit.is_empty() {
        out.push_str("    ");
        for (i, operand) in explicit.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&operand_text(mf, operand));
        }
    }
    if !implicit.is_empty() {
        out.push_str("    ... ");
        for (i, operand) in implicit.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&operand_text(mf, operand));
        }
    }
    out.push('\n');
}

fn operand_text(mf: &MachineFunction, operand: &MachineOperand) -> String {
    match operand {
        MachineOperand::Register(r) => {
            if r.reg.is_physical() {
                let phys = Register::from_machine(r.reg).expect("physical register id must map to a known amd64 register");
                let subreg = if r.subreg == 0 { 64 } else { r.subreg };
                format!("%{}", phys.name(subreg))
            } else {
                format!("v{}:{}", r.reg.virtual_index(), r.subreg)
            }
        }
        MachineOperand::Memory { base, disp } => format!("[{}{:+}]", register_name(*base), disp),
        MachineOperand::Immediate(v) => format!("${}", v),
        MachineOperand::Block(b) => format!(".LBB{}", mf.block_number(*b)),
        MachineOperand::Symbol(name) => name.clone(),
    }
}

fn register_name(reg: statim_machine::MachineRegister) -> String {
    if reg.is_physical() {
        Register::from_machine(reg).expect("physical register id must map to a known amd64 register").name(64).to_string()
    } else {
        format!("v{}", reg.virtual_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode as X64;
    use smallvec::smallvec;
    use statim_ir::Block as IrBlock;
    use statim_machine::{MachineInst, MachineRegister, RegisterClass};

    #[test]
    fn prints_header_label_and_one_instruction() {
        let mut mf = MachineFunction::new("identity");
        let entry = mf.create_block(IrBlock::new(0));
        let vreg = mf.register_info_mut().create_vreg(RegisterClass::GeneralPurpose);
        let phys = Register::Rax.to_machine();
        let inst = MachineInst::with_operands(
            X64::Mov32.to_u32(),
            entry,
            smallvec![MachineOperand::reg(vreg, 32, true), MachineOperand::reg(phys, 32, false)],
        );
        mf.append_inst(entry, inst);

        let module = MachineModule { target: Target::x64_linux(), functions: vec![mf] };
        let text = print_module(&module);
        assert!(text.starts_with("MACHINE CODE x86-64\n"));
        assert!(text.contains("identity:\n"));
        assert!(text.contains(".LBB0:\n"));
        assert!(text.contains("MOV32    v0:32, %eax\n"));
    }

    #[test]
    fn implicit_operands_follow_the_ellipsis_separator() {
        let mut mf = MachineFunction::new("f");
        let entry = mf.create_block(IrBlock::new(0));
        let inst = MachineInst::with_operands(
            X64::Cqo.to_u32(),
            entry,
            smallvec![MachineOperand::implicit_reg(Register::Rax.to_machine(), false), MachineOperand::implicit_reg(Register::Rdx.to_machine(), true)],
        );
        mf.append_inst(entry, inst);

        let module = MachineModule { target: Target::x64_linux(), functions: vec![mf] };
        let text = print_module(&module);
        assert!(text.contains("CQO    ... %rax, %rdx\n"));
    }

    #[test]
    fn formats_memory_and_immediate_operands() {
        let mut mf = MachineFunction::new("f");
        let entry = mf.create_block(IrBlock::new(0));
        let dst = mf.register_info_mut().create_vreg(RegisterClass::GeneralPurpose);
        let inst = MachineInst::with_operands(
            X64::Mov64.to_u32(),
            entry,
            smallvec![MachineOperand::reg(dst, 64, true), MachineOperand::memory(Register::Rbp.to_machine(), -8)],
        );
        mf.append_inst(entry, inst);
        let inst2 = MachineInst::with_operands(X64::Add64.to_u32(), entry, smallvec![MachineOperand::reg(dst, 64, true), MachineOperand::imm(1)]);
        mf.append_inst(entry, inst2);

        let module = MachineModule { target: Target::x64_linux(), functions: vec![mf] };
        let text = print_module(&module);
        assert!(text.contains("MOV64    v0:64, [rbp-8]\n"));
        assert!(text.contains("ADD64    v0:64, $1\n"));
    }
}
