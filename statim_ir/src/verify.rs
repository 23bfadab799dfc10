//! The IR verifier: structural error checks from spec §4.9/§8.
//!
//! These are compiler bugs, not user diagnostics — a well-formed lowering
//! pass never produces any of these, so the checks return
//! `statim_common::CompileError` for a caller to `.unwrap()`/`expect()` or
//! propagate into a panic, rather than a `Diagnostic`.
//!
//! `statim_lower` never emits PHI (locals lower to alloca+load/store
//! instead, see SPEC_FULL.md), but the opcode is part of the closed set
//! of spec §4.4, so the PHI-shaped checks below exist independent of
//! whether the current lowering happens to produce one.

use crate::function::{FuncId, Function};
use crate::instruction::Opcode;
use crate::module::Cfg;
use hashbrown::HashSet;
use statim_common::CompileError;

pub fn verify_cfg(cfg: &Cfg) -> Result<(), CompileError> {
    for (id, _) in cfg.functions() {
        verify_function(id, cfg.function(id))?;
    }
    Ok(())
}

pub fn verify_function(id: FuncId, func: &Function) -> Result<(), CompileError> {
    let _ = id;
    for block in func.blocks() {
        let mut terminators = 0usize;
        let mut seen_non_phi = false;
        for inst in func.insts_in(block) {
            let data = func.inst(inst);
            if data.opcode.is_terminator() {
                terminators += 1;
            }
            if data.opcode == Opcode::Phi {
                if seen_non_phi {
                    return Err(CompileError::PhiPredecessorMismatch {
                        block: format!("{:?}", block),
                        pred: "<phi after non-phi instruction>".to_string(),
                    });
                }
                if data.operands.is_empty() {
                    return Err(CompileError::PhiPredecessorMismatch {
                        block: format!("{:?}", block),
                        pred: "<no operands>".to_string(),
                    });
                }
                for &pred in &data.targets {
                    if !func.block(block).predecessors.contains(&pred) {
                        return Err(CompileError::PhiPredecessorMismatch {
                            block: format!("{:?}", block),
                            pred: format!("{:?}", pred),
                        });
                    }
                }
            } else {
                seen_non_phi = true;
            }
        }
        if terminators > 1 {
            return Err(CompileError::MultipleTerminators { block: format!("{:?}", block) });
        }
    }

    let mut seen_results = HashSet::new();
    for block in func.blocks() {
        for inst in func.insts_in(block) {
            if let Some(result) = func.inst(inst).result {
                if !seen_results.insert(result) {
                    return Err(CompileError::ResultIdReuse {
                        id: format!("{:?}", result),
                        function: format!("{:?}", id),
                    });
                }
            }
            for &operand in &func.inst(inst).operands {
                if !seen_results.contains(&operand) && !is_non_inst_value(func, operand) {
                    return Err(CompileError::DanglingUse {
                        value: format!("{:?}", operand),
                        user: format!("{:?}", inst),
                    });
                }
            }
        }
    }
    Ok(())
}

fn is_non_inst_value(func: &Function, value: crate::value::Value) -> bool {
    !matches!(func.value_data(value), crate::value::ValueData::InstResult(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Linkage;
    use crate::instruction::{Instruction, Opcode};
    use crate::module::Cfg;

    #[test]
    fn a_block_with_a_single_terminator_verifies() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("f", vec![], i32_ty, Linkage::Local);
        let func = cfg.function_mut(id);
        let entry = func.create_block();
        let mut ret = Instruction::new(Opcode::Ret, entry);
        ret.ty = None;
        func.append_inst(entry, ret);
        assert!(verify_function(id, cfg.function(id)).is_ok());
    }

    #[test]
    fn two_terminators_in_one_block_is_rejected() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("f", vec![], i32_ty, Linkage::Local);
        let func = cfg.function_mut(id);
        let entry = func.create_block();
        func.append_inst(entry, Instruction::new(Opcode::Ret, entry));
        func.append_inst(entry, Instruction::new(Opcode::Unreachable, entry));
        let err = verify_function(id, cfg.function(id)).unwrap_err();
        assert!(matches!(err, CompileError::MultipleTerminators { .. }));
    }

    #[test]
    fn phi_with_zero_operands_is_rejected() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("f", vec![], i32_ty, Linkage::Local);
        let func = cfg.function_mut(id);
        let entry = func.create_block();
        let mut phi = Instruction::new(Opcode::Phi, entry);
        phi.ty = Some(i32_ty);
        func.append_inst(entry, phi);
        func.append_inst(entry, Instruction::new(Opcode::Unreachable, entry));
        let err = verify_function(id, cfg.function(id)).unwrap_err();
        assert!(matches!(err, CompileError::PhiPredecessorMismatch { .. }));
    }

    #[test]
    fn phi_referencing_a_non_predecessor_is_rejected() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("f", vec![], i32_ty, Linkage::Local);
        let func = cfg.function_mut(id);
        let entry = func.create_block();
        let other = func.create_block();

        let mut c = Instruction::new(Opcode::ConstInt, other);
        c.imm = Some(crate::instruction::Immediate::Int(1));
        c.ty = Some(i32_ty);
        let (_, v) = func.append_inst(other, c);

        let mut phi = Instruction::new(Opcode::Phi, entry);
        phi.ty = Some(i32_ty);
        phi.operands.push(v.unwrap());
        phi.targets.push(other); // `other` is not a predecessor of `entry`
        func.append_inst(entry, phi);
        func.append_inst(entry, Instruction::new(Opcode::Unreachable, entry));

        let err = verify_function(id, cfg.function(id)).unwrap_err();
        assert!(matches!(err, CompileError::PhiPredecessorMismatch { .. }));
    }
}
