//! Trivial dead code elimination (spec §5 step 1, §8 worked example): an
//! instruction whose result has no uses and which has no side effects can
//! be deleted. Runs to a fixed point within one function so that deleting
//! an instruction can make its own operands dead in turn, and is
//! idempotent — a second call over an already-clean function removes
//! nothing.

use crate::function::Function;

/// Returns the number of instructions removed.
pub fn run_trivial_dce(func: &mut Function) -> usize {
    let mut removed = 0;
    loop {
        let dead: Vec<_> = func
            .blocks()
            .flat_map(|block| func.insts_in(block).collect::<Vec<_>>())
            .filter(|&inst| {
                let data = func.inst(inst);
                data.opcode.is_trivially_dead_eligible()
                    && data.result.is_some_and(|v| func.is_unused(v))
            })
            .collect();
        if dead.is_empty() {
            break;
        }
        for inst in dead {
            func.remove_inst(inst).expect("dce only removes verified-dead instructions");
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Linkage;
    use crate::instruction::Instruction;
    use crate::module::Cfg;

    #[test]
    fn dead_arithmetic_is_removed_and_its_now_dead_operand_follows() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("f", vec![], i32_ty, Linkage::Local);
        let func = cfg.function_mut(id);
        let entry = func.create_block();

        let mut c1 = Instruction::new(Opcode::ConstInt, entry);
        c1.imm = Some(crate::instruction::Immediate::Int(1));
        c1.ty = Some(i32_ty);
        let (_, v1) = func.append_inst(entry, c1);

        let mut c2 = Instruction::new(Opcode::ConstInt, entry);
        c2.imm = Some(crate::instruction::Immediate::Int(2));
        c2.ty = Some(i32_ty);
        let (_, v2) = func.append_inst(entry, c2);

        let mut add = Instruction::new(Opcode::IAdd, entry);
        add.operands.push(v1.unwrap());
        add.operands.push(v2.unwrap());
        add.ty = Some(i32_ty);
        func.append_inst(entry, add); // result is never used

        func.append_inst(entry, Instruction::new(Opcode::Ret, entry));

        let removed = run_trivial_dce(func);
        assert_eq!(removed, 3); // c1, c2, add all become dead together

        let remaining: Vec<_> = func.insts_in(entry).collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(func.inst(remaining[0]).opcode, Opcode::Ret);
    }

    #[test]
    fn dce_is_idempotent() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("f", vec![], i32_ty, Linkage::Local);
        let func = cfg.function_mut(id);
        let entry = func.create_block();
        func.append_inst(entry, Instruction::new(Opcode::Ret, entry));

        assert_eq!(run_trivial_dce(func), 0);
        assert_eq!(run_trivial_dce(func), 0);
    }
}
