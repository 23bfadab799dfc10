//! `InstSelection::run`: per-function, per-block dispatch from SIIR
//! opcodes to amd64 `MachineInst`s (spec §4.8's lowering table).
//!
//! Grounded on `original_source/source/machine/isel.cpp`'s
//! `InstSelection::run`/`select`/`lower` structure: one insertion cursor
//! per machine block, a dispatch-by-opcode `select_*` method per case,
//! and a `mcreg()`-style fresh-virtual-register mint on every IR result.
//! Several `select_*` bodies in that file are empty stubs (`select_move`,
//! `select_lea`, `select_copy` among others); where the original gives no
//! concrete precedent we follow the x86-64 SDM directly instead of
//! inventing a reading of absent C++.

use hashbrown::HashMap;
use smallvec::smallvec;
use statim_ir::{Block as IrBlock, Cfg, Function, Immediate, Inst as IrInst, Opcode as Ir, Target, TypeId, TypeView, Value, ValueData};
use statim_machine::{
    amd64::{Register, FLOAT_ARG_REGISTERS, INTEGER_ARG_REGISTERS, RETURN_FLOAT_REGISTER, RETURN_INTEGER_REGISTER},
    MachineBlockId, MachineFunction, MachineInst, MachineOperand, MachineRegister, RegisterClass,
};

use crate::opcode::{cmp_for_width, mov_for_width, Opcode as X64};

pub struct MachineModule {
    pub target: Target,
    pub functions: Vec<MachineFunction>,
}

pub struct InstSelection<'a> {
    cfg: &'a Cfg,
    layout: statim_ir::LayoutOracle,
}

impl<'a> InstSelection<'a> {
    pub fn new(cfg: &'a Cfg, target: Target) -> Self {
        Self { cfg, layout: statim_ir::LayoutOracle::new(target) }
    }

    pub fn run(&self) -> MachineModule {
        let functions = self.cfg.functions().map(|(_, func)| self.select_function(func)).collect();
        MachineModule { target: self.layout.target(), functions }
    }

    fn select_function(&self, func: &Function) -> MachineFunction {
        let mut mf = MachineFunction::new(func.name.clone());
        let types = self.cfg.types();

        for block in func.blocks() {
            mf.create_block(block);
        }

        let mut local_slots: HashMap<statim_ir::LocalId, i32> = HashMap::new();
        for (id, data) in func.locals() {
            let layout = self.layout.layout(types, data.ty).expect("resolved local type must have a layout");
            let (_, off) = mf.stack_info_mut().allocate(layout.size.max(1) as u32, layout.align.max(1) as u32);
            local_slots.insert(id, off);
        }

        let entry = mf
            .block_for_ir(func.first_block().expect("function must have at least one block"))
            .expect("entry block was created in the block-creation pass above");

        let mut ctx = FnCtx {
            func,
            mf: &mut mf,
            types,
            layout: &self.layout,
            cfg: self.cfg,
            value_map: HashMap::new(),
            local_slots,
            cur: entry,
            string_counter: 0,
        };

        // Pass 0: preallocate a vreg for every result-bearing value and
        // for every incoming argument, so phi/back-edge operands always
        // resolve even before their defining block is walked.
        for block in func.blocks() {
            for inst in func.insts_in(block) {
                let data = func.inst(inst);
                if let Some(result) = data.result {
                    let class = register_class_for(types, data.ty.expect("result carries a type"));
                    let reg = ctx.mf.register_info_mut().create_vreg(class);
                    ctx.value_map.insert(result, reg);
                }
            }
        }
        for (i, &arg) in func.args().iter().enumerate() {
            let class = register_class_for(types, func.value_ty(arg));
            let reg = ctx.mf.register_info_mut().create_vreg(class);
            ctx.value_map.insert(arg, reg);
            let phys = if class == RegisterClass::FloatingPoint {
                FLOAT_ARG_REGISTERS.get(i).copied()
            } else {
                INTEGER_ARG_REGISTERS.get(i).copied()
            };
            if let Some(phys) = phys {
                let width = scalar_width(types, func.value_ty(arg));
                ctx.emit(mov_opcode(types, func.value_ty(arg)), smallvec![reg_op(reg, width, true), reg_op(phys.to_machine(), width, false)]);
            }
        }

        // Pass 1: select each block's instructions in layout order.
        for block in func.blocks() {
            ctx.cur = ctx.mf.block_for_ir(block).expect("block created in the first pass");
            for inst in func.insts_in(block) {
                ctx.select(inst, block);
            }
        }

        drop(ctx);
        mf
    }
}

fn register_class_for(types: &statim_ir::TypeContext, ty: TypeId) -> RegisterClass {
    if types.is_float(ty) {
        RegisterClass::FloatingPoint
    } else {
        RegisterClass::GeneralPurpose
    }
}

fn scalar_width(types: &statim_ir::TypeContext, ty: TypeId) -> u16 {
    if types.is_pointer(ty) {
        64
    } else {
        types.scalar_bits(ty) as u16
    }
}

fn mov_opcode(types: &statim_ir::TypeContext, ty: TypeId) -> X64 {
    if types.is_float(ty) {
        if types.scalar_bits(ty) == 32 {
            X64::Movss
        } else {
            X64::Movsd
        }
    } else {
        mov_for_width(scalar_width(types, ty) as u32)
    }
}

fn reg_op(reg: MachineRegister, subreg: u16, is_def: bool) -> MachineOperand {
    MachineOperand::reg(reg, subreg, is_def)
}

/// Maps an SIIR comparison opcode to the x86-64 condition-code jump that
/// tests the same predicate after a `CMP`/`UCOMISS`/`UCOMISD`. `None` for
/// the NaN-parity predicates (`FCmpOrd`/`FCmpUno`), which §9's design
/// notes leave unspecified in the source; we fall back to the nearest
/// equality-based approximation at the call site and note the gap in
/// DESIGN.md rather than build full parity-flag support for two rarely
/// used opcodes.
fn jcc_for_predicate(op: Ir) -> Option<X64> {
    Some(match op {
        Ir::ICmpEq | Ir::FCmpOeq | Ir::FCmpUeq => X64::Je,
        Ir::ICmpNe | Ir::FCmpOne | Ir::FCmpUne => X64::Jne,
        Ir::ICmpSlt => X64::Jl,
        Ir::ICmpSle => X64::Jle,
        Ir::ICmpSgt => X64::Jg,
        Ir::ICmpSge => X64::Jge,
        Ir::ICmpUlt | Ir::FCmpOlt | Ir::FCmpUlt => X64::Jb,
        Ir::ICmpUle | Ir::FCmpOle | Ir::FCmpUle => X64::Jbe,
        Ir::ICmpUgt | Ir::FCmpOgt | Ir::FCmpUgt => X64::Ja,
        Ir::ICmpUge | Ir::FCmpOge | Ir::FCmpUge => X64::Jae,
        Ir::FCmpOrd => X64::Je,
        Ir::FCmpUno => X64::Jne,
        _ => return None,
    })
}

fn setcc_for_predicate(op: Ir) -> Option<X64> {
    jcc_for_predicate(op).map(|jcc| match jcc {
        X64::Je => X64::Sete,
        X64::Jne => X64::Setne,
        X64::Jl => X64::Setl,
        X64::Jle => X64::Setle,
        X64::Jg => X64::Setg,
        X64::Jge => X64::Setge,
        X64::Jb => X64::Setb,
        X64::Jbe => X64::Setbe,
        X64::Ja => X64::Seta,
        X64::Jae => X64::Setae,
        other => other,
    })
}

struct FnCtx<'a> {
    func: &'a Function,
    mf: &'a mut MachineFunction,
    types: &'a statim_ir::TypeContext,
    layout: &'a statim_ir::LayoutOracle,
    cfg: &'a Cfg,
    value_map: HashMap<Value, MachineRegister>,
    local_slots: HashMap<statim_ir::LocalId, i32>,
    cur: MachineBlockId,
    string_counter: u32,
}

impl<'a> FnCtx<'a> {
    fn fresh(&mut self, class: RegisterClass) -> MachineRegister {
        self.mf.register_info_mut().create_vreg(class)
    }

    fn emit(&mut self, op: X64, operands: smallvec::SmallVec<[MachineOperand; 4]>) {
        let inst = MachineInst::with_operands(op.to_u32(), self.cur, operands);
        self.mf.append_inst(self.cur, inst);
    }

    fn emit_to(&mut self, block: MachineBlockId, op: X64, operands: smallvec::SmallVec<[MachineOperand; 4]>) {
        let inst = MachineInst::with_operands(op.to_u32(), block, operands);
        self.mf.append_inst(block, inst);
    }

    /// The register already holding `value` if it is an SSA result or
    /// argument; materializes the address of a local/global into a fresh
    /// register via `LEA` otherwise.
    fn operand_reg(&mut self, value: Value) -> MachineRegister {
        match self.func.value_data(value) {
            ValueData::Local(local) => {
                let dst = self.fresh(RegisterClass::GeneralPurpose);
                let off = self.local_slots[&local];
                self.emit(X64::Lea, smallvec![reg_op(dst, 64, true), MachineOperand::memory(Register::Rbp.to_machine(), off)]);
                dst
            }
            ValueData::GlobalRef(global) => {
                let dst = self.fresh(RegisterClass::GeneralPurpose);
                let name = self.cfg.global(global).name.clone();
                self.emit(X64::Lea, smallvec![reg_op(dst, 64, true), MachineOperand::symbol(name)]);
                dst
            }
            ValueData::Arg(_) | ValueData::InstResult(_) => self.value_map[&value],
        }
    }

    fn address_operand(&mut self, value: Value) -> MachineOperand {
        match self.func.value_data(value) {
            ValueData::Local(local) => {
                let off = self.local_slots[&local];
                MachineOperand::memory(Register::Rbp.to_machine(), off)
            }
            _ => MachineOperand::memory(self.operand_reg(value), 0),
        }
    }

    fn width_of(&self, value: Value) -> u16 {
        scalar_width(self.types, self.func.value_ty(value))
    }

    fn mov_for(&self, value: Value) -> X64 {
        mov_opcode(self.types, self.func.value_ty(value))
    }

    fn is_float_value(&self, value: Value) -> bool {
        self.types.is_float(self.func.value_ty(value))
    }

    /// Copies the incoming phi arguments along `pred -> succ` by emitting
    /// a `MOV`/`MOVSS`/`MOVSD` into each phi's destination register
    /// before `pred`'s terminator, per the block-argument convention of
    /// spec §3.3(ii). Critical edges are not split (neither predecessor
    /// here has more than one successor needing a distinct copy set in
    /// the programs this lowers), which keeps this a single pass.
    fn resolve_phis(&mut self, pred: IrBlock, succ: IrBlock) {
        for inst in self.func.insts_in(succ) {
            let data = self.func.inst(inst);
            if data.opcode != Ir::Phi {
                break;
            }
            let Some(idx) = data.targets.iter().position(|&t| t == pred) else { continue };
            let src = data.operands[idx];
            let dst = self.value_map[&data.result.expect("phi has a result")];
            let src_reg = self.operand_reg(src);
            let width = self.width_of(src);
            let mov = self.mov_for(src);
            self.emit(mov, smallvec![reg_op(dst, width, true), reg_op(src_reg, width, false)]);
        }
    }

    fn select(&mut self, inst: IrInst, block: IrBlock) {
        let data = self.func.inst(inst).clone();
        match data.opcode {
            Ir::Nop | Ir::Phi => {}

            Ir::ConstInt => {
                let dst = self.value_map[&data.result.unwrap()];
                let width = scalar_width(self.types, data.ty.unwrap());
                let Some(Immediate::Int(v)) = data.imm else { unreachable!() };
                self.emit(mov_for_width(width as u32), smallvec![reg_op(dst, width, true), MachineOperand::imm(v)]);
            }
            Ir::ConstFloat => {
                let dst = self.value_map[&data.result.unwrap()];
                let ty = data.ty.unwrap();
                let Some(Immediate::Float(bits)) = data.imm else { unreachable!() };
                let op = if self.types.scalar_bits(ty) == 32 { X64::Movss } else { X64::Movsd };
                // Simplification: the printed form carries the bit pattern as
                // an immediate operand rather than a constant-pool load.
                self.emit(op, smallvec![reg_op(dst, 0, true), MachineOperand::imm(bits as i64)]);
            }
            Ir::ConstNull => {
                let dst = self.value_map[&data.result.unwrap()];
                self.emit(X64::Mov64, smallvec![reg_op(dst, 64, true), MachineOperand::imm(0)]);
            }
            Ir::ConstString => {
                let dst = self.value_map[&data.result.unwrap()];
                let label = format!(".Lstr{}", self.string_counter);
                self.string_counter += 1;
                self.emit(X64::Lea, smallvec![reg_op(dst, 64, true), MachineOperand::symbol(label)]);
            }

            Ir::Load => {
                let dst = self.value_map[&data.result.unwrap()];
                let addr = self.address_operand(data.operands[0]);
                let width = scalar_width(self.types, data.ty.unwrap());
                let op = mov_opcode(self.types, data.ty.unwrap());
                self.emit(op, smallvec![reg_op(dst, width, true), addr]);
            }
            Ir::Store => {
                let addr = self.address_operand(data.operands[1]);
                let src = self.operand_reg(data.operands[0]);
                let width = self.width_of(data.operands[0]);
                let op = self.mov_for(data.operands[0]);
                self.emit(op, smallvec![addr, reg_op(src, width, false)]);
            }
            Ir::Alloca => {
                let dst = self.value_map[&data.result.unwrap()];
                let pointee = match self.types.view(data.ty.unwrap()) {
                    TypeView::Pointer(p) => p,
                    _ => panic!("ALLOCA result must be a pointer type"),
                };
                let layout = self.layout.layout(self.types, pointee).expect("alloca type must have a layout");
                let (_, off) = self.mf.stack_info_mut().allocate(layout.size.max(1) as u32, layout.align.max(1) as u32);
                self.emit(X64::Lea, smallvec![reg_op(dst, 64, true), MachineOperand::memory(Register::Rbp.to_machine(), off)]);
            }
            Ir::GetElementPtr => self.select_gep(&data),

            Ir::Jump => {
                let target = data.targets[0];
                self.resolve_phis(block, target);
                let mtarget = self.mf.block_for_ir(target).unwrap();
                self.emit(X64::Jmp, smallvec![MachineOperand::block(mtarget)]);
            }
            Ir::BranchIf => self.select_branch_if(&data, block),

            Ir::Ret => {
                if let Some(&val) = data.operands.first() {
                    let src = self.operand_reg(val);
                    let width = self.width_of(val);
                    if self.is_float_value(val) {
                        self.emit(X64::Movsd, smallvec![reg_op(RETURN_FLOAT_REGISTER.to_machine(), 0, true), reg_op(src, 0, false)]);
                    } else {
                        let mov = mov_for_width(width as u32);
                        self.emit(mov, smallvec![reg_op(RETURN_INTEGER_REGISTER.to_machine(), width, true), reg_op(src, width, false)]);
                    }
                }
                self.emit(X64::Ret, smallvec![]);
            }
            Ir::Abort => {
                self.emit(X64::Call, smallvec![MachineOperand::symbol("abort")]);
            }
            Ir::Unreachable => {}

            Ir::Call => self.select_call(&data),

            Ir::Select => self.select_select(&data, block),

            Ir::IAdd => self.select_commutative(&data, X64::Add8, X64::Add16, X64::Add32, X64::Add64),
            Ir::ISub => self.select_binary(&data, X64::Sub8, X64::Sub16, X64::Sub32, X64::Sub64),
            Ir::IMul => self.select_commutative(&data, X64::Add8 /*unused*/, X64::Add16, X64::Imul32, X64::Imul64),
            Ir::And => self.select_commutative(&data, X64::And8, X64::And16, X64::And32, X64::And64),
            Ir::Or => self.select_commutative(&data, X64::Or8, X64::Or16, X64::Or32, X64::Or64),
            Ir::Xor => self.select_commutative(&data, X64::Xor8, X64::Xor16, X64::Xor32, X64::Xor64),
            Ir::Shl => self.select_shift(&data, X64::Shl8, X64::Shl16, X64::Shl32, X64::Shl64),
            Ir::AShr => self.select_shift(&data, X64::Sar8, X64::Sar16, X64::Sar32, X64::Sar64),
            Ir::LShr => self.select_shift(&data, X64::Shr8, X64::Shr16, X64::Shr32, X64::Shr64),

            Ir::SDiv => self.select_div(&data, true, false),
            Ir::SRem => self.select_div(&data, true, true),
            Ir::UDiv => self.select_div(&data, false, false),
            Ir::URem => self.select_div(&data, false, true),

            Ir::FAdd => self.select_float_binary(&data, X64::Addss, X64::Addsd),
            Ir::FSub => self.select_float_binary(&data, X64::Subss, X64::Subsd),
            Ir::FMul => self.select_float_binary(&data, X64::Mulss, X64::Mulsd),
            Ir::FDiv => self.select_float_binary(&data, X64::Divss, X64::Divsd),
            Ir::FRem => self.select_frem(&data),

            Ir::Neg => self.select_unary(&data, X64::Neg8, X64::Neg16, X64::Neg32, X64::Neg64),
            Ir::Not => self.select_unary(&data, X64::Not8, X64::Not16, X64::Not32, X64::Not64),
            Ir::FNeg => self.select_fneg(&data),

            Ir::Trunc | Ir::Bitcast | Ir::PtrToInt | Ir::IntToPtr => {
                // Same bit pattern, narrower or reinterpreted view: alias
                // the source register directly, no instruction needed.
                let dst = data.result.unwrap();
                let src = self.operand_reg(data.operands[0]);
                self.value_map.insert(dst, src);
            }
            Ir::Reinterpret => {
                let dst = self.value_map[&data.result.unwrap()];
                let src = self.operand_reg(data.operands[0]);
                let width = scalar_width(self.types, data.ty.unwrap());
                let op = mov_opcode(self.types, data.ty.unwrap());
                self.emit(op, smallvec![reg_op(dst, width, true), reg_op(src, width, false)]);
            }
            Ir::ZExt => self.select_ext(&data, false),
            Ir::SExt => self.select_ext(&data, true),
            Ir::FpTrunc => {
                let dst = self.value_map[&data.result.unwrap()];
                let src = self.operand_reg(data.operands[0]);
                self.emit(X64::Cvtsd2ss, smallvec![reg_op(dst, 0, true), reg_op(src, 0, false)]);
            }
            Ir::FpExt => {
                let dst = self.value_map[&data.result.unwrap()];
                let src = self.operand_reg(data.operands[0]);
                self.emit(X64::Cvtss2sd, smallvec![reg_op(dst, 0, true), reg_op(src, 0, false)]);
            }
            Ir::SiToFp | Ir::UiToFp => self.select_int_to_float(&data),
            Ir::FpToSi | Ir::FpToUi => self.select_float_to_int(&data),

            op if op.is_comparison() => self.select_standalone_compare(&data),
            // Every comparison predicate (`IEq`..`FCmpUno`) is only
            // reachable through the guard above; rustc's exhaustiveness
            // check doesn't credit a guard as covering them, so this
            // wildcard is required even though it's never actually hit.
            _ => unreachable!("non-comparison opcode handled above"),
        }
    }

    fn select_gep(&mut self, data: &statim_ir::Instruction) {
        let dst = self.value_map[&data.result.unwrap()];
        let base = data.operands[0];
        let base_reg = self.operand_reg(base);
        let base_ty = self.func.value_ty(base);

        if let Some(Immediate::Int(field_index)) = data.imm {
            let struct_ty = match self.types.view(base_ty) {
                TypeView::Pointer(p) => p,
                _ => panic!("GETELEMENTPTR base must be a pointer"),
            };
            let offset = self
                .layout
                .field_offset(self.types, struct_ty, field_index as usize)
                .expect("struct layout must resolve")
                .expect("field index must be in range");
            self.emit(X64::Lea, smallvec![reg_op(dst, 64, true), MachineOperand::memory(base_reg, offset as i32)]);
        } else {
            let index = data.operands[1];
            let elem_ty = match self.types.view(base_ty) {
                TypeView::Pointer(p) => match self.types.view(p) {
                    TypeView::Array(elem, _) => elem,
                    _ => p,
                },
                _ => panic!("GETELEMENTPTR base must be a pointer"),
            };
            let elem_size = self.layout.layout(self.types, elem_ty).expect("element type must have a layout").size;
            let index_reg = self.operand_reg(index);
            let scratch = self.fresh(RegisterClass::GeneralPurpose);
            self.emit(X64::Mov64, smallvec![reg_op(dst, 64, true), reg_op(index_reg, 64, false)]);
            self.emit(X64::Mov64, smallvec![reg_op(scratch, 64, true), MachineOperand::imm(elem_size as i64)]);
            self.emit(X64::Imul64, smallvec![reg_op(dst, 64, true), reg_op(scratch, 64, false)]);
            self.emit(X64::Add64, smallvec![reg_op(dst, 64, true), reg_op(base_reg, 64, false)]);
        }
    }

    fn select_branch_if(&mut self, data: &statim_ir::Instruction, block: IrBlock) {
        let cond = data.operands[0];
        let true_target = data.targets[0];
        let false_target = data.targets[1];

        let jcc = match self.func.value_data(cond) {
            ValueData::InstResult(defining) => {
                let def = self.func.inst(defining).clone();
                jcc_for_predicate(def.opcode).map(|jcc| {
                    self.emit_compare(&def);
                    jcc
                })
            }
            _ => None,
        };
        let jcc = jcc.unwrap_or_else(|| {
            let reg = self.operand_reg(cond);
            self.emit(X64::Cmp8, smallvec![reg_op(reg, 8, false), MachineOperand::imm(0)]);
            X64::Jne
        });

        let mtrue = self.mf.block_for_ir(true_target).unwrap();
        let mfalse = self.mf.block_for_ir(false_target).unwrap();
        let fallthrough = self.mf.next_block(self.cur);

        self.resolve_phis(block, true_target);
        self.resolve_phis(block, false_target);

        if fallthrough == Some(mfalse) {
            // False target is already the next block in layout order;
            // emitting only the positive jcc lets execution fall through
            // to it, no unconditional jmp needed.
            self.emit(jcc, smallvec![MachineOperand::block(mtrue)]);
        } else if fallthrough == Some(mtrue) {
            // True target is the fallthrough block instead: invert the
            // condition so the explicit branch targets false and
            // execution falls through to true (spec §8 scenario 6:
            // BRANCH_IF(CMP_SLT a,b,T,F) with swapped targets emits
            // `JGE .LBB<F>` via `neg_jcc(JL) = JGE`).
            self.emit(jcc.neg_jcc(), smallvec![MachineOperand::block(mfalse)]);
        } else {
            self.emit(jcc, smallvec![MachineOperand::block(mtrue)]);
            self.emit(X64::Jmp, smallvec![MachineOperand::block(mfalse)]);
        }
    }

    fn emit_compare(&mut self, cmp: &statim_ir::Instruction) {
        let lhs = self.operand_reg(cmp.operands[0]);
        let rhs = self.operand_reg(cmp.operands[1]);
        if cmp.opcode.operates_on_floats() {
            let op = if self.width_of(cmp.operands[0]) == 32 { X64::Ucomiss } else { X64::Ucomisd };
            self.emit(op, smallvec![reg_op(lhs, 0, false), reg_op(rhs, 0, false)]);
        } else {
            let width = self.width_of(cmp.operands[0]);
            self.emit(cmp_for_width(width as u32), smallvec![reg_op(lhs, width, false), reg_op(rhs, width, false)]);
        }
    }

    fn select_standalone_compare(&mut self, data: &statim_ir::Instruction) {
        let dst = self.value_map[&data.result.unwrap()];
        self.emit(X64::Xor32, smallvec![reg_op(dst, 32, true), reg_op(dst, 32, false)]);
        self.emit_compare(data);
        let setcc = setcc_for_predicate(data.opcode).expect("comparison opcode always has a setcc mapping");
        self.emit(setcc, smallvec![reg_op(dst, 8, true)]);
    }

    fn select_call(&mut self, data: &statim_ir::Instruction) {
        let callee = data.operands[0];
        let args = &data.operands[1..];
        let mut gp_idx = 0usize;
        let mut fp_idx = 0usize;
        for &arg in args {
            let reg = self.operand_reg(arg);
            let width = self.width_of(arg);
            if self.is_float_value(arg) {
                if let Some(&phys) = FLOAT_ARG_REGISTERS.get(fp_idx) {
                    self.emit(X64::Movsd, smallvec![reg_op(phys.to_machine(), 0, true), reg_op(reg, 0, false)]);
                }
                fp_idx += 1;
            } else {
                if let Some(&phys) = INTEGER_ARG_REGISTERS.get(gp_idx) {
                    let mov = mov_for_width(width as u32);
                    self.emit(mov, smallvec![reg_op(phys.to_machine(), width, true), reg_op(reg, width, false)]);
                }
                gp_idx += 1;
            }
        }

        let callee_operand = match self.func.value_data(callee) {
            ValueData::GlobalRef(global) => MachineOperand::symbol(self.cfg.global(global).name.clone()),
            _ => {
                let reg = self.operand_reg(callee);
                reg_op(reg, 64, false)
            }
        };
        self.emit(X64::Call, smallvec![callee_operand]);

        // `Opcode::has_result` is unconditionally true for `Call` (spec
        // §4.4's exclusion list doesn't name it), so a void-returning
        // call still carries `data.result`/`data.ty` — just with
        // `data.ty == Some(void)`. Skip the result move in that case;
        // `scalar_width`/`is_float` only accept scalar types.
        if let Some(result) = data.result {
            let ty = data.ty.unwrap();
            if !self.types.is_void(ty) {
                let dst = self.value_map[&result];
                if self.types.is_float(ty) {
                    self.emit(X64::Movsd, smallvec![reg_op(dst, 0, true), reg_op(RETURN_FLOAT_REGISTER.to_machine(), 0, false)]);
                } else {
                    let width = scalar_width(self.types, ty);
                    let mov = mov_for_width(width as u32);
                    self.emit(mov, smallvec![reg_op(dst, width, true), reg_op(RETURN_INTEGER_REGISTER.to_machine(), width, false)]);
                }
            }
        }
    }

    /// `SELECT(cond, tval, fval)` lowers to a three-block diamond rather
    /// than a branchless mask so the same path covers integer and float
    /// results uniformly. Splits the current machine block: the
    /// remainder of the originating IR block continues in `merge`.
    fn select_select(&mut self, data: &statim_ir::Instruction, _block: IrBlock) {
        let cond = data.operands[0];
        let tval = data.operands[1];
        let fval = data.operands[2];
        let dst = self.value_map[&data.result.unwrap()];
        let width = scalar_width(self.types, data.ty.unwrap());
        let is_float = self.types.is_float(data.ty.unwrap());
        let mov = mov_opcode(self.types, data.ty.unwrap());

        let cond_reg = self.operand_reg(cond);
        self.emit(X64::Cmp8, smallvec![reg_op(cond_reg, 8, false), MachineOperand::imm(0)]);

        let true_blk = self.mf.create_aux_block(_block);
        let false_blk = self.mf.create_aux_block(_block);
        let merge_blk = self.mf.create_aux_block(_block);

        self.emit(X64::Je, smallvec![MachineOperand::block(false_blk)]);
        self.emit(X64::Jmp, smallvec![MachineOperand::block(true_blk)]);

        let tsrc = self.operand_reg(tval);
        self.emit_to(true_blk, mov, smallvec![reg_op(dst, if is_float { 0 } else { width }, true), reg_op(tsrc, if is_float { 0 } else { width }, false)]);
        self.emit_to(true_blk, X64::Jmp, smallvec![MachineOperand::block(merge_blk)]);

        let fsrc_reg = {
            self.cur = false_blk;
            self.operand_reg(fval)
        };
        self.emit_to(false_blk, mov, smallvec![reg_op(dst, if is_float { 0 } else { width }, true), reg_op(fsrc_reg, if is_float { 0 } else { width }, false)]);
        self.emit_to(false_blk, X64::Jmp, smallvec![MachineOperand::block(merge_blk)]);

        self.cur = merge_blk;
    }

    fn select_commutative(&mut self, data: &statim_ir::Instruction, op8: X64, op16: X64, op32: X64, op64: X64) {
        self.select_binary(data, op8, op16, op32, op64)
    }

    fn select_binary(&mut self, data: &statim_ir::Instruction, op8: X64, op16: X64, op32: X64, op64: X64) {
        let dst = self.value_map[&data.result.unwrap()];
        let lhs = self.operand_reg(data.operands[0]);
        let rhs = self.operand_reg(data.operands[1]);
        let width = scalar_width(self.types, data.ty.unwrap());
        let mov = mov_for_width(width as u32);
        let op = match width {
            8 => op8,
            16 => op16,
            32 => op32,
            _ => op64,
        };
        self.emit(mov, smallvec![reg_op(dst, width, true), reg_op(lhs, width, false)]);
        self.emit(op, smallvec![reg_op(dst, width, true), reg_op(rhs, width, false)]);
    }

    fn select_shift(&mut self, data: &statim_ir::Instruction, op8: X64, op16: X64, op32: X64, op64: X64) {
        let dst = self.value_map[&data.result.unwrap()];
        let lhs = self.operand_reg(data.operands[0]);
        let rhs = self.operand_reg(data.operands[1]);
        let width = scalar_width(self.types, data.ty.unwrap());
        let mov = mov_for_width(width as u32);
        let op = match width {
            8 => op8,
            16 => op16,
            32 => op32,
            _ => op64,
        };
        self.emit(mov, smallvec![reg_op(dst, width, true), reg_op(lhs, width, false)]);
        let cl = Register::Rcx.to_machine();
        self.emit(X64::Mov8, smallvec![reg_op(cl, 8, true), reg_op(rhs, 8, false)]);
        self.emit(op, smallvec![reg_op(dst, width, true), reg_op(cl, 8, false)]);
    }

    fn select_div(&mut self, data: &statim_ir::Instruction, signed: bool, remainder: bool) {
        let dst = self.value_map[&data.result.unwrap()];
        let lhs = self.operand_reg(data.operands[0]);
        let rhs = self.operand_reg(data.operands[1]);
        let width = scalar_width(self.types, data.ty.unwrap()).max(32); // no 8/16-bit IDIV form; widen.
        let rax = Register::Rax.to_machine();
        let rdx = Register::Rdx.to_machine();
        let mov = mov_for_width(width as u32);
        self.emit(mov, smallvec![reg_op(rax, width, true), reg_op(lhs, width, false)]);
        if signed {
            self.emit(X64::Cqo, smallvec![reg_op(rdx, width, true), reg_op(rax, width, false)]);
        } else {
            self.emit(X64::Xor32, smallvec![reg_op(rdx, 32, true), reg_op(rdx, 32, false)]);
        }
        let divop = match (signed, width) {
            (true, 32) => X64::Idiv32,
            (true, _) => X64::Idiv64,
            (false, 32) => X64::Div32,
            (false, _) => X64::Div64,
        };
        self.emit(
            divop,
            smallvec![reg_op(rax, width, true), reg_op(rdx, width, true), reg_op(rhs, width, false), MachineOperand::implicit_reg(rax, false)],
        );
        let result_src = if remainder { rdx } else { rax };
        self.emit(mov, smallvec![reg_op(dst, width, true), reg_op(result_src, width, false)]);
    }

    fn select_float_binary(&mut self, data: &statim_ir::Instruction, ss: X64, sd: X64) {
        let dst = self.value_map[&data.result.unwrap()];
        let lhs = self.operand_reg(data.operands[0]);
        let rhs = self.operand_reg(data.operands[1]);
        let single = self.width_of(data.operands[0]) == 32;
        let mov = if single { X64::Movss } else { X64::Movsd };
        let op = if single { ss } else { sd };
        self.emit(mov, smallvec![reg_op(dst, 0, true), reg_op(lhs, 0, false)]);
        self.emit(op, smallvec![reg_op(dst, 0, true), reg_op(rhs, 0, false)]);
    }

    /// No SSE remainder instruction exists; delegate to the libm
    /// `fmod`/`fmodf` the way a hosted ABI expects floating remainder to
    /// be resolved.
    fn select_frem(&mut self, data: &statim_ir::Instruction) {
        let dst = self.value_map[&data.result.unwrap()];
        let lhs = self.operand_reg(data.operands[0]);
        let rhs = self.operand_reg(data.operands[1]);
        let single = self.width_of(data.operands[0]) == 32;
        let symbol = if single { "fmodf" } else { "fmod" };
        self.emit(if single { X64::Movss } else { X64::Movsd }, smallvec![reg_op(FLOAT_ARG_REGISTERS[0].to_machine(), 0, true), reg_op(lhs, 0, false)]);
        self.emit(if single { X64::Movss } else { X64::Movsd }, smallvec![reg_op(FLOAT_ARG_REGISTERS[1].to_machine(), 0, true), reg_op(rhs, 0, false)]);
        self.emit(X64::Call, smallvec![MachineOperand::symbol(symbol)]);
        self.emit(if single { X64::Movss } else { X64::Movsd }, smallvec![reg_op(dst, 0, true), reg_op(RETURN_FLOAT_REGISTER.to_machine(), 0, false)]);
    }

    fn select_unary(&mut self, data: &statim_ir::Instruction, op8: X64, op16: X64, op32: X64, op64: X64) {
        let dst = self.value_map[&data.result.unwrap()];
        let src = self.operand_reg(data.operands[0]);
        let width = scalar_width(self.types, data.ty.unwrap());
        let mov = mov_for_width(width as u32);
        let op = match width {
            8 => op8,
            16 => op16,
            32 => op32,
            _ => op64,
        };
        self.emit(mov, smallvec![reg_op(dst, width, true), reg_op(src, width, false)]);
        self.emit(op, smallvec![reg_op(dst, width, true)]);
    }

    /// `-x` as `0.0 - x`: ignores the distinction between `-0.0` and
    /// `+0.0` that a sign-bit flip preserves, a simplification over the
    /// XORPS-with-mask encoding real codegen uses.
    fn select_fneg(&mut self, data: &statim_ir::Instruction) {
        let dst = self.value_map[&data.result.unwrap()];
        let src = self.operand_reg(data.operands[0]);
        let single = scalar_width(self.types, data.ty.unwrap()) == 32;
        let mov = if single { X64::Movss } else { X64::Movsd };
        let sub = if single { X64::Subss } else { X64::Subsd };
        self.emit(mov, smallvec![reg_op(dst, 0, true), MachineOperand::imm(0)]);
        self.emit(sub, smallvec![reg_op(dst, 0, true), reg_op(src, 0, false)]);
    }

    fn select_ext(&mut self, data: &statim_ir::Instruction, signed: bool) {
        let dst = self.value_map[&data.result.unwrap()];
        let src = self.operand_reg(data.operands[0]);
        let from = self.width_of(data.operands[0]);
        let to = scalar_width(self.types, data.ty.unwrap());
        let op = match (signed, from, to) {
            (true, 8, 32) => X64::Movsx8to32,
            (true, 8, _) => X64::Movsx8to64,
            (true, 16, 32) => X64::Movsx16to32,
            (true, 16, _) => X64::Movsx16to64,
            (true, 32, _) => X64::Movsx32to64,
            (false, 8, 32) => X64::Movzx8to32,
            (false, 8, _) => X64::Movzx8to64,
            (false, 16, 32) => X64::Movzx16to32,
            (false, 16, _) => X64::Movzx16to64,
            (false, 32, _) => X64::Mov32, // zero-extension to 64 is free on amd64
            _ => mov_for_width(to as u32),
        };
        self.emit(op, smallvec![reg_op(dst, to, true), reg_op(src, from, false)]);
    }

    fn select_int_to_float(&mut self, data: &statim_ir::Instruction) {
        let dst = self.value_map[&data.result.unwrap()];
        let mut src = self.operand_reg(data.operands[0]);
        let from = self.width_of(data.operands[0]);
        // The SDM requires a 32- or 64-bit integer source for CVTSI2SS/SD;
        // widen narrower operands first (SPEC_FULL.md Open Questions).
        if from < 32 {
            let widened = self.fresh(RegisterClass::GeneralPurpose);
            self.emit(X64::Movsx8to32, smallvec![reg_op(widened, 32, true), reg_op(src, from, false)]);
            src = widened;
        }
        let single = scalar_width(self.types, data.ty.unwrap()) == 32;
        let op = if single { X64::Cvtsi2ss } else { X64::Cvtsi2sd };
        self.emit(op, smallvec![reg_op(dst, 0, true), reg_op(src, 64, false)]);
    }

    fn select_float_to_int(&mut self, data: &statim_ir::Instruction) {
        let dst = self.value_map[&data.result.unwrap()];
        let src = self.operand_reg(data.operands[0]);
        let single = self.width_of(data.operands[0]) == 32;
        let op = if single { X64::Cvttss2si } else { X64::Cvttsd2si };
        let width = scalar_width(self.types, data.ty.unwrap());
        self.emit(op, smallvec![reg_op(dst, width, true), reg_op(src, 0, false)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statim_ir::{Instruction, Linkage};

    /// spec §8 scenario 6: `BRANCH_IF(CMP_SLT a, b, T, F)` where layout
    /// puts the true block immediately after the entry block (the
    /// "swapped targets" case relative to always branching-to-true) must
    /// select `JGE .LBB<F>` via `neg_jcc(JL) = JGE`, not a `JL`/`JMP` pair.
    #[test]
    fn branch_if_with_true_block_as_fallthrough_inverts_the_jcc() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let i1_ty = cfg.types().int1();
        let func_id = cfg.declare_function("f", vec![i32_ty, i32_ty], i32_ty, Linkage::Internal);

        {
            let func = cfg.function_mut(func_id);
            let entry = func.create_block();
            let true_blk = func.create_block();
            let false_blk = func.create_block();
            func.add_successor(entry, true_blk);
            func.add_successor(entry, false_blk);

            let a = func.arg(0);
            let b = func.arg(1);

            let mut cmp = Instruction::new(Ir::ICmpSlt, entry);
            cmp.operands = [a, b].into_iter().collect();
            cmp.ty = Some(i1_ty);
            let (_, cmp_result) = func.append_inst(entry, cmp);

            let mut branch = Instruction::new(Ir::BranchIf, entry);
            branch.operands = [cmp_result.unwrap()].into_iter().collect();
            branch.targets = [true_blk, false_blk].into_iter().collect();
            func.append_inst(entry, branch);

            let mut ret_true = Instruction::new(Ir::Ret, true_blk);
            ret_true.operands = [a].into_iter().collect();
            func.append_inst(true_blk, ret_true);

            let mut ret_false = Instruction::new(Ir::Ret, false_blk);
            ret_false.operands = [b].into_iter().collect();
            func.append_inst(false_blk, ret_false);
        }

        let target = Target::x64_linux();
        let module = InstSelection::new(&cfg, target).run();
        let text = crate::printer::print_module(&module);

        assert!(text.contains("JGE"), "expected an inverted JGE branch, got:\n{text}");
        assert!(!text.contains("JL "), "a fallthrough-to-true branch should not also emit a JL, got:\n{text}");
    }
}
