//! The textual SIIR form of spec §6.2 — a deterministic, greppable dump
//! used by tests and `--emit-ir`, not a format anything re-parses.

use crate::function::{Function, Linkage};
use crate::instruction::{Immediate, Inst, Opcode, Block};
use crate::module::Cfg;
use crate::types::{TypeContext, TypeId, TypeView};
use crate::value::{Value, ValueData};
use std::fmt::Write as _;

pub fn print_cfg(cfg: &Cfg) -> String {
    let mut out = String::new();
    for (id, func) in cfg.functions() {
        let _ = id;
        print_function(&mut out, cfg.types(), func);
        out.push('\n');
    }
    out
}

pub fn print_function(out: &mut String, types: &TypeContext, func: &Function) {
    let keyword = match func.linkage {
        Linkage::Import => "declare",
        _ => "define",
    };
    let _ = write!(out, "{} {} @{}(", keyword, type_name(types, func.return_ty), func.name);
    for (i, &param_ty) in func.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{} {}", type_name(types, param_ty), value_name(func.arg(i)));
    }
    out.push(')');

    if matches!(func.linkage, Linkage::Import) {
        out.push('\n');
        return;
    }
    out.push_str(" {\n");

    for block in func.blocks() {
        let _ = writeln!(out, "{}:", block_name(block));
        for inst in func.insts_in(block) {
            print_inst(out, types, func, inst);
        }
    }
    out.push_str("}\n");
}

fn print_inst(out: &mut String, types: &TypeContext, func: &Function, inst: Inst) {
    let data = func.inst(inst);
    out.push_str("  ");
    if let Some(result) = data.result {
        let _ = write!(out, "{} = ", value_name(result));
    }
    let _ = write!(out, "{}", opcode_mnemonic(data.opcode));
    if let Some(ty) = data.ty {
        let _ = write!(out, " {}", type_name(types, ty));
    }
    if data.opcode == Opcode::Phi {
        for (i, (&operand, &pred)) in data.operands.iter().zip(data.targets.iter()).enumerate() {
            out.push_str(if i == 0 { " [" } else { ", [" });
            let _ = write!(out, "{}, {}]", value_name(operand), block_name(pred));
        }
        out.push('\n');
        return;
    }
    for (i, &operand) in data.operands.iter().enumerate() {
        out.push_str(if i == 0 && data.ty.is_some() { " " } else { ", " });
        out.push_str(&value_name(operand));
    }
    for (i, &target) in data.targets.iter().enumerate() {
        if i == 0 && data.operands.is_empty() {
            out.push(' ');
        } else {
            out.push_str(", ");
        }
        out.push_str(&block_name(target));
    }
    match data.imm {
        Some(Immediate::Int(v)) => {
            let _ = write!(out, " {}", v);
        }
        Some(Immediate::Float(bits)) => {
            let _ = write!(out, " {}", f64::from_bits(bits));
        }
        None => {}
    }
    out.push('\n');
}

fn opcode_mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Nop => "nop",
        Opcode::IAdd => "iadd",
        Opcode::ISub => "isub",
        Opcode::IMul => "imul",
        Opcode::SDiv => "sdiv",
        Opcode::SRem => "srem",
        Opcode::UDiv => "udiv",
        Opcode::URem => "urem",
        Opcode::FAdd => "fadd",
        Opcode::FSub => "fsub",
        Opcode::FMul => "fmul",
        Opcode::FDiv => "fdiv",
        Opcode::FRem => "frem",
        Opcode::And => "and",
        Opcode::Or => "or",
        Opcode::Xor => "xor",
        Opcode::Shl => "shl",
        Opcode::AShr => "ashr",
        Opcode::LShr => "lshr",
        Opcode::Neg => "neg",
        Opcode::FNeg => "fneg",
        Opcode::Not => "not",
        Opcode::Trunc => "trunc",
        Opcode::ZExt => "zext",
        Opcode::SExt => "sext",
        Opcode::FpTrunc => "fptrunc",
        Opcode::FpExt => "fpext",
        Opcode::SiToFp => "sitofp",
        Opcode::UiToFp => "uitofp",
        Opcode::FpToSi => "fptosi",
        Opcode::FpToUi => "fptoui",
        Opcode::PtrToInt => "ptrtoint",
        Opcode::IntToPtr => "inttoptr",
        Opcode::Bitcast => "bitcast",
        Opcode::Reinterpret => "reinterpret",
        Opcode::ICmpEq => "icmp_eq",
        Opcode::ICmpNe => "icmp_ne",
        Opcode::ICmpSlt => "icmp_slt",
        Opcode::ICmpSle => "icmp_sle",
        Opcode::ICmpSgt => "icmp_sgt",
        Opcode::ICmpSge => "icmp_sge",
        Opcode::ICmpUlt => "icmp_ult",
        Opcode::ICmpUle => "icmp_ule",
        Opcode::ICmpUgt => "icmp_ugt",
        Opcode::ICmpUge => "icmp_uge",
        Opcode::FCmpOeq => "fcmp_oeq",
        Opcode::FCmpOne => "fcmp_one",
        Opcode::FCmpOlt => "fcmp_olt",
        Opcode::FCmpOle => "fcmp_ole",
        Opcode::FCmpOgt => "fcmp_ogt",
        Opcode::FCmpOge => "fcmp_oge",
        Opcode::FCmpUeq => "fcmp_ueq",
        Opcode::FCmpUne => "fcmp_une",
        Opcode::FCmpUlt => "fcmp_ult",
        Opcode::FCmpUle => "fcmp_ule",
        Opcode::FCmpUgt => "fcmp_ugt",
        Opcode::FCmpUge => "fcmp_uge",
        Opcode::FCmpOrd => "fcmp_ord",
        Opcode::FCmpUno => "fcmp_uno",
        Opcode::Load => "load",
        Opcode::Store => "store",
        Opcode::Alloca => "alloca",
        Opcode::GetElementPtr => "getelementptr",
        Opcode::Jump => "jump",
        Opcode::BranchIf => "br_if",
        Opcode::Phi => "phi",
        Opcode::Ret => "ret",
        Opcode::Abort => "abort",
        Opcode::Unreachable => "unreachable",
        Opcode::Select => "select",
        Opcode::Call => "call",
        Opcode::ConstInt => "const_int",
        Opcode::ConstFloat => "const_float",
        Opcode::ConstNull => "const_null",
        Opcode::ConstString => "const_string",
    }
}

fn value_name(value: Value) -> String {
    format!("%{}", value.as_u32_for_display())
}

/// `Value`/`Block` only expose `Debug`; `as_u32_for_display` below pulls
/// the raw index back out so the printer can format `%v3`/`bb2` without
/// depending on the entity's private representation.
trait DisplayIndex {
    fn as_u32_for_display(&self) -> u32;
}

impl DisplayIndex for Value {
    fn as_u32_for_display(&self) -> u32 {
        cranelift_entity::EntityRef::index(*self) as u32
    }
}

impl DisplayIndex for Block {
    fn as_u32_for_display(&self) -> u32 {
        cranelift_entity::EntityRef::index(*self) as u32
    }
}

fn block_name(block: Block) -> String {
    format!("bb{}", block.as_u32_for_display())
}

fn type_name(types: &TypeContext, ty: TypeId) -> String {
    match types.view(ty) {
        TypeView::Void => "void".to_string(),
        TypeView::Int1 => "i1".to_string(),
        TypeView::Int8 => "i8".to_string(),
        TypeView::Int16 => "i16".to_string(),
        TypeView::Int32 => "i32".to_string(),
        TypeView::Int64 => "i64".to_string(),
        TypeView::Float32 => "f32".to_string(),
        TypeView::Float64 => "f64".to_string(),
        TypeView::Pointer(pointee) => format!("{}*", type_name(types, pointee)),
        TypeView::Array(element, n) => format!("[{} x {}]", n, type_name(types, element)),
        TypeView::Function(ret, params) => {
            let params: Vec<_> = params.iter().map(|&p| type_name(types, p)).collect();
            format!("{}({})", type_name(types, ret), params.join(", "))
        }
        TypeView::Struct { name, .. } => format!("%{}", name),
        TypeView::Deferred { base, .. } => format!("<deferred {}>", base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Linkage;
    use crate::instruction::Instruction;

    #[test]
    fn identity_function_prints_a_single_block_with_a_ret() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let id = cfg.declare_function("identity", vec![i32_ty], i32_ty, Linkage::Export);
        let func = cfg.function_mut(id);
        let entry = func.create_block();
        let mut ret = Instruction::new(Opcode::Ret, entry);
        ret.operands.push(func.arg(0));
        ret.ty = Some(i32_ty);
        func.append_inst(entry, ret);

        let mut buf = String::new();
        print_function(&mut buf, cfg.types(), cfg.function(id));
        assert!(buf.contains("define i32 @identity(i32 %v0)"));
        assert!(buf.contains("ret i32 %v0"));
    }
}
