//! `Cfg`: the top-level compilation unit, owning every function, global
//! and the shared type context (spec §3.6/§4.6).

use crate::function::{FuncId, Function, Linkage};
use crate::types::{TypeContext, TypeId};
use crate::value::GlobalId;
use cranelift_entity::PrimaryMap;
use hashbrown::HashMap;

#[derive(Debug, Clone)]
pub struct GlobalData {
    pub name: String,
    pub ty: TypeId,
    pub linkage: Linkage,
    pub initial_value: Option<i64>,
}

/// The whole-program graph: every function and global a translation unit
/// defines, plus the one `TypeContext` they all share. Mirrors the "CFG
/// is the only thing that allocates types" rule of §3.6 one level up —
/// here `Cfg` is the only thing that allocates functions and globals.
pub struct Cfg {
    types: TypeContext,
    functions: PrimaryMap<FuncId, Function>,
    functions_by_name: HashMap<String, FuncId>,
    globals: PrimaryMap<GlobalId, GlobalData>,
    globals_by_name: HashMap<String, GlobalId>,
    /// Interned string literal bytes backing `Opcode::ConstString`, keyed
    /// by the index its `imm` carries.
    strings: Vec<String>,
    strings_by_value: HashMap<String, u32>,
}

impl Cfg {
    pub fn new() -> Self {
        Self::with_types(TypeContext::new())
    }

    /// Builds a `Cfg` around a `TypeContext` populated by an earlier pass
    /// (`statim_sema`'s name/type resolution mints `TypeId`s before any
    /// function body is lowered, and `statim_lower` hands that same
    /// context in here rather than re-uniquing every type).
    pub fn with_types(types: TypeContext) -> Self {
        Self {
            types,
            functions: PrimaryMap::new(),
            functions_by_name: HashMap::new(),
            globals: PrimaryMap::new(),
            globals_by_name: HashMap::new(),
            strings: Vec::new(),
            strings_by_value: HashMap::new(),
        }
    }

    /// Interns a string literal's bytes, returning the index an
    /// `Opcode::ConstString`'s `imm` carries. Repeated interning of the
    /// same bytes returns the same index.
    pub fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.strings_by_value.get(value) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.strings_by_value.insert(value.to_string(), id);
        id
    }

    pub fn string(&self, index: u32) -> &str {
        &self.strings[index as usize]
    }

    pub fn types(&self) -> &TypeContext {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeContext {
        &mut self.types
    }

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<TypeId>,
        return_ty: TypeId,
        linkage: Linkage,
    ) -> FuncId {
        let name = name.into();
        if let Some(&id) = self.functions_by_name.get(&name) {
            return id;
        }
        let id = self.functions.push(Function::new(name.clone(), params, return_ty, linkage));
        self.functions_by_name.insert(name, id);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id]
    }

    /// Splits a mutable borrow across the shared type context and one
    /// function's body, for `statim_lower`'s body-lowering pass, which
    /// needs to mint pointer/array types on the fly (`TypeContext`) while
    /// it appends instructions to the function being built (`Function`) —
    /// two disjoint fields `&mut self` alone can't hand out separately.
    pub fn types_and_function_mut(&mut self, id: FuncId) -> (&mut TypeContext, &mut Function) {
        (&mut self.types, &mut self.functions[id])
    }

    pub fn lookup_function(&self, name: &str) -> Option<FuncId> {
        self.functions_by_name.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter()
    }

    pub fn declare_global(&mut self, name: impl Into<String>, ty: TypeId, linkage: Linkage, initial_value: Option<i64>) -> GlobalId {
        let name = name.into();
        if let Some(&id) = self.globals_by_name.get(&name) {
            return id;
        }
        let id = self.globals.push(GlobalData { name: name.clone(), ty, linkage, initial_value });
        self.globals_by_name.insert(name, id);
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalData {
        &self.globals[id]
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalId> {
        self.globals_by_name.get(name).copied()
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaring_the_same_function_name_twice_returns_one_id() {
        let mut cfg = Cfg::new();
        let i32_ty = cfg.types().int32();
        let a = cfg.declare_function("main", vec![], i32_ty, Linkage::Export);
        let b = cfg.declare_function("main", vec![], i32_ty, Linkage::Export);
        assert_eq!(a, b);
    }
}
