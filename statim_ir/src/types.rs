//! The uniqued type system of spec §3.1 / §4.1.
//!
//! Every [`TypeId`] is stamped with an identity on construction and
//! equality is identity equality (`TypeId` is `Copy` and `PartialEq` over
//! its raw index). A [`TypeContext`] owns every [`TypeData`] and is the
//! only thing allowed to mint a `TypeId` — mirroring the "CFG is the only
//! component permitted to allocate types" rule of §3.6, one level down.

use cranelift_entity::{entity_impl, PrimaryMap};
use hashbrown::HashMap;
use smallvec::SmallVec;
use statim_common::{CompileError, CompileResult};
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);
entity_impl!(TypeId, "t");

/// A frontend scope reference carried by [`TypeData::Deferred`], opaque to
/// this crate. `statim_sema` owns the actual scope tree and converts its
/// `ScopeId` to/from this handle at the boundary, keeping `statim_ir` free
/// of a dependency on the AST/sema crates (Design Notes §9: "keep scopes
/// separate").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StructShape {
    name: String,
    fields: Vec<(String, TypeId)>,
    opaque: bool,
    /// Set by the `$packed` rune (SPEC_FULL.md Open Question 3): the
    /// target layout oracle skips inter-field alignment padding when set.
    packed: bool,
}

#[derive(Debug)]
enum TypeData {
    Void,
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Pointer(TypeId),
    Array(TypeId, u64),
    Function(TypeId, SmallVec<[TypeId; 4]>),
    Struct {
        shape: StructShape,
        /// Set the first time a layout query (size/align/offset) touches
        /// this struct. Further `append_field` calls then fail with
        /// `InvalidatedLayout` (§4.1). `Cell` because layout queries only
        /// need `&TypeContext`.
        layout_queried: Cell<bool>,
    },
    Deferred {
        base: String,
        indirection: u32,
        scope: ScopeHandle,
        mutable: bool,
    },
}

/// One of the closed set of type shapes recognized by spec §3.1, as
/// observed from outside the context (a read-only view of `TypeData`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeView<'a> {
    Void,
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Pointer(TypeId),
    Array(TypeId, u64),
    Function(TypeId, &'a [TypeId]),
    Struct { name: &'a str, fields: &'a [(String, TypeId)], opaque: bool, packed: bool },
    Deferred { base: &'a str, indirection: u32, scope: ScopeHandle, mutable: bool },
}

/// Owns every [`TypeId`] minted for one compilation unit; uniqueness rule
/// per §4.1: structurally-equivalent non-named types collapse to one
/// instance, named structs collapse on name alone.
pub struct TypeContext {
    data: PrimaryMap<TypeId, TypeData>,
    leaves: [TypeId; 8],
    pointers: HashMap<TypeId, TypeId>,
    arrays: HashMap<(TypeId, u64), TypeId>,
    functions: HashMap<(TypeId, SmallVec<[TypeId; 4]>), TypeId>,
    structs_by_name: HashMap<String, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        let mut data = PrimaryMap::new();
        let leaves = [
            data.push(TypeData::Void),
            data.push(TypeData::Int1),
            data.push(TypeData::Int8),
            data.push(TypeData::Int16),
            data.push(TypeData::Int32),
            data.push(TypeData::Int64),
            data.push(TypeData::Float32),
            data.push(TypeData::Float64),
        ];
        Self {
            data,
            leaves,
            pointers: HashMap::new(),
            arrays: HashMap::new(),
            functions: HashMap::new(),
            structs_by_name: HashMap::new(),
        }
    }

    pub fn void(&self) -> TypeId {
        self.leaves[0]
    }
    pub fn int1(&self) -> TypeId {
        self.leaves[1]
    }
    pub fn int8(&self) -> TypeId {
        self.leaves[2]
    }
    pub fn int16(&self) -> TypeId {
        self.leaves[3]
    }
    pub fn int32(&self) -> TypeId {
        self.leaves[4]
    }
    pub fn int64(&self) -> TypeId {
        self.leaves[5]
    }
    pub fn float32(&self) -> TypeId {
        self.leaves[6]
    }
    pub fn float64(&self) -> TypeId {
        self.leaves[7]
    }

    pub fn get_pointer(&mut self, pointee: TypeId) -> TypeId {
        if let Some(&id) = self.pointers.get(&pointee) {
            return id;
        }
        let id = self.data.push(TypeData::Pointer(pointee));
        self.pointers.insert(pointee, id);
        id
    }

    pub fn get_array(&mut self, element: TypeId, size: u64) -> TypeId {
        if let Some(&id) = self.arrays.get(&(element, size)) {
            return id;
        }
        let id = self.data.push(TypeData::Array(element, size));
        self.arrays.insert((element, size), id);
        id
    }

    pub fn get_function(&mut self, ret: TypeId, params: &[TypeId]) -> TypeId {
        let key_params: SmallVec<[TypeId; 4]> = params.iter().copied().collect();
        let key = (ret, key_params.clone());
        if let Some(&id) = self.functions.get(&key) {
            return id;
        }
        let id = self.data.push(TypeData::Function(ret, key_params));
        self.functions.insert(key, id);
        id
    }

    /// Declares (or looks up) an opaque struct by name. A second call with
    /// the same name returns the same `TypeId` regardless of `fields`,
    /// matching the "named structs collapse on name" rule; pass an empty
    /// `fields` slice to forward-declare.
    pub fn get_struct(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.structs_by_name.get(name) {
            return id;
        }
        let id = self.data.push(TypeData::Struct {
            shape: StructShape { name: name.to_string(), fields: Vec::new(), opaque: true, packed: false },
            layout_queried: Cell::new(false),
        });
        self.structs_by_name.insert(name.to_string(), id);
        id
    }

    /// Marks a struct as carrying the `$packed` rune. May be called any
    /// time before the struct's layout is first queried, same as
    /// `append_field`.
    pub fn set_packed(&mut self, struct_ty: TypeId, packed: bool) {
        match &mut self.data[struct_ty] {
            TypeData::Struct { shape, .. } => shape.packed = packed,
            _ => panic!("set_packed called on a non-struct TypeId"),
        }
    }

    /// Appends a field to a previously-declared struct. Fails once the
    /// struct's layout has been queried (§4.1 `InvalidatedLayout`).
    pub fn append_field(&mut self, struct_ty: TypeId, field_name: &str, field_ty: TypeId) -> CompileResult<()> {
        match &mut self.data[struct_ty] {
            TypeData::Struct { shape, layout_queried } => {
                if layout_queried.get() {
                    return Err(CompileError::InvalidatedLayout { name: shape.name.clone() });
                }
                shape.fields.push((field_name.to_string(), field_ty));
                shape.opaque = false;
                Ok(())
            }
            _ => panic!("append_field called on a non-struct TypeId"),
        }
    }

    /// Marks a struct's layout as queried; called by the target layout
    /// oracle before it computes size/align/offsets. Internal to this
    /// crate — `statim_ir::target` is the only caller.
    pub(crate) fn mark_layout_queried(&self, struct_ty: TypeId) {
        if let TypeData::Struct { layout_queried, .. } = &self.data[struct_ty] {
            layout_queried.set(true);
        }
    }

    pub fn get_deferred(&mut self, base: &str, indirection: u32, scope: ScopeHandle, mutable: bool) -> TypeId {
        self.data.push(TypeData::Deferred { base: base.to_string(), indirection, scope, mutable })
    }

    pub fn lookup_struct_by_name(&self, name: &str) -> Option<TypeId> {
        self.structs_by_name.get(name).copied()
    }

    pub fn view(&self, ty: TypeId) -> TypeView<'_> {
        match &self.data[ty] {
            TypeData::Void => TypeView::Void,
            TypeData::Int1 => TypeView::Int1,
            TypeData::Int8 => TypeView::Int8,
            TypeData::Int16 => TypeView::Int16,
            TypeData::Int32 => TypeView::Int32,
            TypeData::Int64 => TypeView::Int64,
            TypeData::Float32 => TypeView::Float32,
            TypeData::Float64 => TypeView::Float64,
            TypeData::Pointer(p) => TypeView::Pointer(*p),
            TypeData::Array(e, n) => TypeView::Array(*e, *n),
            TypeData::Function(ret, params) => TypeView::Function(*ret, params),
            TypeData::Struct { shape, .. } => {
                TypeView::Struct { name: &shape.name, fields: &shape.fields, opaque: shape.opaque, packed: shape.packed }
            }
            TypeData::Deferred { base, indirection, scope, mutable } => {
                TypeView::Deferred { base, indirection: *indirection, scope: *scope, mutable: *mutable }
            }
        }
    }

    pub fn is_deferred(&self, ty: TypeId) -> bool {
        matches!(self.data[ty], TypeData::Deferred { .. })
    }

    pub fn is_void(&self, ty: TypeId) -> bool {
        matches!(self.data[ty], TypeData::Void)
    }

    pub fn is_integer(&self, ty: TypeId) -> bool {
        matches!(
            self.data[ty],
            TypeData::Int1 | TypeData::Int8 | TypeData::Int16 | TypeData::Int32 | TypeData::Int64
        )
    }

    pub fn is_float(&self, ty: TypeId) -> bool {
        matches!(self.data[ty], TypeData::Float32 | TypeData::Float64)
    }

    pub fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(self.data[ty], TypeData::Pointer(_))
    }

    /// Integers, floats and pointers — per §4.2 `is_scalar`.
    pub fn is_scalar(&self, ty: TypeId) -> bool {
        self.is_integer(ty) || self.is_float(ty) || self.is_pointer(ty)
    }

    /// Bit width of an integer/float leaf type, for opcode/width
    /// dispatch. Panics on aggregates; those go through the layout
    /// oracle instead.
    pub fn scalar_bits(&self, ty: TypeId) -> u32 {
        match self.data[ty] {
            TypeData::Int1 => 1,
            TypeData::Int8 => 8,
            TypeData::Int16 => 16,
            TypeData::Int32 | TypeData::Float32 => 32,
            TypeData::Int64 | TypeData::Float64 | TypeData::Pointer(_) => 64,
            ref other => panic!("scalar_bits called on non-scalar type {:?}", other),
        }
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_are_stable_across_calls() {
        let ctx = TypeContext::new();
        assert_eq!(ctx.void(), ctx.void());
        assert_ne!(ctx.void(), ctx.int32());
    }

    #[test]
    fn pointer_identity_is_uniqued() {
        let mut ctx = TypeContext::new();
        let i32_ty = ctx.int32();
        let p1 = ctx.get_pointer(i32_ty);
        let p2 = ctx.get_pointer(i32_ty);
        assert_eq!(p1, p2);
        let p3 = ctx.get_pointer(ctx.int64());
        assert_ne!(p1, p3);
    }

    #[test]
    fn array_identity_keys_on_element_and_size() {
        let mut ctx = TypeContext::new();
        let i8_ty = ctx.int8();
        let a1 = ctx.get_array(i8_ty, 4);
        let a2 = ctx.get_array(i8_ty, 4);
        let a3 = ctx.get_array(i8_ty, 8);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);
    }

    #[test]
    fn named_struct_lookup_returns_same_instance() {
        let mut ctx = TypeContext::new();
        let s1 = ctx.get_struct("Point");
        let s2 = ctx.get_struct("Point");
        assert_eq!(s1, s2);
    }

    #[test]
    fn field_append_fails_after_layout_query() {
        let mut ctx = TypeContext::new();
        let s = ctx.get_struct("Point");
        let i32_ty = ctx.int32();
        ctx.append_field(s, "x", i32_ty).unwrap();
        ctx.mark_layout_queried(s);
        let err = ctx.append_field(s, "y", i32_ty).unwrap_err();
        assert!(matches!(err, CompileError::InvalidatedLayout { .. }));
    }

    #[test]
    fn function_identity_keys_on_return_and_params() {
        let mut ctx = TypeContext::new();
        let i32_ty = ctx.int32();
        let f1 = ctx.get_function(i32_ty, &[i32_ty, i32_ty]);
        let f2 = ctx.get_function(i32_ty, &[i32_ty, i32_ty]);
        let f3 = ctx.get_function(i32_ty, &[i32_ty]);
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
    }
}
