//! The target layout oracle of spec §4.2: size, alignment and field
//! offsets as a function of an `(Arch, Abi, Os)` triple. Only
//! `(X64, SystemV, Linux)` has defined rules; every other triple is a
//! recognized-but-unimplemented configuration, per spec — asking it for a
//! layout is a `CompileError::UnsupportedType`, not a panic, since a
//! caller can legitimately probe `Target::is_supported()` first.

use crate::types::{TypeContext, TypeId, TypeView};
use statim_common::{CompileError, CompileResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    SystemV,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub arch: Arch,
    pub abi: Abi,
    pub os: Os,
}

impl Target {
    pub const fn new(arch: Arch, abi: Abi, os: Os) -> Self {
        Self { arch, abi, os }
    }

    pub const fn x64_linux() -> Self {
        Self::new(Arch::X64, Abi::SystemV, Os::Linux)
    }

    pub fn is_supported(&self) -> bool {
        matches!((self.arch, self.abi, self.os), (Arch::X64, Abi::SystemV, Os::Linux))
    }
}

/// Size and alignment of a type under a target, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

impl Layout {
    const fn scalar(bytes: u64) -> Self {
        Self { size: bytes, align: bytes }
    }
}

/// Computes sizes, alignments and struct field offsets for one target.
/// Struct layouts are memoized is not needed here: `TypeContext` is the
/// source of truth and a struct's shape is append-only until queried, so
/// repeated queries are cheap pure recursion.
pub struct LayoutOracle {
    target: Target,
}

impl LayoutOracle {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn layout(&self, types: &TypeContext, ty: TypeId) -> CompileResult<Layout> {
        if !self.target.is_supported() {
            return Err(CompileError::UnsupportedType {
                description: format!("layout queries on {:?} are not implemented", self.target),
            });
        }
        self.layout_x64_systemv(types, ty)
    }

    fn layout_x64_systemv(&self, types: &TypeContext, ty: TypeId) -> CompileResult<Layout> {
        match types.view(ty) {
            TypeView::Void => Ok(Layout { size: 0, align: 1 }),
            TypeView::Int1 | TypeView::Int8 => Ok(Layout::scalar(1)),
            TypeView::Int16 => Ok(Layout::scalar(2)),
            TypeView::Int32 | TypeView::Float32 => Ok(Layout::scalar(4)),
            TypeView::Int64 | TypeView::Float64 | TypeView::Pointer(_) => Ok(Layout::scalar(8)),
            TypeView::Array(element, count) => {
                let elem = self.layout_x64_systemv(types, element)?;
                Ok(Layout { size: elem.size * count, align: elem.align })
            }
            TypeView::Function(..) => Err(CompileError::UnsupportedType {
                description: "function types have no storage layout".to_string(),
            }),
            TypeView::Deferred { .. } => Err(CompileError::UnsupportedType {
                description: "cannot lay out a deferred type; sema must resolve it first".to_string(),
            }),
            TypeView::Struct { opaque, .. } if opaque => Err(CompileError::UnsupportedType {
                description: "cannot lay out an opaque (forward-declared) struct".to_string(),
            }),
            TypeView::Struct { fields, packed, .. } => {
                types.mark_layout_queried(ty);
                let mut size = 0u64;
                let mut align = 1u64;
                for (_, field_ty) in fields {
                    let field_layout = self.layout_x64_systemv(types, *field_ty)?;
                    if !packed {
                        size = round_up(size, field_layout.align);
                        align = align.max(field_layout.align);
                    }
                    size += field_layout.size;
                }
                if !packed {
                    size = round_up(size, align);
                }
                Ok(Layout { size, align })
            }
        }
    }

    /// Byte offset of `field_index` within a struct, recomputing the
    /// preceding fields' layouts. Returns `None` for an out-of-range
    /// index.
    pub fn field_offset(&self, types: &TypeContext, struct_ty: TypeId, field_index: usize) -> CompileResult<Option<u64>> {
        let TypeView::Struct { fields, opaque, packed, .. } = types.view(struct_ty) else {
            return Err(CompileError::UnsupportedType {
                description: "field_offset called on a non-struct type".to_string(),
            });
        };
        if opaque || field_index >= fields.len() {
            return Ok(None);
        }
        types.mark_layout_queried(struct_ty);
        let mut offset = 0u64;
        for (i, (_, field_ty)) in fields.iter().enumerate() {
            let field_layout = self.layout_x64_systemv(types, *field_ty)?;
            if !packed {
                offset = round_up(offset, field_layout.align);
            }
            if i == field_index {
                return Ok(Some(offset));
            }
            offset += field_layout.size;
        }
        unreachable!("field_index already bounds-checked")
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_target_rejects_every_query() {
        let target = Target::new(Arch::X64, Abi::SystemV, Os::Linux);
        assert!(target.is_supported());
    }

    #[test]
    fn scalar_layouts_match_x86_64_sysv() {
        let types = TypeContext::new();
        let oracle = LayoutOracle::new(Target::x64_linux());
        assert_eq!(oracle.layout(&types, types.int8()).unwrap(), Layout { size: 1, align: 1 });
        assert_eq!(oracle.layout(&types, types.int64()).unwrap(), Layout { size: 8, align: 8 });
        assert_eq!(oracle.layout(&types, types.float64()).unwrap(), Layout { size: 8, align: 8 });
    }

    #[test]
    fn struct_fields_are_padded_to_their_alignment() {
        let mut types = TypeContext::new();
        let i8_ty = types.int8();
        let i32_ty = types.int32();
        let s = types.get_struct("S");
        types.append_field(s, "a", i8_ty).unwrap();
        types.append_field(s, "b", i32_ty).unwrap();

        let oracle = LayoutOracle::new(Target::x64_linux());
        let layout = oracle.layout(&types, s).unwrap();
        assert_eq!(layout, Layout { size: 8, align: 4 });
        assert_eq!(oracle.field_offset(&types, s, 0).unwrap(), Some(0));
        assert_eq!(oracle.field_offset(&types, s, 1).unwrap(), Some(4));
    }

    #[test]
    fn packed_struct_skips_alignment_padding() {
        let mut types = TypeContext::new();
        let i8_ty = types.int8();
        let i32_ty = types.int32();
        let s = types.get_struct("Packed");
        types.append_field(s, "a", i8_ty).unwrap();
        types.append_field(s, "b", i32_ty).unwrap();
        types.set_packed(s, true);

        let oracle = LayoutOracle::new(Target::x64_linux());
        let layout = oracle.layout(&types, s).unwrap();
        assert_eq!(layout, Layout { size: 5, align: 1 });
        assert_eq!(oracle.field_offset(&types, s, 0).unwrap(), Some(0));
        assert_eq!(oracle.field_offset(&types, s, 1).unwrap(), Some(1));
    }

    #[test]
    fn array_layout_multiplies_element_size() {
        let mut types = TypeContext::new();
        let i32_ty = types.int32();
        let arr = types.get_array(i32_ty, 4);
        let oracle = LayoutOracle::new(Target::x64_linux());
        assert_eq!(oracle.layout(&types, arr).unwrap(), Layout { size: 16, align: 4 });
    }
}
