//! std140 / std430 size, alignment and offset rules.
//!
//! Scalars align to their own size. Vectors of 2 align to 2 scalars,
//! vectors of 3 and 4 both align to 4 scalars (the vec3-rounds-up-to-
//! vec4 rule). Arrays and structs round their stride/alignment up to a
//! multiple of 16 bytes under `Std140`; `Std430` drops that rounding.

use super::{Interner, Layout, Type, TypeKind};
use crate::arena::Handle;

#[derive(Clone, Copy)]
struct SizeAlign {
    size: u32,
    align: u32,
}

fn scalar_size(interner: &Interner, handle: Handle<Type>) -> u32 {
    match interner.kind(handle) {
        TypeKind::Bool => 4,
        TypeKind::Int { bits, .. } | TypeKind::Float { bits } => bits / 8,
        _ => panic!("not a scalar type"),
    }
}

fn size_align(interner: &Interner, handle: Handle<Type>, layout: Layout) -> SizeAlign {
    match interner.kind(handle) {
        TypeKind::Bool | TypeKind::Int { .. } | TypeKind::Float { .. } => {
            let s = scalar_size(interner, handle);
            SizeAlign { size: s, align: s }
        }
        TypeKind::Vector { elem, len } => {
            let scalar = scalar_size(interner, *elem);
            let align_count = if *len == 2 { 2 } else { 4 };
            SizeAlign {
                size: scalar * len,
                align: scalar * align_count,
            }
        }
        TypeKind::Matrix { col_type, cols } => {
            let col = size_align(interner, *col_type, layout);
            // Each column occupies a full vec4 slot under std140; under
            // std430 it keeps the column's own (already-rounded) align.
            let col_stride = round_up(col.size.max(col.align), col.align);
            SizeAlign {
                size: col_stride * cols,
                align: col.align,
            }
        }
        TypeKind::Array { elem, size, layout: arr_layout } => {
            array_size_align(interner, *elem, *size as u32, *arr_layout)
        }
        TypeKind::RuntimeArray { elem, layout: arr_layout } => {
            // A runtime array's own size is unknown until bound; report
            // its per-element stride as size for stride computations one
            // level up, callers must special-case it as the last member.
            array_size_align(interner, *elem, 1, *arr_layout)
        }
        TypeKind::Struct { fields, .. } => {
            let mut size = 0u32;
            let mut max_align = if layout == Layout::Std140 { 16 } else { 0 };
            for f in fields {
                let fa = size_align(interner, f.ty, layout);
                max_align = max_align.max(fa.align);
                size = round_up(size, fa.align);
                size += fa.size;
            }
            let align = if layout == Layout::Std140 {
                round_up(max_align, 16)
            } else {
                max_align
            };
            SizeAlign {
                size: round_up(size, align),
                align,
            }
        }
        TypeKind::Pointer { .. } => SizeAlign { size: 8, align: 8 },
        _ => panic!("type has no std140/std430 layout"),
    }
}

fn array_size_align(
    interner: &Interner,
    elem: Handle<Type>,
    count: u32,
    layout: Layout,
) -> SizeAlign {
    let elem_sa = size_align(interner, elem, layout);
    let stride = if layout == Layout::Std140 {
        round_up(elem_sa.size.max(elem_sa.align), 16)
    } else {
        round_up(elem_sa.size, elem_sa.align)
    };
    let align = if layout == Layout::Std140 {
        round_up(elem_sa.align, 16)
    } else {
        elem_sa.align
    };
    SizeAlign {
        size: stride * count,
        align,
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Computes per-field byte offsets plus overall size/alignment for a
/// struct with the given `layout`. When `layout` is `Unknown` (a plain
/// function-local aggregate with no buffer binding) offsets are packed
/// tightly with natural alignment, matching how the IR/emitter treat
/// non-block structs.
pub fn compute_struct_layout(
    interner: &Interner,
    fields: &[(String, Handle<Type>, bool)],
    layout: Layout,
) -> (Vec<u32>, u32, u32) {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut cursor = 0u32;
    let mut max_align = if layout == Layout::Std140 { 16 } else { 0 };
    for (_, ty, _) in fields {
        let fa = size_align(interner, *ty, layout);
        let align = if layout == Layout::Unknown {
            fa.align
        } else {
            fa.align
        };
        cursor = round_up(cursor, align);
        offsets.push(cursor);
        cursor += fa.size;
        max_align = max_align.max(align);
    }
    let align = if layout == Layout::Std140 {
        round_up(max_align, 16)
    } else {
        max_align.max(1)
    };
    let size = round_up(cursor, align);
    (offsets, size, align)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Interner;

    #[test]
    fn std140_vec4_then_scalar() {
        let mut interner = Interner::new();
        let float = interner.float(32);
        let float4 = interner.vector(float, 4);
        let fields = vec![("a".to_string(), float4, false), ("b".to_string(), float, false)];
        let (offsets, size, align) = compute_struct_layout(&interner, &fields, Layout::Std140);
        assert_eq!(offsets, vec![0, 16]);
        assert_eq!(size, 32);
        assert_eq!(align, 16);
    }

    #[test]
    fn std430_vec3_then_scalar() {
        let mut interner = Interner::new();
        let float = interner.float(32);
        let float3 = interner.vector(float, 3);
        let fields = vec![("a".to_string(), float3, false), ("b".to_string(), float, false)];
        let (offsets, size, align) = compute_struct_layout(&interner, &fields, Layout::Std430);
        assert_eq!(offsets, vec![0, 12]);
        assert_eq!(size, 16);
        assert_eq!(align, 16);
    }
}
