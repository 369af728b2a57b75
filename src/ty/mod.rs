//! C1: the type interner.
//!
//! Every structural type — `float4`, `struct(std140) { ... }`, a pointer
//! into uniform storage — is canonicalized to a unique [`Handle<Type>`].
//! Two calls that describe the same structural type return the same
//! handle; this is what lets the rest of the pipeline compare types by
//! handle equality instead of deep structural comparison.
//!
//! Grounded on naga's `Arena<Type>`/`Handle<Type>` substrate, extended
//! with the canonical-string interning table spec.md §4.1 calls for.

use crate::arena::{Arena, Handle};
use crate::FastHashMap;
use std::cell::Cell;

pub mod layout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Function,
    Parameter,
    Input,
    Output,
    Uniform,
    UniformConstant,
    Storage,
    PushConstant,
    Workgroup,
}

impl StorageClass {
    /// Default storage class for a `let` with no explicit `(class)`,
    /// depending on where the `let` appears.
    pub fn default_for_module_scope() -> Self {
        StorageClass::UniformConstant
    }
    pub fn default_for_function_scope() -> Self {
        StorageClass::Function
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    Unknown,
    Std140,
    Std430,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageDim {
    D1,
    D2,
    D3,
    Cube,
}

/// `location`/`builtin` attributes carried by a struct field, used when
/// the struct is an entry point's parameter or return type to decorate
/// the synthesized Input/Output global for that field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldAttrs {
    pub location: Option<u32>,
    pub builtin: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: Handle<Type>,
    /// Byte offset within the struct, meaningful when the struct's
    /// layout is `Std140`/`Std430`.
    pub offset: u32,
    pub read_only: bool,
    pub attrs: FieldAttrs,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    Void,
    /// The meta-type of a type expression (`expr.type == Type` when the
    /// expression denotes a type rather than a value).
    Type,
    Bool,
    String,
    UntypedInt,
    UntypedFloat,
    Int {
        bits: u32,
        signed: bool,
    },
    Float {
        bits: u32,
    },
    Vector {
        elem: Handle<Type>,
        len: u32,
    },
    Matrix {
        /// The type of a single column (a `Vector`).
        col_type: Handle<Type>,
        cols: u32,
    },
    Array {
        elem: Handle<Type>,
        size: u64,
        layout: Layout,
    },
    RuntimeArray {
        elem: Handle<Type>,
        layout: Layout,
    },
    Struct {
        name: Option<String>,
        layout: Layout,
        is_block: bool,
        fields: Vec<StructField>,
    },
    Pointer {
        sub: Handle<Type>,
        storage_class: StorageClass,
    },
    Function {
        ret: Handle<Type>,
        params: Vec<Handle<Type>>,
    },
    Sampler,
    Image {
        sampled_type: Handle<Type>,
        dim: ImageDim,
        depth: bool,
        arrayed: bool,
        multisampled: bool,
        sampled: bool,
    },
    SampledImage {
        image: Handle<Type>,
    },
}

#[derive(Debug)]
pub struct Type {
    pub kind: TypeKind,
    signature: String,
    pretty: String,
    /// Set once the type is known to be reachable from a live
    /// declaration; only live types are serialized to SPIR-V.
    emit: Cell<bool>,
}

impl Type {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn pretty_string(&self) -> &str {
        &self.pretty
    }

    pub fn is_live(&self) -> bool {
        self.emit.get()
    }

    fn mark(&self) -> bool {
        let was_live = self.emit.replace(true);
        !was_live
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

/// The process-per-compilation type interning table.
pub struct Interner {
    arena: Arena<Type>,
    by_signature: FastHashMap<String, Handle<Type>>,
    /// Insertion order, used later for stable emission ordering.
    order: Vec<Handle<Type>>,

    // Well-known primitive handles, created eagerly so callers don't pay
    // for re-deriving them.
    pub void: Handle<Type>,
    pub meta_type: Handle<Type>,
    pub bool_: Handle<Type>,
    pub string: Handle<Type>,
    pub untyped_int: Handle<Type>,
    pub untyped_float: Handle<Type>,
}

impl Interner {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let mut by_signature = FastHashMap::default();
        let mut order = Vec::new();

        let void = intern_raw(&mut arena, &mut by_signature, &mut order, "@void".into(), "void".into(), TypeKind::Void);
        let meta_type = intern_raw(&mut arena, &mut by_signature, &mut order, "@type".into(), "type".into(), TypeKind::Type);
        let bool_ = intern_raw(&mut arena, &mut by_signature, &mut order, "@bool".into(), "bool".into(), TypeKind::Bool);
        let string = intern_raw(&mut arena, &mut by_signature, &mut order, "@string".into(), "string".into(), TypeKind::String);
        let untyped_int = intern_raw(
            &mut arena,
            &mut by_signature,
            &mut order,
            "@untyped_int".into(),
            "{integer}".into(),
            TypeKind::UntypedInt,
        );
        let untyped_float = intern_raw(
            &mut arena,
            &mut by_signature,
            &mut order,
            "@untyped_float".into(),
            "{float}".into(),
            TypeKind::UntypedFloat,
        );

        Interner {
            arena,
            by_signature,
            order,
            void,
            meta_type,
            bool_,
            string,
            untyped_int,
            untyped_float,
        }
    }

    fn intern(&mut self, signature: String, pretty: String, kind: TypeKind) -> Handle<Type> {
        intern_raw(&mut self.arena, &mut self.by_signature, &mut self.order, signature, pretty, kind)
    }

    pub fn get(&self, handle: Handle<Type>) -> &Type {
        self.arena.try_get(handle).expect("dangling type handle")
    }

    pub fn kind(&self, handle: Handle<Type>) -> &TypeKind {
        &self.get(handle).kind
    }

    /// Types in the order they were first interned; used by the emitter
    /// to assign ids to live types in a stable sequence.
    pub fn order(&self) -> &[Handle<Type>] {
        &self.order
    }

    pub fn int(&mut self, bits: u32, signed: bool) -> Handle<Type> {
        let sign_char = if signed { 's' } else { 'u' };
        let signature = format!("@int{}{}", bits, sign_char);
        let pretty = format!(
            "{}{}",
            if signed { "i" } else { "u" },
            bits
        );
        self.intern(signature, pretty, TypeKind::Int { bits, signed })
    }

    pub fn float(&mut self, bits: u32) -> Handle<Type> {
        let signature = format!("@float{}", bits);
        let pretty = format!("f{}", bits);
        self.intern(signature, pretty, TypeKind::Float { bits })
    }

    pub fn vector(&mut self, elem: Handle<Type>, len: u32) -> Handle<Type> {
        let signature = format!("@vector({},{})", self.get(elem).signature, len);
        let pretty = format!("{}{}", self.get(elem).pretty, len);
        self.intern(signature, pretty, TypeKind::Vector { elem, len })
    }

    pub fn matrix(&mut self, col_type: Handle<Type>, cols: u32) -> Handle<Type> {
        let signature = format!("@matrix({},{})", self.get(col_type).signature, cols);
        let rows = match self.kind(col_type) {
            TypeKind::Vector { len, .. } => *len,
            _ => panic!("matrix column type must be a vector"),
        };
        let elem_pretty = match self.kind(col_type) {
            TypeKind::Vector { elem, .. } => self.get(*elem).pretty.clone(),
            _ => unreachable!(),
        };
        let pretty = format!("{}{}x{}", elem_pretty, cols, rows);
        self.intern(signature, pretty, TypeKind::Matrix { col_type, cols })
    }

    pub fn pointer(&mut self, sub: Handle<Type>, storage_class: StorageClass) -> Handle<Type> {
        let signature = format!(
            "@ptr({},{})",
            self.get(sub).signature,
            storage_class_tag(storage_class)
        );
        let pretty = format!("ptr<{}>", self.get(sub).pretty);
        self.intern(
            signature,
            pretty,
            TypeKind::Pointer { sub, storage_class },
        )
    }

    pub fn array(&mut self, elem: Handle<Type>, size: u64, layout: Layout) -> Handle<Type> {
        let signature = format!(
            "@array({},{},{:?})",
            self.get(elem).signature,
            size,
            layout
        );
        let pretty = format!("{}[{}]", self.get(elem).pretty, size);
        self.intern(
            signature,
            pretty,
            TypeKind::Array {
                elem,
                size,
                layout,
            },
        )
    }

    pub fn runtime_array(&mut self, elem: Handle<Type>, layout: Layout) -> Handle<Type> {
        let signature = format!("@runtime_array({},{:?})", self.get(elem).signature, layout);
        let pretty = format!("{}[]", self.get(elem).pretty);
        self.intern(
            signature,
            pretty,
            TypeKind::RuntimeArray { elem, layout },
        )
    }

    pub fn function(&mut self, ret: Handle<Type>, params: Vec<Handle<Type>>) -> Handle<Type> {
        let signature = format!(
            "@fn({},[{}])",
            self.get(ret).signature,
            params
                .iter()
                .map(|p| self.get(*p).signature.clone())
                .collect::<Vec<_>>()
                .join(",")
        );
        let pretty = format!(
            "fn({}) -> {}",
            params
                .iter()
                .map(|p| self.get(*p).pretty.clone())
                .collect::<Vec<_>>()
                .join(", "),
            self.get(ret).pretty
        );
        self.intern(signature, pretty, TypeKind::Function { ret, params })
    }

    pub fn sampler(&mut self) -> Handle<Type> {
        self.intern("@sampler".into(), "sampler".into(), TypeKind::Sampler)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn image(
        &mut self,
        sampled_type: Handle<Type>,
        dim: ImageDim,
        depth: bool,
        arrayed: bool,
        multisampled: bool,
        sampled: bool,
    ) -> Handle<Type> {
        let signature = format!(
            "@image({},{:?},{},{},{},{})",
            self.get(sampled_type).signature,
            dim,
            depth,
            arrayed,
            multisampled,
            sampled
        );
        let pretty = format!("image{:?}", dim);
        self.intern(
            signature,
            pretty,
            TypeKind::Image {
                sampled_type,
                dim,
                depth,
                arrayed,
                multisampled,
                sampled,
            },
        )
    }

    pub fn sampled_image(&mut self, image: Handle<Type>) -> Handle<Type> {
        let signature = format!("@sampled_image({})", self.get(image).signature);
        let pretty = format!("sampled({})", self.get(image).pretty);
        self.intern(signature, pretty, TypeKind::SampledImage { image })
    }

    /// Construct a struct type, computing std140/std430 byte offsets for
    /// its fields up front when `layout` requests one. See
    /// [`layout::compute_struct_layout`] for the rules.
    pub fn struct_(
        &mut self,
        name: Option<String>,
        layout: Layout,
        is_block: bool,
        mut fields: Vec<(String, Handle<Type>, bool, FieldAttrs)>,
    ) -> (Handle<Type>, u32, u32) {
        let layout_fields: Vec<(String, Handle<Type>, bool)> = fields
            .iter()
            .map(|(name, ty, read_only, _)| (name.clone(), *ty, *read_only))
            .collect();
        let (offsets, size, align) = layout::compute_struct_layout(self, &layout_fields, layout);
        let fields: Vec<StructField> = fields
            .drain(..)
            .zip(offsets)
            .map(|((name, ty, read_only, attrs), offset)| StructField {
                name,
                ty,
                offset,
                read_only,
                attrs,
            })
            .collect();
        let signature = format!(
            "@struct({:?},{},[{}])",
            layout,
            is_block,
            fields
                .iter()
                .map(|f| format!("{}:{}@{}", f.name, self.get(f.ty).signature, f.offset))
                .collect::<Vec<_>>()
                .join(",")
        );
        let pretty = format!(
            "struct {} {{ {} }}",
            name.as_deref().unwrap_or(""),
            fields
                .iter()
                .map(|f| format!("{}: {}", f.name, self.get(f.ty).pretty))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let handle = self.intern(
            signature,
            pretty,
            TypeKind::Struct {
                name,
                layout,
                is_block,
                fields,
            },
        );
        (handle, size, align)
    }

    /// Returns the field index for `name`, if `handle` is a struct with
    /// such a field.
    pub fn struct_field_index(&self, handle: Handle<Type>, name: &str) -> Option<usize> {
        match self.kind(handle) {
            TypeKind::Struct { fields, .. } => fields.iter().position(|f| f.name == name),
            _ => None,
        }
    }

    /// The underlying scalar of a vector/matrix/scalar type.
    /// `duskGetScalarType` in the original.
    pub fn scalar_type(&self, handle: Handle<Type>) -> Handle<Type> {
        match self.kind(handle) {
            TypeKind::Vector { elem, .. } => *elem,
            TypeKind::Matrix { col_type, .. } => self.scalar_type(*col_type),
            _ => handle,
        }
    }

    /// Recursively marks `handle` and every type it references as live.
    pub fn mark_live(&self, handle: Handle<Type>) {
        let ty = self.get(handle);
        if !ty.mark() {
            return;
        }
        match &ty.kind {
            TypeKind::Vector { elem, .. } => self.mark_live(*elem),
            TypeKind::Matrix { col_type, .. } => self.mark_live(*col_type),
            TypeKind::Array { elem, .. } | TypeKind::RuntimeArray { elem, .. } => {
                self.mark_live(*elem)
            }
            TypeKind::Struct { fields, .. } => {
                for f in fields {
                    self.mark_live(f.ty);
                }
            }
            TypeKind::Pointer { sub, .. } => self.mark_live(*sub),
            TypeKind::Function { ret, params } => {
                self.mark_live(*ret);
                for p in params {
                    self.mark_live(*p);
                }
            }
            TypeKind::Image { sampled_type, .. } => self.mark_live(*sampled_type),
            TypeKind::SampledImage { image } => self.mark_live(*image),
            _ => {}
        }
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

fn intern_raw(
    arena: &mut Arena<Type>,
    by_signature: &mut FastHashMap<String, Handle<Type>>,
    order: &mut Vec<Handle<Type>>,
    signature: String,
    pretty: String,
    kind: TypeKind,
) -> Handle<Type> {
    if let Some(&handle) = by_signature.get(&signature) {
        return handle;
    }
    let handle = arena.append(Type {
        kind,
        signature: signature.clone(),
        pretty,
        emit: Cell::new(false),
    });
    by_signature.insert(signature, handle);
    order.push(handle);
    handle
}

fn storage_class_tag(class: StorageClass) -> &'static str {
    match class {
        StorageClass::Function => "function",
        StorageClass::Parameter => "parameter",
        StorageClass::Input => "input",
        StorageClass::Output => "output",
        StorageClass::Uniform => "uniform",
        StorageClass::UniformConstant => "uniform_constant",
        StorageClass::Storage => "storage",
        StorageClass::PushConstant => "push_constant",
        StorageClass::Workgroup => "workgroup",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::new();
        let float_a = interner.float(32);
        let a = interner.vector(float_a, 4);
        let float_b = interner.float(32);
        let b = interner.vector(float_b, 4);
        assert_eq!(a, b);
        assert_eq!(interner.get(a).signature(), interner.get(b).signature());
    }

    #[test]
    fn distinct_types_stay_distinct() {
        let mut interner = Interner::new();
        let v3 = interner.float(32);
        let v3 = interner.vector(v3, 3);
        let v4f = interner.float(32);
        let v4 = interner.vector(v4f, 4);
        assert_ne!(v3, v4);
    }

    #[test]
    fn pointer_types_intern_by_pointee_and_storage_class() {
        let mut interner = Interner::new();
        let float = interner.float(32);
        let p1 = interner.pointer(float, StorageClass::Function);
        let p2 = interner.pointer(float, StorageClass::Function);
        let p3 = interner.pointer(float, StorageClass::Uniform);
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
    }

    #[test]
    fn struct_field_index_resolves_by_name() {
        let mut interner = Interner::new();
        let float = interner.float(32);
        let (handle, _, _) = interner.struct_(
            None,
            Layout::Unknown,
            false,
            vec![
                ("a".to_string(), float, false, FieldAttrs::default()),
                ("b".to_string(), float, false, FieldAttrs::default()),
            ],
        );
        assert_eq!(interner.struct_field_index(handle, "b"), Some(1));
        assert_eq!(interner.struct_field_index(handle, "z"), None);
    }
}
