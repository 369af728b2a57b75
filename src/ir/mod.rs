//! The typed intermediate representation C5 builds and C6 emits.
//!
//! An [`IRValue`] is a node in an SSA-like graph: every instruction that
//! produces a result is itself addressable by [`Handle<IRValue>`], values
//! are appended to [`Block`]s in evaluation order, and a [`Function`]
//! owns its blocks plus its function-scope variables (which must appear
//! in the first block, per SPIR-V's rule).

pub mod build;

use crate::arena::{Arena, Handle};
use crate::front::ast::{BinaryOp, UnaryOp};
use crate::ty::{Interner, StorageClass, Type};
use crate::FastHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Position,
    FragCoord,
    VertexId,
    VertexIndex,
    InstanceId,
    InstanceIndex,
    FragDepth,
    NumWorkgroups,
    WorkgroupSize,
    WorkgroupId,
    LocalInvocationId,
    LocalInvocationIndex,
    GlobalInvocationId,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "position" => Builtin::Position,
            "frag_coord" => Builtin::FragCoord,
            "vertex_id" => Builtin::VertexId,
            "vertex_index" => Builtin::VertexIndex,
            "instance_id" => Builtin::InstanceId,
            "instance_index" => Builtin::InstanceIndex,
            "frag_depth" => Builtin::FragDepth,
            "num_workgroups" => Builtin::NumWorkgroups,
            "workgroup_size" => Builtin::WorkgroupSize,
            "workgroup_id" => Builtin::WorkgroupId,
            "local_invocation_id" => Builtin::LocalInvocationId,
            "local_invocation_index" => Builtin::LocalInvocationIndex,
            "global_invocation_id" => Builtin::GlobalInvocationId,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstantInner {
    Bool(bool),
    Sint(i64),
    Uint(u64),
    Float(f64),
}

#[derive(Clone, Debug)]
pub enum BuiltinFn {
    /// Dispatches to `OpExtInst %result GLSLstd450 <inst> args...`.
    ExtInst(u32),
    /// Dispatches directly to a core SPIR-V opcode (`Dot`, image sampling).
    DirectOp(crate::back::spv::instructions::Op),
}

#[derive(Clone, Debug)]
pub enum IRValue {
    ConstantBool(bool),
    Constant(ConstantInner),
    ConstantComposite {
        ty: Handle<Type>,
        components: Vec<Handle<IRValue>>,
    },
    FunctionParameter {
        ty: Handle<Type>,
        index: u32,
    },
    Variable {
        ty: Handle<Type>,
        storage_class: StorageClass,
        name: Option<String>,
    },
    Load {
        pointer: Handle<IRValue>,
        ty: Handle<Type>,
    },
    Store {
        pointer: Handle<IRValue>,
        value: Handle<IRValue>,
    },
    AccessChain {
        base: Handle<IRValue>,
        indices: Vec<Handle<IRValue>>,
        ty: Handle<Type>,
    },
    CompositeExtract {
        base: Handle<IRValue>,
        indices: Vec<u32>,
        ty: Handle<Type>,
    },
    VectorShuffle {
        first: Handle<IRValue>,
        second: Handle<IRValue>,
        indices: Vec<u32>,
        ty: Handle<Type>,
    },
    CompositeConstruct {
        ty: Handle<Type>,
        components: Vec<Handle<IRValue>>,
    },
    Cast {
        value: Handle<IRValue>,
        ty: Handle<Type>,
        op: CastOp,
    },
    BuiltinCall {
        func: BuiltinFn,
        args: Vec<Handle<IRValue>>,
        ty: Handle<Type>,
    },
    BinaryOp {
        op: BinaryOp,
        lhs: Handle<IRValue>,
        rhs: Handle<IRValue>,
        ty: Handle<Type>,
    },
    UnaryOp {
        op: UnaryOp,
        value: Handle<IRValue>,
        ty: Handle<Type>,
    },
    FunctionCall {
        function: Handle<Function>,
        args: Vec<Handle<IRValue>>,
        ty: Handle<Type>,
    },
    ArrayLength {
        structure: Handle<IRValue>,
        member_index: u32,
    },
    Phi {
        ty: Handle<Type>,
        /// `(value, predecessor block)` pairs.
        edges: Vec<(Handle<IRValue>, Handle<Block>)>,
    },
    Return(Option<Handle<IRValue>>),
    Discard,
    Branch(Handle<Block>),
    BranchCond {
        condition: Handle<IRValue>,
        true_block: Handle<Block>,
        false_block: Handle<Block>,
    },
    SelectionMerge(Handle<Block>),
    LoopMerge {
        merge_block: Handle<Block>,
        continue_block: Handle<Block>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastOp {
    /// Same-width signed/unsigned reinterpretation (`OpBitcast`).
    Bitcast,
    IntToFloat,
    FloatToInt,
    IntToInt,
    FloatToFloat,
}

impl IRValue {
    /// The `Handle<Type>` this value produces, if it produces one at all
    /// (control-flow instructions like `Branch` do not).
    pub fn result_type(&self) -> Option<Handle<Type>> {
        match self {
            IRValue::ConstantComposite { ty, .. }
            | IRValue::FunctionParameter { ty, .. }
            | IRValue::Variable { ty, .. }
            | IRValue::Load { ty, .. }
            | IRValue::AccessChain { ty, .. }
            | IRValue::CompositeExtract { ty, .. }
            | IRValue::VectorShuffle { ty, .. }
            | IRValue::CompositeConstruct { ty, .. }
            | IRValue::Cast { ty, .. }
            | IRValue::BuiltinCall { ty, .. }
            | IRValue::BinaryOp { ty, .. }
            | IRValue::UnaryOp { ty, .. }
            | IRValue::FunctionCall { ty, .. }
            | IRValue::Phi { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IRValue::Return(_) | IRValue::Discard | IRValue::Branch(_) | IRValue::BranchCond { .. }
        )
    }
}

/// A straight-line sequence of instructions ending (once complete) in
/// exactly one terminator.
#[derive(Default, Debug)]
pub struct Block {
    pub instructions: Vec<Handle<IRValue>>,
}

impl Block {
    pub fn is_terminated(&self, values: &Arena<IRValue>) -> bool {
        matches!(self.instructions.last(), Some(&last) if values[last].is_terminator())
    }
}

pub struct Function {
    pub name: String,
    pub ty: Handle<Type>,
    pub param_types: Vec<Handle<Type>>,
    pub parameters: Vec<Handle<IRValue>>,
    /// Function-scope variables; SPIR-V requires these precede all other
    /// instructions in the first block.
    pub variables: Vec<Handle<IRValue>>,
    pub blocks: Arena<Block>,
    pub entry_block: Handle<Block>,
}

pub struct EntryPoint {
    pub name: String,
    pub function: Handle<Function>,
    pub stage: ShaderStage,
    /// Deduplicated, insertion-order-preserved globals reachable from
    /// the function body.
    pub interface: Vec<Handle<IRValue>>,
}

/// The subset of a global's attributes the emitter turns into
/// `OpDecorate`s (`location`, `builtin`, `set`, `binding`).
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalAttrs {
    pub location: Option<u32>,
    pub builtin: Option<Builtin>,
    pub set: Option<u32>,
    pub binding: Option<u32>,
}

/// Arenas and interning tables for one compilation's IR.
pub struct IRModule {
    pub values: Arena<IRValue>,
    pub functions: Arena<Function>,
    pub globals: Vec<Handle<IRValue>>,
    pub entry_points: Vec<EntryPoint>,
    pub global_decorations: FastHashMap<Handle<IRValue>, GlobalAttrs>,
    /// Pointer types the builder pre-interned for each `(pointee,
    /// storage class)` pair it needed, so the emitter never has to
    /// mutate the type interner.
    pub pointer_types: FastHashMap<(Handle<Type>, StorageClass), Handle<Type>>,
    /// One `OpConstant` per live sized-array type, used as `OpTypeArray`'s
    /// length operand.
    pub array_size_consts: FastHashMap<Handle<Type>, Handle<IRValue>>,
    /// `u32`, pre-interned for `OpArrayLength`'s result type.
    pub uint32_type: Handle<Type>,
    const_pool: FastHashMap<String, Handle<IRValue>>,
}

impl IRModule {
    pub fn new(interner: &mut Interner) -> Self {
        IRModule {
            values: Arena::new(),
            functions: Arena::new(),
            globals: Vec::new(),
            entry_points: Vec::new(),
            global_decorations: FastHashMap::default(),
            pointer_types: FastHashMap::default(),
            array_size_consts: FastHashMap::default(),
            uint32_type: interner.int(32, false),
            const_pool: FastHashMap::default(),
        }
    }

    /// Interns a constant by its canonical textual signature, so that
    /// `1i32` requested twice yields the same `IRValue`.
    pub fn intern_constant(&mut self, signature: String, make: impl FnOnce() -> IRValue) -> Handle<IRValue> {
        if let Some(&handle) = self.const_pool.get(&signature) {
            return handle;
        }
        let handle = self.values.append(make());
        self.const_pool.insert(signature, handle);
        handle
    }

    /// Interns the pointer-to-`pointee` type for `storage_class` exactly
    /// once, recording it in `pointer_types` for the emitter to look up.
    pub fn pointer_type(
        &mut self,
        interner: &mut Interner,
        pointee: Handle<Type>,
        storage_class: StorageClass,
    ) -> Handle<Type> {
        if let Some(&ty) = self.pointer_types.get(&(pointee, storage_class)) {
            return ty;
        }
        let ty = interner.pointer(pointee, storage_class);
        self.pointer_types.insert((pointee, storage_class), ty);
        ty
    }
}
