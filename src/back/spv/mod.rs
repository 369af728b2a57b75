//! C6: the SPIR-V emitter.
//!
//! Three phases, matching the teacher's own `PhysicalLayout`/
//! `LogicalLayout` split between header words and section word vectors:
//!
//! - phase A marks live types and records which non-32-bit numeric
//!   widths are present, so capabilities get added before anything
//!   referencing them is emitted;
//! - phase B assigns every id a single pass can need, in the order
//!   §4.6 specifies;
//! - phase C walks the module once more and pushes words, strictly in
//!   SPIR-V logical-section order.

pub mod instructions;
pub mod layout;

use crate::arena::Handle;
use crate::front::ast::{BinaryOp, UnaryOp};
use crate::ir::{Block, Builtin, EntryPoint, Function, IRModule, IRValue};
use crate::ty::{Interner, Layout, StorageClass, Type, TypeKind};
use crate::FastHashMap;
use instructions::{
    instruction_capability, instruction_decorate, instruction_entry_point, instruction_execution_mode,
    instruction_ext_inst_import, instruction_label, instruction_member_decorate, instruction_memory_model,
    instruction_source, GlslExt, Instruction, Op, GLSL_STD_450_SET,
};

const MAGIC_NUMBER: u32 = 0x0723_0203;
const VERSION: u32 = 0x0001_0000;
const GENERATOR: u32 = 28;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("feature not implemented: {0}")]
    FeatureNotImplemented(&'static str),
    #[error("module is missing a capability for {0}")]
    MissingCapability(&'static str),
    #[error("internal emitter error: {0}")]
    Internal(String),
}

pub struct Options {
    pub spirv_version: (u8, u8),
}

impl Default for Options {
    fn default() -> Self {
        Options {
            spirv_version: (1, 0),
        }
    }
}

struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    fn new() -> Self {
        // Id 0 is reserved.
        IdGenerator { next: 2 }
    }

    fn next(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

pub struct Writer<'a> {
    types: &'a Interner,
    module: &'a IRModule,
    ids: IdGenerator,
    type_ids: FastHashMap<Handle<Type>, u32>,
    value_ids: FastHashMap<Handle<IRValue>, u32>,
    function_ids: FastHashMap<Handle<Function>, u32>,
    block_ids: FastHashMap<Handle<Block>, u32>,
    capabilities: Vec<u32>,
    needs_descriptor_indexing: bool,
}

impl<'a> Writer<'a> {
    pub fn new(types: &'a Interner, module: &'a IRModule) -> Self {
        Writer {
            types,
            module,
            ids: IdGenerator::new(),
            type_ids: FastHashMap::default(),
            value_ids: FastHashMap::default(),
            function_ids: FastHashMap::default(),
            block_ids: FastHashMap::default(),
            capabilities: vec![layout::capability::SHADER],
            needs_descriptor_indexing: false,
        }
    }

    pub fn write(&mut self, _options: &Options) -> Result<Vec<u32>, Error> {
        self.mark_liveness();
        self.assign_ids();
        self.emit()
    }

    // ---- phase A ---------------------------------------------------------

    fn mark_liveness(&mut self) {
        for &global in &self.module.globals {
            if let Some(ty) = self.module.values[global].result_type() {
                self.types.mark_live(ty);
            }
        }
        for ep in &self.module.entry_points {
            let function = &self.module.functions[ep.function];
            self.types.mark_live(function.ty);
            for &param_ty in &function.param_types {
                self.types.mark_live(param_ty);
            }
        }
        for ty in self.live_types() {
            match self.types.kind(ty) {
                TypeKind::Int { bits: 8, .. } => self.add_capability(layout::capability::INT8),
                TypeKind::Int { bits: 16, .. } => self.add_capability(layout::capability::INT16),
                TypeKind::Int { bits: 64, .. } => self.add_capability(layout::capability::INT64),
                TypeKind::Float { bits: 16 } => self.add_capability(layout::capability::FLOAT16),
                TypeKind::Float { bits: 64 } => self.add_capability(layout::capability::FLOAT64),
                TypeKind::RuntimeArray { .. } => self.needs_descriptor_indexing = true,
                _ => {}
            }
        }
    }

    fn add_capability(&mut self, cap: u32) {
        if !self.capabilities.contains(&cap) {
            self.capabilities.push(cap);
        }
    }

    fn live_types(&self) -> Vec<Handle<Type>> {
        self.types
            .order()
            .iter()
            .copied()
            .filter(|&h| self.types.get(h).is_live())
            .collect()
    }

    // ---- phase B ---------------------------------------------------------

    fn assign_ids(&mut self) {
        for ty in self.live_types() {
            let id = self.ids.next();
            self.type_ids.insert(ty, id);
        }
        for (handle, value) in self.module.values.iter() {
            if is_constant(value) {
                let id = self.ids.next();
                self.value_ids.insert(handle, id);
            }
        }
        for &global in &self.module.globals {
            let id = self.ids.next();
            self.value_ids.insert(global, id);
        }
        for (handle, function) in self.module.functions.iter() {
            let id = self.ids.next();
            self.function_ids.insert(handle, id);
            for &param in &function.parameters {
                self.value_ids.insert(param, self.ids.next());
            }
            for (block_handle, block) in function.blocks.iter() {
                self.block_ids.insert(block_handle, self.ids.next());
                for &var in &function.variables {
                    self.value_ids.entry(var).or_insert_with(|| 0);
                }
                for &inst in &block.instructions {
                    if !self.value_ids.contains_key(&inst) {
                        self.value_ids.insert(inst, self.ids.next());
                    }
                }
            }
            for &var in &function.variables {
                if self.value_ids[&var] == 0 {
                    let id = self.ids.next();
                    self.value_ids.insert(var, id);
                }
            }
        }
    }

    fn id_bound(&self) -> u32 {
        self.ids.next
    }

    // ---- phase C ---------------------------------------------------------

    fn emit(&mut self) -> Result<Vec<u32>, Error> {
        let mut capabilities = Vec::new();
        let mut extensions = Vec::new();
        let mut ext_inst = Vec::new();
        let mut memory_model = Vec::new();
        let mut entry_points = Vec::new();
        let mut execution_modes = Vec::new();
        let mut debug = Vec::new();
        let mut decorations = Vec::new();
        let mut types_consts = Vec::new();
        let mut globals = Vec::new();
        let mut functions = Vec::new();

        for &cap in &self.capabilities {
            instruction_capability(cap).to_words(&mut capabilities);
        }
        if self.needs_descriptor_indexing {
            push_extension(&mut extensions, "SPV_EXT_descriptor_indexing");
        }
        instruction_ext_inst_import(GLSL_STD_450_SET).to_words(&mut ext_inst);
        instruction_memory_model().to_words(&mut memory_model);
        instruction_source().to_words(&mut debug);

        for ep in &self.module.entry_points {
            self.emit_entry_point(ep, &mut entry_points, &mut execution_modes)?;
        }

        self.emit_decorations(&mut decorations);
        self.emit_types_and_constants(&mut types_consts)?;
        self.emit_globals(&mut globals);
        for (handle, function) in self.module.functions.iter() {
            self.emit_function(handle, function, &mut functions)?;
        }

        let mut words = Vec::new();
        words.push(MAGIC_NUMBER);
        words.push(VERSION);
        words.push(GENERATOR);
        words.push(self.id_bound());
        words.push(0);
        words.extend(capabilities);
        words.extend(extensions);
        words.extend(ext_inst);
        words.extend(memory_model);
        words.extend(entry_points);
        words.extend(execution_modes);
        words.extend(debug);
        words.extend(decorations);
        words.extend(types_consts);
        words.extend(globals);
        words.extend(functions);
        Ok(words)
    }

    fn emit_entry_point(
        &self,
        ep: &EntryPoint,
        entry_points: &mut Vec<u32>,
        execution_modes: &mut Vec<u32>,
    ) -> Result<(), Error> {
        let function_id = self.function_ids[&ep.function];
        let interface: Vec<u32> = ep.interface.iter().map(|v| self.value_ids[v]).collect();
        instruction_entry_point(
            layout::execution_model_for(ep.stage),
            function_id,
            &ep.name,
            &interface,
        )
        .to_words(entry_points);
        if ep.stage == crate::ir::ShaderStage::Fragment {
            instruction_execution_mode(function_id, layout::execution_mode::ORIGIN_UPPER_LEFT)
                .to_words(execution_modes);
        }
        Ok(())
    }

    fn emit_decorations(&self, sink: &mut Vec<u32>) {
        for ty in self.live_types() {
            let id = self.type_ids[&ty];
            match self.types.kind(ty) {
                TypeKind::Struct {
                    is_block, fields, layout: struct_layout, ..
                } => {
                    if *is_block {
                        instruction_decorate(id, layout::decoration::BLOCK, &[]).to_words(sink);
                    }
                    if *struct_layout != Layout::Unknown {
                        for (i, field) in fields.iter().enumerate() {
                            instruction_member_decorate(
                                id,
                                i as u32,
                                layout::decoration::OFFSET,
                                &[field.offset],
                            )
                            .to_words(sink);
                        }
                    }
                    for (i, field) in fields.iter().enumerate() {
                        if field.read_only {
                            instruction_member_decorate(id, i as u32, layout::decoration::NON_WRITABLE, &[])
                                .to_words(sink);
                        }
                    }
                }
                TypeKind::Array { layout: arr_layout, .. } | TypeKind::RuntimeArray { layout: arr_layout, .. } => {
                    if *arr_layout != Layout::Unknown {
                        let stride = array_stride(self.types, ty, *arr_layout);
                        instruction_decorate(id, layout::decoration::ARRAY_STRIDE, &[stride]).to_words(sink);
                    }
                }
                _ => {}
            }
        }
        for &global in &self.module.globals {
            let Some(attrs) = self.module.global_decorations.get(&global) else {
                continue;
            };
            let id = self.value_ids[&global];
            if let Some(loc) = attrs.location {
                instruction_decorate(id, layout::decoration::LOCATION, &[loc]).to_words(sink);
            }
            if let Some(builtin) = attrs.builtin {
                instruction_decorate(id, layout::decoration::BUILT_IN, &[layout::builtin_word(builtin)])
                    .to_words(sink);
            }
            if let Some(set) = attrs.set {
                instruction_decorate(id, layout::decoration::DESCRIPTOR_SET, &[set]).to_words(sink);
            }
            if let Some(binding) = attrs.binding {
                instruction_decorate(id, layout::decoration::BINDING, &[binding]).to_words(sink);
            }
        }
    }

    fn emit_types_and_constants(&self, sink: &mut Vec<u32>) -> Result<(), Error> {
        // An `OpTypeArray`'s length operand is `OpConstant`-valued, so that
        // constant must be emitted before the array type that references
        // it rather than deferred to the constant pass below.
        let mut array_len_consts = std::collections::HashSet::new();
        for ty in self.live_types() {
            if matches!(self.types.kind(ty), TypeKind::Array { .. }) {
                if let Some(&c) = self.module.array_size_consts.get(&ty) {
                    if array_len_consts.insert(c) {
                        self.emit_constant(c, &self.module.values[c], sink)?;
                    }
                }
            }
            self.emit_type(ty, sink)?;
        }
        for (handle, value) in self.module.values.iter() {
            if is_constant(value) && !array_len_consts.contains(&handle) {
                self.emit_constant(handle, value, sink)?;
            }
        }
        Ok(())
    }

    fn emit_type(&self, handle: Handle<Type>, sink: &mut Vec<u32>) -> Result<(), Error> {
        let id = self.type_ids[&handle];
        match self.types.kind(handle) {
            TypeKind::Void => {
                Instruction::new(Op::TypeVoid).set_result(id).to_words(sink);
            }
            TypeKind::Bool => {
                Instruction::new(Op::TypeBool).set_result(id).to_words(sink);
            }
            TypeKind::Int { bits, signed } => {
                let mut inst = Instruction::new(Op::TypeInt);
                inst.set_result(id).add_operand(*bits).add_operand(*signed as u32);
                inst.to_words(sink);
            }
            TypeKind::Float { bits } => {
                let mut inst = Instruction::new(Op::TypeFloat);
                inst.set_result(id).add_operand(*bits);
                inst.to_words(sink);
            }
            TypeKind::Vector { elem, len } => {
                let mut inst = Instruction::new(Op::TypeVector);
                inst.set_result(id).add_operand(self.type_ids[elem]).add_operand(*len);
                inst.to_words(sink);
            }
            TypeKind::Matrix { col_type, cols } => {
                let mut inst = Instruction::new(Op::TypeMatrix);
                inst.set_result(id)
                    .add_operand(self.type_ids[col_type])
                    .add_operand(*cols);
                inst.to_words(sink);
            }
            TypeKind::Array { elem, .. } => {
                let size_const = self.array_size_const_id(handle)?;
                let mut inst = Instruction::new(Op::TypeArray);
                inst.set_result(id).add_operand(self.type_ids[elem]).add_operand(size_const);
                inst.to_words(sink);
            }
            TypeKind::RuntimeArray { elem, .. } => {
                let mut inst = Instruction::new(Op::TypeRuntimeArray);
                inst.set_result(id).add_operand(self.type_ids[elem]);
                inst.to_words(sink);
            }
            TypeKind::Struct { fields, .. } => {
                let mut inst = Instruction::new(Op::TypeStruct);
                inst.set_result(id);
                for field in fields {
                    inst.add_operand(self.type_ids[&field.ty]);
                }
                inst.to_words(sink);
            }
            TypeKind::Pointer { sub, storage_class } => {
                let mut inst = Instruction::new(Op::TypePointer);
                inst.set_result(id)
                    .add_operand(layout::storage_class_word(*storage_class))
                    .add_operand(self.type_ids[sub]);
                inst.to_words(sink);
            }
            TypeKind::Function { ret, params } => {
                let mut inst = Instruction::new(Op::TypeFunction);
                inst.set_result(id).add_operand(self.type_ids[ret]);
                for p in params {
                    inst.add_operand(self.type_ids[p]);
                }
                inst.to_words(sink);
            }
            TypeKind::Sampler => {
                Instruction::new(Op::TypeSampler).set_result(id).to_words(sink);
            }
            TypeKind::Image {
                sampled_type, dim, depth, arrayed, multisampled, sampled,
            } => {
                let mut inst = Instruction::new(Op::TypeImage);
                inst.set_result(id)
                    .add_operand(self.type_ids[sampled_type])
                    .add_operand(image_dim_word(*dim))
                    .add_operand(*depth as u32)
                    .add_operand(*arrayed as u32)
                    .add_operand(*multisampled as u32)
                    .add_operand(if *sampled { 1 } else { 2 })
                    .add_operand(0);
                inst.to_words(sink);
            }
            TypeKind::SampledImage { image } => {
                let mut inst = Instruction::new(Op::TypeSampledImage);
                inst.set_result(id).add_operand(self.type_ids[image]);
                inst.to_words(sink);
            }
            TypeKind::Type | TypeKind::String | TypeKind::UntypedInt | TypeKind::UntypedFloat => {
                return Err(Error::Internal(
                    "meta/untyped types must not reach the emitter".into(),
                ));
            }
        }
        Ok(())
    }

    fn array_size_const_id(&self, _array_ty: Handle<Type>) -> Result<u32, Error> {
        // Phase A installs one constant IR value per live array type in
        // `module.array_size_consts`; see `ir::build`.
        self.module
            .array_size_consts
            .get(&_array_ty)
            .map(|&v| self.value_ids[&v])
            .ok_or_else(|| Error::Internal("array size constant missing".into()))
    }

    fn emit_constant(&self, handle: Handle<IRValue>, value: &IRValue, sink: &mut Vec<u32>) -> Result<(), Error> {
        let id = self.value_ids[&handle];
        match value {
            IRValue::ConstantBool(b) => {
                let op = if *b { Op::ConstantTrue } else { Op::ConstantFalse };
                let ty = self.type_ids[&self.bool_type()];
                Instruction::new(op).set_type(ty).set_result(id).to_words(sink);
            }
            IRValue::Constant(inner) => {
                let ty = value.result_type().ok_or_else(|| Error::Internal("constant missing type".into()))?;
                let mut inst = Instruction::new(Op::Constant);
                inst.set_type(self.type_ids[&ty]).set_result(id);
                match inner {
                    crate::ir::ConstantInner::Sint(v) => push_int_words(&mut inst, *v as u64, self.scalar_bits(ty)),
                    crate::ir::ConstantInner::Uint(v) => push_int_words(&mut inst, *v, self.scalar_bits(ty)),
                    crate::ir::ConstantInner::Float(v) => push_float_words(&mut inst, *v, self.scalar_bits(ty)),
                    crate::ir::ConstantInner::Bool(_) => unreachable!(),
                }
                inst.to_words(sink);
            }
            IRValue::ConstantComposite { ty, components } => {
                let mut inst = Instruction::new(Op::ConstantComposite);
                inst.set_type(self.type_ids[ty]).set_result(id);
                for c in components {
                    inst.add_operand(self.value_ids[c]);
                }
                inst.to_words(sink);
            }
            _ => return Err(Error::Internal("not a constant IRValue".into())),
        }
        Ok(())
    }

    fn bool_type(&self) -> Handle<Type> {
        self.types.bool_
    }

    fn scalar_bits(&self, ty: Handle<Type>) -> u32 {
        match self.types.kind(ty) {
            TypeKind::Int { bits, .. } | TypeKind::Float { bits } => *bits,
            _ => 32,
        }
    }

    fn emit_globals(&self, sink: &mut Vec<u32>) {
        for &global in &self.module.globals {
            let id = self.value_ids[&global];
            if let IRValue::Variable { ty, storage_class, .. } = &self.module.values[global] {
                let ptr_ty = self.pointer_type_id(*ty, *storage_class);
                let mut inst = Instruction::new(Op::Variable);
                inst.set_type(ptr_ty)
                    .set_result(id)
                    .add_operand(layout::storage_class_word(*storage_class));
                inst.to_words(sink);
            }
        }
    }

    fn pointer_type_id(&self, pointee: Handle<Type>, storage_class: StorageClass) -> u32 {
        // The IR builder pre-interns the pointer type alongside the
        // pointee, so it is already live and has an id.
        self.module
            .pointer_types
            .get(&(pointee, storage_class))
            .map(|&t| self.type_ids[&t])
            .unwrap_or_else(|| self.type_ids[&pointee])
    }

    fn emit_function(&self, handle: Handle<Function>, function: &Function, sink: &mut Vec<u32>) -> Result<(), Error> {
        let fn_id = self.function_ids[&handle];
        let mut inst = Instruction::new(Op::Function);
        inst.set_type(self.type_ids[&return_type_of(self.types, function.ty)])
            .set_result(fn_id)
            .add_operand(0)
            .add_operand(self.type_ids[&function.ty]);
        inst.to_words(sink);

        for (i, &param) in function.parameters.iter().enumerate() {
            let ty = function.param_types[i];
            let mut p = Instruction::new(Op::FunctionParameter);
            p.set_type(self.type_ids[&ty]).set_result(self.value_ids[&param]);
            p.to_words(sink);
        }

        for (block_handle, block) in function.blocks.iter() {
            instruction_label(self.block_ids[&block_handle]).to_words(sink);
            if block_handle == function.entry_block {
                for &var in &function.variables {
                    self.emit_variable(var, sink);
                }
            }
            for &inst_handle in &block.instructions {
                self.emit_instruction(inst_handle, function, sink)?;
            }
        }
        Instruction::new(Op::FunctionEnd).to_words(sink);
        Ok(())
    }

    fn emit_variable(&self, handle: Handle<IRValue>, sink: &mut Vec<u32>) {
        if let IRValue::Variable { ty, storage_class, .. } = &self.module.values[handle] {
            let ptr_ty = self.pointer_type_id(*ty, *storage_class);
            let mut inst = Instruction::new(Op::Variable);
            inst.set_type(ptr_ty)
                .set_result(self.value_ids[&handle])
                .add_operand(layout::storage_class_word(*storage_class));
            inst.to_words(sink);
        }
    }

    fn emit_instruction(&self, handle: Handle<IRValue>, function: &Function, sink: &mut Vec<u32>) -> Result<(), Error> {
        let value = &self.module.values[handle];
        if is_constant(value) || matches!(value, IRValue::Variable { .. }) {
            return Ok(());
        }
        let id = self.value_ids.get(&handle).copied();
        match value {
            IRValue::Load { pointer, ty } => {
                let mut inst = Instruction::new(Op::Load);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap()).add_operand(self.value_ids[pointer]);
                inst.to_words(sink);
            }
            IRValue::Store { pointer, value } => {
                let mut inst = Instruction::new(Op::Store);
                inst.add_operand(self.value_ids[pointer]).add_operand(self.value_ids[value]);
                inst.to_words(sink);
            }
            IRValue::AccessChain { base, indices, ty } => {
                let mut inst = Instruction::new(Op::AccessChain);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap()).add_operand(self.value_ids[base]);
                for idx in indices {
                    inst.add_operand(self.value_ids[idx]);
                }
                inst.to_words(sink);
            }
            IRValue::CompositeExtract { base, indices, ty } => {
                let mut inst = Instruction::new(Op::CompositeExtract);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap()).add_operand(self.value_ids[base]);
                inst.add_operands(indices.iter().copied());
                inst.to_words(sink);
            }
            IRValue::VectorShuffle { first, second, indices, ty } => {
                let mut inst = Instruction::new(Op::VectorShuffle);
                inst.set_type(self.type_ids[ty])
                    .set_result(id.unwrap())
                    .add_operand(self.value_ids[first])
                    .add_operand(self.value_ids[second]);
                inst.add_operands(indices.iter().copied());
                inst.to_words(sink);
            }
            IRValue::CompositeConstruct { ty, components } => {
                let mut inst = Instruction::new(Op::CompositeConstruct);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap());
                for c in components {
                    inst.add_operand(self.value_ids[c]);
                }
                inst.to_words(sink);
            }
            IRValue::Cast { value, ty, op } => {
                let opcode = cast_opcode(*op, self.types, *ty);
                let mut inst = Instruction::new(opcode);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap()).add_operand(self.value_ids[value]);
                inst.to_words(sink);
            }
            IRValue::BuiltinCall { func, args, ty } => {
                self.emit_builtin_call(func, args, *ty, id.unwrap(), sink);
            }
            IRValue::BinaryOp { op, lhs, rhs, ty } => {
                let opcode = binary_opcode(*op, self.types, lhs_type_of(self, *lhs), lhs_type_of(self, *rhs));
                let mut inst = Instruction::new(opcode);
                inst.set_type(self.type_ids[ty])
                    .set_result(id.unwrap())
                    .add_operand(self.value_ids[lhs])
                    .add_operand(self.value_ids[rhs]);
                inst.to_words(sink);
            }
            IRValue::UnaryOp { op, value, ty } => {
                let opcode = unary_opcode(*op, self.types, *ty);
                let mut inst = Instruction::new(opcode);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap()).add_operand(self.value_ids[value]);
                inst.to_words(sink);
            }
            IRValue::FunctionCall { function: callee, args, ty } => {
                let mut inst = Instruction::new(Op::FunctionCall);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap()).add_operand(self.function_ids[callee]);
                for a in args {
                    inst.add_operand(self.value_ids[a]);
                }
                inst.to_words(sink);
            }
            IRValue::ArrayLength { structure, member_index } => {
                let mut inst = Instruction::new(Op::ArrayLength);
                inst.set_type(self.type_ids[&self.module.uint32_type])
                    .set_result(id.unwrap())
                    .add_operand(self.value_ids[structure])
                    .add_operand(*member_index);
                inst.to_words(sink);
            }
            IRValue::Phi { ty, edges } => {
                let mut inst = Instruction::new(Op::Phi);
                inst.set_type(self.type_ids[ty]).set_result(id.unwrap());
                for (val, block) in edges {
                    inst.add_operand(self.value_ids[val]).add_operand(self.block_ids[block]);
                }
                inst.to_words(sink);
            }
            IRValue::Return(Some(v)) => {
                Instruction::new(Op::ReturnValue).add_operand(self.value_ids[v]).to_words(sink);
            }
            IRValue::Return(None) => {
                Instruction::new(Op::Return).to_words(sink);
            }
            IRValue::Discard => {
                Instruction::new(Op::Kill).to_words(sink);
            }
            IRValue::Branch(target) => {
                Instruction::new(Op::Branch).add_operand(self.block_ids[target]).to_words(sink);
            }
            IRValue::BranchCond { condition, true_block, false_block } => {
                Instruction::new(Op::BranchConditional)
                    .add_operand(self.value_ids[condition])
                    .add_operand(self.block_ids[true_block])
                    .add_operand(self.block_ids[false_block])
                    .to_words(sink);
            }
            IRValue::SelectionMerge(merge) => {
                Instruction::new(Op::SelectionMerge).add_operand(self.block_ids[merge]).add_operand(0).to_words(sink);
            }
            IRValue::LoopMerge { merge_block, continue_block } => {
                Instruction::new(Op::LoopMerge)
                    .add_operand(self.block_ids[merge_block])
                    .add_operand(self.block_ids[continue_block])
                    .add_operand(0)
                    .to_words(sink);
            }
            IRValue::FunctionParameter { .. } | IRValue::Variable { .. } | IRValue::ConstantBool(_)
            | IRValue::Constant(_) | IRValue::ConstantComposite { .. } => {}
        }
        let _ = function;
        Ok(())
    }

    fn emit_builtin_call(&self, func: &crate::ir::BuiltinFn, args: &[Handle<IRValue>], ty: Handle<Type>, id: u32, sink: &mut Vec<u32>) {
        match func {
            crate::ir::BuiltinFn::ExtInst(inst_number) => {
                let mut inst = Instruction::new(Op::ExtInst);
                inst.set_type(self.type_ids[&ty])
                    .set_result(id)
                    .add_operand(GLSL_STD_450_SET)
                    .add_operand(*inst_number);
                for a in args {
                    inst.add_operand(self.value_ids[a]);
                }
                inst.to_words(sink);
            }
            crate::ir::BuiltinFn::DirectOp(op) => {
                let mut inst = Instruction::new(*op);
                inst.set_type(self.type_ids[&ty]).set_result(id);
                for a in args {
                    inst.add_operand(self.value_ids[a]);
                }
                inst.to_words(sink);
            }
        }
    }
}

fn lhs_type_of(writer: &Writer, value: Handle<IRValue>) -> Handle<Type> {
    writer.module.values[value].result_type().unwrap_or(writer.types.void)
}

fn return_type_of(types: &Interner, fn_ty: Handle<Type>) -> Handle<Type> {
    match types.kind(fn_ty) {
        TypeKind::Function { ret, .. } => *ret,
        _ => types.void,
    }
}

fn is_constant(value: &IRValue) -> bool {
    matches!(
        value,
        IRValue::ConstantBool(_) | IRValue::Constant(_) | IRValue::ConstantComposite { .. }
    )
}

fn image_dim_word(dim: crate::ty::ImageDim) -> u32 {
    match dim {
        crate::ty::ImageDim::D1 => 0,
        crate::ty::ImageDim::D2 => 1,
        crate::ty::ImageDim::D3 => 2,
        crate::ty::ImageDim::Cube => 3,
    }
}

fn push_extension(sink: &mut Vec<u32>, name: &str) {
    let mut inst = Instruction::new(Op::Extension);
    inst.add_string(name);
    inst.to_words(sink);
}

fn push_int_words(inst: &mut Instruction, bits: u64, width: u32) {
    inst.add_operand(bits as u32);
    if width > 32 {
        inst.add_operand((bits >> 32) as u32);
    }
}

fn push_float_words(inst: &mut Instruction, value: f64, width: u32) {
    if width > 32 {
        inst.add_operand(value.to_bits() as u32);
        inst.add_operand((value.to_bits() >> 32) as u32);
    } else {
        inst.add_operand((value as f32).to_bits());
    }
}

fn array_stride(types: &Interner, array_ty: Handle<Type>, layout_kind: Layout) -> u32 {
    let elem = match types.kind(array_ty) {
        TypeKind::Array { elem, .. } | TypeKind::RuntimeArray { elem, .. } => *elem,
        _ => return 0,
    };
    let (offsets, _, _) = crate::ty::layout::compute_struct_layout(
        types,
        &[("_".to_string(), elem, false), ("_".to_string(), elem, false)],
        layout_kind,
    );
    offsets[1]
}

fn cast_opcode(op: crate::ir::CastOp, types: &Interner, ty: Handle<Type>) -> Op {
    use crate::ir::CastOp::*;
    match op {
        Bitcast => Op::Bitcast,
        IntToFloat => match types.kind(ty) {
            TypeKind::Float { .. } => Op::ConvertSToF,
            _ => Op::ConvertUToF,
        },
        FloatToInt => Op::ConvertFToS,
        IntToInt => Op::SConvert,
        FloatToFloat => Op::FConvert,
    }
}

fn binary_opcode(op: BinaryOp, types: &Interner, lhs_ty: Handle<Type>, rhs_ty: Handle<Type>) -> Op {
    let operand_ty = lhs_ty;
    let scalar = types.kind(types.scalar_type(operand_ty)).clone();
    let is_float = matches!(scalar, TypeKind::Float { .. });
    let is_signed = matches!(scalar, TypeKind::Int { signed: true, .. });
    if op == BinaryOp::Mul {
        return match (types.kind(lhs_ty), types.kind(rhs_ty)) {
            (TypeKind::Matrix { .. }, TypeKind::Matrix { .. }) => Op::MatrixTimesMatrix,
            (TypeKind::Matrix { .. }, TypeKind::Vector { .. }) => Op::MatrixTimesVector,
            (TypeKind::Vector { .. }, TypeKind::Matrix { .. }) => Op::VectorTimesMatrix,
            (TypeKind::Matrix { .. }, _) => Op::MatrixTimesScalar,
            (TypeKind::Vector { .. }, scalar_kind) if !matches!(scalar_kind, TypeKind::Vector { .. }) => {
                Op::VectorTimesScalar
            }
            _ if is_float => Op::FMul,
            _ => Op::IMul,
        };
    }
    match op {
        BinaryOp::Add => if is_float { Op::FAdd } else { Op::IAdd },
        BinaryOp::Sub => if is_float { Op::FSub } else { Op::ISub },
        BinaryOp::Mul => unreachable!(),
        BinaryOp::Div => {
            if is_float {
                Op::FDiv
            } else if is_signed {
                Op::SDiv
            } else {
                Op::UDiv
            }
        }
        BinaryOp::Mod => {
            if is_float {
                Op::FMod
            } else if is_signed {
                Op::SMod
            } else {
                Op::UMod
            }
        }
        BinaryOp::BitAnd => Op::BitwiseAnd,
        BinaryOp::BitOr => Op::BitwiseOr,
        BinaryOp::BitXor => Op::BitwiseXor,
        BinaryOp::Shl => Op::ShiftLeftLogical,
        BinaryOp::Shr => {
            if is_signed {
                Op::ShiftRightArithmetic
            } else {
                Op::ShiftRightLogical
            }
        }
        BinaryOp::And => Op::LogicalAnd,
        BinaryOp::Or => Op::LogicalOr,
        BinaryOp::Eq => if is_float { Op::FOrdEqual } else { Op::IEqual },
        BinaryOp::Ne => if is_float { Op::FOrdNotEqual } else { Op::INotEqual },
        BinaryOp::Lt => {
            if is_float {
                Op::FOrdLessThan
            } else if is_signed {
                Op::SLessThan
            } else {
                Op::ULessThan
            }
        }
        BinaryOp::Le => {
            if is_float {
                Op::FOrdLessThanEqual
            } else if is_signed {
                Op::SLessThanEqual
            } else {
                Op::ULessThanEqual
            }
        }
        BinaryOp::Gt => {
            if is_float {
                Op::FOrdGreaterThan
            } else if is_signed {
                Op::SGreaterThan
            } else {
                Op::UGreaterThan
            }
        }
        BinaryOp::Ge => {
            if is_float {
                Op::FOrdGreaterThanEqual
            } else if is_signed {
                Op::SGreaterThanEqual
            } else {
                Op::UGreaterThanEqual
            }
        }
    }
}

fn unary_opcode(op: UnaryOp, types: &Interner, ty: Handle<Type>) -> Op {
    let is_float = matches!(types.kind(types.scalar_type(ty)), TypeKind::Float { .. });
    match op {
        UnaryOp::Not => Op::LogicalNot,
        UnaryOp::Neg => if is_float { Op::FNegate } else { Op::SNegate },
        UnaryOp::BitNot => Op::Not,
    }
}

/// The GLSL.std.450 extended instruction number for a `@name(...)`
/// builtin call, keyed by name and whether the call is float/signed/
/// unsigned; `None` when the name dispatches to a direct opcode instead
/// (`dot`, handled in `ir::build` as `BuiltinFn::DirectOp(Op::Dot)`).
pub fn glsl_ext_inst_for(name: &str) -> Option<GlslExt> {
    Some(match name {
        "sin" => GlslExt::Sin,
        "cos" => GlslExt::Cos,
        "tan" => GlslExt::Tan,
        "sqrt" => GlslExt::Sqrt,
        "floor" => GlslExt::Floor,
        "ceil" => GlslExt::Ceil,
        "pow" => GlslExt::Pow,
        "normalize" => GlslExt::Normalize,
        "cross" => GlslExt::Cross,
        "length" => GlslExt::Length,
        "reflect" => GlslExt::Reflect,
        "refract" => GlslExt::Refract,
        "mix" => GlslExt::FMix,
        "radians" => GlslExt::Radians,
        "degrees" => GlslExt::Degrees,
        "asin" => GlslExt::Asin,
        "acos" => GlslExt::Acos,
        "atan" => GlslExt::Atan,
        "sinh" => GlslExt::Sinh,
        "cosh" => GlslExt::Cosh,
        "tanh" => GlslExt::Tanh,
        "asinh" => GlslExt::Asinh,
        "acosh" => GlslExt::Acosh,
        "atanh" => GlslExt::Atanh,
        "exp" => GlslExt::Exp,
        "log" => GlslExt::Log,
        "exp2" => GlslExt::Exp2,
        "log2" => GlslExt::Log2,
        "distance" => GlslExt::Distance,
        "determinant" => GlslExt::Determinant,
        "inverse" => GlslExt::MatrixInverse,
        _ => return None,
    })
}
