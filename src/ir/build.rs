//! C5: lowers the analyzed AST into [`super::IRModule`].
//!
//! One `Builder` per compilation. Top-level variables become
//! `OpVariable`-backed globals; each analyzed function becomes one
//! [`super::Function`], built by a per-function [`FnBuilder`] that owns
//! the function's own block arena until lowering finishes, then is
//! spliced into the module's function arena in one move.

use std::collections::HashMap;

use crate::analysis::{AnalyzedDecl, AnalyzedFunction, AnalyzedVar};
use crate::arena::{Arena, Handle};
use crate::diagnostics::Span;
use crate::front::ast::{Attribute, BinaryOp, Expr, ExprKind, Stmt, StmtKind, UnaryOp, VarDecl};
use crate::ty::{Interner, StorageClass, Type, TypeKind};

use super::{
    Block, Builtin, BuiltinFn, CastOp, ConstantInner, EntryPoint, Function, GlobalAttrs, IRModule, IRValue,
    ShaderStage,
};
use crate::back::spv::instructions::{GlslExt, Op};
use crate::back::spv::glsl_ext_inst_for;

#[derive(thiserror::Error, Debug, Clone)]
pub enum LowerError {
    #[error("`{0}` at {1} cannot be used as an assignment target")]
    NotAssignable(String, Span),
    #[error("`{0}` at {1} is not a value")]
    NotAValue(String, Span),
    #[error("`break`/`continue` at {0} used outside a loop")]
    LoopControlOutsideLoop(Span),
    #[error("`{0}` at {1} has no corresponding IR lowering")]
    Unsupported(&'static str, Span),
}

type Result<T> = std::result::Result<T, LowerError>;

#[derive(Clone, Copy)]
struct GlobalBinding {
    pointer: Handle<IRValue>,
    ty: Handle<Type>,
}

#[derive(Clone, Copy)]
enum LocalBinding {
    /// A function-scope `OpVariable`; reads go through `OpLoad`.
    Var { pointer: Handle<IRValue>, ty: Handle<Type> },
    /// An `OpFunctionParameter`; used directly, never loaded.
    Param { value: Handle<IRValue>, ty: Handle<Type> },
}

struct LoopContext {
    continue_block: Handle<Block>,
    merge_block: Handle<Block>,
}

/// Lowers every analyzed declaration into one [`IRModule`].
pub fn lower(interner: &mut Interner, decls: &[AnalyzedDecl]) -> (IRModule, Vec<LowerError>) {
    let mut module = IRModule::new(interner);
    let mut errors = Vec::new();
    let mut globals: HashMap<String, GlobalBinding> = HashMap::new();

    for decl in decls {
        if let AnalyzedDecl::Var(v) = decl {
            lower_global(interner, &mut module, v, &mut globals);
        }
    }
    intern_array_size_consts(interner, &mut module);

    // Pass 1: allocate a `Function` + entry block for every declared
    // function so forward calls resolve regardless of source order.
    let mut function_handles: HashMap<String, Handle<Function>> = HashMap::new();
    let mut analyzed_fns: Vec<&AnalyzedFunction> = Vec::new();
    for decl in decls {
        if let AnalyzedDecl::Function(f) = decl {
            let fn_ty = interner.function(f.return_type, f.param_types.clone());
            let mut blocks = Arena::new();
            let entry_block = blocks.append(Block::default());
            let handle = module.functions.append(Function {
                name: f.name.clone(),
                ty: fn_ty,
                param_types: f.param_types.clone(),
                parameters: Vec::new(),
                variables: Vec::new(),
                blocks,
                entry_block,
            });
            function_handles.insert(f.name.clone(), handle);
            analyzed_fns.push(f);
        }
    }

    // Pass 2: lower each body, then splice the finished function back in.
    for f in &analyzed_fns {
        let handle = function_handles[&f.name];
        match lower_function(interner, &mut module, &globals, &function_handles, f) {
            Ok(built) => module.functions[handle] = built,
            Err(err) => errors.push(err),
        }
    }

    for decl in decls {
        if let AnalyzedDecl::Function(f) = decl {
            if let Some(stage) = entry_point_stage(&f.attrs) {
                let handle = function_handles[&f.name];
                let interface = entry_point_interface(&module, handle);
                module.entry_points.push(EntryPoint {
                    name: f.name.clone(),
                    function: handle,
                    stage,
                    interface,
                });
            }
        }
    }

    (module, errors)
}

fn attr_ident_arg(attrs: &[Attribute], name: &str) -> Option<String> {
    let attr = attrs.iter().find(|a| a.name == name)?;
    match attr.args.first()?.kind {
        ExprKind::Ident(ref s) | ExprKind::StringLiteral(ref s) => Some(s.clone()),
        _ => None,
    }
}

fn attr_int_arg(attrs: &[Attribute], name: &str) -> Option<u32> {
    let attr = attrs.iter().find(|a| a.name == name)?;
    match attr.args.first()?.kind {
        ExprKind::IntLiteral(n) => Some(n as u32),
        _ => None,
    }
}

fn entry_point_stage(attrs: &[Attribute]) -> Option<ShaderStage> {
    match attr_ident_arg(attrs, "stage")?.as_str() {
        "vertex" => Some(ShaderStage::Vertex),
        "fragment" => Some(ShaderStage::Fragment),
        "compute" => Some(ShaderStage::Compute),
        _ => None,
    }
}

fn entry_point_interface(module: &IRModule, handle: Handle<Function>) -> Vec<Handle<IRValue>> {
    // SPIR-V < 1.4 lists every Input/Output/Uniform/UniformConstant/
    // Storage/PushConstant/Workgroup global the function body touches,
    // whether it is a module-scope `let` or one of the Input/Output
    // globals synthesized for this entry point's parameters/return
    // value, deduplicated in first-reference order.
    let mut seen = Vec::new();
    let function = &module.functions[handle];
    let mut visit = |value: Handle<IRValue>| {
        if !seen.contains(&value) {
            seen.push(value);
        }
    };
    for (_, block) in function.blocks.iter() {
        for &inst in &block.instructions {
            match &module.values[inst] {
                IRValue::Load { pointer, .. } | IRValue::Store { pointer, .. } => {
                    if module.globals.contains(pointer) {
                        visit(*pointer);
                    }
                }
                IRValue::AccessChain { base, .. } => {
                    if module.globals.contains(base) {
                        visit(*base);
                    }
                }
                _ => {}
            }
        }
    }
    seen
}

fn lower_global(
    interner: &mut Interner,
    module: &mut IRModule,
    v: &AnalyzedVar,
    globals: &mut HashMap<String, GlobalBinding>,
) {
    module.pointer_type(interner, v.ty, v.storage);
    let handle = module.values.append(IRValue::Variable {
        ty: v.ty,
        storage_class: v.storage,
        name: Some(v.name.clone()),
    });
    module.globals.push(handle);
    globals.insert(v.name.clone(), GlobalBinding { pointer: handle, ty: v.ty });

    let attrs = GlobalAttrs {
        location: attr_int_arg(&v.attrs, "location"),
        builtin: attr_ident_arg(&v.attrs, "builtin").as_deref().and_then(Builtin::from_name),
        set: attr_int_arg(&v.attrs, "set"),
        binding: attr_int_arg(&v.attrs, "binding"),
    };
    if attrs.location.is_some() || attrs.builtin.is_some() || attrs.set.is_some() || attrs.binding.is_some() {
        module.global_decorations.insert(handle, attrs);
    }
}

/// Declares one `Input`/`Output` interface global for an entry point's
/// parameter or return value (or one field of a struct-typed one),
/// decorating it with `location`/`builtin` when given.
fn declare_interface_global(
    interner: &mut Interner,
    module: &mut IRModule,
    ty: Handle<Type>,
    storage_class: StorageClass,
    name: String,
    location: Option<u32>,
    builtin: Option<&str>,
) -> Handle<IRValue> {
    module.pointer_type(interner, ty, storage_class);
    let handle = module.values.append(IRValue::Variable {
        ty,
        storage_class,
        name: Some(name),
    });
    module.globals.push(handle);
    let attrs = GlobalAttrs {
        location,
        builtin: builtin.and_then(Builtin::from_name),
        set: None,
        binding: None,
    };
    if attrs.location.is_some() || attrs.builtin.is_some() {
        module.global_decorations.insert(handle, attrs);
    }
    handle
}

/// What an entry point's `return` statement stores into before emitting
/// a void `Return`, per the decomposition rule in the IR builder's
/// entry-point bookkeeping.
enum EntryOutputs {
    Void,
    Single(Handle<IRValue>),
    /// One `Output` global per struct field, in field-declaration order.
    Fields(Vec<Handle<IRValue>>),
}

/// Binds each source parameter to an `Input`-backed value for an entry
/// point: scalar/vector parameters become one global each; struct
/// parameters become one global per field, assembled back into the
/// struct value with `CompositeConstruct`.
fn lower_entry_params(fb: &mut FnBuilder, f: &AnalyzedFunction) {
    for (param, &ty) in f.params.iter().zip(f.param_types.iter()) {
        match fb.interner.kind(ty).clone() {
            TypeKind::Struct { fields, .. } => {
                let mut field_values = Vec::with_capacity(fields.len());
                for field in &fields {
                    let name = format!("{}.{}", param.name, field.name);
                    let g = declare_interface_global(
                        fb.interner,
                        fb.module,
                        field.ty,
                        StorageClass::Input,
                        name,
                        field.attrs.location,
                        field.attrs.builtin.as_deref(),
                    );
                    field_values.push(fb.push(IRValue::Load { pointer: g, ty: field.ty }));
                }
                let composed = fb.push(IRValue::CompositeConstruct { ty, components: field_values });
                fb.scopes[0].insert(param.name.clone(), LocalBinding::Param { value: composed, ty });
            }
            _ => {
                let location = attr_int_arg(&param.attrs, "location");
                let builtin = attr_ident_arg(&param.attrs, "builtin");
                let g = declare_interface_global(
                    fb.interner,
                    fb.module,
                    ty,
                    StorageClass::Input,
                    param.name.clone(),
                    location,
                    builtin.as_deref(),
                );
                let value = fb.push(IRValue::Load { pointer: g, ty });
                fb.scopes[0].insert(param.name.clone(), LocalBinding::Param { value, ty });
            }
        }
    }
}

/// Declares the `Output` global(s) an entry point's `return` statement
/// writes through; see [`EntryOutputs`].
fn build_entry_outputs(fb: &mut FnBuilder, fname: &str, return_attrs: &[Attribute], ty: Handle<Type>) -> EntryOutputs {
    if ty == fb.interner.void {
        return EntryOutputs::Void;
    }
    match fb.interner.kind(ty).clone() {
        TypeKind::Struct { fields, .. } => {
            let mut outs = Vec::with_capacity(fields.len());
            for field in &fields {
                let name = format!("{fname}.{}", field.name);
                outs.push(declare_interface_global(
                    fb.interner,
                    fb.module,
                    field.ty,
                    StorageClass::Output,
                    name,
                    field.attrs.location,
                    field.attrs.builtin.as_deref(),
                ));
            }
            EntryOutputs::Fields(outs)
        }
        _ => {
            let location = attr_int_arg(return_attrs, "location");
            let builtin = attr_ident_arg(return_attrs, "builtin");
            let g = declare_interface_global(
                fb.interner,
                fb.module,
                ty,
                StorageClass::Output,
                format!("{fname}.result"),
                location,
                builtin.as_deref(),
            );
            EntryOutputs::Single(g)
        }
    }
}

/// Every live array type gets one shared `OpConstant` for its length,
/// used as `OpTypeArray`'s operand.
fn intern_array_size_consts(interner: &Interner, module: &mut IRModule) {
    let snapshot: Vec<Handle<Type>> = interner.order().to_vec();
    for ty in snapshot {
        if let TypeKind::Array { size, .. } = interner.kind(ty) {
            if !module.array_size_consts.contains_key(&ty) {
                let size = *size;
                let c = module.intern_constant(format!("@arraylen({})", size), || {
                    IRValue::Constant(ConstantInner::Uint(size))
                });
                module.array_size_consts.insert(ty, c);
            }
        }
    }
}

fn lower_function(
    interner: &mut Interner,
    module: &mut IRModule,
    globals: &HashMap<String, GlobalBinding>,
    functions: &HashMap<String, Handle<Function>>,
    f: &AnalyzedFunction,
) -> Result<Function> {
    let mut blocks = Arena::new();
    let entry_block = blocks.append(Block::default());
    let is_entry = entry_point_stage(&f.attrs).is_some();
    let mut fb = FnBuilder {
        interner,
        module,
        globals,
        functions,
        blocks,
        variables: Vec::new(),
        current: entry_block,
        scopes: vec![HashMap::new()],
        loop_stack: Vec::new(),
        return_type: f.return_type,
        entry_outputs: None,
    };

    let mut parameters = Vec::new();
    if is_entry {
        lower_entry_params(&mut fb, f);
        fb.entry_outputs = Some(build_entry_outputs(&mut fb, &f.name, &f.return_attrs, f.return_type));
    } else {
        parameters.reserve(f.params.len());
        for (i, (param, &ty)) in f.params.iter().zip(f.param_types.iter()).enumerate() {
            let value = fb.module.values.append(IRValue::FunctionParameter { ty, index: i as u32 });
            parameters.push(value);
            fb.scopes[0].insert(param.name.clone(), LocalBinding::Param { value, ty });
        }
    }

    for stmt in &f.body {
        fb.lower_stmt(stmt)?;
    }
    if !fb.terminated() {
        // Falls off the end of a `void`-returning function; `int`/`float`
        // fallthrough without a `return` is a semantic error analysis
        // already would have flagged via control-flow coverage in a
        // fuller implementation, so this only fires for `void` bodies.
        fb.emit_terminator(IRValue::Return(None));
    }

    let (ty, param_types) = if is_entry {
        (interner.function(interner.void, Vec::new()), Vec::new())
    } else {
        (interner.function(f.return_type, f.param_types.clone()), f.param_types.clone())
    };
    let FnBuilder { blocks, variables, .. } = fb;
    Ok(Function {
        name: f.name.clone(),
        ty,
        param_types,
        parameters,
        variables,
        blocks,
        entry_block,
    })
}

enum LValue<'e> {
    Pointer { pointer: Handle<IRValue>, ty: Handle<Type> },
    Swizzle { base: &'e Expr, base_ty: Handle<Type>, indices: Vec<u32> },
}

struct FnBuilder<'b> {
    interner: &'b mut Interner,
    module: &'b mut IRModule,
    globals: &'b HashMap<String, GlobalBinding>,
    functions: &'b HashMap<String, Handle<Function>>,
    blocks: Arena<Block>,
    variables: Vec<Handle<IRValue>>,
    current: Handle<Block>,
    scopes: Vec<HashMap<String, LocalBinding>>,
    loop_stack: Vec<LoopContext>,
    return_type: Handle<Type>,
    entry_outputs: Option<EntryOutputs>,
}

impl<'b> FnBuilder<'b> {
    fn terminated(&self) -> bool {
        self.blocks[self.current].is_terminated(&self.module.values)
    }

    fn new_block(&mut self) -> Handle<Block> {
        self.blocks.append(Block::default())
    }

    fn push(&mut self, value: IRValue) -> Handle<IRValue> {
        let handle = self.module.values.append(value);
        self.blocks[self.current].instructions.push(handle);
        handle
    }

    fn emit_terminator(&mut self, value: IRValue) {
        if !self.terminated() {
            self.push(value);
        }
    }

    fn switch_to(&mut self, block: Handle<Block>) {
        self.current = block;
    }

    fn lookup(&self, name: &str) -> Option<LocalBinding> {
        for scope in self.scopes.iter().rev() {
            if let Some(&b) = scope.get(name) {
                return Some(b);
            }
        }
        None
    }

    fn new_local(&mut self, name: String, ty: Handle<Type>) -> Handle<IRValue> {
        let pointer = self.module.values.append(IRValue::Variable {
            ty,
            storage_class: StorageClass::Function,
            name: Some(name.clone()),
        });
        self.variables.push(pointer);
        self.scopes.last_mut().unwrap().insert(name, LocalBinding::Var { pointer, ty });
        pointer
    }

    fn uint_const(&mut self, value: u64) -> Handle<IRValue> {
        let ty = self.module.uint32_type;
        self.module.intern_constant(format!("@u32lit({value})"), || {
            IRValue::Constant(ConstantInner::Uint(value))
        })
    }

    // ---- statements ------------------------------------------------------

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        if self.terminated() {
            return Ok(());
        }
        match &stmt.kind {
            StmtKind::Decl(v) => self.lower_local_decl(v),
            StmtKind::Assign { target, value } => self.lower_assign(target, value),
            StmtKind::Expr(e) => {
                self.lower_expr(e)?;
                Ok(())
            }
            StmtKind::Block(stmts) => {
                self.scopes.push(HashMap::new());
                for s in stmts {
                    self.lower_stmt(s)?;
                }
                self.scopes.pop();
                Ok(())
            }
            StmtKind::Return(value) => {
                match self.entry_outputs.take() {
                    None => {
                        let value = value.as_ref().map(|v| self.lower_expr(v)).transpose()?;
                        self.emit_terminator(IRValue::Return(value));
                    }
                    Some(outputs) => {
                        match &outputs {
                            EntryOutputs::Void => {}
                            EntryOutputs::Single(global) => {
                                let v = value.as_ref().ok_or_else(|| {
                                    LowerError::Unsupported("entry point return missing value", stmt.span)
                                })?;
                                let v = self.lower_expr(v)?;
                                self.push(IRValue::Store { pointer: *global, value: v });
                            }
                            EntryOutputs::Fields(globals) => {
                                let v = value.as_ref().ok_or_else(|| {
                                    LowerError::Unsupported("entry point return missing value", stmt.span)
                                })?;
                                let ty = v.ty.get().unwrap_or(self.return_type);
                                let struct_value = self.lower_expr(v)?;
                                for (i, &global) in globals.iter().enumerate() {
                                    let field_ty = match self.interner.kind(ty) {
                                        TypeKind::Struct { fields, .. } => fields[i].ty,
                                        _ => ty,
                                    };
                                    let field = self.push(IRValue::CompositeExtract {
                                        base: struct_value,
                                        indices: vec![i as u32],
                                        ty: field_ty,
                                    });
                                    self.push(IRValue::Store { pointer: global, value: field });
                                }
                            }
                        }
                        self.entry_outputs = Some(outputs);
                        self.emit_terminator(IRValue::Return(None));
                    }
                }
                Ok(())
            }
            StmtKind::Discard => {
                self.emit_terminator(IRValue::Discard);
                Ok(())
            }
            StmtKind::If { cond, then_branch, else_branch } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::Break => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| LowerError::LoopControlOutsideLoop(stmt.span))?
                    .merge_block;
                self.emit_terminator(IRValue::Branch(target));
                Ok(())
            }
            StmtKind::Continue => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| LowerError::LoopControlOutsideLoop(stmt.span))?
                    .continue_block;
                self.emit_terminator(IRValue::Branch(target));
                Ok(())
            }
        }
    }

    fn lower_local_decl(&mut self, v: &VarDecl) -> Result<()> {
        let ty = match (&v.type_expr, &v.value_expr) {
            (Some(te), _) => te.as_type.get().unwrap_or(self.interner.void),
            (None, Some(ve)) => ve.ty.get().unwrap_or(self.interner.void),
            (None, None) => self.interner.void,
        };
        let pointer = self.new_local(v.name.clone(), ty);
        if let Some(value_expr) = &v.value_expr {
            let value = self.lower_expr(value_expr)?;
            self.push(IRValue::Store { pointer, value });
        }
        Ok(())
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Result<()> {
        if let ExprKind::Member { base, name } = &target.kind {
            let base_ty = base.ty.get().unwrap_or(self.interner.void);
            if let TypeKind::Vector { len, .. } = self.interner.kind(base_ty) {
                let len = *len;
                if let Some(indices) = swizzle_indices(name, len) {
                    if indices.len() > 1 {
                        return self.lower_swizzle_assign(base, base_ty, indices, value);
                    }
                }
            }
        }
        let lvalue = self.lower_lvalue(target)?;
        match lvalue {
            LValue::Pointer { pointer, .. } => {
                let value = self.lower_expr(value)?;
                self.push(IRValue::Store { pointer, value });
                Ok(())
            }
            LValue::Swizzle { base, base_ty, indices } => self.lower_swizzle_assign(base, base_ty, indices, value),
        }
    }

    fn lower_swizzle_assign(&mut self, base: &Expr, base_ty: Handle<Type>, indices: Vec<u32>, value: &Expr) -> Result<()> {
        let base_lvalue = self.lower_lvalue(base)?;
        let LValue::Pointer { pointer, .. } = base_lvalue else {
            return Err(LowerError::NotAssignable("swizzle of a swizzle".into(), base.span));
        };
        let len = match self.interner.kind(base_ty) {
            TypeKind::Vector { len, .. } => *len,
            _ => return Err(LowerError::NotAssignable("non-vector swizzle".into(), base.span)),
        };
        let old = self.push(IRValue::Load { pointer, ty: base_ty });
        let new_value = self.lower_expr(value)?;
        let mut shuffle_indices = Vec::with_capacity(len as usize);
        for lane in 0..len {
            match indices.iter().position(|&i| i == lane) {
                Some(pos) => shuffle_indices.push(len + pos as u32),
                None => shuffle_indices.push(lane),
            }
        }
        let combined = self.push(IRValue::VectorShuffle {
            first: old,
            second: new_value,
            indices: shuffle_indices,
            ty: base_ty,
        });
        self.push(IRValue::Store { pointer, value: combined });
        Ok(())
    }

    fn lower_lvalue<'e>(&mut self, expr: &'e Expr) -> Result<LValue<'e>> {
        match &expr.kind {
            ExprKind::Ident(name) => match self.lookup(name) {
                Some(LocalBinding::Var { pointer, ty }) => Ok(LValue::Pointer { pointer, ty }),
                Some(LocalBinding::Param { .. }) | None => {
                    if let Some(g) = self.globals.get(name) {
                        Ok(LValue::Pointer { pointer: g.pointer, ty: g.ty })
                    } else {
                        Err(LowerError::NotAssignable(name.clone(), expr.span))
                    }
                }
            },
            ExprKind::Member { base, name } => {
                let base_ty = base.ty.get().unwrap_or(self.interner.void);
                match self.interner.kind(base_ty).clone() {
                    TypeKind::Struct { fields, .. } => {
                        let idx = fields
                            .iter()
                            .position(|f| &f.name == name)
                            .ok_or_else(|| LowerError::NotAssignable(name.clone(), expr.span))?;
                        let field_ty = fields[idx].ty;
                        let (base_ptr, storage) = self.resolve_pointer_and_storage(base)?;
                        let index_const = self.uint_const(idx as u64);
                        let ptr_ty = self.module.pointer_type(self.interner, field_ty, storage);
                        let pointer = self.push(IRValue::AccessChain {
                            base: base_ptr,
                            indices: vec![index_const],
                            ty: ptr_ty,
                        });
                        Ok(LValue::Pointer { pointer, ty: field_ty })
                    }
                    TypeKind::Vector { elem, len } => match swizzle_indices(name, len) {
                        Some(indices) if indices.len() == 1 => {
                            let (base_ptr, storage) = self.resolve_pointer_and_storage(base)?;
                            let index_const = self.uint_const(indices[0] as u64);
                            let ptr_ty = self.module.pointer_type(self.interner, elem, storage);
                            let pointer = self.push(IRValue::AccessChain {
                                base: base_ptr,
                                indices: vec![index_const],
                                ty: ptr_ty,
                            });
                            Ok(LValue::Pointer { pointer, ty: elem })
                        }
                        Some(indices) => Ok(LValue::Swizzle { base, base_ty, indices }),
                        None => Err(LowerError::NotAssignable(name.clone(), expr.span)),
                    },
                    _ => Err(LowerError::NotAssignable(name.clone(), expr.span)),
                }
            }
            ExprKind::Index { base, index } => {
                let base_ty = base.ty.get().unwrap_or(self.interner.void);
                let elem_ty = match self.interner.kind(base_ty) {
                    TypeKind::Array { elem, .. } | TypeKind::RuntimeArray { elem, .. } => *elem,
                    TypeKind::Vector { elem, .. } => *elem,
                    _ => return Err(LowerError::NotAssignable("index".into(), expr.span)),
                };
                let (base_ptr, storage) = self.resolve_pointer_and_storage(base)?;
                let index_value = self.lower_expr(index)?;
                let ptr_ty = self.module.pointer_type(self.interner, elem_ty, storage);
                let pointer = self.push(IRValue::AccessChain {
                    base: base_ptr,
                    indices: vec![index_value],
                    ty: ptr_ty,
                });
                Ok(LValue::Pointer { pointer, ty: elem_ty })
            }
            _ => Err(LowerError::NotAssignable("expression".into(), expr.span)),
        }
    }

    fn resolve_pointer_and_storage(&mut self, expr: &Expr) -> Result<(Handle<IRValue>, StorageClass)> {
        match self.lower_lvalue(expr)? {
            LValue::Pointer { pointer, .. } => {
                let storage = match &self.module.values[pointer] {
                    IRValue::Variable { storage_class, .. } => *storage_class,
                    IRValue::AccessChain { .. } => StorageClass::Function,
                    _ => StorageClass::Function,
                };
                Ok((pointer, storage))
            }
            LValue::Swizzle { .. } => Err(LowerError::NotAssignable("nested swizzle".into(), expr.span)),
        }
    }

    fn lower_if(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) -> Result<()> {
        let cond_value = self.lower_expr(cond)?;
        let then_block = self.new_block();
        let else_block = self.new_block();
        let merge_block = self.new_block();

        self.push(IRValue::SelectionMerge(merge_block));
        self.push(IRValue::BranchCond { condition: cond_value, true_block: then_block, false_block: else_block });

        self.switch_to(then_block);
        self.lower_stmt(then_branch)?;
        self.emit_terminator(IRValue::Branch(merge_block));

        self.switch_to(else_block);
        if let Some(else_branch) = else_branch {
            self.lower_stmt(else_branch)?;
        }
        self.emit_terminator(IRValue::Branch(merge_block));

        self.switch_to(merge_block);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt) -> Result<()> {
        let header_block = self.new_block();
        let body_block = self.new_block();
        let continue_block = self.new_block();
        let merge_block = self.new_block();

        self.emit_terminator(IRValue::Branch(header_block));

        self.switch_to(header_block);
        self.push(IRValue::LoopMerge { merge_block, continue_block });
        let cond_value = self.lower_expr(cond)?;
        let check_block = self.current;
        let _ = check_block;
        self.push(IRValue::BranchCond { condition: cond_value, true_block: body_block, false_block: merge_block });

        self.loop_stack.push(LoopContext { continue_block, merge_block });
        self.switch_to(body_block);
        self.lower_stmt(body)?;
        self.emit_terminator(IRValue::Branch(continue_block));
        self.loop_stack.pop();

        self.switch_to(continue_block);
        self.emit_terminator(IRValue::Branch(header_block));

        self.switch_to(merge_block);
        Ok(())
    }

    // ---- expressions -------------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> Result<Handle<IRValue>> {
        let ty = expr.ty.get().unwrap_or(self.interner.void);
        match &expr.kind {
            ExprKind::IntLiteral(v) => Ok(self.int_literal(*v, ty)),
            ExprKind::FloatLiteral(v) => Ok(self.float_literal(*v, ty)),
            ExprKind::BoolLiteral(v) => Ok(self.module.intern_constant(format!("@bool({v})"), || IRValue::ConstantBool(*v))),
            ExprKind::StringLiteral(_) => Err(LowerError::NotAValue("string literal".into(), expr.span)),
            ExprKind::Ident(name) => self.lower_ident(name, expr.span),
            ExprKind::Unary { op, expr: inner } => {
                let value = self.lower_expr(inner)?;
                Ok(self.push(IRValue::UnaryOp { op: *op, value, ty }))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, ty),
            ExprKind::Member { base, name } => self.lower_member(base, name, ty, expr.span),
            ExprKind::Index { base, index } => self.lower_index(base, index, ty),
            ExprKind::Call { callee, args } => self.lower_call(callee, args, ty, expr.span),
            ExprKind::BuiltinCall { name, args } => self.lower_builtin_call(name, args, ty, expr.span),
            ExprKind::StructLiteral { ty: struct_ty, fields } => self.lower_struct_literal(struct_ty, fields, ty),
            ExprKind::ArrayType { .. } | ExprKind::StructType { .. } => {
                Err(LowerError::NotAValue("type expression".into(), expr.span))
            }
        }
    }

    fn int_literal(&mut self, v: i64, ty: Handle<Type>) -> Handle<IRValue> {
        match self.interner.kind(ty) {
            TypeKind::Float { .. } => self.float_literal(v as f64, ty),
            TypeKind::Int { signed: false, .. } => {
                self.module.intern_constant(format!("@u({v})"), || IRValue::Constant(ConstantInner::Uint(v as u64)))
            }
            _ => self.module.intern_constant(format!("@i({v})"), || IRValue::Constant(ConstantInner::Sint(v))),
        }
    }

    fn float_literal(&mut self, v: f64, _ty: Handle<Type>) -> Handle<IRValue> {
        self.module
            .intern_constant(format!("@f({})", v.to_bits()), || IRValue::Constant(ConstantInner::Float(v)))
    }

    fn lower_ident(&mut self, name: &str, span: Span) -> Result<Handle<IRValue>> {
        match self.lookup(name) {
            Some(LocalBinding::Var { pointer, ty }) => Ok(self.push(IRValue::Load { pointer, ty })),
            Some(LocalBinding::Param { value, .. }) => Ok(value),
            None => {
                if let Some(g) = self.globals.get(name) {
                    Ok(self.push(IRValue::Load { pointer: g.pointer, ty: g.ty }))
                } else {
                    Err(LowerError::NotAValue(name.to_string(), span))
                }
            }
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, ty: Handle<Type>) -> Result<Handle<IRValue>> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_short_circuit(op, lhs, rhs);
        }
        let lhs_value = self.lower_expr(lhs)?;
        let rhs_value = self.lower_expr(rhs)?;
        Ok(self.push(IRValue::BinaryOp { op, lhs: lhs_value, rhs: rhs_value, ty }))
    }

    /// `&&`/`||` must not evaluate their right side unless needed: branch
    /// around `rhs` entirely, and join the short-circuit value with the
    /// evaluated `rhs` value through an `OpPhi` at the merge block.
    fn lower_short_circuit(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Handle<IRValue>> {
        let bool_ty = self.interner.bool_;
        let lhs_value = self.lower_expr(lhs)?;
        let rhs_block = self.new_block();
        let merge_block = self.new_block();
        let short_circuit_block = self.new_block();

        let (true_block, false_block) = if op == BinaryOp::And {
            (rhs_block, short_circuit_block)
        } else {
            (short_circuit_block, rhs_block)
        };
        self.push(IRValue::SelectionMerge(merge_block));
        self.push(IRValue::BranchCond { condition: lhs_value, true_block, false_block });

        self.switch_to(short_circuit_block);
        let short_circuit_value = self.module.intern_constant(
            format!("@bool({})", op == BinaryOp::Or),
            || IRValue::ConstantBool(op == BinaryOp::Or),
        );
        self.emit_terminator(IRValue::Branch(merge_block));
        let short_circuit_pred = self.current;

        self.switch_to(rhs_block);
        let rhs_value = self.lower_expr(rhs)?;
        self.emit_terminator(IRValue::Branch(merge_block));
        let rhs_pred = self.current;

        self.switch_to(merge_block);
        Ok(self.push(IRValue::Phi {
            ty: bool_ty,
            edges: vec![(short_circuit_value, short_circuit_pred), (rhs_value, rhs_pred)],
        }))
    }

    fn lower_member(&mut self, base: &Expr, name: &str, ty: Handle<Type>, span: Span) -> Result<Handle<IRValue>> {
        let base_ty = base.ty.get().unwrap_or(self.interner.void);
        match self.interner.kind(base_ty).clone() {
            TypeKind::Vector { len, .. } => {
                let base_value = self.lower_expr(base)?;
                let indices = swizzle_indices(name, len).ok_or_else(|| LowerError::NotAValue(name.to_string(), span))?;
                if indices.len() == 1 {
                    Ok(self.push(IRValue::CompositeExtract { base: base_value, indices, ty }))
                } else {
                    Ok(self.push(IRValue::VectorShuffle { first: base_value, second: base_value, indices, ty }))
                }
            }
            TypeKind::Struct { fields, .. } => {
                let base_value = self.lower_expr(base)?;
                let idx = fields
                    .iter()
                    .position(|f| f.name == name)
                    .ok_or_else(|| LowerError::NotAValue(name.to_string(), span))?;
                Ok(self.push(IRValue::CompositeExtract { base: base_value, indices: vec![idx as u32], ty }))
            }
            TypeKind::RuntimeArray { .. } if name == "len" => {
                let lvalue = self.lower_lvalue(base)?;
                let LValue::Pointer { pointer, .. } = lvalue else {
                    return Err(LowerError::NotAValue("array length of a non-addressable value".into(), span));
                };
                Ok(self.push(IRValue::ArrayLength { structure: pointer, member_index: 0 }))
            }
            _ => Err(LowerError::NotAValue(name.to_string(), span)),
        }
    }

    fn lower_index(&mut self, base: &Expr, index: &Expr, ty: Handle<Type>) -> Result<Handle<IRValue>> {
        let base_ty = base.ty.get().unwrap_or(self.interner.void);
        match self.interner.kind(base_ty) {
            TypeKind::Vector { .. } => {
                let base_value = self.lower_expr(base)?;
                if let Some(n) = index.const_value.get() {
                    return Ok(self.push(IRValue::CompositeExtract {
                        base: base_value,
                        indices: vec![n as u32],
                        ty,
                    }));
                }
                // Dynamically-indexed vector reads go through a
                // temporary so `AccessChain` has a pointer to walk.
                let temp = self.new_local("__vec_index_tmp".to_string(), base_ty);
                self.push(IRValue::Store { pointer: temp, value: base_value });
                let index_value = self.lower_expr(index)?;
                let ptr_ty = self.module.pointer_type(self.interner, ty, StorageClass::Function);
                let pointer = self.push(IRValue::AccessChain { base: temp, indices: vec![index_value], ty: ptr_ty });
                Ok(self.push(IRValue::Load { pointer, ty }))
            }
            _ => {
                let lvalue = self.lower_lvalue(&Expr::new(
                    ExprKind::Index { base: Box::new(base.clone()), index: Box::new(index.clone()) },
                    base.span,
                ))?;
                let LValue::Pointer { pointer, ty } = lvalue else {
                    return Err(LowerError::NotAValue("index".into(), base.span));
                };
                Ok(self.push(IRValue::Load { pointer, ty }))
            }
        }
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], ty: Handle<Type>, span: Span) -> Result<Handle<IRValue>> {
        if let Some(target_ty) = callee.as_type.get() {
            return self.lower_constructor(target_ty, args, ty);
        }
        if let ExprKind::Ident(name) = &callee.kind {
            if let Some(&function) = self.functions.get(name) {
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    arg_values.push(self.lower_expr(a)?);
                }
                return Ok(self.push(IRValue::FunctionCall { function, args: arg_values, ty }));
            }
        }
        Err(LowerError::NotAValue("call".into(), span))
    }

    /// `float4(a, b, c, d)`-style constructors: a same-type cast when
    /// there is exactly one scalar argument, otherwise a composite build.
    fn lower_constructor(&mut self, target_ty: Handle<Type>, args: &[Expr], ty: Handle<Type>) -> Result<Handle<IRValue>> {
        let mut arg_values = Vec::with_capacity(args.len());
        for a in args {
            arg_values.push(self.lower_expr(a)?);
        }
        if args.len() == 1 && matches!(self.interner.kind(target_ty), TypeKind::Int { .. } | TypeKind::Float { .. }) {
            let arg_ty = args[0].ty.get().unwrap_or(self.interner.void);
            if arg_ty == target_ty {
                return Ok(arg_values[0]);
            }
            let op = cast_kind(self.interner, arg_ty, target_ty);
            return Ok(self.push(IRValue::Cast { value: arg_values[0], ty, op }));
        }
        Ok(self.push(IRValue::CompositeConstruct { ty, components: arg_values }))
    }

    fn lower_struct_literal(&mut self, struct_ty_expr: &Expr, fields: &[(String, Expr)], ty: Handle<Type>) -> Result<Handle<IRValue>> {
        let struct_ty = struct_ty_expr.as_type.get().unwrap_or(ty);
        let field_order = match self.interner.kind(struct_ty).clone() {
            TypeKind::Struct { fields: sfields, .. } => sfields,
            _ => return Err(LowerError::NotAValue("struct literal".into(), struct_ty_expr.span)),
        };
        let mut components = Vec::with_capacity(field_order.len());
        for field in &field_order {
            let provided = fields.iter().find(|(name, _)| name == &field.name);
            match provided {
                Some((_, value_expr)) => components.push(self.lower_expr(value_expr)?),
                None => return Err(LowerError::NotAValue(format!("missing field `{}`", field.name), struct_ty_expr.span)),
            }
        }
        Ok(self.push(IRValue::CompositeConstruct { ty, components }))
    }

    fn lower_builtin_call(&mut self, name: &str, args: &[Expr], ty: Handle<Type>, span: Span) -> Result<Handle<IRValue>> {
        let mut arg_values = Vec::with_capacity(args.len());
        for a in args {
            arg_values.push(self.lower_expr(a)?);
        }
        let first_ty = args.first().and_then(|a| a.ty.get()).unwrap_or(ty);
        let scalar_kind = self.interner.kind(self.interner.scalar_type(first_ty)).clone();
        let is_float = matches!(scalar_kind, TypeKind::Float { .. });
        let is_signed = matches!(scalar_kind, TypeKind::Int { signed: true, .. });

        let func = match name {
            "all" => BuiltinFn::DirectOp(Op::All),
            "any" => BuiltinFn::DirectOp(Op::Any),
            "dot" => BuiltinFn::DirectOp(Op::Dot),
            "abs" => BuiltinFn::ExtInst(if is_float { GlslExt::FAbs } else { GlslExt::SAbs } as u32),
            "min" => BuiltinFn::ExtInst(ext_for_tri(is_float, is_signed, GlslExt::FMin, GlslExt::SMin, GlslExt::UMin)),
            "max" => BuiltinFn::ExtInst(ext_for_tri(is_float, is_signed, GlslExt::FMax, GlslExt::SMax, GlslExt::UMax)),
            "clamp" => BuiltinFn::ExtInst(ext_for_tri(is_float, is_signed, GlslExt::FClamp, GlslExt::SClamp, GlslExt::UClamp)),
            _ => match glsl_ext_inst_for(name) {
                Some(ext) => BuiltinFn::ExtInst(ext as u32),
                None => return Err(LowerError::Unsupported("unknown builtin function", span)),
            },
        };
        Ok(self.push(IRValue::BuiltinCall { func, args: arg_values, ty }))
    }
}

fn ext_for_tri(is_float: bool, is_signed: bool, f: GlslExt, s: GlslExt, u: GlslExt) -> u32 {
    (if is_float { f } else if is_signed { s } else { u }) as u32
}

fn cast_kind(interner: &Interner, from: Handle<Type>, to: Handle<Type>) -> CastOp {
    match (interner.kind(from), interner.kind(to)) {
        (TypeKind::Float { .. }, TypeKind::Int { .. }) => CastOp::FloatToInt,
        (TypeKind::Int { .. }, TypeKind::Float { .. }) => CastOp::IntToFloat,
        (TypeKind::Float { .. }, TypeKind::Float { .. }) => CastOp::FloatToFloat,
        (TypeKind::Int { bits: a, .. }, TypeKind::Int { bits: b, .. }) if a == b => CastOp::Bitcast,
        (TypeKind::Int { .. }, TypeKind::Int { .. }) => CastOp::IntToInt,
        _ => CastOp::Bitcast,
    }
}

fn swizzle_indices(name: &str, len: u32) -> Option<Vec<u32>> {
    const XYZW: &[u8] = b"xyzw";
    const RGBA: &[u8] = b"rgba";
    if name.is_empty() || name.len() > 4 {
        return None;
    }
    let bytes = name.as_bytes();
    let alphabet = if XYZW.contains(&bytes[0]) {
        XYZW
    } else if RGBA.contains(&bytes[0]) {
        RGBA
    } else {
        return None;
    };
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        let idx = alphabet.iter().position(|&c| c == b)?;
        if idx as u32 >= len {
            return None;
        }
        out.push(idx as u32);
    }
    Some(out)
}
