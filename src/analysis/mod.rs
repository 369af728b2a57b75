//! C4: scope resolution, attribute validation, constant folding, type
//! inference, assignability.
//!
//! Two passes per declaration scope: `register` walks every declaration
//! in a scope and binds its name (catching duplicates) before anything
//! is type-checked, so top-level declarations can refer to each other
//! regardless of textual order. `analyze` then type-checks each in turn.

pub mod scope;

use crate::arena::Handle;
use crate::diagnostics::Span;
use crate::front::ast::*;
use crate::ty::{FieldAttrs, ImageDim, Interner, Layout, StorageClass, Type, TypeKind};
use scope::{Scope, ScopeOwner, ScopeTree, Symbol, SymbolKind};

#[derive(thiserror::Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("cannot find `{0}` in this scope at {1}")]
    NameNotFound(String, Span),
    #[error("`{0}` is already declared at {1} (redeclared at {2})")]
    Duplicate(String, Span, Span),
    #[error("type mismatch at {span}: expected {expected}, instead got {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("expression at {0} is not assignable")]
    NotAssignable(Span),
    #[error("array size at {0} must resolve to a positive integer constant")]
    BadArraySize(Span),
    #[error("unknown attribute `{0}` at {1}")]
    UnknownAttribute(String, Span),
    #[error("attribute `{0}` at {1} has the wrong number of arguments")]
    BadAttributeArity(String, Span),
    #[error("unknown builtin `{0}` at {1}")]
    UnknownBuiltin(String, Span),
    #[error("`{0}` at {1} expects {2} argument(s), found {3}")]
    ArityMismatch(String, Span, usize, usize),
    #[error("expression at {0} is not callable")]
    NotCallable(Span),
    #[error("no field `{0}` on this type at {1}")]
    UnknownField(String, Span),
    #[error("`let` at {0} needs a type, an initializer, or both")]
    VarNeedsTypeOrInit(Span),
}

type Result<T> = std::result::Result<T, AnalysisError>;

/// One resolved top-level declaration, ready for IR lowering.
pub struct AnalyzedVar {
    pub name: String,
    pub storage: StorageClass,
    pub ty: Handle<Type>,
    pub attrs: Vec<Attribute>,
    pub value_expr: Option<Expr>,
    pub span: Span,
}

pub struct AnalyzedFunction {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub params: Vec<Param>,
    pub param_types: Vec<Handle<Type>>,
    pub return_type: Handle<Type>,
    pub return_attrs: Vec<Attribute>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

pub enum AnalyzedDecl {
    Var(AnalyzedVar),
    Function(AnalyzedFunction),
    TypeDef,
}

pub struct Analyzer<'a> {
    pub interner: &'a mut Interner,
    pub scopes: ScopeTree,
    pub diagnostics: Vec<AnalysisError>,
    file_scope: Handle<Scope>,
}

impl<'a> Analyzer<'a> {
    pub fn new(interner: &'a mut Interner) -> Self {
        let mut scopes = ScopeTree::new();
        let file_scope = scopes.push(ScopeOwner::File, None);
        Analyzer {
            interner,
            scopes,
            diagnostics: Vec::new(),
            file_scope,
        }
    }

    fn error(&mut self, err: AnalysisError) {
        self.diagnostics.push(err);
    }

    pub fn analyze_file(&mut self, file: &File) -> Vec<AnalyzedDecl> {
        // Pass 1: register every top-level name.
        for decl in &file.decls {
            self.register_top_decl(decl);
        }
        // Pass 2: analyze each in turn.
        let mut out = Vec::with_capacity(file.decls.len());
        for decl in &file.decls {
            out.push(self.analyze_top_decl(decl));
        }
        out
    }

    fn register_top_decl(&mut self, decl: &Decl) {
        let (name, span, kind) = match &decl.kind {
            DeclKind::Var(v) => {
                let storage = self.resolve_storage(v.storage.as_deref(), true);
                // Placeholder type; replaced once analyzed. Using void
                // here only affects error messages if something looks
                // this symbol up before pass 2 completes, which never
                // happens within one file scope.
                (
                    v.name.clone(),
                    v.span,
                    SymbolKind::Var {
                        storage,
                        ty: self.interner.void,
                        assignable: storage != StorageClass::Parameter,
                    },
                )
            }
            DeclKind::Function(f) => (
                f.name.clone(),
                f.span,
                SymbolKind::Function {
                    ty: self.interner.void,
                },
            ),
            DeclKind::TypeDef(t) => (
                t.name.clone(),
                t.span,
                SymbolKind::TypeName {
                    ty: self.interner.void,
                },
            ),
            DeclKind::Module(_) => return,
        };
        if let Some(prev) = self.scopes.define(self.file_scope, name.clone(), Symbol { kind, span }) {
            self.error(AnalysisError::Duplicate(name, prev, span));
        }
    }

    fn analyze_top_decl(&mut self, decl: &Decl) -> AnalyzedDecl {
        match &decl.kind {
            DeclKind::Var(v) => AnalyzedDecl::Var(self.analyze_var(v, self.file_scope, true)),
            DeclKind::Function(f) => AnalyzedDecl::Function(self.analyze_function(f)),
            DeclKind::TypeDef(t) => {
                let ty = self.analyze_type_expr(&t.value_expr, self.file_scope);
                self.rebind(self.file_scope, &t.name, SymbolKind::TypeName { ty });
                AnalyzedDecl::TypeDef
            }
            DeclKind::Module(_) => AnalyzedDecl::TypeDef,
        }
    }

    fn rebind(&mut self, scope: Handle<Scope>, name: &str, kind: SymbolKind) {
        // Pass 2 replaces the placeholder symbol pass 1 installed.
        let span = self
            .scopes
            .lookup(scope, name)
            .map(|s| s.span)
            .unwrap_or(Span::UNKNOWN);
        self.scopes.define_overwrite(scope, name.to_string(), Symbol { kind, span });
    }

    fn resolve_storage(&self, written: Option<&str>, module_scope: bool) -> StorageClass {
        match written {
            Some("uniform") => StorageClass::Uniform,
            Some("storage") => StorageClass::Storage,
            Some("push_constant") => StorageClass::PushConstant,
            Some("workgroup") => StorageClass::Workgroup,
            Some("function") => StorageClass::Function,
            Some(_) | None => {
                if module_scope {
                    StorageClass::default_for_module_scope()
                } else {
                    StorageClass::default_for_function_scope()
                }
            }
        }
    }

    fn analyze_var(&mut self, v: &VarDecl, scope: Handle<Scope>, module_scope: bool) -> AnalyzedVar {
        let declared_ty = v.type_expr.as_ref().map(|e| self.analyze_type_expr(e, scope));
        if v.type_expr.is_none() && v.value_expr.is_none() {
            self.error(AnalysisError::VarNeedsTypeOrInit(v.span));
        }
        let ty = match (declared_ty, &v.value_expr) {
            (Some(t), Some(value)) => {
                self.analyze_expr(value, scope, Some(t), false);
                t
            }
            (Some(t), None) => t,
            (None, Some(value)) => {
                self.analyze_expr(value, scope, None, false);
                value.ty.get().unwrap_or(self.interner.void)
            }
            (None, None) => self.interner.void,
        };
        let storage = self.resolve_storage(v.storage.as_deref(), module_scope);
        self.validate_attrs(&v.attrs);
        let assignable = storage != StorageClass::Parameter;
        self.rebind(
            scope,
            &v.name,
            SymbolKind::Var {
                storage,
                ty,
                assignable,
            },
        );
        AnalyzedVar {
            name: v.name.clone(),
            storage,
            ty,
            attrs: v.attrs.clone(),
            value_expr: v.value_expr.clone(),
            span: v.span,
        }
    }

    fn analyze_function(&mut self, f: &FunctionDecl) -> AnalyzedFunction {
        self.validate_attrs(&f.attrs);
        let fn_scope = self.scopes.push(ScopeOwner::Function, Some(self.file_scope));
        let mut param_types = Vec::with_capacity(f.params.len());
        for p in &f.params {
            self.validate_attrs(&p.attrs);
            let ty = self.analyze_type_expr(&p.type_expr, fn_scope);
            param_types.push(ty);
            if let Some(prev) = self.scopes.define(
                fn_scope,
                p.name.clone(),
                Symbol {
                    kind: SymbolKind::Var {
                        storage: StorageClass::Parameter,
                        ty,
                        assignable: false,
                    },
                    span: p.span,
                },
            ) {
                self.error(AnalysisError::Duplicate(p.name.clone(), prev, p.span));
            }
        }
        let return_type = self.analyze_type_expr(&f.return_type, fn_scope);
        self.validate_attrs(&f.return_attrs);
        for stmt in &f.body {
            self.analyze_stmt(stmt, fn_scope, return_type);
        }
        let fn_ty = self.interner.function(return_type, param_types.clone());
        self.rebind(self.file_scope, &f.name, SymbolKind::Function { ty: fn_ty });
        AnalyzedFunction {
            name: f.name.clone(),
            attrs: f.attrs.clone(),
            params: f.params.clone(),
            param_types,
            return_type,
            return_attrs: f.return_attrs.clone(),
            body: f.body.clone(),
            span: f.span,
        }
    }

    fn validate_attrs(&mut self, attrs: &[Attribute]) {
        const KNOWN: &[&str] = &[
            "location", "set", "binding", "stage", "builtin", "offset", "read_only",
        ];
        for attr in attrs {
            if !KNOWN.contains(&attr.name.as_str()) {
                self.error(AnalysisError::UnknownAttribute(attr.name.clone(), attr.span));
                continue;
            }
            let expected_arity = match attr.name.as_str() {
                "read_only" => 0,
                _ => 1,
            };
            if attr.args.len() != expected_arity {
                self.error(AnalysisError::BadAttributeArity(attr.name.clone(), attr.span));
            }
        }
    }

    // ---- statements -----------------------------------------------------

    fn analyze_stmt(&mut self, stmt: &Stmt, scope: Handle<Scope>, return_type: Handle<Type>) {
        match &stmt.kind {
            StmtKind::Decl(v) => {
                self.analyze_var(v, scope, false);
            }
            StmtKind::Assign { target, value } => {
                self.analyze_expr(target, scope, None, true);
                let expected = target.ty.get();
                self.analyze_expr(value, scope, expected, false);
            }
            StmtKind::Expr(e) => {
                self.analyze_expr(e, scope, None, false);
            }
            StmtKind::Block(stmts) => {
                let block_scope = self.scopes.push(ScopeOwner::Block, Some(scope));
                for s in stmts {
                    self.analyze_stmt(s, block_scope, return_type);
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.analyze_expr(value, scope, Some(return_type), false);
                }
            }
            StmtKind::Discard | StmtKind::Break | StmtKind::Continue => {}
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.analyze_expr(cond, scope, Some(self.interner.bool_), false);
                self.analyze_stmt(then_branch, scope, return_type);
                if let Some(else_branch) = else_branch {
                    self.analyze_stmt(else_branch, scope, return_type);
                }
            }
            StmtKind::While { cond, body } => {
                self.analyze_expr(cond, scope, Some(self.interner.bool_), false);
                self.analyze_stmt(body, scope, return_type);
            }
        }
    }

    // ---- type expressions ------------------------------------------------

    fn analyze_type_expr(&mut self, expr: &Expr, scope: Handle<Scope>) -> Handle<Type> {
        let ty = match &expr.kind {
            ExprKind::Ident(name) => {
                if let Some(builtin) = resolve_builtin_type_name(self.interner, name) {
                    builtin
                } else if let Some(sym) = self.scopes.lookup(scope, name) {
                    match sym.kind {
                        SymbolKind::TypeName { ty } => ty,
                        _ => {
                            self.error(AnalysisError::NameNotFound(name.clone(), expr.span));
                            self.interner.void
                        }
                    }
                } else {
                    self.error(AnalysisError::NameNotFound(name.clone(), expr.span));
                    self.interner.void
                }
            }
            ExprKind::ArrayType { elem, size } => {
                let elem_ty = self.analyze_type_expr(elem, scope);
                match size {
                    None => self.interner.runtime_array(elem_ty, Layout::Unknown),
                    Some(size_expr) => {
                        self.analyze_expr(size_expr, scope, Some(self.interner.untyped_int), false);
                        match size_expr.const_value.get() {
                            Some(n) if n > 0 => {
                                self.interner.array(elem_ty, n as u64, Layout::Unknown)
                            }
                            _ => {
                                self.error(AnalysisError::BadArraySize(size_expr.span));
                                self.interner.array(elem_ty, 1, Layout::Unknown)
                            }
                        }
                    }
                }
            }
            ExprKind::StructType { layout, fields } => {
                let layout = match layout.as_deref() {
                    Some("std140") => Layout::Std140,
                    Some("std430") => Layout::Std430,
                    Some(other) => {
                        self.error(AnalysisError::UnknownAttribute(other.to_string(), expr.span));
                        Layout::Unknown
                    }
                    None => Layout::Unknown,
                };
                let mut field_tys = Vec::with_capacity(fields.len());
                for f in fields {
                    self.validate_attrs(&f.attrs);
                    let read_only = f.attrs.iter().any(|a| a.name == "read_only");
                    let ty = self.analyze_type_expr(&f.type_expr, scope);
                    let attrs = FieldAttrs {
                        location: attr_u32_arg(&f.attrs, "location"),
                        builtin: attr_str_arg(&f.attrs, "builtin"),
                    };
                    field_tys.push((f.name.clone(), ty, read_only, attrs));
                }
                let is_block = layout != Layout::Unknown;
                let (handle, _, _) = self.interner.struct_(None, layout, is_block, field_tys);
                handle
            }
            ExprKind::BuiltinCall { name, args } => match self.analyze_builtin_type_ctor(name, args, scope, expr.span) {
                Some(ty) => ty,
                None => {
                    self.analyze_expr(expr, scope, None, false);
                    expr.as_type.get().unwrap_or(self.interner.void)
                }
            },
            _ => {
                self.analyze_expr(expr, scope, None, false);
                expr.as_type.get().unwrap_or(self.interner.void)
            }
        };
        expr.as_type.set(Some(ty));
        expr.ty.set(Some(self.interner.meta_type));
        ty
    }

    /// Image/sampler builtin type constructors: `@sampler`, `@image1D(T)`,
    /// `@image2D(T)`, `@image3D(T)`, `@imageCube(T)`, `@image2DArray(T)`,
    /// `@sampled_image(T)`. Returns `None` for any other builtin name so
    /// the caller falls back to ordinary value-builtin analysis.
    fn analyze_builtin_type_ctor(
        &mut self,
        name: &str,
        args: &[Expr],
        scope: Handle<Scope>,
        span: Span,
    ) -> Option<Handle<Type>> {
        let dim = match name {
            "image1D" => ImageDim::D1,
            "image2D" | "image2DArray" => ImageDim::D2,
            "image3D" => ImageDim::D3,
            "imageCube" => ImageDim::Cube,
            "sampler" => {
                if !args.is_empty() {
                    self.error(AnalysisError::ArityMismatch(name.to_string(), span, 0, args.len()));
                }
                return Some(self.interner.sampler());
            }
            "sampled_image" => {
                if args.len() != 1 {
                    self.error(AnalysisError::ArityMismatch(name.to_string(), span, 1, args.len()));
                    return Some(self.interner.void);
                }
                let image = self.analyze_type_expr(&args[0], scope);
                return Some(self.interner.sampled_image(image));
            }
            _ => return None,
        };
        if args.len() != 1 {
            self.error(AnalysisError::ArityMismatch(name.to_string(), span, 1, args.len()));
            return Some(self.interner.void);
        }
        let sampled_type = self.analyze_type_expr(&args[0], scope);
        let arrayed = name == "image2DArray";
        Some(self.interner.image(sampled_type, dim, false, arrayed, false, true))
    }

    // ---- value expressions ------------------------------------------------

    fn analyze_expr(
        &mut self,
        expr: &Expr,
        scope: Handle<Scope>,
        expected: Option<Handle<Type>>,
        must_be_assignable: bool,
    ) {
        let ty = self.analyze_expr_inner(expr, scope, expected, must_be_assignable);
        expr.ty.set(Some(ty));
        if let Some(exp) = expected {
            if !self.is_assignable_to(ty, exp) {
                self.error(AnalysisError::TypeMismatch {
                    expected: self.interner.get(exp).pretty_string().to_string(),
                    found: self.interner.get(ty).pretty_string().to_string(),
                    span: expr.span,
                });
            }
        }
    }

    fn is_assignable_to(&self, found: Handle<Type>, expected: Handle<Type>) -> bool {
        if found == expected {
            return true;
        }
        match (self.interner.kind(found), self.interner.kind(expected)) {
            (TypeKind::UntypedInt, TypeKind::Int { .. } | TypeKind::Float { .. }) => true,
            (TypeKind::UntypedFloat, TypeKind::Float { .. }) => true,
            _ => false,
        }
    }

    fn analyze_expr_inner(
        &mut self,
        expr: &Expr,
        scope: Handle<Scope>,
        expected: Option<Handle<Type>>,
        must_be_assignable: bool,
    ) -> Handle<Type> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => {
                expr.const_value.set(Some(*v));
                match expected.map(|t| self.interner.kind(t).clone()) {
                    Some(TypeKind::Int { .. }) | Some(TypeKind::Float { .. }) => expected.unwrap(),
                    _ => self.interner.untyped_int,
                }
            }
            ExprKind::FloatLiteral(_) => match expected.map(|t| self.interner.kind(t).clone()) {
                Some(TypeKind::Float { .. }) => expected.unwrap(),
                _ => self.interner.untyped_float,
            },
            ExprKind::BoolLiteral(_) => self.interner.bool_,
            ExprKind::StringLiteral(_) => self.interner.string,
            ExprKind::Ident(name) => self.analyze_ident(expr, name, scope, must_be_assignable),
            ExprKind::Unary { op, expr: inner } => {
                self.analyze_expr(inner, scope, None, false);
                let ty = inner.ty.get().unwrap_or(self.interner.void);
                if *op == UnaryOp::Not {
                    self.interner.bool_
                } else {
                    ty
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.analyze_binary(expr, *op, lhs, rhs, scope),
            ExprKind::Member { base, name } => self.analyze_member(expr, base, name, scope, must_be_assignable),
            ExprKind::Index { base, index } => {
                self.analyze_expr(base, scope, None, must_be_assignable);
                self.analyze_expr(index, scope, Some(self.interner.untyped_int), false);
                match self.interner.kind(base.ty.get().unwrap_or(self.interner.void)).clone() {
                    TypeKind::Array { elem, .. } | TypeKind::RuntimeArray { elem, .. } => elem,
                    TypeKind::Vector { elem, .. } => elem,
                    _ => {
                        self.error(AnalysisError::UnknownField("[index]".into(), expr.span));
                        self.interner.void
                    }
                }
            }
            ExprKind::Call { callee, args } => self.analyze_call(expr, callee, args, scope),
            ExprKind::BuiltinCall { name, args } => self.analyze_builtin_call(expr, name, args, scope),
            ExprKind::ArrayType { .. } | ExprKind::StructType { .. } => {
                self.analyze_type_expr(expr, scope);
                self.interner.meta_type
            }
            ExprKind::StructLiteral { ty, fields } => {
                let struct_ty = self.analyze_type_expr(ty, scope);
                for (name, value) in fields {
                    let field_ty = self
                        .interner
                        .struct_field_index(struct_ty, name)
                        .and_then(|idx| match self.interner.kind(struct_ty) {
                            TypeKind::Struct { fields, .. } => Some(fields[idx].ty),
                            _ => None,
                        });
                    match field_ty {
                        Some(field_ty) => self.analyze_expr(value, scope, Some(field_ty), false),
                        None => {
                            self.error(AnalysisError::UnknownField(name.clone(), expr.span));
                            self.analyze_expr(value, scope, None, false);
                        }
                    }
                }
                struct_ty
            }
        }
    }

    fn analyze_ident(
        &mut self,
        expr: &Expr,
        name: &str,
        scope: Handle<Scope>,
        must_be_assignable: bool,
    ) -> Handle<Type> {
        if let Some(builtin) = resolve_builtin_type_name(self.interner, name) {
            expr.as_type.set(Some(builtin));
            return self.interner.meta_type;
        }
        match self.scopes.lookup(scope, name) {
            Some(sym) => match sym.kind {
                SymbolKind::Var { ty, assignable, .. } => {
                    if must_be_assignable && !assignable {
                        self.error(AnalysisError::NotAssignable(expr.span));
                    }
                    ty
                }
                SymbolKind::Function { ty } => ty,
                SymbolKind::TypeName { ty } => {
                    expr.as_type.set(Some(ty));
                    self.interner.meta_type
                }
            },
            None => {
                self.error(AnalysisError::NameNotFound(name.to_string(), expr.span));
                self.interner.void
            }
        }
    }

    fn analyze_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        scope: Handle<Scope>,
    ) -> Handle<Type> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                self.analyze_expr(lhs, scope, Some(self.interner.bool_), false);
                self.analyze_expr(rhs, scope, Some(self.interner.bool_), false);
                return self.interner.bool_;
            }
            _ => {}
        }
        self.analyze_expr(lhs, scope, None, false);
        self.analyze_expr(rhs, scope, None, false);
        let lty = lhs.ty.get().unwrap_or(self.interner.void);
        let rty = rhs.ty.get().unwrap_or(self.interner.void);
        let result_ty = if self.is_assignable_to(rty, lty) {
            lty
        } else if self.is_assignable_to(lty, rty) {
            rty
        } else {
            self.error(AnalysisError::TypeMismatch {
                expected: self.interner.get(lty).pretty_string().to_string(),
                found: self.interner.get(rty).pretty_string().to_string(),
                span: expr.span,
            });
            lty
        };
        if let (Some(a), Some(b)) = (lhs.const_value.get(), rhs.const_value.get()) {
            if let Some(folded) = fold_int_binary(op, a, b) {
                expr.const_value.set(Some(folded));
            }
        }
        match op {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => self.interner.bool_,
            _ => result_ty,
        }
    }

    fn analyze_member(
        &mut self,
        expr: &Expr,
        base: &Expr,
        name: &str,
        scope: Handle<Scope>,
        must_be_assignable: bool,
    ) -> Handle<Type> {
        self.analyze_expr(base, scope, None, must_be_assignable);
        let base_ty = base.ty.get().unwrap_or(self.interner.void);
        match self.interner.kind(base_ty).clone() {
            TypeKind::Vector { elem, len } => {
                if name == "len" {
                    return self.interner.untyped_int;
                }
                match swizzle_indices(name, len) {
                    Some(indices) if indices.len() == 1 => elem,
                    Some(indices) => self.interner.vector(elem, indices.len() as u32),
                    None => {
                        self.error(AnalysisError::UnknownField(name.to_string(), expr.span));
                        self.interner.void
                    }
                }
            }
            TypeKind::Struct { fields, .. } => {
                match fields.iter().find(|f| f.name == name) {
                    Some(f) => f.ty,
                    None => {
                        self.error(AnalysisError::UnknownField(name.to_string(), expr.span));
                        self.interner.void
                    }
                }
            }
            TypeKind::RuntimeArray { .. } if name == "len" => self.interner.untyped_int,
            _ => {
                self.error(AnalysisError::UnknownField(name.to_string(), expr.span));
                self.interner.void
            }
        }
    }

    fn analyze_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr], scope: Handle<Scope>) -> Handle<Type> {
        self.analyze_expr(callee, scope, None, false);
        let callee_ty = callee.ty.get().unwrap_or(self.interner.void);
        if callee_ty == self.interner.meta_type {
            // Type conversion / constructor call.
            let target = callee.as_type.get().unwrap_or(self.interner.void);
            for a in args {
                self.analyze_expr(a, scope, None, false);
            }
            return target;
        }
        match self.interner.kind(callee_ty).clone() {
            TypeKind::Function { ret, params } => {
                if params.len() != args.len() {
                    self.error(AnalysisError::ArityMismatch(
                        "function call".into(),
                        expr.span,
                        params.len(),
                        args.len(),
                    ));
                }
                for (a, p) in args.iter().zip(params.iter()) {
                    self.analyze_expr(a, scope, Some(*p), false);
                }
                ret
            }
            _ => {
                self.error(AnalysisError::NotCallable(expr.span));
                self.interner.void
            }
        }
    }

    fn analyze_builtin_call(
        &mut self,
        expr: &Expr,
        name: &str,
        args: &[Expr],
        scope: Handle<Scope>,
    ) -> Handle<Type> {
        for a in args {
            self.analyze_expr(a, scope, None, false);
        }
        match BUILTIN_FUNCTIONS.iter().find(|b| b.name == name) {
            Some(entry) => {
                if entry.arity != args.len() {
                    self.error(AnalysisError::ArityMismatch(
                        name.to_string(),
                        expr.span,
                        entry.arity,
                        args.len(),
                    ));
                }
                match entry.result {
                    BuiltinResult::SameAsFirstArg => {
                        args.first().and_then(|a| a.ty.get()).unwrap_or(self.interner.void)
                    }
                    BuiltinResult::Bool => self.interner.bool_,
                    BuiltinResult::Scalar => self.interner.scalar_type(
                        args.first().and_then(|a| a.ty.get()).unwrap_or(self.interner.void),
                    ),
                }
            }
            None => {
                self.error(AnalysisError::UnknownBuiltin(name.to_string(), expr.span));
                self.interner.void
            }
        }
    }
}

fn attr_u32_arg(attrs: &[Attribute], name: &str) -> Option<u32> {
    let attr = attrs.iter().find(|a| a.name == name)?;
    match attr.args.first()?.kind {
        ExprKind::IntLiteral(n) => Some(n as u32),
        _ => None,
    }
}

fn attr_str_arg(attrs: &[Attribute], name: &str) -> Option<String> {
    let attr = attrs.iter().find(|a| a.name == name)?;
    match attr.args.first()?.kind {
        ExprKind::Ident(ref s) | ExprKind::StringLiteral(ref s) => Some(s.clone()),
        _ => None,
    }
}

/// Components built from `x,y,z,w` or `r,g,b,a`, 1-4 letters, each in
/// range for `len`. Returns component indices, or `None` if any letter
/// is out of range or from a mixed/unknown alphabet.
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

fn fold_int_binary(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b != 0 => a.wrapping_div(b),
        BinaryOp::Mod if b != 0 => a.wrapping_rem(b),
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        _ => return None,
    })
}

struct BuiltinEntry {
    name: &'static str,
    arity: usize,
    result: BuiltinResult,
}

enum BuiltinResult {
    SameAsFirstArg,
    Bool,
    Scalar,
}

const BUILTIN_FUNCTIONS: &[BuiltinEntry] = &[
    BuiltinEntry { name: "sin", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "cos", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "tan", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "sqrt", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "abs", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "floor", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "ceil", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "min", arity: 2, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "max", arity: 2, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "clamp", arity: 3, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "mix", arity: 3, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "pow", arity: 2, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "length", arity: 1, result: BuiltinResult::Scalar },
    BuiltinEntry { name: "normalize", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "dot", arity: 2, result: BuiltinResult::Scalar },
    BuiltinEntry { name: "cross", arity: 2, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "reflect", arity: 2, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "all", arity: 1, result: BuiltinResult::Bool },
    BuiltinEntry { name: "any", arity: 1, result: BuiltinResult::Bool },
    BuiltinEntry { name: "radians", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "degrees", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "asin", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "acos", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "atan", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "sinh", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "cosh", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "tanh", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "asinh", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "acosh", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "atanh", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "exp", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "log", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "exp2", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "log2", arity: 1, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "distance", arity: 2, result: BuiltinResult::Scalar },
    BuiltinEntry { name: "refract", arity: 3, result: BuiltinResult::SameAsFirstArg },
    BuiltinEntry { name: "determinant", arity: 1, result: BuiltinResult::Scalar },
    BuiltinEntry { name: "inverse", arity: 1, result: BuiltinResult::SameAsFirstArg },
];

fn resolve_builtin_type_name(interner: &mut Interner, name: &str) -> Option<Handle<Type>> {
    let (base, suffix) = split_type_name(name)?;
    let scalar = resolve_scalar_base(interner, base)?;
    match suffix {
        None => Some(scalar),
        Some((rows, Some(cols))) => {
            let col_ty = interner.vector(scalar, rows);
            Some(interner.matrix(col_ty, cols))
        }
        Some((len, None)) => Some(interner.vector(scalar, len)),
    }
}

fn resolve_scalar_base(interner: &mut Interner, base: &str) -> Option<Handle<Type>> {
    Some(match base {
        "void" => interner.void,
        "bool" => interner.bool_,
        "int" => interner.int(32, true),
        "uint" => interner.int(32, false),
        "short" => interner.int(16, true),
        "ushort" => interner.int(16, false),
        "long" => interner.int(64, true),
        "ulong" => interner.int(64, false),
        "byte" => interner.int(8, true),
        "ubyte" => interner.int(8, false),
        "half" => interner.float(16),
        "float" => interner.float(32),
        "double" => interner.float(64),
        _ => return None,
    })
}

/// Splits e.g. `float4x4` into (`float`, Some((4, Some(4)))), `float3`
/// into (`float`, Some((3, None))), and `float` into (`float`, None).
fn split_type_name(name: &str) -> Option<(&str, Option<(u32, Option<u32>)>)> {
    const BASES: &[&str] = &[
        "ulong", "ushort", "ubyte", "double", "float", "short", "long", "byte", "half", "bool",
        "uint", "int", "void",
    ];
    for base in BASES {
        if let Some(rest) = name.strip_prefix(base) {
            if rest.is_empty() {
                return Some((base, None));
            }
            let mut chars = rest.chars();
            let rows = chars.next()?.to_digit(10)?;
            if !(2..=4).contains(&rows) {
                continue;
            }
            match chars.next() {
                None => return Some((base, Some((rows, None)))),
                Some('x') => {
                    let cols = chars.next()?.to_digit(10)?;
                    if chars.next().is_some() || !(2..=4).contains(&cols) {
                        continue;
                    }
                    return Some((base, Some((rows, Some(cols)))));
                }
                _ => continue,
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::Parser;

    fn analyze(src: &str) -> (Vec<AnalyzedDecl>, Vec<AnalysisError>, Interner) {
        let mut parser = Parser::new(src).unwrap();
        let file = parser.parse_file().unwrap();
        let mut interner = Interner::new();
        let decls;
        let diags;
        {
            let mut analyzer = Analyzer::new(&mut interner);
            decls = analyzer.analyze_file(&file);
            diags = analyzer.diagnostics;
        }
        (decls, diags, interner)
    }

    #[test]
    fn resolves_vector_type_keyword() {
        let (decls, diags, interner) = analyze("let x : float4;");
        assert!(diags.is_empty());
        let AnalyzedDecl::Var(v) = &decls[0] else { panic!() };
        assert!(matches!(
            interner.kind(v.ty),
            TypeKind::Vector { len: 4, .. }
        ));
    }

    #[test]
    fn flags_duplicate_top_level_names() {
        let (_, diags, _) = analyze("let x : int; let x : int;");
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0], AnalysisError::Duplicate(..)));
    }

    #[test]
    fn parameter_is_never_assignable() {
        let (_, diags, _) = analyze("fn f(a: int) int { a = 1; return a; }");
        assert!(diags.iter().any(|d| matches!(d, AnalysisError::NotAssignable(_))));
    }

    #[test]
    fn constant_folds_wrapping_arithmetic() {
        let mut parser = Parser::new("let x : int = 2 + 3 * 4;").unwrap();
        let file = parser.parse_file().unwrap();
        let mut interner = Interner::new();
        let mut analyzer = Analyzer::new(&mut interner);
        analyzer.analyze_file(&file);
        let DeclKind::Var(v) = &file.decls[0].kind else { panic!() };
        assert_eq!(v.value_expr.as_ref().unwrap().const_value.get(), Some(14));
    }
}
