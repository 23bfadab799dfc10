//! The `syma` (symbol/name resolution) pass of spec §4.6.
//!
//! Walks declarations top-down, building the [`ScopeTree`] as it goes.
//! For every reference/call expression it looks up the identifier in the
//! enclosing scope chain, annotates the reference with the declaration it
//! names, and propagates that declaration's type onto the expression
//! per the type-propagation rules table in §4.6. Declaration-shaped nodes
//! (`Parameter`, `VariableDecl`, `FunctionDecl`, `StructDecl`) have no
//! `ty` field of their own, so their resolved types live in a side
//! [`TypeTable`] keyed by `NodeId`, same as `statim_ast`'s own
//! "decorate without rewriting the tree" approach to scopes.

use crate::scope::{Binding, ScopeTree};
use hashbrown::HashMap;
use statim_ast::*;
use statim_common::{Diagnostics, ErrorCode};
use statim_ir::{ScopeHandle, TypeContext, TypeId};

/// One resolved expression's worth of annotation: its type and whether it
/// denotes a storage location. Declaration-shaped nodes only ever carry
/// the `ty` half.
#[derive(Debug, Clone, Copy)]
struct Annotation {
    ty: TypeId,
    value_kind: Option<ValueKind>,
}

/// Per-node resolution results, keyed by `NodeId`. Spec §6.1 describes
/// `Expr.ty`/`Expr.value_kind` as fields `sema` "fills in"; we keep the
/// AST itself immutable (consistent with the "scope tree lives outside
/// the AST" choice in Design Notes §9) and store every node's resolved
/// type/value-kind here instead, for both expressions and the
/// declaration-shaped nodes (`Parameter`, `VariableDecl`, `FunctionDecl`,
/// `StructDecl`) that have no `ty` field of their own to begin with.
#[derive(Debug, Default)]
pub struct TypeTable {
    by_node: HashMap<NodeId, Annotation>,
}

impl TypeTable {
    pub fn get(&self, id: NodeId) -> Option<TypeId> {
        self.by_node.get(&id).map(|a| a.ty)
    }

    pub fn value_kind(&self, id: NodeId) -> Option<ValueKind> {
        self.by_node.get(&id).and_then(|a| a.value_kind)
    }

    pub fn insert(&mut self, id: NodeId, ty: TypeId) {
        let entry = self.by_node.entry(id).or_insert(Annotation { ty, value_kind: None });
        entry.ty = ty;
    }

    pub fn insert_with_kind(&mut self, id: NodeId, ty: TypeId, value_kind: Option<ValueKind>) {
        self.by_node.insert(id, Annotation { ty, value_kind });
    }
}

pub struct Resolution {
    pub scopes: ScopeTree,
    pub types: TypeTable,
    pub diagnostics: Diagnostics,
}

/// Runs `syma` over a whole program, returning the scope tree, the
/// declaration type table, and any accumulated diagnostics. `type_ctx` is
/// mutated in place: every struct/function/array/pointer type named by
/// the program is uniqued into it as it is encountered, per §3.6's rule
/// that only the owning context may allocate types.
pub fn resolve_program(program: &Program, type_ctx: &mut TypeContext) -> Resolution {
    log::debug!("syma: resolving {} top-level declarations", program.decls.len());
    let mut r = Resolver {
        type_ctx,
        scopes: ScopeTree::new(),
        types: TypeTable::default(),
        diagnostics: Diagnostics::new(),
    };
    let global = r.scopes.push_scope(None);

    // Pass 1: register every top-level name so forward references (a
    // function calling one declared later, a struct referencing another
    // declared later) resolve regardless of declaration order.
    for decl in &program.decls {
        r.predeclare(global, decl);
    }

    // Pass 2: resolve bodies/initializers now that every name is visible.
    for decl in &program.decls {
        r.resolve_decl(global, decl);
    }

    log::debug!("syma: finished with {} diagnostics", r.diagnostics.as_slice().len());
    Resolution { scopes: r.scopes, types: r.types, diagnostics: r.diagnostics }
}

struct Resolver<'a> {
    type_ctx: &'a mut TypeContext,
    scopes: ScopeTree,
    types: TypeTable,
    diagnostics: Diagnostics,
}

impl<'a> Resolver<'a> {
    fn predeclare(&mut self, scope: statim_ast::ScopeId, decl: &Decl) {
        match &decl.kind {
            DeclKind::Function(f) => {
                self.scopes.bind(scope, f.name.clone(), Binding::Function(decl.id));
            }
            DeclKind::Variable(v) => {
                self.scopes.bind(scope, v.name.clone(), Binding::Variable(decl.id));
            }
            DeclKind::Struct(s) => {
                let ty = self.type_ctx.get_struct(&s.name);
                self.types.insert(decl.id, ty);
            }
            DeclKind::Enum(_) | DeclKind::Use(_) => {}
        }
    }

    fn resolve_decl(&mut self, scope: statim_ast::ScopeId, decl: &Decl) {
        match &decl.kind {
            DeclKind::Function(f) => self.resolve_function(scope, decl.id, f),
            DeclKind::Variable(v) => self.resolve_top_level_variable(scope, decl.id, v),
            DeclKind::Struct(s) => self.resolve_struct(decl.id, s),
            DeclKind::Enum(_) | DeclKind::Use(_) => {}
        }
    }

    fn resolve_struct(&mut self, decl_id: NodeId, s: &StructDecl) {
        let struct_ty = self.types.get(decl_id).expect("structs are predeclared");
        if s.runes.iter().any(|r| r.name == "packed") {
            self.type_ctx.set_packed(struct_ty, true);
        }
        if s.opaque {
            return;
        }
        for field in &s.fields {
            let field_ty = self.resolve_type_expr(&field.ty, ScopeHandle(0));
            // Field re-declaration across repeated analyses of the same
            // AST is a caller bug (sema runs once per translation unit);
            // ignore the `InvalidatedLayout`/duplicate-name failure modes
            // here since `statim_ir` itself enforces them on real misuse.
            let _ = self.type_ctx.append_field(struct_ty, &field.name, field_ty);
        }
    }

    fn resolve_function(&mut self, parent: statim_ast::ScopeId, decl_id: NodeId, f: &FunctionDecl) {
        let fn_scope = self.scopes.push_scope(Some(parent));

        let param_tys: Vec<TypeId> = f
            .params
            .iter()
            .map(|p| {
                let ty = self.resolve_type_expr(&p.ty, ScopeHandle(fn_scope_handle(fn_scope)));
                self.types.insert(p.id, ty);
                self.scopes.bind(fn_scope, p.name.clone(), Binding::Parameter(p.id));
                ty
            })
            .collect();

        let return_ty = match &f.return_type {
            Some(t) => self.resolve_type_expr(t, ScopeHandle(fn_scope_handle(fn_scope))),
            None => self.type_ctx.void(),
        };
        let fn_ty = self.type_ctx.get_function(return_ty, &param_tys);
        self.types.insert(decl_id, fn_ty);

        if let Some(body) = &f.body {
            self.resolve_block(fn_scope, body);
        }
    }

    fn resolve_top_level_variable(&mut self, scope: statim_ast::ScopeId, decl_id: NodeId, v: &VariableDecl) {
        self.resolve_variable(scope, decl_id, v);
    }

    fn resolve_variable(&mut self, scope: statim_ast::ScopeId, decl_id: NodeId, v: &VariableDecl) {
        let init_ty = v.init.as_ref().and_then(|init| self.resolve_expr(scope, init).0);
        let ty = match &v.ty {
            Some(t) => self.resolve_type_expr(t, ScopeHandle(fn_scope_handle(scope))),
            None => match init_ty {
                Some(t) => t,
                None => {
                    self.diagnostics.error(
                        ErrorCode::UninferrableType,
                        format!("cannot infer a type for '{}' without an initializer", v.name),
                        decl_span(v),
                    );
                    self.type_ctx.void()
                }
            },
        };
        self.types.insert(decl_id, ty);
        // Binds the name into `scope` itself: for a top-level variable this
        // re-binds what `predeclare` already bound (a no-op overwrite with
        // the same `decl_id`); for a local declared inside a function body
        // this is the *only* place it is ever bound, since `predeclare` only
        // walks `Program::decls`. Without this, `x` in `var x = 1; return
        // x;` would never resolve past its own declaration.
        self.scopes.bind(scope, v.name.clone(), Binding::Variable(decl_id));
    }

    fn resolve_block(&mut self, parent: statim_ast::ScopeId, block: &Block) {
        let block_scope = self.scopes.push_scope(Some(parent));
        for stmt in &block.stmts {
            self.resolve_stmt(block_scope, stmt);
        }
    }

    fn resolve_stmt(&mut self, scope: statim_ast::ScopeId, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.resolve_block(scope, block),
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Decl(decl) => {
                if let DeclKind::Variable(v) = &decl.kind {
                    self.resolve_variable(scope, decl.id, v);
                }
            }
            StmtKind::If(if_stmt) => {
                self.resolve_expr(scope, &if_stmt.cond);
                self.resolve_stmt(scope, &if_stmt.then_branch);
                if let Some(else_branch) = &if_stmt.else_branch {
                    self.resolve_stmt(scope, else_branch);
                }
            }
            StmtKind::While(while_stmt) => {
                self.resolve_expr(scope, &while_stmt.cond);
                self.resolve_stmt(scope, &while_stmt.body);
            }
            StmtKind::Ret(value) => {
                if let Some(value) = value {
                    self.resolve_expr(scope, value);
                }
            }
            StmtKind::Expr(expr) => self.resolve_expr(scope, expr),
        }
    }

    /// Resolves one expression and propagates its type per the table in
    /// spec §4.6. Mutation of `Expr.ty`/`value_kind` happens through a
    /// pointer-free write-back: since `Expr` is shared by shared
    /// reference here, annotation results are collected by `NodeId`
    /// through `self.types`; `statim_lower`'s `InstBuilder` re-derives
    /// the same judgement at lowering time rather than relying on in
    /// place AST mutation, which keeps the resolver free of `&mut Expr`
    /// plumbing through every recursive call.
    fn resolve_expr(&mut self, scope: statim_ast::ScopeId, expr: &Expr) -> (Option<TypeId>, Option<ValueKind>) {
        let (ty, kind) = match &expr.kind {
            ExprKind::BoolLit(_) => (Some(self.type_ctx.int1()), Some(ValueKind::RValue)),
            ExprKind::IntLit(_) => (Some(self.type_ctx.int32()), Some(ValueKind::RValue)),
            ExprKind::FloatLit(_) => (Some(self.type_ctx.float64()), Some(ValueKind::RValue)),
            ExprKind::CharLit(_) => (Some(self.type_ctx.int8()), Some(ValueKind::RValue)),
            ExprKind::StringLit(_) => {
                let ptr = self.type_ctx.get_pointer(self.type_ctx.int8());
                (Some(ptr), Some(ValueKind::RValue))
            }
            ExprKind::NullLit => {
                let ptr = self.type_ctx.get_pointer(self.type_ctx.void());
                (Some(ptr), Some(ValueKind::RValue))
            }
            ExprKind::Reference(reference) => self.resolve_reference(scope, expr, reference),
            ExprKind::Member { base, .. } => {
                self.resolve_expr(scope, base);
                // Field type resolution needs the struct's layout from
                // `statim_ir`; `sema`'s type-check pass (which has the
                // fully-built `TypeContext` in scope) fills in the exact
                // field type. `syma` only establishes that `base` is an
                // lvalue-producing expression so `sema` can chase it.
                (None, Some(ValueKind::LValue))
            }
            ExprKind::Call { callee, args } => {
                let (callee_ty, _) = self.resolve_expr(scope, callee);
                for arg in args {
                    self.resolve_expr(scope, arg);
                }
                let ret_ty = callee_ty.and_then(|t| match self.type_ctx.view(t) {
                    statim_ir::TypeView::Function(ret, _) => Some(ret),
                    _ => None,
                });
                (ret_ty, Some(ValueKind::RValue))
            }
            ExprKind::Subscript { base, index } => {
                self.resolve_expr(scope, base);
                self.resolve_expr(scope, index);
                (None, Some(ValueKind::LValue))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (lhs_ty, _) = self.resolve_expr(scope, lhs);
                self.resolve_expr(scope, rhs);
                if op.is_assignment() {
                    (lhs_ty, Some(ValueKind::RValue))
                } else {
                    (lhs_ty, Some(ValueKind::RValue))
                }
            }
            ExprKind::Unary { op, operand } => self.resolve_unary(scope, *op, operand),
            ExprKind::Cast { ty, operand } => {
                self.resolve_expr(scope, operand);
                (Some(self.resolve_type_expr(ty, ScopeHandle(fn_scope_handle(scope)))), Some(ValueKind::RValue))
            }
            ExprKind::Paren(inner) => self.resolve_expr(scope, inner),
            ExprKind::Sizeof(_) => (Some(self.type_ctx.int64()), Some(ValueKind::RValue)),
            ExprKind::Rune(_) => (None, Some(ValueKind::RValue)),
        };
        self.types.insert_with_kind(expr.id, ty.unwrap_or_else(|| self.type_ctx.void()), kind);
        (ty, kind)
    }

    fn resolve_reference(
        &mut self,
        scope: statim_ast::ScopeId,
        expr: &Expr,
        reference: &ReferenceExpr,
    ) -> (Option<TypeId>, Option<ValueKind>) {
        match self.scopes.resolve(scope, &reference.name) {
            Some(binding) => {
                let node_id = match binding {
                    Binding::Variable(id) | Binding::Parameter(id) => id,
                    Binding::Function(id) => id,
                };
                let ty = self.types.get(node_id);
                let kind = match binding {
                    Binding::Function(_) => Some(ValueKind::RValue),
                    Binding::Variable(_) | Binding::Parameter(_) => Some(ValueKind::LValue),
                };
                (ty, kind)
            }
            None => {
                self.diagnostics.error(
                    ErrorCode::UnresolvedName,
                    format!("unresolved name '{}'", reference.name),
                    expr.span,
                );
                (None, Some(ValueKind::RValue))
            }
        }
    }

    fn resolve_unary(
        &mut self,
        scope: statim_ast::ScopeId,
        op: UnaryOp,
        operand: &Expr,
    ) -> (Option<TypeId>, Option<ValueKind>) {
        let (operand_ty, operand_kind) = self.resolve_expr(scope, operand);
        match op {
            UnaryOp::Dereference => {
                let pointee = operand_ty.and_then(|t| match self.type_ctx.view(t) {
                    statim_ir::TypeView::Pointer(p) => Some(p),
                    _ => {
                        self.diagnostics.error(
                            ErrorCode::DerefNonPointer,
                            "cannot dereference a non-pointer expression",
                            operand.span,
                        );
                        None
                    }
                });
                (pointee, Some(ValueKind::LValue))
            }
            UnaryOp::AddressOf => {
                if operand_kind != Some(ValueKind::LValue) {
                    self.diagnostics.error(
                        ErrorCode::AddressOfRValue,
                        "cannot take the address of a non-lvalue expression",
                        operand.span,
                    );
                }
                let ptr = operand_ty.map(|t| self.type_ctx.get_pointer(t));
                (ptr, Some(ValueKind::RValue))
            }
            UnaryOp::LogicalNot => (Some(self.type_ctx.int1()), Some(ValueKind::RValue)),
            UnaryOp::Negate | UnaryOp::BitNot => (operand_ty, Some(ValueKind::RValue)),
        }
    }

    /// Converts a source-level type annotation to a `TypeId`, minting a
    /// `Deferred` placeholder (spec §3.1) for names the struct/function
    /// predeclare pass has not registered yet (forward references) and a
    /// plain lookup for ones it has.
    fn resolve_type_expr(&mut self, ty: &TypeExpr, scope: ScopeHandle) -> TypeId {
        match ty {
            TypeExpr::Named { name, indirection, mutable } => {
                let base = match name.as_str() {
                    "void" => self.type_ctx.void(),
                    "bool" => self.type_ctx.int1(),
                    "i8" => self.type_ctx.int8(),
                    "i16" => self.type_ctx.int16(),
                    "i32" => self.type_ctx.int32(),
                    "i64" => self.type_ctx.int64(),
                    "f32" => self.type_ctx.float32(),
                    "f64" => self.type_ctx.float64(),
                    _ => match self.type_ctx.lookup_struct_by_name(name) {
                        Some(t) => t,
                        None => self.type_ctx.get_deferred(name, *indirection, scope, *mutable),
                    },
                };
                let mut cur = base;
                for _ in 0..*indirection {
                    cur = self.type_ctx.get_pointer(cur);
                }
                cur
            }
            TypeExpr::Array { element, size } => {
                let elem = self.resolve_type_expr(element, scope);
                self.type_ctx.get_array(elem, *size)
            }
        }
    }
}

fn fn_scope_handle(scope: statim_ast::ScopeId) -> u32 {
    use cranelift_entity::EntityRef;
    scope.index() as u32
}

fn decl_span(v: &VariableDecl) -> statim_common::Span {
    // `VariableDecl` doesn't carry its own span (the wrapping `Decl`
    // does); callers that have the `Decl` in hand should prefer its span.
    // `syma`'s top-level/variable resolution path only has the inner
    // `VariableDecl` at this point, so diagnostics here fall back to a
    // synthetic span rather than threading the outer span through every
    // helper for one error case.
    let _ = v;
    statim_common::Span::synthetic()
}

#[cfg(test)]
mod tests {
    use super::*;
    use statim_common::Position;

    fn span() -> statim_common::Span {
        statim_common::Span::single(0, Position::start())
    }

    fn int_lit(id: NodeId, value: i64) -> Expr {
        Expr { id, kind: ExprKind::IntLit(value), span: span(), ty: None, value_kind: None }
    }

    #[test]
    fn identity_function_resolves_its_parameter_reference() {
        let program = Program {
            decls: vec![Decl {
                id: 0,
                span: span(),
                scope: None,
                kind: DeclKind::Function(FunctionDecl {
                    name: "id".to_string(),
                    params: vec![Parameter {
                        id: 1,
                        name: "x".to_string(),
                        ty: TypeExpr::Named { name: "i32".to_string(), indirection: 0, mutable: false },
                        span: span(),
                    }],
                    return_type: Some(TypeExpr::Named { name: "i32".to_string(), indirection: 0, mutable: false }),
                    external: false,
                    runes: vec![],
                    body: Some(Block {
                        id: 2,
                        span: span(),
                        scope: None,
                        stmts: vec![Stmt {
                            id: 3,
                            span: span(),
                            kind: StmtKind::Ret(Some(Expr {
                                id: 4,
                                kind: ExprKind::Reference(ReferenceExpr { name: "x".to_string(), decl: None }),
                                span: span(),
                                ty: None,
                                value_kind: None,
                            })),
                        }],
                    }),
                }),
            }],
        };

        let mut types = TypeContext::new();
        let resolution = resolve_program(&program, &mut types);
        assert!(resolution.diagnostics.as_slice().is_empty());
        assert_eq!(resolution.types.get(1), Some(types.int32()));
    }

    #[test]
    fn unresolved_reference_produces_a_diagnostic() {
        let program = Program {
            decls: vec![Decl {
                id: 0,
                span: span(),
                scope: None,
                kind: DeclKind::Variable(VariableDecl {
                    name: "y".to_string(),
                    ty: None,
                    mutable: false,
                    init: Some(Expr {
                        id: 1,
                        kind: ExprKind::Reference(ReferenceExpr { name: "missing".to_string(), decl: None }),
                        span: span(),
                        ty: None,
                        value_kind: None,
                    }),
                }),
            }],
        };
        let mut types = TypeContext::new();
        let resolution = resolve_program(&program, &mut types);
        assert!(resolution.diagnostics.as_slice().iter().any(|d| d.code == Some(ErrorCode::UnresolvedName)));
    }

    #[test]
    fn variable_type_is_inferred_from_its_initializer() {
        let program = Program {
            decls: vec![Decl {
                id: 0,
                span: span(),
                scope: None,
                kind: DeclKind::Variable(VariableDecl {
                    name: "n".to_string(),
                    ty: None,
                    mutable: false,
                    init: Some(int_lit(1, 7)),
                }),
            }],
        };
        let mut types = TypeContext::new();
        let resolution = resolve_program(&program, &mut types);
        assert!(resolution.diagnostics.as_slice().is_empty());
        assert_eq!(resolution.types.get(0), Some(types.int32()));
    }

    #[test]
    fn local_variable_resolves_in_statements_after_its_declaration() {
        let program = Program {
            decls: vec![Decl {
                id: 0,
                span: span(),
                scope: None,
                kind: DeclKind::Function(FunctionDecl {
                    name: "f".to_string(),
                    params: vec![],
                    return_type: Some(TypeExpr::Named { name: "i32".to_string(), indirection: 0, mutable: false }),
                    external: false,
                    runes: vec![],
                    body: Some(Block {
                        id: 1,
                        span: span(),
                        scope: None,
                        stmts: vec![
                            Stmt {
                                id: 2,
                                span: span(),
                                kind: StmtKind::Decl(Box::new(Decl {
                                    id: 3,
                                    span: span(),
                                    scope: None,
                                    kind: DeclKind::Variable(VariableDecl {
                                        name: "x".to_string(),
                                        ty: None,
                                        mutable: false,
                                        init: Some(int_lit(4, 1)),
                                    }),
                                })),
                            },
                            Stmt {
                                id: 5,
                                span: span(),
                                kind: StmtKind::Ret(Some(Expr {
                                    id: 6,
                                    kind: ExprKind::Reference(ReferenceExpr { name: "x".to_string(), decl: None }),
                                    span: span(),
                                    ty: None,
                                    value_kind: None,
                                })),
                            },
                        ],
                    }),
                }),
            }],
        };

        let mut types = TypeContext::new();
        let resolution = resolve_program(&program, &mut types);
        assert!(resolution.diagnostics.as_slice().is_empty());
        assert_eq!(resolution.types.get(6), Some(types.int32()));
    }

    #[test]
    fn variable_without_type_or_initializer_is_uninferrable() {
        let program = Program {
            decls: vec![Decl {
                id: 0,
                span: span(),
                scope: None,
                kind: DeclKind::Variable(VariableDecl { name: "z".to_string(), ty: None, mutable: false, init: None }),
            }],
        };
        let mut types = TypeContext::new();
        let resolution = resolve_program(&program, &mut types);
        assert!(resolution.diagnostics.as_slice().iter().any(|d| d.code == Some(ErrorCode::UninferrableType)));
        let _ = int_lit(99, 0);
    }

    #[test]
    fn packed_rune_on_a_struct_reaches_the_type_context() {
        let program = Program {
            decls: vec![Decl {
                id: 0,
                span: span(),
                scope: None,
                kind: DeclKind::Struct(StructDecl {
                    name: "Header".to_string(),
                    opaque: false,
                    runes: vec![Rune { name: "packed".to_string(), args: vec![], span: span() }],
                    fields: vec![
                        Field {
                            id: 1,
                            name: "a".to_string(),
                            ty: TypeExpr::Named { name: "i8".to_string(), indirection: 0, mutable: false },
                            span: span(),
                        },
                        Field {
                            id: 2,
                            name: "b".to_string(),
                            ty: TypeExpr::Named { name: "i32".to_string(), indirection: 0, mutable: false },
                            span: span(),
                        },
                    ],
                }),
            }],
        };
        let mut types = TypeContext::new();
        let resolution = resolve_program(&program, &mut types);
        assert!(resolution.diagnostics.as_slice().is_empty());
        let ty = resolution.types.get(0).expect("struct predeclared");
        match types.view(ty) {
            statim_ir::TypeView::Struct { packed, fields, .. } => {
                assert!(packed, "$packed rune must set TypeContext's packed flag");
                assert_eq!(fields.len(), 2);
            }
            other => panic!("expected a struct type view, got {other:?}"),
        }
    }
}
