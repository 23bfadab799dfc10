//! Library facade wiring one translation unit's AST through to x86-64
//! machine code (spec §6.5's "the core exposes a library function that
//! takes an AST + Target and returns a `MachineObject` or a typed error
//! list" — the host-side CLI/driver is out of scope here).
//!
//! Pass order mirrors §2/§5: `syma` name resolution, `sema` type
//! checking, `statim_lower`'s AST -> SIIR lowering, trivial DCE, the
//! structural verifier, then x86-64 instruction selection. Per §7, the
//! first two passes accumulate diagnostics and the pipeline stops before
//! handing off to the next one if any pass reports an error; the
//! verifier's failures are structural bugs and panic instead.

use statim_ast::Program;
use statim_common::Diagnostics;
use statim_ir::{Cfg, Target, TypeContext};
use statim_lower::lower_program;
use statim_sema::{resolve_program, TypeChecker};
use statim_x64::{InstSelection, MachineModule};

/// What a successful [`compile`] produces: the selected machine module,
/// plus the SIIR text form when `emit_ir` was requested (spec §6.2's
/// "observability contract", not a required ingestion format).
pub struct CompileOutput {
    pub module: MachineModule,
    pub ir_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub emit_ir: bool,
}

/// Runs the full pipeline over `program` for `target`, stopping at the
/// first pass that reports any error diagnostic.
pub fn compile(program: &Program, target: Target, options: CompileOptions) -> Result<CompileOutput, Diagnostics> {
    log::info!("compiling {} top-level declarations for {:?}", program.decls.len(), target);

    let mut types = TypeContext::new();
    let resolution = resolve_program(program, &mut types);
    if resolution.diagnostics.has_errors() {
        log::debug!("syma reported {} error(s); stopping before sema", resolution.diagnostics.error_count());
        return Err(resolution.diagnostics);
    }

    let mut sema_diagnostics = Diagnostics::new();
    let casts = {
        let mut checker = TypeChecker::new(&types, &resolution.types, &mut sema_diagnostics);
        checker.check_program(program);
        checker.finish()
    };
    if sema_diagnostics.has_errors() {
        log::debug!("sema reported {} error(s); stopping before lowering", sema_diagnostics.error_count());
        return Err(sema_diagnostics);
    }

    let mut cfg = Cfg::with_types(types);
    let lower_diagnostics = lower_program(program, &resolution, &casts, &mut cfg, target);
    if lower_diagnostics.has_errors() {
        log::debug!("lowering reported {} error(s); stopping before instruction selection", lower_diagnostics.error_count());
        return Err(lower_diagnostics);
    }

    let func_ids: Vec<_> = cfg.functions().map(|(id, _)| id).collect();
    let mut removed = 0;
    for id in func_ids {
        removed += statim_ir::dce::run_trivial_dce(cfg.function_mut(id));
    }
    log::debug!("trivial dce removed {removed} dead instruction(s)");

    statim_ir::verify::verify_cfg(&cfg).expect("lowering produced a structurally invalid CFG");

    let ir_text = options.emit_ir.then(|| statim_ir::printer::print_cfg(&cfg));
    let module = InstSelection::new(&cfg, target).run();

    Ok(CompileOutput { module, ir_text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use statim_ast::{Block, FunctionDecl, NodeId, ScopeId};
    use statim_common::Span;

    fn empty_void_fn(name: &str) -> statim_ast::Decl {
        let id: NodeId = 0;
        statim_ast::Decl {
            id,
            span: Span::synthetic(),
            scope: Some(ScopeId::new(0)),
            kind: statim_ast::DeclKind::Function(FunctionDecl {
                name: name.to_string(),
                params: vec![],
                return_type: None,
                body: Some(Block { id, stmts: vec![], span: Span::synthetic(), scope: Some(ScopeId::new(0)) }),
                external: false,
                runes: vec![],
            }),
        }
    }

    #[test]
    fn compiling_an_empty_void_function_succeeds() {
        let program = Program { decls: vec![empty_void_fn("main")] };
        let out = compile(&program, Target::x64_linux(), CompileOptions { emit_ir: true }).expect("compiles cleanly");
        assert_eq!(out.module.functions.len(), 1);
        assert!(out.ir_text.unwrap().contains("main"));
    }

    /// Regression test: instruction selection used to panic on a call to
    /// a void-returning function, since `Call` always carries a result id
    /// (`Opcode::has_result`'s exclusion list doesn't name it) and the
    /// old `select_call` unconditionally treated that result as scalar.
    #[test]
    fn compiling_a_void_call_statement_succeeds() {
        let helper_id: NodeId = 0;
        let helper = statim_ast::Decl {
            id: helper_id,
            span: Span::synthetic(),
            scope: Some(ScopeId::new(0)),
            kind: statim_ast::DeclKind::Function(FunctionDecl {
                name: "helper".to_string(),
                params: vec![],
                return_type: None,
                body: Some(Block { id: helper_id, stmts: vec![], span: Span::synthetic(), scope: Some(ScopeId::new(0)) }),
                external: false,
                runes: vec![],
            }),
        };

        let call_expr_id: NodeId = 1;
        let callee_expr_id: NodeId = 2;
        let call_stmt_id: NodeId = 3;
        let main_body_id: NodeId = 4;
        let main_id: NodeId = 5;
        let call_stmt = statim_ast::Stmt {
            id: call_stmt_id,
            kind: statim_ast::StmtKind::Expr(statim_ast::Expr {
                id: call_expr_id,
                kind: statim_ast::ExprKind::Call {
                    callee: Box::new(statim_ast::Expr {
                        id: callee_expr_id,
                        kind: statim_ast::ExprKind::Reference(statim_ast::ReferenceExpr { name: "helper".to_string(), decl: None }),
                        span: Span::synthetic(),
                        ty: None,
                        value_kind: None,
                    }),
                    args: vec![],
                },
                span: Span::synthetic(),
                ty: None,
                value_kind: None,
            }),
            span: Span::synthetic(),
        };
        let main = statim_ast::Decl {
            id: main_id,
            span: Span::synthetic(),
            scope: Some(ScopeId::new(0)),
            kind: statim_ast::DeclKind::Function(FunctionDecl {
                name: "main".to_string(),
                params: vec![],
                return_type: None,
                body: Some(Block { id: main_body_id, stmts: vec![call_stmt], span: Span::synthetic(), scope: Some(ScopeId::new(0)) }),
                external: false,
                runes: vec![],
            }),
        };

        let program = Program { decls: vec![helper, main] };
        let out = compile(&program, Target::x64_linux(), CompileOptions { emit_ir: false }).expect("compiles cleanly");
        assert_eq!(out.module.functions.len(), 2);
    }
}
