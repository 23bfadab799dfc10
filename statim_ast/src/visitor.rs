//! A walk-the-tree visitor for the AST, in the style the teacher's parser
//! crate uses for its own `ast::Visitor` (default no-op methods, override
//! only the nodes you care about).

use crate::ast::*;

pub trait Visitor {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program);
    }

    fn visit_decl(&mut self, decl: &Decl) {
        walk_decl(self, decl);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<V: Visitor + ?Sized>(v: &mut V, program: &Program) {
    for decl in &program.decls {
        v.visit_decl(decl);
    }
}

pub fn walk_decl<V: Visitor + ?Sized>(v: &mut V, decl: &Decl) {
    match &decl.kind {
        DeclKind::Use(_) => {}
        DeclKind::Function(f) => {
            if let Some(body) = &f.body {
                v.visit_block(body);
            }
        }
        DeclKind::Variable(var) => {
            if let Some(init) = &var.init {
                v.visit_expr(init);
            }
        }
        DeclKind::Struct(_) | DeclKind::Enum(_) => {}
    }
}

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in &block.stmts {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Block(block) => v.visit_block(block),
        StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Decl(decl) => v.visit_decl(decl),
        StmtKind::If(if_stmt) => {
            v.visit_expr(&if_stmt.cond);
            v.visit_stmt(&if_stmt.then_branch);
            if let Some(else_branch) = &if_stmt.else_branch {
                v.visit_stmt(else_branch);
            }
        }
        StmtKind::While(while_stmt) => {
            v.visit_expr(&while_stmt.cond);
            v.visit_stmt(&while_stmt.body);
        }
        StmtKind::Ret(value) => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        StmtKind::Expr(expr) => v.visit_expr(expr),
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::BoolLit(_)
        | ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::CharLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::NullLit
        | ExprKind::Reference(_)
        | ExprKind::Sizeof(_)
        | ExprKind::Rune(_) => {}
        ExprKind::Member { base, .. } => v.visit_expr(base),
        ExprKind::Call { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Subscript { base, index } => {
            v.visit_expr(base);
            v.visit_expr(index);
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::Cast { operand, .. } => v.visit_expr(operand),
        ExprKind::Paren(inner) => v.visit_expr(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        exprs: usize,
    }

    impl Visitor for Counter {
        fn visit_expr(&mut self, expr: &Expr) {
            self.exprs += 1;
            walk_expr(self, expr);
        }
    }

    #[test]
    fn visitor_counts_nested_expressions() {
        let span = Span::single(0, statim_common::Position::start());
        let lhs = Expr { id: 0, kind: ExprKind::IntLit(1), span, ty: None, value_kind: None };
        let rhs = Expr { id: 1, kind: ExprKind::IntLit(2), span, ty: None, value_kind: None };
        let add = Expr {
            id: 2,
            kind: ExprKind::Binary { op: BinaryOp::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            span,
            ty: None,
            value_kind: None,
        };
        let mut counter = Counter { exprs: 0 };
        counter.visit_expr(&add);
        assert_eq!(counter.exprs, 3);
    }
}
