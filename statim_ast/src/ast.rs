//! The decorated AST contract of spec §6.1.
//!
//! This is what an external lexer/parser is expected to hand the core: a
//! tree of declarations, statements and expressions, each carrying a
//! [`Span`], with expressions additionally carrying a nullable inferred
//! type and value kind that [`statim_sema`](../statim_sema/index.html)
//! fills in. Nothing in this crate resolves names or types — it only
//! defines the shape of the tree.

use cranelift_entity::entity_impl;
use serde::{Deserialize, Serialize};
use statim_common::Span;

/// Identifies a declaration, statement or expression node for the
/// lifetime of one translation unit. Used to key auxiliary per-node
/// tables (resolved decl, inferred type) without rewriting the tree.
pub type NodeId = u32;

/// An opaque reference into the scope tree built by `statim_sema`.
///
/// Per Design Notes §9, the scope tree is *not* folded into the AST: a
/// `Decl`/`Block` only carries the handle, never the scope's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);
entity_impl!(ScopeId, "scope");

/// Whether an expression denotes a storage location (`LValue`) or a
/// transient value (`RValue`). Filled in by `syma`/`sema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    LValue,
    RValue,
}

/// A source-level type annotation as written by the programmer, before
/// name resolution. Collapses to a concrete `statim_ir::types::TypeId`
/// (or a `Deferred` placeholder, per spec §3.1) during `syma`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// A named type, possibly behind `indirection` pointer levels
    /// (`**Foo` is `Named { name: "Foo", indirection: 2, .. }`).
    Named { name: String, indirection: u32, mutable: bool },
    /// `[T; n]`.
    Array { element: Box<TypeExpr>, size: u64 },
}

/// A source-level annotation such as `$inline` or `$packed` (glossary:
/// Rune). Carried as inert metadata unless named `$inline`/`$packed`
/// (see SPEC_FULL.md Open Questions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rune {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub id: NodeId,
    pub kind: DeclKind,
    pub span: Span,
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclKind {
    Use(UseDecl),
    Function(FunctionDecl),
    Variable(VariableDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseDecl {
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    pub body: Option<Block>,
    pub external: bool,
    pub runes: Vec<Rune>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub opaque: bool,
    pub runes: Vec<Rune>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    pub id: NodeId,
    pub name: String,
    pub value: Option<i64>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<EnumValue>,
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
    pub span: Span,
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Block),
    Break,
    Continue,
    Decl(Box<Decl>),
    If(IfStmt),
    While(WhileStmt),
    Ret(Option<Expr>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub cond: Box<Expr>,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub cond: Box<Expr>,
    pub body: Box<Stmt>,
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`, logical negation.
    LogicalNot,
    /// `-`, arithmetic negation.
    Negate,
    /// `~`, bitwise complement.
    BitNot,
    /// `*`, pointer dereference.
    Dereference,
    /// `&`, address-of.
    AddressOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
}

impl BinaryOp {
    /// Compound and plain assignment operators, which lower to a store
    /// (or a load/op/store pair) rather than a pure value computation.
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
                | BinaryOp::RemAssign
                | BinaryOp::AndAssign
                | BinaryOp::OrAssign
                | BinaryOp::XorAssign
                | BinaryOp::ShlAssign
                | BinaryOp::ShrAssign
        )
    }

    /// The plain binary operator underlying a compound assignment, e.g.
    /// `AddAssign` -> `Add`. `None` for a plain `Assign`.
    pub fn underlying(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::AddAssign => BinaryOp::Add,
            BinaryOp::SubAssign => BinaryOp::Sub,
            BinaryOp::MulAssign => BinaryOp::Mul,
            BinaryOp::DivAssign => BinaryOp::Div,
            BinaryOp::RemAssign => BinaryOp::Rem,
            BinaryOp::AndAssign => BinaryOp::And,
            BinaryOp::OrAssign => BinaryOp::Or,
            BinaryOp::XorAssign => BinaryOp::Xor,
            BinaryOp::ShlAssign => BinaryOp::Shl,
            BinaryOp::ShrAssign => BinaryOp::Shr,
            _ => return None,
        })
    }
}

/// What a name reference resolves to, filled in by `syma`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclRef {
    Variable(NodeId),
    Parameter(NodeId),
    Function(NodeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceExpr {
    pub name: String,
    pub decl: Option<DeclRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
    /// Filled in by `sema`; indexes the type context owned by the `Cfg`
    /// this translation unit eventually lowers into. `None` before
    /// analysis, and for AST nodes sema never visits (dead branches).
    pub ty: Option<u32>,
    pub value_kind: Option<ValueKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    BoolLit(bool),
    IntLit(i64),
    FloatLit(f64),
    CharLit(char),
    StringLit(String),
    NullLit,
    Reference(ReferenceExpr),
    Member { base: Box<Expr>, name: String },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Subscript { base: Box<Expr>, index: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Cast { ty: TypeExpr, operand: Box<Expr> },
    Paren(Box<Expr>),
    Sizeof(TypeExpr),
    Rune(Rune),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::single(0, statim_common::Position::start())
    }

    #[test]
    fn assignment_ops_round_trip_their_underlying_op() {
        assert_eq!(BinaryOp::AddAssign.underlying(), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::Assign.underlying(), None);
        assert!(BinaryOp::AddAssign.is_assignment());
        assert!(!BinaryOp::Add.is_assignment());
    }

    #[test]
    fn expr_starts_unannotated() {
        let e = Expr {
            id: 0,
            kind: ExprKind::IntLit(1),
            span: span(),
            ty: None,
            value_kind: None,
        };
        assert!(e.ty.is_none());
        assert!(e.value_kind.is_none());
    }
}
