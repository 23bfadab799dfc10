//! The AST contract produced by the (external) statim lexer/parser.
//!
//! Out of scope per spec.md §1: tokenization and parsing themselves. This
//! crate exists only so the core (`statim_sema`, `statim_lower`) has a
//! concrete tree type to operate on.

pub mod ast;
pub mod visitor;

pub use ast::*;
pub use visitor::Visitor;
