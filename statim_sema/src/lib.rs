//! Semantic analysis (spec §4.6): the `syma` name-resolution pass and the
//! `sema` type-check pass that `statim_lower` requires to have already run
//! over the AST before it attempts IR construction.
//!
//! The two passes are kept separate, matching the spec's own split:
//! `resolve` walks declarations top-down building the [`scope::ScopeTree`]
//! and a [`resolve::TypeTable`] of resolved expression types, then
//! `typecheck` walks the fully-scoped tree checking every statement and
//! expression against one of the three check modes and recording implicit
//! casts `statim_lower` must materialize.

pub mod resolve;
pub mod scope;
pub mod typecheck;

pub use resolve::{Resolution, TypeTable, resolve_program};
pub use scope::{Binding, ScopeTree};
pub use typecheck::{CheckMode, CheckOutcome, ImplicitCasts, TypeChecker, check, is_comparison_op};
