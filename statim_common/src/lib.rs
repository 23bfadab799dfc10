//! Shared utilities for the statim compiler: source spans, diagnostics and
//! the crate-wide error type.
//!
//! Nothing in here is pass-specific; `statim_ast`, `statim_ir`,
//! `statim_sema`, `statim_lower`, `statim_machine` and `statim_x64` all
//! depend on this crate and nothing else in the workspace.

pub mod diagnostics;
pub mod error;
pub mod span;

pub use diagnostics::{Diagnostic, Diagnostics, ErrorCode, Severity};
pub use error::{CompileError, CompileResult};
pub use span::{Position, Span, Spanned};
