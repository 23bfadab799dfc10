//! Accumulating diagnostics for resolution and type-check errors.
//!
//! Structural IR violations are *not* represented here: per §4.9 they are
//! program bugs and abort immediately (see [`crate::error::CompileError`]
//! and its `Structural` variants, which are meant to be `panic!`ked on, not
//! collected).

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// The closed error taxonomy of spec §7, minus structural IR errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Resolution errors
    UnresolvedName,
    NotAFunction,
    NotAVariable,
    AmbiguousReference,
    // Type errors
    TypeMismatch,
    NonLValueAssignment,
    DerefNonPointer,
    AddressOfRValue,
    ReturnTypeMismatch,
    ReturnOutsideFunction,
    LoopControlOutsideLoop,
    UninferrableType,
    // Target/layout errors
    InvalidatedLayout,
    UnsupportedType,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single fatal diagnostic at a source span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Self { severity, code: None, message: message.into(), span, help: None }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, message, span)
    }

    pub fn info(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Info, message, span)
    }

    pub fn hint(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Hint, message, span)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.severity, self.message, self.span)?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }
        Ok(())
    }
}

/// A scoped collection of diagnostics for one translation unit.
///
/// Per §7, resolution and type errors accumulate here; the pipeline keeps
/// running the *current* pass to report as many as possible, then stops
/// before handing off to the next pass if [`Diagnostics::has_errors`].
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.messages.push(diagnostic);
    }

    pub fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::error(message, span).with_code(code));
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::warning(message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.messages.extend(other.messages);
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.messages
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    fn span() -> Span {
        Span::single(0, Position::start())
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut diags = Diagnostics::new();
        diags.warning("careful", span());
        assert!(!diags.has_errors());
        diags.error(ErrorCode::UnresolvedName, "what is this", span());
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
    }
}
