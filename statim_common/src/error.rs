//! The crate-wide fatal error type.
//!
//! [`CompileError`] covers the cases of spec §7 that are *not* accumulated
//! diagnostics: target/layout errors (programmer misuse of the type
//! context API) and structural IR errors (compiler bugs, per §4.9). The
//! latter are exposed as variants mostly so the IR verifier can format a
//! message before panicking; ordinary pipeline code should never see them
//! returned from a `Result`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("field appended to struct '{name}' after its layout was queried")]
    InvalidatedLayout { name: String },

    #[error("unsupported type for target layout: {description}")]
    UnsupportedType { description: String },

    #[error("duplicate local '{name}' in function '{function}'")]
    DuplicateLocal { name: String, function: String },

    #[error("multiple terminators in block {block}")]
    MultipleTerminators { block: String },

    #[error("use of undefined value {value} by {user}")]
    DanglingUse { value: String, user: String },

    #[error("phi in block {block} references predecessor {pred} which does not precede it")]
    PhiPredecessorMismatch { block: String, pred: String },

    #[error("result id {id} reused within function '{function}'")]
    ResultIdReuse { id: u32, function: String },
}

pub type CompileResult<T> = Result<T, CompileError>;
