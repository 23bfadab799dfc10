//! AST -> SIIR lowering glue (spec §4.7): the [`InstBuilder`] cursor and
//! the per-node construction rules that drive it over a resolved,
//! type-checked [`statim_ast::Program`].

pub mod builder;
pub mod lower;

pub use builder::InstBuilder;
pub use lower::lower_program;
