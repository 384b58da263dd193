//! Sluice Expr
//!
//! This crate implements the boolean expression language used by conditional
//! blocks (`if [status] >= 500 { ... }`) and by the `route` stage.
//!
//! Expressions are parsed into a [`CompiledExpression`] that records the
//! field paths it references. Before each evaluation every referenced path is
//! looked up on the packet and bound as an [`EvalValue`]:
//!
//! - no match binds `false`
//! - one match binds the scalar
//! - several matches bind a sequence
//!
//! [`ExpressionCache`] parses each expression once per key. [`BranchRouter`]
//! implements first-match-wins branch selection and [`Condition`] the single
//! optional condition of a routing stage.

mod cache;
mod error;
mod eval;
mod lexer;
mod parser;
mod router;
mod value;

pub use cache::ExpressionCache;
pub use error::ExprError;
pub use eval::{Bindings, bind};
pub use parser::{CompiledExpression, compile};
pub use router::{BranchRouter, Condition};
pub use value::EvalValue;
