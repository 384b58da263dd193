//! Sluice Pipeline
//!
//! This crate compiles a parsed configuration into a flat list of
//! [`StageDef`]s wired together through numbered [`Port`]s.
//!
//! Key rules:
//! - inputs have no sources and emit on port 0
//! - each filter reads from the ports the previous filter (or the inputs)
//!   left open
//! - a conditional block gets one port per branch, plus a synthesized `true`
//!   branch when none was written, so packets matching no branch still flow on
//! - outputs are terminal
//!
//! `use` and `route` stages import other configuration files through a
//! [`ContentProvider`].
//!
//! The compiler lists stages newest first (outputs before filters before
//! inputs). Use [`sort`] to get a dependency order before instantiating them.

mod compiler;
mod error;
mod sort;
mod source;
mod stage;

pub use compiler::{Compiler, compile};
pub use error::CompileError;
pub use sort::{SortOrder, sort};
pub use source::{Content, ContentProvider, FsContentProvider, substitute_vars};
pub use stage::{DEFAULT_BUFFER, DEFAULT_FILTER_POOL_SIZE, DEFAULT_POOL_SIZE, Port, StageDef};
pub use sluice_config::StageKind;
