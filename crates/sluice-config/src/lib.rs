//! Sluice Config
//!
//! This crate parses the declarative pipeline configuration into a generic
//! tree. A configuration holds up to three kinds of sections (`input`,
//! `filter`, `output`), each a list of plugin blocks:
//!
//! ```text
//! input  { generator { count => 3 } }
//! filter {
//!   if [level] == "error" { stdout { codec => json } }
//!   else { drop {} }
//! }
//! output { null {} }
//! ```
//!
//! Setting values are kept as `serde_json` values. Interpreting them is left
//! to the compiler and to each stage's own option decoding.
//!
//! A conditional group becomes a synthetic plugin named [`WHEN_PLUGIN`] whose
//! branches carry the raw expression text.

mod ast;
mod error;
mod lexer;
mod parser;

pub use ast::{Branch, Codec, Configuration, Plugin, Section, Setting, StageKind, WHEN_PLUGIN};
pub use error::ParseError;
pub use parser::parse;
