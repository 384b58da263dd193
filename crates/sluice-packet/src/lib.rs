//! Sluice Packet
//!
//! This crate provides the unit of data that flows through a sluice pipeline.
//! A [`Packet`] is an ordered, nested field document with two well-known
//! fields: `message` and `@timestamp`.
//!
//! Fields are addressed by paths, written either dotted (`a.b.c`) or in the
//! bracket form used by configuration files (`[a][b][c]`). The [`dynamic`]
//! function resolves `%{path}` and `%{+timeFormat}` placeholders against a
//! packet.

mod dynamic;
mod packet;
mod path;
mod timefmt;

pub use dynamic::{dynamic, dynamic_value};
pub use packet::{MESSAGE, Packet, TIMESTAMP, stringify};
pub use path::normalize_path;
pub use timefmt::{format_joda, joda_to_strftime};
