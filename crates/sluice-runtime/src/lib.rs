//! Sluice Runtime
//!
//! Turns compiled [`StageDef`](sluice_pipeline::StageDef)s into a running
//! [`Pipeline`]:
//!
//! - one bounded channel in front of every stage that has sources
//! - a pool of workers per stage sharing that channel
//! - a tick task for stages with a schedule
//!
//! Stages start outputs first so nothing is emitted into a stage that is not
//! ready, and stop inputs first: each stage's inbox drains and closes before
//! the stage itself is stopped and dropped, which closes the inboxes
//! downstream of it in turn.

mod config;
mod error;
mod pipeline;
mod schedule;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use pipeline::{Pipeline, validate};
pub use schedule::Schedule;
