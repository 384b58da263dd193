//! Sluice Stage
//!
//! This crate defines what a stage is and what it gets from the runtime.
//!
//! A stage implements [`Stage`]: it is configured once from its raw
//! [`Options`], then started, ticked on its schedule, fed packets through
//! `receive`, and finally stopped. `max_concurrent` tells the runtime how many
//! `receive` calls may overlap.
//!
//! Through its [`StageContext`] a stage can:
//! - emit packets on numbered ports ([`Emitter`])
//! - log within its own tracing span
//! - keep state in a [`MemorySpace`] or a durable [`Store`]
//! - track resumable offsets with [`SinceDb`]
//! - encode and decode payloads through a [`CodecFactory`]
//!
//! Each emitter counts what it delivers in a shared [`StageMetrics`].
//!
//! Built-in and external stages are looked up by `(kind, name)` in a
//! [`StageRegistry`].

mod codec;
mod common;
mod context;
mod doc;
mod error;
mod memory;
mod metrics;
mod options;
mod registry;
mod sincedb;
mod stage;
mod store;

pub use codec::{BuiltinCodecs, CodecFactory, CodecRole, CodecSpec, Decoder, Encoder};
pub use common::{CommonOptions, add_tags, remove_tags};
pub use context::{Emitter, Outlets, StageContext};
pub use doc::{OptionDoc, StageDoc};
pub use error::{CodecError, ConfigError, RegistryError, StageError, StoreError};
pub use memory::{Memory, MemorySpace};
pub use metrics::{StageMetrics, StageStats};
pub use options::Options;
pub use registry::{RegisteredStage, StageFactory, StageRegistry};
pub use sincedb::{DEFAULT_WRITE_INTERVAL, SinceDb, is_dry_run};
pub use stage::Stage;
pub use store::{FileStore, MemoryStore, Store};

pub use sluice_config::StageKind;
pub use sluice_packet::Packet;
