//! Hierarchical, inheritable configuration presets
//!
//! `preset-core` resolves presets stored as JSON documents into fully-merged
//! key/value trees for experiment-management tooling. Presets form a DAG: a
//! preset may declare one or more base presets whose settings it overrides
//! or extends, optionally varying per timestep so schedules can change over
//! the course of a long run.
//!
//! # Architecture
//!
//! ```text
//!   Registry ── owns ──> Preset ── owns ──> ConfigBlock
//!      │                    │                    │
//!  graph loading,      typed access,        deep merge,
//!  cycle detection     prefix views       timestep lookup
//! ```
//!
//! Inheritance is resolved once, at construction: a preset's block folds the
//! merged trees of its bases under its own tree, so runtime lookup never
//! walks the base chain.
//!
//! # Concurrency
//!
//! Resolution is synchronous, pure computation. The registry provides no
//! internal locking: concurrent mutation (`add_preset`, `remove_preset`,
//! `update_config`) requires external serialization by the caller. Typed
//! getters are safe to call concurrently as long as nobody mutates the
//! preset's cursor, prefix, or raw document at the same time; the injected
//! [`ConfigLogger`] is the one collaborator expected to see concurrent
//! callers and must serialize its own sink.
//!
//! # Example
//!
//! ```
//! use preset_core::Registry;
//! use serde_json::json;
//!
//! # fn main() -> preset_core::Result<()> {
//! let base = json!({ "uuid": "base", "config": { "batch_size": 32, "lr": 0.1 } });
//! let trial = json!({ "uuid": "trial", "base": "base", "config": { "lr": 0.01 } });
//!
//! let mut registry = Registry::new();
//! registry.load(vec![
//!     (base.as_object().unwrap().clone(), None),
//!     (trial.as_object().unwrap().clone(), None),
//! ])?;
//!
//! let trial = registry.get("trial")?;
//! assert_eq!(trial.get_int("batch_size", None)?, 32);
//! assert_eq!(trial.get_float("lr", None)?, 0.01);
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod coerce;
pub mod error;
pub mod logger;
pub mod preset;
pub mod registry;
pub mod template;

pub use block::{ConfigBlock, Layer};
pub use error::{Error, Result};
pub use logger::ConfigLogger;
pub use preset::{BaseRef, Preset, ResolvedBase};
pub use registry::{DocumentSink, Registry};
