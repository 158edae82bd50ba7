//! Reference actionhost plugin.
//!
//! Built as a `cdylib` exporting every contract operation (see [`exports`]),
//! and as an `rlib` so the engine can be exercised directly.
//!
//! # Behaviour
//!
//! - A single plugin instance per process; further `create` calls share it.
//! - On start, a background thread adds ten actions (`action0`..`action9`)
//!   and removes the first five, notifying the host of each mutation.
//! - Executing an action with an `int32` payload prints `positive value N`
//!   or `zero 0`; negative values fail with an execution error.
//! - CLI configuration takes a few seconds on a worker thread and always
//!   succeeds; only one session may run at a time. GUI configuration is not
//!   implemented.

pub mod config;
pub mod engine;
pub mod exports;
pub mod metadata;

pub use engine::{EngineOptions, PluginFactory, PluginInstance};
