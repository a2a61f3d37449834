//! Common types for wearlink crates.
//!
//! - [`Preferences`]: read-only per-device settings lookup, with
//!   [`MemoryPreferences`] as an in-memory, YAML-loadable implementation and
//!   [`SharedPreferences`] for values the host changes at runtime
//! - [`keys`]: preference keys understood by requests and services
//! - [`EngineConfig`]: timeouts and limits for a device session

mod config;
mod error;
pub mod keys;
mod preferences;

pub use config::*;
pub use error::*;
pub use preferences::*;
