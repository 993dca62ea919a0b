//! # Node Runtime Library
//!
//! Runtime wiring for the relay validator node. The main entry point is the
//! `main.rs` binary; the library is exposed for integration tests.
//!
//! ## Modules
//!
//! - `key` - validator key and stake loading from the environment
//! - `runtime` - node startup, background tasks and graceful shutdown

#![warn(missing_docs)]

pub mod key;
pub mod runtime;

pub use key::{load_stake_from, load_validator_key, load_validator_key_from};
pub use runtime::RelayRuntime;
