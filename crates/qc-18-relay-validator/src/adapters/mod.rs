//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits: an in-memory validator contract, an
//! mpsc-backed signature transport and clocks.

mod channel_transport;
mod in_memory_chain;
mod time;

pub use channel_transport::ChannelTransport;
pub use in_memory_chain::{InMemoryChain, InMemoryChainClient, SubmittedValidation};
pub use time::{ManualTimeSource, SystemTimeSource};
