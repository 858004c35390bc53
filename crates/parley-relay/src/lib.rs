//! The parley relay engine: session registry, room-scoped fan-out, command
//! handling, and the per-connection protocol loops.

pub mod registry;
pub mod server;
pub mod storage;

mod commands;
mod connection;

pub use registry::{Outbound, Registry};
pub use server::RelayState;
pub use storage::Storage;
