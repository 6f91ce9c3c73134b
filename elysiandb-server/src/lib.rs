//! # elysiandb-server
//!
//! The TCP accept loop (`server`) and the line protocol it dispatches
//! through (`protocol`), plus the in-process request counters (`stats`).
//! Exposed as a library so integration tests can drive a real listener
//! without going through `main`.

pub mod protocol;
pub mod server;
pub mod stats;

pub use protocol::{route_line, Action, Context};
pub use stats::Stats;
