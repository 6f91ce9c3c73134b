//! # elysiandb-common
//!
//! Shared error type and configuration model used across the storage engine
//! and the TCP server.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{ElysianError, ElysianResult};
