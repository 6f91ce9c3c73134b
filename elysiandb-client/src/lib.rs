//! # ElysianDB Sync Client
//!
//! Provide a lightweight, synchronous client for the ElysianDB line
//! protocol with connection pooling to minimize TCP handshake overhead.

mod client;
mod pool;
mod protocol;

pub use client::{ClientConfig, ClientError, ClientResult, KVClient, MgetEntry};
