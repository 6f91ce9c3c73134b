//! # elysiandb-engine
//!
//! The storage core: a sharded key-value store (`kvs`), a bucketed
//! expiration index (`exi`), a glob matcher for wildcard redirection
//! (`glob`), JSON snapshot persistence (`snapshot`), and the background
//! sweeper that reclaims expired keys (`sweeper`). `engine` ties these
//! together into the single facade the server talks to.

pub mod engine;
pub mod exi;
pub mod glob;
pub mod kvs;
pub mod snapshot;
pub mod sweeper;

pub use engine::{now_epoch_seconds, Engine};
pub use exi::Exi;
pub use kvs::Kvs;
pub use snapshot::SnapshotPaths;
