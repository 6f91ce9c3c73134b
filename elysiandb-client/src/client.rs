//! # Synchronous Client API
//!
//! Purpose: expose a compact, blocking API for issuing ElysianDB line
//! protocol commands over TCP.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and framing details.
//! 2. **Borrow-Friendly API**: accepts `&[u8]` to avoid unnecessary copies.
//! 3. **Fail Fast**: protocol violations surface immediately as errors.
//! 4. **Honest About the Wire Format**: the line protocol has no count
//!    prefix, so `get` only guarantees a single, unambiguous response for
//!    a non-wildcard key; wildcard reads go through `scan`, which is
//!    best-effort (see `pool::Connection::exec_drain`).

use std::fmt;
use std::time::Duration;

use crate::pool::{ConnectionPool, PoolConfig};
use crate::protocol::{parse_deleted_count, parse_mget_line, split_key_value};

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    Io(std::io::Error),
    /// Line framing could not be built or parsed.
    Protocol,
    /// The server's response was not shaped the way this call expected.
    UnexpectedResponse(Vec<u8>),
    /// Pool is at capacity and no idle connections are available.
    PoolExhausted,
    /// Address could not be resolved to a socket address.
    InvalidAddress,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {err}"),
            ClientError::Protocol => write!(f, "protocol error"),
            ClientError::UnexpectedResponse(body) => {
                write!(f, "unexpected response: {}", String::from_utf8_lossy(body))
            }
            ClientError::PoolExhausted => write!(f, "connection pool exhausted"),
            ClientError::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

/// Configuration for the synchronous client and its connection pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:8088".
    pub addr: String,
    pub max_idle: usize,
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:8088".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// One element of an `MGET` response: the queried key and its value, or
/// `None` if that key missed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgetEntry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// Synchronous client with connection pooling over the ElysianDB line
/// protocol.
pub struct KVClient {
    pool: ConnectionPool,
}

impl KVClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.addr = addr.into();
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        })?;
        Ok(KVClient { pool })
    }

    /// Sends `PING`, returning the server's reply (normally `PONG`).
    pub fn ping(&self) -> ClientResult<Vec<u8>> {
        let mut conn = self.pool.acquire()?;
        conn.exec(&[b"PING"])
    }

    /// Fetches a value for a non-wildcard key. Returns `Ok(None)` when the
    /// key is missing or expired. Passing a key containing `*`/`?` will
    /// reach the server's wildcard path but this call only reads back the
    /// first response line; use [`KVClient::scan`] for wildcard reads.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        let body = conn.exec(&[b"GET", key])?;
        if body == b"Key not found" {
            Ok(None)
        } else {
            Ok(Some(body))
        }
    }

    /// Fetches every live key matching a glob `pattern`, best-effort:
    /// since the line protocol carries no line-count prefix, trailing
    /// matches are collected by draining the socket until it goes quiet
    /// for a short interval (see `pool::Connection::exec_drain`).
    pub fn scan(&self, pattern: &[u8]) -> ClientResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut conn = self.pool.acquire()?;
        let lines = conn.exec_drain(&[b"GET", pattern])?;
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            match split_key_value(&line) {
                Some((k, v)) => out.push((k.to_vec(), v.to_vec())),
                None => return Err(ClientError::UnexpectedResponse(line)),
            }
        }
        Ok(out)
    }

    /// Fetches multiple plain (non-wildcard) keys in one round trip. The
    /// server always emits exactly one response line per requested key: the
    /// bare value on a hit, `key=not found` on a miss — the same hit form a
    /// single-key `get` returns, just with the miss labeled so it can be
    /// told apart from its neighbors on the joined line.
    pub fn mget(&self, keys: &[&[u8]]) -> ClientResult<Vec<MgetEntry>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut tokens = Vec::with_capacity(keys.len() + 1);
        tokens.push(&b"MGET"[..]);
        tokens.extend_from_slice(keys);

        let mut conn = self.pool.acquire()?;
        let lines = conn.exec_counted(&tokens, keys.len())?;
        let out = keys
            .iter()
            .zip(lines)
            .map(|(&key, line)| MgetEntry {
                key: key.to_vec(),
                value: parse_mget_line(key, line),
            })
            .collect();
        Ok(out)
    }

    /// Sets a value for a key without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let body = conn.exec(&[b"SET", key, value])?;
        expect_ok(body)
    }

    /// Sets a value and attaches an expiration in whole seconds.
    pub fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> ClientResult<()> {
        let ttl_token = format!("TTL={}", ttl.as_secs());
        let mut conn = self.pool.acquire()?;
        let body = conn.exec(&[b"SET", key, ttl_token.as_bytes(), value])?;
        expect_ok(body)
    }

    /// Deletes a key (or, if it contains `*`/`?`, every matching key).
    /// Returns the number of keys removed.
    pub fn delete(&self, key: &[u8]) -> ClientResult<u64> {
        let mut conn = self.pool.acquire()?;
        let body = conn.exec(&[b"DEL", key])?;
        parse_deleted_count(&body).ok_or(ClientError::UnexpectedResponse(body))
    }

    /// Clears every key in the store.
    pub fn reset(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let body = conn.exec(&[b"RESET"])?;
        expect_ok(body)
    }

    /// Triggers an immediate snapshot flush.
    pub fn save(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let body = conn.exec(&[b"SAVE"])?;
        expect_ok(body)
    }
}

fn expect_ok(body: Vec<u8>) -> ClientResult<()> {
    if body == b"OK" {
        Ok(())
    } else {
        Err(ClientError::UnexpectedResponse(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_ok_accepts_ok_only() {
        assert!(expect_ok(b"OK".to_vec()).is_ok());
        assert!(expect_ok(b"ERR".to_vec()).is_err());
    }
}
