//! # Connection Pool
//!
//! Purpose: reuse TCP connections for the sync client to reduce handshake
//! latency and allocation churn.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: hold the mutex only while moving idle
//!    connections in and out of the pool.
//! 3. **Fail Fast**: exceeding the pool limit returns an error immediately
//!    instead of blocking the caller.
//! 4. **Cache-Friendly Buffers**: each connection reuses its own line
//!    buffers across calls.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{ClientError, ClientResult};
use crate::protocol::{encode_command, read_line};

/// Pool configuration for the sync client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub addr: String,
    pub max_idle: usize,
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

/// Connection pool handle. Cheap to clone; all clones share the same
/// underlying idle list and slot count.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        if let Some(conn) = self.pop_idle() {
            return Ok(PooledConnection::new(self.inner.clone(), conn));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted);
        }

        match Connection::connect(&self.inner.config) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    fn pop_idle(&self) -> Option<Connection> {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop. A connection
/// that errored mid-command is dropped instead of pooled, since the line
/// protocol has no way to resynchronize framing after a partial read.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    fn conn_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection exists while pooled")
    }

    /// Sends one command line and reads back exactly one response line.
    pub fn exec(&mut self, tokens: &[&[u8]]) -> ClientResult<Vec<u8>> {
        let result = self.conn_mut().exec_one(tokens);
        if result.is_err() {
            self.valid = false;
        }
        result
    }

    /// Sends one command line and reads back exactly `count` response
    /// lines. Used by `MGET`, where the server always emits one line per
    /// requested key.
    pub fn exec_counted(&mut self, tokens: &[&[u8]], count: usize) -> ClientResult<Vec<Vec<u8>>> {
        let result = self.conn_mut().exec_counted(tokens, count);
        if result.is_err() {
            self.valid = false;
        }
        result
    }

    /// Sends one command line and drains every response line the server
    /// writes without blocking past a short idle gap. Used by wildcard
    /// `GET`, where the number of matches is not known up front and the
    /// line protocol carries no count prefix.
    pub fn exec_drain(&mut self, tokens: &[&[u8]]) -> ClientResult<Vec<Vec<u8>>> {
        let result = self.conn_mut().exec_drain(tokens);
        if result.is_err() {
            self.valid = false;
        }
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if self.valid {
            pool.return_connection(conn);
        } else {
            pool.release_slot();
        }
    }
}

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Single TCP connection with reusable buffers.
pub struct Connection {
    reader: BufReader<TcpStream>,
    write_buf: Vec<u8>,
    line_buf: Vec<u8>,
    base_read_timeout: Option<Duration>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        stream.set_nodelay(true)?;

        Ok(Connection {
            reader: BufReader::new(stream),
            write_buf: Vec::with_capacity(256),
            line_buf: Vec::with_capacity(128),
            base_read_timeout: config.read_timeout,
        })
    }

    fn write_command(&mut self, tokens: &[&[u8]]) -> ClientResult<()> {
        encode_command(tokens, &mut self.write_buf)?;
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        Ok(())
    }

    fn exec_one(&mut self, tokens: &[&[u8]]) -> ClientResult<Vec<u8>> {
        self.write_command(tokens)?;
        read_line(&mut self.reader, &mut self.line_buf)
    }

    fn exec_counted(&mut self, tokens: &[&[u8]], count: usize) -> ClientResult<Vec<Vec<u8>>> {
        self.write_command(tokens)?;
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            lines.push(read_line(&mut self.reader, &mut self.line_buf)?);
        }
        Ok(lines)
    }

    /// Reads the first response line (blocking, as normal), then keeps
    /// reading additional lines under a short poll timeout until one
    /// times out, signaling the server has nothing further buffered. An
    /// empty first line (the zero-match wildcard response) yields no
    /// lines at all.
    fn exec_drain(&mut self, tokens: &[&[u8]]) -> ClientResult<Vec<Vec<u8>>> {
        self.write_command(tokens)?;

        let first = read_line(&mut self.reader, &mut self.line_buf)?;
        if first.is_empty() {
            return Ok(Vec::new());
        }

        let mut lines = vec![first];
        let stream = self.reader.get_ref();
        stream.set_read_timeout(Some(DRAIN_POLL_INTERVAL))?;

        loop {
            match read_line(&mut self.reader, &mut self.line_buf) {
                Ok(line) => lines.push(line),
                Err(ClientError::Io(ref err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    break;
                }
                Err(other) => {
                    self.reader.get_ref().set_read_timeout(self.base_read_timeout)?;
                    return Err(other);
                }
            }
        }

        self.reader.get_ref().set_read_timeout(self.base_read_timeout)?;
        Ok(lines)
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addr = resolve_addr(&config.addr)?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}

fn resolve_addr(addr: &str) -> ClientResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress)?
        .next()
        .ok_or(ClientError::InvalidAddress)
}
