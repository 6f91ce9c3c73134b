//! # TCP Accept Loop
//!
//! Bind the line-protocol port, tune each accepted socket for a long-lived,
//! low-latency connection, and hand it off to the framing loop.
//!
//! ## Design Principles
//! 1. **Tune Once Per Connection**: `TCP_NODELAY`, keepalive, and socket
//!    buffer sizes are set right after accept, not per-request.
//! 2. **No Idle Timeout**: connections are expected to be long-lived; a
//!    client that goes quiet is not punished for it.
//! 3. **One Task Per Connection**: tokio schedules thousands of these
//!    cheaply; there is no connection limit enforced at this layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::protocol::{route_line, Action, Context};

const READ_BUFFER_SIZE: usize = 128 * 1024;
const WRITE_BUFFER_SIZE: usize = 128 * 1024;
const SOCKET_BUFFER_SIZE: usize = 256 * 1024;
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(120);

/// Binds `host:port` and accepts connections until the listener itself
/// fails to bind. Each connection is handled on its own tokio task.
pub async fn run(host: &str, port: u16, ctx: Arc<Context>) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, "TCP server listening");
    serve(listener, ctx).await
}

/// Accepts connections from an already-bound listener. Split out from
/// `run` so tests can bind an ephemeral port and learn its address before
/// the accept loop starts.
pub async fn serve(listener: TcpListener, ctx: Arc<Context>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, "error accepting connection");
                continue;
            }
        };

        if let Err(err) = tune_socket(&stream) {
            tracing::warn!(error = %err, "failed to tune accepted socket");
        }

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &ctx).await {
                tracing::debug!(peer = %peer, error = %err, "connection ended with error");
            }
        });
    }
}

/// Applies the socket tuning the reference design calls out explicitly:
/// no-delay, keepalive with a 2-minute period, and 256 KiB send/receive
/// buffers.
fn tune_socket(stream: &TcpStream) -> std::io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_nodelay(true)?;
    sock_ref.set_keepalive(true)?;
    sock_ref.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(KEEPALIVE_PERIOD))?;
    sock_ref.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    sock_ref.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    Ok(())
}

/// Reads newline-framed commands off `stream` and writes back one response
/// per line, each terminated by `\n`. Returns once the client disconnects,
/// sends `EXIT`, or a write fails.
async fn handle_connection(stream: TcpStream, ctx: &Context) -> std::io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, read_half);
    let mut writer = tokio::io::BufWriter::with_capacity(WRITE_BUFFER_SIZE, write_half);

    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes_read = reader.read_until(b'\n', &mut line).await?;
        if bytes_read == 0 {
            return Ok(());
        }

        match route_line(&line, ctx) {
            Action::Respond(body) => {
                writer.write_all(&body).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Action::RespondAndClose(body) => {
                writer.write_all(&body).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                return Ok(());
            }
        }
    }
}
