//! End-to-end tests driving a real listener with raw `TcpStream`s, the way
//! a line-oriented protocol is naturally exercised: no client library in
//! the loop, just bytes on the wire.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use elysiandb_engine::{Engine, SnapshotPaths};
use elysiandb_server::{stats::Stats, Context};
use tokio::net::TcpListener;

async fn spawn_server() -> (std::net::SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());
    let snapshot = Arc::new(SnapshotPaths::new(dir.path()));
    let stats = Arc::new(Stats::new(true));
    let ctx = Arc::new(Context {
        engine,
        stats,
        snapshot,
    });

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = elysiandb_server::server::serve(listener, ctx).await;
    });

    (addr, dir)
}

/// A response body may itself contain embedded `\n`s (wildcard GET, MGET),
/// so the framing layer's own trailing `\n` is the only one that marks the
/// end of the whole response — not the end of each embedded line. Callers
/// that know how many response lines a command produces ask for exactly
/// that many; a reader that lived only for one call would otherwise get
/// dropped with the remaining lines still sitting in its buffer.
fn send_lines(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, line: &str, count: usize) -> Vec<String> {
    stream.write_all(line.as_bytes()).unwrap();
    if !line.ends_with('\n') {
        stream.write_all(b"\n").unwrap();
    }
    stream.flush().unwrap();

    (0..count)
        .map(|_| {
            let mut response = String::new();
            reader.read_line(&mut response).unwrap();
            response.trim_end_matches(['\r', '\n']).to_string()
        })
        .collect()
}

fn send_line(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, line: &str) -> String {
    send_lines(stream, reader, line, 1).remove(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_pong() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    assert_eq!(send_line(&mut stream, &mut reader, "PING"), "PONG");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn set_get_delete_cycle() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    assert_eq!(send_line(&mut stream, &mut reader, "SET foo hello"), "OK");
    assert_eq!(send_line(&mut stream, &mut reader, "GET foo"), "hello");
    assert_eq!(send_line(&mut stream, &mut reader, "DEL foo"), "Deleted 1");
    assert_eq!(send_line(&mut stream, &mut reader, "GET foo"), "Key not found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ttl_expires_the_key() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    assert_eq!(send_line(&mut stream, &mut reader, "SET foo TTL=1 hello"), "OK");
    assert_eq!(send_line(&mut stream, &mut reader, "GET foo"), "hello");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(send_line(&mut stream, &mut reader, "GET foo"), "Key not found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wildcard_get_lists_every_match() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    send_line(&mut stream, &mut reader, "SET user:1 alice");
    send_line(&mut stream, &mut reader, "SET user:2 bob");

    let mut lines = send_lines(&mut stream, &mut reader, "GET user:*", 2);
    lines.sort();
    assert_eq!(lines, vec!["user:1=alice", "user:2=bob"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mget_reports_hits_and_misses_per_key() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    send_line(&mut stream, &mut reader, "SET foo hello");
    let lines = send_lines(&mut stream, &mut reader, "MGET foo baz", 2);
    assert_eq!(lines, vec!["hello", "baz=not found"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_then_restart_reloads_the_snapshot() {
    let (addr, dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    assert_eq!(send_line(&mut stream, &mut reader, "SET foo bar"), "OK");
    assert_eq!(send_line(&mut stream, &mut reader, "SAVE"), "OK");
    drop(stream);

    let engine = Arc::new(Engine::new());
    let snapshot = Arc::new(SnapshotPaths::new(dir.path()));
    elysiandb_engine::snapshot::load(&engine, &snapshot).unwrap();
    assert_eq!(engine.get(b"foo"), Some(b"bar".to_vec()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exit_closes_the_connection() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    assert_eq!(send_line(&mut stream, &mut reader, "EXIT"), "Goodbye!");

    let mut buf = [0u8; 16];
    use std::io::Read;
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(n, 0, "server should have closed the connection");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_clears_every_key() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    send_line(&mut stream, &mut reader, "SET foo hello");
    assert_eq!(send_line(&mut stream, &mut reader, "RESET"), "OK");
    assert_eq!(send_line(&mut stream, &mut reader, "GET foo"), "Key not found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_command_returns_err() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    assert_eq!(send_line(&mut stream, &mut reader, "BOGUS"), "ERR");
}
