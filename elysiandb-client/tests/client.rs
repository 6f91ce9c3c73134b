//! Drives `KVClient` against a hand-rolled line-protocol server so the
//! client can be exercised without depending on `elysiandb-server`.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use elysiandb_client::{ClientConfig, KVClient};

fn spawn_server(handler: fn(usize, Vec<u8>, &mut TcpStream), expected_commands: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        for idx in 0..expected_commands {
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).expect("read command");
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            handler(idx, line, &mut stream);
        }
    });

    addr
}

fn write_line(stream: &mut TcpStream, body: &[u8]) {
    stream.write_all(body).unwrap();
    stream.write_all(b"\n").unwrap();
    stream.flush().unwrap();
}

fn client_with_addr(addr: String) -> KVClient {
    let config = ClientConfig {
        addr,
        max_idle: 1,
        max_total: 1,
        read_timeout: Some(Duration::from_secs(1)),
        write_timeout: Some(Duration::from_secs(1)),
        connect_timeout: Some(Duration::from_secs(1)),
    };
    KVClient::with_config(config).expect("client")
}

#[test]
fn ping_returns_pong() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"PING");
            write_line(stream, b"PONG");
        },
        1,
    );
    let client = client_with_addr(addr);
    assert_eq!(client.ping().unwrap(), b"PONG");
}

#[test]
fn set_then_get_roundtrip() {
    let addr = spawn_server(
        |idx, line, stream| match idx {
            0 => {
                assert_eq!(line, b"SET key value");
                write_line(stream, b"OK");
            }
            1 => {
                assert_eq!(line, b"GET key");
                write_line(stream, b"value");
            }
            _ => unreachable!(),
        },
        2,
    );

    let client = client_with_addr(addr);
    client.set(b"key", b"value").expect("set");
    assert_eq!(client.get(b"key").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn get_missing_key_is_none() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"GET missing");
            write_line(stream, b"Key not found");
        },
        1,
    );
    let client = client_with_addr(addr);
    assert_eq!(client.get(b"missing").unwrap(), None);
}

#[test]
fn set_with_ttl_sends_ttl_token_after_key() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"SET foo TTL=5 hello");
            write_line(stream, b"OK");
        },
        1,
    );
    let client = client_with_addr(addr);
    client.set_with_ttl(b"foo", b"hello", Duration::from_secs(5)).unwrap();
}

#[test]
fn delete_parses_count() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"DEL foo");
            write_line(stream, b"Deleted 1");
        },
        1,
    );
    let client = client_with_addr(addr);
    assert_eq!(client.delete(b"foo").unwrap(), 1);
}

#[test]
fn mget_reads_exactly_one_line_per_key() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"MGET foo bar");
            stream.write_all(b"hello\nbar=not found\n").unwrap();
            stream.flush().unwrap();
        },
        1,
    );
    let client = client_with_addr(addr);
    let entries = client.mget(&[b"foo", b"bar"]).unwrap();
    assert_eq!(entries[0].key, b"foo");
    assert_eq!(entries[0].value, Some(b"hello".to_vec()));
    assert_eq!(entries[1].key, b"bar");
    assert_eq!(entries[1].value, None);
}

#[test]
fn scan_drains_every_match_without_a_count_prefix() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"GET user:*");
            stream.write_all(b"user:1=alice\nuser:2=bob\n").unwrap();
            stream.flush().unwrap();
        },
        1,
    );
    let client = client_with_addr(addr);
    let mut matches = client.scan(b"user:*").unwrap();
    matches.sort();
    assert_eq!(
        matches,
        vec![
            (b"user:1".to_vec(), b"alice".to_vec()),
            (b"user:2".to_vec(), b"bob".to_vec()),
        ]
    );
}

#[test]
fn scan_with_no_matches_returns_empty() {
    let addr = spawn_server(
        |_idx, line, stream| {
            assert_eq!(line, b"GET nothing:*");
            write_line(stream, b"");
        },
        1,
    );
    let client = client_with_addr(addr);
    assert_eq!(client.scan(b"nothing:*").unwrap(), Vec::new());
}

#[test]
fn save_and_reset_expect_ok() {
    let addr = spawn_server(
        |idx, line, stream| match idx {
            0 => {
                assert_eq!(line, b"SAVE");
                write_line(stream, b"OK");
            }
            1 => {
                assert_eq!(line, b"RESET");
                write_line(stream, b"OK");
            }
            _ => unreachable!(),
        },
        2,
    );
    let client = client_with_addr(addr);
    client.save().unwrap();
    client.reset().unwrap();
}
