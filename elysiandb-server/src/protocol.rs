//! # Line Protocol
//!
//! Purpose: parse one newline-terminated command at a time and dispatch it
//! to the storage engine, producing the exact response bytes the framing
//! layer will terminate with `\n`.
//!
//! ## Design Principles
//! 1. **ASCII Case-Insensitive Commands**: `get`, `GET`, and `Get` are the
//!    same command; values and keys are never case-folded.
//! 2. **No Allocation on the Parse Path**: `first_word` and `extract_ttl`
//!    operate on borrowed slices of the input line.
//! 3. **Wildcard Redirection at the Handler**: a key containing `*`/`?` is
//!    detected once per command and sent down the bulk path; the single-key
//!    path never has to think about globs.

use std::sync::Arc;

use elysiandb_engine::{glob, Engine};

use crate::stats::Stats;

/// What the connection loop should do after a command completes.
pub enum Action {
    /// Write `0` back to the client and keep reading.
    Respond(Vec<u8>),
    /// Write the bytes back to the client, then close the connection.
    RespondAndClose(Vec<u8>),
}

/// Shared state handed to every command dispatch.
pub struct Context {
    pub engine: Arc<Engine>,
    pub stats: Arc<Stats>,
    pub snapshot: Arc<elysiandb_engine::SnapshotPaths>,
}

/// Splits `line` into its first whitespace-separated word and the
/// remainder, ignoring a trailing `\r`/`\n` and any leading whitespace.
/// Mirrors the reference tokenizer: a run of spaces or tabs separates
/// words, nothing more exotic.
pub fn first_word(line: &[u8]) -> (&[u8], &[u8]) {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    let line = &line[..end];

    let mut i = 0;
    while i < line.len() && (line[i] == b' ' || line[i] == b'\t') {
        i += 1;
    }
    let start = i;
    while i < line.len() && line[i] != b' ' && line[i] != b'\t' {
        i += 1;
    }
    let word = &line[start..i];

    while i < line.len() && (line[i] == b' ' || line[i] == b'\t') {
        i += 1;
    }
    (word, &line[i..])
}

/// ASCII case-insensitive byte equality.
pub fn eq_ascii_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// Parses a leading run of ASCII digits as a `u64`. Returns `None` if there
/// is no digit at all; a non-digit byte simply ends the number early, it
/// does not make the whole parse fail.
fn parse_decimal_prefix(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut read = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as u64);
        read += 1;
    }
    if read == 0 {
        None
    } else {
        Some(value)
    }
}

/// Consumes a leading `TTL=<digits>` token from `query`, if present,
/// returning the TTL in seconds (0 if absent or malformed) and the
/// remaining query bytes.
fn extract_ttl(query: &[u8]) -> (u64, &[u8]) {
    let (first, rest) = first_word(query);
    if first.len() > 4 && eq_ascii_ci(&first[..4], b"TTL=") {
        let ttl = parse_decimal_prefix(&first[4..]).unwrap_or(0);
        (ttl, rest)
    } else {
        (0, query)
    }
}

/// Parses and dispatches one command line. `line` may include a trailing
/// `\r\n`, `\n`, or neither.
pub fn route_line(line: &[u8], ctx: &Context) -> Action {
    let (cmd, query) = first_word(line);
    ctx.stats.record_request();

    if eq_ascii_ci(cmd, b"PING") {
        Action::Respond(b"PONG".to_vec())
    } else if eq_ascii_ci(cmd, b"EXIT") {
        Action::RespondAndClose(b"Goodbye!".to_vec())
    } else if eq_ascii_ci(cmd, b"GET") {
        Action::Respond(handle_get(query, ctx))
    } else if eq_ascii_ci(cmd, b"MGET") {
        Action::Respond(handle_mget(query, ctx))
    } else if eq_ascii_ci(cmd, b"SET") {
        Action::Respond(handle_set(query, ctx))
    } else if eq_ascii_ci(cmd, b"DEL") {
        Action::Respond(handle_del(query, ctx))
    } else if eq_ascii_ci(cmd, b"RESET") {
        Action::Respond(handle_reset(ctx))
    } else if eq_ascii_ci(cmd, b"SAVE") {
        Action::Respond(handle_save(ctx))
    } else {
        tracing::warn!(command = %String::from_utf8_lossy(cmd), "unknown command");
        Action::Respond(b"ERR".to_vec())
    }
}

/// Formats a single `key=value` line, used by the wildcard and MGET paths.
fn format_key_value(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + value.len() + 1);
    out.extend_from_slice(key);
    out.push(b'=');
    out.extend_from_slice(value);
    out
}

fn format_key_not_found(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 14);
    out.extend_from_slice(key);
    out.extend_from_slice(b"=not found");
    out
}

fn handle_get(key: &[u8], ctx: &Context) -> Vec<u8> {
    if glob::contains_wildcard(key) {
        let hits = ctx.engine.wildcard_get(key);
        if hits.is_empty() {
            ctx.stats.record_miss();
            return Vec::new();
        }
        ctx.stats.record_hit();
        let lines: Vec<Vec<u8>> = hits
            .iter()
            .map(|(k, v)| format_key_value(k, v))
            .collect();
        return lines.join(&b'\n');
    }

    match ctx.engine.get(key) {
        Some(value) => {
            ctx.stats.record_hit();
            value
        }
        None => {
            ctx.stats.record_miss();
            b"Key not found".to_vec()
        }
    }
}

fn handle_mget(query: &[u8], ctx: &Context) -> Vec<u8> {
    let keys: Vec<&[u8]> = split_whitespace(query);
    if keys.is_empty() {
        return b"ERR".to_vec();
    }

    let mut lines: Vec<Vec<u8>> = Vec::new();
    for key in keys {
        if glob::contains_wildcard(key) {
            let hits = ctx.engine.wildcard_get(key);
            if hits.is_empty() {
                ctx.stats.record_miss();
            } else {
                ctx.stats.record_hit();
            }
            for (k, v) in hits {
                lines.push(format_key_value(&k, &v));
            }
            continue;
        }

        match ctx.engine.get(key) {
            Some(value) => {
                ctx.stats.record_hit();
                lines.push(value);
            }
            None => {
                ctx.stats.record_miss();
                lines.push(format_key_not_found(key));
            }
        }
    }

    lines.join(&b'\n')
}

fn handle_set(query: &[u8], ctx: &Context) -> Vec<u8> {
    let (ttl, rest) = extract_ttl(query);
    let (key, value) = first_word(rest);
    if key.is_empty() {
        return b"ERR".to_vec();
    }

    let ttl_opt = if ttl > 0 { Some(ttl) } else { None };
    ctx.engine.set(key.to_vec(), value.to_vec(), ttl_opt);
    b"OK".to_vec()
}

fn handle_del(key: &[u8], ctx: &Context) -> Vec<u8> {
    if key.is_empty() {
        return b"ERR".to_vec();
    }

    let removed = if glob::contains_wildcard(key) {
        ctx.engine.wildcard_delete(key)
    } else if ctx.engine.delete(key) {
        1
    } else {
        0
    };

    format!("Deleted {removed}").into_bytes()
}

fn handle_reset(ctx: &Context) -> Vec<u8> {
    ctx.engine.reset();
    b"OK".to_vec()
}

fn handle_save(ctx: &Context) -> Vec<u8> {
    match elysiandb_engine::snapshot::flush(&ctx.engine, &ctx.snapshot) {
        Ok(()) => b"OK".to_vec(),
        Err(err) => {
            tracing::error!(error = %err, "SAVE failed");
            b"ERR".to_vec()
        }
    }
}

/// Splits `query` on runs of spaces/tabs, dropping empty tokens. Used by
/// MGET, which takes an arbitrary number of keys on one line.
fn split_whitespace(query: &[u8]) -> Vec<&[u8]> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, &b) in query.iter().enumerate() {
        let is_space = b == b' ' || b == b'\t';
        match (is_space, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                tokens.push(&query[s..i]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(&query[s..]);
    }
    tokens
}
