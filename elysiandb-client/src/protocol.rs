//! # Line Protocol Encoding/Decoding
//!
//! Purpose: build newline-terminated command lines and read back
//! newline-terminated response lines, mirroring the server's framing
//! exactly so the client never has to guess at a length prefix that does
//! not exist on the wire.
//!
//! ## Design Principles
//! 1. **No Length Prefix**: this protocol is plain text, one command or
//!    response per line; the client must not invent framing the server
//!    does not send.
//! 2. **Binary-Safe Where the Protocol Allows**: the final token of a
//!    command (a `SET` value) may contain arbitrary bytes except `\n`/`\r`,
//!    since it is never re-tokenized by the server.
//! 3. **Buffer Reuse**: callers pass a scratch buffer so a hot client loop
//!    does not allocate a fresh `Vec` per line.

use crate::client::{ClientError, ClientResult};

/// Encodes a command as whitespace-joined tokens followed by `\n`.
///
/// Every token but the last is validated to contain no whitespace (it
/// would be split into extra tokens server-side); every token is
/// validated to contain no `\n`/`\r` (it would corrupt framing).
pub fn encode_command(tokens: &[&[u8]], out: &mut Vec<u8>) -> ClientResult<()> {
    out.clear();
    for (idx, token) in tokens.iter().enumerate() {
        if token.iter().any(|&b| b == b'\n' || b == b'\r') {
            return Err(ClientError::Protocol);
        }
        let is_last = idx + 1 == tokens.len();
        if !is_last && token.iter().any(|&b| b == b' ' || b == b'\t') {
            return Err(ClientError::Protocol);
        }
        if idx > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(token);
    }
    out.push(b'\n');
    Ok(())
}

/// Reads one `\n`-terminated response line, stripping a trailing `\r` if
/// present, and returns its body as an owned buffer.
pub fn read_line<R: std::io::BufRead>(reader: &mut R, scratch: &mut Vec<u8>) -> ClientResult<Vec<u8>> {
    scratch.clear();
    let bytes_read = reader.read_until(b'\n', scratch)?;
    if bytes_read == 0 {
        return Err(ClientError::Protocol);
    }
    if scratch.last() == Some(&b'\n') {
        scratch.pop();
    }
    if scratch.last() == Some(&b'\r') {
        scratch.pop();
    }
    Ok(scratch.clone())
}

/// Splits a `key=value` or `key=not found` response line on the first `=`.
/// Used for wildcard expansions, where every match is labeled since there
/// is no single value to hand back unlabeled.
pub fn split_key_value(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = line.iter().position(|&b| b == b'=')?;
    Some((&line[..pos], &line[pos + 1..]))
}

/// Builds the exact `key=not found` label the server emits for a plain-key
/// MGET miss.
fn not_found_label(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 10);
    out.extend_from_slice(key);
    out.extend_from_slice(b"=not found");
    out
}

/// Parses one MGET response line for a plain (non-wildcard) key: the
/// server emits the bare value on a hit and `key=not found` on a miss, so
/// anything other than that exact miss label is the value, verbatim.
pub fn parse_mget_line(key: &[u8], line: Vec<u8>) -> Option<Vec<u8>> {
    if line == not_found_label(key) {
        None
    } else {
        Some(line)
    }
}

/// Parses a `Deleted <N>` response, returning `N`.
pub fn parse_deleted_count(line: &[u8]) -> Option<u64> {
    let rest = line.strip_prefix(b"Deleted ")?;
    std::str::from_utf8(rest).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encodes_multi_token_command() {
        let mut buf = Vec::new();
        encode_command(&[b"SET", b"foo", b"hello world"], &mut buf).unwrap();
        assert_eq!(&buf, b"SET foo hello world\n");
    }

    #[test]
    fn rejects_whitespace_in_non_final_token() {
        let mut buf = Vec::new();
        let err = encode_command(&[b"SET", b"foo bar", b"value"], &mut buf);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_newline_in_any_token() {
        let mut buf = Vec::new();
        let err = encode_command(&[b"SET", b"foo", b"bad\nvalue"], &mut buf);
        assert!(err.is_err());
    }

    #[test]
    fn reads_line_stripping_crlf() {
        let mut reader = Cursor::new(b"OK\r\n".to_vec());
        let mut scratch = Vec::new();
        let line = read_line(&mut reader, &mut scratch).unwrap();
        assert_eq!(line, b"OK");
    }

    #[test]
    fn reads_line_with_bare_lf() {
        let mut reader = Cursor::new(b"PONG\n".to_vec());
        let mut scratch = Vec::new();
        let line = read_line(&mut reader, &mut scratch).unwrap();
        assert_eq!(line, b"PONG");
    }

    #[test]
    fn splits_key_value_pairs() {
        assert_eq!(split_key_value(b"foo=bar"), Some((&b"foo"[..], &b"bar"[..])));
        assert_eq!(split_key_value(b"novalue"), None);
    }

    #[test]
    fn parses_deleted_count() {
        assert_eq!(parse_deleted_count(b"Deleted 3"), Some(3));
        assert_eq!(parse_deleted_count(b"OK"), None);
    }

    #[test]
    fn mget_line_hit_is_the_bare_value() {
        assert_eq!(parse_mget_line(b"foo", b"hello".to_vec()), Some(b"hello".to_vec()));
    }

    #[test]
    fn mget_line_miss_matches_the_exact_label() {
        assert_eq!(parse_mget_line(b"foo", b"foo=not found".to_vec()), None);
    }

    #[test]
    fn mget_line_value_containing_equals_is_not_mistaken_for_a_miss() {
        assert_eq!(
            parse_mget_line(b"foo", b"a=b".to_vec()),
            Some(b"a=b".to_vec())
        );
    }
}
