//! RESP replies, the streaming RESP codec, and request encoding.
//!
//! The codec decodes the five RESP2 reply types. It is incremental: a
//! reply split across any number of reads decodes once the last byte
//! arrives, and a partially decoded reply leaves no state behind.

use super::{Codec, CRLF};
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use memchr::memchr;
use std::fmt;

/// A decoded RESP reply.
#[derive(Clone, PartialEq)]
pub enum Reply {
    /// Simple string (`+...`).
    Simple(String),

    /// Error reply (`-...`). Same payload shape as `Simple`, distinct
    /// solely by tag.
    Error(String),

    /// 64-bit signed integer (`:...`).
    Integer(i64),

    /// Bulk string (`$...`), binary-safe.
    Bulk(Bytes),

    /// Nil. Both the nil bulk string (`$-1`) and the nil array (`*-1`)
    /// decode to this variant.
    Null,

    /// Array of replies (`*...`), arbitrarily nested.
    Array(Vec<Reply>),
}

impl Reply {
    /// Create a simple string reply.
    #[inline]
    pub fn simple(s: impl Into<String>) -> Self {
        Self::Simple(s.into())
    }

    /// Create an error reply.
    #[inline]
    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    /// Create a bulk string reply.
    #[inline]
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::Bulk(data.into())
    }

    /// Check if this is a nil reply.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this is an error reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// View the payload as a string slice, for simple strings, errors and
    /// UTF-8 bulk strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Simple(s) | Self::Error(s) => Some(s),
            Self::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// View the payload as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Simple(s) => Some(s.as_bytes()),
            Self::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// The integer value, if this is an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The elements, if this is an array reply.
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Serialize the reply back to its wire form.
    pub fn serialize(&self, buf: &mut BytesMut) {
        match self {
            Self::Simple(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Self::Error(s) => {
                buf.put_u8(b'-');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Self::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Self::Bulk(data) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Self::Null => buf.put_slice(b"$-1\r\n"),
            Self::Array(items) => {
                buf.put_u8(b'*');
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for item in items {
                    item.serialize(buf);
                }
            }
        }
    }

    /// Serialize to an owned byte vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf);
        buf.to_vec()
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(s) => write!(f, "Simple({s:?})"),
            Self::Error(s) => write!(f, "Error({s:?})"),
            Self::Integer(n) => write!(f, "Integer({n})"),
            Self::Bulk(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "Bulk({s:?})"),
                Err(_) => write!(f, "Bulk({b:?})"),
            },
            Self::Null => write!(f, "Null"),
            Self::Array(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(s) => write!(f, "+{s}"),
            Self::Error(s) => write!(f, "-{s}"),
            Self::Integer(n) => write!(f, ":{n}"),
            Self::Bulk(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "${s}"),
                Err(_) => write!(f, "$<{} bytes>", b.len()),
            },
            Self::Null => write!(f, "(nil)"),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {item}", i + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Streaming RESP reply codec.
///
/// Stateless: every `parse` call decodes from the front of the offered
/// input, so a failed partial decode cannot leak into the next attempt.
#[derive(Debug, Default)]
pub struct RespCodec;

impl RespCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for RespCodec {
    type Message = Reply;

    fn parse(&mut self, input: &[u8]) -> Result<Option<(usize, Reply)>, ProtocolError> {
        parse_reply(input, 0)
    }
}

/// Decode one reply starting at `pos`. Returns the position after the
/// reply, or `None` when the input is an incomplete prefix.
fn parse_reply(input: &[u8], pos: usize) -> Result<Option<(usize, Reply)>, ProtocolError> {
    let Some(&marker) = input.get(pos) else {
        return Ok(None);
    };

    match marker {
        b'+' => Ok(read_line(input, pos + 1)?
            .map(|(next, line)| (next, Reply::Simple(String::from_utf8_lossy(line).into_owned())))),
        b'-' => Ok(read_line(input, pos + 1)?
            .map(|(next, line)| (next, Reply::Error(String::from_utf8_lossy(line).into_owned())))),
        b':' => parse_integer(input, pos + 1),
        b'$' => parse_bulk(input, pos + 1),
        b'*' => parse_array(input, pos + 1),
        other => Err(ProtocolError::InvalidTypeMarker(other)),
    }
}

fn parse_integer(input: &[u8], pos: usize) -> Result<Option<(usize, Reply)>, ProtocolError> {
    match read_integer_line(input, pos)? {
        Some((next, value)) => Ok(Some((next, Reply::Integer(value)))),
        None => Ok(None),
    }
}

fn parse_bulk(input: &[u8], pos: usize) -> Result<Option<(usize, Reply)>, ProtocolError> {
    let Some((payload_start, len)) = read_integer_line(input, pos)? else {
        return Ok(None);
    };

    if len == -1 {
        return Ok(Some((payload_start, Reply::Null)));
    }
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }

    let len = len as usize;
    let end = payload_start + len;
    if input.len() < end + 2 {
        return Ok(None);
    }
    if &input[end..end + 2] != CRLF {
        return Err(ProtocolError::MissingCrlf);
    }

    let payload = Bytes::copy_from_slice(&input[payload_start..end]);
    Ok(Some((end + 2, Reply::Bulk(payload))))
}

fn parse_array(input: &[u8], pos: usize) -> Result<Option<(usize, Reply)>, ProtocolError> {
    let Some((mut pos, len)) = read_integer_line(input, pos)? else {
        return Ok(None);
    };

    if len == -1 {
        return Ok(Some((pos, Reply::Null)));
    }
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }

    // If any element is incomplete the whole array is discarded and will
    // be reattempted from scratch on the next feed.
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        match parse_reply(input, pos)? {
            Some((next, item)) => {
                pos = next;
                items.push(item);
            }
            None => return Ok(None),
        }
    }

    Ok(Some((pos, Reply::Array(items))))
}

/// Read a CRLF-terminated line starting at `pos`. Returns the position
/// after the terminator and the line content (terminator excluded).
fn read_line(input: &[u8], pos: usize) -> Result<Option<(usize, &[u8])>, ProtocolError> {
    let Some(offset) = memchr(b'\n', &input[pos.min(input.len())..]) else {
        return Ok(None);
    };
    let nl = pos + offset;
    if nl == pos || input[nl - 1] != b'\r' {
        return Err(ProtocolError::MissingCr);
    }
    Ok(Some((nl + 1, &input[pos..nl - 1])))
}

/// Read a CRLF-terminated signed decimal field starting at `pos`.
fn read_integer_line(input: &[u8], pos: usize) -> Result<Option<(usize, i64)>, ProtocolError> {
    let Some((next, line)) = read_line(input, pos)? else {
        return Ok(None);
    };

    let negative = line.first() == Some(&b'-');
    let digits = if negative { &line[1..] } else { line };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::InvalidInteger(
            String::from_utf8_lossy(line).into_owned(),
        ));
    }

    // Accumulate on the negative side so i64::MIN is representable.
    let mut value: i64 = 0;
    for &b in digits {
        value = value
            .saturating_mul(10)
            .saturating_sub(i64::from(b - b'0'));
    }
    if !negative {
        value = value.saturating_neg();
    }

    Ok(Some((next, value)))
}

/// Encode a command as a RESP array of bulk strings:
/// `*N\r\n$len1\r\n<arg1>\r\n...`. Lengths are raw byte counts.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Bytes {
    let payload: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();
    let mut buf = BytesMut::with_capacity(payload + 16);

    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    for arg in args {
        let arg = arg.as_ref();
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(arg);
        buf.put_slice(CRLF);
    }

    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> Result<Option<(usize, Reply)>, ProtocolError> {
        RespCodec::new().parse(input)
    }

    fn parse_complete(input: &[u8]) -> Reply {
        let (consumed, reply) = parse_one(input).unwrap().unwrap();
        assert_eq!(consumed, input.len());
        reply
    }

    #[test]
    fn parse_simple_string() {
        assert_eq!(parse_complete(b"+OK\r\n"), Reply::simple("OK"));
        assert_eq!(parse_complete(b"+\r\n"), Reply::simple(""));
    }

    #[test]
    fn parse_error() {
        assert_eq!(
            parse_complete(b"-ERR unknown command\r\n"),
            Reply::error("ERR unknown command")
        );
    }

    #[test]
    fn parse_integer() {
        assert_eq!(parse_complete(b":42\r\n"), Reply::Integer(42));
        assert_eq!(parse_complete(b":-1000\r\n"), Reply::Integer(-1000));
        assert_eq!(parse_complete(b":0\r\n"), Reply::Integer(0));
    }

    #[test]
    fn parse_bulk_string() {
        assert_eq!(parse_complete(b"$5\r\nhello\r\n"), Reply::bulk("hello"));
        assert_eq!(parse_complete(b"$0\r\n\r\n"), Reply::bulk(""));
    }

    #[test]
    fn bulk_payload_may_embed_crlf() {
        assert_eq!(
            parse_complete(b"$10\r\nab\r\ncd\r\nef\r\n"),
            Reply::bulk(&b"ab\r\ncd\r\nef"[..])
        );
    }

    #[test]
    fn parse_nulls() {
        assert_eq!(parse_complete(b"$-1\r\n"), Reply::Null);
        assert_eq!(parse_complete(b"*-1\r\n"), Reply::Null);
    }

    #[test]
    fn parse_array() {
        let reply = parse_complete(b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::bulk("SET"),
                Reply::bulk("key"),
                Reply::bulk("value"),
            ])
        );
    }

    #[test]
    fn parse_nested_array() {
        let reply = parse_complete(b"*2\r\n*3\r\n:1\r\n:2\r\n:3\r\n*2\r\n+Hello\r\n-World\r\n");
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Array(vec![
                    Reply::Integer(1),
                    Reply::Integer(2),
                    Reply::Integer(3)
                ]),
                Reply::Array(vec![Reply::simple("Hello"), Reply::error("World")]),
            ])
        );
    }

    #[test]
    fn parse_null_inside_array() {
        let reply = parse_complete(b"*3\r\n$5\r\nhello\r\n$-1\r\n$5\r\nworld\r\n");
        assert_eq!(
            reply,
            Reply::Array(vec![Reply::bulk("hello"), Reply::Null, Reply::bulk("world")])
        );
    }

    #[test]
    fn incomplete_input_is_not_an_error() {
        assert_eq!(parse_one(b"").unwrap(), None);
        assert_eq!(parse_one(b"+OK").unwrap(), None);
        assert_eq!(parse_one(b"+OK\r").unwrap(), None);
        assert_eq!(parse_one(b":12").unwrap(), None);
        assert_eq!(parse_one(b"$5\r\nhel").unwrap(), None);
        assert_eq!(parse_one(b"$5\r\nhello").unwrap(), None);
        assert_eq!(parse_one(b"*2\r\n$3\r\nfoo\r\n").unwrap(), None);
    }

    #[test]
    fn invalid_marker_is_fatal() {
        assert_eq!(
            parse_one(b"Xnope\r\n").unwrap_err(),
            ProtocolError::InvalidTypeMarker(b'X')
        );
    }

    #[test]
    fn newline_without_cr_is_fatal() {
        assert_eq!(parse_one(b"+OK\n").unwrap_err(), ProtocolError::MissingCr);
        assert_eq!(parse_one(b":5\n").unwrap_err(), ProtocolError::MissingCr);
    }

    #[test]
    fn bulk_without_trailing_crlf_is_fatal() {
        assert_eq!(
            parse_one(b"$5\r\nhelloXX").unwrap_err(),
            ProtocolError::MissingCrlf
        );
    }

    #[test]
    fn garbage_integer_is_fatal() {
        assert!(matches!(
            parse_one(b":12a4\r\n").unwrap_err(),
            ProtocolError::InvalidInteger(_)
        ));
        assert!(matches!(
            parse_one(b"$x\r\n").unwrap_err(),
            ProtocolError::InvalidInteger(_)
        ));
        assert!(matches!(
            parse_one(b":-\r\n").unwrap_err(),
            ProtocolError::InvalidInteger(_)
        ));
    }

    #[test]
    fn negative_length_other_than_nil_is_fatal() {
        assert_eq!(
            parse_one(b"$-2\r\n").unwrap_err(),
            ProtocolError::InvalidLength(-2)
        );
        assert_eq!(
            parse_one(b"*-7\r\n").unwrap_err(),
            ProtocolError::InvalidLength(-7)
        );
    }

    #[test]
    fn consumes_exactly_one_message() {
        let (consumed, reply) = parse_one(b"+OK\r\n:42\r\n").unwrap().unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(reply, Reply::simple("OK"));
    }

    #[test]
    fn encode_command_wire_form() {
        assert_eq!(
            encode_command(&["GET", "key"]).as_ref(),
            b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n"
        );
        assert_eq!(
            encode_command(&["SET", "k", "v"]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn encode_command_counts_bytes_not_chars() {
        // "ü" is two bytes in UTF-8.
        assert_eq!(
            encode_command(&["ü"]).as_ref(),
            b"*1\r\n$2\r\n\xc3\xbc\r\n"
        );
    }

    #[test]
    fn serialize_round_trip() {
        let replies = [
            Reply::simple("OK"),
            Reply::error("ERR boom"),
            Reply::Integer(-7),
            Reply::bulk(&b"with\r\ncrlf"[..]),
            Reply::Null,
            Reply::Array(vec![
                Reply::Integer(1),
                Reply::Array(vec![Reply::Array(vec![Reply::bulk("deep")]), Reply::Null]),
            ]),
        ];
        for reply in replies {
            assert_eq!(parse_complete(&reply.to_vec()), reply);
        }
    }
}
