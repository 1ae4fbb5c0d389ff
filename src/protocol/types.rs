//! Reply Types
//!
//! Every command produces exactly one reply line, terminated by `\n`:
//!
//! ```text
//! OK
//! PONG
//! shardkv                                  (a value)
//! (nil)
//! hits=2 misses=1 evictions=1 size=2
//! ERR unknown command 'FOO'
//! ```
//!
//! Values are written raw. Since commands are whitespace separated, a stored
//! value never contains a space, tab or newline.

use crate::storage::ShardStats;
use bytes::Bytes;
use std::fmt;

/// Reply line terminator
pub const LF: &[u8] = b"\n";

/// Placeholder sent for a missing key
pub const NIL: &[u8] = b"(nil)";

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledgement of a write: `OK`
    Ok,

    /// Answer to `PING`: `PONG`
    Pong,

    /// A stored value, written verbatim
    Value(Bytes),

    /// Key absent or expired: `(nil)`
    Nil,

    /// Aggregated counters: `hits=H misses=M evictions=E size=S`
    Stats(ShardStats),

    /// A failed command: `ERR <message>`
    Error(String),
}

impl Reply {
    /// Creates an error reply; `ERR ` is prepended on the wire.
    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// `Value` for `Some`, `Nil` for `None`.
    pub fn from_value(value: Option<Bytes>) -> Self {
        value.map_or(Reply::Nil, Reply::Value)
    }

    /// Serializes the reply, terminator included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Ok => buf.extend_from_slice(b"OK"),
            Reply::Pong => buf.extend_from_slice(b"PONG"),
            Reply::Value(data) => buf.extend_from_slice(data),
            Reply::Nil => buf.extend_from_slice(NIL),
            Reply::Stats(stats) => {
                buf.extend_from_slice(
                    format!(
                        "hits={} misses={} evictions={} size={}",
                        stats.hits, stats.misses, stats.evictions, stats.size
                    )
                    .as_bytes(),
                );
            }
            Reply::Error(msg) => {
                buf.extend_from_slice(b"ERR ");
                buf.extend_from_slice(msg.as_bytes());
            }
        }
        buf.extend_from_slice(LF);
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf.pop();
        write!(f, "{}", String::from_utf8_lossy(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_simple_replies() {
        assert_eq!(Reply::Ok.serialize(), b"OK\n");
        assert_eq!(Reply::Pong.serialize(), b"PONG\n");
        assert_eq!(Reply::Nil.serialize(), b"(nil)\n");
    }

    #[test]
    fn test_serialize_value() {
        assert_eq!(Reply::Value(Bytes::from("ariz")).serialize(), b"ariz\n");
        assert_eq!(Reply::Value(Bytes::new()).serialize(), b"\n");
    }

    #[test]
    fn test_serialize_stats() {
        let stats = ShardStats {
            hits: 2,
            misses: 1,
            evictions: 1,
            size: 2,
        };
        assert_eq!(
            Reply::Stats(stats).serialize(),
            b"hits=2 misses=1 evictions=1 size=2\n"
        );
    }

    #[test]
    fn test_serialize_error() {
        let reply = Reply::error("unknown command 'FOO'");
        assert!(reply.is_error());
        assert_eq!(reply.serialize(), b"ERR unknown command 'FOO'\n");
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Reply::from_value(None), Reply::Nil);
        assert_eq!(
            Reply::from_value(Some(Bytes::from("v"))),
            Reply::Value(Bytes::from("v"))
        );
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut buf = Vec::new();
        Reply::Ok.serialize_into(&mut buf);
        Reply::Nil.serialize_into(&mut buf);
        assert_eq!(buf, b"OK\n(nil)\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::Ok.to_string(), "OK");
        assert_eq!(Reply::error("boom").to_string(), "ERR boom");
    }
}
