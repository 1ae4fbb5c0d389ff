//! Incremental Line Parser
//!
//! Commands arrive as one text line each, terminated by `\n` or `\r\n`, with
//! fields separated by spaces, tabs or stray carriage returns:
//!
//! ```text
//! SET user:101 ariz\r\n
//! SETEX session 60 token\n
//! ```
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((tokens, consumed)))` - A complete command line; the caller
//!   advances its buffer by `consumed` bytes
//! - `Ok(None)` - No complete line yet, read more data
//! - `Err(ParseError)` - The pending line is longer than
//!   [`MAX_LINE_LENGTH`]; the connection should be closed
//!
//! Blank lines are consumed silently as part of the next command.
//!
//! Tokens are sub-slices of one `Bytes` copy of the line, so a command costs
//! a single allocation however many fields it has.

use bytes::Bytes;
use thiserror::Error;

/// Longest accepted line, terminator excluded (64 KiB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Errors that can occur while parsing command lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line, complete or still arriving, is over the length limit
    #[error("line too long: {len} bytes (max: {max})")]
    LineTooLong { len: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// An incremental command line parser.
///
/// Remembers how far it has already searched for a terminator, so feeding
/// a slowly growing buffer does not rescan it from the start. Pass the same
/// buffer (with new data appended) until a line is returned.
///
/// # Example
///
/// ```
/// use shardkv::protocol::LineParser;
/// use bytes::Bytes;
///
/// let mut parser = LineParser::new();
///
/// assert_eq!(parser.parse(b"GET na").unwrap(), None);
///
/// let (tokens, consumed) = parser.parse(b"GET name\r\n").unwrap().unwrap();
/// assert_eq!(tokens, vec![Bytes::from("GET"), Bytes::from("name")]);
/// assert_eq!(consumed, 10);
/// ```
#[derive(Debug, Default)]
pub struct LineParser {
    /// Bytes at the front of the buffer known to contain no `\n`
    scanned: usize,
}

impl LineParser {
    pub fn new() -> Self {
        Self { scanned: 0 }
    }

    /// Attempts to parse one command line from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let mut line_start = 0;

        loop {
            let from = self.scanned.max(line_start).min(buf.len());

            let newline = match buf[from..].iter().position(|&b| b == b'\n') {
                Some(pos) => from + pos,
                None => {
                    let pending = buf.len() - line_start;
                    if pending > MAX_LINE_LENGTH {
                        self.scanned = 0;
                        return Err(ParseError::LineTooLong {
                            len: pending,
                            max: MAX_LINE_LENGTH,
                        });
                    }
                    self.scanned = buf.len();
                    return Ok(None);
                }
            };

            let consumed = newline + 1;
            let line = strip_cr(&buf[line_start..newline]);

            if line.len() > MAX_LINE_LENGTH {
                self.scanned = 0;
                return Err(ParseError::LineTooLong {
                    len: line.len(),
                    max: MAX_LINE_LENGTH,
                });
            }

            let tokens = tokenize(line);
            if tokens.is_empty() {
                line_start = consumed;
                continue;
            }

            self.scanned = 0;
            return Ok(Some((tokens, consumed)));
        }
    }
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Bytes that separate fields, on the wire and in the persistence files.
///
/// Every other byte can appear in a key or value.
#[inline]
pub fn is_field_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r')
}

/// Splits a line on runs of separator bytes.
pub fn tokenize(line: &[u8]) -> Vec<Bytes> {
    if line.iter().all(|&b| is_field_separator(b)) {
        return Vec::new();
    }

    let line = Bytes::copy_from_slice(line);
    line.split(|&b| is_field_separator(b))
        .filter(|field| !field.is_empty())
        .map(|field| line.slice_ref(field))
        .collect()
}

/// Parses a single command line from `buf` with a fresh parser.
pub fn parse_line(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    LineParser::new().parse(buf)
}
