//! Line Protocol Implementation
//!
//! ShardKV speaks a plain text protocol: one whitespace-separated command per
//! line in, one reply line out. It is usable straight from `nc` or `telnet`.
//!
//! ## Modules
//!
//! - `parser`: Incremental parser splitting the input stream into command
//!   lines and tokens
//! - `types`: The `Reply` enum and its wire format
//!
//! ## Example
//!
//! ```
//! use shardkv::protocol::{parse_line, Reply};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let (tokens, consumed) = parse_line(b"GET name\r\n").unwrap().unwrap();
//! assert_eq!(tokens[0], Bytes::from("GET"));
//! assert_eq!(consumed, 10);
//!
//! // Creating responses
//! let reply = Reply::Value(Bytes::from("ariz"));
//! assert_eq!(reply.serialize(), b"ariz\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{
    is_field_separator, parse_line, tokenize, LineParser, ParseError, ParseResult, MAX_LINE_LENGTH,
};
pub use types::Reply;
