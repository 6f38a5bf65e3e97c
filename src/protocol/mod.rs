//! RESP Protocol Implementation
//!
//! RESP is a simple, binary-safe protocol used by Redis for client-server
//! communication. This module is the codec shared by the connection loop,
//! the command-line client and the append-only log replay.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental parser for incoming RESP data
//!
//! ## Example
//!
//! ```
//! use ccdb::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
