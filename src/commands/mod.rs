//! Command Processing Module
//!
//! Receives decoded RESP requests, validates them, appends writes to the
//! log and executes them against the storage engine.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Validate     │──> Persistence (writes only)
//! │  - Apply        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds]`, `GET key`
//! - `EXISTS key [key ...]`, `DEL key [key ...]`
//! - `INCR key`, `DECR key`
//! - `LPUSH key value [value ...]`, `RPUSH key value [value ...]`
//! - `LRANGE key start stop`

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::{encode_command, CommandHandler};
