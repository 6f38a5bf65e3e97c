//! # ccdb - A Redis-Compatible In-Memory Datastore
//!
//! ccdb speaks RESP over TCP, keeps its data in memory and makes writes
//! durable through an append-only file that is replayed at startup.
//!
//! ## Features
//!
//! - **Redis-Compatible**: RESP framing, so `redis-cli` and Redis client
//!   libraries can talk to it
//! - **Strings and Lists**: each key holds a byte string or a list of them
//! - **TTL Support**: `SET ... EX|PX` with lazy and active expiry
//! - **Durability**: write commands are logged before they are applied
//! - **Async I/O**: one Tokio task per client
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                ccdb                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │──> AppendOnlyFile│
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────────────────────┐  │
//! │                     │ RESP Parser │    │       StorageEngine         │  │
//! │                     └─────────────┘    │ Mutex<HashMap<Bytes,Entry>> │  │
//! │                                        └─────────────────────────────┘  │
//! │                                                       ▲                 │
//! │                                  ┌────────────────────┴──────────────┐  │
//! │                                  │  ExpirySweeper (Tokio task)       │  │
//! │                                  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use ccdb::commands::CommandHandler;
//! use ccdb::connection::handle_connection;
//! use ccdb::persistence::{replay, AppendOnlyFile, FsyncPolicy};
//! use ccdb::storage::{start_expiry_sweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!
//!     // Rebuild the dataset, then start appending to the same file
//!     replay("ccdb.aof", &storage)?;
//!     let aof = Arc::new(AppendOnlyFile::open("ccdb.aof", FsyncPolicy::No)?);
//!
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let handler = CommandHandler::new(storage, aof);
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(stream, addr, handler.clone()));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value model, encoder and incremental parser
//! - [`storage`]: Thread-safe storage engine with TTL support
//! - [`commands`]: Validation and dispatch of client commands
//! - [`persistence`]: Append-only file and replay
//! - [`connection`]: Client connection management
//!
//! ## Lazy + Active Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: every access checks the deadline and removes a dead key
//! 2. **Active**: a background task samples random keys and reclaims the
//!    expired ones, repeating while many of the sample were dead

pub mod commands;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{encode_command, CommandHandler};
pub use connection::handle_connection;
pub use persistence::{replay, AppendOnlyFile, FsyncPolicy, NoPersistence, Persistence};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port ccdb listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host ccdb binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default append-only file, relative to the working directory
pub const DEFAULT_AOF_FILE: &str = "ccdb.aof";

/// Version of ccdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
