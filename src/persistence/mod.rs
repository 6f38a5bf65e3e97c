//! Persistence Module
//!
//! Durability through an append-only file of RESP-encoded write commands.
//!
//! ```text
//!   CommandHandler ──log_command()──> AppendOnlyFile ──> ccdb.aof
//!                                                          │
//!   startup: replay() <──────────── RespParser <───────────┘
//! ```

pub mod aof;

pub use aof::{replay, AppendOnlyFile, FsyncPolicy, NoPersistence, Persistence, PersistenceError};
