//! Storage Engine Module
//!
//! A thread-safe key-value store with TTL support, plus the background
//! task that reclaims expired keys.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               StorageEngine                 │
//! │   Mutex<HashMap<Bytes, Entry>>              │
//! │   Entry = Scalar | List  + expires_at       │
//! └─────────────────────────────────────────────┘
//!                      ▲
//!                      │ sweep_expired() every 100ms
//!        ┌─────────────┴─────────────┐
//!        │       ExpirySweeper       │
//!        │  (Background Tokio Task)  │
//!        └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use ccdb::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//! assert_eq!(engine.rpush(Bytes::from("l"), vec![Bytes::from("a"), Bytes::from("b")]), Ok(2));
//! assert_eq!(engine.lrange(b"l", 0, 2).unwrap().len(), 2);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageError, Value};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
