//! Connection Handler Module
//!
//! Manages individual client connections. Each accepted socket is served
//! by its own async task, so one slow client never blocks another.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌──────────────────────┐                │
//! │  │ Read bytes  │───>│ CommandHandler::     │                │
//! │  └─────────────┘    │   handle_buffer()    │                │
//! │         ▲           └──────────┬───────────┘                │
//! │         │                      ▼                            │
//! │         │               ┌─────────────┐                     │
//! │         └───────────────│ Send reply  │                     │
//! │                         └─────────────┘                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ccdb::commands::CommandHandler;
//! use ccdb::connection::handle_connection;
//! use ccdb::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! # async fn serve() -> std::io::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:6379").await?;
//! let handler = CommandHandler::in_memory(Arc::new(StorageEngine::new()));
//!
//! loop {
//!     let (stream, addr) = listener.accept().await?;
//!     tokio::spawn(handle_connection(stream, addr, handler.clone()));
//! }
//! # }
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, MAX_BUFFER_SIZE};
