//! Command Dispatcher
//!
//! Turns a decoded request into a reply. Every request goes through the
//! same three steps:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  validate   │───>│ log (write) │───>│    apply    │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                            │                  │             │
//! │                            ▼                  ▼             │
//! │                      Persistence        StorageEngine       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A write is appended to the log only after validation succeeds, and it
//! is applied only after the append succeeds. Writes hold one lock across
//! both steps, so the log order is the order in which writes reach the
//! store.

use crate::commands::{Command, CommandError};
use crate::persistence::{NoPersistence, Persistence};
use crate::protocol::{parse_message, ParseResult, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, trace};

/// Dispatches commands to the storage engine.
///
/// Cloning is cheap; all clones share the same store, log and write lock.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    persistence: Arc<dyn Persistence>,
    /// Serializes log-then-apply for writes
    write_lock: Arc<Mutex<()>>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            storage,
            persistence,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A handler whose writes are not logged anywhere.
    pub fn in_memory(storage: Arc<StorageEngine>) -> Self {
        Self::new(storage, Arc::new(NoPersistence))
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a request and returns the reply.
    ///
    /// Failures are reported as RESP error values, never as `Err`.
    pub fn execute(&self, request: RespValue) -> RespValue {
        match self.dispatch(&request) {
            Ok(reply) => reply,
            Err(e) => RespValue::error(e.to_string()),
        }
    }

    /// Decodes one request from the front of `buf` and executes it.
    ///
    /// Returns the encoded reply and the number of bytes consumed, or
    /// `None` if `buf` does not yet hold a complete request.
    pub fn handle_buffer(&self, buf: &[u8]) -> ParseResult<Option<(Vec<u8>, usize)>> {
        match parse_message(buf)? {
            Some((request, consumed)) => Ok(Some((self.execute(request).serialize(), consumed))),
            None => Ok(None),
        }
    }

    fn dispatch(&self, request: &RespValue) -> Result<RespValue, CommandError> {
        let command = Command::from_resp(request)?;
        trace!(command = command.name(), "Executing command");

        if !command.is_write() {
            return self.apply(command);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.persistence.log_command(request) {
            error!(command = command.name(), error = %e, "Failed to append to the log");
            return Err(CommandError::Persistence(e.to_string()));
        }
        self.apply(command)
    }

    fn apply(&self, command: Command) -> Result<RespValue, CommandError> {
        let reply = match command {
            Command::Ping(None) => RespValue::pong(),
            Command::Ping(Some(message)) => RespValue::bulk_string(message),
            Command::Echo(message) => RespValue::bulk_string(message),

            Command::Set { key, value, ttl } => {
                match ttl {
                    Some(ttl) => self.storage.set_with_expiry(key, value, ttl),
                    None => self.storage.set(key, value),
                }
                RespValue::ok()
            }

            Command::Get(key) => match self.storage.get(&key)? {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },

            Command::Exists(keys) => {
                let count = keys.iter().filter(|k| self.storage.exists(k)).count();
                RespValue::integer(count as i64)
            }

            Command::Del(keys) => {
                let count = keys.iter().filter(|k| self.storage.delete(k)).count();
                RespValue::integer(count as i64)
            }

            Command::Incr(key) => RespValue::integer(self.storage.incr(&key)?),
            Command::Decr(key) => RespValue::integer(self.storage.decr(&key)?),

            Command::LPush { key, values } => {
                RespValue::integer(self.storage.lpush(key, values)? as i64)
            }
            Command::RPush { key, values } => {
                RespValue::integer(self.storage.rpush(key, values)? as i64)
            }

            Command::LRange { key, start, stop } => {
                // Client bounds are inclusive; -1 means the last element
                let stop = if stop == -1 {
                    i64::MAX
                } else {
                    stop.saturating_add(1)
                };
                let items = self.storage.lrange(&key, start, stop)?;
                RespValue::array(items.into_iter().map(RespValue::bulk_string).collect())
            }
        };

        Ok(reply)
    }
}

/// Encodes a line typed at a prompt as a request array.
///
/// Words are split on whitespace and each becomes a bulk string, so
/// `SET k v` becomes `*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n`.
pub fn encode_command(line: &str) -> RespValue {
    RespValue::array(
        line.split_whitespace()
            .map(|word| RespValue::bulk_string(Bytes::copy_from_slice(word.as_bytes())))
            .collect(),
    )
}
