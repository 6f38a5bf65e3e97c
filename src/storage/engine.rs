//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for ccdb: a map from key
//! to an entry holding either a scalar string or a list of strings, each
//! with an optional absolute expiry.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: The whole keyspace sits behind a single `Mutex`. Every
//!    operation is linearizable with respect to every other one. Sharding
//!    the map would keep the same external contract.
//! 2. **Tagged Values**: `Value` is a sum type checked at the start of each
//!    operation, so a list command on a string yields `WrongType`.
//! 3. **Lazy Expiry**: Every read path drops an expired entry before the
//!    value leaves the engine.
//! 4. **Active Expiry**: Keys carrying a TTL are also kept in an indexed
//!    set, so `sweep_expired` samples them in constant time per key, the
//!    same probabilistic cycle Redis runs.
//!
//! Callers only ever receive clones of stored values. No `.await` or I/O
//! happens while the lock is held.

use bytes::Bytes;
use indexmap::IndexSet;
use rand::seq::index;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Keys sampled per active-expiry round.
pub const ACTIVE_EXPIRE_SAMPLE: usize = 20;

/// A round that expires more than this fraction of its sample triggers another round.
pub const ACTIVE_EXPIRE_THRESHOLD: f64 = 0.25;

/// Wall-clock budget of one active-expiry cycle.
pub const ACTIVE_EXPIRE_CYCLE_BUDGET: Duration = Duration::from_millis(25);

/// Errors returned by storage operations.
///
/// A missing key is not an error: lookups report it as `None`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The key holds a value of another type
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// The stored value does not parse as a base-10 i64
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("increment or decrement would overflow")]
    Overflow,
}

/// The payload of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(Bytes),
    /// Deque for O(1) push on both ends
    List(VecDeque<Bytes>),
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry expiring `ttl` from now.
    ///
    /// A TTL too large to represent as an `Instant` means no expiry.
    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() > exp)
            .unwrap_or(false)
    }
}

/// The map plus an index of the keys that carry an expiry.
///
/// Every insert and removal goes through this type so that `volatile`
/// always holds exactly the keys whose entry has `expires_at` set.
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<Bytes, Entry>,
    volatile: IndexSet<Bytes>,
}

impl Keyspace {
    fn insert(&mut self, key: Bytes, entry: Entry) {
        if entry.expires_at.is_some() {
            self.volatile.insert(key.clone());
        } else {
            self.volatile.swap_remove(&key);
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if entry.expires_at.is_some() {
            self.volatile.swap_remove(key);
        }
        Some(entry)
    }

    /// Looks up a key, evicting it first if it has expired.
    fn live_entry(&mut self, key: &[u8]) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(Entry::is_expired) {
            self.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    /// Returns the list at `key`, creating an empty one if the key is absent.
    fn list_for_push(&mut self, key: Bytes) -> Result<&mut VecDeque<Bytes>, StorageError> {
        if self.entries.get(&key).is_some_and(Entry::is_expired) {
            self.remove(&key);
        }
        // New lists never carry an expiry, so `volatile` is unaffected
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => Ok(list),
            Value::Scalar(_) => Err(StorageError::WrongType),
        }
    }
}

/// The main storage engine for ccdb.
///
/// Designed to be wrapped in an `Arc` and shared by every connection task,
/// the expiry sweeper and the log replay.
///
/// # Example
///
/// ```
/// use ccdb::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Ok(Some(Bytes::from("Ariz"))));
/// assert_eq!(engine.get(b"missing"), Ok(None));
///
/// engine.set_with_expiry(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.exists(b"session"));
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    data: Mutex<Keyspace>,
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the keyspace. A poisoned lock still guards a consistent
    /// keyspace because no operation panics halfway through a mutation.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the scalar value for a key.
    ///
    /// Returns `Ok(None)` if the key is absent. An expired entry is removed
    /// first and then reads as absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StorageError> {
        match self.lock().live_entry(key) {
            Some(Entry {
                value: Value::Scalar(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(StorageError::WrongType),
            None => Ok(None),
        }
    }

    /// Sets a key to a scalar value, dropping any previous value and expiry.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.lock().insert(key, Entry::new(Value::Scalar(value)));
    }

    /// Sets a key to a scalar value that expires `ttl` from now.
    ///
    /// The TTL is turned into an absolute instant once, at write time.
    pub fn set_with_expiry(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.lock()
            .insert(key, Entry::with_ttl(Value::Scalar(value), ttl));
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &[u8]) -> bool {
        self.lock().live_entry(key).is_some()
    }

    /// Deletes a key of any type. Returns `false` if there was nothing to delete.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut keyspace = self.lock();
        if keyspace.live_entry(key).is_none() {
            return false;
        }
        keyspace.remove(key).is_some()
    }

    /// Increments an integer value by 1.
    ///
    /// A missing key counts as 0. The key keeps its expiry, if any.
    pub fn incr(&self, key: &[u8]) -> Result<i64, StorageError> {
        self.incr_by(key, 1)
    }

    pub fn decr(&self, key: &[u8]) -> Result<i64, StorageError> {
        self.incr_by(key, -1)
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> Result<i64, StorageError> {
        let mut keyspace = self.lock();

        let (current, expires_at) = match keyspace.live_entry(key) {
            Some(Entry {
                value: Value::Scalar(value),
                expires_at,
            }) => (parse_integer(value)?, *expires_at),
            Some(_) => return Err(StorageError::WrongType),
            None => (0, None),
        };

        let new_value = current
            .checked_add(delta)
            .ok_or(StorageError::Overflow)?;

        keyspace.insert(
            Bytes::copy_from_slice(key),
            Entry {
                value: Value::Scalar(Bytes::from(new_value.to_string())),
                expires_at,
            },
        );

        Ok(new_value)
    }

    // ========================================================================
    // LIST OPERATIONS
    // ========================================================================

    /// Pushes values one at a time to the head of a list, creating it if needed.
    ///
    /// So `LPUSH key a b c` results in `[c, b, a]`.
    ///
    /// # Returns
    /// The length of the list after the last value was pushed.
    pub fn lpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StorageError> {
        let mut keyspace = self.lock();
        let list = keyspace.list_for_push(key)?;
        for value in values {
            list.push_front(value);
        }
        Ok(list.len())
    }

    /// Pushes values to the tail of a list, creating it if needed.
    pub fn rpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StorageError> {
        let mut keyspace = self.lock();
        let list = keyspace.list_for_push(key)?;
        list.extend(values);
        Ok(list.len())
    }

    /// Returns the elements in `start..stop` with Python slice semantics.
    ///
    /// `stop` is exclusive. Negative indices count from the end of the list,
    /// and both bounds are clamped into the list. A missing key reads as an
    /// empty list.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, StorageError> {
        let mut keyspace = self.lock();
        let list = match keyspace.live_entry(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list,
            Some(_) => return Err(StorageError::WrongType),
            None => return Ok(Vec::new()),
        };

        let len = list.len() as i64;
        let start = slice_index(start, len);
        let stop = slice_index(stop, len);

        if start >= stop {
            return Ok(Vec::new());
        }

        Ok(list.range(start as usize..stop as usize).cloned().collect())
    }

    /// Returns the number of keys in the map, including expired keys that
    /// have not been reclaimed yet.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs one active-expiry cycle.
    ///
    /// Each round samples up to `ACTIVE_EXPIRE_SAMPLE` random keys among
    /// those carrying a TTL and deletes the expired ones. Rounds repeat
    /// while more than `ACTIVE_EXPIRE_THRESHOLD` of a sample was expired,
    /// until no key carries a TTL or `ACTIVE_EXPIRE_CYCLE_BUDGET` is spent.
    /// The lock is released between rounds.
    ///
    /// # Returns
    ///
    /// The number of keys removed.
    pub fn sweep_expired(&self) -> usize {
        let started = Instant::now();
        let mut rng = rand::thread_rng();
        let mut removed = 0;

        loop {
            let mut keyspace = self.lock();
            let volatile = keyspace.volatile.len();
            if volatile == 0 {
                break;
            }

            let sample: Vec<Bytes> =
                index::sample(&mut rng, volatile, ACTIVE_EXPIRE_SAMPLE.min(volatile))
                    .into_iter()
                    .filter_map(|i| keyspace.volatile.get_index(i).cloned())
                    .collect();

            let mut expired = 0;
            for key in &sample {
                if keyspace.entries.get(key).is_some_and(Entry::is_expired) {
                    keyspace.remove(key);
                    expired += 1;
                }
            }
            drop(keyspace);

            removed += expired;
            if (expired as f64) <= (sample.len() as f64) * ACTIVE_EXPIRE_THRESHOLD
                || started.elapsed() > ACTIVE_EXPIRE_CYCLE_BUDGET
            {
                break;
            }
        }

        removed
    }
}

fn parse_integer(value: &[u8]) -> Result<i64, StorageError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(StorageError::NotAnInteger)
}

/// Resolves a Python-style slice bound against a sequence of length `len`.
#[inline]
fn slice_index(index: i64, len: i64) -> i64 {
    let index = if index < 0 {
        index.saturating_add(len)
    } else {
        index
    };
    index.clamp(0, len)
}
