//! Validated Commands
//!
//! A request is turned into a [`Command`] before anything touches the
//! store. Arity and argument types are checked here, so by the time a
//! mutating command reaches the append-only log it is known to be well
//! formed.

use crate::protocol::RespValue;
use crate::storage::StorageError;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Errors reported to the client as `-` replies.
///
/// The `Display` text is exactly what goes on the wire, prefixed with the
/// error class token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The request is not an array of strings
    #[error("ERR invalid command format")]
    InvalidFormat,

    /// Holds the lowercase command name
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpireTime,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    /// `args` is already rendered as `'a' 'b'`
    #[error("ERR unknown command '{name}', with args beginning with: {args}")]
    UnknownCommand { name: String, args: String },

    #[error("ERR failed to persist command: {0}")]
    Persistence(String),
}

impl From<StorageError> for CommandError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::WrongType => CommandError::WrongType,
            StorageError::NotAnInteger => CommandError::NotAnInteger,
            StorageError::Overflow => CommandError::Overflow,
        }
    }
}

/// A parsed, validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    },
    Get(Bytes),
    Exists(Vec<Bytes>),
    Del(Vec<Bytes>),
    Incr(Bytes),
    Decr(Bytes),
    LPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    RPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    /// `stop` is inclusive, as sent by the client
    LRange {
        key: Bytes,
        start: i64,
        stop: i64,
    },
}

impl Command {
    /// Validates a request array such as `["SET", "key", "value"]`.
    pub fn from_resp(request: &RespValue) -> Result<Command, CommandError> {
        let items = match request {
            RespValue::Array(items) if !items.is_empty() => items,
            _ => return Err(CommandError::InvalidFormat),
        };

        let mut args = items
            .iter()
            .map(|item| match item {
                RespValue::BulkString(b) => Ok(b.clone()),
                RespValue::SimpleString(s) => Ok(Bytes::from(s.clone())),
                _ => Err(CommandError::InvalidFormat),
            })
            .collect::<Result<Vec<Bytes>, CommandError>>()?;

        let name = String::from_utf8_lossy(&args.remove(0)).to_uppercase();
        Self::from_args(&name, args)
    }

    /// Validates a command given its uppercase name and its arguments.
    pub fn from_args(name: &str, args: Vec<Bytes>) -> Result<Command, CommandError> {
        let command = match name {
            "PING" => match args.as_slice() {
                [] => Command::Ping(None),
                [message] => Command::Ping(Some(message.clone())),
                _ => return Err(CommandError::WrongArity("ping")),
            },
            "ECHO" => match args.as_slice() {
                [message] => Command::Echo(message.clone()),
                _ => return Err(CommandError::WrongArity("echo")),
            },
            "SET" => parse_set(&args)?,
            "GET" => match args.as_slice() {
                [key] => Command::Get(key.clone()),
                _ => return Err(CommandError::WrongArity("get")),
            },
            "EXISTS" if !args.is_empty() => Command::Exists(args),
            "EXISTS" => return Err(CommandError::WrongArity("exists")),
            "DEL" if !args.is_empty() => Command::Del(args),
            "DEL" => return Err(CommandError::WrongArity("del")),
            "INCR" => match args.as_slice() {
                [key] => Command::Incr(key.clone()),
                _ => return Err(CommandError::WrongArity("incr")),
            },
            "DECR" => match args.as_slice() {
                [key] => Command::Decr(key.clone()),
                _ => return Err(CommandError::WrongArity("decr")),
            },
            "LPUSH" | "RPUSH" => {
                if args.len() < 2 {
                    return Err(CommandError::WrongArity(if name == "LPUSH" {
                        "lpush"
                    } else {
                        "rpush"
                    }));
                }
                let mut values = args;
                let key = values.remove(0);
                if name == "LPUSH" {
                    Command::LPush { key, values }
                } else {
                    Command::RPush { key, values }
                }
            }
            "LRANGE" => match args.as_slice() {
                [key, start, stop] => Command::LRange {
                    key: key.clone(),
                    start: parse_i64(start)?,
                    stop: parse_i64(stop)?,
                },
                _ => return Err(CommandError::WrongArity("lrange")),
            },
            _ => {
                let args = args
                    .iter()
                    .map(|arg| format!("'{}'", String::from_utf8_lossy(arg)))
                    .collect::<Vec<_>>()
                    .join(" ");
                return Err(CommandError::UnknownCommand {
                    name: name.to_string(),
                    args,
                });
            }
        };

        Ok(command)
    }

    /// Whether the command mutates the store and must reach the append-only log.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del(_)
                | Command::Incr(_)
                | Command::Decr(_)
                | Command::LPush { .. }
                | Command::RPush { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Set { .. } => "SET",
            Command::Get(_) => "GET",
            Command::Exists(_) => "EXISTS",
            Command::Del(_) => "DEL",
            Command::Incr(_) => "INCR",
            Command::Decr(_) => "DECR",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LRange { .. } => "LRANGE",
        }
    }
}

/// SET key value [EX seconds | PX milliseconds]
///
/// The amount must be a positive integer, as in Redis. A fractional amount
/// such as `1.5` is `NotAnInteger` and a zero or negative one is
/// `InvalidExpireTime`, instead of being accepted as a float and expiring
/// the key at once.
fn parse_set(args: &[Bytes]) -> Result<Command, CommandError> {
    let (key, value, ttl) = match args {
        [] | [_] => return Err(CommandError::WrongArity("set")),
        [key, value] => (key, value, None),
        [key, value, option, amount] => {
            let option = String::from_utf8_lossy(option).to_uppercase();
            if option != "EX" && option != "PX" {
                return Err(CommandError::SyntaxError);
            }
            let amount = parse_i64(amount)?;
            if amount <= 0 {
                return Err(CommandError::InvalidExpireTime);
            }
            let ttl = if option == "EX" {
                Duration::from_secs(amount as u64)
            } else {
                Duration::from_millis(amount as u64)
            };
            (key, value, Some(ttl))
        }
        _ => return Err(CommandError::SyntaxError),
    };

    Ok(Command::Set {
        key: key.clone(),
        value: value.clone(),
        ttl,
    })
}

fn parse_i64(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn request(items: &[&str]) -> RespValue {
        RespValue::Array(
            items
                .iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(
            Command::from_resp(&request(&["ping"])),
            Ok(Command::Ping(None))
        );
        assert_eq!(
            Command::from_resp(&request(&["GeT", "k"])),
            Ok(Command::Get(Bytes::from("k")))
        );
    }

    #[test]
    fn test_set_variants() {
        assert_eq!(
            Command::from_args("SET", args(&["k", "v"])),
            Ok(Command::Set {
                key: Bytes::from("k"),
                value: Bytes::from("v"),
                ttl: None
            })
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "ex", "10"])),
            Ok(Command::Set {
                key: Bytes::from("k"),
                value: Bytes::from("v"),
                ttl: Some(Duration::from_secs(10))
            })
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "PX", "100"])),
            Ok(Command::Set {
                key: Bytes::from("k"),
                value: Bytes::from("v"),
                ttl: Some(Duration::from_millis(100))
            })
        );
    }

    #[test]
    fn test_set_errors() {
        assert_eq!(
            Command::from_args("SET", args(&["k"])),
            Err(CommandError::WrongArity("set"))
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "EX"])),
            Err(CommandError::SyntaxError)
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "KEEP", "10"])),
            Err(CommandError::SyntaxError)
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "EX", "ten"])),
            Err(CommandError::NotAnInteger)
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "EX", "0"])),
            Err(CommandError::InvalidExpireTime)
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "PX", "-100"])),
            Err(CommandError::InvalidExpireTime)
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "EX", "1.5"])),
            Err(CommandError::NotAnInteger)
        );
        assert_eq!(
            Command::from_args("SET", args(&["k", "v", "EX", "1", "NX"])),
            Err(CommandError::SyntaxError)
        );
    }

    #[test]
    fn test_arity_errors() {
        for (name, bad) in [
            ("PING", vec!["a", "b"]),
            ("ECHO", vec![]),
            ("GET", vec![]),
            ("EXISTS", vec![]),
            ("DEL", vec![]),
            ("INCR", vec!["a", "b"]),
            ("DECR", vec![]),
            ("LPUSH", vec!["k"]),
            ("RPUSH", vec!["k"]),
            ("LRANGE", vec!["k", "0"]),
        ] {
            assert!(
                matches!(
                    Command::from_args(name, args(&bad)),
                    Err(CommandError::WrongArity(n)) if n == name.to_lowercase()
                ),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_lrange_bounds_must_be_integers() {
        assert_eq!(
            Command::from_args("LRANGE", args(&["k", "zero", "1"])),
            Err(CommandError::NotAnInteger)
        );
        assert_eq!(
            Command::from_args("LRANGE", args(&["k", "0", "-1"])),
            Ok(Command::LRange {
                key: Bytes::from("k"),
                start: 0,
                stop: -1
            })
        );
    }

    #[test]
    fn test_unknown_command_echoes_args() {
        let err = Command::from_resp(&request(&["flushall", "async", "now"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ERR unknown command 'FLUSHALL', with args beginning with: 'async' 'now'"
        );
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            Command::from_resp(&RespValue::integer(1)),
            Err(CommandError::InvalidFormat)
        );
        assert_eq!(
            Command::from_resp(&RespValue::array(vec![])),
            Err(CommandError::InvalidFormat)
        );
        assert_eq!(
            Command::from_resp(&RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("GET")),
                RespValue::integer(1),
            ])),
            Err(CommandError::InvalidFormat)
        );
    }

    #[test]
    fn test_write_classification() {
        let writes = [
            request(&["SET", "k", "v"]),
            request(&["DEL", "k"]),
            request(&["INCR", "k"]),
            request(&["DECR", "k"]),
            request(&["LPUSH", "k", "v"]),
            request(&["RPUSH", "k", "v"]),
        ];
        let reads = [
            request(&["PING"]),
            request(&["ECHO", "x"]),
            request(&["GET", "k"]),
            request(&["EXISTS", "k"]),
            request(&["LRANGE", "k", "0", "1"]),
        ];
        for r in &writes {
            assert!(Command::from_resp(r).unwrap().is_write());
        }
        for r in &reads {
            assert!(!Command::from_resp(r).unwrap().is_write());
        }
    }
}
