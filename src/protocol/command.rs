//! Line-protocol request parsing (§4.H): one newline-terminated,
//! space-separated line becomes a `Command`, with per-verb arity
//! validation distinct from an unknown-verb error (§7).

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    /// The raw pattern argument; only `*` is interpreted by the server,
    /// anything else is rejected at dispatch (§6).
    Keys(String),
    Get(Vec<u8>),
    Set { key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration> },
    Del(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    UnknownCommand(String),
    WrongArgs(&'static str),
    InvalidDuration(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownCommand(verb) => write!(f, "unknown command '{verb}'"),
            ProtocolError::WrongArgs(verb) => write!(f, "wrong number of arguments for '{verb}' command"),
            ProtocolError::InvalidDuration(arg) => write!(f, "invalid duration '{arg}'"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Parses one line of input (without its trailing newline) into a
/// `Command`.
pub fn parse(line: &str) -> Result<Command, ProtocolError> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match verb.to_ascii_uppercase().as_str() {
        "PING" => {
            if args.len() > 1 {
                return Err(ProtocolError::WrongArgs("PING"));
            }
            Ok(Command::Ping)
        }
        "KEYS" => {
            if args.len() != 1 {
                return Err(ProtocolError::WrongArgs("KEYS"));
            }
            Ok(Command::Keys(args[0].to_string()))
        }
        "GET" => {
            if args.len() != 1 {
                return Err(ProtocolError::WrongArgs("GET"));
            }
            Ok(Command::Get(args[0].as_bytes().to_vec()))
        }
        "SET" => {
            if args.len() != 2 && args.len() != 3 {
                return Err(ProtocolError::WrongArgs("SET"));
            }
            let ttl = match args.get(2) {
                Some(raw) => Some(Duration::from_millis(
                    raw.parse::<u64>().map_err(|_| ProtocolError::InvalidDuration(raw.to_string()))?,
                )),
                None => None,
            };
            Ok(Command::Set { key: args[0].as_bytes().to_vec(), value: args[1].as_bytes().to_vec(), ttl })
        }
        "DEL" => {
            if args.len() != 1 {
                return Err(ProtocolError::WrongArgs("DEL"));
            }
            Ok(Command::Del(args[0].as_bytes().to_vec()))
        }
        _ => Err(ProtocolError::UnknownCommand(verb.to_string())),
    }
}
