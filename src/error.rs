//! Crate-wide error taxonomy.
//!
//! A single hand-rolled enum, not a derive-macro error type: the engine only
//! needs to distinguish a handful of kinds and attach just enough context to
//! log usefully, and every caller across the protocol boundary collapses the
//! detail down to a handful of RESP-like responses anyway.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Empty key or empty value passed to `Set`.
    InvalidSize(String),
    /// Key absent, tombstoned, or expired at read time.
    KeyNotFound,
    /// A record's stored CRC does not match the recomputed one.
    ChecksumMismatch(String),
    /// A record's header or body could not be parsed from its bytes.
    MalformedRecord(String),
    /// A directory entry claiming to be a data file has an unparsable name.
    InvalidFilename(String),
    /// Discovery found two data files claiming the same id.
    DuplicateFileId(u64),
    /// An append was attempted against a sealed (read-only) data file.
    Sealed(u64),
    /// Underlying storage failure.
    Io(std::io::Error),
    /// Use-after-close on the engine, a data file, or a scan.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSize(ctx) => write!(f, "invalid size: {ctx}"),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::ChecksumMismatch(ctx) => write!(f, "checksum mismatch: {ctx}"),
            Error::MalformedRecord(ctx) => write!(f, "malformed record: {ctx}"),
            Error::InvalidFilename(ctx) => write!(f, "invalid data file name: {ctx}"),
            Error::DuplicateFileId(id) => write!(f, "duplicate data file id {id}"),
            Error::Sealed(id) => write!(f, "data file {id} is sealed"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Closed => write!(f, "use after close"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl Error {
    /// True for the corruption-shaped errors that GET downgrades to
    /// `KeyNotFound` rather than surfacing to the caller (§7).
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::ChecksumMismatch(_) | Error::MalformedRecord(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
