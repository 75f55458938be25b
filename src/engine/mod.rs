//! The storage engine: the on-disk record format, append-only data files,
//! the file registry, the key directory, and the engine that orchestrates
//! them (§2-§5 of the design).

mod bitcask;
pub mod file;
pub mod keydir;
pub mod record;
pub mod registry;
mod time;

pub use bitcask::Engine;
pub use file::Cursor;
pub use keydir::IndexEntry;
pub use record::Record;
