//! The engine (§4.E): the only surface the network layer consumes. Wires
//! together the registry, the key directory, and the codec, and owns the
//! locking discipline of §5.

use crate::engine::file::{Cursor, DataFile};
use crate::engine::keydir::{IndexEntry, KeyDir};
use crate::engine::record::Record;
use crate::engine::registry::FileRegistry;
use crate::engine::time::{unix_millis, unix_millis_with_expiration};
use crate::error::{Error, Result};

use fs4::FileExt;
use parking_lot::RwLock;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const LOCK_FILE_NAME: &str = ".lock";

/// An open Bitcask-style store rooted at one base directory.
///
/// `Get`/`Set`/`Delete`/`Keys` take the engine's barrier lock in shared
/// mode; `Close` and the startup index rebuild take it exclusive, so the
/// store is never visible to callers mid-rebuild (§9).
pub struct Engine {
    /// Barrier against `Close`/index-rebuild; not used to serialize normal
    /// point operations against each other (those are already serialized at
    /// finer grain by the registry, the per-file append mutex, and the key
    /// directory).
    barrier: RwLock<()>,
    registry: FileRegistry,
    keydir: KeyDir,
    /// Exclusive advisory lock on the base directory, held for the
    /// lifetime of the engine so a second process can't open the same path
    /// concurrently (§4.B, §9).
    advisory_lock: std::fs::File,
    closed: AtomicBool,
}

impl Engine {
    /// Opens (creating if necessary) a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        #[cfg(unix)]
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))?;

        let advisory_lock = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path.join(LOCK_FILE_NAME))?;
        advisory_lock.try_lock_exclusive().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!("database at {} is already open by another process", path.display()),
            ))
        })?;

        log::info!("Opening database {}", path.display());

        let registry = FileRegistry::new(path)?;
        registry.discover()?;

        let engine =
            Self { barrier: RwLock::new(()), registry, keydir: KeyDir::new(), advisory_lock, closed: AtomicBool::new(false) };

        {
            let _guard = engine.barrier.write();
            engine.rebuild_index()?;
        }

        log::info!("Indexed {} live keys in {}", engine.keydir.len(), path.display());
        Ok(engine)
    }

    /// Replays every registered file in ascending id order, restoring
    /// invariant (3) of §3: the last action recorded for any key reflects
    /// the most recent on-disk state.
    fn rebuild_index(&self) -> Result<()> {
        self.registry.scan_ordered(|file| {
            let file_id = file.id();
            file.scan(|record, cursor| {
                let now = unix_millis();
                if record.is_tombstone() || record.is_expired_at(now) {
                    self.keydir.remove(&record.key);
                } else {
                    self.keydir.insert(IndexEntry {
                        file_id,
                        created: record.created,
                        expired: record.expired,
                        key: record.key,
                        cursor,
                    });
                }
                Ok(true)
            })
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Returns the live value for `key`, or `KeyNotFound` if absent,
    /// tombstoned, expired, or corrupted on disk.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_open()?;
        let _guard = self.barrier.read();

        let entry = self.keydir.find(key).ok_or(Error::KeyNotFound)?;

        let file = self.registry.get(entry.file_id).ok_or(Error::KeyNotFound)?;
        let record = match file.read(entry.cursor) {
            Ok(record) => record,
            Err(err) if err.is_corruption() => {
                log::warn!("dropping corrupted record for key: {err}");
                self.keydir.remove(key);
                return Err(Error::KeyNotFound);
            }
            Err(err) => return Err(err),
        };

        let now = unix_millis();
        if record.is_tombstone() || record.is_expired_at(now) {
            self.keydir.remove(key);
            return Err(Error::KeyNotFound);
        }

        Ok(record.value)
    }

    /// Stores `value` under `key`, expiring after `ttl` if given (`None` or
    /// zero means no expiry). Fails `InvalidSize` for an empty key or
    /// value.
    pub fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.check_open()?;
        if key.is_empty() {
            return Err(Error::InvalidSize("key must not be empty".into()));
        }
        if value.is_empty() {
            return Err(Error::InvalidSize("value must not be empty".into()));
        }

        let _guard = self.barrier.read();

        let (created, expired) = unix_millis_with_expiration(ttl);
        let record = Record::new(created, expired, key.to_vec(), value.to_vec());

        let active = self.registry.get_active();
        let cursor: Cursor = active.append(&record)?;

        self.keydir.insert(IndexEntry {
            file_id: active.id(),
            created,
            expired,
            key: key.to_vec(),
            cursor,
        });

        Ok(())
    }

    /// Appends a tombstone for `key` and removes it from the directory.
    /// Idempotent: deleting an absent key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        let _guard = self.barrier.read();

        let created = unix_millis();
        let tombstone = Record::tombstone(created, key.to_vec());

        let active = self.registry.get_active();
        active.append(&tombstone)?;

        self.keydir.remove(key);
        Ok(())
    }

    /// A snapshot of every live, non-expired key.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.check_open()?;
        let _guard = self.barrier.read();
        Ok(self.keydir.keys())
    }

    /// Drops the key directory, closes every file in the registry, and
    /// releases the advisory lock. Idempotent: a second call is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.barrier.write();
        self.keydir.clear();
        let result = self.registry.close();
        if let Err(err) = FileExt::unlock(&self.advisory_lock) {
            log::warn!("failed to release advisory lock: {err}");
        }

        if let Err(err) = &result {
            log::error!("error closing engine: {err}");
        }
        result
    }
}

/// Best-effort close on drop, matching the engine's explicit `Close` but
/// never panicking: any error is logged, not propagated.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("failed to close engine on drop: {err}");
        }
    }
}
