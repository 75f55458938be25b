//! The file registry (§4.C): owns every data file belonging to the store
//! and tracks which single one is active. Modeled as an id-keyed map plus a
//! separate `active` pointer, per the §9 redesign (the active handle is
//! never stored under a second key).

use crate::engine::file::{DataFile, DATA_FILE_EXT};
use crate::error::{Error, Result};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Inner {
    files: HashMap<u64, Arc<DataFile>>,
    active: u64,
}

pub struct FileRegistry {
    base_path: PathBuf,
    inner: RwLock<Inner>,
}

impl FileRegistry {
    /// Creates a registry rooted at `base_path` with a freshly created
    /// active file. Does not discover sealed files; call `discover` for
    /// that.
    pub fn new(base_path: &Path) -> Result<Self> {
        let active_file = DataFile::create(base_path)?;
        let active_id = active_file.id();

        let mut files = HashMap::with_capacity(1);
        files.insert(active_id, Arc::new(active_file));

        Ok(Self {
            base_path: base_path.to_path_buf(),
            inner: RwLock::new(Inner { files, active: active_id }),
        })
    }

    pub fn get_active(&self) -> Arc<DataFile> {
        let inner = self.inner.read();
        inner.files.get(&inner.active).expect("active file always registered").clone()
    }

    /// Makes `file` the active file, registering it by its own id.
    pub fn set_active(&self, file: DataFile) {
        let id = file.id();
        let mut inner = self.inner.write();
        inner.files.insert(id, Arc::new(file));
        inner.active = id;
    }

    pub fn get(&self, id: u64) -> Option<Arc<DataFile>> {
        self.inner.read().files.get(&id).cloned()
    }

    /// Registers a non-active (sealed) file.
    pub fn register(&self, file: DataFile) -> Result<()> {
        let id = file.id();
        let mut inner = self.inner.write();
        if inner.files.contains_key(&id) {
            return Err(Error::DuplicateFileId(id));
        }
        inner.files.insert(id, Arc::new(file));
        Ok(())
    }

    /// Drops a file from the registry. The caller is responsible for having
    /// closed it first.
    pub fn remove(&self, id: u64) -> Option<Arc<DataFile>> {
        self.inner.write().files.remove(&id)
    }

    /// Scans the base directory for `.data` files other than the active
    /// one, opens each read-only, and registers it. Duplicate ids fail the
    /// whole discovery.
    pub fn discover(&self) -> Result<()> {
        let active_path = self.get_active().path().to_path_buf();

        for entry in std::fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() || path == active_path {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(DATA_FILE_EXT) {
                continue;
            }

            let file = DataFile::open(&path)?;
            self.register(file)?;
        }

        Ok(())
    }

    /// Invokes `f` on every registered file in ascending id order (the id
    /// carries the creation-time ordering startup replay relies on).
    pub fn scan_ordered<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&DataFile) -> Result<()>,
    {
        let mut files: Vec<Arc<DataFile>> = self.inner.read().files.values().cloned().collect();
        files.sort_by_key(|file| file.id());

        for file in &files {
            f(file)?;
        }

        Ok(())
    }

    /// Closes every registered file, joining errors rather than stopping at
    /// the first one.
    pub fn close(&self) -> Result<()> {
        let files: Vec<Arc<DataFile>> =
            std::mem::take(&mut self.inner.write().files).into_values().collect();

        let mut first_err = None;
        for file in files {
            if let Err(err) = file.close() {
                log::error!("failed to close data file {}: {err}", file.id());
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
