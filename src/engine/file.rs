//! A single append-only data file (§3, §4.B): positional reads that never
//! block on the append mutex, a serialized append path, and a full
//! sequential scan used by startup replay.

use crate::engine::record::Record;
use crate::error::{Error, Result};

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const DATA_FILE_EXT: &str = "data";

/// Locates one record within one data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub offset: u64,
    pub size: u64,
}

/// A monotonic, time-seeded id generator (§9): each id is
/// `max(now_millis, last_id + 1)`, so ids strictly increase within a
/// process even when files are created faster than the clock ticks.
static NEXT_ID: AtomicI64 = AtomicI64::new(0);

fn next_file_id() -> u64 {
    let now = crate::engine::time::unix_millis();
    loop {
        let last = NEXT_ID.load(Ordering::SeqCst);
        let candidate = now.max(last + 1);
        if NEXT_ID
            .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return candidate as u64;
        }
    }
}

/// One data file on disk, plus its append cursor. The active file is
/// writable (`writer` is `true`); sealed files are read-only and reject
/// `append` with `Error::Sealed`.
pub struct DataFile {
    id: u64,
    path: PathBuf,
    file: File,
    writable: bool,
    head: Mutex<u64>,
}

impl DataFile {
    /// Creates a new data file under `base_path`, named `<id>.data`, open
    /// for both positional reads and appends.
    pub fn create(base_path: &Path) -> Result<Self> {
        let id = next_file_id();
        let path = base_path.join(format!("{id}.{DATA_FILE_EXT}"));

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        #[cfg(unix)]
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))?;

        Ok(Self { id, path, file, writable: true, head: Mutex::new(0) })
    }

    /// Opens an existing data file read-only; the id is parsed from the
    /// filename and the head is set to the current file size.
    pub fn open(path: &Path) -> Result<Self> {
        let id = parse_file_id(path)?;
        let file = OpenOptions::new().read(true).open(path)?;
        let head = file.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            writable: false,
            head: Mutex::new(head),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn head(&self) -> u64 {
        *self.head.lock()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Reads and decodes the record at `cursor`.
    pub fn read(&self, cursor: Cursor) -> Result<Record> {
        let mut buf = vec![0u8; cursor.size as usize];
        read_at_exact(&self.file, &mut buf, cursor.offset)?;
        Record::decode(&buf)
    }

    /// Encodes and appends `record`, advancing the head under the per-file
    /// mutex. Returns the cursor for the region just written.
    pub fn append(&self, record: &Record) -> Result<Cursor> {
        if !self.writable {
            return Err(Error::Sealed(self.id));
        }

        let data = record.encode();
        let mut head = self.head.lock();
        let offset = *head;
        write_at_exact(&self.file, &data, offset)?;
        *head += data.len() as u64;

        Ok(Cursor { offset, size: data.len() as u64 })
    }

    /// Streams every record from offset 0 to the current head, invoking
    /// `f(record, cursor)` for each. Stops at head, when `f` returns
    /// `Ok(false)`, or when a decode error is hit (in which case the scan
    /// stops quietly, previously-visited records remain valid). I/O
    /// errors propagate.
    pub fn scan<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Record, Cursor) -> Result<bool>,
    {
        let head = self.head();
        let mut reader = BufReader::new(ReaderAt::new(&self.file));
        let mut offset = 0u64;

        while offset < head {
            match Record::decode_stream(&mut reader) {
                Ok(None) => break,
                Ok(Some((record, size))) => {
                    let cursor = Cursor { offset, size: size as u64 };
                    offset += size as u64;
                    if !f(record, cursor)? {
                        break;
                    }
                }
                Err(err) if err.is_corruption() => {
                    log::warn!(
                        "stopping scan of {} at offset {offset}: {err}",
                        self.path.display()
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Flushes the file to disk. Sealed files are never written to, so this
    /// is a no-op for them beyond the syscall itself.
    pub fn close(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// A sequential `Read` adapter over a file's positional-read API, used so
/// `Record::decode_stream` can be driven without a second file handle or a
/// seek that would race with concurrent appends.
struct ReaderAt<'a> {
    file: &'a File,
    pos: u64,
}

impl<'a> ReaderAt<'a> {
    fn new(file: &'a File) -> Self {
        Self { file, pos: 0 }
    }
}

impl std::io::Read for ReaderAt<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = read_at(self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

fn parse_file_id(path: &Path) -> Result<u64> {
    let invalid = || Error::InvalidFilename(format!("{}", path.display()));

    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
    let ext = path.extension().and_then(|s| s.to_str()).ok_or_else(invalid)?;
    if ext != DATA_FILE_EXT {
        return Err(invalid());
    }

    stem.parse::<u64>().map_err(|_| invalid())
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Like `read_at`, but loops across short reads to fill `buf` exactly
/// (stopping only at a genuine EOF, which callers here treat as
/// `MalformedRecord` since every caller already knows the declared size).
fn read_at_exact(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut total = 0;
    while total < buf.len() {
        let n = read_at(file, &mut buf[total..], offset + total as u64)?;
        if n == 0 {
            return Err(Error::MalformedRecord(format!(
                "short read at offset {}: got {total} of {} bytes",
                offset,
                buf.len()
            )));
        }
        total += n;
    }
    Ok(())
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

fn write_at_exact(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    let mut total = 0;
    while total < buf.len() {
        let n = write_at(file, &buf[total..], offset + total as u64)?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole record",
            )));
        }
        total += n;
    }
    Ok(())
}
