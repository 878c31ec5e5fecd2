//! A *file family*: an ordered set of fixed-max-size files sharing one
//! directory and prefix (spec §6 — `vocab.N` / `list.N`), opened lazily and
//! accessed through `(fileno, offset)` pairs.
//!
//! Grounded on `motedb::storage::file_manager::FileRefManager` — reference
//! counted, lazily opened file handles behind a lock — generalized from a
//! single-path cache to a `(prefix, fileno) -> handle` cache, and narrowed
//! to the synchronous single-writer, multi-reader model spec §5 assumes (no
//! delayed-deletion ref counting is needed, since files are only ever
//! appended to during a build/merge and replaced wholesale on commit).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::Mutex;

use crate::error::{CoreError, Result};

/// A growable family of `{prefix}.{fileno}` files rooted at `dir`.
pub struct FileFamily {
    dir: PathBuf,
    prefix: String,
    max_filesize: u64,
    handles: Mutex<HashMap<u32, File>>,
    /// Read-only mmaps of files this family has opened for `read_at_mmap`.
    /// Only ever populated for files this process never writes to again
    /// (a merge's old list family, never the generation it's building), so
    /// a stale mapping is never a correctness concern.
    mmaps: Mutex<HashMap<u32, Mmap>>,
}

impl FileFamily {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, max_filesize: u64) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            max_filesize,
            handles: Mutex::new(HashMap::new()),
            mmaps: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_filesize(&self) -> u64 {
        self.max_filesize
    }

    pub fn path_for(&self, fileno: u32) -> PathBuf {
        self.dir.join(format!("{}.{}", self.prefix, fileno))
    }

    fn with_file<R>(&self, fileno: u32, create: bool, f: impl FnOnce(&mut File) -> Result<R>) -> Result<R> {
        let mut handles = self.handles.lock();
        if !handles.contains_key(&fileno) {
            let path = self.path_for(fileno);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(create)
                .open(&path)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        CoreError::FileNotFound(path.clone())
                    } else {
                        CoreError::Eio(e)
                    }
                })?;
            handles.insert(fileno, file);
        }
        let file = handles.get_mut(&fileno).unwrap();
        f(file)
    }

    pub fn write_at(&self, fileno: u32, offset: u64, bytes: &[u8]) -> Result<()> {
        self.with_file(fileno, true, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
            Ok(())
        })
    }

    pub fn read_at(&self, fileno: u32, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.with_file(fileno, false, |file| {
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf)?;
            Ok(buf)
        })
    }

    /// Read-only, mmap-backed read, for callers that only ever read a file
    /// once it's frozen (e.g. a merge's source list family). Mappings are
    /// cached per fileno for the life of the family.
    pub fn read_at_mmap(&self, fileno: u32, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut mmaps = self.mmaps.lock();
        if !mmaps.contains_key(&fileno) {
            let path = self.path_for(fileno);
            let file = OpenOptions::new().read(true).open(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CoreError::FileNotFound(path.clone())
                } else {
                    CoreError::Eio(e)
                }
            })?;
            let mmap = unsafe { Mmap::map(&file) }.map_err(CoreError::Eio)?;
            mmaps.insert(fileno, mmap);
        }
        let mmap = mmaps.get(&fileno).unwrap();
        let start = offset as usize;
        let end = start + len;
        if end > mmap.len() {
            return Err(CoreError::Eio(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read_at_mmap: range past end of file",
            )));
        }
        Ok(mmap[start..end].to_vec())
    }

    pub fn len(&self, fileno: u32) -> Result<u64> {
        self.with_file(fileno, false, |file| Ok(file.metadata()?.len()))
    }

    pub fn sync(&self, fileno: u32) -> Result<()> {
        self.with_file(fileno, false, |file| {
            file.sync_data()?;
            Ok(())
        })
    }

    /// Remove every `{prefix}.N` file up to and including `last_fileno`.
    pub fn unlink_all(&self, last_fileno: u32) -> Result<()> {
        let mut handles = self.handles.lock();
        let mut mmaps = self.mmaps.lock();
        for fileno in 0..=last_fileno {
            handles.remove(&fileno);
            mmaps.remove(&fileno);
            let path = self.path_for(fileno);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let family = FileFamily::new(dir.path(), "vocab", 1 << 20);
        family.write_at(0, 100, b"hello").unwrap();
        let back = family.read_at(0, 100, 5).unwrap();
        assert_eq!(back, b"hello");
    }

    #[test]
    fn reading_nonexistent_file_fails_with_not_found() {
        let dir = tempdir().unwrap();
        let family = FileFamily::new(dir.path(), "vocab", 1 << 20);
        assert!(family.read_at(7, 0, 4).is_err());
    }

    #[test]
    fn unlink_all_removes_files_on_disk() {
        let dir = tempdir().unwrap();
        let family = FileFamily::new(dir.path(), "vocab", 1 << 20);
        family.write_at(0, 0, b"a").unwrap();
        family.write_at(1, 0, b"b").unwrap();
        family.unlink_all(1).unwrap();
        assert!(!family.path_for(0).exists());
        assert!(!family.path_for(1).exists());
    }
}
