//! `FilePageStore`: the real-file realization of [`crate::btree::PageStore`],
//! backing the vocabulary B+Tree onto a [`super::file_family::FileFamily`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::btree::bt_bucket::PageLoc;
use crate::btree::PageStore;
use crate::error::Result;

use super::file_family::FileFamily;

/// Pages a reader has pulled off disk recently enough to still be warm.
/// Builders never read back what they just wrote, so only readers benefit;
/// the cache costs them nothing on a miss beyond one extra lock/unlock.
const PAGE_CACHE_SIZE: usize = 512;

pub struct FilePageStore {
    family: FileFamily,
    page_size: usize,
    max_filesize: u64,
    next_fileno: AtomicU32,
    next_offset: AtomicU64,
    cache: Mutex<LruCache<PageLoc, Vec<u8>>>,
}

impl FilePageStore {
    pub fn new(family: FileFamily, page_size: usize) -> Self {
        let max_filesize = family.max_filesize();
        Self {
            family,
            page_size,
            max_filesize,
            next_fileno: AtomicU32::new(0),
            next_offset: AtomicU64::new(0),
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(PAGE_CACHE_SIZE).unwrap())),
        }
    }

    /// Resume allocation after `loc`, the last page known to have been
    /// written (used when reopening a store for reads only; builders always
    /// start fresh stores).
    pub fn resume_after(family: FileFamily, page_size: usize, loc: PageLoc) -> Self {
        let store = Self::new(family, page_size);
        store
            .next_fileno
            .store(loc.fileno, Ordering::SeqCst);
        store
            .next_offset
            .store(loc.offset + page_size as u64, Ordering::SeqCst);
        store
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn max_filesize(&self) -> u64 {
        self.max_filesize
    }

    fn peek_alloc(&self) -> PageLoc {
        let fileno = self.next_fileno.load(Ordering::SeqCst);
        let offset = self.next_offset.load(Ordering::SeqCst);
        if offset + self.page_size as u64 > self.max_filesize {
            PageLoc {
                fileno: fileno + 1,
                offset: 0,
            }
        } else {
            PageLoc { fileno, offset }
        }
    }

    fn alloc_page(&mut self) -> Result<PageLoc> {
        let loc = self.peek_alloc();
        self.next_fileno.store(loc.fileno, Ordering::SeqCst);
        self.next_offset
            .store(loc.offset + self.page_size as u64, Ordering::SeqCst);
        Ok(loc)
    }

    fn write_page(&mut self, loc: PageLoc, bytes: &[u8]) -> Result<()> {
        self.family.write_at(loc.fileno, loc.offset, bytes)?;
        self.cache.lock().put(loc, bytes.to_vec());
        Ok(())
    }

    fn read_page(&self, loc: PageLoc) -> Result<Vec<u8>> {
        if let Some(hit) = self.cache.lock().get(&loc) {
            return Ok(hit.clone());
        }
        let bytes = self.family.read_at(loc.fileno, loc.offset, self.page_size)?;
        self.cache.lock().put(loc, bytes.clone());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::builder::BulkBuilder;
    use crate::btree::reader::BulkReader;
    use tempfile::tempdir;

    #[test]
    fn builds_and_reads_back_through_real_files() {
        let dir = tempdir().unwrap();
        let family = FileFamily::new(dir.path(), "vocab", 1 << 20);
        let mut store = FilePageStore::new(family, 256);

        let mut builder = BulkBuilder::new(256);
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..150)
            .map(|i| (format!("term{:04}", i).into_bytes(), vec![(i % 200) as u8; 3]))
            .collect();
        for (k, v) in &entries {
            builder.insert(&mut store, k, v).unwrap();
        }
        let root = builder.finish(&mut store).unwrap().unwrap();

        let got: Vec<_> = BulkReader::open(&store, root).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(got, entries);
    }
}
