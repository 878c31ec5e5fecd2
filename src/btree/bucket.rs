//! Bucket: a fixed-size byte page holding a sorted directory of (key, value)
//! records (spec §4.2, §3 "Page / Bucket").
//!
//! Layout, all multi-byte integers big-endian:
//! ```text
//! [count:2 | ptr_1:2 len_1:2 | ptr_2:2 len_2:2 | ... | free | ... | record_N | ... | record_1]
//! ```
//! The directory grows from the low address upward; records are packed from
//! the high address downward. Directory pointers are absolute byte offsets
//! into the page. Directory entries are kept in ascending key order so a
//! binary search over the directory does double duty as a key search.
//!
//! Two storage strategies:
//! - `Variable`: a record is `[key_len:u16][key bytes][value bytes]`, and the
//!   directory's `len` field is the record's *total* byte length.
//! - `Fixed { value_size }`: a record is `[key bytes][value bytes]` with
//!   `value_size` implied bucket-wide, and the directory's `len` field is
//!   just the key length.
//!
//! Grounded on the page-directory-plus-packed-area shape of
//! `motedb::index::btree::Page`, generalized to variable-length keyed
//! records with two storage strategies instead of one fixed `u64` schema.

use crate::error::{CoreError, Result};

const COUNT_FIELD_LEN: usize = 2;
const DIR_ENTRY_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Variable-size value bodies; the directory stores total record length.
    Variable,
    /// All records share one value size; the directory stores key length.
    Fixed { value_size: u16 },
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOutcome {
    /// Inserted; call succeeded.
    Inserted,
    /// The record would fit in an empty bucket of this capacity but there
    /// is not enough free space right now — caller should `split` and retry.
    NoSpace,
    /// The record cannot fit in any bucket of this capacity, full stop.
    TooBig,
}

#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    pub capacity: usize,
    pub entries: usize,
    pub utilised: usize,
    pub strings: usize,
    pub overhead: usize,
    pub unused: usize,
}

/// A fixed-capacity page. Owns its bytes; capacity must be `< 2^16` so every
/// in-page offset fits a `u16`.
#[derive(Debug, Clone)]
pub struct Bucket {
    buf: Vec<u8>,
    capacity: u16,
    strategy: Strategy,
}

impl Bucket {
    pub fn new(capacity: usize, strategy: Strategy) -> Result<Self> {
        if capacity >= 1 << 16 {
            return Err(CoreError::Inval(format!(
                "bucket capacity {capacity} must be < 65536"
            )));
        }
        let mut buf = vec![0u8; capacity];
        buf[0..2].copy_from_slice(&0u16.to_be_bytes());
        Ok(Self {
            buf,
            capacity: capacity as u16,
            strategy,
        })
    }

    pub fn from_bytes(buf: Vec<u8>, strategy: Strategy) -> Result<Self> {
        if buf.len() >= 1 << 16 {
            return Err(CoreError::Inval("bucket buffer too large".into()));
        }
        let capacity = buf.len() as u16;
        Ok(Self {
            buf,
            capacity,
            strategy,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn entries(&self) -> usize {
        u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize
    }

    fn set_entries(&mut self, n: usize) {
        self.buf[0..2].copy_from_slice(&(n as u16).to_be_bytes());
    }

    fn dir_offset(&self, i: usize) -> usize {
        COUNT_FIELD_LEN + i * DIR_ENTRY_LEN
    }

    fn dir_entry(&self, i: usize) -> (u16, u16) {
        let off = self.dir_offset(i);
        let ptr = u16::from_be_bytes([self.buf[off], self.buf[off + 1]]);
        let len = u16::from_be_bytes([self.buf[off + 2], self.buf[off + 3]]);
        (ptr, len)
    }

    fn set_dir_entry(&mut self, i: usize, ptr: u16, len: u16) {
        let off = self.dir_offset(i);
        self.buf[off..off + 2].copy_from_slice(&ptr.to_be_bytes());
        self.buf[off + 2..off + 4].copy_from_slice(&len.to_be_bytes());
    }

    /// Start of the free area (end of the directory).
    fn dir_end(&self) -> usize {
        self.dir_offset(self.entries())
    }

    /// Start of the packed record area (lowest address currently occupied
    /// by record bytes), i.e. the high-water mark from the top.
    fn data_start(&self) -> usize {
        (0..self.entries())
            .map(|i| self.dir_entry(i).0 as usize)
            .min()
            .unwrap_or(self.capacity())
    }

    fn free_space(&self) -> usize {
        self.data_start().saturating_sub(self.dir_end())
    }

    /// Bytes a record with this key/value would occupy in the packed area.
    fn record_len(&self, key_len: usize, value_len: usize) -> usize {
        match self.strategy {
            Strategy::Variable => 2 + key_len + value_len,
            Strategy::Fixed { value_size } => key_len + value_size as usize,
        }
    }

    fn key_at_record(&self, ptr: usize, len: usize) -> &[u8] {
        match self.strategy {
            Strategy::Variable => {
                let key_len = u16::from_be_bytes([self.buf[ptr], self.buf[ptr + 1]]) as usize;
                &self.buf[ptr + 2..ptr + 2 + key_len]
            }
            Strategy::Fixed { value_size } => {
                let key_len = len - value_size as usize;
                &self.buf[ptr..ptr + key_len]
            }
        }
    }

    fn value_at_record(&self, ptr: usize, len: usize) -> &[u8] {
        match self.strategy {
            Strategy::Variable => {
                let key_len = u16::from_be_bytes([self.buf[ptr], self.buf[ptr + 1]]) as usize;
                let value_start = ptr + 2 + key_len;
                &self.buf[value_start..ptr + len]
            }
            Strategy::Fixed { value_size } => {
                let key_len = len - value_size as usize;
                &self.buf[ptr + key_len..ptr + len]
            }
        }
    }

    /// Zero-copy read of the i-th (key, value) pair.
    pub fn term_at(&self, i: usize) -> (&[u8], &[u8]) {
        let (ptr, len) = self.dir_entry(i);
        (
            self.key_at_record(ptr as usize, len as usize),
            self.value_at_record(ptr as usize, len as usize),
        )
    }

    /// Binary search for `key`. Returns `Ok(index)` on exact match or
    /// `Err(index)` for the insertion position that keeps keys sorted.
    fn bsearch(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        let n = self.entries();
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (ptr, len) = self.dir_entry(mid);
            let mid_key = self.key_at_record(ptr as usize, len as usize);
            match mid_key.cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Pointer to the value for `key`, and its length, else not-found.
    pub fn find(&self, key: &[u8]) -> Option<&[u8]> {
        match self.bsearch(key) {
            Ok(i) => Some(self.term_at(i).1),
            Err(_) => None,
        }
    }

    /// Index of the greatest entry `<= key` (used for insertion-position and
    /// descent computations). Returns `None` if every key is greater.
    pub fn search(&self, key: &[u8]) -> Option<usize> {
        match self.bsearch(key) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    /// Reserve space for a new (key, value) at its sorted position.
    pub fn alloc(&mut self, key: &[u8], value: &[u8]) -> Result<AllocOutcome> {
        if key.len() > u16::MAX as usize {
            return Err(CoreError::TooBig("key exceeds 65535 bytes".into()));
        }
        let needed = self.record_len(key.len(), value.len());
        let empty_capacity = self.capacity() - COUNT_FIELD_LEN - DIR_ENTRY_LEN;
        if needed > empty_capacity {
            return Ok(AllocOutcome::TooBig);
        }

        let idx = match self.bsearch(key) {
            Ok(i) => {
                // Key exists: treat as an update via realloc in place.
                return self.realloc_at(i, value).map(|_| AllocOutcome::Inserted);
            }
            Err(i) => i,
        };

        if needed + DIR_ENTRY_LEN > self.free_space() {
            return Ok(AllocOutcome::NoSpace);
        }

        // Shift directory entries after idx right by one slot.
        let n = self.entries();
        for i in (idx..n).rev() {
            let (ptr, len) = self.dir_entry(i);
            self.set_dir_entry(i + 1, ptr, len);
        }

        let new_ptr = self.data_start() - needed;
        self.write_record(new_ptr, key, value);
        self.set_dir_entry(idx, new_ptr as u16, needed as u16);
        self.set_entries(n + 1);

        Ok(AllocOutcome::Inserted)
    }

    fn write_record(&mut self, ptr: usize, key: &[u8], value: &[u8]) {
        match self.strategy {
            Strategy::Variable => {
                self.buf[ptr..ptr + 2].copy_from_slice(&(key.len() as u16).to_be_bytes());
                self.buf[ptr + 2..ptr + 2 + key.len()].copy_from_slice(key);
                self.buf[ptr + 2 + key.len()..ptr + 2 + key.len() + value.len()]
                    .copy_from_slice(value);
            }
            Strategy::Fixed { value_size } => {
                debug_assert_eq!(value.len(), value_size as usize);
                self.buf[ptr..ptr + key.len()].copy_from_slice(key);
                self.buf[ptr + key.len()..ptr + key.len() + value.len()].copy_from_slice(value);
            }
        }
    }

    /// Grow/shrink the value in place at `index`, shifting the data area;
    /// preserves key order.
    pub fn realloc_at(&mut self, index: usize, new_value: &[u8]) -> Result<()> {
        let n = self.entries();
        if index >= n {
            return Err(CoreError::NotFound(format!("bucket index {index}")));
        }
        let (ptr, len) = self.dir_entry(index);
        let key: Vec<u8> = self.key_at_record(ptr as usize, len as usize).to_vec();
        let new_len = self.record_len(key.len(), new_value.len());
        let delta = new_len as isize - len as isize;

        if delta > 0 && delta as usize > self.free_space() {
            return Err(CoreError::TooBig(
                "realloc_at: no room to grow record in place".into(),
            ));
        }

        // Remove the old record's directory slot logically, compact the data
        // area, then re-insert the grown/shrunk record. This keeps the
        // packed area contiguous without a generalized memmove of arbitrary
        // overlapping ranges.
        let old_ptr = ptr as usize;
        let old_len = len as usize;
        self.remove_at_keep_dir(index);
        self.compact_from(old_ptr, old_len);

        let new_ptr = self.data_start() - new_len;
        self.write_record(new_ptr, &key, new_value);

        // Re-insert the directory slot at `index` (entries were shifted left
        // by `remove_at_keep_dir`, so `index` is now a valid insertion point).
        let n_after_remove = self.entries();
        for i in (index..n_after_remove).rev() {
            let (p, l) = self.dir_entry(i);
            self.set_dir_entry(i + 1, p, l);
        }
        self.set_dir_entry(index, new_ptr as u16, new_len as u16);
        self.set_entries(n_after_remove + 1);

        Ok(())
    }

    /// Remove the directory slot at `index` (shifting later slots left) but
    /// leave the packed data area untouched; used internally by
    /// `realloc_at`, which immediately compacts.
    fn remove_at_keep_dir(&mut self, index: usize) {
        let n = self.entries();
        for i in index..n - 1 {
            let (p, l) = self.dir_entry(i + 1);
            self.set_dir_entry(i, p, l);
        }
        self.set_entries(n - 1);
    }

    /// Slide every record whose pointer is below `removed_ptr` up by
    /// `removed_len` bytes, closing the hole left by a removed record.
    fn compact_from(&mut self, removed_ptr: usize, removed_len: usize) {
        let n = self.entries();
        let mut moves = Vec::with_capacity(n);
        for i in 0..n {
            let (ptr, len) = self.dir_entry(i);
            if (ptr as usize) < removed_ptr {
                moves.push((i, ptr as usize, len as usize));
            }
        }
        for (i, ptr, len) in moves {
            let new_ptr = ptr + removed_len;
            self.buf.copy_within(ptr..ptr + len, new_ptr);
            self.set_dir_entry(i, new_ptr as u16, len as u16);
        }
        // zero the vacated low region for cleanliness (not load-bearing)
        for b in &mut self.buf[removed_ptr..removed_ptr + removed_len] {
            *b = 0;
        }
    }

    /// Remove by key.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        match self.bsearch(key) {
            Ok(i) => self.remove_at(i),
            Err(_) => Err(CoreError::NotFound("bucket remove: key absent".into())),
        }
    }

    /// Remove by index, compacting the directory and the data area.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        let n = self.entries();
        if index >= n {
            return Err(CoreError::NotFound(format!("bucket index {index}")));
        }
        let (ptr, len) = self.dir_entry(index);
        self.remove_at_keep_dir(index);
        self.compact_from(ptr as usize, len as usize);
        Ok(())
    }

    /// In-order iteration over (key, value) pairs.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        (0..self.entries()).map(move |i| self.term_at(i))
    }

    /// Move the last `entries - k` entries to `dst`, preserving key order
    /// (dst must be empty).
    pub fn split(&mut self, dst: &mut Bucket, k: usize) -> Result<()> {
        if dst.entries() != 0 {
            return Err(CoreError::Inval("split target must be empty".into()));
        }
        let n = self.entries();
        if k > n {
            return Err(CoreError::Inval("split point beyond entry count".into()));
        }
        for i in k..n {
            let (key, value) = self.term_at(i);
            let (key, value) = (key.to_vec(), value.to_vec());
            match dst.alloc(&key, &value)? {
                AllocOutcome::Inserted => {}
                other => {
                    return Err(CoreError::NoMem(format!(
                        "split: destination bucket rejected entry: {other:?}"
                    )))
                }
            }
        }
        // Remove the moved entries from self, highest index first so
        // indices stay valid.
        for i in (k..n).rev() {
            self.remove_at(i)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> BucketStats {
        let entries = self.entries();
        let overhead = COUNT_FIELD_LEN + entries * DIR_ENTRY_LEN;
        let mut utilised = 0usize;
        let mut strings = 0usize;
        for i in 0..entries {
            let (key, value) = self.term_at(i);
            strings += key.len();
            utilised += value.len();
        }
        let data_overhead = match self.strategy {
            Strategy::Variable => entries * 2, // key_len prefix per record
            Strategy::Fixed { .. } => 0,
        };
        let unused = self
            .capacity()
            .saturating_sub(overhead + strings + utilised + data_overhead);
        BucketStats {
            capacity: self.capacity(),
            entries,
            utilised,
            strings,
            overhead: overhead + data_overhead,
            unused,
        }
    }

    /// Finds the split index and side such that the shortest key within
    /// `range` bytes of the half-way data split is pushed up (prefix-B-tree
    /// heuristic, spec §4.2 `find_split_entry`). `range` bounds how far from
    /// the midpoint we're willing to look for a shorter-than-neighbors key.
    pub fn find_split_entry(&self, range: usize) -> usize {
        let n = self.entries();
        if n <= 1 {
            return n / 2;
        }
        let mid = n / 2;
        let lo = mid.saturating_sub(range).max(1);
        let hi = (mid + range).min(n - 1);
        let mut best = mid;
        let mut best_len = self.term_at(mid).0.len();
        for i in lo..=hi {
            let len = self.term_at(i).0.len();
            if len < best_len {
                best_len = len;
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_iterate_preserves_order() {
        let mut b = Bucket::new(8192, Strategy::Variable).unwrap();
        assert_eq!(b.alloc(b"banana", &[0x01, 0x02, 0x03]).unwrap(), AllocOutcome::Inserted);
        assert_eq!(b.alloc(b"apple", &[]).unwrap(), AllocOutcome::Inserted);
        assert_eq!(b.alloc(b"cherry", &[0x04]).unwrap(), AllocOutcome::Inserted);

        let keys: Vec<&[u8]> = b.iter_in_order().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"apple".as_slice(), b"banana", b"cherry"]);

        let stats = b.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.utilised, 4);
        assert_eq!(
            stats.unused + stats.utilised + stats.overhead + stats.strings,
            stats.capacity
        );
    }

    #[test]
    fn find_and_search() {
        let mut b = Bucket::new(512, Strategy::Variable).unwrap();
        b.alloc(b"a", b"1").unwrap();
        b.alloc(b"m", b"2").unwrap();
        b.alloc(b"z", b"3").unwrap();

        assert_eq!(b.find(b"m"), Some(b"2".as_slice()));
        assert_eq!(b.find(b"x"), None);

        assert_eq!(b.search(b"n").map(|i| b.term_at(i).0.to_vec()), Some(b"m".to_vec()));
        assert_eq!(b.search(b"0"), None); // before the first key
    }

    #[test]
    fn remove_compacts_correctly() {
        let mut b = Bucket::new(512, Strategy::Variable).unwrap();
        b.alloc(b"a", b"11").unwrap();
        b.alloc(b"b", b"222").unwrap();
        b.alloc(b"c", b"3").unwrap();

        b.remove(b"b").unwrap();
        let keys: Vec<&[u8]> = b.iter_in_order().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"c"]);
        assert_eq!(b.find(b"a"), Some(b"11".as_slice()));
        assert_eq!(b.find(b"c"), Some(b"3".as_slice()));
    }

    #[test]
    fn realloc_grows_and_shrinks_in_place() {
        let mut b = Bucket::new(512, Strategy::Variable).unwrap();
        b.alloc(b"a", b"1").unwrap();
        b.alloc(b"b", b"2").unwrap();
        b.alloc(b"c", b"3").unwrap();

        let idx = b.search(b"b").unwrap();
        b.realloc_at(idx, b"22222").unwrap();
        assert_eq!(b.find(b"b"), Some(b"22222".as_slice()));
        assert_eq!(b.find(b"a"), Some(b"1".as_slice()));
        assert_eq!(b.find(b"c"), Some(b"3".as_slice()));

        let idx = b.search(b"b").unwrap();
        b.realloc_at(idx, b"x").unwrap();
        assert_eq!(b.find(b"b"), Some(b"x".as_slice()));
    }

    #[test]
    fn split_preserves_key_order_across_both_buckets() {
        let mut b = Bucket::new(1024, Strategy::Variable).unwrap();
        for k in [b"a", b"b", b"c", b"d", b"e"] {
            b.alloc(k, b"v").unwrap();
        }
        let mut dst = Bucket::new(1024, Strategy::Variable).unwrap();
        b.split(&mut dst, 3).unwrap();

        let left: Vec<&[u8]> = b.iter_in_order().map(|(k, _)| k).collect();
        let right: Vec<&[u8]> = dst.iter_in_order().map(|(k, _)| k).collect();
        assert_eq!(left, vec![b"a".as_slice(), b"b", b"c"]);
        assert_eq!(right, vec![b"d".as_slice(), b"e"]);
    }

    #[test]
    fn toobig_when_record_cannot_fit_any_empty_bucket() {
        let mut b = Bucket::new(32, Strategy::Variable).unwrap();
        let huge_value = vec![0u8; 100];
        assert_eq!(b.alloc(b"k", &huge_value).unwrap(), AllocOutcome::TooBig);
    }

    #[test]
    fn fixed_strategy_round_trips() {
        let mut b = Bucket::new(512, Strategy::Fixed { value_size: 8 }).unwrap();
        b.alloc(b"alpha", &8u64.to_be_bytes()).unwrap();
        b.alloc(b"beta", &16u64.to_be_bytes()).unwrap();
        assert_eq!(b.find(b"alpha"), Some(8u64.to_be_bytes().as_slice()));
        assert_eq!(b.find(b"beta"), Some(16u64.to_be_bytes().as_slice()));
    }
}
