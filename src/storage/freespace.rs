//! Freespace map (spec §4.9): allocates `{fileno, offset, size}` ranges for
//! inverted-list bytes across a bounded family of max-sized files.
//!
//! Grounded on the free-list-scan shape of
//! `Khanh-21522203-Drusdenx::memory::pool::MemoryPool` (a linear scan over
//! candidate blocks, no separate allocator crate), adapted from in-process
//! pointers to on-disk `(fileno, offset)` ranges and from a single flat list
//! to four selectable scan orders.

use std::collections::HashMap;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    First,
    Best,
    Worst,
    /// Size-binned: prefer a block from the smallest power-of-two bin that
    /// can still satisfy the request, scanning within the bin for the
    /// tightest fit.
    CloseFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub fileno: u32,
    pub offset: u64,
    /// Bytes actually reserved, which may exceed the requested size by up
    /// to `append_budget` (overallocation to absorb future small growth).
    pub capacity: u64,
}

#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    fileno: u32,
    offset: u64,
    size: u64,
}

fn size_bin(size: u64) -> u32 {
    size.max(1).next_power_of_two().trailing_zeros()
}

/// Tracks free blocks and the per-file append cursor across a file family
/// bounded by `max_filesize`.
pub struct FreespaceMap {
    strategy: Strategy,
    max_filesize: u64,
    append_budget: u64,
    free_blocks: Vec<FreeBlock>,
    /// Current end-of-allocated-data offset, per fileno.
    cursors: HashMap<u32, u64>,
    next_fileno: u32,
}

impl FreespaceMap {
    pub fn new(strategy: Strategy, max_filesize: u64, append_budget: u64) -> Self {
        Self {
            strategy,
            max_filesize,
            append_budget,
            free_blocks: Vec::new(),
            cursors: HashMap::new(),
            next_fileno: 0,
        }
    }

    /// Total bytes currently sitting in the free list — the true
    /// fragmentation measure, as opposed to simply-never-yet-used space at
    /// the end of the current file.
    pub fn waste(&self) -> u64 {
        self.free_blocks.iter().map(|b| b.size).sum()
    }

    /// Highest fileno this map has ever appended into, for callers that
    /// need to know how many files a commit touched (e.g. to unlink a
    /// superseded generation's file family).
    pub fn highest_fileno(&self) -> u32 {
        self.next_fileno
    }

    /// Reserve `size` bytes, preferring a recycled free block over
    /// extending a file.
    pub fn malloc(&mut self, size: u64) -> Result<Allocation> {
        if size == 0 {
            return Err(CoreError::Inval("malloc: zero-size request".into()));
        }
        if let Some(idx) = self.pick_free_block(size) {
            let block = self.free_blocks.remove(idx);
            let remainder = block.size - size;
            if remainder > 0 {
                self.free_blocks.push(FreeBlock {
                    fileno: block.fileno,
                    offset: block.offset + size,
                    size: remainder,
                });
            }
            return Ok(Allocation {
                fileno: block.fileno,
                offset: block.offset,
                capacity: size,
            });
        }
        self.append(size)
    }

    /// Return a previously allocated range to the free list.
    pub fn free(&mut self, alloc: Allocation) {
        if alloc.capacity == 0 {
            return;
        }
        self.free_blocks.push(FreeBlock {
            fileno: alloc.fileno,
            offset: alloc.offset,
            size: alloc.capacity,
        });
    }

    /// Resize an existing allocation. Grows by consuming an immediately
    /// adjacent free block when possible (the overallocation left behind by
    /// `append`'s budget is exactly such a block); otherwise frees the old
    /// range and mallocs a fresh one, and the caller is responsible for
    /// copying data into it.
    pub fn realloc(&mut self, alloc: Allocation, new_size: u64) -> Result<Allocation> {
        if new_size <= alloc.capacity {
            let freed = alloc.capacity - new_size;
            if freed > 0 {
                self.free_blocks.push(FreeBlock {
                    fileno: alloc.fileno,
                    offset: alloc.offset + new_size,
                    size: freed,
                });
            }
            return Ok(Allocation {
                fileno: alloc.fileno,
                offset: alloc.offset,
                capacity: new_size,
            });
        }

        let needed_growth = new_size - alloc.capacity;
        if let Some(idx) = self.free_blocks.iter().position(|b| {
            b.fileno == alloc.fileno
                && b.offset == alloc.offset + alloc.capacity
                && b.size >= needed_growth
        }) {
            let block = self.free_blocks.remove(idx);
            let leftover = block.size - needed_growth;
            if leftover > 0 {
                self.free_blocks.push(FreeBlock {
                    fileno: block.fileno,
                    offset: block.offset + needed_growth,
                    size: leftover,
                });
            }
            return Ok(Allocation {
                fileno: alloc.fileno,
                offset: alloc.offset,
                capacity: new_size,
            });
        }

        self.free(alloc);
        self.malloc(new_size)
    }

    fn pick_free_block(&self, size: u64) -> Option<usize> {
        let candidates = self
            .free_blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.size >= size);

        match self.strategy {
            Strategy::First => candidates.map(|(i, _)| i).next(),
            Strategy::Best => candidates.min_by_key(|(_, b)| b.size).map(|(i, _)| i),
            Strategy::Worst => candidates.max_by_key(|(_, b)| b.size).map(|(i, _)| i),
            Strategy::CloseFit => {
                let target_bin = size_bin(size);
                candidates
                    .min_by_key(|(_, b)| (size_bin(b.size).abs_diff(target_bin), b.size))
                    .map(|(i, _)| i)
            }
        }
    }

    /// Extend the current (or a fresh) file's append cursor, overallocating
    /// up to `append_budget` spare bytes and immediately registering them
    /// as a free block adjacent to the returned range.
    fn append(&mut self, size: u64) -> Result<Allocation> {
        let mut fileno = self.next_fileno;
        let mut cursor = *self.cursors.get(&fileno).unwrap_or(&0);

        if cursor + size > self.max_filesize {
            fileno += 1;
            cursor = 0;
            self.next_fileno = fileno;
        }

        let remaining_in_file = self.max_filesize - cursor - size;
        let overallocate = self.append_budget.min(remaining_in_file);
        let capacity = size + overallocate;

        self.cursors.insert(fileno, cursor + capacity);
        if overallocate > 0 {
            self.free_blocks.push(FreeBlock {
                fileno,
                offset: cursor + size,
                size: overallocate,
            });
        }

        Ok(Allocation {
            fileno,
            offset: cursor,
            capacity: size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_cursor_and_rolls_over_at_max_filesize() {
        let mut fs = FreespaceMap::new(Strategy::First, 100, 0);
        let a = fs.malloc(60).unwrap();
        assert_eq!(a, Allocation { fileno: 0, offset: 0, capacity: 60 });
        let b = fs.malloc(60).unwrap(); // doesn't fit in file 0 anymore
        assert_eq!(b.fileno, 1);
        assert_eq!(b.offset, 0);
    }

    #[test]
    fn free_then_malloc_reuses_block_first_fit() {
        let mut fs = FreespaceMap::new(Strategy::First, 1000, 0);
        let a = fs.malloc(50).unwrap();
        let b = fs.malloc(50).unwrap();
        fs.free(a);
        fs.free(b);
        assert_eq!(fs.waste(), 100);
        let c = fs.malloc(40).unwrap();
        assert_eq!(c.fileno, 0);
        assert!(fs.waste() < 100);
    }

    #[test]
    fn best_fit_picks_tightest_block() {
        let mut fs = FreespaceMap::new(Strategy::Best, 10_000, 0);
        let small = fs.malloc(20).unwrap();
        let mid = fs.malloc(60).unwrap();
        let big = fs.malloc(200).unwrap();
        fs.free(small);
        fs.free(mid);
        fs.free(big);

        let got = fs.malloc(50).unwrap();
        assert_eq!(got.offset, mid.offset);
    }

    #[test]
    fn worst_fit_picks_largest_block() {
        let mut fs = FreespaceMap::new(Strategy::Worst, 10_000, 0);
        let small = fs.malloc(20).unwrap();
        let big = fs.malloc(200).unwrap();
        fs.free(small);
        fs.free(big);

        let got = fs.malloc(10).unwrap();
        assert_eq!(got.offset, big.offset);
    }

    #[test]
    fn realloc_grows_into_adjacent_append_slack() {
        let mut fs = FreespaceMap::new(Strategy::First, 10_000, 64);
        let a = fs.malloc(10).unwrap();
        assert_eq!(a.capacity, 10);
        let grown = fs.realloc(a, 40).unwrap();
        assert_eq!(grown.offset, a.offset);
        assert_eq!(grown.capacity, 40);
    }

    #[test]
    fn realloc_shrink_frees_tail() {
        let mut fs = FreespaceMap::new(Strategy::First, 10_000, 0);
        let a = fs.malloc(100).unwrap();
        let shrunk = fs.realloc(a, 30).unwrap();
        assert_eq!(shrunk.capacity, 30);
        assert_eq!(fs.waste(), 70);
    }
}
