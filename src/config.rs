//! Configuration: the on-disk `storage_params` header (spec §6) plus the
//! build/merge/query tuning knobs layered on top of it.
//!
//! Modeled on `motedb::config`: small, `Serialize`/`Deserialize`, doc-commented
//! structs with a sensible `Default`, rather than a free-floating constants
//! module.

use serde::{Deserialize, Serialize};

/// Magic bytes identifying a `param` file belonging to this engine.
pub const PARAM_MAGIC: u32 = 0x4958_4331; // "IXC1"
pub const PARAM_VERSION: u32 = 1;

/// The 20-byte packed, big-endian `storage_params` record from spec §6:
/// `pagesize:u32, max_termlen:u16, max_filesize:u32, vocab_lsize:u16,
/// file_lsize:u32, btleaf_strategy:u8, btnode_strategy:u8, bigendian:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Bucket page size in bytes. Must be < 2^16 so in-page offsets fit a u16.
    pub pagesize: u32,
    /// Maximum accepted term length in bytes.
    pub max_termlen: u16,
    /// Maximum size in bytes of any single `index.N` / `vocab.N` file.
    pub max_filesize: u32,
    /// Record-body strategy for vocabulary leaves (1 = variable, 2 = fixed).
    pub vocab_lsize: u16,
    /// Record-body strategy width hint for fixed-size list files, if any.
    pub file_lsize: u32,
    pub btleaf_strategy: u8,
    pub btnode_strategy: u8,
    pub bigendian: u8,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            pagesize: 8192,
            max_termlen: 50,
            max_filesize: 1 << 30,
            vocab_lsize: 1,
            file_lsize: 1,
            btleaf_strategy: 1,
            btnode_strategy: 2,
            bigendian: 1,
        }
    }
}

impl StorageParams {
    pub const ENCODED_LEN: usize = 20;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.pagesize.to_be_bytes());
        buf[4..6].copy_from_slice(&self.max_termlen.to_be_bytes());
        buf[6..10].copy_from_slice(&self.max_filesize.to_be_bytes());
        buf[10..12].copy_from_slice(&self.vocab_lsize.to_be_bytes());
        buf[12..16].copy_from_slice(&self.file_lsize.to_be_bytes());
        buf[16] = self.btleaf_strategy;
        buf[17] = self.btnode_strategy;
        buf[18] = self.bigendian;
        buf[19] = 0; // reserved/padding
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> crate::Result<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(crate::CoreError::Corruption(
                "storage_params record truncated".into(),
            ));
        }
        Ok(Self {
            pagesize: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            max_termlen: u16::from_be_bytes(buf[4..6].try_into().unwrap()),
            max_filesize: u32::from_be_bytes(buf[6..10].try_into().unwrap()),
            vocab_lsize: u16::from_be_bytes(buf[10..12].try_into().unwrap()),
            file_lsize: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            btleaf_strategy: buf[16],
            btnode_strategy: buf[17],
            bigendian: buf[18],
        })
    }
}

/// Query-side and build-side tuning knobs that sit above the fixed on-disk
/// layout. Defaults are tuned to make the literal scenarios in spec §8
/// behave sensibly on small corpora.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub storage: StorageParams,

    /// Maximum number of live accumulators the query evaluator may hold at
    /// once (spec §4.6 `accumulator_limit`).
    pub accumulator_limit: usize,

    /// Upper bound, in bytes, on posting lists opened as in-memory
    /// `ListSource`s rather than buffered disk sources (spec §4.6).
    pub list_memory_budget: usize,

    /// Number of postings processed between THRESHOLD re-estimates
    /// (spec §4.6 "every *rethresh* postings").
    pub rethresh_interval: usize,

    /// Default number of results returned by a search when the caller does
    /// not specify `len`.
    pub default_page_len: usize,

    /// Spare bytes `FreespaceMap::malloc` overallocates past a fresh
    /// append, registered immediately as a free block so a list that grows
    /// slightly on a later merge can often grow in place (spec §4.9).
    pub list_append_budget: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage: StorageParams::default(),
            accumulator_limit: 20_000,
            list_memory_budget: 4 * 1024 * 1024,
            rethresh_interval: 256,
            default_page_len: 10,
            list_append_budget: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_params_round_trip() {
        let p = StorageParams::default();
        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), StorageParams::ENCODED_LEN);
        let back = StorageParams::from_bytes(&bytes).unwrap();
        assert_eq!(p, back);
    }
}
