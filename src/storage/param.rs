//! The `param` file (spec §6): a single fixed-size page holding the index
//! superblock. Committing a build or merge is, from the reader's
//! perspective, nothing more than atomically rewriting this one file.

use crate::config::StorageParams;
use crate::error::{CoreError, Result};

const MAGIC: [u8; 4] = *b"IXC1";
const VERSION: u32 = 1;

/// Corpus-wide aggregates a scoring function needs (`N`, `avgdl`, …) that
/// aren't per-term and so don't belong in the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub docs: u64,
    pub occurs: u64,
    pub total_doc_length: u64,
}

impl IndexStats {
    pub fn avg_doc_length(&self) -> f64 {
        if self.docs == 0 {
            0.0
        } else {
            self.total_doc_length as f64 / self.docs as f64
        }
    }
}

/// The superblock: everything a reader needs to open the index without
/// scanning anything else first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub storage: StorageParams,
    pub stats: IndexStats,
    pub root_fileno: u32,
    pub root_offset: u64,
    pub vectors_count: u64,
    pub vocab_files_count: u32,
}

impl Superblock {
    pub const ENCODED_LEN: usize =
        4 + 4 + StorageParams::ENCODED_LEN + 8 * 3 + 4 + 8 + 8 + 4 + 4; // + crc32 trailer

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&self.storage.to_bytes());
        out.extend_from_slice(&self.stats.docs.to_be_bytes());
        out.extend_from_slice(&self.stats.occurs.to_be_bytes());
        out.extend_from_slice(&self.stats.total_doc_length.to_be_bytes());
        out.extend_from_slice(&self.root_fileno.to_be_bytes());
        out.extend_from_slice(&self.root_offset.to_be_bytes());
        out.extend_from_slice(&self.vectors_count.to_be_bytes());
        out.extend_from_slice(&self.vocab_files_count.to_be_bytes());
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(CoreError::Corruption("param file truncated".into()));
        }
        let body = &buf[..buf.len() - 4];
        let stored_crc = u32::from_be_bytes(buf[buf.len() - 4..].try_into().unwrap());
        if crc32fast::hash(body) != stored_crc {
            return Err(CoreError::Corruption("param file checksum mismatch".into()));
        }

        if buf[0..4] != MAGIC {
            return Err(CoreError::Corruption("param file bad magic".into()));
        }
        let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(CoreError::Corruption(format!(
                "param file version {version} unsupported"
            )));
        }

        let mut pos = 8;
        let storage = StorageParams::from_bytes(&buf[pos..pos + StorageParams::ENCODED_LEN])?;
        pos += StorageParams::ENCODED_LEN;

        let docs = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let occurs = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let total_doc_length = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;

        let root_fileno = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let root_offset = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let vectors_count = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let vocab_files_count = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());

        Ok(Self {
            storage,
            stats: IndexStats {
                docs,
                occurs,
                total_doc_length,
            },
            root_fileno,
            root_offset,
            vectors_count,
            vocab_files_count,
        })
    }

    pub fn read(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::FileNotFound(path.to_path_buf())
            } else {
                CoreError::Eio(e)
            }
        })?;
        Self::from_bytes(&bytes)
    }

    /// Write via a temp file + rename so a reader never observes a
    /// partially-written superblock (spec §5 "name-based atomic swaps").
    pub fn write_atomic(&self, path: &std::path::Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_bytes())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
