//! Vocabulary Record codec (spec §3 "Vocabulary entry", §6 "Vocabulary leaf
//! payload"): the per-term record stored in a vocabulary B+Tree leaf,
//! describing where and how one term's posting list is stored.
//!
//! A term with more than one vector type (e.g. both `doc` and `impact`)
//! simply has its records concatenated in leaf-payload order; this module
//! only encodes/decodes a single record.

use crate::codec::vbyte;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorType {
    Doc,
    DocWp,
    Impact,
}

impl VectorType {
    fn tag(self) -> u64 {
        match self {
            VectorType::Doc => 0,
            VectorType::DocWp => 1,
            VectorType::Impact => 2,
        }
    }

    fn from_tag(tag: u64) -> Result<Self> {
        match tag {
            0 => Ok(VectorType::Doc),
            1 => Ok(VectorType::DocWp),
            2 => Ok(VectorType::Impact),
            other => Err(CoreError::Corruption(format!("unknown vector type tag {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// The vector's bytes follow inline in the vocabulary leaf.
    Inline(Vec<u8>),
    /// The vector's bytes live in a list file at `fileno`/`offset`, with
    /// `capacity` bytes reserved (may exceed the vector's own encoded size;
    /// see `storage::freespace`'s overallocation budget).
    File { capacity: u64, fileno: u32, offset: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabEntry {
    /// Opaque caller-defined attribute bitfield (spec §3); the core never
    /// interprets these bits.
    pub attr_kind: u64,
    pub vtype: VectorType,
    /// Encoded byte length of the vector payload.
    pub size: u64,
    pub docs: u64,
    pub occurs: u64,
    pub last_docno: u64,
    pub location: Location,
}

impl VocabEntry {
    pub fn encode(&self, out: &mut Vec<u8>) {
        vbyte::write(out, self.attr_kind);
        vbyte::write(out, self.vtype.tag());
        vbyte::write(out, self.size);
        vbyte::write(out, self.docs);
        vbyte::write(out, self.occurs);
        vbyte::write(out, self.last_docno);
        match &self.location {
            Location::Inline(bytes) => {
                vbyte::write(out, 0);
                out.extend_from_slice(bytes);
            }
            Location::File { capacity, fileno, offset } => {
                vbyte::write(out, 1);
                vbyte::write(out, *capacity);
                vbyte::write(out, *fileno as u64);
                vbyte::write(out, *offset);
            }
        }
    }

    /// Decode one record starting at `bytes[pos]`. Returns the record and
    /// the number of bytes consumed.
    pub fn decode(bytes: &[u8], pos: usize) -> Result<(Self, usize)> {
        let mut cursor = pos;
        let (attr_kind, c) = vbyte::read(bytes, cursor)?;
        cursor += c;
        let (vtype_tag, c) = vbyte::read(bytes, cursor)?;
        cursor += c;
        let vtype = VectorType::from_tag(vtype_tag)?;
        let (size, c) = vbyte::read(bytes, cursor)?;
        cursor += c;
        let (docs, c) = vbyte::read(bytes, cursor)?;
        cursor += c;
        let (occurs, c) = vbyte::read(bytes, cursor)?;
        cursor += c;
        let (last_docno, c) = vbyte::read(bytes, cursor)?;
        cursor += c;
        let (location_tag, c) = vbyte::read(bytes, cursor)?;
        cursor += c;

        let location = match location_tag {
            0 => {
                let end = cursor + size as usize;
                if end > bytes.len() {
                    return Err(CoreError::Corruption("inline vector payload truncated".into()));
                }
                let inline = bytes[cursor..end].to_vec();
                cursor = end;
                Location::Inline(inline)
            }
            1 => {
                let (capacity, c) = vbyte::read(bytes, cursor)?;
                cursor += c;
                let (fileno, c) = vbyte::read(bytes, cursor)?;
                cursor += c;
                let (offset, c) = vbyte::read(bytes, cursor)?;
                cursor += c;
                Location::File {
                    capacity,
                    fileno: fileno as u32,
                    offset,
                }
            }
            other => return Err(CoreError::Corruption(format!("unknown location tag {other}"))),
        };

        Ok((
            Self {
                attr_kind,
                vtype,
                size,
                docs,
                occurs,
                last_docno,
                location,
            },
            cursor - pos,
        ))
    }
}
