//! Inverted-list vector codec (spec §3, §6): `doc`, `docwp`, and `impact`
//! per-term vectors, built on [`crate::codec::vbyte`].
//!
//! Docno gaps and within-document offset gaps share one transform: each
//! gap is measured from an implicit "previous position" of `-1` (so the
//! very first gap in a sequence already accounts for position zero being
//! valid) and then stored as `gap - 1` per spec §6 ("d-gaps and
//! offset-gaps are encoded as value - 1 to reclaim the zero case"). That
//! single `gap_write`/`gap_read` pair is reused for docno gaps, the first
//! offset in a document, and subsequent offset gaps alike, rather than
//! special-casing "the first one is absolute" — it produces the same
//! bytes spec §3's table describes, and removes an asymmetry between the
//! first and later entries in both axes.

use crate::codec::vbyte;
use crate::error::{CoreError, Result};

fn gap_write(out: &mut Vec<u8>, prev: &mut i64, value: u64) {
    let gap = (value as i64 - *prev - 1) as u64;
    vbyte::write(out, gap);
    *prev = value as i64;
}

fn gap_read(bytes: &[u8], pos: usize, prev: &mut i64) -> Result<(u64, usize)> {
    let (gap, consumed) = vbyte::read(bytes, pos)?;
    let value = *prev + gap as i64 + 1;
    if value < 0 {
        return Err(CoreError::Corruption("gap decode produced negative position".into()));
    }
    *prev = value;
    Ok((value as u64, consumed))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPosting {
    pub docno: u64,
    pub f_dt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocWpPosting {
    pub docno: u64,
    pub offsets: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactBlock {
    pub score: u64,
    pub docs: Vec<DocPosting>,
}

pub fn encode_doc(out: &mut Vec<u8>, postings: &[DocPosting]) {
    let mut prev = -1i64;
    for p in postings {
        gap_write(out, &mut prev, p.docno);
        vbyte::write(out, p.f_dt);
    }
}

pub fn decode_doc(bytes: &[u8], count: usize) -> Result<(Vec<DocPosting>, usize)> {
    let mut prev = -1i64;
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let (docno, c1) = gap_read(bytes, pos, &mut prev)?;
        pos += c1;
        let (f_dt, c2) = vbyte::read(bytes, pos)?;
        pos += c2;
        out.push(DocPosting { docno, f_dt });
    }
    Ok((out, pos))
}

pub fn encode_docwp(out: &mut Vec<u8>, postings: &[DocWpPosting]) {
    let mut prev_docno = -1i64;
    for p in postings {
        gap_write(out, &mut prev_docno, p.docno);
        vbyte::write(out, p.offsets.len() as u64);
        let mut prev_offset = -1i64;
        for &off in &p.offsets {
            gap_write(out, &mut prev_offset, off);
        }
    }
}

pub fn decode_docwp(bytes: &[u8], count: usize) -> Result<(Vec<DocWpPosting>, usize)> {
    let mut prev_docno = -1i64;
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let (docno, c1) = gap_read(bytes, pos, &mut prev_docno)?;
        pos += c1;
        let (f_dt, c2) = vbyte::read(bytes, pos)?;
        pos += c2;
        let mut prev_offset = -1i64;
        let mut offsets = Vec::with_capacity(f_dt as usize);
        for _ in 0..f_dt {
            let (off, c) = gap_read(bytes, pos, &mut prev_offset)?;
            pos += c;
            offsets.push(off);
        }
        out.push(DocWpPosting { docno, offsets });
    }
    Ok((out, pos))
}

/// Blocks are impact-score-descending, but docnos within a block are
/// ascending so each block gets its own d-gap run starting fresh at `-1`.
pub fn encode_impact(out: &mut Vec<u8>, blocks: &[ImpactBlock]) {
    for block in blocks {
        vbyte::write(out, block.docs.len() as u64);
        vbyte::write(out, block.score);
        let mut prev = -1i64;
        for d in &block.docs {
            gap_write(out, &mut prev, d.docno);
            vbyte::write(out, d.f_dt);
        }
    }
}

pub fn decode_impact(bytes: &[u8], block_count: usize) -> Result<(Vec<ImpactBlock>, usize)> {
    let mut pos = 0usize;
    let mut blocks = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        let (blocksize, c1) = vbyte::read(bytes, pos)?;
        pos += c1;
        let (score, c2) = vbyte::read(bytes, pos)?;
        pos += c2;
        let mut prev = -1i64;
        let mut docs = Vec::with_capacity(blocksize as usize);
        for _ in 0..blocksize {
            let (docno, c3) = gap_read(bytes, pos, &mut prev)?;
            pos += c3;
            let (f_dt, c4) = vbyte::read(bytes, pos)?;
            pos += c4;
            docs.push(DocPosting { docno, f_dt });
        }
        blocks.push(ImpactBlock { score, docs });
    }
    Ok((blocks, pos))
}
