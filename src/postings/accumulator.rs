//! In-RAM postings accumulator (spec §4.4): the build-side hash table from
//! term to a growing, variable-byte-encoded `docwp` vector, with per-document
//! count-byte fix-up and cosine document-weight computation.

use std::collections::HashMap;
use std::io::Write;

use crate::codec::vbyte;
use crate::error::{CoreError, Result};
use crate::tokenizer::Stopword;

struct Node {
    vec: Vec<u8>,
    /// docno this node last appeared in, or -1 if never.
    last_docno: i64,
    /// last within-document offset written, or -1 while no offset has been
    /// written for the current document yet.
    last_offset: i64,
    /// Byte offset in `vec` of the (possibly still 1-byte) count field for
    /// the document currently being accumulated; `None` once that document
    /// has been through `update_doc`.
    count_field_pos: Option<usize>,
    offsets_in_curr_doc: u64,
    docs: u64,
    occurs: u64,
}

impl Node {
    fn new() -> Self {
        Self {
            vec: Vec::new(),
            last_docno: -1,
            last_offset: -1,
            count_field_pos: None,
            offsets_in_curr_doc: 0,
            docs: 0,
            occurs: 0,
        }
    }
}

pub struct DocUpdateStats {
    pub terms: u64,
    pub distinct_terms: u64,
    pub weight: f64,
}

pub struct DumpStats {
    pub distinct_terms: u64,
}

/// Receives `(docno, term, position)` triples in docno order and produces,
/// per term, a growing `docwp`-shaped vector (spec §3) ready to be folded
/// into the vocabulary by [`crate::merge::merger::Merger`].
pub struct PostingsAccumulator {
    nodes: HashMap<Vec<u8>, Node, ahash::RandomState>,
    update_list: Vec<Vec<u8>>,
    current_docno: i64,
    doc_started: bool,
    memory_budget: usize,
    bytes_used: usize,
}

impl PostingsAccumulator {
    pub fn new(memory_budget: usize) -> Self {
        Self {
            nodes: HashMap::default(),
            update_list: Vec::new(),
            current_docno: -1,
            doc_started: false,
            memory_budget,
            bytes_used: 0,
        }
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Begin a new document. `docno` must be strictly greater than every
    /// previously seen docno (spec §4.4).
    pub fn add_doc(&mut self, docno: u64) -> Result<()> {
        if self.doc_started {
            return Err(CoreError::Inval(
                "add_doc called without a matching update_doc for the previous document".into(),
            ));
        }
        if (docno as i64) <= self.current_docno {
            return Err(CoreError::Inval(format!(
                "docno {docno} is not strictly greater than the previous docno {}",
                self.current_docno
            )));
        }
        self.current_docno = docno as i64;
        self.doc_started = true;
        Ok(())
    }

    /// Record one occurrence of `term` at `position` within the current
    /// document (positions must be strictly increasing per spec §5).
    pub fn add_word(&mut self, term: &[u8], position: u64) -> Result<()> {
        if !self.doc_started {
            return Err(CoreError::Inval("add_word called before add_doc".into()));
        }
        let docno = self.current_docno;

        // Stage the bytes to append first so a budget failure never leaves
        // the node half-mutated (spec §4.4 "partial growth is rolled back
        // when possible").
        let node_exists = self.nodes.contains_key(term);
        let first_in_doc = !node_exists || self.nodes[term].last_docno != docno;

        let mut staged = Vec::new();
        if first_in_doc {
            let prev_docno = if node_exists { self.nodes[term].last_docno } else { -1 };
            vbyte::write(&mut staged, (docno - prev_docno - 1) as u64);
            let count_field_offset = staged.len();
            vbyte::write(&mut staged, 1); // placeholder f_dt, patched in update_doc
            vbyte::write(&mut staged, (position as i64 - (-1) - 1) as u64);

            let projected = self.bytes_used + staged.len();
            if projected > self.memory_budget {
                return Err(CoreError::NoMem(format!(
                    "postings accumulator budget of {} bytes exhausted",
                    self.memory_budget
                )));
            }

            let node = self
                .nodes
                .entry(term.to_vec())
                .or_insert_with(Node::new);
            let base = node.vec.len();
            node.vec.extend_from_slice(&staged);
            node.count_field_pos = Some(base + count_field_offset);
            node.last_docno = docno;
            node.last_offset = position as i64;
            node.offsets_in_curr_doc = 1;
            node.docs += 1;
            node.occurs += 1;
            self.bytes_used += staged.len();
            self.update_list.push(term.to_vec());
        } else {
            let node = self.nodes.get_mut(term).unwrap();
            let prev_offset = node.last_offset;
            vbyte::write(&mut staged, (position as i64 - prev_offset - 1) as u64);

            let projected = self.bytes_used + staged.len();
            if projected > self.memory_budget {
                return Err(CoreError::NoMem(format!(
                    "postings accumulator budget of {} bytes exhausted",
                    self.memory_budget
                )));
            }

            node.vec.extend_from_slice(&staged);
            node.last_offset = position as i64;
            node.offsets_in_curr_doc += 1;
            node.occurs += 1;
            self.bytes_used += staged.len();
        }

        Ok(())
    }

    /// Finalise the current document: patch every touched node's `f_dt`
    /// count field and compute the document's cosine weight
    /// `sqrt(sum (1 + ln f_dt)^2)` over distinct terms.
    pub fn update_doc(&mut self) -> Result<DocUpdateStats> {
        if !self.doc_started {
            return Err(CoreError::Inval("update_doc called before add_doc".into()));
        }

        let mut terms = 0u64;
        let mut weight_sq_sum = 0f64;
        let touched = std::mem::take(&mut self.update_list);

        for term in &touched {
            let node = self.nodes.get_mut(term).expect("update_list entries always have a node");
            let f_dt = node.offsets_in_curr_doc;
            terms += f_dt;

            if f_dt > 1 {
                let pos = node.count_field_pos.expect("first-in-doc nodes always record a count position");
                let (old_count, old_len) = vbyte::read(&node.vec, pos)?;
                debug_assert_eq!(old_count, 1);
                let mut new_bytes = Vec::new();
                vbyte::write(&mut new_bytes, f_dt);
                let delta = new_bytes.len() as isize - old_len as isize;
                node.vec.splice(pos..pos + old_len, new_bytes);
                if delta > 0 {
                    self.bytes_used += delta as usize;
                }
            }

            let ln_term = 1.0 + (f_dt as f64).ln();
            weight_sq_sum += ln_term * ln_term;

            node.count_field_pos = None;
            node.offsets_in_curr_doc = 0;
        }

        self.doc_started = false;

        Ok(DocUpdateStats {
            terms,
            distinct_terms: touched.len() as u64,
            weight: weight_sq_sum.sqrt(),
        })
    }

    /// Sort terms lexicographically and write
    /// `<term_len, term, docs, occurs, last_docno, vec_len, vec_bytes>` for
    /// each to `out`, skipping stopwords. Clears all in-RAM state.
    pub fn dump(&mut self, out: &mut impl Write, stopword: &dyn Stopword) -> Result<DumpStats> {
        if self.doc_started {
            return Err(CoreError::Inval("dump called with an unfinished document".into()));
        }

        let mut terms: Vec<Vec<u8>> = self.nodes.keys().cloned().collect();
        terms.sort();

        let mut distinct_terms = 0u64;
        for term in &terms {
            if stopword.is_stopword(term) {
                continue;
            }
            let node = &self.nodes[term];
            let mut rec = Vec::new();
            vbyte::write(&mut rec, term.len() as u64);
            rec.extend_from_slice(term);
            vbyte::write(&mut rec, node.docs);
            vbyte::write(&mut rec, node.occurs);
            vbyte::write(&mut rec, (node.last_docno.max(0)) as u64);
            vbyte::write(&mut rec, node.vec.len() as u64);
            rec.extend_from_slice(&node.vec);
            out.write_all(&rec)?;
            distinct_terms += 1;
        }

        self.nodes.clear();
        self.update_list.clear();
        self.current_docno = -1;
        self.bytes_used = 0;

        Ok(DumpStats { distinct_terms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::NoStopword;

    #[test]
    fn single_document_single_occurrence() {
        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(0).unwrap();
        acc.add_word(b"hello", 0).unwrap();
        let stats = acc.update_doc().unwrap();
        assert_eq!(stats.terms, 1);
        assert_eq!(stats.distinct_terms, 1);
        assert!((stats.weight - 1.0).abs() < 1e-9); // (1+ln 1)^2 = 1
    }

    #[test]
    fn repeated_term_patches_count_and_grows_record() {
        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(5).unwrap();
        for pos in 0..200u64 {
            acc.add_word(b"common", pos).unwrap();
        }
        let stats = acc.update_doc().unwrap();
        assert_eq!(stats.terms, 200);
        assert_eq!(stats.distinct_terms, 1);

        let mut out = Vec::new();
        acc.dump(&mut out, &NoStopword).unwrap();

        let mut pos = 0;
        let (term_len, c) = vbyte::read(&out, pos).unwrap();
        pos += c;
        assert_eq!(term_len, 6);
        pos += 6;
        let (docs, c) = vbyte::read(&out, pos).unwrap();
        pos += c;
        assert_eq!(docs, 1);
        let (occurs, c) = vbyte::read(&out, pos).unwrap();
        pos += c;
        assert_eq!(occurs, 200);
        let (last_docno, c) = vbyte::read(&out, pos).unwrap();
        pos += c;
        assert_eq!(last_docno, 5);
        let (vec_len, c) = vbyte::read(&out, pos).unwrap();
        pos += c;
        assert_eq!(out.len() - pos, vec_len as usize);
    }

    #[test]
    fn dump_sorts_terms_lexicographically() {
        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(0).unwrap();
        acc.add_word(b"zebra", 0).unwrap();
        acc.add_word(b"apple", 1).unwrap();
        acc.update_doc().unwrap();

        let mut out = Vec::new();
        acc.dump(&mut out, &NoStopword).unwrap();

        let (len1, c1) = vbyte::read(&out, 0).unwrap();
        let first_term = &out[c1..c1 + len1 as usize];
        assert_eq!(first_term, b"apple");
    }

    #[test]
    fn rejects_non_increasing_docno() {
        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(3).unwrap();
        acc.update_doc().unwrap();
        assert!(acc.add_doc(3).is_err());
        assert!(acc.add_doc(2).is_err());
    }

    #[test]
    fn memory_budget_rejects_growth_without_partial_mutation() {
        let mut acc = PostingsAccumulator::new(4); // tiny budget
        acc.add_doc(0).unwrap();
        let err = acc.add_word(b"a-long-enough-term-to-overflow", 0);
        assert!(err.is_err());
        assert_eq!(acc.bytes_used(), 0);
    }
}
