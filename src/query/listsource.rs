//! ListSource (spec §4.6): a uniform lazy sequence over one term's decoded
//! doc-with-positions postings, regardless of whether the backing bytes
//! were already resident (inline / selected for the in-memory group) or had
//! to be fetched from a list file (the "buffered disk source" group).
//!
//! Both variants decode eagerly on construction — the distinction the
//! planner cares about is *where the bytes come from* and *when the read
//! happens* (in disk-location order, to minimise seeking), not whether
//! decoding itself is streamed.

use crate::error::Result;
use crate::postings::list_codec::{decode_docwp, DocWpPosting};
use crate::postings::{Location, VocabEntry};
use crate::storage::FileFamily;

pub trait ListSource {
    fn term(&self) -> &[u8];

    /// Total postings in the list (`f_t`).
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance and return the next posting, or `None` once exhausted.
    fn next(&mut self) -> Option<&DocWpPosting>;

    /// Peek the current posting without consuming it.
    fn peek(&self) -> Option<&DocWpPosting>;
}

struct BufferedListSource {
    term: Vec<u8>,
    postings: Vec<DocWpPosting>,
    pos: usize,
}

impl BufferedListSource {
    fn from_bytes(term: &[u8], entry: &VocabEntry, bytes: &[u8]) -> Result<Self> {
        let (postings, _) = decode_docwp(bytes, entry.docs as usize)?;
        Ok(Self {
            term: term.to_vec(),
            postings,
            pos: 0,
        })
    }
}

impl ListSource for BufferedListSource {
    fn term(&self) -> &[u8] {
        &self.term
    }

    fn len(&self) -> u64 {
        self.postings.len() as u64
    }

    fn next(&mut self) -> Option<&DocWpPosting> {
        if self.pos >= self.postings.len() {
            return None;
        }
        let item = &self.postings[self.pos];
        self.pos += 1;
        Some(item)
    }

    fn peek(&self) -> Option<&DocWpPosting> {
        self.postings.get(self.pos)
    }
}

/// Open a list whose bytes are already in hand (the vocabulary's `Inline`
/// location, or a list the planner decided to pull fully into the
/// in-memory group up front).
pub fn open_inline(term: &[u8], entry: &VocabEntry) -> Result<Box<dyn ListSource>> {
    let bytes = match &entry.location {
        Location::Inline(bytes) => bytes.clone(),
        Location::File { .. } => {
            return Err(crate::error::CoreError::Inval(
                "open_inline called on a file-backed vocabulary entry".into(),
            ))
        }
    };
    Ok(Box::new(BufferedListSource::from_bytes(term, entry, &bytes)?))
}

/// Open a list by reading its bytes from a list-file family — the
/// "buffered disk source" path. The read happens once, here, so the
/// planner's disk-location ordering of these calls is what actually
/// controls seek order.
pub fn open_from_disk(term: &[u8], entry: &VocabEntry, lists: &FileFamily) -> Result<Box<dyn ListSource>> {
    let bytes = match &entry.location {
        Location::Inline(bytes) => bytes.clone(),
        Location::File { fileno, offset, .. } => lists.read_at(*fileno, *offset, entry.size as usize)?,
    };
    Ok(Box::new(BufferedListSource::from_bytes(term, entry, &bytes)?))
}

/// A synthetic in-memory list produced by the phrase/AND resolver (spec
/// §4.7): zero-gap offsets, built directly from already-decoded postings
/// rather than from file bytes.
pub fn from_postings(term: &[u8], postings: Vec<DocWpPosting>) -> Box<dyn ListSource> {
    Box::new(BufferedListSource {
        term: term.to_vec(),
        postings,
        pos: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::list_codec::encode_docwp;
    use crate::postings::VectorType;

    fn sample_entry(bytes: &[u8], docs: u64) -> VocabEntry {
        VocabEntry {
            attr_kind: 0,
            vtype: VectorType::DocWp,
            size: bytes.len() as u64,
            docs,
            occurs: docs,
            last_docno: 0,
            location: Location::Inline(bytes.to_vec()),
        }
    }

    #[test]
    fn inline_source_yields_postings_in_order() {
        let postings = vec![
            DocWpPosting { docno: 0, offsets: vec![0] },
            DocWpPosting { docno: 3, offsets: vec![1, 2] },
        ];
        let mut bytes = Vec::new();
        encode_docwp(&mut bytes, &postings);
        let entry = sample_entry(&bytes, postings.len() as u64);

        let mut src = open_inline(b"term", &entry).unwrap();
        assert_eq!(src.len(), 2);
        assert_eq!(src.peek().unwrap().docno, 0);
        assert_eq!(src.next().unwrap().docno, 0);
        assert_eq!(src.next().unwrap().docno, 3);
        assert!(src.next().is_none());
    }

    #[test]
    fn disk_source_reads_bytes_from_the_file_family() {
        let dir = tempfile::tempdir().unwrap();
        let family = FileFamily::new(dir.path(), "list", 1 << 20);
        let postings = vec![DocWpPosting { docno: 5, offsets: vec![0] }];
        let mut bytes = Vec::new();
        encode_docwp(&mut bytes, &postings);
        family.write_at(0, 100, &bytes).unwrap();

        let entry = VocabEntry {
            attr_kind: 0,
            vtype: VectorType::DocWp,
            size: bytes.len() as u64,
            docs: 1,
            occurs: 1,
            last_docno: 5,
            location: Location::File { capacity: bytes.len() as u64, fileno: 0, offset: 100 },
        };
        let mut src = open_from_disk(b"term", &entry, &family).unwrap();
        assert_eq!(src.next().unwrap().docno, 5);
    }
}
