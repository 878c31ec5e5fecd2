//! The merger (spec §4.5): folds the in-memory postings dump into the
//! previously committed vocabulary + list files, producing a new
//! vocabulary and new list files. Three-way streaming merge over the old
//! vocabulary (read through [`BulkReader`]) and the sorted new-postings
//! dump (read through [`DumpReader`]).
//!
//! File lifecycle (opening the commit-time replacement files, atomically
//! swapping the superblock, unlinking the old files) is the caller's
//! responsibility (`crate::index::Index`) — this module only ever touches
//! the page stores and file families it is handed, so it has no opinion
//! about naming or commit order.

use crate::btree::bt_bucket::PageLoc;
use crate::btree::builder::BulkBuilder;
use crate::btree::reader::BulkReader;
use crate::btree::PageStore;
use crate::codec::vbyte;
use crate::error::{CoreError, Result};
use crate::postings::{Location, VectorType, VocabEntry};
use crate::storage::{FileFamily, FreespaceMap};

use super::dump_reader::{DumpReader, DumpRecord};

pub struct MergeStats {
    pub root: Option<PageLoc>,
    pub terms_written: u64,
}

/// Decode every vocabulary entry concatenated in a leaf payload and return
/// the first non-`Impact` one (spec §4.5 rule 4: impact vectors are always
/// dropped across a merge). `None` means the term had nothing worth
/// carrying forward.
pub(crate) fn active_entry(payload: &[u8]) -> Result<Option<VocabEntry>> {
    let mut pos = 0;
    let mut found = None;
    while pos < payload.len() {
        let (entry, consumed) = VocabEntry::decode(payload, pos)?;
        pos += consumed;
        if found.is_none() && entry.vtype != VectorType::Impact {
            found = Some(entry);
        }
    }
    Ok(found)
}

pub(crate) fn read_list_bytes(entry: &VocabEntry, old_lists: &FileFamily) -> Result<Vec<u8>> {
    match &entry.location {
        Location::Inline(bytes) => Ok(bytes.clone()),
        Location::File { fileno, offset, .. } => old_lists.read_at_mmap(*fileno, *offset, entry.size as usize),
    }
}

pub(crate) fn store_list_bytes(
    bytes: &[u8],
    new_lists: &FileFamily,
    freespace: &mut FreespaceMap,
    inline_threshold: usize,
) -> Result<Location> {
    if bytes.len() <= inline_threshold {
        return Ok(Location::Inline(bytes.to_vec()));
    }
    let alloc = freespace.malloc(bytes.len() as u64)?;
    new_lists.write_at(alloc.fileno, alloc.offset, bytes)?;
    Ok(Location::File {
        capacity: alloc.capacity,
        fileno: alloc.fileno,
        offset: alloc.offset,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn merge(
    old_vocab_store: Option<&dyn PageStore>,
    old_vocab_root: Option<PageLoc>,
    old_lists: &FileFamily,
    new_vocab_store: &mut dyn PageStore,
    new_lists: &FileFamily,
    freespace: &mut FreespaceMap,
    new_dump_bytes: &[u8],
    page_size: usize,
    inline_threshold: usize,
) -> Result<MergeStats> {
    let mut old_reader = match (old_vocab_store, old_vocab_root) {
        (Some(store), Some(root)) => Some(BulkReader::open(store, root)?),
        _ => None,
    };
    let mut new_reader = DumpReader::new(new_dump_bytes);
    let mut builder = BulkBuilder::new(page_size);

    let mut old_current: Option<(Vec<u8>, Vec<u8>)> = match old_reader.as_mut() {
        Some(r) => r.next().transpose()?,
        None => None,
    };
    let mut new_current: Option<DumpRecord> = new_reader.next().transpose()?;
    let mut terms_written = 0u64;

    loop {
        enum Action {
            Done,
            CopyOld,
            EmitNew,
            MergeBoth,
        }

        let action = match (&old_current, &new_current) {
            (None, None) => Action::Done,
            (Some(_), None) => Action::CopyOld,
            (None, Some(_)) => Action::EmitNew,
            (Some((old_term, _)), Some(rec)) => match old_term.as_slice().cmp(rec.term.as_slice()) {
                std::cmp::Ordering::Less => Action::CopyOld,
                std::cmp::Ordering::Greater => Action::EmitNew,
                std::cmp::Ordering::Equal => Action::MergeBoth,
            },
        };

        match action {
            Action::Done => break,
            Action::CopyOld => {
                let (term, payload) = old_current.take().unwrap();
                if let Some(entry) = active_entry(&payload)? {
                    let bytes = read_list_bytes(&entry, old_lists)?;
                    let location = store_list_bytes(&bytes, new_lists, freespace, inline_threshold)?;
                    let new_entry = VocabEntry {
                        attr_kind: entry.attr_kind,
                        vtype: entry.vtype,
                        size: bytes.len() as u64,
                        docs: entry.docs,
                        occurs: entry.occurs,
                        last_docno: entry.last_docno,
                        location,
                    };
                    let mut encoded = Vec::new();
                    new_entry.encode(&mut encoded);
                    builder.insert(new_vocab_store, &term, &encoded)?;
                    terms_written += 1;
                }
                old_current = old_reader.as_mut().unwrap().next().transpose()?;
            }
            Action::EmitNew => {
                let rec = new_current.take().unwrap();
                let location = store_list_bytes(&rec.vec_bytes, new_lists, freespace, inline_threshold)?;
                let entry = VocabEntry {
                    attr_kind: 0,
                    vtype: VectorType::DocWp,
                    size: rec.vec_bytes.len() as u64,
                    docs: rec.docs,
                    occurs: rec.occurs,
                    last_docno: rec.last_docno,
                    location,
                };
                let mut encoded = Vec::new();
                entry.encode(&mut encoded);
                builder.insert(new_vocab_store, &rec.term, &encoded)?;
                terms_written += 1;
                new_current = new_reader.next().transpose()?;
            }
            Action::MergeBoth => {
                let (term, old_payload) = old_current.take().unwrap();
                let rec = new_current.take().unwrap();

                match active_entry(&old_payload)? {
                    None => {
                        let location = store_list_bytes(&rec.vec_bytes, new_lists, freespace, inline_threshold)?;
                        let entry = VocabEntry {
                            attr_kind: 0,
                            vtype: VectorType::DocWp,
                            size: rec.vec_bytes.len() as u64,
                            docs: rec.docs,
                            occurs: rec.occurs,
                            last_docno: rec.last_docno,
                            location,
                        };
                        let mut encoded = Vec::new();
                        entry.encode(&mut encoded);
                        builder.insert(new_vocab_store, &term, &encoded)?;
                    }
                    Some(old_entry) => {
                        let old_bytes = read_list_bytes(&old_entry, old_lists)?;
                        let (first_gap, consumed) = vbyte::read(&rec.vec_bytes, 0)?;
                        // The accumulator encoded this gap assuming no prior
                        // occurrence (an implicit previous docno of -1), so
                        // the gap value equals the new list's first docno
                        // outright; re-derive it relative to the old list's
                        // last docno to continue one unbroken gap chain.
                        let new_first_docno = first_gap;
                        if new_first_docno <= old_entry.last_docno {
                            return Err(CoreError::Corruption(format!(
                                "merge: new docno {new_first_docno} does not follow old last docno {}",
                                old_entry.last_docno
                            )));
                        }
                        let corrected_gap = new_first_docno - old_entry.last_docno - 1;

                        let mut merged = old_bytes;
                        vbyte::write(&mut merged, corrected_gap);
                        merged.extend_from_slice(&rec.vec_bytes[consumed..]);

                        let location = store_list_bytes(&merged, new_lists, freespace, inline_threshold)?;
                        let entry = VocabEntry {
                            attr_kind: old_entry.attr_kind,
                            vtype: VectorType::DocWp,
                            size: merged.len() as u64,
                            docs: old_entry.docs + rec.docs,
                            occurs: old_entry.occurs + rec.occurs,
                            last_docno: rec.last_docno,
                            location,
                        };
                        let mut encoded = Vec::new();
                        entry.encode(&mut encoded);
                        builder.insert(new_vocab_store, &term, &encoded)?;
                    }
                }

                terms_written += 1;
                old_current = old_reader.as_mut().unwrap().next().transpose()?;
                new_current = new_reader.next().transpose()?;
            }
        }
    }

    let root = builder.finish(new_vocab_store)?;
    Ok(MergeStats { root, terms_written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::MemPageStore;
    use crate::postings::PostingsAccumulator;
    use crate::tokenizer::NoStopword;
    use tempfile::tempdir;

    fn dump_one_doc(docno: u64, words: &[(&[u8], u64)]) -> Vec<u8> {
        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(docno).unwrap();
        for (w, pos) in words {
            acc.add_word(w, *pos).unwrap();
        }
        acc.update_doc().unwrap();
        let mut out = Vec::new();
        acc.dump(&mut out, &NoStopword).unwrap();
        out
    }

    #[test]
    fn first_merge_with_no_old_vocab_just_ingests_new_postings() {
        let dir = tempdir().unwrap();
        let old_lists = FileFamily::new(dir.path(), "list_old", 1 << 20);
        let new_lists = FileFamily::new(dir.path(), "list_new", 1 << 20);
        let mut freespace = FreespaceMap::new(crate::storage::FreespaceStrategy::First, 1 << 20, 0);
        let mut vocab_store = MemPageStore::new(256, 1 << 20);

        let dump = dump_one_doc(0, &[(b"alpha", 0), (b"beta", 1)]);

        let stats = merge(
            None,
            None,
            &old_lists,
            &mut vocab_store,
            &new_lists,
            &mut freespace,
            &dump,
            256,
            64,
        )
        .unwrap();

        assert_eq!(stats.terms_written, 2);
        let root = stats.root.unwrap();
        let entries: Vec<_> = BulkReader::open(&vocab_store, root).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"alpha");
    }

    #[test]
    fn second_merge_extends_an_existing_term_and_continues_the_gap_chain() {
        let dir = tempdir().unwrap();
        let old_lists = FileFamily::new(dir.path(), "list_a", 1 << 20);
        let mut freespace = FreespaceMap::new(crate::storage::FreespaceStrategy::First, 1 << 20, 0);

        // First merge: establishes "common" with docno 0.
        let mut vocab_store_1 = MemPageStore::new(256, 1 << 20);
        let dump1 = dump_one_doc(0, &[(b"common", 0)]);
        let stats1 = merge(None, None, &old_lists, &mut vocab_store_1, &old_lists, &mut freespace, &dump1, 256, 64).unwrap();
        let root1 = stats1.root.unwrap();

        // Second merge: same term reappears in docno 5.
        let new_lists = FileFamily::new(dir.path(), "list_b", 1 << 20);
        let mut vocab_store_2 = MemPageStore::new(256, 1 << 20);
        let dump2 = dump_one_doc(5, &[(b"common", 0)]);
        let stats2 = merge(
            Some(&vocab_store_1),
            Some(root1),
            &old_lists,
            &mut vocab_store_2,
            &new_lists,
            &mut freespace,
            &dump2,
            256,
            64,
        )
        .unwrap();

        let root2 = stats2.root.unwrap();
        let entry_bytes = BulkReader::find(&vocab_store_2, root2, b"common").unwrap().unwrap();
        let entry = active_entry(&entry_bytes).unwrap().unwrap();
        assert_eq!(entry.docs, 2);
        assert_eq!(entry.occurs, 2);
        assert_eq!(entry.last_docno, 5);
    }
}
