//! Impact-ordered re-derivation (spec §9 open question: impact vectors are
//! never rebuilt inside [`super::merger`] itself). `ImpactBuilder::rebuild`
//! is an optional, off-by-default build-side pass that walks a freshly
//! merged doc-ordered vocabulary and appends an impact-ordered vector
//! alongside each term's existing `docwp` entry.
//!
//! "Impact" here is simply `f_dt`: documents are grouped into blocks by
//! their within-document term frequency, blocks ordered highest-`f_dt`
//! first (spec §3's `impact` vector ordering), matching the scoring
//! intuition that a higher local term frequency is a stronger per-document
//! signal worth visiting first.

use std::collections::BTreeMap;

use crate::btree::builder::BulkBuilder;
use crate::btree::reader::BulkReader;
use crate::btree::{bt_bucket::PageLoc, PageStore};
use crate::error::Result;
use crate::postings::list_codec::{decode_docwp, encode_impact, DocPosting, ImpactBlock};
use crate::postings::{VectorType, VocabEntry};
use crate::storage::{FileFamily, FreespaceMap};

use super::merger::{active_entry, read_list_bytes, store_list_bytes};

pub struct ImpactBuilder;

impl ImpactBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn rebuild(
        vocab_store: &dyn PageStore,
        vocab_root: PageLoc,
        lists: &FileFamily,
        new_vocab_store: &mut dyn PageStore,
        new_lists: &FileFamily,
        freespace: &mut FreespaceMap,
        page_size: usize,
        inline_threshold: usize,
    ) -> Result<Option<PageLoc>> {
        let mut builder = BulkBuilder::new(page_size);

        for pair in BulkReader::open(vocab_store, vocab_root)? {
            let (term, payload) = pair?;
            let mut out = payload.clone();

            if let Some(entry) = active_entry(&payload)? {
                if entry.vtype == VectorType::DocWp {
                    let bytes = read_list_bytes(&entry, lists)?;
                    let (postings, _) = decode_docwp(&bytes, entry.docs as usize)?;
                    let blocks = group_by_impact(&postings);

                    let mut impact_bytes = Vec::new();
                    encode_impact(&mut impact_bytes, &blocks);
                    let location = store_list_bytes(&impact_bytes, new_lists, freespace, inline_threshold)?;

                    let impact_entry = VocabEntry {
                        attr_kind: entry.attr_kind,
                        vtype: VectorType::Impact,
                        size: impact_bytes.len() as u64,
                        docs: entry.docs,
                        occurs: entry.occurs,
                        last_docno: entry.last_docno,
                        location,
                    };
                    impact_entry.encode(&mut out);
                }
            }

            builder.insert(new_vocab_store, &term, &out)?;
        }

        builder.finish(new_vocab_store)
    }
}

fn group_by_impact(postings: &[crate::postings::list_codec::DocWpPosting]) -> Vec<ImpactBlock> {
    let mut by_score: BTreeMap<u64, Vec<DocPosting>> = BTreeMap::new();
    for p in postings {
        let f_dt = p.offsets.len() as u64;
        by_score.entry(f_dt).or_default().push(DocPosting { docno: p.docno, f_dt });
    }
    by_score.into_iter().rev().map(|(score, docs)| ImpactBlock { score, docs }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::MemPageStore;
    use crate::postings::{Location, PostingsAccumulator};
    use crate::tokenizer::NoStopword;
    use tempfile::tempdir;

    #[test]
    fn rebuild_appends_an_impact_entry_alongside_the_docwp_entry() {
        let dir = tempdir().unwrap();
        let old_lists = FileFamily::new(dir.path(), "list", 1 << 20);
        let mut freespace = FreespaceMap::new(crate::storage::FreespaceStrategy::First, 1 << 20, 0);
        let mut vocab_store = MemPageStore::new(256, 1 << 20);

        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(0).unwrap();
        acc.add_word(b"term", 0).unwrap();
        acc.add_word(b"term", 1).unwrap();
        acc.update_doc().unwrap();
        acc.add_doc(1).unwrap();
        acc.add_word(b"term", 0).unwrap();
        acc.update_doc().unwrap();
        let mut dump = Vec::new();
        acc.dump(&mut dump, &NoStopword).unwrap();

        let stats = crate::merge::merger::merge(
            None, None, &old_lists, &mut vocab_store, &old_lists, &mut freespace, &dump, 256, 1 << 20,
        )
        .unwrap();
        let root = stats.root.unwrap();

        let mut new_vocab_store = MemPageStore::new(256, 1 << 20);
        let new_root = ImpactBuilder::rebuild(
            &vocab_store, root, &old_lists, &mut new_vocab_store, &old_lists, &mut freespace, 256, 1 << 20,
        )
        .unwrap()
        .unwrap();

        let payload = BulkReader::find(&new_vocab_store, new_root, b"term").unwrap().unwrap();
        let (first, consumed) = VocabEntry::decode(&payload, 0).unwrap();
        assert_eq!(first.vtype, VectorType::DocWp);
        let (second, _) = VocabEntry::decode(&payload, consumed).unwrap();
        assert_eq!(second.vtype, VectorType::Impact);
        assert!(matches!(second.location, Location::Inline(_)));
    }
}
