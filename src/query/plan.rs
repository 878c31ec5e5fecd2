//! Query plan construction (spec §4.6): tokenise the query string, resolve
//! each term against the vocabulary, group multi-word groups into PHRASE/AND
//! conjuncts, and order conjuncts by selectivity before evaluation.

use rayon::slice::ParallelSliceMut;

use crate::btree::reader::BulkReader;
use crate::btree::{PageStore, bt_bucket::PageLoc};
use crate::error::Result;
use crate::postings::VocabEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjunctKind {
    Word,
    Phrase,
    And,
}

/// One resolved query term-or-group. `terms` holds one entry for `Word`,
/// and the group's member terms (in query order) for `Phrase`/`And`.
pub struct Conjunct {
    pub kind: ConjunctKind,
    pub terms: Vec<Vec<u8>>,
    /// In-query term frequency: how many times this exact term/group text
    /// was repeated in the query.
    pub f_qt: u64,
    /// Per-term vocabulary record, `None` when the term is absent (an
    /// absent term anywhere in a PHRASE/AND group makes the whole group
    /// unmatchable).
    pub vocab: Vec<Option<VocabEntry>>,
}

impl Conjunct {
    /// `f_t`: the smallest document-frequency among the group's member
    /// terms (a phrase can never match more documents than its rarest
    /// term occurs in), used for BM25/cosine selectivity ordering.
    pub fn f_t(&self) -> u64 {
        self.vocab.iter().flatten().map(|e| e.docs).min().unwrap_or(0)
    }

    /// `F_t`: likewise the smallest total-occurrence count, used for
    /// Dirichlet selectivity ordering.
    pub fn big_f_t(&self) -> u64 {
        self.vocab.iter().flatten().map(|e| e.occurs).min().unwrap_or(0)
    }

    pub fn is_resolvable(&self) -> bool {
        self.vocab.iter().all(|v| v.is_some())
    }
}

/// Split a query string into bare words and double-quoted phrases. A
/// quoted group of more than one word becomes a `Phrase` conjunct; a
/// quoted single word degrades to `Word`. This module does not implement
/// an explicit `AND(...)` group syntax since nothing downstream depends on
/// the literal query grammar beyond producing `ConjunctKind::And` groups;
/// callers that need AND groups can construct them directly with
/// [`Conjunct`].
fn split_query(query: &str) -> Vec<(ConjunctKind, Vec<String>)> {
    let mut groups = Vec::new();
    let mut chars = query.chars().peekable();
    let mut current = String::new();

    while let Some(&ch) = chars.peek() {
        if ch == '"' {
            chars.next();
            let mut phrase = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                phrase.push(c);
            }
            let words: Vec<String> = phrase.split_whitespace().map(|w| w.to_lowercase()).collect();
            if !words.is_empty() {
                let kind = if words.len() > 1 { ConjunctKind::Phrase } else { ConjunctKind::Word };
                groups.push((kind, words));
            }
        } else if ch.is_whitespace() {
            chars.next();
            if !current.is_empty() {
                groups.push((ConjunctKind::Word, vec![std::mem::take(&mut current)]));
            }
        } else {
            current.push(ch.to_ascii_lowercase());
            chars.next();
        }
    }
    if !current.is_empty() {
        groups.push((ConjunctKind::Word, vec![current]));
    }
    groups
}

pub fn build_conjuncts(query: &str, vocab_store: &dyn PageStore, vocab_root: Option<PageLoc>) -> Result<Vec<Conjunct>> {
    let groups = split_query(query);

    let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    for (_, words) in &groups {
        *counts.entry(words.join(" ")).or_insert(0) += 1;
    }

    let mut out = Vec::new();
    let mut seen_text = std::collections::HashSet::new();
    for (kind, words) in groups {
        let text = words.join(" ");
        if !seen_text.insert(text.clone()) {
            continue;
        }
        let mut vocab = Vec::with_capacity(words.len());
        for word in &words {
            let entry = match vocab_root {
                Some(root) => match BulkReader::find(vocab_store, root, word.as_bytes())? {
                    Some(bytes) => Some(VocabEntry::decode(&bytes, 0)?.0),
                    None => None,
                },
                None => None,
            };
            vocab.push(entry);
        }
        out.push(Conjunct {
            kind,
            f_qt: counts[&text],
            terms: words.into_iter().map(|w| w.into_bytes()).collect(),
            vocab,
        });
    }
    Ok(out)
}

/// Sort resolvable conjuncts ascending by `key` (spec §4.6: `f_t` for
/// BM25/cosine, `F_t` for Dirichlet). Unresolvable conjuncts (a missing
/// term) sort last since they can never contribute a match. A query rarely
/// has enough conjuncts to make parallel sorting pay for itself, but a
/// phrase-heavy query against a large vocabulary can still spend real time
/// here since `key` walks every member term's vocab entry.
pub fn order_by_selectivity(conjuncts: &mut [Conjunct], key: impl Fn(&Conjunct) -> u64 + Sync) {
    conjuncts.par_sort_by_key(|c| if c.is_resolvable() { (0u8, key(c)) } else { (1u8, u64::MAX) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::MemPageStore;

    #[test]
    fn split_query_groups_quoted_phrases() {
        let groups = split_query(r#"hello "big red dog" world"#);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], (ConjunctKind::Word, vec!["hello".to_string()]));
        assert_eq!(groups[1].0, ConjunctKind::Phrase);
        assert_eq!(groups[1].1, vec!["big", "red", "dog"]);
        assert_eq!(groups[2], (ConjunctKind::Word, vec!["world".to_string()]));
    }

    #[test]
    fn build_conjuncts_marks_absent_terms_unresolvable() {
        let store = MemPageStore::new(256, 1 << 16);
        let conjuncts = build_conjuncts("ghost word", &store, None).unwrap();
        assert_eq!(conjuncts.len(), 2);
        assert!(!conjuncts[0].is_resolvable());
    }

    #[test]
    fn repeated_words_accumulate_f_qt() {
        let store = MemPageStore::new(256, 1 << 16);
        let conjuncts = build_conjuncts("the the the", &store, None).unwrap();
        assert_eq!(conjuncts.len(), 1);
        assert_eq!(conjuncts[0].f_qt, 3);
    }

    #[test]
    fn selectivity_ordering_puts_unresolvable_last() {
        let store = MemPageStore::new(256, 1 << 16);
        let mut conjuncts = build_conjuncts("rare common", &store, None).unwrap();
        order_by_selectivity(&mut conjuncts, |c| c.f_t());
        assert!(conjuncts.iter().all(|c| !c.is_resolvable()));
    }
}
