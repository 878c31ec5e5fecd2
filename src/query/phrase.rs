//! Phrase / AND resolver (spec §4.7): folds several term posting lists into
//! one synthetic doc-with-positions list.
//!
//! This is a simplified, fully-materialized version of the general
//! slop-tolerant cursor machine the spec describes in the abstract (one
//! cursor per term, `(docno, term)` ordering biased so an exact phrase
//! match manifests as equal cursor positions): `ListSource` already
//! decodes a list's postings up front in this crate (see
//! `query::listsource`), so there is no benefit to re-deriving the
//! cursor/slop state machine over already-materialized `Vec<DocWpPosting>`
//! data. What is preserved is the contract: documents are visited in
//! ascending docno order, PHRASE requires exact adjacent-position matches,
//! AND requires only co-occurrence, and the output is a zero-gap synthetic
//! vector whose offsets (`0..f_dt`) are irrelevant downstream.

use crate::postings::list_codec::DocWpPosting;

use super::plan::ConjunctKind;

/// Resolve `kind` across `term_postings` (one already-decoded, docno- and
/// offset-sorted vector per term, in query order). Returns the synthetic
/// postings plus the aggregate `{f_t, F_t}` the conjunct should report.
pub fn resolve(kind: ConjunctKind, term_postings: &[Vec<DocWpPosting>]) -> (Vec<DocWpPosting>, u64, u64) {
    if term_postings.is_empty() || term_postings.iter().any(Vec::is_empty) {
        return (Vec::new(), 0, 0);
    }

    let n = term_postings.len();
    let mut idx = vec![0usize; n];
    let mut out = Vec::new();

    loop {
        let mut max_docno = None;
        for (i, postings) in term_postings.iter().enumerate() {
            if idx[i] >= postings.len() {
                return finish(out);
            }
            let d = postings[idx[i]].docno;
            max_docno = Some(max_docno.map_or(d, |m: u64| m.max(d)));
        }
        let target = max_docno.unwrap();

        let mut all_at_target = true;
        for (i, postings) in term_postings.iter().enumerate() {
            while idx[i] < postings.len() && postings[idx[i]].docno < target {
                idx[i] += 1;
            }
            if idx[i] >= postings.len() {
                return finish(out);
            }
            if postings[idx[i]].docno != target {
                all_at_target = false;
            }
        }

        if all_at_target {
            let f_dt = match kind {
                ConjunctKind::Phrase => count_phrase_matches(term_postings, &idx),
                ConjunctKind::And | ConjunctKind::Word => {
                    term_postings.iter().zip(&idx).map(|(p, &i)| p[i].offsets.len() as u64).min().unwrap_or(0)
                }
            };
            if f_dt > 0 {
                out.push(DocWpPosting { docno: target, offsets: (0..f_dt).collect() });
            }
            for i in &mut idx {
                *i += 1;
            }
        }
    }
}

/// For the matching document at `idx`, count positions `o` in the first
/// term's offsets such that `o + k` appears in the `k`-th term's offsets
/// for every `k` — i.e. an exact run of consecutive positions.
fn count_phrase_matches(term_postings: &[Vec<DocWpPosting>], idx: &[usize]) -> u64 {
    let anchor = &term_postings[0][idx[0]].offsets;
    let mut matches = 0u64;
    for &o0 in anchor {
        let mut ok = true;
        for (k, postings) in term_postings.iter().enumerate().skip(1) {
            let needle = o0 + k as u64;
            if postings[idx[k]].offsets.binary_search(&needle).is_err() {
                ok = false;
                break;
            }
        }
        if ok {
            matches += 1;
        }
    }
    matches
}

fn finish(postings: Vec<DocWpPosting>) -> (Vec<DocWpPosting>, u64, u64) {
    let f_t = postings.len() as u64;
    let big_f_t = postings.iter().map(|p| p.offsets.len() as u64).sum();
    (postings, f_t, big_f_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_requires_consecutive_positions() {
        let a = vec![DocWpPosting { docno: 0, offsets: vec![0, 10] }];
        let b = vec![DocWpPosting { docno: 0, offsets: vec![1, 20] }];
        let (postings, f_t, _) = resolve(ConjunctKind::Phrase, &[a, b]);
        assert_eq!(f_t, 1);
        assert_eq!(postings[0].docno, 0);
        assert_eq!(postings[0].offsets, vec![0]); // one phrase occurrence: (0,1)
    }

    #[test]
    fn phrase_skips_docs_missing_from_any_term() {
        let a = vec![DocWpPosting { docno: 0, offsets: vec![0] }, DocWpPosting { docno: 2, offsets: vec![0] }];
        let b = vec![DocWpPosting { docno: 0, offsets: vec![1] }];
        let (postings, f_t, _) = resolve(ConjunctKind::Phrase, &[a, b]);
        assert_eq!(f_t, 1);
        assert_eq!(postings[0].docno, 0);
    }

    #[test]
    fn and_only_requires_co_occurrence() {
        let a = vec![DocWpPosting { docno: 1, offsets: vec![0, 9] }];
        let b = vec![DocWpPosting { docno: 1, offsets: vec![50] }];
        let (postings, _, _) = resolve(ConjunctKind::And, &[a, b]);
        assert_eq!(postings[0].docno, 1);
        assert_eq!(postings[0].offsets.len(), 1); // min(f_dt) across terms
    }
}
