//! Top-level facade: ties the accumulator, merger, and query evaluator
//! together into the directory-based lifecycle a real index actually runs
//! through — `create`/`open`, `build`, `search`, `stats`.
//!
//! A committed index lives in a directory as a fixed `param` file (the
//! superblock), a `manifest` file naming the currently-live vocabulary/list
//! file family, and the family itself (`vocab.<gen>.*`, `list.<gen>.*`).
//! `build` always stages its merge output under a fresh generation number
//! and only swings the manifest over to it after the new superblock is
//! durable, so a crash mid-build never corrupts the previously committed
//! generation; the old generation's files are unlinked only after that.

use std::path::{Path, PathBuf};

use crate::btree::bt_bucket::PageLoc;
use crate::btree::PageStore;
use crate::config::IndexConfig;
use crate::docmap::DocMap;
use crate::error::{CoreError, Result};
use crate::merge::merge;
use crate::postings::accumulator::PostingsAccumulator;
use crate::postings::Location;
use crate::query::listsource::{self, open_from_disk, open_inline, ListSource};
use crate::query::plan::{build_conjuncts, order_by_selectivity, ConjunctKind};
use crate::query::scoring::ScoringFunction;
use crate::query::{evaluator, phrase};
use crate::storage::{FileFamily, FilePageStore, FreespaceMap, FreespaceStrategy, IndexStats, Superblock};
use crate::tokenizer::{Stemmer, Stopword, TokenEvent, Tokeniser};

const PARAM_FILE: &str = "param";
const MANIFEST_FILE: &str = "manifest";
const VOCAB_PREFIX: &str = "vocab";
const LIST_PREFIX: &str = "list";

/// What a single `build` call did.
#[derive(Debug, Clone, Copy)]
pub struct BuildStats {
    pub docs_indexed: u64,
    pub distinct_terms: u64,
}

pub use crate::query::{EvaluatorConfig, ScoredDoc, SearchOutcome};

/// Records which generation's files are currently live and how far each
/// family's filenos run, so a stale generation can be unlinked by name
/// after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Manifest {
    generation: u32,
    vocab_last_fileno: u32,
    list_last_fileno: u32,
}

impl Manifest {
    const ENCODED_LEN: usize = 12;

    fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.generation.to_be_bytes());
        buf[4..8].copy_from_slice(&self.vocab_last_fileno.to_be_bytes());
        buf[8..12].copy_from_slice(&self.list_last_fileno.to_be_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(CoreError::Corruption("manifest file truncated".into()));
        }
        Ok(Self {
            generation: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            vocab_last_fileno: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            list_last_fileno: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
        })
    }

    fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::FileNotFound(path.to_path_buf())
            } else {
                CoreError::Eio(e)
            }
        })?;
        Self::from_bytes(&bytes)
    }

    fn write_atomic(self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_bytes())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// A ixcore index directory: an open handle driving build and search.
pub struct Index {
    dir: PathBuf,
    config: IndexConfig,
    manifest: Manifest,
    superblock: Superblock,
}

fn param_path(dir: &Path) -> PathBuf {
    dir.join(PARAM_FILE)
}

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

impl Index {
    /// Create a brand-new, empty index rooted at `dir`.
    pub fn create(dir: impl Into<PathBuf>, config: IndexConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let superblock = Superblock {
            storage: config.storage,
            stats: IndexStats::default(),
            root_fileno: 0,
            root_offset: 0,
            vectors_count: 0,
            vocab_files_count: 0,
        };
        superblock.write_atomic(&param_path(&dir))?;

        let manifest = Manifest { generation: 0, vocab_last_fileno: 0, list_last_fileno: 0 };
        manifest.write_atomic(&manifest_path(&dir))?;

        Ok(Self { dir, config, manifest, superblock })
    }

    /// Open a previously committed index. The on-disk `storage` header
    /// always wins over `config.storage`; only the runtime tuning knobs in
    /// `config` (accumulator limit, memory budgets, page length) apply.
    pub fn open(dir: impl Into<PathBuf>, mut config: IndexConfig) -> Result<Self> {
        let dir = dir.into();
        let superblock = Superblock::read(&param_path(&dir))?;
        let manifest = Manifest::read(&manifest_path(&dir))?;
        config.storage = superblock.storage;
        Ok(Self { dir, config, manifest, superblock })
    }

    pub fn stats(&self) -> IndexStats {
        self.superblock.stats
    }

    fn vocab_prefix(generation: u32) -> String {
        format!("{VOCAB_PREFIX}.{generation}")
    }

    fn list_prefix(generation: u32) -> String {
        format!("{LIST_PREFIX}.{generation}")
    }

    fn vocab_family(&self, generation: u32) -> FileFamily {
        FileFamily::new(&self.dir, Self::vocab_prefix(generation), self.config.storage.max_filesize as u64)
    }

    fn list_family(&self, generation: u32) -> FileFamily {
        FileFamily::new(&self.dir, Self::list_prefix(generation), self.config.storage.max_filesize as u64)
    }

    /// The current vocabulary's root, or `None` for a newly created index
    /// that has never completed a build producing at least one term.
    fn root(&self) -> Option<PageLoc> {
        if self.superblock.vectors_count == 0 {
            None
        } else {
            Some(PageLoc { fileno: self.superblock.root_fileno, offset: self.superblock.root_offset })
        }
    }

    /// Tokenise, accumulate, and merge `docs` into the index, committing a
    /// new generation atomically on success. `docs` must be supplied in
    /// strictly increasing docno order (spec §4.4's accumulator contract).
    pub fn build<T, W, M>(
        &mut self,
        docs: impl IntoIterator<Item = (u64, String)>,
        tokeniser: &T,
        stopword: &W,
        stemmer: &M,
    ) -> Result<BuildStats>
    where
        T: Tokeniser,
        W: Stopword,
        M: Stemmer,
    {
        let mut acc = PostingsAccumulator::new(self.config.list_memory_budget);
        let mut docs_indexed = 0u64;
        let mut occurs = 0u64;
        let mut total_doc_length = 0u64;

        for (docno, text) in docs {
            acc.add_doc(docno)?;
            let mut position = 0u64;
            for event in tokeniser.tokenise(&text) {
                let TokenEvent::Word(word) = event else { continue };
                let stemmed = stemmer.stem(&word);
                if stopword.is_stopword(stemmed.as_ref()) {
                    continue;
                }
                acc.add_word(stemmed.as_ref(), position)?;
                position += 1;
            }
            let doc_stats = acc.update_doc()?;
            occurs += doc_stats.terms;
            total_doc_length += doc_stats.terms;
            docs_indexed += 1;
        }

        let mut dump = Vec::new();
        let dump_stats = acc.dump(&mut dump, stopword)?;

        let old_generation = self.manifest.generation;
        let new_generation = old_generation.wrapping_add(1);

        let old_root = self.root();
        let old_vocab_family = self.vocab_family(old_generation);
        let old_vocab_store = if old_root.is_some() {
            Some(FilePageStore::new(self.vocab_family(old_generation), self.config.storage.pagesize as usize))
        } else {
            None
        };
        let old_list_family = self.list_family(old_generation);

        let new_vocab_family = self.vocab_family(new_generation);
        let new_list_family = self.list_family(new_generation);
        let mut new_vocab_store = FilePageStore::new(new_vocab_family, self.config.storage.pagesize as usize);
        let mut freespace = FreespaceMap::new(
            FreespaceStrategy::First,
            self.config.storage.max_filesize as u64,
            self.config.list_append_budget,
        );
        let inline_threshold = self.config.storage.pagesize as usize / 4;

        let merge_stats = merge(
            old_vocab_store.as_ref().map(|s| s as &dyn PageStore),
            old_root,
            &old_list_family,
            &mut new_vocab_store,
            &new_list_family,
            &mut freespace,
            &dump,
            self.config.storage.pagesize as usize,
            inline_threshold,
        )?;

        let new_stats = IndexStats {
            docs: self.superblock.stats.docs + docs_indexed,
            occurs: self.superblock.stats.occurs + occurs,
            total_doc_length: self.superblock.stats.total_doc_length + total_doc_length,
        };
        let vocab_files_touched = new_vocab_store.peek_alloc().fileno + 1;
        let new_superblock = Superblock {
            storage: self.config.storage,
            stats: new_stats,
            root_fileno: merge_stats.root.map(|r| r.fileno).unwrap_or(0),
            root_offset: merge_stats.root.map(|r| r.offset).unwrap_or(0),
            vectors_count: merge_stats.terms_written,
            vocab_files_count: vocab_files_touched,
        };

        new_superblock.write_atomic(&param_path(&self.dir))?;
        let new_manifest = Manifest {
            generation: new_generation,
            vocab_last_fileno: new_vocab_store.peek_alloc().fileno,
            list_last_fileno: freespace.highest_fileno(),
        };
        new_manifest.write_atomic(&manifest_path(&self.dir))?;

        // The new generation is now durable and discoverable; only now is
        // it safe to reclaim the one it replaced.
        if old_root.is_some() {
            old_vocab_family.unlink_all(self.manifest.vocab_last_fileno)?;
            old_list_family.unlink_all(self.manifest.list_last_fileno)?;
        }

        self.superblock = new_superblock;
        self.manifest = new_manifest;

        Ok(BuildStats { docs_indexed, distinct_terms: dump_stats.distinct_terms })
    }

    /// Evaluate `query` (spec §4.6-§4.8) and return the top `len` results
    /// starting at `start`, ranked by `scorer`.
    ///
    /// `doc_length` supplies each docno's token count; `DocMap` (spec §6)
    /// only carries a precomputed cosine weight and an external id, not a
    /// length, so scoring families that need `dl` (BM25, Dirichlet, pivoted
    /// cosine) take it from this caller-supplied function instead.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        query: &str,
        start: usize,
        len: usize,
        scorer: ScoringFunction,
        doc_map: &dyn DocMap,
        doc_length: &dyn Fn(u64) -> u64,
    ) -> Result<SearchOutcome> {
        let root = self.root();
        let vocab_store = FilePageStore::new(self.vocab_family(self.manifest.generation), self.config.storage.pagesize as usize);
        let lists = self.list_family(self.manifest.generation);

        let mut conjuncts = build_conjuncts(query, &vocab_store, root)?;
        order_by_selectivity(&mut conjuncts, |c| match scorer {
            ScoringFunction::Dirichlet { .. } => c.big_f_t(),
            _ => c.f_t(),
        });

        let mut sources: Vec<Box<dyn ListSource>> = Vec::with_capacity(conjuncts.len());
        for conjunct in &conjuncts {
            if !conjunct.is_resolvable() {
                sources.push(listsource::from_postings(&[], Vec::new()));
                continue;
            }
            let source = match conjunct.kind {
                ConjunctKind::Word => {
                    let term = &conjunct.terms[0];
                    let entry = conjunct.vocab[0].as_ref().expect("resolvable");
                    Self::open_entry(term, entry, &lists)?
                }
                ConjunctKind::Phrase | ConjunctKind::And => {
                    let mut term_postings = Vec::with_capacity(conjunct.terms.len());
                    for (term, entry) in conjunct.terms.iter().zip(&conjunct.vocab) {
                        let entry = entry.as_ref().expect("resolvable");
                        let mut src = Self::open_entry(term, entry, &lists)?;
                        let mut postings = Vec::new();
                        while let Some(p) = src.next() {
                            postings.push(p.clone());
                        }
                        term_postings.push(postings);
                    }
                    let (resolved, _f_t, _big_f_t) = phrase::resolve(conjunct.kind, &term_postings);
                    listsource::from_postings(&conjunct.terms.concat(), resolved)
                }
            };
            sources.push(source);
        }

        let n = self.superblock.stats.docs;
        let avgdl = self.superblock.stats.avg_doc_length();
        let config = EvaluatorConfig {
            accumulator_limit: self.config.accumulator_limit as u64,
            rethresh_interval: self.config.rethresh_interval as u64,
        };
        let doc_weight = |docno: u64| doc_map.get_weight(docno).unwrap_or(0.0);

        let outcome = evaluator::evaluate(&conjuncts, sources, scorer, n, avgdl, doc_length, &doc_weight, &config);

        let results = outcome.results.into_iter().skip(start).take(len).collect();
        Ok(SearchOutcome { results, estimated_total: outcome.estimated_total, is_estimate: outcome.is_estimate })
    }

    fn open_entry(term: &[u8], entry: &crate::postings::VocabEntry, lists: &FileFamily) -> Result<Box<dyn ListSource>> {
        match &entry.location {
            Location::Inline(_) => open_inline(term, entry),
            Location::File { .. } => open_from_disk(term, entry, lists),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docmap::VecDocMap;
    use crate::tokenizer::{NoStemmer, NoStopword, WhitespaceTokeniser};
    use tempfile::tempdir;

    fn small_config() -> IndexConfig {
        let mut config = IndexConfig::default();
        config.storage.pagesize = 256;
        config.storage.max_filesize = 1 << 20;
        config
    }

    #[test]
    fn build_then_search_finds_the_matching_document() {
        let dir = tempdir().unwrap();
        let mut index = Index::create(dir.path(), small_config()).unwrap();

        let docs = vec![
            (0u64, "the quick brown fox".to_string()),
            (1u64, "the lazy dog sleeps".to_string()),
        ];
        let stats = index.build(docs, &WhitespaceTokeniser, &NoStopword, &NoStemmer).unwrap();
        assert_eq!(stats.docs_indexed, 2);
        assert!(stats.distinct_terms > 0);
        assert_eq!(index.stats().docs, 2);

        let mut doc_map = VecDocMap::new();
        doc_map.push(1.0, "DOC-0");
        doc_map.push(1.0, "DOC-1");

        let outcome = index
            .search("fox", 0, 10, ScoringFunction::Cosine, &doc_map, &|_| 4)
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].docno, 0);
    }

    #[test]
    fn second_build_extends_the_index_and_retires_the_old_generation() {
        let dir = tempdir().unwrap();
        let mut index = Index::create(dir.path(), small_config()).unwrap();

        index
            .build(vec![(0u64, "alpha beta".to_string())], &WhitespaceTokeniser, &NoStopword, &NoStemmer)
            .unwrap();
        let gen1 = index.manifest.generation;

        index
            .build(vec![(1u64, "alpha gamma".to_string())], &WhitespaceTokeniser, &NoStopword, &NoStemmer)
            .unwrap();
        let gen2 = index.manifest.generation;

        assert!(gen2 > gen1);
        assert_eq!(index.stats().docs, 2);
        assert!(!index.vocab_family(gen1).path_for(0).exists());

        let mut doc_map = VecDocMap::new();
        doc_map.push(1.0, "DOC-0");
        doc_map.push(1.0, "DOC-1");
        let outcome = index
            .search("alpha", 0, 10, ScoringFunction::Cosine, &doc_map, &|_| 2)
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn reopening_an_index_preserves_stats_and_search_results() {
        let dir = tempdir().unwrap();
        {
            let mut index = Index::create(dir.path(), small_config()).unwrap();
            index
                .build(vec![(0u64, "hello world".to_string())], &WhitespaceTokeniser, &NoStopword, &NoStemmer)
                .unwrap();
        }

        let reopened = Index::open(dir.path(), small_config()).unwrap();
        assert_eq!(reopened.stats().docs, 1);

        let mut doc_map = VecDocMap::new();
        doc_map.push(1.0, "DOC-0");
        let outcome = reopened
            .search("hello", 0, 10, ScoringFunction::Cosine, &doc_map, &|_| 2)
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
    }
}
