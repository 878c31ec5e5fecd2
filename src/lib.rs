//! `ixcore`: a disk-based full-text index storage and ranked query
//! evaluation engine.
//!
//! A vbyte-encoded wire format (`codec`) underlies a bulk-built B+Tree
//! vocabulary (`btree`) backed by fixed-size file families (`storage`). A
//! build streams documents through an in-memory postings accumulator
//! (`postings`), folds the result into the committed vocabulary with a
//! three-way merge (`merge`), and a search plans, resolves, and scores a
//! query against it (`query`). [`index::Index`] wires the whole lifecycle
//! together.

pub mod btree;
pub mod codec;
pub mod config;
pub mod docmap;
pub mod error;
pub mod index;
pub mod merge;
pub mod postings;
pub mod query;
pub mod storage;
pub mod tokenizer;

pub use config::{IndexConfig, StorageParams};
pub use docmap::DocMap;
pub use error::{CoreError, Result};
pub use index::{BuildStats, Index};
pub use query::{Conjunct, ConjunctKind, ScoredDoc, ScoringFunction, SearchOutcome};
pub use tokenizer::{Stemmer, Stopword, Tokeniser};
