//! Manual build/query driver for an `ixcore` index directory.
//!
//! This is a thin harness over [`ixcore::Index`], not a production shell: it
//! keeps one plain-text sidecar file (`docmeta.jsonl`) recording each
//! document's token length and external id, since `DocMap` (spec §6) is the
//! caller's responsibility and this CLI has no database of its own to draw
//! one from.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use ixcore::docmap::VecDocMap;
use ixcore::tokenizer::{NoStemmer, NoStopword, TokenEvent, Tokeniser, WhitespaceTokeniser};
use ixcore::{DocMap, Index, IndexConfig, ScoringFunction};

#[derive(Parser)]
#[command(name = "ixcore-cli", version, about = "Build and query an ixcore index directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every non-blank line of `corpus` as one document, appending to
    /// `index` if it already exists.
    Build {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        corpus: PathBuf,
    },
    /// Run a ranked query against an existing index.
    Query {
        #[arg(long)]
        index: PathBuf,
        query: String,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 10)]
        len: usize,
        #[arg(long, value_enum, default_value = "bm25")]
        scorer: Scorer,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum Scorer {
    Cosine,
    Bm25,
    Dirichlet,
}

impl Scorer {
    fn build(&self) -> ScoringFunction {
        match self {
            Scorer::Cosine => ScoringFunction::Cosine,
            Scorer::Bm25 => ScoringFunction::Bm25K3 { k1: 1.2, b: 0.75 },
            Scorer::Dirichlet => ScoringFunction::Dirichlet { mu: 2000.0 },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DocMeta {
    docno: u64,
    length: u64,
    trecno: String,
}

fn meta_path(index_dir: &Path) -> PathBuf {
    index_dir.join("docmeta.jsonl")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Build { index, corpus } => build(&index, &corpus),
        Command::Query { index, query, start, len, scorer } => query(&index, &query, start, len, scorer.build()),
    }
}

fn build(index_dir: &Path, corpus: &Path) -> anyhow::Result<()> {
    let config = IndexConfig::default();
    let mut index = if index_dir.join("param").exists() {
        Index::open(index_dir, config)?
    } else {
        Index::create(index_dir, config)?
    };

    let text = std::fs::read_to_string(corpus)?;
    let mut docs = Vec::new();
    let mut next_docno = index.stats().docs;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        docs.push((next_docno, line.to_string()));
        next_docno += 1;
    }

    if docs.is_empty() {
        println!("no non-blank lines in {}", corpus.display());
        return Ok(());
    }

    let mut meta_file = OpenOptions::new().create(true).append(true).open(meta_path(index_dir))?;
    for (docno, line) in &docs {
        let length = WhitespaceTokeniser
            .tokenise(line)
            .into_iter()
            .filter(|e| matches!(e, TokenEvent::Word(_)))
            .count() as u64;
        let record = DocMeta { docno: *docno, length, trecno: format!("DOC-{docno}") };
        writeln!(meta_file, "{}", serde_json::to_string(&record)?)?;
    }

    let stats = index.build(docs, &WhitespaceTokeniser, &NoStopword, &NoStemmer)?;
    println!(
        "indexed {} documents ({} distinct terms touched), {} documents total",
        stats.docs_indexed,
        stats.distinct_terms,
        index.stats().docs
    );
    Ok(())
}

fn query(index_dir: &Path, text: &str, start: usize, len: usize, scorer: ScoringFunction) -> anyhow::Result<()> {
    let index = Index::open(index_dir, IndexConfig::default())?;

    let mut doc_map = VecDocMap::new();
    let mut lengths: HashMap<u64, u64> = HashMap::new();
    let path = meta_path(index_dir);
    if path.exists() {
        for line in std::fs::read_to_string(&path)?.lines() {
            let record: DocMeta = serde_json::from_str(line)?;
            while doc_map.entries() <= record.docno {
                let docno = doc_map.entries();
                doc_map.push(1.0, format!("DOC-{docno}"));
            }
            lengths.insert(record.docno, record.length);
        }
    }

    let outcome = index.search(text, start, len, scorer, &doc_map, &|docno| *lengths.get(&docno).unwrap_or(&0))?;

    println!(
        "{} result(s), estimated total {}{}",
        outcome.results.len(),
        outcome.estimated_total,
        if outcome.is_estimate { " (estimate)" } else { "" }
    );
    for scored in &outcome.results {
        let mut buf = [0u8; 64];
        let trecno = doc_map
            .get_trecno(scored.docno, &mut buf)
            .map(|n| String::from_utf8_lossy(&buf[..n]).into_owned())
            .unwrap_or_else(|| scored.docno.to_string());
        println!("{:>10.4}  {}", scored.score, trecno);
    }
    Ok(())
}
