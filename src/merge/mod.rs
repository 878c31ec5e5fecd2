//! Merge (spec §4.5): folding an in-memory postings dump into the
//! committed on-disk vocabulary and list files.

pub mod dump_reader;
pub mod impact_builder;
pub mod merger;

pub use dump_reader::{DumpReader, DumpRecord};
pub use impact_builder::ImpactBuilder;
pub use merger::{merge, MergeStats};
