//! Build-side postings accumulation and the wire formats it produces.

pub mod accumulator;
pub mod list_codec;
pub mod vocab_record;

pub use accumulator::{DocUpdateStats, DumpStats, PostingsAccumulator};
pub use vocab_record::{Location, VectorType, VocabEntry};
