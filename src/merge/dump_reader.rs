//! Reads back the byte stream written by
//! [`crate::postings::accumulator::PostingsAccumulator::dump`]: a sequence
//! of `<term_len, term, docs, occurs, last_docno, vec_len, vec_bytes>`
//! records in sorted term order, exactly as the merger's "new" stream
//! expects them (spec §4.5 step 2).

use crate::codec::vbyte;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    pub term: Vec<u8>,
    pub docs: u64,
    pub occurs: u64,
    pub last_docno: u64,
    pub vec_bytes: Vec<u8>,
}

pub struct DumpReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DumpReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl<'a> Iterator for DumpReader<'a> {
    type Item = Result<DumpRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        Some(self.read_one())
    }
}

impl<'a> DumpReader<'a> {
    fn read_one(&mut self) -> Result<DumpRecord> {
        let (term_len, c) = vbyte::read(self.bytes, self.pos)?;
        self.pos += c;
        let term = self.bytes[self.pos..self.pos + term_len as usize].to_vec();
        self.pos += term_len as usize;

        let (docs, c) = vbyte::read(self.bytes, self.pos)?;
        self.pos += c;
        let (occurs, c) = vbyte::read(self.bytes, self.pos)?;
        self.pos += c;
        let (last_docno, c) = vbyte::read(self.bytes, self.pos)?;
        self.pos += c;
        let (vec_len, c) = vbyte::read(self.bytes, self.pos)?;
        self.pos += c;
        let vec_bytes = self.bytes[self.pos..self.pos + vec_len as usize].to_vec();
        self.pos += vec_len as usize;

        Ok(DumpRecord {
            term,
            docs,
            occurs,
            last_docno,
            vec_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::PostingsAccumulator;
    use crate::tokenizer::NoStopword;

    #[test]
    fn reads_back_what_the_accumulator_dumped() {
        let mut acc = PostingsAccumulator::new(1 << 20);
        acc.add_doc(0).unwrap();
        acc.add_word(b"alpha", 0).unwrap();
        acc.add_word(b"beta", 1).unwrap();
        acc.update_doc().unwrap();

        let mut out = Vec::new();
        acc.dump(&mut out, &NoStopword).unwrap();

        let records: Vec<DumpRecord> = DumpReader::new(&out).map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].term, b"alpha");
        assert_eq!(records[1].term, b"beta");
        assert_eq!(records[0].docs, 1);
        assert_eq!(records[0].occurs, 1);
    }
}
