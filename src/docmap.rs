//! The document map (spec §6): an external collaborator resolving a docno
//! to document metadata. The core only ever reads through this trait.

pub trait DocMap {
    /// Total number of documents known to the map.
    fn entries(&self) -> u64;

    /// The document's precomputed weight (spec §4.4, used by the cosine
    /// scoring family's POST hook).
    fn get_weight(&self, docno: u64) -> Option<f32>;

    /// Writes the document's external identifier into `buf`, returning the
    /// length written, or `None` if `docno` is unknown.
    fn get_trecno(&self, docno: u64, buf: &mut [u8]) -> Option<usize>;

    /// Hints that the map should aggressively cache the columns named by
    /// `flags` in RAM. A no-op is always a valid implementation.
    fn cache(&self, flags: u32);
}

/// In-memory `DocMap` test double.
#[derive(Default)]
pub struct VecDocMap {
    weights: Vec<f32>,
    trecnos: Vec<Vec<u8>>,
}

impl VecDocMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, weight: f32, trecno: impl Into<Vec<u8>>) -> u64 {
        let docno = self.weights.len() as u64;
        self.weights.push(weight);
        self.trecnos.push(trecno.into());
        docno
    }
}

impl DocMap for VecDocMap {
    fn entries(&self) -> u64 {
        self.weights.len() as u64
    }

    fn get_weight(&self, docno: u64) -> Option<f32> {
        self.weights.get(docno as usize).copied()
    }

    fn get_trecno(&self, docno: u64, buf: &mut [u8]) -> Option<usize> {
        let trecno = self.trecnos.get(docno as usize)?;
        let len = trecno.len().min(buf.len());
        buf[..len].copy_from_slice(&trecno[..len]);
        Some(len)
    }

    fn cache(&self, _flags: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_docmap_round_trips() {
        let mut map = VecDocMap::new();
        let d0 = map.push(1.5, "TREC-0");
        let d1 = map.push(2.0, "TREC-1");

        assert_eq!(map.entries(), 2);
        assert_eq!(map.get_weight(d0), Some(1.5));
        assert_eq!(map.get_weight(d1), Some(2.0));

        let mut buf = [0u8; 16];
        let len = map.get_trecno(d0, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"TREC-0");

        assert_eq!(map.get_weight(99), None);
    }
}
