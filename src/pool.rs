use std::io;

use crate::alphabet::reverse_complement_into;
use crate::errors::*;
use crate::parse_utils::trim_ascii_whitespace;

/// Position of a barcode in its pool. This is the identity reported by every search.
pub type BarcodeIndex = usize;

/// Immutable, ordered pool of equal-length candidate barcodes.
///
/// Entries are stored back to back in one buffer. Duplicates are allowed here; they are
/// resolved when a search structure is built on top of the pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BarcodePool {
    seqs: Vec<u8>,
    length: usize,
    count: usize,
}

impl BarcodePool {
    const NAME: &'static str = "BarcodePool";

    /// Build a pool from sequences that must all have the same length.
    pub fn new(seqs: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Result<Self> {
        let mut seqs = seqs.into_iter().peekable();
        let length = seqs.peek().map(|s| s.as_ref().len()).unwrap_or(0);
        Self::with_length(length, seqs)
    }

    /// Build a pool with an explicit sequence length, which also allows an empty pool.
    pub fn with_length(length: usize, seqs: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Result<Self> {
        let mut res = Self {
            seqs: Vec::new(),
            length,
            count: 0,
        };

        for s in seqs {
            res.push(s.as_ref())?;
        }

        Ok(res)
    }

    /// Load a pool from one column of a delimited table.
    ///
    /// Lines starting with `#` are skipped and there is no header row.
    pub fn from_delimited(reader: impl io::Read, delimiter: u8, column: usize) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .comment(Some(b'#'))
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut seqs = Vec::new();

        for (i, record) in rdr.byte_records().enumerate() {
            let record = record?;
            let field = record
                .get(column)
                .and_then(trim_ascii_whitespace)
                .ok_or_else(|| Error::MalformedSequence {
                    sequence: String::new(),
                    index: i,
                    context: Self::NAME,
                    reason: "missing or empty barcode field",
                })?;
            seqs.push(field.to_owned());
        }

        Self::new(seqs)
    }

    fn push(&mut self, seq: &[u8]) -> Result<()> {
        if seq.len() != self.length {
            return Err(Error::MalformedSequence {
                sequence: utf8(seq),
                index: self.count,
                context: Self::NAME,
                reason: "all sequences in a pool must have the same length",
            });
        }

        self.seqs.extend_from_slice(seq);
        self.count += 1;
        Ok(())
    }

    /// Length of every sequence in the pool.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of sequences in the pool.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, i: BarcodeIndex) -> Option<&[u8]> {
        if i < self.count {
            Some(&self.seqs[i * self.length..(i + 1) * self.length])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        (0..self.count).map(move |i| &self.seqs[i * self.length..(i + 1) * self.length])
    }

    /// The same pool with every entry reverse complemented. Indices are preserved.
    pub fn reverse_complemented(&self) -> Self {
        let mut seqs = Vec::with_capacity(self.seqs.len());
        let mut buf = Vec::with_capacity(self.length);

        for s in self.iter() {
            reverse_complement_into(s, &mut buf);
            seqs.extend_from_slice(&buf);
        }

        Self {
            seqs,
            length: self.length,
            count: self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_entries_in_order() {
        let pool = BarcodePool::new(["AACC", "AACG", "GGTT"]).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.length(), 4);
        assert_eq!(pool.get(1), Some(&b"AACG"[..]));
        assert_eq!(pool.get(3), None);
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec![&b"AACC"[..], &b"AACG"[..], &b"GGTT"[..]]);
    }

    #[test]
    fn rejects_ragged_pool() {
        let err = BarcodePool::new(["AACC", "AAC"]).unwrap_err();
        assert!(matches!(err, Error::MalformedSequence { index: 1, .. }));
    }

    #[test]
    fn empty_pool_keeps_length() {
        let pool = BarcodePool::with_length(6, Vec::<&[u8]>::new()).unwrap();
        assert!(pool.is_empty());
        assert_eq!(pool.length(), 6);

        let pool = BarcodePool::new(Vec::<&str>::new()).unwrap();
        assert_eq!(pool.length(), 0);
    }

    #[test]
    fn reverse_complemented_keeps_indices() {
        let pool = BarcodePool::new(["AACG", "TTTN"]).unwrap();
        let rc = pool.reverse_complemented();
        assert_eq!(rc.get(0), Some(&b"CGTT"[..]));
        assert_eq!(rc.get(1), Some(&b"NAAA"[..]));
        assert_eq!(rc.reverse_complemented(), pool);
    }

    #[test]
    fn loads_delimited_column() {
        let table = "# name\tsequence\nbc1\tACGT\nbc2\t TTGA \nbc3\tCCCC\n";
        let pool = BarcodePool::from_delimited(table.as_bytes(), b'\t', 1).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(1), Some(&b"TTGA"[..]));

        let err = BarcodePool::from_delimited("bc1\tACGT\nbc2\n".as_bytes(), b'\t', 1).unwrap_err();
        assert!(matches!(err, Error::MalformedSequence { index: 1, .. }));
    }
}
