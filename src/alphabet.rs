//! Nucleotide coding, complements and strand bookkeeping.

use serde::{Deserialize, Serialize};

/// Number of real bases in the alphabet.
pub const NUM_BASES: usize = 4;

/// Code for any byte outside `ACGTacgt`. Never used as a trie key on the query side.
pub const UNMATCHABLE: u8 = 4;

static CODE_LUT: [u8; 256] = {
    let mut l = [UNMATCHABLE; 256];
    l[b'A' as usize] = 0;
    l[b'a' as usize] = 0;
    l[b'C' as usize] = 1;
    l[b'c' as usize] = 1;
    l[b'G' as usize] = 2;
    l[b'g' as usize] = 2;
    l[b'T' as usize] = 3;
    l[b't' as usize] = 3;
    l
};

static COMP_LUT: [u8; 256] = {
    let mut l = [0u8; 256];
    let mut i = 0;

    while i < l.len() {
        l[i] = i as u8;
        i += 1;
    }

    l[b'A' as usize] = b'T';
    l[b'C' as usize] = b'G';
    l[b'G' as usize] = b'C';
    l[b'T' as usize] = b'A';
    l[b'a' as usize] = b't';
    l[b'c' as usize] = b'g';
    l[b'g' as usize] = b'c';
    l[b't' as usize] = b'a';
    l
};

#[inline(always)]
pub fn encode(b: u8) -> u8 {
    CODE_LUT[b as usize]
}

#[inline(always)]
pub fn is_base(b: u8) -> bool {
    encode(b) != UNMATCHABLE
}

/// Complement a single byte. Bytes outside the alphabet are returned unchanged.
#[inline(always)]
pub fn complement(b: u8) -> u8 {
    COMP_LUT[b as usize]
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(seq.len());
    reverse_complement_into(seq, &mut res);
    res
}

/// Overwrite `out` with the reverse complement of `seq`.
pub fn reverse_complement_into(seq: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend(seq.iter().rev().map(|&b| complement(b)));
}

/// Canonical form used when comparing pool entries: upper-case bases, `N` for everything else.
#[inline(always)]
pub fn normalize(b: u8) -> u8 {
    match encode(b) {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        3 => b'T',
        _ => b'N',
    }
}

/// What to do with pool entries that contain symbols outside `ACGT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Refuse to build.
    #[default]
    Reject,
    /// Keep the entry; the offending positions mismatch every query symbol.
    Mismatch,
}

/// Which orientations of a read are searched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrand {
    #[default]
    Forward,
    Reverse,
    Both,
}

impl SearchStrand {
    pub fn forward(self) -> bool {
        matches!(self, SearchStrand::Forward | SearchStrand::Both)
    }

    pub fn reverse(self) -> bool {
        matches!(self, SearchStrand::Reverse | SearchStrand::Both)
    }
}

/// Orientation that a template was found in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}
