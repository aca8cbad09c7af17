//! Mismatch-tolerant trie over fixed-length barcodes.
//!
//! Every node has one child slot per base plus a wildcard slot. The wildcard slot holds
//! pool positions that are not `ACGT` (only when [`AmbiguityPolicy::Mismatch`] is set) and
//! costs one mismatch for every query symbol. Nodes live in a flat arena and refer to
//! their children by integer id; the children of the last level are ids into a separate
//! leaf table.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alphabet::*;
use crate::errors::*;
use crate::pool::*;

const SLOTS: usize = NUM_BASES + 1;
const WILDCARD: usize = NUM_BASES;
const NIL: u32 = u32::MAX;

/// How to resolve two pool entries that index the same sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    /// Fail the construction.
    #[default]
    Error,
    /// Keep the entry with the lowest pool index.
    UseFirst,
    /// Keep the entry with the highest pool index.
    UseLast,
    /// Drop the sequence so that nothing ever matches it. Queries closest to a dropped
    /// sequence match nothing either.
    Discard,
}

/// Outcome of a single barcode search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Matched(BarcodeIndex),
    /// Two or more barcodes share the lowest mismatch count.
    Ambiguous,
    /// Nothing within the mismatch budget.
    #[default]
    Unmatched,
}

impl MatchStatus {
    pub fn index(self) -> Option<BarcodeIndex> {
        match self {
            MatchStatus::Matched(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_matched(self) -> bool {
        matches!(self, MatchStatus::Matched(_))
    }
}

/// Result of [`MismatchTrie::search`].
///
/// `mismatches` is the best cost for a match or an ambiguity. For
/// [`MatchStatus::Unmatched`] it is a lower bound, one more than the budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrieHit {
    pub status: MatchStatus,
    pub mismatches: usize,
}

/// What happened when a sequence was added.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddStatus {
    /// The sequence was already present.
    pub duplicate: bool,
    /// The sequence is now (or was already) discarded.
    pub discarded: bool,
    /// The sequence contains positions outside `ACGT`.
    pub wildcard: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrieSummary {
    pub sequences: usize,
    pub duplicates: usize,
    pub discarded: usize,
    pub wildcards: usize,
    pub nodes: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Leaf {
    Barcode(u32),
    Discarded,
}

#[derive(Clone, Debug)]
pub struct MismatchTrie {
    length: usize,
    nodes: Vec<[u32; SLOTS]>,
    leaves: Vec<Leaf>,
    duplicates: DuplicateAction,
    ambiguity: AmbiguityPolicy,
    summary: TrieSummary,
}

impl MismatchTrie {
    const NAME: &'static str = "MismatchTrie";

    /// Create an empty trie for sequences of `length` symbols.
    pub fn new(length: usize, duplicates: DuplicateAction, ambiguity: AmbiguityPolicy) -> Result<Self> {
        if length == 0 {
            return Err(config_error(Self::NAME, "barcode length must be positive"));
        }

        Ok(Self {
            length,
            nodes: vec![[NIL; SLOTS]],
            leaves: Vec::new(),
            duplicates,
            ambiguity,
            summary: TrieSummary {
                nodes: 1,
                ..TrieSummary::default()
            },
        })
    }

    /// Build a trie over every sequence of `pool`, in pool order.
    pub fn from_pool(pool: &BarcodePool, duplicates: DuplicateAction, ambiguity: AmbiguityPolicy) -> Result<Self> {
        Self::build(pool.length(), pool.iter(), duplicates, ambiguity)
    }

    /// Build a trie over arbitrary sequences. The n-th sequence gets index n.
    pub fn build<'a>(
        length: usize,
        seqs: impl IntoIterator<Item = &'a [u8]>,
        duplicates: DuplicateAction,
        ambiguity: AmbiguityPolicy,
    ) -> Result<Self> {
        let mut trie = Self::new(length, duplicates, ambiguity)?;

        for seq in seqs {
            trie.add(seq)?;
        }

        trie.optimize();

        let summary = trie.summary;
        debug!(
            sequences = summary.sequences,
            duplicates = summary.duplicates,
            wildcards = summary.wildcards,
            nodes = summary.nodes,
            length,
            "built mismatch trie"
        );
        if summary.discarded > 0 {
            warn!(discarded = summary.discarded, "discarded duplicated barcode sequences");
        }

        Ok(trie)
    }

    /// Add a sequence. Its index is the number of sequences added before it, including
    /// duplicates.
    pub fn add(&mut self, seq: &[u8]) -> Result<AddStatus> {
        let index = self.summary.sequences;

        if seq.len() != self.length {
            return Err(Error::MalformedSequence {
                sequence: utf8(seq),
                index,
                context: Self::NAME,
                reason: "sequence length differs from the barcode length",
            });
        }

        if index >= NIL as usize {
            return Err(config_error(Self::NAME, "too many barcode sequences"));
        }

        let mut status = AddStatus::default();

        if seq.iter().any(|&b| !is_base(b)) {
            if self.ambiguity == AmbiguityPolicy::Reject {
                return Err(Error::MalformedSequence {
                    sequence: utf8(seq),
                    index,
                    context: Self::NAME,
                    reason: "sequence contains symbols outside ACGT",
                });
            }
            status.wildcard = true;
        }

        let mut node = 0;
        let last = self.length - 1;

        for (pos, &b) in seq.iter().enumerate() {
            let code = encode(b) as usize;
            let slot = if code < NUM_BASES { code } else { WILDCARD };

            if pos == last {
                self.finish(node, slot, index, seq, &mut status)?;
            } else {
                node = self.child_or_insert(node, slot);
            }
        }

        self.summary.sequences += 1;
        if status.wildcard {
            self.summary.wildcards += 1;
        }

        Ok(status)
    }

    fn child_or_insert(&mut self, node: usize, slot: usize) -> usize {
        let child = self.nodes[node][slot];

        if child != NIL {
            return child as usize;
        }

        let id = self.nodes.len();
        self.nodes[node][slot] = id as u32;
        self.nodes.push([NIL; SLOTS]);
        self.summary.nodes += 1;
        id
    }

    fn finish(&mut self, node: usize, slot: usize, index: usize, seq: &[u8], status: &mut AddStatus) -> Result<()> {
        let existing = self.nodes[node][slot];

        if existing == NIL {
            self.nodes[node][slot] = self.leaves.len() as u32;
            self.leaves.push(Leaf::Barcode(index as u32));
            return Ok(());
        }

        status.duplicate = true;
        self.summary.duplicates += 1;

        let leaf = &mut self.leaves[existing as usize];
        match (*leaf, self.duplicates) {
            (Leaf::Discarded, _) => status.discarded = true,
            (Leaf::Barcode(first), DuplicateAction::Error) => {
                return Err(Error::DuplicateSequence {
                    sequence: utf8(seq),
                    first: first as usize,
                    second: index,
                    context: Self::NAME,
                });
            }
            (Leaf::Barcode(_), DuplicateAction::UseFirst) => (),
            (Leaf::Barcode(_), DuplicateAction::UseLast) => *leaf = Leaf::Barcode(index as u32),
            (Leaf::Barcode(_), DuplicateAction::Discard) => {
                *leaf = Leaf::Discarded;
                status.discarded = true;
                self.summary.discarded += 1;
            }
        }

        Ok(())
    }

    /// Re-lay the node arena in depth-first order so that searches walk memory forward.
    pub fn optimize(&mut self) {
        if self.is_optimal() {
            return;
        }

        let mut replacement = Vec::with_capacity(self.nodes.len());
        self.relocate(0, 0, &mut replacement);
        self.nodes = replacement;
    }

    // Preorder ids must come out as 0, 1, 2, ... in slot order.
    fn is_optimal(&self) -> bool {
        let mut next = 0u32;
        let mut stack = vec![(0u32, 0usize)];

        while let Some((node, depth)) = stack.pop() {
            if node != next {
                return false;
            }
            next += 1;

            if depth + 1 < self.length {
                for &child in self.nodes[node as usize].iter().rev() {
                    if child != NIL {
                        stack.push((child, depth + 1));
                    }
                }
            }
        }

        true
    }

    fn relocate(&self, node: usize, depth: usize, out: &mut Vec<[u32; SLOTS]>) {
        let new_node = out.len();
        out.push(self.nodes[node]);

        if depth + 1 < self.length {
            for s in 0..SLOTS {
                let child = out[new_node][s];
                if child == NIL {
                    continue;
                }

                out[new_node][s] = out.len() as u32;
                self.relocate(child as usize, depth + 1, out);
            }
        }
    }

    /// Find the pool entry with the fewest substitutions to `query`, allowing at most
    /// `max_mismatches`.
    ///
    /// Query symbols outside `ACGT` mismatch every branch. A query of the wrong length
    /// never matches. A discarded sequence at the lowest count makes the query unmatched.
    pub fn search(&self, query: &[u8], max_mismatches: usize) -> TrieHit {
        if query.len() != self.length {
            return TrieHit {
                status: MatchStatus::Unmatched,
                mismatches: max_mismatches.saturating_add(1),
            };
        }

        let mut cursor = Cursor {
            query,
            cap: max_mismatches,
            best: None,
            ambiguous: false,
            blocked: false,
        };
        self.descend(&mut cursor, 0, 0, 0);

        match cursor.best {
            Some((Leaf::Barcode(index), cost)) if !cursor.blocked => TrieHit {
                status: if cursor.ambiguous {
                    MatchStatus::Ambiguous
                } else {
                    MatchStatus::Matched(index as usize)
                },
                mismatches: cost,
            },
            // nothing found, or a discarded sequence is among the closest
            _ => TrieHit {
                status: MatchStatus::Unmatched,
                mismatches: max_mismatches.saturating_add(1),
            },
        }
    }

    // Invariant: cost <= cursor.cap on entry.
    fn descend(&self, cursor: &mut Cursor, node: usize, pos: usize, cost: usize) {
        let code = encode(cursor.query[pos]) as usize;
        let exact = if code < NUM_BASES { code } else { SLOTS };
        let slots = self.nodes[node];
        let last = pos + 1 == self.length;

        // exact branch first so that the cap tightens as early as possible
        if exact < SLOTS && slots[exact] != NIL {
            self.visit(cursor, slots[exact], pos, cost, last);
        }

        let cost = cost + 1;
        for (s, &child) in slots.iter().enumerate() {
            if cost > cursor.cap {
                break;
            }
            if s == exact || child == NIL {
                continue;
            }
            self.visit(cursor, child, pos, cost, last);
        }
    }

    #[inline(always)]
    fn visit(&self, cursor: &mut Cursor, child: u32, pos: usize, cost: usize, last: bool) {
        if last {
            cursor.offer(self.leaves[child as usize], cost);
        } else {
            self.descend(cursor, child as usize, pos + 1, cost);
        }
    }

    /// Number of symbols in every indexed sequence.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of sequences added, duplicates included.
    pub fn len(&self) -> usize {
        self.summary.sequences
    }

    pub fn is_empty(&self) -> bool {
        self.summary.sequences == 0
    }

    pub fn summary(&self) -> TrieSummary {
        self.summary
    }

    pub fn duplicates(&self) -> DuplicateAction {
        self.duplicates
    }

    pub fn ambiguity(&self) -> AmbiguityPolicy {
        self.ambiguity
    }
}

// Discarded leaves take part in the search so that they block their neighbours.
struct Cursor<'a> {
    query: &'a [u8],
    cap: usize,
    best: Option<(Leaf, usize)>,
    ambiguous: bool,
    blocked: bool,
}

impl Cursor<'_> {
    #[inline(always)]
    fn offer(&mut self, leaf: Leaf, cost: usize) {
        match self.best {
            Some((_, best_cost)) if cost > best_cost => (),
            Some((best_leaf, best_cost)) if cost == best_cost => {
                if leaf == Leaf::Discarded {
                    self.blocked = true;
                } else if leaf != best_leaf {
                    self.ambiguous = true;
                }
            }
            _ => {
                self.best = Some((leaf, cost));
                self.ambiguous = false;
                self.blocked = leaf == Leaf::Discarded;
                self.cap = cost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(seqs: &[&str], duplicates: DuplicateAction) -> Result<MismatchTrie> {
        let pool = BarcodePool::new(seqs)?;
        MismatchTrie::from_pool(&pool, duplicates, AmbiguityPolicy::Reject)
    }

    fn hit(status: MatchStatus, mismatches: usize) -> TrieHit {
        TrieHit { status, mismatches }
    }

    #[test]
    fn small_pool_with_one_mismatch() {
        let t = trie(&["AACC", "AACG", "GGTT"], DuplicateAction::Error).unwrap();

        assert_eq!(t.search(b"AACC", 1), hit(MatchStatus::Matched(0), 0));
        assert_eq!(t.search(b"AACT", 1), hit(MatchStatus::Ambiguous, 1));
        assert_eq!(t.search(b"GGTA", 1), hit(MatchStatus::Matched(2), 1));
        assert_eq!(t.search(b"TTTT", 1), hit(MatchStatus::Unmatched, 2));
    }

    #[test]
    fn finds_best_across_branches() {
        let t = trie(&["ACGT", "AAAA", "ACAA", "AGTT"], DuplicateAction::Error).unwrap();

        assert_eq!(t.search(b"ACGT", 0), hit(MatchStatus::Matched(0), 0));
        assert_eq!(t.search(b"AAAT", 1), hit(MatchStatus::Matched(1), 1));
        assert_eq!(t.search(b"CCAG", 2), hit(MatchStatus::Matched(2), 2));
        assert_eq!(t.search(b"AGTT", 0), hit(MatchStatus::Matched(3), 0));
        assert_eq!(t.search(b"acgt", 0), hit(MatchStatus::Matched(0), 0));
    }

    #[test]
    fn capped_search_reports_lower_bound() {
        let t = trie(&["ACGT", "AAAA", "ACAA", "AGTT"], DuplicateAction::Error).unwrap();

        assert_eq!(t.search(b"AAAT", 0), hit(MatchStatus::Unmatched, 1));
        assert_eq!(t.search(b"CCAG", 1), hit(MatchStatus::Unmatched, 2));
    }

    #[test]
    fn longer_barcodes() {
        let t = trie(&["ACGTACGTACGT", "TTTGGGCCCAAA"], DuplicateAction::Error).unwrap();

        assert_eq!(t.search(b"ACGTACGTCCGT", 2), hit(MatchStatus::Matched(0), 1));
        assert_eq!(t.search(b"TCGTACGTCCGT", 2), hit(MatchStatus::Matched(0), 2));
        assert_eq!(t.search(b"TTTGGGGCCAAA", 2), hit(MatchStatus::Matched(1), 1));
        assert_eq!(t.search(b"TTGGGGGCCAAA", 2), hit(MatchStatus::Matched(1), 2));
    }

    #[test]
    fn query_ns_always_mismatch() {
        let t = trie(&["ACGTACGTACGT", "TTTGGGCCCAAA"], DuplicateAction::Error).unwrap();

        assert_eq!(t.search(b"ACGTACGTACGN", 0).status, MatchStatus::Unmatched);
        assert_eq!(t.search(b"ACGTACGTACGN", 1), hit(MatchStatus::Matched(0), 1));
        assert_eq!(t.search(b"TTNGGGNCCAAA", 1).status, MatchStatus::Unmatched);
        assert_eq!(t.search(b"TTNGGGNCCAAA", 2), hit(MatchStatus::Matched(1), 2));
    }

    #[test]
    fn ties_are_ambiguous() {
        let t = trie(&["AAAAGAAAA", "AAAACAAAA", "AAAAAAAAG", "AAAAAAAAC"], DuplicateAction::Error).unwrap();

        assert_eq!(t.search(b"AAAACAAAA", 1), hit(MatchStatus::Matched(1), 0));
        assert_eq!(t.search(b"AAAATAAAA", 1), hit(MatchStatus::Ambiguous, 1));
        assert_eq!(t.search(b"AAAAAAAAT", 1), hit(MatchStatus::Ambiguous, 1));
        // the ambiguity at cost 1 is superseded by nothing cheaper
        assert_eq!(t.search(b"AAAATAAAA", 2), hit(MatchStatus::Ambiguous, 1));
        // a cheaper unique hit beats an earlier tie
        assert_eq!(t.search(b"AAAAAAAAG", 2), hit(MatchStatus::Matched(2), 0));
    }

    #[test]
    fn wrong_query_length_never_matches() {
        let t = trie(&["ACGT"], DuplicateAction::Error).unwrap();
        assert_eq!(t.search(b"ACG", 3), hit(MatchStatus::Unmatched, 4));
    }

    #[test]
    fn duplicate_error() {
        let err = trie(&["AAAA", "AAAA"], DuplicateAction::Error).unwrap_err();
        assert!(matches!(err, Error::DuplicateSequence { first: 0, second: 1, .. }));
    }

    #[test]
    fn duplicate_use_first() {
        let t = trie(&["AAAA", "CCCC", "AAAA"], DuplicateAction::UseFirst).unwrap();
        assert_eq!(t.search(b"AAAA", 0), hit(MatchStatus::Matched(0), 0));
        assert_eq!(t.search(b"AAAT", 1), hit(MatchStatus::Matched(0), 1));
        assert_eq!(t.len(), 3);
        assert_eq!(t.summary().duplicates, 1);
    }

    #[test]
    fn duplicate_use_last() {
        let t = trie(&["AAAA", "CCCC", "AAAA", "AAAA"], DuplicateAction::UseLast).unwrap();
        assert_eq!(t.search(b"AAAA", 0), hit(MatchStatus::Matched(3), 0));
        assert_eq!(t.search(b"AAAT", 1), hit(MatchStatus::Matched(3), 1));
        assert_eq!(t.summary().duplicates, 2);
    }

    #[test]
    fn duplicate_discard() {
        let t = trie(&["AAAA", "AAAA", "AAAA"], DuplicateAction::Discard).unwrap();
        assert_eq!(t.search(b"AAAA", 0).status, MatchStatus::Unmatched);
        assert_eq!(t.search(b"AAAT", 2).status, MatchStatus::Unmatched);
        assert_eq!(t.summary().discarded, 1);
        assert_eq!(t.summary().duplicates, 2);

    }

    #[test]
    fn discarded_sequences_block_their_neighbours() {
        let t = trie(&["AAAA", "AAAA", "AAAT"], DuplicateAction::Discard).unwrap();

        assert_eq!(t.search(b"AAAA", 1), hit(MatchStatus::Unmatched, 2));
        // ties with the discarded sequence at one mismatch
        assert_eq!(t.search(b"AAAC", 1), hit(MatchStatus::Unmatched, 2));
        assert_eq!(t.search(b"AAAT", 1), hit(MatchStatus::Matched(2), 0));
        assert_eq!(t.search(b"AATT", 2), hit(MatchStatus::Matched(2), 1));
        // out of reach of the budget, so it cannot block
        assert_eq!(t.search(b"ACGT", 2), hit(MatchStatus::Matched(2), 2));
    }

    #[test]
    fn add_reports_status() {
        let mut t = MismatchTrie::new(3, DuplicateAction::Discard, AmbiguityPolicy::Mismatch).unwrap();

        assert_eq!(t.add(b"ACG").unwrap(), AddStatus::default());
        let status = t.add(b"ACG").unwrap();
        assert!(status.duplicate && status.discarded);
        let status = t.add(b"ANG").unwrap();
        assert!(status.wildcard && !status.duplicate);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn rejects_malformed_sequences() {
        let err = trie(&["ACGN"], DuplicateAction::Error).unwrap_err();
        assert!(matches!(err, Error::MalformedSequence { index: 0, .. }));

        let mut t = MismatchTrie::new(4, DuplicateAction::Error, AmbiguityPolicy::Reject).unwrap();
        assert!(matches!(t.add(b"ACG"), Err(Error::MalformedSequence { .. })));
        assert!(t.is_empty());

        assert!(matches!(
            MismatchTrie::new(0, DuplicateAction::Error, AmbiguityPolicy::Reject),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn tolerated_wildcards_always_mismatch() {
        let pool = BarcodePool::new(["ACGN", "TTTT"]).unwrap();
        let t = MismatchTrie::from_pool(&pool, DuplicateAction::Error, AmbiguityPolicy::Mismatch).unwrap();

        assert_eq!(t.search(b"ACGT", 0).status, MatchStatus::Unmatched);
        assert_eq!(t.search(b"ACGT", 1), hit(MatchStatus::Matched(0), 1));
        assert_eq!(t.search(b"ACGN", 1), hit(MatchStatus::Matched(0), 1));
        assert_eq!(t.search(b"ACGA", 1), hit(MatchStatus::Matched(0), 1));
        assert_eq!(t.summary().wildcards, 1);
    }

    #[test]
    fn optimize_lays_nodes_out_in_preorder() {
        // unsorted insertion order leaves the arena out of preorder
        let seqs = ["TTTT", "AAAA", "TTTA", "CAGT", "AAAC", "GGGG", "CAGA"];
        let mut t = MismatchTrie::new(4, DuplicateAction::Error, AmbiguityPolicy::Reject).unwrap();
        for s in seqs {
            t.add(s.as_bytes()).unwrap();
        }
        assert!(!t.is_optimal());

        let before: Vec<_> = ["TTTT", "AAAT", "CAGC", "GGGA", "ACGT"]
            .iter()
            .map(|q| t.search(q.as_bytes(), 2))
            .collect();

        t.optimize();
        assert!(t.is_optimal());
        assert_eq!(t.nodes.len(), t.summary().nodes);

        let after: Vec<_> = ["TTTT", "AAAT", "CAGC", "GGGA", "ACGT"]
            .iter()
            .map(|q| t.search(q.as_bytes(), 2))
            .collect();
        assert_eq!(before, after);
    }
}
