//! Barcode searches that sit between a template match and the trie.

mod simple;
pub use simple::*;

mod segmented;
pub use segmented::*;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::alphabet::is_base;
use crate::pool::BarcodeIndex;
use crate::trie::{DuplicateAction, MatchStatus};

/// Per-worker scratch space for a [`BarcodeSearch`].
pub trait SearchState: Default {
    fn status(&self) -> MatchStatus;

    /// Mismatches of the reported barcode, summed over all segments.
    fn mismatches(&self) -> usize;
}

/// A barcode search that can be driven by
/// [`SimpleSingleMatch`](crate::single_match::SimpleSingleMatch).
pub trait BarcodeSearch {
    type State: SearchState;

    fn initialize(&self) -> Self::State;

    /// Length of the queries that this search accepts.
    fn length(&self) -> usize;

    /// Search with the configured budget, where no budget may exceed `remaining`.
    fn search_capped(&self, query: &[u8], state: &mut Self::State, remaining: usize);

    /// Move the cache of `state` into the shared cache of this search.
    fn reduce(&mut self, state: &mut Self::State);
}

/// Upper-cased sequence to index table used to skip the trie for exact hits.
///
/// Entries with symbols outside `ACGT` never match exactly, so they are left out. Later
/// duplicates follow `duplicates`; the `Error` case has already been rejected by the trie.
pub(crate) fn exact_table<'a>(
    seqs: impl IntoIterator<Item = &'a [u8]>,
    duplicates: DuplicateAction,
) -> FxHashMap<Vec<u8>, BarcodeIndex> {
    let mut exact = FxHashMap::default();
    let mut discarded = FxHashSet::default();

    for (i, seq) in seqs.into_iter().enumerate() {
        if !seq.iter().all(|&b| is_base(b)) {
            continue;
        }

        let key = seq.to_ascii_uppercase();
        if discarded.contains(&key) {
            continue;
        }

        match (exact.get_mut(&key), duplicates) {
            (None, _) => {
                exact.insert(key, i);
            }
            (Some(existing), DuplicateAction::UseLast) => *existing = i,
            (Some(_), DuplicateAction::Discard) => {
                exact.remove(&key);
                discarded.insert(key);
            }
            (Some(_), _) => (),
        }
    }

    exact
}
