use std::borrow::Cow;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::alphabet::AmbiguityPolicy;
use crate::errors::*;
use crate::pool::*;
use crate::search::*;
use crate::trie::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimpleSearchOptions {
    /// Largest mismatch count that still counts as a match.
    pub max_mismatches: usize,
    /// Index the reverse complement of every pool entry instead of the entry itself.
    pub reverse: bool,
    pub duplicates: DuplicateAction,
    pub ambiguity: AmbiguityPolicy,
}

/// Cached outcome for one query. For a miss, `mismatches` is the lower bound that was
/// established, so a later search with a larger budget has to go back to the trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CacheEntry {
    status: MatchStatus,
    mismatches: usize,
}

impl CacheEntry {
    fn resolve(self, allowed: usize) -> Option<(MatchStatus, usize)> {
        match self.status {
            MatchStatus::Unmatched if allowed < self.mismatches => Some((MatchStatus::Unmatched, allowed + 1)),
            MatchStatus::Unmatched => None,
            _ if self.mismatches > allowed => Some((MatchStatus::Unmatched, allowed + 1)),
            status => Some((status, self.mismatches)),
        }
    }

    fn more_informative(self, other: CacheEntry) -> bool {
        match (self.status, other.status) {
            (MatchStatus::Unmatched, MatchStatus::Unmatched) => self.mismatches > other.mismatches,
            (MatchStatus::Unmatched, _) => false,
            (_, MatchStatus::Unmatched) => true,
            _ => false,
        }
    }
}

/// Search for the closest barcode to a query that covers the whole barcode.
#[derive(Clone, Debug)]
pub struct SimpleBarcodeSearch {
    trie: MismatchTrie,
    max_mismatches: usize,
    exact: FxHashMap<Vec<u8>, BarcodeIndex>,
    cache: FxHashMap<Vec<u8>, CacheEntry>,
}

/// Result and private cache of a [`SimpleBarcodeSearch`], one per worker.
#[derive(Clone, Debug, Default)]
pub struct SimpleState {
    pub status: MatchStatus,
    /// Mismatches to the reported barcode, or one more than the budget if nothing matched.
    pub mismatches: usize,
    cache: FxHashMap<Vec<u8>, CacheEntry>,
}

impl SimpleState {
    fn set(&mut self, status: MatchStatus, mismatches: usize) {
        self.status = status;
        self.mismatches = mismatches;
    }
}

impl SearchState for SimpleState {
    fn status(&self) -> MatchStatus {
        self.status
    }

    fn mismatches(&self) -> usize {
        self.mismatches
    }
}

impl SimpleBarcodeSearch {
    const NAME: &'static str = "SimpleBarcodeSearch";

    pub fn new(pool: &BarcodePool, options: SimpleSearchOptions) -> Result<Self> {
        if pool.length() > 0 && options.max_mismatches >= pool.length() {
            return Err(config_error(
                Self::NAME,
                format!(
                    "mismatch budget {} must be smaller than the barcode length {}",
                    options.max_mismatches,
                    pool.length()
                ),
            ));
        }

        let pool = if options.reverse {
            Cow::Owned(pool.reverse_complemented())
        } else {
            Cow::Borrowed(pool)
        };

        let trie = MismatchTrie::from_pool(&pool, options.duplicates, options.ambiguity)?;
        let exact = exact_table(pool.iter(), options.duplicates);

        debug!(
            barcodes = pool.len(),
            exact = exact.len(),
            max_mismatches = options.max_mismatches,
            reverse = options.reverse,
            "built simple barcode search"
        );

        Ok(Self {
            trie,
            max_mismatches: options.max_mismatches,
            exact,
            cache: FxHashMap::default(),
        })
    }

    pub fn max_mismatches(&self) -> usize {
        self.max_mismatches
    }

    pub fn initialize(&self) -> SimpleState {
        SimpleState::default()
    }

    /// Search `query` with the configured mismatch budget.
    pub fn search(&self, query: &[u8], state: &mut SimpleState) {
        self.search_with(query, state, self.max_mismatches);
    }

    /// Search `query` with an explicit mismatch budget.
    pub fn search_with(&self, query: &[u8], state: &mut SimpleState, allowed: usize) {
        if let Some(&i) = self.exact.get(query) {
            state.set(MatchStatus::Matched(i), 0);
            return;
        }

        let cached = match self.cache.get(query).and_then(|e| e.resolve(allowed)) {
            Some(resolved) => Some(resolved),
            None => state.cache.get(query).and_then(|e| e.resolve(allowed)),
        };
        if let Some((status, mismatches)) = cached {
            state.set(status, mismatches);
            return;
        }

        let hit = self.trie.search(query, allowed);
        state.cache.insert(
            query.to_vec(),
            CacheEntry {
                status: hit.status,
                mismatches: hit.mismatches,
            },
        );
        state.set(hit.status, hit.mismatches);
    }

    /// Fold the private cache of `state` into the shared cache and clear it.
    pub fn reduce(&mut self, state: &mut SimpleState) {
        for (query, entry) in state.cache.drain() {
            self.cache
                .entry(query)
                .and_modify(|e| {
                    if entry.more_informative(*e) {
                        *e = entry;
                    }
                })
                .or_insert(entry);
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl BarcodeSearch for SimpleBarcodeSearch {
    type State = SimpleState;

    fn initialize(&self) -> SimpleState {
        SimpleBarcodeSearch::initialize(self)
    }

    fn length(&self) -> usize {
        self.trie.length()
    }

    fn search_capped(&self, query: &[u8], state: &mut SimpleState, remaining: usize) {
        self.search_with(query, state, self.max_mismatches.min(remaining));
    }

    fn reduce(&mut self, state: &mut SimpleState) {
        SimpleBarcodeSearch::reduce(self, state);
    }
}
