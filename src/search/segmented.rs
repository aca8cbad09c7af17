use std::borrow::Cow;
use std::ops::Range;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::alphabet::*;
use crate::errors::*;
use crate::pool::*;
use crate::search::*;
use crate::trie::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combination {
    Barcode(u32),
    Discarded,
}

/// Result of [`SegmentedMismatches::search`].
///
/// `total` and `per_segment` are exact for a match. Otherwise they hold what was found
/// before the search gave up.
#[derive(Clone, Debug, Default)]
pub struct SegmentedHit {
    pub status: MatchStatus,
    pub total: usize,
    pub per_segment: Vec<usize>,
    ids: Vec<u32>,
}

impl SegmentedHit {
    fn reset(&mut self, segments: usize) {
        self.status = MatchStatus::Unmatched;
        self.total = 0;
        self.per_segment.clear();
        self.per_segment.resize(segments, 0);
        self.ids.clear();
    }
}

/// One trie per segment, plus a table from the per-segment values back to the pool.
///
/// Each segment is searched on its own with its own budget. A barcode only matches if
/// every segment resolves to a single value and the values together name exactly one
/// pool entry.
#[derive(Clone, Debug)]
pub struct SegmentedMismatches {
    segments: Vec<Range<usize>>,
    tries: Vec<MismatchTrie>,
    combinations: FxHashMap<Box<[u32]>, Combination>,
    length: usize,
    discarded: usize,
}

impl SegmentedMismatches {
    const NAME: &'static str = "SegmentedMismatches";

    pub fn new<'a>(
        segment_lengths: &[usize],
        seqs: impl IntoIterator<Item = &'a [u8]>,
        duplicates: DuplicateAction,
        ambiguity: AmbiguityPolicy,
    ) -> Result<Self> {
        if segment_lengths.is_empty() {
            return Err(config_error(Self::NAME, "at least one segment is required"));
        }
        if segment_lengths.contains(&0) {
            return Err(config_error(Self::NAME, "segment lengths must be positive"));
        }

        let mut segments = Vec::with_capacity(segment_lengths.len());
        let mut length = 0;
        for &len in segment_lengths {
            segments.push(length..length + len);
            length += len;
        }

        let mut ids: Vec<FxHashMap<Vec<u8>, u32>> = vec![FxHashMap::default(); segments.len()];
        let mut values: Vec<Vec<Vec<u8>>> = vec![Vec::new(); segments.len()];
        let mut combinations = FxHashMap::default();
        let mut discarded = 0;

        for (index, seq) in seqs.into_iter().enumerate() {
            if seq.len() != length {
                return Err(Error::MalformedSequence {
                    sequence: utf8(seq),
                    index,
                    context: Self::NAME,
                    reason: "sequence length differs from the sum of the segment lengths",
                });
            }
            if ambiguity == AmbiguityPolicy::Reject && !seq.iter().all(|&b| is_base(b)) {
                return Err(Error::MalformedSequence {
                    sequence: utf8(seq),
                    index,
                    context: Self::NAME,
                    reason: "sequence contains symbols outside ACGT",
                });
            }

            let key = segments
                .iter()
                .enumerate()
                .map(|(s, range)| {
                    let value: Vec<u8> = seq[range.clone()].iter().map(|&b| normalize(b)).collect();
                    let next = values[s].len() as u32;
                    *ids[s].entry(value).or_insert_with_key(|v| {
                        values[s].push(v.clone());
                        next
                    })
                })
                .collect::<Box<[u32]>>();

            match combinations.get_mut(&key) {
                None => {
                    combinations.insert(key, Combination::Barcode(index as u32));
                }
                Some(existing) => match (*existing, duplicates) {
                    (Combination::Discarded, _) | (_, DuplicateAction::UseFirst) => (),
                    (Combination::Barcode(first), DuplicateAction::Error) => {
                        return Err(Error::DuplicateSequence {
                            sequence: utf8(seq),
                            first: first as usize,
                            second: index,
                            context: Self::NAME,
                        });
                    }
                    (Combination::Barcode(_), DuplicateAction::UseLast) => {
                        *existing = Combination::Barcode(index as u32);
                    }
                    (Combination::Barcode(_), DuplicateAction::Discard) => {
                        *existing = Combination::Discarded;
                        discarded += 1;
                    }
                },
            }
        }

        // values within a segment are distinct, so the per-segment tries never see duplicates
        let tries = segments
            .iter()
            .zip(&values)
            .map(|(range, values)| {
                MismatchTrie::build(
                    range.len(),
                    values.iter().map(Vec::as_slice),
                    DuplicateAction::Error,
                    ambiguity,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            segments,
            tries,
            combinations,
            length,
            discarded,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Range<usize>] {
        &self.segments
    }

    /// Number of distinct values seen in each segment.
    pub fn distinct_values(&self) -> Vec<usize> {
        self.tries.iter().map(MismatchTrie::len).collect()
    }

    /// Search `query` with one mismatch budget per segment, reusing the buffers of `hit`.
    ///
    /// # Panics
    ///
    /// If `budgets` does not have one entry per segment.
    pub fn search(&self, query: &[u8], budgets: &[usize], hit: &mut SegmentedHit) {
        assert_eq!(
            budgets.len(),
            self.segments.len(),
            "expected one mismatch budget per segment"
        );

        hit.reset(self.segments.len());

        if query.len() != self.length {
            hit.total = budgets.iter().map(|b| b + 1).sum();
            return;
        }

        for (s, (trie, range)) in self.tries.iter().zip(&self.segments).enumerate() {
            let res = trie.search(&query[range.clone()], budgets[s]);
            hit.per_segment[s] = res.mismatches;
            hit.total += res.mismatches;

            match res.status {
                MatchStatus::Matched(id) => hit.ids.push(id as u32),
                _ => return,
            }
        }

        if let Some(Combination::Barcode(i)) = self.combinations.get(&hit.ids[..]) {
            hit.status = MatchStatus::Matched(*i as usize);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentedSearchOptions {
    /// One budget per segment, in the pool's segment order.
    pub max_mismatches: Vec<usize>,
    /// Index the reverse complement of every pool entry. Segment order flips with it.
    pub reverse: bool,
    pub duplicates: DuplicateAction,
    pub ambiguity: AmbiguityPolicy,
}

impl SegmentedSearchOptions {
    /// Options with the same budget for each of `num_segments` segments.
    pub fn uniform(num_segments: usize, max_mismatches: usize) -> Self {
        Self {
            max_mismatches: vec![max_mismatches; num_segments],
            ..Self::default()
        }
    }
}

// Budgets and per-segment counts are kept in search orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CacheEntry {
    status: MatchStatus,
    per_segment: Box<[usize]>,
    budgets: Box<[usize]>,
}

impl CacheEntry {
    fn usable(&self, budgets: &[usize]) -> bool {
        match self.status {
            MatchStatus::Matched(_) => true,
            // fewer mismatches allowed anywhere can only keep a miss a miss
            _ => budgets.iter().zip(self.budgets.iter()).all(|(b, c)| b <= c),
        }
    }
}

/// Search for the closest barcode built from several independently budgeted segments.
#[derive(Clone, Debug)]
pub struct SegmentedBarcodeSearch {
    core: SegmentedMismatches,
    max_mismatches: Vec<usize>,
    reverse: bool,
    exact: FxHashMap<Vec<u8>, BarcodeIndex>,
    cache: FxHashMap<Vec<u8>, CacheEntry>,
}

/// Result and private cache of a [`SegmentedBarcodeSearch`], one per worker.
#[derive(Clone, Debug, Default)]
pub struct SegmentedState {
    pub status: MatchStatus,
    /// Sum over all segments.
    pub mismatches: usize,
    /// Mismatches per segment, in the pool's segment order.
    pub per_segment: Vec<usize>,
    hit: SegmentedHit,
    budgets: Vec<usize>,
    cache: FxHashMap<Vec<u8>, CacheEntry>,
}

impl SearchState for SegmentedState {
    fn status(&self) -> MatchStatus {
        self.status
    }

    fn mismatches(&self) -> usize {
        self.mismatches
    }
}

impl SegmentedBarcodeSearch {
    const NAME: &'static str = "SegmentedBarcodeSearch";

    /// Build a search over `pool`, where each entry is the concatenation of segments with
    /// the given lengths.
    pub fn new(pool: &BarcodePool, segment_lengths: &[usize], options: SegmentedSearchOptions) -> Result<Self> {
        if segment_lengths.len() != options.max_mismatches.len() {
            return Err(config_error(
                Self::NAME,
                format!(
                    "{} segments but {} mismatch budgets",
                    segment_lengths.len(),
                    options.max_mismatches.len()
                ),
            ));
        }
        if segment_lengths.contains(&0) {
            return Err(config_error(Self::NAME, "segment lengths must be positive"));
        }
        if segment_lengths.iter().sum::<usize>() != pool.length() {
            return Err(config_error(
                Self::NAME,
                format!(
                    "segment lengths {:?} do not add up to the barcode length {}",
                    segment_lengths,
                    pool.length()
                ),
            ));
        }
        if let Some((len, max)) = segment_lengths
            .iter()
            .zip(&options.max_mismatches)
            .find(|(len, max)| max >= len)
        {
            return Err(config_error(
                Self::NAME,
                format!("mismatch budget {} must be smaller than the segment length {}", max, len),
            ));
        }

        let mut segment_lengths = segment_lengths.to_vec();
        let mut max_mismatches = options.max_mismatches.clone();
        let pool = if options.reverse {
            segment_lengths.reverse();
            max_mismatches.reverse();
            Cow::Owned(pool.reverse_complemented())
        } else {
            Cow::Borrowed(pool)
        };

        let core = SegmentedMismatches::new(&segment_lengths, pool.iter(), options.duplicates, options.ambiguity)?;
        let exact = exact_table(pool.iter(), options.duplicates);

        debug!(
            barcodes = pool.len(),
            segments = ?segment_lengths,
            distinct = ?core.distinct_values(),
            max_mismatches = ?max_mismatches,
            reverse = options.reverse,
            "built segmented barcode search"
        );
        if core.discarded > 0 {
            warn!(discarded = core.discarded, "discarded duplicated segment combinations");
        }

        Ok(Self {
            core,
            max_mismatches,
            reverse: options.reverse,
            exact,
            cache: FxHashMap::default(),
        })
    }

    pub fn num_segments(&self) -> usize {
        self.core.num_segments()
    }

    /// Configured budgets in the pool's segment order.
    pub fn max_mismatches(&self) -> Vec<usize> {
        let mut res = self.max_mismatches.clone();
        if self.reverse {
            res.reverse();
        }
        res
    }

    pub fn initialize(&self) -> SegmentedState {
        SegmentedState {
            per_segment: vec![0; self.num_segments()],
            ..SegmentedState::default()
        }
    }

    /// Search `query` with the configured per-segment budgets.
    pub fn search(&self, query: &[u8], state: &mut SegmentedState) {
        state.budgets.clear();
        state.budgets.extend_from_slice(&self.max_mismatches);
        self.search_oriented(query, state);
    }

    /// Search `query` with explicit budgets, given in the pool's segment order.
    ///
    /// # Panics
    ///
    /// If `allowed` does not have one entry per segment.
    pub fn search_with(&self, query: &[u8], state: &mut SegmentedState, allowed: &[usize]) {
        assert_eq!(
            allowed.len(),
            self.num_segments(),
            "expected one mismatch budget per segment"
        );

        state.budgets.clear();
        state.budgets.extend_from_slice(allowed);
        if self.reverse {
            state.budgets.reverse();
        }
        self.search_oriented(query, state);
    }

    fn search_oriented(&self, query: &[u8], state: &mut SegmentedState) {
        if let Some(&i) = self.exact.get(query) {
            state.status = MatchStatus::Matched(i);
            state.mismatches = 0;
            state.per_segment.clear();
            state.per_segment.resize(self.num_segments(), 0);
            return;
        }

        let cached = match self.cache.get(query) {
            Some(e) if e.usable(&state.budgets) => Some(e),
            _ => state.cache.get(query).filter(|e| e.usable(&state.budgets)),
        };

        if let Some(entry) = cached {
            let within = entry.per_segment.iter().zip(&state.budgets).all(|(m, b)| m <= b);
            state.status = if within { entry.status } else { MatchStatus::Unmatched };
            state.mismatches = entry.per_segment.iter().sum();
            state.per_segment.clear();
            state.per_segment.extend_from_slice(&entry.per_segment);
        } else {
            self.core.search(query, &state.budgets, &mut state.hit);

            let entry = CacheEntry {
                status: state.hit.status,
                per_segment: state.hit.per_segment.clone().into_boxed_slice(),
                budgets: state.budgets.clone().into_boxed_slice(),
            };
            state.cache.insert(query.to_vec(), entry);

            state.status = state.hit.status;
            state.mismatches = state.hit.total;
            state.per_segment.clear();
            state.per_segment.extend_from_slice(&state.hit.per_segment);
        }

        if self.reverse {
            state.per_segment.reverse();
        }
    }

    /// Fold the private cache of `state` into the shared cache and clear it.
    pub fn reduce(&mut self, state: &mut SegmentedState) {
        for (query, entry) in state.cache.drain() {
            match self.cache.get_mut(&query) {
                None => {
                    self.cache.insert(query, entry);
                }
                Some(existing) if !existing.status.is_matched() => *existing = entry,
                Some(_) => (),
            }
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl BarcodeSearch for SegmentedBarcodeSearch {
    type State = SegmentedState;

    fn initialize(&self) -> SegmentedState {
        SegmentedBarcodeSearch::initialize(self)
    }

    fn length(&self) -> usize {
        self.core.length()
    }

    fn search_capped(&self, query: &[u8], state: &mut SegmentedState, remaining: usize) {
        state.budgets.clear();
        state
            .budgets
            .extend(self.max_mismatches.iter().map(|&m| m.min(remaining)));
        self.search_oriented(query, state);
    }

    fn reduce(&mut self, state: &mut SegmentedState) {
        SegmentedBarcodeSearch::reduce(self, state);
    }
}
