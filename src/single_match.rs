//! Matching one barcode per read: find the template, then identify its variable
//! region against the pool.

use std::cell::RefCell;
use std::ops::Range;

use thread_local::ThreadLocal;
use tracing::debug;

use crate::alphabet::*;
use crate::errors::*;
use crate::pool::*;
use crate::search::*;
use crate::template::*;
use crate::trie::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SingleMatchOptions {
    /// Largest number of mismatches over the whole template, constant and variable
    /// regions together.
    pub max_mismatches: usize,
    pub duplicates: DuplicateAction,
    pub ambiguity: AmbiguityPolicy,
}

/// Locate a template in a read and identify the barcode in its variable regions.
///
/// The variable regions are read in read order and concatenated into the query. Reverse
/// strand placements are looked up in a second search over the reverse complemented pool.
#[derive(Clone, Debug)]
pub struct SimpleSingleMatch<S = SimpleBarcodeSearch> {
    template: ScanTemplate,
    forward: Option<S>,
    reverse: Option<S>,
    max_mismatches: usize,
}

/// Outcome of a search over one read, reused across reads by one worker.
///
/// Everything except `status` is only meaningful when `status` is
/// [`MatchStatus::Matched`].
#[derive(Clone, Debug, Default)]
pub struct MatchState<T> {
    pub status: MatchStatus,
    /// Start of the template in the read.
    pub position: usize,
    /// Constant and variable mismatches together.
    pub mismatches: usize,
    pub variable_mismatches: usize,
    pub strand: Strand,
    /// Absolute ranges of the variable regions in the read, in read order.
    pub regions: Vec<Range<usize>>,
    buffer: Vec<u8>,
    forward_details: T,
    reverse_details: T,
}

impl<T> MatchState<T> {
    fn reset(&mut self) {
        self.status = MatchStatus::Unmatched;
        self.position = 0;
        self.mismatches = 0;
        self.variable_mismatches = 0;
        self.strand = Strand::Forward;
        self.regions.clear();
    }

    /// Barcode search state for the strand of the last reported match.
    pub fn details(&self) -> &T {
        self.details_for(self.strand)
    }

    fn details_for(&self, strand: Strand) -> &T {
        match strand {
            Strand::Forward => &self.forward_details,
            Strand::Reverse => &self.reverse_details,
        }
    }

    fn record(&mut self, placement: &Placement, index: BarcodeIndex, variable_mismatches: usize) {
        self.status = MatchStatus::Matched(index);
        self.position = placement.position;
        self.mismatches = placement.mismatches + variable_mismatches;
        self.variable_mismatches = variable_mismatches;
        self.strand = placement.strand;
        self.regions.clear();
        self.regions.extend(placement.variable_regions());
    }
}

impl SimpleSingleMatch<SimpleBarcodeSearch> {
    /// Match single barcodes from `pool`.
    pub fn new(template: ScanTemplate, pool: &BarcodePool, options: SingleMatchOptions) -> Result<Self> {
        check_length(&template, pool)?;

        // the barcode never gets more than the whole budget, and never its whole length
        let max_mismatches = options.max_mismatches.min(pool.length().saturating_sub(1));
        let build = |reverse| {
            SimpleBarcodeSearch::new(
                pool,
                SimpleSearchOptions {
                    max_mismatches,
                    reverse,
                    duplicates: options.duplicates,
                    ambiguity: options.ambiguity,
                },
            )
        };

        Self::with_searches(template, options.max_mismatches, build)
    }
}

impl SimpleSingleMatch<SegmentedBarcodeSearch> {
    /// Match barcodes made of independently budgeted segments.
    ///
    /// `segment_mismatches` gives one budget per segment, in pool order, on top of the
    /// overall `options.max_mismatches`.
    pub fn segmented(
        template: ScanTemplate,
        pool: &BarcodePool,
        segment_lengths: &[usize],
        segment_mismatches: &[usize],
        options: SingleMatchOptions,
    ) -> Result<Self> {
        check_length(&template, pool)?;

        let build = |reverse| {
            SegmentedBarcodeSearch::new(
                pool,
                segment_lengths,
                SegmentedSearchOptions {
                    max_mismatches: segment_mismatches.to_vec(),
                    reverse,
                    duplicates: options.duplicates,
                    ambiguity: options.ambiguity,
                },
            )
        };

        Self::with_searches(template, options.max_mismatches, build)
    }
}

fn check_length(template: &ScanTemplate, pool: &BarcodePool) -> Result<()> {
    if template.variable_length() != pool.length() {
        return Err(config_error(
            "SimpleSingleMatch",
            format!(
                "variable regions span {} positions but barcodes have length {}",
                template.variable_length(),
                pool.length()
            ),
        ));
    }

    Ok(())
}

impl<S: BarcodeSearch> SimpleSingleMatch<S> {
    fn with_searches(
        template: ScanTemplate,
        max_mismatches: usize,
        build: impl Fn(bool) -> Result<S>,
    ) -> Result<Self> {
        let strand = template.strand();
        let forward = strand.forward().then(|| build(false)).transpose()?;
        let reverse = strand.reverse().then(|| build(true)).transpose()?;

        debug!(
            template_length = template.length(),
            variable_regions = template.variable_regions(Strand::Forward).len(),
            ?strand,
            max_mismatches,
            "built single barcode matcher"
        );

        Ok(Self {
            template,
            forward,
            reverse,
            max_mismatches,
        })
    }

    pub fn template(&self) -> &ScanTemplate {
        &self.template
    }

    pub fn max_mismatches(&self) -> usize {
        self.max_mismatches
    }

    pub fn initialize(&self) -> MatchState<S::State> {
        let init = |s: &Option<S>| s.as_ref().map(S::initialize).unwrap_or_default();

        MatchState {
            status: MatchStatus::Unmatched,
            position: 0,
            mismatches: 0,
            variable_mismatches: 0,
            strand: Strand::Forward,
            regions: Vec::new(),
            buffer: Vec::with_capacity(self.template.variable_length()),
            forward_details: init(&self.forward),
            reverse_details: init(&self.reverse),
        }
    }

    // Search the variable regions of `placement`, leaving the result in the state for its strand.
    fn identify(&self, read: &[u8], placement: &Placement, state: &mut MatchState<S::State>) {
        state.buffer.clear();
        for r in placement.variable_regions() {
            state.buffer.extend_from_slice(&read[r]);
        }

        let remaining = self.max_mismatches - placement.mismatches;
        let (search, details) = match placement.strand {
            Strand::Forward => (&self.forward, &mut state.forward_details),
            Strand::Reverse => (&self.reverse, &mut state.reverse_details),
        };

        if let Some(search) = search {
            search.search_capped(&state.buffer, details, remaining);
        }
    }

    /// Report the first placement, by position, whose barcode matches within the budget.
    pub fn search_first(&self, read: &[u8], state: &mut MatchState<S::State>) -> bool {
        state.reset();

        for placement in self.template.scan_within(read, self.max_mismatches) {
            self.identify(read, &placement, state);

            let details = state.details_for(placement.strand);
            let (status, variable) = (details.status(), details.mismatches());

            if let MatchStatus::Matched(index) = status {
                if placement.mismatches + variable <= self.max_mismatches {
                    state.record(&placement, index, variable);
                    return true;
                }
            }
        }

        false
    }

    /// Report the placement with the fewest mismatches over the whole template.
    ///
    /// Two placements with the same lowest count but different barcodes are
    /// [`MatchStatus::Ambiguous`]. For equal counts with the same barcode the first
    /// placement is kept.
    pub fn search_best(&self, read: &[u8], state: &mut MatchState<S::State>) -> bool {
        state.reset();

        let mut best = self.max_mismatches + 1;
        let mut found = false;
        let mut tied = false;
        let mut saw_ambiguous = false;

        for placement in self.template.scan_within(read, self.max_mismatches) {
            self.identify(read, &placement, state);

            let details = state.details_for(placement.strand);
            let (status, variable) = (details.status(), details.mismatches());
            let total = placement.mismatches + variable;

            match status {
                MatchStatus::Matched(index) if total < best => {
                    best = total;
                    found = true;
                    tied = false;
                    state.record(&placement, index, variable);
                }
                MatchStatus::Matched(index) if found && total == best && state.status.index() != Some(index) => {
                    tied = true;
                }
                MatchStatus::Ambiguous if total <= self.max_mismatches => saw_ambiguous = true,
                _ => (),
            }
        }

        if found && !tied {
            return true;
        }

        state.status = if tied || saw_ambiguous {
            MatchStatus::Ambiguous
        } else {
            MatchStatus::Unmatched
        };
        false
    }

    /// Move the caches of `state` into the shared caches.
    pub fn reduce(&mut self, state: &mut MatchState<S::State>) {
        if let Some(search) = &mut self.forward {
            search.reduce(&mut state.forward_details);
        }
        if let Some(search) = &mut self.reverse {
            search.reduce(&mut state.reverse_details);
        }
    }

    /// Reduce every per-thread state once the workers are done.
    pub fn reduce_all(&mut self, states: ThreadStates<MatchState<S::State>>)
    where
        S::State: Send,
    {
        for mut state in states.into_states() {
            self.reduce(&mut state);
        }
    }
}

/// Lazily created state for each worker thread.
pub struct ThreadStates<T: Send> {
    states: ThreadLocal<RefCell<T>>,
}

impl<T: Send> Default for ThreadStates<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> ThreadStates<T> {
    pub fn new() -> Self {
        Self {
            states: ThreadLocal::new(),
        }
    }

    /// Run `f` with the state of the current thread, creating it with `init` if needed.
    pub fn with<R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let state = self.states.get_or(|| RefCell::new(init()));
        let mut s = state.borrow_mut();
        f(&mut s)
    }

    pub fn into_states(self) -> impl Iterator<Item = T> {
        self.states.into_iter().map(RefCell::into_inner)
    }
}
