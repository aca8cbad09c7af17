//! YAML description of a matcher.
//!
//! ```yaml
//! template: ACGT--------TTTT
//! strand: both
//! max_mismatches: 2
//! duplicates: use_first
//! segments: [4, 4]
//! segment_mismatches: [1, 1]
//! ```

use std::io;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::alphabet::*;
use crate::errors::*;
use crate::pool::*;
use crate::search::*;
use crate::single_match::*;
use crate::template::*;
use crate::trie::*;

/// Which placement [`Matcher::search`] reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    First,
    #[default]
    Best,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    /// Template string, `-` marks barcode positions.
    pub template: String,
    #[serde(default)]
    pub strand: SearchStrand,
    #[serde(default)]
    pub max_mismatches: usize,
    #[serde(default)]
    pub duplicates: DuplicateAction,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    #[serde(default)]
    pub search: SearchMode,
    /// Segment lengths of a combinatorial barcode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<usize>>,
    /// Budget per segment. Defaults to `max_mismatches` for every segment, capped below
    /// the segment length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_mismatches: Option<Vec<usize>>,
}

impl MatchConfig {
    const NAME: &'static str = "MatchConfig";

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn options(&self) -> SingleMatchOptions {
        SingleMatchOptions {
            max_mismatches: self.max_mismatches,
            duplicates: self.duplicates,
            ambiguity: self.ambiguity,
        }
    }

    /// Build the matcher described by this configuration over `pool`.
    pub fn build(&self, pool: &BarcodePool) -> Result<Matcher> {
        let template = ScanTemplate::parse(self.template.as_bytes(), self.strand)?;

        let inner = match (&self.segments, &self.segment_mismatches) {
            (None, None) => MatcherKind::Simple(SimpleSingleMatch::new(template, pool, self.options())?),
            (None, Some(_)) => {
                return Err(config_error(Self::NAME, "segment_mismatches given without segments"));
            }
            (Some(segments), budgets) => {
                let budgets = match budgets {
                    Some(b) => b.clone(),
                    None => segments
                        .iter()
                        .map(|len| self.max_mismatches.min(len.saturating_sub(1)))
                        .collect(),
                };

                MatcherKind::Segmented(SimpleSingleMatch::segmented(
                    template,
                    pool,
                    segments,
                    &budgets,
                    self.options(),
                )?)
            }
        };

        Ok(Matcher {
            inner,
            mode: self.search,
        })
    }
}

#[derive(Clone, Debug)]
enum MatcherKind {
    Simple(SimpleSingleMatch<SimpleBarcodeSearch>),
    Segmented(SimpleSingleMatch<SegmentedBarcodeSearch>),
}

/// Either flavour of [`SimpleSingleMatch`], as chosen by a [`MatchConfig`].
#[derive(Clone, Debug)]
pub struct Matcher {
    inner: MatcherKind,
    mode: SearchMode,
}

/// State for a [`Matcher`]. Only use it with the matcher that created it.
#[derive(Clone, Debug)]
pub enum MatcherState {
    Simple(MatchState<SimpleState>),
    Segmented(MatchState<SegmentedState>),
}

macro_rules! field {
    ($state:expr, $f:ident) => {
        match $state {
            MatcherState::Simple(s) => &s.$f,
            MatcherState::Segmented(s) => &s.$f,
        }
    };
}

impl MatcherState {
    pub fn status(&self) -> MatchStatus {
        *field!(self, status)
    }

    pub fn position(&self) -> usize {
        *field!(self, position)
    }

    pub fn mismatches(&self) -> usize {
        *field!(self, mismatches)
    }

    pub fn strand(&self) -> Strand {
        *field!(self, strand)
    }

    pub fn regions(&self) -> &[Range<usize>] {
        field!(self, regions)
    }

    /// Per-segment mismatches of a segmented match, in pool order.
    pub fn segment_mismatches(&self) -> Option<&[usize]> {
        match self {
            MatcherState::Simple(_) => None,
            MatcherState::Segmented(s) => Some(&s.details().per_segment),
        }
    }
}

impl Matcher {
    pub fn is_segmented(&self) -> bool {
        matches!(self.inner, MatcherKind::Segmented(_))
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn initialize(&self) -> MatcherState {
        match &self.inner {
            MatcherKind::Simple(m) => MatcherState::Simple(m.initialize()),
            MatcherKind::Segmented(m) => MatcherState::Segmented(m.initialize()),
        }
    }

    /// Search `read` in the configured mode.
    ///
    /// # Panics
    ///
    /// If `state` was created by a matcher of the other flavour.
    pub fn search(&self, read: &[u8], state: &mut MatcherState) -> bool {
        match (&self.inner, state, self.mode) {
            (MatcherKind::Simple(m), MatcherState::Simple(s), SearchMode::First) => m.search_first(read, s),
            (MatcherKind::Simple(m), MatcherState::Simple(s), SearchMode::Best) => m.search_best(read, s),
            (MatcherKind::Segmented(m), MatcherState::Segmented(s), SearchMode::First) => m.search_first(read, s),
            (MatcherKind::Segmented(m), MatcherState::Segmented(s), SearchMode::Best) => m.search_best(read, s),
            _ => panic!("state does not belong to this matcher"),
        }
    }

    /// Move the caches of `state` into this matcher.
    ///
    /// # Panics
    ///
    /// If `state` was created by a matcher of the other flavour.
    pub fn reduce(&mut self, state: &mut MatcherState) {
        match (&mut self.inner, state) {
            (MatcherKind::Simple(m), MatcherState::Simple(s)) => m.reduce(s),
            (MatcherKind::Segmented(m), MatcherState::Segmented(s)) => m.reduce(s),
            _ => panic!("state does not belong to this matcher"),
        }
    }
}
