//! Mismatch-tolerant barcode matching for sequencing reads.
//!
//! # Overview
//! trieplex finds known barcodes inside reads. A read is expected to contain a *template*: constant
//! sequence that anchors the read structure, around one or more variable regions that hold the
//! barcode. The barcode is identified against a pool of known sequences, allowing a bounded number of
//! substitutions.
//!
//! This is useful for:
//! * Counting guides in CRISPR screens
//! * Demultiplexing reads with combinatorial (multi-part) barcodes
//! * Checking the structure of reads from a custom library protocol
//!
//! ## Barcode pools
//! A [`BarcodePool`] is an ordered list of equal-length sequences. The position of a sequence in the
//! pool is its identity, and every search reports that index.
//!
//! ## Mismatch tries
//! A [`MismatchTrie`] indexes a pool and finds the entry with the fewest substitutions to a query.
//! If two entries tie for the fewest, the result is [`MatchStatus::Ambiguous`] and no identity is
//! reported. Duplicated pool entries are handled by a [`DuplicateAction`].
//!
//! [`SimpleBarcodeSearch`] puts an exact-match table and a cache in front of a trie.
//! [`SegmentedBarcodeSearch`] does the same for barcodes made of several segments, where every
//! segment has its own mismatch budget.
//!
//! ## Templates
//! A [`ScanTemplate`] is written as a string where `-` marks variable positions:
//! ```text
//! ACGT--------TTTT
//! ```
//! Scanning a read yields every placement of the template with its number of mismatches in the
//! constant regions. The reverse strand is searched by matching the reverse complement of the
//! template, so positions are always reported on the read as given.
//!
//! ## Matching reads
//! [`SimpleSingleMatch`] combines the two: it scans the read, extracts the variable regions of each
//! placement and looks them up in the pool. The mismatch budget covers the constant and variable
//! regions together.
//! ```
//! use trieplex::*;
//!
//! let pool = BarcodePool::new(["AAAA", "CCCC", "GGGG"])?;
//! let template = ScanTemplate::parse(b"ACGT----TTTT", SearchStrand::Both)?;
//! let options = SingleMatchOptions {
//!     max_mismatches: 1,
//!     ..SingleMatchOptions::default()
//! };
//! let matcher = SimpleSingleMatch::new(template, &pool, options)?;
//!
//! let mut state = matcher.initialize();
//! assert!(matcher.search_best(b"ttACGTCCCATTTTgg", &mut state));
//! assert_eq!(state.status, MatchStatus::Matched(1));
//! assert_eq!(state.regions, vec![6..10]);
//! # Ok::<(), trieplex::Error>(())
//! ```
//!
//! The same matcher can be described in YAML and built with [`MatchConfig`].
//!
//! ## Threads
//! Every structure is immutable once built and can be shared between threads. Each worker keeps its
//! own state from `initialize()`; [`ThreadStates`] hands them out per thread, and the caches they
//! collect can be folded back into the matcher afterwards.

pub mod alphabet;
pub mod config;
pub mod errors;
pub mod pool;
pub mod search;
pub mod single_match;
pub mod template;
pub mod trie;

mod parse_utils;

// commonly used functions and types

pub use crate::alphabet::{AmbiguityPolicy, SearchStrand, Strand};
pub use crate::config::*;
pub use crate::errors::{Error, Result};
pub use crate::pool::*;
pub use crate::search::*;
pub use crate::single_match::*;
pub use crate::template::*;
pub use crate::trie::*;
