//! Locating a fixed template of constant and variable regions inside a read.

use std::ops::Range;

use crate::alphabet::*;
use crate::errors::*;
use crate::parse_utils::parse_template;

/// One piece of a [`ScanTemplate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Region {
    /// Literal sequence that has to be present in the read, up to mismatches.
    Constant(Vec<u8>),
    /// Stretch of the given length that holds the barcode.
    Variable(usize),
}

impl Region {
    pub fn len(&self) -> usize {
        match self {
            Region::Constant(seq) => seq.len(),
            Region::Variable(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Positions are relative to the start of the template in read coordinates.
#[derive(Clone, Debug, Default)]
struct Layout {
    constants: Vec<(usize, u8)>,
    variables: Vec<Range<usize>>,
}

impl Layout {
    fn from_regions<'a>(regions: impl Iterator<Item = (&'a Region, bool)>) -> Self {
        let mut res = Self::default();
        let mut offset = 0;

        for (region, reverse) in regions {
            match region {
                Region::Constant(seq) => {
                    let seq = if reverse { reverse_complement(seq) } else { seq.clone() };
                    res.constants
                        .extend(seq.iter().enumerate().map(|(i, &b)| (offset + i, encode(b))));
                }
                Region::Variable(len) => res.variables.push(offset..offset + len),
            }
            offset += region.len();
        }

        res
    }

    // None as soon as the count goes over `max`.
    #[inline]
    fn mismatches(&self, window: &[u8], max: usize) -> Option<usize> {
        let mut res = 0;

        for &(offset, code) in &self.constants {
            if encode(window[offset]) != code {
                res += 1;
                if res > max {
                    return None;
                }
            }
        }

        Some(res)
    }
}

/// A read layout such as `ACGT--------TTTT`: constant regions that anchor the
/// template, around variable regions that hold the barcode.
///
/// On the reverse strand the reverse complement of the template is matched against the
/// read, so every placement is reported in the coordinates of the read as given.
#[derive(Clone, Debug)]
pub struct ScanTemplate {
    length: usize,
    strand: SearchStrand,
    forward: Layout,
    reverse: Layout,
}

impl ScanTemplate {
    const NAME: &'static str = "ScanTemplate";

    pub fn new(regions: Vec<Region>, strand: SearchStrand) -> Result<Self> {
        if regions.is_empty() {
            return Err(config_error(Self::NAME, "template has no regions"));
        }

        for region in &regions {
            match region {
                r if r.is_empty() => {
                    return Err(config_error(Self::NAME, "template regions must not be empty"));
                }
                Region::Constant(seq) if !seq.iter().all(|&b| is_base(b)) => {
                    return Err(config_error(
                        Self::NAME,
                        format!("constant region \"{}\" contains symbols outside ACGT", utf8(seq)),
                    ));
                }
                _ => (),
            }
        }

        if !regions.iter().any(|r| matches!(r, Region::Variable(_))) {
            return Err(config_error(Self::NAME, "template has no variable region"));
        }

        Ok(Self {
            length: regions.iter().map(Region::len).sum(),
            strand,
            forward: Layout::from_regions(regions.iter().map(|r| (r, false))),
            reverse: Layout::from_regions(regions.iter().rev().map(|r| (r, true))),
        })
    }

    /// Parse a template where `-` marks variable positions, e.g. `ACGT--------TTTT`.
    pub fn parse(template: &[u8], strand: SearchStrand) -> Result<Self> {
        Self::new(parse_template(template)?, strand)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn strand(&self) -> SearchStrand {
        self.strand
    }

    /// Variable regions relative to the start of a placement on `strand`, in read order.
    pub fn variable_regions(&self, strand: Strand) -> &[Range<usize>] {
        &self.layout(strand).variables
    }

    /// Total length of the variable regions.
    pub fn variable_length(&self) -> usize {
        self.forward.variables.iter().map(|r| r.len()).sum()
    }

    fn layout(&self, strand: Strand) -> &Layout {
        match strand {
            Strand::Forward => &self.forward,
            Strand::Reverse => &self.reverse,
        }
    }

    /// Every placement of the template in `read`.
    pub fn scan<'t, 'r>(&'t self, read: &'r [u8]) -> Scan<'t, 'r> {
        self.scan_within(read, usize::MAX)
    }

    /// Placements whose constant regions have at most `max_mismatches` mismatches.
    pub fn scan_within<'t, 'r>(&'t self, read: &'r [u8], max_mismatches: usize) -> Scan<'t, 'r> {
        Scan {
            template: self,
            read,
            max_mismatches,
            position: 0,
            strand: Strand::Forward,
        }
    }
}

/// One position and orientation of a template in a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement<'t> {
    pub position: usize,
    pub strand: Strand,
    /// Mismatches in the constant regions.
    pub mismatches: usize,
    variables: &'t [Range<usize>],
}

impl<'t> Placement<'t> {
    pub fn num_variable_regions(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_regions(&self) -> impl Iterator<Item = Range<usize>> + 't {
        let position = self.position;
        self.variables.iter().map(move |r| position + r.start..position + r.end)
    }
}

/// Iterator over placements, by ascending position with the forward strand first.
#[derive(Clone, Debug)]
pub struct Scan<'t, 'r> {
    template: &'t ScanTemplate,
    read: &'r [u8],
    max_mismatches: usize,
    position: usize,
    strand: Strand,
}

impl<'t, 'r> Iterator for Scan<'t, 'r> {
    type Item = Placement<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let length = self.template.length;

        while self.position + length <= self.read.len() {
            let position = self.position;
            let strand = self.strand;

            match strand {
                Strand::Forward => self.strand = Strand::Reverse,
                Strand::Reverse => {
                    self.strand = Strand::Forward;
                    self.position += 1;
                }
            }

            let enabled = match strand {
                Strand::Forward => self.template.strand.forward(),
                Strand::Reverse => self.template.strand.reverse(),
            };
            if !enabled {
                continue;
            }

            let layout = self.template.layout(strand);
            let window = &self.read[position..position + length];

            if let Some(mismatches) = layout.mismatches(window, self.max_mismatches) {
                return Some(Placement {
                    position,
                    strand,
                    mismatches,
                    variables: &layout.variables,
                });
            }
        }

        None
    }
}
