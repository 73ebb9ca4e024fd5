//! # Index filters
//!
//! Filters select rows of a [`RawIndex`] without touching the primary file.
//! Leaf filters (listed below) compare one column against a value; [`PbiFilter`]
//! composes any number of filters by intersection or union and nests freely.
//!
//! ```
//! use pbindex::{Compare, PbiFilter, ReferenceStartFilter, ZmwFilter};
//!
//! let mut filter = PbiFilter::new();
//! filter
//!     .add(ZmwFilter::new(14743, Compare::Equal))
//!     .add(ReferenceStartFilter::new(9200, Compare::GreaterThanEqual));
//! assert_eq!(filter.num_children(), 2);
//! ```
//!
//! Row lists are only materialized by [`Filter::rows`], never while composing.
//!
//! ## Leaf filters
//!
//! Basic data: [`ReadGroupFilter`], [`QueryStartFilter`], [`QueryEndFilter`],
//! [`QueryLengthFilter`], [`ZmwFilter`], [`ReadAccuracyFilter`],
//! [`LocalContextFilter`], [`NumSubreadsFilter`], [`ZmwModuloFilter`].
//!
//! Mapped data: [`ReferenceIdFilter`], [`ReferenceNameFilter`],
//! [`ReferenceStartFilter`], [`ReferenceEndFilter`], [`AlignedStartFilter`],
//! [`AlignedEndFilter`], [`AlignedLengthFilter`], [`AlignedStrandFilter`],
//! [`MapQualityFilter`], [`NumMatchesFilter`], [`NumMismatchesFilter`],
//! [`NumInsertedBasesFilter`], [`NumDeletedBasesFilter`], [`IdentityFilter`].
//!
//! Barcode data: [`BarcodeForwardFilter`], [`BarcodeReverseFilter`],
//! [`BarcodeQualityFilter`], [`BarcodeFilter`], [`BarcodesFilter`].

mod compare;
mod property;
mod types;

use std::cmp::Ordering;
use std::fmt;

use auto_impl::auto_impl;

pub use compare::Compare;
pub use property::{FilterContext, Modulo, Property, context_flag};
pub use types::{
    AlignedEndFilter, AlignedLengthFilter, AlignedStartFilter, AlignedStrandFilter,
    BarcodeFilter, BarcodeForwardFilter, BarcodeQualityFilter, BarcodeReverseFilter,
    BarcodesFilter, FilterHash, IdentityFilter, LocalContextFilter, MapQualityFilter,
    NumDeletedBasesFilter, NumInsertedBasesFilter, NumMatchesFilter, NumMismatchesFilter,
    NumSubreadsFilter, QueryEndFilter, QueryLengthFilter, QueryStartFilter, ReadAccuracyFilter,
    ReadGroupFilter, ReferenceEndFilter, ReferenceIdFilter, ReferenceNameFilter,
    ReferenceStartFilter, Strand, ZmwFilter, ZmwModuloFilter,
};

use crate::index::RawIndex;

/// A predicate over the rows of an index
///
/// Implement it to plug custom predicates into a [`PbiFilter`].
///
/// ```
/// use pbindex::{Filter, RawIndex};
///
/// /// Accepts every other row
/// struct EvenRows;
/// impl Filter for EvenRows {
///     fn accepts(&self, _index: &RawIndex, row: usize) -> bool {
///         row % 2 == 0
///     }
/// }
/// ```
#[auto_impl(&, Box, Arc)]
pub trait Filter: Send + Sync {
    /// Whether `row` of `index` passes the filter
    fn accepts(&self, index: &RawIndex, row: usize) -> bool;

    /// Every accepted row, ascending and without duplicates
    fn rows(&self, index: &RawIndex) -> Vec<usize> {
        (0..index.num_reads())
            .filter(|&row| self.accepts(index, row))
            .collect()
    }
}

/// How a composite combines its children
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositionType {
    /// A row must pass every child
    #[default]
    Intersect,
    /// A row must pass at least one child
    Union,
}

/// Composite filter over an ordered list of children
///
/// An empty intersection accepts every row; an empty union accepts none.
#[derive(Default)]
pub struct PbiFilter {
    kind: CompositionType,
    children: Vec<Box<dyn Filter>>,
}
impl PbiFilter {
    /// Creates an empty intersection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_type(kind: CompositionType) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// Intersection of `filters`
    pub fn intersection<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Filter>>,
    {
        Self {
            kind: CompositionType::Intersect,
            children: filters.into_iter().collect(),
        }
    }

    /// Union of `filters`
    pub fn union<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Filter>>,
    {
        Self {
            kind: CompositionType::Union,
            children: filters.into_iter().collect(),
        }
    }

    /// Appends a child
    pub fn add<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.children.push(Box::new(filter));
        self
    }

    /// Appends an already boxed child
    pub fn add_boxed(&mut self, filter: Box<dyn Filter>) -> &mut Self {
        self.children.push(filter);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn composition_type(&self) -> CompositionType {
        self.kind
    }
}
impl Filter for PbiFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        match self.kind {
            CompositionType::Intersect => self.children.iter().all(|f| f.accepts(index, row)),
            CompositionType::Union => self.children.iter().any(|f| f.accepts(index, row)),
        }
    }

    fn rows(&self, index: &RawIndex) -> Vec<usize> {
        match self.kind {
            CompositionType::Intersect => {
                let mut children = self.children.iter();
                let Some(first) = children.next() else {
                    return (0..index.num_reads()).collect();
                };
                let mut rows = first.rows(index);
                for child in children {
                    if rows.is_empty() {
                        break;
                    }
                    rows = intersect_sorted(&rows, &child.rows(index));
                }
                rows
            }
            CompositionType::Union => self
                .children
                .iter()
                .fold(Vec::new(), |rows, child| union_sorted(&rows, &child.rows(index))),
        }
    }
}
impl fmt::Debug for PbiFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PbiFilter")
            .field("kind", &self.kind)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Rows present in both ascending lists
#[must_use]
pub fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Rows present in either ascending list
#[must_use]
pub fn union_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Shared test index
///
/// | row | zmw | rg | q_start | q_end | rq   | cx | t_id | t_start | strand | n_ins | n_del | bc     |
/// |-----|-----|----|---------|-------|------|----|------|---------|--------|-------|-------|--------|
/// | 0   | 100 | -5 | 0       | 400   | 0.80 | 1  | 0    | 10      | +      | 5     | 5     | 0, 1   |
/// | 1   | 100 | -5 | 500     | 1000  | 0.90 | 3  | 0    | 50      | -      | 10    | 10    | 0, 0   |
/// | 2   | 100 | 7  | 1100    | 1500  | 0.95 | 2  | 1    | 20      | +      | 10    | 10    | 1, 1   |
/// | 3   | 200 | 7  | 0       | 650   | 0.70 | 16 | -1   | -1      | +      | 0     | 0     | -1, -1 |
/// | 4   | 200 | 7  | 700     | 1300  | 0.99 | 0  | 1    | 300     | -      | 5     | 5     | 2, 2   |
/// | 5   | 300 | -5 | 0       | 900   | 0.85 | 32 | 0    | 9       | +      | 10    | 10    | 1, 3   |
#[cfg(test)]
pub(crate) fn sample_index() -> RawIndex {
    use crate::index::{BarcodeData, BasicData, MappedData};

    let basic = BasicData {
        rg_id: vec![-5, -5, 7, 7, 7, -5],
        q_start: vec![0, 500, 1100, 0, 700, 0],
        q_end: vec![400, 1000, 1500, 650, 1300, 900],
        hole_number: vec![100, 100, 100, 200, 200, 300],
        read_qual: vec![0.8, 0.9, 0.95, 0.7, 0.99, 0.85],
        ctxt_flag: vec![1, 3, 2, 16, 0, 32],
        file_offset: (0..6).map(|row| row * 100).collect(),
    };
    let mapped = MappedData {
        t_id: vec![0, 0, 1, -1, 1, 0],
        t_start: vec![10, 50, 20, -1, 300, 9],
        t_end: vec![410, 550, 420, -1, 900, 909],
        a_start: vec![0, 500, 1100, -1, 700, 0],
        a_end: vec![400, 1000, 1500, -1, 1300, 900],
        rev_strand: vec![0, 1, 0, 0, 1, 0],
        n_m: vec![390, 480, 380, 0, 590, 880],
        n_mm: vec![5, 10, 10, 0, 5, 10],
        map_qv: vec![60, 60, 20, 255, 60, 3],
        ..Default::default()
    };
    let barcode = BarcodeData {
        bc_forward: vec![0, 0, 1, -1, 2, 1],
        bc_reverse: vec![1, 0, 1, -1, 2, 3],
        bc_qual: vec![30, 30, 40, 255, 50, 20],
    };
    RawIndex::new(basic)
        .and_then(|index| index.with_mapped(mapped))
        .and_then(|index| index.with_barcodes(barcode))
        .expect("consistent sample index")
}
