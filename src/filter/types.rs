//! Leaf filters over single index columns.
//!
//! Every leaf compares one per-row value against a reference value with a
//! [`Compare`] operator. List-valued leaves (`from_list`) test membership in a
//! whitelist (`Equal`) or blacklist (`NotEqual`). A leaf reading a section the
//! index does not carry rejects every row.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::{Compare, Filter, PbiFilter};
use crate::error::FilterError;
use crate::index::RawIndex;

/// Reference value of a leaf: one value or a list of values
#[derive(Clone, Debug, PartialEq)]
enum Value<T> {
    Single(T),
    List(Vec<T>),
}

/// Reference value plus the operator applied to it
#[derive(Clone, Debug, PartialEq)]
struct Criterion<T> {
    value: Value<T>,
    cmp: Compare,
}
impl<T: PartialOrd + Copy> Criterion<T> {
    fn single(value: T, cmp: Compare) -> Self {
        Self {
            value: Value::Single(value),
            cmp,
        }
    }

    fn list(values: Vec<T>, cmp: Compare) -> Result<Self, FilterError> {
        Ok(Self {
            value: Value::List(values),
            cmp: cmp.for_list()?,
        })
    }

    #[inline]
    fn check(&self, lhs: T) -> bool {
        match &self.value {
            Value::Single(rhs) => self.cmp.check(&lhs, rhs),
            Value::List(values) => {
                let found = values.contains(&lhs);
                match self.cmp {
                    Compare::NotContains => !found,
                    _ => found,
                }
            }
        }
    }
}

/// Declares a leaf filter reading one value per row
///
/// The accessor yields `None` when the row's section is absent.
macro_rules! leaf_filter {
    ($(#[$doc:meta])* $name:ident($ty:ty) list, |$index:ident, $row:ident| $value:expr) => {
        leaf_filter!($(#[$doc])* $name($ty), |$index, $row| $value);
        impl $name {
            /// Creates a whitelist (`Equal`) or blacklist (`NotEqual`) filter
            pub fn from_list<I: IntoIterator<Item = $ty>>(
                values: I,
                cmp: Compare,
            ) -> Result<Self, FilterError> {
                Ok(Self(Criterion::list(values.into_iter().collect(), cmp)?))
            }
        }
    };
    ($(#[$doc:meta])* $name:ident($ty:ty), |$index:ident, $row:ident| $value:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name(Criterion<$ty>);
        impl $name {
            #[must_use]
            pub fn new(value: $ty, cmp: Compare) -> Self {
                Self(Criterion::single(value, cmp))
            }
        }
        impl Filter for $name {
            fn accepts(&self, $index: &RawIndex, $row: usize) -> bool {
                let value: Option<$ty> = $value;
                value.is_some_and(|v| self.0.check(v))
            }
        }
    };
}

/// Reads a plain mapped column
macro_rules! mapped_column {
    ($index:ident, $row:ident, $column:ident) => {
        $index
            .mapped_data()
            .and_then(|mapped| mapped.$column.get($row).copied())
    };
}

/// Reads a plain barcode column
macro_rules! barcode_column {
    ($index:ident, $row:ident, $column:ident) => {
        $index
            .barcode_data()
            .and_then(|barcode| barcode.$column.get($row).copied())
    };
}

// basic data

leaf_filter! {
    /// Filters on the numeric read-group id
    ReadGroupFilter(i32) list,
    |index, row| index.basic_data().rg_id.get(row).copied()
}

leaf_filter! {
    QueryStartFilter(i32),
    |index, row| index.basic_data().q_start.get(row).copied()
}

leaf_filter! {
    QueryEndFilter(i32),
    |index, row| index.basic_data().q_end.get(row).copied()
}

leaf_filter! {
    /// Filters on `q_end - q_start`
    QueryLengthFilter(i32),
    |index, row| (row < index.num_reads()).then(|| index.basic_data().query_length(row))
}

leaf_filter! {
    /// Filters on the ZMW hole number
    ///
    /// ```
    /// use pbindex::{Compare, ZmwFilter};
    ///
    /// let single = ZmwFilter::new(14743, Compare::Equal);
    /// let whitelist = ZmwFilter::from_list([14743, 20001], Compare::Equal).unwrap();
    /// assert_ne!(single, whitelist);
    /// ```
    ZmwFilter(i32) list,
    |index, row| index.basic_data().hole_number.get(row).copied()
}

leaf_filter! {
    /// Filters on the per-read accuracy
    ReadAccuracyFilter(f32),
    |index, row| index.basic_data().read_qual.get(row).copied()
}

/// Filters on local context flags
///
/// `Contains` accepts rows sharing at least one bit with the filter flags and
/// `NotContains` rows sharing none; other operators compare the flag byte as a
/// number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalContextFilter {
    flags: u8,
    cmp: Compare,
}
impl LocalContextFilter {
    #[must_use]
    pub fn new(flags: u8, cmp: Compare) -> Self {
        Self { flags, cmp }
    }
}
impl Filter for LocalContextFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        index
            .basic_data()
            .ctxt_flag
            .get(row)
            .is_some_and(|&flags| self.cmp.check_flags(flags, self.flags))
    }
}

/// Filters on the number of subreads of a row's ZMW
///
/// Subreads of one ZMW are stored next to each other, so every run of equal hole
/// numbers is counted as one group. A ZMW passes when any of its runs passes, and
/// then all of its rows are accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumSubreadsFilter {
    num_subreads: i32,
    cmp: Compare,
}
impl NumSubreadsFilter {
    #[must_use]
    pub fn new(num_subreads: i32, cmp: Compare) -> Self {
        Self { num_subreads, cmp }
    }

    fn check(&self, run: usize) -> bool {
        let run = i32::try_from(run).unwrap_or(i32::MAX);
        self.cmp.check(&run, &self.num_subreads)
    }

    /// Hole numbers with at least one passing run
    fn passing_zmws(&self, zmws: &[i32]) -> HashSet<i32> {
        zmws.chunk_by(|a, b| a == b)
            .filter(|run| self.check(run.len()))
            .map(|run| run[0])
            .collect()
    }
}
impl Filter for NumSubreadsFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        let zmws = &index.basic_data().hole_number;
        let Some(&zmw) = zmws.get(row) else {
            return false;
        };
        zmws.chunk_by(|a, b| a == b)
            .any(|run| run[0] == zmw && self.check(run.len()))
    }

    fn rows(&self, index: &RawIndex) -> Vec<usize> {
        let zmws = &index.basic_data().hole_number;
        let passing = self.passing_zmws(zmws);
        zmws.iter()
            .enumerate()
            .filter(|(_, zmw)| passing.contains(*zmw))
            .map(|(row, _)| row)
            .collect()
    }
}

/// Hash applied to the hole number by [`ZmwModuloFilter`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterHash {
    /// Reinterprets the hole number as `u32`
    #[default]
    UnsignedIntCast,
    /// Combines the upper and lower 16 bits the way `boost::hash_combine` does
    HashCombine,
}
impl FilterHash {
    #[must_use]
    pub fn hash(self, zmw: i32) -> u32 {
        match self {
            Self::UnsignedIntCast => zmw as u32,
            Self::HashCombine => {
                let upper = u64::from((zmw as u32 >> 16) & 0xFFFF);
                let lower = u64::from(zmw as u32 & 0xFFFF);
                let mut seed: u64 = 0;
                for value in [upper, lower] {
                    seed ^= value
                        .wrapping_add(0x9e37_79b9)
                        .wrapping_add(seed << 6)
                        .wrapping_add(seed >> 2);
                }
                seed as u32
            }
        }
    }
}
impl FromStr for FilterHash {
    type Err = FilterError;

    /// Parses `uint32cast` or `boosthashcombine`, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uint32cast" => Ok(Self::UnsignedIntCast),
            "boosthashcombine" => Ok(Self::HashCombine),
            _ => Err(FilterError::InvalidValue {
                name: "hash".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
impl fmt::Display for FilterHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsignedIntCast => f.write_str("uint32cast"),
            Self::HashCombine => f.write_str("boosthashcombine"),
        }
    }
}

/// Splits ZMWs into `denominator` buckets: accepts rows whose
/// `hash(zmw) % denominator` compares to `value`
///
/// A zero denominator rejects every row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZmwModuloFilter {
    denominator: u32,
    value: u32,
    hash: FilterHash,
    cmp: Compare,
}
impl ZmwModuloFilter {
    #[must_use]
    pub fn new(denominator: u32, value: u32, hash: FilterHash, cmp: Compare) -> Self {
        Self {
            denominator,
            value,
            hash,
            cmp,
        }
    }
}
impl Filter for ZmwModuloFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        index
            .basic_data()
            .hole_number
            .get(row)
            .and_then(|&zmw| self.hash.hash(zmw).checked_rem(self.denominator))
            .is_some_and(|bucket| self.cmp.check(&bucket, &self.value))
    }
}

// mapped data

leaf_filter! {
    /// Filters on the reference id (`-1` for unmapped rows)
    ReferenceIdFilter(i32) list,
    |index, row| mapped_column!(index, row, t_id)
}

leaf_filter! {
    ReferenceStartFilter(i32),
    |index, row| mapped_column!(index, row, t_start)
}

leaf_filter! {
    ReferenceEndFilter(i32),
    |index, row| mapped_column!(index, row, t_end)
}

leaf_filter! {
    AlignedStartFilter(i32),
    |index, row| mapped_column!(index, row, a_start)
}

leaf_filter! {
    AlignedEndFilter(i32),
    |index, row| mapped_column!(index, row, a_end)
}

leaf_filter! {
    /// Filters on `a_end - a_start`
    AlignedLengthFilter(i32),
    |index, row| index
        .mapped_data()
        .filter(|mapped| row < mapped.len())
        .map(|mapped| mapped.aligned_length(row))
}

leaf_filter! {
    MapQualityFilter(u8),
    |index, row| mapped_column!(index, row, map_qv)
}

leaf_filter! {
    NumMatchesFilter(u32),
    |index, row| mapped_column!(index, row, n_m)
}

leaf_filter! {
    NumMismatchesFilter(u32),
    |index, row| mapped_column!(index, row, n_mm)
}

leaf_filter! {
    /// Filters on the number of inserted bases
    NumInsertedBasesFilter(u32),
    |index, row| index
        .mapped_data()
        .filter(|mapped| row < mapped.len())
        .map(|mapped| mapped.num_inserted_bases(row))
}

leaf_filter! {
    /// Filters on the number of deleted bases
    NumDeletedBasesFilter(u32),
    |index, row| index
        .mapped_data()
        .filter(|mapped| row < mapped.len())
        .map(|mapped| mapped.num_deleted_bases(row))
}

leaf_filter! {
    /// Filters on alignment identity, `1 - (n_mm + n_ins + n_del) / (q_end - q_start)`
    IdentityFilter(f32),
    |index, row| index
        .mapped_data()
        .filter(|mapped| row < mapped.len() && row < index.num_reads())
        .map(|mapped| {
            let non_matches = u64::from(mapped.n_mm[row])
                + u64::from(mapped.num_inserted_bases(row))
                + u64::from(mapped.num_deleted_bases(row));
            let read_length = index.basic_data().query_length(row) as f32;
            1.0 - non_matches as f32 / read_length
        })
}

/// Alignment strand
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}
impl FromStr for Strand {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "+" | "0" | "forward" => Ok(Self::Forward),
            "-" | "1" | "reverse" => Ok(Self::Reverse),
            _ => Err(FilterError::InvalidValue {
                name: "strand".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Filters on alignment strand; only `Equal` and `NotEqual` are meaningful
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlignedStrandFilter {
    strand: Strand,
    cmp: Compare,
}
impl AlignedStrandFilter {
    pub fn new(strand: Strand, cmp: Compare) -> Result<Self, FilterError> {
        match cmp {
            Compare::Equal | Compare::NotEqual => Ok(Self { strand, cmp }),
            _ => Err(FilterError::UnsupportedComparison {
                filter: "aligned strand",
                cmp: cmp.name().to_string(),
            }),
        }
    }
}
impl Filter for AlignedStrandFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        mapped_column!(index, row, rev_strand).is_some_and(|rev| {
            let strand = if rev == 0 {
                Strand::Forward
            } else {
                Strand::Reverse
            };
            self.cmp.check(&strand, &self.strand)
        })
    }
}

/// Filters on reference name, resolved to ids through a reference-name table
///
/// The table lists reference names in id order, as in the primary file header.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceNameFilter {
    ids: ReferenceIdFilter,
}
impl ReferenceNameFilter {
    pub fn new(name: &str, cmp: Compare, names: &[String]) -> Result<Self, FilterError> {
        Self::check_compare(cmp)?;
        let id = Self::resolve(name, names)?;
        Ok(Self {
            ids: ReferenceIdFilter::new(id, cmp),
        })
    }

    /// Whitelist (`Equal`) or blacklist (`NotEqual`) of reference names
    pub fn from_list<S: AsRef<str>>(
        wanted: &[S],
        cmp: Compare,
        names: &[String],
    ) -> Result<Self, FilterError> {
        Self::check_compare(cmp)?;
        let ids = wanted
            .iter()
            .map(|name| Self::resolve(name.as_ref(), names))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            ids: ReferenceIdFilter::from_list(ids, cmp)?,
        })
    }

    fn check_compare(cmp: Compare) -> Result<(), FilterError> {
        if cmp.is_ordering() {
            return Err(FilterError::UnsupportedComparison {
                filter: "reference name",
                cmp: cmp.name().to_string(),
            });
        }
        Ok(())
    }

    fn resolve(name: &str, names: &[String]) -> Result<i32, FilterError> {
        names
            .iter()
            .position(|n| n == name)
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| FilterError::UnknownReference(name.to_string()))
    }
}
impl Filter for ReferenceNameFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        self.ids.accepts(index, row)
    }
}

// barcode data

leaf_filter! {
    BarcodeForwardFilter(i16) list,
    |index, row| barcode_column!(index, row, bc_forward)
}

leaf_filter! {
    BarcodeReverseFilter(i16) list,
    |index, row| barcode_column!(index, row, bc_reverse)
}

leaf_filter! {
    BarcodeQualityFilter(u8),
    |index, row| barcode_column!(index, row, bc_qual)
}

/// Accepts rows whose forward OR reverse barcode compares to the value
#[derive(Clone, Debug, PartialEq)]
pub struct BarcodeFilter {
    forward: BarcodeForwardFilter,
    reverse: BarcodeReverseFilter,
}
impl BarcodeFilter {
    #[must_use]
    pub fn new(barcode: i16, cmp: Compare) -> Self {
        Self {
            forward: BarcodeForwardFilter::new(barcode, cmp),
            reverse: BarcodeReverseFilter::new(barcode, cmp),
        }
    }

    /// Same filter as a composite
    #[must_use]
    pub fn into_composite(self) -> PbiFilter {
        PbiFilter::union(vec![
            Box::new(self.forward) as Box<dyn Filter>,
            Box::new(self.reverse),
        ])
    }
}
impl Filter for BarcodeFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        self.forward.accepts(index, row) || self.reverse.accepts(index, row)
    }
}

/// Accepts rows whose forward AND reverse barcodes compare to the pair
#[derive(Clone, Debug, PartialEq)]
pub struct BarcodesFilter {
    forward: BarcodeForwardFilter,
    reverse: BarcodeReverseFilter,
}
impl BarcodesFilter {
    #[must_use]
    pub fn new(forward: i16, reverse: i16, cmp: Compare) -> Self {
        Self {
            forward: BarcodeForwardFilter::new(forward, cmp),
            reverse: BarcodeReverseFilter::new(reverse, cmp),
        }
    }

    /// Same filter as a composite
    #[must_use]
    pub fn into_composite(self) -> PbiFilter {
        PbiFilter::intersection(vec![
            Box::new(self.forward) as Box<dyn Filter>,
            Box::new(self.reverse),
        ])
    }
}
impl Filter for BarcodesFilter {
    fn accepts(&self, index: &RawIndex, row: usize) -> bool {
        self.forward.accepts(index, row) && self.reverse.accepts(index, row)
    }
}
