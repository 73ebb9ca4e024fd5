//! Declarative filter construction from `(name, value, operator)` triples, as
//! written in dataset files.
//!
//! ```
//! use pbindex::{FilterContext, PbiFilter, Property};
//!
//! let properties = [
//!     Property::new("zm", "[14743, 20001]", "=="),
//!     Property::new("pos", "9200", ">="),
//! ];
//! let filter = PbiFilter::from_properties(&properties, &FilterContext::default()).unwrap();
//! assert_eq!(filter.num_children(), 2);
//! ```

use std::str::FromStr;

use super::{
    AlignedEndFilter, AlignedLengthFilter, AlignedStartFilter, AlignedStrandFilter, BarcodeFilter,
    BarcodeForwardFilter, BarcodeQualityFilter, BarcodeReverseFilter, BarcodesFilter, Compare,
    CompositionType, Filter, FilterHash, IdentityFilter, LocalContextFilter, MapQualityFilter,
    NumSubreadsFilter, PbiFilter, QueryEndFilter, QueryLengthFilter, QueryStartFilter,
    ReadAccuracyFilter, ReadGroupFilter, ReferenceEndFilter, ReferenceNameFilter,
    ReferenceStartFilter, ZmwFilter, ZmwModuloFilter,
};
use crate::error::FilterError;

/// Modulo attributes of a ZMW property
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Modulo {
    pub denominator: u32,
    pub hash: FilterHash,
}

/// One filter property
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub operator: String,
    pub modulo: Option<Modulo>,
}
impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operator: operator.into(),
            modulo: None,
        }
    }

    #[must_use]
    pub fn with_modulo(mut self, denominator: u32, hash: FilterHash) -> Self {
        self.modulo = Some(Modulo { denominator, hash });
        self
    }

    fn invalid(&self) -> FilterError {
        FilterError::InvalidValue {
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }

    fn parse<T: FromStr>(&self, value: &str) -> Result<T, FilterError> {
        value.trim().parse().map_err(|_| self.invalid())
    }

    /// Values of a bracketed or comma-separated list, `None` for a single value
    fn list<T: FromStr>(&self) -> Result<Option<Vec<T>>, FilterError> {
        let value = self.value.trim();
        let inner = strip_brackets(value);
        if inner.len() == value.len() && !inner.contains(',') {
            return Ok(None);
        }
        inner
            .split(',')
            .map(|item| self.parse(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Builds a list-capable leaf from one or many values
    fn single_or_list<T, F>(
        &self,
        cmp: Compare,
        single: impl FnOnce(T, Compare) -> F,
        list: impl FnOnce(Vec<T>, Compare) -> Result<F, FilterError>,
    ) -> Result<Box<dyn Filter>, FilterError>
    where
        T: FromStr,
        F: Filter + 'static,
    {
        match self.list()? {
            Some(values) => Ok(Box::new(list(values, cmp)?)),
            None => Ok(Box::new(single(self.parse(&self.value)?, cmp))),
        }
    }

    /// Builds the leaf filter described by the property
    pub fn to_filter(&self, context: &FilterContext) -> Result<Box<dyn Filter>, FilterError> {
        let name = self.name.trim().to_ascii_lowercase();
        let cmp = Compare::from_operator(self.operator.trim())?;
        let value = self.value.trim();

        if let Some(modulo) = self.modulo {
            if name != "zm" && name != "zmw" {
                return Err(FilterError::UnsupportedFilter(self.name.clone()));
            }
            let bucket = self.parse(value)?;
            return Ok(Box::new(ZmwModuloFilter::new(
                modulo.denominator,
                bucket,
                modulo.hash,
                cmp,
            )));
        }

        let filter: Box<dyn Filter> = match name.as_str() {
            "ae" | "aend" => Box::new(AlignedEndFilter::new(self.parse(value)?, cmp)),
            "alignedlength" => Box::new(AlignedLengthFilter::new(self.parse(value)?, cmp)),
            "as" | "astart" | "readstart" => {
                Box::new(AlignedStartFilter::new(self.parse(value)?, cmp))
            }
            "bc" | "barcode" => self.barcode_filter(cmp)?,
            "bcf" => self.single_or_list(cmp, BarcodeForwardFilter::new, |values, cmp| {
                BarcodeForwardFilter::from_list(values, cmp)
            })?,
            "bcr" => self.single_or_list(cmp, BarcodeReverseFilter::new, |values, cmp| {
                BarcodeReverseFilter::from_list(values, cmp)
            })?,
            "bq" | "bcq" => Box::new(BarcodeQualityFilter::new(self.parse(value)?, cmp)),
            "accuracy" | "identity" => Box::new(IdentityFilter::new(self.parse(value)?, cmp)),
            "cx" => Box::new(LocalContextFilter::new(self.context_flags(value)?, cmp)),
            "mapqv" => Box::new(MapQualityFilter::new(self.parse(value)?, cmp)),
            "n_subreads" => Box::new(NumSubreadsFilter::new(self.parse(value)?, cmp)),
            "qe" | "qend" => Box::new(QueryEndFilter::new(self.parse(value)?, cmp)),
            "length" | "querylength" => Box::new(QueryLengthFilter::new(self.parse(value)?, cmp)),
            "qs" | "qstart" => Box::new(QueryStartFilter::new(self.parse(value)?, cmp)),
            "qid" => self.single_or_list(cmp, ReadGroupFilter::new, |values, cmp| {
                ReadGroupFilter::from_list(values, cmp)
            })?,
            "rg" => self.read_group_filter(cmp)?,
            "rq" => Box::new(ReadAccuracyFilter::new(self.parse(value)?, cmp)),
            "te" | "tend" => Box::new(ReferenceEndFilter::new(self.parse(value)?, cmp)),
            "rname" => self.reference_name_filter(cmp, context)?,
            "ts" | "tstart" | "pos" => Box::new(ReferenceStartFilter::new(self.parse(value)?, cmp)),
            "zm" | "zmw" => self.single_or_list(cmp, ZmwFilter::new, |values, cmp| {
                ZmwFilter::from_list(values, cmp)
            })?,
            "strand" => Box::new(AlignedStrandFilter::new(self.parse(value)?, cmp)?),
            _ => return Err(FilterError::UnsupportedFilter(self.name.clone())),
        };
        Ok(filter)
    }

    /// A bracketed pair selects both barcodes, a single value either one
    fn barcode_filter(&self, cmp: Compare) -> Result<Box<dyn Filter>, FilterError> {
        match self.list::<i16>()? {
            Some(pair) => match pair.as_slice() {
                &[forward, reverse] => Ok(Box::new(BarcodesFilter::new(forward, reverse, cmp))),
                _ => Err(self.invalid()),
            },
            None => Ok(Box::new(BarcodeFilter::new(self.parse(&self.value)?, cmp))),
        }
    }

    /// Read-group ids are 8-digit hex strings, optionally followed by `/suffix`
    fn read_group_filter(&self, cmp: Compare) -> Result<Box<dyn Filter>, FilterError> {
        let ids = match self.list::<String>()? {
            Some(items) => Some(
                items
                    .iter()
                    .map(|item| self.read_group_id(item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        match ids {
            Some(ids) => Ok(Box::new(ReadGroupFilter::from_list(ids, cmp)?)),
            None => Ok(Box::new(ReadGroupFilter::new(
                self.read_group_id(&self.value)?,
                cmp,
            ))),
        }
    }

    fn read_group_id(&self, value: &str) -> Result<i32, FilterError> {
        let base = value.trim().split('/').next().unwrap_or_default();
        if base.len() != 8 || !base.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(self.invalid());
        }
        u32::from_str_radix(base, 16)
            .map(|id| id as i32)
            .map_err(|_| self.invalid())
    }

    fn reference_name_filter(
        &self,
        cmp: Compare,
        context: &FilterContext,
    ) -> Result<Box<dyn Filter>, FilterError> {
        let names = &context.reference_names;
        match self.list::<String>()? {
            Some(wanted) => Ok(Box::new(ReferenceNameFilter::from_list(&wanted, cmp, names)?)),
            None => Ok(Box::new(ReferenceNameFilter::new(
                self.value.trim(),
                cmp,
                names,
            )?)),
        }
    }

    /// A raw number, or `|`-separated flag names
    fn context_flags(&self, value: &str) -> Result<u8, FilterError> {
        if value.starts_with(|c: char| c.is_ascii_digit()) {
            return self.parse(value);
        }
        value.split('|').try_fold(0u8, |flags, name| {
            context_flag(name.trim())
                .map(|flag| flags | flag)
                .ok_or_else(|| self.invalid())
        })
    }
}

/// Information outside the index needed to resolve some properties
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterContext {
    /// Reference names in id order
    pub reference_names: Vec<String>,
}
impl FilterContext {
    pub fn new<I, S>(reference_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reference_names: reference_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// Bit of a named local context flag
#[must_use]
pub fn context_flag(name: &str) -> Option<u8> {
    match name {
        "NO_LOCAL_CONTEXT" => Some(0),
        "ADAPTER_BEFORE" => Some(1),
        "ADAPTER_AFTER" => Some(2),
        "BARCODE_BEFORE" => Some(4),
        "BARCODE_AFTER" => Some(8),
        "FORWARD_PASS" => Some(16),
        "REVERSE_PASS" => Some(32),
        "ADAPTER_BEFORE_BAD" => Some(64),
        "ADAPTER_AFTER_BAD" => Some(128),
        _ => None,
    }
}

fn strip_brackets(value: &str) -> &str {
    let mut chars = value.chars();
    match (chars.next(), chars.next_back()) {
        (Some('[' | '(' | '{'), Some(']' | ')' | '}')) => &value[1..value.len() - 1],
        _ => value,
    }
}

impl PbiFilter {
    /// Intersection of the filters described by `properties`
    pub fn from_properties(
        properties: &[Property],
        context: &FilterContext,
    ) -> crate::Result<Self> {
        let children = properties
            .iter()
            .map(|property| property.to_filter(context))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::intersection(children))
    }

    /// Union of property groups, each group an intersection
    ///
    /// Dataset files list filters this way: a record passes if it passes every
    /// property of any one group. No groups means no filtering.
    pub fn from_groups(groups: &[Vec<Property>], context: &FilterContext) -> crate::Result<Self> {
        if groups.is_empty() {
            return Ok(Self::new());
        }
        let mut union = Self::with_type(CompositionType::Union);
        for group in groups {
            union.add(Self::from_properties(group, context)?);
        }
        tracing::debug!(groups = groups.len(), "built dataset filter");
        Ok(union)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::sample_index;

    fn rows_of(properties: &[Property]) -> crate::Result<Vec<usize>> {
        let context = FilterContext::new(["chr1", "chr2"]);
        let filter = PbiFilter::from_properties(properties, &context)?;
        Ok(filter.rows(&sample_index()))
    }

    fn rows_of_one(name: &str, value: &str, operator: &str) -> crate::Result<Vec<usize>> {
        rows_of(&[Property::new(name, value, operator)])
    }

    #[test]
    fn test_property_names() -> crate::Result<()> {
        assert_eq!(rows_of_one("zm", "100", "==")?, vec![0, 1, 2]);
        assert_eq!(rows_of_one("ZMW", "100", "!=")?, vec![3, 4, 5]);
        assert_eq!(rows_of_one("qs", "500", ">=")?, vec![1, 2, 4]);
        assert_eq!(rows_of_one("qend", "1000", "lt")?, vec![0, 3, 5]);
        assert_eq!(rows_of_one("length", "600", "&gt;=")?, vec![3, 4, 5]);
        assert_eq!(rows_of_one("rq", "0.9", ">")?, vec![2, 4]);
        assert_eq!(rows_of_one("pos", "20", ">=")?, vec![1, 2, 4]);
        assert_eq!(rows_of_one("tend", "-1", "=")?, vec![3]);
        assert_eq!(rows_of_one("readstart", "0", "==")?, vec![0, 5]);
        assert_eq!(rows_of_one("ae", "1300", "==")?, vec![4]);
        assert_eq!(rows_of_one("alignedlength", "400", "==")?, vec![0, 2]);
        assert_eq!(rows_of_one("mapqv", "60", "<")?, vec![2, 5]);
        assert_eq!(rows_of_one("identity", "0.95", ">=")?, vec![0, 3, 4, 5]);
        assert_eq!(rows_of_one("n_subreads", "1", "==")?, vec![5]);
        assert_eq!(rows_of_one("bq", "40", ">=")?, vec![2, 3, 4]);
        assert_eq!(rows_of_one("strand", "-", "==")?, vec![1, 4]);
        Ok(())
    }

    #[test]
    fn test_list_values() -> crate::Result<()> {
        assert_eq!(rows_of_one("zm", "[100, 300]", "==")?, vec![0, 1, 2, 5]);
        assert_eq!(rows_of_one("zm", "(100,300)", "!=")?, vec![3, 4]);
        assert_eq!(rows_of_one("zm", "100,200", "=")?, vec![0, 1, 2, 3, 4]);
        assert_eq!(rows_of_one("qid", "{7}", "==")?, vec![2, 3, 4]);
        assert_eq!(rows_of_one("bcf", "[0,2]", "==")?, vec![0, 1, 4]);
        assert_eq!(rows_of_one("bcr", "0", "==")?, vec![1]);

        let err = rows_of_one("zm", "[100, 300]", ">").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::FilterError(FilterError::InvalidListComparison(_))
        ));
        Ok(())
    }

    #[test]
    fn test_barcode_property() -> crate::Result<()> {
        assert_eq!(rows_of_one("bc", "1", "==")?, vec![0, 2, 5]);
        assert_eq!(rows_of_one("barcode", "[1,3]", "==")?, vec![5]);
        assert!(rows_of_one("bc", "[1,2,3]", "==").is_err());
        Ok(())
    }

    #[test]
    fn test_read_group_property() -> crate::Result<()> {
        // 8-digit hex ids are read as unsigned and reinterpreted
        assert_eq!(rows_of_one("rg", "fffffffb", "==")?, vec![0, 1, 5]);
        assert_eq!(rows_of_one("rg", "00000007/0--0", "==")?, vec![2, 3, 4]);
        assert_eq!(rows_of_one("rg", "[00000007, FFFFFFFB]", "==")?, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(rows_of_one("qid", "-5", "==")?, vec![0, 1, 5]);
        for bad in ["-5", "7", "fffffffb0", "xyz12345"] {
            assert!(matches!(
                rows_of_one("rg", bad, "=="),
                Err(crate::Error::FilterError(FilterError::InvalidValue { .. }))
            ));
        }
        Ok(())
    }

    #[test]
    fn test_decimal_and_hex_read_groups_differ() -> crate::Result<()> {
        use crate::index::{BasicData, RawIndex};

        let index = RawIndex::new(BasicData {
            rg_id: vec![10_000_000, 0x1000_0000],
            q_start: vec![0, 0],
            q_end: vec![100, 100],
            hole_number: vec![1, 2],
            read_qual: vec![0.9, 0.9],
            ctxt_flag: vec![0, 0],
            file_offset: vec![0, 100],
        })?;
        let context = FilterContext::default();
        let rows = |name: &str| -> crate::Result<Vec<usize>> {
            let filter =
                PbiFilter::from_properties(&[Property::new(name, "10000000", "==")], &context)?;
            Ok(filter.rows(&index))
        };
        assert_eq!(rows("qid")?, vec![0]);
        assert_eq!(rows("rg")?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_context_property() -> crate::Result<()> {
        assert_eq!(rows_of_one("cx", "1", "&")?, vec![0, 1]);
        assert_eq!(rows_of_one("cx", "ADAPTER_BEFORE | ADAPTER_AFTER", "&")?, vec![0, 1, 2]);
        assert_eq!(rows_of_one("cx", "FORWARD_PASS", "~")?, vec![0, 1, 2, 4, 5]);
        assert_eq!(rows_of_one("cx", "NO_LOCAL_CONTEXT", "==")?, vec![4]);
        assert!(rows_of_one("cx", "SIDEWAYS_PASS", "&").is_err());
        assert_eq!(context_flag("REVERSE_PASS"), Some(32));
        Ok(())
    }

    #[test]
    fn test_reference_name_property() -> crate::Result<()> {
        assert_eq!(rows_of_one("rname", "chr2", "==")?, vec![2, 4]);
        assert_eq!(rows_of_one("rname", "[chr1,chr2]", "!=")?, vec![3]);
        let err = rows_of_one("rname", "chrX", "==").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::FilterError(FilterError::UnknownReference(_))
        ));
        assert!(rows_of_one("rname", "chr1", "<").is_err());
        Ok(())
    }

    #[test]
    fn test_modulo_property() -> crate::Result<()> {
        let property = Property::new("zm", "1", "==").with_modulo(3, FilterHash::UnsignedIntCast);
        assert_eq!(rows_of(&[property])?, vec![0, 1, 2]);

        let hashed =
            Property::new("zm", "4", "==").with_modulo(7, "boosthashcombine".parse()?);
        assert_eq!(rows_of(&[hashed])?, vec![3, 4]);

        let wrong = Property::new("qs", "1", "==").with_modulo(3, FilterHash::UnsignedIntCast);
        assert!(matches!(
            rows_of(&[wrong]).unwrap_err(),
            crate::Error::FilterError(FilterError::UnsupportedFilter(name)) if name == "qs"
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_properties() {
        assert!(matches!(
            rows_of_one("movie", "m54006_160504_020705", "=="),
            Err(crate::Error::FilterError(FilterError::UnsupportedFilter(_)))
        ));
        assert!(matches!(
            rows_of_one("zm", "abc", "=="),
            Err(crate::Error::FilterError(FilterError::InvalidValue { .. }))
        ));
        assert!(matches!(
            rows_of_one("zm", "100", "=>"),
            Err(crate::Error::FilterError(FilterError::UnsupportedOperator(_)))
        ));
        assert!(matches!(
            rows_of_one("strand", "+", ">"),
            Err(crate::Error::FilterError(FilterError::UnsupportedComparison { .. }))
        ));
    }

    #[test]
    fn test_groups() -> crate::Result<()> {
        let context = FilterContext::default();
        let index = sample_index();
        let groups = vec![
            vec![Property::new("zm", "100", "=="), Property::new("qs", "0", ">")],
            vec![Property::new("bq", "50", ">=")],
        ];
        let filter = PbiFilter::from_groups(&groups, &context)?;
        assert_eq!(filter.composition_type(), CompositionType::Union);
        assert_eq!(filter.rows(&index), vec![1, 2, 4]);

        let everything = PbiFilter::from_groups(&[], &context)?;
        assert_eq!(everything.rows(&index).len(), index.num_reads());
        Ok(())
    }
}
