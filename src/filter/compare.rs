use std::fmt;
use std::str::FromStr;

use crate::error::FilterError;

/// Comparison operator applied by a filter between a row value and its reference value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compare {
    #[default]
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    /// Membership for value lists, bitwise containment for flags
    Contains,
    NotContains,
}
impl Compare {
    /// Parses an operator as written in dataset files or on the command line
    ///
    /// Symbolic (`<=`), alphabetic (`lte`) and XML-escaped (`&lt;=`) spellings are
    /// accepted.
    pub fn from_operator(op: &str) -> Result<Self, FilterError> {
        match op {
            "==" | "=" | "eq" | "in" => Ok(Self::Equal),
            "!=" | "ne" | "not_in" => Ok(Self::NotEqual),
            "<" | "lt" | "&lt;" => Ok(Self::LessThan),
            "<=" | "lte" | "&lt;=" => Ok(Self::LessThanEqual),
            ">" | "gt" | "&gt;" => Ok(Self::GreaterThan),
            ">=" | "gte" | "&gt;=" => Ok(Self::GreaterThanEqual),
            "&" => Ok(Self::Contains),
            "~" => Ok(Self::NotContains),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    /// Qualified name, e.g. `Compare::LESS_THAN_EQUAL`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Equal => "Compare::EQUAL",
            Self::NotEqual => "Compare::NOT_EQUAL",
            Self::LessThan => "Compare::LESS_THAN",
            Self::LessThanEqual => "Compare::LESS_THAN_EQUAL",
            Self::GreaterThan => "Compare::GREATER_THAN",
            Self::GreaterThanEqual => "Compare::GREATER_THAN_EQUAL",
            Self::Contains => "Compare::CONTAINS",
            Self::NotContains => "Compare::NOT_CONTAINS",
        }
    }

    /// Canonical symbolic operator
    #[must_use]
    pub fn operator(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::Contains => "&",
            Self::NotContains => "~",
        }
    }

    /// Alphabetic operator, safe to embed in XML attributes
    #[must_use]
    pub fn alpha_operator(self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::LessThan => "lt",
            Self::LessThanEqual => "lte",
            Self::GreaterThan => "gt",
            Self::GreaterThanEqual => "gte",
            Self::Contains => "and",
            Self::NotContains => "not",
        }
    }

    /// Whether the operator orders values rather than testing (in)equality
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::LessThanEqual | Self::GreaterThan | Self::GreaterThanEqual
        )
    }

    /// Operator used when the reference value is a list
    ///
    /// Equality becomes membership; ordering operators have no list meaning.
    pub fn for_list(self) -> Result<Self, FilterError> {
        match self {
            Self::Equal | Self::Contains => Ok(Self::Contains),
            Self::NotEqual | Self::NotContains => Ok(Self::NotContains),
            _ => Err(FilterError::InvalidListComparison(self.name().to_string())),
        }
    }

    /// Compares `lhs` (the row value) against `rhs` (the filter value)
    ///
    /// On single values, `Contains` and `NotContains` reduce to (in)equality.
    #[inline]
    #[must_use]
    pub fn check<T: PartialOrd + ?Sized>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Equal | Self::Contains => lhs == rhs,
            Self::NotEqual | Self::NotContains => lhs != rhs,
            Self::LessThan => lhs < rhs,
            Self::LessThanEqual => lhs <= rhs,
            Self::GreaterThan => lhs > rhs,
            Self::GreaterThanEqual => lhs >= rhs,
        }
    }

    /// Tests flag bits: `Contains` passes when `lhs` shares any bit with `rhs`
    ///
    /// Other operators compare the flag bytes as plain values.
    #[inline]
    #[must_use]
    pub fn check_flags(self, lhs: u8, rhs: u8) -> bool {
        match self {
            Self::Contains => lhs & rhs != 0,
            Self::NotContains => lhs & rhs == 0,
            _ => self.check(&lhs, &rhs),
        }
    }
}
impl FromStr for Compare {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_operator(s)
    }
}
impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_spellings() {
        let cases = [
            (Compare::Equal, ["==", "=", "eq", "in"].as_slice()),
            (Compare::NotEqual, &["!=", "ne", "not_in"]),
            (Compare::LessThan, &["<", "lt", "&lt;"]),
            (Compare::LessThanEqual, &["<=", "lte", "&lt;="]),
            (Compare::GreaterThan, &[">", "gt", "&gt;"]),
            (Compare::GreaterThanEqual, &[">=", "gte", "&gt;="]),
            (Compare::Contains, &["&"]),
            (Compare::NotContains, &["~"]),
        ];
        for (expected, spellings) in cases {
            for op in spellings {
                assert_eq!(Compare::from_operator(op).ok(), Some(expected), "{op}");
            }
            assert_eq!(Compare::from_operator(expected.operator()).ok(), Some(expected));
        }
    }

    #[test]
    fn test_unknown_operator() {
        assert!(matches!(
            Compare::from_operator("=>"),
            Err(FilterError::UnsupportedOperator(op)) if op == "=>"
        ));
        assert!("".parse::<Compare>().is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(Compare::LessThanEqual.name(), "Compare::LESS_THAN_EQUAL");
        assert_eq!(Compare::NotContains.name(), "Compare::NOT_CONTAINS");
        assert_eq!(Compare::GreaterThanEqual.alpha_operator(), "gte");
        assert_eq!(Compare::Contains.alpha_operator(), "and");
        assert_eq!(Compare::NotEqual.to_string(), "!=");
    }

    #[test]
    fn test_check() {
        assert!(Compare::Equal.check(&3, &3));
        assert!(Compare::NotEqual.check(&3, &4));
        assert!(Compare::LessThan.check(&3, &4));
        assert!(!Compare::LessThan.check(&4, &4));
        assert!(Compare::LessThanEqual.check(&4, &4));
        assert!(Compare::GreaterThan.check(&0.9_f32, &0.8));
        assert!(Compare::GreaterThanEqual.check(&9507, &9200));
        assert!(Compare::Contains.check(&7, &7));
        assert!(Compare::NotContains.check(&7, &8));
        assert!(Compare::Equal.check("chr1", "chr1"));
    }

    #[test]
    fn test_check_flags() {
        // ADAPTER_BEFORE | ADAPTER_AFTER | FORWARD_PASS
        let flags = 1 | 2 | 16;
        assert!(Compare::Contains.check_flags(flags, 1));
        assert!(Compare::Contains.check_flags(flags, 1 | 32));
        assert!(!Compare::Contains.check_flags(flags, 32));
        assert!(!Compare::Contains.check_flags(flags, 0));
        assert!(Compare::NotContains.check_flags(flags, 32));
        assert!(!Compare::NotContains.check_flags(flags, 2));
        assert!(Compare::Equal.check_flags(flags, 19));
    }

    #[test]
    fn test_for_list() {
        assert_eq!(Compare::Equal.for_list().ok(), Some(Compare::Contains));
        assert_eq!(Compare::NotEqual.for_list().ok(), Some(Compare::NotContains));
        assert!(matches!(
            Compare::GreaterThan.for_list(),
            Err(FilterError::InvalidListComparison(_))
        ));
        assert!(Compare::LessThan.is_ordering());
        assert!(!Compare::Contains.is_ordering());
    }
}
