//! Per-record observations handed to the [`PbiBuilder`](crate::PbiBuilder).
//!
//! The index never parses the primary alignment container itself. Whatever reads
//! that container extracts the handful of fields below from each record and passes
//! them on, together with the record's virtual file offset.

/// Alignment-derived fields of a mapped record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedFields {
    /// Reference id, `-1` for an unmapped record that still carries alignment fields
    pub reference_id: i32,
    pub t_start: i32,
    pub t_end: i32,
    /// Aligned query start
    pub a_start: i32,
    /// Aligned query end
    pub a_end: i32,
    pub n_match: u32,
    pub n_mismatch: u32,
    pub reverse_strand: bool,
    pub map_quality: u8,
    /// Number of insertion operations (stored by v4.0.0+ indexes)
    pub n_ins_ops: u32,
    /// Number of deletion operations (stored by v4.0.0+ indexes)
    pub n_del_ops: u32,
}
impl MappedFields {
    /// Placeholder values written for records without an alignment
    pub const UNMAPPED: Self = Self {
        reference_id: -1,
        t_start: -1,
        t_end: -1,
        a_start: -1,
        a_end: -1,
        n_match: 0,
        n_mismatch: 0,
        reverse_strand: false,
        map_quality: u8::MAX,
        n_ins_ops: 0,
        n_del_ops: 0,
    };

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.reference_id >= 0
    }
}

/// Barcode call of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarcodeFields {
    pub forward: i16,
    pub reverse: i16,
    pub quality: u8,
}
impl BarcodeFields {
    /// Values stored for records without a barcode call
    pub const MISSING: Self = Self {
        forward: -1,
        reverse: -1,
        quality: u8::MAX,
    };

    /// A call is valid unless both ids and the quality are negative
    ///
    /// The quality is a signed byte on disk, so values with the high bit set
    /// count as negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.forward >= 0 || self.reverse >= 0 || self.quality < 0x80
    }
}

/// Everything the builder records for one row of the index
///
/// # Example
///
/// ```
/// use pbindex::IndexRecordBuilder;
///
/// let record = IndexRecordBuilder::default()
///     .read_group_id(-1_314_032_214)
///     .query(0, 1500)
///     .hole_number(14743)
///     .read_accuracy(0.9)
///     .build();
/// assert!(record.mapping.is_none());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IndexRecord {
    /// Numeric read-group id
    pub read_group_id: i32,
    pub q_start: i32,
    pub q_end: i32,
    /// ZMW hole number
    pub hole_number: i32,
    pub read_accuracy: f32,
    /// Local context flag bits
    pub context_flags: u8,
    /// Alignment fields, absent for unmapped records
    pub mapping: Option<MappedFields>,
    /// Barcode call, absent when the record is not barcoded
    pub barcodes: Option<BarcodeFields>,
}
impl IndexRecord {
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some_and(|m| m.is_mapped())
    }

    /// Reference id and start used to check coordinate order
    #[must_use]
    pub(crate) fn sort_position(&self) -> (i32, i32) {
        self.mapping
            .map_or((-1, -1), |m| (m.reference_id, m.t_start))
    }
}

/// A builder for [`IndexRecord`] values
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexRecordBuilder {
    record: IndexRecord,
}
impl IndexRecordBuilder {
    #[must_use]
    pub fn read_group_id(mut self, read_group_id: i32) -> Self {
        self.record.read_group_id = read_group_id;
        self
    }

    /// Sets the query start and end
    #[must_use]
    pub fn query(mut self, q_start: i32, q_end: i32) -> Self {
        self.record.q_start = q_start;
        self.record.q_end = q_end;
        self
    }

    #[must_use]
    pub fn hole_number(mut self, hole_number: i32) -> Self {
        self.record.hole_number = hole_number;
        self
    }

    #[must_use]
    pub fn read_accuracy(mut self, read_accuracy: f32) -> Self {
        self.record.read_accuracy = read_accuracy;
        self
    }

    #[must_use]
    pub fn context_flags(mut self, context_flags: u8) -> Self {
        self.record.context_flags = context_flags;
        self
    }

    /// Sets the alignment fields
    #[must_use]
    pub fn mapping(mut self, mapping: MappedFields) -> Self {
        self.record.mapping = Some(mapping);
        self
    }

    /// Sets the alignment fields from an Option
    #[must_use]
    pub fn opt_mapping(mut self, mapping: Option<MappedFields>) -> Self {
        self.record.mapping = mapping;
        self
    }

    #[must_use]
    pub fn barcodes(mut self, forward: i16, reverse: i16, quality: u8) -> Self {
        self.record.barcodes = Some(BarcodeFields {
            forward,
            reverse,
            quality,
        });
        self
    }

    #[must_use]
    pub fn build(self) -> IndexRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let record = IndexRecordBuilder::default().build();
        assert_eq!(record, IndexRecord::default());
        assert!(!record.is_mapped());
        assert_eq!(record.sort_position(), (-1, -1));
    }

    #[test]
    fn test_builder_fields() {
        let mapping = MappedFields {
            reference_id: 2,
            t_start: 9507,
            ..MappedFields::UNMAPPED
        };
        let record = IndexRecordBuilder::default()
            .read_group_id(12)
            .query(48, 3000)
            .hole_number(20001)
            .read_accuracy(0.7)
            .context_flags(3)
            .mapping(mapping)
            .barcodes(4, 5, 60)
            .build();
        assert_eq!(record.q_end, 3000);
        assert_eq!(record.context_flags, 3);
        assert!(record.is_mapped());
        assert_eq!(record.sort_position(), (2, 9507));
        assert_eq!(record.barcodes.map(|b| b.quality), Some(60));
    }

    #[test]
    fn test_unmapped_alignment_fields() {
        let record = IndexRecordBuilder::default()
            .opt_mapping(Some(MappedFields::UNMAPPED))
            .build();
        assert!(record.mapping.is_some());
        assert!(!record.is_mapped());
    }

    #[test]
    fn test_barcode_validity() {
        assert!(!BarcodeFields::MISSING.is_valid());
        let half = BarcodeFields {
            forward: 3,
            ..BarcodeFields::MISSING
        };
        assert!(half.is_valid());

        // a quality alone keeps the call
        let quality_only = BarcodeFields {
            quality: 30,
            ..BarcodeFields::MISSING
        };
        assert!(quality_only.is_valid());
        let negative_quality = BarcodeFields {
            quality: 0x80,
            ..BarcodeFields::MISSING
        };
        assert!(!negative_quality.is_valid());
    }
}
