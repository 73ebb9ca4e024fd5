use std::ops::Range;

use super::{PbiVersion, Sections};
use crate::{Result, error::IndexError};

/// Per-row data present for every record
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicData {
    /// Numeric read-group id
    pub rg_id: Vec<i32>,
    pub q_start: Vec<i32>,
    pub q_end: Vec<i32>,
    /// ZMW hole number
    pub hole_number: Vec<i32>,
    /// Read accuracy in `[0, 1]`
    pub read_qual: Vec<f32>,
    /// Local context flags
    pub ctxt_flag: Vec<u8>,
    /// Virtual offset of the record in the primary file
    pub file_offset: Vec<u64>,
}
impl BasicData {
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            rg_id: Vec::with_capacity(n),
            q_start: Vec::with_capacity(n),
            q_end: Vec::with_capacity(n),
            hole_number: Vec::with_capacity(n),
            read_qual: Vec::with_capacity(n),
            ctxt_flag: Vec::with_capacity(n),
            file_offset: Vec::with_capacity(n),
        }
    }

    /// Number of rows, taken from the offset column
    #[must_use]
    pub fn len(&self) -> usize {
        self.file_offset.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_offset.is_empty()
    }

    /// Query length (`q_end - q_start`) of a row, saturating at the `i32` bounds
    #[must_use]
    pub fn query_length(&self, row: usize) -> i32 {
        self.q_end[row].saturating_sub(self.q_start[row])
    }

    fn validate(&self, n: usize) -> Result<()> {
        check_column("rg_id", self.rg_id.len(), n)?;
        check_column("q_start", self.q_start.len(), n)?;
        check_column("q_end", self.q_end.len(), n)?;
        check_column("hole_number", self.hole_number.len(), n)?;
        check_column("read_qual", self.read_qual.len(), n)?;
        check_column("ctxt_flag", self.ctxt_flag.len(), n)?;
        check_column("file_offset", self.file_offset.len(), n)
    }

    fn append(&mut self, other: Self) {
        self.rg_id.extend(other.rg_id);
        self.q_start.extend(other.q_start);
        self.q_end.extend(other.q_end);
        self.hole_number.extend(other.hole_number);
        self.read_qual.extend(other.read_qual);
        self.ctxt_flag.extend(other.ctxt_flag);
        self.file_offset.extend(other.file_offset);
    }
}

/// Per-row alignment data, present when at least one record is mapped
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappedData {
    /// Reference id, `-1` for unmapped rows
    pub t_id: Vec<i32>,
    pub t_start: Vec<i32>,
    pub t_end: Vec<i32>,
    pub a_start: Vec<i32>,
    pub a_end: Vec<i32>,
    /// `1` for reverse-strand alignments
    pub rev_strand: Vec<u8>,
    /// Number of matching bases
    pub n_m: Vec<u32>,
    /// Number of mismatching bases
    pub n_mm: Vec<u32>,
    pub map_qv: Vec<u8>,
    /// Number of insertion operations (v4.0.0+ only, empty otherwise)
    pub n_ins_ops: Vec<u32>,
    /// Number of deletion operations (v4.0.0+ only, empty otherwise)
    pub n_del_ops: Vec<u32>,
}
impl MappedData {
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            t_id: Vec::with_capacity(n),
            t_start: Vec::with_capacity(n),
            t_end: Vec::with_capacity(n),
            a_start: Vec::with_capacity(n),
            a_end: Vec::with_capacity(n),
            rev_strand: Vec::with_capacity(n),
            n_m: Vec::with_capacity(n),
            n_mm: Vec::with_capacity(n),
            map_qv: Vec::with_capacity(n),
            n_ins_ops: Vec::new(),
            n_del_ops: Vec::new(),
        }
    }

    /// Placeholder data describing `n` unmapped rows
    #[must_use]
    pub fn unmapped(n: usize, with_ops: bool) -> Self {
        let ops = if with_ops { vec![0; n] } else { Vec::new() };
        Self {
            t_id: vec![-1; n],
            t_start: vec![-1; n],
            t_end: vec![-1; n],
            a_start: vec![-1; n],
            a_end: vec![-1; n],
            rev_strand: vec![0; n],
            n_m: vec![0; n],
            n_mm: vec![0; n],
            map_qv: vec![u8::MAX; n],
            n_ins_ops: ops.clone(),
            n_del_ops: ops,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.t_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.t_id.is_empty()
    }

    #[must_use]
    pub fn is_mapped(&self, row: usize) -> bool {
        self.t_id[row] >= 0
    }

    #[must_use]
    pub fn is_reverse_strand(&self, row: usize) -> bool {
        self.rev_strand[row] == 1
    }

    /// Whether the indel operation columns are populated
    #[must_use]
    pub fn has_indel_ops(&self) -> bool {
        !self.n_ins_ops.is_empty() || !self.n_del_ops.is_empty()
    }

    /// Aligned query length (`a_end - a_start`) of a row, saturating at the `i32` bounds
    #[must_use]
    pub fn aligned_length(&self, row: usize) -> i32 {
        self.a_end[row].saturating_sub(self.a_start[row])
    }

    /// Number of inserted bases, derived from the aligned span and base counts
    #[must_use]
    pub fn num_inserted_bases(&self, row: usize) -> u32 {
        let span = span(self.a_start[row], self.a_end[row]);
        span.saturating_sub(self.n_m[row])
            .saturating_sub(self.n_mm[row])
    }

    /// Number of deleted bases, derived from the reference span and base counts
    #[must_use]
    pub fn num_deleted_bases(&self, row: usize) -> u32 {
        let span = span(self.t_start[row], self.t_end[row]);
        span.saturating_sub(self.n_m[row])
            .saturating_sub(self.n_mm[row])
    }

    fn validate(&self, n: usize, version: PbiVersion) -> Result<()> {
        check_column("t_id", self.t_id.len(), n)?;
        check_column("t_start", self.t_start.len(), n)?;
        check_column("t_end", self.t_end.len(), n)?;
        check_column("a_start", self.a_start.len(), n)?;
        check_column("a_end", self.a_end.len(), n)?;
        check_column("rev_strand", self.rev_strand.len(), n)?;
        check_column("n_m", self.n_m.len(), n)?;
        check_column("n_mm", self.n_mm.len(), n)?;
        check_column("map_qv", self.map_qv.len(), n)?;
        let n_ops = if version.has_indel_ops() { n } else { 0 };
        check_column("n_ins_ops", self.n_ins_ops.len(), n_ops)?;
        check_column("n_del_ops", self.n_del_ops.len(), n_ops)
    }

    fn append(&mut self, other: Self) {
        self.t_id.extend(other.t_id);
        self.t_start.extend(other.t_start);
        self.t_end.extend(other.t_end);
        self.a_start.extend(other.a_start);
        self.a_end.extend(other.a_end);
        self.rev_strand.extend(other.rev_strand);
        self.n_m.extend(other.n_m);
        self.n_mm.extend(other.n_mm);
        self.map_qv.extend(other.map_qv);
        self.n_ins_ops.extend(other.n_ins_ops);
        self.n_del_ops.extend(other.n_del_ops);
    }
}

/// Length of `start..end`, zero when reversed
fn span(start: i32, end: i32) -> u32 {
    u32::try_from(i64::from(end) - i64::from(start)).unwrap_or(0)
}

/// The row range of one reference in a coordinate-sorted primary file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReferenceEntry {
    pub t_id: i32,
    pub begin_row: u32,
    pub end_row: u32,
}
impl ReferenceEntry {
    /// Reference id of the entry holding unmapped rows
    pub const UNMAPPED_ID: i32 = -1;

    /// Row marker of a reference without any rows
    pub const UNSET_ROW: u32 = u32::MAX;

    #[must_use]
    pub fn new(t_id: i32, begin_row: u32, end_row: u32) -> Self {
        Self {
            t_id,
            begin_row,
            end_row,
        }
    }

    /// An entry for a reference that has no rows (yet)
    #[must_use]
    pub fn unset(t_id: i32) -> Self {
        Self::new(t_id, Self::UNSET_ROW, Self::UNSET_ROW)
    }

    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.begin_row == Self::UNSET_ROW || self.end_row == Self::UNSET_ROW
    }

    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        self.t_id == Self::UNMAPPED_ID
    }

    /// Rows covered by the entry; empty when unset
    #[must_use]
    pub fn rows(&self) -> Range<usize> {
        if self.is_unset() {
            0..0
        } else {
            self.begin_row as usize..self.end_row as usize
        }
    }

    /// Sort key placing the unmapped sentinel after every reference
    #[must_use]
    pub fn sort_key(&self) -> u32 {
        self.t_id as u32
    }
}

/// Per-reference row ranges, ordered by reference id with unmapped rows last
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceData {
    pub entries: Vec<ReferenceEntry>,
}
impl ReferenceData {
    #[must_use]
    pub fn new(mut entries: Vec<ReferenceEntry>) -> Self {
        entries.sort_by_key(ReferenceEntry::sort_key);
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every entry lies within `0..n` and that no two entries overlap
    ///
    /// Entries whose rows are both [`UNSET_ROW`](ReferenceEntry::UNSET_ROW) are skipped.
    fn validate(&self, n: usize) -> Result<()> {
        let mut ranges = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.begin_row == ReferenceEntry::UNSET_ROW
                && entry.end_row == ReferenceEntry::UNSET_ROW
            {
                continue;
            }
            if entry.begin_row > entry.end_row || entry.end_row as usize > n {
                return Err(invalid_reference(entry, n));
            }
            ranges.push(entry);
        }

        ranges.sort_by_key(|entry| (entry.begin_row, entry.end_row));
        for pair in ranges.windows(2) {
            if pair[1].begin_row < pair[0].end_row {
                return Err(invalid_reference(pair[1], n));
            }
        }
        Ok(())
    }
}

fn invalid_reference(entry: &ReferenceEntry, num_reads: usize) -> crate::Error {
    IndexError::InvalidReference {
        t_id: entry.t_id,
        begin_row: entry.begin_row,
        end_row: entry.end_row,
        num_reads,
    }
    .into()
}

/// Per-row barcode calls, present when at least one record is barcoded
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BarcodeData {
    /// Forward barcode index, `-1` when missing
    pub bc_forward: Vec<i16>,
    /// Reverse barcode index, `-1` when missing
    pub bc_reverse: Vec<i16>,
    /// Barcode call quality, `0xFF` when missing
    pub bc_qual: Vec<u8>,
}
impl BarcodeData {
    /// Placeholder data describing `n` rows without barcodes
    #[must_use]
    pub fn missing(n: usize) -> Self {
        Self {
            bc_forward: vec![-1; n],
            bc_reverse: vec![-1; n],
            bc_qual: vec![u8::MAX; n],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bc_forward.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bc_forward.is_empty()
    }

    fn validate(&self, n: usize) -> Result<()> {
        check_column("bc_forward", self.bc_forward.len(), n)?;
        check_column("bc_reverse", self.bc_reverse.len(), n)?;
        check_column("bc_qual", self.bc_qual.len(), n)
    }

    fn append(&mut self, other: Self) {
        self.bc_forward.extend(other.bc_forward);
        self.bc_reverse.extend(other.bc_reverse);
        self.bc_qual.extend(other.bc_qual);
    }
}

fn check_column(column: &'static str, found: usize, expected: usize) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(IndexError::SizeMismatch {
            column,
            expected,
            found,
        }
        .into())
    }
}

/// In-memory columnar contents of one PBI index.
///
/// Basic data is always present; the mapped, reference and barcode sections are
/// optional and the section bitmask is derived from which of them are set, so
/// the two can never disagree. Every present per-row column holds exactly
/// [`num_reads`](Self::num_reads) values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawIndex {
    version: PbiVersion,
    basic: BasicData,
    mapped: Option<MappedData>,
    reference: Option<ReferenceData>,
    barcode: Option<BarcodeData>,
}
impl RawIndex {
    /// Creates an index holding only basic data, at the current version
    pub fn new(basic: BasicData) -> Result<Self> {
        basic.validate(basic.len())?;
        Ok(Self {
            version: PbiVersion::CURRENT,
            basic,
            mapped: None,
            reference: None,
            barcode: None,
        })
    }

    #[must_use]
    pub fn with_version(mut self, version: PbiVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_mapped(mut self, mapped: MappedData) -> Result<Self> {
        mapped.validate(self.num_reads(), self.version)?;
        self.mapped = Some(mapped);
        Ok(self)
    }

    #[must_use]
    pub fn with_reference(mut self, reference: ReferenceData) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_barcodes(mut self, barcode: BarcodeData) -> Result<Self> {
        barcode.validate(self.num_reads())?;
        self.barcode = Some(barcode);
        Ok(self)
    }

    #[must_use]
    pub fn version(&self) -> PbiVersion {
        self.version
    }

    #[must_use]
    pub fn sections(&self) -> Sections {
        let mut sections = Sections::default();
        if self.mapped.is_some() {
            sections.set_mapped();
        }
        if self.reference.is_some() {
            sections.set_reference();
        }
        if self.barcode.is_some() {
            sections.set_barcode();
        }
        sections
    }

    #[must_use]
    pub fn num_reads(&self) -> usize {
        self.basic.len()
    }

    #[must_use]
    pub fn basic_data(&self) -> &BasicData {
        &self.basic
    }

    #[must_use]
    pub fn mapped_data(&self) -> Option<&MappedData> {
        self.mapped.as_ref()
    }

    #[must_use]
    pub fn reference_data(&self) -> Option<&ReferenceData> {
        self.reference.as_ref()
    }

    #[must_use]
    pub fn barcode_data(&self) -> Option<&BarcodeData> {
        self.barcode.as_ref()
    }

    #[must_use]
    pub fn has_mapped_data(&self) -> bool {
        self.mapped.is_some()
    }

    #[must_use]
    pub fn has_reference_data(&self) -> bool {
        self.reference.is_some()
    }

    #[must_use]
    pub fn has_barcode_data(&self) -> bool {
        self.barcode.is_some()
    }

    /// Checks that every present column matches the row count and version, and
    /// that reference ranges stay inside the index
    pub fn validate(&self) -> Result<()> {
        let n = self.num_reads();
        if u32::try_from(n).is_err() {
            return Err(IndexError::RowCountOverflow(n).into());
        }
        self.basic.validate(n)?;
        if let Some(mapped) = &self.mapped {
            mapped.validate(n, self.version)?;
        }
        if let Some(reference) = &self.reference {
            reference.validate(n)?;
        }
        if let Some(barcode) = &self.barcode {
            barcode.validate(n)?;
        }
        Ok(())
    }

    /// Concatenates several indexes into one, e.g. for every file of a dataset
    ///
    /// The aggregate always carries mapped and barcode data, padding sources that
    /// lack them with unmapped / missing-barcode rows. Reference ranges are dropped.
    pub fn aggregate<I>(indices: I) -> Result<AggregateIndex>
    where
        I: IntoIterator<Item = RawIndex>,
    {
        let mut version: Option<PbiVersion> = None;
        let mut basic = BasicData::default();
        let mut mapped = MappedData::default();
        let mut barcode = BarcodeData::default();
        let mut file_number = Vec::new();

        for (number, index) in indices.into_iter().enumerate() {
            let number =
                u16::try_from(number).map_err(|_| IndexError::TooManySources(number + 1))?;
            let aggregate_version = *version.get_or_insert(index.version);
            if !aggregate_version.is_compatible(index.version) {
                return Err(IndexError::IncompatibleVersions(
                    aggregate_version.as_u32(),
                    index.version.as_u32(),
                )
                .into());
            }

            let n = index.num_reads();
            let with_ops = aggregate_version.has_indel_ops();
            mapped.append(
                index
                    .mapped
                    .unwrap_or_else(|| MappedData::unmapped(n, with_ops)),
            );
            barcode.append(index.barcode.unwrap_or_else(|| BarcodeData::missing(n)));
            basic.append(index.basic);
            file_number.extend(std::iter::repeat_n(number, n));
        }

        let index = Self::new(basic)?
            .with_version(version.unwrap_or_default())
            .with_mapped(mapped)?
            .with_barcodes(barcode)?;
        index.validate()?;
        tracing::debug!(
            rows = index.num_reads(),
            files = file_number.last().map_or(0, |n| usize::from(*n) + 1),
            "aggregated indexes"
        );
        Ok(AggregateIndex { index, file_number })
    }
}

/// Several indexes concatenated into one, remembering each row's source
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateIndex {
    pub index: RawIndex,
    /// Position of the source index of every row
    pub file_number: Vec<u16>,
}
