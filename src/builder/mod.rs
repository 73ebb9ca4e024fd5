//! # Index builder
//!
//! [`PbiBuilder`] turns a stream of [`IndexRecord`]s into a finished PBI file with
//! bounded memory. Records arrive row by row but the index is stored column by
//! column, so construction is a three stage pipeline:
//!
//! 1. **Accumulate**: every column has its own fixed-capacity buffer.
//! 2. **Spill**: a full buffer is appended to the scratch file `<output>.build`
//!    and a `(position, count)` block descriptor is kept for its column.
//! 3. **Replay**: on [`close`](PbiBuilder::close) the blocks of each column are
//!    read back in canonical order, converted to little-endian and written
//!    through the compressed [`BlockWriter`](crate::block::BlockWriter).
//!
//! Peak memory is `number of columns * buffer_size` regardless of the number of
//! records.
//!
//! ```rust,no_run
//! use pbindex::{IndexRecordBuilder, PbiBuilderOptions};
//!
//! let mut builder = PbiBuilderOptions::default()
//!     .coordinate_sorted(true)
//!     .reference_count_hint(Some(2))
//!     .threads(4)
//!     .build("reads.bam.pbi")
//!     .unwrap();
//!
//! let record = IndexRecordBuilder::default().hole_number(14743).build();
//! builder.add_record(&record, 0x1_0000).unwrap();
//! builder.close().unwrap();
//! ```

mod field;
mod reference;

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use field::{FieldBuffer, ScratchFile};
use reference::ReferenceTracker;

use crate::block::{BlockWriter, DEFAULT_COMPRESSION_LEVEL, resolve_threads};
use crate::error::BuilderError;
use crate::index::{DEFAULT_BUFFER_SIZE, PbiHeader, PbiVersion, ReferenceEntry, Sections, codec};
use crate::record::{BarcodeFields, IndexRecord, MappedFields};
use crate::Result;

/// Extension appended to the output path to name the scratch file
pub const SCRATCH_EXTENSION: &str = "build";

/// Maximum number of records in one index
///
/// Every row range end must stay below [`ReferenceEntry::UNSET_ROW`].
pub const MAX_RECORDS: usize = ReferenceEntry::UNSET_ROW as usize - 1;

/// Options for creating a [`PbiBuilder`]
///
/// ```rust,no_run
/// use pbindex::{PbiBuilderOptions, PbiVersion};
///
/// let builder = PbiBuilderOptions::default()
///     .version(PbiVersion::V4_0_0)
///     .compression_level(9)
///     .buffer_size(1 << 20)
///     .build("reads.bam.pbi")
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct PbiBuilderOptions {
    reference_count_hint: Option<usize>,
    coordinate_sorted: bool,
    compression_level: i32,
    threads: usize,
    buffer_size: usize,
    version: PbiVersion,
}
impl Default for PbiBuilderOptions {
    fn default() -> Self {
        Self {
            reference_count_hint: None,
            coordinate_sorted: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            threads: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
            version: PbiVersion::CURRENT,
        }
    }
}
impl PbiBuilderOptions {
    /// Number of references known up front
    ///
    /// With coordinate-sorted input every one of them gets a reference entry, even
    /// if no record maps to it.
    #[must_use]
    pub fn reference_count_hint(mut self, hint: Option<usize>) -> Self {
        self.reference_count_hint = hint;
        self
    }

    /// Tracks per-reference row ranges; requires coordinate-sorted input
    #[must_use]
    pub fn coordinate_sorted(mut self, sorted: bool) -> Self {
        self.coordinate_sorted = sorted;
        self
    }

    #[must_use]
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Compression threads used on close; `0` uses every available core
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// In-memory budget of every column buffer, in bytes
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Format version to write
    #[must_use]
    pub fn version(mut self, version: PbiVersion) -> Self {
        self.version = version;
        self
    }

    /// Opens the output and scratch files and returns the builder
    pub fn build<P: AsRef<Path>>(self, path: P) -> Result<PbiBuilder> {
        PbiBuilder::with_options(path, self)
    }
}

/// One buffer per index column, in on-disk order
struct Columns {
    rg_id: FieldBuffer<i32>,
    q_start: FieldBuffer<i32>,
    q_end: FieldBuffer<i32>,
    hole_number: FieldBuffer<i32>,
    read_qual: FieldBuffer<f32>,
    ctxt_flag: FieldBuffer<u8>,
    file_offset: FieldBuffer<u64>,

    t_id: FieldBuffer<i32>,
    t_start: FieldBuffer<i32>,
    t_end: FieldBuffer<i32>,
    a_start: FieldBuffer<i32>,
    a_end: FieldBuffer<i32>,
    rev_strand: FieldBuffer<u8>,
    n_m: FieldBuffer<u32>,
    n_mm: FieldBuffer<u32>,
    map_qv: FieldBuffer<u8>,
    n_ins_ops: FieldBuffer<u32>,
    n_del_ops: FieldBuffer<u32>,

    bc_forward: FieldBuffer<i16>,
    bc_reverse: FieldBuffer<i16>,
    bc_qual: FieldBuffer<u8>,
}

/// Applies `$op` to every column, in on-disk order
macro_rules! for_each_column {
    ($columns:expr, $col:ident => $op:expr) => {{
        let columns = $columns;
        {
            let $col = &mut columns.rg_id;
            $op;
        }
        {
            let $col = &mut columns.q_start;
            $op;
        }
        {
            let $col = &mut columns.q_end;
            $op;
        }
        {
            let $col = &mut columns.hole_number;
            $op;
        }
        {
            let $col = &mut columns.read_qual;
            $op;
        }
        {
            let $col = &mut columns.ctxt_flag;
            $op;
        }
        {
            let $col = &mut columns.file_offset;
            $op;
        }
        {
            let $col = &mut columns.t_id;
            $op;
        }
        {
            let $col = &mut columns.t_start;
            $op;
        }
        {
            let $col = &mut columns.t_end;
            $op;
        }
        {
            let $col = &mut columns.a_start;
            $op;
        }
        {
            let $col = &mut columns.a_end;
            $op;
        }
        {
            let $col = &mut columns.rev_strand;
            $op;
        }
        {
            let $col = &mut columns.n_m;
            $op;
        }
        {
            let $col = &mut columns.n_mm;
            $op;
        }
        {
            let $col = &mut columns.map_qv;
            $op;
        }
        {
            let $col = &mut columns.n_ins_ops;
            $op;
        }
        {
            let $col = &mut columns.n_del_ops;
            $op;
        }
        {
            let $col = &mut columns.bc_forward;
            $op;
        }
        {
            let $col = &mut columns.bc_reverse;
            $op;
        }
        {
            let $col = &mut columns.bc_qual;
            $op;
        }
    }};
}

impl Columns {
    fn new(buffer_size: usize) -> Self {
        Self {
            rg_id: FieldBuffer::new("rg_id", buffer_size),
            q_start: FieldBuffer::new("q_start", buffer_size),
            q_end: FieldBuffer::new("q_end", buffer_size),
            hole_number: FieldBuffer::new("hole_number", buffer_size),
            read_qual: FieldBuffer::new("read_qual", buffer_size),
            ctxt_flag: FieldBuffer::new("ctxt_flag", buffer_size),
            file_offset: FieldBuffer::new("file_offset", buffer_size),
            t_id: FieldBuffer::new("t_id", buffer_size),
            t_start: FieldBuffer::new("t_start", buffer_size),
            t_end: FieldBuffer::new("t_end", buffer_size),
            a_start: FieldBuffer::new("a_start", buffer_size),
            a_end: FieldBuffer::new("a_end", buffer_size),
            rev_strand: FieldBuffer::new("rev_strand", buffer_size),
            n_m: FieldBuffer::new("n_m", buffer_size),
            n_mm: FieldBuffer::new("n_mm", buffer_size),
            map_qv: FieldBuffer::new("map_qv", buffer_size),
            n_ins_ops: FieldBuffer::new("n_ins_ops", buffer_size),
            n_del_ops: FieldBuffer::new("n_del_ops", buffer_size),
            bc_forward: FieldBuffer::new("bc_forward", buffer_size),
            bc_reverse: FieldBuffer::new("bc_reverse", buffer_size),
            bc_qual: FieldBuffer::new("bc_qual", buffer_size),
        }
    }

    fn push(&mut self, record: &IndexRecord, file_offset: u64) {
        self.rg_id.push(record.read_group_id);
        self.q_start.push(record.q_start);
        self.q_end.push(record.q_end);
        self.hole_number.push(record.hole_number);
        self.read_qual.push(record.read_accuracy);
        self.ctxt_flag.push(record.context_flags);
        self.file_offset.push(file_offset);

        let mapped = record.mapping.unwrap_or(MappedFields::UNMAPPED);
        self.t_id.push(mapped.reference_id);
        self.t_start.push(mapped.t_start);
        self.t_end.push(mapped.t_end);
        self.a_start.push(mapped.a_start);
        self.a_end.push(mapped.a_end);
        self.rev_strand.push(u8::from(mapped.reverse_strand));
        self.n_m.push(mapped.n_match);
        self.n_mm.push(mapped.n_mismatch);
        self.map_qv.push(mapped.map_quality);
        self.n_ins_ops.push(mapped.n_ins_ops);
        self.n_del_ops.push(mapped.n_del_ops);

        let barcodes = record
            .barcodes
            .filter(BarcodeFields::is_valid)
            .unwrap_or(BarcodeFields::MISSING);
        self.bc_forward.push(barcodes.forward);
        self.bc_reverse.push(barcodes.reverse);
        self.bc_qual.push(barcodes.quality);
    }

    /// Spills every full buffer, or every non-empty buffer when `force` is set
    fn spill(&mut self, scratch: &mut ScratchFile, force: bool) -> io::Result<()> {
        let mut result = Ok(());
        for_each_column!(self, col => {
            if result.is_ok() && (force || col.is_full()) {
                result = col.spill(scratch);
            }
        });
        result
    }

    /// Drops buffered values once spilling has failed
    fn discard(&mut self) {
        for_each_column!(self, col => col.discard());
    }
}

/// Incremental writer of a PBI index file.
///
/// Records are added in primary-file order with [`add_record`](Self::add_record).
/// It only fails once the row limit is reached; I/O errors hit while spilling
/// buffers are kept and returned by [`close`](Self::close).
///
/// Dropping an open builder closes it on a best-effort basis; the error, if any,
/// is only logged. Call [`close`](Self::close) to observe failures.
pub struct PbiBuilder {
    path: PathBuf,
    options: PbiBuilderOptions,

    /// Output handle, opened eagerly and written on close
    output: Option<BufWriter<File>>,
    scratch: Option<ScratchFile>,
    columns: Columns,
    reference: Option<ReferenceTracker>,

    /// Number of rows added
    rows: usize,
    has_mapped_data: bool,
    has_barcode_data: bool,

    /// First spill failure, surfaced on close
    deferred: Option<io::Error>,
    closed: bool,
}
impl PbiBuilder {
    /// Opens a builder with default options
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, PbiBuilderOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: PbiBuilderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let output = BufWriter::new(File::create(&path)?);
        let scratch = match ScratchFile::create(&scratch_path(&path)) {
            Ok(scratch) => scratch,
            Err(err) => {
                drop(output);
                if let Err(remove_err) = fs::remove_file(&path) {
                    tracing::debug!(
                        path = %path.display(),
                        %remove_err,
                        "could not remove index file"
                    );
                }
                return Err(err.into());
            }
        };
        let reference = options
            .coordinate_sorted
            .then(|| ReferenceTracker::new(options.reference_count_hint.unwrap_or(0)));
        tracing::debug!(
            path = %path.display(),
            scratch = %scratch.path().display(),
            buffer_size = options.buffer_size,
            coordinate_sorted = options.coordinate_sorted,
            "opened index builder"
        );
        Ok(Self {
            columns: Columns::new(options.buffer_size),
            path,
            options,
            output: Some(output),
            scratch: Some(scratch),
            reference,
            rows: 0,
            has_mapped_data: false,
            has_barcode_data: false,
            deferred: None,
            closed: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records added so far
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Appends one row for `record`, located at `file_offset` in the primary file
    ///
    /// Records added after [`close`](Self::close) are ignored. Fails with
    /// [`BuilderError::TooManyRecords`] once [`MAX_RECORDS`] rows were added.
    pub fn add_record(&mut self, record: &IndexRecord, file_offset: u64) -> Result<()> {
        if self.closed {
            tracing::warn!(path = %self.path.display(), "record added to a closed index builder");
            return Ok(());
        }
        if self.rows >= MAX_RECORDS {
            return Err(BuilderError::TooManyRecords(self.rows + 1).into());
        }
        let row = self.rows as u32;

        self.columns.push(record, file_offset);
        self.has_mapped_data |= record.is_mapped();
        self.has_barcode_data |= record.barcodes.is_some_and(|b| b.is_valid());

        if let Some(tracker) = self.reference.as_mut() {
            let (t_id, pos) = record.sort_position();
            if !tracker.add(t_id, pos, row) {
                self.reference = None;
            }
        }
        self.rows += 1;

        self.spill(false);
        Ok(())
    }

    fn spill(&mut self, force: bool) {
        if self.deferred.is_some() {
            self.columns.discard();
            return;
        }
        let Some(scratch) = self.scratch.as_mut() else {
            return;
        };
        if let Err(err) = self.columns.spill(scratch, force) {
            tracing::debug!(path = %self.path.display(), %err, "spilling index buffers failed");
            self.deferred = Some(err);
            self.columns.discard();
        }
    }

    /// Finalizes the index file and removes the scratch file
    ///
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.spill(true);

        let result = self.finalize();
        if let Some(scratch) = self.scratch.take() {
            let scratch_path = scratch.path().to_path_buf();
            drop(scratch);
            if let Err(err) = fs::remove_file(&scratch_path) {
                tracing::debug!(path = %scratch_path.display(), %err, "could not remove scratch file");
            }
        }
        result
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(err) = self.deferred.take() {
            return Err(err.into());
        }
        let num_reads =
            u32::try_from(self.rows).map_err(|_| BuilderError::TooManyRecords(self.rows))?;
        debug_assert_eq!(self.rows, self.columns.file_offset.len());

        let (Some(output), Some(scratch)) = (self.output.take(), self.scratch.as_mut()) else {
            return Err(io::Error::other("index builder has no open files").into());
        };

        let version = self.options.version;
        let mut sections = Sections::default();
        if self.has_mapped_data {
            sections.set_mapped();
        }
        if self.reference.is_some() {
            sections.set_reference();
        }
        if self.has_barcode_data {
            sections.set_barcode();
        }

        let threads = resolve_threads(self.options.threads);
        let mut writer = BlockWriter::new(output, self.options.compression_level, threads)?;
        PbiHeader::new(version, sections, num_reads).write_to(&mut writer)?;

        let columns = &mut self.columns;
        columns.rg_id.replay(scratch, &mut writer)?;
        columns.q_start.replay(scratch, &mut writer)?;
        columns.q_end.replay(scratch, &mut writer)?;
        columns.hole_number.replay(scratch, &mut writer)?;
        columns.read_qual.replay(scratch, &mut writer)?;
        columns.ctxt_flag.replay(scratch, &mut writer)?;
        columns.file_offset.replay(scratch, &mut writer)?;

        if sections.has_mapped() {
            columns.t_id.replay(scratch, &mut writer)?;
            columns.t_start.replay(scratch, &mut writer)?;
            columns.t_end.replay(scratch, &mut writer)?;
            columns.a_start.replay(scratch, &mut writer)?;
            columns.a_end.replay(scratch, &mut writer)?;
            columns.rev_strand.replay(scratch, &mut writer)?;
            columns.n_m.replay(scratch, &mut writer)?;
            columns.n_mm.replay(scratch, &mut writer)?;
            columns.map_qv.replay(scratch, &mut writer)?;
            if version.has_indel_ops() {
                columns.n_ins_ops.replay(scratch, &mut writer)?;
                columns.n_del_ops.replay(scratch, &mut writer)?;
            }
        }

        if let Some(tracker) = self.reference.take() {
            codec::write_reference(&tracker.into_data(), &mut writer)?;
        }

        if sections.has_barcode() {
            columns.bc_forward.replay(scratch, &mut writer)?;
            columns.bc_reverse.replay(scratch, &mut writer)?;
            columns.bc_qual.replay(scratch, &mut writer)?;
        }

        let spilled = scratch.len();
        let blocks = columns.file_offset.blocks().len();
        writer.into_inner()?.flush()?;
        tracing::info!(
            path = %self.path.display(),
            rows = num_reads,
            %sections,
            %version,
            threads,
            scratch_bytes = spilled,
            blocks_per_column = blocks,
            "finalized index"
        );
        Ok(())
    }
}
impl Drop for PbiBuilder {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(path = %self.path.display(), %err, "failed to finalize index on drop");
        }
    }
}

/// `<path>.build`
fn scratch_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(SCRATCH_EXTENSION);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::index::{RawIndex, ReferenceEntry};
    use crate::record::IndexRecordBuilder;

    /// Coordinate-sorted records over three references, then unmapped ones
    fn sorted_records(n: usize) -> Vec<IndexRecord> {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut records = Vec::with_capacity(n);
        let mut pos = 0;
        for i in 0..n {
            let t_id = match i * 4 / n {
                0 => 0,
                1 => 1,
                2 => 3,
                _ => -1,
            };
            pos += rng.random_range(0..50);
            let mut builder = IndexRecordBuilder::default()
                .read_group_id(-1_314_032_214)
                .query(0, rng.random_range(500..5000))
                .hole_number(i as i32 / 3)
                .read_accuracy(rng.random_range(0.7..1.0))
                .context_flags(rng.random_range(0..4u8));
            if t_id >= 0 {
                builder = builder.mapping(MappedFields {
                    reference_id: t_id,
                    t_start: pos,
                    t_end: pos + 400,
                    a_start: 10,
                    a_end: 410,
                    n_match: 380,
                    n_mismatch: rng.random_range(0..10),
                    reverse_strand: rng.random_bool(0.5),
                    map_quality: 60,
                    n_ins_ops: rng.random_range(0..5),
                    n_del_ops: rng.random_range(0..5),
                });
            }
            if i % 5 == 0 {
                builder = builder.barcodes((i % 7) as i16, (i % 11) as i16, 40);
            }
            records.push(builder.build());
        }
        records
    }

    fn build_file(path: &Path, records: &[IndexRecord], options: PbiBuilderOptions) -> Result<()> {
        let mut builder = options.build(path)?;
        for (i, record) in records.iter().enumerate() {
            builder.add_record(record, i as u64 * 4096)?;
        }
        builder.close()
    }

    #[test]
    fn test_empty_build() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.pbi");
        let mut builder = PbiBuilder::new(&path)?;
        assert!(scratch_path(&path).exists());
        builder.close()?;
        assert!(!scratch_path(&path).exists());

        let index = codec::load(&path)?;
        assert_eq!(index.num_reads(), 0);
        assert_eq!(index.sections().bits(), 0);
        assert_eq!(index, RawIndex::new(Default::default())?);
        Ok(())
    }

    #[test]
    fn test_built_index_matches_records() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sorted.pbi");
        let records = sorted_records(500);
        build_file(
            &path,
            &records,
            PbiBuilderOptions::default()
                .coordinate_sorted(true)
                .reference_count_hint(Some(4))
                .threads(1),
        )?;

        let index = codec::load(&path)?;
        assert_eq!(index.num_reads(), 500);
        assert!(index.has_mapped_data());
        assert!(index.has_reference_data());
        assert!(index.has_barcode_data());

        let basic = index.basic_data();
        assert_eq!(basic.file_offset[17], 17 * 4096);
        assert_eq!(basic.hole_number[17], 5);
        assert_eq!(basic.q_end[42], records[42].q_end);
        assert_eq!(basic.read_qual[42], records[42].read_accuracy);

        let mapped = index.mapped_data().expect("mapped data");
        assert_eq!(mapped.t_id[0], 0);
        assert_eq!(mapped.t_id[499], -1);
        assert_eq!(mapped.map_qv[499], u8::MAX);
        // default version carries no operation counts
        assert!(!mapped.has_indel_ops());

        let barcode = index.barcode_data().expect("barcode data");
        assert_eq!(barcode.bc_forward[35], 0);
        assert_eq!(barcode.bc_reverse[35], 2);
        assert_eq!(barcode.bc_forward[36], -1);
        assert_eq!(barcode.bc_qual[36], u8::MAX);
        Ok(())
    }

    #[test]
    fn test_reference_coverage() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sorted.pbi");
        build_file(
            &path,
            &sorted_records(400),
            PbiBuilderOptions::default()
                .coordinate_sorted(true)
                .reference_count_hint(Some(4)),
        )?;

        let index = codec::load(&path)?;
        let entries = &index.reference_data().expect("reference data").entries;
        assert_eq!(
            entries,
            &vec![
                ReferenceEntry::new(0, 0, 100),
                ReferenceEntry::new(1, 100, 200),
                ReferenceEntry::unset(2),
                ReferenceEntry::new(3, 200, 300),
                ReferenceEntry::new(-1, 300, 400),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_unsorted_input_drops_reference_data() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("unsorted.pbi");
        let mut records = sorted_records(200);
        records.swap(10, 120);
        build_file(
            &path,
            &records,
            PbiBuilderOptions::default().coordinate_sorted(true),
        )?;

        let index = codec::load(&path)?;
        assert!(!index.has_reference_data());
        assert!(index.has_mapped_data());

        // unsorted hint off: never tracked
        build_file(&path, &sorted_records(200), PbiBuilderOptions::default())?;
        assert!(!codec::load(&path)?.has_reference_data());
        Ok(())
    }

    #[test]
    fn test_unmapped_unbarcoded_input() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("plain.pbi");
        let records: Vec<IndexRecord> = (0..10)
            .map(|i| {
                IndexRecordBuilder::default()
                    .hole_number(i)
                    .opt_mapping(Some(MappedFields::UNMAPPED))
                    .barcodes(-1, -1, 0xFF)
                    .build()
            })
            .collect();
        build_file(&path, &records, PbiBuilderOptions::default())?;

        let index = codec::load(&path)?;
        assert_eq!(index.num_reads(), 10);
        assert_eq!(index.sections().bits(), 0);
        Ok(())
    }

    #[test]
    fn test_barcode_quality_alone_is_kept() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("quality.pbi");
        let records = [
            IndexRecordBuilder::default().barcodes(-1, -1, 0xFF).build(),
            IndexRecordBuilder::default().barcodes(-1, -1, 25).build(),
        ];
        build_file(&path, &records, PbiBuilderOptions::default())?;

        let index = codec::load(&path)?;
        let barcode = index.barcode_data().expect("barcode data");
        assert_eq!(barcode.bc_qual, vec![0xFF, 25]);
        assert_eq!(barcode.bc_forward, vec![-1, -1]);
        Ok(())
    }

    #[test]
    fn test_thread_count_does_not_change_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let single = dir.path().join("single.pbi");
        let multi = dir.path().join("multi.pbi");
        // large enough for several compressed blocks
        let records = sorted_records(20_000);
        let options = PbiBuilderOptions::default().coordinate_sorted(true);
        build_file(&single, &records, options.clone().threads(1))?;
        build_file(&multi, &records, options.threads(4))?;
        assert_eq!(fs::read(&single)?, fs::read(&multi)?);
        Ok(())
    }

    #[test]
    fn test_small_buffers_match_large_buffers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let small = dir.path().join("small.pbi");
        let large = dir.path().join("large.pbi");
        let records = sorted_records(1000);
        let options = PbiBuilderOptions::default()
            .coordinate_sorted(true)
            .version(PbiVersion::V4_0_0);
        build_file(&small, &records, options.clone().buffer_size(7))?;
        build_file(&large, &records, options.buffer_size(1 << 20))?;
        assert_eq!(fs::read(&small)?, fs::read(&large)?);

        let mapped = codec::load(&small)?;
        let mapped = mapped.mapped_data().expect("mapped data");
        assert_eq!(mapped.n_ins_ops.len(), 1000);
        assert_eq!(mapped.n_ins_ops[3], records[3].mapping.map_or(0, |m| m.n_ins_ops));
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("twice.pbi");
        let mut builder = PbiBuilder::new(&path)?;
        for (i, record) in sorted_records(50).iter().enumerate() {
            builder.add_record(record, i as u64)?;
        }
        builder.close()?;
        let first = fs::read(&path)?;
        assert!(builder.is_closed());

        builder.add_record(&IndexRecord::default(), 0)?;
        builder.close()?;
        assert_eq!(builder.num_records(), 50);
        assert_eq!(fs::read(&path)?, first);
        Ok(())
    }

    #[test]
    fn test_drop_finalizes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dropped.pbi");
        {
            let mut builder = PbiBuilder::new(&path)?;
            for (i, record) in sorted_records(30).iter().enumerate() {
                builder.add_record(record, i as u64)?;
            }
        }
        assert!(!scratch_path(&path).exists());
        assert_eq!(codec::load(&path)?.num_reads(), 30);
        Ok(())
    }

    #[test]
    fn test_open_fails_for_missing_directory() {
        let result = PbiBuilder::new("/nonexistent/dir/out.pbi");
        assert!(matches!(result, Err(crate::Error::IoError(_))));
    }

    #[test]
    fn test_record_limit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("full.pbi");
        let mut builder = PbiBuilderOptions::default()
            .coordinate_sorted(true)
            .build(&path)?;
        builder.add_record(&IndexRecord::default(), 0)?;

        // pretend the builder already holds the maximum number of rows
        let added = builder.rows;
        builder.rows = MAX_RECORDS;
        let err = builder.add_record(&IndexRecord::default(), 1).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::BuilderError(BuilderError::TooManyRecords(n)) if n == MAX_RECORDS + 1
        ));
        assert_eq!(builder.columns.file_offset.len(), added);
        builder.rows = added;

        builder.close()?;
        assert_eq!(codec::load(&path)?.num_reads(), 1);
        Ok(())
    }

    #[test]
    fn test_scratch_failure_removes_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("blocked.pbi");
        // a directory where the scratch file should go
        fs::create_dir(scratch_path(&path))?;

        let result = PbiBuilder::new(&path);
        assert!(matches!(result, Err(crate::Error::IoError(_))));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_scratch_path() {
        assert_eq!(
            scratch_path(Path::new("/data/reads.bam.pbi")),
            PathBuf::from("/data/reads.bam.pbi.build")
        );
    }
}
