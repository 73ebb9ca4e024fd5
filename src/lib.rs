//! # pbindex
//!
//! Builder, codec and query engine for PBI files: column-major companion indexes
//! that give row-level random access into PacBio alignment containers.
//!
//! * [`PbiBuilder`] streams [`IndexRecord`]s into a PBI file with bounded memory.
//! * [`index::codec`] loads and saves [`RawIndex`] values.
//! * [`LookupIndex`] adds derived per-reference and per-indel-count lookups.
//! * [`PbiFilter`] and the leaf filters select rows, either built in code or from
//!   dataset [`Property`] triples.
//!
//! ```rust,no_run
//! use pbindex::{Compare, Filter, PbiFilter, ZmwFilter, index::codec};
//!
//! let index = codec::load("reads.bam.pbi").unwrap();
//! let mut filter = PbiFilter::new();
//! filter.add(ZmwFilter::new(14743, Compare::Equal));
//! for row in filter.rows(&index) {
//!     println!("{}", index.basic_data().file_offset[row]);
//! }
//! ```

pub mod block;
pub mod builder;
pub mod error;
pub mod filter;
pub mod index;
mod record;

pub use builder::{PbiBuilder, PbiBuilderOptions};
pub use error::{Error, Result};
pub use filter::{
    AlignedEndFilter, AlignedLengthFilter, AlignedStartFilter, AlignedStrandFilter,
    BarcodeFilter, BarcodeForwardFilter, BarcodeQualityFilter, BarcodeReverseFilter,
    BarcodesFilter, Compare, CompositionType, Filter, FilterContext, FilterHash, IdentityFilter,
    LocalContextFilter, MapQualityFilter, Modulo, NumDeletedBasesFilter, NumInsertedBasesFilter,
    NumMatchesFilter, NumMismatchesFilter, NumSubreadsFilter, PbiFilter, Property,
    QueryEndFilter, QueryLengthFilter, QueryStartFilter, ReadAccuracyFilter, ReadGroupFilter,
    ReferenceEndFilter, ReferenceIdFilter, ReferenceNameFilter, ReferenceStartFilter, Strand,
    ZmwFilter, ZmwModuloFilter,
};
pub use index::{LookupIndex, PbiVersion, RawIndex, Sections};
pub use record::{BarcodeFields, IndexRecord, IndexRecordBuilder, MappedFields};
