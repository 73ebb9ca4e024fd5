//! # PBI index
//!
//! The PBI index is a column-major companion file for an alignment container.
//! Every record of the primary file is one *row*; each indexed field is stored as
//! a contiguous column of `num_reads` values.
//!
//! ## File Structure
//!
//! The whole stream is stored inside a [compressed block container](crate::block).
//!
//! ```text
//! ┌───────────────────┐
//! │    PBI Header     │ 32 bytes
//! ├───────────────────┤
//! │   Basic columns   │ always present
//! ├───────────────────┤
//! │  Mapped columns   │ optional
//! ├───────────────────┤
//! │ Reference entries │ optional (coordinate-sorted input only)
//! ├───────────────────┤
//! │  Barcode columns  │ optional
//! └───────────────────┘
//! ```
//!
//! All multi-byte values are little-endian on disk.

pub mod codec;
mod header;
mod lookup;
mod raw;

pub use header::{
    PbiHeader, PbiVersion, SECTION_BARCODE, SECTION_BASIC, SECTION_MAPPED, SECTION_REFERENCE,
    Sections,
};
pub use lookup::{LookupIndex, MappedLookup, ReferenceLookup};
pub use raw::{
    AggregateIndex, BarcodeData, BasicData, MappedData, RawIndex, ReferenceData, ReferenceEntry,
};

/// Magic bytes opening every PBI stream
pub const PBI_MAGIC: &[u8; 4] = b"PBI\x01";

/// Size of the fixed PBI header in bytes
pub const HEADER_SIZE: usize = 32;

/// Number of reserved zero bytes closing the header
pub const RESERVED_SIZE: usize = 18;

/// Default per-field in-memory budget of the builder, in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 0x10000;

/// File extension of PBI indexes
pub const PBI_EXTENSION: &str = "pbi";
