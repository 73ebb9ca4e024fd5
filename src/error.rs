/// Custom Result type for pbindex operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the pbindex library, encompassing every failure that
/// can occur while building, reading or querying a PBI index.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the index layout (header, sections, versions)
    #[error("Error processing index: {0}")]
    IndexError(#[from] IndexError),

    /// Errors raised by the compressed block container
    #[error("Error processing compressed block: {0}")]
    BlockError(#[from] BlockError),

    /// Errors raised while finalizing an index
    #[error("Error building index: {0}")]
    BuilderError(#[from] BuilderError),

    /// Errors raised while constructing filters
    #[error("Error constructing filter: {0}")]
    FilterError(#[from] FilterError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),
}
impl Error {
    /// Checks if the error was caused by an index that is newer than this library
    ///
    /// Such indexes need to be regenerated (or read with a newer library) rather
    /// than treated as corrupted.
    #[must_use]
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, Self::IndexError(IndexError::UnsupportedVersion(_)))
    }

    /// Checks if the error is caused by missing bytes in an index stream
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Self::IndexError(IndexError::Truncated { .. }) | Self::BlockError(BlockError::Truncated(_))
        )
    }
}

/// Errors specific to decoding and validating PBI data
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The magic number at the start of the index does not match `PBI\x01`
    ///
    /// # Arguments
    /// * `[u8; 4]` - The bytes that were found instead
    #[error("Invalid magic number: {0:?}")]
    InvalidMagic([u8; 4]),

    /// The version is newer than the newest supported version
    #[error("Unsupported index version: {0:#08x}")]
    UnsupportedVersion(u32),

    /// The version is not newer than the newest supported version but matches
    /// no released format
    #[error("Unknown index version: {0:#08x}")]
    UnknownVersion(u32),

    /// A section declares more bytes than the stream contains
    #[error("Truncated {section} section: expected {expected} bytes, found {found}")]
    Truncated {
        section: &'static str,
        expected: usize,
        found: usize,
    },

    /// Bytes remain after the final declared section
    #[error("Unexpected {0} trailing bytes after the final index section")]
    TrailingBytes(usize),

    /// A section column has a different length than the header row count
    #[error("Column {column} holds {found} values but the index declares {expected} rows")]
    SizeMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    /// Indexes from incompatible version families cannot be combined
    #[error("Cannot combine index versions {0:#08x} and {1:#08x}")]
    IncompatibleVersions(u32, u32),

    /// The combined row count does not fit the on-disk row counter
    #[error("Index row count overflow: {0} rows")]
    RowCountOverflow(usize),

    /// A reference entry points outside the index or overlaps another entry
    #[error("Reference {t_id} rows {begin_row}..{end_row} are invalid for {num_reads} rows")]
    InvalidReference {
        t_id: i32,
        begin_row: u32,
        end_row: u32,
        num_reads: usize,
    },

    /// More indexes were aggregated than a row's source number can address
    #[error("Cannot aggregate {0} indexes")]
    TooManySources(usize),
}

/// Errors raised by the compressed block container
#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    /// A block header does not start with the block magic
    ///
    /// # Arguments
    /// * `usize` - The byte position of the bad block header
    #[error("Invalid block magic at byte {0}")]
    InvalidMagic(usize),

    /// A block header or payload extends past the end of the data
    #[error("Block container truncated at byte {0}")]
    Truncated(usize),

    /// The container ends without the terminating empty block
    #[error("Block container is missing its end-of-file marker")]
    MissingEof,

    /// A block decompressed to a different size than its header declares
    #[error("Block at byte {pos} decompressed to {found} bytes, expected {expected}")]
    SizeMismatch {
        pos: usize,
        expected: usize,
        found: usize,
    },

    /// A virtual offset does not point inside a known block
    #[error("Invalid virtual offset: {0:#x}")]
    InvalidVirtualOffset(u64),
}

/// Errors raised while finalizing an index from its scratch file
#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    /// A spilled field block could not be read back in full
    #[error("Scratch file corrupted: field {field} block at {pos} is short by {missing} bytes")]
    ScratchCorrupted {
        field: &'static str,
        pos: u64,
        missing: usize,
    },

    /// The number of rows exceeds what the index header can store
    #[error("Too many records for a single index: {0}")]
    TooManyRecords(usize),
}

/// Errors raised while constructing filters
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    /// The property name does not map to any known filter
    #[error("Unsupported filter property: {0}")]
    UnsupportedFilter(String),

    /// The comparison operator has no meaning for the given filter
    #[error("Comparison {cmp} is not supported by the {filter} filter")]
    UnsupportedComparison { filter: &'static str, cmp: String },

    /// The operator string is not a known comparison
    #[error("{0} is not a valid comparison operator")]
    UnsupportedOperator(String),

    /// Multi-valued filters can only test for containment
    #[error("Multi-valued filters can only check for containment, found {0}")]
    InvalidListComparison(String),

    /// The literal value cannot be parsed for the given property
    #[error("Invalid value '{value}' for filter property {name}")]
    InvalidValue { name: String, value: String },

    /// A reference name is not present in the supplied reference table
    #[error("Unknown reference name: {0}")]
    UnknownReference(String),
}
