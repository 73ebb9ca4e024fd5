use std::fmt;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{HEADER_SIZE, PBI_MAGIC, RESERVED_SIZE};
use crate::{Result, error::IndexError};

/// Basic data is always present and has no bit of its own
pub const SECTION_BASIC: u16 = 0;

/// Index has mapped data
pub const SECTION_MAPPED: u16 = 1 << 0;

/// Index has per-reference row ranges
pub const SECTION_REFERENCE: u16 = 1 << 1;

/// Index has barcode data
pub const SECTION_BARCODE: u16 = 1 << 2;

const SECTION_ALL: u16 = SECTION_MAPPED | SECTION_REFERENCE | SECTION_BARCODE;

/// Known PBI format versions, ordered oldest to newest
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum PbiVersion {
    V3_0_0 = 0x0003_0000,
    V3_0_1 = 0x0003_0001,
    V3_0_2 = 0x0003_0002,
    V4_0_0 = 0x0004_0000,
}
impl PbiVersion {
    /// Version written by default
    pub const CURRENT: Self = Self::V3_0_1;

    /// Newest version this library can read and write
    pub const NEWEST: Self = Self::V4_0_0;

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Versions 4.0.0 and later store insertion/deletion operation counts
    #[must_use]
    pub fn has_indel_ops(self) -> bool {
        self >= Self::V4_0_0
    }

    /// Whether two versions share a column layout
    #[must_use]
    pub fn is_compatible(self, other: Self) -> bool {
        self.has_indel_ops() == other.has_indel_ops()
    }
}
impl Default for PbiVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}
impl TryFrom<u32> for PbiVersion {
    type Error = IndexError;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0x0003_0000 => Ok(Self::V3_0_0),
            0x0003_0001 => Ok(Self::V3_0_1),
            0x0003_0002 => Ok(Self::V3_0_2),
            0x0004_0000 => Ok(Self::V4_0_0),
            _ if value > Self::NEWEST.as_u32() => Err(IndexError::UnsupportedVersion(value)),
            _ => Err(IndexError::UnknownVersion(value)),
        }
    }
}
impl fmt::Display for PbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.as_u32();
        write!(f, "{}.{}.{}", (v >> 16) & 0xFF, (v >> 8) & 0xFF, v & 0xFF)
    }
}

/// Bitmask of the optional sections present in an index
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Sections(u16);

/// Flag getters and setters
impl Sections {
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        Self(bits & SECTION_ALL)
    }
    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }
    pub fn set_mapped(&mut self) {
        self.0 |= SECTION_MAPPED;
    }
    pub fn set_reference(&mut self) {
        self.0 |= SECTION_REFERENCE;
    }
    pub fn set_barcode(&mut self) {
        self.0 |= SECTION_BARCODE;
    }
    #[must_use]
    pub fn has_mapped(self) -> bool {
        self.0 & SECTION_MAPPED != 0
    }
    #[must_use]
    pub fn has_reference(self) -> bool {
        self.0 & SECTION_REFERENCE != 0
    }
    #[must_use]
    pub fn has_barcode(self) -> bool {
        self.0 & SECTION_BARCODE != 0
    }
    /// Basic data is implied by every index
    #[must_use]
    pub fn has_basic(self) -> bool {
        true
    }
}
impl fmt::Display for Sections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BASIC")?;
        if self.has_mapped() {
            f.write_str("|MAPPED")?;
        }
        if self.has_reference() {
            f.write_str("|REFERENCE")?;
        }
        if self.has_barcode() {
            f.write_str("|BARCODE")?;
        }
        Ok(())
    }
}

/// The fixed 32-byte header of a PBI stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PbiHeader {
    pub version: PbiVersion,
    pub sections: Sections,
    pub num_reads: u32,
}
impl PbiHeader {
    #[must_use]
    pub fn new(version: PbiVersion, sections: Sections, num_reads: u32) -> Self {
        Self {
            version,
            sections,
            num_reads,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(PBI_MAGIC)?;
        writer.write_u32::<LittleEndian>(self.version.as_u32())?;
        writer.write_u16::<LittleEndian>(self.sections.bits())?;
        writer.write_u32::<LittleEndian>(self.num_reads)?;
        writer.write_all(&[0; RESERVED_SIZE])?;
        Ok(())
    }

    /// Parses the header from the start of a decompressed stream
    ///
    /// Reserved bytes are not checked.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PBI_MAGIC.len() {
            return Err(IndexError::Truncated {
                section: "header",
                expected: HEADER_SIZE,
                found: bytes.len(),
            }
            .into());
        }
        let mut magic = [0; 4];
        magic.copy_from_slice(&bytes[..4]);
        if magic != *PBI_MAGIC {
            return Err(IndexError::InvalidMagic(magic).into());
        }
        if bytes.len() < HEADER_SIZE {
            return Err(IndexError::Truncated {
                section: "header",
                expected: HEADER_SIZE,
                found: bytes.len(),
            }
            .into());
        }
        let version = PbiVersion::try_from(LittleEndian::read_u32(&bytes[4..8]))?;
        let sections = Sections::from_bits(LittleEndian::read_u16(&bytes[8..10]));
        let num_reads = LittleEndian::read_u32(&bytes[10..14]);
        Ok(Self::new(version, sections, num_reads))
    }
}
