//! Byte-level (de)serialization of [`RawIndex`] values.
//!
//! Encoding is deterministic: the same index always produces the same bytes and
//! `decode(encode(x)) == x`. Columns are converted to little-endian with
//! `byteorder` so the on-disk layout does not depend on the host.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{
    BarcodeData, BasicData, HEADER_SIZE, MappedData, PbiHeader, RawIndex, ReferenceData,
    ReferenceEntry,
};
use crate::block::{BlockReader, BlockWriter};
use crate::{Result, error::IndexError};

/// Number of values converted per write call
const CONVERT_CHUNK: usize = 0x4000;

/// A fixed-width value stored in an index column
pub(crate) trait Column: bytemuck::Pod + Default {
    /// Encodes values as little-endian into `dst` (`dst.len() == values.len() * size`)
    fn to_le(values: &[Self], dst: &mut [u8]);

    /// Decodes little-endian `src` into `dst`
    fn from_le(src: &[u8], dst: &mut [Self]);

    /// Writes a whole column as little-endian values
    fn write_column<W: Write>(values: &[Self], writer: &mut W) -> io::Result<()> {
        let mut buf = Vec::new();
        for chunk in values.chunks(CONVERT_CHUNK) {
            buf.resize(std::mem::size_of_val(chunk), 0);
            Self::to_le(chunk, &mut buf);
            writer.write_all(&buf)?;
        }
        Ok(())
    }
}

macro_rules! impl_column {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Column for $ty {
            fn to_le(values: &[Self], dst: &mut [u8]) {
                LittleEndian::$write(values, dst);
            }
            fn from_le(src: &[u8], dst: &mut [Self]) {
                LittleEndian::$read(src, dst);
            }
        }
    };
}

impl_column!(i16, write_i16_into, read_i16_into);
impl_column!(i32, write_i32_into, read_i32_into);
impl_column!(u32, write_u32_into, read_u32_into);
impl_column!(u64, write_u64_into, read_u64_into);
impl_column!(f32, write_f32_into, read_f32_into);

impl Column for u8 {
    fn to_le(values: &[Self], dst: &mut [u8]) {
        dst.copy_from_slice(values);
    }
    fn from_le(src: &[u8], dst: &mut [Self]) {
        dst.copy_from_slice(src);
    }
}

/// Encodes an index into its uncompressed byte stream
pub fn encode(index: &RawIndex) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + index.num_reads() * 32);
    write_to(index, &mut bytes)?;
    Ok(bytes)
}

/// Writes the uncompressed byte stream of an index
pub fn write_to<W: Write>(index: &RawIndex, writer: &mut W) -> Result<()> {
    index.validate()?;
    let header = PbiHeader::new(
        index.version(),
        index.sections(),
        index.num_reads() as u32,
    );
    header.write_to(writer)?;

    write_basic(index.basic_data(), writer)?;
    if let Some(mapped) = index.mapped_data() {
        write_mapped(mapped, writer)?;
    }
    if let Some(reference) = index.reference_data() {
        write_reference(reference, writer)?;
    }
    if let Some(barcode) = index.barcode_data() {
        write_barcode(barcode, writer)?;
    }
    Ok(())
}

fn write_basic<W: Write>(basic: &BasicData, writer: &mut W) -> io::Result<()> {
    i32::write_column(&basic.rg_id, writer)?;
    i32::write_column(&basic.q_start, writer)?;
    i32::write_column(&basic.q_end, writer)?;
    i32::write_column(&basic.hole_number, writer)?;
    f32::write_column(&basic.read_qual, writer)?;
    u8::write_column(&basic.ctxt_flag, writer)?;
    u64::write_column(&basic.file_offset, writer)
}

fn write_mapped<W: Write>(mapped: &MappedData, writer: &mut W) -> io::Result<()> {
    i32::write_column(&mapped.t_id, writer)?;
    i32::write_column(&mapped.t_start, writer)?;
    i32::write_column(&mapped.t_end, writer)?;
    i32::write_column(&mapped.a_start, writer)?;
    i32::write_column(&mapped.a_end, writer)?;
    u8::write_column(&mapped.rev_strand, writer)?;
    u32::write_column(&mapped.n_m, writer)?;
    u32::write_column(&mapped.n_mm, writer)?;
    u8::write_column(&mapped.map_qv, writer)?;
    // empty unless the version carries indel operation counts
    u32::write_column(&mapped.n_ins_ops, writer)?;
    u32::write_column(&mapped.n_del_ops, writer)
}

pub(crate) fn write_reference<W: Write>(
    reference: &ReferenceData,
    writer: &mut W,
) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(reference.entries.len() as u32)?;
    for entry in &reference.entries {
        writer.write_i32::<LittleEndian>(entry.t_id)?;
        writer.write_u32::<LittleEndian>(entry.begin_row)?;
        writer.write_u32::<LittleEndian>(entry.end_row)?;
    }
    Ok(())
}

fn write_barcode<W: Write>(barcode: &BarcodeData, writer: &mut W) -> io::Result<()> {
    i16::write_column(&barcode.bc_forward, writer)?;
    i16::write_column(&barcode.bc_reverse, writer)?;
    u8::write_column(&barcode.bc_qual, writer)
}

/// Sequential reader over an uncompressed index stream
struct SectionCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}
impl<'a> SectionCursor<'a> {
    fn take(&mut self, section: &'static str, len: usize) -> Result<&'a [u8]> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < len {
            return Err(IndexError::Truncated {
                section,
                expected: len,
                found: remaining,
            }
            .into());
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn column<T: Column>(&mut self, section: &'static str, n: usize) -> Result<Vec<T>> {
        let src = self.take(section, n * size_of::<T>())?;
        let mut values = vec![T::default(); n];
        T::from_le(src, &mut values);
        Ok(values)
    }

    fn u32(&mut self, section: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(section, 4)?))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decodes an uncompressed index byte stream
pub fn decode(bytes: &[u8]) -> Result<RawIndex> {
    let header = PbiHeader::from_bytes(bytes)?;
    let n = header.num_reads as usize;
    let mut cursor = SectionCursor {
        bytes,
        pos: HEADER_SIZE,
    };

    let basic = BasicData {
        rg_id: cursor.column("basic", n)?,
        q_start: cursor.column("basic", n)?,
        q_end: cursor.column("basic", n)?,
        hole_number: cursor.column("basic", n)?,
        read_qual: cursor.column("basic", n)?,
        ctxt_flag: cursor.column("basic", n)?,
        file_offset: cursor.column("basic", n)?,
    };
    let mut index = RawIndex::new(basic)?.with_version(header.version);

    if header.sections.has_mapped() {
        let mut mapped = MappedData {
            t_id: cursor.column("mapped", n)?,
            t_start: cursor.column("mapped", n)?,
            t_end: cursor.column("mapped", n)?,
            a_start: cursor.column("mapped", n)?,
            a_end: cursor.column("mapped", n)?,
            rev_strand: cursor.column("mapped", n)?,
            n_m: cursor.column("mapped", n)?,
            n_mm: cursor.column("mapped", n)?,
            map_qv: cursor.column("mapped", n)?,
            n_ins_ops: Vec::new(),
            n_del_ops: Vec::new(),
        };
        if header.version.has_indel_ops() {
            mapped.n_ins_ops = cursor.column("mapped", n)?;
            mapped.n_del_ops = cursor.column("mapped", n)?;
        }
        index = index.with_mapped(mapped)?;
    }

    if header.sections.has_reference() {
        let num_refs = cursor.u32("reference")? as usize;
        let raw: Vec<u32> = cursor.column("reference", num_refs * 3)?;
        let entries = raw
            .chunks_exact(3)
            .map(|e| ReferenceEntry::new(e[0] as i32, e[1], e[2]))
            .collect();
        // entries are stored in order; keep them as found
        index = index.with_reference(ReferenceData { entries });
    }

    if header.sections.has_barcode() {
        let barcode = BarcodeData {
            bc_forward: cursor.column("barcode", n)?,
            bc_reverse: cursor.column("barcode", n)?,
            bc_qual: cursor.column("barcode", n)?,
        };
        index = index.with_barcodes(barcode)?;
    }

    if cursor.remaining() > 0 {
        return Err(IndexError::TrailingBytes(cursor.remaining()).into());
    }
    index.validate()?;
    Ok(index)
}

/// Reads an uncompressed index stream to its end and decodes it
pub fn read_from<R: Read>(reader: &mut R) -> Result<RawIndex> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Loads an index file: decompresses the block container and decodes it
pub fn load<P: AsRef<Path>>(path: P) -> Result<RawIndex> {
    let path = path.as_ref();
    let bytes = BlockReader::from_path(path)?.read_all()?;
    let index = decode(&bytes)?;
    tracing::info!(
        path = %path.display(),
        version = %index.version(),
        sections = %index.sections(),
        rows = index.num_reads(),
        "loaded index"
    );
    Ok(index)
}

/// Encodes an index and writes it to `path` inside a block container
pub fn save<P: AsRef<Path>>(index: &RawIndex, path: P, level: i32, threads: usize) -> Result<()> {
    let handle = BufWriter::new(File::create(path)?);
    let mut writer = BlockWriter::new(handle, level, threads)?;
    write_to(index, &mut writer)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DEFAULT_COMPRESSION_LEVEL;
    use crate::index::PbiVersion;

    fn sample_index(version: PbiVersion) -> Result<RawIndex> {
        let basic = BasicData {
            rg_id: vec![-1_314_032_214, -1_314_032_214, 12, 12],
            q_start: vec![0, 2000, 0, 48],
            q_end: vec![1500, 4200, 900, 3000],
            hole_number: vec![14743, 14743, 20000, 20001],
            read_qual: vec![0.9, 0.85, 0.99, 0.7],
            ctxt_flag: vec![0, 3, 16, 32],
            file_offset: vec![16_973_825, 16_990_208, 17_006_592, 17_022_976],
        };
        let mut mapped = MappedData {
            t_id: vec![0, 0, 1, -1],
            t_start: vec![9507, 9800, 100, -1],
            t_end: vec![10_000, 11_000, 300, -1],
            a_start: vec![10, 2000, 0, -1],
            a_end: vec![520, 3210, 190, -1],
            rev_strand: vec![0, 1, 0, 0],
            n_m: vec![480, 1150, 180, 0],
            n_mm: vec![5, 20, 2, 0],
            map_qv: vec![254, 254, 60, 255],
            n_ins_ops: Vec::new(),
            n_del_ops: Vec::new(),
        };
        if version.has_indel_ops() {
            mapped.n_ins_ops = vec![3, 7, 1, 0];
            mapped.n_del_ops = vec![2, 4, 0, 0];
        }
        let reference = ReferenceData::new(vec![
            ReferenceEntry::new(0, 0, 2),
            ReferenceEntry::new(1, 2, 3),
            ReferenceEntry::new(ReferenceEntry::UNMAPPED_ID, 3, 4),
        ]);
        let barcode = BarcodeData {
            bc_forward: vec![0, 1, -1, 3],
            bc_reverse: vec![0, 1, -1, 3],
            bc_qual: vec![50, 60, 255, 70],
        };
        Ok(RawIndex::new(basic)?
            .with_version(version)
            .with_mapped(mapped)?
            .with_reference(reference)
            .with_barcodes(barcode)?)
    }

    #[test]
    fn test_roundtrip_all_sections() -> Result<()> {
        let index = sample_index(PbiVersion::CURRENT)?;
        let bytes = encode(&index)?;
        let decoded = decode(&bytes)?;
        assert_eq!(decoded, index);
        assert_eq!(encode(&decoded)?, bytes);
        assert_eq!(read_from(&mut bytes.as_slice())?, index);
        Ok(())
    }

    #[test]
    fn test_roundtrip_indel_ops() -> Result<()> {
        let index = sample_index(PbiVersion::V4_0_0)?;
        let v3_len = encode(&sample_index(PbiVersion::V3_0_1)?)?.len();
        let bytes = encode(&index)?;
        // two extra u32 columns of four rows
        assert_eq!(bytes.len(), v3_len + 2 * 4 * 4);

        let decoded = decode(&bytes)?;
        assert_eq!(decoded.mapped_data().map(|m| m.n_ins_ops.clone()), Some(vec![3, 7, 1, 0]));
        assert_eq!(decoded, index);
        Ok(())
    }

    #[test]
    fn test_absent_sections_stay_absent() -> Result<()> {
        let full = sample_index(PbiVersion::CURRENT)?;
        let index = RawIndex::new(full.basic_data().clone())?;
        let bytes = encode(&index)?;
        // header plus 4 * (4 + 4 + 4 + 4 + 4 + 1 + 8) bytes of basic columns
        assert_eq!(bytes.len(), HEADER_SIZE + 4 * 29);

        let decoded = decode(&bytes)?;
        assert!(!decoded.has_mapped_data());
        assert!(!decoded.has_reference_data());
        assert!(!decoded.has_barcode_data());
        assert_eq!(decoded, index);
        Ok(())
    }

    #[test]
    fn test_little_endian_layout() -> Result<()> {
        let index = sample_index(PbiVersion::CURRENT)?;
        let bytes = encode(&index)?;
        // first column is rg_id; -1314032214 == 0xB1AD_75AA
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 4], &[0xAA, 0x75, 0xAD, 0xB1]);
        // num_reads follows magic, version and sections
        assert_eq!(&bytes[10..14], &[4, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_mapped_column_order() -> Result<()> {
        let bytes = encode(&sample_index(PbiVersion::CURRENT)?)?;
        let mapped = HEADER_SIZE + 4 * 29;
        // five i32 columns, then the strand bytes
        let strand = mapped + 5 * 4 * 4;
        assert_eq!(&bytes[strand..strand + 4], &[0, 1, 0, 0]);
        assert_eq!(&bytes[strand + 4..strand + 8], &480u32.to_le_bytes());
        let map_qv = strand + 4 + 2 * 4 * 4;
        assert_eq!(&bytes[map_qv..map_qv + 4], &[254, 254, 60, 255]);
        Ok(())
    }

    fn one_row_index(reference: ReferenceData) -> Result<RawIndex> {
        let basic = BasicData {
            rg_id: vec![1],
            q_start: vec![0],
            q_end: vec![100],
            hole_number: vec![7],
            read_qual: vec![0.9],
            ctxt_flag: vec![0],
            file_offset: vec![0],
        };
        Ok(RawIndex::new(basic)?.with_reference(reference))
    }

    #[test]
    fn test_encode_rejects_bad_reference() -> Result<()> {
        let index = one_row_index(ReferenceData::new(vec![ReferenceEntry::new(0, 5, 99)]))?;
        assert!(matches!(
            encode(&index),
            Err(crate::Error::IndexError(IndexError::InvalidReference { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_decode_rejects_bad_reference() -> Result<()> {
        let index = one_row_index(ReferenceData::new(vec![ReferenceEntry::new(0, 0, 1)]))?;
        let mut bytes = encode(&index)?;
        assert_eq!(decode(&bytes)?, index);

        // num_refs, t_id and begin_row precede the end row of the only entry
        let end_row = HEADER_SIZE + 29 + 12;
        bytes[end_row..end_row + 4].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(crate::Error::IndexError(IndexError::InvalidReference {
                end_row: 99,
                ..
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_empty_index_roundtrip() -> Result<()> {
        let index = RawIndex::new(BasicData::default())?;
        let bytes = encode(&index)?;
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = decode(&bytes)?;
        assert_eq!(decoded.num_reads(), 0);
        assert_eq!(decoded.sections().bits(), 0);
        assert_eq!(decoded, index);
        Ok(())
    }

    #[test]
    fn test_decode_bad_magic() -> Result<()> {
        let mut bytes = encode(&sample_index(PbiVersion::CURRENT)?)?;
        bytes[0] = b'X';
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::IndexError(IndexError::InvalidMagic(_))
        ));
        Ok(())
    }

    #[test]
    fn test_decode_newer_version() -> Result<()> {
        let mut bytes = encode(&sample_index(PbiVersion::CURRENT)?)?;
        bytes[4..8].copy_from_slice(&0x0005_0000u32.to_le_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_unsupported_version());
        Ok(())
    }

    #[test]
    fn test_decode_unknown_older_version() -> Result<()> {
        let mut bytes = encode(&sample_index(PbiVersion::CURRENT)?)?;
        bytes[4..8].copy_from_slice(&0x0003_0003u32.to_le_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(!err.is_unsupported_version());
        assert!(matches!(
            err,
            crate::Error::IndexError(IndexError::UnknownVersion(0x0003_0003))
        ));
        Ok(())
    }

    #[test]
    fn test_decode_truncated() -> Result<()> {
        let bytes = encode(&sample_index(PbiVersion::CURRENT)?)?;
        for cut in [HEADER_SIZE + 3, HEADER_SIZE + 4 * 29 + 10, bytes.len() - 1] {
            let err = decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_truncation(), "cut at {cut}: {err}");
        }
        Ok(())
    }

    #[test]
    fn test_decode_trailing_bytes() -> Result<()> {
        let mut bytes = encode(&sample_index(PbiVersion::CURRENT)?)?;
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(crate::Error::IndexError(IndexError::TrailingBytes(1)))
        ));
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.pbi");
        let index = sample_index(PbiVersion::CURRENT)?;
        save(&index, &path, DEFAULT_COMPRESSION_LEVEL, 1)?;
        assert_eq!(load(&path)?, index);
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let err = load("/nonexistent/dir/missing.pbi").unwrap_err();
        assert!(matches!(err, crate::Error::IoError(_)));
    }
}
