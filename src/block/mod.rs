//! # Compressed block container
//!
//! PBI data is never stored raw. The whole index byte stream is cut into blocks of
//! at most [`BLOCK_SIZE`] uncompressed bytes and every block is ZSTD compressed
//! on its own. The framing resembles BGZF but the container is not BGZF
//! compatible.
//!
//! Independent blocks give two properties the index relies on:
//!
//! 1. Blocks can be compressed by several worker threads while the output still
//!    comes out in submission order, so the thread count never changes the bytes
//!    on disk.
//! 2. Any byte of the uncompressed stream is addressable with a *virtual offset*
//!    (`compressed block start << 16 | offset inside the block`).
//!
//! ## Layout
//!
//! ```text
//! ┌───────────────────┐
//! │   Block Header    │ 16 bytes
//! ├───────────────────┤
//! │  ZSTD payload     │ z_len bytes
//! ├───────────────────┤
//! │       ...         │ More blocks
//! ├───────────────────┤
//! │   EOF Header      │ 16 bytes (z_len = u_len = 0)
//! └───────────────────┘
//! ```

mod header;
mod reader;
mod writer;

pub use header::BlockHeader;
pub use reader::BlockReader;
pub use writer::BlockWriter;

/// Magic bytes opening every block header
pub const BLOCK_MAGIC: &[u8; 4] = b"PBZB";

/// Maximum number of uncompressed bytes held by a single block
pub const BLOCK_SIZE: usize = 0x10000;

/// Default ZSTD compression level for blocks
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Splits a virtual offset into (compressed block start, offset within block)
#[must_use]
pub fn split_virtual_offset(voffset: u64) -> (u64, usize) {
    (voffset >> 16, (voffset & 0xFFFF) as usize)
}

/// Builds a virtual offset from a compressed block start and an in-block offset
#[must_use]
pub fn make_virtual_offset(block_pos: u64, offset: usize) -> u64 {
    (block_pos << 16) | (offset as u64 & 0xFFFF)
}

/// Resolves a requested worker count: `0` probes the machine, never less than one
#[must_use]
pub fn resolve_threads(threads: usize) -> usize {
    if threads == 0 {
        num_cpus::get().max(1)
    } else {
        threads
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::Result;

    fn sample_stream(len: usize) -> Vec<u8> {
        // compressible but not trivially so
        (0..len).map(|i| ((i * 31) % 251) as u8 ^ (i / 997) as u8).collect()
    }

    fn write_stream(data: &[u8], threads: usize) -> Result<Vec<u8>> {
        let mut writer = BlockWriter::new(Vec::new(), DEFAULT_COMPRESSION_LEVEL, threads)?;
        // uneven chunking exercises block boundaries
        for chunk in data.chunks(7919) {
            writer.write_all(chunk)?;
        }
        writer.finish()?;
        Ok(writer.into_inner()?)
    }

    #[test]
    fn test_virtual_offset_parts() {
        let voffset = make_virtual_offset(12345, 678);
        assert_eq!(split_virtual_offset(voffset), (12345, 678));
        assert_eq!(make_virtual_offset(0, 0), 0);
    }

    #[test]
    fn test_resolve_threads() {
        assert!(resolve_threads(0) >= 1);
        assert_eq!(resolve_threads(1), 1);
        assert_eq!(resolve_threads(64), 64);
    }

    #[test]
    fn test_roundtrip_multi_block() -> Result<()> {
        let data = sample_stream(BLOCK_SIZE * 3 + 1234);
        let bytes = write_stream(&data, 1)?;

        let mut reader = BlockReader::from_bytes(bytes)?;
        assert_eq!(reader.num_blocks(), 4);
        assert_eq!(reader.read_all()?, data);
        Ok(())
    }

    #[test]
    fn test_empty_stream() -> Result<()> {
        let bytes = write_stream(&[], 1)?;
        assert_eq!(bytes.len(), std::mem::size_of::<BlockHeader>());

        let mut reader = BlockReader::from_bytes(bytes)?;
        assert_eq!(reader.num_blocks(), 0);
        assert!(reader.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_thread_count_does_not_change_output() -> Result<()> {
        let data = sample_stream(BLOCK_SIZE * 9 + 17);
        let single = write_stream(&data, 1)?;
        let multi = write_stream(&data, 4)?;
        let many = write_stream(&data, 13)?;
        assert_eq!(single, multi);
        assert_eq!(single, many);
        Ok(())
    }

    #[test]
    fn test_seek_virtual_offset() -> Result<()> {
        let data = sample_stream(BLOCK_SIZE * 2 + 500);
        let mut writer = BlockWriter::new(Vec::new(), DEFAULT_COMPRESSION_LEVEL, 2)?;
        writer.write_all(&data[..BLOCK_SIZE + 100])?;
        let voffset = writer.virtual_offset()?;
        writer.write_all(&data[BLOCK_SIZE + 100..])?;
        writer.finish()?;
        let bytes = writer.into_inner()?;

        let mut reader = BlockReader::from_bytes(bytes)?;
        reader.seek(voffset)?;
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        assert_eq!(rest, &data[BLOCK_SIZE + 100..]);
        Ok(())
    }

    #[test]
    fn test_missing_eof() -> Result<()> {
        let data = sample_stream(1000);
        let mut bytes = write_stream(&data, 1)?;
        bytes.truncate(bytes.len() - std::mem::size_of::<BlockHeader>());
        assert!(BlockReader::from_bytes(bytes).is_err());
        Ok(())
    }

    #[test]
    fn test_file_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("blocks.bin");
        let data = sample_stream(BLOCK_SIZE + 3);
        std::fs::write(&path, write_stream(&data, 3)?)?;

        let mut reader = BlockReader::from_path(&path)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        assert_eq!(out, data);
        Ok(())
    }
}
