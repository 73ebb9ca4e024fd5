use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use zstd::zstd_safe;

use super::{BlockHeader, split_virtual_offset};
use crate::{Result, error::BlockError};

/// Bytes backing a block container
enum Source {
    Mapped(Arc<Mmap>),
    Owned(Vec<u8>),
}
impl Source {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => mmap,
            Self::Owned(bytes) => bytes,
        }
    }
}

/// Location of one compressed block within the container
#[derive(Clone, Copy, Debug)]
struct BlockSpan {
    /// Byte position of the block header
    pos: usize,
    z_len: usize,
    u_len: usize,
}
impl BlockSpan {
    fn payload(&self) -> std::ops::Range<usize> {
        let start = self.pos + size_of::<BlockHeader>();
        start..start + self.z_len
    }
}

/// Random-access reader over a compressed block container.
///
/// All block headers are scanned when the reader is opened, so structural damage
/// (bad magic, truncation, missing EOF marker) is reported up front. Block payloads
/// are only decompressed as they are read.
pub struct BlockReader {
    source: Source,

    /// Every data block, in file order (the EOF block is excluded)
    blocks: Vec<BlockSpan>,

    /// Byte position of the EOF block
    eof_pos: usize,

    /// Reusable decompression context
    dctx: zstd_safe::DCtx<'static>,

    /// Index of the next block to load
    next_block: usize,

    /// Decompressed contents of the current block
    ubuf: Vec<u8>,

    /// Read position within `ubuf`
    upos: usize,
}
impl BlockReader {
    /// Opens a container from disk using a memory map
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file").into());
        }

        // Safety: the file is open and won't be modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        Self::new(Source::Mapped(Arc::new(mmap)))
    }

    /// Opens a container held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new(Source::Owned(bytes))
    }

    fn new(source: Source) -> Result<Self> {
        let (blocks, eof_pos) = scan_blocks(source.bytes())?;
        Ok(Self {
            source,
            blocks,
            eof_pos,
            dctx: zstd_safe::DCtx::create(),
            next_block: 0,
            ubuf: Vec::new(),
            upos: 0,
        })
    }

    /// Number of data blocks in the container
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of uncompressed bytes in the container
    #[must_use]
    pub fn uncompressed_len(&self) -> usize {
        self.blocks.iter().map(|b| b.u_len).sum()
    }

    /// Decompresses the whole container from the first block
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.uncompressed_len());
        for idx in 0..self.blocks.len() {
            self.load_block(idx)?;
            out.extend_from_slice(&self.ubuf);
        }
        self.next_block = self.blocks.len();
        self.upos = self.ubuf.len();
        Ok(out)
    }

    /// Positions the reader at a virtual offset produced by the writer
    pub fn seek(&mut self, voffset: u64) -> Result<()> {
        let (block_pos, offset) = split_virtual_offset(voffset);
        let block_pos = block_pos as usize;

        if block_pos == self.eof_pos && offset == 0 {
            self.next_block = self.blocks.len();
            self.ubuf.clear();
            self.upos = 0;
            return Ok(());
        }

        let idx = self
            .blocks
            .binary_search_by_key(&block_pos, |b| b.pos)
            .map_err(|_| BlockError::InvalidVirtualOffset(voffset))?;
        if offset > self.blocks[idx].u_len {
            return Err(BlockError::InvalidVirtualOffset(voffset).into());
        }
        self.load_block(idx)?;
        self.next_block = idx + 1;
        self.upos = offset;
        Ok(())
    }

    /// Decompresses block `idx` into the internal buffer
    fn load_block(&mut self, idx: usize) -> Result<()> {
        let span = self.blocks[idx];
        let payload = &self.source.bytes()[span.payload()];

        self.ubuf.clear();
        self.ubuf.reserve(span.u_len);
        let found = self
            .dctx
            .decompress(&mut self.ubuf, payload)
            .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
        if found != span.u_len {
            return Err(BlockError::SizeMismatch {
                pos: span.pos,
                expected: span.u_len,
                found,
            }
            .into());
        }
        self.upos = 0;
        Ok(())
    }
}

impl Read for BlockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.upos >= self.ubuf.len() {
            if self.next_block >= self.blocks.len() {
                return Ok(0);
            }
            self.load_block(self.next_block).map_err(io::Error::other)?;
            self.next_block += 1;
        }
        let n = buf.len().min(self.ubuf.len() - self.upos);
        buf[..n].copy_from_slice(&self.ubuf[self.upos..self.upos + n]);
        self.upos += n;
        Ok(n)
    }
}

/// Walks every block header, returning the data blocks and the EOF position
fn scan_blocks(bytes: &[u8]) -> Result<(Vec<BlockSpan>, usize)> {
    let mut blocks = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let header = BlockHeader::from_bytes(bytes, pos)?;
        if header.is_eof() {
            let end = pos + size_of::<BlockHeader>();
            if end != bytes.len() {
                return Err(BlockError::InvalidMagic(end).into());
            }
            return Ok((blocks, pos));
        }
        let span = BlockSpan {
            pos,
            z_len: header.z_len(),
            u_len: header.u_len(),
        };
        if span.payload().end > bytes.len() {
            return Err(BlockError::Truncated(pos).into());
        }
        pos = span.payload().end;
        blocks.push(span);
    }
    Err(BlockError::MissingEof.into())
}
