use std::io::{self, Write};
use std::thread;

use zstd::zstd_safe;

use super::{BLOCK_SIZE, BlockHeader, make_virtual_offset, resolve_threads};
use crate::Result;

/// Append-only writer producing a compressed block container.
///
/// Bytes are gathered into [`BLOCK_SIZE`] blocks. Full blocks are queued and
/// compressed in batches of `threads` blocks, one worker per block group, and
/// the compressed batch is always emitted in the order the blocks were filled.
///
/// [`finish`](Self::finish) must be called to write the trailing EOF block;
/// dropping the writer finishes it on a best-effort basis.
pub struct BlockWriter<W: Write> {
    /// Internal writer for the container
    inner: Option<W>,

    /// Compression level used for every block
    level: i32,

    /// Number of worker threads compressing full blocks
    threads: usize,

    /// Block currently being filled
    ubuf: Vec<u8>,

    /// Full blocks waiting for compression
    pending: Vec<Vec<u8>>,

    /// One compression context per worker
    cctxs: Vec<zstd_safe::CCtx<'static>>,

    /// Compressed bytes written to the inner writer so far
    bytes_written: u64,

    /// Determines if the EOF block is already written
    finished: bool,
}
impl<W: Write> BlockWriter<W> {
    /// Creates a new writer; `threads = 0` uses every available core
    pub fn new(inner: W, level: i32, threads: usize) -> Result<Self> {
        let threads = resolve_threads(threads);
        let mut cctxs = Vec::with_capacity(threads);
        for _ in 0..threads {
            let mut cctx = zstd_safe::CCtx::create();
            cctx.set_parameter(zstd_safe::CParameter::CompressionLevel(level))
                .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
            cctxs.push(cctx);
        }
        tracing::debug!(level, threads, "initialized block writer");
        Ok(Self {
            inner: Some(inner),
            level,
            threads,
            ubuf: Vec::with_capacity(BLOCK_SIZE),
            pending: Vec::new(),
            cctxs,
            bytes_written: 0,
            finished: false,
        })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Returns the virtual offset of the next byte to be written
    ///
    /// Queued blocks are compressed first so their compressed positions are known.
    pub fn virtual_offset(&mut self) -> Result<u64> {
        self.flush_pending()?;
        Ok(make_virtual_offset(self.bytes_written, self.ubuf.len()))
    }

    /// Writes every buffered block followed by the EOF block
    ///
    /// Calling it again is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.ubuf.is_empty() {
            let block = std::mem::replace(&mut self.ubuf, Vec::with_capacity(BLOCK_SIZE));
            self.pending.push(block);
        }
        self.flush_pending()?;
        let eof = BlockHeader::eof();
        let inner = self.inner_mut()?;
        inner.write_all(eof.as_bytes())?;
        inner.flush()?;
        self.bytes_written += eof.as_bytes().len() as u64;
        self.finished = true;
        Ok(())
    }

    /// Finishes the container and returns the inner writer
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        match self.inner.take() {
            Some(inner) => Ok(inner),
            None => Err(io::Error::other("block writer has no inner writer").into()),
        }
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("block writer has no inner writer"))
    }

    /// Compresses all queued blocks and writes them in submission order
    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let level = self.level;
        let compressed = if self.threads == 1 || self.pending.len() == 1 {
            let mut zbufs = Vec::with_capacity(self.pending.len());
            for block in &self.pending {
                zbufs.push(compress_block(block, level, &mut self.cctxs[0])?);
            }
            zbufs
        } else {
            let per_worker = self.pending.len().div_ceil(self.threads);
            let pending = &self.pending;
            let cctxs = &mut self.cctxs;
            thread::scope(|scope| -> Result<Vec<Vec<u8>>> {
                let handles = pending
                    .chunks(per_worker)
                    .zip(cctxs.iter_mut())
                    .map(|(blocks, cctx)| {
                        scope.spawn(move || -> Result<Vec<Vec<u8>>> {
                            blocks
                                .iter()
                                .map(|block| compress_block(block, level, cctx))
                                .collect()
                        })
                    })
                    .collect::<Vec<_>>();

                let mut zbufs = Vec::with_capacity(pending.len());
                for handle in handles {
                    let worker = handle
                        .join()
                        .map_err(|_| io::Error::other("block compression worker panicked"))?;
                    zbufs.extend(worker?);
                }
                Ok(zbufs)
            })?
        };

        let mut written = 0u64;
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::other("block writer has no inner writer"))?;
        for (block, zbuf) in self.pending.iter().zip(&compressed) {
            let header = BlockHeader::new(zbuf.len(), block.len());
            inner.write_all(header.as_bytes())?;
            inner.write_all(zbuf)?;
            written += (header.as_bytes().len() + zbuf.len()) as u64;
        }
        tracing::trace!(blocks = compressed.len(), bytes = written, "flushed block batch");
        self.bytes_written += written;
        self.pending.clear();
        Ok(())
    }
}

fn compress_block(src: &[u8], level: i32, cctx: &mut zstd_safe::CCtx) -> Result<Vec<u8>> {
    let mut dst = Vec::with_capacity(zstd_safe::compress_bound(src.len()));
    cctx.compress(&mut dst, src, level)
        .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
    Ok(dst)
}

impl<W: Write> Write for BlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::other("write to a finished block writer"));
        }
        let n = buf.len().min(BLOCK_SIZE - self.ubuf.len());
        self.ubuf.extend_from_slice(&buf[..n]);
        if self.ubuf.len() == BLOCK_SIZE {
            let block = std::mem::replace(&mut self.ubuf, Vec::with_capacity(BLOCK_SIZE));
            self.pending.push(block);
            if self.pending.len() >= self.threads {
                self.flush_pending().map_err(io::Error::other)?;
            }
        }
        Ok(n)
    }

    /// Flushes the inner writer; partially filled blocks stay buffered
    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for BlockWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!("failed to finish block container on drop: {e}");
            }
        }
    }
}
