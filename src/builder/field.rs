use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::BuilderError;
use crate::index::codec::Column;
use crate::Result;

/// Append-only spill target holding every field's overflow blocks
///
/// Values are stored in host byte order; they are converted on replay.
pub(crate) struct ScratchFile {
    file: File,
    path: PathBuf,
    len: u64,
}
impl ScratchFile {
    /// Creates (or truncates) the scratch file at `path`
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Appends `bytes` and returns the position they start at
    fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let pos = self.len;
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(pos)
    }

    /// Fills `dst` from `pos`; returns how many bytes could be read
    fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(pos))?;
        let mut filled = 0;
        while filled < dst.len() {
            match self.file.read(&mut dst[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Descriptor of one spilled run of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FieldBlock {
    /// Byte position in the scratch file
    pub pos: u64,
    /// Number of values
    pub n: usize,
}

/// In-memory accumulator of one index column.
///
/// Values are pushed row by row; once `capacity` values are buffered the builder
/// spills them to the scratch file. On close every block is read back in order and
/// written as little-endian values.
pub(crate) struct FieldBuffer<T: Column> {
    name: &'static str,
    capacity: usize,
    buffer: Vec<T>,
    blocks: Vec<FieldBlock>,
}
impl<T: Column> FieldBuffer<T> {
    /// Creates a buffer holding at most `buffer_size` bytes (at least one value)
    pub fn new(name: &'static str, buffer_size: usize) -> Self {
        let capacity = (buffer_size / size_of::<T>()).max(1);
        Self {
            name,
            capacity,
            buffer: Vec::with_capacity(capacity),
            blocks: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.buffer.push(value);
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn blocks(&self) -> &[FieldBlock] {
        &self.blocks
    }

    /// Number of values pushed so far, spilled or not
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.n).sum::<usize>() + self.buffer.len()
    }

    /// Drops buffered values without writing them
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    /// Writes buffered values to the scratch file and records the block
    pub fn spill(&mut self, scratch: &mut ScratchFile) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let pos = scratch.append(bytemuck::cast_slice(&self.buffer[..]))?;
        self.blocks.push(FieldBlock {
            pos,
            n: self.buffer.len(),
        });
        self.buffer.clear();
        Ok(())
    }

    /// Reads every block back and writes it to `writer` as little-endian values
    ///
    /// Must be called after a final [`spill`](Self::spill).
    pub fn replay<W: Write>(&mut self, scratch: &mut ScratchFile, writer: &mut W) -> Result<()> {
        for block in &self.blocks {
            self.buffer.clear();
            self.buffer.resize(block.n, T::default());
            let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut self.buffer[..]);
            let filled = scratch.read_at(block.pos, dst)?;
            if filled < dst.len() {
                return Err(BuilderError::ScratchCorrupted {
                    field: self.name,
                    pos: block.pos,
                    missing: dst.len() - filled,
                }
                .into());
            }
            T::write_column(&self.buffer, writer)?;
        }
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> Result<(tempfile::TempDir, ScratchFile)> {
        let dir = tempfile::tempdir()?;
        let scratch = ScratchFile::create(&dir.path().join("field.build"))?;
        Ok((dir, scratch))
    }

    #[test]
    fn test_capacity_from_budget() {
        assert_eq!(FieldBuffer::<u64>::new("file_offset", 64).capacity, 8);
        assert_eq!(FieldBuffer::<u8>::new("ctxt_flag", 64).capacity, 64);
        assert_eq!(FieldBuffer::<i32>::new("rg_id", 0).capacity, 1);
    }

    #[test]
    fn test_spill_and_replay() -> Result<()> {
        let (_dir, mut scratch) = scratch()?;
        let mut field = FieldBuffer::<i32>::new("q_start", 3 * size_of::<i32>());
        let mut other = FieldBuffer::<u8>::new("ctxt_flag", 2);

        for i in 0..10 {
            field.push(i * 1000 - 3);
            other.push(i as u8);
            if field.is_full() {
                field.spill(&mut scratch)?;
            }
            if other.is_full() {
                other.spill(&mut scratch)?;
            }
        }
        field.spill(&mut scratch)?;
        other.spill(&mut scratch)?;

        // 3 + 3 + 3 + 1 values
        assert_eq!(field.blocks().len(), 4);
        assert_eq!(field.blocks()[3].n, 1);
        assert_eq!(field.len(), 10);
        assert_eq!(other.blocks().len(), 5);
        assert_eq!(scratch.len(), 10 * 4 + 10);

        let mut out = Vec::new();
        field.replay(&mut scratch, &mut out)?;
        let expected: Vec<i32> = (0..10).map(|i| i * 1000 - 3).collect();
        let mut le = Vec::new();
        i32::write_column(&expected, &mut le)?;
        assert_eq!(out, le);

        let mut out = Vec::new();
        other.replay(&mut scratch, &mut out)?;
        assert_eq!(out, (0..10).collect::<Vec<u8>>());
        Ok(())
    }

    #[test]
    fn test_replay_short_scratch() -> Result<()> {
        let (dir, mut scratch) = scratch()?;
        let mut field = FieldBuffer::<u64>::new("file_offset", 1024);
        for i in 0..4 {
            field.push(i);
        }
        field.spill(&mut scratch)?;

        std::fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("field.build"))?
            .set_len(20)?;

        let err = field.replay(&mut scratch, &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::BuilderError(BuilderError::ScratchCorrupted {
                field: "file_offset",
                missing: 12,
                ..
            })
        ));
        Ok(())
    }
}
