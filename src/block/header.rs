use bytemuck::{Pod, Zeroable};

use crate::{Result, error::BlockError};

use super::BLOCK_MAGIC;

/// The header preceding every compressed block.
///
/// Sizes are stored little-endian; use the accessors rather than the raw fields.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BlockHeader {
    magic: [u8; 4],

    /// Compressed payload length
    z_len: u32,

    /// Uncompressed payload length
    u_len: u32,

    reserved: u32,
}
impl BlockHeader {
    #[must_use]
    pub fn new(z_len: usize, u_len: usize) -> Self {
        Self {
            magic: *BLOCK_MAGIC,
            z_len: (z_len as u32).to_le(),
            u_len: (u_len as u32).to_le(),
            reserved: 0,
        }
    }

    /// The empty block terminating every container
    #[must_use]
    pub fn eof() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn z_len(&self) -> usize {
        u32::from_le(self.z_len) as usize
    }

    #[must_use]
    pub fn u_len(&self) -> usize {
        u32::from_le(self.u_len) as usize
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.z_len == 0 && self.u_len == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Parses a header located at byte `pos` of a container
    pub fn from_bytes(bytes: &[u8], pos: usize) -> Result<Self> {
        let Some(slice) = bytes.get(pos..pos + size_of::<Self>()) else {
            return Err(BlockError::Truncated(pos).into());
        };
        let header: Self = bytemuck::pod_read_unaligned(slice);
        if header.magic != *BLOCK_MAGIC {
            return Err(BlockError::InvalidMagic(pos).into());
        }
        Ok(header)
    }
}
