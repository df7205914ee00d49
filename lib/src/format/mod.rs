pub mod model;
pub mod mtrl;
pub mod odf;
pub mod ucfb;
pub mod vbuf;

use std::fmt::{Debug, Display, Formatter, Write};

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Four-byte chunk tag, compared as a little-endian `u32`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct Magic(pub [u8; 4]);

impl Magic {
    #[inline]
    pub const fn new(tag: &[u8; 4]) -> Self { Self(*tag) }

    #[inline]
    pub fn as_u32(self) -> u32 { u32::from_le_bytes(self.0) }
}

impl Display for Magic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.0 {
            f.write_char(c as char)?;
        }
        Ok(())
    }
}

impl Debug for Magic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_char('"')?;
        for c in self.0 {
            f.write_char(c as char)?;
        }
        f.write_char('"')?;
        Ok(())
    }
}

impl PartialEq<[u8; 4]> for Magic {
    fn eq(&self, other: &[u8; 4]) -> bool { &self.0 == other }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The span handed to [`ucfb::Reader::new`] disagrees with the size the
    /// chunk header declares.
    #[error("chunk size mismatch: span holds {actual} bytes but the chunk occupies {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("read of {wanted} bytes at offset {head} runs past the end of chunk {magic} ({size} bytes)")]
    BoundsViolation { magic: Magic, head: usize, wanted: usize, size: usize },
    #[error("unexpected magic number: wanted {expected}, found {found}")]
    UnexpectedMagic { expected: Magic, found: Magic },
    #[error("unterminated string in chunk {0}")]
    UnterminatedString(Magic),
    #[error("string in chunk {0} is not valid UTF-8")]
    InvalidString(Magic),
    #[error("unknown model info size: {0}")]
    UnknownModelInfo(usize),
    #[error("invalid index buffer")]
    InvalidIndexBuffer,
    #[error("invalid vertex buffer")]
    InvalidVertexBuffer,
}
