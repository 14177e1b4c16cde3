//! Simple building-block data that can be read in one go.
//! All reads are bounds-checked and advance the cursor when they succeed.

use crate::prelude::*;

pub(crate) trait SplitChecked: Sized {
    fn split_checked(&mut self, at: usize) -> Option<Self>;
}
impl<'a> SplitChecked for &'a [u8] {
    #[inline]
    fn split_checked(&mut self, at: usize) -> Option<&'a [u8]> {
        if at > self.len() {
            None
        } else {
            let (extracted, remainder) = self.split_at(at);
            *self = remainder;
            Some(extracted)
        }
    }
}

/// Variable-length quantities are capped at 4 bytes, that is, 28 bits of payload.
const MAX_VARLEN_BYTES: usize = 4;

/// A bounds-checked reader over a fixed byte buffer.
///
/// Keeps track of the absolute offset of its first byte within the original input, so that
/// errors always point at a position in the whole file, even when reading a track sub-slice.
///
/// On failure the cursor position is left unchanged, except for `read_varlen`, which may have
/// consumed part of the quantity.
#[derive(Copy, Clone, Debug)]
pub struct ByteCursor<'a> {
    raw: &'a [u8],
    pos: usize,
    base: usize,
}
impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `raw`, which starts at offset 0.
    #[inline]
    pub fn new(raw: &'a [u8]) -> ByteCursor<'a> {
        Self::with_base(raw, 0)
    }

    /// Create a cursor over `raw`, whose first byte lies at absolute offset `base`.
    #[inline]
    pub fn with_base(raw: &'a [u8], base: usize) -> ByteCursor<'a> {
        ByteCursor { raw, pos: 0, base }
    }

    /// Absolute offset of the next byte to be read.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Position relative to the start of this cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The bytes that have not been read yet.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        &self.raw[self.pos..]
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.raw.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Build an error of the given kind located at the current position.
    #[inline]
    pub(crate) fn error(&self, kind: ErrorKind) -> Error {
        Error::new(kind, self.offset())
    }

    /// Look at the next byte without consuming it.
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.raw.get(self.pos).copied()
    }

    /// Consume `len` bytes and return them as a slice borrowing from the input.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let mut rest = self.unread();
        let slice = rest
            .split_checked(len)
            .ok_or_else(|| self.error(ErrorKind::OutOfBounds))?;
        self.pos += len;
        Ok(slice)
    }

    /// Read `n` bytes as an unsigned big-endian integer.
    ///
    /// `n` may be at most 4. Wider reads fail with `IntegerTooWide` without consuming anything.
    pub fn read_be_uint(&mut self, n: usize) -> Result<u32> {
        ensure!(n <= 4, self.error(ErrorKind::IntegerTooWide(n)));
        let bytes = self.read_slice(n)?;
        Ok(bytes
            .iter()
            .fold(0, |acc, &byte| (acc << 8) | u32::from(byte)))
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_be_uint(2)? as u16)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_be_uint(4)
    }

    /// Decode a MIDI variable-length quantity.
    ///
    /// Each byte contributes its bottom 7 bits, most significant group first, and the top bit
    /// marks continuation. Quantities longer than 4 bytes are rejected.
    pub fn read_varlen(&mut self) -> Result<u32> {
        let mut int: u32 = 0;
        for _ in 0..MAX_VARLEN_BYTES {
            let byte = self.read_u8()?;
            int = (int << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(int);
            }
        }
        Err(self.error(ErrorKind::VarLenOverflow))
    }

    /// Read a var-length length prefix followed by that many bytes.
    pub fn read_varlen_slice(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varlen()?;
        self.read_slice(len as usize)
    }
}

/// The order in which tracks should be laid out when playing back this SMF file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Format {
    /// Format 0: this file has a single track only.
    SingleTrack,
    /// Format 1: this file has several tracks that should be played simultaneously.
    ///
    /// Usually the first track controls tempo and other song metadata.
    Parallel,
    /// Format 2: this file has several tracks, each one a separate song.
    Sequential,
}
impl Format {
    pub(crate) fn read(raw: &mut ByteCursor) -> Result<Format> {
        let at = *raw;
        let format = raw.read_u16()?;
        Ok(match format {
            0 => Format::SingleTrack,
            1 => Format::Parallel,
            2 => Format::Sequential,
            _ => bail!(at.error(ErrorKind::BadFormat(format))),
        })
    }

    /// The numeric format code as stored in the header.
    pub fn code(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }
}
