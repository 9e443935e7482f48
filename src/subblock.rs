//! Sub-block framing.
//!
//! Extension payloads and compressed image data are stored as a run of chunks, each one
//! preceded by its length (1 to 255). A chunk of length zero ends the run.

use alloc::vec::Vec;

use crate::io::{self, Read, Write};
use crate::lzw::{ByteSink, ByteSource};
use crate::reader::{DecodingError, DecodingFormatError};
use crate::traits::{ReadBytesExt, WriteBytesExt};

/// Largest payload of a single sub-block.
pub(crate) const MAX_BLOCK_LEN: usize = 0xFF;

/// Reads one run of sub-blocks as a flat byte stream.
pub(crate) struct SubBlockReader<'a, R: ?Sized> {
    inner: &'a mut R,
    buf: [u8; MAX_BLOCK_LEN],
    pos: usize,
    len: usize,
    finished: bool,
}

impl<'a, R: Read + ?Sized> SubBlockReader<'a, R> {
    /// Starts reading at a length byte.
    pub fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            buf: [0; MAX_BLOCK_LEN],
            pos: 0,
            len: 0,
            finished: false,
        }
    }

    /// Whether the terminating zero-length block has been consumed.
    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads the next whole sub-block, or `None` once the run is terminated.
    ///
    /// Any unread bytes of the current block are discarded.
    pub fn next_block(&mut self) -> Result<Option<&[u8]>, DecodingError> {
        if self.finished {
            return Ok(None);
        }
        let declared = usize::from(self.inner.read_u8()?);
        if declared == 0 {
            self.finished = true;
            self.pos = 0;
            self.len = 0;
            return Ok(None);
        }
        let available = self.inner.read_up_to(&mut self.buf[..declared])?;
        if available < declared {
            return Err(DecodingError::Format(DecodingFormatError::TruncatedBlock {
                declared: declared as u8,
                available: available as u8,
            }));
        }
        self.pos = declared;
        self.len = declared;
        Ok(Some(&self.buf[..declared]))
    }

    /// Reads the next byte, crossing block boundaries. `None` after the terminator.
    #[inline]
    pub fn next_byte(&mut self) -> Result<Option<u8>, DecodingError> {
        if self.pos == self.len {
            if self.next_block()?.is_none() {
                return Ok(None);
            }
            self.pos = 0;
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Appends every remaining byte of the run to `out`.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<(), DecodingError> {
        out.extend_from_slice(&self.buf[self.pos..self.len]);
        self.pos = self.len;
        while let Some(block) = self.next_block()? {
            out.extend_from_slice(block);
        }
        Ok(())
    }

    /// Skips the rest of the run, including its terminator.
    pub fn drain(&mut self) -> Result<(), DecodingError> {
        while self.next_block()?.is_some() {}
        Ok(())
    }
}

impl<R: Read + ?Sized> ByteSource for SubBlockReader<'_, R> {
    #[inline]
    fn next_byte(&mut self) -> Result<Option<u8>, DecodingError> {
        SubBlockReader::next_byte(self)
    }
}

/// Buffers bytes and writes them out as full 255-byte sub-blocks.
pub(crate) struct SubBlockWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    buf: [u8; MAX_BLOCK_LEN],
    len: usize,
}

impl<'a, W: Write + ?Sized> SubBlockWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            buf: [0; MAX_BLOCK_LEN],
            len: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, byte: u8) -> io::Result<()> {
        self.buf[self.len] = byte;
        self.len += 1;
        if self.len == MAX_BLOCK_LEN {
            self.flush_block()?;
        }
        Ok(())
    }

    pub fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = (MAX_BLOCK_LEN - self.len).min(data.len());
            self.buf[self.len..self.len + n].copy_from_slice(&data[..n]);
            self.len += n;
            data = &data[n..];
            if self.len == MAX_BLOCK_LEN {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.len > 0 {
            self.inner.write_le(self.len as u8)?;
            self.inner.write_all(&self.buf[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }

    /// Writes the pending partial block, then the zero-length terminator.
    pub fn finish(mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner.write_le(0u8)
    }
}

impl<W: Write + ?Sized> ByteSink for SubBlockWriter<'_, W> {
    type Error = io::IoError;

    #[inline]
    fn put_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.push(byte)
    }
}
