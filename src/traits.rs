//! Little endian helpers for the byte source and sink traits.
use crate::io::{self, Read, Write};
use crate::reader::{DecodingError, DecodingFormatError};

/// Writer extension to write little endian data
pub trait WriteBytesExt<T> {
    /// Writes `T` to a bytes stream. Least significant byte first.
    fn write_le(&mut self, n: T) -> io::Result<()>;
}

impl<W: Write + ?Sized> WriteBytesExt<u8> for W {
    #[inline(always)]
    fn write_le(&mut self, n: u8) -> io::Result<()> {
        self.write_all(&[n])
    }
}

impl<W: Write + ?Sized> WriteBytesExt<u16> for W {
    #[inline]
    fn write_le(&mut self, n: u16) -> io::Result<()> {
        self.write_all(&n.to_le_bytes())
    }
}

/// Reader extension for the fixed-size fields of the container.
///
/// Running out of input inside a fixed-size field is a truncated stream.
pub(crate) trait ReadBytesExt {
    /// Reads one byte, or `None` at end of input.
    fn read_u8_opt(&mut self) -> Result<Option<u8>, DecodingError>;

    /// Reads exactly `buf.len()` bytes.
    fn read_exact_gif(&mut self, buf: &mut [u8]) -> Result<(), DecodingError>;

    fn read_u8(&mut self) -> Result<u8, DecodingError> {
        self.read_u8_opt()?
            .ok_or(DecodingError::Format(DecodingFormatError::TruncatedStream))
    }

    /// Reads a little endian `u16`.
    fn read_le_u16(&mut self) -> Result<u16, DecodingError> {
        let mut buf = [0; 2];
        self.read_exact_gif(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }
}

impl<R: Read + ?Sized> ReadBytesExt for R {
    #[inline]
    fn read_u8_opt(&mut self) -> Result<Option<u8>, DecodingError> {
        let mut buf = [0];
        Ok(match self.read_up_to(&mut buf)? {
            0 => None,
            _ => Some(buf[0]),
        })
    }

    #[inline]
    fn read_exact_gif(&mut self, buf: &mut [u8]) -> Result<(), DecodingError> {
        if self.read_up_to(buf)? == buf.len() {
            Ok(())
        } else {
            Err(DecodingError::Format(DecodingFormatError::TruncatedStream))
        }
    }
}
