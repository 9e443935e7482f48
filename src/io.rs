//! Byte source and sink traits.
//!
//! With the `std` feature these are blanket-implemented for every `std::io::Read`
//! and `std::io::Write`. Without it the crate implements them for `&[u8]` and
//! `Vec<u8>`, and you can implement them for your own transports.

use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

pub use embedded_io::ErrorKind;

/// I/O error type used by this crate.
///
/// In std mode, this wraps `std::io::Error`. In no_std mode, it contains an `ErrorKind`.
#[derive(Debug)]
pub struct IoError {
    #[cfg(feature = "std")]
    inner: std::io::Error,
    #[cfg(not(feature = "std"))]
    kind: ErrorKind,
}

impl IoError {
    /// Create a new error from an ErrorKind.
    #[cfg(not(feature = "std"))]
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    /// Create a new error from an ErrorKind.
    #[cfg(feature = "std")]
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        let io_kind = match kind {
            ErrorKind::NotFound => std::io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => std::io::ErrorKind::PermissionDenied,
            ErrorKind::BrokenPipe => std::io::ErrorKind::BrokenPipe,
            ErrorKind::InvalidInput => std::io::ErrorKind::InvalidInput,
            ErrorKind::InvalidData => std::io::ErrorKind::InvalidData,
            ErrorKind::TimedOut => std::io::ErrorKind::TimedOut,
            ErrorKind::Interrupted => std::io::ErrorKind::Interrupted,
            ErrorKind::WriteZero => std::io::ErrorKind::WriteZero,
            ErrorKind::OutOfMemory => std::io::ErrorKind::OutOfMemory,
            _ => std::io::ErrorKind::Other,
        };
        Self {
            inner: std::io::Error::new(io_kind, "io error"),
        }
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        #[cfg(feature = "std")]
        {
            match self.inner.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                std::io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
                std::io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
                std::io::ErrorKind::InvalidData => ErrorKind::InvalidData,
                std::io::ErrorKind::TimedOut => ErrorKind::TimedOut,
                std::io::ErrorKind::Interrupted => ErrorKind::Interrupted,
                std::io::ErrorKind::WriteZero => ErrorKind::WriteZero,
                std::io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
                _ => ErrorKind::Other,
            }
        }
        #[cfg(not(feature = "std"))]
        {
            self.kind
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "std")]
        {
            self.inner.fmt(f)
        }
        #[cfg(not(feature = "std"))]
        {
            write!(f, "I/O error: {:?}", self.kind)
        }
    }
}

impl core::error::Error for IoError {
    #[cfg(feature = "std")]
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.inner.source()
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for IoError {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        Self { inner: err }
    }
}

#[cfg(feature = "std")]
impl From<IoError> for std::io::Error {
    #[inline]
    fn from(err: IoError) -> Self {
        err.inner
    }
}

impl From<ErrorKind> for IoError {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for I/O operations.
pub type Result<T> = core::result::Result<T, IoError>;

/// Byte source the decoder pulls from.
pub trait Read {
    /// Read bytes into buffer, returning number of bytes read. `0` means end of input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Fill as much of `buf` as the source can supply.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only at end of
    /// input. Interrupted reads are retried.
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Byte sink the encoder writes to.
pub trait Write {
    /// Write bytes from buffer, returning number of bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Write all bytes or error.
    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => return Err(IoError::new(ErrorKind::WriteZero)),
                Ok(n) => buf = &buf[n..],
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flush output.
    fn flush(&mut self) -> Result<()>;
}

#[cfg(feature = "std")]
impl<T: std::io::Read + ?Sized> Read for T {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        std::io::Read::read(self, buf).map_err(IoError::from)
    }
}

#[cfg(feature = "std")]
impl<T: std::io::Write + ?Sized> Write for T {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        std::io::Write::write(self, buf).map_err(IoError::from)
    }

    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf).map_err(IoError::from)
    }

    #[inline]
    fn flush(&mut self) -> Result<()> {
        std::io::Write::flush(self).map_err(IoError::from)
    }
}

#[cfg(not(feature = "std"))]
impl Read for &[u8] {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let amt = core::cmp::min(buf.len(), self.len());
        let (a, b) = self.split_at(amt);
        buf[..amt].copy_from_slice(a);
        *self = b;
        Ok(amt)
    }
}

#[cfg(not(feature = "std"))]
impl<R: Read + ?Sized> Read for &mut R {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

#[cfg(not(feature = "std"))]
impl Write for Vec<u8> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }

    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(not(feature = "std"))]
impl<W: Write + ?Sized> Write for &mut W {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    #[inline]
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

#[test]
fn read_up_to_stops_at_end_of_input() {
    let mut src: &[u8] = &[1, 2, 3];
    let mut buf = [0u8; 5];
    assert_eq!(src.read_up_to(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], &[1, 2, 3]);
    assert_eq!(src.read_up_to(&mut buf).unwrap(), 0);
}
