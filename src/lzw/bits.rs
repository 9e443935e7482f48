use super::{ByteSink, ByteSource};
use crate::reader::DecodingError;

/// Pulls variable width codes, least significant bit first, out of a byte source.
pub(crate) struct BitReader<'a, S: ?Sized> {
    source: &'a mut S,
    /// Lookahead; only the low `nbits` bits are valid.
    acc: u32,
    nbits: u8,
    exhausted: bool,
}

impl<'a, S: ByteSource + ?Sized> BitReader<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            acc: 0,
            nbits: 0,
            exhausted: false,
        }
    }

    /// Reads one `size`-bit code, or `None` when the source cannot supply a full code.
    #[inline]
    pub fn read_code(&mut self, size: u8) -> Result<Option<u16>, DecodingError> {
        debug_assert!(size <= super::MAX_CODE_SIZE);
        // `nbits < size <= 12` here, so a new byte always fits the accumulator.
        while self.nbits < size && !self.exhausted {
            match self.source.next_byte()? {
                Some(byte) => {
                    self.acc |= u32::from(byte) << self.nbits;
                    self.nbits += 8;
                }
                None => self.exhausted = true,
            }
        }
        if self.nbits < size {
            return Ok(None);
        }
        let code = (self.acc & ((1 << size) - 1)) as u16;
        self.acc >>= size;
        self.nbits -= size;
        Ok(Some(code))
    }
}

/// Packs variable width codes, least significant bit first, into a byte sink.
pub(crate) struct BitWriter<'a, S: ?Sized> {
    sink: &'a mut S,
    acc: u32,
    nbits: u8,
}

impl<'a, S: ByteSink + ?Sized> BitWriter<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            acc: 0,
            nbits: 0,
        }
    }

    #[inline]
    pub fn write_code(&mut self, code: u16, size: u8) -> Result<(), S::Error> {
        debug_assert!(u32::from(code) < 1 << size);
        self.acc |= u32::from(code) << self.nbits;
        self.nbits += size;
        while self.nbits >= 8 {
            self.sink.put_byte(self.acc as u8)?;
            self.acc >>= 8;
            self.nbits -= 8;
        }
        Ok(())
    }

    /// Writes out a final partial byte, zero padded.
    pub fn flush(&mut self) -> Result<(), S::Error> {
        if self.nbits > 0 {
            self.sink.put_byte(self.acc as u8)?;
            self.acc = 0;
            self.nbits = 0;
        }
        Ok(())
    }
}
