use super::table::Dictionary;
use super::{BitWriter, ByteSink, MAX_CODE_SIZE, MAX_ENTRIES};

/// Greedy longest-match GIF LZW compressor.
///
/// Besides its own dictionary the encoder tracks the table index the decoder will have after
/// reading each emitted code, so code widths change at exactly the same point on both sides.
pub(crate) struct LzwEncoder {
    dict: Dictionary,
    min_code_size: u8,
    code_size: u8,
    /// Code the next dictionary entry gets.
    next_code: u16,
    /// The decoder's next free table slot.
    decoder_index: u16,
    /// Whether a data code was emitted since the last clear.
    emitted: bool,
    /// Code of the string matched so far.
    prefix: Option<u16>,
}

impl LzwEncoder {
    /// `min_code_size` must be in `2..=8`.
    pub fn new(min_code_size: u8) -> Self {
        debug_assert!((2..=8).contains(&min_code_size));
        let clear = 1u16 << min_code_size;
        Self {
            dict: Dictionary::new(),
            min_code_size,
            code_size: min_code_size + 1,
            next_code: clear + 2,
            decoder_index: clear + 2,
            emitted: false,
            prefix: None,
        }
    }

    #[inline]
    fn clear_code(&self) -> u16 {
        1 << self.min_code_size
    }

    fn reset(&mut self) {
        self.dict.clear();
        self.code_size = self.min_code_size + 1;
        self.next_code = self.clear_code() + 2;
        self.decoder_index = self.next_code;
        self.emitted = false;
    }

    /// Emits the leading clear code.
    pub fn start<S: ByteSink + ?Sized>(
        &mut self,
        bits: &mut BitWriter<'_, S>,
    ) -> Result<(), S::Error> {
        bits.write_code(self.clear_code(), self.code_size)
    }

    /// Writes a data code and follows the decoder's table growth for it.
    fn emit<S: ByteSink + ?Sized>(
        &mut self,
        code: u16,
        bits: &mut BitWriter<'_, S>,
    ) -> Result<(), S::Error> {
        bits.write_code(code, self.code_size)?;
        if self.emitted && usize::from(self.decoder_index) < MAX_ENTRIES {
            self.decoder_index += 1;
            if u32::from(self.decoder_index) == 1 << self.code_size
                && self.code_size < MAX_CODE_SIZE
            {
                self.code_size += 1;
            }
        }
        self.emitted = true;
        Ok(())
    }

    #[inline]
    pub fn push<S: ByteSink + ?Sized>(
        &mut self,
        byte: u8,
        bits: &mut BitWriter<'_, S>,
    ) -> Result<(), S::Error> {
        debug_assert!(u16::from(byte) < self.clear_code());
        let Some(prefix) = self.prefix else {
            self.prefix = Some(u16::from(byte));
            return Ok(());
        };
        if let Some(code) = self.dict.get(prefix, byte) {
            self.prefix = Some(code);
            return Ok(());
        }
        self.emit(prefix, bits)?;
        if usize::from(self.next_code) < MAX_ENTRIES {
            self.dict.insert(prefix, byte, self.next_code);
            self.next_code += 1;
        } else {
            // The decoder's table is full as well; start over on both sides.
            bits.write_code(self.clear_code(), self.code_size)?;
            self.reset();
        }
        self.prefix = Some(u16::from(byte));
        Ok(())
    }

    pub fn push_all<S: ByteSink + ?Sized>(
        &mut self,
        data: &[u8],
        bits: &mut BitWriter<'_, S>,
    ) -> Result<(), S::Error> {
        for &byte in data {
            self.push(byte, bits)?;
        }
        Ok(())
    }

    /// Emits the pending match and the end code. The caller flushes `bits` afterwards.
    pub fn finish<S: ByteSink + ?Sized>(
        &mut self,
        bits: &mut BitWriter<'_, S>,
    ) -> Result<(), S::Error> {
        if let Some(prefix) = self.prefix.take() {
            self.emit(prefix, bits)?;
        }
        bits.write_code(self.clear_code() + 1, self.code_size)
    }

    #[cfg(test)]
    fn decoder_index(&self) -> u16 {
        self.decoder_index
    }
}
