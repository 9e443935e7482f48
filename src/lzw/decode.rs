use alloc::vec::Vec;

use super::table::CodeTable;
use super::{BitReader, ByteSource, MAX_CODE_SIZE, MAX_ENTRIES};
use crate::reader::{DecodeWarning, DecodingError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// At the start of the data or right after a clear code; the next code is a literal.
    AwaitingClearOrData,
    Active,
    Done,
}

/// Expands GIF LZW codes into runs of pixel indices.
pub(crate) struct LzwDecoder {
    table: CodeTable,
    min_code_size: u8,
    code_size: u8,
    old_code: Option<u16>,
    state: State,
    run: Vec<u8>,
    warnings: Vec<DecodeWarning>,
}

impl LzwDecoder {
    /// `min_code_size` must already be validated to `2..=8`.
    pub fn new(min_code_size: u8) -> Self {
        Self {
            table: CodeTable::new(min_code_size),
            min_code_size,
            code_size: min_code_size + 1,
            old_code: None,
            state: State::AwaitingClearOrData,
            run: vec![0; MAX_ENTRIES],
            warnings: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.table.reset();
        self.code_size = self.min_code_size + 1;
        self.old_code = None;
        self.state = State::AwaitingClearOrData;
    }

    #[cfg(test)]
    pub fn has_ended(&self) -> bool {
        self.state == State::Done
    }

    /// Recoverable problems seen so far, oldest first.
    pub fn take_warnings(&mut self) -> Vec<DecodeWarning> {
        core::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, warning: DecodeWarning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Decodes codes until one produces output.
    ///
    /// Returns `None` once the end code is read or the input runs out of whole codes.
    pub fn next_run<S: ByteSource + ?Sized>(
        &mut self,
        bits: &mut BitReader<'_, S>,
    ) -> Result<Option<&[u8]>, DecodingError> {
        loop {
            if self.state == State::Done {
                return Ok(None);
            }
            let Some(code) = bits.read_code(self.code_size)? else {
                self.state = State::Done;
                return Ok(None);
            };
            if code == self.table.clear_code() {
                self.reset();
                continue;
            }
            if code == self.table.end_code() {
                self.state = State::Done;
                return Ok(None);
            }

            let code = match self.old_code {
                None if code < self.table.clear_code() => code,
                None => {
                    self.warn(DecodeWarning::UnexpectedLzwCode {
                        code,
                        next_index: self.table.next_index(),
                    });
                    continue;
                }
                Some(old) => self.add_entry(old, code),
            };

            self.state = State::Active;
            let len = self.table.expand(code, &mut self.run);
            self.old_code = Some(code);
            return Ok(Some(&self.run[..len]));
        }
    }

    /// Adds the entry implied by `code` following `old` and returns the code to expand.
    fn add_entry(&mut self, old: u16, code: u16) -> u16 {
        let next = self.table.next_index();
        let code = if code < next {
            self.table.push(old, code);
            code
        } else {
            if code != next {
                self.warn(DecodeWarning::UnexpectedLzwCode {
                    code,
                    next_index: next,
                });
            }
            // KwKwK: the code names the entry being created right now.
            match self.table.push(old, old) {
                Some(created) => created,
                None => old,
            }
        };
        if u32::from(self.table.next_index()) == 1 << self.code_size
            && self.code_size < MAX_CODE_SIZE
        {
            self.code_size += 1;
        }
        code
    }

    #[cfg(test)]
    fn table_index(&self) -> u16 {
        self.table.next_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lzw::{compress, BitWriter};

    fn codes(codes: &[(u16, u8)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = BitWriter::new(&mut out);
        for &(code, size) in codes {
            w.write_code(code, size).unwrap();
        }
        w.flush().unwrap();
        out
    }

    fn decode_all(data: &[u8], min_code_size: u8) -> (Vec<u8>, LzwDecoder) {
        let mut src = data;
        let mut bits = BitReader::new(&mut src);
        let mut decoder = LzwDecoder::new(min_code_size);
        let mut out = Vec::new();
        while let Some(run) = decoder.next_run(&mut bits).unwrap() {
            out.extend_from_slice(run);
        }
        (out, decoder)
    }

    #[test]
    fn single_red_pixel() {
        // The image data of the canonical 1x1 GIF: clear, 0, end with 3-bit codes.
        let (out, decoder) = decode_all(&[0x44, 0x01], 2);
        assert_eq!(out, [0]);
        assert!(decoder.has_ended());
    }

    #[test]
    fn kwkwk_code() {
        // 1, then 6 which is the entry being created: "1 1".
        let data = codes(&[(4, 3), (1, 3), (6, 3), (5, 3)]);
        let (out, decoder) = decode_all(&data, 2);
        assert_eq!(out, [1, 1, 1]);
        assert!(decoder.warnings.is_empty());
    }

    #[test]
    fn out_of_sequence_code_is_tolerated() {
        // 7 is past the next free index (6); it is decoded as if it were 6.
        // Entry 7 fills the 3-bit code space, so the end code is read with 4 bits.
        let data = codes(&[(4, 3), (2, 3), (7, 3), (0, 3), (5, 4)]);
        let (out, mut decoder) = decode_all(&data, 2);
        assert_eq!(out, [2, 2, 2, 0]);
        assert_eq!(
            decoder.take_warnings(),
            [DecodeWarning::UnexpectedLzwCode {
                code: 7,
                next_index: 6
            }]
        );
    }

    #[test]
    fn missing_end_code_ends_at_input_end() {
        // 8-bit codes, so no padding bits follow the last code.
        let data = codes(&[(128, 8), (3, 8), (2, 8)]);
        let (out, decoder) = decode_all(&data, 7);
        assert_eq!(out, [3, 2]);
        assert!(decoder.has_ended());
    }

    #[test]
    fn table_bounds_hold_across_resets() {
        let mut seed = 0x1234_5678u32;
        let data: Vec<u8> = (0..20_000)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8 & 0x0F
            })
            .collect();
        let encoded = compress(&data, 4);
        let mut src = &encoded[..];
        let mut bits = BitReader::new(&mut src);
        let mut decoder = LzwDecoder::new(4);
        let mut out = Vec::new();
        let mut last_size = decoder.code_size;
        let mut last_index = decoder.table_index();
        let mut resets = 0;
        while let Some(run) = decoder.next_run(&mut bits).unwrap() {
            out.extend_from_slice(run);
            assert!(usize::from(decoder.table_index()) <= MAX_ENTRIES);
            assert!(decoder.code_size <= MAX_CODE_SIZE);
            if decoder.table_index() < last_index {
                // Only a clear code shrinks the table, and it also restarts the width.
                assert_eq!(decoder.code_size, 5);
                resets += 1;
            } else {
                assert!(decoder.code_size >= last_size);
            }
            last_size = decoder.code_size;
            last_index = decoder.table_index();
        }
        assert_eq!(out, data);
        assert!(resets > 0);
    }

    #[test]
    fn clear_code_restores_initial_index() {
        let data = codes(&[(16, 5), (1, 5), (2, 5), (16, 5)]);
        let mut src = &data[..];
        let mut bits = BitReader::new(&mut src);
        let mut decoder = LzwDecoder::new(4);
        decoder.next_run(&mut bits).unwrap();
        decoder.next_run(&mut bits).unwrap();
        assert_eq!(decoder.table_index(), 19);
        assert_eq!(decoder.next_run(&mut bits).unwrap(), None);
        assert_eq!(decoder.table_index(), 18);
        assert_eq!(decoder.code_size, 5);
    }
}
