use alloc::vec::Vec;

use super::MAX_ENTRIES;

/// Marks a root entry, one whose string is a single literal byte.
pub(crate) const NO_PREFIX: u16 = u16::MAX;

/// The decoder's string table, stored as parallel arrays indexed by code.
///
/// Every entry refers to a strictly lower code through `prefix`, so expanding a code only
/// ever walks downwards and ends at a root.
pub(crate) struct CodeTable {
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    first: Vec<u8>,
    length: Vec<u16>,
    clear_code: u16,
    /// Next free slot.
    next: u16,
}

impl CodeTable {
    pub fn new(min_code_size: u8) -> Self {
        let clear_code = 1u16 << min_code_size;
        let mut table = Self {
            prefix: vec![NO_PREFIX; MAX_ENTRIES],
            suffix: vec![0; MAX_ENTRIES],
            first: vec![0; MAX_ENTRIES],
            length: vec![0; MAX_ENTRIES],
            clear_code,
            next: clear_code + 2,
        };
        // Literals and the two control codes are fixed for the table's lifetime.
        for code in 0..usize::from(clear_code) + 2 {
            let byte = code as u8;
            table.suffix[code] = byte;
            table.first[code] = byte;
            table.length[code] = 1;
        }
        table
    }

    #[inline]
    pub fn clear_code(&self) -> u16 {
        self.clear_code
    }

    #[inline]
    pub fn end_code(&self) -> u16 {
        self.clear_code + 1
    }

    /// Drops every entry past the control codes.
    pub fn reset(&mut self) {
        self.next = self.clear_code + 2;
    }

    /// The code the next appended entry gets.
    #[inline]
    pub fn next_index(&self) -> u16 {
        self.next
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        usize::from(self.next) == MAX_ENTRIES
    }

    /// Appends the string of `prefix` extended by the first byte of `suffix_of`.
    ///
    /// `suffix_of` may equal the code being created only through `prefix` (the KwKwK case),
    /// which the caller expresses by passing `prefix` itself. Returns the new code, or `None`
    /// when the table is full.
    pub fn push(&mut self, prefix: u16, suffix_of: u16) -> Option<u16> {
        if self.is_full() {
            return None;
        }
        debug_assert!(prefix < self.next && suffix_of < self.next);
        let code = self.next;
        let (p, s, c) = (usize::from(prefix), usize::from(suffix_of), usize::from(code));
        self.prefix[c] = prefix;
        self.suffix[c] = self.first[s];
        self.first[c] = self.first[p];
        self.length[c] = self.length[p] + 1;
        self.next += 1;
        Some(code)
    }

    /// Writes the string of `code` into the front of `out` and returns its length.
    pub fn expand(&self, code: u16, out: &mut [u8]) -> usize {
        let len = usize::from(self.length[usize::from(code)]);
        let mut c = code;
        for slot in out[..len].iter_mut().rev() {
            let entry = usize::from(c);
            *slot = self.suffix[entry];
            c = self.prefix[entry];
        }
        debug_assert_eq!(c, NO_PREFIX);
        len
    }
}

const DICT_SIZE: usize = 2 * MAX_ENTRIES;
const EMPTY: u32 = u32::MAX;

/// The encoder's string table: maps (prefix code, next byte) to the code of the extended
/// string, with open addressing.
pub(crate) struct Dictionary {
    keys: Vec<u32>,
    codes: Vec<u16>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            keys: vec![EMPTY; DICT_SIZE],
            codes: vec![0; DICT_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.keys.fill(EMPTY);
    }

    #[inline]
    fn slot(key: u32) -> usize {
        (key.wrapping_mul(0x9E37_79B1) >> 19) as usize & (DICT_SIZE - 1)
    }

    #[inline]
    pub fn get(&self, prefix: u16, byte: u8) -> Option<u16> {
        let key = u32::from(prefix) << 8 | u32::from(byte);
        let mut i = Self::slot(key);
        loop {
            match self.keys[i] {
                EMPTY => return None,
                k if k == key => return Some(self.codes[i]),
                _ => i = (i + 1) & (DICT_SIZE - 1),
            }
        }
    }

    pub fn insert(&mut self, prefix: u16, byte: u8, code: u16) {
        let key = u32::from(prefix) << 8 | u32::from(byte);
        let mut i = Self::slot(key);
        while self.keys[i] != EMPTY {
            i = (i + 1) & (DICT_SIZE - 1);
        }
        self.keys[i] = key;
        self.codes[i] = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_expand() {
        let mut table = CodeTable::new(2);
        assert_eq!(table.next_index(), 6);
        let a = table.push(1, 2).unwrap();
        assert_eq!(a, 6);
        // KwKwK: the new string is `a` plus the first byte of `a`.
        let b = table.push(a, a).unwrap();
        let mut out = [0u8; MAX_ENTRIES];
        let n = table.expand(a, &mut out);
        assert_eq!(&out[..n], &[1, 2]);
        let n = table.expand(b, &mut out);
        assert_eq!(&out[..n], &[1, 2, 1]);
        table.reset();
        assert_eq!(table.next_index(), 6);
    }

    #[test]
    fn table_stops_growing_when_full() {
        let mut table = CodeTable::new(8);
        let mut last = 0;
        while let Some(code) = table.push(last, 0) {
            last = code;
        }
        assert!(table.is_full());
        assert_eq!(usize::from(table.next_index()), MAX_ENTRIES);
        assert_eq!(table.push(0, 0), None);
    }

    #[test]
    fn dictionary_lookup() {
        let mut dict = Dictionary::new();
        dict.insert(3, 7, 260);
        dict.insert(260, 0, 261);
        assert_eq!(dict.get(3, 7), Some(260));
        assert_eq!(dict.get(260, 0), Some(261));
        assert_eq!(dict.get(3, 8), None);
        dict.clear();
        assert_eq!(dict.get(3, 7), None);
    }
}
