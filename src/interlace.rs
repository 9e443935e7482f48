//! Row order of interlaced frames.

/// `(first row, row step)` of the four interlace passes.
pub const PASSES: [(u16, u16); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// Walks the rows of a frame in storage order.
///
/// For a progressive frame that is simply `0..height`. For an interlaced frame it visits the
/// four passes in turn, skipping passes that contain no row at all for small heights.
#[derive(Clone, Debug)]
pub struct RowOrder {
    height: u16,
    interlaced: bool,
    pass: u8,
    next_row: u16,
}

/// One step of a [`RowOrder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowStep {
    /// Row in the frame raster.
    pub row: u16,
    /// Interlace pass the row belongs to, `0` for progressive frames.
    pub pass: u8,
    /// Set on the first row of a pass.
    pub starts_pass: bool,
}

impl RowOrder {
    /// Row order of a `height` rows tall frame.
    #[must_use]
    pub fn new(height: u16, interlaced: bool) -> Self {
        let mut order = Self {
            height,
            interlaced,
            pass: 0,
            next_row: 0,
        };
        if interlaced {
            order.skip_empty_passes();
        }
        order
    }

    fn skip_empty_passes(&mut self) {
        while usize::from(self.pass) < PASSES.len() && self.next_row >= self.height {
            self.pass += 1;
            if let Some(&(start, _)) = PASSES.get(usize::from(self.pass)) {
                self.next_row = start;
            }
        }
    }

    /// The pass of the row returned next.
    #[must_use]
    pub fn pass(&self) -> u8 {
        self.pass
    }

    /// Step between rows of the current pass.
    #[must_use]
    pub fn row_step(&self) -> u16 {
        if self.interlaced {
            PASSES.get(usize::from(self.pass)).map_or(1, |&(_, step)| step)
        } else {
            1
        }
    }
}

impl Iterator for RowOrder {
    type Item = RowStep;

    fn next(&mut self) -> Option<RowStep> {
        if self.next_row >= self.height {
            return None;
        }
        let row = self.next_row;
        let pass = self.pass;
        let starts_pass = if self.interlaced {
            row == PASSES[usize::from(pass)].0
        } else {
            row == 0
        };
        // `height <= u16::MAX` and steps are at most 8, so this cannot overflow `u32`.
        let next = u32::from(row) + u32::from(self.row_step());
        self.next_row = u16::try_from(next).unwrap_or(u16::MAX);
        if self.next_row >= self.height && self.interlaced {
            self.skip_empty_passes();
        }
        Some(RowStep {
            row,
            pass,
            starts_pass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn rows(height: u16, interlaced: bool) -> Vec<u16> {
        RowOrder::new(height, interlaced).map(|s| s.row).collect()
    }

    #[test]
    fn progressive_rows() {
        assert_eq!(rows(4, false), [0, 1, 2, 3]);
        assert!(rows(0, false).is_empty());
    }

    #[test]
    fn interlaced_rows() {
        assert_eq!(
            rows(10, true),
            [0, 8, 4, 2, 6, 1, 3, 5, 7, 9]
        );
        // Passes 1 and 2 are empty for a two row frame.
        assert_eq!(rows(2, true), [0, 1]);
        assert_eq!(rows(1, true), [0]);
        assert!(rows(0, true).is_empty());
    }

    #[test]
    fn interlaced_covers_every_row_once() {
        for height in 0..40 {
            let mut seen = rows(height, true);
            assert_eq!(seen.len(), usize::from(height));
            seen.sort_unstable();
            assert!(seen.iter().copied().eq(0..height));
        }
    }

    #[test]
    fn pass_boundaries() {
        let steps: Vec<RowStep> = RowOrder::new(10, true).collect();
        let starts: Vec<(u16, u8)> = steps
            .iter()
            .filter(|s| s.starts_pass)
            .map(|s| (s.row, s.pass))
            .collect();
        assert_eq!(starts, [(0, 0), (4, 1), (2, 2), (1, 3)]);
    }
}
