//! Pixel buffers the codec reads from and writes into.
//!
//! The decoder and encoder only depend on the [`IndexedRaster`] and [`IndexedRasterMut`]
//! traits; [`IndexedImage`] is a plain row-major implementation of both.

use alloc::vec::Vec;

use crate::common::ColorTable;

/// A paletted raster the encoder can read.
pub trait IndexedRaster {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Palette index at `(x, y)`. Coordinates are within bounds.
    fn index(&self, x: u32, y: u32) -> u8;

    /// The palette the indices refer to.
    fn palette(&self) -> &ColorTable;

    /// Row `y` as a contiguous byte-per-pixel slice, when the storage allows it.
    ///
    /// Implementations returning `Some` enable bulk copies.
    fn row(&self, _y: u32) -> Option<&[u8]> {
        None
    }
}

/// A paletted raster the decoder can write.
pub trait IndexedRasterMut: IndexedRaster {
    /// Stores `index` at `(x, y)`. Coordinates are within bounds.
    fn set_index(&mut self, x: u32, y: u32, index: u8);

    /// Row `y` as a mutable contiguous byte-per-pixel slice, when the storage allows it.
    fn row_mut(&mut self, _y: u32) -> Option<&mut [u8]> {
        None
    }
}

/// A row-major, byte-per-pixel paletted image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    palette: ColorTable,
}

impl IndexedImage {
    /// A `width` x `height` image filled with index 0.
    #[must_use]
    pub fn new(width: u32, height: u32, palette: ColorTable) -> Self {
        Self::filled(width, height, palette, 0)
    }

    /// A `width` x `height` image filled with `index`.
    #[must_use]
    pub fn filled(width: u32, height: u32, palette: ColorTable, index: u8) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![index; len],
            palette,
        }
    }

    /// Wraps existing pixels. Returns `None` if `pixels` does not hold `width * height` bytes.
    #[must_use]
    pub fn from_pixels(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        palette: ColorTable,
    ) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
            palette,
        })
    }

    /// All pixels, row by row.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Replaces the palette.
    pub fn set_palette(&mut self, palette: ColorTable) {
        self.palette = palette;
    }

    /// Splits the image into its pixels and palette.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, ColorTable) {
        (self.pixels, self.palette)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl IndexedRaster for IndexedImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> u8 {
        self.pixels[self.offset(x, y)]
    }

    fn palette(&self) -> &ColorTable {
        &self.palette
    }

    fn row(&self, y: u32) -> Option<&[u8]> {
        let start = self.offset(0, y);
        self.pixels.get(start..start + self.width as usize)
    }
}

impl IndexedRasterMut for IndexedImage {
    #[inline]
    fn set_index(&mut self, x: u32, y: u32, index: u8) {
        let offset = self.offset(x, y);
        self.pixels[offset] = index;
    }

    fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        let start = self.offset(0, y);
        let width = self.width as usize;
        self.pixels.get_mut(start..start + width)
    }
}

/// Interleaved 8-bit RGB or RGBA pixels that need a palette before they can be encoded.
#[derive(Clone, Copy, Debug)]
pub struct TrueColorImage<'a> {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Samples per pixel: 3 for RGB, 4 for RGBA.
    pub channels: u8,
    /// `width * height * channels` samples.
    pub pixels: &'a [u8],
}

#[test]
fn rows_are_contiguous() {
    let palette = ColorTable::from_colors(&[[0; 3], [9; 3]]).unwrap();
    let mut image = IndexedImage::new(3, 2, palette);
    image.set_index(2, 1, 1);
    assert_eq!(image.row(1), Some(&[0, 0, 1][..]));
    image.row_mut(0).unwrap().copy_from_slice(&[1, 1, 0]);
    assert_eq!(image.pixels(), &[1, 1, 0, 0, 0, 1]);
    assert_eq!(image.index(0, 0), 1);
    assert!(IndexedImage::from_pixels(2, 2, vec![0; 3], image.palette().clone()).is_none());
}
