//! # Streaming GIF encoder

use alloc::fmt;
use alloc::vec::Vec;

use crate::common::{
    AbortHandle, AnyExtension, ApplicationExtension, Block, ColorTable, Extension,
    FrameDescriptor, FrameOutcome, PlainText, Region, Repeat, StreamHeader,
};
use crate::interlace::RowOrder;
use crate::io::{self, Write};
use crate::lzw::{BitWriter, LzwEncoder};
use crate::raster::{IndexedRaster, TrueColorImage};
use crate::subblock::SubBlockWriter;
use crate::traits::WriteBytesExt;

/// The image has incorrect properties, making it impossible to encode as a gif.
#[derive(Debug)]
#[non_exhaustive]
pub enum EncodingFormatError {
    /// The image has too many colors.
    TooManyColors,
    /// The source is not a paletted raster and could not be reduced to one.
    UnsupportedFrameShape,
    /// The quantizer speed is outside `1..=30`.
    InvalidQuantizerSpeed,
    /// The requested source region does not overlap the source.
    EmptyRegion,
}

impl core::error::Error for EncodingFormatError {}
impl fmt::Display for EncodingFormatError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyColors => write!(fmt, "the image has too many colors"),
            Self::UnsupportedFrameShape => write!(
                fmt,
                "the frame is neither paletted nor reducible to a palette"
            ),
            Self::InvalidQuantizerSpeed => write!(fmt, "quantizer speed must be in 1..=30"),
            Self::EmptyRegion => write!(fmt, "the source region is empty"),
        }
    }
}

/// Encoding error.
#[derive(Debug)]
#[non_exhaustive]
pub enum EncodingError {
    /// Frame buffer is too small for the declared dimensions.
    FrameBufferTooSmallForDimensions,
    /// Expected a writer but none found.
    WriterNotFound,
    /// Returned if the to image is not encodable as a gif.
    Format(EncodingFormatError),
    /// Wraps an I/O error.
    Io(io::IoError),
}

impl fmt::Display for EncodingError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameBufferTooSmallForDimensions => {
                fmt.write_str("Frame Buffer Too Small for Dimensions")
            }
            Self::WriterNotFound => fmt.write_str("Writer Not Found"),
            Self::Io(err) => err.fmt(fmt),
            Self::Format(err) => err.fmt(fmt),
        }
    }
}

impl core::error::Error for EncodingError {
    #[cold]
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::FrameBufferTooSmallForDimensions => None,
            Self::WriterNotFound => None,
            Self::Io(err) => Some(err),
            Self::Format(err) => Some(err),
        }
    }
}

impl From<io::IoError> for EncodingError {
    #[cold]
    fn from(err: io::IoError) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for EncodingError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        Self::Io(io::IoError::from(err))
    }
}

impl From<EncodingFormatError> for EncodingError {
    #[cold]
    fn from(err: EncodingFormatError) -> Self {
        Self::Format(err)
    }
}

/// Which part of a source raster to encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteParams {
    /// Part of the source to encode. `None` selects the whole source.
    pub region: Option<Region>,
    /// Keep every n-th column of the region, starting with its first.
    pub x_subsampling: u16,
    /// Keep every n-th row of the region, starting with its first.
    pub y_subsampling: u16,
}

impl Default for WriteParams {
    fn default() -> Self {
        Self {
            region: None,
            x_subsampling: 1,
            y_subsampling: 1,
        }
    }
}

impl WriteParams {
    fn clipped_region<S: IndexedRaster + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Region, EncodingError> {
        let (Ok(width), Ok(height)) = (
            u16::try_from(source.width()),
            u16::try_from(source.height()),
        ) else {
            return Err(EncodingFormatError::UnsupportedFrameShape.into());
        };
        match self.region {
            None => Ok(Region {
                left: 0,
                top: 0,
                width,
                height,
            }),
            Some(region) => region
                .clip(width, height)
                .ok_or(EncodingError::Format(EncodingFormatError::EmptyRegion)),
        }
    }
}

/// Receives progress of a frame encode. `()` ignores it.
pub trait EncodeListener {
    /// Percentage of the frame's rows compressed so far.
    fn progress(&mut self, _percent: f32) {}
}

impl EncodeListener for () {}

/// GIF encoder.
pub struct Encoder<W: Write> {
    w: Option<W>,
    global_color_table: Option<ColorTable>,
    abort: AbortHandle,
}

impl<W: Write> Encoder<W> {
    /// Creates a new encoder and writes the signature, logical screen descriptor and global
    /// color table of `header`.
    pub fn new(w: W, header: &StreamHeader) -> Result<Self, EncodingError> {
        let mut encoder = Self {
            w: Some(w),
            global_color_table: header.global_color_table.clone(),
            abort: AbortHandle::new(),
        };
        encoder.write_screen_desc(header)?;
        Ok(encoder)
    }

    fn write_screen_desc(&mut self, header: &StreamHeader) -> Result<(), EncodingError> {
        let mut flags = (header.color_resolution.clamp(1, 8) - 1) << 4;
        if header.sort_flag {
            flags |= 0b1000;
        }
        if let Some(table) = &header.global_color_table {
            flags |= 0b1000_0000 | table.size_exponent();
        }
        let writer = self.writer()?;
        writer.write_all(header.version.signature())?;
        writer.write_le(header.width)?;
        writer.write_le(header.height)?;
        writer.write_le(flags)?;
        writer.write_le(header.background_color_index)?;
        writer.write_le(header.pixel_aspect_ratio)?;
        if let Some(table) = &header.global_color_table {
            writer.write_all(table.as_bytes())?;
        }
        Ok(())
    }

    /// Handle to cancel frame encodes from another thread.
    ///
    /// The flag is cleared when a frame encode starts.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Write an extension block that signals a repeat behaviour.
    ///
    /// `Repeat::Finite(0)` is the default and writes nothing.
    pub fn set_repeat(&mut self, repeat: Repeat) -> Result<(), EncodingError> {
        if repeat == Repeat::Finite(0) {
            return Ok(());
        }
        self.write_application_extension(&ApplicationExtension::looping(repeat))
    }

    /// Writes a frame read from `source`.
    ///
    /// The frame's size is that of the selected region after subsampling; the width and
    /// height of `descriptor` are ignored. Extensions in `descriptor` are written before the
    /// image descriptor, with the graphic control extension last and only when one of its
    /// fields is set.
    ///
    /// The source palette is written as a local color table unless it equals the global one.
    /// A local table in `descriptor` takes precedence.
    pub fn write_frame<S: IndexedRaster + ?Sized>(
        &mut self,
        descriptor: &FrameDescriptor,
        source: &S,
        params: &WriteParams,
    ) -> Result<FrameOutcome, EncodingError> {
        self.write_frame_with(descriptor, source, params, &mut ())
    }

    /// Like [`Encoder::write_frame`], reporting progress to `listener`.
    ///
    /// If the abort handle fires, the rows written so far are terminated properly and the
    /// stream stays well formed, with a frame shorter than its descriptor claims.
    pub fn write_frame_with<S, L>(
        &mut self,
        descriptor: &FrameDescriptor,
        source: &S,
        params: &WriteParams,
        listener: &mut L,
    ) -> Result<FrameOutcome, EncodingError>
    where
        S: IndexedRaster + ?Sized,
        L: EncodeListener + ?Sized,
    {
        let region = params.clipped_region(source)?;
        let x_step = params.x_subsampling.max(1);
        let y_step = params.y_subsampling.max(1);
        let width = region.width.div_ceil(x_step);
        let height = region.height.div_ceil(y_step);
        let local = match &descriptor.local_color_table {
            Some(table) => Some(table),
            None if self.global_color_table.as_ref() == Some(source.palette()) => None,
            None => Some(source.palette()),
        };

        let palette_bits = local
            .or(self.global_color_table.as_ref())
            .map_or(2, ColorTable::bits_per_index);
        let rows = SourceRows {
            source,
            region,
            x_step,
            y_step,
            width,
        };
        let min_code_size = palette_bits.max(rows.index_bits()).max(2);

        self.write_frame_extensions(descriptor)?;
        self.write_image_desc(descriptor, width, height, local)?;
        self.abort.clear();
        let outcome =
            self.write_image_data(&rows, height, descriptor.interlaced, min_code_size, listener)?;
        log::trace!("wrote {width}x{height} frame, {outcome:?}");
        Ok(outcome)
    }

    /// Reduces a true color image to at most 256 colors and writes it as a frame.
    ///
    /// Pixels with an alpha of zero share one transparent palette entry, which becomes the
    /// frame's transparent index unless `descriptor` names one. `speed` trades quality for
    /// time when more than 256 colors are present: 1 is best, 30 fastest.
    pub fn write_truecolor_frame(
        &mut self,
        descriptor: &FrameDescriptor,
        image: &TrueColorImage<'_>,
        params: &WriteParams,
        speed: i32,
    ) -> Result<FrameOutcome, EncodingError> {
        #[cfg(feature = "color_quant")]
        {
            let quantized = crate::quantize::quantize(image, speed)?;
            let mut frame = descriptor.clone();
            frame.local_color_table = Some(quantized.image.palette().clone());
            if frame.transparent.is_none() {
                frame.transparent = quantized.transparent;
            }
            self.write_frame(&frame, &quantized.image, params)
        }
        #[cfg(not(feature = "color_quant"))]
        {
            let _ = (descriptor, image, params, speed);
            Err(EncodingFormatError::UnsupportedFrameShape.into())
        }
    }

    fn write_frame_extensions(&mut self, frame: &FrameDescriptor) -> Result<(), EncodingError> {
        for comment in &frame.comments {
            self.write_raw_extension(Extension::Comment.into(), &[comment.as_slice()])?;
        }
        for app in &frame.application_extensions {
            self.write_application_extension(app)?;
        }
        let writer = self.writer()?;
        if let Some(text) = &frame.plain_text {
            Self::write_plain_text(writer, text)?;
        }
        // A graphic control extension applies to the next rendering block, which is the image.
        if frame.has_graphic_control() {
            let mut flags = frame.dispose.to_u8() << 2;
            flags |= u8::from(frame.needs_user_input) << 1;
            flags |= u8::from(frame.transparent.is_some());
            writer.write_le(Block::Extension as u8)?;
            writer.write_le(Extension::Control as u8)?;
            writer.write_le(4u8)?;
            writer.write_le(flags)?;
            writer.write_le(frame.delay)?;
            writer.write_le(frame.transparent.unwrap_or(0))?;
            writer.write_le(0u8)?;
        }
        Ok(())
    }

    fn write_plain_text(writer: &mut W, text: &PlainText) -> Result<(), EncodingError> {
        writer.write_le(Block::Extension as u8)?;
        writer.write_le(Extension::Text as u8)?;
        writer.write_le(12u8)?;
        writer.write_le(text.grid_left)?;
        writer.write_le(text.grid_top)?;
        writer.write_le(text.grid_width)?;
        writer.write_le(text.grid_height)?;
        writer.write_le(text.cell_width)?;
        writer.write_le(text.cell_height)?;
        writer.write_le(text.foreground_color_index)?;
        writer.write_le(text.background_color_index)?;
        let mut blocks = SubBlockWriter::new(writer);
        blocks.write_all(&text.text)?;
        blocks.finish()?;
        Ok(())
    }

    fn write_image_desc(
        &mut self,
        frame: &FrameDescriptor,
        width: u16,
        height: u16,
        local: Option<&ColorTable>,
    ) -> Result<(), EncodingError> {
        let mut flags = 0;
        if frame.interlaced {
            flags |= 0b0100_0000;
        }
        if frame.sort_flag {
            flags |= 0b0010_0000;
        }
        if let Some(table) = local {
            flags |= 0b1000_0000 | table.size_exponent();
        }
        let writer = self.writer()?;
        writer.write_le(Block::Image as u8)?;
        writer.write_le(frame.left)?;
        writer.write_le(frame.top)?;
        writer.write_le(width)?;
        writer.write_le(height)?;
        writer.write_le(flags)?;
        if let Some(table) = local {
            writer.write_all(table.as_bytes())?;
        }
        Ok(())
    }

    fn write_image_data<S, L>(
        &mut self,
        rows: &SourceRows<'_, S>,
        height: u16,
        interlaced: bool,
        min_code_size: u8,
        listener: &mut L,
    ) -> Result<FrameOutcome, EncodingError>
    where
        S: IndexedRaster + ?Sized,
        L: EncodeListener + ?Sized,
    {
        let abort = self.abort.clone();
        let writer = self.writer()?;
        writer.write_le(min_code_size)?;
        let mut blocks = SubBlockWriter::new(writer);
        let mut bits = BitWriter::new(&mut blocks);
        let mut lzw = LzwEncoder::new(min_code_size);
        let mut gathered = Vec::with_capacity(usize::from(rows.width));
        let mut done = 0u32;
        let mut outcome = FrameOutcome::Complete;
        lzw.start(&mut bits)?;
        if height == 0 {
            listener.progress(100.0);
        }
        for step in RowOrder::new(height, interlaced) {
            let row = rows.row(step.row, &mut gathered);
            lzw.push_all(row, &mut bits)?;
            done += 1;
            listener.progress(done as f32 / f32::from(height) * 100.0);
            if abort.is_aborted() && done < u32::from(height) {
                log::debug!("frame encode aborted after {done} rows");
                outcome = FrameOutcome::Aborted { rows: done };
                break;
            }
        }
        lzw.finish(&mut bits)?;
        bits.flush()?;
        blocks.finish()?;
        Ok(outcome)
    }

    fn write_application_extension(
        &mut self,
        app: &ApplicationExtension,
    ) -> Result<(), EncodingError> {
        let writer = self.writer()?;
        writer.write_le(Block::Extension as u8)?;
        writer.write_le(Extension::Application as u8)?;
        writer.write_le(11u8)?;
        writer.write_all(&app.identifier)?;
        writer.write_all(&app.authentication_code)?;
        let mut blocks = SubBlockWriter::new(writer);
        blocks.write_all(&app.data)?;
        blocks.finish()?;
        Ok(())
    }

    /// Writes a raw extension to the image.
    ///
    /// This method can be used to write an unsupported extension to the file. `func` is the extension
    /// identifier (e.g. `Extension::Application as u8`). `data` are the extension payload blocks. If any
    /// contained slice has a length > 255 it is automatically divided into sub-blocks.
    pub fn write_raw_extension(
        &mut self,
        func: AnyExtension,
        data: &[&[u8]],
    ) -> Result<(), EncodingError> {
        let writer = self.writer()?;
        writer.write_le(Block::Extension as u8)?;
        writer.write_le(func.0)?;
        for block in data {
            for chunk in block.chunks(0xFF) {
                writer.write_le(chunk.len() as u8)?;
                writer.write_all(chunk)?;
            }
        }
        writer.write_le(0u8)?;
        Ok(())
    }

    /// Finishes writing, and returns the `io::Write` instance used by this encoder
    pub fn into_inner(mut self) -> Result<W, EncodingError> {
        self.write_trailer()?;
        self.w.take().ok_or(EncodingError::WriterNotFound)
    }

    fn write_trailer(&mut self) -> Result<(), EncodingError> {
        let writer = self.writer()?;
        writer.write_le(Block::Trailer as u8)?;
        writer.flush()?;
        Ok(())
    }

    #[inline]
    fn writer(&mut self) -> Result<&mut W, EncodingError> {
        self.w.as_mut().ok_or(EncodingError::WriterNotFound)
    }
}

impl<W: Write> Drop for Encoder<W> {
    #[cfg(feature = "raii_no_panic")]
    fn drop(&mut self) {
        if self.w.is_some() {
            let _ = self.write_trailer();
        }
    }

    #[cfg(not(feature = "raii_no_panic"))]
    fn drop(&mut self) {
        if self.w.is_some() {
            self.write_trailer().unwrap();
        }
    }
}

/// The selected, subsampled rows of a source raster.
struct SourceRows<'a, S: ?Sized> {
    source: &'a S,
    region: Region,
    x_step: u16,
    y_step: u16,
    /// Output width.
    width: u16,
}

impl<'a, S: IndexedRaster + ?Sized> SourceRows<'a, S> {
    fn source_y(&self, row: u16) -> u32 {
        u32::from(self.region.top) + u32::from(row) * u32::from(self.y_step)
    }

    /// Output row `row`, sliced straight out of the source when it stores contiguous rows and
    /// no column is skipped, gathered into `buf` otherwise.
    fn row<'b>(&self, row: u16, buf: &'b mut Vec<u8>) -> &'b [u8]
    where
        'a: 'b,
    {
        let y = self.source_y(row);
        let left = usize::from(self.region.left);
        if self.x_step == 1 {
            if let Some(line) = self.source.row(y) {
                if let Some(line) = line.get(left..left + usize::from(self.width)) {
                    return line;
                }
            }
        }
        buf.clear();
        buf.extend((0..u32::from(self.width)).map(|i| {
            let x = u32::from(self.region.left) + i * u32::from(self.x_step);
            self.source.index(x, y)
        }));
        buf
    }

    /// Bits needed for the largest index in the selection, scanning no further than needed.
    fn index_bits(&self) -> u8 {
        let mut buf = Vec::new();
        let mut max = 0u8;
        for row in 0..self.region.height.div_ceil(self.y_step) {
            max = max.max(self.row(row, &mut buf).iter().copied().max().unwrap_or(0));
            if max > 127 {
                break;
            }
        }
        (u32::from(max) + 1).next_power_of_two().trailing_zeros() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::IndexedImage;

    fn palette(n: u8) -> ColorTable {
        let colors: Vec<[u8; 3]> = (0..n).map(|i| [i, i, i]).collect();
        ColorTable::from_colors(&colors).unwrap()
    }

    #[test]
    fn header_bytes() {
        let header = StreamHeader::new(3, 2, Some(palette(2)));
        let out = Encoder::new(Vec::new(), &header)
            .unwrap()
            .into_inner()
            .unwrap();
        assert_eq!(
            out,
            [
                b'G', b'I', b'F', b'8', b'9', b'a', 3, 0, 2, 0, 0x80, 0, 0, 0, 0, 0, 1, 1, 1,
                0x3B
            ]
        );
    }

    #[test]
    fn single_pixel_frame() {
        let table = ColorTable::from_colors(&[[255, 0, 0], [0, 0, 0]]).unwrap();
        let header = StreamHeader::new(1, 1, Some(table.clone()));
        let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
        let image = IndexedImage::new(1, 1, table);
        let outcome = encoder
            .write_frame(&FrameDescriptor::default(), &image, &WriteParams::default())
            .unwrap();
        assert!(outcome.is_complete());
        let out = encoder.into_inner().unwrap();
        assert_eq!(
            &out[19..],
            &[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0, 2, 2, 0x44, 0x01, 0, 0x3B]
        );
    }

    #[test]
    fn local_table_unless_global_matches() {
        let header = StreamHeader::new(2, 1, Some(palette(2)));
        let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
        let other = IndexedImage::new(2, 1, palette(4));
        encoder
            .write_frame(&FrameDescriptor::default(), &other, &WriteParams::default())
            .unwrap();
        let out = encoder.into_inner().unwrap();
        // Screen (13) + global table (6), then the image descriptor flags byte.
        assert_eq!(out[19 + 9], 0x81);
        assert_eq!(&out[29..41], palette(4).as_bytes());
    }

    #[test]
    fn code_size_covers_large_indices() {
        let header = StreamHeader::new(2, 1, None);
        let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
        let image = IndexedImage::from_pixels(2, 1, vec![0, 200], palette(4)).unwrap();
        encoder
            .write_frame(&FrameDescriptor::default(), &image, &WriteParams::default())
            .unwrap();
        let out = encoder.into_inner().unwrap();
        // Screen (13), descriptor (10), local table (12), then the code size.
        assert_eq!(out[13 + 10 + 12], 8);
    }

    #[test]
    fn graphic_control_directly_precedes_image() {
        let header = StreamHeader::new(1, 1, Some(palette(2)));
        let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
        let descriptor = FrameDescriptor {
            delay: 5,
            plain_text: Some(PlainText {
                text: b"hi".to_vec(),
                ..PlainText::default()
            }),
            ..FrameDescriptor::default()
        };
        let image = IndexedImage::new(1, 1, palette(2));
        encoder
            .write_frame(&descriptor, &image, &WriteParams::default())
            .unwrap();
        let out = encoder.into_inner().unwrap();
        // Plain text: label, 12 byte header, one text sub-block and its terminator.
        assert_eq!(&out[19..22], &[0x21, 0x01, 12]);
        assert_eq!(&out[34..38], &[2, b'h', b'i', 0]);
        assert_eq!(&out[38..46], &[0x21, 0xF9, 4, 0, 5, 0, 0, 0]);
        assert_eq!(out[46], 0x2C);

        let frame = crate::Decoder::new(&out[..])
            .unwrap()
            .read_next_image()
            .unwrap()
            .unwrap();
        assert_eq!(frame.descriptor.delay, 5);
        assert_eq!(frame.descriptor.plain_text.unwrap().text, b"hi");
    }

    #[test]
    fn empty_region_is_rejected() {
        let header = StreamHeader::new(2, 2, Some(palette(2)));
        let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
        let image = IndexedImage::new(2, 2, palette(2));
        let params = WriteParams {
            region: Some(Region {
                left: 2,
                top: 0,
                width: 1,
                height: 1,
            }),
            ..WriteParams::default()
        };
        assert!(matches!(
            encoder.write_frame(&FrameDescriptor::default(), &image, &params),
            Err(EncodingError::Format(EncodingFormatError::EmptyRegion))
        ));
    }

    #[test]
    fn trailer_written_on_drop() {
        let mut out = Vec::new();
        {
            let header = StreamHeader::new(1, 1, None);
            let _encoder = Encoder::new(&mut out, &header).unwrap();
        }
        assert_eq!(out.last(), Some(&0x3B));
    }

    #[test]
    fn error_cast() {
        use alloc::boxed::Box;
        let _: Box<dyn core::error::Error> =
            EncodingError::from(EncodingFormatError::TooManyColors).into();
    }
}
