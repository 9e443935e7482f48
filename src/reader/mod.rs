use alloc::vec::Vec;
use core::fmt;
use core::num::NonZeroU64;

use crate::common::{AbortHandle, FrameDescriptor, FrameOutcome, Region, StreamHeader};
use crate::io::{self, Read};
use crate::raster::{IndexedImage, IndexedRasterMut};

mod frame;
mod parser;

use self::parser::{ContainerParser, Scan};

/// An error returned in the case of the image not being formatted properly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodingFormatError {
    /// The stream does not start with `GIF87a` or `GIF89a`.
    InvalidSignature,
    /// The LZW minimum code size byte is outside `1..=8`.
    InvalidCodeSize(u8),
    /// A sub-block declared more bytes than the input could supply.
    TruncatedBlock {
        /// Length byte of the block.
        declared: u8,
        /// Bytes actually available.
        available: u8,
    },
    /// The input ended in the middle of the header, a descriptor or a frame.
    TruncatedStream,
    /// A byte that is not a block label where one was expected.
    UnexpectedBlockType(u8),
}

impl core::error::Error for DecodingFormatError {}
impl fmt::Display for DecodingFormatError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => fmt.write_str("malformed GIF header"),
            Self::InvalidCodeSize(size) => write!(fmt, "invalid minimal code size {size}"),
            Self::TruncatedBlock {
                declared,
                available,
            } => write!(
                fmt,
                "sub-block declares {declared} bytes but only {available} are available"
            ),
            Self::TruncatedStream => fmt.write_str("unexpected end of GIF data"),
            Self::UnexpectedBlockType(tag) => write!(fmt, "unknown block type {tag:#04x}"),
        }
    }
}

/// Decoding error.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodingError {
    /// Returned if the image is found to be malformed.
    Format(DecodingFormatError),
    /// Wraps an I/O error.
    Io(io::IoError),
    /// Frame data was requested but no frame is located, see [`Decoder::next_frame_info`].
    FrameNotLocated,
    /// The image buffer for a frame would exceed the [`MemoryLimit`].
    OutOfMemory,
}

impl fmt::Display for DecodingError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(d) => d.fmt(fmt),
            Self::Io(err) => err.fmt(fmt),
            Self::FrameNotLocated => fmt.write_str("no frame with unread image data"),
            Self::OutOfMemory => fmt.write_str("frame buffer exceeds the memory limit"),
        }
    }
}

impl core::error::Error for DecodingError {
    #[cold]
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Format(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::FrameNotLocated | Self::OutOfMemory => None,
        }
    }
}

impl From<io::IoError> for DecodingError {
    #[cold]
    fn from(err: io::IoError) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for DecodingError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        Self::Io(io::IoError::from(err))
    }
}

impl From<DecodingFormatError> for DecodingError {
    #[cold]
    fn from(err: DecodingFormatError) -> Self {
        Self::Format(err)
    }
}

/// A recoverable irregularity in the input. Decoding continues after each of these.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeWarning {
    /// An LZW code beyond the next table entry; it was decoded as that next entry.
    UnexpectedLzwCode {
        /// The code read.
        code: u16,
        /// The next free table index at that point.
        next_index: u16,
    },
    /// A fixed-size extension header had the wrong length.
    ExtensionHeaderSize {
        /// Extension label.
        label: u8,
        /// Required header length.
        expected: u8,
        /// Length found in the stream.
        found: u8,
    },
    /// The image data ended before every row was filled.
    MissingRows {
        /// Rows decoded.
        decoded: u32,
        /// Rows in the frame.
        expected: u32,
    },
    /// Extension blocks at the end of the stream that no frame followed.
    ExtensionsWithoutFrame,
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedLzwCode { code, next_index } => write!(
                fmt,
                "LZW code {code} is past the next table entry {next_index}, the data may be corrupt"
            ),
            Self::ExtensionHeaderSize {
                label,
                expected,
                found,
            } => write!(
                fmt,
                "extension {label:#04x} header has {found} bytes instead of {expected}"
            ),
            Self::MissingRows { decoded, expected } => {
                write!(fmt, "image data ended after {decoded} of {expected} rows")
            }
            Self::ExtensionsWithoutFrame => {
                fmt.write_str("extension blocks at the end of the stream were discarded")
            }
        }
    }
}

/// Receives progress of a frame decode.
///
/// All methods have empty defaults; `()` is the listener that ignores everything.
pub trait DecodeListener {
    /// An interlace pass (always pass 0 for progressive frames) begins at `first_row` and
    /// advances by `row_step`.
    fn pass_started(&mut self, _pass: u8, _first_row: u16, _row_step: u16) {}

    /// Frame row `row` is complete. `dest_row` is where it landed in the destination, if the
    /// read parameters selected it.
    fn row_completed(&mut self, _row: u16, _dest_row: Option<u32>) {}

    /// Every row of `pass` is complete.
    fn pass_completed(&mut self, _pass: u8) {}

    /// Percentage of the frame's rows decoded so far.
    fn progress(&mut self, _percent: f32) {}

    /// A recoverable irregularity was found in the image data.
    fn warning(&mut self, _warning: &DecodeWarning) {}
}

impl DecodeListener for () {}

/// Which part of a frame to decode and where to put it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadParams {
    /// Part of the frame to decode, in frame coordinates. `None` selects the whole frame.
    pub region: Option<Region>,
    /// Keep every n-th column of the region, starting with its first.
    pub x_subsampling: u16,
    /// Keep every n-th row of the region, starting with its first.
    pub y_subsampling: u16,
    /// Destination column of the first kept column.
    pub dest_left: u32,
    /// Destination row of the first kept row.
    pub dest_top: u32,
}

impl Default for ReadParams {
    fn default() -> Self {
        Self {
            region: None,
            x_subsampling: 1,
            y_subsampling: 1,
            dest_left: 0,
            dest_top: 0,
        }
    }
}

impl ReadParams {
    /// The region clipped to a frame, `None` if nothing of the frame is selected.
    pub(crate) fn clipped_region(&self, frame: &FrameDescriptor) -> Option<Region> {
        let full = Region {
            left: 0,
            top: 0,
            width: frame.width,
            height: frame.height,
        };
        self.region.unwrap_or(full).clip(frame.width, frame.height)
    }

    /// Width and height of the decoded pixels, without the destination offset.
    #[must_use]
    pub fn output_size(&self, frame: &FrameDescriptor) -> (u32, u32) {
        match self.clipped_region(frame) {
            Some(region) => (
                u32::from(region.width).div_ceil(u32::from(self.x_subsampling.max(1))),
                u32::from(region.height).div_ceil(u32::from(self.y_subsampling.max(1))),
            ),
            None => (0, 0),
        }
    }
}

/// A frame decoded into its own image.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    /// Frame metadata.
    pub descriptor: FrameDescriptor,
    /// Decoded indices with the frame's effective palette.
    pub image: IndexedImage,
    /// Whether the decode ran to completion.
    pub outcome: FrameOutcome,
}

/// Largest image buffer [`Decoder::read_next_image`] allocates for one frame.
///
/// Frame sizes come from the input, so an untrusted file can ask for up to 4 GiB per frame.
/// Decoding into a caller's raster with [`Decoder::read_frame_into`] is not limited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLimit {
    /// No limit.
    Unlimited,
    /// At most this many bytes.
    Bytes(NonZeroU64),
}

impl MemoryLimit {
    /// 50 MB.
    pub const DEFAULT: Self = match NonZeroU64::new(50_000_000) {
        Some(bytes) => Self::Bytes(bytes),
        None => Self::Unlimited,
    };

    fn allows(self, bytes: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Bytes(limit) => bytes <= limit.get(),
        }
    }
}

impl Default for MemoryLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Options for opening a GIF decoder. [`DecodeOptions::read_info`] will start the decoder.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    strict_block_types: bool,
    memory_limit: MemoryLimit,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOptions {
    /// Creates a new decoder builder
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            strict_block_types: false,
            memory_limit: MemoryLimit::DEFAULT,
        }
    }

    /// Reject unknown block labels.
    ///
    /// By default an unknown label where a block was expected ends the stream, the same as a
    /// trailer, so that files with garbage after the last frame still decode. In strict mode
    /// it fails with [`DecodingFormatError::UnexpectedBlockType`]. A zero byte always ends the
    /// stream.
    pub fn set_strict_block_types(&mut self, strict: bool) {
        self.strict_block_types = strict;
    }

    /// Caps the frame buffers allocated by [`Decoder::read_next_image`].
    pub fn set_memory_limit(&mut self, limit: MemoryLimit) {
        self.memory_limit = limit;
    }

    /// Reads the logical screen descriptor including the global color table
    ///
    /// Returns a [`Decoder`] positioned at the first block.
    pub fn read_info<R: Read>(self, mut reader: R) -> Result<Decoder<R>, DecodingError> {
        let parser = ContainerParser::new(self.strict_block_types);
        let header = parser.read_header(&mut reader)?;
        Ok(Decoder {
            reader,
            header,
            parser,
            current: None,
            data_pending: false,
            located: 0,
            abort: AbortHandle::new(),
            warnings: Vec::new(),
            memory_limit: self.memory_limit,
        })
    }
}

/// GIF decoder. Create [`DecodeOptions`] to get started, and call [`DecodeOptions::read_info`].
///
/// A decoder owns its input and all per-stream state. Frames are visited in stream order.
pub struct Decoder<R: Read> {
    reader: R,
    header: StreamHeader,
    parser: ContainerParser,
    current: Option<FrameDescriptor>,
    /// Image data of `current` has not been read yet.
    data_pending: bool,
    /// Frames located so far.
    located: usize,
    abort: AbortHandle,
    warnings: Vec<DecodeWarning>,
    memory_limit: MemoryLimit,
}

impl<R: Read> Decoder<R> {
    /// Create a new decoder with default options.
    #[inline]
    pub fn new(reader: R) -> Result<Self, DecodingError> {
        DecodeOptions::new().read_info(reader)
    }

    /// Logical screen information and global color table.
    #[must_use]
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// The most recently located frame.
    #[must_use]
    pub fn current_frame(&self) -> Option<&FrameDescriptor> {
        self.current.as_ref()
    }

    /// Index of the most recently located frame.
    #[must_use]
    pub fn current_frame_index(&self) -> Option<usize> {
        self.located.checked_sub(1)
    }

    /// Handle to cancel frame decodes from another thread.
    ///
    /// The flag is cleared when a frame decode starts, so it only affects a decode in
    /// progress.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Recoverable irregularities found so far, oldest first.
    pub fn take_warnings(&mut self) -> Vec<DecodeWarning> {
        core::mem::take(&mut self.warnings)
    }

    /// Reads up to the image data of the next frame and returns its descriptor.
    ///
    /// Unread image data of the previous frame is skipped. Returns `None` at the end of the
    /// stream.
    pub fn next_frame_info(&mut self) -> Result<Option<&FrameDescriptor>, DecodingError> {
        if self.data_pending {
            self.parser.skip_image_data(&mut self.reader)?;
            self.data_pending = false;
        }
        match self.parser.scan(&mut self.reader, &mut self.warnings)? {
            Scan::Frame(descriptor) => {
                self.current = Some(descriptor);
                self.data_pending = true;
                self.located += 1;
                Ok(self.current.as_ref())
            }
            Scan::End => {
                self.current = None;
                Ok(None)
            }
        }
    }

    /// Moves forward to frame `index` without decoding the frames in between.
    ///
    /// Returns `None` if the stream ends first or if `index` was already passed; the input
    /// is read sequentially and cannot go back.
    pub fn skip_to_frame(
        &mut self,
        index: usize,
    ) -> Result<Option<&FrameDescriptor>, DecodingError> {
        if index < self.current_frame_index().unwrap_or(0) {
            return Ok(None);
        }
        if self.current_frame_index() == Some(index) {
            return Ok(if self.data_pending {
                self.current.as_ref()
            } else {
                None
            });
        }
        while self.located <= index {
            if self.next_frame_info()?.is_none() {
                return Ok(None);
            }
        }
        Ok(self.current.as_ref())
    }

    /// Decodes the located frame into `sink` as selected by `params`.
    pub fn read_frame_into<S, L>(
        &mut self,
        sink: &mut S,
        params: &ReadParams,
        listener: &mut L,
    ) -> Result<FrameOutcome, DecodingError>
    where
        S: IndexedRasterMut + ?Sized,
        L: DecodeListener + ?Sized,
    {
        if !self.data_pending {
            return Err(DecodingError::FrameNotLocated);
        }
        let descriptor = self.current.as_ref().ok_or(DecodingError::FrameNotLocated)?;
        self.data_pending = false;
        self.abort.clear();
        let job = frame::FrameJob {
            descriptor,
            min_code_size: self.parser.image_data_code_size(),
            params,
            abort: &self.abort,
        };
        frame::decode_frame(&mut self.reader, &job, sink, listener, &mut self.warnings)
    }

    /// Decodes the next frame in full.
    pub fn read_next_image(&mut self) -> Result<Option<DecodedFrame>, DecodingError> {
        self.read_next_image_with(&ReadParams::default(), &mut ())
    }

    /// Decodes the next frame into a new image sized by `params`.
    ///
    /// The image gets the frame's effective palette: its local table, else the global one,
    /// else a gray ramp. Fails with [`DecodingError::OutOfMemory`] before reading the image
    /// data if the image would exceed the decoder's [`MemoryLimit`]; the frame stays located.
    pub fn read_next_image_with<L: DecodeListener + ?Sized>(
        &mut self,
        params: &ReadParams,
        listener: &mut L,
    ) -> Result<Option<DecodedFrame>, DecodingError> {
        let Some(descriptor) = self.next_frame_info()?.cloned() else {
            return Ok(None);
        };
        let (width, height) = params.output_size(&descriptor);
        let (Some(width), Some(height)) = (
            width.checked_add(params.dest_left),
            height.checked_add(params.dest_top),
        ) else {
            return Err(DecodingError::OutOfMemory);
        };
        let bytes = u64::from(width) * u64::from(height);
        if !self.memory_limit.allows(bytes) || usize::try_from(bytes).is_err() {
            log::debug!("refusing {width}x{height} frame buffer");
            return Err(DecodingError::OutOfMemory);
        }
        let model = descriptor.color_model(self.header.global_color_table.as_ref());
        let mut image = IndexedImage::new(width, height, model.palette().clone());
        let outcome = self.read_frame_into(&mut image, params, listener)?;
        Ok(Some(DecodedFrame {
            descriptor,
            image,
            outcome,
        }))
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
