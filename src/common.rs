use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::encoder::{EncodingError, EncodingFormatError};

/// Known GIF block labels.
///
/// Note that the block uniquely specifies the layout of bytes that follow and how they are
/// framed. For example, the header always has a fixed length but is followed by a variable amount
/// of additional data. An image descriptor may be followed by a local color table depending on
/// information read in it. Therefore, it doesn't make sense to continue parsing after encountering
/// an unknown block as the semantics of following bytes are unclear.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Block {
    /// Image block.
    Image = 0x2C,
    /// Extension block.
    Extension = 0x21,
    /// Image trailer.
    Trailer = 0x3B,
}

impl Block {
    /// Converts `u8` to `Option<Self>`
    #[must_use]
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0x2C => Some(Self::Image),
            0x21 => Some(Self::Extension),
            0x3B => Some(Self::Trailer),
            _ => None,
        }
    }
}

/// A newtype wrapper around an arbitrary extension ID.
///
/// An extension is some amount of byte data organized in sub-blocks so that one can skip over it
/// without knowing the semantics. Though technically you likely want to use a `Application`
/// extension, the library tries to stay flexible here.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnyExtension(pub u8);

/// Known GIF extension labels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Extension {
    /// Plain Text extension.
    Text = 0x01,
    /// Control extension.
    Control = 0xF9,
    /// Comment extension.
    Comment = 0xFE,
    /// Application extension.
    Application = 0xFF,
}

impl AnyExtension {
    /// Decode the label as a known extension.
    #[must_use]
    pub fn into_known(self) -> Option<Extension> {
        Extension::from_u8(self.0)
    }
}

impl From<Extension> for AnyExtension {
    fn from(ext: Extension) -> Self {
        Self(ext as u8)
    }
}

impl Extension {
    /// Converts `u8` to a `Extension` if it is known.
    #[must_use]
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0x01 => Some(Self::Text),
            0xF9 => Some(Self::Control),
            0xFE => Some(Self::Comment),
            0xFF => Some(Self::Application),
            _ => None,
        }
    }
}

/// GIF version tag of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Version {
    /// `GIF87a`
    V87a,
    /// `GIF89a`
    #[default]
    V89a,
}

impl Version {
    /// The six signature bytes that open a stream of this version.
    #[must_use]
    pub fn signature(self) -> &'static [u8; 6] {
        match self {
            Self::V87a => b"GIF87a",
            Self::V89a => b"GIF89a",
        }
    }

    pub(crate) fn from_signature(sig: &[u8; 6]) -> Option<Self> {
        match sig {
            b"GIF87a" => Some(Self::V87a),
            b"GIF89a" => Some(Self::V89a),
            _ => None,
        }
    }
}

/// Disposal method of a frame, the 3-bit field of the graphic control extension.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    /// The decoder is not required to take any action.
    #[default]
    Any,
    /// Do not dispose.
    Keep,
    /// Restore to background color.
    Background,
    /// Restore to previous.
    Previous,
    /// One of the values 4 to 7, which have no defined meaning but are kept as read.
    Reserved(u8),
}

impl DisposalMethod {
    /// Converts the low three bits of `n` to a `DisposalMethod`.
    #[must_use]
    pub fn from_u8(n: u8) -> Self {
        match n & 0b111 {
            0 => Self::Any,
            1 => Self::Keep,
            2 => Self::Background,
            3 => Self::Previous,
            n => Self::Reserved(n),
        }
    }

    /// The 3-bit wire value.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Any => 0,
            Self::Keep => 1,
            Self::Background => 2,
            Self::Previous => 3,
            Self::Reserved(n) => n & 0b111,
        }
    }
}

/// An ordered table of RGB colors.
///
/// The number of entries is always a power of two between 2 and 256. Shorter inputs are
/// padded with black entries when the table is built.
#[derive(Clone, PartialEq, Eq)]
pub struct ColorTable {
    rgb: Vec<u8>,
}

impl ColorTable {
    /// Largest number of entries a GIF color table can hold.
    pub const MAX_ENTRIES: usize = 256;

    /// Builds a table from packed `[r, g, b, r, g, b, ...]` bytes.
    ///
    /// A trailing partial triple is ignored.
    pub fn from_rgb(rgb: &[u8]) -> Result<Self, EncodingError> {
        let num_colors = rgb.len() / 3;
        if num_colors > Self::MAX_ENTRIES {
            return Err(EncodingError::from(EncodingFormatError::TooManyColors));
        }
        let entries = 2usize << flag_size(num_colors);
        let mut table = Vec::with_capacity(entries * 3);
        table.extend_from_slice(&rgb[..num_colors * 3]);
        table.resize(entries * 3, 0);
        Ok(Self { rgb: table })
    }

    /// Builds a table from a list of colors.
    pub fn from_colors(colors: &[[u8; 3]]) -> Result<Self, EncodingError> {
        let flat: Vec<u8> = colors.iter().flatten().copied().collect();
        Self::from_rgb(&flat)
    }

    /// Table read off the wire; `rgb` is exactly `3 << (size_exponent + 1)` bytes.
    pub(crate) fn from_wire(rgb: Vec<u8>) -> Self {
        debug_assert!(rgb.len() % 3 == 0 && (rgb.len() / 3).is_power_of_two());
        Self { rgb }
    }

    /// A ramp of 256 grays, used when a stream declares no color table at all.
    #[must_use]
    pub fn grayscale() -> Self {
        let rgb = (0..=255u8).flat_map(|v| [v, v, v]).collect();
        Self { rgb }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rgb.len() / 3
    }

    /// Always false, a color table holds at least two entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rgb.is_empty()
    }

    /// The color at `index`, if the table has that many entries.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        let i = usize::from(index) * 3;
        self.rgb.get(i..i + 3).map(|c| [c[0], c[1], c[2]])
    }

    /// Packed `[r, g, b, ...]` bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.rgb
    }

    /// The 3-bit size exponent stored in packed fields: `len == 2 << exponent`.
    #[must_use]
    pub fn size_exponent(&self) -> u8 {
        flag_size(self.len())
    }

    /// Bits needed to address every entry, at least 1.
    #[must_use]
    pub fn bits_per_index(&self) -> u8 {
        self.size_exponent() + 1
    }
}

impl fmt::Debug for ColorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorTable")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

// Color table size converted to flag bits
pub(crate) fn flag_size(size: usize) -> u8 {
    (size.clamp(2, 255).next_power_of_two().trailing_zeros() - 1) as u8
}

/// Logical screen information read once at the start of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    /// `87a` or `89a`.
    pub version: Version,
    /// Logical screen width.
    pub width: u16,
    /// Logical screen height.
    pub height: u16,
    /// Bits per primary color of the source material, 1 to 8.
    pub color_resolution: u8,
    /// Whether the global color table is sorted by importance.
    pub sort_flag: bool,
    /// Index of the background color in the global color table.
    pub background_color_index: u8,
    /// Raw pixel aspect ratio byte. Zero means no information.
    pub pixel_aspect_ratio: u8,
    /// The global color table, if any.
    pub global_color_table: Option<ColorTable>,
}

impl StreamHeader {
    /// A `89a` header for a screen of the given size with an optional global table.
    #[must_use]
    pub fn new(width: u16, height: u16, global_color_table: Option<ColorTable>) -> Self {
        let color_resolution = global_color_table
            .as_ref()
            .map_or(8, ColorTable::bits_per_index);
        Self {
            version: Version::V89a,
            width,
            height,
            color_resolution,
            sort_flag: false,
            background_color_index: 0,
            pixel_aspect_ratio: 0,
            global_color_table,
        }
    }
}

/// Number of repetitions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Repeat {
    /// Finite number of repetitions
    Finite(u16),
    /// Infinite number of repetitions
    Infinite,
}

impl Default for Repeat {
    fn default() -> Self {
        Self::Finite(0)
    }
}

/// An application extension block: 8-byte identifier, 3-byte authentication code and
/// the concatenated payload of its data sub-blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationExtension {
    /// Application identifier, e.g. `NETSCAPE`.
    pub identifier: [u8; 8],
    /// Authentication code, e.g. `2.0`.
    pub authentication_code: [u8; 3],
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl ApplicationExtension {
    const NETSCAPE: &'static [u8; 8] = b"NETSCAPE";
    const NETSCAPE_AUTH: &'static [u8; 3] = b"2.0";

    /// The `NETSCAPE2.0` block that sets the animation loop count.
    #[must_use]
    pub fn looping(repeat: Repeat) -> Self {
        let count = match repeat {
            Repeat::Finite(no) => no,
            Repeat::Infinite => 0,
        };
        let [lo, hi] = count.to_le_bytes();
        Self {
            identifier: *Self::NETSCAPE,
            authentication_code: *Self::NETSCAPE_AUTH,
            data: vec![1, lo, hi],
        }
    }

    /// The loop count, if this is a `NETSCAPE2.0` looping block.
    #[must_use]
    pub fn repeat(&self) -> Option<Repeat> {
        if &self.identifier != Self::NETSCAPE || &self.authentication_code != Self::NETSCAPE_AUTH
        {
            return None;
        }
        match *self.data.as_slice() {
            [1, 0, 0, ..] => Some(Repeat::Infinite),
            [1, lo, hi, ..] => Some(Repeat::Finite(u16::from_le_bytes([lo, hi]))),
            _ => None,
        }
    }
}

/// Fields of a plain text extension that precedes a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlainText {
    /// Text grid left position.
    pub grid_left: u16,
    /// Text grid top position.
    pub grid_top: u16,
    /// Text grid width in pixels.
    pub grid_width: u16,
    /// Text grid height in pixels.
    pub grid_height: u16,
    /// Character cell width.
    pub cell_width: u8,
    /// Character cell height.
    pub cell_height: u8,
    /// Foreground color index.
    pub foreground_color_index: u8,
    /// Background color index.
    pub background_color_index: u8,
    /// Concatenated text data.
    pub text: Vec<u8>,
}

/// Everything known about one frame: the image descriptor plus every extension block that
/// preceded it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// Offset from the left border of the logical screen.
    pub left: u16,
    /// Offset from the top border of the logical screen.
    pub top: u16,
    /// Frame width.
    pub width: u16,
    /// Frame height.
    pub height: u16,
    /// Rows are stored in the four-pass interlaced order.
    pub interlaced: bool,
    /// The local color table is sorted by importance.
    pub sort_flag: bool,
    /// Color table that overrides the global one for this frame.
    pub local_color_table: Option<ColorTable>,
    /// What to do with the frame after it has been shown.
    pub dispose: DisposalMethod,
    /// Wait for user input before continuing.
    pub needs_user_input: bool,
    /// Transparent color index, `Some` when the transparency flag is set.
    pub transparent: Option<u8>,
    /// Frame delay in units of 10 ms.
    pub delay: u16,
    /// Plain text extension fields.
    pub plain_text: Option<PlainText>,
    /// Comment extensions, in stream order.
    pub comments: Vec<Vec<u8>>,
    /// Application extensions, in stream order.
    pub application_extensions: Vec<ApplicationExtension>,
}

impl FrameDescriptor {
    /// Whether a graphic control extension is needed to carry this frame's fields.
    #[must_use]
    pub fn has_graphic_control(&self) -> bool {
        self.dispose != DisposalMethod::Any
            || self.needs_user_input
            || self.transparent.is_some()
            || self.delay != 0
    }

    /// The palette this frame's indices refer to and its transparency.
    ///
    /// The local table wins over `global`; with neither a gray ramp is used. A transparent
    /// index past the end of the palette is clamped to the last entry.
    #[must_use]
    pub fn color_model(&self, global: Option<&ColorTable>) -> ColorModel {
        let palette = self
            .local_color_table
            .as_ref()
            .or(global)
            .cloned()
            .unwrap_or_else(ColorTable::grayscale);
        ColorModel::new(palette, self.transparent)
    }
}

/// A palette plus an optional transparent entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorModel {
    palette: ColorTable,
    transparent: Option<u8>,
}

impl ColorModel {
    /// Builds a model, clamping an erroneous transparent index to the last palette entry.
    #[must_use]
    pub fn new(palette: ColorTable, transparent: Option<u8>) -> Self {
        let last = (palette.len() - 1) as u8;
        let transparent = transparent.map(|idx| idx.min(last));
        Self {
            palette,
            transparent,
        }
    }

    /// The palette.
    #[must_use]
    pub fn palette(&self) -> &ColorTable {
        &self.palette
    }

    /// The effective transparent index.
    #[must_use]
    pub fn transparent(&self) -> Option<u8> {
        self.transparent
    }

    /// RGBA value of `index`. Indices past the palette map to opaque black.
    #[must_use]
    pub fn rgba(&self, index: u8) -> [u8; 4] {
        let [r, g, b] = self.palette.get(index).unwrap_or([0, 0, 0]);
        let a = if self.transparent == Some(index) { 0 } else { 0xFF };
        [r, g, b, a]
    }

    /// Expands a run of indices into RGBA bytes.
    #[must_use]
    pub fn expand_rgba(&self, indices: &[u8]) -> Vec<u8> {
        indices.iter().flat_map(|&idx| self.rgba(idx)).collect()
    }
}

/// A rectangle inside a frame, in frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// Left column.
    pub left: u16,
    /// Top row.
    pub top: u16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

impl Region {
    /// Intersects the region with a `width` x `height` raster. Returns `None` when empty.
    pub(crate) fn clip(self, width: u16, height: u16) -> Option<Self> {
        let right = (u32::from(self.left) + u32::from(self.width)).min(u32::from(width));
        let bottom = (u32::from(self.top) + u32::from(self.height)).min(u32::from(height));
        if u32::from(self.left) >= right || u32::from(self.top) >= bottom {
            return None;
        }
        Some(Self {
            left: self.left,
            top: self.top,
            width: (right - u32::from(self.left)) as u16,
            height: (bottom - u32::from(self.top)) as u16,
        })
    }
}

/// Cooperative cancellation flag shared between a decoder or encoder and other threads.
///
/// Frame loops poll the flag once per row. A frame interrupted this way reports
/// [`FrameOutcome::Aborted`]; it is not an error.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Creates a handle that is not yet aborted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the running frame operation to stop.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether an abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// How far a frame decode or encode got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Every row was processed.
    Complete,
    /// The abort flag was seen after `rows` rows.
    Aborted {
        /// Rows processed before stopping.
        rows: u32,
    },
}

impl FrameOutcome {
    /// Whether the frame was processed in full.
    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

#[test]
fn test_flag_size() {
    #[rustfmt::skip]
    fn expected(size: usize) -> u8 {
        match size {
            0  ..=2   => 0,
            3  ..=4   => 1,
            5  ..=8   => 2,
            9  ..=16  => 3,
            17 ..=32  => 4,
            33 ..=64  => 5,
            65 ..=128 => 6,
            129..=256 => 7,
            _ => 7
        }
    }

    for i in 0..300 {
        assert_eq!(flag_size(i), expected(i));
    }
}

#[test]
fn color_table_pads_to_power_of_two() {
    let table = ColorTable::from_rgb(&[255, 0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table.get(2), Some([0, 0, 255]));
    assert_eq!(table.get(3), Some([0, 0, 0]));
    assert_eq!(table.get(4), None);
    assert_eq!(table.size_exponent(), 1);

    let single = ColorTable::from_colors(&[[1, 2, 3]]).unwrap();
    assert_eq!(single.len(), 2);

    let too_many = vec![0u8; 257 * 3];
    assert!(ColorTable::from_rgb(&too_many).is_err());
}

#[test]
fn transparent_index_is_clamped_to_palette() {
    let palette = ColorTable::from_colors(&[[0; 3], [1; 3], [2; 3], [3; 3]]).unwrap();
    let frame = FrameDescriptor {
        transparent: Some(5),
        local_color_table: Some(palette),
        ..FrameDescriptor::default()
    };
    let model = frame.color_model(None);
    assert_eq!(model.transparent(), Some(3));
    assert_eq!(model.rgba(3), [3, 3, 3, 0]);
    assert_eq!(model.rgba(1), [1, 1, 1, 0xFF]);
}

#[test]
fn netscape_loop_block() {
    let ext = ApplicationExtension::looping(Repeat::Finite(3));
    assert_eq!(ext.data, [1, 3, 0]);
    assert_eq!(ext.repeat(), Some(Repeat::Finite(3)));
    assert_eq!(
        ApplicationExtension::looping(Repeat::Infinite).repeat(),
        Some(Repeat::Infinite)
    );
}

#[test]
fn region_clipping() {
    let r = Region { left: 2, top: 1, width: 10, height: 10 };
    assert_eq!(r.clip(5, 4), Some(Region { left: 2, top: 1, width: 3, height: 3 }));
    assert_eq!(r.clip(2, 4), None);
}
