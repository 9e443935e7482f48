#![forbid(unsafe_code)]
//! # Streaming GIF en- and decoding
//!
//! This library reads and writes the GIF container format (`GIF87a` and `GIF89a`) one frame
//! at a time, with its own variable code width LZW implementation.
//!
//! ## no_std support
//!
//! This crate supports `no_std` environments with an allocator. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! gifstream = { version = "0.1", default-features = false }
//! ```
//!
//! In `no_std` mode, the crate provides its own `Read` and `Write` traits in the
//! `gifstream::io` module. Implement these traits for your I/O types.
//!
//! ## Pixel buffers
//!
//! Frames are decoded into, and encoded from, anything implementing
//! [`IndexedRasterMut`] or [`IndexedRaster`]. [`IndexedImage`] is a ready-made implementation.
//!
//! ### Decoding GIF files
//!
#![cfg_attr(feature = "std", doc = "```rust")]
#![cfg_attr(not(feature = "std"), doc = "```rust,ignore")]
//! let data: &[u8] = &[
//!     0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00,
//!     0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
//!     0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
//! ];
//! let mut decoder = gifstream::DecodeOptions::new().read_info(data).unwrap();
//! while let Some(frame) = decoder.read_next_image().unwrap() {
//!     let model = frame.descriptor.color_model(decoder.header().global_color_table.as_ref());
//!     let rgba = model.expand_rgba(frame.image.pixels());
//!     assert_eq!(rgba, [0xFF, 0, 0, 0xFF]);
//! }
//! ```
//!
//! Only part of a frame can be decoded, and it can be subsampled on the way:
//!
#![cfg_attr(feature = "std", doc = "```rust")]
#![cfg_attr(not(feature = "std"), doc = "```rust,ignore")]
//! # fn thumbnail(file: std::fs::File) -> Result<(), gifstream::DecodingError> {
//! use gifstream::{Decoder, ReadParams};
//! let mut decoder = Decoder::new(std::io::BufReader::new(file))?;
//! let params = ReadParams { x_subsampling: 4, y_subsampling: 4, ..ReadParams::default() };
//! let first = decoder.read_next_image_with(&params, &mut ())?;
//! # Ok(()) }
//! ```
//!
//! ### Encoding GIF files
//!
#![cfg_attr(feature = "std", doc = "```rust")]
#![cfg_attr(not(feature = "std"), doc = "```rust,ignore")]
//! use gifstream::{ColorTable, Encoder, FrameDescriptor, IndexedImage, Repeat, StreamHeader, WriteParams};
//!
//! let palette = ColorTable::from_rgb(&[0xFF, 0xFF, 0xFF, 0, 0, 0]).unwrap();
//! let (width, height) = (6, 6);
//! let beacon_states = [[
//!     0, 0, 0, 0, 0, 0,
//!     0, 1, 1, 0, 0, 0,
//!     0, 1, 1, 0, 0, 0,
//!     0, 0, 0, 1, 1, 0,
//!     0, 0, 0, 1, 1, 0,
//!     0, 0, 0, 0, 0, 0,
//! ], [
//!     0, 0, 0, 0, 0, 0,
//!     0, 1, 1, 0, 0, 0,
//!     0, 1, 0, 0, 0, 0,
//!     0, 0, 0, 0, 1, 0,
//!     0, 0, 0, 1, 1, 0,
//!     0, 0, 0, 0, 0, 0,
//! ]];
//! let header = StreamHeader::new(width, height, Some(palette.clone()));
//! let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
//! encoder.set_repeat(Repeat::Infinite).unwrap();
//! for state in &beacon_states {
//!     let image = IndexedImage::from_pixels(6, 6, state.to_vec(), palette.clone()).unwrap();
//!     let frame = FrameDescriptor { delay: 50, ..FrameDescriptor::default() };
//!     encoder.write_frame(&frame, &image, &WriteParams::default()).unwrap();
//! }
//! let bytes = encoder.into_inner().unwrap();
//! ```
//!
//! [`Encoder::write_truecolor_frame`] reduces RGB and RGBA pixels to a palette of at most 256
//! colors first; it needs the `color_quant` feature.
#![deny(missing_docs)]
#![allow(unknown_lints)] // Certain lints only apply to later versions of Rust
#![allow(clippy::manual_range_contains)]
#![allow(clippy::new_without_default)]
#![deny(clippy::alloc_instead_of_core)]
#![deny(clippy::std_instead_of_alloc)]
#![deny(clippy::std_instead_of_core)]
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod common;
mod encoder;
mod interlace;
/// I/O traits and types for no_std support.
pub mod io;
pub mod lzw;
#[cfg(feature = "color_quant")]
mod quantize;
mod raster;
mod reader;
mod subblock;
mod traits;

pub use crate::common::{
    AbortHandle, AnyExtension, ApplicationExtension, Block, ColorModel, ColorTable,
    DisposalMethod, Extension, FrameDescriptor, FrameOutcome, PlainText, Region, Repeat,
    StreamHeader, Version,
};

pub use crate::reader::{
    DecodeListener, DecodeOptions, DecodeWarning, DecodedFrame, Decoder, MemoryLimit, ReadParams,
};
pub use crate::reader::{DecodingError, DecodingFormatError};

pub use crate::encoder::{
    EncodeListener, Encoder, EncodingError, EncodingFormatError, WriteParams,
};

pub use crate::interlace::{RowOrder, RowStep, PASSES as INTERLACE_PASSES};
pub use crate::raster::{IndexedImage, IndexedRaster, IndexedRasterMut, TrueColorImage};
