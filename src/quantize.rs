//! Palette reduction for true color frames.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use color_quant::NeuQuant;

use crate::common::ColorTable;
use crate::encoder::{EncodingError, EncodingFormatError};
use crate::raster::{IndexedImage, TrueColorImage};

/// A true color image mapped onto a palette.
pub(crate) struct Quantized {
    pub image: IndexedImage,
    /// Palette entry shared by all fully transparent pixels.
    pub transparent: Option<u8>,
}

/// Maps `image` onto at most 256 palette entries.
///
/// Images with few enough distinct colors keep them exactly. Otherwise NeuQuant picks the
/// palette, sampling every `speed`-th pixel. One entry is reserved for transparency when any
/// pixel has an alpha of zero.
pub(crate) fn quantize(
    image: &TrueColorImage<'_>,
    speed: i32,
) -> Result<Quantized, EncodingError> {
    if !(1..=30).contains(&speed) {
        return Err(EncodingFormatError::InvalidQuantizerSpeed.into());
    }
    let channels = usize::from(image.channels);
    if channels != 3 && channels != 4 {
        return Err(EncodingFormatError::UnsupportedFrameShape.into());
    }
    let len = usize::from(image.width) * usize::from(image.height);
    let samples = image
        .pixels
        .get(..len * channels)
        .ok_or(EncodingError::FrameBufferTooSmallForDimensions)?;
    let is_clear = |px: &[u8]| channels == 4 && px[3] == 0;

    let mut colors = BTreeMap::new();
    let mut has_transparent = false;
    for px in samples.chunks_exact(channels) {
        if is_clear(px) {
            has_transparent = true;
        } else {
            colors.insert([px[0], px[1], px[2]], 0u8);
        }
    }
    let opaque_slots = ColorTable::MAX_ENTRIES - usize::from(has_transparent);

    let (rgb, indices, transparent) = if colors.len() <= opaque_slots {
        let mut rgb = Vec::with_capacity(colors.len() * 3);
        for (i, (color, index)) in colors.iter_mut().enumerate() {
            *index = i as u8;
            rgb.extend_from_slice(color);
        }
        let transparent = has_transparent.then_some(colors.len() as u8);
        if has_transparent {
            rgb.extend_from_slice(&[0, 0, 0]);
        }
        let indices = samples
            .chunks_exact(channels)
            .map(|px| match transparent {
                Some(t) if is_clear(px) => t,
                _ => colors[&[px[0], px[1], px[2]]],
            })
            .collect();
        (rgb, indices, transparent)
    } else {
        log::debug!(
            "{} colors, reducing to {opaque_slots} with NeuQuant",
            colors.len()
        );
        let rgba: Vec<u8> = samples
            .chunks_exact(channels)
            .flat_map(|px| [px[0], px[1], px[2], 0xFF])
            .collect();
        let nq = NeuQuant::new(speed, opaque_slots, &rgba);
        let mut rgb = nq.color_map_rgb();
        let transparent = has_transparent.then_some(opaque_slots as u8);
        if has_transparent {
            rgb.extend_from_slice(&[0, 0, 0]);
        }
        let indices = samples
            .chunks_exact(channels)
            .zip(rgba.chunks_exact(4))
            .map(|(px, opaque)| match transparent {
                Some(t) if is_clear(px) => t,
                _ => nq.index_of(opaque) as u8,
            })
            .collect();
        (rgb, indices, transparent)
    };

    let palette = ColorTable::from_rgb(&rgb)?;
    let image = IndexedImage::from_pixels(
        u32::from(image.width),
        u32::from(image.height),
        indices,
        palette,
    )
    .ok_or(EncodingError::FrameBufferTooSmallForDimensions)?;
    Ok(Quantized { image, transparent })
}
