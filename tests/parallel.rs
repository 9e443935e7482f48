//! Independent encoder and decoder sessions on many threads at once.

use gifstream::{
    ColorTable, Decoder, Encoder, FrameDescriptor, IndexedImage, StreamHeader, WriteParams,
};
use rayon::prelude::*;

fn image(seed: u32) -> IndexedImage {
    let colors: Vec<[u8; 3]> = (0..32u8).map(|i| [i, i ^ 0x55, seed as u8]).collect();
    let palette = ColorTable::from_colors(&colors).unwrap();
    let mut state = seed;
    let pixels = (0..97 * 61)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8 % 32
        })
        .collect();
    IndexedImage::from_pixels(97, 61, pixels, palette).unwrap()
}

fn encode(image: &IndexedImage, interlaced: bool) -> Vec<u8> {
    let header = StreamHeader::new(97, 61, None);
    let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
    let descriptor = FrameDescriptor {
        interlaced,
        ..FrameDescriptor::default()
    };
    encoder
        .write_frame(&descriptor, image, &WriteParams::default())
        .unwrap();
    encoder.into_inner().unwrap()
}

#[test]
fn sessions_do_not_interfere() {
    let images: Vec<IndexedImage> = (0..32).map(image).collect();
    let encoded: Vec<Vec<u8>> = images
        .par_iter()
        .enumerate()
        .map(|(i, image)| encode(image, i % 2 == 0))
        .collect();
    for (i, data) in encoded.iter().enumerate() {
        assert_eq!(data, &encode(&images[i], i % 2 == 0));
    }

    let decoded: Vec<IndexedImage> = encoded
        .par_iter()
        .map(|data| {
            let mut decoder = Decoder::new(&data[..]).unwrap();
            decoder.read_next_image().unwrap().unwrap().image
        })
        .collect();
    assert_eq!(decoded, images);
}
