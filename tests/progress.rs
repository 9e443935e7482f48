use gifstream::{
    ColorTable, DecodeListener, Decoder, EncodeListener, Encoder, FrameDescriptor, IndexedImage,
    ReadParams, StreamHeader, WriteParams,
};

#[derive(Default)]
struct Percentages(Vec<f32>);

impl DecodeListener for Percentages {
    fn progress(&mut self, percent: f32) {
        self.0.push(percent);
    }
}

impl EncodeListener for Percentages {
    fn progress(&mut self, percent: f32) {
        self.0.push(percent);
    }
}

/// Encodes and decodes a 5 pixel wide frame, returning the reported percentages of both.
fn frame_progress(height: u16, interlaced: bool) -> (Vec<f32>, Vec<f32>) {
    let table = ColorTable::from_colors(&[[0; 3], [1; 3], [2; 3], [3; 3]]).unwrap();
    let pixels = (0..u32::from(height) * 5).map(|i| (i % 4) as u8).collect();
    let image = IndexedImage::from_pixels(5, u32::from(height), pixels, table.clone()).unwrap();
    let header = StreamHeader::new(5, height, Some(table));
    let descriptor = FrameDescriptor {
        interlaced,
        ..FrameDescriptor::default()
    };

    let mut encoded = Percentages::default();
    let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
    let outcome = encoder
        .write_frame_with(&descriptor, &image, &WriteParams::default(), &mut encoded)
        .unwrap();
    assert!(outcome.is_complete());
    let data = encoder.into_inner().unwrap();

    let mut decoded = Percentages::default();
    let mut decoder = Decoder::new(&data[..]).unwrap();
    let frame = decoder
        .read_next_image_with(&ReadParams::default(), &mut decoded)
        .unwrap()
        .unwrap();
    assert!(frame.outcome.is_complete());
    assert_eq!(frame.descriptor.interlaced, interlaced);
    assert_eq!(frame.image, image);
    (encoded.0, decoded.0)
}

fn assert_rows_reported(percentages: &[f32], height: u16) {
    let expected: Vec<f32> = (1..=height)
        .map(|k| f32::from(k) / f32::from(height) * 100.0)
        .collect();
    assert_eq!(percentages, expected);
    assert!(percentages.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(percentages.last(), Some(&100.0));
}

#[test]
fn progressive_frames_report_each_row() {
    for height in [1, 2, 7, 16] {
        let (encoded, decoded) = frame_progress(height, false);
        assert_rows_reported(&encoded, height);
        assert_rows_reported(&decoded, height);
    }
}

#[test]
fn interlaced_frames_count_rows_in_stream_order() {
    for height in [1, 5, 8, 13] {
        let (encoded, decoded) = frame_progress(height, true);
        assert_rows_reported(&encoded, height);
        assert_rows_reported(&decoded, height);
    }
}

#[test]
fn empty_frames_report_completion() {
    let (encoded, decoded) = frame_progress(0, false);
    assert_eq!(encoded, [100.0]);
    assert_eq!(decoded, [100.0]);
}
