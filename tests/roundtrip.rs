use gifstream::{
    ApplicationExtension, ColorTable, DecodeWarning, Decoder, DisposalMethod, EncodeListener,
    Encoder, FrameDescriptor, FrameOutcome, IndexedImage, IndexedRaster, PlainText, Region,
    Repeat, StreamHeader, WriteParams,
};

fn next(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    *seed >> 8
}

fn palette(n: usize) -> ColorTable {
    let colors: Vec<[u8; 3]> = (0..n)
        .map(|i| [i as u8, (i * 3) as u8, 255 - i as u8])
        .collect();
    ColorTable::from_colors(&colors).unwrap()
}

fn random_image(width: u32, height: u32, palette: &ColorTable, mut seed: u32) -> IndexedImage {
    let colors = palette.len() as u32;
    let pixels = (0..width * height)
        .map(|_| (next(&mut seed) % colors) as u8)
        .collect();
    IndexedImage::from_pixels(width, height, pixels, palette.clone()).unwrap()
}

fn encode(header: &StreamHeader, frames: &[(FrameDescriptor, IndexedImage)]) -> Vec<u8> {
    let mut encoder = Encoder::new(Vec::new(), header).unwrap();
    for (descriptor, image) in frames {
        let outcome = encoder
            .write_frame(descriptor, image, &WriteParams::default())
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Complete);
    }
    encoder.into_inner().unwrap()
}

#[test]
fn frames_survive_round_trip() {
    let mut seed = 1;
    for interlaced in [false, true] {
        for &(width, height, colors) in &[
            (1, 1, 2),
            (7, 5, 4),
            (33, 17, 16),
            (64, 40, 256),
            (3, 100, 2),
            (300, 300, 256),
        ] {
            let global = palette(colors);
            let header = StreamHeader::new(width as u16, height as u16, Some(global.clone()));
            let image = random_image(width, height, &global, next(&mut seed));
            let descriptor = FrameDescriptor {
                left: 1,
                top: 2,
                width: width as u16,
                height: height as u16,
                interlaced,
                dispose: DisposalMethod::Previous,
                transparent: Some(1),
                delay: 7,
                comments: vec![b"made here".to_vec(), vec![b'x'; 600]],
                application_extensions: vec![ApplicationExtension {
                    identifier: *b"TESTAPPL",
                    authentication_code: *b"1.0",
                    data: vec![1, 2, 3],
                }],
                plain_text: Some(PlainText {
                    grid_width: 40,
                    grid_height: 8,
                    cell_width: 8,
                    cell_height: 8,
                    text: b"hello".to_vec(),
                    ..PlainText::default()
                }),
                ..FrameDescriptor::default()
            };
            let data = encode(&header, &[(descriptor.clone(), image.clone())]);

            let mut decoder = Decoder::new(&data[..]).unwrap();
            assert_eq!(decoder.header(), &header);
            let frame = decoder.read_next_image().unwrap().unwrap();
            assert_eq!(frame.outcome, FrameOutcome::Complete);
            assert_eq!(frame.descriptor, descriptor);
            assert_eq!(frame.image, image, "{width}x{height}, interlaced: {interlaced}");
            assert!(decoder.read_next_image().unwrap().is_none());
            assert!(decoder.take_warnings().is_empty());
        }
    }
}

#[test]
fn local_tables_and_loop_count() {
    let header = StreamHeader::new(8, 8, None);
    let first = random_image(8, 8, &palette(8), 3);
    let second = random_image(4, 2, &palette(64), 4);
    let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
    encoder.set_repeat(Repeat::Finite(3)).unwrap();
    let params = WriteParams::default();
    encoder
        .write_frame(&FrameDescriptor::default(), &first, &params)
        .unwrap();
    encoder
        .write_frame(&FrameDescriptor::default(), &second, &params)
        .unwrap();
    let data = encoder.into_inner().unwrap();

    let mut decoder = Decoder::new(&data[..]).unwrap();
    assert_eq!(decoder.header().global_color_table, None);
    let frame = decoder.read_next_image().unwrap().unwrap();
    assert_eq!(
        frame.descriptor.application_extensions,
        [ApplicationExtension::looping(Repeat::Finite(3))]
    );
    assert_eq!(frame.descriptor.local_color_table, Some(palette(8)));
    assert_eq!(frame.image, first);
    let frame = decoder.read_next_image().unwrap().unwrap();
    assert!(frame.descriptor.application_extensions.is_empty());
    assert_eq!(frame.image, second);
}

#[test]
fn encode_region_with_subsampling() {
    let table = palette(16);
    let header = StreamHeader::new(10, 10, Some(table.clone()));
    let source = random_image(10, 10, &table, 11);
    let params = WriteParams {
        region: Some(Region {
            left: 2,
            top: 1,
            width: 7,
            height: 8,
        }),
        x_subsampling: 3,
        y_subsampling: 2,
    };
    let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
    encoder
        .write_frame(&FrameDescriptor::default(), &source, &params)
        .unwrap();
    let data = encoder.into_inner().unwrap();

    let frame = Decoder::new(&data[..])
        .unwrap()
        .read_next_image()
        .unwrap()
        .unwrap();
    assert_eq!((frame.descriptor.width, frame.descriptor.height), (3, 4));
    for y in 0..4 {
        for x in 0..3 {
            assert_eq!(frame.image.index(x, y), source.index(2 + 3 * x, 1 + 2 * y));
        }
    }
}

struct AbortEarly(gifstream::AbortHandle);

impl EncodeListener for AbortEarly {
    fn progress(&mut self, _percent: f32) {
        self.0.abort();
    }
}

#[test]
fn aborted_encode_leaves_a_readable_stream() {
    let table = palette(4);
    let header = StreamHeader::new(5, 4, Some(table.clone()));
    let image = random_image(5, 4, &table, 5);
    let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
    let mut listener = AbortEarly(encoder.abort_handle());
    let outcome = encoder
        .write_frame_with(
            &FrameDescriptor::default(),
            &image,
            &WriteParams::default(),
            &mut listener,
        )
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Aborted { rows: 1 });
    // The next frame starts with a cleared flag.
    let outcome = encoder
        .write_frame(&FrameDescriptor::default(), &image, &WriteParams::default())
        .unwrap();
    assert!(outcome.is_complete());
    let data = encoder.into_inner().unwrap();

    let mut decoder = Decoder::new(&data[..]).unwrap();
    let partial = decoder.read_next_image().unwrap().unwrap();
    assert_eq!(partial.image.row(0), image.row(0));
    assert_eq!(
        decoder.take_warnings(),
        [DecodeWarning::MissingRows {
            decoded: 1,
            expected: 4
        }]
    );
    let full = decoder.read_next_image().unwrap().unwrap();
    assert_eq!(full.image, image);
}

#[cfg(feature = "color_quant")]
#[test]
fn truecolor_frames_are_reduced() {
    use gifstream::TrueColorImage;

    let colors = [[200u8, 10, 10, 255], [10, 200, 10, 255], [0, 0, 0, 0]];
    let pixels: Vec<u8> = (0..6 * 3).flat_map(|i| colors[i % 3]).collect();
    let image = TrueColorImage {
        width: 6,
        height: 3,
        channels: 4,
        pixels: &pixels,
    };
    let header = StreamHeader::new(6, 3, None);
    let mut encoder = Encoder::new(Vec::new(), &header).unwrap();
    encoder
        .write_truecolor_frame(&FrameDescriptor::default(), &image, &WriteParams::default(), 10)
        .unwrap();
    let data = encoder.into_inner().unwrap();

    let mut decoder = Decoder::new(&data[..]).unwrap();
    let frame = decoder.read_next_image().unwrap().unwrap();
    let model = frame.descriptor.color_model(None);
    assert!(model.transparent().is_some());
    let rgba = model.expand_rgba(frame.image.pixels());
    for (decoded, original) in rgba.chunks_exact(4).zip(pixels.chunks_exact(4)) {
        if original[3] == 0 {
            assert_eq!(decoded[3], 0);
        } else {
            assert_eq!(decoded, original);
        }
    }
}
