//! Block level parsing: the header, extension blocks and image descriptors.

use alloc::vec::Vec;

use super::{DecodeWarning, DecodingError, DecodingFormatError};
use crate::common::{
    AnyExtension, ApplicationExtension, Block, ColorTable, DisposalMethod, Extension,
    FrameDescriptor, PlainText, StreamHeader, Version,
};
use crate::io::Read;
use crate::lzw::effective_min_code_size;
use crate::subblock::SubBlockReader;
use crate::traits::ReadBytesExt;

const GRAPHIC_CONTROL_LEN: usize = 4;
const PLAIN_TEXT_LEN: usize = 12;
const APPLICATION_LEN: usize = 11;

/// What [`ContainerParser::scan`] stopped at.
pub(crate) enum Scan {
    /// An image descriptor; the reader is positioned at its image data.
    Frame(FrameDescriptor),
    /// The trailer, or whatever the parser accepts in its place.
    End,
}

/// Walks the block structure of a stream.
///
/// Extension blocks are folded into the descriptor of the frame that follows them.
pub(crate) struct ContainerParser {
    strict_block_types: bool,
    /// Fields collected from extensions since the last image descriptor.
    pending: FrameDescriptor,
    has_pending: bool,
    /// Effective LZW minimum code size of the located frame.
    code_size: u8,
    ended: bool,
}

pub(super) fn warn(warnings: &mut Vec<DecodeWarning>, warning: DecodeWarning) {
    log::warn!("{warning}");
    warnings.push(warning);
}

impl ContainerParser {
    pub fn new(strict_block_types: bool) -> Self {
        Self {
            strict_block_types,
            pending: FrameDescriptor::default(),
            has_pending: false,
            code_size: 2,
            ended: false,
        }
    }

    pub fn image_data_code_size(&self) -> u8 {
        self.code_size
    }

    /// Reads the signature, the logical screen descriptor and the global color table.
    pub fn read_header<R: Read + ?Sized>(
        &self,
        r: &mut R,
    ) -> Result<StreamHeader, DecodingError> {
        let mut signature = [0; 6];
        r.read_exact_gif(&mut signature)?;
        let version = Version::from_signature(&signature)
            .ok_or(DecodingFormatError::InvalidSignature)?;
        let width = r.read_le_u16()?;
        let height = r.read_le_u16()?;
        let flags = r.read_u8()?;
        let background_color_index = r.read_u8()?;
        let pixel_aspect_ratio = r.read_u8()?;
        let global_color_table = if flags & 0x80 != 0 {
            Some(read_color_table(r, flags & 0b111)?)
        } else {
            None
        };
        log::debug!(
            "{width}x{height} logical screen, global color table: {:?}",
            global_color_table.as_ref().map(ColorTable::len)
        );
        Ok(StreamHeader {
            version,
            width,
            height,
            color_resolution: ((flags >> 4) & 0b111) + 1,
            sort_flag: flags & 0x08 != 0,
            background_color_index,
            pixel_aspect_ratio,
            global_color_table,
        })
    }

    /// Reads blocks up to the next image descriptor or the end of the stream.
    pub fn scan<R: Read + ?Sized>(
        &mut self,
        r: &mut R,
        warnings: &mut Vec<DecodeWarning>,
    ) -> Result<Scan, DecodingError> {
        while !self.ended {
            let Some(tag) = r.read_u8_opt()? else {
                return Ok(self.end(warnings));
            };
            match Block::from_u8(tag) {
                Some(Block::Image) => return self.read_image_descriptor(r).map(Scan::Frame),
                Some(Block::Extension) => {
                    let label = r.read_u8()?;
                    self.read_extension(AnyExtension(label), r, warnings)?;
                    self.has_pending = true;
                }
                Some(Block::Trailer) => return Ok(self.end(warnings)),
                None if tag != 0 && self.strict_block_types => {
                    return Err(DecodingFormatError::UnexpectedBlockType(tag).into());
                }
                None => {
                    log::debug!("block type {tag:#04x} treated as the end of the stream");
                    return Ok(self.end(warnings));
                }
            }
        }
        Ok(Scan::End)
    }

    fn end(&mut self, warnings: &mut Vec<DecodeWarning>) -> Scan {
        self.ended = true;
        if core::mem::take(&mut self.has_pending) {
            warn(warnings, DecodeWarning::ExtensionsWithoutFrame);
        }
        Scan::End
    }

    /// Skips the image data of the located frame.
    pub fn skip_image_data<R: Read + ?Sized>(&self, r: &mut R) -> Result<(), DecodingError> {
        SubBlockReader::new(r).drain()
    }

    fn read_image_descriptor<R: Read + ?Sized>(
        &mut self,
        r: &mut R,
    ) -> Result<FrameDescriptor, DecodingError> {
        let mut frame = core::mem::take(&mut self.pending);
        self.has_pending = false;
        frame.left = r.read_le_u16()?;
        frame.top = r.read_le_u16()?;
        frame.width = r.read_le_u16()?;
        frame.height = r.read_le_u16()?;
        let flags = r.read_u8()?;
        frame.interlaced = flags & 0x40 != 0;
        frame.sort_flag = flags & 0x20 != 0;
        if flags & 0x80 != 0 {
            frame.local_color_table = Some(read_color_table(r, flags & 0b111)?);
        }
        self.code_size = effective_min_code_size(r.read_u8()?)?;
        log::trace!(
            "frame {}x{} at ({}, {}), interlaced: {}",
            frame.width,
            frame.height,
            frame.left,
            frame.top,
            frame.interlaced
        );
        Ok(frame)
    }

    fn read_extension<R: Read + ?Sized>(
        &mut self,
        label: AnyExtension,
        r: &mut R,
        warnings: &mut Vec<DecodeWarning>,
    ) -> Result<(), DecodingError> {
        let mut blocks = SubBlockReader::new(r);
        match label.into_known() {
            Some(Extension::Control) => {
                let [flags, delay_lo, delay_hi, transparent] =
                    read_fixed::<GRAPHIC_CONTROL_LEN, R>(&mut blocks, label, warnings)?;
                self.pending.dispose = DisposalMethod::from_u8(flags >> 2);
                self.pending.needs_user_input = flags & 0b10 != 0;
                self.pending.transparent = (flags & 1 != 0).then_some(transparent);
                self.pending.delay = u16::from_le_bytes([delay_lo, delay_hi]);
                blocks.drain()
            }
            Some(Extension::Text) => {
                let h = read_fixed::<PLAIN_TEXT_LEN, R>(&mut blocks, label, warnings)?;
                let mut text = Vec::new();
                blocks.read_to_end(&mut text)?;
                self.pending.plain_text = Some(PlainText {
                    grid_left: u16::from_le_bytes([h[0], h[1]]),
                    grid_top: u16::from_le_bytes([h[2], h[3]]),
                    grid_width: u16::from_le_bytes([h[4], h[5]]),
                    grid_height: u16::from_le_bytes([h[6], h[7]]),
                    cell_width: h[8],
                    cell_height: h[9],
                    foreground_color_index: h[10],
                    background_color_index: h[11],
                    text,
                });
                Ok(())
            }
            Some(Extension::Comment) => {
                let mut comment = Vec::new();
                blocks.read_to_end(&mut comment)?;
                self.pending.comments.push(comment);
                Ok(())
            }
            Some(Extension::Application) => {
                let h = read_fixed::<APPLICATION_LEN, R>(&mut blocks, label, warnings)?;
                let mut identifier = [0; 8];
                let mut authentication_code = [0; 3];
                identifier.copy_from_slice(&h[..8]);
                authentication_code.copy_from_slice(&h[8..]);
                let mut data = Vec::new();
                blocks.read_to_end(&mut data)?;
                self.pending.application_extensions.push(ApplicationExtension {
                    identifier,
                    authentication_code,
                    data,
                });
                Ok(())
            }
            None => {
                log::debug!("skipping unknown extension {:#04x}", label.0);
                blocks.drain()
            }
        }
    }
}

fn read_color_table<R: Read + ?Sized>(r: &mut R, size: u8) -> Result<ColorTable, DecodingError> {
    let mut rgb = vec![0; 3 << (size + 1)];
    r.read_exact_gif(&mut rgb)?;
    Ok(ColorTable::from_wire(rgb))
}

/// Reads the fixed-size header that is the first sub-block of some extensions.
///
/// A header of the wrong size is zero padded or cut, with a warning.
fn read_fixed<const N: usize, R: Read + ?Sized>(
    blocks: &mut SubBlockReader<'_, R>,
    label: AnyExtension,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<[u8; N], DecodingError> {
    let mut header = [0; N];
    let found = match blocks.next_block()? {
        Some(block) => {
            let n = block.len().min(N);
            header[..n].copy_from_slice(&block[..n]);
            block.len()
        }
        None => 0,
    };
    if found != N {
        warn(
            warnings,
            DecodeWarning::ExtensionHeaderSize {
                label: label.0,
                expected: N as u8,
                found: found as u8,
            },
        );
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Repeat;

    const SCREEN: &[u8] = b"GIF89a\x02\x00\x01\x00\x00\x00\x00";

    fn parse(blocks: &[u8], strict: bool) -> (Result<Scan, DecodingError>, Vec<DecodeWarning>) {
        let mut input = SCREEN.to_vec();
        input.extend_from_slice(blocks);
        let mut src = &input[..];
        let mut parser = ContainerParser::new(strict);
        parser.read_header(&mut src).unwrap();
        let mut warnings = Vec::new();
        (parser.scan(&mut src, &mut warnings), warnings)
    }

    fn frame(blocks: &[u8]) -> FrameDescriptor {
        match parse(blocks, false).0 {
            Ok(Scan::Frame(frame)) => frame,
            _ => panic!("no frame"),
        }
    }

    const IMAGE: &[u8] = &[0x2C, 0, 0, 0, 0, 2, 0, 1, 0, 0, 2];

    #[test]
    fn header_fields() {
        let data = b"GIF87a\x0A\x00\x05\x00\xB1\x01\x31\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0A\x0B\x0C";
        let header = ContainerParser::new(false)
            .read_header(&mut &data[..])
            .unwrap();
        assert_eq!(header.version, Version::V87a);
        assert_eq!((header.width, header.height), (10, 5));
        assert_eq!(header.color_resolution, 4);
        assert!(!header.sort_flag);
        assert_eq!(header.background_color_index, 1);
        assert_eq!(header.pixel_aspect_ratio, 0x31);
        let table = header.global_color_table.unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(3), Some([10, 11, 12]));
    }

    #[test]
    fn graphic_control_fields() {
        let mut blocks = vec![0x21, 0xF9, 4, 0b0000_1011, 10, 0, 3, 0];
        blocks.extend_from_slice(IMAGE);
        let frame = frame(&blocks);
        assert_eq!(frame.dispose, DisposalMethod::Background);
        assert!(frame.needs_user_input);
        assert_eq!(frame.transparent, Some(3));
        assert_eq!(frame.delay, 10);
        assert_eq!((frame.width, frame.height), (2, 1));
    }

    #[test]
    fn comments_and_applications_accumulate() {
        let mut blocks = vec![0x21, 0xFE, 2, b'h', b'i', 1, b'!', 0];
        blocks.extend_from_slice(&[0x21, 0xFE, 0]);
        blocks.extend_from_slice(b"\x21\xFF\x0BNETSCAPE2.0\x03\x01\x05\x00\x00");
        blocks.extend_from_slice(IMAGE);
        let frame = frame(&blocks);
        assert_eq!(frame.comments, [b"hi!".to_vec(), Vec::new()]);
        assert_eq!(frame.application_extensions.len(), 1);
        assert_eq!(
            frame.application_extensions[0].repeat(),
            Some(Repeat::Finite(5))
        );
    }

    #[test]
    fn plain_text_fields() {
        let mut blocks = vec![0x21, 0x01, 12, 1, 0, 2, 0, 30, 0, 8, 0, 6, 8, 1, 0];
        blocks.extend_from_slice(&[3, b'a', b'b', b'c', 0]);
        blocks.extend_from_slice(IMAGE);
        let text = frame(&blocks).plain_text.unwrap();
        assert_eq!((text.grid_left, text.grid_top), (1, 2));
        assert_eq!((text.grid_width, text.grid_height), (30, 8));
        assert_eq!((text.cell_width, text.cell_height), (6, 8));
        assert_eq!(text.foreground_color_index, 1);
        assert_eq!(text.text, b"abc");
    }

    #[test]
    fn short_graphic_control_warns() {
        let mut blocks = vec![0x21, 0xF9, 2, 0b1, 7, 0];
        blocks.extend_from_slice(IMAGE);
        let (scan, warnings) = parse(&blocks, false);
        assert!(matches!(scan, Ok(Scan::Frame(f)) if f.delay == 7 && f.transparent == Some(0)));
        assert_eq!(
            warnings,
            [DecodeWarning::ExtensionHeaderSize {
                label: 0xF9,
                expected: 4,
                found: 2
            }]
        );
    }

    #[test]
    fn unknown_extension_is_skipped() {
        let mut blocks = vec![0x21, 0x99, 3, 1, 2, 3, 0];
        blocks.extend_from_slice(IMAGE);
        assert_eq!(frame(&blocks).width, 2);
    }

    #[test]
    fn unknown_block_type() {
        assert!(matches!(parse(&[0x42], false).0, Ok(Scan::End)));
        assert!(matches!(parse(&[0x00], true).0, Ok(Scan::End)));
        assert!(matches!(parse(&[], true).0, Ok(Scan::End)));
        assert!(matches!(
            parse(&[0x42], true).0,
            Err(DecodingError::Format(DecodingFormatError::UnexpectedBlockType(0x42)))
        ));
    }

    #[test]
    fn invalid_code_size() {
        let mut blocks = IMAGE.to_vec();
        *blocks.last_mut().unwrap() = 9;
        assert!(matches!(
            parse(&blocks, false).0,
            Err(DecodingError::Format(DecodingFormatError::InvalidCodeSize(9)))
        ));
    }

    #[test]
    fn dangling_extensions_warn() {
        let (scan, warnings) = parse(&[0x21, 0xFE, 1, b'x', 0, 0x3B], false);
        assert!(matches!(scan, Ok(Scan::End)));
        assert_eq!(warnings, [DecodeWarning::ExtensionsWithoutFrame]);
    }
}
