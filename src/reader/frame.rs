//! Turns the LZW output of one frame into rows of the destination raster.

use alloc::vec::Vec;

use super::parser::warn;
use super::{DecodeListener, DecodeWarning, DecodingError, ReadParams};
use crate::common::{AbortHandle, FrameDescriptor, FrameOutcome, Region};
use crate::interlace::{RowOrder, RowStep, PASSES};
use crate::io::Read;
use crate::lzw::{BitReader, LzwDecoder};
use crate::raster::IndexedRasterMut;
use crate::subblock::SubBlockReader;

/// Everything that stays fixed while one frame is decoded.
pub(super) struct FrameJob<'a> {
    pub descriptor: &'a FrameDescriptor,
    pub min_code_size: u8,
    pub params: &'a ReadParams,
    pub abort: &'a AbortHandle,
}

/// Maps frame rows and columns to destination coordinates.
struct Placement {
    region: Option<Region>,
    x_step: usize,
    y_step: u16,
    dest_left: u32,
    dest_top: u32,
}

impl Placement {
    fn new(frame: &FrameDescriptor, params: &ReadParams) -> Self {
        Self {
            region: params.clipped_region(frame),
            x_step: usize::from(params.x_subsampling.max(1)),
            y_step: params.y_subsampling.max(1),
            dest_left: params.dest_left,
            dest_top: params.dest_top,
        }
    }

    /// Destination row of frame row `y`, if it is selected.
    fn dest_row(&self, y: u16) -> Option<u32> {
        let region = self.region?;
        let dy = y.checked_sub(region.top)?;
        if dy >= region.height || dy % self.y_step != 0 {
            return None;
        }
        Some(self.dest_top + u32::from(dy / self.y_step))
    }

    /// Stores the selected columns of `row` into destination row `dest_y`.
    fn store<S: IndexedRasterMut + ?Sized>(&self, row: &[u8], dest_y: u32, sink: &mut S) {
        let Some(region) = self.region else { return };
        if dest_y >= sink.height() || self.dest_left >= sink.width() {
            return;
        }
        let left = usize::from(region.left);
        let src = &row[left..left + usize::from(region.width)];
        let room = (sink.width() - self.dest_left) as usize;
        if self.x_step == 1 {
            let n = src.len().min(room);
            let dest_left = self.dest_left as usize;
            if let Some(dst) = sink.row_mut(dest_y) {
                dst[dest_left..dest_left + n].copy_from_slice(&src[..n]);
                return;
            }
            for (x, &index) in (self.dest_left..).zip(&src[..n]) {
                sink.set_index(x, dest_y, index);
            }
        } else {
            for (x, &index) in (self.dest_left..)
                .zip(src.iter().step_by(self.x_step))
                .take(room)
            {
                sink.set_index(x, dest_y, index);
            }
        }
    }
}

fn row_step(interlaced: bool, pass: u8) -> u16 {
    if interlaced {
        PASSES[usize::from(pass)].1
    } else {
        1
    }
}

/// Decodes the image data following `job.descriptor` into `sink`.
///
/// The reader is left after the frame's block terminator, whether the frame completed or was
/// aborted.
pub(super) fn decode_frame<R, S, L>(
    reader: &mut R,
    job: &FrameJob<'_>,
    sink: &mut S,
    listener: &mut L,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<FrameOutcome, DecodingError>
where
    R: Read + ?Sized,
    S: IndexedRasterMut + ?Sized,
    L: DecodeListener + ?Sized,
{
    let frame = job.descriptor;
    let width = usize::from(frame.width);
    let height = u32::from(frame.height);
    let mut data = SubBlockReader::new(reader);
    if width == 0 || height == 0 {
        data.drain()?;
        listener.progress(100.0);
        return Ok(FrameOutcome::Complete);
    }

    let placement = Placement::new(frame, job.params);
    let mut lzw = LzwDecoder::new(job.min_code_size);
    let mut row = vec![0u8; width];
    let mut x = 0;
    let mut rows_done = 0u32;
    let mut aborted = false;
    let mut order = RowOrder::new(frame.height, frame.interlaced);
    let mut current = order.next();
    if let Some(step) = current {
        listener.pass_started(step.pass, step.row, row_step(frame.interlaced, step.pass));
    }

    {
        let mut bits = BitReader::new(&mut data);
        'decode: while let Some(mut run) = lzw.next_run(&mut bits)? {
            while !run.is_empty() {
                let Some(step) = current else {
                    // Codes past the last row are ignored.
                    break 'decode;
                };
                let n = (width - x).min(run.len());
                row[x..x + n].copy_from_slice(&run[..n]);
                x += n;
                run = &run[n..];
                if x < width {
                    continue;
                }

                x = 0;
                rows_done += 1;
                let dest_row = placement.dest_row(step.row);
                if let Some(dest_y) = dest_row {
                    placement.store(&row, dest_y, sink);
                }
                listener.row_completed(step.row, dest_row);
                listener.progress(rows_done as f32 / height as f32 * 100.0);

                current = order.next();
                finish_pass(step, current, frame.interlaced, listener);
                if job.abort.is_aborted() {
                    aborted = true;
                    break 'decode;
                }
            }
            if current.is_none() {
                break;
            }
        }
    }

    for warning in lzw.take_warnings() {
        listener.warning(&warning);
        warnings.push(warning);
    }
    data.drain()?;

    if aborted {
        log::debug!("frame decode aborted after {rows_done} rows");
        return Ok(FrameOutcome::Aborted { rows: rows_done });
    }
    if rows_done < height {
        let warning = DecodeWarning::MissingRows {
            decoded: rows_done,
            expected: height,
        };
        listener.warning(&warning);
        warn(warnings, warning);
    }
    Ok(FrameOutcome::Complete)
}

fn finish_pass<L: DecodeListener + ?Sized>(
    step: RowStep,
    next: Option<RowStep>,
    interlaced: bool,
    listener: &mut L,
) {
    match next {
        Some(next) if next.pass == step.pass => {}
        Some(next) => {
            listener.pass_completed(step.pass);
            listener.pass_started(next.pass, next.row, row_step(interlaced, next.pass));
        }
        None => listener.pass_completed(step.pass),
    }
}
