//! Sensor buffer to canonical image conversion.
//!
//! Grayscale output passes the single-channel buffer through untouched;
//! color output applies the one fixed transform the pipeline needs, a
//! bilinear demosaic of the BG-start Bayer mosaic.

use crate::config::OutputFormat;
use crate::frame::{ConvertedImage, ImageFormat, RawFrame};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    SizeMismatch {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
    },
}

/// Convert one captured frame into the configured output representation.
pub fn convert(frame: &RawFrame, output: OutputFormat) -> Result<ConvertedImage, ConvertError> {
    if !frame.validate_size() {
        return Err(ConvertError::SizeMismatch {
            expected: frame.expected_size(),
            actual: frame.data.len(),
            width: frame.width,
            height: frame.height,
        });
    }

    let (format, data) = match output {
        // Raw single-channel buffer goes through unchanged
        OutputFormat::GrayU8 => (ImageFormat::Gray8, Arc::clone(&frame.data)),
        OutputFormat::RgbU8 => (
            ImageFormat::Rgb8,
            Arc::new(demosaic_bayer_bg(
                &frame.data,
                frame.width,
                frame.height,
                ChannelOrder::Rgb,
            )),
        ),
        OutputFormat::BgrU8 => (
            ImageFormat::Bgr8,
            Arc::new(demosaic_bayer_bg(
                &frame.data,
                frame.width,
                frame.height,
                ChannelOrder::Bgr,
            )),
        ),
    };

    Ok(ConvertedImage {
        sequence: frame.sequence,
        timestamp: frame.timestamp,
        format,
        width: frame.width,
        height: frame.height,
        data,
    })
}

#[derive(Clone, Copy)]
enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Bilinear demosaic of a BG-start Bayer mosaic into interleaved 3-channel
/// output.
///
/// Pattern layout: even rows alternate B G, odd rows alternate G R. Missing
/// channels are averaged from the nearest same-color neighbors, with edge
/// coordinates clamped into the image.
fn demosaic_bayer_bg(mosaic: &[u8], width: u32, height: u32, order: ChannelOrder) -> Vec<u8> {
    let w = width as i64;
    let h = height as i64;
    let mut out = vec![0u8; (w * h * 3) as usize];

    let sample = |x: i64, y: i64| -> u32 {
        let cx = x.clamp(0, w - 1);
        let cy = y.clamp(0, h - 1);
        mosaic[(cy * w + cx) as usize] as u32
    };
    let cross = |x: i64, y: i64| -> u8 {
        ((sample(x - 1, y) + sample(x + 1, y) + sample(x, y - 1) + sample(x, y + 1)) / 4) as u8
    };
    let diagonal = |x: i64, y: i64| -> u8 {
        ((sample(x - 1, y - 1) + sample(x + 1, y - 1) + sample(x - 1, y + 1) + sample(x + 1, y + 1))
            / 4) as u8
    };
    let horizontal = |x: i64, y: i64| -> u8 { ((sample(x - 1, y) + sample(x + 1, y)) / 2) as u8 };
    let vertical = |x: i64, y: i64| -> u8 { ((sample(x, y - 1) + sample(x, y + 1)) / 2) as u8 };

    for y in 0..h {
        for x in 0..w {
            let own = sample(x, y) as u8;
            let (r, g, b) = match (y % 2 == 0, x % 2 == 0) {
                // Blue site
                (true, true) => (diagonal(x, y), cross(x, y), own),
                // Green site on a blue row
                (true, false) => (vertical(x, y), own, horizontal(x, y)),
                // Green site on a red row
                (false, true) => (horizontal(x, y), own, vertical(x, y)),
                // Red site
                (false, false) => (own, cross(x, y), diagonal(x, y)),
            };

            let i = ((y * w + x) * 3) as usize;
            match order {
                ChannelOrder::Rgb => {
                    out[i] = r;
                    out[i + 1] = g;
                    out[i + 2] = b;
                }
                ChannelOrder::Bgr => {
                    out[i] = b;
                    out[i + 1] = g;
                    out[i + 2] = r;
                }
            }
        }
    }

    out
}
