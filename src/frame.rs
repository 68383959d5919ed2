use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel formats the sensor can be configured to deliver.
///
/// Both are single-channel, one byte per pixel; the Bayer variant carries a
/// color mosaic that is demosaiced after capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorFormat {
    /// 8-bit monochrome
    Mono8,
    /// 8-bit Bayer mosaic, BG-start pattern
    BayerBG8,
}

impl SensorFormat {
    /// Name of the format in the device's parameter namespace.
    pub fn as_param_str(&self) -> &'static str {
        match self {
            SensorFormat::Mono8 => "Mono8",
            SensorFormat::BayerBG8 => "BayerBG8",
        }
    }

    pub fn from_param_str(s: &str) -> Option<Self> {
        match s {
            "Mono8" => Some(SensorFormat::Mono8),
            "BayerBG8" => Some(SensorFormat::BayerBG8),
            _ => None,
        }
    }

    /// Bytes per pixel on the wire
    pub fn bytes_per_pixel(&self) -> usize {
        1
    }
}

/// Canonical image formats published on the output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Single-channel 8-bit grayscale
    Gray8,
    /// Interleaved 8-bit red/green/blue
    Rgb8,
    /// Interleaved 8-bit blue/green/red
    Bgr8,
}

impl ImageFormat {
    /// Number of interleaved channels per pixel.
    pub fn channels(&self) -> usize {
        match self {
            ImageFormat::Gray8 => 1,
            ImageFormat::Rgb8 | ImageFormat::Bgr8 => 3,
        }
    }
}

/// One captured sensor buffer plus its metadata.
///
/// Owned by the acquisition loop for a single iteration; converted and
/// published (or discarded) before the next grab is retrieved, never retained
/// across iterations.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Device-assigned sequence number
    pub sequence: u64,
    /// Capture timestamp
    pub timestamp: SystemTime,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Sensor pixel format of `data`
    pub format: SensorFormat,
    /// Raw buffer (shared ownership for cheap hand-off)
    pub data: Arc<Vec<u8>>,
}

impl RawFrame {
    pub fn new(
        sequence: u64,
        timestamp: SystemTime,
        width: u32,
        height: u32,
        format: SensorFormat,
        data: Vec<u8>,
    ) -> Self {
        Self {
            sequence,
            timestamp,
            width,
            height,
            format,
            data: Arc::new(data),
        }
    }

    /// Expected buffer size for the frame's dimensions and format.
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate the buffer length against the frame dimensions.
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }
}

/// A converted image ready for publication on the output channel.
///
/// Transient: one per successful grab, dropped once every subscriber has
/// released its copy.
#[derive(Debug, Clone)]
pub struct ConvertedImage {
    /// Sequence number carried over from the source frame
    pub sequence: u64,
    /// Capture timestamp carried over from the source frame
    pub timestamp: SystemTime,
    /// Canonical pixel format of `data`
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Pixel data, `width * height * channels` bytes
    pub data: Arc<Vec<u8>>,
}

impl ConvertedImage {
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }

    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }
}
