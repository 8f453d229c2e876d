//! Screen regions, raw captures and normalized frames

use serde::{Deserialize, Serialize};

/// On-screen rectangle holding the emulator output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            left: 6,
            top: 71,
            width: 705,
            height: 456,
        }
    }
}

/// Byte order of a captured pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Blue, green, red, alpha (native screen grabs on most platforms)
    Bgra,
    /// Red, green, blue, alpha
    Rgba,
}

/// A captured screen region, 4 bytes per pixel
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl RawImage {
    /// Wrap a pixel buffer, checking it holds `width * height` pixels.
    /// Empty images are rejected.
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// RGB triple of the pixel at (x, y)
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[i..i + 4];
        match self.layout {
            PixelLayout::Bgra => [px[2], px[1], px[0]],
            PixelLayout::Rgba => [px[0], px[1], px[2]],
        }
    }
}

/// Downsampled frame as a flat, row-major, channel-interleaved vector.
///
/// Every value lies in [0.0, 1.0] and `data.len() == width * height * channels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// 3 for RGB, 1 for grayscale
    pub channels: u32,
    pub data: Vec<f32>,
}

impl Frame {
    /// Shape as reported to the agent: `[height, width, channels]`
    pub fn shape(&self) -> [u32; 3] {
        [self.height, self.width, self.channels]
    }

    /// Number of values a frame of this size carries
    pub fn value_count(width: u32, height: u32, grayscale: bool) -> usize {
        width as usize * height as usize * if grayscale { 1 } else { 3 }
    }

    /// Back to 8-bit samples, for saving previews
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_image_rejects_short_buffer() {
        assert!(RawImage::new(2, 2, PixelLayout::Rgba, vec![0; 15]).is_none());
        assert!(RawImage::new(2, 2, PixelLayout::Rgba, vec![0; 16]).is_some());
    }

    #[test]
    fn test_raw_image_rejects_zero_size() {
        assert!(RawImage::new(0, 0, PixelLayout::Bgra, Vec::new()).is_none());
        assert!(RawImage::new(0, 4, PixelLayout::Bgra, Vec::new()).is_none());
        assert!(RawImage::new(4, 0, PixelLayout::Rgba, Vec::new()).is_none());
    }

    #[test]
    fn test_bgra_swaps_channels() {
        let img = RawImage::new(1, 1, PixelLayout::Bgra, vec![10, 20, 30, 255]).unwrap();
        assert_eq!(img.rgb(0, 0), [30, 20, 10]);
        let img = RawImage::new(1, 1, PixelLayout::Rgba, vec![10, 20, 30, 255]).unwrap();
        assert_eq!(img.rgb(0, 0), [10, 20, 30]);
    }

    #[test]
    fn test_value_count() {
        assert_eq!(Frame::value_count(60, 40, false), 7200);
        assert_eq!(Frame::value_count(60, 40, true), 2400);
    }
}
