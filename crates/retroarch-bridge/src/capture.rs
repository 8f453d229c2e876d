//! Screen capture and frame downsampling
//!
//! A `FrameSource` grabs the emulator's screen region; `FrameProcessor`
//! turns the grab into the small normalized vector the agent consumes.

use retro_rl_core::{CaptureConfig, CaptureRegion, Frame, RawImage, Result, RetroRlError};
use std::path::Path;
use tracing::info;

/// Something that can grab a screen region
pub trait FrameSource {
    /// Capture `region`, in screen coordinates
    fn grab(&mut self, region: CaptureRegion) -> Result<RawImage>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Per output pixel along one axis: (source index, weight), weights sum to 1
type AxisWeights = Vec<Vec<(usize, f32)>>;

/// Area-averaging weights mapping `src` samples onto `dst` samples.
///
/// Output sample `i` covers source interval `[i * s, (i + 1) * s)` with
/// `s = src / dst`; each source sample contributes the length of its
/// overlap with that interval.
fn axis_weights(src: u32, dst: u32) -> AxisWeights {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            let start = i as f64 * scale;
            let end = ((i + 1) as f64 * scale).min(src as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).clamp(first + 1, src as usize);

            let mut weights: Vec<(usize, f32)> = (first..last)
                .map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (s, overlap.max(0.0) as f32)
                })
                .filter(|(_, w)| *w > 0.0)
                .collect();

            let total: f32 = weights.iter().map(|(_, w)| w).sum();
            if total > 0.0 {
                for (_, w) in &mut weights {
                    *w /= total;
                }
            } else {
                weights = vec![(first.min(src as usize - 1), 1.0)];
            }
            weights
        })
        .collect()
}

/// Resize to `width` x `height` RGB by area averaging; samples stay in 0..=255
pub fn resize_area(raw: &RawImage, width: u32, height: u32) -> Vec<f32> {
    let xs = axis_weights(raw.width, width);
    let ys = axis_weights(raw.height, height);

    let mut out = Vec::with_capacity(width as usize * height as usize * 3);
    for row in &ys {
        for col in &xs {
            let mut acc = [0f32; 3];
            for &(sy, wy) in row {
                for &(sx, wx) in col {
                    let px = raw.rgb(sx as u32, sy as u32);
                    let w = wy * wx;
                    acc[0] += px[0] as f32 * w;
                    acc[1] += px[1] as f32 * w;
                    acc[2] += px[2] as f32 * w;
                }
            }
            out.extend_from_slice(&acc);
        }
    }
    out
}

/// ITU-R BT.601 luma
fn luma(rgb: &[f32]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

/// Converts raw grabs into normalized frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameProcessor {
    pub width: u32,
    pub height: u32,
    pub grayscale: bool,
}

impl FrameProcessor {
    pub fn new(width: u32, height: u32, grayscale: bool) -> Self {
        Self {
            width,
            height,
            grayscale,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.width, config.height, config.grayscale)
    }

    /// RGB conversion, area resize, optional grayscale, scale to [0, 1]
    pub fn process(&self, raw: &RawImage) -> Frame {
        let rgb = resize_area(raw, self.width, self.height);

        let (channels, data) = if self.grayscale {
            let data = rgb
                .chunks_exact(3)
                .map(|px| normalize(luma(px)))
                .collect();
            (1, data)
        } else {
            (3, rgb.into_iter().map(normalize).collect())
        };

        Frame {
            width: self.width,
            height: self.height,
            channels,
            data,
        }
    }
}

fn normalize(sample: f32) -> f32 {
    (sample / 255.0).clamp(0.0, 1.0)
}

/// A frame source bound to a region and a processor
pub struct FrameCapture {
    source: Box<dyn FrameSource>,
    region: CaptureRegion,
    processor: FrameProcessor,
}

impl FrameCapture {
    pub fn new(source: Box<dyn FrameSource>, config: &CaptureConfig) -> Self {
        info!(
            "Capturing {}x{} at ({}, {}) via {}",
            config.region.width,
            config.region.height,
            config.region.left,
            config.region.top,
            source.name()
        );
        Self {
            source,
            region: config.region,
            processor: FrameProcessor::from_config(config),
        }
    }

    pub fn region(&self) -> CaptureRegion {
        self.region
    }

    pub fn processor(&self) -> FrameProcessor {
        self.processor
    }

    /// Grab the region without processing
    pub fn grab(&mut self) -> Result<RawImage> {
        self.source.grab(self.region)
    }

    /// Grab and process one frame
    pub fn capture(&mut self) -> Result<Frame> {
        let raw = self.grab()?;
        if raw.width == 0 || raw.height == 0 {
            return Err(RetroRlError::CaptureError(format!(
                "{} returned an empty {}x{} grab",
                self.source.name(),
                raw.width,
                raw.height
            )));
        }
        Ok(self.processor.process(&raw))
    }
}

/// Save a frame as an image for eyeballing the capture region
pub fn save_preview(frame: &Frame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = frame.to_bytes();
    let saved = match frame.channels {
        1 => image::GrayImage::from_raw(frame.width, frame.height, bytes)
            .map(|img| img.save(path)),
        3 => image::RgbImage::from_raw(frame.width, frame.height, bytes)
            .map(|img| img.save(path)),
        n => {
            return Err(RetroRlError::CaptureError(format!(
                "cannot save a {}-channel frame",
                n
            )));
        }
    };

    match saved {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(RetroRlError::CaptureError(format!(
            "failed to save {}: {}",
            path.display(),
            e
        ))),
        None => Err(RetroRlError::CaptureError(
            "frame data does not match its shape".to_string(),
        )),
    }
}

/// Copy `region` out of a full-screen RGBA grab whose top-left corner sits
/// at (`origin_x`, `origin_y`) in screen coordinates
pub fn crop_rgba(
    screen: &[u8],
    screen_width: u32,
    screen_height: u32,
    origin_x: i32,
    origin_y: i32,
    region: CaptureRegion,
) -> Result<Vec<u8>> {
    let left = region.left - origin_x;
    let top = region.top - origin_y;
    if left < 0
        || top < 0
        || left as u64 + region.width as u64 > screen_width as u64
        || top as u64 + region.height as u64 > screen_height as u64
    {
        return Err(RetroRlError::CaptureError(format!(
            "region {:?} is outside the {}x{} screen",
            region, screen_width, screen_height
        )));
    }

    let stride = screen_width as usize * 4;
    let row_len = region.width as usize * 4;
    let mut out = Vec::with_capacity(row_len * region.height as usize);
    for y in top as usize..top as usize + region.height as usize {
        let start = y * stride + left as usize * 4;
        out.extend_from_slice(&screen[start..start + row_len]);
    }
    Ok(out)
}

#[cfg(feature = "desktop")]
mod desktop {
    use super::{FrameSource, crop_rgba};
    use retro_rl_core::{CaptureRegion, PixelLayout, RawImage, Result, RetroRlError};
    use tracing::info;

    /// Grabs from the primary monitor
    pub struct ScreenFrameSource {
        monitor: xcap::Monitor,
    }

    impl ScreenFrameSource {
        pub fn primary() -> Result<Self> {
            let mut monitors = xcap::Monitor::all()
                .map_err(|e| RetroRlError::CaptureError(format!("listing monitors failed: {}", e)))?;
            if monitors.is_empty() {
                return Err(RetroRlError::CaptureError("no monitor found".to_string()));
            }
            let primary = monitors.iter().position(|m| m.is_primary()).unwrap_or(0);
            let monitor = monitors.swap_remove(primary);

            info!(
                "Using monitor {} ({}x{} at {},{})",
                monitor.name(),
                monitor.width(),
                monitor.height(),
                monitor.x(),
                monitor.y()
            );
            Ok(Self { monitor })
        }
    }

    impl FrameSource for ScreenFrameSource {
        fn grab(&mut self, region: CaptureRegion) -> Result<RawImage> {
            let screen = self
                .monitor
                .capture_image()
                .map_err(|e| RetroRlError::CaptureError(format!("screen grab failed: {}", e)))?;
            let (width, height) = (screen.width(), screen.height());
            let pixels = crop_rgba(
                &screen.into_raw(),
                width,
                height,
                self.monitor.x(),
                self.monitor.y(),
                region,
            )?;
            RawImage::new(region.width, region.height, PixelLayout::Rgba, pixels).ok_or_else(
                || RetroRlError::CaptureError("cropped grab has the wrong size".to_string()),
            )
        }

        fn name(&self) -> &str {
            "xcap"
        }
    }
}

#[cfg(feature = "desktop")]
pub use desktop::ScreenFrameSource;

/// The host screen capture backend
#[cfg(feature = "desktop")]
pub fn screen_source() -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ScreenFrameSource::primary()?))
}

/// The host screen capture backend
#[cfg(not(feature = "desktop"))]
pub fn screen_source() -> Result<Box<dyn FrameSource>> {
    Err(RetroRlError::CaptureError(
        "built without the `desktop` feature: no screen capture backend".to_string(),
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use retro_rl_core::PixelLayout;

    /// Returns the same synthetic BGRA image for every grab
    pub struct PatternSource {
        pub grabs: usize,
        pub fail: bool,
    }

    impl PatternSource {
        pub fn new() -> Self {
            Self {
                grabs: 0,
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                grabs: 0,
                fail: true,
            }
        }
    }

    /// Horizontal gradient in red, vertical in green, constant blue
    pub fn gradient(width: u32, height: u32, layout: PixelLayout) -> RawImage {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width.max(2).saturating_sub(1).max(1)).min(255) as u8;
                let g = (y * 255 / height.max(2).saturating_sub(1).max(1)).min(255) as u8;
                let b = 128u8;
                match layout {
                    PixelLayout::Bgra => data.extend_from_slice(&[b, g, r, 255]),
                    PixelLayout::Rgba => data.extend_from_slice(&[r, g, b, 255]),
                }
            }
        }
        RawImage::new(width, height, layout, data).unwrap()
    }

    impl FrameSource for PatternSource {
        fn grab(&mut self, region: CaptureRegion) -> Result<RawImage> {
            if self.fail {
                return Err(RetroRlError::CaptureError("window hidden".to_string()));
            }
            self.grabs += 1;
            Ok(gradient(region.width, region.height, PixelLayout::Bgra))
        }

        fn name(&self) -> &str {
            "pattern"
        }
    }
}
