//! Decoded video frames in CPU memory.
//!
//! Frames are packed 8-bit RGB, row-major, with no row padding. That is the
//! layout FFmpeg emits for `-pix_fmt rgb24` and the layout the encoder pipe
//! consumes, so frames travel from decoder to encoder without repacking.

use crate::error::{Result, UpscalerError};
use crate::resolution::Resolution;
use image::{imageops, ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};

/// Bytes per pixel for packed RGB24.
pub const CHANNELS: usize = 3;

/// Resampling filter used when resizing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    Nearest,    // Fastest, pixelated
    Triangle,   // Bilinear
    CatmullRom, // Bicubic
    #[default]
    Lanczos3, // Best quality, slowest
}

impl From<ResizeFilter> for imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => imageops::FilterType::Nearest,
            ResizeFilter::Triangle => imageops::FilterType::Triangle,
            ResizeFilter::CatmullRom => imageops::FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// A decoded RGB24 raster image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Create a black frame with the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; Self::byte_len(width, height)],
        }
    }

    /// Wrap raw RGB24 bytes. Fails if the buffer length does not match.
    pub fn from_rgb24(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(UpscalerError::InvalidParameter(format!(
                "RGB24 buffer for {}x{} must be {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a frame filled with one color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(Self::byte_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 3]; 8] = [
            [255, 255, 255], // White
            [255, 255, 0],   // Yellow
            [0, 255, 255],   // Cyan
            [0, 255, 0],     // Green
            [255, 0, 255],   // Magenta
            [255, 0, 0],     // Red
            [0, 0, 255],     // Blue
            [0, 0, 0],       // Black
        ];

        let mut frame = Self::new(width, height);
        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let bar = (x as u64 * 8 / width as u64) as usize;
                let i = x as usize * CHANNELS;
                row[i..i + CHANNELS].copy_from_slice(&BARS[bar]);
            }
        }
        frame
    }

    #[inline]
    fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frame dimensions.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Raw RGB24 bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw RGB24 bytes.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the frame and return its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// RGB value at (x, y).
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    /// Resample to exact dimensions with a Lanczos filter.
    pub fn resize(&self, width: u32, height: u32) -> Frame {
        self.resize_with(width, height, ResizeFilter::Lanczos3)
    }

    /// Resample to exact dimensions with the given filter.
    ///
    /// Zero target dimensions are clamped to one pixel.
    pub fn resize_with(&self, width: u32, height: u32, filter: ResizeFilter) -> Frame {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return self.clone();
        }

        let Some(src) =
            ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(self.width, self.height, &self.data[..])
        else {
            // Length is checked on construction; an empty source yields black.
            return Frame::new(width, height);
        };
        let resized = imageops::resize(&src, width, height, filter.into());
        Frame {
            width,
            height,
            data: resized.into_raw(),
        }
    }
}
