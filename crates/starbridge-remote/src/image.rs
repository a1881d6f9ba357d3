//! In-memory astronomical image
//!
//! The boundary object the surrogate machinery serves. The processing
//! pipeline itself lives elsewhere; what matters here is region-level
//! read and write access to a shared live image.

use crate::data::RemoteError;
use serde::{Deserialize, Serialize};

/// A rectangular pixel region, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Image shape, carried in surrogate descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
}

/// A dense row-major image of f64 pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyImage {
    width: u32,
    height: u32,
    pixels: Vec<f64>,
}

impl SkyImage {
    /// A zero-filled image of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<f64>) -> Result<Self, RemoteError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(RemoteError::PixelCountMismatch(pixels.len(), expected));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn metadata(&self) -> ImageMetadata {
        ImageMetadata {
            width: self.width,
            height: self.height,
        }
    }

    /// One pixel value, if in bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    pub fn set(&mut self, x: u32, y: u32, value: f64) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = value;
        }
    }

    fn check_region(&self, region: Region) -> Result<(), RemoteError> {
        let x_end = region.x.checked_add(region.width);
        let y_end = region.y.checked_add(region.height);
        match (x_end, y_end) {
            (Some(x_end), Some(y_end)) if x_end <= self.width && y_end <= self.height => Ok(()),
            _ => Err(RemoteError::RegionOutOfBounds(
                region,
                self.width,
                self.height,
            )),
        }
    }

    /// Copy a region out, row by row.
    pub fn read_region(&self, region: Region) -> Result<Vec<f64>, RemoteError> {
        self.check_region(region)?;
        let mut out = Vec::with_capacity(region.pixel_count());
        for row in region.y..region.y + region.height {
            let start = row as usize * self.width as usize + region.x as usize;
            out.extend_from_slice(&self.pixels[start..start + region.width as usize]);
        }
        Ok(out)
    }

    /// Overwrite a region with the given row-major pixels.
    pub fn write_region(&mut self, region: Region, pixels: &[f64]) -> Result<(), RemoteError> {
        self.check_region(region)?;
        if pixels.len() != region.pixel_count() {
            return Err(RemoteError::PixelCountMismatch(
                pixels.len(),
                region.pixel_count(),
            ));
        }
        for (i, row) in (region.y..region.y + region.height).enumerate() {
            let dst = row as usize * self.width as usize + region.x as usize;
            let src = i * region.width as usize;
            self.pixels[dst..dst + region.width as usize]
                .copy_from_slice(&pixels[src..src + region.width as usize]);
        }
        Ok(())
    }
}
