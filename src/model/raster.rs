//! Raster preview image.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

use crate::error::Result;

/// An RGB preview image, 8 bits per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    image: RgbImage,
}

impl Raster {
    /// Wrap an existing image.
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode PNG data.
    pub fn from_png(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(data, ImageFormat::Png)?;
        Ok(Self::new(image.to_rgb8()))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// RGB value of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    /// Borrow the underlying image.
    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    /// Unwrap the underlying image.
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Resample to exactly `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if (width, height) == (self.width(), self.height()) {
            return self.clone();
        }
        Self::new(imageops::resize(&self.image, width, height, FilterType::Triangle))
    }

    /// Shrink to fit within `width` x `height`, keeping the aspect ratio.
    ///
    /// Images that already fit are returned unchanged; nothing is enlarged.
    pub fn fit_within(self, width: u32, height: u32) -> Self {
        let (w, h) = (self.width(), self.height());
        if w <= width && h <= height {
            return self;
        }
        let (nw, nh) = fit_dimensions(w, h, width, height);
        log::debug!("downscaling preview {}x{} -> {}x{}", w, h, nw, nh);
        self.resized(nw, nh)
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
        Ok(output)
    }

    /// Write as a PNG file.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Largest size with the aspect ratio of `w` x `h` fitting in `max_w` x `max_h`.
fn fit_dimensions(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let (w64, h64) = (u64::from(w), u64::from(h));
    // compare w/max_w with h/max_h without floating point
    if w64 * u64::from(max_h) >= h64 * u64::from(max_w) {
        let nh = (h64 * u64::from(max_w) / w64.max(1)) as u32;
        (max_w.max(1), nh.max(1))
    } else {
        let nw = (w64 * u64::from(max_h) / h64.max(1)) as u32;
        (nw.max(1), max_h.max(1))
    }
}
