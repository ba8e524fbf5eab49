//! EPSI inline preview decoding.
//!
//! An EPSI preview is a grey-scale bitmap stored as ASCII hex inside
//! PostScript comments:
//!
//! ```text
//! %%BeginPreview: 80 24 1 24
//! % 0000000000000000000F
//! ...
//! %%EndPreview
//! ```
//!
//! Palette index 0 is white and the highest index is black.

use std::ops::Range;
use std::sync::OnceLock;

use image::RgbImage;
use regex::bytes::Regex;

use crate::dsc::EpsiHeader;
use crate::error::{Error, Result};
use crate::model::Raster;

/// Bit depths an EPSI preview may use that this decoder handles.
pub const SUPPORTED_DEPTHS: [u32; 4] = [1, 2, 4, 8];

impl EpsiHeader {
    /// Parse the `%%BeginPreview:` line at the start of `bytes`.
    ///
    /// Reads the first three decimal numbers (width, height, depth),
    /// skipping whatever separates them. The optional line count is read
    /// when a fourth number follows on the same line.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let line_end = bytes
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(bytes.len());
        let mut numbers = decimal().find_iter(&bytes[..line_end]).map(|m| {
            std::str::from_utf8(m.as_bytes())
                .ok()
                .and_then(|digits| digits.parse::<u32>().ok())
        });
        let mut next = |what: &str| {
            numbers
                .next()
                .flatten()
                .ok_or_else(|| Error::Format(format!("EPSI preview header lacks {}", what)))
        };
        let width = next("width")?;
        let height = next("height")?;
        let depth = next("depth")?;
        let lines = numbers.next().flatten();
        Ok(Self {
            width,
            height,
            depth,
            lines,
        })
    }

    /// Bytes holding one row of pixels.
    pub fn bytes_per_scanline(&self) -> usize {
        let bits = u64::from(self.width) * u64::from(self.depth);
        usize::try_from(bits.div_ceil(8)).unwrap_or(usize::MAX)
    }
}

fn decimal() -> &'static Regex {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    DECIMAL.get_or_init(|| Regex::new(r"[0-9]+").unwrap())
}

/// Grey palette for `depth` bits per pixel, index 0 white.
pub fn palette(depth: u32) -> Vec<u8> {
    let colors = 1u32 << depth;
    (0..colors)
        .map(|i| (255 * (colors - 1 - i) / (colors - 1)) as u8)
        .collect()
}

/// Decode a preview whose header has already been parsed.
///
/// `bytes` is the whole preview section, starting with the
/// `%%BeginPreview:` line. The bitmap is resampled to
/// `out_width` x `out_height`.
pub fn decode(bytes: &[u8], header: &EpsiHeader, out_width: u32, out_height: u32) -> Result<Raster> {
    if !SUPPORTED_DEPTHS.contains(&header.depth) {
        return Err(Error::UnsupportedDepth(header.depth));
    }
    if header.width == 0 || header.height == 0 || out_width == 0 || out_height == 0 {
        return Err(Error::Format(format!(
            "empty EPSI preview {}x{} -> {}x{}",
            header.width, header.height, out_width, out_height
        )));
    }

    let payload = payload_start(bytes);
    let row_bytes = header.bytes_per_scanline();
    // each byte takes two hex digits, so the section bounds the bitmap size
    let available = (bytes.len() - payload) / 2;
    let count = row_bytes
        .checked_mul(header.height as usize)
        .filter(|&count| count <= available)
        .ok_or_else(|| {
            Error::Format(format!(
                "EPSI preview {}x{} at depth {} does not fit in {} bytes of hex",
                header.width, header.height, header.depth, available
            ))
        })?;
    let data = read_hex(&bytes[payload..], count)?;

    let palette = palette(header.depth);
    let depth = header.depth as usize;
    let image = RgbImage::from_fn(header.width, header.height, |x, y| {
        let row = &data[y as usize * row_bytes..(y as usize + 1) * row_bytes];
        let index = pixel_index(row, x as usize, depth);
        let grey = palette[index];
        image::Rgb([grey, grey, grey])
    });

    log::debug!(
        "decoded {}x{} depth {} EPSI preview",
        header.width,
        header.height,
        header.depth
    );
    Ok(Raster::new(image).resized(out_width, out_height))
}

/// Parse the header at the start of `bytes`, then decode.
pub fn decode_preview(bytes: &[u8], out_width: u32, out_height: u32) -> Result<Raster> {
    let header = EpsiHeader::parse(bytes)?;
    decode(bytes, &header, out_width, out_height)
}

/// Decode the preview occupying `range` of a whole document.
pub fn decode_range(data: &[u8], range: Range<u64>, out_width: u32, out_height: u32) -> Result<Raster> {
    let bytes = usize::try_from(range.start)
        .ok()
        .zip(usize::try_from(range.end).ok())
        .and_then(|(start, end)| data.get(start..end))
        .ok_or_else(|| {
            Error::Format(format!(
                "preview range {:?} outside document of {} bytes",
                range,
                data.len()
            ))
        })?;
    decode_preview(bytes, out_width, out_height)
}

/// Offset of the first hex line: past the header line, at the next `%`.
fn payload_start(bytes: &[u8]) -> usize {
    let line_end = bytes
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .unwrap_or(bytes.len());
    bytes[line_end..]
        .iter()
        .position(|&b| b == b'%')
        .map_or(bytes.len(), |p| line_end + p)
}

/// Read `count` bytes written as hex pairs, skipping anything between pairs.
fn read_hex(mut text: &[u8], count: usize) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(count);
    while data.len() < count {
        let start = text
            .iter()
            .position(u8::is_ascii_hexdigit)
            .ok_or_else(|| {
                Error::Format(format!(
                    "EPSI preview ends after {} of {} bytes",
                    data.len(),
                    count
                ))
            })?;
        let (high, low) = match text.get(start..start + 2) {
            Some(&[high, low]) => (high, low),
            _ => return Err(Error::Format("EPSI preview ends inside a hex pair".into())),
        };
        let (Some(high), Some(low)) = (hex_value(high), hex_value(low)) else {
            return Err(Error::Format(format!(
                "bad hex pair {:?} in EPSI preview",
                String::from_utf8_lossy(&[high, low])
            )));
        };
        data.push(high << 4 | low);
        text = &text[start + 2..];
    }
    Ok(data)
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|v| v as u8)
}

/// Palette index of pixel `x` in a packed row, most significant bit first.
fn pixel_index(row: &[u8], x: usize, depth: usize) -> usize {
    let bit = x * depth;
    let byte = row[bit / 8];
    let shift = 8 - depth - bit % 8;
    usize::from((byte >> shift) & ((1u16 << depth) - 1) as u8)
}
