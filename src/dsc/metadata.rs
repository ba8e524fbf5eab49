//! Document metadata accumulated by the DSC scanner.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// `%%BoundingBox` in integer PostScript points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Lower-left x
    pub llx: i32,
    /// Lower-left y
    pub lly: i32,
    /// Upper-right x
    pub urx: i32,
    /// Upper-right y
    pub ury: i32,
}

impl BoundingBox {
    /// Create a bounding box from its corners.
    pub const fn new(llx: i32, lly: i32, urx: i32, ury: i32) -> Self {
        Self { llx, lly, urx, ury }
    }

    /// Width in points (may be negative for inverted boxes).
    pub const fn width(&self) -> i64 {
        self.urx as i64 - self.llx as i64
    }

    /// Height in points (may be negative for inverted boxes).
    pub const fn height(&self) -> i64 {
        self.ury as i64 - self.lly as i64
    }

    /// Whether the box encloses a positive area.
    pub const fn is_usable(&self) -> bool {
        self.urx > self.llx && self.ury > self.lly
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.llx, self.lly, self.urx, self.ury)
    }
}

/// `%%HiResBoundingBox` / `%%CropBox` with fractional coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HiResBoundingBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

/// Kind of preview embedded in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreviewKind {
    /// No preview
    #[default]
    None,
    /// ASCII-hex bitmap between `%%BeginPreview` and `%%EndPreview`
    Epsi,
    /// TIFF section of a DOS EPS file
    Tiff,
    /// Windows metafile section of a DOS EPS file
    Wmf,
    /// PICT resource of a Macintosh EPSF file
    Pict,
}

/// Declared geometry of an EPSI preview (`%%BeginPreview: w h depth lines`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpsiHeader {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bits per pixel
    pub depth: u32,
    /// Number of hex lines, if declared
    pub lines: Option<u32>,
}

/// `%%Orientation` / `%%PageOrientation` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// `%%PageOrder` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOrder {
    Ascend,
    Descend,
    Special,
}

/// `%%DocumentData` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentData {
    Clean7Bit,
    Clean8Bit,
    Binary,
}

/// One `%%DocumentMedia` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Media name
    pub name: String,
    /// Width in points
    pub width: f64,
    /// Height in points
    pub height: f64,
}

/// One `%%Page:` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    /// Page label as written
    pub label: String,
    /// Ordinal (1-based position claimed by the document)
    pub ordinal: u32,
    /// Byte range of the page
    pub range: Range<u64>,
    /// `%%PageBoundingBox`, if any
    pub bounding_box: Option<BoundingBox>,
}

/// Byte ranges of the document sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOffsets {
    pub comments: Option<Range<u64>>,
    pub preview: Option<Range<u64>>,
    pub defaults: Option<Range<u64>>,
    pub prolog: Option<Range<u64>>,
    pub setup: Option<Range<u64>>,
    pub trailer: Option<Range<u64>>,
}

/// Everything the scanner learned about a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// `%%BoundingBox`, if seen
    pub bounding_box: Option<BoundingBox>,
    /// `%%HiResBoundingBox`, if seen
    pub hires_bounding_box: Option<HiResBoundingBox>,
    /// `%%CropBox`, if seen
    pub crop_box: Option<HiResBoundingBox>,
    /// Kind of embedded preview
    pub preview_kind: PreviewKind,
    /// Byte range of the preview payload (absolute file offsets)
    pub preview_range: Option<Range<u64>>,
    /// Declared EPSI preview geometry
    pub epsi_preview: Option<EpsiHeader>,
    /// Number of `%%Page:` comments before the trailer
    pub page_count: u32,
    /// Value of `%%Pages:`
    pub declared_pages: Option<u32>,
    /// PJL wrapper was found
    pub has_pjl: bool,
    /// Control-D framing was found
    pub has_ctrl_d: bool,
    /// `%%LanguageLevel:`
    pub language_level: Option<u32>,
    /// Version after `%!PS-Adobe-`
    pub dsc_version: Option<String>,
    /// Document claims DSC conformance
    pub is_dsc: bool,
    /// First line declares EPSF
    pub is_epsf: bool,
    /// Document is PDF
    pub is_pdf: bool,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub for_whom: Option<String>,
    pub orientation: Option<Orientation>,
    pub page_order: Option<PageOrder>,
    pub document_data: Option<DocumentData>,
    /// `%%DocumentMedia` entries
    pub media: Vec<Media>,
    /// Section byte ranges
    pub sections: SectionOffsets,
    /// Pages seen
    pub pages: Vec<PageEntry>,
}

impl DocumentMetadata {
    /// Whether the document is wrapped in printer-control framing.
    pub fn is_malformed(&self) -> bool {
        self.has_pjl || self.has_ctrl_d
    }

    /// Bounding box, if present and enclosing a positive area.
    pub fn usable_bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box.filter(BoundingBox::is_usable)
    }

    /// Whether the document has page structure worth trusting.
    pub fn is_structured(&self) -> bool {
        if self.is_epsf {
            self.page_count > 1
        } else {
            self.page_count > 0
        }
    }
}
