//! # psthumb
//!
//! Thumbnail previews for PostScript, EPS, EPSI, PDF and DVI documents.
//!
//! A preview is produced one of two ways:
//!
//! - decoding the EPSI bitmap already embedded in an encapsulated file, or
//! - rendering the first page with Ghostscript (through `dvips` for DVI
//!   input) and decoding its PNG output.
//!
//! Which path is taken depends on what the document structuring comments
//! say, so the [`dsc`] scanner reads the header before anything else.
//!
//! ## Quick Start
//!
//! ```no_run
//! use psthumb::create_thumbnail;
//!
//! fn main() -> psthumb::Result<()> {
//!     let raster = create_thumbnail("figure.eps", 128, 128)?;
//!     println!("{}x{}", raster.width(), raster.height());
//!     raster.save_png("figure.png")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Incremental DSC scanning**: any chunking, early stop, anomaly callbacks
//! - **Embedded previews**: EPSI bitmaps at 1, 2, 4 and 8 bits per pixel
//! - **Binary wrappers**: DOS EPS and MacBinary headers
//! - **Bounded rendering**: idle timeout, overall deadline, cancellation

pub mod detect;
pub mod dsc;
pub mod epsi;
pub mod error;
pub mod model;
pub mod render;
pub mod thumbnail;

// Re-export commonly used types
pub use detect::{is_dvi, sniff_bytes, sniff_path, DocumentKind, Framing, Sniff};
pub use dsc::{
    BoundingBox, CommentHandler, CommentName, DocumentMetadata, DscError, DscErrorKind,
    DscScanner, ErrorHandler, ErrorResponse, HeaderOnlyHandler, PreviewKind, ScanEvent,
    ScanOutcome, Severity,
};
pub use error::{Error, ErrorKind, Result};
pub use model::Raster;
pub use render::{CancellationToken, RasterizerConfig, RenderMode, RenderPipeline, RenderRequest};
pub use thumbnail::{ThumbnailOptions, Thumbnailer};

use std::path::Path;

/// Create a thumbnail with default options.
///
/// # Arguments
///
/// * `path` - Path to the document
/// * `width`, `height` - Size of the thumbnail slot in pixels
///
/// # Example
///
/// ```no_run
/// use psthumb::create_thumbnail;
///
/// let raster = create_thumbnail("paper.dvi", 96, 128).unwrap();
/// assert!(raster.width() <= 96 || raster.height() <= 128);
/// ```
pub fn create_thumbnail<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Raster> {
    Thumbnailer::default().create(path, width, height)
}

/// Scan a whole document and return its structuring-comment metadata.
///
/// # Example
///
/// ```no_run
/// use psthumb::scan_file;
///
/// let meta = scan_file("report.ps").unwrap();
/// println!("Pages: {}", meta.page_count);
/// ```
pub fn scan_file<P: AsRef<Path>>(path: P) -> Result<DocumentMetadata> {
    dsc::scan_file(path)
}
