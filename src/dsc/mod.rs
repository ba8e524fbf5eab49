//! Document structuring convention (DSC) scanning.
//!
//! [`DscScanner`] consumes a PostScript document incrementally and builds
//! [`DocumentMetadata`]: bounding box, embedded preview location, page
//! count, section offsets and printer-framing flags. Comment handlers can
//! end a scan as soon as they have what they need, which keeps header-only
//! lookups cheap on large files.

mod comment;
mod error;
mod handler;
mod metadata;
mod scanner;

pub use comment::CommentName;
pub use error::{DscError, DscErrorKind, ErrorHandler, ErrorResponse, OkErrorHandler, Severity};
pub use handler::{CommentHandler, HeaderOnlyHandler, NoopHandler, ScanEvent};
pub use metadata::{
    BoundingBox, DocumentData, DocumentMetadata, EpsiHeader, HiResBoundingBox, Media,
    Orientation, PageEntry, PageOrder, PreviewKind, SectionOffsets,
};
pub use scanner::{scan_file, DscScanner, ScanMode, ScanOutcome, READ_CHUNK};

use std::fs::File;
use std::path::Path;

use crate::error::Result;

/// Scan only the header region of the document at `path`.
///
/// Reads [`READ_CHUNK`] bytes at a time in line-delimited mode and stops as
/// soon as [`HeaderOnlyHandler`] sees the end of the header (or, for EPSF,
/// the end of the EPSI preview).
pub fn scan_header<P: AsRef<Path>>(path: P) -> Result<DocumentMetadata> {
    let file = File::open(path.as_ref())?;
    let mut scanner = DscScanner::with_comment_handler(HeaderOnlyHandler::new())
        .with_error_handler(OkErrorHandler);
    let outcome = scanner.scan_reader(file)?;
    log::debug!(
        "header scan of {} ended with {:?} after {} bytes",
        path.as_ref().display(),
        outcome,
        scanner.bytes_scanned()
    );
    scanner.finish()
}
