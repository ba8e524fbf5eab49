//! Structuring-comment anomalies and the handler contract for them.

use serde::Serialize;

/// Class of a DSC anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DscErrorKind {
    /// `%%BoundingBox` values are malformed or fractional.
    BBox,
    /// `%%Trailer` appeared before any `%%Page:`.
    EarlyTrailer,
    /// `%%EOF` appeared before the end of the data.
    EarlyEof,
    /// `%%Page:` appeared inside the trailer.
    PageInTrailer,
    /// Page ordinals are not consecutive.
    PageOrdinal,
    /// `%%Pages:` disagrees with the pages found.
    PagesWrong,
    /// EPSF document has no `%%BoundingBox`.
    EpsNoBBox,
    /// EPSF document has more than one page.
    EpsPages,
    /// `%%PageMedia` names media that was never declared.
    NoMedia,
    /// An `(atend)` value was never supplied in the trailer.
    AtEnd,
    /// A header comment was given more than once.
    DuplicateComment,
    /// More than one `%%Trailer`.
    DuplicateTrailer,
    /// Unbalanced `%%BeginXxx` / `%%EndXxx`.
    BeginEnd,
    /// Comment found in a section where it does not belong.
    BadSection,
    /// Line exceeds 255 characters.
    LongLine,
    /// Comment is syntactically wrong.
    IncorrectUsage,
}

/// How serious an anomaly is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum Severity {
    /// Informational
    #[default]
    Info,
    /// Probably harmless
    Warning,
    /// Structure cannot be trusted
    Error,
}

impl DscErrorKind {
    /// Default severity of this kind of anomaly.
    pub fn severity(self) -> Severity {
        use DscErrorKind::*;
        match self {
            DuplicateComment | DuplicateTrailer | BadSection | LongLine => Severity::Info,
            BBox | EarlyTrailer | EarlyEof | NoMedia | AtEnd | IncorrectUsage => {
                Severity::Warning
            }
            PageInTrailer | PageOrdinal | PagesWrong | EpsNoBBox | EpsPages | BeginEnd => {
                Severity::Error
            }
        }
    }
}

/// An anomaly found while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DscError {
    /// What went wrong
    pub kind: DscErrorKind,
    /// How serious it is
    pub severity: Severity,
    /// Offending line (may be truncated for very long lines)
    pub line: Vec<u8>,
    /// 1-based line number
    pub line_number: u32,
}

impl std::fmt::Display for DscError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} ({:?}) at line {}: {}",
            self.kind,
            self.severity,
            self.line_number,
            String::from_utf8_lossy(&self.line)
        )
    }
}

/// What the scanner should do about a reported anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    /// Continue scanning.
    Ok,
    /// Abort the scan with failure.
    Cancel,
    /// Continue and stop reporting anomalies for the rest of the scan.
    IgnoreAll,
}

/// Receives anomalies found during a scan.
pub trait ErrorHandler {
    /// Decide how to proceed after `error`.
    fn error(&mut self, error: &DscError) -> ErrorResponse;
}

impl<F> ErrorHandler for F
where
    F: FnMut(&DscError) -> ErrorResponse,
{
    fn error(&mut self, error: &DscError) -> ErrorResponse {
        self(error)
    }
}

/// Handler that logs every anomaly and keeps going.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkErrorHandler;

impl ErrorHandler for OkErrorHandler {
    fn error(&mut self, error: &DscError) -> ErrorResponse {
        log::debug!("DSC: {}", error);
        ErrorResponse::Ok
    }
}
