//! Per-comment callbacks used in line-delimited scanning.

use std::ops::ControlFlow;

use super::comment::CommentName;
use super::error::Severity;

/// A recognised comment, reported while its line is being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEvent<'a> {
    /// Which comment
    pub name: CommentName,
    /// The raw line, without terminator
    pub raw_line: &'a [u8],
    /// 1-based line number
    pub line_number: u32,
    /// Highest severity of anomalies reported on this line
    pub severity: Severity,
    /// Whether the document declared itself EPSF
    pub epsf: bool,
}

/// Receives recognised comments; `Break` ends the scan early.
pub trait CommentHandler {
    /// Called once per recognised comment.
    fn comment(&mut self, event: &ScanEvent<'_>) -> ControlFlow<()>;
}

/// Handler that never stops the scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl CommentHandler for NoopHandler {
    fn comment(&mut self, _event: &ScanEvent<'_>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Handler that stops once the header region is over.
///
/// Comments of interest live in the header, so this bounds the scan cost by
/// the header size instead of the file size. For EPSF documents the EPSI
/// preview follows `%%EndComments`, so the scan goes on until the preview is
/// closed or the body starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderOnlyHandler {
    stopped_at: Option<CommentName>,
}

impl HeaderOnlyHandler {
    /// Create a new handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Comment that ended the scan, if any.
    pub fn stopped_at(&self) -> Option<CommentName> {
        self.stopped_at
    }
}

impl CommentHandler for HeaderOnlyHandler {
    fn comment(&mut self, event: &ScanEvent<'_>) -> ControlFlow<()> {
        use CommentName::*;
        let stop = if event.epsf {
            matches!(
                event.name,
                EndPreview | BeginProlog | BeginSetup | Page | Trailer
            )
        } else {
            matches!(event.name, EndComments | BeginProlog | Page)
        };
        if stop {
            self.stopped_at = Some(event.name);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
