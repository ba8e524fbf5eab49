//! Error types for psthumb library.

use std::io;
use thiserror::Error;

/// Result type alias for psthumb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while producing a preview.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading the source document.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document is wrapped in printer-control framing (PJL or Ctrl-D).
    #[error("Document uses printer-control framing and cannot be previewed")]
    Malformed,

    /// A header or embedded preview could not be parsed.
    #[error("Format error: {0}")]
    Format(String),

    /// The embedded preview uses a bit depth this decoder does not handle.
    #[error("Unsupported preview depth: {0}")]
    UnsupportedDepth(u32),

    /// The comment scanner was cancelled by its error handler.
    #[error("DSC scan cancelled at line {0}")]
    ScanCancelled(u32),

    /// A helper process could not be spawned or its pipes set up.
    #[error("Failed to run {program}: {source}")]
    Process {
        /// Program that failed
        program: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The rasterizer produced no output within the allotted time.
    #[error("Rasterizer timed out")]
    Timeout,

    /// The request was cancelled.
    #[error("Rendering cancelled")]
    Cancelled,

    /// The rasterizer exited badly or produced no decodable image.
    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    /// Error decoding or resampling raster data.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Coarse failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening or reading the source failed.
    Io,
    /// The document or its preview is malformed or unsupported.
    Format,
    /// A helper process could not be started.
    Process,
    /// The read loop gave up on a deadline or was cancelled.
    TimeoutOrCancelled,
    /// The rasterizer ran but its result is unusable.
    RenderFailed,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Malformed
            | Error::Format(_)
            | Error::UnsupportedDepth(_)
            | Error::ScanCancelled(_) => ErrorKind::Format,
            Error::Process { .. } => ErrorKind::Process,
            Error::Timeout | Error::Cancelled => ErrorKind::TimeoutOrCancelled,
            Error::RenderFailed(_) | Error::Image(_) => ErrorKind::RenderFailed,
        }
    }

    pub(crate) fn process(program: impl Into<String>, source: io::Error) -> Self {
        Error::Process {
            program: program.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedDepth(12);
        assert_eq!(err.to_string(), "Unsupported preview depth: 12");

        let err = Error::process("gs", io::Error::new(io::ErrorKind::NotFound, "not found"));
        assert_eq!(err.to_string(), "Failed to run gs: not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Timeout.kind(), ErrorKind::TimeoutOrCancelled);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::TimeoutOrCancelled);
        assert_eq!(Error::UnsupportedDepth(12).kind(), ErrorKind::Format);
        assert_eq!(Error::Malformed.kind(), ErrorKind::Format);
        assert_eq!(
            Error::RenderFailed("exit status 2".into()).kind(),
            ErrorKind::RenderFailed
        );
    }
}
