//! Rasterizer configuration and render requests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dsc::BoundingBox;

/// Default Ghostscript executable, looked up on `PATH`.
pub const DEFAULT_GHOSTSCRIPT: &str = "gs";
/// Default DVI to PostScript converter, looked up on `PATH`.
pub const DEFAULT_DVIPS: &str = "dvips";

/// How the external rasterizer is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizerConfig {
    /// Ghostscript executable
    pub ghostscript: PathBuf,

    /// dvips executable, used for DVI input
    pub dvips: PathBuf,

    /// Give up when no output arrives for this long
    pub idle_timeout: Duration,

    /// Give up when the whole render takes longer than this
    pub deadline: Duration,

    /// How often the read loop wakes to check for cancellation
    pub poll_interval: Duration,

    /// Size of each read from the rasterizer's output
    pub read_chunk: usize,
}

impl RasterizerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Ghostscript executable.
    pub fn with_ghostscript(mut self, program: impl Into<PathBuf>) -> Self {
        self.ghostscript = program.into();
        self
    }

    /// Set the dvips executable.
    pub fn with_dvips(mut self, program: impl Into<PathBuf>) -> Self {
        self.dvips = program.into();
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set the cancellation poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            ghostscript: PathBuf::from(DEFAULT_GHOSTSCRIPT),
            dvips: PathBuf::from(DEFAULT_DVIPS),
            idle_timeout: Duration::from_secs(20),
            deadline: Duration::from_secs(60),
            poll_interval: Duration::from_millis(50),
            read_chunk: 1024,
        }
    }
}

/// What kind of rendering a document needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Render the first page of a PostScript or PDF document.
    FullPage,
    /// Render an EPS figure cropped to its bounding box.
    Encapsulated(BoundingBox),
    /// Convert the first page of a DVI file with dvips, then render it.
    Dvi,
}

/// One rendering job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Source document
    pub path: PathBuf,
    /// Rendering mode
    pub mode: RenderMode,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
}

impl RenderRequest {
    /// Create a request.
    pub fn new(path: impl AsRef<Path>, mode: RenderMode, width: u32, height: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RasterizerConfig::default();
        assert_eq!(config.ghostscript, PathBuf::from("gs"));
        assert_eq!(config.idle_timeout, Duration::from_secs(20));
        assert_eq!(config.deadline, Duration::from_secs(60));
        assert_eq!(config.read_chunk, 1024);
    }

    #[test]
    fn test_builder() {
        let config = RasterizerConfig::new()
            .with_ghostscript("/opt/gs/bin/gs")
            .with_dvips("/usr/local/bin/dvips")
            .with_deadline(Duration::from_secs(5))
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.ghostscript, PathBuf::from("/opt/gs/bin/gs"));
        assert_eq!(config.dvips, PathBuf::from("/usr/local/bin/dvips"));
        assert_eq!(config.deadline, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }
}
