//! Thumbnail creation: embedded preview first, rasterizer otherwise.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::detect;
use crate::dsc::{self, BoundingBox, DocumentMetadata, PreviewKind};
use crate::epsi;
use crate::error::{Error, Result};
use crate::model::Raster;
use crate::render::{CancellationToken, RasterizerConfig, RenderMode, RenderPipeline, RenderRequest};

/// Options for [`Thumbnailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// How the rasterizer is run
    pub rasterizer: RasterizerConfig,

    /// Decode EPSI previews instead of rendering when possible
    pub use_embedded_preview: bool,

    /// Route SIGTERM into the request's cancellation token while it runs (Unix only)
    pub route_sigterm: bool,
}

impl ThumbnailOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rasterizer configuration.
    pub fn with_rasterizer(mut self, config: RasterizerConfig) -> Self {
        self.rasterizer = config;
        self
    }

    /// Set the Ghostscript executable.
    pub fn with_ghostscript(mut self, program: impl Into<std::path::PathBuf>) -> Self {
        self.rasterizer = self.rasterizer.with_ghostscript(program);
        self
    }

    /// Set the dvips executable.
    pub fn with_dvips(mut self, program: impl Into<std::path::PathBuf>) -> Self {
        self.rasterizer = self.rasterizer.with_dvips(program);
        self
    }

    /// Enable or disable EPSI preview decoding.
    pub fn with_embedded_preview(mut self, enabled: bool) -> Self {
        self.use_embedded_preview = enabled;
        self
    }

    /// Enable or disable SIGTERM routing.
    pub fn with_sigterm_routing(mut self, enabled: bool) -> Self {
        self.route_sigterm = enabled;
        self
    }
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            rasterizer: RasterizerConfig::default(),
            use_embedded_preview: true,
            route_sigterm: false,
        }
    }
}

/// Produces thumbnails for PostScript, EPS, EPSI, PDF and DVI files.
///
/// ```no_run
/// use psthumb::{Thumbnailer, ThumbnailOptions};
///
/// let mut thumbnailer = Thumbnailer::new(ThumbnailOptions::default());
/// let raster = thumbnailer.create("figure.eps", 128, 128)?;
/// raster.save_png("figure.png")?;
/// # Ok::<(), psthumb::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    options: ThumbnailOptions,
    pipeline: RenderPipeline,
}

impl Thumbnailer {
    /// Create a thumbnailer.
    pub fn new(options: ThumbnailOptions) -> Self {
        let pipeline = RenderPipeline::new(options.rasterizer.clone());
        Self { options, pipeline }
    }

    /// The options in use.
    pub fn options(&self) -> &ThumbnailOptions {
        &self.options
    }

    /// Create a thumbnail of the document at `path` for a `width` x `height` slot.
    pub fn create<P: AsRef<Path>>(&mut self, path: P, width: u32, height: u32) -> Result<Raster> {
        self.create_with_token(path, width, height, &CancellationToken::new())
    }

    /// Like [`create`](Self::create), giving up when `token` is cancelled.
    pub fn create_with_token<P: AsRef<Path>>(
        &mut self,
        path: P,
        width: u32,
        height: u32,
        token: &CancellationToken,
    ) -> Result<Raster> {
        let path = path.as_ref();
        if width == 0 || height == 0 {
            return Err(Error::Format(format!(
                "empty thumbnail size {}x{}",
                width, height
            )));
        }

        #[cfg(unix)]
        let _guard = if self.options.route_sigterm {
            Some(token.route_sigterm()?)
        } else {
            None
        };

        // printer-framed files are refused before any scanning
        if detect::sniff_path(path)?.is_malformed() {
            return Err(Error::Malformed);
        }

        let dvi = detect::is_dvi(path);
        let meta = if dvi {
            DocumentMetadata::default()
        } else {
            let meta = dsc::scan_header(path)?;
            if meta.is_malformed() {
                return Err(Error::Malformed);
            }
            meta
        };

        let bbox = meta.usable_bounding_box();
        let encapsulated = !dvi && has_eps_extension(path) && meta.page_count <= 1;
        log::debug!(
            "{}: dvi={} encapsulated={} bbox={:?} preview={:?}",
            path.display(),
            dvi,
            encapsulated && bbox.is_some(),
            bbox,
            meta.preview_kind
        );

        if self.options.use_embedded_preview && meta.preview_kind == PreviewKind::Epsi {
            if let Some(bbox) = bbox {
                if let Some(raster) = epsi_thumbnail(path, &meta, &bbox, width, height) {
                    return Ok(raster);
                }
            }
        }

        let mode = match bbox {
            _ if dvi => RenderMode::Dvi,
            Some(bbox) if encapsulated => RenderMode::Encapsulated(bbox),
            _ => RenderMode::FullPage,
        };
        let request = RenderRequest::new(path, mode, width, height);
        self.pipeline.render(&request, token)
    }
}

impl Default for Thumbnailer {
    fn default() -> Self {
        Self::new(ThumbnailOptions::default())
    }
}

fn has_eps_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("eps") || ext.eq_ignore_ascii_case("epsi"))
}

/// Decode the EPSI preview at the size the bounding box divides evenly into.
///
/// Returns `None` when the preview is smaller than the target or cannot be
/// decoded, so the caller falls back to rendering.
fn epsi_thumbnail(
    path: &Path,
    meta: &DocumentMetadata,
    bbox: &BoundingBox,
    width: u32,
    height: u32,
) -> Option<Raster> {
    let range = meta.preview_range.clone()?;
    let bw = u32::try_from(bbox.width()).ok()?;
    let bh = u32::try_from(bbox.height()).ok()?;
    let scale = (bw / width).min(bh / height);
    if scale == 0 {
        log::debug!("EPSI preview too small for {}x{}", width, height);
        return None;
    }

    let decoded = read_range(path, range.start, range.end)
        .and_then(|bytes| epsi::decode_preview(&bytes, bw / scale, bh / scale));
    match decoded {
        Ok(raster) => Some(raster),
        Err(e) => {
            log::debug!("EPSI preview of {} unusable: {}", path.display(), e);
            None
        }
    }
}

fn read_range(path: &Path, start: u64, end: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let len = end.saturating_sub(start);
    let mut bytes = Vec::new();
    file.take(len).read_to_end(&mut bytes)?;
    if (bytes.len() as u64) < len {
        return Err(Error::Format(format!(
            "preview range {}..{} beyond end of file",
            start, end
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(data).unwrap();
        file
    }

    fn no_rasterizer() -> Thumbnailer {
        Thumbnailer::new(
            ThumbnailOptions::new()
                .with_ghostscript("/nonexistent/gs")
                .with_dvips("/nonexistent/dvips"),
        )
    }

    #[test]
    fn test_eps_extension() {
        assert!(has_eps_extension(Path::new("a.eps")));
        assert!(has_eps_extension(Path::new("A.EPSI")));
        assert!(!has_eps_extension(Path::new("a.ps")));
        assert!(!has_eps_extension(Path::new("eps")));
    }

    #[test]
    fn test_options_builder() {
        let options = ThumbnailOptions::new()
            .with_ghostscript("/usr/bin/gs9")
            .with_embedded_preview(false)
            .with_sigterm_routing(true);
        assert_eq!(options.rasterizer.ghostscript, Path::new("/usr/bin/gs9"));
        assert!(!options.use_embedded_preview);
        assert!(options.route_sigterm);
    }

    #[test]
    fn test_malformed_refused_without_rendering() {
        let file = write_temp(".ps", b"\x1b%-12345X@PJL JOB\n%!PS-Adobe-3.0\n%%BoundingBox: 0 0 1 1\n");
        let err = no_rasterizer().create(file.path(), 64, 64).unwrap_err();
        assert!(matches!(err, Error::Malformed));

        let file = write_temp(".ps", b"\x04%!PS-Adobe-3.0\n");
        assert!(matches!(
            no_rasterizer().create(file.path(), 64, 64),
            Err(Error::Malformed)
        ));
    }

    #[test]
    fn test_zero_target_rejected() {
        let file = write_temp(".ps", b"%!PS-Adobe-3.0\n");
        assert!(matches!(
            no_rasterizer().create(file.path(), 0, 64),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = no_rasterizer()
            .create("/nonexistent/doc.ps", 64, 64)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
    }

    #[test]
    fn test_plain_postscript_goes_to_rasterizer() {
        let file = write_temp(".ps", b"%!PS-Adobe-3.0\n%%Pages: 1\n%%EndComments\n%%Page: 1 1\nshowpage\n");
        let err = no_rasterizer().create(file.path(), 64, 64).unwrap_err();
        assert!(matches!(err, Error::Process { ref program, .. } if program == "/nonexistent/gs"));
    }

    #[test]
    fn test_read_range_bounds() {
        let file = write_temp(".eps", b"0123456789");
        assert_eq!(read_range(file.path(), 2, 5).unwrap(), b"234");
        assert!(read_range(file.path(), 8, 20).is_err());
    }
}
