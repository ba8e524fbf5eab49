//! Rendering through Ghostscript.

use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;

use crossbeam_channel::RecvTimeoutError;

use super::cancel::CancellationToken;
use super::options::{RasterizerConfig, RenderMode, RenderRequest};
use super::process::{spawn_reader, Chunk, HelperProcess};
use super::prolog::{dvips_args, ghostscript_args, prolog, RenderGeometry};
use crate::detect;
use crate::error::{Error, Result};
use crate::model::Raster;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Where a render request is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Nothing started yet
    Created,
    /// Helper processes are running
    Spawned,
    /// Writing the prolog to the rasterizer
    Writing,
    /// Collecting the rasterizer's output
    Reading,
    /// Waiting for the rasterizer to exit
    Reaping,
    /// Done, successfully or not
    Terminal,
}

/// Renders the first page of a document with an external rasterizer.
///
/// Each call to [`render`](Self::render) owns its child processes, pipes
/// and reader thread; all of them are released before the call returns.
#[derive(Debug, Clone)]
pub struct RenderPipeline {
    config: RasterizerConfig,
    state: RenderState,
}

impl RenderPipeline {
    /// Create a pipeline.
    pub fn new(config: RasterizerConfig) -> Self {
        Self {
            config,
            state: RenderState::Created,
        }
    }

    /// The rasterizer configuration.
    pub fn config(&self) -> &RasterizerConfig {
        &self.config
    }

    /// State reached by the last request.
    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Render `request`, giving up when `token` is cancelled.
    pub fn render(&mut self, request: &RenderRequest, token: &CancellationToken) -> Result<Raster> {
        self.state = RenderState::Created;
        let result = self.run(request, token);
        self.transition(RenderState::Terminal);
        if let Err(e) = &result {
            log::debug!("rendering {} failed: {}", request.path.display(), e);
        }
        result
    }

    fn transition(&mut self, next: RenderState) {
        log::trace!("render state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run(&mut self, request: &RenderRequest, token: &CancellationToken) -> Result<Raster> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let geometry = match &request.mode {
            RenderMode::Encapsulated(bbox) => Some(
                RenderGeometry::for_bbox(bbox, request.width, request.height).ok_or_else(|| {
                    Error::RenderFailed(format!("unusable bounding box {}", bbox))
                })?,
            ),
            _ => None,
        };
        let file = request.path.as_os_str();

        let mut gs_command = Command::new(&self.config.ghostscript);
        gs_command
            .args(ghostscript_args(&request.mode, geometry.as_ref(), file))
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // dvips feeds the rasterizer's stdin directly
        let mut dvips = None;
        if request.mode == RenderMode::Dvi {
            let mut command = Command::new(&self.config.dvips);
            command
                .args(dvips_args(file))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null());
            let mut helper = HelperProcess::spawn(&mut command, &self.config.dvips)?;
            let output = helper
                .take_stdout()
                .ok_or_else(|| Error::RenderFailed("dvips has no output pipe".into()))?;
            gs_command.stdin(Stdio::from(output));
            dvips = Some(helper);
        } else {
            gs_command.stdin(Stdio::piped());
        }

        let mut gs = HelperProcess::spawn(&mut gs_command, &self.config.ghostscript)?;
        // the command still owns our copy of dvips' output pipe; once the
        // rasterizer holds the only read end, dvips sees EPIPE when it quits
        drop(gs_command);
        self.transition(RenderState::Spawned);

        if let Some(text) = prolog(&request.mode) {
            self.transition(RenderState::Writing);
            let mut stdin = gs
                .take_stdin()
                .ok_or_else(|| Error::RenderFailed("rasterizer has no input pipe".into()))?;
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                return Err(Error::RenderFailed(format!("writing prolog: {}", e)));
            }
            // closing stdin lets the rasterizer move on to the document
        }

        self.transition(RenderState::Reading);
        let stdout = gs
            .take_stdout()
            .ok_or_else(|| Error::RenderFailed("rasterizer has no output pipe".into()))?;
        let output = self.read_output(stdout, token)?;

        self.transition(RenderState::Reaping);
        let status = gs.wait()?;
        if let Some(mut helper) = dvips {
            let converted = helper.wait()?;
            if !converted.success() {
                log::warn!("{} exited with {}", helper.program(), converted);
            }
        }
        check_status(&status)?;

        let raster = decode_png(&output)?;
        Ok(raster.fit_within(request.width, request.height))
    }

    /// Collect everything the rasterizer writes to stdout.
    fn read_output<R>(&self, source: R, token: &CancellationToken) -> Result<Vec<u8>>
    where
        R: std::io::Read + Send + 'static,
    {
        let (rx, reader) = spawn_reader(source, self.config.read_chunk);
        let started = Instant::now();
        let mut last_data = started;
        let mut output = Vec::new();

        let result = loop {
            if token.is_cancelled() {
                break Err(Error::Cancelled);
            }
            let now = Instant::now();
            if now.duration_since(started) >= self.config.deadline {
                log::warn!("rasterizer missed the {:?} deadline", self.config.deadline);
                break Err(Error::Timeout);
            }
            if now.duration_since(last_data) >= self.config.idle_timeout {
                log::warn!("no rasterizer output for {:?}", self.config.idle_timeout);
                break Err(Error::Timeout);
            }
            match rx.recv_timeout(self.config.poll_interval) {
                Ok(Chunk::Data(bytes)) => {
                    output.extend_from_slice(&bytes);
                    last_data = Instant::now();
                }
                Ok(Chunk::Eof) => break Ok(output),
                Ok(Chunk::Failed(e)) => {
                    break Err(Error::RenderFailed(format!("reading output: {}", e)))
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(Error::RenderFailed("output reader stopped".into()))
                }
            }
        };
        drop(rx);

        // on failure the reader ends by itself once the child is reaped
        if result.is_ok() && reader.join().is_err() {
            return Err(Error::RenderFailed("output reader panicked".into()));
        }
        result
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new(RasterizerConfig::default())
    }
}

/// Ghostscript exits with 1 for some recoverable PostScript errors even
/// after producing the page.
fn check_status(status: &ExitStatus) -> Result<()> {
    match status.code() {
        Some(0) | Some(1) => Ok(()),
        Some(code) => Err(Error::RenderFailed(format!("rasterizer exit status {}", code))),
        None => Err(Error::RenderFailed(format!("rasterizer {}", status))),
    }
}

/// Decode the rasterizer's output, skipping any text printed before the image.
fn decode_png(output: &[u8]) -> Result<Raster> {
    if output.is_empty() {
        return Err(Error::RenderFailed("rasterizer produced no output".into()));
    }
    match Raster::from_png(output) {
        Ok(raster) => Ok(raster),
        Err(first) => match detect::find(output, PNG_SIGNATURE) {
            Some(at) if at > 0 => {
                log::debug!("skipping {} bytes before the PNG signature", at);
                Raster::from_png(&output[at..])
                    .map_err(|e| Error::RenderFailed(format!("undecodable output: {}", e)))
            }
            _ => Err(Error::RenderFailed(format!("undecodable output: {}", first))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        Raster::new(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])))
            .to_png()
            .unwrap()
    }

    #[test]
    fn test_decode_png_direct() {
        let raster = decode_png(&png(3, 2)).unwrap();
        assert_eq!((raster.width(), raster.height()), (3, 2));
    }

    #[test]
    fn test_decode_png_after_warning_text() {
        let mut output = b"GPL Ghostscript: warning, font substituted\n".to_vec();
        output.extend(png(5, 4));
        let raster = decode_png(&output).unwrap();
        assert_eq!(raster.pixel(0, 0), [10, 20, 30]);
    }

    #[test]
    fn test_decode_png_failures() {
        assert!(matches!(decode_png(b""), Err(Error::RenderFailed(_))));
        assert!(matches!(
            decode_png(b"Error: /undefined in foo"),
            Err(Error::RenderFailed(_))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let mut pipeline = RenderPipeline::default();
        let request = RenderRequest::new("/nonexistent.ps", RenderMode::FullPage, 64, 64);
        assert!(matches!(pipeline.render(&request, &token), Err(Error::Cancelled)));
        assert_eq!(pipeline.state(), RenderState::Terminal);
    }

    #[test]
    fn test_missing_rasterizer() {
        let config = RasterizerConfig::new().with_ghostscript("/nonexistent/gs");
        let mut pipeline = RenderPipeline::new(config);
        let request = RenderRequest::new("/tmp/doc.ps", RenderMode::FullPage, 64, 64);
        let err = pipeline
            .render(&request, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Process { ref program, .. } if program == "/nonexistent/gs"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_policy() {
        use std::os::unix::process::ExitStatusExt;

        assert!(check_status(&ExitStatus::from_raw(0)).is_ok());
        assert!(check_status(&ExitStatus::from_raw(1 << 8)).is_ok());
        assert!(check_status(&ExitStatus::from_raw(2 << 8)).is_err());
        // killed by SIGTERM
        assert!(check_status(&ExitStatus::from_raw(15)).is_err());
    }
}
