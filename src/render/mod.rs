//! Rasterizing documents with Ghostscript (and dvips for DVI input).

mod cancel;
mod options;
mod pipeline;
mod process;
mod prolog;

#[cfg(unix)]
pub use cancel::SignalGuard;
pub use cancel::CancellationToken;
pub use options::{RasterizerConfig, RenderMode, RenderRequest, DEFAULT_DVIPS, DEFAULT_GHOSTSCRIPT};
pub use pipeline::{RenderPipeline, RenderState};
pub use prolog::{dvips_args, ghostscript_args, prolog, translation, RenderGeometry, EPS_PROLOG, PS_PROLOG};
