//! PostScript prologs and command lines for the rasterizer.

use std::ffi::{OsStr, OsString};

use super::options::RenderMode;
use crate::dsc::BoundingBox;

/// Prepended to full-page documents so that only the first page is emitted.
pub const PS_PROLOG: &str = "%!PS-Adobe-3.0\n\
/.showpage.orig /showpage load def\n\
/.showpage.firstonly {\n    .showpage.orig\n    quit\n} def\n\
/showpage { .showpage.firstonly } def\n";

/// Adobe TN 5002 setup for including an EPS figure.
pub const EPS_PROLOG: &str = "%!PS-Adobe-3.0\n\
userdict begin /pagelevel save def /showpage { } def\n\
0 setgray 0 setlinecap 1 setlinewidth 0 setlinejoin 10 setmiterlimit\n\
[ ] 0 setdash newpath false setoverprint false setstrokeadjust\n";

/// Arguments every Ghostscript run gets.
const GS_COMMON: &[&str] = &[
    "-sDEVICE=png16m",
    "-sOutputFile=-",
    "-dSAFER",
    "-dPARANOIDSAFER",
    "-dNOPAUSE",
];

/// Render resolution and device size for an EPS figure.
///
/// Thumbnails rendered at their final resolution look poor, so the figure
/// is rendered at four times the resolution that would fit the target and
/// scaled down afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderGeometry {
    /// Device resolution in dpi
    pub resolution: u32,
    /// Device width in pixels
    pub width: u32,
    /// Device height in pixels
    pub height: u32,
}

impl RenderGeometry {
    /// Geometry for rendering `bbox` into a `target_width` x `target_height` thumbnail.
    ///
    /// Returns `None` when the box does not enclose a positive area.
    pub fn for_bbox(bbox: &BoundingBox, target_width: u32, target_height: u32) -> Option<Self> {
        if !bbox.is_usable() {
            return None;
        }
        let bw = bbox.width();
        let bh = bbox.height();
        let hres = i64::from(target_width) * 72 / bw;
        let vres = i64::from(target_height) * 72 / bh;
        let resolution = (hres.min(vres) * 4).max(1);
        let clamp = |v: i64| u32::try_from(v.max(1)).unwrap_or(u32::MAX);
        Some(Self {
            resolution: clamp(resolution),
            width: clamp(bw * resolution / 72),
            height: clamp(bh * resolution / 72),
        })
    }
}

/// Move the figure's lower-left corner to the origin.
pub fn translation(bbox: &BoundingBox) -> String {
    format!(" 0 {} sub 0 {} sub translate\n", bbox.llx, bbox.lly)
}

/// Text written to the rasterizer's stdin before it reads the document.
///
/// DVI input gets none: the rasterizer's stdin carries the converter's output.
pub fn prolog(mode: &RenderMode) -> Option<String> {
    match mode {
        RenderMode::FullPage => Some(PS_PROLOG.to_string()),
        RenderMode::Encapsulated(bbox) => Some(format!("{}{}", EPS_PROLOG, translation(bbox))),
        RenderMode::Dvi => None,
    }
}

/// Ghostscript arguments for `mode`; `file` is the document, or `-` for DVI.
pub fn ghostscript_args(
    mode: &RenderMode,
    geometry: Option<&RenderGeometry>,
    file: &OsStr,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = GS_COMMON.iter().map(OsString::from).collect();
    let trailer: &[&str] = match (mode, geometry) {
        (RenderMode::Encapsulated(_), Some(geometry)) => {
            args.push(format!("-g{}x{}", geometry.width, geometry.height).into());
            args.push(format!("-r{}", geometry.resolution).into());
            &["-c", "pagelevel", "-c", "restore", "-c", "end", "-c", "showpage", "-c", "quit"]
        }
        _ => {
            args.push("-dFirstPage=1".into());
            args.push("-dLastPage=1".into());
            &["-c", "showpage", "-c", "quit"]
        }
    };
    args.push("-q".into());
    args.push("-".into());
    match mode {
        RenderMode::Dvi => args.push("-".into()),
        _ => args.push(file.to_os_string()),
    }
    args.extend(trailer.iter().map(OsString::from));
    args
}

/// dvips arguments converting only the first page of `file` to stdout.
pub fn dvips_args(file: &OsStr) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-n", "1", "-q", "-o", "-"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(file.to_os_string());
    args
}
