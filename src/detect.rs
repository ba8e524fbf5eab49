//! Document format detection from leading bytes.

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

/// PJL universal exit language prefix.
const PJL_UEL: &[u8] = b"\x1b%-12345X";
/// Control-D (end of job) used by some spoolers as framing.
const CTRL_D: u8 = 0x04;
const PS_MAGIC: &[u8] = b"%!";
const PS_ADOBE: &[u8] = b"%!PS-Adobe-";
const PDF_MAGIC: &[u8] = b"%PDF-";
const DOS_EPS_MAGIC: [u8; 4] = [0xC5, 0xD0, 0xD3, 0xC6];
const DOS_EPS_HEADER_LEN: usize = 30;
const MACBIN_HEADER_LEN: usize = 128;

/// DVI preamble opcode and identification byte.
const DVI_PRE: [u8; 2] = [247, 2];
/// Every complete DVI file ends with at least four 223 bytes.
const DVI_TRAILER: [u8; 4] = [0xdf; 4];
const DVI_MIN_LEN: u64 = 134;

/// Number of leading bytes [`sniff_path`] looks at.
pub const SNIFF_LEN: usize = MACBIN_HEADER_LEN;

/// Kind of document recognised from its first bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    /// DSC-conforming or plain PostScript.
    PostScript {
        /// Version after `%!PS-Adobe-`, if present
        dsc_version: Option<String>,
        /// Whether the first line declares `EPSF`
        epsf: bool,
    },
    /// PDF document.
    Pdf,
    /// TeX device-independent file.
    Dvi,
    /// EPS with a DOS binary header.
    DosEps(DosEpsHeader),
    /// MacBinary-wrapped EPSF.
    MacBinary(MacBinaryHeader),
    /// Anything else.
    Unknown,
}

/// Printer-control framing around the PostScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// No framing
    #[default]
    None,
    /// Printer Job Language wrapper
    Pjl,
    /// Leading Control-D
    CtrlD,
}

/// Result of looking at a document prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniff {
    /// Detected kind
    pub kind: DocumentKind,
    /// Detected framing
    pub framing: Framing,
}

impl Sniff {
    /// Whether the document must not be scanned as text.
    pub fn is_malformed(&self) -> bool {
        self.framing != Framing::None
    }
}

/// Section table of a DOS EPS binary header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosEpsHeader {
    /// PostScript section
    pub postscript: Range<u64>,
    /// Windows metafile preview, if any
    pub wmf: Option<Range<u64>>,
    /// TIFF preview, if any
    pub tiff: Option<Range<u64>>,
}

impl DosEpsHeader {
    /// Parse the 30-byte header at the start of `data`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < DOS_EPS_HEADER_LEN || data[..4] != DOS_EPS_MAGIC {
            return None;
        }
        let word = |at: usize| {
            u64::from(u32::from_le_bytes([
                data[at],
                data[at + 1],
                data[at + 2],
                data[at + 3],
            ]))
        };
        let section = |begin: u64, len: u64| (len > 0).then(|| begin..begin + len);

        Some(Self {
            postscript: word(4)..word(4) + word(8),
            wmf: section(word(12), word(16)),
            tiff: section(word(20), word(24)),
        })
    }
}

/// The parts of a MacBinary header needed to find the EPSF data fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacBinaryHeader {
    /// Data fork holding the PostScript
    pub data_fork: Range<u64>,
    /// Resource fork holding the PICT preview
    pub resource_fork: Option<Range<u64>>,
}

impl MacBinaryHeader {
    /// Parse a MacBinary header whose file type is `EPSF`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < MACBIN_HEADER_LEN || data[0] != 0 || data[74] != 0 {
            return None;
        }
        let name_len = data[1] as usize;
        if name_len == 0 || name_len > 63 || &data[65..69] != b"EPSF" {
            return None;
        }
        let word = |at: usize| {
            u64::from(u32::from_be_bytes([
                data[at],
                data[at + 1],
                data[at + 2],
                data[at + 3],
            ]))
        };
        let data_len = word(83);
        let rsrc_len = word(87);
        let data_start = MACBIN_HEADER_LEN as u64;
        // forks are padded to 128-byte blocks
        let rsrc_start = data_start + data_len.div_ceil(128) * 128;

        Some(Self {
            data_fork: data_start..data_start + data_len,
            resource_fork: (rsrc_len > 0).then(|| rsrc_start..rsrc_start + rsrc_len),
        })
    }
}

/// Classify a document prefix.
pub fn sniff_bytes(data: &[u8]) -> Sniff {
    if let Some(header) = DosEpsHeader::parse(data) {
        return Sniff {
            kind: DocumentKind::DosEps(header),
            framing: Framing::None,
        };
    }
    if let Some(header) = MacBinaryHeader::parse(data) {
        return Sniff {
            kind: DocumentKind::MacBinary(header),
            framing: Framing::None,
        };
    }
    if data.starts_with(&DVI_PRE) {
        return Sniff {
            kind: DocumentKind::Dvi,
            framing: Framing::None,
        };
    }

    let (framing, body) = if data.starts_with(PJL_UEL) {
        // the PostScript starts after the PJL job header
        let body = find(data, PS_MAGIC).map_or(&data[data.len()..], |at| &data[at..]);
        (Framing::Pjl, body)
    } else if data.first() == Some(&CTRL_D) {
        (Framing::CtrlD, &data[1..])
    } else {
        (Framing::None, data)
    };

    let kind = if body.starts_with(PDF_MAGIC) {
        DocumentKind::Pdf
    } else if body.starts_with(PS_MAGIC) {
        let first_line = body.split(|&b| b == b'\n' || b == b'\r').next().unwrap_or(body);
        let dsc_version = first_line.strip_prefix(PS_ADOBE).map(|rest| {
            let end = rest
                .iter()
                .position(|b| b.is_ascii_whitespace())
                .unwrap_or(rest.len());
            String::from_utf8_lossy(&rest[..end]).into_owned()
        });
        DocumentKind::PostScript {
            dsc_version,
            epsf: find(first_line, b"EPSF").is_some(),
        }
    } else {
        DocumentKind::Unknown
    };

    Sniff { kind, framing }
}

/// Classify the document at `path` from its first [`SNIFF_LEN`] bytes.
pub fn sniff_path<P: AsRef<Path>>(path: P) -> Result<Sniff> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut header)?;
    Ok(sniff_bytes(&header))
}

/// Check whether `path` is a complete DVI file.
///
/// Besides the preamble, the file must be long enough to hold a postamble
/// and end with the `223` padding bytes, so truncated files are rejected.
pub fn is_dvi<P: AsRef<Path>>(path: P) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut pre = [0u8; 2];
    if file.read_exact(&mut pre).is_err() || pre != DVI_PRE {
        return false;
    }
    match file.metadata() {
        Ok(meta) if meta.len() >= DVI_MIN_LEN => {}
        _ => return false,
    }
    let mut trailer = [0u8; 4];
    file.seek(SeekFrom::End(-4)).is_ok()
        && file.read_exact(&mut trailer).is_ok()
        && trailer == DVI_TRAILER
}

/// Check whether a complete in-memory document is DVI.
pub fn is_dvi_bytes(data: &[u8]) -> bool {
    data.len() as u64 >= DVI_MIN_LEN && data.starts_with(&DVI_PRE) && data.ends_with(&DVI_TRAILER)
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dvi_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[0] = 247;
        data[1] = 2;
        let n = data.len();
        data[n - 4..].copy_from_slice(&DVI_TRAILER);
        data
    }

    #[test]
    fn test_sniff_eps() {
        let sniff = sniff_bytes(b"%!PS-Adobe-3.0 EPSF-3.0\n%%BoundingBox: 0 0 1 1\n");
        assert_eq!(
            sniff.kind,
            DocumentKind::PostScript {
                dsc_version: Some("3.0".to_string()),
                epsf: true
            }
        );
        assert!(!sniff.is_malformed());
    }

    #[test]
    fn test_sniff_plain_postscript() {
        let sniff = sniff_bytes(b"%!\n/Times findfont\n");
        assert_eq!(
            sniff.kind,
            DocumentKind::PostScript {
                dsc_version: None,
                epsf: false
            }
        );
    }

    #[test]
    fn test_sniff_pdf() {
        assert_eq!(sniff_bytes(b"%PDF-1.7\n").kind, DocumentKind::Pdf);
    }

    #[test]
    fn test_sniff_framing() {
        let pjl = sniff_bytes(b"\x1b%-12345X@PJL ENTER LANGUAGE = POSTSCRIPT\n%!PS-Adobe-3.0\n");
        assert_eq!(pjl.framing, Framing::Pjl);
        assert!(pjl.is_malformed());
        assert!(matches!(pjl.kind, DocumentKind::PostScript { .. }));

        let ctrld = sniff_bytes(b"\x04%!PS-Adobe-2.0\n");
        assert_eq!(ctrld.framing, Framing::CtrlD);
        assert!(ctrld.is_malformed());
    }

    #[test]
    fn test_dos_eps_header() {
        let mut data = vec![0u8; 30];
        data[..4].copy_from_slice(&DOS_EPS_MAGIC);
        data[4..8].copy_from_slice(&30u32.to_le_bytes());
        data[8..12].copy_from_slice(&100u32.to_le_bytes());
        data[20..24].copy_from_slice(&130u32.to_le_bytes());
        data[24..28].copy_from_slice(&50u32.to_le_bytes());

        let header = DosEpsHeader::parse(&data).unwrap();
        assert_eq!(header.postscript, 30..130);
        assert_eq!(header.wmf, None);
        assert_eq!(header.tiff, Some(130..180));
        assert!(matches!(sniff_bytes(&data).kind, DocumentKind::DosEps(_)));
    }

    #[test]
    fn test_macbinary_header() {
        let mut data = vec![0u8; 128];
        data[1] = 4;
        data[2..6].copy_from_slice(b"a.ps");
        data[65..69].copy_from_slice(b"EPSF");
        data[83..87].copy_from_slice(&200u32.to_be_bytes());
        data[87..91].copy_from_slice(&64u32.to_be_bytes());

        let header = MacBinaryHeader::parse(&data).unwrap();
        assert_eq!(header.data_fork, 128..328);
        assert_eq!(header.resource_fork, Some(384..448));
    }

    #[test]
    fn test_is_dvi_bytes() {
        assert!(is_dvi_bytes(&dvi_bytes(200)));
        assert!(!is_dvi_bytes(&dvi_bytes(100)));
        let mut truncated = dvi_bytes(200);
        truncated.truncate(190);
        assert!(!is_dvi_bytes(&truncated));
    }

    #[test]
    fn test_is_dvi_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&dvi_bytes(256)).unwrap();
        assert!(is_dvi(file.path()));

        let mut other = tempfile::NamedTempFile::new().unwrap();
        other.write_all(b"%!PS-Adobe-3.0\n").unwrap();
        assert!(!is_dvi(other.path()));
        assert!(!is_dvi("/nonexistent/file.dvi"));
    }

    #[test]
    fn test_sniff_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%!PS-Adobe-3.0 EPSF-3.0\n").unwrap();
        let sniff = sniff_path(file.path()).unwrap();
        assert!(matches!(
            sniff.kind,
            DocumentKind::PostScript { epsf: true, .. }
        ));
    }
}
