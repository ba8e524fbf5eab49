//! Recognised document structuring comments.

use serde::Serialize;

/// A DSC keyword the scanner recognises.
///
/// This enumeration is the contract between the scanner and comment
/// handlers: every [`ScanEvent`](super::ScanEvent) carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CommentName {
    // Header section
    PsAdobe,
    BeginComments,
    EndComments,
    Pages,
    Creator,
    CreationDate,
    Title,
    For,
    LanguageLevel,
    BoundingBox,
    Orientation,
    PageOrder,
    DocumentMedia,
    DocumentPaperSizes,
    DocumentPaperForms,
    DocumentPaperColors,
    DocumentPaperWeights,
    DocumentData,
    Requirements,
    DocumentNeededFonts,
    DocumentSuppliedFonts,
    DocumentNeededResources,
    DocumentSuppliedResources,
    HiResBoundingBox,
    CropBox,

    // Preview section
    BeginPreview,
    EndPreview,

    // Defaults section
    BeginDefaults,
    EndDefaults,

    // Prolog section
    BeginProlog,
    EndProlog,
    BeginFont,
    EndFont,
    BeginFeature,
    EndFeature,
    BeginResource,
    EndResource,
    BeginProcSet,
    EndProcSet,

    // Setup section
    BeginSetup,
    EndSetup,
    Feature,
    PaperColor,
    PaperForm,
    PaperWeight,
    PaperSize,

    // Page section
    Page,
    PageTrailer,
    BeginPageSetup,
    EndPageSetup,
    PageMedia,
    PageOrientation,
    PageBoundingBox,
    IncludeFont,
    IncludeResource,
    ViewingOrientation,

    // Body structure, valid anywhere
    BeginDocument,
    EndDocument,
    BeginData,
    EndData,
    BeginBinary,
    EndBinary,

    // Trailer section
    Trailer,

    // End of file
    Eof,
}

const KEYWORDS: &[(&str, CommentName)] = &[
    ("BeginComments", CommentName::BeginComments),
    ("EndComments", CommentName::EndComments),
    ("Pages", CommentName::Pages),
    ("Creator", CommentName::Creator),
    ("CreationDate", CommentName::CreationDate),
    ("Title", CommentName::Title),
    ("For", CommentName::For),
    ("LanguageLevel", CommentName::LanguageLevel),
    ("BoundingBox", CommentName::BoundingBox),
    ("Orientation", CommentName::Orientation),
    ("PageOrder", CommentName::PageOrder),
    ("DocumentMedia", CommentName::DocumentMedia),
    ("DocumentPaperSizes", CommentName::DocumentPaperSizes),
    ("DocumentPaperForms", CommentName::DocumentPaperForms),
    ("DocumentPaperColors", CommentName::DocumentPaperColors),
    ("DocumentPaperWeights", CommentName::DocumentPaperWeights),
    ("DocumentData", CommentName::DocumentData),
    ("Requirements", CommentName::Requirements),
    ("DocumentNeededFonts", CommentName::DocumentNeededFonts),
    ("DocumentSuppliedFonts", CommentName::DocumentSuppliedFonts),
    ("DocumentNeededResources", CommentName::DocumentNeededResources),
    ("DocumentSuppliedResources", CommentName::DocumentSuppliedResources),
    ("HiResBoundingBox", CommentName::HiResBoundingBox),
    ("CropBox", CommentName::CropBox),
    ("BeginPreview", CommentName::BeginPreview),
    ("EndPreview", CommentName::EndPreview),
    ("BeginDefaults", CommentName::BeginDefaults),
    ("EndDefaults", CommentName::EndDefaults),
    ("BeginProlog", CommentName::BeginProlog),
    ("EndProlog", CommentName::EndProlog),
    ("BeginFont", CommentName::BeginFont),
    ("EndFont", CommentName::EndFont),
    ("BeginFeature", CommentName::BeginFeature),
    ("EndFeature", CommentName::EndFeature),
    ("BeginResource", CommentName::BeginResource),
    ("EndResource", CommentName::EndResource),
    ("BeginProcSet", CommentName::BeginProcSet),
    ("EndProcSet", CommentName::EndProcSet),
    ("BeginSetup", CommentName::BeginSetup),
    ("EndSetup", CommentName::EndSetup),
    ("Feature", CommentName::Feature),
    ("PaperColor", CommentName::PaperColor),
    ("PaperForm", CommentName::PaperForm),
    ("PaperWeight", CommentName::PaperWeight),
    ("PaperSize", CommentName::PaperSize),
    ("Page", CommentName::Page),
    ("PageTrailer", CommentName::PageTrailer),
    ("BeginPageSetup", CommentName::BeginPageSetup),
    ("EndPageSetup", CommentName::EndPageSetup),
    ("PageMedia", CommentName::PageMedia),
    ("PageOrientation", CommentName::PageOrientation),
    ("PageBoundingBox", CommentName::PageBoundingBox),
    ("IncludeFont", CommentName::IncludeFont),
    ("IncludeResource", CommentName::IncludeResource),
    ("ViewingOrientation", CommentName::ViewingOrientation),
    ("BeginDocument", CommentName::BeginDocument),
    ("EndDocument", CommentName::EndDocument),
    ("BeginData", CommentName::BeginData),
    ("EndData", CommentName::EndData),
    ("BeginBinary", CommentName::BeginBinary),
    ("EndBinary", CommentName::EndBinary),
    ("Trailer", CommentName::Trailer),
    ("EOF", CommentName::Eof),
];

impl CommentName {
    /// Keyword as written after `%%` (or `%!` for [`CommentName::PsAdobe`]).
    pub fn keyword(self) -> &'static str {
        if self == CommentName::PsAdobe {
            return "PS-Adobe-";
        }
        KEYWORDS
            .iter()
            .find(|(_, name)| *name == self)
            .map(|(kw, _)| *kw)
            .unwrap_or_default()
    }

    /// Look up a keyword (without the `%%` prefix or trailing colon).
    pub fn from_keyword(keyword: &[u8]) -> Option<Self> {
        KEYWORDS
            .iter()
            .find(|(kw, _)| kw.as_bytes() == keyword)
            .map(|(_, name)| *name)
    }

    /// Whether this comment opens a nested body block closed by a matching `End` comment.
    pub(crate) fn closing(self) -> Option<CommentName> {
        use CommentName::*;
        Some(match self {
            BeginFont => EndFont,
            BeginFeature => EndFeature,
            BeginResource => EndResource,
            BeginProcSet => EndProcSet,
            BeginPageSetup => EndPageSetup,
            _ => return None,
        })
    }

    /// Whether this comment closes a nested body block.
    pub(crate) fn is_block_end(self) -> bool {
        use CommentName::*;
        matches!(
            self,
            EndFont | EndFeature | EndResource | EndProcSet | EndPageSetup
        )
    }
}

impl std::fmt::Display for CommentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == CommentName::PsAdobe {
            write!(f, "%!{}", self.keyword())
        } else {
            write!(f, "%%{}", self.keyword())
        }
    }
}

/// A recognised comment line split into keyword and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Comment<'a> {
    pub name: CommentName,
    /// Text after the keyword and its colon, trimmed
    pub value: &'a [u8],
    /// Whether the keyword was followed by a colon
    pub has_colon: bool,
}

/// Recognise a structuring comment at the start of `line`.
pub(crate) fn recognize(line: &[u8]) -> Option<Comment<'_>> {
    if let Some(rest) = line.strip_prefix(b"%!PS-Adobe-") {
        return Some(Comment {
            name: CommentName::PsAdobe,
            value: trim(rest),
            has_colon: false,
        });
    }
    let rest = line.strip_prefix(b"%%")?;
    let end = rest
        .iter()
        .position(|&b| b == b':' || b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let name = CommentName::from_keyword(&rest[..end])?;
    let has_colon = rest.get(end) == Some(&b':');
    let value = if has_colon { &rest[end + 1..] } else { &rest[end..] };

    Some(Comment {
        name,
        value: trim(value),
        has_colon,
    })
}

pub(crate) fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_with_colon() {
        let comment = recognize(b"%%BoundingBox: 0 0 100 100").unwrap();
        assert_eq!(comment.name, CommentName::BoundingBox);
        assert_eq!(comment.value, b"0 0 100 100");
        assert!(comment.has_colon);
    }

    #[test]
    fn test_recognize_without_value() {
        let comment = recognize(b"%%EndComments").unwrap();
        assert_eq!(comment.name, CommentName::EndComments);
        assert!(comment.value.is_empty());
        assert!(!comment.has_colon);
    }

    #[test]
    fn test_page_keywords_do_not_collide() {
        assert_eq!(recognize(b"%%Page: 1 1").unwrap().name, CommentName::Page);
        assert_eq!(
            recognize(b"%%PageTrailer").unwrap().name,
            CommentName::PageTrailer
        );
        assert_eq!(
            recognize(b"%%PageBoundingBox: 0 0 1 1").unwrap().name,
            CommentName::PageBoundingBox
        );
        assert_eq!(recognize(b"%%Pages: 3").unwrap().name, CommentName::Pages);
    }

    #[test]
    fn test_unknown_and_plain_comments() {
        assert!(recognize(b"%%Unknown: 1").is_none());
        assert!(recognize(b"% just a comment").is_none());
        assert!(recognize(b"%%+ continuation").is_none());
        assert!(recognize(b"/showpage {} def").is_none());
    }

    #[test]
    fn test_ps_adobe_header() {
        let comment = recognize(b"%!PS-Adobe-3.0 EPSF-3.0").unwrap();
        assert_eq!(comment.name, CommentName::PsAdobe);
        assert_eq!(comment.value, b"3.0 EPSF-3.0");
    }

    #[test]
    fn test_keyword_round_trip_for_table() {
        for (kw, name) in KEYWORDS {
            assert_eq!(name.keyword(), *kw);
        }
        assert_eq!(CommentName::Eof.to_string(), "%%EOF");
        assert_eq!(CommentName::PsAdobe.to_string(), "%!PS-Adobe-");
    }
}
