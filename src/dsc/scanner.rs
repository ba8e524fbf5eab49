//! Incremental document-structuring-comment scanner.

use std::collections::HashSet;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::ops::Range;
use std::path::Path;

use crate::detect::{self, DocumentKind, Framing, SNIFF_LEN};
use crate::error::{Error, Result};

use super::comment::{recognize, trim, Comment, CommentName};
use super::error::{DscError, DscErrorKind, ErrorHandler, ErrorResponse, Severity};
use super::handler::{CommentHandler, NoopHandler, ScanEvent};
use super::metadata::{
    BoundingBox, DocumentData, DocumentMetadata, EpsiHeader, HiResBoundingBox, Media,
    Orientation, PageEntry, PageOrder, PreviewKind, SectionOffsets,
};

/// Maximum line length allowed by the DSC specification.
const MAX_DSC_LINE: usize = 255;
/// Longest line prefix kept in memory; the rest of a long line is only counted.
const MAX_KEPT_LINE: usize = 1024;
/// Chunk size used when scanning from a reader.
pub const READ_CHUNK: usize = 4096;

/// Result of feeding a buffer to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// More data may be fed.
    Continue,
    /// The comment handler asked to stop; further data is ignored.
    StopEarly,
    /// The error handler cancelled the scan.
    Error,
}

/// How input is fed to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Scan whatever is available; no per-comment callbacks.
    WholeBuffer,
    /// Report every recognised comment to the comment handler as its line completes.
    LineDelimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Stopped,
    Failed(u32),
}

/// Why line processing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Stop,
    Cancel,
}

type Step = std::result::Result<(), Halt>;

/// Document sections in the order DSC requires them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Header,
    Preview,
    Defaults,
    Prolog,
    Setup,
    Pages,
    Trailer,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: u64,
    end: Option<u64>,
}

impl Span {
    fn open(start: u64) -> Self {
        Self { start, end: None }
    }
}

/// Incremental DSC scanner.
///
/// Bytes are fed with [`scan_data`](Self::scan_data) in chunks of any size;
/// the scanner splits them into lines itself and keeps a trailing partial
/// line until the next call. [`finish`](Self::finish) normalises what was
/// found and hands out the [`DocumentMetadata`].
///
/// ```
/// use psthumb::dsc::{DscScanner, HeaderOnlyHandler, ScanOutcome};
///
/// let mut scanner = DscScanner::with_comment_handler(HeaderOnlyHandler::new());
/// let outcome = scanner.scan_data(b"%!PS-Adobe-3.0\n%%BoundingBox: 0 0 100 100\n%%EndComments\n");
/// assert_eq!(outcome, ScanOutcome::StopEarly);
/// let meta = scanner.finish().unwrap();
/// assert_eq!(meta.bounding_box.unwrap().width(), 100);
/// ```
pub struct DscScanner<'a, H = NoopHandler> {
    handler: H,
    mode: ScanMode,
    error_handler: Option<Box<dyn ErrorHandler + 'a>>,
    ignore_errors: bool,
    status: Status,
    meta: DocumentMetadata,

    // input framing
    prefix: Option<Vec<u8>>,
    window: Option<Range<u64>>,
    offset: u64,

    // line assembly
    line: Vec<u8>,
    line_len: usize,
    line_start: u64,
    after_cr: bool,
    line_count: u32,
    line_severity: Severity,
    skip_bytes: u64,
    skip_lines: u64,
    in_pjl: bool,
    saw_first_line: bool,

    // structure
    stage: Stage,
    open: bool,
    explicit: bool,
    before_eof: Option<Stage>,
    reported_early_eof: bool,
    seen: HashSet<CommentName>,
    atend: HashSet<CommentName>,
    blocks: Vec<CommentName>,
    document_depth: u32,
    comments: Option<Span>,
    preview: Option<Span>,
    defaults: Option<Span>,
    prolog: Option<Span>,
    setup: Option<Span>,
    trailers: Vec<Span>,
    early_trailer: bool,
    fixed_up: bool,
}

impl DscScanner<'_, NoopHandler> {
    /// Create a whole-buffer scanner without comment callbacks.
    pub fn new() -> Self {
        Self::build(NoopHandler, ScanMode::WholeBuffer)
    }
}

impl Default for DscScanner<'_, NoopHandler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, H: CommentHandler> DscScanner<'a, H> {
    /// Create a line-delimited scanner reporting comments to `handler`.
    pub fn with_comment_handler(handler: H) -> Self {
        Self::build(handler, ScanMode::LineDelimited)
    }

    fn build(handler: H, mode: ScanMode) -> Self {
        Self {
            handler,
            mode,
            error_handler: None,
            ignore_errors: false,
            status: Status::Running,
            meta: DocumentMetadata::default(),
            prefix: Some(Vec::new()),
            window: None,
            offset: 0,
            line: Vec::new(),
            line_len: 0,
            line_start: 0,
            after_cr: false,
            line_count: 0,
            line_severity: Severity::Info,
            skip_bytes: 0,
            skip_lines: 0,
            in_pjl: false,
            saw_first_line: false,
            stage: Stage::Header,
            open: true,
            explicit: false,
            before_eof: None,
            reported_early_eof: false,
            seen: HashSet::new(),
            atend: HashSet::new(),
            blocks: Vec::new(),
            document_depth: 0,
            comments: Some(Span::open(0)),
            preview: None,
            defaults: None,
            prolog: None,
            setup: None,
            trailers: Vec::new(),
            early_trailer: false,
            fixed_up: false,
        }
    }

    /// Install an error handler; without one every anomaly is accepted.
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'a) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Replace or remove the error handler.
    pub fn set_error_handler(&mut self, handler: Option<Box<dyn ErrorHandler + 'a>>) {
        self.error_handler = handler;
    }

    /// Feeding mode of this scanner.
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// The comment handler.
    pub fn comment_handler(&self) -> &H {
        &self.handler
    }

    /// Metadata gathered so far (not yet normalised by [`fixup`](Self::fixup)).
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.meta
    }

    /// Number of complete lines scanned.
    pub fn line_count(&self) -> u32 {
        self.line_count
    }

    /// Number of bytes consumed so far.
    pub fn bytes_scanned(&self) -> u64 {
        self.offset
    }

    /// Scan the next chunk of the document.
    pub fn scan_data(&mut self, buf: &[u8]) -> ScanOutcome {
        match self.status {
            Status::Stopped => return ScanOutcome::StopEarly,
            Status::Failed(_) => return ScanOutcome::Error,
            Status::Running => {}
        }
        let step = match self.prefix.take() {
            Some(mut prefix) => {
                prefix.extend_from_slice(buf);
                if prefix.len() < SNIFF_LEN && needs_more_prefix(&prefix) {
                    self.prefix = Some(prefix);
                    return ScanOutcome::Continue;
                }
                self.start(&prefix)
            }
            None => self.feed(buf),
        };
        self.settle(step)
    }

    /// Scan from `reader` in [`READ_CHUNK`] pieces until the end of input
    /// or until the scan stops.
    pub fn scan_reader<R: Read>(&mut self, mut reader: R) -> Result<ScanOutcome> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let count = match reader.read(&mut buf) {
                Ok(0) => return Ok(ScanOutcome::Continue),
                Ok(count) => count,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            match self.scan_data(&buf[..count]) {
                ScanOutcome::Continue => {}
                outcome => return Ok(outcome),
            }
        }
    }

    /// Finish scanning: flush the pending line, normalise, and return the metadata.
    pub fn finish(mut self) -> Result<DocumentMetadata> {
        if self.status == Status::Running {
            let step = match self.prefix.take() {
                Some(prefix) => self.start(&prefix),
                None => Ok(()),
            };
            self.settle(step);
        }
        if self.status == Status::Running && (self.line_len > 0 || !self.line.is_empty()) {
            let step = self.end_line();
            self.settle(step);
        }
        self.fixup();
        if let Status::Failed(line) = self.status {
            return Err(Error::ScanCancelled(line));
        }
        Ok(self.meta)
    }

    /// Tidy up incorrect or incomplete structure before the metadata is used.
    ///
    /// Closes sections that were never terminated, drops a trailer that came
    /// before its own pages, and reports unresolved `(atend)` values and page
    /// count mismatches. Running it more than once has no further effect.
    pub fn fixup(&mut self) {
        if self.fixed_up {
            return;
        }
        self.fixed_up = true;
        let complete = self.status == Status::Running;
        let end = self.data_end();

        if let Some(page) = self.meta.pages.last_mut() {
            if page.range.end <= page.range.start {
                page.range.end = end;
            }
        }

        // a trailer followed by pages belongs before them; only a trailer
        // after the last page survives
        if self.early_trailer {
            let last_page = self.meta.pages.last().map_or(0, |p| p.range.start);
            self.trailers.retain(|t| t.start > last_page);
        }

        let starts: Vec<u64> = [
            self.comments,
            self.preview,
            self.defaults,
            self.prolog,
            self.setup,
            self.trailers.last().copied(),
        ]
        .iter()
        .flatten()
        .map(|s| s.start)
        .chain(self.meta.pages.first().map(|p| p.range.start))
        .collect();
        let close = |span: Option<Span>| {
            span.map(|s| {
                let next = starts
                    .iter()
                    .copied()
                    .filter(|&b| b > s.start)
                    .min()
                    .unwrap_or(end);
                s.start..s.end.unwrap_or(next)
            })
        };

        self.meta.sections = SectionOffsets {
            comments: close(self.comments),
            preview: close(self.preview),
            defaults: close(self.defaults),
            prolog: close(self.prolog),
            setup: close(self.setup),
            trailer: close(self.trailers.last().copied()),
        };
        if self.meta.preview_kind == PreviewKind::Epsi {
            self.meta.preview_range = self.meta.sections.preview.clone();
        }

        if complete {
            let unresolved = self.atend.len();
            self.atend.clear();
            for _ in 0..unresolved {
                self.report_late(DscErrorKind::AtEnd);
            }
            if let Some(declared) = self.meta.declared_pages {
                if self.meta.page_count > 0 && declared != self.meta.page_count {
                    self.report_late(DscErrorKind::PagesWrong);
                }
            }
        }
        if self.meta.is_epsf
            && (self.meta.page_count > 1 || self.meta.declared_pages.is_some_and(|n| n > 1))
        {
            self.report_late(DscErrorKind::EpsPages);
        }
    }

    fn settle(&mut self, step: Step) -> ScanOutcome {
        match step {
            Ok(()) => ScanOutcome::Continue,
            Err(Halt::Stop) => {
                self.status = Status::Stopped;
                ScanOutcome::StopEarly
            }
            Err(Halt::Cancel) => {
                log::debug!("DSC scan cancelled at line {}", self.line_count);
                self.status = Status::Failed(self.line_count);
                ScanOutcome::Error
            }
        }
    }

    fn data_end(&self) -> u64 {
        match &self.window {
            Some(window) => self.offset.min(window.end),
            None => self.offset,
        }
    }

    /// Look at the first bytes for binary wrappers and framing, then scan them.
    fn start(&mut self, prefix: &[u8]) -> Step {
        let sniff = detect::sniff_bytes(prefix);
        match sniff.kind {
            DocumentKind::DosEps(header) => {
                log::debug!("DOS EPS header, PostScript at {:?}", header.postscript);
                self.window = Some(header.postscript.clone());
                let preview = header
                    .tiff
                    .map(|r| (PreviewKind::Tiff, r))
                    .or(header.wmf.map(|r| (PreviewKind::Wmf, r)));
                if let Some((kind, range)) = preview {
                    self.meta.preview_kind = kind;
                    self.meta.preview_range = Some(range);
                }
                self.feed(prefix)
            }
            DocumentKind::MacBinary(header) => {
                log::debug!("MacBinary EPSF, data fork at {:?}", header.data_fork);
                self.window = Some(header.data_fork.clone());
                if let Some(range) = header.resource_fork {
                    self.meta.preview_kind = PreviewKind::Pict;
                    self.meta.preview_range = Some(range);
                }
                self.feed(prefix)
            }
            _ => match sniff.framing {
                Framing::CtrlD => {
                    self.meta.has_ctrl_d = true;
                    self.offset = 1;
                    self.line_start = 1;
                    if let Some(comments) = self.comments.as_mut() {
                        comments.start = 1;
                    }
                    self.feed(&prefix[1..])
                }
                Framing::Pjl => {
                    self.meta.has_pjl = true;
                    self.in_pjl = true;
                    self.feed(prefix)
                }
                Framing::None => self.feed(prefix),
            },
        }
    }

    fn feed(&mut self, mut data: &[u8]) -> Step {
        while !data.is_empty() {
            let mut avail = data.len();
            if let Some(window) = &self.window {
                if self.offset < window.start {
                    let skip = (window.start - self.offset).min(data.len() as u64) as usize;
                    self.offset += skip as u64;
                    data = &data[skip..];
                    self.line_start = self.offset;
                    if let Some(comments) = self.comments.as_mut() {
                        comments.start = window.start;
                    }
                    continue;
                }
                if self.offset >= window.end {
                    self.offset += data.len() as u64;
                    return Ok(());
                }
                avail = avail.min((window.end - self.offset) as usize);
            }

            if self.after_cr {
                self.after_cr = false;
                if data[0] == b'\n' {
                    self.offset += 1;
                    self.line_start = self.offset;
                    data = &data[1..];
                    continue;
                }
            }

            if self.skip_bytes > 0 {
                let skip = self.skip_bytes.min(avail as u64) as usize;
                self.skip_bytes -= skip as u64;
                self.offset += skip as u64;
                self.line_start = self.offset;
                data = &data[skip..];
                continue;
            }

            let chunk = &data[..avail];
            match chunk.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(pos) => {
                    self.push_line(&chunk[..pos]);
                    self.after_cr = chunk[pos] == b'\r';
                    self.offset += pos as u64 + 1;
                    data = &data[pos + 1..];
                    self.end_line()?;
                }
                None => {
                    self.push_line(chunk);
                    self.offset += avail as u64;
                    data = &data[avail..];
                }
            }
        }
        Ok(())
    }

    fn push_line(&mut self, bytes: &[u8]) {
        let room = MAX_KEPT_LINE.saturating_sub(self.line.len());
        self.line.extend_from_slice(&bytes[..bytes.len().min(room)]);
        self.line_len += bytes.len();
    }

    fn end_line(&mut self) -> Step {
        let line = std::mem::take(&mut self.line);
        let len = self.line_len;
        let span = self.line_start..self.offset;
        self.line_len = 0;
        self.line_start = self.offset;
        let step = self.process_line(&line, len, span);
        self.line = line;
        self.line.clear();
        step
    }

    fn process_line(&mut self, line: &[u8], len: usize, span: Range<u64>) -> Step {
        self.line_count += 1;
        self.line_severity = Severity::Info;

        if self.skip_lines > 0 {
            self.skip_lines -= 1;
            return Ok(());
        }
        if self.in_pjl {
            if !line.starts_with(b"%!") {
                return Ok(());
            }
            self.in_pjl = false;
            if let Some(comments) = self.comments.as_mut() {
                comments.start = span.start;
            }
        }
        if len > MAX_DSC_LINE {
            self.report(DscErrorKind::LongLine, line)?;
        }
        if !self.saw_first_line {
            self.saw_first_line = true;
            self.first_line(line);
        }

        let comment = recognize(line);

        if self.document_depth > 0 {
            match comment.map(|c| c.name) {
                Some(CommentName::BeginDocument) => self.document_depth += 1,
                Some(CommentName::EndDocument) => self.document_depth -= 1,
                _ => {}
            }
            return Ok(());
        }

        if self.stage == Stage::Eof && !trim(line).is_empty() {
            if !self.reported_early_eof {
                self.reported_early_eof = true;
                self.report(DscErrorKind::EarlyEof, line)?;
            }
            self.stage = self.before_eof.take().unwrap_or(Stage::Trailer);
            if let Some(trailer) = self.trailers.last_mut() {
                trailer.end = None;
            }
        }

        match comment {
            Some(comment) => {
                self.structure(comment, line, &span)?;
                self.dispatch(comment.name, line)
            }
            None => self.plain_line(line, &span),
        }
    }

    fn dispatch(&mut self, name: CommentName, line: &[u8]) -> Step {
        if self.mode != ScanMode::LineDelimited {
            return Ok(());
        }
        let event = ScanEvent {
            name,
            raw_line: line,
            line_number: self.line_count,
            severity: self.line_severity,
            epsf: self.meta.is_epsf,
        };
        if self.handler.comment(&event).is_break() {
            log::trace!("scan stopped at {} (line {})", name, self.line_count);
            return Err(Halt::Stop);
        }
        Ok(())
    }

    fn first_line(&mut self, line: &[u8]) {
        if let Some(rest) = line.strip_prefix(b"%!PS-Adobe-") {
            self.meta.is_dsc = true;
            let mut tokens = rest.split(|b| b.is_ascii_whitespace()).filter(|t| !t.is_empty());
            self.meta.dsc_version = tokens.next().map(|v| String::from_utf8_lossy(v).into_owned());
            self.meta.is_epsf = tokens.any(|t| t.starts_with(b"EPSF"));
        } else if line.starts_with(b"%PDF-") {
            self.meta.is_pdf = true;
        }
    }

    /// Non-comment lines: code, blank lines, and `%` comments DSC does not define.
    fn plain_line(&mut self, line: &[u8], span: &Range<u64>) -> Step {
        let is_comment = line.first() == Some(&b'%');
        if is_comment || trim(line).is_empty() {
            return Ok(());
        }
        match (self.stage, self.open) {
            (Stage::Header, true) => {
                self.end_header(span.start, line)?;
                self.implicit_prolog(span.start);
            }
            (Stage::Preview | Stage::Defaults, true) => {
                self.report(DscErrorKind::BeginEnd, line)?;
                self.close_section(span.start);
                self.implicit_prolog(span.start);
            }
            (Stage::Header | Stage::Preview | Stage::Defaults, false) => {
                self.implicit_prolog(span.start);
            }
            _ => {}
        }
        Ok(())
    }

    fn structure(&mut self, comment: Comment<'_>, line: &[u8], span: &Range<u64>) -> Step {
        use CommentName::*;
        match comment.name {
            PsAdobe | BeginComments => {}
            EndComments => {
                if self.stage == Stage::Header && self.open {
                    self.end_header(span.end, line)?;
                } else {
                    self.report(DscErrorKind::BadSection, line)?;
                }
            }
            Pages | Creator | CreationDate | Title | For | LanguageLevel | BoundingBox
            | Orientation | PageOrder | DocumentMedia | DocumentPaperSizes | DocumentPaperForms
            | DocumentPaperColors | DocumentPaperWeights | DocumentData | Requirements
            | DocumentNeededFonts | DocumentSuppliedFonts | DocumentNeededResources
            | DocumentSuppliedResources | HiResBoundingBox | CropBox => {
                self.header_comment(comment, line)?;
            }
            BeginPreview => {
                if self.begin_section(Stage::Preview, span, line)? {
                    if self.meta.preview_kind == PreviewKind::None {
                        self.meta.preview_kind = PreviewKind::Epsi;
                    }
                    self.meta.epsi_preview = parse_epsi_header(comment.value);
                    if self.meta.epsi_preview.is_none() {
                        self.report(DscErrorKind::IncorrectUsage, line)?;
                    }
                }
            }
            EndPreview => self.end_section(Stage::Preview, span, line)?,
            BeginDefaults => {
                self.begin_section(Stage::Defaults, span, line)?;
            }
            EndDefaults => self.end_section(Stage::Defaults, span, line)?,
            BeginProlog => {
                self.begin_section(Stage::Prolog, span, line)?;
            }
            EndProlog => self.end_section(Stage::Prolog, span, line)?,
            BeginSetup => {
                self.begin_section(Stage::Setup, span, line)?;
            }
            EndSetup => self.end_section(Stage::Setup, span, line)?,
            Page => self.page(comment, line, span)?,
            PageBoundingBox => {
                if self.stage == Stage::Pages {
                    match parse_bbox(comment.value) {
                        Some((bbox, exact)) => {
                            if !exact {
                                self.report(DscErrorKind::BBox, line)?;
                            }
                            if let Some(page) = self.meta.pages.last_mut() {
                                page.bounding_box = Some(bbox);
                            }
                        }
                        None => self.report(DscErrorKind::BBox, line)?,
                    }
                }
            }
            PageMedia => {
                let name = String::from_utf8_lossy(first_token(comment.value));
                if !self.meta.media.is_empty() && !self.meta.media.iter().any(|m| m.name == name) {
                    self.report(DscErrorKind::NoMedia, line)?;
                }
            }
            BeginFont | BeginFeature | BeginResource | BeginProcSet | BeginPageSetup => {
                if let Some(end) = comment.name.closing() {
                    self.blocks.push(end);
                }
            }
            EndFont | EndFeature | EndResource | EndProcSet | EndPageSetup => {
                debug_assert!(comment.name.is_block_end());
                if self.blocks.last() == Some(&comment.name) {
                    self.blocks.pop();
                } else {
                    self.report(DscErrorKind::BeginEnd, line)?;
                }
            }
            BeginDocument => self.document_depth += 1,
            EndDocument => self.report(DscErrorKind::BeginEnd, line)?,
            BeginData => {
                let mut tokens = tokens(comment.value);
                match tokens.next().and_then(parse_u64) {
                    Some(count) => {
                        if tokens.nth(1).is_some_and(|unit| unit.eq_ignore_ascii_case(b"Lines")) {
                            self.skip_lines = count;
                        } else {
                            self.skip_bytes = count;
                        }
                    }
                    None => self.report(DscErrorKind::IncorrectUsage, line)?,
                }
            }
            BeginBinary => match tokens(comment.value).next().and_then(parse_u64) {
                Some(count) => self.skip_bytes = count,
                None => self.report(DscErrorKind::IncorrectUsage, line)?,
            },
            Trailer => self.trailer(line, span)?,
            Eof => {
                if let Some(page) = self.meta.pages.last_mut() {
                    if self.stage == Stage::Pages {
                        page.range.end = span.start;
                    }
                }
                if let Some(trailer) = self.trailers.last_mut() {
                    if self.stage == Stage::Trailer {
                        trailer.end = Some(span.end);
                    }
                }
                self.before_eof = Some(self.stage);
                self.stage = Stage::Eof;
            }
            PageTrailer | PageOrientation | IncludeFont | IncludeResource | ViewingOrientation
            | Feature | PaperColor | PaperForm | PaperWeight | PaperSize | EndData
            | EndBinary => {}
        }
        Ok(())
    }

    fn header_comment(&mut self, comment: Comment<'_>, line: &[u8]) -> Step {
        let name = comment.name;
        let value = comment.value;

        if self.stage == Stage::Trailer {
            // the trailer only supplies values the header deferred
            if self.atend.remove(&name) {
                self.apply_header_value(name, value, line)?;
            }
            return Ok(());
        }
        if !(self.stage == Stage::Header && self.open) {
            return self.report(DscErrorKind::BadSection, line);
        }
        if !comment.has_colon && !value.is_empty() {
            self.report(DscErrorKind::IncorrectUsage, line)?;
        }
        if !self.seen.insert(name) && name != CommentName::DocumentMedia {
            return self.report(DscErrorKind::DuplicateComment, line);
        }
        if value == b"(atend)" {
            self.atend.insert(name);
            return Ok(());
        }
        self.apply_header_value(name, value, line)
    }

    fn apply_header_value(&mut self, name: CommentName, value: &[u8], line: &[u8]) -> Step {
        let valid = match name {
            CommentName::BoundingBox => match parse_bbox(value) {
                Some((bbox, exact)) => {
                    self.meta.bounding_box = Some(bbox);
                    if !exact {
                        self.report(DscErrorKind::BBox, line)?;
                    }
                    true
                }
                None => return self.report(DscErrorKind::BBox, line),
            },
            CommentName::HiResBoundingBox => {
                self.meta.hires_bounding_box = parse_hires(value);
                self.meta.hires_bounding_box.is_some()
            }
            CommentName::CropBox => {
                self.meta.crop_box = parse_hires(value);
                self.meta.crop_box.is_some()
            }
            CommentName::Pages => {
                let mut parts = tokens(value);
                match parts.next().and_then(parse_u32) {
                    Some(count) => {
                        self.meta.declared_pages = Some(count);
                        // DSC 2.0 put the page order here
                        let order = match parts.next() {
                            Some(b"-1") => Some(PageOrder::Descend),
                            Some(b"1") => Some(PageOrder::Ascend),
                            Some(b"0") => Some(PageOrder::Special),
                            _ => None,
                        };
                        if order.is_some() {
                            self.meta.page_order = order;
                        }
                        true
                    }
                    None => false,
                }
            }
            CommentName::LanguageLevel => {
                self.meta.language_level = parse_u32(value);
                self.meta.language_level.is_some()
            }
            CommentName::Title => {
                self.meta.title = Some(text_value(value));
                true
            }
            CommentName::Creator => {
                self.meta.creator = Some(text_value(value));
                true
            }
            CommentName::CreationDate => {
                self.meta.creation_date = Some(text_value(value));
                true
            }
            CommentName::For => {
                self.meta.for_whom = Some(text_value(value));
                true
            }
            CommentName::Orientation => {
                self.meta.orientation = match value {
                    b"Portrait" => Some(Orientation::Portrait),
                    b"Landscape" => Some(Orientation::Landscape),
                    _ => None,
                };
                self.meta.orientation.is_some()
            }
            CommentName::PageOrder => {
                let order = match value {
                    b"Ascend" => Some(PageOrder::Ascend),
                    b"Descend" => Some(PageOrder::Descend),
                    b"Special" => Some(PageOrder::Special),
                    _ => None,
                };
                if order.is_some() {
                    self.meta.page_order = order;
                }
                order.is_some()
            }
            CommentName::DocumentData => {
                self.meta.document_data = match value {
                    b"Clean7Bit" => Some(DocumentData::Clean7Bit),
                    b"Clean8Bit" => Some(DocumentData::Clean8Bit),
                    b"Binary" => Some(DocumentData::Binary),
                    _ => None,
                };
                self.meta.document_data.is_some()
            }
            CommentName::DocumentMedia => match parse_media(value) {
                Some(media) => {
                    self.meta.media.push(media);
                    true
                }
                None => false,
            },
            _ => true,
        };
        if valid {
            Ok(())
        } else {
            self.report(DscErrorKind::IncorrectUsage, line)
        }
    }

    fn end_header(&mut self, at: u64, line: &[u8]) -> Step {
        if let Some(comments) = self.comments.as_mut() {
            comments.end = Some(at);
        }
        self.open = false;
        if self.meta.is_epsf
            && self.meta.bounding_box.is_none()
            && !self.atend.contains(&CommentName::BoundingBox)
        {
            self.report(DscErrorKind::EpsNoBBox, line)?;
        }
        Ok(())
    }

    fn implicit_prolog(&mut self, at: u64) {
        if self.prolog.is_none() && self.stage < Stage::Prolog {
            self.stage = Stage::Prolog;
            self.open = true;
            self.explicit = false;
            self.prolog = Some(Span::open(at));
        }
    }

    fn span_mut(&mut self, stage: Stage) -> Option<&mut Option<Span>> {
        match stage {
            Stage::Header => Some(&mut self.comments),
            Stage::Preview => Some(&mut self.preview),
            Stage::Defaults => Some(&mut self.defaults),
            Stage::Prolog => Some(&mut self.prolog),
            Stage::Setup => Some(&mut self.setup),
            Stage::Pages | Stage::Trailer | Stage::Eof => None,
        }
    }

    /// Close whatever section is open at `at`.
    fn close_section(&mut self, at: u64) {
        if !self.open {
            return;
        }
        match self.stage {
            Stage::Pages => {
                if let Some(page) = self.meta.pages.last_mut() {
                    page.range.end = at;
                }
            }
            Stage::Trailer | Stage::Eof => {}
            stage => {
                if let Some(Some(span)) = self.span_mut(stage) {
                    span.end = Some(at);
                }
            }
        }
        self.open = false;
        self.explicit = false;
    }

    /// Close the current section before `next` starts; unterminated preview
    /// and defaults sections are reported.
    fn leave_section(&mut self, at: u64, line: &[u8]) -> Step {
        if self.stage == Stage::Header && self.open {
            return self.end_header(at, line);
        }
        if self.open
            && self.explicit
            && matches!(self.stage, Stage::Preview | Stage::Defaults)
        {
            self.report(DscErrorKind::BeginEnd, line)?;
        }
        self.close_section(at);
        Ok(())
    }

    /// Returns whether the section was opened.
    fn begin_section(&mut self, stage: Stage, span: &Range<u64>, line: &[u8]) -> std::result::Result<bool, Halt> {
        let already = self.span_mut(stage).is_some_and(|s| s.is_some());
        if stage < self.stage || already {
            self.report(DscErrorKind::BadSection, line)?;
            return Ok(false);
        }
        self.leave_section(span.start, line)?;
        self.stage = stage;
        self.open = true;
        self.explicit = true;
        if let Some(slot) = self.span_mut(stage) {
            *slot = Some(Span::open(span.start));
        }
        Ok(true)
    }

    fn end_section(&mut self, stage: Stage, span: &Range<u64>, line: &[u8]) -> Step {
        if self.stage == stage && self.open {
            if let Some(Some(s)) = self.span_mut(stage) {
                s.end = Some(span.end);
            }
            self.open = false;
            self.explicit = false;
            return Ok(());
        }
        if stage == Stage::Prolog && self.stage < Stage::Prolog && self.prolog.is_none() {
            // empty prolog with only its closing comment
            self.leave_section(span.start, line)?;
            self.stage = Stage::Prolog;
            self.prolog = Some(Span {
                start: span.start,
                end: Some(span.end),
            });
            return Ok(());
        }
        self.report(DscErrorKind::BeginEnd, line)
    }

    fn page(&mut self, comment: Comment<'_>, line: &[u8], span: &Range<u64>) -> Step {
        if self.stage == Stage::Trailer {
            self.report(DscErrorKind::PageInTrailer, line)?;
            self.early_trailer = true;
            if let Some(trailer) = self.trailers.last_mut() {
                trailer.end.get_or_insert(span.start);
            }
            self.open = true;
        }
        if self.stage != Stage::Pages {
            self.leave_section(span.start, line)?;
        } else if let Some(page) = self.meta.pages.last_mut() {
            page.range.end = span.start;
        }

        let (label, ordinal) = match parse_page(comment.value) {
            Some(parsed) => parsed,
            None => {
                self.report(DscErrorKind::IncorrectUsage, line)?;
                let next = self.meta.page_count + 1;
                (next.to_string(), next)
            }
        };
        if let Some(previous) = self.meta.pages.last() {
            if previous.ordinal.checked_add(1) != Some(ordinal) {
                self.report(DscErrorKind::PageOrdinal, line)?;
            }
        }

        self.stage = Stage::Pages;
        self.open = true;
        self.explicit = false;
        self.blocks.clear();
        self.meta.page_count += 1;
        self.meta.pages.push(PageEntry {
            label,
            ordinal,
            range: span.start..span.start,
            bounding_box: None,
        });
        Ok(())
    }

    fn trailer(&mut self, line: &[u8], span: &Range<u64>) -> Step {
        if !self.trailers.is_empty() {
            self.report(DscErrorKind::DuplicateTrailer, line)?;
            if let Some(previous) = self.trailers.last_mut() {
                previous.end.get_or_insert(span.start);
            }
        } else if self.meta.pages.is_empty()
            && (self.meta.declared_pages.unwrap_or(0) > 0
                || self.atend.contains(&CommentName::Pages))
        {
            self.report(DscErrorKind::EarlyTrailer, line)?;
        }
        if self.stage != Stage::Trailer {
            self.leave_section(span.start, line)?;
        }
        self.stage = Stage::Trailer;
        self.open = true;
        self.explicit = false;
        self.trailers.push(Span::open(span.start));
        Ok(())
    }

    fn report(&mut self, kind: DscErrorKind, line: &[u8]) -> Step {
        let severity = kind.severity();
        self.line_severity = self.line_severity.max(severity);
        if self.ignore_errors {
            return Ok(());
        }
        let Some(handler) = self.error_handler.as_mut() else {
            return Ok(());
        };
        let error = DscError {
            kind,
            severity,
            line: line.to_vec(),
            line_number: self.line_count,
        };
        match handler.error(&error) {
            ErrorResponse::Ok => Ok(()),
            ErrorResponse::IgnoreAll => {
                self.ignore_errors = true;
                Ok(())
            }
            ErrorResponse::Cancel => Err(Halt::Cancel),
        }
    }

    /// Report an anomaly found during [`fixup`](Self::fixup), after the last line.
    fn report_late(&mut self, kind: DscErrorKind) {
        if self.report(kind, &[]).is_err() {
            self.status = Status::Failed(self.line_count);
        }
    }
}

/// Scan a whole file in whole-buffer mode.
pub fn scan_file<P: AsRef<Path>>(path: P) -> Result<DocumentMetadata> {
    let file = File::open(path)?;
    let mut scanner = DscScanner::new();
    scanner.scan_reader(file)?;
    scanner.finish()
}

/// DOS EPS and MacBinary headers start with bytes that plain PostScript never does.
fn needs_more_prefix(prefix: &[u8]) -> bool {
    matches!(prefix.first(), None | Some(0xC5) | Some(0x00))
}

fn tokens(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
}

fn first_token(value: &[u8]) -> &[u8] {
    tokens(value).next().unwrap_or_default()
}

fn parse_u32(token: &[u8]) -> Option<u32> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn parse_u64(token: &[u8]) -> Option<u64> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn parse_f64(token: &[u8]) -> Option<f64> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

/// Parse four coordinates; fractional values are widened outwards and
/// flagged as inexact.
fn parse_bbox(value: &[u8]) -> Option<(BoundingBox, bool)> {
    let parts: Vec<&[u8]> = tokens(value).take(4).collect();
    if parts.len() != 4 {
        return None;
    }
    let mut exact = true;
    let mut coords = [0i32; 4];
    for (i, part) in parts.iter().enumerate() {
        coords[i] = match std::str::from_utf8(part).ok()?.parse::<i32>() {
            Ok(v) => v,
            Err(_) => {
                let v = parse_f64(part)?;
                exact = false;
                if i < 2 {
                    v.floor() as i32
                } else {
                    v.ceil() as i32
                }
            }
        };
    }
    Some((
        BoundingBox::new(coords[0], coords[1], coords[2], coords[3]),
        exact,
    ))
}

fn parse_hires(value: &[u8]) -> Option<HiResBoundingBox> {
    let coords: Vec<f64> = tokens(value).take(4).map(parse_f64).collect::<Option<_>>()?;
    match coords[..] {
        [llx, lly, urx, ury] => Some(HiResBoundingBox { llx, lly, urx, ury }),
        _ => None,
    }
}

fn parse_media(value: &[u8]) -> Option<Media> {
    let mut parts = tokens(value);
    let name = String::from_utf8_lossy(parts.next()?).into_owned();
    let width = parse_f64(parts.next()?)?;
    let height = parse_f64(parts.next()?)?;
    Some(Media {
        name,
        width,
        height,
    })
}

fn parse_epsi_header(value: &[u8]) -> Option<EpsiHeader> {
    let mut parts = tokens(value).map(parse_u32);
    let width = parts.next()??;
    let height = parts.next()??;
    let depth = parts.next()??;
    let lines = parts.next().flatten();
    Some(EpsiHeader {
        width,
        height,
        depth,
        lines,
    })
}

/// `%%Page: label ordinal` where the label may be a parenthesised string.
fn parse_page(value: &[u8]) -> Option<(String, u32)> {
    let split = value.iter().rposition(|b| b.is_ascii_whitespace())?;
    let ordinal = parse_u32(&value[split + 1..])?;
    let label = text_value(trim(&value[..split]));
    Some((label, ordinal))
}

/// DSC text values, with the parentheses of a PostScript string removed.
fn text_value(value: &[u8]) -> String {
    let inner = match value {
        [b'(', inner @ .., b')'] => inner,
        other => other,
    };
    String::from_utf8_lossy(inner).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const EPSI_DOC: &[u8] = b"%!PS-Adobe-3.0 EPSF-3.0\n\
%%BoundingBox: 0 0 4 4\n\
%%Title: (square)\n\
%%EndComments\n\
%%BeginPreview: 4 4 1 4\n\
% F0\n\
% F0\n\
% 0F\n\
% 0F\n\
%%EndPreview\n\
%%BeginProlog\n\
/box { 0 0 4 4 rectfill } def\n\
%%EndProlog\n\
%%Page: 1 1\n\
box\n\
showpage\n\
%%Trailer\n\
%%EOF\n";

    fn scan_all(data: &[u8]) -> DocumentMetadata {
        let mut scanner = DscScanner::new();
        assert_eq!(scanner.scan_data(data), ScanOutcome::Continue);
        scanner.finish().unwrap()
    }

    #[test]
    fn test_stops_at_end_comments() {
        let mut scanner = DscScanner::with_comment_handler(crate::dsc::HeaderOnlyHandler::new());
        let outcome = scanner.scan_data(
            b"%!PS-Adobe-3.0\n%%BoundingBox: 0 0 100 100\n%%EndComments\n%%Page: 1 1\n",
        );
        assert_eq!(outcome, ScanOutcome::StopEarly);
        assert_eq!(
            scanner.comment_handler().stopped_at(),
            Some(CommentName::EndComments)
        );
        // later data is ignored
        assert_eq!(scanner.scan_data(b"%%Pages: 9\n"), ScanOutcome::StopEarly);

        let meta = scanner.finish().unwrap();
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 0, 100, 100)));
        assert_eq!(meta.page_count, 0);
        assert_eq!(meta.declared_pages, None);
    }

    #[test]
    fn test_full_scan_records_structure() {
        let meta = scan_all(EPSI_DOC);
        assert!(meta.is_dsc);
        assert!(meta.is_epsf);
        assert_eq!(meta.dsc_version.as_deref(), Some("3.0"));
        assert_eq!(meta.title.as_deref(), Some("square"));
        assert_eq!(meta.preview_kind, PreviewKind::Epsi);
        assert_eq!(
            meta.epsi_preview,
            Some(EpsiHeader {
                width: 4,
                height: 4,
                depth: 1,
                lines: Some(4)
            })
        );
        assert_eq!(meta.page_count, 1);
        assert_eq!(meta.pages[0].label, "1");

        let range = meta.preview_range.clone().unwrap();
        let preview = &EPSI_DOC[range.start as usize..range.end as usize];
        assert!(preview.starts_with(b"%%BeginPreview: 4 4 1 4"));
        assert!(preview.ends_with(b"%%EndPreview\n"));

        let prolog = meta.sections.prolog.clone().unwrap();
        assert!(EPSI_DOC[prolog.start as usize..].starts_with(b"%%BeginProlog"));
        let trailer = meta.sections.trailer.clone().unwrap();
        assert_eq!(trailer.end, EPSI_DOC.len() as u64);
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let whole = scan_all(EPSI_DOC);
        for size in [1, 2, 3, 7, 64] {
            let mut scanner = DscScanner::new();
            for chunk in EPSI_DOC.chunks(size) {
                assert_eq!(scanner.scan_data(chunk), ScanOutcome::Continue);
            }
            assert_eq!(scanner.finish().unwrap(), whole, "chunk size {size}");
        }
    }

    #[test]
    fn test_header_only_keeps_epsi_preview() {
        let mut scanner = DscScanner::with_comment_handler(crate::dsc::HeaderOnlyHandler::new());
        assert_eq!(scanner.scan_data(EPSI_DOC), ScanOutcome::StopEarly);
        assert_eq!(
            scanner.comment_handler().stopped_at(),
            Some(CommentName::EndPreview)
        );
        let meta = scanner.finish().unwrap();
        assert_eq!(meta.preview_kind, PreviewKind::Epsi);
        assert!(meta.preview_range.is_some());
        assert_eq!(meta.page_count, 0);
    }

    #[test]
    fn test_crlf_line_endings() {
        let meta = scan_all(b"%!PS-Adobe-3.0\r\n%%BoundingBox: 1 2 3 4\r\n%%Pages: 1\r\n%%EndComments\r\n%%Page: 1 1\r\n");
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(1, 2, 3, 4)));
        assert_eq!(meta.declared_pages, Some(1));
        assert_eq!(meta.page_count, 1);
    }

    #[test]
    fn test_atend_resolved_from_trailer() {
        let meta = scan_all(
            b"%!PS-Adobe-3.0\n%%BoundingBox: (atend)\n%%Pages: (atend)\n%%EndComments\n\
%%Page: 1 1\n%%Page: 2 2\n%%Trailer\n%%BoundingBox: 0 0 612 792\n%%Pages: 2\n%%EOF\n",
        );
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 0, 612, 792)));
        assert_eq!(meta.declared_pages, Some(2));
        assert_eq!(meta.page_count, 2);
    }

    #[test]
    fn test_header_value_wins_over_trailer() {
        let meta = scan_all(
            b"%!PS-Adobe-3.0\n%%BoundingBox: 0 0 10 10\n%%EndComments\n%%Trailer\n%%BoundingBox: 0 0 99 99\n",
        );
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 0, 10, 10)));
    }

    #[test]
    fn test_fractional_bbox_is_widened() {
        let errors = RefCell::new(Vec::new());
        let mut scanner = DscScanner::new().with_error_handler(|e: &DscError| {
            errors.borrow_mut().push(e.kind);
            ErrorResponse::Ok
        });
        scanner.scan_data(b"%!PS-Adobe-3.0\n%%BoundingBox: 0.5 1.5 10.2 20.7\n%%EndComments\n");
        let meta = scanner.finish().unwrap();
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 1, 11, 21)));
        assert_eq!(errors.borrow().as_slice(), &[DscErrorKind::BBox]);
    }

    #[test]
    fn test_error_handler_cancel() {
        let mut scanner = DscScanner::new()
            .with_error_handler(|_: &DscError| ErrorResponse::Cancel);
        let outcome = scanner.scan_data(b"%!PS-Adobe-3.0\n%%BoundingBox: a b c d\n%%EndComments\n");
        assert_eq!(outcome, ScanOutcome::Error);
        assert_eq!(scanner.scan_data(b"more\n"), ScanOutcome::Error);
        assert!(matches!(scanner.finish(), Err(Error::ScanCancelled(2))));
    }

    #[test]
    fn test_error_handler_ignore_all() {
        let calls = RefCell::new(0);
        let mut scanner = DscScanner::new().with_error_handler(|_: &DscError| {
            *calls.borrow_mut() += 1;
            ErrorResponse::IgnoreAll
        });
        scanner.scan_data(
            b"%!PS-Adobe-3.0\n%%BoundingBox: a b c d\n%%Title: x\n%%Title: y\n%%EndComments\n%%EndPreview\n",
        );
        scanner.finish().unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_without_handler_errors_are_accepted() {
        let meta = scan_all(b"%!PS-Adobe-3.0\n%%Trailer\n%%Trailer\n%%EndProlog\n%%EndPreview\n");
        assert_eq!(meta.page_count, 0);
    }

    #[test]
    fn test_duplicate_header_comment_keeps_first() {
        let meta = scan_all(b"%!PS-Adobe-3.0\n%%Title: first\n%%Title: second\n%%EndComments\n");
        assert_eq!(meta.title.as_deref(), Some("first"));
    }

    #[test]
    fn test_implicit_header_end() {
        let meta = scan_all(b"%!PS-Adobe-2.0\n%%Creator: test\n/foo 1 def\n%%BoundingBox: 0 0 1 1\n");
        assert_eq!(meta.creator.as_deref(), Some("test"));
        // header was over before the bounding box
        assert_eq!(meta.bounding_box, None);
        assert_eq!(meta.sections.comments, Some(0..31));
        assert_eq!(meta.sections.prolog.clone().map(|r| r.start), Some(31));
    }

    #[test]
    fn test_early_trailer_is_dropped_by_fixup() {
        let errors = RefCell::new(Vec::new());
        let mut scanner = DscScanner::new().with_error_handler(|e: &DscError| {
            errors.borrow_mut().push(e.kind);
            ErrorResponse::Ok
        });
        scanner.scan_data(
            b"%!PS-Adobe-3.0\n%%Pages: 2\n%%EndComments\n%%Trailer\n%%Page: 1 1\n%%Page: 2 2\n",
        );
        let meta = scanner.finish().unwrap();
        assert_eq!(meta.page_count, 2);
        assert_eq!(meta.sections.trailer, None);
        let errors = errors.into_inner();
        assert!(errors.contains(&DscErrorKind::EarlyTrailer));
        assert!(errors.contains(&DscErrorKind::PageInTrailer));
        assert!(!errors.contains(&DscErrorKind::PagesWrong));
    }

    #[test]
    fn test_pages_wrong_and_ordinal() {
        let errors = RefCell::new(Vec::new());
        let mut scanner = DscScanner::new().with_error_handler(|e: &DscError| {
            errors.borrow_mut().push(e.kind);
            ErrorResponse::Ok
        });
        scanner.scan_data(b"%!PS-Adobe-3.0\n%%Pages: 3\n%%EndComments\n%%Page: 1 1\n%%Page: 3 3\n%%EOF\n");
        scanner.finish().unwrap();
        let errors = errors.into_inner();
        assert!(errors.contains(&DscErrorKind::PageOrdinal));
        assert!(errors.contains(&DscErrorKind::PagesWrong));
    }

    #[test]
    fn test_maximal_ordinal_does_not_overflow() {
        let errors = RefCell::new(Vec::new());
        let mut scanner = DscScanner::new().with_error_handler(|e: &DscError| {
            errors.borrow_mut().push(e.kind);
            ErrorResponse::Ok
        });
        scanner.scan_data(b"%!PS-Adobe-3.0\n%%EndComments\n%%Page: 1 4294967295\n%%Page: 2 2\n");
        let meta = scanner.finish().unwrap();
        assert_eq!(meta.page_count, 2);
        assert_eq!(meta.pages[0].ordinal, u32::MAX);
        assert!(errors.into_inner().contains(&DscErrorKind::PageOrdinal));
    }

    #[test]
    fn test_eps_without_bbox_reported() {
        let errors = RefCell::new(Vec::new());
        let mut scanner = DscScanner::new().with_error_handler(|e: &DscError| {
            errors.borrow_mut().push((e.kind, e.severity));
            ErrorResponse::Ok
        });
        scanner.scan_data(b"%!PS-Adobe-3.0 EPSF-3.0\n%%Title: x\n%%EndComments\n");
        scanner.finish().unwrap();
        assert_eq!(
            errors.into_inner(),
            vec![(DscErrorKind::EpsNoBBox, Severity::Error)]
        );
    }

    #[test]
    fn test_embedded_document_is_skipped() {
        let meta = scan_all(
            b"%!PS-Adobe-3.0\n%%EndComments\n%%Page: 1 1\n%%BeginDocument: inner.eps\n\
%!PS-Adobe-3.0 EPSF-3.0\n%%BoundingBox: 0 0 5 5\n%%Page: 1 1\n%%EndDocument\n%%Page: 2 2\n",
        );
        assert_eq!(meta.page_count, 2);
        assert_eq!(meta.bounding_box, None);
    }

    #[test]
    fn test_binary_data_is_skipped() {
        let mut doc = b"%!PS-Adobe-3.0\n%%EndComments\n%%BeginData: 6 Binary Bytes\n".to_vec();
        doc.extend_from_slice(b"\n%%Pa\n");
        doc.extend_from_slice(b"%%EndData\n%%Page: 1 1\n");
        let meta = scan_all(&doc);
        assert_eq!(meta.page_count, 1);
    }

    #[test]
    fn test_ctrl_d_and_pjl_framing() {
        let meta = scan_all(b"\x04%!PS-Adobe-3.0\n%%BoundingBox: 0 0 1 1\n");
        assert!(meta.has_ctrl_d);
        assert!(meta.is_malformed());
        assert!(meta.is_dsc);

        let meta = scan_all(
            b"\x1b%-12345X@PJL JOB\n@PJL ENTER LANGUAGE = POSTSCRIPT\n%!PS-Adobe-3.0\n%%BoundingBox: 0 0 2 2\n",
        );
        assert!(meta.has_pjl);
        assert!(meta.is_dsc);
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 0, 2, 2)));
    }

    #[test]
    fn test_dos_eps_header() {
        let ps = b"%!PS-Adobe-3.0 EPSF-3.0\n%%BoundingBox: 0 0 8 8\n%%EndComments\n";
        let tiff = [0x49u8, 0x49, 0x2a, 0x00, 0, 0, 0, 0];
        let mut doc = vec![0xC5, 0xD0, 0xD3, 0xC6];
        doc.extend_from_slice(&30u32.to_le_bytes());
        doc.extend_from_slice(&(ps.len() as u32).to_le_bytes());
        doc.extend_from_slice(&0u32.to_le_bytes());
        doc.extend_from_slice(&0u32.to_le_bytes());
        doc.extend_from_slice(&(30 + ps.len() as u32).to_le_bytes());
        doc.extend_from_slice(&(tiff.len() as u32).to_le_bytes());
        doc.extend_from_slice(&[0xff, 0xff]);
        doc.extend_from_slice(ps);
        doc.extend_from_slice(&tiff);

        let meta = scan_all(&doc);
        assert_eq!(meta.preview_kind, PreviewKind::Tiff);
        let start = 30 + ps.len() as u64;
        assert_eq!(meta.preview_range, Some(start..start + 8));
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 0, 8, 8)));
        assert_eq!(meta.sections.comments.map(|r| r.start), Some(30));
    }

    #[test]
    fn test_long_line_reported_once_and_bounded() {
        let errors = RefCell::new(Vec::new());
        let mut scanner = DscScanner::new().with_error_handler(|e: &DscError| {
            errors.borrow_mut().push((e.kind, e.line.len()));
            ErrorResponse::Ok
        });
        let mut doc = b"%!PS-Adobe-3.0\n%%EndComments\n".to_vec();
        doc.extend(std::iter::repeat(b'A').take(10_000));
        doc.push(b'\n');
        scanner.scan_data(&doc);
        scanner.finish().unwrap();
        assert_eq!(
            errors.into_inner(),
            vec![(DscErrorKind::LongLine, MAX_KEPT_LINE)]
        );
    }

    #[test]
    fn test_events_only_in_line_mode() {
        struct Recorder(Vec<(CommentName, u32)>);
        impl CommentHandler for Recorder {
            fn comment(&mut self, event: &ScanEvent<'_>) -> std::ops::ControlFlow<()> {
                self.0.push((event.name, event.line_number));
                std::ops::ControlFlow::Continue(())
            }
        }

        let mut scanner = DscScanner::with_comment_handler(Recorder(Vec::new()));
        assert_eq!(scanner.mode(), ScanMode::LineDelimited);
        scanner.scan_data(b"%!PS-Adobe-3.0\n%%Title: t\n/x 1 def\n%%Page: 1 1\n%%EO");
        scanner.scan_data(b"F\n");
        let names = &scanner.comment_handler().0;
        assert_eq!(
            names,
            &vec![
                (CommentName::PsAdobe, 1),
                (CommentName::Title, 2),
                (CommentName::Page, 4),
                (CommentName::Eof, 5),
            ]
        );
        assert_eq!(DscScanner::new().mode(), ScanMode::WholeBuffer);
    }

    #[test]
    fn test_partial_last_line_is_flushed() {
        let meta = scan_all(b"%!PS-Adobe-3.0\n%%BoundingBox: 0 0 3 3");
        assert_eq!(meta.bounding_box, Some(BoundingBox::new(0, 0, 3, 3)));
    }

    #[test]
    fn test_scan_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, EPSI_DOC).unwrap();
        let meta = scan_file(file.path()).unwrap();
        assert_eq!(meta.page_count, 1);
        assert!(meta.sections.trailer.is_some());
    }

    #[test]
    fn test_parse_page_labels() {
        assert_eq!(parse_page(b"1 1"), Some(("1".to_string(), 1)));
        assert_eq!(parse_page(b"(Cover page) 2"), Some(("Cover page".to_string(), 2)));
        assert_eq!(parse_page(b"3"), None);
    }
}
