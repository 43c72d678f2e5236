//! Document Assembler: stream `combined.xml` one page at a time.
//!
//! ```xml
//! <document>
//!   <metadata>
//!     <generator>edgequake-pdf2xml</generator>
//!     <version>1.0</version>
//!     <timestamp>2026-01-01T00:00:00Z</timestamp>
//!     <file><path>/abs/in.pdf</path><pages>12</pages><start_page>1</start_page><end_page>12</end_page></file>
//!   </metadata>
//!   <content>
//!     <page index="1">
//!       <text><![CDATA[...]]></text>
//!       <images><image index="1" path="..." width="640" height="480"/></images>
//!       <tables><table_ref engine="camelot-lattice" path="..."/></tables>
//!     </page>
//!   </content>
//! </document>
//! ```
//!
//! Pages are written as soon as they are appended; nothing already written
//! is re-serialised, so memory stays flat regardless of page count. The
//! `<images>` and `<tables>` blocks are omitted when a page has none.

use crate::error::Pdf2XmlError;
use crate::output::PageRecord;
use crate::pipeline::postprocess::clean_page_text;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Format version written into `<metadata>`.
pub const FORMAT_VERSION: &str = "1.0";

/// Document-level facts for the `<metadata>` block.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    /// Absolute input path.
    pub input: PathBuf,
    pub total_pages: usize,
    pub start_page: usize,
    pub end_page: usize,
    /// RFC 3339 generation time.
    pub timestamp: String,
}

/// Incremental writer for `combined.xml`.
pub struct DocumentAssembler<W: Write> {
    writer: Writer<W>,
    pages: usize,
}

impl<W: Write> DocumentAssembler<W> {
    /// Write the prologue and metadata, leaving `<content>` open.
    pub fn new(inner: W, meta: &DocumentMeta) -> Result<Self, quick_xml::Error> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("document")))?;

        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
        text_element(&mut writer, "generator", env!("CARGO_PKG_NAME"))?;
        text_element(&mut writer, "version", FORMAT_VERSION)?;
        text_element(&mut writer, "timestamp", &meta.timestamp)?;
        writer.write_event(Event::Start(BytesStart::new("file")))?;
        text_element(&mut writer, "path", &meta.input.to_string_lossy())?;
        text_element(&mut writer, "pages", &meta.total_pages.to_string())?;
        text_element(&mut writer, "start_page", &meta.start_page.to_string())?;
        text_element(&mut writer, "end_page", &meta.end_page.to_string())?;
        writer.write_event(Event::End(BytesEnd::new("file")))?;
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;

        writer.write_event(Event::Start(BytesStart::new("content")))?;
        Ok(Self { writer, pages: 0 })
    }

    /// Append one page. Text is cleaned here, so callers may pass raw text.
    pub fn append_page(&mut self, page: &PageRecord) -> Result<(), quick_xml::Error> {
        let w = &mut self.writer;
        let mut start = BytesStart::new("page");
        start.push_attribute(("index", page.index.to_string().as_str()));
        w.write_event(Event::Start(start))?;

        w.write_event(Event::Start(BytesStart::new("text")))?;
        let text = clean_page_text(&page.text);
        if text.is_empty() {
            w.write_event(Event::Text(BytesText::new("")))?;
        } else {
            for chunk in cdata_chunks(&text) {
                w.write_event(Event::CData(BytesCData::new(chunk)))?;
            }
        }
        w.write_event(Event::End(BytesEnd::new("text")))?;

        if !page.images.is_empty() {
            w.write_event(Event::Start(BytesStart::new("images")))?;
            for image in &page.images {
                let mut el = BytesStart::new("image");
                el.push_attribute(("index", image.index.to_string().as_str()));
                el.push_attribute(("path", image.path.to_string_lossy().as_ref()));
                el.push_attribute(("width", image.width.to_string().as_str()));
                el.push_attribute(("height", image.height.to_string().as_str()));
                w.write_event(Event::Empty(el))?;
            }
            w.write_event(Event::End(BytesEnd::new("images")))?;
        }

        if !page.tables.is_empty() {
            w.write_event(Event::Start(BytesStart::new("tables")))?;
            for table in &page.tables {
                let mut el = BytesStart::new("table_ref");
                el.push_attribute(("engine", table.engine.as_str()));
                el.push_attribute(("path", table.path.to_string_lossy().as_ref()));
                w.write_event(Event::Empty(el))?;
            }
            w.write_event(Event::End(BytesEnd::new("tables")))?;
        }

        w.write_event(Event::End(BytesEnd::new("page")))?;
        self.pages += 1;
        Ok(())
    }

    /// Pages appended so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Close the tree and hand back the flushed sink.
    pub fn finish(mut self) -> Result<W, quick_xml::Error> {
        self.writer.write_event(Event::End(BytesEnd::new("content")))?;
        self.writer.write_event(Event::End(BytesEnd::new("document")))?;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n")?;
        inner.flush()?;
        Ok(inner)
    }
}

/// Split `text` so no chunk contains `]]>`, which would end a CDATA section.
fn cdata_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        chunks.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    chunks.push(rest);
    chunks
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

// ── On-disk document ─────────────────────────────────────────────────────

/// Assembler writing to a temp file next to its final location.
pub type FileAssembler = DocumentAssembler<BufWriter<NamedTempFile>>;

/// Start a document in `dir`. Nothing appears under the final name until
/// [`persist`] succeeds.
pub fn create_in(dir: &Path, meta: &DocumentMeta) -> Result<FileAssembler, Pdf2XmlError> {
    let tmp = NamedTempFile::new_in(dir).map_err(|e| Pdf2XmlError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    DocumentAssembler::new(BufWriter::new(tmp), meta).map_err(|e| xml_write_error(dir, e))
}

/// Finish `assembler` and atomically move it to `dest`.
pub fn persist(assembler: FileAssembler, dest: &Path) -> Result<(), Pdf2XmlError> {
    let buffered = assembler.finish().map_err(|e| xml_write_error(dest, e))?;
    let tmp = buffered
        .into_inner()
        .map_err(|e| Pdf2XmlError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source: e.into_error(),
        })?;
    tmp.persist(dest).map_err(|e| Pdf2XmlError::OutputWriteFailed {
        path: dest.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

pub(crate) fn xml_write_error(path: &Path, e: quick_xml::Error) -> Pdf2XmlError {
    Pdf2XmlError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: io::Error::other(e),
    }
}

// ── Reading back ─────────────────────────────────────────────────────────

/// One page as re-read from `combined.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub index: usize,
    pub text: String,
    pub image_refs: usize,
    pub table_refs: usize,
}

/// Parse pages from a `combined.xml` stream, stopping after `limit` pages.
pub fn read_pages<R: BufRead>(source: R, limit: Option<usize>) -> Result<Vec<ParsedPage>, quick_xml::Error> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);

    let mut pages = Vec::new();
    let mut current: Option<ParsedPage> = None;
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        if limit.is_some_and(|n| pages.len() >= n) {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"page" => {
                    let index = match e.try_get_attribute("index")? {
                        Some(attr) => attr.unescape_value()?.parse().unwrap_or(0),
                        None => 0,
                    };
                    current = Some(ParsedPage {
                        index,
                        text: String::new(),
                        image_refs: 0,
                        table_refs: 0,
                    });
                }
                b"text" => in_text = current.is_some(),
                _ => {}
            },
            Event::Empty(e) => {
                if let Some(page) = current.as_mut() {
                    match e.name().as_ref() {
                        b"image" => page.image_refs += 1,
                        b"table_ref" => page.table_refs += 1,
                        _ => {}
                    }
                }
            }
            Event::CData(e) if in_text => {
                if let Some(page) = current.as_mut() {
                    page.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Text(e) if in_text => {
                if let Some(page) = current.as_mut() {
                    page.text.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"text" => in_text = false,
                b"page" => pages.extend(current.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(pages)
}

/// First `n` pages of a written document, for previews.
pub fn preview_pages(xml_path: &Path, n: usize) -> Result<Vec<ParsedPage>, Pdf2XmlError> {
    let file = File::open(xml_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Pdf2XmlError::FileNotFound {
            path: xml_path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => Pdf2XmlError::PermissionDenied {
            path: xml_path.to_path_buf(),
        },
        _ => Pdf2XmlError::Internal(format!("{}: {}", xml_path.display(), e)),
    })?;
    read_pages(BufReader::new(file), Some(n))
        .map_err(|e| Pdf2XmlError::Internal(format!("{}: {}", xml_path.display(), e)))
}
