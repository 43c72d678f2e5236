//! Top-level extraction entry points.
//!
//! ```text
//! resolve input ─▶ bind pdfium ─▶ open document      (fatal on failure,
//!                                        │             nothing written yet)
//!                                        ▼
//!                 session ─▶ page pipeline ─▶ combined.xml
//!                                        │
//!                                        ▼
//!                       retention (optional) ─▶ manifest.json
//! ```
//!
//! Everything here is synchronous. [`process_pdf_async`] moves the whole run
//! onto tokio's blocking pool for async hosts, because pdfium is not
//! async-safe.

use crate::assemble::{self, DocumentMeta};
use crate::config::ExtractionConfig;
use crate::engines::Engines;
use crate::error::Pdf2XmlError;
use crate::output::{Manifest, ManifestParams};
use crate::pipeline::input;
use crate::pipeline::page::{PagePipeline, PageRange};
use crate::pipeline::render::{self, PageSource, PdfiumSource};
use crate::retention::enforce_retention;
use crate::session::Session;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extract a PDF into a fresh session under `config.output_root`.
///
/// Probes the environment for OCR and table engines first.
///
/// # Errors
/// Only fatal conditions surface:
/// - input missing, unreadable or not a PDF
/// - pdfium cannot be bound or the document cannot be opened
/// - the output root or session directory cannot be written
///
/// Engine failures are absorbed page by page; the returned manifest records
/// what was actually produced.
pub fn process_pdf(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Manifest, Pdf2XmlError> {
    let engines = Engines::probe(config);
    process_pdf_with(input_path, config, &engines)
}

/// [`process_pdf`] with a caller-supplied engine set.
pub fn process_pdf_with(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
    engines: &Engines,
) -> Result<Manifest, Pdf2XmlError> {
    let input_path = input_path.as_ref();
    info!("Starting extraction: {}", input_path.display());

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let pdf_path = input::resolve_input(input_path)?;

    // ── Step 2: Open the document ────────────────────────────────────────
    let pdfium = render::bind_pdfium(config.engines.pdfium_lib_path.as_deref())?;
    let source = PdfiumSource::open(&pdfium, &pdf_path, config.password.as_deref())?;

    // `source` is dropped, closing the document, on every path out of here.
    run_document(&source, &pdf_path, config, engines)
}

/// Run the extraction over an already-open [`PageSource`].
///
/// `pdf_path` is what table engines read and what the outputs record.
pub fn run_document<S: PageSource + ?Sized>(
    source: &S,
    pdf_path: &Path,
    config: &ExtractionConfig,
    engines: &Engines,
) -> Result<Manifest, Pdf2XmlError> {
    let started = Utc::now();
    let total_pages = source.page_count();
    let range = PageRange::resolve(total_pages, config.start_page, config.end_page);

    // ── Step 3: Allocate the session ─────────────────────────────────────
    let session = Session::create_at(&config.output_root, pdf_path, range.start, range.end, started)?;
    let xml_path = session.xml_path();

    // ── Step 4: Stream pages into combined.xml ───────────────────────────
    let meta = DocumentMeta {
        input: pdf_path.to_path_buf(),
        total_pages,
        start_page: range.start,
        end_page: range.end,
        timestamp: rfc3339(started),
    };
    let mut document = assemble::create_in(&session.dir, &meta)?;
    let mut pipeline = PagePipeline::new(source, pdf_path, config, engines, &session);
    let stats = pipeline.run(range, |record| {
        document
            .append_page(&record)
            .map_err(|e| assemble::xml_write_error(&xml_path, e))
    })?;
    assemble::persist(document, &xml_path)?;

    // ── Step 5: Summarise ────────────────────────────────────────────────
    let mut manifest = Manifest::new(
        pdf_path,
        &session,
        xml_path,
        &stats,
        engines.capabilities,
        ManifestParams::new(config, range.start, range.end),
        rfc3339(started),
        rfc3339(Utc::now()),
    );

    if let Some(policy) = &config.retention {
        manifest.cleanup = Some(enforce_retention(&session.root, policy));
    }

    write_manifest(&manifest, &session.manifest_path())?;
    info!(
        "Extraction complete: {} pages ({} OCR), {} images, {} tables → {}",
        stats.pages,
        stats.ocr_pages,
        stats.images,
        stats.tables,
        session.dir.display()
    );
    Ok(manifest)
}

/// Run [`process_pdf`] on tokio's blocking pool.
pub async fn process_pdf_async(
    input_path: impl Into<PathBuf>,
    config: ExtractionConfig,
) -> Result<Manifest, Pdf2XmlError> {
    let input_path = input_path.into();
    tokio::task::spawn_blocking(move || process_pdf(&input_path, &config))
        .await
        .map_err(|e| Pdf2XmlError::Internal(format!("extraction task failed: {}", e)))?
}

/// Extract uploaded PDF bytes.
///
/// The bytes are saved as `<output_root>/_upload_<file_name>` (pdfium needs
/// a path) and that file is processed. The upload is left in place.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2xml::{process_pdf_bytes, ExtractionConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("report.pdf")?;
/// let manifest = process_pdf_bytes(&bytes, "report.pdf", &ExtractionConfig::default())?;
/// println!("{}", manifest.xml.display());
/// # Ok(())
/// # }
/// ```
pub fn process_pdf_bytes(
    bytes: &[u8],
    file_name: &str,
    config: &ExtractionConfig,
) -> Result<Manifest, Pdf2XmlError> {
    let path = input::persist_upload(bytes, file_name, &config.output_root)?;
    process_pdf(&path, config)
}

/// Atomically replace `path` with the pretty-printed manifest.
pub fn write_manifest(manifest: &Manifest, path: &Path) -> Result<(), Pdf2XmlError> {
    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| Pdf2XmlError::Internal(format!("manifest serialisation: {}", e)))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let write_failed = |e: std::io::Error| Pdf2XmlError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(&json).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
