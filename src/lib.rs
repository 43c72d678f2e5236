//! # edgequake-pdf2xml
//!
//! Stream PDF documents into a page-indexed XML file, with OCR fallback for
//! scanned pages, embedded image extraction and table detection.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate path and %PDF magic
//!  ├─ 2. Session   fresh session_<id>/ under the output root
//!  ├─ 3. Pages     for each page in range:
//!  │                 text layer → OCR if thin → images → table chain
//!  ├─ 4. Assemble  append the page to combined.xml (streamed)
//!  ├─ 5. Retention prune old sessions by age / count (optional)
//!  └─ 6. Manifest  <output_root>/manifest.json
//! ```
//!
//! Memory stays flat in the page count: each page is written out as soon as
//! it is processed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2xml::{process_pdf, ExtractionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .output_root("output")
//!         .pages(1, 10)
//!         .build()?;
//!     let manifest = process_pdf("document.pdf", &config)?;
//!     println!("{} pages → {}", manifest.pages_processed, manifest.xml.display());
//!     Ok(())
//! }
//! ```
//!
//! ## External Engines
//!
//! | Engine | Used for | Detected by |
//! |--------|----------|-------------|
//! | pdfium | text layer, rendering, images | required; bound at run start |
//! | `tesseract` | OCR of thin pages | executable on `PATH` |
//! | camelot | tables (lattice, then stream) | `python3 -c "import camelot"` |
//! | tabula | tables (guess mode) | `python3 -c "import tabula"` |
//!
//! Missing optional engines are skipped and reported in the manifest.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2xml` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edgequake-pdf2xml = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod convert;
pub mod engines;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod retention;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{preview_pages, ParsedPage};
pub use config::{
    EngineSettings, ExtractionConfig, ExtractionConfigBuilder, OcrParams, RetentionPolicy,
    TableEngineKind,
};
pub use convert::{process_pdf, process_pdf_async, process_pdf_bytes, process_pdf_with, run_document};
pub use engines::{probe, Capabilities, Engines};
pub use error::{EngineError, Pdf2XmlError};
pub use output::{ImageRecord, Manifest, PageRecord, RunStats, TableRecord, TableStatus};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use retention::{enforce_retention, RetentionReport};
pub use session::Session;
