//! Records produced by a run: per-page state, running totals and the manifest.

use crate::config::{ExtractionConfig, RetentionPolicy};
use crate::engines::Capabilities;
use crate::retention::RetentionReport;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One embedded raster image written to `assets/images/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 1-based index within its page.
    pub index: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// One detected table written to `tables/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Run-wide sequential index, starting at 1.
    pub index: usize,
    /// Engine label, e.g. `camelot-lattice`, `camelot-stream`, `tabula`.
    pub engine: String,
    pub path: PathBuf,
    /// 1-based page the table came from.
    pub page: usize,
}

/// Why a page ended up with the tables it has.
///
/// Not emitted into `combined.xml`; it feeds
/// [`Manifest::pages_without_table_engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// An engine produced at least one table.
    Found { engine: String },
    /// At least one configured engine was available and none found a table.
    NoneDetected,
    /// None of the configured engines is installed.
    NoEngineAvailable,
}

/// The complete extracted state for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page index.
    pub index: usize,
    /// Native or OCR text, already cleaned for XML embedding.
    pub text: String,
    pub images: Vec<ImageRecord>,
    pub tables: Vec<TableRecord>,
    /// True when OCR output replaced the native text layer.
    pub ocr_performed: bool,
    pub table_status: TableStatus,
}

/// Running totals accumulated while pages are processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub pages: usize,
    pub ocr_pages: usize,
    pub images: usize,
    pub tables: usize,
    pub pages_without_table_engine: usize,
}

impl RunStats {
    /// Fold one finished page into the totals.
    pub fn record(&mut self, page: &PageRecord) {
        self.pages += 1;
        if page.ocr_performed {
            self.ocr_pages += 1;
        }
        self.images += page.images.len();
        self.tables += page.tables.len();
        if page.table_status == TableStatus::NoEngineAvailable {
            self.pages_without_table_engine += 1;
        }
    }
}

/// Run parameters echoed into the manifest, with the page range clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestParams {
    pub start_page: usize,
    pub end_page: usize,
    pub ocr_threshold: usize,
    pub dpi: u32,
    pub ocr_lang: String,
    pub ocr_psm: String,
    pub ocr_oem: String,
    pub table_order: Vec<String>,
    pub retention: Option<RetentionPolicy>,
}

impl ManifestParams {
    pub fn new(config: &ExtractionConfig, start_page: usize, end_page: usize) -> Self {
        Self {
            start_page,
            end_page,
            ocr_threshold: config.ocr_threshold,
            dpi: config.dpi,
            ocr_lang: config.ocr.language.clone(),
            ocr_psm: config.ocr.psm.clone(),
            ocr_oem: config.ocr.oem.clone(),
            table_order: config
                .table_order
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
            retention: config.retention.clone(),
        }
    }
}

/// The durable summary of one run, persisted as `<output_root>/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub input: PathBuf,
    pub output_root: PathBuf,
    /// Session directory holding this run's outputs.
    pub output_dir: PathBuf,
    pub session_id: String,
    pub xml: PathBuf,
    pub tables_dir: PathBuf,
    pub images_dir: PathBuf,
    pub pages_processed: usize,
    pub pages_ocr: usize,
    pub images_extracted: usize,
    pub tables_extracted: usize,
    /// Pages that got zero tables only because no configured engine exists.
    pub pages_without_table_engine: usize,
    /// RFC 3339 UTC.
    pub started: String,
    /// RFC 3339 UTC.
    pub finished: String,
    pub ocr_available: bool,
    pub camelot_available: bool,
    pub tabula_available: bool,
    pub params: ManifestParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<RetentionReport>,
}

impl Manifest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        input: &Path,
        session: &Session,
        xml: PathBuf,
        stats: &RunStats,
        capabilities: Capabilities,
        params: ManifestParams,
        started: String,
        finished: String,
    ) -> Self {
        Self {
            input: input.to_path_buf(),
            output_root: session.root.clone(),
            output_dir: session.dir.clone(),
            session_id: session.id.clone(),
            xml,
            tables_dir: session.tables_dir.clone(),
            images_dir: session.images_dir.clone(),
            pages_processed: stats.pages,
            pages_ocr: stats.ocr_pages,
            images_extracted: stats.images,
            tables_extracted: stats.tables,
            pages_without_table_engine: stats.pages_without_table_engine,
            started,
            finished,
            ocr_available: capabilities.ocr,
            camelot_available: capabilities.camelot,
            tabula_available: capabilities.tabula,
            params,
            cleanup: None,
        }
    }
}
