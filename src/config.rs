//! Configuration types for PDF-to-XML extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Every field is optional and has a
//! documented default, so `ExtractionConfig::default()` is a working
//! configuration that writes to `./output`.

use crate::error::Pdf2XmlError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Render resolutions accepted for OCR rasterisation.
pub const SUPPORTED_DPI: [u32; 4] = [150, 200, 300, 400];

/// Configuration for one PDF-to-XML run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2xml::{ExtractionConfig, TableEngineKind};
///
/// let config = ExtractionConfig::builder()
///     .output_root("out")
///     .pages(3, 10)
///     .dpi(200)
///     .table_order(vec![TableEngineKind::Tabula])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Logical output root. Sessions are created underneath it and the run
    /// manifest is written at its top level. Default: `./output`.
    pub output_root: PathBuf,

    /// First page to process (1-based). Values below 1 are clamped to 1. Default: 1.
    pub start_page: usize,

    /// Last page to process (1-based, inclusive). `0` or a value beyond the
    /// document means "till the last page". Default: 0.
    pub end_page: usize,

    /// Trimmed native-text length (in characters) below which OCR is
    /// attempted. Default: 40.
    pub ocr_threshold: usize,

    /// Rasterisation DPI for OCR renders, one of [`SUPPORTED_DPI`]. Default: 300.
    pub dpi: u32,

    /// Tesseract language and mode parameters.
    pub ocr: OcrParams,

    /// Table engines in priority order. Default: camelot, then tabula.
    pub table_order: Vec<TableEngineKind>,

    /// Historical session pruning, run after the document is written. Default: off.
    pub retention: Option<RetentionPolicy>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Wall-clock budget for one tesseract invocation, in seconds. Default: 120.
    ///
    /// A hung OCR process is killed once this expires and the page keeps its
    /// native text.
    pub ocr_timeout_secs: u64,

    /// Where to find the external engines.
    pub engines: EngineSettings,

    /// Receives `(pages_done, pages_total)` after every page.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            start_page: 1,
            end_page: 0,
            ocr_threshold: 40,
            dpi: 300,
            ocr: OcrParams::default(),
            table_order: TableEngineKind::default_order(),
            retention: None,
            password: None,
            ocr_timeout_secs: 120,
            engines: EngineSettings::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("output_root", &self.output_root)
            .field("start_page", &self.start_page)
            .field("end_page", &self.end_page)
            .field("ocr_threshold", &self.ocr_threshold)
            .field("dpi", &self.dpi)
            .field("ocr", &self.ocr)
            .field("table_order", &self.table_order)
            .field("retention", &self.retention)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("engines", &self.engines)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.output_root = root.into();
        self
    }

    pub fn start_page(mut self, page: usize) -> Self {
        self.config.start_page = page.max(1);
        self
    }

    pub fn end_page(mut self, page: usize) -> Self {
        self.config.end_page = page;
        self
    }

    /// Shorthand for `start_page(start).end_page(end)`.
    pub fn pages(self, start: usize, end: usize) -> Self {
        self.start_page(start).end_page(end)
    }

    pub fn ocr_threshold(mut self, chars: usize) -> Self {
        self.config.ocr_threshold = chars;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr.language = lang.into();
        self
    }

    pub fn ocr_psm(mut self, psm: impl Into<String>) -> Self {
        self.config.ocr.psm = psm.into();
        self
    }

    pub fn ocr_oem(mut self, oem: impl Into<String>) -> Self {
        self.config.ocr.oem = oem.into();
        self
    }

    /// Set the table engine priority. Duplicates are dropped (first wins);
    /// an empty list falls back to the default order.
    pub fn table_order(mut self, order: Vec<TableEngineKind>) -> Self {
        let mut deduped = Vec::with_capacity(order.len());
        for kind in order {
            if !deduped.contains(&kind) {
                deduped.push(kind);
            }
        }
        if deduped.is_empty() {
            deduped = TableEngineKind::default_order();
        }
        self.config.table_order = deduped;
        self
    }

    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.config.retention = Some(policy);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn engines(mut self, settings: EngineSettings) -> Self {
        self.config.engines = settings;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2XmlError> {
        let c = &self.config;
        if !SUPPORTED_DPI.contains(&c.dpi) {
            return Err(Pdf2XmlError::InvalidConfig(format!(
                "DPI must be one of {:?}, got {}",
                SUPPORTED_DPI, c.dpi
            )));
        }
        c.ocr.validate()?;
        if let Some(ref policy) = c.retention {
            policy.validate()?;
        }
        if c.output_root.as_os_str().is_empty() {
            return Err(Pdf2XmlError::InvalidConfig(
                "Output root must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── OCR parameters ───────────────────────────────────────────────────────

/// Tesseract invocation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrParams {
    /// Language code(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub language: String,
    /// Page segmentation mode (`--psm`, 0–13). Default: `3`.
    pub psm: String,
    /// OCR engine mode (`--oem`, 0–3). Default: `3`.
    pub oem: String,
}

impl Default for OcrParams {
    fn default() -> Self {
        Self {
            language: "eng".into(),
            psm: "3".into(),
            oem: "3".into(),
        }
    }
}

impl OcrParams {
    fn validate(&self) -> Result<(), Pdf2XmlError> {
        let lang_ok = !self.language.is_empty()
            && self
                .language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '_');
        if !lang_ok {
            return Err(Pdf2XmlError::InvalidConfig(format!(
                "OCR language must look like 'eng' or 'eng+deu', got '{}'",
                self.language
            )));
        }
        match self.psm.parse::<u8>() {
            Ok(0..=13) => {}
            _ => {
                return Err(Pdf2XmlError::InvalidConfig(format!(
                    "OCR page segmentation mode must be 0–13, got '{}'",
                    self.psm
                )))
            }
        }
        match self.oem.parse::<u8>() {
            Ok(0..=3) => Ok(()),
            _ => Err(Pdf2XmlError::InvalidConfig(format!(
                "OCR engine mode must be 0–3, got '{}'",
                self.oem
            ))),
        }
    }
}

// ── Table engines ────────────────────────────────────────────────────────

/// The two known table-detection engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableEngineKind {
    /// Lattice detection, retried in stream mode when it finds nothing.
    Camelot,
    /// Guess-based detection returning data frames.
    Tabula,
}

impl TableEngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableEngineKind::Camelot => "camelot",
            TableEngineKind::Tabula => "tabula",
        }
    }

    pub fn default_order() -> Vec<TableEngineKind> {
        vec![TableEngineKind::Camelot, TableEngineKind::Tabula]
    }

    /// Parse a comma-separated list such as `"camelot,tabula"`.
    ///
    /// Unknown names are dropped, duplicates keep their first position and
    /// an empty result falls back to [`TableEngineKind::default_order`].
    pub fn parse_list(s: &str) -> Vec<TableEngineKind> {
        let mut order = Vec::new();
        for kind in s.split(',').filter_map(|name| name.parse().ok()) {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        if order.is_empty() {
            Self::default_order()
        } else {
            order
        }
    }
}

impl fmt::Display for TableEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableEngineKind {
    type Err = Pdf2XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camelot" => Ok(TableEngineKind::Camelot),
            "tabula" => Ok(TableEngineKind::Tabula),
            other => Err(Pdf2XmlError::InvalidConfig(format!(
                "Unknown table engine '{other}' (expected camelot or tabula)"
            ))),
        }
    }
}

// ── Retention ────────────────────────────────────────────────────────────

/// Bounds on how many historical sessions survive under an output root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at most this many sessions, newest first. Default: 5.
    pub max_sessions: usize,
    /// Remove sessions older than this many hours. Default: 24.
    pub max_age_hours: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            max_age_hours: 24.0,
        }
    }
}

impl RetentionPolicy {
    fn validate(&self) -> Result<(), Pdf2XmlError> {
        if self.max_sessions == 0 {
            return Err(Pdf2XmlError::InvalidConfig(
                "Retention must keep at least one session".into(),
            ));
        }
        if !self.max_age_hours.is_finite() || self.max_age_hours <= 0.0 {
            return Err(Pdf2XmlError::InvalidConfig(format!(
                "Retention max age must be a positive number of hours, got {}",
                self.max_age_hours
            )));
        }
        Ok(())
    }
}

// ── Engine locations ─────────────────────────────────────────────────────

/// Commands and library paths used to reach the external engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Tesseract executable. Default: `tesseract` (looked up on `PATH`).
    pub tesseract_cmd: String,
    /// Python interpreter hosting camelot / tabula. Default: `python3`.
    pub python_cmd: String,
    /// Explicit pdfium library (file or directory). Falls back to the
    /// working directory, then the system loader.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tesseract_cmd: "tesseract".into(),
            python_cmd: "python3".into(),
            pdfium_lib_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.start_page, 1);
        assert_eq!(c.end_page, 0);
        assert_eq!(c.ocr_threshold, 40);
        assert_eq!(c.dpi, 300);
        assert_eq!(c.ocr, OcrParams::default());
        assert_eq!(
            c.table_order,
            vec![TableEngineKind::Camelot, TableEngineKind::Tabula]
        );
        assert!(c.retention.is_none());
    }

    #[test]
    fn builder_rejects_unsupported_dpi() {
        let err = ExtractionConfig::builder().dpi(250).build().unwrap_err();
        assert!(err.to_string().contains("250"));
    }

    #[test]
    fn builder_clamps_start_page() {
        let c = ExtractionConfig::builder().start_page(0).build().unwrap();
        assert_eq!(c.start_page, 1);
    }

    #[test]
    fn builder_validates_ocr_modes() {
        assert!(ExtractionConfig::builder().ocr_psm("14").build().is_err());
        assert!(ExtractionConfig::builder().ocr_oem("x").build().is_err());
        assert!(ExtractionConfig::builder()
            .ocr_language("eng;rm -rf")
            .build()
            .is_err());
        assert!(ExtractionConfig::builder()
            .ocr_psm("11")
            .ocr_oem("1")
            .ocr_language("eng+deu")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_dedups_table_order() {
        let c = ExtractionConfig::builder()
            .table_order(vec![
                TableEngineKind::Tabula,
                TableEngineKind::Camelot,
                TableEngineKind::Tabula,
            ])
            .build()
            .unwrap();
        assert_eq!(
            c.table_order,
            vec![TableEngineKind::Tabula, TableEngineKind::Camelot]
        );

        let c = ExtractionConfig::builder().table_order(vec![]).build().unwrap();
        assert_eq!(c.table_order, TableEngineKind::default_order());
    }

    #[test]
    fn retention_policy_validation() {
        let bad = RetentionPolicy {
            max_sessions: 0,
            max_age_hours: 24.0,
        };
        assert!(ExtractionConfig::builder().retention(bad).build().is_err());

        let bad = RetentionPolicy {
            max_sessions: 3,
            max_age_hours: f64::NAN,
        };
        assert!(ExtractionConfig::builder().retention(bad).build().is_err());
    }

    #[test]
    fn parse_table_list() {
        assert_eq!(
            TableEngineKind::parse_list("Tabula, camelot"),
            vec![TableEngineKind::Tabula, TableEngineKind::Camelot]
        );
        assert_eq!(
            TableEngineKind::parse_list("pdfplumber,tabula"),
            vec![TableEngineKind::Tabula]
        );
        assert_eq!(
            TableEngineKind::parse_list(""),
            TableEngineKind::default_order()
        );
    }

    #[test]
    fn debug_redacts_password() {
        let c = ExtractionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
