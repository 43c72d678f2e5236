//! External engine discovery.
//!
//! Availability is decided once per run, before the first page, and never
//! changes afterwards. An engine that is missing is skipped silently by the
//! page pipeline. It is reported in the manifest, not treated as a failure.

use crate::config::{EngineSettings, ExtractionConfig, TableEngineKind};
use crate::pipeline::command;
use crate::pipeline::ocr::{OcrEngine, TesseractCli};
use crate::pipeline::tables::{CamelotCli, TableEngine, TabulaCli};
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

/// Importing camelot pulls in OpenCV and pandas; allow it some time.
const IMPORT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Which optional engines this environment provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub ocr: bool,
    pub camelot: bool,
    pub tabula: bool,
}

impl Capabilities {
    pub fn has_table_engine(&self, kind: TableEngineKind) -> bool {
        match kind {
            TableEngineKind::Camelot => self.camelot,
            TableEngineKind::Tabula => self.tabula,
        }
    }
}

/// Detect tesseract on `PATH` and the camelot / tabula Python modules.
pub fn probe(settings: &EngineSettings) -> Capabilities {
    let ocr = match which::which(&settings.tesseract_cmd) {
        Ok(path) => {
            debug!("tesseract found at {}", path.display());
            true
        }
        Err(e) => {
            debug!("tesseract not found ({}): {}", settings.tesseract_cmd, e);
            false
        }
    };

    let capabilities = Capabilities {
        ocr,
        camelot: python_module_available(&settings.python_cmd, "camelot"),
        tabula: python_module_available(&settings.python_cmd, "tabula"),
    };
    info!(
        "Engines: ocr={} camelot={} tabula={}",
        capabilities.ocr, capabilities.camelot, capabilities.tabula
    );
    capabilities
}

fn python_module_available(python: &str, module: &str) -> bool {
    let mut cmd = Command::new(python);
    cmd.arg("-c").arg(format!("import {module}"));
    match command::run(module, &mut cmd, Some(IMPORT_PROBE_TIMEOUT)) {
        Ok(()) => true,
        Err(e) => {
            debug!("{} unavailable: {}", module, e);
            false
        }
    }
}

/// The engines one run uses, plus the capabilities gating them.
pub struct Engines {
    pub capabilities: Capabilities,
    pub ocr: Option<Box<dyn OcrEngine>>,
    pub tables: Vec<Box<dyn TableEngine>>,
}

impl Engines {
    /// Probe the environment and wire up the command-line engines.
    pub fn probe(config: &ExtractionConfig) -> Self {
        let capabilities = probe(&config.engines);
        let ocr: Option<Box<dyn OcrEngine>> = capabilities.ocr.then(|| {
            Box::new(TesseractCli::new(
                config.engines.tesseract_cmd.clone(),
                Duration::from_secs(config.ocr_timeout_secs),
            )) as Box<dyn OcrEngine>
        });
        let tables: Vec<Box<dyn TableEngine>> = vec![
            Box::new(CamelotCli::new(config.engines.python_cmd.clone())),
            Box::new(TabulaCli::new(config.engines.python_cmd.clone())),
        ];
        Self::new(capabilities, ocr, tables)
    }

    /// Assemble from parts. OCR is only considered available when both the
    /// capability flag is set and an engine is supplied.
    pub fn new(
        mut capabilities: Capabilities,
        ocr: Option<Box<dyn OcrEngine>>,
        tables: Vec<Box<dyn TableEngine>>,
    ) -> Self {
        capabilities.ocr &= ocr.is_some();
        Self {
            capabilities,
            ocr,
            tables,
        }
    }

    /// Text layer and embedded images only.
    pub fn none() -> Self {
        Self::new(Capabilities::default(), None, Vec::new())
    }

    /// The OCR engine, if it may be used.
    pub fn ocr_engine(&self) -> Option<&dyn OcrEngine> {
        if self.capabilities.ocr {
            self.ocr.as_deref()
        } else {
            None
        }
    }
}
