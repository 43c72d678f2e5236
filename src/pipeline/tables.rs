//! Table Engine Chain: ordered, first-success-wins table detection per page.
//!
//! ```text
//! for engine in table_order:
//!     unavailable?          → skip (not an error, not retried)
//!     detect(pdf, page)
//!         Err               → warn, treat as zero tables, next engine
//!         Ok([])            → next engine
//!         Ok(tables)        → write tables, stop
//! ```
//!
//! Camelot is one engine with two sub-attempts: lattice first, then stream
//! when lattice finds nothing. Table files are numbered by a
//! [`TableCounter`] that lives for the whole run, so indices never restart
//! on a new page or a different engine.

use crate::config::TableEngineKind;
use crate::engines::Capabilities;
use crate::error::EngineError;
use crate::output::{TableRecord, TableStatus};
use crate::pipeline::postprocess::clean_cell_text;
use crate::pipeline::{command, degrade};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Rows of cells; `None` is a missing or NaN cell.
pub type Grid = Vec<Vec<Option<String>>>;

/// One table found by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTable {
    /// Engine label recorded in the output, e.g. `camelot-stream`.
    pub engine: String,
    pub rows: Grid,
}

/// A table-detection service.
pub trait TableEngine: Send + Sync {
    fn kind(&self) -> TableEngineKind;

    /// Detect tables on one 1-based page of `pdf`.
    fn detect(&self, pdf: &Path, page: usize) -> Result<Vec<DetectedTable>, EngineError>;
}

// ── Run-wide numbering ───────────────────────────────────────────────────

/// Monotonic table index for one document run. Starts at 1.
#[derive(Debug, Default)]
pub struct TableCounter {
    issued: usize,
}

impl TableCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next index.
    pub fn next_index(&mut self) -> usize {
        self.issued += 1;
        self.issued
    }

    /// How many indices have been handed out.
    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Give back every index handed out after `issued`.
    fn rewind(&mut self, issued: usize) {
        self.issued = issued.min(self.issued);
    }
}

/// Output file name for a table on `page` with run-wide `index`.
pub fn table_file_name(page: usize, index: usize) -> String {
    format!("page_{:06}_table_{:03}.xml", page, index)
}

// ── Chain ────────────────────────────────────────────────────────────────

/// The configured engines, in priority order, gated by availability.
pub struct TableChain<'a> {
    engines: Vec<&'a dyn TableEngine>,
    capabilities: Capabilities,
}

impl<'a> TableChain<'a> {
    /// Order `registered` by `order`. Engines missing from `registered` or
    /// from `order` are left out.
    pub fn new(
        registered: &'a [Box<dyn TableEngine>],
        order: &[TableEngineKind],
        capabilities: Capabilities,
    ) -> Self {
        let engines = order
            .iter()
            .filter_map(|kind| {
                registered
                    .iter()
                    .find(|engine| engine.kind() == *kind)
                    .map(|engine| &**engine)
            })
            .collect();
        Self {
            engines,
            capabilities,
        }
    }

    /// Run the chain for one page and write the winning tables.
    ///
    /// Engine failures are absorbed here. The only error is failing to
    /// write a table file into `tables_dir`; the page's other table files
    /// are then removed and their indices released.
    pub fn extract_page(
        &self,
        pdf: &Path,
        page: usize,
        counter: &mut TableCounter,
        tables_dir: &Path,
    ) -> Result<(Vec<TableRecord>, TableStatus), EngineError> {
        let mut any_available = false;

        for engine in &self.engines {
            let kind = engine.kind();
            if !self.capabilities.has_table_engine(kind) {
                debug!("Page {}: {} unavailable, skipping", page, kind);
                continue;
            }
            any_available = true;

            let tables = degrade(engine.detect(pdf, page), &format!("page {page}: {kind}"));
            if tables.is_empty() {
                debug!("Page {}: {} found no tables", page, kind);
                continue;
            }

            let issued_before = counter.issued();
            let mut records = Vec::with_capacity(tables.len());
            for table in tables {
                let index = counter.next_index();
                let path = tables_dir.join(table_file_name(page, index));
                if let Err(e) = write_table_xml(&path, &table.engine, &table.rows) {
                    // A page keeps all of its tables or none of them.
                    discard_tables(&records);
                    counter.rewind(issued_before);
                    return Err(e);
                }
                records.push(TableRecord {
                    index,
                    engine: table.engine,
                    path,
                    page,
                });
            }
            info!("Page {}: {} table(s) via {}", page, records.len(), kind);
            return Ok((
                records,
                TableStatus::Found {
                    engine: kind.as_str().to_string(),
                },
            ));
        }

        let status = if any_available {
            TableStatus::NoneDetected
        } else {
            TableStatus::NoEngineAvailable
        };
        Ok((Vec::new(), status))
    }
}

fn discard_tables(records: &[TableRecord]) {
    for record in records {
        if let Err(e) = std::fs::remove_file(&record.path) {
            warn!("Cannot remove partial table {}: {}", record.path.display(), e);
        }
    }
}

// ── Per-table XML ────────────────────────────────────────────────────────

/// Serialise one table as `table[engine] → tr → td`.
///
/// Missing cells become empty `<td></td>`, never the text `nan`.
pub fn table_xml(engine: &str, rows: &[Vec<Option<String>>]) -> Result<Vec<u8>, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut table = BytesStart::new("table");
    table.push_attribute(("engine", engine));
    writer.write_event(Event::Start(table))?;

    for row in rows {
        writer.write_event(Event::Start(BytesStart::new("tr")))?;
        for cell in row {
            let text = cell
                .as_deref()
                .filter(|value| !is_nan_marker(value))
                .map(clean_cell_text)
                .unwrap_or_default();
            writer.write_event(Event::Start(BytesStart::new("td")))?;
            // Always emit a text event, even empty: it keeps the indenting
            // writer from putting a line break inside an empty cell.
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new("td")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("tr")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("table")))?;
    Ok(writer.into_inner())
}

fn write_table_xml(path: &Path, engine: &str, rows: &[Vec<Option<String>>]) -> Result<(), EngineError> {
    let bytes = table_xml(engine, rows).map_err(|e| EngineError::BadOutput {
        engine: engine.to_string(),
        detail: format!("table serialisation: {e}"),
    })?;
    std::fs::write(path, bytes).map_err(|e| EngineError::io(path, e))
}

fn is_nan_marker(value: &str) -> bool {
    matches!(value, "nan" | "NaN" | "<NA>" | "NaT")
}

// ── Python-hosted engines ────────────────────────────────────────────────

/// Shared prologue: `cell()` maps NaN / NA / None to JSON null.
const PY_PRELUDE: &str = r#"import json, sys

def cell(value):
    try:
        if value is None or value != value:
            return None
    except Exception:
        pass
    text = str(value)
    return None if text in ("nan", "NaN", "<NA>", "NaT") else text

def dump(grids, out):
    with open(out, "w", encoding="utf-8") as fh:
        json.dump(grids, fh)
"#;

const CAMELOT_BODY: &str = r#"import camelot
pdf, page, flavor, out = sys.argv[1:5]
tables = camelot.read_pdf(pdf, pages=page, flavor=flavor, suppress_stdout=True)
dump([[[cell(v) for v in row] for row in t.df.values.tolist()] for t in tables], out)
"#;

const TABULA_BODY: &str = r#"import tabula
pdf, page, out = sys.argv[1:4]
frames = tabula.read_pdf(pdf, pages=int(page), multiple_tables=True, guess=True, lattice=False, stream=True)
dump([[[cell(v) for v in row] for row in df.itertuples(index=False, name=None)] for df in (frames or [])], out)
"#;

/// Run an engine script under `python` and decode the grids it dumps.
fn run_python_engine(
    engine: &str,
    python: &str,
    body: &str,
    args: &[String],
) -> Result<Vec<Grid>, EngineError> {
    let scratch = tempfile::tempdir().map_err(|e| EngineError::io(std::env::temp_dir(), e))?;
    let out: PathBuf = scratch.path().join("tables.json");

    let mut cmd = Command::new(python);
    cmd.arg("-c")
        .arg(format!("{PY_PRELUDE}\n{body}"))
        .args(args)
        .arg(&out);

    // External table engines are not time-bounded.
    command::run(engine, &mut cmd, None)?;

    let raw = std::fs::read(&out).map_err(|e| EngineError::BadOutput {
        engine: engine.to_string(),
        detail: format!("{}: {}", out.display(), e),
    })?;
    parse_grids(engine, &raw)
}

/// Decode `[[[cell, …], …], …]`, accepting strings, numbers, booleans or null.
pub(crate) fn parse_grids(engine: &str, raw: &[u8]) -> Result<Vec<Grid>, EngineError> {
    let value: Vec<Vec<Vec<serde_json::Value>>> =
        serde_json::from_slice(raw).map_err(|e| EngineError::BadOutput {
            engine: engine.to_string(),
            detail: e.to_string(),
        })?;

    Ok(value
        .into_iter()
        .map(|table| {
            table
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|cell| match cell {
                            serde_json::Value::Null => None,
                            serde_json::Value::String(s) => Some(s),
                            other => Some(other.to_string()),
                        })
                        .collect()
                })
                .collect()
        })
        .collect())
}

/// Camelot detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CamelotFlavor {
    Lattice,
    Stream,
}

impl CamelotFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            CamelotFlavor::Lattice => "lattice",
            CamelotFlavor::Stream => "stream",
        }
    }

    /// Engine label recorded on tables from this mode.
    pub fn label(self) -> String {
        format!("camelot-{}", self.as_str())
    }
}

type FlavorRunner =
    Box<dyn Fn(&Path, usize, CamelotFlavor) -> Result<Vec<Grid>, EngineError> + Send + Sync>;

/// Camelot: lattice detection, falling back to stream detection.
pub struct CamelotCli {
    run_flavor: FlavorRunner,
}

impl CamelotCli {
    pub fn new(python: impl Into<String>) -> Self {
        let python = python.into();
        Self::with_runner(move |pdf: &Path, page: usize, flavor: CamelotFlavor| {
            run_python_engine(
                &flavor.label(),
                &python,
                CAMELOT_BODY,
                &[
                    pdf.to_string_lossy().into_owned(),
                    page.to_string(),
                    flavor.as_str().to_string(),
                ],
            )
        })
    }

    /// Drive detection through `runner` instead of a Python process.
    pub fn with_runner<F>(runner: F) -> Self
    where
        F: Fn(&Path, usize, CamelotFlavor) -> Result<Vec<Grid>, EngineError> + Send + Sync + 'static,
    {
        Self {
            run_flavor: Box::new(runner),
        }
    }

    fn flavor(&self, pdf: &Path, page: usize, flavor: CamelotFlavor) -> Result<Vec<DetectedTable>, EngineError> {
        let label = flavor.label();
        let grids = (self.run_flavor)(pdf, page, flavor)?;
        Ok(grids
            .into_iter()
            .map(|rows| DetectedTable {
                engine: label.clone(),
                rows,
            })
            .collect())
    }
}

impl TableEngine for CamelotCli {
    fn kind(&self) -> TableEngineKind {
        TableEngineKind::Camelot
    }

    fn detect(&self, pdf: &Path, page: usize) -> Result<Vec<DetectedTable>, EngineError> {
        match self.flavor(pdf, page, CamelotFlavor::Lattice) {
            Ok(tables) if !tables.is_empty() => Ok(tables),
            Ok(_) => self.flavor(pdf, page, CamelotFlavor::Stream),
            Err(e) => {
                warn!("Page {}: camelot lattice failed ({}), trying stream", page, e);
                self.flavor(pdf, page, CamelotFlavor::Stream)
            }
        }
    }
}

/// Tabula: guess-based detection over data frames.
pub struct TabulaCli {
    python: String,
}

impl TabulaCli {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl TableEngine for TabulaCli {
    fn kind(&self) -> TableEngineKind {
        TableEngineKind::Tabula
    }

    fn detect(&self, pdf: &Path, page: usize) -> Result<Vec<DetectedTable>, EngineError> {
        let grids = run_python_engine(
            "tabula",
            &self.python,
            TABULA_BODY,
            &[pdf.to_string_lossy().into_owned(), page.to_string()],
        )?;
        Ok(grids
            .into_iter()
            .map(|rows| DetectedTable {
                engine: "tabula".to_string(),
                rows,
            })
            .collect())
    }
}
