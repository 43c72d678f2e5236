//! CLI binary for edgequake-pdf2xml.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2xml::{
    preview_pages, probe, process_pdf_async, Capabilities, EngineSettings, ExtractionConfig,
    ExtractionProgressCallback, Manifest, ProgressCallback, RetentionPolicy, RetentionReport,
    TableEngineKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar fed by the page pipeline.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Start as a spinner; `on_run_start` turns it into a bar once the page
    /// range is known.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Probing engines, opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, pages_total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(pages_total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing pages");
        self.bar.reset_eta();
    }

    fn on_page_complete(&self, pages_done: usize, _pages_total: usize) {
        self.bar.set_position(pages_done as u64);
    }

    fn on_run_complete(&self, _pages_done: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole document into ./output/session_<id>/
  pdf2xml document.pdf

  # Pages 10-20, OCR anything with fewer than 100 characters of text
  pdf2xml --start-page 10 --end-page 20 --ocr-threshold 100 scan.pdf

  # German + English OCR at 400 DPI, tabula before camelot
  pdf2xml --ocr-lang deu+eng --dpi 400 --tables tabula,camelot report.pdf

  # Keep at most 3 sessions younger than 12 hours, preview 2 pages
  pdf2xml --cleanup --max-sessions 3 --max-age-hours 12 --preview 2 doc.pdf

  # Which optional engines are installed?
  pdf2xml --probe

OUTPUT LAYOUT:
  <outdir>/manifest.json                         run summary (last run)
  <outdir>/session_<id>/combined.xml             page-indexed document
  <outdir>/session_<id>/tables/page_NNNNNN_table_NNN.xml
  <outdir>/session_<id>/assets/images/page_NNNNNN_img_NNN.png

OPTIONAL ENGINES:
  tesseract    OCR for pages with a thin text layer (must be on PATH)
  camelot      table detection, lattice then stream (pip install camelot-py)
  tabula       table detection, guess mode (pip install tabula-py, needs Java)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH     pdfium shared library (file or directory)
  PDF2XML_TESSERACT   tesseract executable
  PDF2XML_PYTHON      Python interpreter hosting camelot / tabula
  RUST_LOG            log filter, overrides --verbose / --quiet
"#;

/// Extract PDF pages, images and tables into page-indexed XML.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2xml",
    version,
    about = "Extract PDF text, images and tables into page-indexed XML",
    long_about = "Stream a PDF into combined.xml, one <page> per page, falling back to \
tesseract OCR for scanned pages and trying camelot / tabula for tables. Each run writes \
into its own session directory under the output root.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    #[arg(required_unless_present = "probe")]
    input: Option<PathBuf>,

    /// Output root; each run creates session_<id>/ inside it.
    #[arg(short, long, env = "PDF2XML_OUTDIR", default_value = "output")]
    outdir: PathBuf,

    /// First page to process (1-based).
    #[arg(long, env = "PDF2XML_START_PAGE", default_value_t = 1)]
    start_page: usize,

    /// Last page to process; 0 means the last page of the document.
    #[arg(long, env = "PDF2XML_END_PAGE", default_value_t = 0)]
    end_page: usize,

    /// Run OCR when a page has fewer trimmed characters than this.
    #[arg(long, env = "PDF2XML_OCR_THRESHOLD", default_value_t = 40)]
    ocr_threshold: usize,

    /// Rendering DPI for OCR: 150, 200, 300 or 400.
    #[arg(long, env = "PDF2XML_DPI", default_value_t = 300)]
    dpi: u32,

    /// Tesseract language(s), e.g. eng or deu+eng.
    #[arg(long, env = "PDF2XML_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Tesseract page segmentation mode (0-13).
    #[arg(long, env = "PDF2XML_OCR_PSM", default_value = "3")]
    ocr_psm: String,

    /// Tesseract OCR engine mode (0-3).
    #[arg(long, env = "PDF2XML_OCR_OEM", default_value = "3")]
    ocr_oem: String,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "PDF2XML_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Table engine order, comma separated; unknown names are ignored.
    #[arg(long, env = "PDF2XML_TABLES", default_value = "camelot,tabula")]
    tables: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2XML_PASSWORD")]
    password: Option<String>,

    /// Prune old sessions under the output root after the run.
    #[arg(long, env = "PDF2XML_CLEANUP")]
    cleanup: bool,

    /// Retention: keep at most this many sessions.
    #[arg(long, env = "PDF2XML_MAX_SESSIONS", default_value_t = 5)]
    max_sessions: usize,

    /// Retention: remove sessions older than this many hours.
    #[arg(long, env = "PDF2XML_MAX_AGE_HOURS", default_value_t = 24.0)]
    max_age_hours: f64,

    /// Print the text of the first N pages after the run.
    #[arg(long)]
    preview: Option<usize>,

    /// Report which optional engines are available and exit.
    #[arg(long)]
    probe: bool,

    /// Print the manifest as JSON on stdout.
    #[arg(long, env = "PDF2XML_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2XML_NO_PROGRESS")]
    no_progress: bool,

    /// Tesseract executable.
    #[arg(long, env = "PDF2XML_TESSERACT", default_value = "tesseract")]
    tesseract_cmd: String,

    /// Python interpreter with camelot / tabula installed.
    #[arg(long, env = "PDF2XML_PYTHON", default_value = "python3")]
    python_cmd: String,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2XML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2XML_QUIET")]
    quiet: bool,
}

impl Cli {
    fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            tesseract_cmd: self.tesseract_cmd.clone(),
            python_cmd: self.python_cmd.clone(),
            pdfium_lib_path: self.pdfium_lib.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the feedback when it is shown; only errors get
    // through underneath it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.probe;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Probe-only mode ──────────────────────────────────────────────────
    if cli.probe {
        let settings = cli.engine_settings();
        let caps = tokio::task::spawn_blocking(move || probe(&settings))
            .await
            .context("Engine probe failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&caps).context("Failed to serialise capabilities")?
            );
        } else {
            print_capabilities(&caps);
        }
        return Ok(());
    }

    let Some(input) = cli.input.clone() else {
        anyhow::bail!("No input PDF given");
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let manifest = process_pdf_async(&input, config)
        .await
        .with_context(|| format!("Extraction of {} failed", input.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&manifest).context("Failed to serialise manifest")?
        );
    } else if !cli.quiet {
        print_summary(&manifest);
    }

    // ── Preview ──────────────────────────────────────────────────────────
    if let Some(n) = cli.preview.filter(|n| *n > 0) {
        let pages = preview_pages(&manifest.xml, n).context("Failed to read XML preview")?;
        for page in pages {
            let snippet: String = page.text.chars().take(600).collect();
            let ellipsis = if page.text.chars().count() > 600 { "…" } else { "" };
            eprintln!("\n{}", bold(&format!("── Page {} ──", page.index)));
            eprintln!("{snippet}{ellipsis}");
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .output_root(cli.outdir.clone())
        .pages(cli.start_page, cli.end_page)
        .ocr_threshold(cli.ocr_threshold)
        .dpi(cli.dpi)
        .ocr_language(cli.ocr_lang.clone())
        .ocr_psm(cli.ocr_psm.clone())
        .ocr_oem(cli.ocr_oem.clone())
        .ocr_timeout_secs(cli.ocr_timeout)
        .table_order(TableEngineKind::parse_list(&cli.tables))
        .engines(cli.engine_settings());

    if cli.cleanup {
        builder = builder.retention(RetentionPolicy {
            max_sessions: cli.max_sessions,
            max_age_hours: cli.max_age_hours,
        });
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn flag(available: bool) -> String {
    if available {
        green("✓ available")
    } else {
        dim("✗ not found")
    }
}

fn print_capabilities(caps: &Capabilities) {
    println!("tesseract  {}", flag(caps.ocr));
    println!("camelot    {}", flag(caps.camelot));
    println!("tabula     {}", flag(caps.tabula));
}

fn print_summary(m: &Manifest) {
    eprintln!(
        "{} {} pages  ({} OCR)  {} images  {} tables",
        green("✔"),
        bold(&m.pages_processed.to_string()),
        m.pages_ocr,
        m.images_extracted,
        m.tables_extracted,
    );
    eprintln!("   {} {}", dim("xml     "), bold(&m.xml.display().to_string()));
    eprintln!("   {} {}", dim("session "), m.output_dir.display());
    eprintln!(
        "   {} ocr {}  camelot {}  tabula {}",
        dim("engines "),
        yes_no(m.ocr_available),
        yes_no(m.camelot_available),
        yes_no(m.tabula_available),
    );
    if m.pages_without_table_engine > 0 {
        eprintln!(
            "   {} {} page(s) had no table engine available",
            cyan("⚠"),
            m.pages_without_table_engine
        );
    }
    if let Some(ref report) = m.cleanup {
        print_cleanup(report);
    }
}

fn print_cleanup(r: &RetentionReport) {
    eprintln!(
        "   {} {} found, {} removed, {} kept, {:.2} MB freed",
        dim("cleanup "),
        r.sessions_found,
        r.sessions_removed,
        r.sessions_kept,
        r.space_freed_mb,
    );
    for reason in &r.cleanup_reason {
        let mark = if reason.contains("removal failed") {
            red("✗")
        } else {
            dim("-")
        };
        eprintln!("     {mark} {reason}");
    }
}

fn yes_no(b: bool) -> String {
    if b {
        green("yes")
    } else {
        red("no")
    }
}
