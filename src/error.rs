//! Error types for the edgequake-pdf2xml library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2XmlError`]: **Fatal**: the run cannot proceed at all (missing or
//!   unreadable input, pdfium not bound, output root not writable). Returned
//!   as `Err(Pdf2XmlError)` from the top-level `process_pdf*` functions
//!   before or instead of producing a manifest.
//!
//! * [`EngineError`]: **Non-fatal**: one collaborator call failed (OCR run,
//!   table engine, one embedded image). Every adapter returns it; the page
//!   pipeline turns it into an empty result and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2xml library.
#[derive(Debug, Error)]
pub enum Pdf2XmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create, clear or enumerate an output directory.
    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an output file (XML, image, manifest).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Place libpdfium next to the executable or in the working directory.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or containing directory).\n\
  • Install pdfium system-wide so the dynamic loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one external collaborator call.
///
/// Produced by the OCR, table and image adapters. Never aborts a run on its
/// own: see [`crate::pipeline::degrade`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum EngineError {
    /// The engine is not installed or was not detected at startup.
    #[error("{engine} is not available")]
    Unavailable { engine: String },

    /// The engine process could not be started.
    #[error("{engine}: failed to start: {detail}")]
    Spawn { engine: String, detail: String },

    /// The engine ran but exited unsuccessfully.
    #[error("{engine}: exited with {status}: {stderr}")]
    Failed {
        engine: String,
        status: String,
        stderr: String,
    },

    /// The engine did not finish within its time budget and was killed.
    #[error("{engine}: timed out after {secs}s")]
    Timeout { engine: String, secs: u64 },

    /// The engine finished but its output could not be understood.
    #[error("{engine}: unreadable output: {detail}")]
    BadOutput { engine: String, detail: String },

    /// pdfium refused a page-level operation (text layer, render, objects).
    #[error("page {page}: {detail}")]
    Pdf { page: usize, detail: String },

    /// An embedded image could not be decoded or encoded.
    #[error("image {index} on page {page}: {detail}")]
    Image {
        page: usize,
        index: usize,
        detail: String,
    },

    /// Scratch or output file I/O failed inside an adapter.
    #[error("I/O error at '{path}': {detail}")]
    Io { path: PathBuf, detail: String },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display() {
        let e = EngineError::Timeout {
            engine: "tesseract".into(),
            secs: 120,
        };
        let msg = e.to_string();
        assert!(msg.contains("tesseract"), "got: {msg}");
        assert!(msg.contains("120s"), "got: {msg}");
    }

    #[test]
    fn failed_display_carries_stderr() {
        let e = EngineError::Failed {
            engine: "camelot".into(),
            status: "exit status: 1".into(),
            stderr: "ModuleNotFoundError: cv2".into(),
        };
        assert!(e.to_string().contains("ModuleNotFoundError"));
    }

    #[test]
    fn output_write_failed_display() {
        let e = Pdf2XmlError::OutputWriteFailed {
            path: PathBuf::from("/out/manifest.json"),
            source: std::io::Error::other("disk full"),
        };
        let msg = e.to_string();
        assert!(msg.contains("manifest.json"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn image_error_names_page_and_index() {
        let e = EngineError::Image {
            page: 4,
            index: 2,
            detail: "unsupported filter".into(),
        };
        assert_eq!(e.to_string(), "image 2 on page 4: unsupported filter");
    }
}
