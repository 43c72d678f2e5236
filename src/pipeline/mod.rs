//! Pipeline stages for PDF-to-XML extraction.
//!
//! Each submodule implements one step of a page's journey. External engines
//! (pdfium, tesseract, camelot, tabula) sit behind traits so every stage can
//! be exercised with in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ images ──▶ tables ──▶ page record
//! (%PDF)    (pdfium)  (tesseract)  (PNG)  (camelot/tabula)
//! ```
//!
//! 1. [`input`] : validate the path and `%PDF` magic
//! 2. [`render`]: text layer, rasterisation, embedded images
//! 3. [`ocr`]   : OCR fallback for pages with a thin text layer
//! 4. [`images`]: decode embedded images and write PNGs
//! 5. [`tables`]: ordered table engine chain with run-wide numbering
//! 6. [`page`]  : drive 1–5 for each page in range
//!
//! [`command`] runs the external processes; [`postprocess`] makes text safe
//! for XML.

pub mod command;
pub mod images;
pub mod input;
pub mod ocr;
pub mod page;
pub mod postprocess;
pub mod render;
pub mod tables;

use crate::error::EngineError;
use tracing::warn;

/// The degradation policy for optional engines: a failure becomes the empty
/// value and a warning, and processing continues.
pub fn degrade<T: Default>(result: Result<T, EngineError>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("{}: {}; continuing with empty result", context, e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrade_passes_success_through() {
        let tables: Vec<u8> = degrade(Ok(vec![1, 2]), "ctx");
        assert_eq!(tables, vec![1, 2]);
    }

    #[test]
    fn degrade_turns_failure_into_empty() {
        let text: String = degrade(
            Err(EngineError::Timeout {
                engine: "tesseract".into(),
                secs: 120,
            }),
            "page 3: ocr",
        );
        assert!(text.is_empty());
    }
}
