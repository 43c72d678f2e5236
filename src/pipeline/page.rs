//! Page Pipeline: one [`PageRecord`] per page, strictly in index order.
//!
//! ```text
//! text layer ─▶ thin? ─yes─▶ render ─▶ OCR ─▶ longer? ─yes─▶ replace
//!      │                                                       │
//!      └──────────────────────────┬────────────────────────────┘
//!                                 ▼
//!              embedded images (always) ─▶ table chain ─▶ record
//! ```
//!
//! Only two things stop a run from here: failing to write an image file
//! and an error from the record sink. Every engine failure degrades to an
//! empty result for that page.

use crate::config::ExtractionConfig;
use crate::engines::Engines;
use crate::error::Pdf2XmlError;
use crate::output::{PageRecord, RunStats, TableStatus};
use crate::pipeline::degrade;
use crate::pipeline::images::extract_page_images;
use crate::pipeline::ocr::{needs_ocr, ocr_with_fallback, should_replace, trimmed_len};
use crate::pipeline::postprocess::clean_page_text;
use crate::pipeline::render::PageSource;
use crate::pipeline::tables::{TableChain, TableCounter};
use crate::session::Session;
use std::path::Path;
use tracing::{debug, info, warn};

/// A clamped, 1-based inclusive page range. Empty when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    /// Clamp a requested range to a document of `total` pages.
    ///
    /// `end == 0` or `end > total` means the last page; `start < 1` means 1.
    pub fn resolve(total: usize, start: usize, end: usize) -> Self {
        let end = if end == 0 || end > total { total } else { end };
        Self {
            start: start.max(1),
            end,
        }
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Per-run page processor.
pub struct PagePipeline<'a, S: PageSource + ?Sized> {
    source: &'a S,
    pdf_path: &'a Path,
    config: &'a ExtractionConfig,
    engines: &'a Engines,
    session: &'a Session,
    tables: TableChain<'a>,
    counter: TableCounter,
}

impl<'a, S: PageSource + ?Sized> PagePipeline<'a, S> {
    pub fn new(
        source: &'a S,
        pdf_path: &'a Path,
        config: &'a ExtractionConfig,
        engines: &'a Engines,
        session: &'a Session,
    ) -> Self {
        Self {
            source,
            pdf_path,
            config,
            engines,
            session,
            tables: TableChain::new(&engines.tables, &config.table_order, engines.capabilities),
            counter: TableCounter::new(),
        }
    }

    /// Process every page in `range`, handing each record to `sink` as soon
    /// as it is complete.
    pub fn run<F>(&mut self, range: PageRange, mut sink: F) -> Result<RunStats, Pdf2XmlError>
    where
        F: FnMut(PageRecord) -> Result<(), Pdf2XmlError>,
    {
        let total = range.len();
        let config = self.config;
        let progress = config.progress_callback.as_ref();
        if let Some(cb) = progress {
            cb.on_run_start(total);
        }
        info!("Processing pages {}..={} ({} pages)", range.start, range.end, total);

        let mut stats = RunStats::default();
        for page in range.pages() {
            let record = self.process_page(page)?;
            stats.record(&record);
            sink(record)?;
            if let Some(cb) = progress {
                cb.on_page_complete(stats.pages, total);
            }
        }

        if let Some(cb) = progress {
            cb.on_run_complete(stats.pages);
        }
        Ok(stats)
    }

    /// Extract one 1-based page.
    pub fn process_page(&mut self, page: usize) -> Result<PageRecord, Pdf2XmlError> {
        let native = degrade(self.source.page_text(page), &format!("page {page}: text layer"));
        let (text, ocr_performed) = self.apply_ocr(page, native);

        let images = extract_page_images(self.source, page, &self.session.images_dir)?;

        let (tables, table_status) = match self.tables.extract_page(
            self.pdf_path,
            page,
            &mut self.counter,
            &self.session.tables_dir,
        ) {
            Ok(result) => result,
            Err(e) => {
                warn!("Page {}: table extraction failed: {}; no tables recorded", page, e);
                (Vec::new(), TableStatus::NoneDetected)
            }
        };

        debug!(
            "Page {}: {} chars{}, {} image(s), {} table(s)",
            page,
            trimmed_len(&text),
            if ocr_performed { " (OCR)" } else { "" },
            images.len(),
            tables.len()
        );

        Ok(PageRecord {
            index: page,
            text: clean_page_text(&text),
            images,
            tables,
            ocr_performed,
            table_status,
        })
    }

    fn apply_ocr(&self, page: usize, native: String) -> (String, bool) {
        let Some(engine) = self.engines.ocr_engine() else {
            return (native, false);
        };
        if !needs_ocr(&native, self.config.ocr_threshold) {
            return (native, false);
        }

        let image = match self.source.render_page(page, self.config.dpi) {
            Ok(image) => image,
            Err(e) => {
                warn!("Page {}: render for OCR failed: {}; keeping text layer", page, e);
                return (native, false);
            }
        };

        let ocr_text = degrade(
            ocr_with_fallback(engine, &image, &self.config.ocr),
            &format!("page {page}: {}", engine.name()),
        );
        if should_replace(&native, &ocr_text) {
            (ocr_text, true)
        } else {
            debug!(
                "Page {}: OCR text ({} chars) not longer than text layer ({} chars)",
                page,
                trimmed_len(&ocr_text),
                trimmed_len(&native)
            );
            (native, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrParams;
    use crate::engines::Capabilities;
    use crate::error::EngineError;
    use crate::pipeline::ocr::OcrEngine;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct TextPages(Vec<&'static str>);

    impl PageSource for TextPages {
        fn page_count(&self) -> usize {
            self.0.len()
        }
        fn page_text(&self, page: usize) -> Result<String, EngineError> {
            if self.0[page - 1] == "<fail>" {
                return Err(EngineError::Pdf {
                    page,
                    detail: "broken content stream".into(),
                });
            }
            Ok(self.0[page - 1].to_string())
        }
        fn render_page(&self, _: usize, _: u32) -> Result<DynamicImage, EngineError> {
            Ok(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
        }
        fn embedded_images(
            &self,
            _: usize,
        ) -> Result<Vec<Result<DynamicImage, EngineError>>, EngineError> {
            Ok(Vec::new())
        }
    }

    /// Returns a fixed string and counts calls.
    struct FixedOcr {
        text: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl OcrEngine for FixedOcr {
        fn name(&self) -> &str {
            "fixed"
        }
        fn recognize(&self, _: &DynamicImage, _: &OcrParams) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    fn engines_with_ocr(text: &'static str) -> (Engines, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let caps = Capabilities {
            ocr: true,
            ..Default::default()
        };
        let ocr = FixedOcr {
            text,
            calls: calls.clone(),
        };
        (Engines::new(caps, Some(Box::new(ocr)), Vec::new()), calls)
    }

    fn session(dir: &Path) -> Session {
        Session::create(dir, Path::new("doc.pdf"), 1, 0).unwrap()
    }

    fn config(threshold: usize) -> ExtractionConfig {
        ExtractionConfig::builder()
            .ocr_threshold(threshold)
            .build()
            .unwrap()
    }

    #[test]
    fn range_resolution() {
        assert_eq!(PageRange::resolve(10, 1, 0), PageRange { start: 1, end: 10 });
        assert_eq!(PageRange::resolve(10, 0, 99), PageRange { start: 1, end: 10 });
        assert_eq!(PageRange::resolve(10, 3, 5).len(), 3);
        assert!(PageRange::resolve(10, 7, 5).is_empty());
        assert!(PageRange::resolve(0, 1, 0).is_empty());
        assert_eq!(PageRange::resolve(0, 1, 0).pages().count(), 0);
    }

    #[test]
    fn ocr_replaces_only_when_strictly_longer() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path());
        let source = TextPages(vec!["abc", "abc", "a long enough native text layer"]);
        let cfg = config(10);

        // equal length: native kept, but OCR was attempted
        let (engines, calls) = engines_with_ocr("xyz");
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);
        let rec = p.process_page(1).unwrap();
        assert_eq!(rec.text, "abc");
        assert!(!rec.ocr_performed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // longer: replaced
        let (engines, _) = engines_with_ocr("abcd");
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);
        let rec = p.process_page(2).unwrap();
        assert_eq!(rec.text, "abcd");
        assert!(rec.ocr_performed);

        // above threshold: OCR never runs
        let (engines, calls) = engines_with_ocr("a much much much longer OCR result than native");
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);
        let rec = p.process_page(3).unwrap();
        assert!(!rec.ocr_performed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ocr_unavailable_keeps_text_layer() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path());
        let source = TextPages(vec![""]);
        let cfg = config(40);
        let engines = Engines::none();
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);
        let rec = p.process_page(1).unwrap();
        assert_eq!(rec.text, "");
        assert!(!rec.ocr_performed);
        assert_eq!(rec.table_status, TableStatus::NoEngineAvailable);
    }

    #[test]
    fn record_text_is_already_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path());
        let source = TextPages(vec!["  col\0umn\r\nnext\u{c}  "]);
        let cfg = config(0);
        let engines = Engines::none();
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);
        let rec = p.process_page(1).unwrap();
        assert_eq!(rec.text, "column\nnext");
    }

    #[test]
    fn broken_text_layer_degrades_to_ocr() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path());
        let source = TextPages(vec!["<fail>"]);
        let cfg = config(40);
        let (engines, _) = engines_with_ocr("recovered by OCR");
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);
        let rec = p.process_page(1).unwrap();
        assert_eq!(rec.text, "recovered by OCR");
        assert!(rec.ocr_performed);
    }

    #[test]
    fn run_reports_progress_in_order() {
        use crate::progress::ExtractionProgressCallback;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<(usize, usize)>>);
        impl ExtractionProgressCallback for Recorder {
            fn on_page_complete(&self, done: usize, total: usize) {
                self.0.lock().unwrap().push((done, total));
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path());
        let source = TextPages(vec!["one", "two", "three", "four"]);
        let recorder = Arc::new(Recorder::default());
        let cfg = ExtractionConfig::builder()
            .progress_callback(recorder.clone())
            .build()
            .unwrap();
        let engines = Engines::none();
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);

        let mut seen = Vec::new();
        let stats = p
            .run(PageRange::resolve(4, 2, 4), |rec| {
                seen.push(rec.index);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![2, 3, 4]);
        assert_eq!(stats.pages, 3);
        assert_eq!(*recorder.0.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn sink_error_stops_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path());
        let source = TextPages(vec!["a", "b", "c"]);
        let cfg = config(0);
        let engines = Engines::none();
        let mut p = PagePipeline::new(&source, Path::new("doc.pdf"), &cfg, &engines, &s);

        let mut calls = 0;
        let err = p
            .run(PageRange::resolve(3, 1, 0), |_| {
                calls += 1;
                Err(Pdf2XmlError::Internal("disk full".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Pdf2XmlError::Internal(_)));
        assert_eq!(calls, 1);
    }
}
