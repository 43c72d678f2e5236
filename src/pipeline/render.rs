//! PDF access: text layer, rasterisation and embedded images via pdfium.
//!
//! The page pipeline only talks to the [`PageSource`] trait, so it never
//! touches pdfium types directly and can be driven by an in-memory source
//! in tests. [`PdfiumSource`] is the production implementation.
//!
//! ## Resource scope
//!
//! A `PdfiumSource` exclusively owns its `PdfDocument`. pdfium closes the
//! document when the value is dropped, which happens on every exit path of
//! a run, early returns and panics included.

use crate::error::{EngineError, Pdf2XmlError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything the page pipeline needs from a PDF.
///
/// Page numbers are 1-based throughout.
pub trait PageSource {
    /// Total pages in the document.
    fn page_count(&self) -> usize;

    /// The page's native text layer.
    fn page_text(&self, page: usize) -> Result<String, EngineError>;

    /// Rasterise the page at `dpi`.
    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, EngineError>;

    /// Decode the raster images placed on the page, in content-stream order.
    ///
    /// The outer `Err` means the page's object list could not be read at
    /// all; an inner `Err` is one image that failed to decode.
    fn embedded_images(
        &self,
        page: usize,
    ) -> Result<Vec<Result<DynamicImage, EngineError>>, EngineError>;
}

/// Bind the pdfium shared library.
///
/// Resolution order: `lib_path` (a library file, or a directory containing
/// the platform library), else the working directory, else the system
/// loader.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, Pdf2XmlError> {
    let bindings = match lib_path {
        Some(path) => {
            let candidate: PathBuf = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            debug!("Binding pdfium from {}", candidate.display());
            Pdfium::bind_to_library(&candidate)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2XmlError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// A PDF opened through pdfium.
pub struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumSource<'a> {
    /// Open `pdf_path`. Any failure here is fatal for the run.
    pub fn open(
        pdfium: &'a Pdfium,
        pdf_path: &Path,
        password: Option<&'a str>,
    ) -> Result<Self, Pdf2XmlError> {
        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    Pdf2XmlError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    Pdf2XmlError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                Pdf2XmlError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        info!(
            "PDF loaded: {} ({} pages)",
            pdf_path.display(),
            document.pages().len()
        );
        Ok(Self { document })
    }

    fn page(&self, page: usize) -> Result<PdfPage<'_>, EngineError> {
        let index = page
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| EngineError::Pdf {
                page,
                detail: "page number out of range".into(),
            })?;
        self.document.pages().get(index).map_err(|e| EngineError::Pdf {
            page,
            detail: format!("{:?}", e),
        })
    }
}

impl PageSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&self, page: usize) -> Result<String, EngineError> {
        let pdf_page = self.page(page)?;
        let text = pdf_page.text().map_err(|e| EngineError::Pdf {
            page,
            detail: format!("text layer: {:?}", e),
        })?;
        Ok(text.all())
    }

    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, EngineError> {
        let pdf_page = self.page(page)?;
        // PDF user space is 72 units per inch.
        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| EngineError::Pdf {
                page,
                detail: format!("render: {:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} DPI → {}x{} px",
            page,
            dpi,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn embedded_images(
        &self,
        page: usize,
    ) -> Result<Vec<Result<DynamicImage, EngineError>>, EngineError> {
        let pdf_page = self.page(page)?;
        let images = pdf_page
            .objects()
            .iter()
            .filter_map(|object| {
                object.as_image_object().map(|image| {
                    image.get_raw_image().map_err(|e| EngineError::Pdf {
                        page,
                        detail: format!("image decode: {:?}", e),
                    })
                })
            })
            .collect();
        Ok(images)
    }
}
