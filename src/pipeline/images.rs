//! Embedded image extraction: decode, normalise colour, write PNG.
//!
//! Every image is written as PNG regardless of its filter in the PDF
//! (DCT, JBIG2, Flate…). PNG only holds 8/16-bit grey or RGB with optional
//! alpha, so exotic sample layouts (float, 16-bit, CMYK decoded by pdfium
//! into wide formats) are folded into 8-bit RGB or RGBA first.
//!
//! A single undecodable image is skipped; its position still consumes an
//! index, so `img_003` always means "third image object on the page".

use crate::error::{EngineError, Pdf2XmlError};
use crate::output::ImageRecord;
use crate::pipeline::render::PageSource;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Output file name for the `index`-th image on `page` (both 1-based).
pub fn image_file_name(page: usize, index: usize) -> String {
    format!("page_{:06}_img_{:03}.png", page, index)
}

/// Extract every embedded image on `page` into `images_dir`.
///
/// Decode and encode failures skip the image. Failing to write the PNG is
/// fatal: the session directory is no longer usable.
pub fn extract_page_images<S: PageSource + ?Sized>(
    source: &S,
    page: usize,
    images_dir: &Path,
) -> Result<Vec<ImageRecord>, Pdf2XmlError> {
    let decoded = match source.embedded_images(page) {
        Ok(images) => images,
        Err(e) => {
            warn!("Page {}: cannot list embedded images: {}", page, e);
            return Ok(Vec::new());
        }
    };

    let mut records = Vec::with_capacity(decoded.len());
    for (position, result) in decoded.into_iter().enumerate() {
        let index = position + 1;
        let image = match result {
            Ok(image) => normalize_color(image),
            Err(e) => {
                warn!("Page {}: skipping image {}: {}", page, index, e);
                continue;
            }
        };

        let png = match encode_png(&image, page, index) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Page {}: skipping image {}: {}", page, index, e);
                continue;
            }
        };

        let path: PathBuf = images_dir.join(image_file_name(page, index));
        std::fs::write(&path, &png).map_err(|e| Pdf2XmlError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;
        debug!(
            "Page {}: image {} → {} ({}x{})",
            page,
            index,
            path.display(),
            image.width(),
            image.height()
        );

        records.push(ImageRecord {
            index,
            path,
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(records)
}

/// Fold any sample layout PNG cannot hold losslessly into 8-bit RGB(A).
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn encode_png(image: &DynamicImage, page: usize, index: usize) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| EngineError::Image {
            page,
            index,
            detail: e.to_string(),
        })?;
    Ok(buf)
}
