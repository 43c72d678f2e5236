//! OCR fallback: binarise a rendered page and read it with tesseract.
//!
//! OCR only runs for pages whose native text layer is nearly empty
//! ([`needs_ocr`]), and its output only wins when it is strictly longer
//! than what the text layer already had ([`should_replace`]). Both
//! comparisons use trimmed character counts. This is a length heuristic,
//! not a quality judgment.

use crate::config::OcrParams;
use crate::error::EngineError;
use crate::pipeline::command;
use image::{DynamicImage, GrayImage, ImageFormat};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

/// A text recogniser for rendered page images.
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Recognise text in `image`. One attempt, no fallback.
    fn recognize(&self, image: &DynamicImage, params: &OcrParams) -> Result<String, EngineError>;
}

/// Tesseract driven through its command-line interface.
pub struct TesseractCli {
    command: String,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, params: &OcrParams) -> Result<String, EngineError> {
        let scratch = tempfile::tempdir().map_err(|e| EngineError::io(std::env::temp_dir(), e))?;
        let input: PathBuf = scratch.path().join("page.png");
        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| EngineError::Io {
                path: input.clone(),
                detail: e.to_string(),
            })?;

        // tesseract appends `.txt` to the output base itself.
        let output_base = scratch.path().join("page");
        let mut cmd = Command::new(&self.command);
        cmd.arg(&input)
            .arg(&output_base)
            .arg("-l")
            .arg(&params.language)
            .arg("--psm")
            .arg(&params.psm)
            .arg("--oem")
            .arg(&params.oem);

        command::run(self.name(), &mut cmd, Some(self.timeout))?;

        let output = output_base.with_extension("txt");
        std::fs::read_to_string(&output).map_err(|e| EngineError::BadOutput {
            engine: self.name().to_string(),
            detail: format!("{}: {}", output.display(), e),
        })
    }
}

/// Run OCR on a binarised copy of `image`, retrying on the raw image if
/// that attempt fails.
pub fn ocr_with_fallback(
    engine: &dyn OcrEngine,
    image: &DynamicImage,
    params: &OcrParams,
) -> Result<String, EngineError> {
    let binary = DynamicImage::ImageLuma8(binarize(image));
    match engine.recognize(&binary, params) {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!("{}: binarised attempt failed ({}), retrying raw image", engine.name(), e);
            engine.recognize(image, params)
        }
    }
}

/// Trimmed length in characters, the unit both OCR comparisons use.
pub fn trimmed_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// True when the native text is short enough to justify OCR.
pub fn needs_ocr(native: &str, threshold: usize) -> bool {
    trimmed_len(native) < threshold
}

/// True when OCR output should replace the native text. Ties keep native.
pub fn should_replace(native: &str, ocr: &str) -> bool {
    trimmed_len(ocr) > trimmed_len(native)
}

/// Global Otsu binarisation: pixels above the threshold become white.
pub fn binarize(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let level = otsu_level(&gray);
    debug!("Otsu threshold {}", level);
    threshold(&gray, level, ThresholdType::Binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use std::sync::Mutex;

    #[test]
    fn ocr_triggers_strictly_below_threshold() {
        assert!(needs_ocr("", 40));
        assert!(needs_ocr(&"x".repeat(39), 40));
        assert!(!needs_ocr(&"x".repeat(40), 40));
        // whitespace does not count
        assert!(needs_ocr(&format!("   {}   \n", "x".repeat(39)), 40));
        // threshold 0 disables OCR entirely
        assert!(!needs_ocr("", 0));
    }

    #[test]
    fn replacement_requires_strictly_longer_ocr() {
        assert!(should_replace("", "abc"));
        assert!(should_replace("ab", "abc"));
        assert!(!should_replace("abc", "xyz"), "equal length keeps native");
        assert!(!should_replace("abcd", "xyz"));
        assert!(!should_replace("abc", "  xyz  \n\n"), "trimmed comparison");
        assert!(!should_replace("", "   "));
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        assert_eq!(trimmed_len(" äöü "), 3);
        assert!(!should_replace("abc", "äöü"));
    }

    fn two_tone(dark: u8, light: u8) -> DynamicImage {
        let mut img = RgbImage::new(20, 10);
        for (x, _, px) in img.enumerate_pixels_mut() {
            let v = if x < 10 { dark } else { light };
            *px = Rgb([v, v, v]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn otsu_separates_two_tones() {
        let gray = two_tone(30, 220).to_luma8();
        let t = otsu_level(&gray);
        assert!((30..220).contains(&t), "threshold {t}");
    }

    #[test]
    fn binarize_produces_pure_black_and_white() {
        let bin = binarize(&two_tone(30, 220));
        assert_eq!(bin.get_pixel(0, 0).0[0], 0);
        assert_eq!(bin.get_pixel(19, 9).0[0], 255);
        assert!(bin.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn binarize_uniform_image_stays_uniform() {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([128])));
        let bin = binarize(&flat);
        let first = bin.get_pixel(0, 0).0[0];
        assert!(first == 0 || first == 255);
        assert!(bin.pixels().all(|p| p.0[0] == first));
    }

    /// Fails on binarised (grey) input, succeeds on colour input.
    struct PickyEngine {
        calls: Mutex<Vec<&'static str>>,
    }

    impl OcrEngine for PickyEngine {
        fn name(&self) -> &str {
            "picky"
        }

        fn recognize(&self, image: &DynamicImage, _: &OcrParams) -> Result<String, EngineError> {
            match image {
                DynamicImage::ImageLuma8(_) => {
                    self.calls.lock().unwrap().push("binary");
                    Err(EngineError::Failed {
                        engine: "picky".into(),
                        status: "exit status: 1".into(),
                        stderr: String::new(),
                    })
                }
                _ => {
                    self.calls.lock().unwrap().push("raw");
                    Ok("raw text".into())
                }
            }
        }
    }

    #[test]
    fn falls_back_to_raw_image() {
        let engine = PickyEngine {
            calls: Mutex::new(Vec::new()),
        };
        let text = ocr_with_fallback(&engine, &two_tone(0, 255), &OcrParams::default()).unwrap();
        assert_eq!(text, "raw text");
        assert_eq!(*engine.calls.lock().unwrap(), vec!["binary", "raw"]);
    }
}
