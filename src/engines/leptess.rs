//! Leptess/Tesseract engine implementation
//!
//! Tesseract-based OCR engine with Cyrillic language packs. Uses the
//! tesseract-static crate for static linking (no system dependencies).
//! Downloads tessdata (training data) on first use unless a tessdata
//! directory is configured.

use super::models;
use crate::config::Config;
use crate::engine::{BoundingBox, OcrEngine, OcrResult, TextRegion};
use crate::error::OcrError;
use image::DynamicImage;
use std::path::PathBuf;
use tesseract_static::tesseract::Tesseract;

pub struct LeptessEngine {
    tessdata_path: String,
    language: String,
}

impl LeptessEngine {
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let language = config.default_language.clone();

        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => download_tessdata(&language)?,
        };

        // Fail at startup rather than on the first request
        Tesseract::new(Some(&tessdata_path), Some(&language)).map_err(|e| {
            OcrError::InitializationError(format!("Failed to initialize Tesseract: {}", e))
        })?;

        tracing::info!(
            "Leptess engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            language
        );

        Ok(Self {
            tessdata_path,
            language,
        })
    }
}

impl OcrEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - reports per-page confidence, supports Cyrillic"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        // BMP is always readable by leptonica
        let mut bmp = Vec::new();
        rgb.write_to(&mut std::io::Cursor::new(&mut bmp), image::ImageFormat::Bmp)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to encode BMP: {}", e)))?;

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| OcrError::ProcessingError(format!("Failed to create Tesseract: {}", e)))?
            .set_image_from_mem(&bmp)
            .map_err(|e| {
                OcrError::ProcessingError(format!(
                    "Failed to set image ({}x{}): {}",
                    width, height, e
                ))
            })?
            .recognize()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to get text: {}", e)))?
            .trim()
            .to_string();
        let confidence = (tess.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);

        let regions = if text.is_empty() {
            Vec::new()
        } else {
            vec![TextRegion {
                text: text.clone(),
                confidence,
                bbox: BoundingBox::full(),
            }]
        };

        Ok(OcrResult {
            text,
            confidence,
            regions,
            warnings: Vec::new(),
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        ["rus", "eng", "ukr", "bel", "kaz", "deu", "fra"]
            .iter()
            .map(|l| l.to_string())
            .collect()
    }
}

/// Download traineddata for every `+`-joined language, returning the directory
fn download_tessdata(languages: &str) -> Result<String, OcrError> {
    let dir: PathBuf = models::cache_dir().join("tessdata");

    for language in languages.split('+').filter(|l| !l.is_empty()) {
        let url = format!(
            "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
            language
        );
        models::ensure_cached(&url, &dir, &format!("{}.traineddata", language))?;
    }

    dir.to_str()
        .map(str::to_string)
        .ok_or_else(|| OcrError::InitializationError("Invalid tessdata path".to_string()))
}
