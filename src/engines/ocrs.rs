//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.
//!
//! ocrs reports no scores, so every recognized line gets a confidence derived
//! from the shape of its text.

use super::models;
use crate::config::Config;
use crate::engine::{BoundingBox, OcrEngine, OcrResult, TextRegion};
use crate::error::OcrError;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams, TextItem};
use rten::Model;

const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

pub struct OcrsEngine {
    engine: OcrsOcrEngine,
}

impl OcrsEngine {
    pub fn new(_config: &Config) -> Result<Self, OcrError> {
        tracing::info!("Initializing ocrs OCR engine...");

        let dir = models::cache_dir();
        let detection = load_model(&models::ensure_cached(
            DETECTION_MODEL_URL,
            &dir,
            "text-detection.rten",
        )?)?;
        let recognition = load_model(&models::ensure_cached(
            RECOGNITION_MODEL_URL,
            &dir,
            "text-recognition.rten",
        )?)?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection),
            recognition_model: Some(recognition),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| {
            OcrError::InitializationError(format!("Failed to create OCR engine: {}", e))
        })?;

        tracing::info!("ocrs engine initialized successfully");
        Ok(Self { engine })
    }
}

fn load_model(path: &std::path::Path) -> Result<Model, OcrError> {
    Model::load_file(path).map_err(|e| {
        OcrError::InitializationError(format!("Failed to load model {:?}: {}", path, e))
    })
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|e| {
            OcrError::ProcessingError(format!("Failed to create image source: {}", e))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to prepare input: {}", e)))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to detect words: {}", e)))?;
        let lines = self.engine.find_text_lines(&input, &words);
        let recognized = self
            .engine
            .recognize_text(&input, &lines)
            .map_err(|e| OcrError::ProcessingError(format!("Failed to recognize text: {}", e)))?;

        let regions: Vec<TextRegion> = recognized
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line
                    .words()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                if text.trim().is_empty() {
                    return None;
                }

                let rect = line.bounding_rect();
                Some(TextRegion {
                    confidence: text_confidence(&text),
                    bbox: BoundingBox::from_pixels(
                        rect.left() as f32,
                        rect.top() as f32,
                        rect.right() as f32,
                        rect.bottom() as f32,
                        width,
                        height,
                    ),
                    text,
                })
            })
            .collect();

        let text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!("ocrs recognized {} lines in {}x{} image", regions.len(), width, height);

        Ok(OcrResult {
            confidence: text_confidence(&text),
            text,
            regions,
            warnings: Vec::new(),
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        // The published recognition model covers the Latin alphabet
        vec!["eng".to_string()]
    }
}

// ============================================================================
// Text-shape confidence
// ============================================================================

/// Confidence in [0, 1] estimated from how much `text` looks like real text
fn text_confidence(text: &str) -> f32 {
    let length = text.chars().count();
    if length == 0 {
        return 0.0;
    }
    if length < 5 {
        return 0.5;
    }

    let score = 0.40 * symbol_score(text)
        + 0.30 * word_shape_score(text)
        + 0.15 * spacing_score(text)
        + 0.15 * run_score(text);

    score.clamp(0.0, 1.0)
}

/// Penalizes symbols outside letters, digits and punctuation, and rewards letters
fn symbol_score(text: &str) -> f32 {
    let mut total = 0usize;
    let mut letters = 0usize;
    let mut odd = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_alphabetic() {
            letters += 1;
        } else if !c.is_numeric() && !c.is_whitespace() && !c.is_ascii_punctuation() {
            odd += 1;
        }
    }

    let odd_share = odd as f32 / total as f32;
    let letter_share = letters as f32 / total as f32;

    0.6 * (1.0 - (odd_share * 10.0).min(1.0)) + 0.4 * (letter_share * 1.5).min(1.0)
}

/// Garbled output tends towards one-character fragments or endless runs
fn word_shape_score(text: &str) -> f32 {
    let lengths: Vec<usize> = text.split_whitespace().map(|w| w.chars().count()).collect();
    if lengths.is_empty() {
        return 0.5;
    }

    let mean = lengths.iter().sum::<usize>() / lengths.len();
    let base = match mean {
        0..=1 => 0.3,
        2..=3 => 0.7,
        4..=8 => 1.0,
        9..=12 => 0.8,
        _ => 0.4,
    };

    let singles = lengths.iter().filter(|&&l| l == 1).count() as f32 / lengths.len() as f32;
    base * (1.0 - (singles * 1.5).min(0.5))
}

/// Ordinary prose is 10-25% whitespace
fn spacing_score(text: &str) -> f32 {
    let total = text.chars().count();
    let spaces = text.chars().filter(|c| c.is_whitespace()).count();

    match spaces * 100 / total.max(1) {
        0..=5 => 0.5,
        6..=10 => 0.8,
        11..=25 => 1.0,
        26..=40 => 0.7,
        _ => 0.3,
    }
}

/// Long runs of one character ("aaaa", "####") suggest confusion
fn run_score(text: &str) -> f32 {
    let mut longest = 1;
    let mut run = 0;
    let mut previous = None;

    for c in text.chars() {
        run = if Some(c) == previous && !c.is_whitespace() {
            run + 1
        } else {
            1
        };
        longest = longest.max(run);
        previous = Some(c);
    }

    match longest {
        0..=3 => 1.0,
        4..=5 => 0.8,
        6..=10 => 0.5,
        _ => 0.2,
    }
}
