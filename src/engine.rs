use crate::error::OcrError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Rectangle with coordinates normalized to the recognized image, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Normalize a pixel rectangle against the image size
    pub fn from_pixels(
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            x1: (left / w).clamp(0.0, 1.0),
            y1: (top / h).clamp(0.0, 1.0),
            x2: (right / w).clamp(0.0, 1.0),
            y2: (bottom / h).clamp(0.0, 1.0),
        }
    }

    pub fn full() -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
        }
    }
}

/// A recognized block of text with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// OCR processing result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    /// Overall recognition confidence in [0, 1]
    pub confidence: f32,
    pub regions: Vec<TextRegion>,
    pub warnings: Vec<String>,
}

/// Recognition output for one page of a document (1-based page number)
#[derive(Debug, Clone)]
pub struct PageRecognition {
    pub page_number: usize,
    pub result: OcrResult,
}

/// Trait that all OCR engines must implement
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "leptess")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize the text of a single page image
    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError>;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}
