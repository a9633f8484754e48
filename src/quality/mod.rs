//! Quality scoring of a recognized document
//!
//! The score blends three sources: image measurements of the first page,
//! the recognition confidence reported by the engine, and a handwriting
//! heuristic over low-confidence regions.

mod metrics;

pub use metrics::ImageMetrics;

use crate::config::QualityConfig;
use crate::engine::{BoundingBox, PageRecognition};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Handwritten regions counted against the score at most this many times
const MAX_PENALIZED_REGIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Blur,
    LowContrast,
    Brightness,
    Handwriting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// A region that may contain handwriting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandwrittenArea {
    pub text: String,
    pub confidence: f32,
    pub area: BoundingBox,
    pub page_number: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<HandwrittenArea>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_quality: f32,
    pub image_quality: ImageMetrics,
    pub ocr_confidence: f32,
    pub issues: Vec<QualityIssue>,
    pub handwritten_areas: Vec<HandwrittenArea>,
    pub warnings: Vec<String>,
    pub needs_review: bool,
}

pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Score a document from its first page image and per-page recognition
    pub fn score(
        &self,
        image: &DynamicImage,
        pages: &[PageRecognition],
        corrected_text: &str,
    ) -> QualityReport {
        let image_quality = ImageMetrics::measure(image, &self.config);

        let ocr_confidence = if pages.is_empty() {
            0.0
        } else {
            pages.iter().map(|p| p.result.confidence).sum::<f32>() / pages.len() as f32
        };

        let handwritten_areas = self.detect_handwriting(pages);

        let mut issues = self.image_issues(&image_quality);
        issues.extend(handwritten_areas.iter().map(|area| QualityIssue {
            kind: IssueKind::Handwriting,
            severity: self.severity(area.confidence, self.config.handwriting_cutoff),
            message: "Possibly handwritten text may be recognized inaccurately, please verify"
                .to_string(),
            region: Some(area.clone()),
        }));

        let penalized = handwritten_areas.len().min(MAX_PENALIZED_REGIONS) as f32;
        let overall_quality = (0.3 * image_quality.overall_quality
            + 0.5 * ocr_confidence
            + 0.2 * (1.0 - 0.1 * penalized))
            .clamp(0.0, 1.0);

        let mut warnings = Vec::new();
        if image_quality.overall_quality < self.config.review_threshold {
            warnings.push(
                "Low source image quality may prevent the text from being fully recognized"
                    .to_string(),
            );
        }
        if !handwritten_areas.is_empty() {
            warnings.push(format!(
                "Found {} regions with possibly handwritten text, please verify",
                handwritten_areas.len()
            ));
        }
        if corrected_text.trim().is_empty() {
            warnings.push("No text was recognized".to_string());
        }

        let needs_review = overall_quality < self.config.review_threshold || !issues.is_empty();

        tracing::debug!(
            "Quality {:.2} (image {:.2}, ocr {:.2}, {} issues)",
            overall_quality,
            image_quality.overall_quality,
            ocr_confidence,
            issues.len()
        );

        QualityReport {
            overall_quality,
            image_quality,
            ocr_confidence,
            issues,
            handwritten_areas,
            warnings,
            needs_review,
        }
    }

    fn image_issues(&self, metrics: &ImageMetrics) -> Vec<QualityIssue> {
        let checks = [
            (
                IssueKind::Blur,
                metrics.sharpness,
                self.config.sharpness_threshold,
                "Image is blurred, recognition accuracy may suffer",
            ),
            (
                IssueKind::LowContrast,
                metrics.contrast,
                self.config.contrast_threshold,
                "Image contrast is low",
            ),
            (
                IssueKind::Brightness,
                metrics.brightness,
                self.config.brightness_threshold,
                "Image brightness is far from optimal",
            ),
        ];

        checks
            .into_iter()
            .filter(|(_, value, threshold, _)| value < threshold)
            .map(|(kind, value, threshold, message)| QualityIssue {
                kind,
                severity: self.severity(value, threshold),
                message: message.to_string(),
                region: None,
            })
            .collect()
    }

    fn severity(&self, value: f32, threshold: f32) -> Severity {
        if value < threshold * self.config.high_severity_ratio {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    fn detect_handwriting(&self, pages: &[PageRecognition]) -> Vec<HandwrittenArea> {
        pages
            .iter()
            .flat_map(|page| {
                page.result
                    .regions
                    .iter()
                    .filter(|r| !r.text.trim().is_empty())
                    .filter(|r| r.confidence < self.config.handwriting_cutoff)
                    .map(move |r| HandwrittenArea {
                        text: r.text.clone(),
                        confidence: r.confidence,
                        area: r.bbox,
                        page_number: page.page_number,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{OcrResult, TextRegion};
    use image::{GrayImage, Luma};

    fn checkerboard() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
            Luma([if (x / 4 + y / 4) % 2 == 0 { 0u8 } else { 255u8 }])
        }))
    }

    fn page(page_number: usize, confidence: f32, regions: &[(&str, f32)]) -> PageRecognition {
        PageRecognition {
            page_number,
            result: OcrResult {
                text: regions.iter().map(|(t, _)| *t).collect::<Vec<_>>().join("\n"),
                confidence,
                regions: regions
                    .iter()
                    .map(|(text, confidence)| TextRegion {
                        text: text.to_string(),
                        confidence: *confidence,
                        bbox: BoundingBox::full(),
                    })
                    .collect(),
                warnings: Vec::new(),
            },
        }
    }

    #[test]
    fn test_flat_image_needs_review() {
        let scorer = QualityScorer::new(QualityConfig::default());
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([180u8])));

        let report = scorer.score(&image, &[page(1, 0.95, &[("text", 0.95)])], "text");

        assert!(report.image_quality.sharpness < 0.5);
        assert!(report.needs_review);
        let blur = report.issues.iter().find(|i| i.kind == IssueKind::Blur).unwrap();
        assert_eq!(blur.severity, Severity::High);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_clean_document_passes() {
        let scorer = QualityScorer::new(QualityConfig::default());

        let pages = [page(1, 0.9, &[("ООО Ромашка", 0.9)])];
        let report = scorer.score(&checkerboard(), &pages, "ООО Ромашка");

        assert!(report.issues.is_empty());
        assert!(!report.needs_review);
        let expected = 0.3 * report.image_quality.overall_quality + 0.5 * 0.9 + 0.2;
        assert!((report.overall_quality - expected).abs() < 1e-5);
    }

    #[test]
    fn test_low_confidence_regions_are_handwriting() {
        let scorer = QualityScorer::new(QualityConfig::default());
        let pages = [
            page(1, 0.9, &[("печатный", 0.9)]),
            page(2, 0.6, &[("подпись", 0.2), ("   ", 0.1), ("дата", 0.4)]),
        ];

        let report = scorer.score(&checkerboard(), &pages, "печатный подпись дата");

        assert_eq!(report.handwritten_areas.len(), 2);
        assert!(report.handwritten_areas.iter().all(|a| a.page_number == 2));
        assert!(report.needs_review);

        let severities: Vec<Severity> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::Handwriting)
            .map(|i| i.severity)
            .collect();
        assert_eq!(severities, vec![Severity::High, Severity::Medium]);
        assert!((report.ocr_confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_handwriting_penalty_is_capped() {
        let scorer = QualityScorer::new(QualityConfig::default());
        let regions: Vec<(&str, f32)> = (0..15).map(|_| ("x", 0.1)).collect();

        let report = scorer.score(&checkerboard(), &[page(1, 0.0, &regions)], "x");

        let expected = 0.3 * report.image_quality.overall_quality;
        assert!((report.overall_quality - expected).abs() < 1e-5);
    }

    #[test]
    fn test_no_pages_means_zero_confidence() {
        let scorer = QualityScorer::new(QualityConfig::default());
        let report = scorer.score(&checkerboard(), &[], "");

        assert_eq!(report.ocr_confidence, 0.0);
        assert!(report.needs_review);
        assert!(report.warnings.iter().any(|w| w.contains("No text")));
    }
}
