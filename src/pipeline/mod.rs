//! Document processing pipeline
//!
//! Loads a document, recognizes every page plus any operator-selected areas,
//! then corrects, validates and scores the text. Applied corrections are fed
//! back to the feedback store as implicit feedback.

mod batch;
mod collaborators;
pub mod loader;
mod result;

pub use batch::{BatchEntry, BatchReport, FailedDocument};
pub use collaborators::{DocumentClassifier, SpellCorrector};
pub use loader::{DocumentLoader, FileKind, LoadedPage};
pub use result::{
    AreaText, CorrectionSuggestion, ExtractedData, NoteKind, PageText, ProcessingResult,
    ReviewNote, ReviewNotes, SelectedArea,
};

use crate::config::{Config, PipelineConfig};
use crate::correction::{AutoCorrector, CorrectionDictionary, CorrectionMethod};
use crate::engine::{OcrEngine, OcrResult, PageRecognition};
use crate::error::OcrError;
use crate::feedback::{FeedbackStore, NewCorrection};
use crate::quality::QualityScorer;
use crate::validation::FieldValidator;
use chrono::Utc;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const AREAS_HEADER: &str = "=== SELECTED AREAS ===";
const MAIN_TEXT_HEADER: &str = "=== MAIN TEXT ===";
const PAGE_SEPARATOR: &str = "\n\n--- PAGE BREAK ---\n\n";

/// Per-call options for [`DocumentPipeline::process`]
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Document template; detected by the classifier when absent
    pub template: Option<String>,
    /// Fields to validate; every registered field when absent
    pub required_fields: Option<Vec<String>>,
    pub selected_areas: Vec<SelectedArea>,
}

pub struct DocumentPipeline {
    engine: Arc<dyn OcrEngine>,
    loader: DocumentLoader,
    corrector: AutoCorrector,
    validator: FieldValidator,
    scorer: QualityScorer,
    feedback: Option<Arc<FeedbackStore>>,
    classifier: Option<Arc<dyn DocumentClassifier>>,
    speller: Option<Arc<dyn SpellCorrector>>,
    config: PipelineConfig,
}

impl DocumentPipeline {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        dictionary: Arc<CorrectionDictionary>,
        feedback: Option<Arc<FeedbackStore>>,
        config: &Config,
    ) -> Result<Self, OcrError> {
        Ok(Self {
            engine,
            loader: DocumentLoader::new(config.pipeline.base_dpi),
            corrector: AutoCorrector::new(dictionary, config.correction.clone())?,
            validator: FieldValidator::new()?,
            scorer: QualityScorer::new(config.quality.clone()),
            feedback,
            classifier: None,
            speller: None,
            config: config.pipeline.clone(),
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn DocumentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_spell_corrector(mut self, speller: Arc<dyn SpellCorrector>) -> Self {
        self.speller = Some(speller);
        self
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }

    pub fn corrector(&self) -> &AutoCorrector {
        &self.corrector
    }

    pub fn validator(&self) -> &FieldValidator {
        &self.validator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a single document.
    ///
    /// Blocking: recognition and file I/O run on the calling thread.
    pub fn process(
        &self,
        path: &Path,
        options: &ProcessOptions,
    ) -> Result<ProcessingResult, OcrError> {
        let file_type = FileKind::detect(path)?;
        let document_id = document_id(path);
        tracing::info!("Processing {} as {}", path.display(), document_id);

        let pages = self.loader.load_pages(path, None)?;
        let first = pages
            .first()
            .ok_or_else(|| OcrError::EmptyRecognition(path.display().to_string()))?;

        let areas = if options.selected_areas.is_empty() {
            Vec::new()
        } else {
            self.recognize_areas(path, &pages, &options.selected_areas)
        };

        let recognitions: Vec<PageRecognition> = pages
            .iter()
            .map(|page| PageRecognition {
                page_number: page.number,
                result: self.recognize_page(page.number, &page.image),
            })
            .collect();

        let page_texts: Vec<PageText> = recognitions
            .iter()
            .map(|r| PageText {
                page_number: r.page_number,
                text: r.result.text.clone(),
                confidence: r.result.confidence,
                word_count: r.result.text.split_whitespace().count(),
            })
            .collect();

        let raw_text = concatenate(&areas, &page_texts, self.config.area_dpi);
        if raw_text.trim().is_empty() {
            return Err(OcrError::EmptyRecognition(path.display().to_string()));
        }

        let (mut full_text, mut corrections) = self.corrector.correct(&raw_text);
        if let Some(speller) = &self.speller {
            if let Some((spelled, correction)) =
                collaborators::guarded_spelling(&**speller, &full_text, &self.config)
            {
                full_text = spelled;
                corrections.push(correction);
            }
        }

        let critical_fields = self
            .validator
            .validate_critical(&full_text, options.required_fields.as_deref());

        let quality_report = self.scorer.score(&first.image, &recognitions, &full_text);

        let template = match &options.template {
            Some(template) => Some(template.clone()),
            None => self.detect_template(path),
        };

        let needs_review =
            quality_report.needs_review || critical_fields.values().any(|field| !field.valid);

        let mut result = ProcessingResult {
            document_id,
            processing_date: Utc::now(),
            file_path: path.to_path_buf(),
            file_type,
            template,
            quality_report,
            extracted_data: ExtractedData {
                critical_fields,
                full_text,
                raw_text,
                total_pages: page_texts.len(),
                pages: page_texts,
                selected_areas: areas,
            },
            corrections_applied: corrections,
            needs_review,
            new_corrections_suggested: Vec::new(),
            review_notes: ReviewNotes::default(),
        };
        result.review_notes = ReviewNotes::for_result(&result);

        self.capture_feedback(&result);

        tracing::info!(
            "Processed {}: quality {:.2}, {} corrections, needs review: {}",
            result.document_id,
            result.quality_report.overall_quality,
            result.corrections_applied.len(),
            result.needs_review
        );

        Ok(result)
    }

    fn recognize_page(&self, number: usize, image: &DynamicImage) -> OcrResult {
        match self.engine.recognize(image) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Recognition failed on page {}: {}", number, e);
                OcrResult {
                    warnings: vec![format!("Recognition failed on page {}: {}", number, e)],
                    ..OcrResult::default()
                }
            }
        }
    }

    /// Re-recognize each selected area on a higher-resolution render of its page
    fn recognize_areas(
        &self,
        path: &Path,
        pages: &[LoadedPage],
        areas: &[SelectedArea],
    ) -> Vec<AreaText> {
        let dpi = self.config.area_dpi;
        let mut renders: BTreeMap<usize, Option<(DynamicImage, f32, f32)>> = BTreeMap::new();
        let mut texts = Vec::new();

        for (index, area) in areas.iter().enumerate() {
            let area_number = index + 1;

            let render = renders.entry(area.page).or_insert_with(|| {
                match self.render_page(path, pages, area.page, dpi) {
                    Ok(render) => Some(render),
                    Err(e) => {
                        tracing::warn!("Cannot render page {} at {} dpi: {}", area.page, dpi, e);
                        None
                    }
                }
            });
            let Some((image, scale_x, scale_y)) = render.as_ref() else {
                continue;
            };

            let Some(crop) = crop_area(image, area, *scale_x, *scale_y) else {
                tracing::warn!("Area {} is empty or outside page {}", area_number, area.page);
                continue;
            };

            match self.engine.recognize(&crop) {
                Ok(result) if !result.text.trim().is_empty() => texts.push(AreaText {
                    area_number,
                    coordinates: *area,
                    word_count: result.text.split_whitespace().count(),
                    text: result.text,
                    confidence: result.confidence,
                    dpi,
                }),
                Ok(_) => tracing::debug!("No text in area {}", area_number),
                Err(e) => tracing::warn!("Recognition failed in area {}: {}", area_number, e),
            }
        }

        texts
    }

    /// High-resolution page image and its measured scale over the base page
    fn render_page(
        &self,
        path: &Path,
        pages: &[LoadedPage],
        page: usize,
        dpi: u32,
    ) -> Result<(DynamicImage, f32, f32), OcrError> {
        let base = pages
            .iter()
            .find(|p| p.number == page)
            .ok_or_else(|| OcrError::InvalidRequest(format!("Page {} not found", page)))?;
        let high = self.loader.load_page(path, page, Some(dpi))?;

        let scale_x = high.image.width() as f32 / base.image.width().max(1) as f32;
        let scale_y = high.image.height() as f32 / base.image.height().max(1) as f32;
        tracing::debug!(
            "Page {} rendered at {} dpi, scale {:.3}x{:.3}",
            page,
            dpi,
            scale_x,
            scale_y
        );

        Ok((high.image, scale_x, scale_y))
    }

    fn detect_template(&self, path: &Path) -> Option<String> {
        let classifier = self.classifier.as_ref()?;
        match classifier.predict(path) {
            Ok((index, confidence)) if confidence > self.config.classifier_threshold => {
                let name = classifier.class_name(index);
                tracing::info!("Detected document type {:?} ({:.2})", name, confidence);
                name
            }
            Ok((_, confidence)) => {
                tracing::debug!("Document type confidence {:.2} too low", confidence);
                None
            }
            Err(e) => {
                tracing::warn!("Document classifier failed: {}", e);
                None
            }
        }
    }

    /// Forward applied corrections to the feedback store, best effort
    fn capture_feedback(&self, result: &ProcessingResult) {
        let Some(store) = &self.feedback else {
            return;
        };

        let context: String = result
            .extracted_data
            .full_text
            .chars()
            .take(self.config.feedback_context_chars)
            .collect();

        for correction in &result.corrections_applied {
            if correction.method == CorrectionMethod::NeuralSpelling {
                continue;
            }
            let feedback = NewCorrection {
                original: correction.from.clone(),
                corrected: correction.to.clone(),
                document_id: result.document_id.clone(),
                context: Some(context.clone()),
                user_id: None,
                confidence: correction.confidence,
            };
            if let Err(e) = store.add_correction(feedback) {
                tracing::warn!(
                    "Could not record implicit feedback {} -> {}: {}",
                    correction.from,
                    correction.to,
                    e
                );
            }
        }
    }
}

/// `<file name>_<8 hex>`
fn document_id(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", name, &suffix[..8])
}

/// Selected-area text first, then the page texts
fn concatenate(areas: &[AreaText], pages: &[PageText], area_dpi: u32) -> String {
    let main = pages
        .iter()
        .map(|p| p.text.as_str())
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);

    if areas.is_empty() {
        return main;
    }

    let mut text = format!("{} ({} DPI)\n", AREAS_HEADER, area_dpi);
    for area in areas {
        text.push_str(&format!("[Area {}]: {}\n", area.area_number, area.text));
    }
    if !main.trim().is_empty() {
        text.push('\n');
        text.push_str(MAIN_TEXT_HEADER);
        text.push('\n');
        text.push_str(&main);
    }
    text
}

/// Crop `area`, given in base pixels, out of a page scaled by `scale_x`/`scale_y`
fn crop_area(
    image: &DynamicImage,
    area: &SelectedArea,
    scale_x: f32,
    scale_y: f32,
) -> Option<DynamicImage> {
    let (width, height) = (image.width(), image.height());

    let x1 = ((area.x1 * scale_x).max(0.0) as u32).min(width);
    let y1 = ((area.y1 * scale_y).max(0.0) as u32).min(height);
    let x2 = ((area.x2 * scale_x).max(0.0) as u32).min(width);
    let y2 = ((area.y2 * scale_y).max(0.0) as u32).min(height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(image.crop_imm(x1, y1, x2 - x1, y2 - y1))
}
