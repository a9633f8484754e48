//! Optional predictors the pipeline consults for enrichment
//!
//! Both are opaque models living outside this crate. Their failures never
//! abort a document; the step is skipped and logged instead.

use crate::config::PipelineConfig;
use crate::correction::{AppliedCorrection, CorrectionMethod};
use crate::error::OcrError;
use std::collections::BTreeMap;
use std::path::Path;

/// Predicts the document type of a file
pub trait DocumentClassifier: Send + Sync {
    /// Index of the predicted class and its confidence in [0, 1]
    fn predict(&self, path: &Path) -> Result<(usize, f32), OcrError>;

    /// Human-readable name of a class index
    fn class_name(&self, index: usize) -> Option<String>;
}

/// Neural spelling model for short passages
pub trait SpellCorrector: Send + Sync {
    fn correct(&self, text: &str) -> Result<String, OcrError>;
}

/// Marker the speller emits when its output is unusable
const SENTINEL: &str = "<extra_id";

/// Run `speller` over `text` when the text is short and sentence-like,
/// returning the replacement text and its provenance record.
pub(crate) fn guarded_spelling(
    speller: &dyn SpellCorrector,
    text: &str,
    config: &PipelineConfig,
) -> Option<(String, AppliedCorrection)> {
    let spaces = text.chars().filter(|c| *c == ' ').count();
    if text.chars().count() > config.speller_max_chars || spaces < config.speller_min_spaces {
        return None;
    }

    let corrected = match speller.correct(text) {
        Ok(corrected) => corrected,
        Err(e) => {
            tracing::warn!("Spell corrector failed, keeping text as is: {}", e);
            return None;
        }
    };

    if corrected.trim().is_empty() || corrected.contains(SENTINEL) {
        tracing::debug!("Discarding unusable spell corrector output");
        return None;
    }
    if corrected == text {
        return None;
    }

    let correction = AppliedCorrection {
        from: text.to_string(),
        to: corrected.clone(),
        confidence: config.speller_confidence,
        method: CorrectionMethod::NeuralSpelling,
        context: None,
        matched_original: None,
        digit_replacements: BTreeMap::new(),
        case: None,
    };
    Some((corrected, correction))
}
