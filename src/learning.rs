//! Feedback-driven promotion of corrections into the dictionary
//!
//! Promotion is conservative: a pair enters the dictionary only after enough
//! independent, confident feedback agrees on it, and an existing dictionary
//! key is never overwritten.

use crate::config::LearningConfig;
use crate::correction::CorrectionDictionary;
use crate::error::OcrError;
use crate::feedback::{
    DocumentTypeFeedback, FeedbackPayload, FeedbackStatistics, FeedbackStore, QualityRating,
};
use crate::storage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Most frequent pending pairs reported by pattern analysis
const COMMON_ERRORS_LIMIT: usize = 10;
/// Classifier accuracy below which retraining is recommended
const LOW_ACCURACY: f32 = 0.7;
/// Samples needed before a type's accuracy is trusted
const MIN_ACCURACY_SAMPLES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub feedback_id: String,
    pub corrections_added: Vec<String>,
    pub document_types_learned: Vec<String>,
    /// Dictionary entries promoted as a consequence of this feedback
    pub promoted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotedCorrection {
    pub original: String,
    pub corrected: String,
    pub occurrences: usize,
    pub avg_confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromotionReport {
    pub promoted: Vec<PromotedCorrection>,
    /// Candidates whose original is already a dictionary key
    pub skipped: usize,
    /// Feedback records marked applied
    pub marked_applied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonError {
    pub original: String,
    pub corrected: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeAccuracy {
    pub accuracy: f32,
    pub correct: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternAnalysis {
    pub common_errors: Vec<CommonError>,
    pub document_type_accuracy: BTreeMap<String, TypeAccuracy>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningStatistics {
    pub feedback_statistics: FeedbackStatistics,
    pub pattern_analysis: PatternAnalysis,
    pub auto_update_enabled: bool,
    pub corrections_db_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedCorrection {
    pub original: String,
    pub corrected: String,
    pub context: Option<String>,
    pub confidence: f32,
}

/// Snapshot handed to out-of-band retraining
#[derive(Debug, Clone, Serialize)]
pub struct TrainingExport {
    pub corrections: Vec<ExportedCorrection>,
    pub document_types: Vec<DocumentTypeFeedback>,
    pub quality_ratings: Vec<QualityRating>,
    pub export_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedCorrection {
    pub correction_id: String,
    pub added_to_db: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DictionaryView {
    pub corrections: BTreeMap<String, String>,
    pub total_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct ActiveLearningController {
    store: Arc<FeedbackStore>,
    dictionary: Arc<CorrectionDictionary>,
    config: LearningConfig,
    export_path: PathBuf,
    // Serializes candidate selection, insertion and marking
    promotion: Mutex<()>,
}

impl ActiveLearningController {
    pub fn new(
        store: Arc<FeedbackStore>,
        dictionary: Arc<CorrectionDictionary>,
        config: LearningConfig,
        export_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            dictionary,
            config,
            export_path: export_path.into(),
            promotion: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<FeedbackStore> {
        &self.store
    }

    pub fn dictionary(&self) -> &Arc<CorrectionDictionary> {
        &self.dictionary
    }

    /// Record feedback; correction feedback triggers promotion immediately
    pub fn process_feedback(&self, payload: FeedbackPayload) -> Result<FeedbackOutcome, OcrError> {
        let mut outcome = FeedbackOutcome::default();

        match payload {
            FeedbackPayload::Correction(correction) => {
                outcome.feedback_id = self.store.add_correction(correction)?;
                outcome.corrections_added.push(outcome.feedback_id.clone());
                if self.config.auto_update_enabled {
                    outcome.promoted = self.auto_update().promoted.len();
                }
            }
            FeedbackPayload::Quality(rating) => {
                outcome.feedback_id = self.store.add_quality_rating(rating)?;
            }
            FeedbackPayload::DocumentType(feedback) => {
                let actual_type = feedback.actual_type.clone();
                outcome.feedback_id = self.store.add_document_type(feedback)?;
                outcome.document_types_learned.push(actual_type);
            }
        }

        Ok(outcome)
    }

    /// Promote recurring, confident corrections into the dictionary.
    ///
    /// Only feedback behind an actual insert is marked applied; candidates
    /// whose original already has an entry stay pending.
    pub fn auto_update(&self) -> PromotionReport {
        let _guard = self.promotion.lock();

        let candidates = self
            .store
            .unapplied_corrections(self.config.min_confidence, self.config.min_occurrences);
        if candidates.is_empty() {
            return PromotionReport::default();
        }

        tracing::info!("Found {} candidates for dictionary promotion", candidates.len());

        let mut report = PromotionReport::default();
        let mut to_mark = Vec::new();

        for candidate in candidates {
            if !self
                .dictionary
                .insert_if_absent(&candidate.original, &candidate.corrected)
            {
                report.skipped += 1;
                continue;
            }

            tracing::info!(
                "Promoted correction '{}' -> '{}' ({} occurrences, confidence {:.2})",
                candidate.original,
                candidate.corrected,
                candidate.occurrences,
                candidate.avg_confidence
            );
            to_mark.extend(candidate.feedback_ids);
            report.promoted.push(PromotedCorrection {
                original: candidate.original,
                corrected: candidate.corrected,
                occurrences: candidate.occurrences,
                avg_confidence: candidate.avg_confidence,
            });
        }

        report.marked_applied = self.store.mark_applied(&to_mark);
        report
    }

    pub fn analyze_patterns(&self) -> PatternAnalysis {
        let mut analysis = self.store.with_log(|log| {
            let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
            for correction in log.corrections.iter().filter(|c| !c.applied) {
                *counts
                    .entry((correction.original.as_str(), correction.corrected.as_str()))
                    .or_default() += 1;
            }

            let mut common: Vec<CommonError> = counts
                .into_iter()
                .map(|((original, corrected), count)| CommonError {
                    original: original.to_string(),
                    corrected: corrected.to_string(),
                    count,
                })
                .collect();
            common.sort_by(|a, b| b.count.cmp(&a.count));
            common.truncate(COMMON_ERRORS_LIMIT);

            let mut tallies: BTreeMap<String, (usize, usize)> = BTreeMap::new();
            for feedback in &log.document_types {
                let tally = tallies.entry(feedback.predicted_type.clone()).or_default();
                tally.1 += 1;
                if feedback.correct {
                    tally.0 += 1;
                }
            }

            PatternAnalysis {
                common_errors: common,
                document_type_accuracy: tallies
                    .into_iter()
                    .map(|(kind, (correct, total))| {
                        let accuracy = if total > 0 {
                            correct as f32 / total as f32
                        } else {
                            0.0
                        };
                        (
                            kind,
                            TypeAccuracy {
                                accuracy,
                                correct,
                                total,
                            },
                        )
                    })
                    .collect(),
                recommendations: Vec::new(),
            }
        });

        if !analysis.common_errors.is_empty() {
            analysis.recommendations.push(format!(
                "Found {} frequent errors; consider adding them to the corrections dictionary",
                analysis.common_errors.len()
            ));
        }

        let weak_types: Vec<&str> = analysis
            .document_type_accuracy
            .iter()
            .filter(|(_, stats)| {
                stats.accuracy < LOW_ACCURACY && stats.total >= MIN_ACCURACY_SAMPLES
            })
            .map(|(kind, _)| kind.as_str())
            .collect();
        if !weak_types.is_empty() {
            let message = format!(
                "Low classification accuracy for types: {}; consider retraining the classifier",
                weak_types.join(", ")
            );
            analysis.recommendations.push(message);
        }

        analysis
    }

    pub fn statistics(&self) -> LearningStatistics {
        LearningStatistics {
            feedback_statistics: self.store.statistics(),
            pattern_analysis: self.analyze_patterns(),
            auto_update_enabled: self.config.auto_update_enabled,
            corrections_db_size: self.dictionary.len(),
        }
    }

    /// Write pending corrections and all other feedback to `path`
    /// (the configured export path by default)
    pub fn export_training_data(&self, path: Option<&Path>) -> Result<PathBuf, OcrError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| self.export_path.clone());

        let export = self.store.with_log(|log| TrainingExport {
            corrections: log
                .corrections
                .iter()
                .filter(|c| !c.applied)
                .map(|c| ExportedCorrection {
                    original: c.original.clone(),
                    corrected: c.corrected.clone(),
                    context: c.context.clone(),
                    confidence: c.confidence,
                })
                .collect(),
            document_types: log.document_types.clone(),
            quality_ratings: log.quality_ratings.clone(),
            export_timestamp: Utc::now(),
        });

        storage::write_json_atomic(&path, &export)?;
        tracing::info!(
            "Exported {} pending corrections for training to {:?}",
            export.corrections.len(),
            path
        );
        Ok(path)
    }

    /// Operator confirmation of a single correction
    pub fn confirm_correction(
        &self,
        original: &str,
        corrected: &str,
        add_to_db: bool,
    ) -> Result<ConfirmedCorrection, OcrError> {
        if original.trim().is_empty() {
            return Err(OcrError::InvalidRequest("original must not be empty".to_string()));
        }

        let added_to_db = add_to_db && self.dictionary.learn(original, corrected);

        Ok(ConfirmedCorrection {
            correction_id: format!("corr_{}", Uuid::now_v7().simple()),
            added_to_db,
        })
    }

    pub fn dictionary_view(&self) -> DictionaryView {
        let corrections = self.dictionary.snapshot();
        DictionaryView {
            total_count: corrections.len(),
            corrections,
            last_updated: self.dictionary.last_updated(),
        }
    }
}
