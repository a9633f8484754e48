//! Append-only log of operator feedback
//!
//! Three record kinds are kept: corrections, quality ratings and document
//! type feedback. Every mutation rewrites the whole file atomically while the
//! write lock is held, so concurrent appends are never lost.

mod records;

pub use records::*;

use crate::error::OcrError;
use crate::storage;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use uuid::Uuid;

pub struct FeedbackStore {
    path: PathBuf,
    log: RwLock<FeedbackLog>,
}

/// Time-ordered unique id with a kind prefix
fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::now_v7().simple())
}

fn check_unit(name: &str, value: f32) -> Result<(), OcrError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OcrError::InvalidRequest(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )))
    }
}

fn check_present(name: &str, value: &str) -> Result<(), OcrError> {
    if value.trim().is_empty() {
        Err(OcrError::InvalidRequest(format!("{} must not be empty", name)))
    } else {
        Ok(())
    }
}

impl FeedbackStore {
    /// Load the feedback log from `path`.
    ///
    /// A missing file starts an empty log. A malformed file is logged and
    /// replaced by an empty log on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let log = match storage::read_json::<FeedbackLog>(&path) {
            Ok(Some(log)) => {
                tracing::info!(
                    "Loaded feedback log from {:?} ({} corrections, {} ratings, {} type records)",
                    path,
                    log.corrections.len(),
                    log.quality_ratings.len(),
                    log.document_types.len()
                );
                log
            }
            Ok(None) => FeedbackLog::default(),
            Err(e) => {
                tracing::error!("Failed to load feedback log: {}", e);
                FeedbackLog::default()
            }
        };

        Self {
            path,
            log: RwLock::new(log),
        }
    }

    pub fn add_correction(&self, feedback: NewCorrection) -> Result<String, OcrError> {
        check_present("original", &feedback.original)?;
        check_present("corrected", &feedback.corrected)?;
        check_present("document_id", &feedback.document_id)?;
        check_unit("confidence", feedback.confidence)?;

        let id = new_id("feedback");
        let mut log = self.log.write();
        log.corrections.push(CorrectionFeedback {
            id: id.clone(),
            original: feedback.original,
            corrected: feedback.corrected,
            document_id: feedback.document_id,
            context: feedback.context,
            user_id: feedback.user_id,
            confidence: feedback.confidence,
            timestamp: Utc::now(),
            applied: false,
            applied_at: None,
        });
        log.statistics.total_feedback += 1;
        log.statistics.corrections_count += 1;
        self.flush(&mut log);

        tracing::info!("Added correction feedback {}", id);
        Ok(id)
    }

    pub fn add_quality_rating(&self, rating: NewQualityRating) -> Result<String, OcrError> {
        check_present("document_id", &rating.document_id)?;
        check_unit("rating", rating.rating)?;

        let id = new_id("quality");
        let mut log = self.log.write();
        log.quality_ratings.push(QualityRating {
            id: id.clone(),
            document_id: rating.document_id,
            rating: rating.rating,
            issues: rating.issues,
            user_id: rating.user_id,
            timestamp: Utc::now(),
        });
        log.statistics.total_feedback += 1;
        self.flush(&mut log);

        tracing::info!("Added quality rating {}", id);
        Ok(id)
    }

    pub fn add_document_type(&self, feedback: NewDocumentType) -> Result<String, OcrError> {
        check_present("document_id", &feedback.document_id)?;
        check_present("actual_type", &feedback.actual_type)?;

        let id = new_id("doctype");
        let mut log = self.log.write();
        log.document_types.push(DocumentTypeFeedback {
            id: id.clone(),
            correct: feedback.predicted_type == feedback.actual_type,
            document_id: feedback.document_id,
            predicted_type: feedback.predicted_type,
            actual_type: feedback.actual_type,
            user_id: feedback.user_id,
            timestamp: Utc::now(),
        });
        log.statistics.total_feedback += 1;
        self.flush(&mut log);

        tracing::info!("Added document type feedback {}", id);
        Ok(id)
    }

    /// Unapplied corrections grouped by pair that meet both thresholds,
    /// most frequent first, then most confident.
    pub fn unapplied_corrections(
        &self,
        min_confidence: f32,
        min_occurrences: usize,
    ) -> Vec<CandidateCorrection> {
        let log = self.log.read();
        let mut groups: BTreeMap<(&str, &str), (Vec<String>, f32)> = BTreeMap::new();
        for correction in log.corrections.iter().filter(|c| !c.applied) {
            let group = groups
                .entry((correction.original.as_str(), correction.corrected.as_str()))
                .or_default();
            group.0.push(correction.id.clone());
            group.1 += correction.confidence;
        }

        let mut candidates: Vec<CandidateCorrection> = groups
            .into_iter()
            .filter_map(|((original, corrected), (feedback_ids, total))| {
                let occurrences = feedback_ids.len();
                let avg_confidence = total / occurrences as f32;
                (occurrences >= min_occurrences && avg_confidence >= min_confidence).then(|| {
                    CandidateCorrection {
                        original: original.to_string(),
                        corrected: corrected.to_string(),
                        occurrences,
                        avg_confidence,
                        feedback_ids,
                    }
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then(b.avg_confidence.total_cmp(&a.avg_confidence))
        });
        candidates
    }

    /// Mark the given correction records applied and persist once.
    ///
    /// Records already applied keep their original `applied_at`. Returns the
    /// number of records that changed.
    pub fn mark_applied(&self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let now = Utc::now();

        let mut log = self.log.write();
        let mut changed = 0;
        for correction in log.corrections.iter_mut() {
            if !correction.applied && wanted.contains(correction.id.as_str()) {
                correction.applied = true;
                correction.applied_at = Some(now);
                changed += 1;
            }
        }

        if changed > 0 {
            self.flush(&mut log);
            tracing::info!("Marked {} corrections as applied", changed);
        }
        changed
    }

    pub fn statistics(&self) -> FeedbackStatistics {
        let log = self.log.read();
        let total_corrections = log.corrections.len();
        let applied_corrections = log.corrections.iter().filter(|c| c.applied).count();

        FeedbackStatistics {
            summary: log.statistics.clone(),
            total_corrections,
            applied_corrections,
            pending_corrections: total_corrections - applied_corrections,
            quality_ratings_count: log.quality_ratings.len(),
            document_types_feedback_count: log.document_types.len(),
        }
    }

    /// Run `f` against a consistent view of the log
    pub fn with_log<R>(&self, f: impl FnOnce(&FeedbackLog) -> R) -> R {
        f(&self.log.read())
    }

    pub fn snapshot(&self) -> FeedbackLog {
        self.log.read().clone()
    }

    fn flush(&self, log: &mut FeedbackLog) {
        log.statistics.last_updated = Some(Utc::now());
        if let Err(e) = storage::write_json_atomic(&self.path, &*log) {
            tracing::error!("Failed to save feedback log: {}", e);
        }
    }
}
