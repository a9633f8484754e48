//! Batch processing over independent files

use super::{
    CorrectionSuggestion, DocumentPipeline, ProcessOptions, ProcessingResult, ReviewNotes,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A file the pipeline could not process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub document_id: String,
    pub file_path: PathBuf,
    pub error: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Processed(Box<ProcessingResult>),
    Failed(FailedDocument),
}

impl BatchEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchEntry::Processed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub documents: Vec<BatchEntry>,
    pub new_corrections_suggested: Vec<CorrectionSuggestion>,
    pub needs_human_review: bool,
    pub total_processed: usize,
    pub successful: usize,
}

impl DocumentPipeline {
    /// Process every file, recording failures instead of stopping.
    ///
    /// Low-confidence corrections from documents needing review become
    /// dictionary suggestions when every replacement seen for an original
    /// agrees. Each flagged document also carries the suggestions drawn
    /// from its own corrections.
    pub fn batch_process(&self, files: &[PathBuf], template: Option<&str>) -> BatchReport {
        let options = ProcessOptions {
            template: template.map(str::to_string),
            ..ProcessOptions::default()
        };

        let mut documents: Vec<BatchEntry> = files
            .iter()
            .map(|path| match self.process(path, &options) {
                Ok(result) => BatchEntry::Processed(Box::new(result)),
                Err(e) => {
                    tracing::error!("Failed to process {}: {}", path.display(), e);
                    BatchEntry::Failed(failure(path, e.to_string()))
                }
            })
            .collect();

        let new_corrections_suggested = self.suggest_corrections(&documents);
        attach_suggestions(&mut documents, &new_corrections_suggested);
        let successful = documents.iter().filter(|d| d.is_success()).count();

        tracing::info!(
            "Batch finished: {}/{} documents, {} suggested corrections",
            successful,
            documents.len(),
            new_corrections_suggested.len()
        );

        BatchReport {
            needs_human_review: !new_corrections_suggested.is_empty(),
            total_processed: documents.len(),
            successful,
            new_corrections_suggested,
            documents,
        }
    }

    fn suggest_corrections(&self, documents: &[BatchEntry]) -> Vec<CorrectionSuggestion> {
        let mut replacements: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for entry in documents {
            let BatchEntry::Processed(result) = entry else {
                continue;
            };
            if !result.needs_review {
                continue;
            }
            for correction in &result.corrections_applied {
                if correction.confidence < self.config.suggestion_cutoff {
                    replacements
                        .entry(correction.from.as_str())
                        .or_default()
                        .push(correction.to.as_str());
                }
            }
        }

        replacements
            .into_iter()
            .filter(|(_, targets)| targets.windows(2).all(|pair| pair[0] == pair[1]))
            .map(|(from, targets)| CorrectionSuggestion {
                from: from.to_string(),
                to: targets[0].to_string(),
                confidence: self.config.suggestion_confidence,
                occurrences: targets.len(),
            })
            .collect()
    }
}

fn attach_suggestions(documents: &mut [BatchEntry], suggestions: &[CorrectionSuggestion]) {
    if suggestions.is_empty() {
        return;
    }

    for entry in documents {
        let BatchEntry::Processed(result) = entry else {
            continue;
        };
        if !result.needs_review {
            continue;
        }
        let own: Vec<CorrectionSuggestion> = suggestions
            .iter()
            .filter(|s| result.corrections_applied.iter().any(|c| c.from == s.from))
            .cloned()
            .collect();
        if own.is_empty() {
            continue;
        }
        result.new_corrections_suggested = own;
        let notes = ReviewNotes::for_result(result);
        result.review_notes = notes;
    }
}

fn failure(path: &Path, error: String) -> FailedDocument {
    let suffix = Uuid::new_v4().simple().to_string();
    FailedDocument {
        document_id: format!("error_{}", &suffix[..8]),
        file_path: path.to_path_buf(),
        error,
        success: false,
    }
}
