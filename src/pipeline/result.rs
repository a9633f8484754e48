//! Assembled output of a processed document

use super::loader::FileKind;
use crate::correction::AppliedCorrection;
use crate::quality::{QualityReport, Severity};
use crate::validation::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

fn first_page() -> usize {
    1
}

/// Operator-selected rectangle in base-resolution pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectedArea {
    #[serde(default = "first_page")]
    pub page: usize,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
    pub confidence: f32,
    pub word_count: usize,
}

/// Text recognized inside a selected area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaText {
    pub area_number: usize,
    pub coordinates: SelectedArea,
    pub text: String,
    pub confidence: f32,
    pub word_count: usize,
    pub dpi: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub critical_fields: BTreeMap<String, ValidationResult>,
    pub full_text: String,
    pub raw_text: String,
    pub pages: Vec<PageText>,
    pub total_pages: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_areas: Vec<AreaText>,
}

/// A low-confidence correction seen consistently across a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSuggestion {
    pub from: String,
    pub to: String,
    pub confidence: f32,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Quality,
    Validation,
    Corrections,
    NewCorrections,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewNote {
    #[serde(rename = "type")]
    pub kind: NoteKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl ReviewNote {
    fn new(kind: NoteKind, message: String) -> Self {
        Self {
            kind,
            message,
            severity: None,
            fields: Vec::new(),
            count: None,
        }
    }
}

/// Hints for the operator checking a result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewNotes {
    pub warnings: Vec<ReviewNote>,
    pub errors: Vec<ReviewNote>,
    pub suggestions: Vec<ReviewNote>,
    pub confidence_score: f32,
}

impl ReviewNotes {
    pub fn for_result(result: &ProcessingResult) -> Self {
        let mut notes = ReviewNotes {
            confidence_score: result.quality_report.overall_quality,
            ..Default::default()
        };

        if result.quality_report.needs_review {
            notes.warnings.push(ReviewNote {
                severity: Some(Severity::Medium),
                ..ReviewNote::new(
                    NoteKind::Quality,
                    "Document needs manual review because of low quality".to_string(),
                )
            });
        }

        let invalid: Vec<String> = result
            .extracted_data
            .critical_fields
            .iter()
            .filter(|(_, field)| !field.valid)
            .map(|(name, _)| name.clone())
            .collect();
        if !invalid.is_empty() {
            notes.errors.push(ReviewNote {
                severity: Some(Severity::High),
                ..ReviewNote::new(
                    NoteKind::Validation,
                    format!("Invalid fields: {}", invalid.join(", ")),
                )
            });
            if let Some(note) = notes.errors.last_mut() {
                note.fields = invalid;
            }
        }

        let applied = result.corrections_applied.len();
        if applied > 0 {
            notes.suggestions.push(ReviewNote {
                count: Some(applied),
                ..ReviewNote::new(
                    NoteKind::Corrections,
                    format!("Applied {} automatic corrections", applied),
                )
            });
        }

        let found = result.new_corrections_suggested.len();
        if found > 0 {
            notes.suggestions.push(ReviewNote {
                count: Some(found),
                ..ReviewNote::new(
                    NoteKind::NewCorrections,
                    format!("Found {} new patterns for automatic correction", found),
                )
            });
        }

        notes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub document_id: String,
    pub processing_date: DateTime<Utc>,
    pub file_path: PathBuf,
    pub file_type: FileKind,
    pub template: Option<String>,
    pub quality_report: QualityReport,
    pub extracted_data: ExtractedData,
    pub corrections_applied: Vec<AppliedCorrection>,
    pub needs_review: bool,
    #[serde(default)]
    pub new_corrections_suggested: Vec<CorrectionSuggestion>,
    pub review_notes: ReviewNotes,
}

impl ProcessingResult {
    /// Short plain-text summary of the result
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Document ID: {}", self.document_id);
        let _ = writeln!(out, "Processing Date: {}", self.processing_date.to_rfc3339());
        let _ = writeln!(out, "Quality: {:.2}", self.quality_report.overall_quality);
        let _ = writeln!(out, "\nCritical Fields:");
        for (name, field) in &self.extracted_data.critical_fields {
            let _ = writeln!(out, "  {}: {} (valid: {})", name, field.value, field.valid);
        }
        out
    }
}
