use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn full_confidence() -> f32 {
    1.0
}

/// Operator-submitted correction, before it is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCorrection {
    pub original: String,
    pub corrected: String,
    pub document_id: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQualityRating {
    pub document_id: String,
    pub rating: f32,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocumentType {
    pub document_id: String,
    pub predicted_type: String,
    pub actual_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Feedback as it arrives at the boundary, decided once by its `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackPayload {
    Correction(NewCorrection),
    Quality(NewQualityRating),
    DocumentType(NewDocumentType),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionFeedback {
    pub id: String,
    pub original: String,
    pub corrected: String,
    pub document_id: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRating {
    pub id: String,
    pub document_id: String,
    pub rating: f32,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypeFeedback {
    pub id: String,
    pub document_id: String,
    pub predicted_type: String,
    pub actual_type: String,
    /// Whether the predicted type matched the actual one
    pub correct: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Running counters kept alongside the records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total_feedback: u64,
    pub corrections_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// On-disk layout of the feedback file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackLog {
    pub corrections: Vec<CorrectionFeedback>,
    pub document_types: Vec<DocumentTypeFeedback>,
    pub quality_ratings: Vec<QualityRating>,
    pub statistics: FeedbackSummary,
}

/// Unapplied corrections grouped by exact (original, corrected) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateCorrection {
    pub original: String,
    pub corrected: String,
    pub occurrences: usize,
    pub avg_confidence: f32,
    pub feedback_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackStatistics {
    #[serde(flatten)]
    pub summary: FeedbackSummary,
    pub total_corrections: usize,
    pub applied_corrections: usize,
    pub pending_corrections: usize,
    pub quality_ratings_count: usize,
    pub document_types_feedback_count: usize,
}
