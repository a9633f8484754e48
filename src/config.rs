//! Service configuration
//!
//! Every heuristic threshold used by the post-recognition pipeline lives here
//! with its default, so deployments can tune behavior without code changes.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ocr-review-server")]
#[command(about = "OCR post-processing server with feedback-driven correction learning")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Default language for OCR (e.g., "eng", "rus")
    #[arg(long, env = "OCR_DEFAULT_LANGUAGE", default_value = "rus")]
    pub default_language: String,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Directory holding the corrections dictionary and the feedback log
    #[arg(long, env = "OCR_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Minimum similarity ratio for a fuzzy dictionary match
    #[arg(long, env = "OCR_SIMILARITY_THRESHOLD", default_value = "0.8")]
    pub similarity_threshold: f32,

    /// Maximum edit distance for a fuzzy dictionary match
    #[arg(long, env = "OCR_MAX_EDIT_DISTANCE", default_value = "2")]
    pub max_edit_distance: usize,

    /// Overall quality below which a document is flagged for review
    #[arg(long, env = "OCR_REVIEW_THRESHOLD", default_value = "0.7")]
    pub review_threshold: f32,

    /// Minimum average confidence before feedback is promoted to the dictionary
    #[arg(long, env = "OCR_AUTO_UPDATE_CONFIDENCE", default_value = "0.7")]
    pub auto_update_confidence: f32,

    /// Minimum number of agreeing feedback records before promotion
    #[arg(long, env = "OCR_AUTO_UPDATE_OCCURRENCES", default_value = "2")]
    pub auto_update_occurrences: usize,

    /// Disable eager dictionary promotion on correction feedback
    #[arg(long, env = "OCR_DISABLE_AUTO_UPDATE")]
    pub disable_auto_update: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_language: String,
    pub max_file_size: usize,
    pub tessdata_path: Option<String>,
    pub storage: StorageConfig,
    pub correction: CorrectionConfig,
    pub quality: QualityConfig,
    pub learning: LearningConfig,
    pub pipeline: PipelineConfig,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            default_language: args.default_language,
            max_file_size: args.max_file_size,
            tessdata_path: args.tessdata_path,
            storage: StorageConfig::in_dir(args.data_dir),
            correction: CorrectionConfig {
                similarity_threshold: args.similarity_threshold,
                max_edit_distance: args.max_edit_distance,
                ..CorrectionConfig::default()
            },
            quality: QualityConfig {
                review_threshold: args.review_threshold,
                ..QualityConfig::default()
            },
            learning: LearningConfig {
                auto_update_enabled: !args.disable_auto_update,
                min_confidence: args.auto_update_confidence,
                min_occurrences: args.auto_update_occurrences,
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Defaults for every section with storage rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            default_language: "rus".to_string(),
            max_file_size: 52_428_800,
            tessdata_path: None,
            storage: StorageConfig::in_dir(data_dir.into()),
            correction: CorrectionConfig::default(),
            quality: QualityConfig::default(),
            learning: LearningConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Locations of the durable stores
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub corrections_path: PathBuf,
    pub feedback_path: PathBuf,
    pub export_path: PathBuf,
}

impl StorageConfig {
    pub fn in_dir(data_dir: PathBuf) -> Self {
        Self {
            corrections_path: data_dir.join("corrections.json"),
            feedback_path: data_dir.join("feedback.json"),
            export_path: data_dir.join("training_data_export.json"),
            data_dir,
        }
    }
}

/// A digit that recognition confuses with a letter of the native alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confusable {
    pub digit: char,
    pub lower: char,
    pub upper: char,
}

#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    /// Minimum case-insensitive similarity ratio for a fuzzy match (default 0.8)
    pub similarity_threshold: f32,
    /// Maximum Levenshtein distance for a fuzzy match (default 2)
    pub max_edit_distance: usize,
    /// Confidence recorded for digit restoration inside words (default 0.95)
    pub digit_rule_confidence: f32,
    /// Digits restored to letters inside native-alphabet words
    pub confusables: Vec<Confusable>,
    /// Inclusive code point range of the native alphabet (default Cyrillic)
    pub alphabet: (char, char),
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            max_edit_distance: 2,
            digit_rule_confidence: 0.95,
            confusables: vec![
                Confusable {
                    digit: '0',
                    lower: 'о',
                    upper: 'О',
                },
                Confusable {
                    digit: '8',
                    lower: 'в',
                    upper: 'В',
                },
            ],
            alphabet: ('\u{0400}', '\u{04FF}'),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Overall quality below which a result needs review (default 0.7)
    pub review_threshold: f32,
    pub sharpness_threshold: f32,
    pub contrast_threshold: f32,
    pub brightness_threshold: f32,
    /// Regions recognized below this confidence are flagged as handwriting
    pub handwriting_cutoff: f32,
    /// Issues below this fraction of their threshold are high severity
    pub high_severity_ratio: f32,
    /// Gradient variance that maps to a sharpness of 1.0
    pub sharpness_normalizer: f32,
    /// Intensity standard deviation that maps to a contrast of 1.0
    pub contrast_normalizer: f32,
    /// Ideal mean intensity
    pub brightness_target: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.7,
            sharpness_threshold: 0.5,
            contrast_threshold: 0.5,
            brightness_threshold: 0.5,
            handwriting_cutoff: 0.5,
            high_severity_ratio: 0.6,
            sharpness_normalizer: 1600.0,
            contrast_normalizer: 50.0,
            brightness_target: 127.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LearningConfig {
    pub auto_update_enabled: bool,
    pub min_confidence: f32,
    pub min_occurrences: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            auto_update_enabled: true,
            min_confidence: 0.7,
            min_occurrences: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Resolution page coordinates are expressed in
    pub base_dpi: u32,
    /// Resolution selected areas are re-recognized at
    pub area_dpi: u32,
    /// Detected document types below this confidence are ignored
    pub classifier_threshold: f32,
    /// Batch corrections below this confidence become dictionary candidates
    pub suggestion_cutoff: f32,
    /// Confidence attached to batch dictionary candidates
    pub suggestion_confidence: f32,
    /// Longest text handed to the spell corrector
    pub speller_max_chars: usize,
    /// Fewest spaces a text needs before the spell corrector runs
    pub speller_min_spaces: usize,
    /// Confidence recorded for accepted spell corrector output
    pub speller_confidence: f32,
    /// Length of the text snippet stored with implicit feedback
    pub feedback_context_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dpi: 300,
            area_dpi: 900,
            classifier_threshold: 0.7,
            suggestion_cutoff: 0.8,
            suggestion_confidence: 0.7,
            speller_max_chars: 200,
            speller_min_spaces: 5,
            speller_confidence: 0.8,
            feedback_context_chars: 200,
        }
    }
}
