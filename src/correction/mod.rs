//! Automatic correction of recognized text
//!
//! Correction runs in two phases:
//! 1. digit restoration inside native-alphabet words ([`digits`])
//! 2. dictionary lookup per token, exact match first, then fuzzy match
//!
//! Every change is reported as an [`AppliedCorrection`] so callers can show
//! provenance and forward it as implicit feedback.

pub mod dictionary;
pub mod digits;
pub mod similarity;

pub use dictionary::CorrectionDictionary;

use crate::config::CorrectionConfig;
use crate::error::OcrError;
use digits::DigitRestorer;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a correction was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    ExactMatch,
    SimilarityMatch,
    ContextualDigitRule,
    NeuralSpelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterCase {
    Uppercase,
    Lowercase,
}

/// A single change made to the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub from: String,
    pub to: String,
    pub confidence: f32,
    pub method: CorrectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Dictionary key a fuzzy match was made against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_original: Option<String>,
    /// Per-digit replacement counts for digit restoration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digit_replacements: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<LetterCase>,
}

/// Dictionary suggestion for a single token
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub corrected: String,
    pub confidence: f32,
    pub method: CorrectionMethod,
    pub matched_original: Option<String>,
}

pub struct AutoCorrector {
    dictionary: Arc<CorrectionDictionary>,
    config: CorrectionConfig,
    digits: DigitRestorer,
    word_pattern: Regex,
}

impl AutoCorrector {
    pub fn new(
        dictionary: Arc<CorrectionDictionary>,
        config: CorrectionConfig,
    ) -> Result<Self, OcrError> {
        let digits = DigitRestorer::new(&config)?;
        let word_pattern = Regex::new(r"\w+")
            .map_err(|e| OcrError::InitializationError(format!("Invalid word pattern: {}", e)))?;

        Ok(Self {
            dictionary,
            config,
            digits,
            word_pattern,
        })
    }

    pub fn dictionary(&self) -> &Arc<CorrectionDictionary> {
        &self.dictionary
    }

    /// Correct `text`, returning the new text and every change made.
    ///
    /// The dictionary is read once per call. Each token occurrence is
    /// replaced at most once and replaced text is never re-scanned.
    pub fn correct(&self, text: &str) -> (String, Vec<AppliedCorrection>) {
        let (restored, mut applied) = self.digits.apply(text);

        let corrected = self.dictionary.with_entries(|entries| {
            let mut output = String::with_capacity(restored.len());
            let mut last = 0;

            for token in self.word_pattern.find_iter(&restored) {
                output.push_str(&restored[last..token.start()]);
                last = token.end();

                let word = token.as_str();
                if !word.chars().all(char::is_alphanumeric) {
                    output.push_str(word);
                    continue;
                }

                match self.suggest_in(entries, word) {
                    Some(suggestion) if suggestion.corrected != word => {
                        output.push_str(&suggestion.corrected);
                        applied.push(AppliedCorrection {
                            from: word.to_string(),
                            to: suggestion.corrected,
                            confidence: suggestion.confidence,
                            method: suggestion.method,
                            context: None,
                            matched_original: suggestion.matched_original,
                            digit_replacements: BTreeMap::new(),
                            case: None,
                        });
                    }
                    _ => output.push_str(word),
                }
            }

            output.push_str(&restored[last..]);
            output
        });

        if !applied.is_empty() {
            tracing::debug!("Applied {} corrections", applied.len());
        }

        (corrected, applied)
    }

    /// Dictionary suggestion for a single token
    pub fn suggest(&self, token: &str) -> Option<Suggestion> {
        self.dictionary
            .with_entries(|entries| self.suggest_in(entries, token))
    }

    fn suggest_in(&self, entries: &BTreeMap<String, String>, token: &str) -> Option<Suggestion> {
        if let Some(corrected) = entries.get(token) {
            return Some(Suggestion {
                corrected: corrected.clone(),
                confidence: 1.0,
                method: CorrectionMethod::ExactMatch,
                matched_original: None,
            });
        }

        // Keys iterate in lexicographic order; a later key must be strictly
        // more similar to win, so ties go to the smallest key.
        let mut best: Option<(&String, &String, f32)> = None;
        for (original, corrected) in entries {
            let ratio = similarity::similarity_ratio(token, original);
            if ratio < self.config.similarity_threshold {
                continue;
            }
            if best.is_some_and(|(_, _, best_ratio)| ratio <= best_ratio) {
                continue;
            }
            if similarity::edit_distance(token, original) > self.config.max_edit_distance {
                continue;
            }
            best = Some((original, corrected, ratio));
        }

        best.map(|(original, corrected, ratio)| Suggestion {
            corrected: corrected.clone(),
            confidence: ratio,
            method: CorrectionMethod::SimilarityMatch,
            matched_original: Some(original.clone()),
        })
    }

    /// Record an operator-confirmed correction
    pub fn learn(&self, original: &str, corrected: &str) -> bool {
        self.dictionary.learn(original, corrected)
    }
}
