//! Digit restoration inside native-alphabet words
//!
//! Recognition frequently reads a Cyrillic `о` as `0` or `в` as `8`. Inside a
//! word that already contains native letters those digits are restored to
//! letters. Purely numeric tokens (identifiers, serial numbers) are never
//! touched.

use super::{AppliedCorrection, CorrectionMethod, LetterCase};
use crate::config::{Confusable, CorrectionConfig};
use crate::error::OcrError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

pub struct DigitRestorer {
    confusables: Vec<Confusable>,
    alphabet: (char, char),
    confidence: f32,
    token_pattern: Regex,
}

impl DigitRestorer {
    pub fn new(config: &CorrectionConfig) -> Result<Self, OcrError> {
        let (start, end) = config.alphabet;
        let pattern = format!(
            r"\b[{}-{}0-9]+\b",
            regex::escape(&start.to_string()),
            regex::escape(&end.to_string())
        );
        let token_pattern = Regex::new(&pattern).map_err(|e| {
            OcrError::InitializationError(format!("Invalid alphabet range: {}", e))
        })?;

        Ok(Self {
            confusables: config.confusables.clone(),
            alphabet: config.alphabet,
            confidence: config.digit_rule_confidence,
            token_pattern,
        })
    }

    fn is_native_letter(&self, c: char) -> bool {
        c.is_alphabetic() && c >= self.alphabet.0 && c <= self.alphabet.1
    }

    /// Restore confusable digits in every eligible token of `text`
    pub fn apply(&self, text: &str) -> (String, Vec<AppliedCorrection>) {
        let mut applied = Vec::new();

        let restored = self
            .token_pattern
            .replace_all(text, |caps: &Captures| {
                let token = &caps[0];
                match self.restore_token(token) {
                    Some(correction) => {
                        let replacement = correction.to.clone();
                        applied.push(correction);
                        replacement
                    }
                    None => token.to_string(),
                }
            })
            .into_owned();

        (restored, applied)
    }

    fn restore_token(&self, token: &str) -> Option<AppliedCorrection> {
        if token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !token.chars().any(|c| self.is_native_letter(c)) {
            return None;
        }
        if !token
            .chars()
            .any(|c| self.confusables.iter().any(|k| k.digit == c))
        {
            return None;
        }

        let (upper, lower) = token
            .chars()
            .filter(|c| c.is_alphabetic())
            .fold((0usize, 0usize), |(u, l), c| {
                (u + c.is_uppercase() as usize, l + c.is_lowercase() as usize)
            });
        // Ties resolve to lowercase
        let case = if upper > lower {
            LetterCase::Uppercase
        } else {
            LetterCase::Lowercase
        };

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let restored: String = token
            .chars()
            .map(|c| match self.confusables.iter().find(|k| k.digit == c) {
                Some(k) => {
                    *counts.entry(c.to_string()).or_default() += 1;
                    match case {
                        LetterCase::Uppercase => k.upper,
                        LetterCase::Lowercase => k.lower,
                    }
                }
                None => c,
            })
            .collect();

        Some(AppliedCorrection {
            from: token.to_string(),
            to: restored,
            confidence: self.confidence,
            method: CorrectionMethod::ContextualDigitRule,
            context: Some(token.to_string()),
            matched_original: None,
            digit_replacements: counts,
            case: Some(case),
        })
    }
}
