//! Critical field extraction and validation
//!
//! Each registered field type pairs a recognition pattern with a validity
//! check. Validation never fails: a missing or malformed field shows up as an
//! invalid [`ValidationResult`].

mod fields;

use crate::error::OcrError;
use fields::FieldType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence of a match that also passes its validity check
const VALID_CONFIDENCE: f32 = 0.9;
/// Confidence of a match that only fits the pattern
const PATTERN_ONLY_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub field_name: String,
    pub value: String,
    pub valid: bool,
    pub confidence: f32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_correction: Option<String>,
}

/// Name and description of a registered field type
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    pub description: &'static str,
}

pub struct FieldValidator {
    fields: Vec<FieldType>,
    whitespace: Regex,
}

impl FieldValidator {
    pub fn new() -> Result<Self, OcrError> {
        let whitespace = Regex::new(r"\s+")
            .map_err(|e| OcrError::InitializationError(format!("Invalid pattern: {}", e)))?;

        Ok(Self {
            fields: fields::registry()?,
            whitespace,
        })
    }

    /// Registered field types in registration order
    pub fn fields(&self) -> Vec<FieldInfo> {
        self.fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name,
                description: f.description,
            })
            .collect()
    }

    fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every occurrence of `field_name` in `text` with its confidence
    pub fn find(&self, field_name: &str, text: &str) -> Vec<(String, f32)> {
        let Some(field) = self.field(field_name) else {
            tracing::warn!("No pattern registered for field '{}'", field_name);
            return Vec::new();
        };

        field
            .pattern
            .find_iter(text)
            .map(|m| {
                let cleaned = self.whitespace.replace_all(m.as_str().trim(), " ").into_owned();
                let confidence = if field.check.passes(&cleaned) {
                    VALID_CONFIDENCE
                } else {
                    PATTERN_ONLY_CONFIDENCE
                };
                (cleaned, confidence)
            })
            .collect()
    }

    /// Re-check a specific value.
    ///
    /// When the value is invalid and `context` is given, the most confident
    /// occurrence of the field in the context is offered as a suggestion.
    pub fn validate(
        &self,
        field_name: &str,
        value: &str,
        context: Option<&str>,
    ) -> ValidationResult {
        let Some(field) = self.field(field_name) else {
            return ValidationResult {
                field_name: field_name.to_string(),
                value: value.to_string(),
                valid: false,
                confidence: 0.0,
                message: format!("Unknown field type: {}", field_name),
                suggested_correction: None,
            };
        };

        let valid = field.check.passes(value) && field.pattern.is_match(value);

        let suggested_correction = match context {
            Some(text) if !valid && !text.is_empty() => {
                best_occurrence(self.find(field_name, text)).map(|(value, _)| value)
            }
            _ => None,
        };

        ValidationResult {
            field_name: field_name.to_string(),
            value: value.to_string(),
            valid,
            confidence: if valid {
                VALID_CONFIDENCE
            } else {
                PATTERN_ONLY_CONFIDENCE
            },
            message: format!(
                "{} is {}",
                field.description,
                if valid { "valid" } else { "invalid" }
            ),
            suggested_correction,
        }
    }

    /// Validate the requested fields (all registered fields by default)
    pub fn validate_critical(
        &self,
        text: &str,
        fields: Option<&[String]>,
    ) -> BTreeMap<String, ValidationResult> {
        let names: Vec<String> = match fields {
            Some(requested) if !requested.is_empty() => requested.to_vec(),
            _ => self.fields.iter().map(|f| f.name.to_string()).collect(),
        };

        names
            .into_iter()
            .map(|name| {
                let result = match best_occurrence(self.find(&name, text)) {
                    Some((value, confidence)) => {
                        let mut result = self.validate(&name, &value, Some(text));
                        result.confidence = confidence;
                        result
                    }
                    None => ValidationResult {
                        field_name: name.clone(),
                        value: String::new(),
                        valid: false,
                        confidence: 0.0,
                        message: format!("Field '{}' not found in document", name),
                        suggested_correction: None,
                    },
                };
                (name, result)
            })
            .collect()
    }
}

/// Most confident occurrence; the earliest wins ties
fn best_occurrence(found: Vec<(String, f32)>) -> Option<(String, f32)> {
    found.into_iter().fold(None, |best, candidate| match best {
        Some(ref b) if b.1 >= candidate.1 => best,
        _ => Some(candidate),
    })
}
