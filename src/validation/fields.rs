use crate::error::OcrError;
use regex::Regex;

pub(super) enum Check {
    /// Number of digits, ignoring separators, is one of the listed lengths
    DigitCount(&'static [usize]),
    MinDigits(usize),
    Matches(Regex),
    Email,
}

impl Check {
    pub(super) fn passes(&self, value: &str) -> bool {
        match self {
            Check::DigitCount(lengths) => lengths.contains(&digit_count(value)),
            Check::MinDigits(min) => digit_count(value) >= *min,
            Check::Matches(re) => re.is_match(value),
            Check::Email => value
                .split('@')
                .nth(1)
                .is_some_and(|domain| domain.contains('.')),
        }
    }
}

pub(super) struct FieldType {
    pub name: &'static str,
    pub description: &'static str,
    pub pattern: Regex,
    pub check: Check,
}

fn digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}

fn compile(pattern: &str) -> Result<Regex, OcrError> {
    Regex::new(&format!("(?i){}", pattern))
        .map_err(|e| OcrError::InitializationError(format!("Invalid field pattern: {}", e)))
}

pub(super) fn registry() -> Result<Vec<FieldType>, OcrError> {
    Ok(vec![
        FieldType {
            name: "ogrn",
            description: "OGRN (13 or 15 digits)",
            pattern: compile(r"\b\d{13,15}\b")?,
            check: Check::DigitCount(&[13, 15]),
        },
        FieldType {
            name: "inn",
            description: "INN (10 or 12 digits)",
            pattern: compile(r"\b\d{10,12}\b")?,
            check: Check::DigitCount(&[10, 12]),
        },
        FieldType {
            name: "kpp",
            description: "KPP (9 digits)",
            pattern: compile(r"\b\d{9}\b")?,
            check: Check::DigitCount(&[9]),
        },
        FieldType {
            name: "date",
            description: "Date (DD.MM.YYYY)",
            pattern: compile(r"\b\d{1,2}[./-]\d{1,2}[./-]\d{2,4}\b")?,
            check: Check::Matches(compile(r"^\d{1,2}[./-]\d{1,2}[./-]\d{2,4}")?),
        },
        FieldType {
            name: "snils",
            description: "SNILS (11 digits)",
            pattern: compile(r"\b\d{3}-\d{3}-\d{3}\s\d{2}\b|\b\d{11}\b")?,
            check: Check::DigitCount(&[11]),
        },
        FieldType {
            name: "certificate_number",
            description: "EAEU certificate number",
            pattern: compile(
                r"[№N]\s*[ЕАЭС\s]*[RU\s]*[ДС]\s*-?\s*RU[.\s]*[А-Я]{2}\d{2}[.\s]*В\s*\.?\s*\d{5,6}\s*_\s*\d{2}",
            )?,
            check: Check::Matches(compile(r"[ЕАЭС]")?),
        },
        FieldType {
            name: "phone",
            description: "Phone number",
            pattern: compile(r"[+7]?\s*\(?\d{3}\)?\s*\d{3}[-.\s]?\d{2}[-.\s]?\d{2}")?,
            check: Check::MinDigits(10),
        },
        FieldType {
            name: "email",
            description: "Email",
            pattern: compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            check: Check::Email,
        },
    ])
}
