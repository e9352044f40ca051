//! Classification label normalization.
//!
//! The classifier writes either a plain label (`"invoice"`) or a JSON
//! document carrying a label list (`{"labels": ["invoice", "receipt"]}`).
//! Display and grouping always use one normalized label: the first entry of
//! a structured list, otherwise the raw string.

use serde::Deserialize;

/// Labels written by a failed classification.
const ERROR_LABEL: &str = "classification_error";
const ERROR_PREFIX: &str = "ERR_";

/// A classification value after the tagged parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawClassLabel {
    /// JSON object with a `labels` array.
    Structured(Vec<String>),
    /// Anything else, kept verbatim (trimmed).
    Plain(String),
}

#[derive(Deserialize)]
struct StructuredLabels {
    labels: Vec<String>,
}

/// Attempt the structured parse, falling back to the raw string.
pub fn parse_class_label(raw: &str) -> RawClassLabel {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<StructuredLabels>(trimmed) {
            return RawClassLabel::Structured(parsed.labels);
        }
    }
    RawClassLabel::Plain(trimmed.to_string())
}

/// The single display label for a raw classification value.
///
/// An empty structured list falls back to the raw text, as does any JSON
/// that does not carry a `labels` array.
pub fn normalize_class_label(raw: &str) -> String {
    match parse_class_label(raw) {
        RawClassLabel::Structured(labels) => {
            match labels.into_iter().find(|l| !l.trim().is_empty()) {
                Some(first) => first.trim().to_string(),
                None => raw.trim().to_string(),
            }
        }
        RawClassLabel::Plain(label) => label,
    }
}

/// True for values the classifier writes on failure.
pub fn is_error_label(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed == ERROR_LABEL || trimmed.starts_with(ERROR_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_label_passes_through() {
        assert_eq!(normalize_class_label("invoice"), "invoice");
        assert_eq!(normalize_class_label("  contract \n"), "contract");
    }

    #[test]
    fn test_structured_label_takes_first() {
        assert_eq!(
            normalize_class_label(r#"{"labels": ["invoice", "receipt"]}"#),
            "invoice"
        );
        assert_eq!(
            parse_class_label(r#"{"labels": ["a"]}"#),
            RawClassLabel::Structured(vec!["a".to_string()])
        );
    }

    #[test]
    fn test_structured_without_labels_falls_back_to_raw() {
        let raw = r#"{"label": "invoice"}"#;
        assert_eq!(normalize_class_label(raw), raw);
        let empty = r#"{"labels": []}"#;
        assert_eq!(normalize_class_label(empty), empty);
    }

    #[test]
    fn test_malformed_json_is_plain() {
        assert_eq!(
            parse_class_label("{labels: invoice"),
            RawClassLabel::Plain("{labels: invoice".to_string())
        );
    }

    #[test]
    fn test_error_labels() {
        assert!(is_error_label("classification_error"));
        assert!(is_error_label("ERR_TIMEOUT"));
        assert!(!is_error_label("invoice"));
        assert!(!is_error_label("error_report"));
    }
}
