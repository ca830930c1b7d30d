//! Brand guideline checks

use mkt_document::{fields, Document, DocumentId};
use serde_json::Value;

use crate::error::EngineError;

/// Avoided terms of a brand document, trimmed, empties dropped
#[must_use]
pub fn avoided_terms(brand: &Document) -> Vec<String> {
    brand
        .get("guidelines")
        .and_then(|g| g.get("avoidedTerms"))
        .and_then(Value::as_array)
        .map(|terms| {
            terms
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Avoided terms occurring in `text`, case-insensitively, in brand order
#[must_use]
pub fn find_violations(terms: &[String], text: &str) -> Vec<String> {
    let haystack = text.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut hits: Vec<String> = Vec::new();
    for term in terms {
        let needle = term.to_lowercase();
        if haystack.contains(&needle) && !seen.contains(&needle) {
            seen.push(needle);
            hits.push(term.clone());
        }
    }
    hits
}

/// Reject content whose body uses any of the brand's avoided terms
///
/// # Errors
/// [`EngineError::GuidelineViolation`] listing every matched term
pub fn check_content(content: &Document, brand: &Document) -> Result<(), EngineError> {
    let body = content.str_field("body").unwrap_or_default();
    let hits = find_violations(&avoided_terms(brand), body);
    if hits.is_empty() {
        return Ok(());
    }
    Err(EngineError::GuidelineViolation {
        content_id: content
            .id_field(fields::ID)
            .unwrap_or_else(|| DocumentId::new("<unsaved>")),
        terms: hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn brand(terms: Value) -> Document {
        Document::try_from_value(json!({"id": "b1", "guidelines": {"avoidedTerms": terms}})).unwrap()
    }

    #[test]
    fn matching_ignores_case() {
        let terms = vec!["Failure".to_string(), "cheap".to_string()];
        assert_eq!(find_violations(&terms, "No FAILURE here"), vec!["Failure".to_string()]);
        assert!(find_violations(&terms, "all good").is_empty());
    }

    #[test]
    fn case_variants_are_reported_once() {
        let terms = vec!["Ärger".to_string(), "ärger".to_string(), "CHEAP".to_string(), "cheap".to_string()];
        assert_eq!(
            find_violations(&terms, "kein ärger, nothing cheap"),
            vec!["Ärger".to_string(), "CHEAP".to_string()]
        );
    }

    #[test]
    fn blank_terms_never_match() {
        assert!(avoided_terms(&brand(json!(["  ", "", 3]))).is_empty());
    }

    #[test]
    fn violation_names_content_and_terms() {
        let content = Document::try_from_value(json!({"id": "c1", "body": "A cheap failure"})).unwrap();
        let err = check_content(&content, &brand(json!(["failure", "cheap"]))).unwrap_err();
        match err {
            EngineError::GuidelineViolation { content_id, terms } => {
                assert_eq!(content_id, DocumentId::new("c1"));
                assert_eq!(terms, vec!["failure".to_string(), "cheap".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn brand_without_guidelines_allows_everything() {
        let content = Document::try_from_value(json!({"id": "c1", "body": "anything"})).unwrap();
        let bare = Document::try_from_value(json!({"id": "b1"})).unwrap();
        assert!(check_content(&content, &bare).is_ok());
    }
}
