//! Article records returned by the literature source

use serde::{Deserialize, Serialize};

/// Search response from esearch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub pmids: Vec<String>,
    pub total_count: u64,
    pub query_translation: String,
}

/// Light article record from esummary, enough for search result listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleStub {
    pub pmid: String,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub pub_date: String,
    pub doi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    pub pub_types: Vec<String>,
}

/// Full article record from efetch, optionally enriched with PMC full text.
/// Immutable for the duration of a summarization call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    pub authors: Vec<String>,
    pub journal: String,
    pub pub_date: String,
    pub doi: String,
    pub keywords: Vec<String>,
    pub mesh_terms: Vec<String>,
    pub pub_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
}

impl Article {
    /// The text the summarizer works from: full text when present and
    /// non-empty, otherwise the abstract.
    pub fn summarization_source(&self) -> &str {
        match &self.full_text {
            Some(text) if !text.is_empty() => text,
            _ => &self.abstract_text,
        }
    }

    pub fn has_full_text(&self) -> bool {
        self.full_text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Optional patient demographics, injected into prompts when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientContext {
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl PatientContext {
    pub fn is_empty(&self) -> bool {
        self.age.is_none() && self.gender.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarization_source_prefers_full_text() {
        let article = Article {
            abstract_text: "abstract".to_string(),
            full_text: Some("full body".to_string()),
            ..Article::default()
        };
        assert_eq!(article.summarization_source(), "full body");
    }

    #[test]
    fn test_summarization_source_falls_back_to_abstract() {
        let article = Article {
            abstract_text: "abstract".to_string(),
            full_text: Some(String::new()),
            ..Article::default()
        };
        assert_eq!(article.summarization_source(), "abstract");

        let article = Article {
            abstract_text: "abstract".to_string(),
            full_text: None,
            ..Article::default()
        };
        assert_eq!(article.summarization_source(), "abstract");
    }

    #[test]
    fn test_patient_context_is_empty() {
        assert!(PatientContext::default().is_empty());
        assert!(!PatientContext {
            age: Some(30),
            gender: None
        }
        .is_empty());
    }
}
