//! Search-term generation and relevance-based article selection
//!
//! Both operations go through the chat service and parse a JSON array out of
//! loosely structured model output. Parse-then-validate is strict; every
//! failure path falls back to a heuristic so retrieval never stalls on the
//! advisor. Results are tagged with the path taken so callers and tests can
//! tell a model answer from a fallback.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::budget::ContextBudget;
use crate::llm::chat::{ChatCompletion, ChatMessage};
use crate::llm::segmenter::truncate_chars;
use crate::metrics::METRICS;
use crate::pubmed::models::Article;

/// Abstract excerpt length used when ranking candidates.
const SELECTION_ABSTRACT_CHARS: usize = 400;

/// Per-candidate character allowance (excerpt plus header).
const SELECTION_ARTICLE_ALLOWANCE: usize = SELECTION_ABSTRACT_CHARS + 100;

/// Upper bound on candidates shown to the model.
const SELECTION_CANDIDATE_CAP: usize = 20;

/// How the search terms were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSource {
    Model,
    Heuristic,
}

/// Ordered search terms plus the path that produced them.
#[derive(Debug, Clone)]
pub struct SearchTerms {
    pub terms: Vec<String>,
    pub source: TermSource,
}

/// How the article selection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMethod {
    /// Candidate count was at or under the limit; no generation call made.
    Passthrough,
    /// Model ranking, possibly padded from the original order.
    Model,
    /// Generation or parse failure; first `limit` candidates in order.
    Fallback,
}

/// Ordered selected identifiers plus the path that produced them.
#[derive(Debug, Clone)]
pub struct ArticleSelection {
    pub pmids: Vec<String>,
    pub method: SelectionMethod,
}

/// LLM-backed advisor for search terms and relevance ranking.
pub struct SearchAdvisor {
    chat: Arc<dyn ChatCompletion>,
    budget: ContextBudget,
}

impl SearchAdvisor {
    pub fn new(chat: Arc<dyn ChatCompletion>, budget: ContextBudget) -> Self {
        Self { chat, budget }
    }

    /// Turn a clinical case scenario or research topic into 3-5 PubMed search
    /// terms. Falls back to the first ten words of the scenario, or the topic
    /// verbatim, when the model output cannot be used.
    pub async fn generate_search_terms(
        &self,
        case_scenario: Option<&str>,
        topic: Option<&str>,
    ) -> SearchTerms {
        let prompt = if let Some(scenario) = case_scenario {
            format!(
                "You are a medical research assistant. Given the following clinical case scenario, \
                 generate 3-5 specific PubMed search terms that would find the most relevant medical literature.\n\n\
                 CASE SCENARIO:\n{scenario}\n\n\
                 Generate search terms that:\n\
                 1. Focus on the key medical conditions and symptoms\n\
                 2. Use standard medical terminology and MeSH terms where appropriate\n\
                 3. Are specific enough to find relevant articles\n\
                 4. Cover different aspects of the case (diagnosis, treatment, etc.)\n\n\
                 Return ONLY a JSON array of search terms, nothing else. Example format:\n\
                 [\"term 1\", \"term 2\", \"term 3\"]"
            )
        } else {
            format!(
                "You are a medical research assistant. Given the following research topic, \
                 generate 3-5 optimized PubMed search terms.\n\n\
                 TOPIC:\n{}\n\n\
                 Generate search terms that:\n\
                 1. Use standard medical terminology and MeSH terms\n\
                 2. Are specific enough to find relevant articles\n\
                 3. Cover different aspects of the topic\n\n\
                 Return ONLY a JSON array of search terms, nothing else. Example format:\n\
                 [\"term 1\", \"term 2\", \"term 3\"]",
                topic.unwrap_or_default()
            )
        };

        let messages = [
            ChatMessage::system("You are a medical research assistant. Respond only with valid JSON."),
            ChatMessage::user(prompt),
        ];

        match self.chat.complete(&messages, 0.3, Some(500)).await {
            Ok(content) => {
                if let Some(terms) = extract_json_array(&content) {
                    if !terms.is_empty() {
                        METRICS.record_llm_call("search_terms", true);
                        return SearchTerms {
                            terms,
                            source: TermSource::Model,
                        };
                    }
                }
                warn!("Search term response was not a usable JSON array");
                METRICS.record_llm_call("search_terms", false);
                heuristic_terms(case_scenario, topic)
            }
            Err(e) => {
                warn!("Search term generation failed: {}", e);
                METRICS.record_llm_call("search_terms", false);
                heuristic_terms(case_scenario, topic)
            }
        }
    }

    /// Rank candidate articles by relevance to `context` and return exactly
    /// `limit` identifiers (or all of them when the candidate set is small).
    /// Identifiers the model invents are dropped; short rankings are padded
    /// from the untouched candidates in original order.
    pub async fn select_relevant_articles(
        &self,
        articles: &[Article],
        context: &str,
        limit: usize,
    ) -> ArticleSelection {
        if articles.len() <= limit {
            return ArticleSelection {
                pmids: articles.iter().map(|a| a.pmid.clone()).collect(),
                method: SelectionMethod::Passthrough,
            };
        }

        let max_articles = SELECTION_CANDIDATE_CAP
            .min(self.budget.max_content_chars() / SELECTION_ARTICLE_ALLOWANCE);

        let articles_text = articles
            .iter()
            .take(max_articles)
            .map(|a| {
                let title = if a.title.is_empty() { "No title" } else { &a.title };
                let abstract_text = if a.abstract_text.is_empty() {
                    "No abstract"
                } else {
                    &a.abstract_text
                };
                format!(
                    "PMID: {}\nTitle: {}\nAbstract: {}...",
                    a.pmid,
                    title,
                    truncate_chars(abstract_text, SELECTION_ABSTRACT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "You are a medical research assistant. Given the following context and list of PubMed \
             articles, select the {limit} most relevant articles.\n\n\
             CONTEXT:\n{}\n\n\
             ARTICLES:\n{articles_text}\n\n\
             Select the {limit} most relevant articles based on:\n\
             1. Direct relevance to the context\n\
             2. Clinical applicability\n\
             3. Quality indicators (study type, journal)\n\
             4. Recency\n\n\
             Return ONLY a JSON array of the PMIDs in order of relevance (most relevant first). Example:\n\
             [\"12345678\", \"87654321\", \"11111111\"]",
            truncate_chars(context, 500)
        );

        let messages = [
            ChatMessage::system("You are a medical research assistant. Respond only with valid JSON."),
            ChatMessage::user(prompt),
        ];

        let ranked = match self.chat.complete(&messages, 0.2, Some(500)).await {
            Ok(content) => extract_json_array(&content),
            Err(e) => {
                warn!("Relevance selection failed: {}", e);
                None
            }
        };

        let Some(ranked) = ranked else {
            METRICS.record_llm_call("select_articles", false);
            return ArticleSelection {
                pmids: articles.iter().take(limit).map(|a| a.pmid.clone()).collect(),
                method: SelectionMethod::Fallback,
            };
        };
        METRICS.record_llm_call("select_articles", true);

        // Drop identifiers that are not in the candidate set.
        let mut selected: Vec<String> = ranked
            .into_iter()
            .filter(|pmid| articles.iter().any(|a| &a.pmid == pmid))
            .collect();

        if selected.len() < limit {
            debug!(
                "Model returned {} valid identifiers, padding to {}",
                selected.len(),
                limit
            );
            for article in articles {
                if !selected.contains(&article.pmid) {
                    selected.push(article.pmid.clone());
                    if selected.len() >= limit {
                        break;
                    }
                }
            }
        }

        selected.truncate(limit);
        ArticleSelection {
            pmids: selected,
            method: SelectionMethod::Model,
        }
    }
}

fn heuristic_terms(case_scenario: Option<&str>, topic: Option<&str>) -> SearchTerms {
    let terms = if let Some(scenario) = case_scenario {
        let lead: Vec<&str> = scenario.split_whitespace().take(10).collect();
        if lead.is_empty() {
            vec![]
        } else {
            vec![lead.join(" ")]
        }
    } else if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
        vec![topic.to_string()]
    } else {
        vec![]
    };

    SearchTerms {
        terms,
        source: TermSource::Heuristic,
    }
}

/// Extract the first JSON array embedded in model output and validate that
/// every element is a string or a number. Anything else is a parse failure,
/// never silently coerced.
pub fn extract_json_array(content: &str) -> Option<Vec<String>> {
    let candidate = match (content.find('['), content.find('[').and_then(|s| content[s..].find(']'))) {
        (Some(start), Some(rel_end)) => &content[start..start + rel_end + 1],
        _ => content.trim(),
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(candidate).ok()?;
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        match value {
            serde_json::Value::String(s) => items.push(s),
            serde_json::Value::Number(n) => items.push(n.to_string()),
            _ => return None,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_array_plain() {
        let parsed = extract_json_array(r#"["sepsis management", "lactate clearance"]"#).unwrap();
        assert_eq!(parsed, vec!["sepsis management", "lactate clearance"]);
    }

    #[test]
    fn test_extract_json_array_embedded_in_prose() {
        let content = "Here are the terms:\n[\"a\", \"b\"]\nLet me know if you need more.";
        assert_eq!(extract_json_array(content).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_extract_json_array_accepts_numeric_pmids() {
        let parsed = extract_json_array("[12345678, 87654321]").unwrap();
        assert_eq!(parsed, vec!["12345678", "87654321"]);
    }

    #[test]
    fn test_extract_json_array_rejects_non_scalar_elements() {
        assert!(extract_json_array(r#"[{"pmid": "123"}]"#).is_none());
        assert!(extract_json_array("not json at all").is_none());
        assert!(extract_json_array(r#"{"terms": []}"#).is_none());
    }

    #[test]
    fn test_heuristic_terms_from_scenario() {
        let scenario = "45 year old male presenting with acute chest pain radiating to the left arm";
        let result = heuristic_terms(Some(scenario), None);
        assert_eq!(result.source, TermSource::Heuristic);
        assert_eq!(result.terms.len(), 1);
        assert_eq!(
            result.terms[0],
            "45 year old male presenting with acute chest pain radiating"
        );
    }

    #[test]
    fn test_heuristic_terms_from_topic() {
        let result = heuristic_terms(None, Some("cardiac arrest management"));
        assert_eq!(result.terms, vec!["cardiac arrest management"]);
    }

    #[test]
    fn test_heuristic_terms_empty_input() {
        let result = heuristic_terms(None, None);
        assert!(result.terms.is_empty());
    }
}
