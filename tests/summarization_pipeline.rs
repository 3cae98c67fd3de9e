//! End-to-end pipeline tests with a scripted chat backend.
//!
//! These exercise the summarization orchestrator and the search advisor
//! through the `ChatCompletion` seam, verifying call counts, chunking
//! behavior, degraded failure output and fallback tagging.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use medlit_gateway::llm::{
    segment, ChatCompletion, ChatError, ChatMessage, ClinicalSummarizer, ContextBudget,
    SearchAdvisor, SelectionMethod, TermSource, NO_CONTENT_SENTINEL,
};
use medlit_gateway::pubmed::models::{Article, PatientContext};

/// Chat backend that replays a scripted sequence of responses. Once the
/// script runs out it answers with a numbered canned response.
struct ScriptedChat {
    calls: AtomicUsize,
    script: Mutex<VecDeque<String>>,
}

impl ScriptedChat {
    fn new(script: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into_iter().map(String::from).collect()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, ChatError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| format!("response {}", n + 1)))
    }
}

/// Chat backend that records the last user prompt it received.
struct CapturingChat {
    last_prompt: Mutex<String>,
}

impl CapturingChat {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            last_prompt: Mutex::new(String::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for CapturingChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, ChatError> {
        *self.last_prompt.lock().unwrap() = messages.last().unwrap().content.clone();
        Ok("ok".to_string())
    }
}

/// Chat backend where every call fails.
struct FailingChat {
    calls: AtomicUsize,
}

impl FailingChat {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatCompletion for FailingChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ChatError::Network("connection refused".to_string()))
    }
}

/// Small window so chunking kicks in with test-sized articles:
/// 2024 - 500 - 1024 = 500 content tokens = 2000 chars, 1700 after the
/// chunk safety margin.
fn small_budget() -> ContextBudget {
    ContextBudget::new(2024)
}

fn article(pmid: &str, body: &str) -> Article {
    Article {
        pmid: pmid.to_string(),
        title: format!("Study {pmid}"),
        abstract_text: body.to_string(),
        ..Article::default()
    }
}

fn long_body(paragraphs: usize) -> String {
    let paragraph = "Patients in the intervention arm received early goal-directed \
                     therapy with serial lactate measurements and protocolized fluid \
                     resuscitation over the first six hours of admission."
        .to_string();
    vec![paragraph; paragraphs].join("\n\n")
}

#[tokio::test]
async fn single_pass_summary_makes_exactly_one_call() {
    let chat = ScriptedChat::new(vec!["KEY POINTS: early intervention helps"]);
    let summarizer = ClinicalSummarizer::new(chat.clone(), small_budget(), Some(2048));

    let article = article("1", "A short abstract that fits the content budget.");
    let summary = summarizer.summarize_article(&article, None).await;

    assert_eq!(summary, "KEY POINTS: early intervention helps");
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn oversized_article_is_chunked_and_aggregated() {
    let chat = ScriptedChat::new(vec![]);
    let budget = small_budget();
    let summarizer = ClinicalSummarizer::new(chat.clone(), budget, Some(2048));

    let body = long_body(30);
    let chunk_max = budget.max_content_chars() - 300;
    let expected_segments = segment(&body, chunk_max).len();
    assert!(expected_segments >= 2, "test body must force chunking");

    let article = article("2", &body);
    let summary = summarizer.summarize_article(&article, None).await;

    // One call per segment plus the aggregation call.
    assert_eq!(chat.call_count(), expected_segments + 1);
    assert_eq!(summary, format!("response {}", expected_segments + 1));
}

#[tokio::test]
async fn empty_article_returns_sentinel_without_calling_backend() {
    let chat = ScriptedChat::new(vec![]);
    let summarizer = ClinicalSummarizer::new(chat.clone(), small_budget(), None);

    let empty = article("3", "   ");
    let summary = summarizer.summarize_article(&empty, None).await;

    assert_eq!(summary, NO_CONTENT_SENTINEL);
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn full_text_is_preferred_over_abstract() {
    let chat = ScriptedChat::new(vec![]);
    let summarizer = ClinicalSummarizer::new(chat.clone(), small_budget(), None);

    let mut article = article("4", "Abstract only.");
    article.full_text = Some(long_body(30));
    summarizer.summarize_article(&article, None).await;

    // Chunking proves the (long) full text was used, not the short abstract.
    assert!(chat.call_count() > 1);
}

#[tokio::test]
async fn failed_segments_degrade_into_partial_output() {
    let chat = FailingChat::new();
    let summarizer = ClinicalSummarizer::new(chat, small_budget(), None);

    let article = article("5", &long_body(30));
    let summary = summarizer.summarize_article(&article, None).await;

    assert!(summary.contains("[Section 1 summary failed:"));
    assert!(summary.starts_with("Error combining summaries:"));
    assert!(summary.contains("Partial summaries:"));
}

#[tokio::test]
async fn failed_single_pass_returns_error_text() {
    let chat = FailingChat::new();
    let summarizer = ClinicalSummarizer::new(chat, small_budget(), None);

    let article = article("6", "Short body.");
    let summary = summarizer.summarize_article(&article, None).await;

    assert!(summary.starts_with("Error generating summary:"));
}

#[tokio::test]
async fn patient_context_reaches_the_prompt() {
    let chat = CapturingChat::new();
    let summarizer = ClinicalSummarizer::new(chat.clone(), small_budget(), None);

    let patient = PatientContext {
        age: Some(62),
        gender: Some("Female".to_string()),
    };
    let article = article("7", "Short body.");
    summarizer.summarize_article(&article, Some(&patient)).await;

    assert!(chat
        .last_prompt()
        .contains("PATIENT CONTEXT: 62 year old Female"));
}

#[tokio::test]
async fn combined_summary_of_nothing_is_the_sentinel() {
    let chat = ScriptedChat::new(vec![]);
    let summarizer = ClinicalSummarizer::new(chat.clone(), small_budget(), None);

    let summary = summarizer.combine_summary(&[], "sepsis in the elderly").await;

    assert_eq!(summary, NO_CONTENT_SENTINEL);
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn combined_summary_makes_a_single_call() {
    let chat = ScriptedChat::new(vec!["Synthesis across studies."]);
    let summarizer = ClinicalSummarizer::new(chat.clone(), small_budget(), None);

    let articles: Vec<Article> = (1..=8)
        .map(|i| article(&i.to_string(), "Findings on lactate clearance."))
        .collect();
    let summary = summarizer
        .combine_summary(&articles, "sepsis resuscitation targets")
        .await;

    assert_eq!(summary, "Synthesis across studies.");
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn synthesis_halves_excerpts_when_over_budget() {
    let chat = CapturingChat::new();
    let budget = small_budget();
    let summarizer = ClinicalSummarizer::new(chat.clone(), budget, None);

    // Two articles against a 2000-char ceiling: the initial per-article
    // allocation is 2000/2 - 100 = 900 chars, and the assembled excerpts
    // plus a 500-char context overshoot the ceiling, so the allocation is
    // halved to 450 and the excerpts rebuilt.
    let articles = vec![
        article("1", &"a".repeat(2000)),
        article("2", &"b".repeat(2000)),
    ];
    let context = "c".repeat(500);

    summarizer.combine_summary(&articles, &context).await;

    let prompt = chat.last_prompt();
    assert!(prompt.contains(&"a".repeat(450)));
    assert!(!prompt.contains(&"a".repeat(451)));
    assert!(prompt.contains(&"b".repeat(450)));
    assert!(!prompt.contains(&"b".repeat(451)));
}

#[tokio::test]
async fn selection_passes_through_small_candidate_sets() {
    let chat = ScriptedChat::new(vec![]);
    let advisor = SearchAdvisor::new(chat.clone(), small_budget());

    let articles: Vec<Article> = (1..=3)
        .map(|i| article(&i.to_string(), "Abstract."))
        .collect();
    let selection = advisor
        .select_relevant_articles(&articles, "context", 5)
        .await;

    assert_eq!(selection.method, SelectionMethod::Passthrough);
    assert_eq!(selection.pmids, vec!["1", "2", "3"]);
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn selection_drops_hallucinated_pmids_and_pads_in_order() {
    // "999" is not among the candidates; "4" and "2" are.
    let chat = ScriptedChat::new(vec![r#"["999", "4", "2"]"#]);
    let advisor = SearchAdvisor::new(chat, small_budget());

    let articles: Vec<Article> = (1..=8)
        .map(|i| article(&i.to_string(), "Abstract."))
        .collect();
    let selection = advisor
        .select_relevant_articles(&articles, "context", 4)
        .await;

    assert_eq!(selection.method, SelectionMethod::Model);
    // Valid ranked identifiers first, then padding in original order.
    assert_eq!(selection.pmids, vec!["4", "2", "1", "3"]);
}

#[tokio::test]
async fn selection_falls_back_on_unparseable_output() {
    let chat = ScriptedChat::new(vec!["I think the best articles are the recent ones."]);
    let advisor = SearchAdvisor::new(chat, small_budget());

    let articles: Vec<Article> = (1..=8)
        .map(|i| article(&i.to_string(), "Abstract."))
        .collect();
    let selection = advisor
        .select_relevant_articles(&articles, "context", 3)
        .await;

    assert_eq!(selection.method, SelectionMethod::Fallback);
    assert_eq!(selection.pmids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn search_terms_come_from_the_model_when_parseable() {
    let chat = ScriptedChat::new(vec![r#"["sepsis management", "lactate clearance"]"#]);
    let advisor = SearchAdvisor::new(chat, small_budget());

    let terms = advisor
        .generate_search_terms(Some("elderly patient with suspected sepsis"), None)
        .await;

    assert_eq!(terms.source, TermSource::Model);
    assert_eq!(terms.terms, vec!["sepsis management", "lactate clearance"]);
}

#[tokio::test]
async fn search_terms_fall_back_to_scenario_words_on_failure() {
    let chat = FailingChat::new();
    let advisor = SearchAdvisor::new(chat, small_budget());

    let terms = advisor
        .generate_search_terms(
            Some("elderly patient with suspected sepsis and rising lactate despite fluids"),
            None,
        )
        .await;

    assert_eq!(terms.source, TermSource::Heuristic);
    assert_eq!(
        terms.terms,
        vec!["elderly patient with suspected sepsis and rising lactate despite"]
    );
}
