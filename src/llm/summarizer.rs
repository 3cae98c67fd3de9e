//! Clinical summarization pipeline
//!
//! A single article is summarized either in one pass (when its body fits the
//! content budget) or through chunked summarization: segment the body, summarize
//! each segment with a small fixed output budget, then combine the per-section
//! summaries into one structured clinical summary. Collaborator failures are
//! absorbed into degraded text; the pipeline always returns something the
//! boundary layer can render.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::budget::ContextBudget;
use crate::llm::chat::{ChatCompletion, ChatMessage};
use crate::llm::segmenter::{segment, truncate_chars};
use crate::metrics::METRICS;
use crate::pubmed::models::{Article, PatientContext};

/// Returned when an article has neither full text nor abstract.
pub const NO_CONTENT_SENTINEL: &str = "No content available for summarization.";

/// Characters subtracted from the content budget to cover the title and
/// instruction text that accompany each chunk.
pub const CHUNK_SAFETY_MARGIN: usize = 300;

/// Output budget for one segment summary. Intentionally small so the
/// aggregation step's input stays well under the content budget.
pub const SEGMENT_SUMMARY_TOKENS: u32 = 512;

/// Hard cap on articles included in a cross-article synthesis.
pub const SYNTHESIS_ARTICLE_CAP: usize = 5;

/// Per-article character margin for excerpt headers in a synthesis.
pub const SYNTHESIS_ARTICLE_MARGIN: usize = 100;

const SUMMARY_TEMPERATURE: f32 = 0.3;

/// Article summarization orchestrator and cross-article synthesizer.
pub struct ClinicalSummarizer {
    chat: Arc<dyn ChatCompletion>,
    budget: ContextBudget,
    /// Output budget for full summaries; None lets the backend decide.
    max_tokens: Option<u32>,
}

impl ClinicalSummarizer {
    pub fn new(chat: Arc<dyn ChatCompletion>, budget: ContextBudget, max_tokens: Option<u32>) -> Self {
        Self {
            chat,
            budget,
            max_tokens,
        }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Summarize one article, chunking when its body exceeds the budget.
    pub async fn summarize_article(
        &self,
        article: &Article,
        patient: Option<&PatientContext>,
    ) -> String {
        let content = article.summarization_source().trim();
        if content.is_empty() {
            debug!("No content for article {}, returning sentinel", article.pmid);
            return NO_CONTENT_SENTINEL.to_string();
        }

        let title = display_title(&article.title);
        let chunk_max_chars = self.budget.max_content_chars().saturating_sub(CHUNK_SAFETY_MARGIN);

        if content.len() <= chunk_max_chars {
            return self.summarize_single(content, title, patient).await;
        }

        let segments = segment(content, chunk_max_chars);

        // Just over the threshold with no internal boundary: a one-segment
        // "aggregation" would be a pointless extra call.
        if segments.len() == 1 {
            return self.summarize_single(&segments[0], title, patient).await;
        }

        info!(
            "Chunked summarization for article {}: {} segments",
            article.pmid,
            segments.len()
        );
        METRICS.observe_segments(segments.len() as f64);

        let total = segments.len();
        let mut section_summaries = Vec::with_capacity(total);
        for (i, seg) in segments.iter().enumerate() {
            section_summaries.push(self.summarize_segment(seg, i + 1, total, title).await);
        }

        self.combine_sections(&section_summaries, title, patient).await
    }

    /// Summarize one segment as "Part i of N". Failure yields a placeholder
    /// so the remaining segments and the aggregation still run.
    pub async fn summarize_segment(
        &self,
        segment_text: &str,
        index: usize,
        total: usize,
        title: &str,
    ) -> String {
        let prompt = format!(
            "You are a medical expert. Summarize this section of a medical article.\n\n\
             ARTICLE: {title}\n\
             SECTION: Part {index} of {total}\n\n\
             CONTENT:\n{segment_text}\n\n\
             Provide a concise summary of the key points in this section. Focus on:\n\
             - Main findings or claims\n\
             - Important data or statistics\n\
             - Clinical recommendations mentioned\n\n\
             Keep it brief (3-5 bullet points)."
        );

        let messages = [
            ChatMessage::system("You are a medical expert. Be concise and accurate."),
            ChatMessage::user(prompt),
        ];

        match self
            .chat
            .complete(&messages, SUMMARY_TEMPERATURE, Some(SEGMENT_SUMMARY_TOKENS))
            .await
        {
            Ok(text) => {
                METRICS.record_llm_call("segment_summary", true);
                text
            }
            Err(e) => {
                warn!("Segment {}/{} summary failed: {}", index, total, e);
                METRICS.record_llm_call("segment_summary", false);
                format!("[Section {index} summary failed: {e}]")
            }
        }
    }

    /// Combine per-section summaries into one structured clinical summary.
    /// Failure degrades the formatting but keeps the section content.
    pub async fn combine_sections(
        &self,
        section_summaries: &[String],
        title: &str,
        patient: Option<&PatientContext>,
    ) -> String {
        let context_line = patient_context_line(patient);
        let sections_text = section_summaries
            .iter()
            .enumerate()
            .map(|(i, s)| format!("SECTION {}:\n{}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "You are a medical expert. Combine these section summaries into a cohesive clinical summary.\n\n\
             ARTICLE: {title}{context_line}\n\n\
             SECTION SUMMARIES:\n{sections_text}\n\n\
             Create a unified summary with these sections (skip if not applicable):\n\n\
             KEY POINTS:\n\
             • Main findings (3-5 bullet points)\n\n\
             CLINICAL RELEVANCE:\n\
             • How this applies to clinical practice\n\n\
             TREATMENT/RECOMMENDATIONS:\n\
             • Key treatment recommendations or clinical guidelines\n\n\
             LIMITATIONS:\n\
             • Study limitations or caveats\n\n\
             Keep it concise but clinically useful."
        );

        let messages = [
            ChatMessage::system("You are a medical expert providing clinical summaries."),
            ChatMessage::user(prompt),
        ];

        match self
            .chat
            .complete(&messages, SUMMARY_TEMPERATURE, self.max_tokens)
            .await
        {
            Ok(text) => {
                METRICS.record_llm_call("combine_sections", true);
                text
            }
            Err(e) => {
                warn!("Section aggregation failed: {}", e);
                METRICS.record_llm_call("combine_sections", false);
                format!(
                    "Error combining summaries: {e}\n\nPartial summaries:\n{}",
                    section_summaries.join("\n\n")
                )
            }
        }
    }

    /// Direct single-pass summary for content that fits the budget.
    async fn summarize_single(
        &self,
        content: &str,
        title: &str,
        patient: Option<&PatientContext>,
    ) -> String {
        let context_line = patient_context_line(patient);

        let prompt = format!(
            "You are a medical expert. Summarize the following medical article for clinical use.\n\n\
             TITLE: {title}\n\n\
             CONTENT:\n{content}{context_line}\n\n\
             Provide a structured summary with the following sections (skip sections that aren't applicable):\n\n\
             KEY POINTS:\n\
             • Main findings (3-5 bullet points)\n\n\
             CLINICAL RELEVANCE:\n\
             • How this applies to clinical practice\n\n\
             TREATMENT/RECOMMENDATIONS:\n\
             • Key treatment recommendations or clinical guidelines\n\n\
             LIMITATIONS:\n\
             • Study limitations or caveats (if applicable)\n\n\
             Keep the summary concise but clinically useful. Use bullet points."
        );

        let messages = [
            ChatMessage::system(
                "You are a medical expert providing clinical summaries. Be accurate and concise.",
            ),
            ChatMessage::user(prompt),
        ];

        match self
            .chat
            .complete(&messages, SUMMARY_TEMPERATURE, self.max_tokens)
            .await
        {
            Ok(text) => {
                METRICS.record_llm_call("single_summary", true);
                text
            }
            Err(e) => {
                warn!("Single-pass summary failed: {}", e);
                METRICS.record_llm_call("single_summary", false);
                format!("Error generating summary: {e}")
            }
        }
    }

    /// One synthesis across multiple articles relative to a clinical context.
    ///
    /// Each article gets an equal excerpt budget; only the first five articles
    /// participate. If the assembled excerpts plus the context still exceed
    /// the budget, the per-article allocation is halved once and the excerpts
    /// rebuilt. A second overshoot is tolerated and left to the backend's own
    /// input limits.
    pub async fn combine_summary(&self, articles: &[Article], context: &str) -> String {
        if articles.is_empty() {
            return NO_CONTENT_SENTINEL.to_string();
        }

        let max_chars = self.budget.max_content_chars();
        let mut per_article = (max_chars / articles.len().min(SYNTHESIS_ARTICLE_CAP))
            .saturating_sub(SYNTHESIS_ARTICLE_MARGIN);

        let mut articles_text = render_excerpts(articles, per_article);
        if articles_text.len() + context.len() > max_chars {
            per_article /= 2;
            debug!("Synthesis over budget, halving per-article excerpts to {per_article} chars");
            articles_text = render_excerpts(articles, per_article);
        }

        let prompt = format!(
            "You are a medical expert. Given the following clinical context and related medical \
             articles, provide a comprehensive summary addressing the clinical question.\n\n\
             CLINICAL CONTEXT:\n{}\n\n\
             ARTICLES:\n{articles_text}\n\n\
             Provide a synthesis that:\n\
             1. Addresses the clinical context directly\n\
             2. Integrates key findings from the articles\n\
             3. Highlights consensus and any disagreements\n\
             4. Provides actionable clinical recommendations\n\n\
             Format with clear sections and bullet points where appropriate.",
            truncate_chars(context, 500)
        );

        let messages = [
            ChatMessage::system("You are a medical expert providing evidence-based clinical guidance."),
            ChatMessage::user(prompt),
        ];

        match self
            .chat
            .complete(&messages, SUMMARY_TEMPERATURE, self.max_tokens)
            .await
        {
            Ok(text) => {
                METRICS.record_llm_call("combined_summary", true);
                text
            }
            Err(e) => {
                warn!("Combined summary failed: {}", e);
                METRICS.record_llm_call("combined_summary", false);
                format!("Error generating combined summary: {e}")
            }
        }
    }

    /// Probe the backend with a minimal completion.
    pub async fn health_check(&self) -> bool {
        self.chat
            .complete(&[ChatMessage::user("Hello")], 0.0, Some(10))
            .await
            .is_ok()
    }
}

fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        "Untitled"
    } else {
        title
    }
}

/// One demographic line for prompts; empty when no demographics are present
/// so absence never alters pipeline mechanics.
fn patient_context_line(patient: Option<&PatientContext>) -> String {
    match patient {
        Some(p) if p.age.is_some() || p.gender.is_some() => {
            let age = p
                .age
                .map(|a| a.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let gender = p.gender.as_deref().unwrap_or("patient");
            format!("\n\nPATIENT CONTEXT: {age} year old {gender}")
        }
        _ => String::new(),
    }
}

fn render_excerpts(articles: &[Article], per_article: usize) -> String {
    articles
        .iter()
        .take(SYNTHESIS_ARTICLE_CAP)
        .enumerate()
        .map(|(i, a)| {
            let title = display_title(&a.title);
            let abstract_text = if a.abstract_text.is_empty() {
                "No abstract"
            } else {
                &a.abstract_text
            };
            format!(
                "ARTICLE {}:\nTitle: {}\nAbstract: {}",
                i + 1,
                title,
                truncate_chars(abstract_text, per_article)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
