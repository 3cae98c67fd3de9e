//! LLM-facing core: budget arithmetic, segmentation, and the summarization
//! and advisory pipelines.

pub mod advisor;
pub mod budget;
pub mod chat;
pub mod segmenter;
pub mod summarizer;

pub use advisor::{ArticleSelection, SearchAdvisor, SearchTerms, SelectionMethod, TermSource};
pub use budget::{BudgetError, ContextBudget};
pub use chat::{ChatCompletion, ChatError, ChatMessage, OpenAiChatClient};
pub use segmenter::segment;
pub use summarizer::{ClinicalSummarizer, NO_CONTENT_SENTINEL};
