//! Biomedical literature gateway
//!
//! Searches PubMed, retrieves open-access full text from PMC and produces
//! clinically oriented summaries through an OpenAI-compatible chat backend.
//! Long articles are segmented to fit the model's context window and the
//! per-segment summaries are aggregated into a single clinical summary.

pub mod api;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod pubmed;

pub use config::Config;
