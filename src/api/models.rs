//! Request models and the error envelope for the HTTP API

use serde::{Deserialize, Serialize};

/// Error kinds used in the `{"error": ..., "message": ...}` envelope.
pub mod error_kinds {
    pub const BAD_REQUEST: &str = "Bad Request";
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const NOT_FOUND: &str = "Not Found";
    pub const SERVICE_UNAVAILABLE: &str = "Service Unavailable";
    pub const INTERNAL_ERROR: &str = "Internal Server Error";
}

/// API error envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: kind.into(),
            message: message.into(),
        }
    }
}

/// POST /api/v1/search
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
    #[serde(default = "default_sort")]
    pub sort: String,
}

fn default_search_limit() -> i64 {
    10
}

fn default_sort() -> String {
    "relevance".to_string()
}

/// POST /api/v1/retrieve
#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub case_scenario: String,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_gender: Option<String>,
    #[serde(default = "default_retrieve_limit")]
    pub limit: i64,
    #[serde(default)]
    pub include_summaries: bool,
    #[serde(default)]
    pub include_full_text: bool,
}

fn default_retrieve_limit() -> i64 {
    5
}

/// POST /api/v1/summarize
#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub pmids: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub combined: bool,
}

/// Query parameters for GET /api/v1/article/{pmid}
#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    pub include_summary: bool,
    #[serde(default)]
    pub include_full_text: bool,
}
