//! HTTP handlers for the gateway endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::api::models::{
    error_kinds, ApiError, ArticleQuery, RetrieveRequest, SearchRequest, SummarizeRequest,
};
use crate::config::Config;
use crate::llm::{ClinicalSummarizer, SearchAdvisor};
use crate::metrics::METRICS;
use crate::pubmed::models::PatientContext;
use crate::pubmed::{PubMedClient, PubMedError};

pub const SERVICE_NAME: &str = "PubMed Articles API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// LLM-backed components, absent when no backend is configured.
#[derive(Clone)]
pub struct LlmState {
    pub summarizer: Arc<ClinicalSummarizer>,
    pub advisor: Arc<SearchAdvisor>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pubmed: Arc<PubMedClient>,
    pub llm: Option<LlmState>,
}

type HandlerError = (StatusCode, Json<ApiError>);

fn bad_request(endpoint: &str, message: &str) -> HandlerError {
    METRICS.record_request(endpoint, false);
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(error_kinds::BAD_REQUEST, message)),
    )
}

fn not_found_error(endpoint: &str, message: String) -> HandlerError {
    METRICS.record_request(endpoint, false);
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(error_kinds::NOT_FOUND, message)),
    )
}

fn pubmed_failure(endpoint: &'static str) -> impl Fn(PubMedError) -> HandlerError {
    move |e| {
        error!("PubMed call failed in {}: {}", endpoint, e);
        METRICS.record_request(endpoint, false);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(error_kinds::INTERNAL_ERROR, e.to_string())),
        )
    }
}

fn finish(endpoint: &str, start: Instant) -> Value {
    METRICS.record_request(endpoint, true);
    METRICS.observe_duration(endpoint, start.elapsed().as_secs_f64());
    json!({
        "execution_time_seconds": (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0
    })
}

/// Health check
///
/// GET /health — no authentication required
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let llm_status = match &state.llm {
        Some(llm) if llm.summarizer.health_check().await => "available",
        Some(_) => "unavailable",
        None => "unavailable",
    };

    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "data_source": "PubMed/PubMed Central",
        "llm_backend": state.config.llm.backend.as_str(),
        "llm_status": llm_status,
        "features": [
            "pubmed_search",
            "open_access_retrieval",
            "llm_search_optimization",
            "article_summaries",
            "demographic_filtering"
        ]
    }))
}

/// Prometheus metrics snapshot
///
/// GET /metrics — no authentication required
pub async fn metrics_snapshot() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render(),
    )
}

/// Search PubMed for articles
///
/// POST /api/v1/search
pub async fn search_articles(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>, HandlerError> {
    let start = Instant::now();
    let query = request.query.trim();

    info!("Search request: query={}", query);

    if query.is_empty() {
        return Err(bad_request("search", "query parameter is required"));
    }
    if !(1..=100).contains(&request.limit) {
        return Err(bad_request(
            "search",
            "limit must be an integer between 1 and 100",
        ));
    }
    if request.sort != "relevance" && request.sort != "date" {
        return Err(bad_request("search", "sort must be 'relevance' or 'date'"));
    }

    let search_result = state
        .pubmed
        .search(query, request.limit as usize, &request.sort)
        .await
        .map_err(pubmed_failure("search"))?;

    let stubs = if search_result.pmids.is_empty() {
        Vec::new()
    } else {
        state
            .pubmed
            .get_article_summaries(&search_result.pmids)
            .await
            .map_err(pubmed_failure("search"))?
    };

    let results: Vec<Value> = stubs
        .iter()
        .map(|a| {
            json!({
                "pmid": a.pmid,
                "title": a.title,
                "authors": a.authors,
                "journal": a.journal,
                "pub_date": a.pub_date,
                "doi": a.doi,
                "has_pmc": a.pmcid.is_some(),
            })
        })
        .collect();

    Ok(Json(json!({
        "query": query,
        "query_translation": search_result.query_translation,
        "total_available": search_result.total_count,
        "results_count": results.len(),
        "sort": request.sort,
        "results": results,
        "_meta": finish("search", start),
    })))
}

/// Retrieve relevant articles with optional AI summaries
///
/// POST /api/v1/retrieve
pub async fn retrieve_articles(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<Value>, HandlerError> {
    let start = Instant::now();
    let topic = request.topic.trim();
    let case_scenario = request.case_scenario.trim();

    info!(
        "Retrieve request: keywords={}, topic={:?}, scenario={}",
        request.keywords.len(),
        topic,
        !case_scenario.is_empty()
    );

    if request.keywords.is_empty() && topic.is_empty() && case_scenario.is_empty() {
        return Err(bad_request(
            "retrieve",
            "Must provide at least one of: keywords, topic, or case_scenario",
        ));
    }
    if !(1..=20).contains(&request.limit) {
        return Err(bad_request(
            "retrieve",
            "limit must be an integer between 1 and 20",
        ));
    }
    let limit = request.limit as usize;

    // Derive search terms and the relevance context, preferring LLM-generated
    // terms when a scenario or topic is available.
    let (mut search_terms, context) = match &state.llm {
        Some(llm) if !case_scenario.is_empty() => {
            let terms = llm
                .advisor
                .generate_search_terms(Some(case_scenario), None)
                .await;
            (terms.terms, case_scenario.to_string())
        }
        Some(llm) if !topic.is_empty() => {
            let terms = llm.advisor.generate_search_terms(None, Some(topic)).await;
            (terms.terms, topic.to_string())
        }
        _ if !request.keywords.is_empty() => {
            (request.keywords.clone(), request.keywords.join(" "))
        }
        _ => {
            let fallback = if topic.is_empty() { case_scenario } else { topic };
            (vec![fallback.to_string()], fallback.to_string())
        }
    };

    if search_terms.is_empty() {
        search_terms = if request.keywords.is_empty() {
            let fallback = if topic.is_empty() { case_scenario } else { topic };
            vec![fallback.to_string()]
        } else {
            request.keywords.clone()
        };
    }

    // Dedupe hits across terms, preserving first-seen order.
    let mut seen = HashSet::new();
    let mut all_pmids = Vec::new();
    for term in search_terms.iter().take(5) {
        let result = state
            .pubmed
            .search(term, 20, "relevance")
            .await
            .map_err(pubmed_failure("retrieve"))?;
        for pmid in result.pmids {
            if seen.insert(pmid.clone()) {
                all_pmids.push(pmid);
            }
        }
    }

    let mut articles = if all_pmids.is_empty() {
        Vec::new()
    } else {
        let capped = &all_pmids[..all_pmids.len().min(50)];
        state
            .pubmed
            .get_article_details(capped)
            .await
            .map_err(pubmed_failure("retrieve"))?
    };

    if let Some(llm) = state.llm.as_ref().filter(|_| articles.len() > limit) {
        let selection = llm
            .advisor
            .select_relevant_articles(&articles, &context, limit)
            .await;
        let mut selected = Vec::with_capacity(selection.pmids.len());
        for pmid in &selection.pmids {
            if let Some(article) = articles.iter().find(|a| &a.pmid == pmid) {
                selected.push(article.clone());
            }
        }
        articles = selected;
    } else {
        articles.truncate(limit);
    }

    if request.include_full_text || request.include_summaries {
        let pmids: Vec<String> = articles.iter().map(|a| a.pmid.clone()).collect();
        let pmcid_map = state
            .pubmed
            .convert_pmid_to_pmcid(&pmids)
            .await
            .map_err(pubmed_failure("retrieve"))?;

        for article in &mut articles {
            if let Some(pmcid) = pmcid_map.get(&article.pmid) {
                article.pmcid = Some(pmcid.clone());
                if request.include_full_text {
                    if let Some(full_text) = state
                        .pubmed
                        .get_pmc_full_text(pmcid)
                        .await
                        .map_err(pubmed_failure("retrieve"))?
                    {
                        article.full_text = Some(full_text);
                    }
                }
            }
        }
    }

    let mut summaries: HashMap<String, String> = HashMap::new();
    if request.include_summaries {
        if let Some(llm) = &state.llm {
            let patient = PatientContext {
                age: request.patient_age,
                gender: request.patient_gender.clone(),
            };
            let patient = (!patient.is_empty()).then_some(patient);

            for article in &articles {
                let summary = llm
                    .summarizer
                    .summarize_article(article, patient.as_ref())
                    .await;
                summaries.insert(article.pmid.clone(), summary);
            }
        }
    }

    let results: Vec<Value> = articles
        .iter()
        .map(|a| {
            let mut entry = json!({
                "pmid": a.pmid,
                "title": a.title,
                "authors": a.authors,
                "journal": a.journal,
                "pub_date": a.pub_date,
                "abstract": a.abstract_text,
                "keywords": a.keywords,
                "mesh_terms": a.mesh_terms,
                "doi": a.doi,
                "pmcid": a.pmcid,
                "has_full_text": a.has_full_text(),
            });
            if request.include_full_text {
                if let Some(full_text) = &a.full_text {
                    entry["full_text"] = json!(full_text);
                }
            }
            if let Some(summary) = summaries.get(&a.pmid) {
                entry["summary"] = json!(summary);
            }
            entry
        })
        .collect();

    let mut meta = finish("retrieve", start);
    meta["llm_available"] = json!(state.llm.is_some());

    Ok(Json(json!({
        "search_terms": search_terms,
        "original_input": {
            "keywords": if request.keywords.is_empty() { Value::Null } else { json!(request.keywords) },
            "topic": if topic.is_empty() { Value::Null } else { json!(topic) },
            "case_scenario": if case_scenario.is_empty() { Value::Null } else { json!(case_scenario) },
        },
        "filters": {
            "patient_age": request.patient_age,
            "patient_gender": request.patient_gender,
        },
        "results_count": results.len(),
        "include_summaries": request.include_summaries,
        "include_full_text": request.include_full_text,
        "articles": results,
        "_meta": meta,
    })))
}

/// Get a specific article by PMID
///
/// GET /api/v1/article/{pmid}
pub async fn get_article(
    State(state): State<AppState>,
    Path(pmid): Path<String>,
    Query(params): Query<ArticleQuery>,
) -> Result<Json<Value>, HandlerError> {
    let start = Instant::now();

    info!("Article request: pmid={}", pmid);

    let articles = state
        .pubmed
        .get_article_details(&[pmid.clone()])
        .await
        .map_err(pubmed_failure("article"))?;

    let Some(mut article) = articles.into_iter().next() else {
        return Err(not_found_error(
            "article",
            format!("Article with PMID {pmid} not found"),
        ));
    };

    let pmcid_map = state
        .pubmed
        .convert_pmid_to_pmcid(&[pmid.clone()])
        .await
        .map_err(pubmed_failure("article"))?;

    if let Some(pmcid) = pmcid_map.get(&pmid) {
        article.pmcid = Some(pmcid.clone());
        if params.include_full_text {
            if let Some(full_text) = state
                .pubmed
                .get_pmc_full_text(pmcid)
                .await
                .map_err(pubmed_failure("article"))?
            {
                article.full_text = Some(full_text);
            }
        }
    }

    let summary = match &state.llm {
        Some(llm) if params.include_summary => {
            Some(llm.summarizer.summarize_article(&article, None).await)
        }
        _ => None,
    };

    let mut result = json!({
        "pmid": article.pmid,
        "title": article.title,
        "authors": article.authors,
        "journal": article.journal,
        "pub_date": article.pub_date,
        "abstract": article.abstract_text,
        "keywords": article.keywords,
        "mesh_terms": article.mesh_terms,
        "doi": article.doi,
        "pmcid": article.pmcid,
        "pub_types": article.pub_types,
    });
    if params.include_full_text {
        if let Some(full_text) = &article.full_text {
            result["full_text"] = json!(full_text);
        }
    }
    if let Some(summary) = summary {
        result["summary"] = json!(summary);
    }
    result["_meta"] = finish("article", start);

    Ok(Json(result))
}

/// Generate AI summaries for multiple articles
///
/// POST /api/v1/summarize
pub async fn summarize_articles(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<Value>, HandlerError> {
    let start = Instant::now();

    info!(
        "Summarize request: {} pmids, combined={}",
        request.pmids.len(),
        request.combined
    );

    let Some(llm) = &state.llm else {
        METRICS.record_request("summarize", false);
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(
                error_kinds::SERVICE_UNAVAILABLE,
                "LLM backend is not available for summarization",
            )),
        ));
    };

    if request.pmids.is_empty() {
        return Err(bad_request("summarize", "pmids array is required"));
    }
    if request.pmids.len() > 10 {
        return Err(bad_request(
            "summarize",
            "Maximum 10 articles can be summarized at once",
        ));
    }

    let mut articles = state
        .pubmed
        .get_article_details(&request.pmids)
        .await
        .map_err(pubmed_failure("summarize"))?;

    if articles.is_empty() {
        return Err(not_found_error(
            "summarize",
            "No articles found for the provided PMIDs".to_string(),
        ));
    }

    let pmcid_map = state
        .pubmed
        .convert_pmid_to_pmcid(&request.pmids)
        .await
        .map_err(pubmed_failure("summarize"))?;

    for article in &mut articles {
        if let Some(pmcid) = pmcid_map.get(&article.pmid) {
            article.pmcid = Some(pmcid.clone());
            if let Some(full_text) = state
                .pubmed
                .get_pmc_full_text(pmcid)
                .await
                .map_err(pubmed_failure("summarize"))?
            {
                article.full_text = Some(full_text);
            }
        }
    }

    let context = request.context.trim();
    if request.combined && !context.is_empty() {
        let combined_summary = llm.summarizer.combine_summary(&articles, context).await;
        return Ok(Json(json!({
            "context": context,
            "articles_count": articles.len(),
            "combined_summary": combined_summary,
            "_meta": finish("summarize", start),
        })));
    }

    let mut summaries = Vec::with_capacity(articles.len());
    for article in &articles {
        let summary = llm.summarizer.summarize_article(article, None).await;
        summaries.push(json!({
            "pmid": article.pmid,
            "title": article.title,
            "journal": article.journal,
            "has_full_text": article.has_full_text(),
            "summary": summary,
        }));
    }

    Ok(Json(json!({
        "summaries_count": summaries.len(),
        "summaries": summaries,
        "_meta": finish("summarize", start),
    })))
}

/// Get API statistics and capabilities
///
/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<Value> {
    let llm_config = state.llm.as_ref().map(|llm| {
        json!({
            "backend": state.config.llm.backend.as_str(),
            "model": state.config.llm.model,
            "context_window": state.config.llm.context_window,
            "max_tokens": state.config.llm.max_tokens,
            "max_content_chars": llm.summarizer.budget().max_content_chars(),
            "chunking_enabled": true,
        })
    });

    Json(json!({
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "data_source": {
            "name": "PubMed/PubMed Central",
            "description": "NCBI's database of biomedical literature",
            "articles_available": "35+ million citations",
        },
        "capabilities": {
            "search": true,
            "open_access_full_text": true,
            "llm_summarization": state.llm.is_some(),
            "llm_search_optimization": state.llm.is_some(),
            "chunked_summarization": state.llm.is_some(),
            "demographic_filtering": true,
        },
        "llm_config": llm_config,
        "rate_limits": {
            "ncbi_with_key": "10 requests/second",
            "ncbi_without_key": "3 requests/second",
        },
    }))
}

/// API documentation
///
/// GET /api/v1/docs — no authentication required
pub async fn get_docs(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "description": "RESTful API for searching PubMed and retrieving open-access articles with AI-powered summarization",
        "base_url": format!("http://localhost:{}", state.config.server.port),
        "authentication": {
            "type": "API Key",
            "header": "X-API-Key",
            "required_for": "All endpoints except /health, /metrics and /api/v1/docs",
        },
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check",
                "auth_required": false,
            },
            {
                "path": "/api/v1/search",
                "method": "POST",
                "description": "Search PubMed for articles",
                "auth_required": true,
                "parameters": {
                    "query": "string (required) - Search query",
                    "limit": "integer (1-100, default: 10) - Number of results",
                    "sort": "string ('relevance' or 'date', default: 'relevance')",
                },
            },
            {
                "path": "/api/v1/retrieve",
                "method": "POST",
                "description": "Retrieve relevant articles with AI summaries",
                "auth_required": true,
                "parameters": {
                    "keywords": "array - List of search keywords",
                    "topic": "string - Research topic",
                    "case_scenario": "string - Clinical case description",
                    "patient_age": "integer - Patient age for context",
                    "patient_gender": "string - Patient gender",
                    "limit": "integer (1-20, default: 5) - Number of articles",
                    "include_summaries": "boolean (default: false) - Generate AI summaries",
                    "include_full_text": "boolean (default: false) - Include full text if available",
                },
            },
            {
                "path": "/api/v1/article/{pmid}",
                "method": "GET",
                "description": "Get specific article by PMID",
                "auth_required": true,
                "parameters": {
                    "include_summary": "boolean (default: false)",
                    "include_full_text": "boolean (default: false)",
                },
            },
            {
                "path": "/api/v1/summarize",
                "method": "POST",
                "description": "Generate AI summaries for multiple articles",
                "auth_required": true,
                "parameters": {
                    "pmids": "array (required) - List of PMIDs (max 10)",
                    "context": "string - Clinical context for summaries",
                    "combined": "boolean (default: false) - Generate combined summary",
                },
            },
            {
                "path": "/api/v1/stats",
                "method": "GET",
                "description": "Get API statistics and capabilities",
                "auth_required": true,
            },
        ],
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> HandlerError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            error_kinds::NOT_FOUND,
            "The requested endpoint does not exist",
        )),
    )
}
