//! NCBI E-utilities and PMC client
//!
//! Every outbound request passes through the shared `RateGate`. Absence of
//! data (no hits, no PMC mapping, article not open access) is an `Ok` empty
//! result; only transport problems surface as errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::NcbiConfig;
use crate::metrics::METRICS;
use crate::pubmed::models::{Article, ArticleStub, SearchResult};
use crate::pubmed::rate_limit::RateGate;
use crate::pubmed::xml;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const PMC_OA_BASE: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/oa/oa.fcgi";
const PMC_ID_CONVERTER: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Literature source errors
#[derive(Debug, Error)]
pub enum PubMedError {
    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("NCBI returned HTTP {status}")]
    Status { status: u16 },

    #[error("failed to parse NCBI response: {0}")]
    Parse(String),
}

/// Client for PubMed E-utilities and PMC.
pub struct PubMedClient {
    client: Client,
    gate: Arc<RateGate>,
    api_key: Option<String>,
    email: Option<String>,
    tool: String,
    eutils_base: String,
    oa_base: String,
    idconv_base: String,
}

impl PubMedClient {
    pub fn new(config: &NcbiConfig) -> Result<Self, PubMedError> {
        Self::with_base_urls(config, EUTILS_BASE, PMC_OA_BASE, PMC_ID_CONVERTER)
    }

    /// Constructor with overridable service URLs, used by tests.
    pub fn with_base_urls(
        config: &NcbiConfig,
        eutils_base: &str,
        oa_base: &str,
        idconv_base: &str,
    ) -> Result<Self, PubMedError> {
        let client = Client::builder()
            .build()
            .map_err(|e| PubMedError::Initialization(e.to_string()))?;

        let api_key = config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string());

        // Elevated access with an API key permits faster polling.
        let min_interval = if api_key.is_some() {
            Duration::from_millis(340)
        } else {
            Duration::from_millis(1000)
        };

        Ok(Self {
            client,
            gate: Arc::new(RateGate::new(min_interval)),
            api_key,
            email: config.email.clone(),
            tool: config.tool.clone(),
            eutils_base: eutils_base.trim_end_matches('/').to_string(),
            oa_base: oa_base.to_string(),
            idconv_base: idconv_base.to_string(),
        })
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", self.tool.clone())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        params
    }

    /// Search PubMed. `sort` is "relevance" or "date"; `max_results` caps at 100.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        sort: &str,
    ) -> Result<SearchResult, PubMedError> {
        self.gate.wait().await;

        let mut params = self.base_params();
        params.push(("db", "pubmed".to_string()));
        params.push(("term", query.to_string()));
        params.push(("retmax", max_results.min(100).to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("sort", sort.to_string()));

        let url = format!("{}/esearch.fcgi", self.eutils_base);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.network_error("search", e))?;

        let response = self.check_status("search", response)?;

        let envelope: EsearchEnvelope = response.json().await.map_err(|e| {
            METRICS.record_pubmed("search", false);
            PubMedError::Parse(e.to_string())
        })?;
        METRICS.record_pubmed("search", true);

        let result = envelope.esearchresult;
        Ok(SearchResult {
            pmids: result.idlist,
            total_count: result.count.parse().unwrap_or(0),
            query_translation: result.querytranslation.unwrap_or_else(|| query.to_string()),
        })
    }

    /// Light summary records for a list of PMIDs (esummary).
    pub async fn get_article_summaries(
        &self,
        pmids: &[String],
    ) -> Result<Vec<ArticleStub>, PubMedError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        self.gate.wait().await;

        let mut params = self.base_params();
        params.push(("db", "pubmed".to_string()));
        params.push(("id", pmids.join(",")));
        params.push(("retmode", "json".to_string()));

        let url = format!("{}/esummary.fcgi", self.eutils_base);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.network_error("esummary", e))?;

        let response = self.check_status("esummary", response)?;

        let data: serde_json::Value = response.json().await.map_err(|e| {
            METRICS.record_pubmed("esummary", false);
            PubMedError::Parse(e.to_string())
        })?;
        METRICS.record_pubmed("esummary", true);

        let result = &data["result"];
        let mut stubs = Vec::new();
        for pmid in pmids {
            let entry = &result[pmid.as_str()];
            if entry.is_null() {
                continue;
            }

            let authors = entry["authors"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a["name"].as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let journal = entry["fulljournalname"]
                .as_str()
                .filter(|s| !s.is_empty())
                .or_else(|| entry["source"].as_str())
                .unwrap_or_default()
                .to_string();

            let pub_types = entry["pubtype"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|t| t.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            stubs.push(ArticleStub {
                pmid: pmid.clone(),
                title: entry["title"].as_str().unwrap_or_default().to_string(),
                authors,
                journal,
                pub_date: entry["pubdate"].as_str().unwrap_or_default().to_string(),
                doi: extract_doi(entry["elocationid"].as_str().unwrap_or_default()),
                pmcid: entry["pmcid"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                pub_types,
            });
        }

        Ok(stubs)
    }

    /// Full article details including abstracts (efetch, XML).
    pub async fn get_article_details(&self, pmids: &[String]) -> Result<Vec<Article>, PubMedError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        self.gate.wait().await;

        let mut params = self.base_params();
        params.push(("db", "pubmed".to_string()));
        params.push(("id", pmids.join(",")));
        params.push(("rettype", "abstract".to_string()));
        params.push(("retmode", "xml".to_string()));

        let url = format!("{}/efetch.fcgi", self.eutils_base);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.network_error("efetch", e))?;

        let response = self.check_status("efetch", response)?;

        let body = response.text().await.map_err(|e| {
            METRICS.record_pubmed("efetch", false);
            PubMedError::Network(e.to_string())
        })?;
        METRICS.record_pubmed("efetch", true);

        Ok(xml::parse_pubmed_articles(&body))
    }

    /// Map PMIDs to PMCIDs where the article is deposited in PMC. A PMID with
    /// no PMC deposit is simply absent from the map.
    pub async fn convert_pmid_to_pmcid(
        &self,
        pmids: &[String],
    ) -> Result<HashMap<String, String>, PubMedError> {
        if pmids.is_empty() {
            return Ok(HashMap::new());
        }

        self.gate.wait().await;

        let mut params = vec![
            ("ids", pmids.join(",")),
            ("format", "json".to_string()),
            ("tool", self.tool.clone()),
        ];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }

        let response = self
            .client
            .get(&self.idconv_base)
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.network_error("idconv", e))?;

        if !response.status().is_success() {
            METRICS.record_pubmed("idconv", false);
            return Ok(HashMap::new());
        }

        let data: serde_json::Value = match response.json().await {
            Ok(data) => data,
            Err(_) => {
                METRICS.record_pubmed("idconv", false);
                return Ok(HashMap::new());
            }
        };
        METRICS.record_pubmed("idconv", true);

        let mut mapping = HashMap::new();
        if let Some(records) = data["records"].as_array() {
            for record in records {
                if let (Some(pmid), Some(pmcid)) = (record["pmid"].as_str(), record["pmcid"].as_str())
                {
                    mapping.insert(pmid.to_string(), pmcid.to_string());
                }
            }
        }

        Ok(mapping)
    }

    /// Open-access full text from PMC. `Ok(None)` when the article is not
    /// open access or its package cannot be used.
    pub async fn get_pmc_full_text(&self, pmcid: &str) -> Result<Option<String>, PubMedError> {
        let pmcid_clean = pmcid.trim_start_matches("PMC");

        self.gate.wait().await;

        let response = self
            .client
            .get(&self.oa_base)
            .query(&[("id", format!("PMC{pmcid_clean}"))])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.network_error("pmc_oa", e))?;

        if !response.status().is_success() {
            METRICS.record_pubmed("pmc_oa", false);
            return Ok(None);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => {
                METRICS.record_pubmed("pmc_oa", false);
                return Ok(None);
            }
        };
        METRICS.record_pubmed("pmc_oa", true);

        let Some(href) = xml::parse_oa_package_link(&body) else {
            debug!("No OA package for {pmcid}");
            return Ok(None);
        };

        if !href.ends_with(".xml") {
            debug!("OA package for {pmcid} is not article XML: {href}");
            return Ok(None);
        }

        Ok(self.fetch_article_text(&href).await)
    }

    /// Fetch and flatten a PMC article XML document. Best-effort: any
    /// transport or parse problem here degrades to absence.
    async fn fetch_article_text(&self, url: &str) -> Option<String> {
        self.gate.wait().await;

        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            warn!("PMC article fetch returned HTTP {}", response.status());
            return None;
        }

        let body = response.text().await.ok()?;
        xml::parse_pmc_article_text(&body)
    }

    fn network_error(&self, operation: &str, e: reqwest::Error) -> PubMedError {
        METRICS.record_pubmed(operation, false);
        PubMedError::Network(e.to_string())
    }

    fn check_status(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PubMedError> {
        if !response.status().is_success() {
            METRICS.record_pubmed(operation, false);
            return Err(PubMedError::Status {
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct EsearchEnvelope {
    #[serde(default)]
    esearchresult: EsearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default)]
    count: String,
    #[serde(default)]
    querytranslation: Option<String>,
}

/// Pull a DOI out of an esummary elocationid field such as
/// "doi: 10.1000/abc.123".
fn extract_doi(elocationid: &str) -> String {
    let Some(start) = elocationid.find("10.") else {
        return String::new();
    };
    let candidate = &elocationid[start..];
    let end = candidate
        .find(char::is_whitespace)
        .unwrap_or(candidate.len());
    let candidate = &candidate[..end];
    if candidate.contains('/') {
        candidate.to_string()
    } else {
        String::new()
    }
}
