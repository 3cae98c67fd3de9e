use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medlit_gateway::api::{build_router, AppState, LlmState};
use medlit_gateway::config::Config;
use medlit_gateway::llm::{ClinicalSummarizer, OpenAiChatClient, SearchAdvisor};
use medlit_gateway::pubmed::PubMedClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    config.validate()?;

    info!(
        "Starting medlit-gateway (backend: {}, model: {})",
        config.llm.backend.as_str(),
        config.llm.model
    );

    let pubmed = Arc::new(PubMedClient::new(&config.ncbi)?);

    let llm = match OpenAiChatClient::new(&config.llm) {
        Ok(chat) => {
            let chat: Arc<dyn medlit_gateway::llm::ChatCompletion> = Arc::new(chat);
            let summarizer = Arc::new(ClinicalSummarizer::new(
                chat.clone(),
                config.llm.budget(),
                config.llm.max_tokens,
            ));
            let advisor = Arc::new(SearchAdvisor::new(chat, config.llm.budget()));

            if summarizer.health_check().await {
                info!("LLM backend is reachable");
            } else {
                warn!("LLM backend is not responding; summaries will degrade until it recovers");
            }

            Some(LlmState {
                summarizer,
                advisor,
            })
        }
        Err(e) => {
            warn!("LLM client initialization failed: {e}; running without summarization");
            None
        }
    };

    if config.server.api_key.is_none() {
        warn!("API_KEY is not set; authentication is disabled");
    }

    let port = config.server.port;
    let state = AppState {
        config,
        pubmed,
        llm,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
