//! Environment-driven configuration
//!
//! All settings come from environment variables (loaded through dotenvy in
//! main). Two OpenAI-compatible backends are supported: LM Studio and vLLM,
//! each with its own set of variables, matching the deployment layouts they
//! ship with.

use secrecy::SecretString;
use thiserror::Error;

use crate::llm::budget::{BudgetError, ContextBudget};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error(transparent)]
    Budget(#[from] BudgetError),
}

/// LLM backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    LmStudio,
    Vllm,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::LmStudio => "lmstudio",
            LlmBackend::Vllm => "vllm",
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Shared secret for the X-API-Key header. None disables authentication.
    pub api_key: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            api_key: None,
        }
    }
}

/// Chat-completion backend configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Output budget for full summaries. None lets the backend decide.
    pub max_tokens: Option<u32>,
    pub context_window: u32,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::LmStudio,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "default".to_string(),
            api_key: "not-needed".to_string(),
            max_tokens: Some(2048),
            context_window: 8192,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl LlmConfig {
    /// Derive the content budget for this backend's context window.
    pub fn budget(&self) -> ContextBudget {
        ContextBudget::new(self.context_window)
    }
}

/// NCBI E-utilities configuration
#[derive(Debug, Clone)]
pub struct NcbiConfig {
    pub api_key: Option<SecretString>,
    pub email: Option<String>,
    pub tool: String,
}

impl Default for NcbiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            email: None,
            tool: "medlit-gateway".to_string(),
        }
    }
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub ncbi: NcbiConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("API_PORT") {
            config.server.port = val.parse().map_err(|_| ConfigError::InvalidValue {
                var: "API_PORT".to_string(),
                value: val.clone(),
            })?;
        }

        if let Ok(val) = std::env::var("API_KEY") {
            if !val.is_empty() {
                config.server.api_key = Some(SecretString::new(val));
            }
        }

        let backend = std::env::var("LLM_BACKEND").unwrap_or_default();
        config.llm = if backend.eq_ignore_ascii_case("vllm") {
            LlmConfig {
                backend: LlmBackend::Vllm,
                base_url: env_or("VLLM_LLM_BASE_URL", "http://localhost:8000/v1"),
                model: env_or("VLLM_LLM_MODEL", "meta-llama/Meta-Llama-3-8B-Instruct"),
                api_key: env_or("VLLM_API_KEY", "EMPTY"),
                max_tokens: parse_max_tokens("VLLM_MAX_TOKENS")?,
                context_window: parse_env("VLLM_CONTEXT_WINDOW", 8192)?,
                ..LlmConfig::default()
            }
        } else {
            LlmConfig {
                backend: LlmBackend::LmStudio,
                base_url: env_or("LM_STUDIO_BASE_URL", "http://localhost:1234/v1"),
                model: env_or("LM_STUDIO_MODEL", "default"),
                api_key: "not-needed".to_string(),
                max_tokens: parse_max_tokens("LM_STUDIO_MAX_TOKENS")?,
                context_window: parse_env("LM_STUDIO_CONTEXT_WINDOW", 8192)?,
                ..LlmConfig::default()
            }
        };

        if let Ok(val) = std::env::var("NCBI_API_KEY") {
            if !val.is_empty() {
                config.ncbi.api_key = Some(SecretString::new(val));
            }
        }

        if let Ok(val) = std::env::var("NCBI_EMAIL") {
            if !val.is_empty() {
                config.ncbi.email = Some(val);
            }
        }

        Ok(config)
    }

    /// Validate derived values. A context window too small to leave room for
    /// content is a startup failure, not something to discover mid-request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llm.budget().validate()?;
        Ok(())
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_env(var: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(val) => val.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: val.clone(),
        }),
        Err(_) => Ok(default),
    }
}

/// Max-tokens variables accept non-positive values to mean "unlimited".
fn parse_max_tokens(var: &str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(var) {
        Ok(val) => {
            let parsed: i64 = val.parse().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: val.clone(),
            })?;
            if parsed <= 0 {
                Ok(None)
            } else {
                Ok(Some(parsed as u32))
            }
        }
        Err(_) => Ok(Some(2048)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.backend, LlmBackend::LmStudio);
        assert_eq!(config.llm.context_window, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_llm_config() {
        let config = LlmConfig::default();
        assert_eq!(config.max_tokens, Some(2048));
        assert_eq!(config.budget().max_content_chars(), (8192 - 500 - 1024) * 4);
    }

    #[test]
    fn test_tiny_context_window_fails_validation() {
        let mut config = Config::default();
        config.llm.context_window = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(LlmBackend::LmStudio.as_str(), "lmstudio");
        assert_eq!(LlmBackend::Vllm.as_str(), "vllm");
    }
}
