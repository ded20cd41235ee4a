//! Runtime configuration read from the environment
//!
//! Binaries load `.env` via dotenv before calling [`AgentConfig::from_env`].

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Remote OpenAI-compatible chat provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEndpoint {
    pub model_name: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Remote OpenAI-compatible embeddings provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingEndpoint {
    pub model_name: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `None` runs the offline mock model
    pub model: Option<ModelEndpoint>,
    /// `None` runs the offline hashing embedder
    pub embedding: Option<EmbeddingEndpoint>,
    pub embedding_dim: usize,
    pub max_tool_iterations: u32,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub model_max_retries: u32,
    pub retry_backoff: Duration,
    pub history_max_messages: usize,
    /// Completed queries kept in the audit log
    pub audit_max_records: usize,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            embedding: None,
            embedding_dim: 384,
            max_tool_iterations: 8,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            model_max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            history_max_messages: 200,
            audit_max_records: 1000,
            port: 8080,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_key = get("PROVIDER_API_KEY").or_else(|| get("OPENAI_API_KEY"));

        let model = match (get("MODEL_NAME"), get("PROVIDER_URL")) {
            (Some(model_name), Some(base_url)) => Some(ModelEndpoint {
                model_name,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.clone(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(AgentError::Config(
                    "MODEL_NAME is set but PROVIDER_URL is missing".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(AgentError::Config(
                    "PROVIDER_URL is set but MODEL_NAME is missing".to_string(),
                ))
            }
        };

        let embedding = match (get("EMBEDDING_MODEL"), get("EMBEDDING_URL")) {
            (Some(model_name), Some(base_url)) => Some(EmbeddingEndpoint {
                model_name,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: get("EMBEDDING_API_KEY").or(api_key),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(AgentError::Config(
                    "EMBEDDING_MODEL is set but EMBEDDING_URL is missing".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(AgentError::Config(
                    "EMBEDDING_URL is set but EMBEDDING_MODEL is missing".to_string(),
                ))
            }
        };

        let embedding_dim: usize =
            parse_or("EMBEDDING_DIM", get("EMBEDDING_DIM"), defaults.embedding_dim)?;
        if embedding_dim == 0 {
            return Err(AgentError::Config(
                "EMBEDDING_DIM must be at least 1".to_string(),
            ));
        }

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let max_tool_iterations: u32 =
            parse_or("MAX_TOOL_ITERATIONS", get("MAX_TOOL_ITERATIONS"), defaults.max_tool_iterations)?;
        if max_tool_iterations == 0 {
            return Err(AgentError::Config(
                "MAX_TOOL_ITERATIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            model,
            embedding,
            embedding_dim,
            max_tool_iterations,
            model_timeout: Duration::from_secs(parse_or(
                "MODEL_TIMEOUT_SECS",
                get("MODEL_TIMEOUT_SECS"),
                defaults.model_timeout.as_secs(),
            )?),
            tool_timeout: Duration::from_secs(parse_or(
                "TOOL_TIMEOUT_SECS",
                get("TOOL_TIMEOUT_SECS"),
                defaults.tool_timeout.as_secs(),
            )?),
            model_max_retries: parse_or(
                "MODEL_MAX_RETRIES",
                get("MODEL_MAX_RETRIES"),
                defaults.model_max_retries,
            )?,
            retry_backoff: Duration::from_millis(parse_or(
                "RETRY_BACKOFF_MS",
                get("RETRY_BACKOFF_MS"),
                defaults.retry_backoff.as_millis() as u64,
            )?),
            history_max_messages: parse_or(
                "HISTORY_MAX_MESSAGES",
                get("HISTORY_MAX_MESSAGES"),
                defaults.history_max_messages,
            )?,
            audit_max_records: parse_or(
                "AUDIT_MAX_RECORDS",
                get("AUDIT_MAX_RECORDS"),
                defaults.audit_max_records,
            )?,
            port,
        })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.model.is_none());
        assert!(config.embedding.is_none());
        assert_eq!(config.embedding_dim, 384);
        assert_eq!(config.max_tool_iterations, 8);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_model_endpoint_trims_trailing_slash() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("MODEL_NAME", "qwen2.5"),
            ("PROVIDER_URL", "http://localhost:11434/v1/"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();

        let model = config.model.unwrap();
        assert_eq!(model.base_url, "http://localhost:11434/v1");
        assert_eq!(model.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_half_configured_model_is_rejected() {
        let result = AgentConfig::from_lookup(lookup(&[("MODEL_NAME", "qwen2.5")]));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_half_configured_embedding_is_rejected() {
        let result = AgentConfig::from_lookup(lookup(&[("EMBEDDING_MODEL", "all-minilm")]));
        assert!(matches!(result, Err(AgentError::Config(_))));

        let result =
            AgentConfig::from_lookup(lookup(&[("EMBEDDING_URL", "http://localhost:11434/v1")]));
        assert!(matches!(result, Err(AgentError::Config(_))));

        let config = AgentConfig::from_lookup(lookup(&[
            ("EMBEDDING_MODEL", "all-minilm"),
            ("EMBEDDING_URL", "http://localhost:11434/v1/"),
            ("PROVIDER_API_KEY", "sk-test"),
        ]))
        .unwrap();
        let embedding = config.embedding.unwrap();
        assert_eq!(embedding.base_url, "http://localhost:11434/v1");
        assert_eq!(embedding.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_zero_embedding_dimension_is_rejected() {
        let result = AgentConfig::from_lookup(lookup(&[("EMBEDDING_DIM", "0")]));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_audit_cap() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.audit_max_records, 1000);

        let config = AgentConfig::from_lookup(lookup(&[("AUDIT_MAX_RECORDS", "50")])).unwrap();
        assert_eq!(config.audit_max_records, 50);
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let result = AgentConfig::from_lookup(lookup(&[("MAX_TOOL_ITERATIONS", "many")]));
        assert!(matches!(result, Err(AgentError::Config(_))));

        let result = AgentConfig::from_lookup(lookup(&[("MAX_TOOL_ITERATIONS", "0")]));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn test_api_port_fallback() {
        let config = AgentConfig::from_lookup(lookup(&[("API_PORT", "9000")])).unwrap();
        assert_eq!(config.port, 9000);
    }
}
