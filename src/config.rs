//! Service configuration
//!
//! Values come from the process environment (a `.env` file is honoured) and
//! every key falls back to a default so the service starts with no setup.

use crate::error::{AiError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub sql_model: String,
    pub explain_model: String,
    pub analyze_model: String,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            sql_model: "sqlcoder:7b".to_string(),
            explain_model: "llama3.1:8b".to_string(),
            analyze_model: "llama3.1:8b".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8001,
            request_timeout: Duration::from_secs(60),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| AiError::Config(format!("PORT '{}' is not a valid port: {}", raw, e)))?,
            None => defaults.port,
        };

        let request_timeout = match lookup("AI_REQUEST_TIMEOUT_SECONDS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| {
                    AiError::Config(format!(
                        "AI_REQUEST_TIMEOUT_SECONDS '{}' is not a whole number of seconds: {}",
                        raw, e
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.request_timeout,
        };

        Ok(Self {
            ollama_base_url: lookup("OLLAMA_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_base_url),
            sql_model: lookup("SQL_MODEL").unwrap_or(defaults.sql_model),
            explain_model: lookup("EXPLAIN_MODEL").unwrap_or(defaults.explain_model),
            analyze_model: lookup("ANALYZE_MODEL").unwrap_or(defaults.analyze_model),
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            request_timeout,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.sql_model, "sqlcoder:7b");
        assert_eq!(config.port, 8001);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.bind_address(), "0.0.0.0:8001");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("OLLAMA_BASE_URL", "http://gpu-box:11434/"),
            ("SQL_MODEL", "duckdb-nsql"),
            ("PORT", "9000"),
            ("AI_REQUEST_TIMEOUT_SECONDS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.ollama_base_url, "http://gpu-box:11434");
        assert_eq!(config.sql_model, "duckdb-nsql");
        assert_eq!(config.explain_model, "llama3.1:8b");
        assert_eq!(config.port, 9000);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, AiError::Config(_)));
    }
}
