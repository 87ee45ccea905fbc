//! Service configuration.
//!
//! Defaults, then an optional YAML file named by `CELESTIAL_CONFIG`, then
//! environment overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::ClassifierStrategy;
use crate::orchestrator::OrchestratorSettings;

pub const CONFIG_PATH_VAR: &str = "CELESTIAL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/celestial.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub classifier_model: String,
    pub insight_model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            classifier_model: "gpt-4-turbo".to_string(),
            insight_model: "gpt-4o".to_string(),
            timeout_secs: 60,
        }
    }
}

impl OpenAiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Token prices and the balance new profiles start with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub reading_upfront: u64,
    pub insight_upfront: u64,
    pub default_balance: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            reading_upfront: 250,
            insight_upfront: 250,
            default_balance: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub openai: OpenAiConfig,
    pub tokens: TokenConfig,
    pub classifier: ClassifierStrategy,
    pub refund_on_failure: bool,
    pub seed_catalog: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            openai: OpenAiConfig::default(),
            tokens: TokenConfig::default(),
            classifier: ClassifierStrategy::Ai,
            refund_on_failure: false,
            seed_catalog: true,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable set; `CELESTIAL_CONFIG` names the file.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = match vars.get(CONFIG_PATH_VAR).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(vars)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = parse_var("PORT", port)?;
        }
        if let Some(addr) = get("BIND_ADDR") {
            self.server.bind_addr = addr.to_string();
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(key.to_string());
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai.base_url = Some(url.to_string());
        }
        if let Some(model) = get("CLASSIFIER_MODEL") {
            self.openai.classifier_model = model.to_string();
        }
        if let Some(model) = get("INSIGHT_MODEL") {
            self.openai.insight_model = model.to_string();
        }
        if let Some(secs) = get("AI_TIMEOUT_SECS") {
            self.openai.timeout_secs = parse_var("AI_TIMEOUT_SECS", secs)?;
        }
        if let Some(strategy) = get("CLASSIFIER_STRATEGY") {
            self.classifier = match strategy.to_ascii_lowercase().as_str() {
                "ai" => ClassifierStrategy::Ai,
                "rules" => ClassifierStrategy::Rules,
                _ => return Err(invalid("CLASSIFIER_STRATEGY", strategy)),
            };
        }
        if let Some(flag) = get("REFUND_ON_FAILURE") {
            self.refund_on_failure = parse_flag("REFUND_ON_FAILURE", flag)?;
        }
        if let Some(flag) = get("SEED_CATALOG") {
            self.seed_catalog = parse_flag("SEED_CATALOG", flag)?;
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            reading_cost: self.tokens.reading_upfront,
            insight_cost: self.tokens.insight_upfront,
            refund_on_failure: self.refund_on_failure,
        }
    }
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(var, value))
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.server.address(), "0.0.0.0:8080");
        assert_eq!(config.openai.classifier_model, "gpt-4-turbo");
        assert_eq!(config.openai.insight_model, "gpt-4o");
        assert_eq!(config.tokens.reading_upfront, 250);
        assert_eq!(config.tokens.default_balance, 1000);
        assert_eq!(config.classifier, ClassifierStrategy::Ai);
        assert!(!config.refund_on_failure);
        assert!(config.seed_catalog);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_vars(&vars(&[
            ("PORT", "9000"),
            ("DATABASE_PATH", "/tmp/readings.db"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CLASSIFIER_STRATEGY", "Rules"),
            ("REFUND_ON_FAILURE", "yes"),
            ("SEED_CATALOG", "0"),
            ("AI_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/readings.db"));
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.classifier, ClassifierStrategy::Rules);
        assert!(config.refund_on_failure);
        assert!(!config.seed_catalog);
        assert_eq!(config.openai.timeout(), Duration::from_secs(15));
        assert!(config.orchestrator_settings().refund_on_failure);
    }

    #[test]
    fn test_bad_env_values_are_rejected() {
        for (var, value) in [
            ("PORT", "eighty"),
            ("CLASSIFIER_STRATEGY", "oracle"),
            ("REFUND_ON_FAILURE", "maybe"),
        ] {
            let err = Config::from_vars(&vars(&[(var, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidEnv { .. }), "{}", var);
        }
    }

    #[test]
    fn test_yaml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 7000\ntokens:\n  insight_upfront: 400\nclassifier: rules\n"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::from_vars(&vars(&[(CONFIG_PATH_VAR, path.as_str()), ("PORT", "7100")])).unwrap();
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.tokens.insight_upfront, 400);
        assert_eq!(config.tokens.reading_upfront, 250);
        assert_eq!(config.classifier, ClassifierStrategy::Rules);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::from_vars(&vars(&[(CONFIG_PATH_VAR, "/nonexistent/celestial.yaml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
