//! Server configuration

use clap::ValueEnum;
use mailguard_classifiers::DetectorConfig;
use mailguard_policy::{EngineConfig, LlmConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Review loop limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Event stream settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Detector keyword tables and allow-list
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Directory of `<category>.md` policy documents; built-ins when unset
    #[serde(default)]
    pub policy_dir: Option<PathBuf>,

    /// Which decision policy drives the loop
    #[serde(default)]
    pub decision: DecisionMode,

    /// Model endpoint settings, used when `decision` is `llm`
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Values taken from the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub policy_dir: Option<PathBuf>,
    pub decision: Option<DecisionMode>,
    pub max_iterations: Option<u32>,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    ///
    /// A missing file yields the defaults.
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml_str(&content)?
        } else {
            Self::default()
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check limits after overrides are applied
    pub fn validate(&self) -> mailguard_core::Result<()> {
        self.engine.validate()?;
        if self.stream.channel_capacity < 1 {
            return Err(mailguard_core::Error::config(
                "stream.channel_capacity must be at least 1",
            ));
        }
        Ok(())
    }

    fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = &overrides.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(dir) = &overrides.policy_dir {
            self.policy_dir = Some(dir.clone());
        }
        if let Some(decision) = overrides.decision {
            self.decision = decision;
        }
        if let Some(max) = overrides.max_iterations {
            self.engine.max_iterations = max;
        }
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            engine: EngineConfig::default(),
            stream: StreamConfig::default(),
            detector: DetectorConfig::default(),
            policy_dir: None,
            decision: DecisionMode::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Event stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Events buffered between the loop and a slow client
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds of silence before a keep-alive comment is sent
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Deterministic rule-based policy
    #[default]
    Rules,
    /// OpenAI-compatible chat completions endpoint
    Llm,
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_channel_capacity() -> usize {
    1
}

fn default_keep_alive_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ServerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.engine.max_iterations, 5);
        assert_eq!(config.stream.channel_capacity, 1);
        assert_eq!(config.decision, DecisionMode::Rules);
        assert!(config.policy_dir.is_none());
    }

    #[test]
    fn test_nested_sections() {
        let yaml = r#"
port: 9000
engine:
  max_iterations: 3
decision: llm
llm:
  model: test/model
detector:
  allowed_email_domains: ["example.com"]
"#;
        let config = ServerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.engine.max_iterations, 3);
        assert_eq!(config.engine.max_decisions, 25);
        assert_eq!(config.decision, DecisionMode::Llm);
        assert_eq!(config.llm.model, "test/model");
        assert_eq!(config.detector.allowed_email_domains, vec!["example.com"]);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = ConfigOverrides {
            port: Some(3000),
            max_iterations: Some(2),
            decision: Some(DecisionMode::Llm),
            ..Default::default()
        };
        let config = ServerConfig::load("/nonexistent/mailguard.yaml", &overrides).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.engine.max_iterations, 2);
        assert_eq!(config.decision, DecisionMode::Llm);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let overrides = ConfigOverrides {
            max_iterations: Some(0),
            ..Default::default()
        };
        let err = ServerConfig::load("/nonexistent/mailguard.yaml", &overrides).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));

        let config = ServerConfig::from_yaml_str("stream:\n  channel_capacity: 0\n").unwrap();
        assert_eq!(config.validate().unwrap_err().kind(), "config");
    }
}
