use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use receipt_query_core::router::RouterParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_relational_limit")]
    pub relational_limit: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            confidence_threshold: default_confidence_threshold(),
            relational_limit: default_relational_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn router_params(&self) -> RouterParams {
        RouterParams {
            top_k: self.top_k,
            min_score: self.min_score,
            confidence_threshold: self.confidence_threshold,
            relational_limit: self.relational_limit,
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_min_score() -> f32 {
    0.1
}
fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_relational_limit() -> usize {
    200
}
fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_answer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_answer_timeout_secs(),
        }
    }
}

impl AnswerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_answer_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    if !(0.0..=1.0).contains(&config.retrieval.confidence_threshold) {
        anyhow::bail!("retrieval.confidence_threshold must be in [0.0, 1.0]");
    }

    if config.retrieval.relational_limit < 1 {
        anyhow::bail!("retrieval.relational_limit must be >= 1");
    }

    if config.retrieval.timeout_ms < 1 {
        anyhow::bail!("retrieval.timeout_ms must be >= 1");
    }

    // Validate answer generation
    match config.answer.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown answer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.answer.is_enabled() && config.answer.model.is_none() {
        anyhow::bail!(
            "answer.model must be specified when provider is '{}'",
            config.answer.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/rq.sqlite"

[index]
path = "./data/rq.index"
"#;

    #[test]
    fn test_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.min_score, 0.1);
        assert_eq!(config.retrieval.confidence_threshold, 0.5);
        assert_eq!(config.retrieval.relational_limit, 200);
        assert_eq!(config.retrieval.timeout_ms, 5000);
        assert!(!config.answer.is_enabled());
        assert_eq!(config.retrieval.router_params(), RouterParams::default());
    }

    #[test]
    fn test_rejects_out_of_range_min_score() {
        let file = write_config(&format!("{MINIMAL}\n[retrieval]\nmin_score = 1.5\n"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("min_score"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let file = write_config(&format!("{MINIMAL}\n[retrieval]\ntop_k = 0\n"));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_answer_requires_model() {
        let file = write_config(&format!("{MINIMAL}\n[answer]\nprovider = \"openai\"\n"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("answer.model"));
    }

    #[test]
    fn test_unknown_answer_provider() {
        let file = write_config(&format!("{MINIMAL}\n[answer]\nprovider = \"local\"\n"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown answer provider"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/rq.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
