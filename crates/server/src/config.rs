//! Application configuration.
//!
//! Settings live in an optional TOML file; every section has defaults, so an
//! empty file (or none) is a valid local setup. A few deployment knobs can be
//! overridden from the environment. Secrets are never part of the file: the
//! file names the environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const ENV_INDEX_PATH: &str = "ANIME_RECS_INDEX_PATH";
pub const ENV_CHROMA_URL: &str = "ANIME_RECS_CHROMA_URL";
pub const ENV_TOP_K: &str = "ANIME_RECS_TOP_K";

const MAX_RETRIES_LIMIT: u32 = 3;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("required secret is missing: set the {0} environment variable")]
    MissingSecret(String),
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// `[embedding]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the env var holding the (optional) API token
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: ml_client::embedding::DEFAULT_BASE_URL.into(),
            model: ml_client::embedding::DEFAULT_MODEL.into(),
            api_key_env: "HUGGINGFACEHUB_API_TOKEN".into(),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the env var holding the (required) API key
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let chat = ml_client::ChatSettings::default();
        Self {
            base_url: ml_client::chat::DEFAULT_BASE_URL.into(),
            model: chat.model,
            api_key_env: "GROQ_API_KEY".into(),
            temperature: chat.temperature,
            max_tokens: chat.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// JSON catalog searched in memory
    #[default]
    Local,
    /// Collection on a Chroma server
    Chroma,
}

/// `[index]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub kind: IndexKind,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub collection: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Local,
            path: Some(PathBuf::from("data/anime_index.json")),
            url: None,
            collection: Some("anime".into()),
        }
    }
}

/// `[retrieval]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Hits scoring below this similarity are dropped; when none are left
    /// the fallback message is returned
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
        }
    }
}

/// `[prompt]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub max_context_chars: usize,
    pub max_synopsis_chars: usize,
    /// Longer queries are rejected before they reach any backend
    pub max_query_chars: usize,
    /// File holding a custom template with `{context}` and `{query}` slots
    pub template_path: Option<PathBuf>,
    pub fallback_message: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_context_chars: pipeline::prompt::DEFAULT_MAX_CONTEXT_CHARS,
            max_synopsis_chars: pipeline::prompt::DEFAULT_MAX_SYNOPSIS_CHARS,
            max_query_chars: pipeline::DEFAULT_MAX_QUERY_CHARS,
            template_path: None,
            fallback_message: None,
        }
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_retries: 1,
            retry_backoff_ms: 500,
        }
    }
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl AppConfig {
    /// Load from `path` (defaults when `None`), apply environment overrides
    /// and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ANIME_RECS_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_INDEX_PATH) {
            debug!("{} overrides index path", ENV_INDEX_PATH);
            self.index.path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup(ENV_CHROMA_URL) {
            debug!("{} overrides Chroma URL", ENV_CHROMA_URL);
            self.index.url = Some(url);
        }
        if let Some(raw) = lookup(ENV_TOP_K) {
            self.retrieval.top_k = raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: ENV_TOP_K,
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    /// Reject configurations that could only fail later, at query time
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1".into());
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            return invalid("retrieval.min_score must be between -1 and 1".into());
        }
        if self.runtime.request_timeout_secs == 0 {
            return invalid("runtime.request_timeout_secs must be positive".into());
        }
        if self.runtime.max_retries > MAX_RETRIES_LIMIT {
            return invalid(format!(
                "runtime.max_retries must be at most {MAX_RETRIES_LIMIT}"
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return invalid("llm.temperature must be between 0 and 2".into());
        }
        if self.llm.max_tokens == 0 {
            return invalid("llm.max_tokens must be positive".into());
        }
        if self.prompt.max_context_chars == 0
            || self.prompt.max_synopsis_chars == 0
            || self.prompt.max_query_chars == 0
        {
            return invalid("prompt limits must be positive".into());
        }
        if self.llm.api_key_env.trim().is_empty() {
            return invalid("llm.api_key_env must name an environment variable".into());
        }

        check_url("embedding.base_url", &self.embedding.base_url)?;
        check_url("llm.base_url", &self.llm.base_url)?;

        match self.index.kind {
            IndexKind::Local => {
                if self.index.path.is_none() {
                    return invalid("index.path is required for a local index".into());
                }
            }
            IndexKind::Chroma => {
                let Some(url) = &self.index.url else {
                    return invalid("index.url is required for a chroma index".into());
                };
                check_url("index.url", url)?;
                if self.index.collection.as_deref().is_none_or(|c| c.trim().is_empty()) {
                    return invalid("index.collection is required for a chroma index".into());
                }
            }
        }
        Ok(())
    }
}

fn check_url(key: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(format!("{key} is not a valid URL ({value}): {e}")))
}

/// Backend secrets resolved from the environment at startup.
///
/// `Debug` is implemented by hand so keys never reach a log line.
#[derive(Clone)]
pub struct Credentials {
    pub llm_api_key: String,
    pub embedding_token: Option<String>,
}

impl Credentials {
    /// Read the secrets named by `config` through `lookup`.
    ///
    /// The language-model key is required; the embedding token is optional
    /// (public inference endpoints work without one).
    pub fn resolve<F>(config: &AppConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let llm_api_key = present(&config.llm.api_key_env)
            .ok_or_else(|| ConfigError::MissingSecret(config.llm.api_key_env.clone()))?;
        let embedding_token = present(&config.embedding.api_key_env);

        Ok(Self {
            llm_api_key,
            embedding_token,
        })
    }

    pub fn from_env(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"<redacted>")
            .field(
                "embedding_token",
                &self.embedding_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.runtime.max_retries, 1);
        assert_eq!(config.runtime.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.index.kind, IndexKind::Local);
        assert_eq!(config.retrieval.min_score, 0.0);
        assert_eq!(config.prompt.max_query_chars, pipeline::DEFAULT_MAX_QUERY_CHARS);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[index]\nkind = \"chroma\"\nurl = \"http://localhost:8000\"\n\n[retrieval]\ntop_k = 8\nmin_score = 0.25\n\n[prompt]\nmax_query_chars = 300"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.index.kind, IndexKind::Chroma);
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.min_score, 0.25);
        assert_eq!(config.prompt.max_query_chars, 300);
        assert_eq!(config.index.collection.as_deref(), Some("anime"));
        assert_eq!(config.llm, LlmConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retreival]\ntop_k = 3").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file(Path::new("/nonexistent/anime-recs.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_INDEX_PATH, "/srv/index.json"),
                (ENV_TOP_K, " 3 "),
            ]))
            .unwrap();
        assert_eq!(config.index.path, Some(PathBuf::from("/srv/index.json")));
        assert_eq!(config.retrieval.top_k, 3);

        let err = config
            .apply_overrides(env(&[(ENV_TOP_K, "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { key: ENV_TOP_K, .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.runtime.max_retries = 10;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.base_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.index.kind = IndexKind::Chroma;
        assert!(config.validate().is_err(), "chroma without url");

        let mut config = AppConfig::default();
        config.index.path = None;
        assert!(config.validate().is_err(), "local without path");

        let mut config = AppConfig::default();
        config.prompt.max_query_chars = 0;
        assert!(config.validate().is_err(), "zero query budget");

        let mut config = AppConfig::default();
        config.retrieval.min_score = 1.5;
        assert!(config.validate().is_err(), "min_score above cosine range");
    }

    #[test]
    fn test_credentials_require_llm_key() {
        let config = AppConfig::default();

        let err = Credentials::resolve(&config, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(ref name) if name == "GROQ_API_KEY"));

        let err = Credentials::resolve(&config, env(&[("GROQ_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(_)));

        let creds = Credentials::resolve(&config, env(&[("GROQ_API_KEY", "gsk_test")])).unwrap();
        assert_eq!(creds.llm_api_key, "gsk_test");
        assert!(creds.embedding_token.is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            llm_api_key: "gsk_secret".into(),
            embedding_token: Some("hf_secret".into()),
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("secret"));
    }
}
