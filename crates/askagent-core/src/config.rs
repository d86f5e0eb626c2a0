use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::formatter::DEFAULT_SNIPPET_CHARS;
use crate::lexicon::Lexicon;
use crate::search::DEFAULT_HARD_LIMIT;
use crate::{AskAgentError, SecretValue, optional_env, require_env};

const DEFAULT_CONFIG_PATH: &str = "askagent.toml";
const CONFIG_PATH_ENV: &str = "ASKAGENT_CONFIG";

/// Top-level configuration. Every section is optional in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub lexicon: Lexicon,
    pub document: DocumentConfig,
    pub capabilities: CapabilityConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, AskAgentError> {
        require_env(&self.llm.api_key_env)
    }

    /// Search credentials are optional; absence disables search.
    pub fn search_api_key(&self) -> Option<SecretValue> {
        match self.search.provider {
            SearchProviderKind::None => None,
            SearchProviderKind::Tavily => optional_env(&self.search.api_key_env),
        }
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `ASKAGENT_CONFIG` environment variable.
    /// 3. `askagent.toml` in the current working directory.
    ///
    /// Only the implicit default file may be absent, in which case built-in
    /// defaults apply.
    pub fn load(path: Option<PathBuf>) -> Result<Config, AskAgentError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| AskAgentError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Config, AskAgentError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| AskAgentError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), AskAgentError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(AskAgentError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.llm.model.trim().is_empty() {
            return Err(AskAgentError::InvalidConfiguration(
                "llm.model must not be empty".into(),
            ));
        }
        if config.search.hard_limit == 0 {
            return Err(AskAgentError::InvalidConfiguration(
                "search.hard_limit must be at least 1".into(),
            ));
        }
        if config.research.answer_length_threshold == 0 {
            return Err(AskAgentError::InvalidConfiguration(
                "research.answer_length_threshold must be positive".into(),
            ));
        }
        if config.document.max_chars == 0 {
            return Err(AskAgentError::InvalidConfiguration(
                "document.max_chars must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Tavily,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,
    pub api_key_env: String,
    /// Count hint passed to the adapter.
    pub max_results: usize,
    /// Provider-side cap, applied regardless of the hint.
    pub hard_limit: usize,
    pub search_depth: String,
    pub endpoint: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::Tavily,
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 5,
            hard_limit: DEFAULT_HARD_LIMIT,
            search_depth: "basic".to_string(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub iteration_budget: u32,
    /// Answers longer than this many characters stop the research loop.
    pub answer_length_threshold: usize,
    /// Appended to the question for every search after the first.
    pub followup_suffix: String,
    pub snippet_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            iteration_budget: 2,
            answer_length_threshold: 1500,
            followup_suffix: "상세 정보".to_string(),
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub max_chars: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { max_chars: 15_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Let the model request `web_search` itself in general mode.
    pub enabled: bool,
    pub max_rounds: u32,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_rounds: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Append a redacted JSONL record per request.
    pub request_log: bool,
    pub include_raw_model: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            request_log: false,
            include_raw_model: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_preserve_research_constants() {
        let config = ConfigLoader::from_toml("").unwrap();
        assert_eq!(config.research.iteration_budget, 2);
        assert_eq!(config.research.answer_length_threshold, 1500);
        assert_eq!(config.research.followup_suffix, "상세 정보");
        assert_eq!(config.search.hard_limit, 3);
        assert_eq!(config.document.max_chars, 15_000);
        assert_eq!(config.llm.model, "gpt-4.1-mini");
        assert!(!config.capabilities.enabled);
    }

    #[test]
    fn sections_override_individually() {
        let config = ConfigLoader::from_toml(
            r#"
            [research]
            iteration_budget = 4

            [search]
            provider = "none"

            [lexicon]
            research_keywords = ["investigate"]
            "#,
        )
        .unwrap();
        assert_eq!(config.research.iteration_budget, 4);
        assert_eq!(config.research.answer_length_threshold, 1500);
        assert_eq!(config.search.provider, SearchProviderKind::None);
        assert!(config.search_api_key().is_none());
        assert!(config.lexicon.research_keywords.matches("please investigate"));
    }

    #[test]
    fn rejects_blank_api_key_env() {
        let err = ConfigLoader::from_toml("[llm]\napi_key_env = \"\"").unwrap_err();
        assert!(matches!(err, AskAgentError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_zero_hard_limit() {
        let err = ConfigLoader::from_toml("[search]\nhard_limit = 0").unwrap_err();
        assert!(matches!(err, AskAgentError::InvalidConfiguration(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = ConfigLoader::load(Some(PathBuf::from("/nonexistent/askagent.toml"))).unwrap_err();
        assert!(matches!(err, AskAgentError::ConfigIo { .. }));
    }
}
