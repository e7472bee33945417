use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Top-level configuration tree (spec.md §6).
///
/// Loaded from YAML with `${ENV_VAR}` expansion applied to the raw text
/// before parsing — see `load` and `expand_env_vars` below, grounded on the
/// teacher's "env before config" ordering in its own bootstrap path, though
/// the teacher itself never expanded variables inside the YAML body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub default_chat: Option<String>,
    #[serde(default)]
    pub default_vision: Option<String>,
    #[serde(default)]
    pub default_reasoning: Option<String>,
    #[serde(default)]
    pub definitions: HashMap<String, ModelDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    On,
    Off,
    Auto,
}

impl Default for ThinkingMode {
    fn default() -> Self {
        ThinkingMode::Auto
    }
}

fn d_max_tokens() -> u32 {
    4096
}
fn d_temperature() -> f32 {
    0.7
}
fn d_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub provider: String,
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub thinking: ThinkingMode,
    #[serde(default)]
    pub parallel_tool_calls: bool,
    #[serde(default)]
    pub is_vision: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub post_prompt: Option<String>,
    /// Tool-specific keys surfaced verbatim to the tool's constructor.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub debug_logs: DebugLogsConfig,
}

fn d_streaming_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "d_streaming_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub thinking_only: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thinking_only: false,
        }
    }
}

fn d_max_result_size() -> usize {
    16 * 1024
}
fn d_logs_dir() -> String {
    "logs".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLogsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub save_logs: bool,
    #[serde(default = "d_logs_dir")]
    pub logs_dir: String,
    #[serde(default)]
    pub include_tool_args: bool,
    #[serde(default)]
    pub include_tool_results: bool,
    #[serde(default = "d_max_result_size")]
    pub max_result_size: usize,
}

impl Default for DebugLogsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            save_logs: false,
            logs_dir: d_logs_dir(),
            include_tool_args: false,
            include_tool_results: false,
            max_result_size: d_max_result_size(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, expanding `${VAR}` /
    /// `${VAR:-default}` tokens against the process environment first.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&raw);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory YAML string (used by tests and
    /// by callers that assemble config without a file).
    pub fn from_yaml_str(raw: &str) -> Result<Config> {
        let expanded = expand_env_vars(raw);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(alias) = &self.models.default_chat {
            if !self.models.definitions.contains_key(alias) {
                return Err(CoreError::ConfigInvalid(format!(
                    "models.default_chat references undefined alias '{alias}'"
                )));
            }
        }
        if let Some(alias) = &self.models.default_vision {
            if !self.models.definitions.contains_key(alias) {
                return Err(CoreError::ConfigInvalid(format!(
                    "models.default_vision references undefined alias '{alias}'"
                )));
            }
        }
        if let Some(alias) = &self.models.default_reasoning {
            if !self.models.definitions.contains_key(alias) {
                return Err(CoreError::ConfigInvalid(format!(
                    "models.default_reasoning references undefined alias '{alias}'"
                )));
            }
        }
        Ok(())
    }
}

/// Expand `${VAR}` and `${VAR:-default}` against `std::env`.
///
/// Unset variables with no default expand to the empty string, matching
/// ordinary shell semantics rather than failing the load — config loading
/// only fails on a malformed YAML document or a dangling model alias.
pub fn expand_env_vars(input: &str) -> String {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN
        .get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").unwrap());
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(val) => val,
            Err(_) => caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_simple_var() {
        std::env::set_var("AC_TEST_VAR", "hello");
        let out = expand_env_vars("key: ${AC_TEST_VAR}");
        assert_eq!(out, "key: hello");
    }

    #[test]
    fn expands_default_when_unset() {
        std::env::remove_var("AC_TEST_UNSET");
        let out = expand_env_vars("key: ${AC_TEST_UNSET:-fallback}");
        assert_eq!(out, "key: fallback");
    }

    #[test]
    fn unset_with_no_default_becomes_empty() {
        std::env::remove_var("AC_TEST_UNSET2");
        let out = expand_env_vars("key: ${AC_TEST_UNSET2}");
        assert_eq!(out, "key: ");
    }

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
models:
  default_chat: main
  definitions:
    main:
      provider: openai
      model_name: gpt-4o
app:
  streaming:
    enabled: true
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.models.default_chat.as_deref(), Some("main"));
        assert_eq!(config.models.definitions["main"].max_tokens, 4096);
        assert!(config.app.streaming.enabled);
    }

    #[test]
    fn rejects_dangling_default_chat_alias() {
        let yaml = r#"
models:
  default_chat: missing
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid(_)));
    }
}
