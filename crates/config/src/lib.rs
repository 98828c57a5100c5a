//! Configuration loading, validation, and management for Switchboard.
//!
//! Loads configuration from `~/.switchboard/config.toml` with environment
//! variable overrides. Validates all settings at load time.
//!
//! The `[engine]` section doubles as the per-turn settings block: callers
//! embed an [`EngineSettings`] in every turn request, and any field they
//! omit falls back to the same defaults used here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Turn engine feature flags and limits
    #[serde(default)]
    pub engine: EngineSettings,

    /// Completion provider connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Tool backend settings
    #[serde(default)]
    pub tools: ToolBackendConfig,
}

/// Feature flags and limits that shape one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Give every agent its own history instead of the full conversation
    #[serde(default = "default_true")]
    pub localize_history: bool,

    /// Always hand the first message of a turn to the start agent
    #[serde(default)]
    pub start_turn_with_start_agent: bool,

    /// Tell children which agent delegated to them
    #[serde(default)]
    pub children_aware_of_parent: bool,

    /// Copy a child's history up to its ancestors
    #[serde(default = "default_true")]
    pub parent_has_child_history: bool,

    /// Return fatal errors as an in-conversation message instead of raising
    #[serde(default = "default_true")]
    pub error_tool_call: bool,

    /// Retry failed turns through the escalation agent
    #[serde(default = "default_true")]
    pub escalate_errors: bool,

    /// Execute internal tool calls (handoffs, local tools)
    #[serde(default = "default_true")]
    pub execute_tools: bool,

    #[serde(default = "default_max_messages_per_turn")]
    pub max_messages_per_turn: usize,

    #[serde(default = "default_max_messages_per_error_escalation_turn")]
    pub max_messages_per_error_escalation_turn: usize,

    /// External responses allowed in one conversation
    #[serde(default = "default_max_overall_turns")]
    pub max_overall_turns: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_messages_per_turn() -> usize {
    20
}
fn default_max_messages_per_error_escalation_turn() -> usize {
    4
}
fn default_max_overall_turns() -> usize {
    25
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            localize_history: true,
            start_turn_with_start_agent: false,
            children_aware_of_parent: false,
            parent_has_child_history: true,
            error_tool_call: true,
            escalate_errors: true,
            execute_tools: true,
            max_messages_per_turn: default_max_messages_per_turn(),
            max_messages_per_error_escalation_turn: default_max_messages_per_error_escalation_turn(),
            max_overall_turns: default_max_overall_turns(),
        }
    }
}

impl EngineSettings {
    /// Validate the limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_messages_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "max_messages_per_turn must be > 0".into(),
            ));
        }
        if self.max_messages_per_error_escalation_turn == 0 {
            return Err(ConfigError::ValidationError(
                "max_messages_per_error_escalation_turn must be > 0".into(),
            ));
        }
        if self.max_overall_turns == 0 {
            return Err(ConfigError::ValidationError(
                "max_overall_turns must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Short name used to key token usage
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Replaces the model named in every agent config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key: None,
            model_override: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolBackendConfig {
    /// Endpoint that receives non-mock tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// HMAC secret used to sign webhook bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Serve mock tools in-process instead of forwarding them to the caller
    #[serde(default = "default_true")]
    pub local_mocks: bool,
}

fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolBackendConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            signing_secret: None,
            timeout_secs: default_tool_timeout(),
            local_mocks: true,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_override", &self.model_override)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for ToolBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBackendConfig")
            .field("webhook_url", &self.webhook_url)
            .field("signing_secret", &redact(&self.signing_secret))
            .field("timeout_secs", &self.timeout_secs)
            .field("local_mocks", &self.local_mocks)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchboard/config.toml).
    ///
    /// Environment variables override the file:
    /// - `SWITCHBOARD_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `SWITCHBOARD_MODEL`
    /// - `SWITCHBOARD_BASE_URL`
    /// - `SWITCHBOARD_WEBHOOK_URL`
    /// - `SWITCHBOARD_SIGNING_SECRET`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SWITCHBOARD_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("SWITCHBOARD_MODEL") {
            self.provider.model_override = Some(model);
        }
        if let Some(url) = lookup("SWITCHBOARD_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(url) = lookup("SWITCHBOARD_WEBHOOK_URL") {
            self.tools.webhook_url = Some(url);
        }
        if let Some(secret) = lookup("SWITCHBOARD_SIGNING_SECRET") {
            self.tools.signing_secret = Some(secret);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchboard")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.provider.timeout_secs == 0 || self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be > 0 seconds".into(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_settings_match_documented_defaults() {
        let s = EngineSettings::default();
        assert!(s.localize_history);
        assert!(!s.start_turn_with_start_agent);
        assert!(!s.children_aware_of_parent);
        assert!(s.parent_has_child_history);
        assert!(s.error_tool_call);
        assert!(s.escalate_errors);
        assert!(s.execute_tools);
        assert_eq!(s.max_messages_per_turn, 20);
        assert_eq!(s.max_messages_per_error_escalation_turn, 4);
        assert_eq!(s.max_overall_turns, 25);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let s: EngineSettings =
            serde_json::from_str(r#"{"localize_history":false,"max_messages_per_turn":3}"#).unwrap();
        assert!(!s.localize_history);
        assert_eq!(s.max_messages_per_turn, 3);
        assert!(s.escalate_errors);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine, config.engine);
        assert_eq!(parsed.provider.base_url, config.provider.base_url);
    }

    #[test]
    fn zero_limit_rejected() {
        let config = AppConfig {
            engine: EngineSettings {
                max_messages_per_turn: 0,
                ..EngineSettings::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.engine, EngineSettings::default());
        assert_eq!(config.provider.name, "openai");
    }

    #[test]
    fn load_from_file_reads_engine_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[engine]
children_aware_of_parent = true
max_overall_turns = 5

[tools]
webhook_url = "https://tools.example.com/call"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert!(config.engine.children_aware_of_parent);
        assert_eq!(config.engine.max_overall_turns, 5);
        assert_eq!(
            config.tools.webhook_url.as_deref(),
            Some("https://tools.example.com/call")
        );
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine\nbroken").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_take_priority() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-fallback"),
            ("SWITCHBOARD_API_KEY", "sk-primary"),
            ("SWITCHBOARD_SIGNING_SECRET", "s3cret"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-primary"));
        assert_eq!(config.tools.signing_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-live-123".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-live-123"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
