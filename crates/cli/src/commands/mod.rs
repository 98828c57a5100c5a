pub mod config_cmd;
pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use switchboard_agent::TurnRequest;
use switchboard_config::AppConfig;

/// Load the config file (default location unless `path` is given), then
/// apply environment overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => return Ok(AppConfig::load()?),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Parse a turn request. A request without a `settings` object runs with
/// the `[engine]` section of the config.
pub fn parse_request(json: &str, config: &AppConfig) -> anyhow::Result<TurnRequest> {
    let value: serde_json::Value = serde_json::from_str(json).context("turn request is not valid JSON")?;
    let has_settings = value.get("settings").is_some_and(|s| !s.is_null());
    let mut request: TurnRequest = serde_json::from_value(value).context("malformed turn request")?;
    if !has_settings {
        request.settings = config.engine.clone();
    }
    Ok(request)
}

pub fn read_request(path: &Path, config: &AppConfig) -> anyhow::Result<TurnRequest> {
    let json = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    parse_request(&json, config)
}
