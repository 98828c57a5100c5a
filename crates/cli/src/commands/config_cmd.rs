//! `switchboard config`: print the effective configuration.

use switchboard_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", redacted(config).to_toml()?);
    Ok(())
}

/// A copy safe to print: secrets replaced, presence kept.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some(REDACTED.into());
    }
    if shown.tools.signing_secret.is_some() {
        shown.tools.signing_secret = Some(REDACTED.into());
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_never_reach_output() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-live-123".into());
        config.tools.signing_secret = Some("hush".into());

        let toml = redacted(&config).to_toml().unwrap();
        assert!(!toml.contains("sk-live-123"));
        assert!(!toml.contains("hush"));
        assert!(toml.contains(REDACTED));
        assert!(toml.contains("max_messages_per_turn"));
    }

    #[test]
    fn absent_secrets_stay_absent() {
        let toml = redacted(&AppConfig::default()).to_toml().unwrap();
        assert!(!toml.contains(REDACTED));
    }
}
