//! Completion provider implementations for Switchboard.
//!
//! All providers implement the `switchboard_core::Provider` trait. The turn
//! engine never knows which one answers.

pub mod openai_compat;
pub mod replay;

pub use openai_compat::OpenAiCompatProvider;
pub use replay::ReplayProvider;

use std::sync::Arc;

use switchboard_config::AppConfig;
use switchboard_core::error::ProviderError;
use switchboard_core::provider::Provider;

/// Build the live provider described by the `[provider]` section.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = OpenAiCompatProvider::from_config(&config.provider)?;
    tracing::debug!(
        provider = %config.provider.name,
        base_url = %config.provider.base_url,
        "Provider configured"
    );
    Ok(Arc::new(provider))
}
