//! Per-tool routing between the mock and webhook backends.

use async_trait::async_trait;
use switchboard_config::ToolBackendConfig;
use switchboard_core::agent::ToolConfig;
use switchboard_core::error::ToolError;
use switchboard_core::tool::ToolDispatcher;
use tracing::debug;

use crate::mock::MockToolDispatcher;
use crate::webhook::WebhookToolDispatcher;

/// Serves mock tools locally and forwards the rest to the webhook.
///
/// A tool neither backend claims stays external: the engine hands the call
/// back to the caller.
#[derive(Default)]
pub struct ToolRouter {
    mocks: MockToolDispatcher,
    webhook: Option<WebhookToolDispatcher>,
}

impl ToolRouter {
    pub fn new(mocks: MockToolDispatcher, webhook: Option<WebhookToolDispatcher>) -> Self {
        Self { mocks, webhook }
    }

    /// Route the given tools according to the `[tools]` config section.
    ///
    /// Mock tools are served locally when `local_mocks` is on. Every other
    /// tool goes to the webhook when one is configured.
    pub fn from_config(tools: &[ToolConfig], backend: &ToolBackendConfig) -> Result<Self, ToolError> {
        let mocks = if backend.local_mocks {
            MockToolDispatcher::from_configs(tools)
        } else {
            MockToolDispatcher::new()
        };

        let webhook = match &backend.webhook_url {
            Some(url) => {
                let remote = tools.iter().filter(|t| !mocks.handles(&t.name)).map(|t| t.name.clone());
                Some(
                    WebhookToolDispatcher::new(url.clone(), backend.signing_secret.clone(), backend.timeout_secs)?
                        .with_tools(remote),
                )
            }
            None => None,
        };

        debug!(
            mocks = mocks.len(),
            webhook = webhook.is_some(),
            "Tool router configured"
        );
        Ok(Self { mocks, webhook })
    }

    fn backend(&self, name: &str) -> Option<&dyn ToolDispatcher> {
        if self.mocks.handles(name) {
            return Some(&self.mocks);
        }
        self.webhook
            .as_ref()
            .filter(|w| w.handles(name))
            .map(|w| w as &dyn ToolDispatcher)
    }
}

#[async_trait]
impl ToolDispatcher for ToolRouter {
    fn handles(&self, name: &str) -> bool {
        self.backend(name).is_some()
    }

    async fn dispatch(&self, name: &str, arguments: &str) -> std::result::Result<String, ToolError> {
        match self.backend(name) {
            Some(backend) => backend.dispatch(name, arguments).await,
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}
