//! `switchboard run`: execute one turn.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use switchboard_agent::{Orchestrator, ProviderPostProcessor, TurnEvent, TurnRequest};
use switchboard_config::AppConfig;
use switchboard_core::agent::ToolConfig;
use switchboard_core::provider::Provider;
use switchboard_providers::ReplayProvider;
use switchboard_tools::ToolRouter;
use tracing::{info, warn};

pub async fn run(config: &AppConfig, input: &Path, replay: Option<&Path>, stream: bool) -> anyhow::Result<()> {
    let request = super::read_request(input, config)?;

    let provider: Arc<dyn Provider> = match replay {
        Some(path) => {
            info!(file = %path.display(), "Replaying recorded completions");
            Arc::new(ReplayProvider::from_file(path)?)
        }
        None => switchboard_providers::build_from_config(config)?,
    };
    let orchestrator = Arc::new(build_orchestrator(config, &request, provider)?);

    if stream {
        let mut events = orchestrator.stream_turn(request);
        let mut failed = None;
        while let Some(event) = events.next().await {
            println!("{}", serde_json::to_string(&event)?);
            if let TurnEvent::Error { error, .. } = event {
                failed = Some(error);
            }
        }
        if let Some(error) = failed {
            anyhow::bail!(error);
        }
    } else {
        let response = orchestrator.run_turn(request).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}

/// Wire the provider, tool router and post-processor for this request.
pub fn build_orchestrator(
    config: &AppConfig,
    request: &TurnRequest,
    provider: Arc<dyn Provider>,
) -> anyhow::Result<Orchestrator> {
    let tools = typed_tools(request);
    let router = ToolRouter::from_config(&tools, &config.tools)?;

    Ok(Orchestrator::new(provider.clone())
        .with_tools(Arc::new(router))
        .with_post_processor(Arc::new(ProviderPostProcessor::new(provider))))
}

/// Tool configs that parse. Malformed entries are left for validation to
/// report when the turn runs.
fn typed_tools(request: &TurnRequest) -> Vec<ToolConfig> {
    let Some(entries) = request.tool_configs.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(tool) => Some(tool),
            Err(e) => {
                warn!("Skipping unparseable tool config for routing: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::message::{Message, MessageToolCall};

    fn request() -> TurnRequest {
        serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "Where is order 7?"}],
            "startAgent": "Support",
            "agentConfigs": [
                {"name": "Support", "instructions": "Help.", "model": "gpt-4o", "tools": ["lookup_order"]}
            ],
            "toolConfigs": [
                {"name": "lookup_order", "description": "Find an order", "parameters": {"type": "object"},
                 "mockTool": true, "mockInstructions": "Order {{id}} shipped yesterday."},
                {"name": "broken"}
            ],
        }))
        .unwrap()
    }

    #[test]
    fn malformed_tool_configs_are_skipped_for_routing() {
        let tools = typed_tools(&request());
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "lookup_order");
    }

    #[tokio::test]
    async fn replayed_turn_serves_mock_tool_locally() {
        let call = Message::assistant_tool_calls(vec![MessageToolCall::new("call_1", "lookup_order", r#"{"id":7}"#)]);
        let recording = serde_json::to_string(&vec![call, Message::assistant("It shipped yesterday.")]).unwrap();
        let provider = Arc::new(ReplayProvider::from_json(&recording).unwrap());

        let mut req = request();
        req.tool_configs = json!([
            {"name": "lookup_order", "description": "Find an order", "parameters": {"type": "object"},
             "mockTool": true, "mockInstructions": "Order {{id}} shipped yesterday."}
        ]);
        let orchestrator = build_orchestrator(&AppConfig::default(), &req, provider.clone()).unwrap();
        let response = orchestrator.run_turn(req).await.unwrap();

        let tool_result = response
            .messages
            .iter()
            .find(|m| m.tool_name.as_deref() == Some("lookup_order"))
            .unwrap();
        assert_eq!(tool_result.content.as_deref(), Some("Order 7 shipped yesterday."));
        assert_eq!(
            response.external_message().unwrap().content.as_deref(),
            Some("It shipped yesterday.")
        );
        assert_eq!(provider.remaining(), 0);
    }
}
