//! `switchboard validate`: pre-turn checks without any model call.

use std::path::Path;

use serde_json::{Value, json};
use switchboard_agent::TurnRequest;
use switchboard_agent::validation::{self, TurnConfigs};
use switchboard_config::AppConfig;
use switchboard_core::agent::AgentConfig;
use switchboard_core::error::ErrorType;

pub fn run(config: &AppConfig, input: &Path) -> anyhow::Result<()> {
    let request = super::read_request(input, config)?;
    let report = report(&request);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report["valid"] == false {
        anyhow::bail!("turn request is invalid");
    }
    Ok(())
}

/// Everything the orchestrator would reject before its first completion.
pub fn report(request: &TurnRequest) -> Value {
    if let Err(e) = request.settings.validate() {
        return invalid(e.to_string(), ErrorType::Fatal);
    }

    let configs = match validation::validate_configs(
        &request.agent_configs,
        &request.tool_configs,
        &request.prompt_configs,
        &request.start_agent,
    ) {
        Ok(configs) => configs,
        Err(e) => return invalid(e.to_string(), e.error_type()),
    };

    if let Err(e) = validation::check_turn_limit(&request.messages, request.settings.max_overall_turns) {
        return invalid(e.to_string(), e.error_type());
    }

    summary(&configs)
}

fn invalid(error: String, kind: ErrorType) -> Value {
    json!({ "valid": false, "error": error, "errorType": kind })
}

fn summary(configs: &TurnConfigs) -> Value {
    let name = |agent: &Option<AgentConfig>| agent.as_ref().map(|a| a.name.clone());
    json!({
        "valid": true,
        "agents": configs.agents.iter().map(|a| json!({
            "name": a.name,
            "children": a.connected_agents,
            "tools": a.tools,
        })).collect::<Vec<_>>(),
        "tools": configs.tools.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
        "escalation": name(&configs.escalation),
        "postProcessing": name(&configs.post_processing),
        "guardrails": name(&configs.guardrails),
    })
}
