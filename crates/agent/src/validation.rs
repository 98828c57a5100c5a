//! Pre-turn validation.
//!
//! Configuration arrives as raw JSON so that shape errors (not a list,
//! missing keys) can be reported precisely before any typed parsing. Every
//! structural check here is fatal; only the overall-turn limit escalates.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::Value;
use switchboard_core::agent::{AgentConfig, AgentRole, PromptConfig, ToolConfig};
use switchboard_core::error::ValidationError;
use switchboard_core::message::Message;

const AGENT_KEYS: [&str; 3] = ["name", "instructions", "model"];
const TOOL_KEYS: [&str; 2] = ["name", "parameters"];

/// Configuration that passed validation, with special-role agents split out.
#[derive(Debug, Clone, Default)]
pub struct TurnConfigs {
    /// Agents that take part in the graph
    pub agents: Vec<AgentConfig>,
    pub tools: Vec<ToolConfig>,
    pub prompts: Vec<PromptConfig>,
    pub escalation: Option<AgentConfig>,
    pub post_processing: Option<AgentConfig>,
    /// Recognised, never invoked
    pub guardrails: Option<AgentConfig>,
}

pub fn validate_configs(
    agents: &Value,
    tools: &Value,
    prompts: &Value,
    start_agent: &str,
) -> Result<TurnConfigs, ValidationError> {
    let raw_agents = as_sequence(agents, "agent_configs")?;
    let raw_tools = as_sequence(tools, "tool_configs")?;
    let raw_prompts = as_sequence(prompts, "prompt_configs")?;

    if raw_agents.is_empty() {
        return Err(ValidationError::NoAgents);
    }

    for role in ["escalation", "post_processing", "guardrails"] {
        let count = raw_agents.iter().filter(|a| raw_role(a) == Some(role)).count();
        if count > 1 {
            return Err(ValidationError::DuplicateRole {
                role: role.to_string(),
                count,
            });
        }
    }

    check_keys(raw_agents, "Agent", &AGENT_KEYS)?;
    check_keys(raw_tools, "Tool", &TOOL_KEYS)?;

    let agents: Vec<AgentConfig> = parse_all(raw_agents, "Agent")?;
    let tools: Vec<ToolConfig> = parse_all(raw_tools, "Tool")?;
    let prompts: Vec<PromptConfig> = parse_all(raw_prompts, "Prompt")?;

    let mut seen = HashSet::new();
    for agent in &agents {
        if !seen.insert(agent.name.as_str()) {
            return Err(ValidationError::DuplicateAgent(agent.name.clone()));
        }
    }
    if !agents.iter().any(|a| a.name == start_agent) {
        return Err(ValidationError::UnknownStartAgent(start_agent.to_string()));
    }
    if let Some(path) = detect_cycle(&agents) {
        return Err(ValidationError::Cycle { path });
    }

    let mut configs = TurnConfigs {
        tools,
        prompts,
        ..Default::default()
    };
    for agent in agents {
        match agent.role {
            AgentRole::Escalation => configs.escalation = Some(agent),
            AgentRole::PostProcessing => configs.post_processing = Some(agent),
            AgentRole::Guardrails => configs.guardrails = Some(agent),
            AgentRole::Normal => configs.agents.push(agent),
        }
    }
    if !configs.agents.iter().any(|a| a.name == start_agent) {
        return Err(ValidationError::UnknownStartAgent(start_agent.to_string()));
    }
    Ok(configs)
}

/// Escalate once the conversation has produced `max_overall_turns`
/// user-facing messages.
pub fn check_turn_limit(messages: &[Message], max_overall_turns: usize) -> Result<(), ValidationError> {
    let external = messages.iter().filter(|m| m.is_external()).count();
    if external >= max_overall_turns {
        return Err(ValidationError::MaxOverallTurns {
            limit: max_overall_turns,
        });
    }
    Ok(())
}

/// Find a directed cycle among connected agents.
///
/// Returns the agents on the cycle in traversal order, starting from the
/// first agent revisited. Unknown agent names are ignored here; the graph
/// builder skips them.
pub fn detect_cycle(agents: &[AgentConfig]) -> Option<Vec<String>> {
    let edges: HashMap<&str, &[String]> = agents
        .iter()
        .map(|a| (a.name.as_str(), a.connected_agents.as_slice()))
        .collect();

    let mut done = HashSet::new();
    for agent in agents {
        let mut path = Vec::new();
        if let Some(cycle) = visit(&agent.name, &edges, &mut path, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, &'a [String]>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if done.contains(node) {
        return None;
    }
    path.push(node);

    for child in edges.get(node).copied().unwrap_or_default() {
        let child = child.as_str();
        if let Some(start) = path.iter().position(|n| *n == child) {
            return Some(path[start..].iter().map(|n| n.to_string()).collect());
        }
        if edges.contains_key(child)
            && let Some(cycle) = visit(child, edges, path, done)
        {
            return Some(cycle);
        }
    }

    path.pop();
    done.insert(node);
    None
}

fn as_sequence<'a>(value: &'a Value, field: &'static str) -> Result<&'a [Value], ValidationError> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_object) => Ok(items),
        _ => Err(ValidationError::NotASequence { field }),
    }
}

fn raw_role(agent: &Value) -> Option<&str> {
    match agent.get("role")?.as_str()? {
        "post_process" => Some("post_processing"),
        role => Some(role),
    }
}

fn label(record: &Value, index: usize) -> String {
    record
        .get("name")
        .and_then(Value::as_str)
        .map(|name| format!("'{name}'"))
        .unwrap_or_else(|| format!("#{index}"))
}

fn check_keys(records: &[Value], kind: &'static str, required: &[&'static str]) -> Result<(), ValidationError> {
    for (index, record) in records.iter().enumerate() {
        let missing: Vec<&'static str> = required
            .iter()
            .copied()
            .filter(|key| record.get(key).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingKeys {
                kind,
                label: label(record, index),
                missing,
            });
        }
    }
    Ok(())
}

fn parse_all<T: DeserializeOwned>(records: &[Value], kind: &'static str) -> Result<Vec<T>, ValidationError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value(record.clone()).map_err(|e| ValidationError::Malformed {
                kind,
                label: label(record, index),
                reason: e.to_string(),
            })
        })
        .collect()
}
