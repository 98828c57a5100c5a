//! Cross-turn state.
//!
//! The engine keeps nothing between turns. Whatever the next turn needs
//! (who spoke last, each agent's localized history, who delegated to whom)
//! travels to the caller in a [`StateSnapshot`] and comes back with the
//! next request.

use serde::{Deserialize, Serialize};
use switchboard_core::message::Message;

use crate::graph::AgentGraph;
use crate::history::HistoryStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_agent_name: Option<String>,

    #[serde(default)]
    pub agent_data: Vec<AgentState>,
}

/// One agent's slice of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub name: String,

    #[serde(default)]
    pub history: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_parent_name: Option<String>,
}

impl StateSnapshot {
    pub fn agent(&self, name: &str) -> Option<&AgentState> {
        self.agent_data.iter().find(|a| a.name == name)
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.agent(name)?.most_recent_parent_name.as_deref()
    }

    /// Capture the graph and histories at the end of a turn, in graph order.
    pub fn capture(graph: &AgentGraph, histories: &HistoryStore, last_agent_name: &str) -> Self {
        let agent_data = graph
            .iter()
            .map(|agent| AgentState {
                name: agent.name.clone(),
                history: histories.get(&agent.name).to_vec(),
                most_recent_parent_name: agent
                    .most_recent_parent
                    .and_then(|p| graph.get(p))
                    .map(|p| p.name.clone()),
            })
            .collect();

        Self {
            last_agent_name: Some(last_agent_name.to_string()),
            agent_data,
        }
    }
}
