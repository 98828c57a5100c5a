//! Single retry of a failed turn through the escalation agent.

use serde_json::Map;
use switchboard_config::EngineSettings;
use switchboard_core::agent::{AgentConfig, AgentRole, ToolConfig};
use switchboard_core::provider::Provider;
use switchboard_core::tool::ToolDispatcher;
use tokio::sync::mpsc;
use tracing::info;

use crate::graph::{AgentId, GraphBuilder};
use crate::history::HistoryStore;
use crate::instructions;
use crate::loop_runner::{EngineOptions, Response, TurnEngine, TurnFailure};
use crate::state::StateSnapshot;
use crate::stream_event::TurnEvent;

/// The escalation agent as it runs: no relations, error context appended.
pub fn escalation_agent(config: &AgentConfig, error: &str, last_user_message: Option<&str>) -> AgentConfig {
    let mut agent = config.clone();
    agent.connected_agents.clear();
    agent.role = AgentRole::Normal;
    agent
        .instructions
        .push_str(&instructions::escalation_instructions(error, last_user_message));
    agent
}

/// Everything the escalation run needs.
pub struct Escalation<'a> {
    pub config: &'a AgentConfig,
    pub tools: &'a [ToolConfig],
    pub error: &'a str,
    pub last_user_message: Option<&'a str>,
}

impl Escalation<'_> {
    /// Run the escalation agent alone with empty prior messages.
    ///
    /// A failure here is final: the caller turns it into a fatal error.
    pub async fn run(
        &self,
        provider: &dyn Provider,
        dispatcher: &dyn ToolDispatcher,
        settings: &EngineSettings,
        events: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Response {
        info!(agent = %self.config.name, error = %self.error, "Escalating failed turn");

        let agent = escalation_agent(self.config, self.error, self.last_user_message);
        let agents = [agent];
        let mut graph = match GraphBuilder::new(&agents, self.tools, dispatcher).build(&StateSnapshot::default()) {
            Ok(graph) => graph,
            Err(e) => return Response::failed(AgentId(0), TurnFailure::fatal(e.to_string())),
        };
        let mut histories = HistoryStore::default();

        TurnEngine::new(provider, dispatcher, EngineOptions::for_escalation(settings))
            .with_external_tools(graph.external_tool_names())
            .with_events(events)
            .run(&mut graph, &mut histories, AgentId(0), Vec::new(), Map::new())
            .await
    }
}
