//! The per-turn agent forest.
//!
//! Records live in an arena and refer to one another by [`AgentId`], so the
//! parent/child cycles the forest needs never turn into shared ownership.
//! A graph is rebuilt from configuration at the start of every turn; only
//! the most-recent-parent links survive between turns, via the state snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::{Index, IndexMut};

use switchboard_core::agent::{AgentConfig, AgentRole, ControlType, ToolConfig};
use switchboard_core::error::{Error, Result};
use switchboard_core::provider::ToolDefinition;
use switchboard_core::tool::ToolDispatcher;
use tracing::{debug, warn};

use crate::instructions;
use crate::state::StateSnapshot;
use crate::transfer::{TransferTarget, transfer_tool_name};

/// Index of an agent record inside its [`AgentGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub usize);

/// The runtime form of one agent for the duration of a turn.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub role: AgentRole,
    pub description: String,
    /// Final instructions, including the generated handoff text
    pub instructions: String,
    pub model: String,
    /// Tools this process executes during the turn
    pub internal_tools: Vec<ToolDefinition>,
    /// Tools returned to the caller for execution
    pub external_tools: Vec<ToolDefinition>,
    pub respond_to_user: bool,
    pub control_type: ControlType,
    pub tool_choice: Option<String>,
    pub parallel_tool_calls: bool,

    /// Children in declared order
    pub children_names: Vec<String>,
    pub children: HashMap<String, AgentId>,
    /// The entry parents use to reach this agent
    pub transfer_function: TransferTarget,
    /// Child name -> that child's transfer function
    pub child_functions: HashMap<String, TransferTarget>,
    /// Parent name -> the give-up entry leading back to that parent
    pub candidate_parent_functions: HashMap<String, TransferTarget>,
    /// The give-up entry currently offered to the model, if any
    pub parent_function: Option<TransferTarget>,
    pub most_recent_parent: Option<AgentId>,
}

impl AgentRecord {
    fn from_config(id: AgentId, config: &AgentConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            role: config.role,
            description: config.description.clone(),
            instructions: config.instructions.clone(),
            model: config.model.clone(),
            internal_tools: Vec::new(),
            external_tools: Vec::new(),
            respond_to_user: config.respond_to_user,
            control_type: config.control_type,
            tool_choice: config.tool_choice.clone(),
            parallel_tool_calls: config.parallel_tool_calls,
            children_names: Vec::new(),
            children: HashMap::new(),
            transfer_function: TransferTarget::to_child(id),
            child_functions: HashMap::new(),
            candidate_parent_functions: HashMap::new(),
            parent_function: None,
            most_recent_parent: None,
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children_names.is_empty()
    }
}

/// Arena of agent records for one turn.
#[derive(Debug, Clone, Default)]
pub struct AgentGraph {
    agents: Vec<AgentRecord>,
    by_name: HashMap<String, AgentId>,
}

impl AgentGraph {
    pub fn id_of(&self, name: &str) -> Option<AgentId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: AgentId) -> Option<&AgentRecord> {
        self.agents.get(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<&AgentRecord> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Name of the agent that most recently delegated to `name`.
    pub fn parent_name(&self, name: &str) -> Option<&str> {
        let record = self.by_name(name)?;
        let parent = record.most_recent_parent?;
        self.get(parent).map(|p| p.name.as_str())
    }

    /// Names of every tool the caller executes, across all agents.
    pub fn external_tool_names(&self) -> HashSet<String> {
        self.agents
            .iter()
            .flat_map(|a| a.external_tools.iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Record that `parent` handed control to `child` and bind the child's
    /// give-up function to that parent.
    pub fn bind_parent(&mut self, child: AgentId, parent: AgentId) -> Result<()> {
        let parent_name = self[parent].name.clone();
        let record = &mut self[child];
        let Some(function) = record.candidate_parent_functions.get(&parent_name).copied() else {
            return Err(Error::Invariant(format!(
                "agent '{}' has no transfer back to '{}'",
                record.name, parent_name
            )));
        };
        record.most_recent_parent = Some(parent);
        record.parent_function = Some(function);
        Ok(())
    }
}

impl Index<AgentId> for AgentGraph {
    type Output = AgentRecord;

    fn index(&self, id: AgentId) -> &AgentRecord {
        &self.agents[id.0]
    }
}

impl IndexMut<AgentId> for AgentGraph {
    fn index_mut(&mut self, id: AgentId) -> &mut AgentRecord {
        &mut self.agents[id.0]
    }
}

/// Builds an [`AgentGraph`] from typed configuration and the prior turn's state.
pub struct GraphBuilder<'a> {
    agents: &'a [AgentConfig],
    tools: &'a [ToolConfig],
    local_tools: &'a dyn ToolDispatcher,
    children_aware_of_parent: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        agents: &'a [AgentConfig],
        tools: &'a [ToolConfig],
        local_tools: &'a dyn ToolDispatcher,
    ) -> Self {
        Self {
            agents,
            tools,
            local_tools,
            children_aware_of_parent: false,
        }
    }

    pub fn children_aware_of_parent(mut self, aware: bool) -> Self {
        self.children_aware_of_parent = aware;
        self
    }

    pub fn build(&self, prior: &StateSnapshot) -> Result<AgentGraph> {
        let mut graph = AgentGraph::default();

        for (index, config) in self.agents.iter().enumerate() {
            let id = AgentId(index);
            if graph.by_name.insert(config.name.clone(), id).is_some() {
                return Err(Error::config(format!("duplicate agent name '{}'", config.name)));
            }
            let mut record = AgentRecord::from_config(id, config);
            self.attach_tools(&mut record, config);
            graph.agents.push(record);
        }

        self.link_children(&mut graph)?;
        self.restore_parents(&mut graph, prior);
        self.append_instructions(&mut graph);

        // Bind give-up functions for every restored parent link.
        let restored: Vec<(AgentId, AgentId)> = graph
            .agents
            .iter()
            .filter_map(|a| a.most_recent_parent.map(|p| (a.id, p)))
            .collect();
        for (child, parent) in restored {
            graph.bind_parent(child, parent)?;
        }

        debug!(agents = graph.len(), "Agent graph built");
        Ok(graph)
    }

    fn attach_tools(&self, record: &mut AgentRecord, config: &AgentConfig) {
        for tool_name in &config.tools {
            let Some(tool) = self.tools.iter().find(|t| &t.name == tool_name) else {
                warn!(agent = %config.name, tool = %tool_name, "Agent references unknown tool, skipping");
                continue;
            };
            let definition = ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            };
            self.classify(record, definition);
        }

        if config.has_rag_sources {
            self.classify(record, instructions::retrieval_tool());
            record.instructions.push_str(&instructions::retrieval_instructions());
        }
    }

    fn classify(&self, record: &mut AgentRecord, definition: ToolDefinition) {
        if self.local_tools.handles(&definition.name) {
            record.internal_tools.push(definition);
        } else {
            record.external_tools.push(definition);
        }
    }

    fn link_children(&self, graph: &mut AgentGraph) -> Result<()> {
        for (index, config) in self.agents.iter().enumerate() {
            let parent = AgentId(index);
            let mut function_names = BTreeSet::new();

            for child_name in &config.connected_agents {
                let Some(child) = graph.id_of(child_name) else {
                    warn!(agent = %config.name, child = %child_name, "Connected agent not found, skipping");
                    continue;
                };
                if child == parent || graph[parent].children.contains_key(child_name) {
                    continue;
                }
                if !function_names.insert(transfer_tool_name(child_name)) {
                    return Err(Error::config(format!(
                        "agent '{}' has two children whose transfer functions are both named '{}'",
                        config.name,
                        transfer_tool_name(child_name)
                    )));
                }

                let transfer = graph[child].transfer_function;
                let record = &mut graph[parent];
                record.children_names.push(child_name.clone());
                record.children.insert(child_name.clone(), child);
                record.child_functions.insert(child_name.clone(), transfer);

                graph[child]
                    .candidate_parent_functions
                    .insert(config.name.clone(), TransferTarget::to_parent(parent));
            }
        }
        Ok(())
    }

    /// Links whose edge no longer exists in configuration are dropped.
    fn restore_parents(&self, graph: &mut AgentGraph, prior: &StateSnapshot) {
        for agent_state in &prior.agent_data {
            let Some(parent_name) = agent_state.most_recent_parent_name.as_deref() else {
                continue;
            };
            let (Some(child), Some(parent)) = (graph.id_of(&agent_state.name), graph.id_of(parent_name))
            else {
                warn!(agent = %agent_state.name, parent = %parent_name, "Stale parent link in state, skipping");
                continue;
            };
            if !graph[parent].children.contains_key(&agent_state.name) {
                warn!(agent = %agent_state.name, parent = %parent_name, "Parent no longer connects to agent, dropping link");
                continue;
            }
            graph[child].most_recent_parent = Some(parent);
        }
    }

    fn append_instructions(&self, graph: &mut AgentGraph) {
        for index in 0..graph.len() {
            let id = AgentId(index);

            if graph[id].has_children() {
                let children: Vec<(String, String, String)> = graph[id]
                    .children_names
                    .iter()
                    .map(|name| {
                        let description = graph.by_name(name).map(|c| c.description.clone()).unwrap_or_default();
                        (name.clone(), description, transfer_tool_name(name))
                    })
                    .collect();
                let text = instructions::transfer_instructions(&children);
                graph[id].instructions.push_str(&text);
            }

            if !graph[id].candidate_parent_functions.is_empty() {
                let mut parents: Vec<String> = graph[id].candidate_parent_functions.keys().cloned().collect();
                parents.sort();
                let text = instructions::give_up_instructions(&parents, self.children_aware_of_parent);
                graph[id].instructions.push_str(&text);
            }

            if !graph[id].respond_to_user {
                graph[id].instructions.push_str(instructions::INTERNAL_AGENT_INSTRUCTIONS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentState;
    use async_trait::async_trait;
    use switchboard_core::error::ToolError;
    use switchboard_core::tool::NoLocalTools;

    struct LocalLookup;

    #[async_trait]
    impl ToolDispatcher for LocalLookup {
        fn handles(&self, name: &str) -> bool {
            name == "lookup_order"
        }

        async fn dispatch(&self, _name: &str, _arguments: &str) -> std::result::Result<String, ToolError> {
            Ok("{}".into())
        }
    }

    fn configs() -> Vec<AgentConfig> {
        vec![
            AgentConfig::new("Router", "Route requests.", "gpt-4o").with_children(["Billing", "Ghost"]),
            AgentConfig::new("Billing", "Handle billing.", "gpt-4o").with_tools(["lookup_order", "issue_refund", "missing"]),
        ]
    }

    fn tools() -> Vec<ToolConfig> {
        vec![
            ToolConfig::new("lookup_order", "Find an order", serde_json::json!({"type": "object"})),
            ToolConfig::new("issue_refund", "Refund an order", serde_json::json!({"type": "object"})),
        ]
    }

    #[test]
    fn unknown_children_and_tools_are_skipped() {
        let agents = configs();
        let tools = tools();
        let graph = GraphBuilder::new(&agents, &tools, &NoLocalTools)
            .build(&StateSnapshot::default())
            .unwrap();

        let router = graph.by_name("Router").unwrap();
        assert_eq!(router.children_names, vec!["Billing".to_string()]);

        let billing = graph.by_name("Billing").unwrap();
        assert_eq!(billing.external_tools.len(), 2);
        assert!(billing.internal_tools.is_empty());
    }

    #[test]
    fn locally_served_tools_are_internal() {
        let agents = configs();
        let tools = tools();
        let graph = GraphBuilder::new(&agents, &tools, &LocalLookup)
            .build(&StateSnapshot::default())
            .unwrap();

        let billing = graph.by_name("Billing").unwrap();
        assert_eq!(billing.internal_tools[0].name, "lookup_order");
        assert_eq!(billing.external_tools[0].name, "issue_refund");
        assert!(graph.external_tool_names().contains("issue_refund"));
    }

    #[test]
    fn transfer_registry_is_wired_both_ways() {
        let agents = configs();
        let graph = GraphBuilder::new(&agents, &[], &NoLocalTools)
            .build(&StateSnapshot::default())
            .unwrap();
        let router = graph.id_of("Router").unwrap();
        let billing = graph.id_of("Billing").unwrap();

        assert_eq!(graph[router].child_functions["Billing"], TransferTarget::to_child(billing));
        assert_eq!(
            graph[billing].candidate_parent_functions["Router"],
            TransferTarget::to_parent(router)
        );
        assert!(graph[billing].parent_function.is_none());
        assert!(graph[router].instructions.contains("transfer_to_billing"));
        assert!(graph[billing].instructions.contains("give_up_chat_control"));
    }

    #[test]
    fn prior_parent_links_are_restored_and_bound() {
        let agents = configs();
        let prior = StateSnapshot {
            last_agent_name: Some("Billing".into()),
            agent_data: vec![AgentState {
                name: "Billing".into(),
                history: vec![],
                most_recent_parent_name: Some("Router".into()),
            }],
        };
        let graph = GraphBuilder::new(&agents, &[], &NoLocalTools).build(&prior).unwrap();
        let router = graph.id_of("Router").unwrap();
        let billing = graph.id_of("Billing").unwrap();

        assert_eq!(graph[billing].most_recent_parent, Some(router));
        assert_eq!(graph[billing].parent_function, Some(TransferTarget::to_parent(router)));
        assert_eq!(graph.parent_name("Billing"), Some("Router"));
    }

    #[test]
    fn stale_parent_link_is_dropped() {
        let agents = vec![
            AgentConfig::new("Router", "r", "m"),
            AgentConfig::new("Billing", "b", "m"),
        ];
        let prior = StateSnapshot {
            last_agent_name: None,
            agent_data: vec![AgentState {
                name: "Billing".into(),
                history: vec![],
                most_recent_parent_name: Some("Router".into()),
            }],
        };
        let graph = GraphBuilder::new(&agents, &[], &NoLocalTools).build(&prior).unwrap();
        assert!(graph.by_name("Billing").unwrap().most_recent_parent.is_none());
    }

    #[test]
    fn colliding_transfer_names_are_rejected() {
        let agents = vec![
            AgentConfig::new("Router", "r", "m").with_children(["Tech Support", "TechSupport"]),
            AgentConfig::new("Tech Support", "a", "m"),
            AgentConfig::new("TechSupport", "b", "m"),
        ];
        let err = GraphBuilder::new(&agents, &[], &NoLocalTools)
            .build(&StateSnapshot::default())
            .unwrap_err();
        assert!(err.to_string().contains("transfer_to_tech_support"));
    }

    #[test]
    fn retrieval_tool_is_added_for_rag_agents() {
        let mut agent = AgentConfig::new("Docs", "Answer from docs.", "m");
        agent.has_rag_sources = true;
        let agents = vec![agent];
        let graph = GraphBuilder::new(&agents, &[], &NoLocalTools)
            .build(&StateSnapshot::default())
            .unwrap();
        let docs = graph.by_name("Docs").unwrap();
        assert_eq!(docs.external_tools[0].name, instructions::RETRIEVAL_TOOL_NAME);
        assert!(docs.instructions.contains(instructions::RETRIEVAL_TOOL_NAME));
    }

    #[test]
    fn internal_agents_are_told_to_hand_back() {
        let mut agent = AgentConfig::new("Worker", "Do work.", "m");
        agent.respond_to_user = false;
        let agents = vec![AgentConfig::new("Lead", "Lead.", "m").with_children(["Worker"]), agent];
        let graph = GraphBuilder::new(&agents, &[], &NoLocalTools)
            .build(&StateSnapshot::default())
            .unwrap();
        assert!(
            graph
                .by_name("Worker")
                .unwrap()
                .instructions
                .ends_with(instructions::INTERNAL_AGENT_INSTRUCTIONS)
        );
    }
}
