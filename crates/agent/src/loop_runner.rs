//! The turn engine: one active agent at a time, completion → tools → switch.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value, json};
use switchboard_config::EngineSettings;
use switchboard_core::error::{Error, ErrorType};
use switchboard_core::message::{Message, MessageToolCall, ResponseType, Role};
use switchboard_core::provider::{CompletionRequest, Provider};
use switchboard_core::tool::ToolDispatcher;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::graph::{AgentGraph, AgentId};
use crate::history::HistoryStore;
use crate::stream_event::TurnEvent;
use crate::transfer::{self, TransferKind, TransferTarget};
use crate::usage::TokenUsage;

pub const MAX_MESSAGES_REACHED: &str = "Max messages per turn reached";

/// Knobs the engine reads during a run.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub localize_history: bool,
    pub parent_has_child_history: bool,
    pub children_aware_of_parent: bool,
    pub execute_tools: bool,
    pub max_messages: usize,
}

impl EngineOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            localize_history: settings.localize_history,
            parent_has_child_history: settings.parent_has_child_history,
            children_aware_of_parent: settings.children_aware_of_parent,
            execute_tools: settings.execute_tools,
            max_messages: settings.max_messages_per_turn,
        }
    }

    /// The single-agent rerun used after a failure.
    pub fn for_escalation(settings: &EngineSettings) -> Self {
        Self {
            localize_history: false,
            max_messages: settings.max_messages_per_error_escalation_turn,
            ..Self::from_settings(settings)
        }
    }
}

/// Why a run stopped early, and whether it may be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnFailure {
    pub kind: ErrorType,
    pub message: String,
}

impl TurnFailure {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorType::Fatal,
            message: message.into(),
        }
    }

    pub fn escalate(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorType::Escalate,
            message: message.into(),
        }
    }
}

/// What one engine run produced.
#[derive(Debug, Clone)]
pub struct Response {
    /// Messages appended to the log by this run, in order
    pub messages: Vec<Message>,
    /// The agent holding control when the run stopped
    pub agent: AgentId,
    pub context_variables: Map<String, Value>,
    pub tokens_used: TokenUsage,
    pub error: Option<TurnFailure>,
}

impl Response {
    /// A run that never started.
    pub fn failed(agent: AgentId, error: TurnFailure) -> Self {
        Self {
            messages: Vec::new(),
            agent,
            context_variables: Map::new(),
            tokens_used: TokenUsage::default(),
            error: Some(error),
        }
    }

    pub fn error_msg(&self) -> &str {
        self.error.as_ref().map_or("", |e| e.message.as_str())
    }
}

/// Drives completions for the active agent until the turn is terminal.
pub struct TurnEngine<'a> {
    provider: &'a dyn Provider,
    tools: &'a dyn ToolDispatcher,
    external_tools: HashSet<String>,
    options: EngineOptions,
    events: Option<&'a mpsc::Sender<TurnEvent>>,
}

impl<'a> TurnEngine<'a> {
    pub fn new(provider: &'a dyn Provider, tools: &'a dyn ToolDispatcher, options: EngineOptions) -> Self {
        Self {
            provider,
            tools,
            external_tools: HashSet::new(),
            options,
            events: None,
        }
    }

    /// Names of tools the caller executes. Calls to these end the turn.
    pub fn with_external_tools(mut self, names: HashSet<String>) -> Self {
        self.external_tools = names;
        self
    }

    /// Forward appended messages to a stream.
    ///
    /// Messages go out one behind: the newest is held until the next one is
    /// appended. The last message of a run is never sent here; the caller
    /// forwards it once its final form is known.
    pub fn with_events(mut self, events: Option<&'a mpsc::Sender<TurnEvent>>) -> Self {
        self.events = events;
        self
    }

    /// Run the turn starting with `start` in control.
    ///
    /// `log` is the conversation so far; only messages appended during the
    /// run are returned. Failures are reported on the [`Response`] so the
    /// partial output survives.
    pub async fn run(
        &self,
        graph: &mut AgentGraph,
        histories: &mut HistoryStore,
        start: AgentId,
        mut log: Vec<Message>,
        context_variables: Map<String, Value>,
    ) -> Response {
        let init_len = log.len();
        let mut active = start;
        let mut tracked_parent = graph[start].most_recent_parent;
        let mut tokens_used = TokenUsage::default();
        let mut pending_external: Vec<MessageToolCall> = Vec::new();
        let mut error = None;
        let mut iteration = 0usize;
        let mut unsent = None;

        info!(agent = %graph[start].name, "Starting turn");

        loop {
            if log.len() - init_len >= self.options.max_messages {
                warn!(agent = %graph[active].name, iteration, "{MAX_MESSAGES_REACHED}");
                error = Some(TurnFailure::escalate(MAX_MESSAGES_REACHED));
                break;
            }
            iteration += 1;

            let agent_name = graph[active].name.clone();
            let view: Vec<Message> = if self.options.localize_history {
                histories.get(&agent_name).to_vec()
            } else {
                log.clone()
            };

            let suppressed = transfer::suppressed_child(graph, active, &view);
            if let Some(child) = suppressed {
                debug!(agent = %agent_name, child = %graph[child].name, "Hiding child that just gave up control");
            }

            let request = CompletionRequest {
                model: graph[active].model.clone(),
                instructions: graph[active].instructions.clone(),
                messages: view,
                tools: transfer::completion_tools(graph, active, suppressed, self.options.children_aware_of_parent),
                tool_choice: graph[active].tool_choice.clone(),
                parallel_tool_calls: graph[active].parallel_tool_calls,
            };

            debug!(agent = %agent_name, iteration, tools = request.tools.len(), "Requesting completion");

            let completion = match self.provider.complete(request).await {
                Ok(completion) => completion,
                Err(e) => {
                    warn!(agent = %agent_name, "Completion failed: {e}");
                    error = Some(TurnFailure::escalate(format!("Completion failed for agent {agent_name}: {e}")));
                    break;
                }
            };
            if let Some(usage) = completion.usage {
                tokens_used.record(self.provider.name(), &completion.model, usage);
            }

            let mut message = stamp_completion(completion.message, &agent_name);
            let (external, internal): (Vec<MessageToolCall>, Vec<MessageToolCall>) = message
                .calls()
                .iter()
                .cloned()
                .partition(|call| self.external_tools.contains(&call.name));

            if internal.is_empty() || !self.options.execute_tools {
                if !pending_external.is_empty() {
                    message
                        .tool_calls
                        .get_or_insert_with(Vec::new)
                        .append(&mut pending_external);
                }
                self.record(graph, histories, &mut log, &mut unsent, active, message).await;
                break;
            }

            // No room for the results: keep the completion, leave its calls unrun.
            if log.len() - init_len + 1 + internal.len() > self.options.max_messages {
                warn!(agent = %agent_name, iteration, "{MAX_MESSAGES_REACHED}");
                self.record(graph, histories, &mut log, &mut unsent, active, message).await;
                error = Some(TurnFailure::escalate(MAX_MESSAGES_REACHED));
                break;
            }

            if !external.is_empty() {
                debug!(agent = %agent_name, count = external.len(), "Deferring external tool calls");
                pending_external.extend(external);
                message.tool_calls = Some(internal.clone());
            }
            self.record(graph, histories, &mut log, &mut unsent, active, message).await;

            let functions = transfer::transfer_functions(graph, active);
            let mut next = None;
            for call in &internal {
                let (result, target) = self.execute_call(graph, &functions, active, call).await;
                self.record(graph, histories, &mut log, &mut unsent, active, result).await;
                if target.is_some() {
                    next = target;
                }
            }

            if let Some(target) = next {
                match self.switch(graph, histories, &log, active, target, &mut tracked_parent) {
                    Ok(agent) => active = agent,
                    Err(e) => {
                        warn!(agent = %agent_name, "Transfer rejected: {e}");
                        error = Some(TurnFailure::fatal(e.to_string()));
                        break;
                    }
                }
            }
        }

        if error.is_some() && !pending_external.is_empty() {
            warn!(count = pending_external.len(), "Dropping external tool calls from a failed turn");
        }

        info!(
            agent = %graph[active].name,
            messages = log.len() - init_len,
            iterations = iteration,
            "Turn finished"
        );

        Response {
            messages: log.split_off(init_len),
            agent: active,
            context_variables,
            tokens_used,
            error,
        }
    }

    /// Append to the global log and, when localized, to the sender's history
    /// (and its ancestors when parents share child history).
    async fn record(
        &self,
        graph: &AgentGraph,
        histories: &mut HistoryStore,
        log: &mut Vec<Message>,
        unsent: &mut Option<Message>,
        agent: AgentId,
        message: Message,
    ) {
        if self.options.localize_history {
            histories.propagate(
                std::slice::from_ref(&message),
                &graph[agent].name,
                |name| graph.parent_name(name).map(str::to_string),
                self.options.parent_has_child_history,
            );
        }
        if let Some(events) = self.events
            && let Some(previous) = unsent.replace(message.clone())
            && events.send(TurnEvent::Message { message: previous }).await.is_err()
        {
            debug!("Turn event receiver dropped");
        }
        log.push(message);
    }

    async fn execute_call(
        &self,
        graph: &AgentGraph,
        functions: &HashMap<String, TransferTarget>,
        active: AgentId,
        call: &MessageToolCall,
    ) -> (Message, Option<TransferTarget>) {
        let agent = &graph[active];

        if let Some(transfer) = functions.get(&call.name) {
            let content = json!({ "assistant": graph[transfer.target].name }).to_string();
            let message = Message::tool_result(&call.id, &call.name, content).from_sender(&agent.name);
            return (message, Some(*transfer));
        }

        let content = if agent.internal_tools.iter().any(|t| t.name == call.name) {
            debug!(agent = %agent.name, tool = %call.name, "Executing tool");
            match self.tools.dispatch(&call.name, &call.arguments).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(agent = %agent.name, tool = %call.name, "Tool failed: {e}");
                    format!("Error: {e}")
                }
            }
        } else {
            warn!(agent = %agent.name, tool = %call.name, "Model called an unknown tool");
            format!("Error: Tool {} not found", call.name)
        };

        let message = Message::tool_result(&call.id, &call.name, content).from_sender(&agent.name);
        (message, None)
    }

    fn switch(
        &self,
        graph: &mut AgentGraph,
        histories: &mut HistoryStore,
        log: &[Message],
        from: AgentId,
        transfer: TransferTarget,
        tracked_parent: &mut Option<AgentId>,
    ) -> Result<AgentId, Error> {
        let to = transfer.target;
        match transfer.kind {
            TransferKind::ToChild => {
                graph.bind_parent(to, from)?;
                *tracked_parent = Some(from);
                if self.options.localize_history {
                    let routed = log
                        .iter()
                        .filter(|m| m.current_turn && m.role == Role::User)
                        .cloned();
                    histories.extend_unique(&graph[to].name, routed);
                }
                info!(from = %graph[from].name, to = %graph[to].name, "Transferred control to child");
            }
            TransferKind::ToParent => {
                if *tracked_parent != Some(to) {
                    let expected = tracked_parent
                        .and_then(|p| graph.get(p))
                        .map_or("none", |p| p.name.as_str());
                    return Err(Error::Invariant(format!(
                        "{} gave control to {} but its active parent is {}",
                        graph[from].name, graph[to].name, expected
                    )));
                }
                if self.options.localize_history && !self.options.parent_has_child_history {
                    histories.truncate_before_last_user(&graph[from].name);
                }
                *tracked_parent = graph[to].most_recent_parent;
                info!(from = %graph[from].name, to = %graph[to].name, "Returned control to parent");
            }
        }
        Ok(to)
    }
}

/// Normalise a provider message into a log entry sent by `agent`.
fn stamp_completion(mut message: Message, agent: &str) -> Message {
    message.role = Role::Assistant;
    message.sender = Some(agent.to_string());
    message.response_type = ResponseType::Internal;
    message.current_turn = true;
    message.created_at = chrono::Utc::now();
    if let Some(calls) = message.tool_calls.as_mut() {
        for call in calls.iter_mut().filter(|c| c.id.is_empty()) {
            call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
        }
    }
    if message.tool_calls.as_ref().is_some_and(Vec::is_empty) {
        message.tool_calls = None;
    }
    message
}
