//! Turn orchestration: the entry point for executing one turn.
//!
//! Sequences validation, greeting detection, history localization, graph
//! construction, the turn engine, escalation, post-processing and state
//! capture. The orchestrator holds no conversation state of its own: every
//! call is a pure function of its [`TurnRequest`] and the collaborators.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use switchboard_config::EngineSettings;
use switchboard_core::agent::{ControlType, PromptType};
use switchboard_core::error::{Error, ErrorType, Result, ValidationError};
use switchboard_core::message::{Message, MessageToolCall, ResponseType, Role};
use switchboard_core::provider::Provider;
use switchboard_core::tool::{NoLocalTools, ToolDispatcher};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::escalation::Escalation;
use crate::graph::{AgentGraph, AgentId, GraphBuilder};
use crate::history::{self, HistoryStore};
use crate::loop_runner::{EngineOptions, Response, TurnEngine, TurnFailure};
use crate::post_process::{Finalize, Finalized, PostProcessor};
use crate::state::StateSnapshot;
use crate::stream_event::TurnEvent;
use crate::usage::TokenUsage;
use crate::validation::{self, TurnConfigs};

pub const DEFAULT_GREETING: &str = "How can I help you today?";

/// Name of the tool call used to surface a fatal error to the caller.
pub const ERROR_TOOL_NAME: &str = "raise_error";

const STREAM_BUFFER: usize = 64;

/// Everything one turn needs. Mirrors the JSON the caller sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(alias = "startAgent")]
    pub start_agent: String,

    #[serde(default = "empty_list", alias = "agentConfigs")]
    pub agent_configs: Value,

    #[serde(default = "empty_list", alias = "toolConfigs")]
    pub tool_configs: Value,

    #[serde(default = "empty_list", alias = "promptConfigs")]
    pub prompt_configs: Value,

    #[serde(default)]
    pub settings: EngineSettings,

    #[serde(default)]
    pub state: StateSnapshot,

    #[serde(default, alias = "contextVariables")]
    pub context_variables: Map<String, Value>,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

/// What the caller gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Messages produced this turn
    pub messages: Vec<Message>,
    pub tokens_used: TokenUsage,
    pub state: StateSnapshot,
}

impl TurnResponse {
    /// The message meant for the user, if the turn produced one.
    pub fn external_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_external())
    }
}

/// Executes turns against a completion provider and tool backend.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolDispatcher>,
    post_processor: Option<Arc<dyn PostProcessor>>,
}

impl Orchestrator {
    /// An orchestrator that executes no tools locally.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            tools: Arc::new(NoLocalTools),
            post_processor: None,
        }
    }

    /// Serve the tools this dispatcher claims in-process.
    pub fn with_tools(mut self, tools: Arc<dyn ToolDispatcher>) -> Self {
        self.tools = tools;
        self
    }

    /// Enable rewriting by the post-processing agent.
    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    /// Execute one turn and return everything it produced.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        self.execute(request, None).await
    }

    /// Execute one turn on a background task, yielding events as they happen.
    ///
    /// Messages are forwarded as the turn appends them. The newest is held
    /// back until the next arrives, so the final one goes out already marked
    /// external. The stream ends with exactly one `Done` or `Error` event.
    pub fn stream_turn(self: &Arc<Self>, request: TurnRequest) -> ReceiverStream<TurnEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let orchestrator = Arc::clone(self);
        let prior_state = request.state.clone();

        tokio::spawn(async move {
            let terminal = match orchestrator.execute(request, Some(&tx)).await {
                Ok(response) => TurnEvent::Done {
                    state: response.state,
                    tokens_used: response.tokens_used,
                },
                Err(e) => TurnEvent::Error {
                    error: e.to_string(),
                    state: prior_state,
                },
            };
            if tx.send(terminal).await.is_err() {
                debug!("Turn stream receiver dropped before completion");
            }
        });

        ReceiverStream::new(rx)
    }

    async fn execute(&self, request: TurnRequest, events: Option<&mpsc::Sender<TurnEvent>>) -> Result<TurnResponse> {
        let TurnRequest {
            messages,
            start_agent,
            agent_configs,
            tool_configs,
            prompt_configs,
            settings,
            state,
            context_variables,
        } = request;
        let mut messages = order_and_clean(messages);

        info!(start_agent = %start_agent, messages = messages.len(), "Running turn");

        if let Err(e) = settings.validate() {
            let failure = Error::config(e.to_string());
            return fail(failure, Vec::new(), TokenUsage::default(), state, &settings, events).await;
        }

        let configs = match validation::validate_configs(&agent_configs, &tool_configs, &prompt_configs, &start_agent) {
            Ok(configs) => configs,
            Err(e) => return fail(e.into(), Vec::new(), TokenUsage::default(), state, &settings, events).await,
        };
        if configs.guardrails.is_some() {
            debug!("Guardrails agent configured; not invoked");
        }

        if is_greeting_turn(&messages) {
            return Ok(greeting(&configs, &start_agent, state, events).await);
        }

        let turn_limit = validation::check_turn_limit(&messages, settings.max_overall_turns);

        let mut histories = if settings.localize_history {
            HistoryStore::from_snapshot(&state)
        } else {
            HistoryStore::default()
        };
        let previous = state
            .last_agent_name
            .clone()
            .filter(|name| configs.agents.iter().any(|a| &a.name == name))
            .unwrap_or_else(|| start_agent.clone());
        history::localize_turn_start(
            &mut messages,
            &mut histories,
            &previous,
            |name| state.parent_of(name).map(str::to_string),
            settings.localize_history,
            settings.parent_has_child_history,
        );

        let built = GraphBuilder::new(&configs.agents, &configs.tools, self.tools.as_ref())
            .children_aware_of_parent(settings.children_aware_of_parent)
            .build(&state);
        let mut graph = match built {
            Ok(graph) => graph,
            Err(e) => return fail(e, Vec::new(), TokenUsage::default(), state, &settings, events).await,
        };
        let Some(start) = graph.id_of(&start_agent) else {
            let e = ValidationError::UnknownStartAgent(start_agent.clone());
            return fail(e.into(), Vec::new(), TokenUsage::default(), state, &settings, events).await;
        };
        let receiver = receiving_agent(&graph, &previous, start, messages.last(), &settings);
        debug!(agent = %graph[receiver].name, "Selected receiving agent");
        if settings.localize_history && graph[receiver].name != previous {
            let routed = messages
                .iter()
                .filter(|m| m.current_turn && m.role == Role::User)
                .cloned();
            histories.extend_unique(&graph[receiver].name, routed);
        }

        let response = match turn_limit {
            Err(e) => {
                warn!("{e}");
                Response::failed(receiver, TurnFailure::escalate(e.to_string()))
            }
            Ok(()) => {
                TurnEngine::new(
                    self.provider.as_ref(),
                    self.tools.as_ref(),
                    EngineOptions::from_settings(&settings),
                )
                .with_external_tools(graph.external_tool_names())
                .with_events(events)
                .run(&mut graph, &mut histories, receiver, messages.clone(), context_variables)
                .await
            }
        };

        // The engine streams one behind; its last message is still ours to send.
        let mut held = response.messages.last().cloned();
        let mut produced = response.messages;
        let mut tokens = response.tokens_used;
        let mut last_agent = graph[response.agent].name.clone();
        let mut reviewed_instructions = graph[response.agent].instructions.clone();
        let mut escalated = false;

        if let Some(failure) = response.error {
            emit_held(events, &mut held).await;
            if failure.kind == ErrorType::Fatal {
                return fail(Error::TurnFailed(failure.message), produced, tokens, state, &settings, events).await;
            }
            let Some(escalation) = configs.escalation.as_ref().filter(|_| settings.escalate_errors) else {
                return fail(Error::TurnFailed(failure.message), produced, tokens, state, &settings, events).await;
            };

            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .and_then(|m| m.content.as_deref());
            let rerun = Escalation {
                config: escalation,
                tools: &configs.tools,
                error: &failure.message,
                last_user_message: last_user,
            }
            .run(self.provider.as_ref(), self.tools.as_ref(), &settings, events)
            .await;

            held = rerun.messages.last().cloned();
            produced.extend(rerun.messages);
            tokens.merge(&rerun.tokens_used);
            if let Some(second) = rerun.error {
                emit_held(events, &mut held).await;
                let message = format!("Escalation failed: {}", second.message);
                return fail(Error::TurnFailed(message), produced, tokens, state, &settings, events).await;
            }

            // Control restarts from the start agent after an escalated turn.
            last_agent = start_agent.clone();
            reviewed_instructions = escalation.instructions.clone();
            escalated = true;
        }

        let style = configs
            .prompts
            .iter()
            .find(|p| p.prompt_type == PromptType::Style)
            .map(|p| p.prompt.as_str());
        let post_processor = match (configs.post_processing.as_ref(), self.post_processor.as_deref()) {
            (Some(agent), Some(processor)) => Some((agent, processor)),
            _ => None,
        };
        let reviewed_history = if escalated {
            &[][..]
        } else {
            histories.get(&graph[response.agent].name)
        };
        let finalize = Finalize {
            post_processor,
            style_prompt: style,
            last_agent_instructions: &reviewed_instructions,
            last_agent_history: reviewed_history,
        };
        match finalize.apply(&mut produced, &mut tokens).await {
            Some(Finalized::Flipped(external)) => emit(events, external).await,
            Some(Finalized::Appended(external)) => {
                emit_held(events, &mut held).await;
                emit(events, external).await;
            }
            None => emit_held(events, &mut held).await,
        }

        let state = StateSnapshot::capture(&graph, &histories, &last_agent);
        let total = tokens.total();
        info!(
            last_agent = %last_agent,
            messages = produced.len(),
            input_tokens = total.input_tokens,
            output_tokens = total.output_tokens,
            "Turn complete"
        );

        Ok(TurnResponse {
            messages: produced,
            tokens_used: tokens,
            state,
        })
    }
}

/// Pick who answers first this turn.
fn receiving_agent(
    graph: &AgentGraph,
    previous: &str,
    start: AgentId,
    trigger: Option<&Message>,
    settings: &EngineSettings,
) -> AgentId {
    let Some(prev) = graph.id_of(previous) else {
        return start;
    };
    // A tool result belongs to whoever issued the call.
    if trigger.is_some_and(|m| m.role == Role::Tool) {
        return prev;
    }
    if settings.start_turn_with_start_agent {
        return start;
    }
    match graph[prev].control_type {
        ControlType::Retain => prev,
        ControlType::RelinquishToParent => graph[prev].most_recent_parent.unwrap_or(prev),
        ControlType::StartAgent => start,
    }
}

/// Stable sort by creation time, then normalise empty fields to null.
fn order_and_clean(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by_key(|m| m.created_at);
    for message in &mut messages {
        if message.tool_calls.as_ref().is_some_and(Vec::is_empty) {
            message.tool_calls = None;
        }
        if message.has_tool_calls() && message.content.as_deref().is_some_and(str::is_empty) {
            message.content = None;
        }
    }
    messages
}

fn is_greeting_turn(messages: &[Message]) -> bool {
    messages.iter().all(|m| m.role == Role::System)
}

async fn greeting(
    configs: &TurnConfigs,
    start_agent: &str,
    prior: StateSnapshot,
    events: Option<&mpsc::Sender<TurnEvent>>,
) -> TurnResponse {
    let text = configs
        .prompts
        .iter()
        .find(|p| p.prompt_type == PromptType::Greeting)
        .map_or(DEFAULT_GREETING, |p| p.prompt.as_str());

    let mut internal = Message::assistant(text).from_sender(start_agent);
    internal.current_turn = true;
    let mut external = internal.clone();
    external.sender = Some(format!("{start_agent} >> External"));
    external.response_type = ResponseType::External;

    emit(events, internal.clone()).await;
    emit(events, external.clone()).await;
    info!(agent = %start_agent, "Greeting turn");

    TurnResponse {
        messages: vec![internal, external],
        tokens_used: TokenUsage::default(),
        state: StateSnapshot {
            last_agent_name: Some(start_agent.to_string()),
            agent_data: prior.agent_data,
        },
    }
}

/// The assistant message that reports a fatal error to the caller.
pub fn error_tool_call_message(error: &str) -> Message {
    let call = MessageToolCall::new(
        format!("call_{}", uuid::Uuid::new_v4().simple()),
        ERROR_TOOL_NAME,
        json!({ "error": error }).to_string(),
    );
    let mut message = Message::assistant_tool_calls(vec![call]).from_sender("");
    message.response_type = ResponseType::External;
    message.current_turn = true;
    message
}

/// Surface a fatal error inline or raise it, depending on settings.
async fn fail(
    error: Error,
    mut produced: Vec<Message>,
    tokens_used: TokenUsage,
    prior: StateSnapshot,
    settings: &EngineSettings,
    events: Option<&mpsc::Sender<TurnEvent>>,
) -> Result<TurnResponse> {
    error!("Turn failed: {error}");
    if !settings.error_tool_call {
        return Err(error);
    }

    let message = error_tool_call_message(&error.to_string());
    emit(events, message.clone()).await;
    produced.push(message);
    Ok(TurnResponse {
        messages: produced,
        tokens_used,
        state: prior,
    })
}

async fn emit(events: Option<&mpsc::Sender<TurnEvent>>, message: Message) {
    if let Some(tx) = events
        && tx.send(TurnEvent::Message { message }).await.is_err()
    {
        debug!("Turn event receiver dropped");
    }
}

async fn emit_held(events: Option<&mpsc::Sender<TurnEvent>>, held: &mut Option<Message>) {
    if let Some(message) = held.take() {
        emit(events, message).await;
    }
}
