//! The multi-agent turn engine: the heart of Switchboard.
//!
//! A turn moves through a forest of agents configured by the caller:
//!
//! 1. **Validate** the agent, tool and prompt configs
//! 2. **Localize** the incoming messages into per-agent histories
//! 3. **Build** the agent graph and its transfer functions
//! 4. **Run** completions for the active agent, executing internal tools
//!    and switching agents on handoffs, until the turn is terminal
//! 5. **Escalate** a failed turn once, or **post-process** a successful one
//! 6. **Capture** the state the next turn starts from
//!
//! The engine is stateless between turns; everything it needs to resume
//! travels in the [`StateSnapshot`].

pub mod escalation;
pub mod graph;
pub mod history;
pub mod instructions;
pub mod loop_runner;
pub mod orchestrator;
pub mod post_process;
pub mod state;
pub mod stream_event;
pub mod transfer;
pub mod usage;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use graph::{AgentGraph, AgentId, AgentRecord, GraphBuilder};
pub use history::HistoryStore;
pub use loop_runner::{EngineOptions, MAX_MESSAGES_REACHED, Response, TurnEngine, TurnFailure};
pub use orchestrator::{DEFAULT_GREETING, ERROR_TOOL_NAME, Orchestrator, TurnRequest, TurnResponse};
pub use post_process::{PostProcessor, ProviderPostProcessor};
pub use state::{AgentState, StateSnapshot};
pub use stream_event::TurnEvent;
pub use transfer::{GIVE_UP_CONTROL_TOOL, TransferKind, TransferTarget};
pub use usage::TokenUsage;
