//! # Switchboard Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! Switchboard multi-agent turn engine. This crate has **no runtime
//! dependencies** beyond serde and friends: it defines the model that the
//! engine, providers and tool backends implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the engine talks to is a trait here:
//! - [`Provider`] answers completion requests
//! - [`ToolDispatcher`] executes tools the engine runs in-process
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted stand-ins and the engine never learns which backend it talks to.

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AgentRole, ControlType, PromptConfig, PromptType, ToolConfig};
pub use error::{Error, ErrorType, ProviderError, Result, ToolError, ValidationError};
pub use message::{Message, MessageToolCall, ResponseType, Role};
pub use provider::{CompletionRequest, CompletionResponse, Provider, ToolDefinition, Usage};
pub use tool::{NoLocalTools, ToolDispatcher};
