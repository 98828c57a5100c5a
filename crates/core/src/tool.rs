//! Tool dispatch: the abstraction over tool backends.
//!
//! The engine resolves handoffs itself. Every other tool the model calls is
//! either forwarded to the caller untouched (external) or, when a
//! [`ToolDispatcher`] claims the name, executed in-process during the turn.

use async_trait::async_trait;
use crate::error::ToolError;

/// Executes tool calls on behalf of the turn engine.
///
/// Implementations decide how a call is served: a mock simulation, a signed
/// webhook, a retrieval backend. The contract is only name + JSON arguments
/// in, result string out.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Whether calls to `name` are served by this dispatcher.
    fn handles(&self, name: &str) -> bool;

    /// Execute the tool with the JSON-encoded arguments.
    async fn dispatch(&self, name: &str, arguments: &str) -> std::result::Result<String, ToolError>;
}

/// A dispatcher that serves nothing. Every tool stays external.
pub struct NoLocalTools;

#[async_trait]
impl ToolDispatcher for NoLocalTools {
    fn handles(&self, _name: &str) -> bool {
        false
    }

    async fn dispatch(&self, name: &str, _arguments: &str) -> std::result::Result<String, ToolError> {
        Err(ToolError::NotFound(name.to_string()))
    }
}
