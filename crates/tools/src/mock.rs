//! Mock tools: simulated responses for tools marked `mock_tool`.
//!
//! A mock answers from, in order: a scripted response registered with
//! [`MockToolDispatcher::with_response`], its `mock_instructions` rendered as
//! a minijinja template over the call's arguments, or a generic JSON
//! acknowledgement echoing the arguments.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use minijinja::Environment;
use switchboard_core::agent::ToolConfig;
use switchboard_core::error::ToolError;
use switchboard_core::tool::ToolDispatcher;
use tracing::debug;

#[derive(Debug, Clone)]
struct MockTool {
    instructions: Option<String>,
    scripted: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockToolDispatcher {
    tools: HashMap<String, MockTool>,
}

impl MockToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every config with `mock_tool` set.
    pub fn from_configs(configs: &[ToolConfig]) -> Self {
        let tools = configs
            .iter()
            .filter(|c| c.mock_tool)
            .map(|c| {
                (
                    c.name.clone(),
                    MockTool {
                        instructions: c.mock_instructions.clone(),
                        scripted: None,
                    },
                )
            })
            .collect();
        Self { tools }
    }

    /// Always answer `name` with `response`.
    pub fn with_response(mut self, name: impl Into<String>, response: impl Into<String>) -> Self {
        self.tools
            .entry(name.into())
            .or_insert(MockTool {
                instructions: None,
                scripted: None,
            })
            .scripted = Some(response.into());
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    // Tool output is plain text, never HTML.
    env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
    env
});

/// Render mock instructions with the call's arguments as the context.
///
/// Argument values are inserted as data and never re-parsed as template
/// source. Unknown variables render empty.
fn render(
    tool_name: &str,
    template: &str,
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, ToolError> {
    TEMPLATES
        .render_str(template, arguments)
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: format!("mock instructions: {e}"),
        })
}

fn parse_arguments(arguments: &str) -> Result<serde_json::Map<String, serde_json::Value>, ToolError> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str(arguments) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

#[async_trait]
impl ToolDispatcher for MockToolDispatcher {
    fn handles(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn dispatch(&self, name: &str, arguments: &str) -> std::result::Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let args = parse_arguments(arguments)?;

        debug!(tool = %name, "Serving mock tool");

        if let Some(response) = &tool.scripted {
            return Ok(response.clone());
        }
        if let Some(template) = tool.instructions.as_deref().filter(|t| t.contains("{{") || t.contains("{%")) {
            return render(name, template, &args);
        }

        Ok(serde_json::json!({
            "status": "ok",
            "tool": name,
            "arguments": args,
            "note": tool.instructions,
        })
        .to_string())
    }
}
