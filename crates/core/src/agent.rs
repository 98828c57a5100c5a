//! Agent, tool and prompt configuration records.
//!
//! These are the typed forms of the per-turn configuration the caller
//! supplies. Keys are camelCase on the wire; snake_case aliases are accepted.

use serde::{Deserialize, Serialize};

/// The job an agent plays in the forest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    #[default]
    Normal,
    /// Takes over when the active agent's turn fails
    Escalation,
    /// Rewrites the final user-facing message
    #[serde(alias = "post_process")]
    PostProcessing,
    /// Recognised but not invoked by the core
    Guardrails,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Escalation => write!(f, "escalation"),
            Self::PostProcessing => write!(f, "post_processing"),
            Self::Guardrails => write!(f, "guardrails"),
        }
    }
}

/// Who receives control at the start of the next turn after this agent ended one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    /// Keep control with this agent
    #[default]
    Retain,
    /// Hand control back to the agent that delegated to this one
    RelinquishToParent,
    /// Restart from the configured start agent
    StartAgent,
}

/// Configuration for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,

    pub instructions: String,

    pub model: String,

    /// Shown to parents when they decide whom to transfer to
    #[serde(default)]
    pub description: String,

    /// Names of tools from the tool config list
    #[serde(default)]
    pub tools: Vec<String>,

    /// Whether the agent has an external-knowledge source to search
    #[serde(default, alias = "has_rag_sources")]
    pub has_rag_sources: bool,

    /// Children this agent may transfer to, in order
    #[serde(default, alias = "connected_agents")]
    pub connected_agents: Vec<String>,

    #[serde(default)]
    pub role: AgentRole,

    #[serde(default, alias = "control_type")]
    pub control_type: ControlType,

    /// Whether this agent's answers may be shown to the user
    #[serde(default = "default_true", alias = "respond_to_user")]
    pub respond_to_user: bool,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "tool_choice")]
    pub tool_choice: Option<String>,

    #[serde(default, alias = "parallel_tool_calls")]
    pub parallel_tool_calls: bool,
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// A normal agent with no tools and no children.
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: model.into(),
            description: String::new(),
            tools: Vec::new(),
            has_rag_sources: false,
            connected_agents: Vec::new(),
            role: AgentRole::Normal,
            control_type: ControlType::Retain,
            respond_to_user: true,
            tool_choice: None,
            parallel_tool_calls: false,
        }
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connected_agents = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }
}

/// Configuration for one tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema of the arguments
    pub parameters: serde_json::Value,

    /// Serve this tool with a simulated response
    #[serde(default, alias = "mock_tool")]
    pub mock_tool: bool,

    /// Guidance for the mock simulation
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "mock_instructions")]
    pub mock_instructions: Option<String>,

    /// Free-form backend tag (e.g. "webhook", "mcp")
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ToolConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            mock_tool: false,
            mock_instructions: None,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    /// Opening message of a conversation
    Greeting,
    /// Style directive handed to post-processing
    Style,
    #[serde(other)]
    Other,
}

/// A named prompt (greeting, style directive, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub prompt_type: PromptType,

    pub prompt: String,
}
