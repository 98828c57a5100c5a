//! Shared test helpers for engine and orchestrator tests.

use std::sync::Mutex;

use switchboard_core::error::ProviderError;
use switchboard_core::message::{Message, MessageToolCall};
use switchboard_core::provider::{CompletionRequest, CompletionResponse, Provider, Usage};

/// A provider that replays scripted assistant messages in order and
/// records every request it receives.
///
/// Once the script runs out, calls fail with a provider error unless the
/// provider was built with [`ScriptedProvider::repeating`].
pub struct ScriptedProvider {
    script: Vec<Message>,
    repeat: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Message>) -> Self {
        Self {
            script,
            repeat: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Cycle through the script forever.
    pub fn repeating(script: Vec<Message>) -> Self {
        Self {
            repeat: true,
            ..Self::new(script)
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        let model = request.model.clone();
        requests.push(request);

        let message = match (self.repeat, self.script.is_empty()) {
            (true, false) => self.script[index % self.script.len()].clone(),
            _ => self
                .script
                .get(index)
                .cloned()
                .ok_or_else(|| ProviderError::Network(format!("no scripted response for call #{index}")))?,
        };

        Ok(CompletionResponse {
            message,
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 5,
            }),
            model,
        })
    }
}

/// A plain text answer.
pub fn text(content: &str) -> Message {
    Message::assistant(content)
}

/// An assistant message with a single tool call.
pub fn call(name: &str, arguments: &str) -> Message {
    calls(&[(name, arguments)])
}

/// An assistant message with several tool calls.
pub fn calls(specs: &[(&str, &str)]) -> Message {
    Message::assistant_tool_calls(
        specs
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| MessageToolCall::new(format!("call_{name}_{i}"), *name, *arguments))
            .collect(),
    )
}
