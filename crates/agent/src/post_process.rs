//! Producing the single user-facing message of a turn.
//!
//! A successful turn ends with exactly one external message. Depending on
//! configuration it is the final message flipped in place, a duplicate of
//! it, or a rewrite produced by the post-processing agent.

use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::agent::AgentConfig;
use switchboard_core::error::ProviderError;
use switchboard_core::message::{Message, ResponseType};
use switchboard_core::provider::{CompletionRequest, Provider, Usage};
use tracing::{debug, warn};

use crate::instructions;
use crate::usage::TokenUsage;

/// What the post-processor sees.
pub struct PostProcessRequest<'a> {
    pub agent: &'a AgentConfig,
    pub style_prompt: Option<&'a str>,
    /// Instructions of the agent that ended the turn
    pub last_agent_instructions: &'a str,
    /// Localized history of the agent that ended the turn
    pub last_agent_history: &'a [Message],
    /// Messages produced this turn
    pub messages: &'a [Message],
}

#[derive(Debug, Clone)]
pub struct PostProcessOutcome {
    pub content: String,
    /// `(provider, model, usage)` when a model was called
    pub usage: Option<(String, String, Usage)>,
}

/// Rewrites the final message of a turn.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn rewrite(&self, request: PostProcessRequest<'_>) -> Result<PostProcessOutcome, ProviderError>;
}

/// Rewrites with one completion call using the post-processing agent's prompt.
pub struct ProviderPostProcessor {
    provider: Arc<dyn Provider>,
}

impl ProviderPostProcessor {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PostProcessor for ProviderPostProcessor {
    async fn rewrite(&self, request: PostProcessRequest<'_>) -> Result<PostProcessOutcome, ProviderError> {
        let mut messages = request.last_agent_history.to_vec();
        for message in request.messages {
            if !messages.contains(message) {
                messages.push(message.clone());
            }
        }

        let instructions = format!(
            "{}{}",
            request.agent.instructions,
            instructions::post_processing_instructions(request.style_prompt, request.last_agent_instructions)
        );
        let response = self
            .provider
            .complete(CompletionRequest {
                model: request.agent.model.clone(),
                instructions,
                messages,
                tools: Vec::new(),
                tool_choice: None,
                parallel_tool_calls: false,
            })
            .await?;

        Ok(PostProcessOutcome {
            content: response.message.content.unwrap_or_default(),
            usage: response
                .usage
                .map(|u| (self.provider.name().to_string(), response.model.clone(), u)),
        })
    }
}

/// How the turn's external message came to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Finalized {
    /// A new message was pushed after the produced ones.
    Appended(Message),
    /// The last produced message was marked external in place.
    Flipped(Message),
}

impl Finalized {
    pub fn message(&self) -> &Message {
        match self {
            Self::Appended(message) | Self::Flipped(message) => message,
        }
    }
}

/// Inputs for [`Finalize::apply`] beyond the produced messages.
pub struct Finalize<'a> {
    /// The post-processing agent and the collaborator that runs it
    pub post_processor: Option<(&'a AgentConfig, &'a dyn PostProcessor)>,
    pub style_prompt: Option<&'a str>,
    pub last_agent_instructions: &'a str,
    pub last_agent_history: &'a [Message],
}

impl Finalize<'_> {
    /// Make the turn's final message user-facing.
    ///
    /// `None` when nothing was produced.
    pub async fn apply(&self, produced: &mut Vec<Message>, tokens: &mut TokenUsage) -> Option<Finalized> {
        let last = produced.last()?.clone();

        if last.has_tool_calls() || last.is_external() {
            return Some(Finalized::Flipped(flip_last(produced)));
        }

        let Some((agent, processor)) = self.post_processor else {
            let external = external_copy(&last, "External", last.content.clone());
            produced.push(external.clone());
            return Some(Finalized::Appended(external));
        };

        if agent.instructions.trim().is_empty() || last.is_empty_content() {
            debug!(agent = %agent.name, "Skipping post-processing");
            return Some(Finalized::Flipped(flip_last(produced)));
        }

        let request = PostProcessRequest {
            agent,
            style_prompt: self.style_prompt,
            last_agent_instructions: self.last_agent_instructions,
            last_agent_history: self.last_agent_history,
            messages: produced.as_slice(),
        };
        let content = match processor.rewrite(request).await {
            Ok(outcome) => {
                if let Some((provider, model, usage)) = outcome.usage {
                    tokens.record(&provider, &model, usage);
                }
                outcome.content
            }
            Err(e) => {
                warn!(agent = %agent.name, "Post-processing failed, keeping original text: {e}");
                last.content.clone().unwrap_or_default()
            }
        };

        let external = external_copy(&last, &agent.name, Some(content));
        produced.push(external.clone());
        Some(Finalized::Appended(external))
    }
}

fn flip_last(produced: &mut [Message]) -> Message {
    let index = produced.len() - 1;
    produced[index].response_type = ResponseType::External;
    produced[index].clone()
}

fn external_copy(last: &Message, suffix: &str, content: Option<String>) -> Message {
    let mut external = last.clone();
    external.sender = Some(format!("{} >> {suffix}", last.sender_name()));
    external.content = content;
    external.response_type = ResponseType::External;
    external.created_at = chrono::Utc::now();
    external
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text};
    use switchboard_core::agent::AgentRole;
    use switchboard_core::message::MessageToolCall;

    fn finalize<'a>(post: Option<(&'a AgentConfig, &'a dyn PostProcessor)>) -> Finalize<'a> {
        Finalize {
            post_processor: post,
            style_prompt: Some("Be warm."),
            last_agent_instructions: "Handle billing.",
            last_agent_history: &[],
        }
    }

    fn answer() -> Vec<Message> {
        vec![Message::user("refund?"), Message::assistant("Refund issued.").from_sender("Billing")]
    }

    #[tokio::test]
    async fn without_post_processing_the_answer_is_duplicated() {
        let mut produced = answer();
        let mut tokens = TokenUsage::default();
        let Some(Finalized::Appended(external)) = finalize(None).apply(&mut produced, &mut tokens).await else {
            panic!("expected an appended message");
        };

        assert_eq!(produced.len(), 3);
        assert_eq!(produced[1].response_type, ResponseType::Internal);
        assert_eq!(external.sender.as_deref(), Some("Billing >> External"));
        assert_eq!(external.content.as_deref(), Some("Refund issued."));
        assert_eq!(produced.iter().filter(|m| m.is_external()).count(), 1);
    }

    #[tokio::test]
    async fn pending_external_calls_are_flipped_not_duplicated() {
        let mut produced = vec![
            Message::assistant_tool_calls(vec![MessageToolCall::new("c1", "issue_refund", "{}")]).from_sender("Billing"),
        ];
        let mut tokens = TokenUsage::default();
        let outcome = finalize(None).apply(&mut produced, &mut tokens).await.unwrap();

        assert!(matches!(&outcome, Finalized::Flipped(m) if m.calls()[0].id == "c1"));
        assert_eq!(produced.len(), 1);
        assert!(produced[0].is_external());
    }

    #[tokio::test]
    async fn post_processor_rewrites_into_new_external_message() {
        let agent = AgentConfig::new("Polish", "Make it friendly.", "gpt-4o-mini").with_role(AgentRole::PostProcessing);
        let provider = Arc::new(ScriptedProvider::new(vec![text("Good news! Your refund is issued.")]));
        let processor = ProviderPostProcessor::new(provider.clone());
        let mut produced = answer();
        let mut tokens = TokenUsage::default();

        let Some(Finalized::Appended(external)) = finalize(Some((&agent, &processor as &dyn PostProcessor)))
            .apply(&mut produced, &mut tokens)
            .await
        else {
            panic!("expected a rewritten message");
        };

        assert_eq!(external.content.as_deref(), Some("Good news! Your refund is issued."));
        assert_eq!(external.sender.as_deref(), Some("Billing >> Polish"));
        assert_eq!(produced.len(), 3);
        assert!(tokens.get("scripted/gpt-4o-mini").is_some());

        let request = &provider.requests()[0];
        assert!(request.instructions.contains("Be warm."));
        assert!(request.instructions.contains("Handle billing."));
        assert!(request.tools.is_empty());
    }

    #[tokio::test]
    async fn empty_post_processing_instructions_just_flip() {
        let agent = AgentConfig::new("Polish", "  ", "gpt-4o-mini");
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let processor = ProviderPostProcessor::new(provider.clone());
        let mut produced = answer();
        let mut tokens = TokenUsage::default();

        let outcome = finalize(Some((&agent, &processor as &dyn PostProcessor)))
            .apply(&mut produced, &mut tokens)
            .await;

        assert!(matches!(outcome, Some(Finalized::Flipped(_))));
        assert_eq!(produced.len(), 2);
        assert!(produced[1].is_external());
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn failed_rewrite_keeps_original_text() {
        let agent = AgentConfig::new("Polish", "Make it friendly.", "gpt-4o-mini");
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let processor = ProviderPostProcessor::new(provider);
        let mut produced = answer();
        let mut tokens = TokenUsage::default();

        let outcome = finalize(Some((&agent, &processor as &dyn PostProcessor)))
            .apply(&mut produced, &mut tokens)
            .await
            .unwrap();

        assert!(matches!(outcome, Finalized::Appended(_)));
        assert_eq!(outcome.message().content.as_deref(), Some("Refund issued."));
        assert!(outcome.message().is_external());
    }

    #[tokio::test]
    async fn nothing_produced_returns_none() {
        let mut produced = Vec::new();
        let mut tokens = TokenUsage::default();
        assert!(finalize(None).apply(&mut produced, &mut tokens).await.is_none());
    }
}
