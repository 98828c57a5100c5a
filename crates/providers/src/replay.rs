//! Replay provider: answers completion requests from a recorded script.
//!
//! Used for offline runs and reproducing a turn without a live model. The
//! recording is a JSON array whose entries are either a full completion
//! (`{"message": ..., "usage": ..., "model": ...}`) or a bare assistant
//! message. Entries are served in order, one per request.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use switchboard_core::error::ProviderError;
use switchboard_core::message::Message;
use switchboard_core::provider::{CompletionRequest, CompletionResponse, Provider};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Recorded {
    Completion(CompletionResponse),
    Message(Message),
}

pub struct ReplayProvider {
    completions: Vec<CompletionResponse>,
    cursor: AtomicUsize,
}

impl ReplayProvider {
    pub fn new(completions: Vec<CompletionResponse>) -> Self {
        Self {
            completions,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse a recording.
    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        let recorded: Vec<Recorded> = serde_json::from_str(json)
            .map_err(|e| ProviderError::NotConfigured(format!("invalid replay file: {e}")))?;

        let completions = recorded
            .into_iter()
            .map(|entry| match entry {
                Recorded::Completion(completion) => completion,
                Recorded::Message(message) => CompletionResponse {
                    message,
                    usage: None,
                    model: String::new(),
                },
            })
            .collect();

        Ok(Self::new(completions))
    }

    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::NotConfigured(format!("cannot read replay file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Completions not yet served.
    pub fn remaining(&self) -> usize {
        self.completions
            .len()
            .saturating_sub(self.cursor.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let mut completion = self.completions.get(index).cloned().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "replay exhausted after {} completions",
                self.completions.len()
            ))
        })?;

        if completion.model.is_empty() {
            completion.model = request.model;
        }
        debug!(index, model = %completion.model, "Replaying recorded completion");
        Ok(completion)
    }
}
