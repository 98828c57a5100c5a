//! Token accounting keyed by `"<provider>/<model>"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use switchboard_core::provider::Usage;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenUsage(BTreeMap<String, Usage>);

impl TokenUsage {
    pub fn record(&mut self, provider: &str, model: &str, usage: Usage) {
        let entry = self.0.entry(format!("{provider}/{model}")).or_default();
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
    }

    pub fn merge(&mut self, other: &TokenUsage) {
        for (key, usage) in &other.0 {
            let entry = self.0.entry(key.clone()).or_default();
            entry.input_tokens += usage.input_tokens;
            entry.output_tokens += usage.output_tokens;
        }
    }

    pub fn get(&self, key: &str) -> Option<&Usage> {
        self.0.get(key)
    }

    pub fn total(&self) -> Usage {
        self.0.values().fold(Usage::default(), |acc, u| Usage {
            input_tokens: acc.input_tokens + u.input_tokens,
            output_tokens: acc.output_tokens + u.output_tokens,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
