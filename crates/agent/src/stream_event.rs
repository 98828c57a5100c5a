//! Turn-level streaming events.
//!
//! `TurnEvent` is what the streaming entry point yields: every message of
//! the turn once, in order, then exactly one terminal event. Consumers see
//! the same messages the batch call returns.

use serde::{Deserialize, Serialize};
use switchboard_core::message::Message;

use crate::state::StateSnapshot;
use crate::usage::TokenUsage;

/// Events emitted while a turn executes.
///
/// - `message`: a message was produced (internal or external)
/// - `done`: the turn finished; carries the new state
/// - `error`: the turn failed and no error message was returned inline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Message { message: Message },

    Done {
        state: StateSnapshot,
        tokens_used: TokenUsage,
    },

    Error { error: String, state: StateSnapshot },
}

impl TurnEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Message { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_event_is_tagged() {
        let event = TurnEvent::Message {
            message: Message::assistant("Hello").from_sender("Router"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"message""#));
        assert!(json.contains(r#""sender":"Router""#));
        assert!(!event.is_terminal());
    }

    #[test]
    fn done_event_carries_state() {
        let event = TurnEvent::Done {
            state: StateSnapshot {
                last_agent_name: Some("Billing".into()),
                agent_data: vec![],
            },
            tokens_used: TokenUsage::default(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""last_agent_name":"Billing""#));
        assert!(event.is_terminal());
    }

    #[test]
    fn error_event_roundtrip() {
        let event = TurnEvent::Error {
            error: "Cycle detected".into(),
            state: StateSnapshot::default(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: TurnEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "error");
    }
}
