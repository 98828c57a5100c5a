//! Per-agent localized histories.
//!
//! Each agent sees only the part of the conversation that concerns it: the
//! user messages routed to it, its own messages and tool results, and (when
//! parents share their children's history) whatever its descendants said.

use std::collections::{BTreeMap, HashSet};

use switchboard_core::message::{Message, Role};
use tracing::{debug, warn};

use crate::state::StateSnapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    histories: BTreeMap<String, Vec<Message>>,
}

impl HistoryStore {
    /// Seed the store from the histories carried in a prior snapshot.
    pub fn from_snapshot(state: &StateSnapshot) -> Self {
        let histories = state
            .agent_data
            .iter()
            .filter(|a| !a.history.is_empty())
            .map(|a| (a.name.clone(), a.history.clone()))
            .collect();
        Self { histories }
    }

    pub fn get(&self, agent: &str) -> &[Message] {
        self.histories.get(agent).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_history(&self, agent: &str) -> bool {
        !self.get(agent).is_empty()
    }

    pub fn push(&mut self, agent: &str, message: Message) {
        self.histories.entry(agent.to_string()).or_default().push(message);
    }

    /// Append messages not already present in the agent's history.
    pub fn extend_unique(&mut self, agent: &str, messages: impl IntoIterator<Item = Message>) {
        let history = self.histories.entry(agent.to_string()).or_default();
        for message in messages {
            if !history.iter().any(|m| same_message(m, &message)) {
                history.push(message);
            }
        }
    }

    /// Append `delta` to `from` and, when `up_chain` is set, to every
    /// ancestor reachable through `parent_of`.
    pub fn propagate<F>(&mut self, delta: &[Message], from: &str, parent_of: F, up_chain: bool)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut visited = HashSet::new();
        let mut current = Some(from.to_string());

        while let Some(agent) = current {
            if !visited.insert(agent.clone()) {
                warn!(agent = %agent, "Parent chain loops back on itself, stopping propagation");
                break;
            }
            self.histories.entry(agent.clone()).or_default().extend_from_slice(delta);
            if !up_chain {
                break;
            }
            current = parent_of(&agent);
        }
    }

    /// Drop everything from the agent's most recent user message onward.
    pub fn truncate_before_last_user(&mut self, agent: &str) {
        if let Some(history) = self.histories.get_mut(agent)
            && let Some(pos) = history.iter().rposition(|m| m.role == Role::User)
        {
            history.truncate(pos);
        }
    }

    pub fn clear_current_turn(&mut self) {
        for message in self.histories.values_mut().flatten() {
            message.current_turn = false;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Message])> {
        self.histories.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

fn same_message(a: &Message, b: &Message) -> bool {
    a.role == b.role
        && a.content == b.content
        && a.created_at == b.created_at
        && a.tool_call_id == b.tool_call_id
}

/// Prepare the incoming messages and stored histories for a new turn.
///
/// Stamps `current_turn` on the most recent user message only. When the
/// trigger is a user message, stored flags are cleared. The trailing run of
/// non-assistant messages is then handed to `previous_agent` (and up its
/// parent chain when `up_chain` is set); an agent with no stored history
/// starts one from the trigger alone.
pub fn localize_turn_start<F>(
    messages: &mut [Message],
    store: &mut HistoryStore,
    previous_agent: &str,
    parent_of: F,
    localize: bool,
    up_chain: bool,
) where
    F: Fn(&str) -> Option<String>,
{
    let last_user = messages.iter().rposition(|m| m.role == Role::User);
    for (index, message) in messages.iter_mut().enumerate() {
        message.current_turn = Some(index) == last_user;
    }

    if !localize {
        return;
    }

    let Some(trigger) = messages.last() else {
        return;
    };
    if trigger.role == Role::User {
        store.clear_current_turn();
    }

    if !store.has_history(previous_agent) {
        debug!(agent = %previous_agent, "Starting localized history");
        store.push(previous_agent, trigger.clone());
        return;
    }

    let start = messages
        .iter()
        .rposition(|m| m.role == Role::Assistant)
        .map_or(0, |pos| pos + 1);
    let delta = &messages[start..];
    debug!(agent = %previous_agent, count = delta.len(), "Appending turn trigger to history");
    store.propagate(delta, previous_agent, parent_of, up_chain);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentState;
    use std::collections::HashMap;

    fn parents(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(c, p)| (c.to_string(), p.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn propagate_walks_to_root() {
        let mut store = HistoryStore::default();
        let delta = vec![Message::user("hi")];
        store.propagate(&delta, "Leaf", parents(&[("Leaf", "Mid"), ("Mid", "Root")]), true);
        assert_eq!(store.get("Leaf").len(), 1);
        assert_eq!(store.get("Mid").len(), 1);
        assert_eq!(store.get("Root").len(), 1);
    }

    #[test]
    fn propagate_stays_local_without_chain() {
        let mut store = HistoryStore::default();
        store.propagate(&[Message::user("hi")], "Leaf", parents(&[("Leaf", "Mid")]), false);
        assert!(store.has_history("Leaf"));
        assert!(!store.has_history("Mid"));
    }

    #[test]
    fn propagate_survives_parent_loop() {
        let mut store = HistoryStore::default();
        store.propagate(&[Message::user("hi")], "A", parents(&[("A", "B"), ("B", "A")]), true);
        assert_eq!(store.get("A").len(), 1);
        assert_eq!(store.get("B").len(), 1);
    }

    #[test]
    fn extend_unique_skips_duplicates() {
        let mut store = HistoryStore::default();
        let msg = Message::user("refund please");
        store.push("Billing", msg.clone());
        store.extend_unique("Billing", vec![msg, Message::user("also this")]);
        assert_eq!(store.get("Billing").len(), 2);
    }

    #[test]
    fn truncate_drops_last_user_and_after() {
        let mut store = HistoryStore::default();
        store.push("B", Message::user("first"));
        store.push("B", Message::assistant("ok"));
        store.push("B", Message::user("second"));
        store.push("B", Message::assistant("done"));
        store.truncate_before_last_user("B");
        let contents: Vec<_> = store.get("B").iter().map(|m| m.content.clone().unwrap()).collect();
        assert_eq!(contents, vec!["first", "ok"]);
    }

    #[test]
    fn turn_start_marks_only_latest_user_message() {
        let mut messages = vec![
            Message::user("old"),
            Message::assistant("reply").from_sender("Router"),
            Message::user("new"),
        ];
        let mut store = HistoryStore::default();
        localize_turn_start(&mut messages, &mut store, "Router", |_| None, true, true);
        assert!(!messages[0].current_turn);
        assert!(messages[2].current_turn);
        assert_eq!(store.get("Router").len(), 1);
        assert_eq!(store.get("Router")[0].content.as_deref(), Some("new"));
    }

    #[test]
    fn turn_start_appends_trailing_run_up_the_chain() {
        let state = StateSnapshot {
            last_agent_name: Some("Billing".into()),
            agent_data: vec![
                AgentState {
                    name: "Router".into(),
                    history: vec![Message::user("old")],
                    most_recent_parent_name: None,
                },
                AgentState {
                    name: "Billing".into(),
                    history: vec![Message::user("old")],
                    most_recent_parent_name: Some("Router".into()),
                },
            ],
        };
        let mut store = HistoryStore::from_snapshot(&state);
        let mut messages = vec![
            Message::user("old"),
            Message::assistant("answer").from_sender("Billing"),
            Message::user("follow up"),
        ];
        localize_turn_start(
            &mut messages,
            &mut store,
            "Billing",
            |n| state.parent_of(n).map(str::to_string),
            true,
            true,
        );
        assert_eq!(store.get("Billing").len(), 2);
        assert_eq!(store.get("Router").len(), 2);
        assert!(store.get("Billing")[1].current_turn);
        assert!(!store.get("Billing")[0].current_turn);
    }

    #[test]
    fn localization_off_only_stamps_flags() {
        let mut messages = vec![Message::user("hi")];
        let mut store = HistoryStore::default();
        localize_turn_start(&mut messages, &mut store, "Router", |_| None, false, true);
        assert!(messages[0].current_turn);
        assert!(!store.has_history("Router"));
    }
}
