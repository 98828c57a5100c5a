//! Handoff mechanics.
//!
//! A transfer is a function the model can call whose result is another
//! agent rather than a string. Each agent owns exactly one child-direction
//! entry (the function its parents call to reach it) and one parent-direction
//! entry per parent it can be reached from. Model-facing names are derived
//! from the entry, so nothing has to be generated at runtime.

use std::collections::HashMap;

use switchboard_core::message::{Message, Role};
use switchboard_core::provider::ToolDefinition;

use crate::graph::{AgentGraph, AgentId};

/// Name of the function a child calls to hand control back to its parent.
pub const GIVE_UP_CONTROL_TOOL: &str = "give_up_chat_control";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Parent hands control down to a child
    ToChild,
    /// Child gives control back to a parent
    ToParent,
}

/// A transfer registry entry: which direction, and which agent receives control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferTarget {
    pub kind: TransferKind,
    pub target: AgentId,
}

impl TransferTarget {
    pub fn to_child(target: AgentId) -> Self {
        Self {
            kind: TransferKind::ToChild,
            target,
        }
    }

    pub fn to_parent(target: AgentId) -> Self {
        Self {
            kind: TransferKind::ToParent,
            target,
        }
    }

    /// The function name the model sees for this entry.
    pub fn tool_name(&self, graph: &AgentGraph) -> String {
        match self.kind {
            TransferKind::ToChild => transfer_tool_name(&graph[self.target].name),
            TransferKind::ToParent => GIVE_UP_CONTROL_TOOL.to_string(),
        }
    }

    /// The schema sent to the model for this entry.
    pub fn definition(&self, graph: &AgentGraph, children_aware_of_parent: bool) -> ToolDefinition {
        let target = &graph[self.target];
        let description = match self.kind {
            TransferKind::ToChild if target.description.is_empty() => {
                format!("Transfer the conversation to {}.", target.name)
            }
            TransferKind::ToChild => format!(
                "Transfer the conversation to {}. {}",
                target.name, target.description
            ),
            TransferKind::ToParent if children_aware_of_parent => format!(
                "Give control of the conversation back to {}.",
                target.name
            ),
            TransferKind::ToParent => "Give up control of the conversation when the request \
                is outside your scope or your task is complete."
                .to_string(),
        };
        ToolDefinition::without_parameters(self.tool_name(graph), description)
    }
}

/// `transfer_to_<snake_case(name)>`.
pub fn transfer_tool_name(agent_name: &str) -> String {
    format!("transfer_to_{}", snake_case(agent_name))
}

/// Lowercase snake_case: camel-case boundaries and non-alphanumerics become `_`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower_or_digit && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower_or_digit = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Every transfer the active agent can execute, keyed by function name.
pub fn transfer_functions(graph: &AgentGraph, active: AgentId) -> HashMap<String, TransferTarget> {
    let agent = &graph[active];
    let mut functions: HashMap<String, TransferTarget> = agent
        .child_functions
        .values()
        .map(|t| (t.tool_name(graph), *t))
        .collect();
    if let Some(parent_fn) = agent.parent_function {
        functions.insert(parent_fn.tool_name(graph), parent_fn);
    }
    functions
}

/// The function schemas offered to the active agent for one completion.
///
/// Order: child transfers (declared order), the bound parent transfer, then
/// internal and external tools. `suppressed` hides one child for this request.
pub fn completion_tools(
    graph: &AgentGraph,
    active: AgentId,
    suppressed: Option<AgentId>,
    children_aware_of_parent: bool,
) -> Vec<ToolDefinition> {
    let agent = &graph[active];
    let mut tools = Vec::new();

    for child_name in &agent.children_names {
        let Some(transfer) = agent.child_functions.get(child_name) else {
            continue;
        };
        if Some(transfer.target) == suppressed {
            continue;
        }
        tools.push(transfer.definition(graph, children_aware_of_parent));
    }
    if let Some(parent_fn) = agent.parent_function {
        tools.push(parent_fn.definition(graph, children_aware_of_parent));
    }
    tools.extend(agent.internal_tools.iter().cloned());
    tools.extend(agent.external_tools.iter().cloned());
    tools
}

/// Detect a child that just handed control straight back.
///
/// Returns the child when the most recent assistant message in `view` was
/// sent by a child of `active` and consisted of exactly one call to that
/// child's bound give-up function. Such a child must not be offered again
/// in the next completion request.
pub fn suppressed_child(graph: &AgentGraph, active: AgentId, view: &[Message]) -> Option<AgentId> {
    let last = view.iter().rev().find(|m| m.role == Role::Assistant)?;
    let child = *graph[active].children.get(last.sender.as_deref()?)?;
    let parent_fn = graph[child].parent_function?;
    if parent_fn.kind != TransferKind::ToParent || parent_fn.target != active {
        return None;
    }
    match last.calls() {
        [only] if only.name == parent_fn.tool_name(graph) => Some(child),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::state::StateSnapshot;
    use switchboard_core::agent::AgentConfig;
    use switchboard_core::message::MessageToolCall;
    use switchboard_core::tool::NoLocalTools;

    fn router_billing() -> AgentGraph {
        let agents = vec![
            AgentConfig::new("Router", "route", "m").with_children(["Billing", "Tech Support"]),
            AgentConfig::new("Billing", "bill", "m"),
            AgentConfig::new("Tech Support", "fix", "m"),
        ];
        GraphBuilder::new(&agents, &[], &NoLocalTools)
            .build(&StateSnapshot::default())
            .unwrap()
    }

    #[test]
    fn snake_case_handles_camel_and_spaces() {
        assert_eq!(snake_case("Billing"), "billing");
        assert_eq!(snake_case("TechSupport"), "tech_support");
        assert_eq!(snake_case("Tech Support"), "tech_support");
        assert_eq!(snake_case("FAQ-bot 2"), "faq_bot_2");
    }

    #[test]
    fn child_transfer_names_derive_from_target() {
        let graph = router_billing();
        let router = graph.id_of("Router").unwrap();
        let names: Vec<String> = completion_tools(&graph, router, None, false)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["transfer_to_billing", "transfer_to_tech_support"]);
    }

    #[test]
    fn parent_definition_wording_depends_on_awareness() {
        let graph = router_billing();
        let router = graph.id_of("Router").unwrap();
        let aware = TransferTarget::to_parent(router).definition(&graph, true);
        let blind = TransferTarget::to_parent(router).definition(&graph, false);
        assert_eq!(aware.name, GIVE_UP_CONTROL_TOOL);
        assert!(aware.description.contains("Router"));
        assert!(!blind.description.contains("Router"));
    }

    #[test]
    fn suppression_hides_child_that_just_gave_up() {
        let mut graph = router_billing();
        let router = graph.id_of("Router").unwrap();
        let billing = graph.id_of("Billing").unwrap();
        graph.bind_parent(billing, router).unwrap();

        let give_up = Message::assistant_tool_calls(vec![MessageToolCall::new(
            "call_1",
            GIVE_UP_CONTROL_TOOL,
            "{}",
        )])
        .from_sender("Billing");
        let view = vec![Message::user("refund please"), give_up];

        assert_eq!(suppressed_child(&graph, router, &view), Some(billing));
        let names: Vec<String> = completion_tools(&graph, router, Some(billing), false)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["transfer_to_tech_support"]);
    }

    #[test]
    fn no_suppression_when_child_answered() {
        let mut graph = router_billing();
        let router = graph.id_of("Router").unwrap();
        let billing = graph.id_of("Billing").unwrap();
        graph.bind_parent(billing, router).unwrap();

        let view = vec![Message::assistant("Refund issued").from_sender("Billing")];
        assert_eq!(suppressed_child(&graph, router, &view), None);
    }

    #[test]
    fn no_suppression_when_give_up_was_one_of_several_calls() {
        let mut graph = router_billing();
        let router = graph.id_of("Router").unwrap();
        let billing = graph.id_of("Billing").unwrap();
        graph.bind_parent(billing, router).unwrap();

        let msg = Message::assistant_tool_calls(vec![
            MessageToolCall::new("call_1", "lookup_invoice", "{}"),
            MessageToolCall::new("call_2", GIVE_UP_CONTROL_TOOL, "{}"),
        ])
        .from_sender("Billing");
        assert_eq!(suppressed_child(&graph, router, &[msg]), None);
    }

    #[test]
    fn transfer_functions_include_bound_parent() {
        let mut graph = router_billing();
        let router = graph.id_of("Router").unwrap();
        let billing = graph.id_of("Billing").unwrap();
        graph.bind_parent(billing, router).unwrap();

        let functions = transfer_functions(&graph, billing);
        assert_eq!(
            functions.get(GIVE_UP_CONTROL_TOOL),
            Some(&TransferTarget::to_parent(router))
        );
        assert_eq!(functions.len(), 1);
    }
}
