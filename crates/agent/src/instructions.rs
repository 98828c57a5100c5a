//! Instruction fragments appended to agent prompts at graph build time.

use switchboard_core::provider::ToolDefinition;

use crate::transfer::GIVE_UP_CONTROL_TOOL;

pub const RETRIEVAL_TOOL_NAME: &str = "retrieve_knowledge";

pub const INTERNAL_AGENT_INSTRUCTIONS: &str = "\n\n## Responding\n\
Your replies are not shown to the user. When you have finished your task, \
hand control back by calling give_up_chat_control instead of answering the user directly.";

/// Schema of the retrieval tool offered to agents with knowledge sources.
pub fn retrieval_tool() -> ToolDefinition {
    ToolDefinition {
        name: RETRIEVAL_TOOL_NAME.to_string(),
        description: "Search the knowledge sources attached to this agent and return the \
            most relevant passages."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for"
                }
            },
            "required": ["query"]
        }),
    }
}

pub fn retrieval_instructions() -> String {
    format!(
        "\n\n## Knowledge\n\
         You have access to knowledge sources. Call {RETRIEVAL_TOOL_NAME} with a focused query \
         before answering questions those sources may cover, and base your answer on what it returns."
    )
}

/// Tell a parent whom it can delegate to. `children` holds
/// `(name, description, function name)` in declared order.
pub fn transfer_instructions(children: &[(String, String, String)]) -> String {
    let mut out = String::from(
        "\n\n## Delegation\n\
         You can hand the conversation to another agent when it is better suited to the request. \
         Call the matching function; do not tell the user you are transferring them.\n",
    );
    for (name, description, function) in children {
        if description.is_empty() {
            out.push_str(&format!("- {name}: call {function}\n"));
        } else {
            out.push_str(&format!("- {name} ({description}): call {function}\n"));
        }
    }
    out
}

/// Tell a child how to give control back.
pub fn give_up_instructions(parents: &[String], children_aware_of_parent: bool) -> String {
    if children_aware_of_parent && !parents.is_empty() {
        format!(
            "\n\n## Handing back\n\
             You were brought in by {}. If the request is outside your scope or your task is done, \
             call {GIVE_UP_CONTROL_TOOL} to return control.",
            parents.join(" or ")
        )
    } else {
        format!(
            "\n\n## Handing back\n\
             If the request is outside your scope or your task is done, call \
             {GIVE_UP_CONTROL_TOOL} to return control."
        )
    }
}

/// Prompt suffix for the escalation agent.
pub fn escalation_instructions(error: &str, last_user_message: Option<&str>) -> String {
    let mut out = format!(
        "\n\n## Escalation\n\
         The assistant handling this conversation failed with the following error:\n{error}\n\
         Take over and help the user as best you can."
    );
    if let Some(text) = last_user_message {
        out.push_str(&format!("\nThe user's most recent message was:\n{text}"));
    }
    out
}

/// Prompt suffix for the post-processing agent.
pub fn post_processing_instructions(style: Option<&str>, reviewed_instructions: &str) -> String {
    let mut out = String::from(
        "\n\n## Review\n\
         Rewrite the final assistant message so it is ready to show the user. \
         Reply with the rewritten message only.",
    );
    if let Some(style) = style.filter(|s| !s.trim().is_empty()) {
        out.push_str(&format!("\n\nStyle guide:\n{style}"));
    }
    if !reviewed_instructions.is_empty() {
        out.push_str(&format!(
            "\n\nThe agent that wrote the message was instructed as follows:\n{reviewed_instructions}"
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_instructions_list_each_child() {
        let text = transfer_instructions(&[
            ("Billing".into(), "Payments and refunds".into(), "transfer_to_billing".into()),
            ("FAQ".into(), String::new(), "transfer_to_faq".into()),
        ]);
        assert!(text.contains("- Billing (Payments and refunds): call transfer_to_billing"));
        assert!(text.contains("- FAQ: call transfer_to_faq"));
    }

    #[test]
    fn aware_children_learn_their_parent() {
        let parents = vec!["Router".to_string()];
        assert!(give_up_instructions(&parents, true).contains("Router"));
        assert!(!give_up_instructions(&parents, false).contains("Router"));
    }

    #[test]
    fn retrieval_tool_requires_query() {
        let tool = retrieval_tool();
        assert_eq!(tool.parameters["required"][0], "query");
    }

    #[test]
    fn escalation_prompt_carries_error() {
        let text = escalation_instructions("Max messages per turn reached", Some("help"));
        assert!(text.contains("Max messages per turn reached"));
        assert!(text.contains("help"));
    }
}
