//! Agent Message Router: the `should_agent_respond` decision
//! table, plus its side effects (turn-limit message, counter reset).
//!
//! Pure with respect to I/O: callers execute the returned `RouterAction`s
//! (publish a message, reset and persist the counter); the function itself
//! only decides.

use crate::util::{determine_sender_type, extract_mentions, SenderType};

/// Everything the router needs to know about the incoming message and the
/// agent being asked whether to respond.
pub struct RouterInput<'a> {
    pub agent_id: &'a str,
    pub agent_name: &'a str,
    pub llm_call_count: u32,
    pub turn_limit: u32,
    pub sender: &'a str,
    pub content: &'a str,
}

/// A side effect the caller must carry out after consulting the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterAction {
    /// Publish this content (with this sender) — used for the turn-limit message.
    PublishMessage { content: String, sender: String },
    /// Reset `llm_call_count` to 0 and persist the agent (best-effort).
    ResetTurnCounter,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RouterDecision {
    pub should_respond: bool,
    pub actions: Vec<RouterAction>,
}

/// Decision order is authoritative.
///
/// Resolves the spec's open question on ordering: the turn-limit rejection
/// (step 3) is checked strictly before the human/system reset (step 4), so a
/// human message that arrives exactly at the limit yields the turn-limit
/// message and does not reset the counter (see DESIGN.md).
pub fn should_agent_respond(input: RouterInput<'_>) -> RouterDecision {
    let mut actions = Vec::new();

    // 1. never self-reply.
    if input.sender.to_lowercase() == input.agent_id.to_lowercase() {
        return RouterDecision {
            should_respond: false,
            actions,
        };
    }

    // 2. loop breaker.
    if input.content.contains("Turn limit reached") {
        return RouterDecision {
            should_respond: false,
            actions,
        };
    }

    // 3. turn limit.
    if input.llm_call_count >= input.turn_limit {
        actions.push(RouterAction::PublishMessage {
            content: format!(
                "@human Turn limit reached ({} LLM calls). Please take control of the conversation.",
                input.turn_limit
            ),
            sender: input.agent_id.to_string(),
        });
        return RouterDecision {
            should_respond: false,
            actions,
        };
    }

    // 4. reset on human/system when the agent would otherwise proceed.
    let sender_type = determine_sender_type(input.sender);
    if matches!(sender_type, SenderType::Human | SenderType::System) && input.llm_call_count > 0 {
        actions.push(RouterAction::ResetTurnCounter);
    }

    // 5. missing sender or literal "system" -> broadcast accept.
    if input.sender.is_empty() || input.sender.eq_ignore_ascii_case("system") {
        return RouterDecision {
            should_respond: true,
            actions,
        };
    }

    let mention = extract_mentions(input.content);
    let agent_name_lower = input.agent_name.to_lowercase();

    // 6. human sender: broadcast when no mention, otherwise must match.
    if matches!(sender_type, SenderType::Human) {
        let should_respond = match mention {
            None => true,
            Some(m) => m == agent_name_lower,
        };
        return RouterDecision {
            should_respond,
            actions,
        };
    }

    // 7. agent sender: must be mentioned.
    let should_respond = mention.as_deref() == Some(agent_name_lower.as_str());
    RouterDecision {
        should_respond,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input<'a>(sender: &'a str, content: &'a str) -> RouterInput<'a> {
        RouterInput {
            agent_id: "alice",
            agent_name: "alice",
            llm_call_count: 0,
            turn_limit: 5,
            sender,
            content,
        }
    }

    #[test]
    fn never_responds_to_self() {
        let decision = should_agent_respond(RouterInput {
            sender: "Alice",
            ..base_input("alice", "hello")
        });
        assert!(!decision.should_respond);
        assert!(decision.actions.is_empty());
    }

    #[test]
    fn never_responds_to_turn_limit_breaker_message() {
        let decision = should_agent_respond(base_input("human", "Turn limit reached, back off"));
        assert!(!decision.should_respond);
    }

    #[test]
    fn rejects_and_publishes_when_turn_limit_hit() {
        let decision = should_agent_respond(RouterInput {
            llm_call_count: 5,
            turn_limit: 5,
            ..base_input("human", "@alice again")
        });
        assert!(!decision.should_respond);
        assert_eq!(
            decision.actions,
            vec![RouterAction::PublishMessage {
                content: "@human Turn limit reached (5 LLM calls). Please take control of the conversation.".into(),
                sender: "alice".into(),
            }]
        );
    }

    #[test]
    fn turn_limit_check_precedes_reset_so_counter_is_not_reset_at_boundary() {
        let decision = should_agent_respond(RouterInput {
            llm_call_count: 5,
            turn_limit: 5,
            ..base_input("human", "@alice again")
        });
        assert!(!decision.actions.contains(&RouterAction::ResetTurnCounter));
    }

    #[test]
    fn resets_counter_on_human_message_when_not_at_limit() {
        let decision = should_agent_respond(RouterInput {
            llm_call_count: 2,
            turn_limit: 5,
            ..base_input("human", "hello")
        });
        assert!(decision.actions.contains(&RouterAction::ResetTurnCounter));
        assert!(decision.should_respond);
    }

    #[test]
    fn missing_or_system_sender_is_always_accepted() {
        let decision = should_agent_respond(base_input("", "hi"));
        assert!(decision.should_respond);
        let decision = should_agent_respond(base_input("system", "hi"));
        assert!(decision.should_respond);
    }

    #[test]
    fn human_broadcast_with_no_mention_is_accepted() {
        let decision = should_agent_respond(base_input("human", "hello everyone"));
        assert!(decision.should_respond);
    }

    #[test]
    fn human_targeted_mention_only_accepted_by_that_agent() {
        let decision = should_agent_respond(base_input("human", "@bob ping"));
        assert!(!decision.should_respond);
        let decision = should_agent_respond(base_input("human", "@alice ping"));
        assert!(decision.should_respond);
    }

    #[test]
    fn agent_sender_requires_explicit_mention() {
        let decision = should_agent_respond(base_input("bob", "just chatting"));
        assert!(!decision.should_respond);
        let decision = should_agent_respond(base_input("bob", "@alice what do you think?"));
        assert!(decision.should_respond);
    }
}
