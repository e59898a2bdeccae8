//! The conversation message shape shared by agent memory, chats and the LLM
//! provider contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message, in the provider-neutral shape every `LlmClient`
/// translates to and from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model inside an assistant turn.
///
/// `arguments` is kept as a raw JSON string (provider wire shape); callers
/// parse it into `serde_json::Value` at the point of use via
/// `ToolCall::parsed_arguments`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    /// Parse `arguments` as JSON; malformed JSON is treated as an empty object
    /// rather than a hard error, since individual tool implementations are in
    /// a better position to report a useful validation message.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments).unwrap_or(serde_json::Value::Object(Default::default()))
    }
}

/// One entry in an agent's memory, or in a chat's message list.
///
/// Invariant: a message with `role = Tool` must carry a
/// `tool_call_id` emitted by a prior assistant message in the same
/// conversation window; this is enforced by the orchestrator, not by the
/// type itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sender: Some(sender.into()),
            tool_call_id: None,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
            chat_id: None,
            message_id: None,
            reply_to_message_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sender: Some(sender.into()),
            tool_call_id: None,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
            chat_id: None,
            message_id: None,
            reply_to_message_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            sender: Some("system".to_string()),
            tool_call_id: None,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
            chat_id: None,
            message_id: None,
            reply_to_message_id: None,
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            sender: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
            created_at: Utc::now(),
            chat_id: None,
            message_id: None,
            reply_to_message_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_parses_valid_json_arguments() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "shell_cmd".into(),
            arguments: r#"{"command":"echo"}"#.into(),
        };
        let parsed = call.parsed_arguments();
        assert_eq!(parsed["command"], "echo");
    }

    #[test]
    fn tool_call_falls_back_to_empty_object_on_malformed_json() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "shell_cmd".into(),
            arguments: "not json".into(),
        };
        assert_eq!(call.parsed_arguments(), serde_json::json!({}));
    }

    #[test]
    fn constructors_set_expected_roles_and_sender() {
        let u = AgentMessage::user("hi", "human");
        assert_eq!(u.role, Role::User);
        assert_eq!(u.sender.as_deref(), Some("human"));

        let t = AgentMessage::tool("ok", "call_1");
        assert_eq!(t.role, Role::Tool);
        assert_eq!(t.tool_call_id.as_deref(), Some("call_1"));
        assert!(t.sender.is_none());
    }
}
