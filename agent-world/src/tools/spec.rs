//! Tool specification and call result shapes.
//!
//! Grounded on the teacher's `tool_source::ToolSpec`/`ToolCallContent`
//! (`loom/src/tool_source/context.rs`), trimmed to what the executor needs:
//! a name/description/JSON-schema triple in, plain text out.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Describes one callable tool to the LLM (name, description, JSON schema).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// The text result of a tool call, before it is wrapped into a `role:"tool"`
/// `AgentMessage`.
#[derive(Clone, Debug, Default)]
pub struct ToolCallContent {
    pub text: String,
}

/// Per-call context threaded to a `Tool::call` invocation: the chat id the
/// approval cache and HITL tool key off of, plus the cancellation token for
/// the turn this call belongs to, which long-running tools (`shell_cmd`)
/// must honor on a best-effort basis (spec §5 "Cancellation & timeouts").
#[derive(Clone, Debug)]
pub struct ToolCallContext {
    pub chat_id: Option<String>,
    pub agent_id: Option<String>,
    pub cancellation: CancellationToken,
}

impl Default for ToolCallContext {
    fn default() -> Self {
        Self {
            chat_id: None,
            agent_id: None,
            cancellation: CancellationToken::new(),
        }
    }
}
