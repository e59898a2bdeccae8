//! Tool Executor: validate, approve, dispatch.
//!
//! Grounded on the teacher's `Tool` trait (`loom/src/tools/trait.rs`) and its
//! `AggregateToolSource` registry-by-name pattern, generalized with the
//! approval-cache and HITL steps the spec's "approval"/"dispatch" bullets add.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolSourceError;
use crate::message::{AgentMessage, ToolCall};
use crate::tools::approval::ApprovalCache;
use crate::tools::hitl::{run_human_intervention, HitlResponder};
use crate::tools::shell::{ShellCmdTool, TOOL_SHELL_CMD};
use crate::tools::spec::{ToolCallContent, ToolCallContext, ToolSpec};

/// A single tool the executor can dispatch to.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    async fn call(&self, args: Value, ctx: Option<&ToolCallContext>) -> Result<ToolCallContent, ToolSourceError>;
}

pub const TOOL_HUMAN_INTERVENTION_REQUEST: &str = "human_intervention_request";

/// Wraps `hitl::run_human_intervention` as a dispatchable `Tool`.
struct HumanInterventionTool {
    responder: Arc<dyn HitlResponder>,
}

#[async_trait]
impl Tool for HumanInterventionTool {
    fn name(&self) -> &str {
        TOOL_HUMAN_INTERVENTION_REQUEST
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_HUMAN_INTERVENTION_REQUEST.to_string(),
            description: Some(
                "Asks a human to choose among a set of options, optionally requiring a \
                 confirm/cancel follow-up before the choice is final."
                    .to_string(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "options": {"type": "array", "items": {"type": "string"}},
                    "defaultOption": {"type": "string"},
                    "timeoutMs": {"type": "integer"},
                    "requireConfirmation": {"type": "boolean"}
                },
                "required": ["question", "options"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: Option<&ToolCallContext>) -> Result<ToolCallContent, ToolSourceError> {
        run_human_intervention(&args, self.responder.as_ref()).await
    }
}

/// Tools whose category requires a cached or freshly asked approval before
/// they are allowed to run.
fn requires_approval(tool_name: &str) -> bool {
    tool_name == TOOL_SHELL_CMD
}

/// Validate → approve → dispatch pipeline over the built-in and registered
/// tools.
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
    approval: ApprovalCache,
    hitl: Arc<dyn HitlResponder>,
}

impl ToolExecutor {
    /// Builds an executor with the built-in tools registered (`shell_cmd`,
    /// `human_intervention_request`).
    pub fn new(hitl: Arc<dyn HitlResponder>) -> Self {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert(TOOL_SHELL_CMD.to_string(), Arc::new(ShellCmdTool));
        tools.insert(
            TOOL_HUMAN_INTERVENTION_REQUEST.to_string(),
            Arc::new(HumanInterventionTool { responder: hitl.clone() }),
        );
        Self {
            tools,
            approval: ApprovalCache::new(),
            hitl,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// Splits raw tool calls into the ones worth executing and a synthesized
    /// `role:"tool"` error message for each malformed one (empty/whitespace
    /// name), per spec §4.6 "validate".
    pub fn validate(&self, calls: &[ToolCall]) -> (Vec<ToolCall>, Vec<AgentMessage>) {
        let mut valid = Vec::new();
        let mut errors = Vec::new();
        for call in calls {
            if call.name.trim().is_empty() {
                errors.push(AgentMessage::tool(
                    format!("Error: Malformed tool call - empty or missing tool name. Tool call ID: {}", call.id),
                    call.id.clone(),
                ));
            } else {
                valid.push(call.clone());
            }
        }
        (valid, errors)
    }

    /// Executes one already-validated call, consulting (and populating) the
    /// approval cache first when the tool requires it. Honors
    /// `ctx.cancellation` on a best-effort basis (spec §5): checked before
    /// dispatch here, and raced against the run itself by tools that support
    /// it (`ShellCmdTool`).
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolCallContext) -> AgentMessage {
        if ctx.cancellation.is_cancelled() {
            return AgentMessage::tool(ToolSourceError::Canceled.to_string(), call.id.clone());
        }

        let Some(tool) = self.tools.get(&call.name) else {
            return AgentMessage::tool(
                format!("Error: unknown tool \"{}\"", call.name),
                call.id.clone(),
            );
        };

        if requires_approval(&call.name) {
            let chat_id = ctx.chat_id.clone().unwrap_or_default();
            let approved = match self.approval.get(&chat_id, &call.name) {
                Some(entry) => entry.approved,
                None => {
                    let approved = self.ask_for_approval(&call.name).await;
                    self.approval.set(&chat_id, &call.name, approved);
                    approved
                }
            };
            if !approved {
                return AgentMessage::tool(
                    format!("Error: execution of \"{}\" was not approved", call.name),
                    call.id.clone(),
                );
            }
        }

        match tool.call(call.parsed_arguments(), Some(ctx)).await {
            Ok(content) => AgentMessage::tool(content.text, call.id.clone()),
            Err(err) => AgentMessage::tool(format!("Error: {err}"), call.id.clone()),
        }
    }

    async fn ask_for_approval(&self, tool_name: &str) -> bool {
        use crate::tools::hitl::HitlRequest;
        let resolution = self
            .hitl
            .resolve(&HitlRequest {
                request_id: uuid::Uuid::new_v4().to_string(),
                question: format!("Allow the agent to run tool \"{tool_name}\"?"),
                options: vec!["Approve".to_string(), "Deny".to_string()],
                default_option: Some("Deny".to_string()),
                timeout_ms: None,
            })
            .await;
        resolution.selected_option.as_deref() == Some("Approve")
    }
}
