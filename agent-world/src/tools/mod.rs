//! Built-in tools and the Tool Executor.

pub mod approval;
pub mod executor;
pub mod hitl;
pub mod shell;
pub mod spec;

pub use executor::{Tool, ToolExecutor, TOOL_HUMAN_INTERVENTION_REQUEST};
pub use hitl::{AutoTimeoutResponder, HitlRequest, HitlResolution, HitlResponder, HitlSource, ScriptedHitlResponder};
pub use shell::{ShellCmdTool, TOOL_SHELL_CMD};
pub use spec::{ToolCallContent, ToolCallContext, ToolSpec};
