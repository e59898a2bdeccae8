//! `shell_cmd` built-in tool.
//!
//! Grounded on the teacher's `BashTool` (`graphweave/src/tools/bash/mod.rs`):
//! same `tokio::process::Command` shell-invocation shape, generalized from a
//! single `command` string to the spec's `command + parameters[] + directory`.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::error::ToolSourceError;
use crate::tools::executor::Tool;
use crate::tools::spec::{ToolCallContent, ToolCallContext, ToolSpec};

pub const TOOL_SHELL_CMD: &str = "shell_cmd";

#[derive(Serialize)]
struct ShellCmdContentBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Serialize)]
struct ShellCmdDetails {
    #[serde(rename = "exitCode")]
    exit_code: i32,
    duration: u128,
}

#[derive(Serialize)]
struct ShellCmdResult {
    content: Vec<ShellCmdContentBlock>,
    details: ShellCmdDetails,
}

pub struct ShellCmdTool;

#[async_trait]
impl Tool for ShellCmdTool {
    fn name(&self) -> &str {
        TOOL_SHELL_CMD
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SHELL_CMD.to_string(),
            description: Some(
                "Runs a shell command with optional arguments and working directory, \
                 returning combined stdout/stderr and the process exit code."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The executable or shell command to run."},
                    "parameters": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Arguments appended to the command."
                    },
                    "directory": {"type": "string", "description": "Working directory for the command."}
                },
                "required": ["command"]
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolSourceError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolSourceError::InvalidArguments("missing command".to_string()))?;
        let parameters: Vec<String> = args
            .get("parameters")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let directory = args.get("directory").and_then(|v| v.as_str());

        let mut cmd = build_command(command, &parameters);
        if let Some(dir) = directory {
            cmd.current_dir(dir);
        }

        let cancellation = ctx.map(|c| c.cancellation.clone()).unwrap_or_default();
        let start = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| ToolSourceError::ExecutionFailed(format!("failed to run command: {e}")))?;

        // `kill_on_drop(true)` on `build_command` means losing this race drops
        // `child` and Tokio sends it a kill signal.
        let output = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(ToolSourceError::Canceled),
            result = child.wait_with_output() => {
                result.map_err(|e| ToolSourceError::ExecutionFailed(format!("failed to run command: {e}")))?
            }
        };
        let duration = start.elapsed().as_millis();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let text = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            stderr
        } else {
            format!("{stdout}\n{stderr}")
        };

        let result = ShellCmdResult {
            content: vec![ShellCmdContentBlock { kind: "text", text }],
            details: ShellCmdDetails {
                exit_code: output.status.code().unwrap_or(-1),
                duration,
            },
        };

        Ok(ToolCallContent {
            text: serde_json::to_string(&result)
                .map_err(|e| ToolSourceError::ExecutionFailed(e.to_string()))?,
        })
    }
}

#[cfg(unix)]
fn build_command(command: &str, parameters: &[String]) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    let mut full = command.to_string();
    for param in parameters {
        full.push(' ');
        full.push_str(param);
    }
    cmd.arg("-c").arg(full);
    cmd.kill_on_drop(true);
    cmd
}

#[cfg(windows)]
fn build_command(command: &str, parameters: &[String]) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    let mut full = command.to_string();
    for param in parameters {
        full.push(' ');
        full.push_str(param);
    }
    cmd.args(["/C", &full]);
    cmd.kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_echo_and_captures_stdout() {
        let tool = ShellCmdTool;
        let result = tool
            .call(json!({"command": "echo", "parameters": ["hi"]}), None)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert!(parsed["content"][0]["text"].as_str().unwrap().contains("hi"));
        assert_eq!(parsed["details"]["exitCode"], 0);
    }

    #[tokio::test]
    async fn missing_command_is_rejected() {
        let tool = ShellCmdTool;
        let result = tool.call(json!({}), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn canceled_before_start_aborts_without_running() {
        let tool = ShellCmdTool;
        let ctx = ToolCallContext::default();
        ctx.cancellation.cancel();
        let result = tool
            .call(json!({"command": "sleep", "parameters": ["5"]}), Some(&ctx))
            .await;
        assert!(matches!(result, Err(ToolSourceError::Canceled)));
    }
}
