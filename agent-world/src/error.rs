//! Error taxonomy for the agent-world runtime.
//!
//! `WorldError` is the crate-boundary error type; `StorageError` and
//! `ToolSourceError` are narrower sub-enums used by the storage and tool
//! executor subsystems and converted into `WorldError` via `#[from]` at the
//! seams that need it.

use thiserror::Error;

/// Errors from a `Storage` backend (file-tree or SQL).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io: {0}")]
    Io(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
}

/// Errors from tool lookup/execution in the Tool Executor.
#[derive(Debug, Error)]
pub enum ToolSourceError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("tool call canceled")]
    Canceled,
}

/// Crate-wide error type returned from the public World/Agent/Chat API and
/// from the Orchestrator.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("canceled")]
    Canceled,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tool(#[from] ToolSourceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_display_all_variants() {
        assert!(StorageError::Io("disk full".into())
            .to_string()
            .to_lowercase()
            .contains("io"));
        assert!(StorageError::Serialization("bad json".into())
            .to_string()
            .to_lowercase()
            .contains("serialization"));
        assert!(StorageError::NotFound("world-1".into())
            .to_string()
            .contains("world-1"));
        assert!(StorageError::Integrity("dangling ref".into())
            .to_string()
            .to_lowercase()
            .contains("integrity"));
    }

    #[test]
    fn tool_source_error_display_all_variants() {
        assert!(ToolSourceError::NotFound("shell_cmd".into())
            .to_string()
            .contains("shell_cmd"));
        assert!(ToolSourceError::InvalidArguments("missing command".into())
            .to_string()
            .to_lowercase()
            .contains("invalid"));
        assert!(ToolSourceError::ExecutionFailed("exit 1".into())
            .to_string()
            .to_lowercase()
            .contains("failed"));
        assert!(ToolSourceError::Canceled
            .to_string()
            .to_lowercase()
            .contains("canceled"));
    }

    #[test]
    fn world_error_display_all_variants() {
        assert!(WorldError::NotFound("agent-1".into())
            .to_string()
            .contains("agent-1"));
        assert!(WorldError::Conflict("world-1".into())
            .to_string()
            .to_lowercase()
            .contains("conflict"));
        assert!(WorldError::Validation("bad turn limit".into())
            .to_string()
            .to_lowercase()
            .contains("validation"));
        assert!(WorldError::Provider("rate limited".into())
            .to_string()
            .to_lowercase()
            .contains("provider"));
        assert!(WorldError::Canceled.to_string().to_lowercase().contains("canceled"));
    }

    #[test]
    fn world_error_wraps_storage_and_tool_errors() {
        let e: WorldError = StorageError::NotFound("x".into()).into();
        assert!(e.to_string().contains("x"));
        let e: WorldError = ToolSourceError::Canceled.into();
        assert!(e.to_string().to_lowercase().contains("canceled"));
    }
}
