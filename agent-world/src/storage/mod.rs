//! Durable storage: one trait, two interchangeable backends.
//!
//! Grounded on the teacher's `Checkpointer<S>` trait shape (`memory/checkpointer.rs`):
//! a small set of async methods returning a crate-specific error, implemented
//! once against a blocking SQLite connection (`memory/sqlite_saver.rs` /
//! `memory/sqlite_store.rs`) and once against plain files.

pub mod file;
pub mod sql;

pub use file::FileStorage;
pub use sql::SqlStorage;

use async_trait::async_trait;

use crate::agent::Agent;
use crate::archive::{ArchiveExportOptions, ArchiveMetadata, ArchiveQuery, MemoryArchive};
use crate::chat::{Chat, WorldChat};
use crate::error::StorageError;
use crate::message::AgentMessage;
use crate::world::WorldConfig;

/// Durable persistence for worlds, agents, chats and archives.
///
/// Every method is `&self`-taking and safe to call concurrently across
/// worlds; within a single world, callers serialize writes per spec §5.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save_world(&self, world: &WorldConfig) -> Result<(), StorageError>;
    async fn load_world(&self, id: &str) -> Result<Option<WorldConfig>, StorageError>;
    async fn delete_world(&self, id: &str) -> Result<(), StorageError>;
    async fn list_worlds(&self) -> Result<Vec<WorldConfig>, StorageError>;

    async fn save_agent(&self, agent: &Agent) -> Result<(), StorageError>;
    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, StorageError>;
    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError>;
    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError>;

    /// Full replace of an agent's memory rows; atomic per backend.
    async fn save_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: &[AgentMessage],
    ) -> Result<(), StorageError>;

    async fn save_agents_batch(&self, agents: &[Agent]) -> Result<(), StorageError>;
    async fn load_agents_batch(
        &self,
        world_id: &str,
        agent_ids: &[String],
    ) -> Result<Vec<Agent>, StorageError>;

    async fn save_chat(&self, chat: &Chat) -> Result<(), StorageError>;
    async fn load_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, StorageError>;
    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, StorageError>;
    async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), StorageError>;
    async fn load_world_chat_full(
        &self,
        world_id: &str,
        chat_id: &str,
    ) -> Result<Option<WorldChat>, StorageError>;

    async fn archive_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: Vec<AgentMessage>,
        metadata: ArchiveMetadata,
    ) -> Result<String, StorageError>;
    async fn search_archives(&self, query: &ArchiveQuery) -> Result<Vec<MemoryArchive>, StorageError>;
    async fn export_archive(
        &self,
        archive_id: &str,
        opts: ArchiveExportOptions,
    ) -> Result<MemoryArchive, StorageError>;

    /// Returns a list of human-readable integrity problems found (empty = clean).
    async fn validate_integrity(
        &self,
        world_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError>;

    /// Attempts to repair problems found by `validate_integrity`; returns a
    /// list of repairs performed.
    async fn repair_data(
        &self,
        world_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError>;
}

/// A no-op storage backend.
pub struct NoopStorage;

#[async_trait]
impl Storage for NoopStorage {
    async fn save_world(&self, _world: &WorldConfig) -> Result<(), StorageError> {
        Ok(())
    }
    async fn load_world(&self, _id: &str) -> Result<Option<WorldConfig>, StorageError> {
        Ok(None)
    }
    async fn delete_world(&self, _id: &str) -> Result<(), StorageError> {
        Ok(())
    }
    async fn list_worlds(&self) -> Result<Vec<WorldConfig>, StorageError> {
        Ok(Vec::new())
    }
    async fn save_agent(&self, _agent: &Agent) -> Result<(), StorageError> {
        Ok(())
    }
    async fn load_agent(&self, _world_id: &str, _agent_id: &str) -> Result<Option<Agent>, StorageError> {
        Ok(None)
    }
    async fn delete_agent(&self, _world_id: &str, _agent_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
    async fn list_agents(&self, _world_id: &str) -> Result<Vec<Agent>, StorageError> {
        Ok(Vec::new())
    }
    async fn save_agent_memory(
        &self,
        _world_id: &str,
        _agent_id: &str,
        _memory: &[AgentMessage],
    ) -> Result<(), StorageError> {
        Ok(())
    }
    async fn save_agents_batch(&self, _agents: &[Agent]) -> Result<(), StorageError> {
        Ok(())
    }
    async fn load_agents_batch(
        &self,
        _world_id: &str,
        _agent_ids: &[String],
    ) -> Result<Vec<Agent>, StorageError> {
        Ok(Vec::new())
    }
    async fn save_chat(&self, _chat: &Chat) -> Result<(), StorageError> {
        Ok(())
    }
    async fn load_chat(&self, _world_id: &str, _chat_id: &str) -> Result<Option<Chat>, StorageError> {
        Ok(None)
    }
    async fn list_chats(&self, _world_id: &str) -> Result<Vec<Chat>, StorageError> {
        Ok(Vec::new())
    }
    async fn delete_chat(&self, _world_id: &str, _chat_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
    async fn load_world_chat_full(
        &self,
        _world_id: &str,
        _chat_id: &str,
    ) -> Result<Option<WorldChat>, StorageError> {
        Ok(None)
    }
    async fn archive_agent_memory(
        &self,
        _world_id: &str,
        _agent_id: &str,
        _memory: Vec<AgentMessage>,
        _metadata: ArchiveMetadata,
    ) -> Result<String, StorageError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
    async fn search_archives(&self, _query: &ArchiveQuery) -> Result<Vec<MemoryArchive>, StorageError> {
        Ok(Vec::new())
    }
    async fn export_archive(
        &self,
        archive_id: &str,
        _opts: ArchiveExportOptions,
    ) -> Result<MemoryArchive, StorageError> {
        Err(StorageError::NotFound(archive_id.to_string()))
    }
    async fn validate_integrity(
        &self,
        _world_id: &str,
        _agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
    async fn repair_data(
        &self,
        _world_id: &str,
        _agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}
