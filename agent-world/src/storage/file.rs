//! File-tree storage backend.
//!
//! Layout under `root`:
//!
//! ```text
//! <root>/<worldId>/world.json
//! <root>/<worldId>/agents/<agentId>/config.json
//! <root>/<worldId>/agents/<agentId>/memory.jsonl
//! <root>/<worldId>/agents/<agentId>/system-prompt.md
//! <root>/<worldId>/chats/<chatId>/meta.json
//! <root>/<worldId>/chats/<chatId>/messages.jsonl
//! <root>/<worldId>/archives/<archiveId>/meta.json
//! <root>/<worldId>/archives/<archiveId>/messages.jsonl
//! ```
//!
//! Every write goes through `write_atomic`: write to a sibling temp file, then
//! rename over the destination, so a crash mid-write never leaves a
//! half-written file behind. `memory.jsonl`
//! is rewritten wholesale on every save rather than appended to, matching
//! `Storage::save_agent_memory`'s full-replace contract.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::agent::Agent;
use crate::archive::{ArchiveExportOptions, ArchiveMetadata, ArchiveQuery, MemoryArchive};
use crate::chat::{Chat, WorldChat};
use crate::error::StorageError;
use crate::message::AgentMessage;
use crate::world::WorldConfig;

use super::Storage;

fn to_io_err(e: std::io::Error) -> StorageError {
    StorageError::Io(e.to_string())
}

fn to_ser_err(e: serde_json::Error) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Durable file-tree `Storage` implementation, the default for single-process
/// / local deployments.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn world_dir(&self, world_id: &str) -> PathBuf {
        self.root.join(world_id)
    }

    fn world_file(&self, world_id: &str) -> PathBuf {
        self.world_dir(world_id).join("world.json")
    }

    fn agents_dir(&self, world_id: &str) -> PathBuf {
        self.world_dir(world_id).join("agents")
    }

    fn agent_dir(&self, world_id: &str, agent_id: &str) -> PathBuf {
        self.agents_dir(world_id).join(agent_id)
    }

    fn agent_config_file(&self, world_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(world_id, agent_id).join("config.json")
    }

    fn agent_memory_file(&self, world_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(world_id, agent_id).join("memory.jsonl")
    }

    fn agent_system_prompt_file(&self, world_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(world_id, agent_id).join("system-prompt.md")
    }

    fn chats_dir(&self, world_id: &str) -> PathBuf {
        self.world_dir(world_id).join("chats")
    }

    fn chat_dir(&self, world_id: &str, chat_id: &str) -> PathBuf {
        self.chats_dir(world_id).join(chat_id)
    }

    fn chat_meta_file(&self, world_id: &str, chat_id: &str) -> PathBuf {
        self.chat_dir(world_id, chat_id).join("meta.json")
    }

    fn archives_dir(&self, world_id: &str) -> PathBuf {
        self.world_dir(world_id).join("archives")
    }

    fn archive_dir(&self, world_id: &str, archive_id: &str) -> PathBuf {
        self.archives_dir(world_id).join(archive_id)
    }
}

/// Writes `contents` to `path` via a sibling temp file + rename, so readers
/// never observe a partially-written file.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(to_io_err)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
        uuid::Uuid::new_v4()
    ));
    fs::write(&tmp_path, contents).await.map_err(to_io_err)?;
    fs::rename(&tmp_path, path).await.map_err(to_io_err)?;
    Ok(())
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let contents = serde_json::to_vec_pretty(value).map_err(to_ser_err)?;
    write_atomic(path, &contents).await
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(to_ser_err)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(to_io_err(e)),
    }
}

async fn write_jsonl(path: &Path, messages: &[AgentMessage]) -> Result<(), StorageError> {
    let mut buf = Vec::new();
    for message in messages {
        serde_json::to_writer(&mut buf, message).map_err(to_ser_err)?;
        buf.push(b'\n');
    }
    write_atomic(path, &buf).await
}

async fn read_jsonl(path: &Path) -> Result<Vec<AgentMessage>, StorageError> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let mut messages = Vec::new();
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                messages.push(serde_json::from_str(line).map_err(to_ser_err)?);
            }
            Ok(messages)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(to_io_err(e)),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(to_io_err(e)),
    }
}

async fn list_dir_names(path: &Path) -> Result<Vec<String>, StorageError> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(to_io_err(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(to_io_err)? {
        if entry.file_type().await.map_err(to_io_err)?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

impl FileStorage {
    async fn load_agent_inner(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        let Some(mut agent) = read_json::<Agent>(&self.agent_config_file(world_id, agent_id)).await? else {
            return Ok(None);
        };
        agent.memory = read_jsonl(&self.agent_memory_file(world_id, agent_id)).await?;
        if let Ok(prompt) = fs::read_to_string(self.agent_system_prompt_file(world_id, agent_id)).await {
            agent.system_prompt = Some(prompt);
        }
        Ok(Some(agent))
    }

    async fn save_agent_inner(&self, agent: &Agent) -> Result<(), StorageError> {
        write_json(&self.agent_config_file(&agent.world_id, &agent.id), agent).await?;
        write_jsonl(&self.agent_memory_file(&agent.world_id, &agent.id), &agent.memory).await?;
        if let Some(ref prompt) = agent.system_prompt {
            write_atomic(&self.agent_system_prompt_file(&agent.world_id, &agent.id), prompt.as_bytes()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save_world(&self, world: &WorldConfig) -> Result<(), StorageError> {
        write_json(&self.world_file(&world.id), world).await
    }

    async fn load_world(&self, id: &str) -> Result<Option<WorldConfig>, StorageError> {
        read_json(&self.world_file(id)).await
    }

    async fn delete_world(&self, id: &str) -> Result<(), StorageError> {
        remove_dir_if_exists(&self.world_dir(id)).await
    }

    async fn list_worlds(&self) -> Result<Vec<WorldConfig>, StorageError> {
        let mut worlds = Vec::new();
        for id in list_dir_names(&self.root).await? {
            if let Some(world) = self.load_world(&id).await? {
                worlds.push(world);
            }
        }
        Ok(worlds)
    }

    async fn save_agent(&self, agent: &Agent) -> Result<(), StorageError> {
        self.save_agent_inner(agent).await
    }

    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        self.load_agent_inner(world_id, agent_id).await
    }

    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError> {
        remove_dir_if_exists(&self.agent_dir(world_id, agent_id)).await
    }

    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError> {
        let mut agents = Vec::new();
        for id in list_dir_names(&self.agents_dir(world_id)).await? {
            if let Some(agent) = self.load_agent_inner(world_id, &id).await? {
                agents.push(agent);
            }
        }
        Ok(agents)
    }

    async fn save_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: &[AgentMessage],
    ) -> Result<(), StorageError> {
        write_jsonl(&self.agent_memory_file(world_id, agent_id), memory).await
    }

    async fn save_agents_batch(&self, agents: &[Agent]) -> Result<(), StorageError> {
        for agent in agents {
            self.save_agent_inner(agent).await?;
        }
        Ok(())
    }

    async fn load_agents_batch(
        &self,
        world_id: &str,
        agent_ids: &[String],
    ) -> Result<Vec<Agent>, StorageError> {
        if agent_ids.is_empty() {
            return self.list_agents(world_id).await;
        }
        let mut agents = Vec::new();
        for id in agent_ids {
            if let Some(agent) = self.load_agent_inner(world_id, id).await? {
                agents.push(agent);
            }
        }
        Ok(agents)
    }

    async fn save_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        write_json(&self.chat_meta_file(&chat.world_id, &chat.id), chat).await
    }

    async fn load_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, StorageError> {
        read_json(&self.chat_meta_file(world_id, chat_id)).await
    }

    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, StorageError> {
        let mut chats = Vec::new();
        for id in list_dir_names(&self.chats_dir(world_id)).await? {
            if let Some(chat) = self.load_chat(world_id, &id).await? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), StorageError> {
        remove_dir_if_exists(&self.chat_dir(world_id, chat_id)).await
    }

    async fn load_world_chat_full(
        &self,
        world_id: &str,
        chat_id: &str,
    ) -> Result<Option<WorldChat>, StorageError> {
        let Some(world) = self.load_world(world_id).await? else {
            return Ok(None);
        };
        let agents = self.list_agents(world_id).await?;
        Ok(Some(WorldChat::build(world, agents, chat_id)))
    }

    async fn archive_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: Vec<AgentMessage>,
        metadata: ArchiveMetadata,
    ) -> Result<String, StorageError> {
        let archive = MemoryArchive::new(world_id, agent_id, memory, metadata);
        let dir = self.archive_dir(world_id, &archive.archive_id);
        write_json(&dir.join("meta.json"), &archive).await?;
        write_jsonl(&dir.join("messages.jsonl"), &archive.messages).await?;
        Ok(archive.archive_id)
    }

    async fn search_archives(&self, query: &ArchiveQuery) -> Result<Vec<MemoryArchive>, StorageError> {
        let world_ids = match &query.world_id {
            Some(world_id) => vec![world_id.clone()],
            None => list_dir_names(&self.root).await?,
        };
        let mut out = Vec::new();
        for world_id in world_ids {
            for archive_id in list_dir_names(&self.archives_dir(&world_id)).await? {
                if let Some(archive) =
                    read_json::<MemoryArchive>(&self.archive_dir(&world_id, &archive_id).join("meta.json")).await?
                {
                    if query.matches(&archive) {
                        out.push(archive);
                    }
                }
            }
        }
        Ok(out)
    }

    async fn export_archive(
        &self,
        archive_id: &str,
        _opts: ArchiveExportOptions,
    ) -> Result<MemoryArchive, StorageError> {
        for world_id in list_dir_names(&self.root).await? {
            let meta_path = self.archive_dir(&world_id, archive_id).join("meta.json");
            if let Some(mut archive) = read_json::<MemoryArchive>(&meta_path).await? {
                archive.messages =
                    read_jsonl(&self.archive_dir(&world_id, archive_id).join("messages.jsonl")).await?;
                return Ok(archive);
            }
        }
        Err(StorageError::NotFound(archive_id.to_string()))
    }

    async fn validate_integrity(
        &self,
        world_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        let mut problems = Vec::new();
        if self.load_world(world_id).await?.is_none() {
            problems.push(format!("world not found: {world_id}"));
            return Ok(problems);
        }
        match agent_id {
            Some(agent_id) => {
                if self.load_agent(world_id, agent_id).await?.is_none() {
                    problems.push(format!("agent not found: {world_id}/{agent_id}"));
                }
            }
            None => {
                for id in list_dir_names(&self.agents_dir(world_id)).await? {
                    if read_json::<Agent>(&self.agent_config_file(world_id, &id)).await?.is_none() {
                        problems.push(format!("agent directory without config.json: {world_id}/{id}"));
                    }
                }
            }
        }
        Ok(problems)
    }

    async fn repair_data(
        &self,
        world_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        let mut repaired = Vec::new();
        if agent_id.is_none() {
            for id in list_dir_names(&self.agents_dir(world_id)).await? {
                let config_path = self.agent_config_file(world_id, &id);
                if read_json::<Agent>(&config_path).await?.is_none() {
                    remove_dir_if_exists(&self.agent_dir(world_id, &id)).await?;
                    repaired.push(format!("removed orphaned agent directory: {world_id}/{id}"));
                }
            }
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with_memory(world_id: &str, id: &str) -> Agent {
        let mut agent = Agent::new(world_id, id, id);
        agent.remember(AgentMessage::user("hello", "human"));
        agent.remember(AgentMessage::assistant("hi there", id));
        agent
    }

    #[tokio::test]
    async fn save_and_load_world_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let world = WorldConfig::new("w1", "World One");
        storage.save_world(&world).await.unwrap();
        let loaded = storage.load_world("w1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "World One");
    }

    #[tokio::test]
    async fn save_agent_round_trips_memory_and_overwrites_on_resave() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save_world(&WorldConfig::new("w1", "World One")).await.unwrap();
        let mut agent = agent_with_memory("w1", "alice");
        storage.save_agent(&agent).await.unwrap();

        agent.remember(AgentMessage::user("third", "human"));
        storage.save_agent_memory("w1", "alice", &agent.memory).await.unwrap();

        let loaded = storage.load_agent("w1", "alice").await.unwrap().unwrap();
        assert_eq!(loaded.memory.len(), 3);
        assert_eq!(loaded.memory[2].content, "third");
    }

    #[tokio::test]
    async fn deleting_world_removes_agent_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save_world(&WorldConfig::new("w1", "World One")).await.unwrap();
        storage.save_agent(&agent_with_memory("w1", "alice")).await.unwrap();

        storage.delete_world("w1").await.unwrap();

        assert!(storage.load_agent("w1", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn archive_agent_memory_persists_messages_and_export_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let messages = vec![AgentMessage::user("one", "human"), AgentMessage::user("two", "human")];
        let archive_id = storage
            .archive_agent_memory("w1", "alice", messages, ArchiveMetadata::manual_clear())
            .await
            .unwrap();

        let exported = storage
            .export_archive(&archive_id, ArchiveExportOptions::default())
            .await
            .unwrap();
        assert_eq!(exported.messages.len(), 2);
        assert_eq!(exported.messages[0].content, "one");
    }

    #[tokio::test]
    async fn validate_integrity_reports_missing_world() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let problems = storage.validate_integrity("missing-world", None).await.unwrap();
        assert!(problems.iter().any(|p| p.contains("missing-world")));
    }

    #[tokio::test]
    async fn repair_data_removes_orphaned_agent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save_world(&WorldConfig::new("w1", "World One")).await.unwrap();
        fs::create_dir_all(dir.path().join("w1/agents/ghost")).await.unwrap();

        let repaired = storage.repair_data("w1", None).await.unwrap();
        assert_eq!(repaired.len(), 1);
        assert!(!dir.path().join("w1/agents/ghost").exists());
    }
}
