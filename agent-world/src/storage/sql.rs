//! SQL storage backend.
//!
//! Grounded directly on the teacher's `memory::SqliteSaver`/`SqliteStore`
//! (`memory/sqlite_saver.rs`, `memory/sqlite_store.rs`): a fresh
//! `rusqlite::Connection` opened per `spawn_blocking` closure (no pool), a
//! single bootstrap transaction that creates every table if absent, and
//! `params!`-based parameterized statements throughout.
//!
//! Schema: `worlds`, `agents`, `agent_memory`, `chats`, `memory_archives`,
//! `archived_messages`, `archive_statistics`, with `ON DELETE CASCADE` foreign
//! keys so deleting a world cascades to every dependent row. Roles are
//! constrained to `system|user|assistant|tool` via a `CHECK` constraint.
//! Schema version is tracked with `PRAGMA user_version`; bootstrap
//! is idempotent (`needsMigration -> migrate -> setSchemaVersion`, spec §4.8).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::agent::{Agent, AgentStatus, ProviderConfig};
use crate::archive::{ArchiveExportOptions, ArchiveMetadata, ArchiveQuery, MemoryArchive};
use crate::chat::{Chat, WorldChat};
use crate::error::StorageError;
use crate::message::{AgentMessage, Role, ToolCall};
use crate::world::WorldConfig;

use super::Storage;

const SCHEMA_VERSION: i64 = 1;

fn to_storage_err(e: rusqlite::Error) -> StorageError {
    StorageError::Io(e.to_string())
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn str_to_role(s: &str) -> Result<Role, StorageError> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(StorageError::Integrity(format!("unknown role {other:?}"))),
    }
}

/// Durable SQLite-backed `Storage` implementation.
pub struct SqlStorage {
    db_path: PathBuf,
}

impl SqlStorage {
    /// Opens (creating if absent) the database at `path` and runs the
    /// bootstrap migration.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let conn = Connection::open(&db_path).map_err(to_storage_err)?;
        bootstrap(&conn)?;
        Ok(Self { db_path })
    }

    fn open(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.db_path).map_err(to_storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(to_storage_err)?;
        Ok(conn)
    }
}

/// Single transactional bootstrap: every `CREATE TABLE IF NOT EXISTS`, plus
/// `needsMigration -> migrate -> setSchemaVersion`.
fn bootstrap(conn: &Connection) -> Result<(), StorageError> {
    let current_version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(to_storage_err)?;
    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        BEGIN;

        CREATE TABLE IF NOT EXISTS worlds (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            turn_limit INTEGER NOT NULL DEFAULT 5,
            current_chat_id TEXT,
            chat_llm_provider TEXT,
            chat_llm_model TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agents (
            world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            status TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            system_prompt TEXT,
            temperature REAL,
            max_tokens INTEGER,
            provider_config TEXT NOT NULL,
            llm_call_count INTEGER NOT NULL DEFAULT 0,
            last_llm_call TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (world_id, id)
        );

        CREATE TABLE IF NOT EXISTS agent_memory (
            world_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('system','user','assistant','tool')),
            content TEXT NOT NULL,
            sender TEXT,
            tool_call_id TEXT,
            tool_calls TEXT,
            created_at TEXT NOT NULL,
            chat_id TEXT,
            message_id TEXT,
            reply_to_message_id TEXT,
            PRIMARY KEY (world_id, agent_id, seq),
            FOREIGN KEY (world_id, agent_id) REFERENCES agents(world_id, id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS chats (
            world_id TEXT NOT NULL REFERENCES worlds(id) ON DELETE CASCADE,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            message_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (world_id, id)
        );

        CREATE TABLE IF NOT EXISTS memory_archives (
            archive_id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            world_id TEXT NOT NULL,
            session_name TEXT,
            reason TEXT NOT NULL,
            message_count INTEGER NOT NULL,
            start_time TEXT,
            end_time TEXT,
            participants TEXT NOT NULL,
            tags TEXT NOT NULL,
            summary TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS archived_messages (
            archive_id TEXT NOT NULL REFERENCES memory_archives(archive_id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('system','user','assistant','tool')),
            content TEXT NOT NULL,
            sender TEXT,
            tool_call_id TEXT,
            tool_calls TEXT,
            created_at TEXT NOT NULL,
            chat_id TEXT,
            message_id TEXT,
            reply_to_message_id TEXT,
            PRIMARY KEY (archive_id, seq)
        );

        CREATE TABLE IF NOT EXISTS archive_statistics (
            archive_id TEXT NOT NULL REFERENCES memory_archives(archive_id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('system','user','assistant','tool')),
            message_count INTEGER NOT NULL,
            PRIMARY KEY (archive_id, role)
        );

        COMMIT;
        "#,
    )
    .map_err(to_storage_err)?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(to_storage_err)?;
    Ok(())
}

fn serialize_tool_calls(calls: &[ToolCall]) -> Result<String, StorageError> {
    serde_json::to_string(calls).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn deserialize_tool_calls(raw: Option<String>) -> Result<Vec<ToolCall>, StorageError> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) => serde_json::from_str(&s).map_err(|e| StorageError::Serialization(e.to_string())),
    }
}

fn message_row(world_id: &str, agent_id: &str, seq: i64, message: &AgentMessage) -> Result<MessageRow, StorageError> {
    Ok(MessageRow {
        world_id: world_id.to_string(),
        agent_id: agent_id.to_string(),
        seq,
        role: role_to_str(message.role).to_string(),
        content: message.content.clone(),
        sender: message.sender.clone(),
        tool_call_id: message.tool_call_id.clone(),
        tool_calls: serialize_tool_calls(&message.tool_calls)?,
        created_at: rfc3339(&message.created_at),
        chat_id: message.chat_id.clone(),
        message_id: message.message_id.clone(),
        reply_to_message_id: message.reply_to_message_id.clone(),
    })
}

struct MessageRow {
    world_id: String,
    agent_id: String,
    seq: i64,
    role: String,
    content: String,
    sender: Option<String>,
    tool_call_id: Option<String>,
    tool_calls: String,
    created_at: String,
    chat_id: Option<String>,
    message_id: Option<String>,
    reply_to_message_id: Option<String>,
}

fn row_to_message(
    role: String,
    content: String,
    sender: Option<String>,
    tool_call_id: Option<String>,
    tool_calls: Option<String>,
    created_at: String,
    chat_id: Option<String>,
    message_id: Option<String>,
    reply_to_message_id: Option<String>,
) -> Result<AgentMessage, StorageError> {
    Ok(AgentMessage {
        role: str_to_role(&role)?,
        content,
        sender,
        tool_call_id,
        tool_calls: deserialize_tool_calls(tool_calls)?,
        created_at: parse_rfc3339(&created_at)?,
        chat_id,
        message_id,
        reply_to_message_id,
    })
}

fn world_from_row(
    id: String,
    name: String,
    description: Option<String>,
    turn_limit: i64,
    current_chat_id: Option<String>,
    chat_llm_provider: Option<String>,
    chat_llm_model: Option<String>,
    created_at: String,
    updated_at: String,
) -> Result<WorldConfig, StorageError> {
    Ok(WorldConfig {
        id,
        name,
        description,
        turn_limit: turn_limit as u32,
        current_chat_id,
        chat_llm_provider,
        chat_llm_model,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
    })
}

#[allow(clippy::too_many_arguments)]
fn agent_from_row(
    world_id: String,
    id: String,
    name: String,
    agent_type: String,
    status: String,
    provider: String,
    model: String,
    system_prompt: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
    provider_config: String,
    llm_call_count: i64,
    last_llm_call: Option<String>,
    created_at: String,
    updated_at: String,
) -> Result<Agent, StorageError> {
    let status = match status.as_str() {
        "active" => AgentStatus::Active,
        "inactive" => AgentStatus::Inactive,
        other => return Err(StorageError::Integrity(format!("unknown agent status {other:?}"))),
    };
    let provider_config: ProviderConfig =
        serde_json::from_str(&provider_config).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Agent {
        id,
        world_id,
        name,
        agent_type,
        status,
        provider,
        model,
        system_prompt,
        temperature: temperature.map(|t| t as f32),
        max_tokens: max_tokens.map(|m| m as u32),
        provider_config,
        llm_call_count: llm_call_count as u32,
        last_llm_call: last_llm_call.map(|s| parse_rfc3339(&s)).transpose()?,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
        memory: Vec::new(),
    })
}

fn load_memory_sync(conn: &Connection, world_id: &str, agent_id: &str) -> Result<Vec<AgentMessage>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT role, content, sender, tool_call_id, tool_calls, created_at, chat_id, message_id, \
             reply_to_message_id FROM agent_memory WHERE world_id = ?1 AND agent_id = ?2 ORDER BY seq ASC",
        )
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map(params![world_id, agent_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })
        .map_err(to_storage_err)?;
    let mut messages = Vec::new();
    for row in rows {
        let (role, content, sender, tool_call_id, tool_calls, created_at, chat_id, message_id, reply_to) =
            row.map_err(to_storage_err)?;
        messages.push(row_to_message(
            role, content, sender, tool_call_id, tool_calls, created_at, chat_id, message_id, reply_to,
        )?);
    }
    Ok(messages)
}

#[async_trait]
impl Storage for SqlStorage {
    async fn save_world(&self, world: &WorldConfig) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let world = world.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute(
                "INSERT INTO worlds (id, name, description, turn_limit, current_chat_id, \
                 chat_llm_provider, chat_llm_model, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(id) DO UPDATE SET name=excluded.name, description=excluded.description, \
                 turn_limit=excluded.turn_limit, current_chat_id=excluded.current_chat_id, \
                 chat_llm_provider=excluded.chat_llm_provider, chat_llm_model=excluded.chat_llm_model, \
                 updated_at=excluded.updated_at",
                params![
                    world.id,
                    world.name,
                    world.description,
                    world.turn_limit as i64,
                    world.current_chat_id,
                    world.chat_llm_provider,
                    world.chat_llm_model,
                    rfc3339(&world.created_at),
                    rfc3339(&world.updated_at),
                ],
            )
            .map_err(to_storage_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn load_world(&self, id: &str) -> Result<Option<WorldConfig>, StorageError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.query_row(
                "SELECT id, name, description, turn_limit, current_chat_id, chat_llm_provider, \
                 chat_llm_model, created_at, updated_at FROM worlds WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(to_storage_err)?
            .map(|(id, name, description, turn_limit, current_chat_id, provider, model, created_at, updated_at)| {
                world_from_row(id, name, description, turn_limit, current_chat_id, provider, model, created_at, updated_at)
            })
            .transpose()
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn delete_world(&self, id: &str) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(to_storage_err)?;
            conn.execute("DELETE FROM worlds WHERE id = ?1", params![id])
                .map_err(to_storage_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn list_worlds(&self) -> Result<Vec<WorldConfig>, StorageError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, turn_limit, current_chat_id, chat_llm_provider, \
                     chat_llm_model, created_at, updated_at FROM worlds ORDER BY id ASC",
                )
                .map_err(to_storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                })
                .map_err(to_storage_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, name, description, turn_limit, current_chat_id, provider, model, created_at, updated_at) =
                    row.map_err(to_storage_err)?;
                out.push(world_from_row(
                    id, name, description, turn_limit, current_chat_id, provider, model, created_at, updated_at,
                )?);
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn save_agent(&self, agent: &Agent) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let agent = agent.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(to_storage_err)?;
            save_agent_sync(&conn, &agent)?;
            save_memory_sync(&conn, &agent.world_id, &agent.id, &agent.memory)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            load_agent_sync(&conn, &world_id, &agent_id)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(to_storage_err)?;
            conn.execute(
                "DELETE FROM agents WHERE world_id = ?1 AND id = ?2",
                params![world_id, agent_id],
            )
            .map_err(to_storage_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let ids: Vec<String> = {
                let mut stmt = conn
                    .prepare("SELECT id FROM agents WHERE world_id = ?1 ORDER BY id ASC")
                    .map_err(to_storage_err)?;
                let rows = stmt.query_map(params![world_id], |row| row.get::<_, String>(0)).map_err(to_storage_err)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)?
            };
            let mut out = Vec::new();
            for id in ids {
                if let Some(agent) = load_agent_sync(&conn, &world_id, &id)? {
                    out.push(agent);
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn save_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: &[AgentMessage],
    ) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        let memory = memory.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(to_storage_err)?;
            save_memory_sync(&conn, &world_id, &agent_id, &memory)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn save_agents_batch(&self, agents: &[Agent]) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let agents = agents.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(to_storage_err)?;
            let tx = conn.transaction().map_err(to_storage_err)?;
            for agent in &agents {
                save_agent_sync(&tx, agent)?;
                save_memory_sync(&tx, &agent.world_id, &agent.id, &agent.memory)?;
            }
            tx.commit().map_err(to_storage_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn load_agents_batch(
        &self,
        world_id: &str,
        agent_ids: &[String],
    ) -> Result<Vec<Agent>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let agent_ids = agent_ids.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let ids = if agent_ids.is_empty() {
                let mut stmt = conn
                    .prepare("SELECT id FROM agents WHERE world_id = ?1 ORDER BY id ASC")
                    .map_err(to_storage_err)?;
                let rows = stmt.query_map(params![world_id], |row| row.get::<_, String>(0)).map_err(to_storage_err)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)?
            } else {
                agent_ids
            };
            let mut out = Vec::new();
            for id in ids {
                if let Some(agent) = load_agent_sync(&conn, &world_id, &id)? {
                    out.push(agent);
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn save_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let chat = chat.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(to_storage_err)?;
            conn.execute(
                "INSERT INTO chats (world_id, id, name, description, message_count, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(world_id, id) DO UPDATE SET name=excluded.name, description=excluded.description, \
                 message_count=excluded.message_count, updated_at=excluded.updated_at",
                params![
                    chat.world_id,
                    chat.id,
                    chat.name,
                    chat.description,
                    chat.message_count as i64,
                    rfc3339(&chat.created_at),
                    rfc3339(&chat.updated_at),
                ],
            )
            .map_err(to_storage_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn load_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let chat_id = chat_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            load_chat_sync(&conn, &world_id, &chat_id)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, message_count, created_at, updated_at FROM chats \
                     WHERE world_id = ?1 ORDER BY id ASC",
                )
                .map_err(to_storage_err)?;
            let rows = stmt
                .query_map(params![world_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .map_err(to_storage_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, name, description, message_count, created_at, updated_at) = row.map_err(to_storage_err)?;
                out.push(Chat {
                    id,
                    world_id: world_id.clone(),
                    name,
                    description,
                    message_count: message_count as u32,
                    created_at: parse_rfc3339(&created_at)?,
                    updated_at: parse_rfc3339(&updated_at)?,
                });
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let chat_id = chat_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            conn.execute(
                "DELETE FROM chats WHERE world_id = ?1 AND id = ?2",
                params![world_id, chat_id],
            )
            .map_err(to_storage_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn load_world_chat_full(
        &self,
        world_id: &str,
        chat_id: &str,
    ) -> Result<Option<WorldChat>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let chat_id = chat_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let Some(world) = conn
                .query_row(
                    "SELECT id, name, description, turn_limit, current_chat_id, chat_llm_provider, \
                     chat_llm_model, created_at, updated_at FROM worlds WHERE id = ?1",
                    params![world_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, String>(8)?,
                        ))
                    },
                )
                .optional()
                .map_err(to_storage_err)?
            else {
                return Ok(None);
            };
            let world = world_from_row(
                world.0, world.1, world.2, world.3, world.4, world.5, world.6, world.7, world.8,
            )?;

            let ids: Vec<String> = {
                let mut stmt = conn
                    .prepare("SELECT id FROM agents WHERE world_id = ?1 ORDER BY id ASC")
                    .map_err(to_storage_err)?;
                let rows = stmt.query_map(params![world_id], |row| row.get::<_, String>(0)).map_err(to_storage_err)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)?
            };
            let mut agents = Vec::new();
            for id in ids {
                if let Some(agent) = load_agent_sync(&conn, &world_id, &id)? {
                    agents.push(agent);
                }
            }
            Ok(Some(WorldChat::build(world, agents, &chat_id)))
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn archive_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: Vec<AgentMessage>,
        metadata: ArchiveMetadata,
    ) -> Result<String, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::spawn_blocking(move || {
            let archive = MemoryArchive::new(world_id, agent_id, memory, metadata);
            let mut conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let tx = conn.transaction().map_err(to_storage_err)?;
            tx.execute(
                "INSERT INTO memory_archives (archive_id, agent_id, world_id, session_name, reason, \
                 message_count, start_time, end_time, participants, tags, summary, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    archive.archive_id,
                    archive.agent_id,
                    archive.world_id,
                    archive.session_name,
                    archive.reason,
                    archive.message_count as i64,
                    archive.start_time.map(|t| rfc3339(&t)),
                    archive.end_time.map(|t| rfc3339(&t)),
                    serde_json::to_string(&archive.participants).map_err(|e| StorageError::Serialization(e.to_string()))?,
                    serde_json::to_string(&archive.tags).map_err(|e| StorageError::Serialization(e.to_string()))?,
                    archive.summary,
                    rfc3339(&archive.created_at),
                ],
            )
            .map_err(to_storage_err)?;
            for (seq, message) in archive.messages.iter().enumerate() {
                let row = message_row(&archive.world_id, &archive.agent_id, seq as i64, message)?;
                tx.execute(
                    "INSERT INTO archived_messages (archive_id, seq, role, content, sender, tool_call_id, \
                     tool_calls, created_at, chat_id, message_id, reply_to_message_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        archive.archive_id,
                        row.seq,
                        row.role,
                        row.content,
                        row.sender,
                        row.tool_call_id,
                        row.tool_calls,
                        row.created_at,
                        row.chat_id,
                        row.message_id,
                        row.reply_to_message_id,
                    ],
                )
                .map_err(to_storage_err)?;
            }
            let mut counts_by_role: std::collections::BTreeMap<&'static str, i64> = std::collections::BTreeMap::new();
            for message in &archive.messages {
                *counts_by_role.entry(role_to_str(message.role)).or_insert(0) += 1;
            }
            for (role, count) in counts_by_role {
                tx.execute(
                    "INSERT INTO archive_statistics (archive_id, role, message_count) VALUES (?1, ?2, ?3)",
                    params![archive.archive_id, role, count],
                )
                .map_err(to_storage_err)?;
            }
            tx.commit().map_err(to_storage_err)?;
            Ok(archive.archive_id)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn search_archives(&self, query: &ArchiveQuery) -> Result<Vec<MemoryArchive>, StorageError> {
        let db_path = self.db_path.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let ids: Vec<String> = {
                let mut stmt = conn
                    .prepare("SELECT archive_id FROM memory_archives ORDER BY created_at ASC")
                    .map_err(to_storage_err)?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(to_storage_err)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)?
            };
            let mut out = Vec::new();
            for id in ids {
                if let Some(archive) = load_archive_sync(&conn, &id)? {
                    if query.matches(&archive) {
                        out.push(archive);
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn export_archive(
        &self,
        archive_id: &str,
        _opts: ArchiveExportOptions,
    ) -> Result<MemoryArchive, StorageError> {
        let db_path = self.db_path.clone();
        let archive_id = archive_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            load_archive_sync(&conn, &archive_id)?
                .ok_or_else(|| StorageError::NotFound(archive_id.clone()))
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn validate_integrity(
        &self,
        world_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        let db_path = self.db_path.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(to_storage_err)?;
            let mut problems = Vec::new();
            let mut stmt = conn.prepare("PRAGMA foreign_key_check").map_err(to_storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(format!(
                        "foreign key violation in table {}",
                        row.get::<_, String>(0)?
                    ))
                })
                .map_err(to_storage_err)?;
            for row in rows {
                problems.push(row.map_err(to_storage_err)?);
            }
            if let Some(agent_id) = &agent_id {
                let exists: Option<String> = conn
                    .query_row(
                        "SELECT id FROM agents WHERE world_id = ?1 AND id = ?2",
                        params![world_id, agent_id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(to_storage_err)?;
                if exists.is_none() {
                    problems.push(format!("agent not found: {world_id}/{agent_id}"));
                }
            }
            Ok(problems)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    async fn repair_data(
        &self,
        world_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        // SQLite's own foreign-key enforcement prevents the dangling rows a
        // file-tree backend can accumulate; there is nothing to repair beyond
        // what `validate_integrity` already reports.
        self.validate_integrity(world_id, agent_id).await
    }
}

fn save_agent_sync(conn: &Connection, agent: &Agent) -> Result<(), StorageError> {
    let status = match agent.status {
        AgentStatus::Active => "active",
        AgentStatus::Inactive => "inactive",
    };
    let provider_config = serde_json::to_string(&agent.provider_config)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO agents (world_id, id, name, agent_type, status, provider, model, system_prompt, \
         temperature, max_tokens, provider_config, llm_call_count, last_llm_call, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
         ON CONFLICT(world_id, id) DO UPDATE SET name=excluded.name, agent_type=excluded.agent_type, \
         status=excluded.status, provider=excluded.provider, model=excluded.model, \
         system_prompt=excluded.system_prompt, temperature=excluded.temperature, \
         max_tokens=excluded.max_tokens, provider_config=excluded.provider_config, \
         llm_call_count=excluded.llm_call_count, last_llm_call=excluded.last_llm_call, \
         updated_at=excluded.updated_at",
        params![
            agent.world_id,
            agent.id,
            agent.name,
            agent.agent_type,
            status,
            agent.provider,
            agent.model,
            agent.system_prompt,
            agent.temperature.map(|t| t as f64),
            agent.max_tokens.map(|m| m as i64),
            provider_config,
            agent.llm_call_count as i64,
            agent.last_llm_call.map(|t| rfc3339(&t)),
            rfc3339(&agent.created_at),
            rfc3339(&agent.updated_at),
        ],
    )
    .map_err(to_storage_err)?;
    Ok(())
}

fn load_agent_sync(conn: &Connection, world_id: &str, agent_id: &str) -> Result<Option<Agent>, StorageError> {
    let row = conn
        .query_row(
            "SELECT world_id, id, name, agent_type, status, provider, model, system_prompt, temperature, \
             max_tokens, provider_config, llm_call_count, last_llm_call, created_at, updated_at \
             FROM agents WHERE world_id = ?1 AND id = ?2",
            params![world_id, agent_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<f64>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, i64>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, String>(13)?,
                    row.get::<_, String>(14)?,
                ))
            },
        )
        .optional()
        .map_err(to_storage_err)?;
    let Some((
        world_id, id, name, agent_type, status, provider, model, system_prompt, temperature, max_tokens,
        provider_config, llm_call_count, last_llm_call, created_at, updated_at,
    )) = row
    else {
        return Ok(None);
    };
    let mut agent = agent_from_row(
        world_id.clone(), id.clone(), name, agent_type, status, provider, model, system_prompt, temperature,
        max_tokens, provider_config, llm_call_count, last_llm_call, created_at, updated_at,
    )?;
    agent.memory = load_memory_sync(conn, &world_id, &id)?;
    Ok(Some(agent))
}

fn save_memory_sync(
    conn: &Connection,
    world_id: &str,
    agent_id: &str,
    memory: &[AgentMessage],
) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM agent_memory WHERE world_id = ?1 AND agent_id = ?2",
        params![world_id, agent_id],
    )
    .map_err(to_storage_err)?;
    for (seq, message) in memory.iter().enumerate() {
        let row = message_row(world_id, agent_id, seq as i64, message)?;
        conn.execute(
            "INSERT INTO agent_memory (world_id, agent_id, seq, role, content, sender, tool_call_id, \
             tool_calls, created_at, chat_id, message_id, reply_to_message_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row.world_id,
                row.agent_id,
                row.seq,
                row.role,
                row.content,
                row.sender,
                row.tool_call_id,
                row.tool_calls,
                row.created_at,
                row.chat_id,
                row.message_id,
                row.reply_to_message_id,
            ],
        )
        .map_err(to_storage_err)?;
    }
    Ok(())
}

fn load_chat_sync(conn: &Connection, world_id: &str, chat_id: &str) -> Result<Option<Chat>, StorageError> {
    conn.query_row(
        "SELECT id, name, description, message_count, created_at, updated_at FROM chats \
         WHERE world_id = ?1 AND id = ?2",
        params![world_id, chat_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    )
    .optional()
    .map_err(to_storage_err)?
    .map(|(id, name, description, message_count, created_at, updated_at)| {
        Ok(Chat {
            id,
            world_id: world_id.to_string(),
            name,
            description,
            message_count: message_count as u32,
            created_at: parse_rfc3339(&created_at)?,
            updated_at: parse_rfc3339(&updated_at)?,
        })
    })
    .transpose()
}

fn load_archive_sync(conn: &Connection, archive_id: &str) -> Result<Option<MemoryArchive>, StorageError> {
    let Some((agent_id, world_id, session_name, reason, message_count, start_time, end_time, participants, tags, summary, created_at)) =
        conn.query_row(
            "SELECT agent_id, world_id, session_name, reason, message_count, start_time, end_time, \
             participants, tags, summary, created_at FROM memory_archives WHERE archive_id = ?1",
            params![archive_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                ))
            },
        )
        .optional()
        .map_err(to_storage_err)?
    else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT role, content, sender, tool_call_id, tool_calls, created_at, chat_id, message_id, \
             reply_to_message_id FROM archived_messages WHERE archive_id = ?1 ORDER BY seq ASC",
        )
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map(params![archive_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })
        .map_err(to_storage_err)?;
    let mut messages = Vec::new();
    for row in rows {
        let (role, content, sender, tool_call_id, tool_calls, created_at, chat_id, message_id, reply_to) =
            row.map_err(to_storage_err)?;
        messages.push(row_to_message(
            role, content, sender, tool_call_id, tool_calls, created_at, chat_id, message_id, reply_to,
        )?);
    }

    Ok(Some(MemoryArchive {
        archive_id: archive_id.to_string(),
        agent_id,
        world_id,
        session_name,
        reason,
        message_count: message_count as usize,
        start_time: start_time.map(|s| parse_rfc3339(&s)).transpose()?,
        end_time: end_time.map(|s| parse_rfc3339(&s)).transpose()?,
        participants: serde_json::from_str(&participants).map_err(|e| StorageError::Serialization(e.to_string()))?,
        tags: serde_json::from_str(&tags).map_err(|e| StorageError::Serialization(e.to_string()))?,
        summary,
        created_at: parse_rfc3339(&created_at)?,
        messages,
    }))
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
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        let world = WorldConfig::new("w1", "World One");
        storage.save_world(&world).await.unwrap();
        let loaded = storage.load_world("w1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "World One");
    }

    #[tokio::test]
    async fn save_agent_round_trips_memory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        storage.save_world(&WorldConfig::new("w1", "World One")).await.unwrap();
        let agent = agent_with_memory("w1", "alice");
        storage.save_agent(&agent).await.unwrap();

        let loaded = storage.load_agent("w1", "alice").await.unwrap().unwrap();
        assert_eq!(loaded.memory.len(), 2);
        assert_eq!(loaded.memory[0].content, "hello");
    }

    #[tokio::test]
    async fn deleting_world_cascades_to_agents_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        storage.save_world(&WorldConfig::new("w1", "World One")).await.unwrap();
        storage.save_agent(&agent_with_memory("w1", "alice")).await.unwrap();

        storage.delete_world("w1").await.unwrap();

        assert!(storage.load_agent("w1", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn archive_is_immutable_and_retrievable_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        let messages = vec![AgentMessage::user("one", "human"), AgentMessage::user("two", "human")];
        let archive_id = storage
            .archive_agent_memory("w1", "alice", messages.clone(), ArchiveMetadata::manual_clear())
            .await
            .unwrap();

        let exported = storage
            .export_archive(&archive_id, ArchiveExportOptions::default())
            .await
            .unwrap();
        assert_eq!(exported.messages.len(), 2);
        assert_eq!(exported.messages[0].content, "one");
        assert_eq!(exported.messages[1].content, "two");
    }

    #[tokio::test]
    async fn archiving_records_per_role_message_counts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        let messages = vec![
            AgentMessage::user("hi", "human"),
            AgentMessage::assistant("hello", "alice"),
            AgentMessage::assistant("again", "alice"),
        ];
        let archive_id = storage
            .archive_agent_memory("w1", "alice", messages, ArchiveMetadata::manual_clear())
            .await
            .unwrap();

        let conn = storage.open().unwrap();
        let mut stmt = conn
            .prepare("SELECT role, message_count FROM archive_statistics WHERE archive_id = ?1 ORDER BY role")
            .unwrap();
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![archive_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![("assistant".to_string(), 2), ("user".to_string(), 1)]);
    }

    #[tokio::test]
    async fn deleting_archive_cascades_statistics_and_messages() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        let archive_id = storage
            .archive_agent_memory("w1", "alice", vec![AgentMessage::user("hi", "human")], ArchiveMetadata::manual_clear())
            .await
            .unwrap();

        let conn = storage.open().unwrap();
        conn.execute("DELETE FROM memory_archives WHERE archive_id = ?1", params![archive_id])
            .unwrap();

        let stats: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM archive_statistics WHERE archive_id = ?1",
                params![archive_id],
                |row| row.get(0),
            )
            .unwrap();
        let messages: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM archived_messages WHERE archive_id = ?1",
                params![archive_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stats, 0);
        assert_eq!(messages, 0);
    }

    #[tokio::test]
    async fn search_archives_filters_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        let mut metadata = ArchiveMetadata::manual_clear();
        metadata.tags = vec!["project-x".into()];
        storage
            .archive_agent_memory("w1", "alice", vec![AgentMessage::user("hi", "human")], metadata)
            .await
            .unwrap();
        storage
            .archive_agent_memory("w1", "bob", vec![AgentMessage::user("hi", "human")], ArchiveMetadata::manual_clear())
            .await
            .unwrap();

        let results = storage
            .search_archives(&ArchiveQuery {
                tag: Some("project-x".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id, "alice");
    }

    #[tokio::test]
    async fn validate_integrity_reports_missing_agent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqlStorage::new(dir.path().join("db.sqlite3")).unwrap();
        storage.save_world(&WorldConfig::new("w1", "World One")).await.unwrap();
        let problems = storage.validate_integrity("w1", Some("missing")).await.unwrap();
        assert!(problems.iter().any(|p| p.contains("missing")));
    }
}
