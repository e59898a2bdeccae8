//! Immutable memory archives.
//!
//! An archive freezes an agent's memory at a point in time, tagged with a
//! reason (e.g. `manual_clear`). Archives are append-only: once written,
//! `Storage::archive_agent_memory` never updates or deletes an archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::AgentMessage;

/// Caller-supplied metadata attached when an archive is created.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub session_name: Option<String>,
    pub reason: String,
    pub participants: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

impl ArchiveMetadata {
    pub fn manual_clear() -> Self {
        Self {
            reason: "manual_clear".to_string(),
            ..Default::default()
        }
    }
}

/// An immutable, metadata-tagged snapshot of an agent's memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryArchive {
    pub archive_id: String,
    pub agent_id: String,
    pub world_id: String,
    pub session_name: Option<String>,
    pub reason: String,
    pub message_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub participants: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<AgentMessage>,
}

impl MemoryArchive {
    /// Freezes `messages` into a new, immutable archive.
    pub fn new(world_id: impl Into<String>, agent_id: impl Into<String>, messages: Vec<AgentMessage>, metadata: ArchiveMetadata) -> Self {
        let start_time = messages.first().map(|m| m.created_at);
        let end_time = messages.last().map(|m| m.created_at);
        Self {
            archive_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            world_id: world_id.into(),
            session_name: metadata.session_name,
            reason: metadata.reason,
            message_count: messages.len(),
            start_time,
            end_time,
            participants: metadata.participants,
            tags: metadata.tags,
            summary: metadata.summary,
            created_at: Utc::now(),
            messages,
        }
    }
}

/// A query over stored archives (`Storage::search_archives`, spec §4.8).
#[derive(Clone, Debug, Default)]
pub struct ArchiveQuery {
    pub world_id: Option<String>,
    pub agent_id: Option<String>,
    pub tag: Option<String>,
}

impl ArchiveQuery {
    pub fn matches(&self, archive: &MemoryArchive) -> bool {
        if let Some(ref world_id) = self.world_id {
            if &archive.world_id != world_id {
                return false;
            }
        }
        if let Some(ref agent_id) = self.agent_id {
            if &archive.agent_id != agent_id {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !archive.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

/// Export options for `Storage::export_archive`: currently only
/// controls whether the frozen messages are included, since Markdown/other
/// export formats are an external collaborator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveExportOptions {
    pub include_messages: bool,
}
