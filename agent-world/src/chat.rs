//! Chat and WorldChat: a named conversation slice within a world,
//! and the snapshot type used for export/import and chat switching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::message::AgentMessage;
use crate::world::WorldConfig;

/// A named conversation slice within a world.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub world_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(world_id: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            world_id: world_id.into(),
            name: name.into(),
            description: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A snapshot of a chat: world config + agents (memory filtered to this chat)
/// + the ordered message list for the chat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldChat {
    pub world: WorldConfig,
    pub agents: Vec<Agent>,
    pub messages: Vec<AgentMessage>,
}

impl WorldChat {
    /// Builds a snapshot, filtering each agent's memory down to messages
    /// tagged with `chat_id`.
    pub fn build(world: WorldConfig, mut agents: Vec<Agent>, chat_id: &str) -> Self {
        let mut messages: Vec<AgentMessage> = Vec::new();
        for agent in &mut agents {
            let (in_chat, rest): (Vec<_>, Vec<_>) = agent
                .memory
                .drain(..)
                .partition(|m| m.chat_id.as_deref() == Some(chat_id));
            messages.extend(in_chat.iter().cloned());
            agent.memory = in_chat;
            let _ = rest;
        }
        messages.sort_by_key(|m| m.created_at);
        Self {
            world,
            agents,
            messages,
        }
    }
}
