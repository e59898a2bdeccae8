//! Agent data model: a configured LLM persona with memory, a turn
//! counter, and provider-specific connection config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::AgentMessage;

/// Whether an agent currently participates in routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

/// Provider-specific connection config.
///
/// All fields are optional because only the fields relevant to the agent's
/// `provider` are populated; unrelated fields stay `None`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_base_url: Option<String>,
}

/// An agent's persisted configuration and conversation memory.
///
/// Invariants: `(world_id, id)` unique; `llm_call_count` only decreases via
/// an explicit reset (router step 4 / `clear_memory`); `memory` is
/// append-only from the core's perspective — truncation only happens through
/// `clear_memory`, which archives first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub world_id: String,
    pub name: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub provider_config: ProviderConfig,
    #[serde(default)]
    pub llm_call_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_llm_call: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub memory: Vec<AgentMessage>,
}

impl Agent {
    pub fn new(world_id: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            world_id: world_id.into(),
            name: name.into(),
            agent_type: "agent".to_string(),
            status: AgentStatus::Active,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            provider_config: ProviderConfig::default(),
            llm_call_count: 0,
            last_llm_call: None,
            created_at: now,
            updated_at: now,
            memory: Vec::new(),
        }
    }

    /// Appends a message to memory without touching `llm_call_count` (spec
    /// §4.4: every non-self message is appended regardless of whether the
    /// agent decides to respond).
    pub fn remember(&mut self, message: AgentMessage) {
        self.memory.push(message);
        self.updated_at = Utc::now();
    }

    /// Records that an LLM call was made: increments the counter and stamps
    /// `last_llm_call`.
    pub fn record_llm_call(&mut self) {
        self.llm_call_count += 1;
        self.last_llm_call = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Resets the turn counter to 0 (router step 4, human/system reset).
    pub fn reset_turn_counter(&mut self) {
        self.llm_call_count = 0;
        self.updated_at = Utc::now();
    }

    /// The last `n` messages in memory, oldest first — used by the
    /// orchestrator to build the history window.
    pub fn recent_memory(&self, n: usize) -> Vec<AgentMessage> {
        let start = self.memory.len().saturating_sub(n);
        self.memory[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_appends_without_touching_call_count() {
        let mut agent = Agent::new("w1", "alice", "Alice");
        agent.remember(AgentMessage::user("hi", "human"));
        assert_eq!(agent.memory.len(), 1);
        assert_eq!(agent.llm_call_count, 0);
    }

    #[test]
    fn record_llm_call_increments_and_stamps_last_call() {
        let mut agent = Agent::new("w1", "alice", "Alice");
        agent.record_llm_call();
        assert_eq!(agent.llm_call_count, 1);
        assert!(agent.last_llm_call.is_some());
    }

    #[test]
    fn reset_turn_counter_zeroes_count() {
        let mut agent = Agent::new("w1", "alice", "Alice");
        agent.record_llm_call();
        agent.record_llm_call();
        agent.reset_turn_counter();
        assert_eq!(agent.llm_call_count, 0);
    }

    #[test]
    fn recent_memory_returns_last_n_oldest_first() {
        let mut agent = Agent::new("w1", "alice", "Alice");
        for i in 0..15 {
            agent.remember(AgentMessage::user(format!("msg{i}"), "human"));
        }
        let recent = agent.recent_memory(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg5");
        assert_eq!(recent[9].content, "msg14");
    }
}
