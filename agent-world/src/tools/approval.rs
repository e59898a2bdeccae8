//! Chat-scoped tool approval cache.
//!
//! A fresh `dashmap`-backed cache rather than a reuse of the teacher's
//! `cache::Cache<K,V>` trait: that trait's only concrete implementation
//! (`cache/in_memory.rs`) is not part of this tree, and the cache needed here
//! is small and specific enough not to warrant resurrecting it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// One cached approval decision.
#[derive(Clone, Debug)]
pub struct ApprovalEntry {
    pub approved: bool,
    pub timestamp: DateTime<Utc>,
}

/// Keyed by `(chatId, toolName)`.
#[derive(Default)]
pub struct ApprovalCache {
    entries: DashMap<(String, String), ApprovalEntry>,
}

impl ApprovalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat_id: &str, tool_name: &str) -> Option<ApprovalEntry> {
        self.entries
            .get(&(chat_id.to_string(), tool_name.to_string()))
            .map(|e| e.clone())
    }

    pub fn set(&self, chat_id: &str, tool_name: &str, approved: bool) {
        self.entries.insert(
            (chat_id.to_string(), tool_name.to_string()),
            ApprovalEntry {
                approved,
                timestamp: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_set_then_hit() {
        let cache = ApprovalCache::new();
        assert!(cache.get("chat-1", "shell_cmd").is_none());
        cache.set("chat-1", "shell_cmd", true);
        let entry = cache.get("chat-1", "shell_cmd").unwrap();
        assert!(entry.approved);
    }

    #[test]
    fn keys_are_scoped_per_chat() {
        let cache = ApprovalCache::new();
        cache.set("chat-1", "shell_cmd", true);
        assert!(cache.get("chat-2", "shell_cmd").is_none());
    }
}
