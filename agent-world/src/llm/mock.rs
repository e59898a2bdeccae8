//! Scriptable test double for `LlmClient`, grounded on the teacher's
//! `StubLlm` test-only implementation in `llm/mod.rs`'s test module, extended
//! to a queue of turns so orchestrator tests can script multi-round
//! tool-calling conversations.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::error::WorldError;
use crate::message::ToolCall;

/// One scripted response: returned in order, oldest first. The last scripted
/// turn repeats forever once the queue is exhausted, so tests that don't
/// care about exact call count don't need to script every round.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

impl ScriptedTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
            usage: None,
        }
    }

    pub fn with_tool_call(call: ToolCall) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![call],
            usage: None,
        }
    }
}

/// A queue of canned `LlmResponse`s, consumed one per `generate`/`stream` call.
pub struct MockLlmClient {
    turns: Mutex<Vec<ScriptedTurn>>,
}

impl MockLlmClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
        }
    }

    /// A client that always returns a single fixed text reply.
    pub fn fixed(content: impl Into<String>) -> Self {
        Self::new(vec![ScriptedTurn::text(content)])
    }

    fn next_turn(&self) -> ScriptedTurn {
        let mut turns = self.turns.lock().unwrap();
        if turns.len() > 1 {
            turns.remove(0)
        } else if let Some(last) = turns.first() {
            last.clone()
        } else {
            ScriptedTurn::default()
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, WorldError> {
        let turn = self.next_turn();
        Ok(LlmResponse {
            content: turn.content,
            tool_calls: turn.tool_calls,
            usage: turn.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            messages: vec![],
            model: "mock".into(),
            temperature: None,
            max_tokens: None,
            tool_choice: super::super::ToolChoiceMode::Auto,
        }
    }

    #[tokio::test]
    async fn fixed_client_repeats_same_reply() {
        let client = MockLlmClient::fixed("hi there");
        let req = request();
        let a = client.generate(&req).await.unwrap();
        let b = client.generate(&req).await.unwrap();
        assert_eq!(a.content, "hi there");
        assert_eq!(b.content, "hi there");
    }

    #[tokio::test]
    async fn scripted_turns_consume_in_order_then_repeat_last() {
        let client = MockLlmClient::new(vec![
            ScriptedTurn::text("first"),
            ScriptedTurn::text("second"),
        ]);
        let req = request();
        assert_eq!(client.generate(&req).await.unwrap().content, "first");
        assert_eq!(client.generate(&req).await.unwrap().content, "second");
        assert_eq!(client.generate(&req).await.unwrap().content, "second");
    }
}
