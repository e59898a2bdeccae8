//! Provider-agnostic LLM client contract.
//!
//! Grounded on the teacher's `llm::LlmClient` trait: an `invoke`/`invoke_stream`
//! split where streaming is a default-implemented wrapper around the
//! single-shot call, generalized here to the spec's neutral `AgentMessage`
//! history and a tool-call-delta channel so the orchestrator can detect
//! accumulating tool calls before the stream ends.

mod mock;
mod openai;

pub use mock::{MockLlmClient, ScriptedTurn};
pub use openai::OpenAiClient;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WorldError;
use crate::message::{AgentMessage, ToolCall};

/// Tool choice mode for chat completions.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
    Specific(String),
}

impl std::str::FromStr for ToolChoiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            other => Ok(Self::Specific(other.to_string())),
        }
    }
}

/// Token usage for one LLM call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A request to a provider: the full message history plus generation params.
#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub messages: Vec<AgentMessage>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tool_choice: ToolChoiceMode,
}

/// Response from a non-streaming completion.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

/// One incremental update from a streaming call.
#[derive(Clone, Debug)]
pub enum StreamChunk {
    /// A text delta to append to the accumulator and fan out as `sse{chunk}`.
    TextDelta(String),
    /// An incremental update to a tool call, identified by its position in
    /// the assistant turn's tool-call list.
    ToolCallDelta(ToolCallDelta),
    /// Usage metadata, normally only present on the terminal chunk.
    Usage(LlmUsage),
}

/// Delta for one tool call from streaming; `index` lets the orchestrator
/// accumulate fragmented `arguments` across multiple deltas for the same call.
#[derive(Clone, Debug)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: String,
}

/// Provider contract: given a request, stream incremental chunks or return a
/// complete response in one call. Implementations: `MockLlmClient` (tests),
/// `OpenAiClient` (reference provider via `async-openai`).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-shot completion: no streaming.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, WorldError>;

    /// Streaming completion. Default implementation calls `generate` and
    /// replays it as a single `TextDelta` plus tool-call deltas — providers
    /// that can't stream natively get a working (if chunkless) client for free.
    async fn stream(
        &self,
        request: &LlmRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<LlmResponse, WorldError> {
        let response = self.generate(request).await?;
        if !response.content.is_empty() {
            let _ = chunk_tx
                .send(StreamChunk::TextDelta(response.content.clone()))
                .await;
        }
        for (index, call) in response.tool_calls.iter().enumerate() {
            let _ = chunk_tx
                .send(StreamChunk::ToolCallDelta(ToolCallDelta {
                    index,
                    id: Some(call.id.clone()),
                    name: Some(call.name.clone()),
                    arguments_delta: call.arguments.clone(),
                }))
                .await;
        }
        if let Some(usage) = response.usage.clone() {
            let _ = chunk_tx.send(StreamChunk::Usage(usage)).await;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_mode_from_str_parses_known_values() {
        assert_eq!("auto".parse::<ToolChoiceMode>().unwrap(), ToolChoiceMode::Auto);
        assert_eq!("none".parse::<ToolChoiceMode>().unwrap(), ToolChoiceMode::None);
        assert_eq!(
            "required".parse::<ToolChoiceMode>().unwrap(),
            ToolChoiceMode::Required
        );
    }

    #[test]
    fn tool_choice_mode_from_str_falls_back_to_specific() {
        assert_eq!(
            "my_tool".parse::<ToolChoiceMode>().unwrap(),
            ToolChoiceMode::Specific("my_tool".into())
        );
    }

    struct StubClient {
        content: String,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, WorldError> {
            Ok(LlmResponse {
                content: self.content.clone(),
                tool_calls: vec![],
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_replays_generate_as_single_chunk() {
        let client = StubClient {
            content: "hello".into(),
        };
        let (tx, mut rx) = mpsc::channel(4);
        let req = LlmRequest {
            messages: vec![],
            model: "stub".into(),
            temperature: None,
            max_tokens: None,
            tool_choice: ToolChoiceMode::Auto,
        };
        let resp = client.stream(&req, tx).await.unwrap();
        assert_eq!(resp.content, "hello");
        match rx.recv().await.unwrap() {
            StreamChunk::TextDelta(d) => assert_eq!(d, "hello"),
            other => panic!("expected TextDelta, got {other:?}"),
        }
    }
}
