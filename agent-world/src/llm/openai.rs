//! OpenAI Chat Completions provider implementing `LlmClient`.
//!
//! Grounded directly on the teacher's `ChatOpenAI` (`llm/openai.rs`): same
//! `Client<OpenAIConfig>` construction, same `create`/`create_stream` split,
//! same tool-call accumulation by stream index. Generalized here to the
//! spec's 4-role `AgentMessage` (including `Tool` replies and
//! assistant-with-tool_calls history) and to request `stream_options.include_usage`
//! so the terminal chunk carries usage (§9 open question resolution).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionStreamOptions, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, ChatCompletionTools, CreateChatCompletionRequestArgs,
        FunctionCall, FunctionObject, ToolChoiceOptions,
    },
    Client,
};

use super::{LlmClient, LlmRequest, LlmResponse, LlmUsage, StreamChunk, ToolChoiceMode, ToolCallDelta};
use crate::error::WorldError;
use crate::message::{AgentMessage, Role, ToolCall};

/// A tool specification advertised to the model.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Thin wrapper over `async-openai`'s chat completions API.
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    tools: Vec<ToolSpec>,
}

impl OpenAiClient {
    /// Builds a client from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`/`OPENAI_API_BASE`).
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    fn tool_choice_option(mode: &ToolChoiceMode) -> Option<ChatCompletionToolChoiceOption> {
        match mode {
            ToolChoiceMode::Auto => Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto)),
            ToolChoiceMode::None => Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::None)),
            ToolChoiceMode::Required => {
                Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Required))
            }
            ToolChoiceMode::Specific(_) => None,
        }
    }

    fn messages_to_request(
        messages: &[AgentMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, WorldError> {
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let request_message = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| WorldError::Provider(e.to_string()))?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| WorldError::Provider(e.to_string()))?,
                ),
                Role::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    if !m.content.is_empty() {
                        builder.content(m.content.clone());
                    }
                    if !m.tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCall> = m
                            .tool_calls
                            .iter()
                            .map(|c| ChatCompletionMessageToolCall {
                                id: c.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: c.name.clone(),
                                    arguments: c.arguments.clone(),
                                },
                            })
                            .collect();
                        builder.tool_calls(calls);
                    }
                    ChatCompletionRequestMessage::Assistant(
                        builder.build().map_err(|e| WorldError::Provider(e.to_string()))?,
                    )
                }
                Role::Tool => {
                    let tool_call_id = m.tool_call_id.clone().ok_or_else(|| {
                        WorldError::Validation("tool message missing tool_call_id".into())
                    })?;
                    ChatCompletionRequestMessage::Tool(
                        ChatCompletionRequestToolMessageArgs::default()
                            .content(m.content.clone())
                            .tool_call_id(tool_call_id)
                            .build()
                            .map_err(|e| WorldError::Provider(e.to_string()))?,
                    )
                }
            };
            out.push(request_message);
        }
        Ok(out)
    }

    fn build_request(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, WorldError> {
        let openai_messages = Self::messages_to_request(&request.messages)?;
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.clone());
        args.messages(openai_messages);
        if stream {
            args.stream(true);
            args.stream_options(ChatCompletionStreamOptions {
                include_usage: true,
            });
        }
        if let Some(t) = request.temperature {
            args.temperature(t);
        }
        if let Some(max) = request.max_tokens {
            args.max_completion_tokens(max);
        }
        if !self.tools.is_empty() {
            let chat_tools: Vec<ChatCompletionTools> = self
                .tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.input_schema.clone()),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(chat_tools);
        }
        if let Some(choice) = Self::tool_choice_option(&request.tool_choice) {
            args.tool_choice(choice);
        }
        args.build().map_err(|e| WorldError::Provider(e.to_string()))
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, WorldError> {
        let built = self.build_request(request, false)?;
        debug!(model = %request.model, message_count = request.messages.len(), "openai chat create");
        let response = self
            .client
            .chat()
            .create(built)
            .await
            .map_err(|e| WorldError::Provider(format!("OpenAI API error: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| WorldError::Provider("OpenAI returned no choices".into()))?;

        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
        })
    }

    async fn stream(
        &self,
        request: &LlmRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<LlmResponse, WorldError> {
        let built = self.build_request(request, true)?;
        debug!(model = %request.model, stream = true, "openai chat create_stream");

        let mut stream = self
            .client
            .chat()
            .create_stream(built)
            .await
            .map_err(|e| WorldError::Provider(format!("OpenAI stream error: {e}")))?;

        let mut full_content = String::new();
        let mut tool_call_map: HashMap<u32, (String, String, String)> = HashMap::new();
        let mut usage: Option<LlmUsage> = None;

        while let Some(result) = stream.next().await {
            let response = result.map_err(|e| WorldError::Provider(format!("OpenAI stream error: {e}")))?;

            if let Some(u) = response.usage {
                let parsed = LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                };
                let _ = chunk_tx.send(StreamChunk::Usage(parsed.clone())).await;
                usage = Some(parsed);
            }

            for choice in response.choices {
                let delta = choice.delta;
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        full_content.push_str(&content);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(content)).await;
                    }
                }
                if let Some(tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map.entry(tc.index).or_insert_with(|| {
                            (tc.id.clone().unwrap_or_default(), String::new(), String::new())
                        });
                        if let Some(ref id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        let mut name_delta = None;
                        let mut args_delta = String::new();
                        if let Some(func) = tc.function {
                            if let Some(name) = func.name {
                                entry.1.push_str(&name);
                                name_delta = Some(name);
                            }
                            if let Some(args) = func.arguments {
                                entry.2.push_str(&args);
                                args_delta = args;
                            }
                        }
                        trace!(index = tc.index, "tool call delta");
                        let _ = chunk_tx
                            .send(StreamChunk::ToolCallDelta(ToolCallDelta {
                                index: tc.index as usize,
                                id: tc.id,
                                name: name_delta,
                                arguments_delta: args_delta,
                            }))
                            .await;
                    }
                }
            }
        }

        let mut tool_calls: Vec<(u32, ToolCall)> = tool_call_map
            .into_iter()
            .map(|(index, (id, name, arguments))| (index, ToolCall { id, name, arguments }))
            .collect();
        tool_calls.sort_by_key(|(index, _)| *index);

        Ok(LlmResponse {
            content: full_content,
            tool_calls: tool_calls.into_iter().map(|(_, c)| c).collect(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_option_maps_auto_none_required() {
        assert!(matches!(
            OpenAiClient::tool_choice_option(&ToolChoiceMode::Auto),
            Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto))
        ));
        assert!(matches!(
            OpenAiClient::tool_choice_option(&ToolChoiceMode::None),
            Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::None))
        ));
        assert!(OpenAiClient::tool_choice_option(&ToolChoiceMode::Specific("x".into())).is_none());
    }

    #[test]
    fn messages_to_request_requires_tool_call_id_on_tool_role() {
        let messages = vec![AgentMessage::tool("result", "")];
        let mut msgs = messages;
        msgs[0].tool_call_id = None;
        let err = OpenAiClient::messages_to_request(&msgs).unwrap_err();
        assert!(matches!(err, WorldError::Validation(_)));
    }
}
