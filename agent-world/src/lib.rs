//! # agent-world
//!
//! A multi-tenant runtime for conversational AI agents. Each **world** is an
//! isolated set of agents sharing a message bus, an activity tracker and a
//! turn-taking router; agents stream their replies through a provider-agnostic
//! LLM client and can call tools with human-in-the-loop approval.
//!
//! ## Design principles
//!
//! - **Per-world isolation**: every world owns its own [`bus::WorldBus`] and
//!   [`activity::ActivityTracker`]; nothing leaks across worlds.
//! - **One router decision per message**: [`router::should_agent_respond`] is a
//!   pure function from `(agent, turn state, incoming message)` to a decision —
//!   easy to test exhaustively, no hidden state.
//! - **Provider-agnostic streaming**: [`llm::LlmClient`] is a small trait with
//!   one reference implementation ([`llm::OpenAiClient`]) and one test double
//!   ([`llm::MockLlmClient`]); the [`orchestrator::Orchestrator`] drives it.
//! - **Pluggable storage**: [`storage::Storage`] is one trait behind which a
//!   [`storage::FileStorage`] and a [`storage::SqlStorage`] backend are
//!   interchangeable; [`storage::NoopStorage`] covers embedded/dry-run use.
//!
//! ## Main modules
//!
//! - [`world`]: [`world::WorldConfig`], [`world::RuntimeWorld`], [`world::WorldManager`] —
//!   world/agent CRUD and the per-message handling pipeline.
//! - [`agent`]: [`agent::Agent`], [`agent::AgentStatus`], [`agent::ProviderConfig`].
//! - [`bus`]: [`bus::WorldBus`], [`bus::Topic`], [`bus::BusEvent`] — per-world pub/sub.
//! - [`activity`]: [`activity::ActivityTracker`], [`activity::ActivityScope`] — refcounted
//!   response-start/response-end/idle lifecycle.
//! - [`router`]: [`router::should_agent_respond`] — the turn-taking decision table.
//! - [`orchestrator`]: [`orchestrator::Orchestrator`] — streaming, tool round-trips, the
//!   process-wide LLM queue.
//! - [`llm`]: [`llm::LlmClient`] trait, [`llm::OpenAiClient`], [`llm::MockLlmClient`].
//! - [`tools`]: [`tools::ToolExecutor`], [`tools::ShellCmdTool`], the HITL protocol in
//!   [`tools::hitl`].
//! - [`storage`]: [`storage::Storage`] trait, [`storage::FileStorage`], [`storage::SqlStorage`],
//!   [`storage::NoopStorage`].
//! - [`chat`]: [`chat::Chat`], [`chat::WorldChat`].
//! - [`archive`]: [`archive::MemoryArchive`], [`archive::ArchiveQuery`].
//! - [`message`]: [`message::AgentMessage`], [`message::Role`], [`message::ToolCall`].
//! - [`config`]: [`config::RuntimeConfig`] — process-wide defaults loaded via `env_config`.
//! - [`error`]: [`error::WorldError`], [`error::StorageError`], [`error::ToolSourceError`].
//!
//! Wire types shared with clients (chat/SSE/activity events) live in the
//! sibling `world_protocol` crate, not here.

pub mod activity;
pub mod agent;
pub mod archive;
pub mod bus;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod router;
pub mod storage;
pub mod tools;
pub mod util;
pub mod world;

pub use activity::{ActivityScope, ActivityTracker};
pub use agent::{Agent, AgentStatus, ProviderConfig};
pub use archive::{ArchiveExportOptions, ArchiveMetadata, ArchiveQuery, MemoryArchive};
pub use bus::{BusEvent, Subscription, Topic, WorldBus};
pub use chat::{Chat, WorldChat};
pub use config::RuntimeConfig;
pub use error::{StorageError, ToolSourceError, WorldError};
pub use llm::{
    LlmClient, LlmRequest, LlmResponse, LlmUsage, MockLlmClient, OpenAiClient, ScriptedTurn,
    StreamChunk, ToolChoiceMode,
};
pub use message::{AgentMessage, Role, ToolCall};
pub use orchestrator::{Orchestrator, PublishIntent, StreamAgentOutcome, StreamAgentRequest};
pub use router::{should_agent_respond, RouterAction, RouterDecision, RouterInput};
pub use storage::{FileStorage, NoopStorage, SqlStorage, Storage};
pub use tools::{
    AutoTimeoutResponder, HitlRequest, HitlResolution, HitlResponder, HitlSource,
    ScriptedHitlResponder, Tool, ToolCallContent, ToolCallContext, ToolExecutor, ToolSpec,
    TOOL_HUMAN_INTERVENTION_REQUEST, TOOL_SHELL_CMD,
};
pub use util::{determine_sender_type, extract_mentions, to_kebab_case, world_turn_limit, SenderType};
pub use world::{CreateWorldParams, ProviderFactory, RuntimeWorld, WorldConfig, WorldManager};
