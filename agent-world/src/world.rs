//! World data model and World Manager.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::activity::ActivityTracker;
use crate::agent::Agent;
use crate::archive::ArchiveMetadata;
use crate::bus::{BusEvent, Topic, WorldBus};
use crate::error::WorldError;
use crate::llm::LlmClient;
use crate::message::AgentMessage;
use crate::orchestrator::Orchestrator;
use crate::storage::Storage;
use crate::tools::ToolExecutor;
use crate::util::to_kebab_case;

/// Persisted world configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_turn_limit")]
    pub turn_limit: u32,
    #[serde(default)]
    pub current_chat_id: Option<String>,
    #[serde(default)]
    pub chat_llm_provider: Option<String>,
    #[serde(default)]
    pub chat_llm_model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_turn_limit() -> u32 {
    5
}

impl WorldConfig {
    /// Creates a new world config, deriving `id` from `name` via kebab-case
    ///.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            turn_limit: default_turn_limit(),
            current_chat_id: None,
            chat_llm_provider: None,
            chat_llm_model: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = to_kebab_case(&name);
        Self::new(id, name)
    }
}

/// Parameters for `WorldManager::create_world`.
#[derive(Clone, Debug, Default)]
pub struct CreateWorldParams {
    pub name: String,
    pub description: Option<String>,
    pub turn_limit: Option<u32>,
    pub chat_llm_provider: Option<String>,
    pub chat_llm_model: Option<String>,
}

/// The live, in-process representation of a world: config, bus, activity
/// tracker, and the loaded agent roster.
pub struct RuntimeWorld {
    pub config: WorldConfig,
    pub bus: Arc<WorldBus>,
    pub activity: Arc<ActivityTracker>,
    pub agents: HashMap<String, Agent>,
}

impl RuntimeWorld {
    fn new(config: WorldConfig) -> Self {
        let bus = Arc::new(WorldBus::new());
        let activity = Arc::new(ActivityTracker::new(bus.clone()));
        Self {
            config,
            bus,
            activity,
            agents: HashMap::new(),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.activity.is_processing()
    }

    /// Looks an agent up by literal id, then by kebab-cased name.
    pub fn find_agent(&self, name_or_id: &str) -> Option<&Agent> {
        self.agents
            .get(name_or_id)
            .or_else(|| self.agents.get(&to_kebab_case(name_or_id)))
    }
}

/// Resolves a concrete `LlmClient` for an agent's configured provider.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, agent: &Agent) -> Arc<dyn LlmClient>;
}

/// Owns every loaded world and the shared, process-wide collaborators
/// (storage backend, tool executor, LLM queue, provider factory) needed to
/// drive its agents.
pub struct WorldManager {
    storage: Arc<dyn Storage>,
    worlds: DashMap<String, Arc<Mutex<RuntimeWorld>>>,
    orchestrator: Arc<Orchestrator>,
    provider_factory: Arc<dyn ProviderFactory>,
    tool_executor: Arc<ToolExecutor>,
}

impl WorldManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        orchestrator: Arc<Orchestrator>,
        provider_factory: Arc<dyn ProviderFactory>,
        tool_executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            storage,
            worlds: DashMap::new(),
            orchestrator,
            provider_factory,
            tool_executor,
        }
    }

    pub async fn create_world(&self, params: CreateWorldParams) -> Result<WorldConfig, WorldError> {
        let id = to_kebab_case(&params.name);
        if self.storage.load_world(&id).await?.is_some() {
            return Err(WorldError::Conflict(format!("world already exists: {id}")));
        }
        let mut config = WorldConfig::new(id, params.name);
        config.description = params.description;
        if let Some(limit) = params.turn_limit {
            if limit < 1 {
                return Err(WorldError::Validation("turn_limit must be >= 1".into()));
            }
            config.turn_limit = limit;
        }
        config.chat_llm_provider = params.chat_llm_provider;
        config.chat_llm_model = params.chat_llm_model;
        self.storage.save_world(&config).await?;
        Ok(config)
    }

    pub async fn get_world_config(&self, id: &str) -> Result<Option<WorldConfig>, WorldError> {
        Ok(self.storage.load_world(id).await?)
    }

    pub async fn list_worlds(&self) -> Result<Vec<WorldConfig>, WorldError> {
        Ok(self.storage.list_worlds().await?)
    }

    pub async fn update_world(
        &self,
        id: &str,
        mut apply: impl FnMut(&mut WorldConfig),
    ) -> Result<WorldConfig, WorldError> {
        let mut config = self
            .storage
            .load_world(id)
            .await?
            .ok_or_else(|| WorldError::NotFound(format!("world not found: {id}")))?;
        apply(&mut config);
        if config.turn_limit < 1 {
            return Err(WorldError::Validation("turn_limit must be >= 1".into()));
        }
        config.updated_at = Utc::now();
        self.storage.save_world(&config).await?;
        if let Some(entry) = self.worlds.get(id) {
            entry.lock().await.config = config.clone();
        }
        Ok(config)
    }

    /// Deletes a world; cascades to agents, memory, chats and archives
    ///.
    pub async fn delete_world(&self, id: &str) -> Result<(), WorldError> {
        self.storage.delete_world(id).await?;
        self.worlds.remove(id);
        Ok(())
    }

    /// Loads a world's config and every agent, inserts each into the
    /// runtime roster, and auto-subscribes each agent to the bus.
    /// The runtime roster is rebuilt from storage on every call.
    pub async fn get_world(&self, id: &str) -> Result<Option<Arc<Mutex<RuntimeWorld>>>, WorldError> {
        let Some(config) = self.storage.load_world(id).await? else {
            return Ok(None);
        };
        let agents = self.storage.load_agents_batch(id, &[]).await?;
        let runtime = RuntimeWorld::new(config);
        let handle = Arc::new(Mutex::new(runtime));
        {
            let mut guard = handle.lock().await;
            for agent in agents {
                guard.agents.insert(agent.id.clone(), agent);
            }
        }
        self.worlds.insert(id.to_string(), handle.clone());
        let agent_ids: Vec<String> = handle.lock().await.agents.keys().cloned().collect();
        for agent_id in agent_ids {
            self.subscribe_agent(&handle, &agent_id).await;
        }
        Ok(Some(handle))
    }

    async fn subscribe_agent(&self, world: &Arc<Mutex<RuntimeWorld>>, agent_id: &str) {
        let world = world.clone();
        let agent_id = agent_id.to_string();
        let storage = self.storage.clone();
        let orchestrator = self.orchestrator.clone();
        let provider_factory = self.provider_factory.clone();
        let tool_executor = self.tool_executor.clone();

        let bus = world.lock().await.bus.clone();
        bus.subscribe(Topic::Message, move |event| {
            let world = world.clone();
            let agent_id = agent_id.clone();
            let storage = storage.clone();
            let orchestrator = orchestrator.clone();
            let provider_factory = provider_factory.clone();
            let tool_executor = tool_executor.clone();
            Box::pin(async move {
                let BusEvent::Message(event) = event else {
                    return;
                };
                if let Err(err) = handle_incoming_message(
                    &world,
                    &agent_id,
                    &event,
                    storage.as_ref(),
                    &orchestrator,
                    provider_factory.as_ref(),
                    &tool_executor,
                )
                .await
                {
                    warn!(agent_id = %agent_id, error = %err, "agent message handling failed");
                }
            })
        })
        .await;
    }

    /// Publishes a message into a loaded world's bus; every subscribed agent
    /// sees it and the router decides whether to reply.
    pub async fn publish_message(
        &self,
        world: &Arc<Mutex<RuntimeWorld>>,
        content: impl Into<String>,
        sender: impl Into<String>,
    ) {
        let bus = world.lock().await.bus.clone();
        let event = bus.publish_message(content, sender, None);
        bus.publish_message_event(event).await;
    }

    pub async fn create_agent(
        &self,
        world: &Arc<Mutex<RuntimeWorld>>,
        mut agent: Agent,
    ) -> Result<Agent, WorldError> {
        let world_id = world.lock().await.config.id.clone();
        agent.world_id = world_id;
        if self.storage.load_agent(&agent.world_id, &agent.id).await?.is_some() {
            return Err(WorldError::Conflict(format!("agent already exists: {}", agent.id)));
        }
        if let Err(err) = self.storage.save_agent(&agent).await {
            return Err(err.into());
        }
        {
            let mut guard = world.lock().await;
            guard.agents.insert(agent.id.clone(), agent.clone());
        }
        self.subscribe_agent(world, &agent.id).await;
        Ok(agent)
    }

    pub async fn get_agent(&self, world: &Arc<Mutex<RuntimeWorld>>, name_or_id: &str) -> Option<Agent> {
        world.lock().await.find_agent(name_or_id).cloned()
    }

    pub async fn list_agents(&self, world: &Arc<Mutex<RuntimeWorld>>) -> Vec<Agent> {
        world.lock().await.agents.values().cloned().collect()
    }

    pub async fn update_agent(
        &self,
        world: &Arc<Mutex<RuntimeWorld>>,
        agent_id: &str,
        mut apply: impl FnMut(&mut Agent),
    ) -> Result<Agent, WorldError> {
        let mut guard = world.lock().await;
        let agent = guard
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| WorldError::NotFound(format!("agent not found: {agent_id}")))?;
        apply(agent);
        agent.updated_at = Utc::now();
        let snapshot = agent.clone();
        drop(guard);
        self.storage.save_agent(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn delete_agent(
        &self,
        world: &Arc<Mutex<RuntimeWorld>>,
        agent_id: &str,
    ) -> Result<(), WorldError> {
        let world_id = world.lock().await.config.id.clone();
        self.storage.delete_agent(&world_id, agent_id).await?;
        world.lock().await.agents.remove(agent_id);
        Ok(())
    }

    /// Archives an agent's current memory with `reason = "manual_clear"`
    /// before truncating it.
    pub async fn clear_agent_memory(
        &self,
        world: &Arc<Mutex<RuntimeWorld>>,
        agent_id: &str,
    ) -> Result<(), WorldError> {
        let world_id = world.lock().await.config.id.clone();
        let memory = {
            let mut guard = world.lock().await;
            let agent = guard
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| WorldError::NotFound(format!("agent not found: {agent_id}")))?;
            std::mem::take(&mut agent.memory)
        };
        if !memory.is_empty() {
            self.storage
                .archive_agent_memory(&world_id, agent_id, memory, ArchiveMetadata::manual_clear())
                .await?;
        }
        self.storage.save_agent_memory(&world_id, agent_id, &[]).await?;
        Ok(())
    }

    pub async fn update_agent_memory(
        &self,
        world: &Arc<Mutex<RuntimeWorld>>,
        agent_id: &str,
        memory: Vec<AgentMessage>,
    ) -> Result<(), WorldError> {
        let world_id = world.lock().await.config.id.clone();
        self.storage.save_agent_memory(&world_id, agent_id, &memory).await?;
        let mut guard = world.lock().await;
        if let Some(agent) = guard.agents.get_mut(agent_id) {
            agent.memory = memory;
        }
        Ok(())
    }
}

/// The per-message pipeline an agent's bus subscription runs: consult the
/// router, append to memory regardless of the decision, persist, and —
/// if accepted — drive the orchestrator and re-publish the result.
#[allow(clippy::too_many_arguments)]
async fn handle_incoming_message(
    world: &Arc<Mutex<RuntimeWorld>>,
    agent_id: &str,
    event: &world_protocol::WorldMessageEvent,
    storage: &dyn Storage,
    orchestrator: &Orchestrator,
    provider_factory: &dyn ProviderFactory,
    tool_executor: &Arc<ToolExecutor>,
) -> Result<(), WorldError> {
    use crate::router::{should_agent_respond, RouterAction, RouterInput};

    let world_id = world.lock().await.config.id.clone();

    let (decision, snapshot_messages, client, turn_limit, reset_snapshot) = {
        let mut guard = world.lock().await;
        let turn_limit = guard.config.turn_limit;
        let Some(agent) = guard.agents.get(agent_id) else {
            return Ok(());
        };
        let decision = should_agent_respond(RouterInput {
            agent_id: &agent.id,
            agent_name: &agent.name,
            llm_call_count: agent.llm_call_count,
            turn_limit,
            sender: &event.sender,
            content: &event.content,
        });

        let is_self = event.sender.eq_ignore_ascii_case(&agent.id);
        if !is_self {
            let mut incoming = AgentMessage::user(event.content.clone(), event.sender.clone());
            incoming.message_id = Some(event.message_id.clone());
            incoming.reply_to_message_id = event.reply_to_message_id.clone();
            let agent = guard.agents.get_mut(agent_id).expect("checked above");
            agent.remember(incoming);
        }

        let mut reset = false;
        for action in &decision.actions {
            if let RouterAction::ResetTurnCounter = action {
                if let Some(agent) = guard.agents.get_mut(agent_id) {
                    agent.reset_turn_counter();
                    reset = true;
                }
            }
        }

        let agent = guard.agents.get(agent_id).expect("checked above");
        let client = provider_factory.build(agent);
        let reset_snapshot = reset.then(|| agent.clone());
        (decision, agent.memory.clone(), client, turn_limit, reset_snapshot)
    };
    let _ = turn_limit;

    if let Some(agent) = reset_snapshot {
        if let Err(err) = storage.save_agent(&agent).await {
            warn!(agent_id = %agent_id, error = %err, "best-effort turn counter reset persist failed");
        }
    }

    if let Err(err) = storage.save_agent_memory(&world_id, agent_id, &snapshot_messages).await {
        warn!(agent_id = %agent_id, error = %err, "best-effort memory save failed");
    }

    let bus = world.lock().await.bus.clone();
    for action in &decision.actions {
        if let RouterAction::PublishMessage { content, sender } = action {
            let published = bus.publish_message(content.clone(), sender.clone(), Some(event.message_id.clone()));
            bus.publish_message_event(published).await;
        }
    }

    if !decision.should_respond {
        return Ok(());
    }

    let (messages, bus, activity, system_prompt, agent_name, chat_id, model, temperature, max_tokens) = {
        let guard = world.lock().await;
        let agent = guard.agents.get(agent_id).ok_or_else(|| {
            WorldError::NotFound(format!("agent not found: {agent_id}"))
        })?;
        (
            agent.recent_memory(10),
            guard.bus.clone(),
            guard.activity.clone(),
            agent.system_prompt.clone(),
            agent.name.clone(),
            guard.config.current_chat_id.clone(),
            agent.model.clone(),
            agent.temperature,
            agent.max_tokens,
        )
    };

    let outcome = orchestrator
        .stream_agent_response(
            crate::orchestrator::StreamAgentRequest {
                agent_id: agent_id.to_string(),
                agent_name,
                chat_id,
                model,
                temperature,
                max_tokens,
                system_prompt,
                history: messages,
                trigger_sender: event.sender.clone(),
                client,
                tool_executor: tool_executor.clone(),
                bus,
                activity,
                cancellation: tokio_util::sync::CancellationToken::new(),
            },
        )
        .await?;

    let agent_snapshot = {
        let mut guard = world.lock().await;
        let agent = guard.agents.get_mut(agent_id);
        if let Some(agent) = agent {
            agent.record_llm_call();
            agent.remember(outcome.assistant_message.clone());
            Some(agent.clone())
        } else {
            None
        }
    };

    if let Some(agent) = &agent_snapshot {
        if let Err(err) = storage.save_agent(agent).await {
            warn!(agent_id = %agent_id, error = %err, "best-effort llm call count persist failed");
        }
    }
    if let Some(agent) = &agent_snapshot {
        if let Err(err) = storage.save_agent_memory(&world_id, agent_id, &agent.memory).await {
            warn!(agent_id = %agent_id, error = %err, "best-effort memory save failed");
        }
    }

    if let Some(publish) = outcome.publish {
        let bus = world.lock().await.bus.clone();
        let event = bus.publish_message(publish.content, publish.sender, Some(event.message_id.clone()));
        bus.publish_message_event(event).await;
    }

    Ok(())
}
