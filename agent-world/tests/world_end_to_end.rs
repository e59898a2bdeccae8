//! End-to-end coverage of the world message pipeline: router decisions,
//! LLM streaming, tool round-trips and turn-limit enforcement, all driven
//! through `WorldManager` exactly as a host process would use it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use agent_world::{
    Agent, ArchiveExportOptions, ArchiveMetadata, ArchiveQuery, AutoTimeoutResponder, BusEvent,
    Chat, CreateWorldParams, HitlResponder, LlmClient, MemoryArchive, MockLlmClient, Orchestrator,
    ProviderFactory, ScriptedHitlResponder, ScriptedTurn, StorageError, Topic, ToolCall,
    ToolExecutor, WorldChat, WorldConfig, WorldManager,
};
use agent_world::message::AgentMessage;
use agent_world::storage::Storage;

/// A minimal in-memory `Storage`, grounded on the crate's `NoopStorage` shape
/// but actually round-tripping data, since `WorldManager::get_world` rebuilds
/// its runtime roster from storage on every call.
#[derive(Default)]
struct InMemoryStorage {
    worlds: StdMutex<HashMap<String, WorldConfig>>,
    agents: StdMutex<HashMap<(String, String), Agent>>,
    chats: StdMutex<HashMap<(String, String), Chat>>,
    archives: StdMutex<HashMap<String, MemoryArchive>>,
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save_world(&self, world: &WorldConfig) -> Result<(), StorageError> {
        self.worlds.lock().unwrap().insert(world.id.clone(), world.clone());
        Ok(())
    }
    async fn load_world(&self, id: &str) -> Result<Option<WorldConfig>, StorageError> {
        Ok(self.worlds.lock().unwrap().get(id).cloned())
    }
    async fn delete_world(&self, id: &str) -> Result<(), StorageError> {
        self.worlds.lock().unwrap().remove(id);
        Ok(())
    }
    async fn list_worlds(&self) -> Result<Vec<WorldConfig>, StorageError> {
        Ok(self.worlds.lock().unwrap().values().cloned().collect())
    }
    async fn save_agent(&self, agent: &Agent) -> Result<(), StorageError> {
        self.agents
            .lock()
            .unwrap()
            .insert((agent.world_id.clone(), agent.id.clone()), agent.clone());
        Ok(())
    }
    async fn load_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        Ok(self.agents.lock().unwrap().get(&(world_id.to_string(), agent_id.to_string())).cloned())
    }
    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), StorageError> {
        self.agents.lock().unwrap().remove(&(world_id.to_string(), agent_id.to_string()));
        Ok(())
    }
    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, StorageError> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.world_id == world_id)
            .cloned()
            .collect())
    }
    async fn save_agent_memory(&self, world_id: &str, agent_id: &str, memory: &[AgentMessage]) -> Result<(), StorageError> {
        let mut agents = self.agents.lock().unwrap();
        if let Some(agent) = agents.get_mut(&(world_id.to_string(), agent_id.to_string())) {
            agent.memory = memory.to_vec();
        }
        Ok(())
    }
    async fn save_agents_batch(&self, agents: &[Agent]) -> Result<(), StorageError> {
        let mut store = self.agents.lock().unwrap();
        for agent in agents {
            store.insert((agent.world_id.clone(), agent.id.clone()), agent.clone());
        }
        Ok(())
    }
    async fn load_agents_batch(&self, world_id: &str, agent_ids: &[String]) -> Result<Vec<Agent>, StorageError> {
        let store = self.agents.lock().unwrap();
        if agent_ids.is_empty() {
            Ok(store.values().filter(|a| a.world_id == world_id).cloned().collect())
        } else {
            Ok(agent_ids
                .iter()
                .filter_map(|id| store.get(&(world_id.to_string(), id.clone())).cloned())
                .collect())
        }
    }
    async fn save_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        self.chats.lock().unwrap().insert((chat.world_id.clone(), chat.id.clone()), chat.clone());
        Ok(())
    }
    async fn load_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, StorageError> {
        Ok(self.chats.lock().unwrap().get(&(world_id.to_string(), chat_id.to_string())).cloned())
    }
    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, StorageError> {
        Ok(self.chats.lock().unwrap().values().filter(|c| c.world_id == world_id).cloned().collect())
    }
    async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), StorageError> {
        self.chats.lock().unwrap().remove(&(world_id.to_string(), chat_id.to_string()));
        Ok(())
    }
    async fn load_world_chat_full(&self, world_id: &str, chat_id: &str) -> Result<Option<WorldChat>, StorageError> {
        let Some(world) = self.load_world(world_id).await? else {
            return Ok(None);
        };
        let agents = self.list_agents(world_id).await?;
        Ok(Some(WorldChat::build(world, agents, chat_id)))
    }
    async fn archive_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        memory: Vec<AgentMessage>,
        metadata: ArchiveMetadata,
    ) -> Result<String, StorageError> {
        let archive = MemoryArchive::new(world_id, agent_id, memory, metadata);
        let id = archive.archive_id.clone();
        self.archives.lock().unwrap().insert(id.clone(), archive);
        Ok(id)
    }
    async fn search_archives(&self, query: &ArchiveQuery) -> Result<Vec<MemoryArchive>, StorageError> {
        Ok(self.archives.lock().unwrap().values().filter(|a| query.matches(a)).cloned().collect())
    }
    async fn export_archive(&self, archive_id: &str, _opts: ArchiveExportOptions) -> Result<MemoryArchive, StorageError> {
        self.archives
            .lock()
            .unwrap()
            .get(archive_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(archive_id.to_string()))
    }
    async fn validate_integrity(&self, _world_id: &str, _agent_id: Option<&str>) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
    async fn repair_data(&self, _world_id: &str, _agent_id: Option<&str>) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}

/// Resolves a pre-registered `LlmClient` per agent id, so each test can
/// script a different conversation for each agent without touching a real
/// provider.
struct TestProviderFactory {
    clients: StdMutex<HashMap<String, Arc<dyn LlmClient>>>,
}

impl TestProviderFactory {
    fn new() -> Self {
        Self {
            clients: StdMutex::new(HashMap::new()),
        }
    }

    fn set(&self, agent_id: &str, client: Arc<dyn LlmClient>) {
        self.clients.lock().unwrap().insert(agent_id.to_string(), client);
    }
}

impl ProviderFactory for TestProviderFactory {
    fn build(&self, agent: &Agent) -> Arc<dyn LlmClient> {
        self.clients
            .lock()
            .unwrap()
            .get(&agent.id)
            .cloned()
            .unwrap_or_else(|| Arc::new(MockLlmClient::fixed("(unscripted)")))
    }
}

fn manager(factory: Arc<TestProviderFactory>) -> Arc<WorldManager> {
    manager_with_hitl(factory, Arc::new(AutoTimeoutResponder))
}

fn manager_with_hitl(factory: Arc<TestProviderFactory>, hitl: Arc<dyn HitlResponder>) -> Arc<WorldManager> {
    Arc::new(WorldManager::new(
        Arc::new(InMemoryStorage::default()),
        Arc::new(Orchestrator::new(4)),
        factory,
        Arc::new(ToolExecutor::new(hitl)),
    ))
}

/// Subscribes to the world's message topic and returns a handle that
/// accumulates `(sender, content)` pairs in publish order.
async fn record_messages(
    world: &Arc<tokio::sync::Mutex<agent_world::RuntimeWorld>>,
) -> Arc<AsyncMutex<Vec<(String, String)>>> {
    let log = Arc::new(AsyncMutex::new(Vec::new()));
    let log_clone = log.clone();
    let bus = world.lock().await.bus.clone();
    bus.subscribe(Topic::Message, move |event| {
        let log = log_clone.clone();
        Box::pin(async move {
            if let BusEvent::Message(m) = event {
                log.lock().await.push((m.sender, m.content));
            }
        })
    })
    .await;
    log
}

async fn make_world(wm: &WorldManager, name: &str) -> Arc<tokio::sync::Mutex<agent_world::RuntimeWorld>> {
    let config = wm
        .create_world(CreateWorldParams {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    wm.get_world(&config.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn human_broadcast_reaches_every_active_agent() {
    let factory = Arc::new(TestProviderFactory::new());
    factory.set("alice", Arc::new(MockLlmClient::fixed("hi from alice")));
    factory.set("bob", Arc::new(MockLlmClient::fixed("hi from bob")));
    let wm = manager(factory);

    let world = make_world(&wm, "Broadcast World").await;
    wm.create_agent(&world, Agent::new("broadcast-world", "alice", "Alice")).await.unwrap();
    wm.create_agent(&world, Agent::new("broadcast-world", "bob", "Bob")).await.unwrap();

    let log = record_messages(&world).await;
    wm.publish_message(&world, "hello everyone", "human").await;

    let seen = log.lock().await.clone();
    let senders: Vec<&str> = seen.iter().map(|(s, _)| s.as_str()).collect();
    assert!(senders.contains(&"alice"));
    assert!(senders.contains(&"bob"));
}

#[tokio::test]
async fn targeted_mention_only_reaches_the_mentioned_agent() {
    let factory = Arc::new(TestProviderFactory::new());
    factory.set("alice", Arc::new(MockLlmClient::fixed("only me")));
    factory.set("bob", Arc::new(MockLlmClient::fixed("should not run")));
    let wm = manager(factory);

    let world = make_world(&wm, "Mention World").await;
    wm.create_agent(&world, Agent::new("mention-world", "alice", "Alice")).await.unwrap();
    wm.create_agent(&world, Agent::new("mention-world", "bob", "Bob")).await.unwrap();

    let log = record_messages(&world).await;
    wm.publish_message(&world, "@alice only you please", "human").await;

    let seen = log.lock().await.clone();
    assert!(seen.iter().any(|(s, c)| s == "alice" && c == "only me"));
    assert!(!seen.iter().any(|(s, _)| s == "bob"));
}

#[tokio::test]
async fn turn_limit_rejects_and_publishes_human_notice_instead_of_replying() {
    let factory = Arc::new(TestProviderFactory::new());
    factory.set("alice", Arc::new(MockLlmClient::fixed("should not be reached")));
    let wm = manager(factory);

    let world = make_world(&wm, "Limited World").await;
    let mut alice = Agent::new("limited-world", "alice", "Alice");
    alice.llm_call_count = 1;
    wm.create_agent(&world, alice).await.unwrap();
    wm.update_world("limited-world", |c| c.turn_limit = 1).await.unwrap();

    let log = record_messages(&world).await;
    wm.publish_message(&world, "@alice are you there", "human").await;

    let seen = log.lock().await.clone();
    assert!(seen.iter().any(|(s, c)| s == "alice" && c.contains("Turn limit reached")));
    assert!(!seen.iter().any(|(s, c)| s == "alice" && c == "should not be reached"));
}

#[tokio::test]
async fn pass_command_suppresses_reply_and_hands_control_back_to_human() {
    let factory = Arc::new(TestProviderFactory::new());
    factory.set(
        "alice",
        Arc::new(MockLlmClient::fixed("I'll let you take it from here <world>pass</world>")),
    );
    let wm = manager(factory);

    let world = make_world(&wm, "Pass World").await;
    wm.create_agent(&world, Agent::new("pass-world", "alice", "Alice")).await.unwrap();

    let log = record_messages(&world).await;
    wm.publish_message(&world, "@alice what next?", "human").await;

    let seen = log.lock().await.clone();
    assert!(seen.iter().any(|(s, c)| s == "system" && c.contains("alice is passing control to you")));
    assert!(!seen.iter().any(|(s, _)| s == "alice"));
}

#[tokio::test]
async fn tool_call_round_trip_executes_shell_cmd_before_final_reply() {
    let factory = Arc::new(TestProviderFactory::new());
    factory.set(
        "alice",
        Arc::new(MockLlmClient::new(vec![
            ScriptedTurn::with_tool_call(ToolCall {
                id: "call_1".to_string(),
                name: "shell_cmd".to_string(),
                arguments: r#"{"command":"echo","parameters":["round-trip"]}"#.to_string(),
            }),
            ScriptedTurn::text("done running the command"),
        ])),
    );
    let wm = manager_with_hitl(factory, Arc::new(ScriptedHitlResponder::always_select("Approve")));

    let world = make_world(&wm, "Tool World").await;
    wm.create_agent(&world, Agent::new("tool-world", "alice", "Alice")).await.unwrap();

    let log = record_messages(&world).await;
    wm.publish_message(&world, "@alice please run a command", "human").await;

    let seen = log.lock().await.clone();
    assert!(seen.iter().any(|(s, c)| s == "alice" && c == "done running the command"));

    let agent = wm.get_agent(&world, "alice").await.unwrap();
    let tool_message = agent
        .memory
        .iter()
        .find(|m| m.role == agent_world::Role::Tool)
        .expect("tool result recorded in conversation, not just final memory");
    assert!(tool_message.content.contains("round-trip"), "shell_cmd actually ran and echoed its argument");
    assert_eq!(agent.llm_call_count, 1, "one orchestrator turn recorded regardless of tool iterations");
}
