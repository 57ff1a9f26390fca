//! The Everclaw runtime — explicit wiring of every subsystem.
//!
//! One [`Runtime`] value is constructed at startup and threaded through
//! all entry points (webhook ingest, dispatchers, heartbeat). There is no
//! module-level mutable state: configuration, the provider, the stores,
//! and the registries all live here.

pub mod dispatch;
pub mod heartbeat;
pub mod ingest;

use everclaw_agent::{AgentLoop, CompactionConfig};
use everclaw_config::Config;
use everclaw_core::channel::ChannelRegistry;
use everclaw_core::event::EventBus;
use everclaw_core::provider::Provider;
use everclaw_durable::SessionSupervisor;
use everclaw_memory::{MemoryStore, SessionStore};
use heartbeat::Heartbeat;
use std::path::PathBuf;
use std::sync::Arc;

/// The services bundle.
pub struct Runtime {
    pub config: Config,
    pub agent: Arc<AgentLoop>,
    pub channels: Arc<ChannelRegistry>,
    pub supervisor: Arc<SessionSupervisor>,
    pub bus: Arc<EventBus>,
    pub memory: MemoryStore,
    pub heartbeat: Heartbeat,
    /// Where durable step logs live.
    pub steps_dir: PathBuf,
}

impl Runtime {
    /// Wire the runtime from configuration plus the two injected
    /// collaborators (provider and channel handlers).
    pub fn new(config: Config, provider: Arc<dyn Provider>, channels: ChannelRegistry) -> Self {
        let sessions = SessionStore::new(config.sessions_dir());
        let memory = MemoryStore::new(&config.workspace);
        let steps_dir = config.workspace.join("runs");

        let main_tools = Arc::new(everclaw_tools::main_registry(
            &config.workspace,
            memory.clone(),
        ));
        let sub_tools = Arc::new(everclaw_tools::sub_agent_registry(
            &config.workspace,
            memory.clone(),
        ));

        let agent = AgentLoop::new(
            provider.clone(),
            &config.model,
            &config.agent_name,
            main_tools,
            sub_tools,
            sessions,
            memory.clone(),
        )
        .with_max_iterations(config.max_iterations)
        .with_compaction(CompactionConfig {
            max_tokens: config.compaction_max_tokens,
            threshold: config.compaction_threshold,
            keep_recent_tokens: config.keep_recent_tokens,
        });

        let heartbeat = Heartbeat::new(
            provider,
            &config.model,
            memory.clone(),
            config.memory_retention_days,
        );

        Self {
            config,
            agent: Arc::new(agent),
            channels: Arc::new(channels),
            supervisor: Arc::new(SessionSupervisor::new()),
            bus: Arc::new(EventBus::default()),
            memory,
            heartbeat,
            steps_dir,
        }
    }
}
