use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::agent::{AgentContext, StatusEvent};
use crate::config::Config;
use crate::coordinator::{FrameCoordinator, TabId};
use crate::extract::SelectorSynthesizer;
use crate::host::TabHost;
use crate::replay::{AccessorRegistry, ReplayResult};
use crate::store::{MemoryStore, SessionStore};

/// WebSocket event types broadcast to clients
#[derive(Debug, Clone)]
pub enum WsEvent {
    ExtractionSaved {
        tab_id: TabId,
        page_id: String,
        page_name: String,
        count: usize,
    },
    EntryCompleted {
        tab_id: TabId,
        result: ReplayResult,
    },
    Error {
        tab_id: TabId,
        error: String,
    },
    Pong,
}

/// Connected WebSocket client info
#[derive(Debug)]
pub struct ConnectedClient {
    pub connected_at: Instant,
}

/// Shared application state
pub struct AppState {
    pub config: Config,

    /// Open tabs and the coordinator their frames report to
    pub tabs: TabHost,

    pub store: Arc<dyn SessionStore>,

    /// Accessors shared by every frame agent
    pub accessors: AccessorRegistry,

    /// Connected WebSocket clients: client_id -> client info
    pub connected_clients: DashMap<String, ConnectedClient>,

    /// Total connection count (for metrics)
    connection_count: AtomicUsize,

    /// Broadcast channel for WebSocket events
    pub ws_broadcast: broadcast::Sender<WsEvent>,

    /// Status lines published by frame agents
    pub status: broadcast::Sender<StatusEvent>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Self {
        let (tx, _) = broadcast::channel(1024);
        let (status, _) = broadcast::channel(1024);
        let accessors = AccessorRegistry::new();

        let coordinator = FrameCoordinator::new(store.clone())
            .with_timeouts(config.frame_timeout, config.operation_timeout);
        let ctx = AgentContext {
            synthesizer: SelectorSynthesizer::new(config.class_match_threshold),
            accessors: accessors.clone(),
            store: store.clone(),
            status: status.clone(),
        };

        Self {
            tabs: TabHost::new(Arc::new(coordinator), ctx),
            config,
            store,
            accessors,
            connected_clients: DashMap::new(),
            connection_count: AtomicUsize::new(0),
            ws_broadcast: tx,
            status,
        }
    }

    /// State backed by the store `config` selects.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = config.open_store()?;
        Ok(Self::new(config, store))
    }

    pub fn coordinator(&self) -> &FrameCoordinator {
        self.tabs.coordinator()
    }

    pub fn broadcast(&self, event: WsEvent) {
        // Ignore send errors (no receivers)
        let _ = self.ws_broadcast.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.ws_broadcast.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Register a WebSocket client connection
    pub fn client_connected(&self, client_id: &str) {
        self.connected_clients.insert(
            client_id.to_string(),
            ConnectedClient {
                connected_at: Instant::now(),
            },
        );
        let count = self.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "Client {} connected (total: {}, active: {})",
            client_id,
            count,
            self.connected_clients.len()
        );
    }

    /// Unregister a WebSocket client connection
    pub fn client_disconnected(&self, client_id: &str) {
        if let Some((_, client)) = self.connected_clients.remove(client_id) {
            let duration = client.connected_at.elapsed();
            tracing::debug!(
                "Client {} disconnected after {:?} (active: {})",
                client_id,
                duration,
                self.connected_clients.len()
            );
        }
    }

    /// Get the number of active WebSocket connections
    pub fn active_connection_count(&self) -> usize {
        self.connected_clients.len()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default(), Arc::new(MemoryStore::new()))
    }
}
