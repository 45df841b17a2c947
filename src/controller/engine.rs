//! The relay engine.
//!
//! An [`Engine`] is an explicit instance owning everything a running relay
//! process needs: the proxy registry, the packet history, the event bus and
//! the live session table. Nothing is global, so several engines can run side
//! by side in one process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::info;
use tokio::task::JoinHandle;

use crate::configuration::types::{ProxyConfig, RelaySettings};
use crate::data_capture::{HistoryLog, PacketRecord, PacketRecorder};
use crate::error_handling::types::RegistryError;
use crate::event_bus::{EventBus, Subscription};
use crate::network::{spawn_health_monitor, ProxyRegistry, ProxyStatus};
use crate::protocol_decoding::PacketCodec;
use crate::session_management::{SessionInfo, SessionManager};

pub struct Engine {
    history: Arc<HistoryLog>,
    bus: Arc<EventBus>,
    sessions: Arc<SessionManager>,
    registry: Arc<ProxyRegistry>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(settings: RelaySettings, codec: PacketCodec) -> Self {
        let history = Arc::new(HistoryLog::new(settings.history_capacity));
        let bus = Arc::new(EventBus::new(settings.mailbox_capacity));
        let sessions = Arc::new(SessionManager::new());
        let recorder = PacketRecorder::new(Arc::clone(&history), Arc::clone(&bus), Arc::new(codec));
        let registry = Arc::new(ProxyRegistry::new(recorder, Arc::clone(&sessions), settings));

        Self {
            history,
            bus,
            sessions,
            registry,
            monitor: Mutex::new(None),
        }
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub async fn add_proxy(&self, config: ProxyConfig) -> Result<(), RegistryError> {
        self.registry.add_proxy(config).await
    }

    pub async fn remove_proxy(&self, local_port: u16) -> Result<(), RegistryError> {
        self.registry.remove_proxy(local_port).await
    }

    pub fn list_proxies(&self) -> Vec<ProxyConfig> {
        self.registry.list_proxies()
    }

    pub fn proxy_statuses(&self) -> Vec<ProxyStatus> {
        self.registry.proxy_statuses()
    }

    /// The `limit` most recent packets, newest first.
    pub fn get_history(&self, limit: usize) -> Vec<Arc<PacketRecord>> {
        self.history.snapshot(limit)
    }

    pub fn get_history_for(&self, proxy_name: &str, limit: usize) -> Vec<Arc<PacketRecord>> {
        self.history.snapshot_for(proxy_name, limit)
    }

    /// Every retained packet newer than `sequence`, oldest first.
    pub fn get_history_since(&self, sequence: u64) -> Vec<Arc<PacketRecord>> {
        self.history.since(sequence)
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        self.bus.unsubscribe(subscription)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list()
    }

    pub async fn check_health(&self) {
        self.registry.check_health().await
    }

    /// Starts probing relay targets every `period`, replacing any monitor
    /// already running.
    pub fn start_health_monitor(&self, period: Duration) {
        let task = spawn_health_monitor(Arc::downgrade(&self.registry), period);
        let previous = self
            .monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_health_monitor(&self) {
        let task = self
            .monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Stops the monitor, removes every relay and aborts every session.
    pub async fn shutdown(&self) {
        self.stop_health_monitor();
        let proxies = self.registry.stop_all().await;
        let sessions = self.sessions.abort_all();
        info!(
            "Engine shutdown complete ({} proxies, {} sessions)",
            proxies, sessions
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_health_monitor();
    }
}
