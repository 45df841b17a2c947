//! # Proxy Registry
//!
//! Owns the active relay listeners, keyed by local port. Each listener runs
//! an accept loop on its own task and hands every accepted client to a
//! [`RelaySession`] spawned on the runtime and tracked by the
//! [`SessionManager`].
//!
//! ```text
//! ┌──────────────┐ accept ┌──────────────┐ dial ┌────────┐
//! │ client       │───────▶│ RelaySession │─────▶│ target │
//! └──────────────┘        └──────┬───────┘      └────────┘
//!                                │ record
//!                                ▼
//!                   HistoryLog + EventBus
//! ```
//!
//! Removing a relay closes its listening socket only. Sessions it already
//! accepted keep relaying until either side closes, or until the engine shuts
//! down and aborts them.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use super::health_monitor::{probe_target, PROBE_TIMEOUT};
use super::types::{ProxyStatus, RelayCounters, TargetHealth};
use crate::configuration::types::{ProxyConfig, RelaySettings};
use crate::data_capture::{PacketRecorder, RelaySession};
use crate::error_handling::types::RegistryError;
use crate::event_bus::{Event, StatusEvent, TargetStatus};
use crate::session_management::{SessionInfo, SessionManager};

/// Back-off after a failed `accept`, e.g. when the process is out of file
/// descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Runtime side of one relay.
struct ProxyHandle {
    config: Arc<ProxyConfig>,
    accept_task: JoinHandle<()>,
    counters: Arc<RelayCounters>,
    health: TargetHealth,
}

/// What an accept loop needs to start sessions.
#[derive(Clone)]
struct SessionFactory {
    config: Arc<ProxyConfig>,
    recorder: PacketRecorder,
    sessions: Arc<SessionManager>,
    counters: Arc<RelayCounters>,
    connect_timeout: Duration,
    drain_timeout: Duration,
}

impl SessionFactory {
    fn start(&self, client: TcpStream, client_addr: SocketAddr) {
        let mut connection_id = Uuid::new_v4().simple().to_string();
        connection_id.truncate(8);

        self.counters
            .connections_accepted
            .fetch_add(1, Ordering::Relaxed);
        info!(
            "[{}] [{}] connection from {} on port {}",
            self.config.name, connection_id, client_addr, self.config.local_port
        );

        self.sessions.register(SessionInfo {
            connection_id: connection_id.clone(),
            local_port: self.config.local_port,
            proxy_name: self.config.name.clone(),
            client_addr,
            start_time: Utc::now(),
        });

        let session = RelaySession::new(
            Arc::clone(&self.config),
            connection_id.clone(),
            client,
            client_addr,
            self.recorder.clone(),
            Arc::clone(&self.counters),
            self.connect_timeout,
            self.drain_timeout,
        );
        let sessions = Arc::clone(&self.sessions);
        let id = connection_id.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = session.run().await {
                debug!("[{}] session ended: {}", id, e);
            }
            sessions.finish(&id);
        });
        self.sessions.attach(&connection_id, task.abort_handle());
    }
}

async fn accept_loop(listener: TcpListener, factory: SessionFactory) {
    loop {
        match listener.accept().await {
            Ok((stream, client_addr)) => factory.start(stream, client_addr),
            Err(e) => {
                warn!(
                    "[{}] accept failed on port {}: {}",
                    factory.config.name, factory.config.local_port, e
                );
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

pub struct ProxyRegistry {
    handles: Mutex<BTreeMap<u16, ProxyHandle>>,
    recorder: PacketRecorder,
    sessions: Arc<SessionManager>,
    settings: RelaySettings,
}

impl ProxyRegistry {
    pub fn new(recorder: PacketRecorder, sessions: Arc<SessionManager>, settings: RelaySettings) -> Self {
        Self {
            handles: Mutex::new(BTreeMap::new()),
            recorder,
            sessions,
            settings,
        }
    }

    fn handles(&self) -> MutexGuard<'_, BTreeMap<u16, ProxyHandle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, local_port: u16) -> bool {
        self.handles().contains_key(&local_port)
    }

    pub fn is_empty(&self) -> bool {
        self.handles().is_empty()
    }

    /// Binds `bind_address:local_port` and starts accepting clients.
    ///
    /// Success says nothing about the target: it is only dialed when a client
    /// connects.
    pub async fn add_proxy(&self, config: ProxyConfig) -> Result<(), RegistryError> {
        config.validate()?;
        let port = config.local_port;
        if self.contains(port) {
            return Err(RegistryError::PortInUse(port));
        }

        let addr = format!("{}:{}", self.settings.bind_address, port);
        let listener = TcpListener::bind(addr.as_str()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                RegistryError::PortInUse(port)
            } else {
                RegistryError::BindFailed(port, e)
            }
        })?;

        let config = Arc::new(config);
        let counters = Arc::new(RelayCounters::default());
        let factory = SessionFactory {
            config: Arc::clone(&config),
            recorder: self.recorder.clone(),
            sessions: Arc::clone(&self.sessions),
            counters: Arc::clone(&counters),
            connect_timeout: self.settings.connect_timeout,
            drain_timeout: self.settings.drain_timeout,
        };

        let mut handles = self.handles();
        // another caller may have registered the port while we were binding
        if handles.contains_key(&port) {
            return Err(RegistryError::PortInUse(port));
        }
        let accept_task = tokio::spawn(accept_loop(listener, factory));
        info!(
            "Proxy '{}' started on {} -> {} ({})",
            config.name,
            addr,
            config.target(),
            config.protocol
        );
        handles.insert(
            port,
            ProxyHandle {
                config,
                accept_task,
                counters,
                health: TargetHealth::default(),
            },
        );
        Ok(())
    }

    /// Stops the listener on `local_port`. The socket is closed when this
    /// returns; sessions it accepted are left running.
    pub async fn remove_proxy(&self, local_port: u16) -> Result<(), RegistryError> {
        let handle = self
            .handles()
            .remove(&local_port)
            .ok_or(RegistryError::NotFound(local_port))?;

        handle.accept_task.abort();
        let _ = handle.accept_task.await;
        info!(
            "Proxy '{}' on port {} stopped ({} sessions still draining)",
            handle.config.name,
            local_port,
            self.sessions.count_for(local_port)
        );
        Ok(())
    }

    /// Active relays ordered by local port.
    pub fn list_proxies(&self) -> Vec<ProxyConfig> {
        self.handles()
            .values()
            .map(|h| h.config.as_ref().clone())
            .collect()
    }

    pub fn proxy_statuses(&self) -> Vec<ProxyStatus> {
        let partial: Vec<(ProxyConfig, TargetHealth, Arc<RelayCounters>)> = self
            .handles()
            .values()
            .map(|h| (h.config.as_ref().clone(), h.health.clone(), Arc::clone(&h.counters)))
            .collect();

        partial
            .into_iter()
            .map(|(config, health, counters)| ProxyStatus {
                active_sessions: self.sessions.count_for(config.local_port),
                config,
                status: health.status,
                error_msg: health.error_msg,
                stats: counters.snapshot(),
            })
            .collect()
    }

    /// Removes every relay, returning how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<ProxyHandle> = std::mem::take(&mut *self.handles()).into_values().collect();
        let count = drained.len();
        for handle in drained {
            handle.accept_task.abort();
            let _ = handle.accept_task.await;
        }
        if count > 0 {
            info!("All proxies stopped ({})", count);
        }
        count
    }

    /// Probes every target once and publishes a status event for each relay
    /// whose health changed.
    pub async fn check_health(&self) {
        let targets: Vec<(u16, String, u16)> = self
            .handles()
            .values()
            .map(|h| (h.config.local_port, h.config.target_host.clone(), h.config.target_port))
            .collect();

        let mut probes = JoinSet::new();
        for (local_port, host, port) in targets {
            probes.spawn(async move {
                let result = probe_target(&host, port, PROBE_TIMEOUT).await;
                (local_port, result)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let (local_port, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("health probe task failed: {}", e);
                    continue;
                }
            };
            let next = match result {
                Ok(()) => TargetHealth {
                    status: TargetStatus::Online,
                    error_msg: None,
                },
                Err(msg) => TargetHealth {
                    status: TargetStatus::Offline,
                    error_msg: Some(msg),
                },
            };

            let changed = match self.handles().get_mut(&local_port) {
                Some(handle) if handle.health != next => {
                    handle.health = next.clone();
                    true
                }
                _ => false,
            };
            if changed {
                info!("Target of proxy on port {} is now {:?}", local_port, next.status);
                self.recorder.bus().publish(Event::Status(StatusEvent {
                    local_port,
                    status: next.status,
                    error_msg: next.error_msg,
                }));
            }
        }
    }
}

impl Drop for ProxyRegistry {
    fn drop(&mut self) {
        for handle in self.handles().values() {
            handle.accept_task.abort();
        }
    }
}
