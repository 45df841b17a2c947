use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Notify;

use super::engine::Engine;
use crate::configuration::config::Config;
use crate::error_handling::types::*;
use crate::protocol_decoding::PacketCodec;
use crate::web_interface::WebServer;

/// Process bootstrap: builds the engine from the configuration, starts the
/// configured relays, the health monitor and the web interface, then waits
/// for Ctrl-C or `POST /api/shutdown`.
pub struct Controller {
    pub config: Config,
    engine: Arc<Engine>,
    shutdown: Arc<Notify>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        let codec = PacketCodec::with_builtin_decoders()?;
        let engine = Arc::new(Engine::new(config.relay_settings(), codec));
        Ok(Self {
            config,
            engine,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Notifying this handle stops [`Controller::run`].
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Starts every configured relay. A relay that fails is logged and
    /// skipped; returns how many started.
    pub async fn start_proxies(&self) -> usize {
        let mut started = 0;
        for proxy in &self.config.proxies {
            match self.engine.add_proxy(proxy.clone()).await {
                Ok(()) => started += 1,
                Err(e) => error!(
                    "Failed to start proxy '{}' on port {}: {}",
                    proxy.name, proxy.local_port, e
                ),
            }
        }
        if started < self.config.proxies.len() {
            warn!(
                "{} of {} configured proxies started",
                started,
                self.config.proxies.len()
            );
        }
        started
    }

    pub async fn run(self) -> Result<(), ControllerError> {
        let web_addr = if self.config.web_ui_enabled {
            Some(self.config.web_ui_socket_addr()?)
        } else {
            None
        };

        let started = self.start_proxies().await;
        info!("{} proxies running", started);

        if let Some(period) = self.config.health_check_interval() {
            self.engine.start_health_monitor(period);
        }

        let mut web_task = web_addr.map(|addr| {
            let server = WebServer::new(Arc::clone(&self.engine), Arc::clone(&self.shutdown));
            tokio::spawn(async move { server.start(addr).await })
        });

        let outcome = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Interrupt received, shutting down"),
                    Err(e) => error!("Unable to listen for the interrupt signal: {}", e),
                }
                Ok(())
            }
            _ = self.shutdown.notified() => {
                info!("Shutdown requested");
                Ok(())
            }
            joined = async {
                match web_task.as_mut() {
                    Some(task) => task.await,
                    None => std::future::pending().await,
                }
            } => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ControllerError::WebError(e)),
                Err(e) => Err(ControllerError::InitializationFailed(format!(
                    "web interface task failed: {}",
                    e
                ))),
            },
        };

        self.engine.shutdown().await;
        if let Some(task) = web_task {
            task.abort();
        }
        outcome
    }
}
