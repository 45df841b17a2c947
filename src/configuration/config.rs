use super::types::*;
use crate::error_handling::types::ConfigError;
use crate::event_bus::EventBus;
use clap::Parser;
use log::info;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments.
///
/// Every flag overrides the matching value of the configuration file. Relays
/// given with `--proxy` are started in addition to the ones of the file.
#[derive(Parser, Debug, Clone)]
#[command(name = "relayscope")]
#[command(version)]
#[command(about = "Debugging TCP relay that captures and decodes every byte it forwards")]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(long, short, env = "RELAYSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the web interface binds to
    #[arg(long)]
    pub host: Option<String>,

    /// Port the web interface listens on
    #[arg(long)]
    pub port: Option<u16>,

    /// Start a relay, format NAME:LOCAL_PORT:TARGET_HOST:TARGET_PORT[:PROTOCOL]
    ///
    /// Can be given several times.
    #[arg(long = "proxy", value_name = "SPEC")]
    pub proxies: Vec<ProxyConfig>,

    /// Do not start the web interface
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_web: bool,
}

/// Application configuration.
///
/// # Fields Overview
///
/// - `bind_address`: address relay listeners bind to
/// - `web_ui_enabled`, `web_ui_address`, `web_ui_port`: HTTP API and live feed
/// - `history_capacity`: packets kept in the shared history
/// - `mailbox_capacity`: events buffered per live observer before the oldest
///   are dropped
/// - `connect_timeout_secs`: bound on dialing a relay target
/// - `drain_timeout_ms`: grace period for the remaining direction of a session
/// - `health_check_interval_secs`: target probe period, `0` disables probing
/// - `proxies`: relays started at boot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind_address: String,
    pub web_ui_enabled: bool,
    pub web_ui_address: String,
    pub web_ui_port: u16,
    pub history_capacity: usize,
    pub mailbox_capacity: usize,
    pub connect_timeout_secs: u64,
    pub drain_timeout_ms: u64,
    pub health_check_interval_secs: u64,
    pub proxies: Vec<ProxyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            web_ui_enabled: true,
            web_ui_address: "0.0.0.0".to_string(),
            web_ui_port: 8002,
            history_capacity: 2000,
            mailbox_capacity: EventBus::DEFAULT_MAILBOX_CAPACITY,
            connect_timeout_secs: 5,
            drain_timeout_ms: 2000,
            health_check_interval_secs: 5,
            proxies: Vec::new(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the effective configuration: the file named by `args` (or the
    /// defaults), overridden by the command-line flags.
    pub fn load(args: &Args) -> Result<Config, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.web_ui_address = host.clone();
        }
        if let Some(port) = args.port {
            self.web_ui_port = port;
        }
        if args.no_web {
            self.web_ui_enabled = false;
        }
        self.proxies.extend(args.proxies.iter().cloned());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::NotInRange(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::NotInRange(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        for proxy in &self.proxies {
            proxy.validate()?;
        }
        Ok(())
    }

    pub fn web_ui_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.web_ui_address, self.web_ui_port)
            .parse()
            .map_err(|_| {
                ConfigError::BadProxyFormat(format!(
                    "web interface address '{}:{}' is not an IP socket address",
                    self.web_ui_address, self.web_ui_port
                ))
            })
    }

    /// Probe period of the target health monitor, `None` when disabled.
    pub fn health_check_interval(&self) -> Option<Duration> {
        match self.health_check_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            bind_address: self.bind_address.clone(),
            history_capacity: self.history_capacity,
            mailbox_capacity: self.mailbox_capacity,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }
}
