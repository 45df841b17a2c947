use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error_handling::types::ConfigError;
use crate::event_bus::EventBus;
use crate::protocol_decoding::ProtocolMode;

/// Identity of one relay. Immutable while the relay runs; changing it means
/// removing the relay and creating it again.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Display label, not required to be unique.
    pub name: String,
    /// Port the relay listens on. Unique among active relays.
    pub local_port: u16,
    pub target_host: String,
    pub target_port: u16,
    #[serde(default)]
    pub protocol: ProtocolMode,
}

impl ProxyConfig {
    pub fn new(
        name: impl Into<String>,
        local_port: u16,
        target_host: impl Into<String>,
        target_port: u16,
        protocol: ProtocolMode,
    ) -> Self {
        Self {
            name: name.into(),
            local_port,
            target_host: target_host.into(),
            target_port,
            protocol,
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::BadProxyFormat(format!(
                "proxy on port {} has an empty name",
                self.local_port
            )));
        }
        if self.target_host.trim().is_empty() {
            return Err(ConfigError::BadProxyFormat(format!(
                "proxy '{}' has an empty target host",
                self.name
            )));
        }
        if self.local_port == 0 || self.target_port == 0 {
            return Err(ConfigError::BadPortsRange(format!(
                "proxy '{}' needs non-zero ports, got {} -> {}",
                self.name, self.local_port, self.target_port
            )));
        }
        Ok(())
    }
}

/// Parses `NAME:LOCAL_PORT:TARGET_HOST:TARGET_PORT[:PROTOCOL]`.
impl FromStr for ProxyConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(ConfigError::BadProxyFormat(format!(
                "'{}' is not NAME:LOCAL_PORT:TARGET_HOST:TARGET_PORT[:PROTOCOL]",
                s
            )));
        }

        let port = |field: &str, value: &str| {
            value.parse::<u16>().map_err(|_| {
                ConfigError::BadPortsRange(format!("{} '{}' in '{}' is not a port", field, value, s))
            })
        };

        let protocol = match parts.get(4) {
            Some(p) => p.parse()?,
            None => ProtocolMode::Raw,
        };

        let config = ProxyConfig {
            name: parts[0].to_string(),
            local_port: port("local port", parts[1])?,
            target_host: parts[2].to_string(),
            target_port: port("target port", parts[3])?,
            protocol,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Engine-wide knobs shared by every relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    /// Address the relay listeners bind to.
    pub bind_address: String,
    pub history_capacity: usize,
    pub mailbox_capacity: usize,
    /// Upper bound for dialing a relay target.
    pub connect_timeout: Duration,
    /// Grace period for the second direction of a session once the first one
    /// has finished.
    pub drain_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            history_capacity: 2000,
            mailbox_capacity: EventBus::DEFAULT_MAILBOX_CAPACITY,
            connect_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_proxy_definition() {
        let cfg: ProxyConfig = "proxy1:8080:example.com:80".parse().unwrap();
        assert_eq!(cfg, ProxyConfig::new("proxy1", 8080, "example.com", 80, ProtocolMode::Raw));
        assert_eq!(cfg.target(), "example.com:80");

        let cfg: ProxyConfig = "Radio:9000:127.0.0.1:4532:hamlib".parse().unwrap();
        assert_eq!(cfg.protocol, ProtocolMode::Hamlib);
    }

    #[test]
    fn rejects_malformed_definitions() {
        assert!(matches!(
            "proxy1:8080:example.com".parse::<ProxyConfig>(),
            Err(ConfigError::BadProxyFormat(_))
        ));
        assert!(matches!(
            "proxy1:http:example.com:80".parse::<ProxyConfig>(),
            Err(ConfigError::BadPortsRange(_))
        ));
        assert!(matches!(
            "proxy1:0:example.com:80".parse::<ProxyConfig>(),
            Err(ConfigError::BadPortsRange(_))
        ));
        assert!(matches!(
            "proxy1:8080:example.com:80:modbus".parse::<ProxyConfig>(),
            Err(ConfigError::UnknownProtocol(_))
        ));
        assert!(matches!(
            ":8080:example.com:80".parse::<ProxyConfig>(),
            Err(ConfigError::BadProxyFormat(_))
        ));
    }

    #[test]
    fn protocol_defaults_to_raw_in_toml() {
        let cfg: ProxyConfig = toml::from_str(
            r#"
            name = "Plain"
            local_port = 9100
            target_host = "localhost"
            target_port = 3000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.protocol, ProtocolMode::Raw);
    }
}
