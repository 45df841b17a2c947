use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error_handling::types::ConfigError;

/// Identifier of the decoder applied to a relay's traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// No semantic decoding, bytes are only captured.
    #[default]
    Raw,
    /// Hamlib `rigctld` radio-control protocol.
    Hamlib,
}

impl ProtocolMode {
    pub const ALL: [ProtocolMode; 2] = [ProtocolMode::Raw, ProtocolMode::Hamlib];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolMode::Raw => "raw",
            ProtocolMode::Hamlib => "hamlib",
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProtocolMode::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownProtocol(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("raw".parse::<ProtocolMode>().unwrap(), ProtocolMode::Raw);
        assert_eq!(" Hamlib ".parse::<ProtocolMode>().unwrap(), ProtocolMode::Hamlib);
        assert!(matches!(
            "modbus".parse::<ProtocolMode>(),
            Err(ConfigError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn serde_uses_lowercase_ids() {
        assert_eq!(serde_json::to_string(&ProtocolMode::Hamlib).unwrap(), "\"hamlib\"");
        let m: ProtocolMode = serde_json::from_str("\"raw\"").unwrap();
        assert_eq!(m, ProtocolMode::Raw);
    }
}
