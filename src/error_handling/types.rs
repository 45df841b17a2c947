use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadProxyFormat(String),
    UnknownProtocol(String),
    BadPortsRange(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadProxyFormat(e) => write!(f, "Proxy definition error: {}", e),
            ConfigError::UnknownProtocol(e) => write!(f, "Unknown protocol: {}", e),
            ConfigError::BadPortsRange(e) => write!(f, "Port range error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures of the relay create/remove operations. These are reported to the
/// caller and never tear down the engine.
#[derive(Debug)]
pub enum RegistryError {
    PortInUse(u16),
    NotFound(u16),
    BindFailed(u16, std::io::Error),
    InvalidConfig(ConfigError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::PortInUse(p) => write!(f, "Port {} is already in use", p),
            RegistryError::NotFound(p) => write!(f, "No proxy found on port {}", p),
            RegistryError::BindFailed(p, e) => write!(f, "Unable to bind port {}: {}", p, e),
            RegistryError::InvalidConfig(e) => write!(f, "Invalid proxy: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<ConfigError> for RegistryError {
    fn from(err: ConfigError) -> Self {
        RegistryError::InvalidConfig(err)
    }
}

#[derive(Debug)]
pub enum CaptureError {
    DialFailed(String, std::io::Error),
    DialTimeout(String),
    TcpStreamError(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DialFailed(target, e) => {
                write!(f, "Failed to connect to target {}: {}", target, e)
            }
            CaptureError::DialTimeout(target) => {
                write!(f, "Timed out connecting to target {}", target)
            }
            CaptureError::TcpStreamError(e) => write!(f, "TCP stream capture error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::TcpStreamError(err)
    }
}

#[derive(Debug)]
pub enum CodecError {
    BadPattern(regex::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::BadPattern(e) => write!(f, "Decoder pattern error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<regex::Error> for CodecError {
    fn from(err: regex::Error) -> Self {
        CodecError::BadPattern(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Unable to start web interface: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    CodecError(CodecError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::CodecError(e) => write!(f, "Codec error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web interface error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<CodecError> for ControllerError {
    fn from(err: CodecError) -> Self {
        ControllerError::CodecError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_name_the_port() {
        assert_eq!(
            RegistryError::PortInUse(9000).to_string(),
            "Port 9000 is already in use"
        );
        assert_eq!(
            RegistryError::NotFound(9001).to_string(),
            "No proxy found on port 9001"
        );
    }

    #[test]
    fn controller_error_wraps_config_error() {
        let err: ControllerError = ConfigError::NotInRange("history_capacity".into()).into();
        assert!(err.to_string().contains("history_capacity"));
    }
}
