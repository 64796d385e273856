use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
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

#[derive(Debug)]
pub enum StorageError {
    ReadFailed,
    WriteFailed,
    Malformed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::Malformed(e) => write!(f, "Malformed counter record: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum TransportError {
    BindFailed(std::io::Error),
    RegistrationFailed(std::io::Error),
    SendFailed(String),
    ReceiveFailed(std::io::Error),
    ChannelClosed,
    Decode(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::BindFailed(e) => write!(f, "Channel bind failed: {}", e),
            TransportError::RegistrationFailed(e) => {
                write!(f, "Channel registration failed: {}", e)
            }
            TransportError::SendFailed(e) => write!(f, "Channel send failed: {}", e),
            TransportError::ReceiveFailed(e) => write!(f, "Channel receive failed: {}", e),
            TransportError::ChannelClosed => write!(f, "Channel closed"),
            TransportError::Decode(e) => write!(f, "Undecodable channel message: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug)]
pub enum AssistantError {
    MissingApiKey,
    Request(String),
    Status(u16),
    Timeout,
    EmptyResponse,
}

impl fmt::Display for AssistantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssistantError::MissingApiKey => write!(f, "No assistant API key configured"),
            AssistantError::Request(e) => write!(f, "Assistant request failed: {}", e),
            AssistantError::Status(code) => write!(f, "Assistant returned HTTP status {}", code),
            AssistantError::Timeout => write!(f, "Assistant request timed out"),
            AssistantError::EmptyResponse => write!(f, "Assistant response had no text"),
        }
    }
}

impl std::error::Error for AssistantError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}
