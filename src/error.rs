//! Error types for hyperbridge.

use std::path::PathBuf;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors.
///
/// These are detected before any channel or filesystem I/O happens and
/// are fatal to pod start-up.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Control channel name is empty.
    #[error("control channel name is missing")]
    MissingControlChannel,

    /// Console channel name is empty.
    #[error("console channel name is missing")]
    MissingConsoleChannel,

    /// Auxiliary channel list has a length other than 0 or 2.
    #[error("expected 0 or 2 auxiliary channels, got {0}")]
    AuxiliaryChannelCount(usize),

    /// Settings file could not be read or parsed.
    #[error("failed to load settings from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Errors that can occur while bridging to the guest agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // =========================================================================
    // Filesystem
    // =========================================================================
    /// Staging the pause container rootfs failed.
    #[error("failed to provision pause container for pod '{pod_id}': {source}")]
    Provision {
        pod_id: String,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Channels and protocol
    // =========================================================================
    /// A channel could not be opened.
    #[error("failed to open {channel} channel at {}: {source}", path.display())]
    ChannelOpen {
        channel: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A command failed on the control channel or was rejected by the guest.
    #[error("{command} failed: {message}")]
    Protocol { command: String, message: String },

    /// Operation attempted in the wrong bridge state.
    #[error("invalid bridge state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    // =========================================================================
    // Generic
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a protocol error for a named command.
    pub fn protocol(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Build a provisioning error for a pod.
    pub fn provision(pod_id: impl Into<String>, source: std::io::Error) -> Self {
        Self::Provision {
            pod_id: pod_id.into(),
            source,
        }
    }

    /// Whether this error comes from configuration rather than I/O.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
