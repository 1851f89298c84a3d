//! Protocol types for hyperbridge host-to-guest communication.
//!
//! These are the messages exchanged between the host-side bridge and the
//! hyperstart agent running as init inside the VM.
//!
//! # Framing
//!
//! Each message is a 4-byte big-endian length header followed by a JSON
//! body. Frames larger than [`MAX_FRAME_SIZE`] are rejected on both sides.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Read;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Destination label the guest agent treats as "default route".
pub const DEFAULT_ROUTE_LABEL: &str = "default";

/// Canonical all-zeros IPv4 network the host uses for a default route.
pub const DEFAULT_ROUTE_DEST: &str = "0.0.0.0/0";

/// Mount tag under which the pod shared directory is exposed to the guest.
pub const SHARE_DIR_TAG: &str = "hyperShared";

/// Name of the pause container (and its directory in the shared dir).
pub const PAUSE_CONTAINER_NAME: &str = "pause-container";

/// File name of the pause binary inside the pause rootfs.
pub const PAUSE_BIN_NAME: &str = "pause";

/// Name of the rootfs directory inside a container directory.
pub const ROOTFS_DIR: &str = "rootfs";

// ============================================================================
// Pod description
// ============================================================================

/// A network route as understood by the guest agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination CIDR, or [`DEFAULT_ROUTE_LABEL`].
    pub dest: String,
    /// Gateway address. Empty when the route has no gateway.
    #[serde(default)]
    pub gateway: String,
    /// Device the route applies to.
    pub device: String,
}

/// An IPv4 address assigned to a guest interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub ip_address: String,
    /// Prefix length as a decimal string (e.g. "24").
    pub net_mask: String,
}

/// A network interface to configure inside the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIface {
    /// Device name as seen by the guest before renaming.
    pub device: String,
    /// Name the guest should give the device.
    pub new_device: String,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub mac_addr: String,
}

/// Environment variable for a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub env: String,
    pub value: String,
}

/// A process to run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default)]
    pub terminal: bool,
    pub args: Vec<String>,
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    pub workdir: String,
}

/// A container descriptor.
///
/// `image` is a path relative to the shared directory, `rootfs` the name
/// of the root filesystem directory inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub image: String,
    pub rootfs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstype: Option<String>,
    pub process: Process,
}

impl Container {
    /// Descriptor for the pause container staged in the shared directory.
    pub fn pause() -> Self {
        Self {
            id: PAUSE_CONTAINER_NAME.to_string(),
            image: PAUSE_CONTAINER_NAME.to_string(),
            rootfs: ROOTFS_DIR.to_string(),
            fstype: None,
            process: Process {
                args: vec![format!("./{}", PAUSE_BIN_NAME)],
                workdir: "/".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Pod start payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub hostname: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub interfaces: Vec<NetworkIface>,
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Mount tag of the shared directory.
    pub share_dir: String,
}

// ============================================================================
// Requests and responses
// ============================================================================

/// Request from host to guest agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AgentRequest {
    /// Start the pod sandbox.
    StartPod(Pod),
    /// Tear down the pod sandbox.
    DestroyPod,
    /// Create and start a container.
    NewContainer(Container),
    /// Send a signal to a container's init process.
    KillContainer { container: String, signal: i32 },
    /// Remove a stopped container.
    RemoveContainer { container: String },
    /// Execute an extra process in a container.
    Exec { container: String, process: Process },
    /// Liveness check.
    Ping,
}

impl AgentRequest {
    /// Short command name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            AgentRequest::StartPod(_) => "start_pod",
            AgentRequest::DestroyPod => "destroy_pod",
            AgentRequest::NewContainer(_) => "new_container",
            AgentRequest::KillContainer { .. } => "kill_container",
            AgentRequest::RemoveContainer { .. } => "remove_container",
            AgentRequest::Exec { .. } => "exec",
            AgentRequest::Ping => "ping",
        }
    }
}

/// Response from guest agent to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentResponse {
    /// Command acknowledged.
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    /// Reply to [`AgentRequest::Ping`].
    Pong { version: u32 },
    /// Command failed inside the guest.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

// ============================================================================
// Framing
// ============================================================================

/// Error encoding a message.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("message too large: {0} bytes (max 16 MiB)")]
    TooLarge(usize),
}

/// Error decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {0} bytes (max 16 MiB)")]
    TooLarge(usize),

    #[error("parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Encode a message as a length-prefixed JSON frame.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, EncodeError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(EncodeError::TooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one length-prefixed JSON frame from a reader.
pub fn read_message<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, DecodeError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(DecodeError::TooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    tracing::trace!(len, "decoded frame");

    Ok(serde_json::from_slice(&buf)?)
}
