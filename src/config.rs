//! Bridge configuration.
//!
//! [`HyperConfig`] describes the channels used to talk to the guest agent
//! and where the pause binary comes from. [`BridgeSettings`] wraps it with
//! the process-wide values (shared directory, channel timeouts) and is
//! loaded from a TOML file.

use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default host directory shared into guests, one subdirectory per pod.
pub const DEFAULT_SHARED_DIR: &str = "/tmp/hyper/shared/pods";

/// Number of auxiliary channels the agent expects when any are configured.
pub const AUXILIARY_CHANNEL_COUNT: usize = 2;

/// Default control socket path for a pod.
pub fn default_ctl_sock_path(pod_id: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/hyper-pod-{}.sock", pod_id))
}

/// Default console socket path for a pod.
pub fn default_tty_sock_path(pod_id: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/tty-pod{}.sock", pod_id))
}

/// Auxiliary channel descriptor.
///
/// The hypervisor exposes each of these to the guest as a serial port
/// backed by a Unix socket on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socket {
    /// Hypervisor device id (e.g. "channel0").
    #[serde(default)]
    pub device_id: String,
    /// Character device id (e.g. "charch0").
    #[serde(default)]
    pub id: String,
    /// Host-side socket path.
    pub host_path: PathBuf,
    /// Channel name seen by the guest (e.g. "sh.hyper.channel.0").
    #[serde(default)]
    pub name: String,
}

/// Agent channel configuration for one pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperConfig {
    /// Control channel socket path.
    #[serde(default)]
    pub sock_ctl_name: String,

    /// Console channel socket path.
    #[serde(default)]
    pub sock_tty_name: String,

    /// Auxiliary channels (0 or 2).
    #[serde(default)]
    pub sockets: Vec<Socket>,

    /// Source of the static pause binary.
    #[serde(default)]
    pub pause_bin_path: PathBuf,
}

impl HyperConfig {
    /// Build the conventional configuration for a pod.
    ///
    /// Both channel sockets live under `/tmp`, and two auxiliary channels
    /// are declared on top of them.
    pub fn default_for_pod(pod_id: &str, pause_bin_path: impl Into<PathBuf>) -> Self {
        let paths = [default_ctl_sock_path(pod_id), default_tty_sock_path(pod_id)];

        let sockets = paths
            .iter()
            .enumerate()
            .map(|(i, path)| Socket {
                device_id: format!("channel{}", i),
                id: format!("charch{}", i),
                host_path: path.clone(),
                name: format!("sh.hyper.channel.{}", i),
            })
            .collect();

        Self {
            sock_ctl_name: paths[0].to_string_lossy().into_owned(),
            sock_tty_name: paths[1].to_string_lossy().into_owned(),
            sockets,
            pause_bin_path: pause_bin_path.into(),
        }
    }

    /// Check the channel configuration, reporting the first field at fault.
    pub fn check(&self) -> std::result::Result<(), ConfigError> {
        if self.sock_ctl_name.is_empty() {
            return Err(ConfigError::MissingControlChannel);
        }

        if self.sock_tty_name.is_empty() {
            return Err(ConfigError::MissingConsoleChannel);
        }

        match self.sockets.len() {
            0 | AUXILIARY_CHANNEL_COUNT => Ok(()),
            n => Err(ConfigError::AuxiliaryChannelCount(n)),
        }
    }

    /// Whether the configuration is acceptable for opening channels.
    ///
    /// `pod_id` only tags the log line emitted on failure.
    pub fn validate(&self, pod_id: Option<&str>) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(pod_id = pod_id.unwrap_or("-"), error = %e, "invalid agent channel configuration");
                false
            }
        }
    }
}

/// Process-wide bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Host directory shared into the guests.
    #[serde(default = "default_shared_dir")]
    pub shared_dir: PathBuf,

    /// Agent channel configuration.
    #[serde(default)]
    pub hyper: HyperConfig,

    /// Channel read timeout in seconds. None blocks indefinitely.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,

    /// Channel write timeout in seconds. None blocks indefinitely.
    #[serde(default)]
    pub write_timeout_secs: Option<u64>,
}

fn default_shared_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SHARED_DIR)
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            shared_dir: default_shared_dir(),
            hyper: HyperConfig::default(),
            read_timeout_secs: None,
            write_timeout_secs: None,
        }
    }
}

impl BridgeSettings {
    /// Load settings from a TOML file.
    ///
    /// If the file doesn't exist, returns the default settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Config(ConfigError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })
    }

    /// Channel read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Channel write timeout.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs.map(Duration::from_secs)
    }
}
