//! # hyperbridge
//!
//! Host-side bridge to the hyperstart agent that runs as init inside a
//! pod's VM.
//!
//! The bridge covers what has to happen before the guest can run the
//! pod's containers:
//!
//! - checking the agent channel configuration ([`config::HyperConfig`]),
//! - staging the pause container rootfs in the shared directory
//!   ([`pause::PauseProvisioner`]),
//! - translating host network interfaces and routes into the agent's
//!   wire form ([`network`]),
//! - opening the channels and driving the pod through start-up
//!   ([`agent::AgentBridge`]).
//!
//! ```no_run
//! use hyperbridge::agent::{AgentBridge, UnixConnector};
//! use hyperbridge::config::HyperConfig;
//! use hyperbridge::pause::PauseProvisioner;
//! use std::sync::Arc;
//!
//! # fn main() -> hyperbridge::Result<()> {
//! let provisioner = Arc::new(PauseProvisioner::new("/tmp/hyper/shared/pods"));
//! let config = HyperConfig::default_for_pod("pod-1", "/usr/libexec/hyper/pause");
//!
//! let mut bridge = AgentBridge::new("pod-1", config, provisioner, Arc::new(UnixConnector::new()));
//! bridge.start(&[])?;
//! bridge.stop();
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod network;
pub mod pause;

pub use error::{ConfigError, Error, Result};
pub use hyperbridge_protocol as protocol;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
