//! Per-pod agent bridge.

use super::channel::{Channel, ChannelConnector, ChannelKind};
use super::client::{expect_ack, unexpected, AgentClient};
use crate::config::HyperConfig;
use crate::error::{Error, Result};
use crate::network::{translate_network, NetworkInterface};
use crate::pause::PauseProvisioner;
use hyperbridge_protocol::{AgentRequest, AgentResponse, Container, Pod, Process, SHARE_DIR_TAG};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle state of an [`AgentBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Nothing checked or opened yet.
    Unconnected,
    /// Channel configuration accepted.
    ChannelsValidated,
    /// All channels open.
    ChannelsOpen,
    /// Pod start command sent, waiting for the guest.
    PodConfigured,
    /// Guest acknowledged the pod; container commands allowed.
    Running,
    /// Torn down. Terminal.
    Stopped,
    /// A step failed. Only `stop` is accepted.
    Error,
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeState::Unconnected => write!(f, "unconnected"),
            BridgeState::ChannelsValidated => write!(f, "channels_validated"),
            BridgeState::ChannelsOpen => write!(f, "channels_open"),
            BridgeState::PodConfigured => write!(f, "pod_configured"),
            BridgeState::Running => write!(f, "running"),
            BridgeState::Stopped => write!(f, "stopped"),
            BridgeState::Error => write!(f, "error"),
        }
    }
}

/// Bridge between one pod and its guest agent.
///
/// The bridge exclusively owns the pod's channels. Every operation
/// checks the current state first and is rejected, without side effects,
/// when called out of order. Dropping the bridge closes its channels and
/// removes the staged pause rootfs, without asking the guest to shut down.
pub struct AgentBridge {
    pod_id: String,
    config: HyperConfig,
    provisioner: Arc<PauseProvisioner>,
    connector: Arc<dyn ChannelConnector>,
    state: BridgeState,
    client: Option<AgentClient>,
    console: Option<Box<dyn Channel>>,
    auxiliary: Vec<Box<dyn Channel>>,
    pause_path: Option<PathBuf>,
    failure: Option<String>,
}

impl AgentBridge {
    pub fn new(
        pod_id: impl Into<String>,
        config: HyperConfig,
        provisioner: Arc<PauseProvisioner>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        Self {
            pod_id: pod_id.into(),
            config,
            provisioner,
            connector,
            state: BridgeState::Unconnected,
            client: None,
            console: None,
            auxiliary: Vec::new(),
            pause_path: None,
            failure: None,
        }
    }

    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Description of the failure that moved the bridge to `Error`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Staged pause binary, once the pod has been configured.
    pub fn pause_path(&self) -> Option<&Path> {
        self.pause_path.as_deref()
    }

    /// Console channel, while channels are open.
    pub fn console(&mut self) -> Option<&mut (dyn Channel + 'static)> {
        self.console.as_deref_mut()
    }

    /// Number of open auxiliary channels.
    pub fn auxiliary_count(&self) -> usize {
        self.auxiliary.len()
    }

    // ========================================================================
    // Start-up sequence
    // ========================================================================

    /// Run the whole start-up sequence up to `Running`.
    pub fn start(&mut self, interfaces: &[NetworkInterface]) -> Result<()> {
        self.validate_channels()?;
        self.open_channels()?;
        self.configure_pod(interfaces)?;
        self.wait_running()
    }

    /// `Unconnected → ChannelsValidated`.
    pub fn validate_channels(&mut self) -> Result<()> {
        self.expect_state(BridgeState::Unconnected)?;

        match self.config.check() {
            Ok(()) => {
                self.transition(BridgeState::ChannelsValidated);
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// `ChannelsValidated → ChannelsOpen`.
    ///
    /// Any channel failing to open is fatal. Channels opened before the
    /// failure are closed again.
    pub fn open_channels(&mut self) -> Result<()> {
        self.expect_state(BridgeState::ChannelsValidated)?;

        match self.connect_all() {
            Ok(()) => {
                self.transition(BridgeState::ChannelsOpen);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `ChannelsOpen → PodConfigured`.
    ///
    /// Stages the pause rootfs, translates the pod network and sends the
    /// pod start command. IPv6 routes and addresses are left out.
    pub fn configure_pod(&mut self, interfaces: &[NetworkInterface]) -> Result<()> {
        self.expect_state(BridgeState::ChannelsOpen)?;

        let pause_path = match self
            .provisioner
            .provision(&self.pod_id, &self.config.pause_bin_path)
        {
            Ok(path) => path,
            Err(e) => return Err(self.fail(e)),
        };
        self.pause_path = Some(pause_path);

        let (interfaces, routes) = translate_network(interfaces);
        tracing::debug!(
            pod_id = %self.pod_id,
            interfaces = interfaces.len(),
            routes = routes.len(),
            "sending pod start command"
        );

        let req = AgentRequest::StartPod(Pod {
            hostname: self.pod_id.clone(),
            containers: vec![Container::pause()],
            interfaces,
            routes,
            share_dir: SHARE_DIR_TAG.to_string(),
        });

        let result = match self.client.as_mut() {
            Some(client) => client.send(&req),
            None => Err(Error::protocol(req.name(), "control channel not open")),
        };

        match result {
            Ok(()) => {
                self.transition(BridgeState::PodConfigured);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `PodConfigured → Running`, once the guest acknowledges the pod.
    pub fn wait_running(&mut self) -> Result<()> {
        self.expect_state(BridgeState::PodConfigured)?;

        let command = "start_pod";
        let result = match self.client.as_mut() {
            Some(client) => client
                .receive(command)
                .and_then(|resp| expect_ack(command, resp)),
            None => Err(Error::protocol(command, "control channel not open")),
        };

        match result {
            Ok(_) => {
                tracing::info!(pod_id = %self.pod_id, "pod running");
                self.transition(BridgeState::Running);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // ========================================================================
    // Running pod commands
    // ========================================================================

    /// Create and start a container in the pod.
    pub fn new_container(&mut self, container: Container) -> Result<()> {
        self.command(AgentRequest::NewContainer(container)).map(|_| ())
    }

    /// Signal a container's init process.
    pub fn kill_container(&mut self, container: &str, signal: i32) -> Result<()> {
        self.command(AgentRequest::KillContainer {
            container: container.to_string(),
            signal,
        })
        .map(|_| ())
    }

    /// Remove a container from the pod.
    pub fn remove_container(&mut self, container: &str) -> Result<()> {
        self.command(AgentRequest::RemoveContainer {
            container: container.to_string(),
        })
        .map(|_| ())
    }

    /// Kill a container with SIGKILL, then remove it.
    pub fn stop_container(&mut self, container: &str) -> Result<()> {
        self.kill_container(container, libc::SIGKILL)?;
        self.remove_container(container)
    }

    /// Run an extra process inside a container.
    pub fn exec(&mut self, container: &str, process: Process) -> Result<Option<serde_json::Value>> {
        self.command(AgentRequest::Exec {
            container: container.to_string(),
            process,
        })
    }

    /// Check that the agent still answers; returns its protocol version.
    pub fn ping(&mut self) -> Result<u32> {
        self.expect_state(BridgeState::Running)?;
        let command = "ping";

        let result = match self.client.as_mut() {
            Some(client) => client.request(&AgentRequest::Ping),
            None => Err(Error::protocol(command, "control channel not open")),
        };

        match result {
            Ok(AgentResponse::Pong { version }) => Ok(version),
            Ok(resp @ AgentResponse::Error { .. }) => Err(self.rejected(command, resp)),
            Ok(resp) => Err(self.fail(unexpected(command, resp))),
            Err(e) => Err(self.fail(e)),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tear the bridge down from any state.
    ///
    /// A running pod is asked to shut down first; a failure to do so is
    /// logged but does not prevent teardown. Idempotent.
    pub fn stop(&mut self) {
        if self.state == BridgeState::Stopped {
            return;
        }

        if self.state == BridgeState::Running {
            if let Some(client) = self.client.as_mut() {
                let result = client
                    .request(&AgentRequest::DestroyPod)
                    .and_then(|resp| expect_ack("destroy_pod", resp));
                if let Err(e) = result {
                    tracing::warn!(pod_id = %self.pod_id, error = %e, "destroy pod failed");
                }
            }
        }

        self.release();
        self.transition(BridgeState::Stopped);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Send a command in `Running` and wait for its acknowledgement.
    ///
    /// A transport failure moves the bridge to `Error`; a command the guest
    /// rejects is returned as an error and the pod stays running.
    fn command(&mut self, req: AgentRequest) -> Result<Option<serde_json::Value>> {
        self.expect_state(BridgeState::Running)?;
        let command = req.name();

        let result = match self.client.as_mut() {
            Some(client) => client.request(&req),
            None => Err(Error::protocol(command, "control channel not open")),
        };

        match result {
            Ok(resp @ AgentResponse::Error { .. }) => Err(self.rejected(command, resp)),
            Ok(resp) => expect_ack(command, resp).map_err(|e| self.fail(e)),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// A command the guest answered with an error. The pod keeps running.
    fn rejected(&self, command: &str, resp: AgentResponse) -> Error {
        let err = unexpected(command, resp);
        tracing::warn!(pod_id = %self.pod_id, command, error = %err, "agent rejected command");
        err
    }

    fn connect_all(&mut self) -> Result<()> {
        let connector = Arc::clone(&self.connector);

        let ctl_path = PathBuf::from(&self.config.sock_ctl_name);
        let control = open_channel(connector.as_ref(), ChannelKind::Control, &ctl_path)?;
        self.client = Some(AgentClient::new(control));

        let tty_path = PathBuf::from(&self.config.sock_tty_name);
        self.console = Some(open_channel(
            connector.as_ref(),
            ChannelKind::Console,
            &tty_path,
        )?);

        for (i, socket) in self.config.sockets.iter().enumerate() {
            // The default layout backs the control and console channels
            // with the auxiliary sockets; those are already open.
            if socket.host_path == ctl_path || socket.host_path == tty_path {
                tracing::debug!(
                    index = i,
                    path = %socket.host_path.display(),
                    "auxiliary channel shares a primary channel socket"
                );
                continue;
            }

            let channel = open_channel(
                connector.as_ref(),
                ChannelKind::Auxiliary(i),
                &socket.host_path,
            )?;
            self.auxiliary.push(channel);
        }

        Ok(())
    }

    fn close_channels(&mut self) {
        let had_channels = self.client.is_some() || self.console.is_some();
        self.client = None;
        self.console = None;
        self.auxiliary.clear();

        if had_channels {
            tracing::debug!(pod_id = %self.pod_id, "channels closed");
        }
    }

    /// Close channels and remove the pause rootfs this bridge staged.
    fn release(&mut self) {
        self.close_channels();

        if self.pause_path.take().is_some() {
            if let Err(e) = self.provisioner.remove(&self.pod_id) {
                tracing::warn!(pod_id = %self.pod_id, error = %e, "failed to remove pause rootfs");
            }
        }
    }

    fn expect_state(&self, expected: BridgeState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn transition(&mut self, next: BridgeState) {
        tracing::debug!(pod_id = %self.pod_id, from = %self.state, to = %next, "bridge state change");
        self.state = next;
    }

    /// Record `err`, release the pod's resources and move to `Error`.
    fn fail(&mut self, err: Error) -> Error {
        tracing::error!(pod_id = %self.pod_id, state = %self.state, error = %err, "pod start-up failed");
        self.failure = Some(err.to_string());
        self.release();
        self.transition(BridgeState::Error);
        err
    }
}

impl Drop for AgentBridge {
    fn drop(&mut self) {
        if self.state != BridgeState::Stopped {
            self.release();
        }
    }
}

impl std::fmt::Debug for AgentBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBridge")
            .field("pod_id", &self.pod_id)
            .field("state", &self.state)
            .field("auxiliary", &self.auxiliary.len())
            .field("failure", &self.failure)
            .finish()
    }
}

fn open_channel(
    connector: &dyn ChannelConnector,
    kind: ChannelKind,
    path: &Path,
) -> Result<Box<dyn Channel>> {
    connector.open(kind, path).map_err(|source| Error::ChannelOpen {
        channel: kind.to_string(),
        path: path.to_path_buf(),
        source,
    })
}
