//! Start command implementation.

use clap::Args;
use hyperbridge::agent::{AgentBridge, UnixConnector};
use hyperbridge::config::{BridgeSettings, HyperConfig};
use hyperbridge::network::NetworkInterface;
use hyperbridge::pause::PauseProvisioner;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Start a pod against a running guest agent, check it, then tear it down.
#[derive(Args, Debug)]
pub struct StartCmd {
    /// Pod identifier.
    #[arg(long)]
    pub pod: String,

    /// JSON file with the pod's network interfaces.
    #[arg(long)]
    pub network: Option<PathBuf>,

    /// Use the conventional per-pod socket layout instead of the configured one.
    #[arg(long)]
    pub default_channels: bool,
}

impl StartCmd {
    /// Execute the start command.
    pub fn run(self, settings: &BridgeSettings) -> hyperbridge::Result<()> {
        let interfaces = match &self.network {
            Some(path) => load_interfaces(path)?,
            None => Vec::new(),
        };

        let config = if self.default_channels {
            HyperConfig::default_for_pod(&self.pod, settings.hyper.pause_bin_path.clone())
        } else {
            settings.hyper.clone()
        };

        let provisioner = Arc::new(PauseProvisioner::new(&settings.shared_dir));
        let connector = Arc::new(UnixConnector::from_settings(settings));
        let mut bridge = AgentBridge::new(&self.pod, config, provisioner, connector);

        println!("Starting pod {}...", self.pod);
        let result = bridge.start(&interfaces).and_then(|_| bridge.ping());
        match result {
            Ok(version) => println!("Pod {} running (agent protocol v{})", self.pod, version),
            Err(ref e) => tracing::error!(pod_id = %self.pod, error = %e, "pod start failed"),
        }

        bridge.stop();
        println!("Pod {} stopped", self.pod);

        result.map(|_| ())
    }
}

fn load_interfaces(path: &Path) -> hyperbridge::Result<Vec<NetworkInterface>> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| hyperbridge::Error::Serialization(e.to_string()))
}
