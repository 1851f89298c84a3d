//! Provision command implementation.

use clap::Args;
use hyperbridge::config::BridgeSettings;
use hyperbridge::pause::PauseProvisioner;
use std::path::PathBuf;

/// Stage the pause container rootfs for a pod.
#[derive(Args, Debug)]
pub struct ProvisionCmd {
    /// Pod identifier.
    #[arg(long)]
    pub pod: String,

    /// Pause binary to copy (overrides the configured path).
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Remove the staged pause rootfs instead.
    #[arg(long)]
    pub remove: bool,
}

impl ProvisionCmd {
    /// Execute the provision command.
    pub fn run(self, settings: &BridgeSettings) -> hyperbridge::Result<()> {
        let provisioner = PauseProvisioner::new(&settings.shared_dir);

        if self.remove {
            provisioner.remove(&self.pod)?;
            println!("Removed pause rootfs for pod {}", self.pod);
            return Ok(());
        }

        let source = self
            .source
            .unwrap_or_else(|| settings.hyper.pause_bin_path.clone());
        let dest = provisioner.provision(&self.pod, &source)?;

        println!("{}", dest.display());
        Ok(())
    }
}
