//! Validate command implementation.

use clap::Args;
use hyperbridge::config::BridgeSettings;

/// Check the agent channel configuration.
#[derive(Args, Debug)]
pub struct ValidateCmd {
    /// Pod identifier, used to tag log output.
    #[arg(long)]
    pub pod: Option<String>,
}

impl ValidateCmd {
    /// Execute the validate command.
    pub fn run(self, settings: &BridgeSettings) -> hyperbridge::Result<()> {
        if let Err(e) = settings.hyper.check() {
            tracing::warn!(pod_id = self.pod.as_deref().unwrap_or("-"), error = %e, "invalid agent channel configuration");
            return Err(e.into());
        }

        println!(
            "Channel configuration valid ({} auxiliary channels)",
            settings.hyper.sockets.len()
        );
        Ok(())
    }
}
