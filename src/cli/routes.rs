//! Routes command implementation.

use clap::Args;
use hyperbridge::network::{translate_route, RouteSpec, RouteTranslation};

/// Translate host routes into guest agent routes.
#[derive(Args, Debug)]
pub struct RoutesCmd {
    /// Device the routes apply to.
    #[arg(long)]
    pub device: String,

    /// Routes as DEST[,via=GW]; DEST is a CIDR or "default".
    #[arg(required = true)]
    pub routes: Vec<RouteSpec>,
}

impl RoutesCmd {
    /// Execute the routes command.
    pub fn run(self) -> hyperbridge::Result<()> {
        let mut kept = Vec::with_capacity(self.routes.len());

        for route in &self.routes {
            match translate_route(route, &self.device) {
                RouteTranslation::Route(r) => kept.push(r),
                RouteTranslation::Omitted(reason) => {
                    let dst = route
                        .dst
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "default".to_string());
                    eprintln!("omitted {}: {}", dst, reason);
                }
            }
        }

        let json = serde_json::to_string_pretty(&kept)
            .map_err(|e| hyperbridge::Error::Serialization(e.to_string()))?;
        println!("{}", json);
        Ok(())
    }
}
