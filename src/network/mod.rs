//! Host-to-guest network translation.
//!
//! The network-setup collaborator resolves each pod endpoint into a
//! [`NetworkInterface`] with its routes. This module turns those into the
//! interface and route entries carried by the pod start command.

mod interface;
mod route;

pub use interface::{translate_interface, translate_network, NetworkInterface};
pub use route::{translate_route, translate_routes, OmitReason, RouteSpec, RouteTranslation};
