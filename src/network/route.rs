//! Route translation.

use hyperbridge_protocol::{Route as GuestRoute, DEFAULT_ROUTE_DEST, DEFAULT_ROUTE_LABEL};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

/// A route as resolved on the host.
///
/// A missing destination, like the all-zeros IPv4 network, means
/// "default route".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub dst: Option<IpNetwork>,
    #[serde(default)]
    pub gw: Option<IpAddr>,
}

impl RouteSpec {
    pub fn new(dst: Option<IpNetwork>, gw: Option<IpAddr>) -> Self {
        Self { dst, gw }
    }
}

/// Parses `DEST[,via=GW]`, where `DEST` is a CIDR or `default`.
impl FromStr for RouteSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let dest = parts.next().unwrap_or_default().trim();

        let dst = if dest.is_empty() || dest == DEFAULT_ROUTE_LABEL {
            None
        } else {
            Some(
                dest.parse::<IpNetwork>()
                    .map_err(|e| format!("invalid route destination '{}': {}", dest, e))?,
            )
        };

        let mut gw = None;
        for part in parts {
            let part = part.trim();
            let addr = part
                .strip_prefix("via=")
                .ok_or_else(|| format!("invalid route option '{}'", part))?;
            gw = Some(
                addr.parse::<IpAddr>()
                    .map_err(|e| format!("invalid gateway '{}': {}", addr, e))?,
            );
        }

        Ok(Self { dst, gw })
    }
}

/// Why a route was left out of the guest route set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmitReason {
    /// The guest agent has no IPv6 route support.
    Ipv6Destination,
}

impl std::fmt::Display for OmitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OmitReason::Ipv6Destination => write!(f, "IPv6 destination not supported by guest agent"),
        }
    }
}

/// Outcome of translating one host route.
///
/// `Omitted` is a normal result, not a failure: the pod starts without
/// that route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTranslation {
    Route(GuestRoute),
    Omitted(OmitReason),
}

impl RouteTranslation {
    /// The translated route, if it was kept.
    pub fn into_route(self) -> Option<GuestRoute> {
        match self {
            RouteTranslation::Route(route) => Some(route),
            RouteTranslation::Omitted(_) => None,
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, RouteTranslation::Omitted(_))
    }
}

/// Translate a host route into the guest agent's representation.
///
/// `device` is copied as-is; its existence is not checked here.
pub fn translate_route(route: &RouteSpec, device: &str) -> RouteTranslation {
    let dest = match route.dst {
        None => DEFAULT_ROUTE_LABEL.to_string(),
        Some(IpNetwork::V6(_)) => return RouteTranslation::Omitted(OmitReason::Ipv6Destination),
        Some(net) => {
            let cidr = net.to_string();
            if cidr == DEFAULT_ROUTE_DEST {
                DEFAULT_ROUTE_LABEL.to_string()
            } else {
                cidr
            }
        }
    };

    let gateway = match route.gw {
        Some(gw) if !gw.is_unspecified() => gw.to_string(),
        _ => String::new(),
    };

    RouteTranslation::Route(GuestRoute {
        dest,
        gateway,
        device: device.to_string(),
    })
}

/// Translate every route for a device, dropping the omitted ones.
pub fn translate_routes(routes: &[RouteSpec], device: &str) -> Vec<GuestRoute> {
    routes
        .iter()
        .filter_map(|route| match translate_route(route, device) {
            RouteTranslation::Route(r) => Some(r),
            RouteTranslation::Omitted(reason) => {
                tracing::debug!(
                    device,
                    dst = ?route.dst,
                    %reason,
                    "omitting route"
                );
                None
            }
        })
        .collect()
}
