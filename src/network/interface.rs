//! Interface translation.

use super::route::{translate_routes, RouteSpec};
use hyperbridge_protocol::{IpAddress, NetworkIface, Route as GuestRoute};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// A pod network endpoint as resolved on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Device name the guest first sees.
    pub device: String,
    /// Name the guest should rename the device to. Empty keeps `device`.
    #[serde(default)]
    pub new_device: String,
    #[serde(default)]
    pub addresses: Vec<IpNetwork>,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub mac_addr: String,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

impl NetworkInterface {
    /// Device name inside the guest once configured.
    pub fn guest_name(&self) -> &str {
        if self.new_device.is_empty() {
            &self.device
        } else {
            &self.new_device
        }
    }
}

/// Translate an interface into its guest form.
///
/// IPv6 addresses are skipped, the guest agent only configures IPv4.
pub fn translate_interface(iface: &NetworkInterface) -> NetworkIface {
    let ip_addresses = iface
        .addresses
        .iter()
        .filter_map(|addr| match addr {
            IpNetwork::V4(v4) => Some(IpAddress {
                ip_address: v4.ip().to_string(),
                net_mask: v4.prefix().to_string(),
            }),
            IpNetwork::V6(_) => {
                tracing::debug!(device = %iface.device, %addr, "skipping IPv6 address");
                None
            }
        })
        .collect();

    NetworkIface {
        device: iface.device.clone(),
        new_device: iface.guest_name().to_string(),
        ip_addresses,
        mtu: iface.mtu,
        mac_addr: iface.mac_addr.clone(),
    }
}

/// Translate all pod interfaces and their routes.
pub fn translate_network(ifaces: &[NetworkInterface]) -> (Vec<NetworkIface>, Vec<GuestRoute>) {
    let mut guest_ifaces = Vec::with_capacity(ifaces.len());
    let mut routes = Vec::new();

    for iface in ifaces {
        guest_ifaces.push(translate_interface(iface));
        routes.extend(translate_routes(&iface.routes, iface.guest_name()));
    }

    (guest_ifaces, routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperbridge_protocol::DEFAULT_ROUTE_LABEL;

    fn eth0() -> NetworkInterface {
        NetworkInterface {
            device: "tap0".into(),
            new_device: "eth0".into(),
            addresses: vec![
                "10.88.0.5/16".parse().unwrap(),
                "fd00::5/64".parse().unwrap(),
            ],
            mtu: 1500,
            mac_addr: "02:42:ac:11:00:02".into(),
            routes: vec![
                "default,via=10.88.0.1".parse().unwrap(),
                "fd00::/64".parse().unwrap(),
            ],
        }
    }

    #[test]
    fn test_translate_interface_ipv4_only() {
        let guest = translate_interface(&eth0());
        assert_eq!(guest.device, "tap0");
        assert_eq!(guest.new_device, "eth0");
        assert_eq!(guest.mtu, 1500);
        assert_eq!(
            guest.ip_addresses,
            vec![IpAddress {
                ip_address: "10.88.0.5".into(),
                net_mask: "16".into(),
            }]
        );
    }

    #[test]
    fn test_guest_name_falls_back_to_device() {
        let iface = NetworkInterface {
            device: "eth1".into(),
            ..Default::default()
        };
        assert_eq!(iface.guest_name(), "eth1");
        assert_eq!(translate_interface(&iface).new_device, "eth1");
    }

    #[test]
    fn test_translate_network_routes_use_guest_name() {
        let (ifaces, routes) = translate_network(&[eth0()]);
        assert_eq!(ifaces.len(), 1);
        assert_eq!(
            routes,
            vec![GuestRoute {
                dest: DEFAULT_ROUTE_LABEL.into(),
                gateway: "10.88.0.1".into(),
                device: "eth0".into(),
            }]
        );
    }

    #[test]
    fn test_interface_deserialize_json() {
        let iface: NetworkInterface = serde_json::from_str(
            r#"{"device":"eth0","addresses":["192.168.1.2/24"],"routes":[{"dst":"0.0.0.0/0","gw":"192.168.1.1"}]}"#,
        )
        .unwrap();
        assert_eq!(iface.addresses.len(), 1);
        assert_eq!(iface.routes[0].gw, Some("192.168.1.1".parse().unwrap()));
    }
}
