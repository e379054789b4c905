//! Startup banner

use std::net::{Ipv4Addr, SocketAddr};

use network_interface::{NetworkInterface, NetworkInterfaceConfig};

/// Non-loopback IPv4 addresses of this host, by interface
fn host_addresses() -> Vec<(String, Ipv4Addr)> {
    NetworkInterface::show()
        .unwrap_or_default()
        .into_iter()
        .flat_map(|iface| {
            iface
                .addr
                .iter()
                .filter_map(|addr| match addr {
                    network_interface::Addr::V4(v4) if !v4.ip.is_loopback() => {
                        Some((iface.name.clone(), v4.ip))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Lines describing where clients can connect
pub fn lines(product: &str, version: &str, addr: SocketAddr) -> Vec<String> {
    let mut lines = vec![format!("{} emulator v{}", product, version)];
    if addr.ip().is_unspecified() {
        lines.push(format!("Listening on all interfaces, port {}", addr.port()));
        for (name, ip) in host_addresses() {
            lines.push(format!("  {:<12} {}:{}", name, ip, addr.port()));
        }
    } else {
        lines.push(format!("Listening on {}", addr));
    }
    lines
}
