//! Host identity published by the heartbeat.

use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

use chrono::{DateTime, Utc};
use keel_core::KeelConfig;
use keel_state::TrackedInstance;

use crate::error::{TrackerError, TrackerResult};

/// Interfaces tried, in order, when none is configured.
pub const DEFAULT_INTERFACES: [&str; 2] = ["eth0", "en0"];

/// A network interface and its addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// Source of hostname and interface data.
pub trait HostIdentity: Send + Sync {
    fn hostname(&self) -> TrackerResult<String>;

    /// Interfaces in system order.
    fn interfaces(&self) -> TrackerResult<Vec<Interface>>;
}

/// The local machine, read through `gethostname(2)` and `getifaddrs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostIdentity for SystemHost {
    fn hostname(&self) -> TrackerResult<String> {
        let name = nix::unistd::gethostname().map_err(|e| TrackerError::Host(e.to_string()))?;
        name.into_string()
            .map_err(|raw| TrackerError::Host(format!("hostname is not utf-8: {raw:?}")))
    }

    fn interfaces(&self) -> TrackerResult<Vec<Interface>> {
        let addrs = nix::ifaddrs::getifaddrs().map_err(|e| TrackerError::Host(e.to_string()))?;
        let mut interfaces: Vec<Interface> = Vec::new();
        for ifaddr in addrs {
            let ip = ifaddr.address.as_ref().and_then(|addr| {
                if let Some(v4) = addr.as_sockaddr_in() {
                    Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()))
                } else {
                    addr.as_sockaddr_in6()
                        .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
                }
            });
            let idx = match interfaces.iter().position(|i| i.name == ifaddr.interface_name) {
                Some(idx) => idx,
                None => {
                    interfaces.push(Interface {
                        name: ifaddr.interface_name.clone(),
                        addresses: Vec::new(),
                    });
                    interfaces.len() - 1
                }
            };
            if let Some(ip) = ip {
                interfaces[idx].addresses.push(ip);
            }
        }
        Ok(interfaces)
    }
}

/// What the heartbeat publishes about this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    /// Interface to publish; `None` tries [`DEFAULT_INTERFACES`], then the first.
    pub interface: Option<String>,
    pub ipv4_only: bool,
    /// Plain `host:port` listen address.
    pub listen: Option<String>,
    /// TLS `host:port` listen address.
    pub tls_listen: Option<String>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            interface: None,
            ipv4_only: true,
            listen: None,
            tls_listen: None,
        }
    }
}

impl HostOptions {
    pub fn from_config(config: &KeelConfig) -> Self {
        Self {
            interface: config.tracker.interface.clone().filter(|i| !i.is_empty()),
            ipv4_only: config.tracker.ipv4_only,
            listen: config.listen.clone(),
            tls_listen: config.tls.listen.clone(),
        }
    }
}

/// Describe this host as a tracked instance stamped `now`.
pub fn describe_instance(
    host: &dyn HostIdentity,
    opts: &HostOptions,
    now: DateTime<Utc>,
) -> TrackerResult<TrackedInstance> {
    let interfaces = host.interfaces()?;
    let iface = pick_interface(&interfaces, opts.interface.as_deref())?;
    let (port, tls_port) = listen_ports(opts.listen.as_deref(), opts.tls_listen.as_deref())?;
    let name = host.hostname()?;
    let addresses = iface
        .addresses
        .iter()
        .filter(|ip| !opts.ipv4_only || ip.is_ipv4())
        .map(IpAddr::to_string)
        .collect();
    Ok(TrackedInstance {
        name,
        addresses,
        port,
        tls_port,
        last_update: now,
    })
}

fn pick_interface<'a>(interfaces: &'a [Interface], wanted: Option<&str>) -> TrackerResult<&'a Interface> {
    let first = interfaces.first().ok_or(TrackerError::NoInterfaces)?;
    if let Some(name) = wanted {
        return interfaces
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| TrackerError::InterfaceNotFound(name.to_string()));
    }
    Ok(DEFAULT_INTERFACES
        .iter()
        .find_map(|name| interfaces.iter().find(|i| i.name == *name))
        .unwrap_or(first))
}

/// Ports of the plain and TLS listen addresses, empty when unset.
pub fn listen_ports(listen: Option<&str>, tls_listen: Option<&str>) -> TrackerResult<(String, String)> {
    let port_of = |address: Option<&str>| -> TrackerResult<String> {
        match address.filter(|a| !a.is_empty()) {
            Some(address) => split_port(address).map(str::to_string),
            None => Ok(String::new()),
        }
    };
    Ok((port_of(listen)?, port_of(tls_listen)?))
}

/// The port of `host:port` or `[v6]:port`.
fn split_port(address: &str) -> TrackerResult<&str> {
    let invalid = |reason: &str| TrackerError::InvalidListen {
        address: address.to_string(),
        reason: reason.to_string(),
    };
    let (host, port) = address.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    let bracketed = host.starts_with('[') && host.ends_with(']');
    if host.contains(':') && !bracketed {
        return Err(invalid("too many colons"));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FakeHost(Vec<Interface>);

    impl HostIdentity for FakeHost {
        fn hostname(&self) -> TrackerResult<String> {
            Ok("host1".into())
        }

        fn interfaces(&self) -> TrackerResult<Vec<Interface>> {
            Ok(self.0.clone())
        }
    }

    fn iface(name: &str, addresses: &[&str]) -> Interface {
        Interface {
            name: name.into(),
            addresses: addresses.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn interface_preference() {
        let all = vec![iface("lo", &[]), iface("en0", &[]), iface("eth0", &[])];
        assert_eq!(pick_interface(&all, None).unwrap().name, "eth0");
        assert_eq!(pick_interface(&all[..2], None).unwrap().name, "en0");
        assert_eq!(pick_interface(&all[..1], None).unwrap().name, "lo");
        assert_eq!(pick_interface(&all, Some("lo")).unwrap().name, "lo");
        assert!(matches!(
            pick_interface(&all, Some("wlan0")).unwrap_err(),
            TrackerError::InterfaceNotFound(name) if name == "wlan0"
        ));
        assert!(matches!(pick_interface(&[], None).unwrap_err(), TrackerError::NoInterfaces));
    }

    #[test]
    fn ports_from_listen_addresses() {
        assert_eq!(
            listen_ports(Some("0.0.0.0:8080"), Some("[::]:8443")).unwrap(),
            ("8080".to_string(), "8443".to_string())
        );
        assert_eq!(listen_ports(None, Some("")).unwrap(), (String::new(), String::new()));
        assert!(listen_ports(Some("8080"), None).is_err());
        assert!(listen_ports(None, Some("::1:8443")).is_err());
    }

    #[test]
    fn ipv4_filter() {
        let host = FakeHost(vec![iface("eth0", &["10.0.0.1", "fe80::1", "10.0.0.2"])]);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let opts = HostOptions {
            listen: Some("0.0.0.0:8080".into()),
            ..Default::default()
        };

        let instance = describe_instance(&host, &opts, now).unwrap();
        assert_eq!(instance.name, "host1");
        assert_eq!(instance.addresses, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(instance.port, "8080");
        assert_eq!(instance.tls_port, "");
        assert_eq!(instance.last_update, now);

        let all = HostOptions {
            ipv4_only: false,
            ..opts
        };
        let instance = describe_instance(&host, &all, now).unwrap();
        assert_eq!(instance.addresses, vec!["10.0.0.1", "fe80::1", "10.0.0.2"]);
    }
}
