//! LAN address resolution for registration URLs.
//!
//! Remote devices must reach the bridge over the local network, so URLs embed
//! an address they can route to. Resolution walks a fixed chain of sources and
//! always ends with an answer, falling back to loopback when nothing better is
//! available.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use serde::Serialize;

/// Platform service that knows the address assigned to the active link.
///
/// On devices with a WiFi manager this is the manager's "current IP" query.
pub trait PlatformAddressProbe: Send + Sync {
    /// Returns the assigned IPv4 address, or `None` when not connected.
    ///
    /// # Errors
    ///
    /// - `io::Error` - The platform service could not be queried
    fn assigned_ipv4(&self) -> io::Result<Option<Ipv4Addr>>;
}

/// Decodes an address reported as a packed little-endian `u32`.
///
/// Platform WiFi APIs store the first octet in the lowest byte.
///
/// # Examples
/// ```
/// use std::net::Ipv4Addr;
/// use castline_core::network::ipv4_from_packed_le;
///
/// assert_eq!(ipv4_from_packed_le(0x1401_A8C0), Ipv4Addr::new(192, 168, 1, 20));
/// ```
pub fn ipv4_from_packed_le(packed: u32) -> Ipv4Addr {
    Ipv4Addr::from(packed.to_le_bytes())
}

/// A named network interface address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub ip: IpAddr,
}

/// Enumerates the host's network interfaces.
pub trait InterfaceSource: Send + Sync {
    /// Lists interface addresses in enumeration order.
    ///
    /// # Errors
    ///
    /// - `io::Error` - The operating system refused the enumeration
    fn interfaces(&self) -> io::Result<Vec<InterfaceAddress>>;
}

/// Interface enumeration backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> io::Result<Vec<InterfaceAddress>> {
        let interfaces = get_if_addrs::get_if_addrs()?;
        Ok(interfaces
            .into_iter()
            .map(|iface| InterfaceAddress {
                ip: iface.ip(),
                name: iface.name,
            })
            .collect())
    }
}

/// Which stage of the chain produced an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Configured,
    Platform,
    Interface,
    LoopbackFallback,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AddressSource::Configured => "configured",
            AddressSource::Platform => "platform",
            AddressSource::Interface => "interface",
            AddressSource::LoopbackFallback => "loopback fallback",
        };
        f.write_str(label)
    }
}

/// Outcome of address resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedAddress {
    pub ip: Ipv4Addr,
    pub source: AddressSource,
}

/// Picks the IPv4 address to advertise in registration URLs.
///
/// Order: configured address, platform probe (non-zero answers only), first
/// non-loopback IPv4 interface, then `127.0.0.1`.
#[derive(Clone)]
pub struct AddressResolver {
    configured: Option<Ipv4Addr>,
    platform: Option<Arc<dyn PlatformAddressProbe>>,
    interfaces: Arc<dyn InterfaceSource>,
}

impl AddressResolver {
    /// Creates a resolver over the system interfaces.
    pub fn new(configured: Option<Ipv4Addr>) -> Self {
        Self {
            configured,
            platform: None,
            interfaces: Arc::new(SystemInterfaces),
        }
    }

    /// Installs a platform probe consulted before interface enumeration.
    pub fn with_platform_probe(mut self, probe: Arc<dyn PlatformAddressProbe>) -> Self {
        self.platform = Some(probe);
        self
    }

    /// Replaces the interface source.
    pub fn with_interfaces(mut self, interfaces: Arc<dyn InterfaceSource>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Resolves the address to advertise. Never fails.
    pub fn resolve(&self) -> ResolvedAddress {
        if let Some(ip) = self.configured {
            return ResolvedAddress {
                ip,
                source: AddressSource::Configured,
            };
        }

        if let Some(ip) = self.platform_address() {
            return ResolvedAddress {
                ip,
                source: AddressSource::Platform,
            };
        }

        if let Some(ip) = self.interface_address() {
            return ResolvedAddress {
                ip,
                source: AddressSource::Interface,
            };
        }

        tracing::warn!("No LAN address found, advertising loopback; remote devices cannot connect");
        ResolvedAddress {
            ip: Ipv4Addr::LOCALHOST,
            source: AddressSource::LoopbackFallback,
        }
    }

    fn platform_address(&self) -> Option<Ipv4Addr> {
        let probe = self.platform.as_ref()?;
        match probe.assigned_ipv4() {
            Ok(ip) => ip.filter(|ip| !ip.is_unspecified()),
            Err(e) => {
                tracing::debug!("Platform address probe failed: {}", e);
                None
            }
        }
    }

    fn interface_address(&self) -> Option<Ipv4Addr> {
        let interfaces = match self.interfaces.interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::debug!("Interface enumeration failed: {}", e);
                return None;
            }
        };

        interfaces.into_iter().find_map(|iface| match iface.ip {
            IpAddr::V4(ip) if !ip.is_loopback() => {
                tracing::debug!("Using address {} from interface {}", ip, iface.name);
                Some(ip)
            }
            _ => None,
        })
    }
}

impl fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressResolver")
            .field("configured", &self.configured)
            .field("platform_probe", &self.platform.is_some())
            .finish()
    }
}
