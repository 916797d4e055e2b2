//! Interface address and per-family interface-record seam

use async_trait::async_trait;
use ipnet::IpNet;

use crate::error::Result;
use crate::model::{AddressFamily, InterfaceId};

/// The mutable per-family view of an interface as the OS records it
///
/// Read with [`InterfaceState::ip_interface`], modified in place, then
/// written back with [`InterfaceState::set_ip_interface`].
/// `dad_transmits` and `router_discovery` are only meaningful for V6
/// records; backends ignore them on V4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpInterfaceRecord {
    pub iface: InterfaceId,
    pub family: AddressFamily,
    /// Effective MTU for this family; 0 means unknown
    pub mtu: u32,
    /// Interface metric added to every route on this interface
    pub metric: u32,
    /// Whether the OS chooses the metric itself
    pub automatic_metric: bool,
    /// Duplicate-address-detection transmit count (V6)
    pub dad_transmits: u32,
    /// Whether router discovery is enabled (V6)
    pub router_discovery: bool,
}

/// Access to interface addresses and interface records
///
/// # Behavior
///
/// - `ip_interface(_, V6)` reports `Error::Ipv6Unavailable` on hosts
///   without IPv6, never a generic failure.
/// - `list_addresses` includes OS-managed assignments such as IPv6
///   link-local addresses; callers decide what is under their management.
#[async_trait]
pub trait InterfaceState: Send + Sync {
    async fn list_addresses(&self, iface: InterfaceId) -> Result<Vec<IpNet>>;

    async fn add_address(&self, iface: InterfaceId, addr: &IpNet) -> Result<()>;

    async fn remove_address(&self, iface: InterfaceId, addr: &IpNet) -> Result<()>;

    async fn ip_interface(
        &self,
        iface: InterfaceId,
        family: AddressFamily,
    ) -> Result<IpInterfaceRecord>;

    async fn set_ip_interface(&self, record: &IpInterfaceRecord) -> Result<()>;

    /// The live MTU of an arbitrary (usually physical) interface
    async fn interface_mtu(&self, iface: InterfaceId, family: AddressFamily) -> Result<u32>;
}
