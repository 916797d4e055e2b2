//! Per-family gateway derivation from the tunnel's local addresses
//!
//! Gateways are the next hops used for every route installed on the
//! tunnel: the address portion of the first assignment encountered in
//! each family, in input order. A route in a family with no gateway is a
//! hard configuration error, because the OS cannot attach an interface
//! route without an interface address in that family.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::model::AddressFamily;

/// At most one gateway per address family
///
/// Each gateway keeps its original prefix so the route set builder can
/// recognize (and elide) the interface's own subnet, which the OS
/// installs automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gateways {
    pub v4: Option<IpNet>,
    pub v6: Option<IpNet>,
}

impl Gateways {
    /// The gateway assignment covering the given family, if any
    pub fn for_family(&self, family: AddressFamily) -> Option<IpNet> {
        match family {
            AddressFamily::V4 => self.v4,
            AddressFamily::V6 => self.v6,
        }
    }

    /// The next-hop address for a destination in the given family
    pub fn next_hop(&self, family: AddressFamily) -> Option<IpAddr> {
        self.for_family(family).map(|net| net.addr())
    }
}

/// Derive the first IPv4 and first IPv6 gateway from the assignment list
pub fn derive_gateways(local_addrs: &[IpNet]) -> Gateways {
    let mut gateways = Gateways::default();
    for addr in local_addrs {
        match addr {
            IpNet::V4(_) if gateways.v4.is_none() => gateways.v4 = Some(*addr),
            IpNet::V6(_) if gateways.v6.is_none() => gateways.v6 = Some(*addr),
            _ => {}
        }
    }
    gateways
}
