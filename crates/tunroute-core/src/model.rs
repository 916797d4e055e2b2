//! Value types for destinations, next hops, metrics, and interface identity
//!
//! These types are shared between the route set builder, the state
//! synchronizer, and the default route monitor. The comparator defined
//! here is the deduplication order for candidate routes; it has no other
//! operational meaning.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use ipnet::IpNet;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// The family of a destination prefix
    pub fn of(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => AddressFamily::V4,
            IpNet::V6(_) => AddressFamily::V6,
        }
    }

    /// The family of a bare address
    pub fn of_addr(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// An opaque, stable handle to a network interface
///
/// Distinct from the transient numeric index, which the OS may reuse.
/// Equality and hashing consider only the stable handle; the index is
/// carried along because some OS calls (socket binding in particular)
/// want it.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceId {
    handle: u64,
    index: u32,
}

impl InterfaceId {
    /// The "no interface" sentinel, used before any egress interface has
    /// been selected and when no candidate exists.
    pub const UNSPECIFIED: InterfaceId = InterfaceId { handle: 0, index: 0 };

    pub fn new(handle: u64, index: u32) -> Self {
        Self { handle, index }
    }

    /// The stable identity handle
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// The transient numeric index; 0 means "unspecified"
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_unspecified(&self) -> bool {
        self.handle == 0
    }
}

impl PartialEq for InterfaceId {
    fn eq(&self, other: &Self) -> bool {
        // Identity is the stable handle; indexes may be reused.
        self.handle == other.handle
    }
}

impl Eq for InterfaceId {}

impl Hash for InterfaceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "if#{:x}", self.handle)
    }
}

/// A single route owned by an interface
///
/// The destination is always stored in canonical masked form (host bits
/// zeroed). `next_hop == None` means "directly attached"; that form is
/// only valid for the interface's own subnet, which the OS creates
/// automatically and which this engine never duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    pub dest: IpNet,
    pub next_hop: Option<IpAddr>,
    pub metric: u32,
    pub iface: InterfaceId,
}

impl RouteEntry {
    /// Create a route, canonicalizing the destination
    pub fn new(dest: IpNet, next_hop: Option<IpAddr>, metric: u32, iface: InterfaceId) -> Self {
        Self {
            dest: dest.trunc(),
            next_hop,
            metric,
            iface,
        }
    }

    /// Whether this is a default route (zero-length prefix)
    pub fn is_default(&self) -> bool {
        self.dest.prefix_len() == 0
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.dest)
    }
}

impl std::fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dest)?;
        if let Some(gw) = self.next_hop {
            write!(f, " via {}", gw)?;
        }
        write!(f, " metric {} {}", self.metric, self.iface)
    }
}

/// Deduplication order for candidate routes
///
/// A strict total order: destination address ascending, then narrower
/// prefix (longer prefix length) first, then lower metric, then routes
/// without a next hop before routes with one. After sorting, the first
/// entry per distinct (destination, prefix) pair wins.
///
/// Deliberately not an `Ord` impl: two entries can compare `Equal` here
/// while differing in their owning interface.
pub fn dedup_order(a: &RouteEntry, b: &RouteEntry) -> Ordering {
    a.dest
        .addr()
        .cmp(&b.dest.addr())
        .then_with(|| b.dest.prefix_len().cmp(&a.dest.prefix_len()))
        .then_with(|| a.metric.cmp(&b.metric))
        .then_with(|| a.next_hop.cmp(&b.next_hop))
}

/// The preferred non-tunnel egress interface for one address family
///
/// Selected as the lowest-metric interface carrying a default route that
/// is not the tunnel itself. Replaced wholesale on each recomputation,
/// never partially mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferredEgress {
    pub iface: InterfaceId,
    pub metric: u32,
}

impl PreferredEgress {
    /// No candidate egress interface exists
    pub fn unbound() -> Self {
        Self {
            iface: InterfaceId::UNSPECIFIED,
            metric: u32::MAX,
        }
    }

    pub fn is_unbound(&self) -> bool {
        self.iface.is_unspecified()
    }
}

/// Whether an address is an IPv6 link-local assignment (fe80::/10)
///
/// Link-local addresses on the tunnel are required for protocol
/// correctness and are not under this engine's management.
pub fn is_ipv6_link_local(net: &IpNet) -> bool {
    match net.addr() {
        IpAddr::V6(addr) => (addr.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn entry(dest: &str, next_hop: Option<&str>, metric: u32) -> RouteEntry {
        RouteEntry::new(
            net(dest),
            next_hop.map(|s| s.parse().unwrap()),
            metric,
            InterfaceId::new(7, 3),
        )
    }

    #[test]
    fn interface_identity_ignores_index() {
        let a = InterfaceId::new(42, 1);
        let b = InterfaceId::new(42, 9); // index reused/renumbered
        let c = InterfaceId::new(43, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn destinations_are_canonicalized() {
        let r = entry("10.1.2.3/16", Some("10.1.0.1"), 0);
        assert_eq!(r.dest, net("10.1.0.0/16"));
    }

    #[test]
    fn order_prefers_lower_destination() {
        let a = entry("10.0.0.0/24", Some("10.0.0.1"), 0);
        let b = entry("10.0.1.0/24", Some("10.0.0.1"), 0);
        assert_eq!(dedup_order(&a, &b), Ordering::Less);
    }

    #[test]
    fn order_prefers_narrower_prefix() {
        // Same destination bytes, /25 sorts before /24.
        let narrow = entry("10.0.0.0/25", Some("10.0.0.1"), 0);
        let wide = entry("10.0.0.0/24", Some("10.0.0.1"), 0);
        assert_eq!(dedup_order(&narrow, &wide), Ordering::Less);
    }

    #[test]
    fn order_prefers_lower_metric_then_missing_next_hop() {
        let low = entry("10.0.0.0/24", Some("10.0.0.1"), 1);
        let high = entry("10.0.0.0/24", Some("10.0.0.1"), 5);
        assert_eq!(dedup_order(&low, &high), Ordering::Less);

        let attached = entry("10.0.0.0/24", None, 1);
        let via = entry("10.0.0.0/24", Some("10.0.0.1"), 1);
        assert_eq!(dedup_order(&attached, &via), Ordering::Less);
    }

    #[test]
    fn order_is_a_strict_total_order() {
        let entries = vec![
            entry("0.0.0.0/0", Some("10.0.0.1"), 0),
            entry("10.0.0.0/24", Some("10.0.0.1"), 5),
            entry("10.0.0.0/24", Some("10.0.0.1"), 1),
            entry("10.0.0.0/25", None, 3),
            entry("10.0.0.0/24", None, 1),
            entry("192.168.0.0/16", Some("10.0.0.1"), 0),
            entry("fd00::/8", Some("fd00::1"), 2),
            entry("fd00::/8", None, 2),
        ];

        for a in &entries {
            // Reflexive consistency: an entry is never less than itself.
            assert_eq!(dedup_order(a, a), Ordering::Equal);
            for b in &entries {
                // Antisymmetry.
                assert_eq!(dedup_order(a, b), dedup_order(b, a).reverse());
                for c in &entries {
                    // Transitivity.
                    if dedup_order(a, b) != Ordering::Greater
                        && dedup_order(b, c) != Ordering::Greater
                    {
                        assert_ne!(dedup_order(a, c), Ordering::Greater);
                    }
                }
            }
        }
    }

    #[test]
    fn link_local_detection() {
        assert!(is_ipv6_link_local(&net("fe80::1/64")));
        assert!(!is_ipv6_link_local(&net("fd00::1/64")));
        assert!(!is_ipv6_link_local(&net("169.254.0.1/16")));
    }
}
