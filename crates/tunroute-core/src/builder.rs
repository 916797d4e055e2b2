//! Route set construction: declared prefixes in, deduplicated routes out
//!
//! Declared routes carry a destination prefix only. Each one is resolved
//! against the derived per-family gateway, canonicalized, checked against
//! the elision rules, then the whole candidate list is sorted and
//! deduplicated so at most one route per exact (destination, prefix)
//! pair reaches the synchronizer.

use ipnet::IpNet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gateway::Gateways;
use crate::model::{dedup_order, AddressFamily, InterfaceId, RouteEntry};

/// The deduplicated route set plus per-family default-route flags
///
/// The flags feed the bring-up metric policy: when a default route was
/// configured in a family, the tunnel's interface record gets
/// automatic-metric disabled and metric 0 so it becomes the chosen
/// default path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSet {
    pub routes: Vec<RouteEntry>,
    pub found_default_v4: bool,
    pub found_default_v6: bool,
}

impl RouteSet {
    pub fn found_default(&self, family: AddressFamily) -> bool {
        match family {
            AddressFamily::V4 => self.found_default_v4,
            AddressFamily::V6 => self.found_default_v6,
        }
    }
}

/// Build the candidate route set for the tunnel interface
///
/// Fails with a configuration error if any declared route belongs to a
/// family that has no derived gateway; nothing is applied to the OS in
/// that case.
pub fn build_routes(
    declared: &[IpNet],
    gateways: &Gateways,
    tun: InterfaceId,
) -> Result<RouteSet> {
    let mut routes = Vec::with_capacity(declared.len());
    let mut found_default_v4 = false;
    let mut found_default_v6 = false;

    for route in declared {
        let family = AddressFamily::of(route);
        let gateway = gateways.for_family(family).ok_or_else(|| {
            Error::config(format!(
                "route {route} requested, but the interface has no {family} address; \
                 an interface route cannot exist without an interface address in its family"
            ))
        })?;

        let dest = route.trunc();
        // The OS supplies the route for the interface's own subnet (and
        // its own address) from the address assignment. Installing it
        // again would either fail or shadow the automatic one.
        if dest == gateway.trunc() || dest.addr() == gateway.addr() {
            debug!("eliding self route {dest} (gateway {gateway})");
            continue;
        }

        if route.prefix_len() == 0 {
            match family {
                AddressFamily::V4 => found_default_v4 = true,
                AddressFamily::V6 => found_default_v6 = true,
            }
        }
        routes.push(RouteEntry::new(dest, Some(gateway.addr()), 0, tun));
    }

    Ok(RouteSet {
        routes: sort_and_dedup(routes),
        found_default_v4,
        found_default_v6,
    })
}

/// Sort candidates into the dedup order and keep the first entry per
/// distinct (destination, prefix) pair
pub fn sort_and_dedup(mut routes: Vec<RouteEntry>) -> Vec<RouteEntry> {
    routes.sort_by(dedup_order);
    routes.dedup_by(|later, kept| later.dest == kept.dest);
    routes
}
