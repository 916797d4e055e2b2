//! Incremental state synchronization
//!
//! Converges the OS's live interface state to a desired address set and
//! route set using the minimum number of add/remove operations, never a
//! full flush-and-rebuild. A full flush causes transient connectivity
//! loss and invalidates unrelated kernel route-cache state.
//!
//! The diff itself is the pure function [`reconcile`]; the
//! [`StateSynchronizer`] wires its output to the OS seams and collects
//! per-operation failures so partial convergence still applies as much
//! state as possible.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use ipnet::IpNet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{is_ipv6_link_local, AddressFamily, InterfaceId, RouteEntry};
use crate::traits::{InterfaceState, RouteTable};

/// The minimal set of mutations turning `current` into `desired`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

impl<T> Delta<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff two state snapshots
///
/// Pure set reconciliation: anything desired but absent is added,
/// anything present but undesired is removed. Order within each list
/// follows the input order, so repeated calls are deterministic.
pub fn reconcile<T: Eq + Hash + Clone>(current: &[T], desired: &[T]) -> Delta<T> {
    let have: HashSet<&T> = current.iter().collect();
    let want: HashSet<&T> = desired.iter().collect();
    Delta {
        to_add: desired
            .iter()
            .filter(|item| !have.contains(*item))
            .cloned()
            .collect(),
        to_remove: current
            .iter()
            .filter(|item| !want.contains(*item))
            .cloned()
            .collect(),
    }
}

/// Applies desired address and route state to the OS incrementally
pub struct StateSynchronizer {
    routes: Arc<dyn RouteTable>,
    ifstate: Arc<dyn InterfaceState>,
}

impl StateSynchronizer {
    pub fn new(routes: Arc<dyn RouteTable>, ifstate: Arc<dyn InterfaceState>) -> Self {
        Self { routes, ifstate }
    }

    /// Converge the interface's unicast addresses to `desired`
    ///
    /// IPv6 link-local addresses already on the interface are never
    /// removed: they are required for protocol correctness and are not
    /// under this engine's management.
    pub async fn sync_addresses(&self, iface: InterfaceId, desired: &[IpNet]) -> Result<()> {
        let current = self.ifstate.list_addresses(iface).await?;
        let mut delta = reconcile(&current, desired);
        delta.to_remove.retain(|addr| !is_ipv6_link_local(addr));

        if delta.is_empty() {
            debug!("addresses on {iface} already converged");
            return Ok(());
        }

        let mut errors = Vec::new();
        for addr in &delta.to_remove {
            debug!("removing address {addr} from {iface}");
            if let Err(e) = self.ifstate.remove_address(iface, addr).await {
                warn!("failed to remove address {addr}: {e}");
                errors.push(e);
            }
        }
        for addr in &delta.to_add {
            debug!("adding address {addr} to {iface}");
            if let Err(e) = self.ifstate.add_address(iface, addr).await {
                warn!("failed to add address {addr}: {e}");
                errors.push(e);
            }
        }
        Error::collect(errors)
    }

    /// Converge the routes owned by `iface` to the desired set
    ///
    /// Routes owned by other interfaces are out of scope and untouched.
    /// A host without IPv6 contributes an empty V6 snapshot.
    pub async fn sync_routes(&self, iface: InterfaceId, desired: &[RouteEntry]) -> Result<()> {
        let mut current = self.routes.list_routes(AddressFamily::V4).await?;
        match self.routes.list_routes(AddressFamily::V6).await {
            Ok(mut v6) => current.append(&mut v6),
            Err(Error::Ipv6Unavailable) => {}
            Err(e) => return Err(e),
        }
        current.retain(|route| route.iface == iface);

        let delta = reconcile(&current, desired);
        if delta.is_empty() {
            debug!("routes on {iface} already converged");
            return Ok(());
        }

        let mut errors = Vec::new();
        for route in &delta.to_remove {
            debug!("removing route {route}");
            if let Err(e) = self.routes.remove_route(route).await {
                warn!("failed to remove route {route}: {e}");
                errors.push(e);
            }
        }
        for route in &delta.to_add {
            debug!("adding route {route}");
            if let Err(e) = self.routes.add_route(route).await {
                warn!("failed to add route {route}: {e}");
                errors.push(e);
            }
        }
        Error::collect(errors)
    }
}
