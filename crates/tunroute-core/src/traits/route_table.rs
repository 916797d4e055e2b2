//! Routing table query, mutation, and change-notification seam

use std::pin::Pin;

use async_trait::async_trait;
use ipnet::IpNet;
use tokio_stream::Stream;

use crate::error::Result;
use crate::model::{AddressFamily, InterfaceId, RouteEntry};

/// What kind of routing-table change a notification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeKind {
    Add,
    Delete,
    Modify,
}

/// A single OS routing-table change notification
///
/// Only the fields the monitor needs: enough to recognize default-route
/// changes. The handler rescans the live table rather than trusting the
/// event payload, so a dropped or coalesced event is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChangeEvent {
    pub kind: RouteChangeKind,
    pub dest: IpNet,
    pub iface: InterfaceId,
    pub metric: u32,
}

impl RouteChangeEvent {
    /// Whether the affected route is a default route (zero-length prefix)
    pub fn concerns_default_route(&self) -> bool {
        self.dest.prefix_len() == 0
    }
}

/// Access to the OS routing table
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Behavior
///
/// - `list_routes` returns the full live table for one family, including
///   routes owned by other interfaces. A host without IPv6 reports
///   `Error::Ipv6Unavailable` for the V6 family.
/// - `watch` returns a stream of change notifications. The stream runs
///   until the subscription is dropped; dropping it releases the OS
///   subscription. It must wait for OS events, never poll.
#[async_trait]
pub trait RouteTable: Send + Sync {
    async fn list_routes(&self, family: AddressFamily) -> Result<Vec<RouteEntry>>;

    async fn add_route(&self, route: &RouteEntry) -> Result<()>;

    async fn remove_route(&self, route: &RouteEntry) -> Result<()>;

    /// Subscribe to routing-table change notifications
    fn watch(&self) -> Pin<Box<dyn Stream<Item = RouteChangeEvent> + Send + 'static>>;
}
