// # tunroute-core
//
// Route and address synchronization engine for a single tunnel
// interface.
//
// ## Architecture Overview
//
// - **model**: destinations, next hops, metrics, interface identity, and
//   the deduplication order
// - **gateway**: per-family gateway derivation from local addresses
// - **builder**: declared prefixes -> deduplicated route set
// - **sync**: incremental diff-and-patch against live OS state
// - **monitor**: default-route change monitor (actor), egress rebinding,
//   MTU re-derivation
// - **mtu**: path-MTU derivation and clamping rules
// - **engine**: bring-up orchestration and the public entry points
// - **traits**: the OS seams (routing table, interface records, tunnel
//   device, egress binding, firewall classification)
//
// ## Design Principles
//
// 1. **Incremental**: the OS is converged with minimal add/remove
//    operations, never flushed and rebuilt
// 2. **Event-Driven**: default-route changes arrive as an async stream
//    and are handled by a single actor task
// 3. **Debounced**: unchanged selections trigger no downstream syscalls
// 4. **Dual-Stack Tolerant**: IPv6 absence is a skip, not a failure,
//    unless v6 configuration was explicitly requested

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod model;
pub mod monitor;
pub mod mtu;
pub mod sync;
pub mod traits;

// Re-export core types for convenience
pub use builder::{build_routes, RouteSet};
pub use config::TunnelConfig;
pub use engine::RouteEngine;
pub use error::{Error, Result};
pub use gateway::{derive_gateways, Gateways};
pub use model::{AddressFamily, InterfaceId, PreferredEgress, RouteEntry};
pub use monitor::{DefaultRouteMonitor, MonitorHandle};
pub use sync::{reconcile, Delta, StateSynchronizer};
pub use traits::{
    EgressBinder, FirewallClassifier, InterfaceState, IpInterfaceRecord, RouteChangeEvent,
    RouteChangeKind, RouteTable, TunDevice,
};
