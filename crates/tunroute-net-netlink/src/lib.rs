// # Netlink network backend
//
// Linux implementations of the tunroute-core OS seams, built directly on
// rtnetlink sockets:
//
// - [`NetlinkRouteTable`]: main-table unicast route dump/add/remove plus
//   a change-notification stream from a multicast-group subscription
// - [`NetlinkInterfaceState`]: address assignment and per-family
//   interface records (link MTU via netlink, IPv6 knobs via /proc sysctls)
// - [`NetlinkTunDevice`]: the tunnel interface by name, with its MTU at
//   open time as the ceiling for derived MTUs
// - [`SocketEgressBinder`]: SO_BINDTODEVICE over registered socket fds
// - [`LinkReadyClassifier`]: polls link visibility after bring-up
//
// ## Platform Support
//
// This crate only has content on Linux; on other targets it compiles to
// nothing and the daemon refuses to start.

#[cfg(target_os = "linux")]
mod conn;
#[cfg(target_os = "linux")]
mod device;
#[cfg(target_os = "linux")]
mod egress;
#[cfg(target_os = "linux")]
mod firewall;
#[cfg(target_os = "linux")]
mod ifstate;
#[cfg(target_os = "linux")]
mod link;
#[cfg(target_os = "linux")]
mod routes;

#[cfg(target_os = "linux")]
pub use device::NetlinkTunDevice;
#[cfg(target_os = "linux")]
pub use egress::SocketEgressBinder;
#[cfg(target_os = "linux")]
pub use firewall::LinkReadyClassifier;
#[cfg(target_os = "linux")]
pub use ifstate::NetlinkInterfaceState;
#[cfg(target_os = "linux")]
pub use routes::NetlinkRouteTable;

/// Interface identity on Linux
///
/// The kernel's interface index doubles as the stable handle here; Linux
/// does not hand out a separate LUID-style identifier.
#[cfg(target_os = "linux")]
pub fn interface_id(index: u32) -> tunroute_core::model::InterfaceId {
    tunroute_core::model::InterfaceId::new(index as u64, index)
}
