//! Trait seams between the engine and the operating system
//!
//! The core never talks to the OS directly: every routing-table query,
//! notification subscription, interface-record read/write, address
//! mutation, socket bind, and tunnel-device MTU call goes through one of
//! these traits. Platform crates implement them; tests substitute mocks.

pub mod egress;
pub mod firewall;
pub mod interface_state;
pub mod route_table;
pub mod tun_device;

pub use egress::EgressBinder;
pub use firewall::FirewallClassifier;
pub use interface_state::{InterfaceState, IpInterfaceRecord};
pub use route_table::{RouteChangeEvent, RouteChangeKind, RouteTable};
pub use tun_device::TunDevice;
