//! Tunnel device seam
//!
//! The device itself (creation, teardown, packet I/O, the tunnel
//! protocol) is an external collaborator; the engine only needs its
//! identity and its MTU knobs.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::InterfaceId;

#[async_trait]
pub trait TunDevice: Send + Sync {
    /// The stable identity of the tunnel interface
    fn id(&self) -> InterfaceId;

    /// The device's configured MTU ceiling
    ///
    /// If the device was created with a small MTU, derived values larger
    /// than this are clamped down to it.
    async fn mtu(&self) -> Result<u32>;

    /// Push a derived MTU down to the device's own enforced MTU
    async fn force_mtu(&self, mtu: u32) -> Result<()>;
}
