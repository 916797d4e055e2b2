//! The tunnel interface as a TunDevice

use async_trait::async_trait;

use tunroute_core::error::Result;
use tunroute_core::model::InterfaceId;
use tunroute_core::traits::TunDevice;

use crate::interface_id;
use crate::link::{link_mtu, name_to_index, set_link_mtu};

/// An already-created tunnel interface, resolved by name
pub struct NetlinkTunDevice {
    id: InterfaceId,
    name: String,
    ceiling: u32,
}

impl NetlinkTunDevice {
    /// Resolve an existing interface and record its MTU as the ceiling
    ///
    /// The ceiling is read once here: derived MTUs never raise the device
    /// above what it was created with, and a previously forced value must
    /// not masquerade as the configured ceiling later.
    pub async fn open(name: &str) -> Result<Self> {
        let index = name_to_index(name)?;
        let ceiling = link_mtu(index).await?;
        Ok(Self {
            id: interface_id(index),
            name: name.to_string(),
            ceiling,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TunDevice for NetlinkTunDevice {
    fn id(&self) -> InterfaceId {
        self.id
    }

    async fn mtu(&self) -> Result<u32> {
        Ok(self.ceiling)
    }

    async fn force_mtu(&self, mtu: u32) -> Result<()> {
        set_link_mtu(self.id.index(), mtu).await
    }
}
