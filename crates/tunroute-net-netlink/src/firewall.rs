//! FirewallClassifier that waits for the link to become visible
//!
//! Firewall layers key their rules off the interface, and the kernel can
//! take a while to surface a freshly created tunnel to them. "Visible
//! and administratively up" is the readiness signal polled here.

use async_trait::async_trait;
use netlink_packet_route::IFF_UP;

use tunroute_core::error::{Error, Result};
use tunroute_core::model::InterfaceId;
use tunroute_core::traits::FirewallClassifier;

use crate::link::get_link;

pub struct LinkReadyClassifier;

impl LinkReadyClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinkReadyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FirewallClassifier for LinkReadyClassifier {
    async fn classify(&self, iface: InterfaceId) -> Result<bool> {
        match get_link(iface.index()).await {
            Ok(link) => Ok(link.header.flags & IFF_UP != 0),
            Err(Error::Io(e)) if e.raw_os_error() == Some(libc::ENODEV) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
