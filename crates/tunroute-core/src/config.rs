//! Configuration types for the tunnel route engine

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::model::AddressFamily;
use crate::mtu::MIN_IPV4_MTU;

/// Desired state for one tunnel interface
///
/// Constructed once per interface activation and handed to the engine;
/// the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Addresses assigned to the tunnel, in order; the first per family
    /// doubles as that family's gateway
    pub local_addrs: Vec<IpNet>,

    /// Destination prefixes to route via the tunnel
    #[serde(default)]
    pub routes: Vec<IpNet>,

    /// Derive the tunnel MTU from the preferred physical path
    #[serde(default = "default_auto_mtu")]
    pub auto_mtu: bool,

    /// Static MTU applied at bring-up, overriding nothing else
    #[serde(default)]
    pub mtu: Option<u32>,
}

impl TunnelConfig {
    pub fn new(local_addrs: Vec<IpNet>, routes: Vec<IpNet>) -> Self {
        Self {
            local_addrs,
            routes,
            auto_mtu: default_auto_mtu(),
            mtu: None,
        }
    }

    /// Validate the configuration before any OS state is touched
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.local_addrs.is_empty() {
            return Err(crate::Error::config("no local addresses configured"));
        }
        if let Some(mtu) = self.mtu {
            if mtu < MIN_IPV4_MTU {
                return Err(crate::Error::config(format!(
                    "static MTU {mtu} is below the IPv4 minimum of {MIN_IPV4_MTU}"
                )));
            }
            if mtu > u16::MAX as u32 {
                return Err(crate::Error::config(format!("static MTU {mtu} is not sane")));
            }
        }
        Ok(())
    }

    /// Whether IPv6 was explicitly requested by this configuration
    ///
    /// Controls whether a host without IPv6 is an error or a skip.
    pub fn wants_v6(&self) -> bool {
        self.local_addrs
            .iter()
            .chain(self.routes.iter())
            .any(|net| AddressFamily::of(net) == AddressFamily::V6)
    }
}

fn default_auto_mtu() -> bool {
    true
}
