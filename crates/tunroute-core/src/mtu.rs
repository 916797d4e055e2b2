//! Tunnel MTU derivation from the preferred physical path
//!
//! The tunnel's effective MTU follows the smallest MTU among the
//! preferred egress interfaces, minus the encapsulation overhead, with
//! per-family floors. Derivation is idempotent: if the newly computed
//! path MTU equals the last applied one, nothing is touched.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{AddressFamily, PreferredEgress};
use crate::traits::{InterfaceState, TunDevice};

/// Bytes consumed by tunnel encapsulation per packet
pub const ENCAP_OVERHEAD: u32 = 80;

/// Smallest MTU IPv4 guarantees end to end
pub const MIN_IPV4_MTU: u32 = 576;

/// Smallest MTU IPv6 guarantees end to end
pub const MIN_IPV6_MTU: u32 = 1280;

/// Last applied MTU, owned by the monitor instance
///
/// The idempotence check keys on `derived` alone; the applied flags
/// record which family records actually took the value (IPv6 may be
/// absent on the host).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtuState {
    pub derived: u32,
    pub applied_v4: bool,
    pub applied_v6: bool,
}

/// Path MTU across both preferred egress interfaces
///
/// The minimum over the families that are present; an absent family is
/// excluded rather than treated as zero. Returns 0 when neither family
/// has a usable path.
pub fn derive_path_mtu(v4_path: Option<u32>, v6_path: Option<u32>) -> u32 {
    match (
        v4_path.filter(|mtu| *mtu > 0),
        v6_path.filter(|mtu| *mtu > 0),
    ) {
        (Some(v4), Some(v6)) => v4.min(v6),
        (Some(v4), None) => v4,
        (None, Some(v6)) => v6,
        (None, None) => 0,
    }
}

/// Clamp a derived path MTU for the IPv4 interface record
///
/// Subtracts the encapsulation overhead, honors the tunnel device's own
/// configured ceiling when it is smaller, and floors at the IPv4 minimum.
pub fn clamp_v4(path_mtu: u32, device_ceiling: Option<u32>) -> u32 {
    let mut mtu = path_mtu.saturating_sub(ENCAP_OVERHEAD);
    if let Some(ceiling) = device_ceiling {
        if ceiling > 0 && ceiling < mtu {
            mtu = ceiling;
        }
    }
    mtu.max(MIN_IPV4_MTU)
}

/// Clamp a derived path MTU for the IPv6 interface record
///
/// IPv6 floors higher than IPv4 and ignores the device ceiling; the
/// device's enforced MTU tracks the IPv4 value.
pub fn clamp_v6(path_mtu: u32) -> u32 {
    path_mtu.saturating_sub(ENCAP_OVERHEAD).max(MIN_IPV6_MTU)
}

/// Re-derives the tunnel MTU and writes it to the OS and the device
pub struct MtuAdaptor {
    ifstate: Arc<dyn InterfaceState>,
    device: Arc<dyn TunDevice>,
}

impl MtuAdaptor {
    pub fn new(ifstate: Arc<dyn InterfaceState>, device: Arc<dyn TunDevice>) -> Self {
        Self { ifstate, device }
    }

    /// Recompute the tunnel MTU from the preferred egress interfaces
    ///
    /// No-op when the derived path MTU is unknown or unchanged since the
    /// last application. IPv6 absence on the host is a non-error
    /// "nothing to do" outcome for the V6 half.
    pub async fn apply(
        &self,
        preferred_v4: PreferredEgress,
        preferred_v6: PreferredEgress,
        state: &mut MtuState,
    ) -> Result<()> {
        let v4_path = self.path_mtu(preferred_v4, AddressFamily::V4).await?;
        let v6_path = self.path_mtu(preferred_v6, AddressFamily::V6).await?;
        let derived = derive_path_mtu(v4_path, v6_path);

        if derived == 0 || derived == state.derived {
            debug!("path MTU {derived} unchanged, skipping");
            return Ok(());
        }

        let tun = self.device.id();

        let mut record = self.ifstate.ip_interface(tun, AddressFamily::V4).await?;
        let ceiling = self.device.mtu().await.ok();
        let v4_mtu = clamp_v4(derived, ceiling);
        record.mtu = v4_mtu;
        self.ifstate.set_ip_interface(&record).await?;
        self.device.force_mtu(v4_mtu).await?;
        state.applied_v4 = true;
        info!("tunnel IPv4 MTU set to {v4_mtu} (path {derived})");

        match self.ifstate.ip_interface(tun, AddressFamily::V6).await {
            Ok(mut record) => {
                let v6_mtu = clamp_v6(derived);
                record.mtu = v6_mtu;
                self.ifstate.set_ip_interface(&record).await?;
                state.applied_v6 = true;
                info!("tunnel IPv6 MTU set to {v6_mtu} (path {derived})");
            }
            Err(Error::Ipv6Unavailable) => {
                state.applied_v6 = false;
                debug!("IPv6 not present, skipping V6 MTU");
            }
            Err(e) => return Err(e),
        }

        state.derived = derived;
        Ok(())
    }

    async fn path_mtu(
        &self,
        preferred: PreferredEgress,
        family: AddressFamily,
    ) -> Result<Option<u32>> {
        if preferred.is_unbound() {
            return Ok(None);
        }
        match self.ifstate.interface_mtu(preferred.iface, family).await {
            Ok(mtu) => Ok(Some(mtu)),
            Err(Error::Ipv6Unavailable) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
