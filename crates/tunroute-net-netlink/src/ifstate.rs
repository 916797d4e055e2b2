//! InterfaceState backed by rtnetlink and /proc sysctls
//!
//! Addresses and link MTU go over netlink; the IPv6-only knobs
//! (duplicate-address detection, router discovery, per-family MTU) live
//! under /proc/sys/net/ipv6/conf/<name>/ and are read and written as
//! files. The V4 record has no router-discovery or DAD equivalents and
//! no per-interface metric either; route metrics carry that policy.

use async_trait::async_trait;
use ipnet::IpNet;
use netlink_packet_core::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL};
use netlink_packet_route::nlas::address::Nla;
use netlink_packet_route::{AddressMessage, RtnlMessage, AF_INET, AF_INET6, RT_SCOPE_UNIVERSE};
use tracing::debug;

use tunroute_core::error::{Error, Result};
use tunroute_core::model::{AddressFamily, InterfaceId};
use tunroute_core::traits::{InterfaceState, IpInterfaceRecord};

use crate::conn::{ensure_ipv6, family_af, ip_bytes, ip_from_bytes, request};
use crate::link::{get_link, link_mtu, link_name, set_link_mtu};

pub struct NetlinkInterfaceState;

impl NetlinkInterfaceState {
    pub fn new() -> Self {
        Self
    }

    async fn v6_conf_dir(&self, iface: InterfaceId) -> Result<String> {
        ensure_ipv6()?;
        let link = get_link(iface.index()).await?;
        let name = link_name(&link)
            .ok_or_else(|| Error::os_state(format!("interface {iface} has no name")))?;
        Ok(format!("/proc/sys/net/ipv6/conf/{name}"))
    }
}

impl Default for NetlinkInterfaceState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterfaceState for NetlinkInterfaceState {
    async fn list_addresses(&self, iface: InterfaceId) -> Result<Vec<IpNet>> {
        let msg = AddressMessage::default();
        let replies = request(RtnlMessage::GetAddress(msg), NLM_F_DUMP).await?;

        let mut addrs = Vec::new();
        for reply in replies {
            let RtnlMessage::NewAddress(addr) = reply else {
                continue;
            };
            if addr.header.index != iface.index() {
                continue;
            }
            let family = match addr.header.family {
                af if af == AF_INET as u8 => AddressFamily::V4,
                af if af == AF_INET6 as u8 => AddressFamily::V6,
                _ => continue,
            };
            // IFA_LOCAL is the interface's own address on IPv4;
            // IFA_ADDRESS is all IPv6 carries.
            let bytes = addr.nlas.iter().find_map(|nla| match nla {
                Nla::Local(bytes) => Some(bytes),
                _ => None,
            });
            let bytes = bytes.or_else(|| {
                addr.nlas.iter().find_map(|nla| match nla {
                    Nla::Address(bytes) => Some(bytes),
                    _ => None,
                })
            });
            let Some(ip) = bytes.and_then(|b| ip_from_bytes(family, b)) else {
                continue;
            };
            if let Ok(net) = IpNet::new(ip, addr.header.prefix_len) {
                addrs.push(net);
            }
        }
        Ok(addrs)
    }

    async fn add_address(&self, iface: InterfaceId, addr: &IpNet) -> Result<()> {
        let mut msg = AddressMessage::default();
        msg.header.family = family_af(AddressFamily::of(addr));
        msg.header.prefix_len = addr.prefix_len();
        msg.header.index = iface.index();
        msg.header.scope = RT_SCOPE_UNIVERSE as u8;
        let bytes = ip_bytes(&addr.addr());
        msg.nlas.push(Nla::Local(bytes.clone()));
        msg.nlas.push(Nla::Address(bytes));

        match request(
            RtnlMessage::NewAddress(msg),
            NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(Error::Io(e)) if e.raw_os_error() == Some(libc::EEXIST) => {
                debug!("address {addr} already on {iface}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_address(&self, iface: InterfaceId, addr: &IpNet) -> Result<()> {
        let mut msg = AddressMessage::default();
        msg.header.family = family_af(AddressFamily::of(addr));
        msg.header.prefix_len = addr.prefix_len();
        msg.header.index = iface.index();
        let bytes = ip_bytes(&addr.addr());
        msg.nlas.push(Nla::Local(bytes.clone()));
        msg.nlas.push(Nla::Address(bytes));

        match request(RtnlMessage::DelAddress(msg), NLM_F_ACK).await {
            Ok(_) => Ok(()),
            Err(Error::Io(e))
                if matches!(
                    e.raw_os_error(),
                    Some(libc::EADDRNOTAVAIL) | Some(libc::ENOENT)
                ) =>
            {
                debug!("address {addr} already gone from {iface}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ip_interface(
        &self,
        iface: InterfaceId,
        family: AddressFamily,
    ) -> Result<IpInterfaceRecord> {
        match family {
            AddressFamily::V4 => Ok(IpInterfaceRecord {
                iface,
                family,
                mtu: link_mtu(iface.index()).await?,
                metric: 0,
                automatic_metric: true,
                dad_transmits: 0,
                router_discovery: false,
            }),
            AddressFamily::V6 => {
                let dir = self.v6_conf_dir(iface).await?;
                Ok(IpInterfaceRecord {
                    iface,
                    family,
                    mtu: read_sysctl(&format!("{dir}/mtu")).await.unwrap_or(0),
                    metric: 0,
                    automatic_metric: true,
                    dad_transmits: read_sysctl(&format!("{dir}/dad_transmits"))
                        .await
                        .unwrap_or(1),
                    router_discovery: read_sysctl(&format!("{dir}/accept_ra"))
                        .await
                        .unwrap_or(1)
                        != 0,
                })
            }
        }
    }

    async fn set_ip_interface(&self, record: &IpInterfaceRecord) -> Result<()> {
        match record.family {
            AddressFamily::V4 => {
                if record.mtu > 0 {
                    set_link_mtu(record.iface.index(), record.mtu).await?;
                }
                if !record.automatic_metric {
                    // This platform has no per-interface metric; the
                    // engine's per-route metrics already carry it.
                    debug!("interface metric is per-route here, nothing to pin");
                }
                Ok(())
            }
            AddressFamily::V6 => {
                let dir = self.v6_conf_dir(record.iface).await?;
                if record.mtu > 0 {
                    write_sysctl(&format!("{dir}/mtu"), record.mtu).await?;
                }
                write_sysctl(&format!("{dir}/dad_transmits"), record.dad_transmits).await?;
                write_sysctl(
                    &format!("{dir}/accept_ra"),
                    if record.router_discovery { 1 } else { 0 },
                )
                .await
            }
        }
    }

    async fn interface_mtu(&self, iface: InterfaceId, family: AddressFamily) -> Result<u32> {
        match family {
            AddressFamily::V4 => link_mtu(iface.index()).await,
            AddressFamily::V6 => {
                let dir = self.v6_conf_dir(iface).await?;
                read_sysctl(&format!("{dir}/mtu")).await
            }
        }
    }
}

async fn read_sysctl(path: &str) -> Result<u32> {
    let text = tokio::fs::read_to_string(path).await?;
    text.trim()
        .parse()
        .map_err(|_| Error::os_state(format!("unparseable sysctl {path}: {text:?}")))
}

async fn write_sysctl(path: &str, value: u32) -> Result<()> {
    tokio::fs::write(path, format!("{value}\n")).await?;
    Ok(())
}
