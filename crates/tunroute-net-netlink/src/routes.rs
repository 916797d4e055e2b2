//! RouteTable backed by rtnetlink
//!
//! Queries and mutations use per-request sockets through [`crate::conn`];
//! the watch stream uses a dedicated long-lived socket bound to the
//! per-family route multicast groups, pumped by a plain thread into an
//! unbounded channel. The thread exits when the subscriber drops the
//! stream.

use std::pin::Pin;

use async_trait::async_trait;
use ipnet::IpNet;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL};
use netlink_packet_route::nlas::route::Nla;
use netlink_packet_route::{
    RouteMessage, RtnlMessage, AF_INET, AF_INET6, RTN_UNICAST, RTPROT_STATIC, RT_SCOPE_LINK,
    RT_SCOPE_UNIVERSE, RT_TABLE_MAIN,
};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use tunroute_core::error::{Error, Result};
use tunroute_core::model::{AddressFamily, InterfaceId, RouteEntry};
use tunroute_core::traits::{RouteChangeEvent, RouteChangeKind, RouteTable};

use crate::conn::{ensure_ipv6, family_af, ip_bytes, ip_from_bytes, request, unspecified};
use crate::interface_id;

// rtnetlink.h multicast groups; netlink-packet-route does not export them.
const RTMGRP_IPV4_ROUTE: u32 = 0x40;
const RTMGRP_IPV6_ROUTE: u32 = 0x400;

// The kernel stores IPv6 routes requested with priority 0 at
// IP6_RT_PRIO_USER instead; see ip6_route_info_create().
const IP6_RT_PRIO_USER: u32 = 1024;

pub struct NetlinkRouteTable {
    tun: InterfaceId,
}

impl NetlinkRouteTable {
    pub fn new(tun: InterfaceId) -> Self {
        Self { tun }
    }
}

#[async_trait]
impl RouteTable for NetlinkRouteTable {
    async fn list_routes(&self, family: AddressFamily) -> Result<Vec<RouteEntry>> {
        if family == AddressFamily::V6 {
            ensure_ipv6()?;
        }
        let mut msg = RouteMessage::default();
        msg.header.address_family = family_af(family);
        let replies = request(RtnlMessage::GetRoute(msg), NLM_F_DUMP).await?;

        let mut routes = Vec::new();
        for reply in replies {
            let RtnlMessage::NewRoute(route) = reply else {
                continue;
            };
            if route.header.table != RT_TABLE_MAIN as u8
                || route.header.kind != RTN_UNICAST as u8
            {
                continue;
            }
            if let Some(entry) = decode_route(family, &route, Some(self.tun)) {
                routes.push(entry);
            }
        }
        Ok(routes)
    }

    async fn add_route(&self, route: &RouteEntry) -> Result<()> {
        let msg = encode_route(route);
        match request(
            RtnlMessage::NewRoute(msg),
            NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(Error::Io(e)) if e.raw_os_error() == Some(libc::EEXIST) => {
                debug!("route {route} already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_route(&self, route: &RouteEntry) -> Result<()> {
        let msg = encode_route(route);
        match request(RtnlMessage::DelRoute(msg), NLM_F_ACK).await {
            Ok(_) => Ok(()),
            Err(Error::Io(e))
                if matches!(e.raw_os_error(), Some(libc::ESRCH) | Some(libc::ENOENT)) =>
            {
                debug!("route {route} already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = RouteChangeEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("rtnl-route-watch".into())
            .spawn(move || watch_loop(tx));
        if let Err(e) = spawned {
            warn!("failed to spawn route watch thread: {e}");
        }
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

fn encode_route(route: &RouteEntry) -> RouteMessage {
    let mut msg = RouteMessage::default();
    msg.header.address_family = family_af(route.family());
    msg.header.destination_prefix_length = route.dest.prefix_len();
    msg.header.table = RT_TABLE_MAIN as u8;
    msg.header.protocol = RTPROT_STATIC as u8;
    msg.header.kind = RTN_UNICAST as u8;
    msg.header.scope = if route.next_hop.is_some() {
        RT_SCOPE_UNIVERSE as u8
    } else {
        RT_SCOPE_LINK as u8
    };
    msg.nlas.push(Nla::Destination(ip_bytes(&route.dest.addr())));
    if let Some(gw) = route.next_hop {
        msg.nlas.push(Nla::Gateway(ip_bytes(&gw)));
    }
    msg.nlas.push(Nla::Oif(route.iface.index()));
    // Ask for IP6_RT_PRIO_USER explicitly: the kernel would silently
    // substitute it for 0 anyway, and the stored value must match what
    // a later delete request carries.
    let metric = if route.family() == AddressFamily::V6 && route.metric == 0 {
        IP6_RT_PRIO_USER
    } else {
        route.metric
    };
    msg.nlas.push(Nla::Priority(metric));
    msg
}

/// Decode one route message
///
/// When `tun` is given, IPv6 routes owned by that interface map
/// IP6_RT_PRIO_USER back to metric 0, undoing the encode-side
/// substitution so the live table compares equal to the desired set.
fn decode_route(
    family: AddressFamily,
    msg: &RouteMessage,
    tun: Option<InterfaceId>,
) -> Option<RouteEntry> {
    let mut dest_addr = None;
    let mut gateway = None;
    let mut oif = 0u32;
    let mut metric = 0u32;
    for nla in &msg.nlas {
        match nla {
            Nla::Destination(bytes) => dest_addr = ip_from_bytes(family, bytes),
            Nla::Gateway(bytes) => gateway = ip_from_bytes(family, bytes),
            Nla::Oif(index) => oif = *index,
            Nla::Priority(priority) => metric = *priority,
            _ => {}
        }
    }
    let iface = interface_id(oif);
    if family == AddressFamily::V6
        && metric == IP6_RT_PRIO_USER
        && tun.is_some_and(|tun| iface == tun)
    {
        metric = 0;
    }
    // Default routes carry no destination attribute at all.
    let addr = dest_addr.unwrap_or_else(|| unspecified(family));
    let dest = IpNet::new(addr, msg.header.destination_prefix_length).ok()?;
    Some(RouteEntry::new(dest, gateway, metric, iface))
}

fn watch_loop(tx: mpsc::UnboundedSender<RouteChangeEvent>) {
    let mut socket = match Socket::new(NETLINK_ROUTE) {
        Ok(socket) => socket,
        Err(e) => {
            warn!("route watch socket: {e}");
            return;
        }
    };
    if let Err(e) = socket.bind(&SocketAddr::new(0, RTMGRP_IPV4_ROUTE | RTMGRP_IPV6_ROUTE)) {
        warn!("route watch bind: {e}");
        return;
    }

    loop {
        let (bytes, _) = match socket.recv_from_full() {
            Ok(received) => received,
            Err(e) => {
                warn!("route watch recv: {e}");
                return;
            }
        };
        let mut offset = 0;
        while offset < bytes.len() {
            let Ok(packet) = NetlinkMessage::<RtnlMessage>::deserialize(&bytes[offset..]) else {
                break;
            };
            let length = packet.header.length as usize;
            if length == 0 {
                break;
            }
            if let Some(event) = decode_event(&packet.payload) {
                if tx.send(event).is_err() {
                    // Subscriber dropped the stream.
                    return;
                }
            }
            offset += length;
        }
    }
}

fn decode_event(payload: &NetlinkPayload<RtnlMessage>) -> Option<RouteChangeEvent> {
    let (kind, msg) = match payload {
        NetlinkPayload::InnerMessage(RtnlMessage::NewRoute(msg)) => (RouteChangeKind::Add, msg),
        NetlinkPayload::InnerMessage(RtnlMessage::DelRoute(msg)) => (RouteChangeKind::Delete, msg),
        _ => return None,
    };
    let family = match msg.header.address_family {
        af if af == AF_INET as u8 => AddressFamily::V4,
        af if af == AF_INET6 as u8 => AddressFamily::V6,
        _ => return None,
    };
    let entry = decode_route(family, msg, None)?;
    Some(RouteChangeEvent {
        kind,
        dest: entry.dest,
        iface: entry.iface,
        metric: entry.metric,
    })
}
