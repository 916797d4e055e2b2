//! Blocking rtnetlink request plumbing
//!
//! One short-lived socket per request keeps sequence-number handling
//! trivial; route operations are rare enough that socket reuse buys
//! nothing. Async callers go through [`request`], which moves the
//! blocking socket work onto the tokio blocking pool.

use std::io;
use std::net::IpAddr;

use netlink_packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST};
use netlink_packet_route::{RtnlMessage, AF_INET, AF_INET6};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

use tunroute_core::error::{Error, Result};
use tunroute_core::model::AddressFamily;

pub(crate) fn family_af(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::V4 => AF_INET as u8,
        AddressFamily::V6 => AF_INET6 as u8,
    }
}

pub(crate) fn ip_bytes(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

pub(crate) fn ip_from_bytes(family: AddressFamily, bytes: &[u8]) -> Option<IpAddr> {
    match family {
        AddressFamily::V4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        AddressFamily::V6 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
    }
}

pub(crate) fn unspecified(family: AddressFamily) -> IpAddr {
    match family {
        AddressFamily::V4 => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        AddressFamily::V6 => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
    }
}

/// Whether this host has an IPv6 stack at all
pub(crate) fn ensure_ipv6() -> Result<()> {
    if std::path::Path::new("/proc/sys/net/ipv6").is_dir() {
        Ok(())
    } else {
        Err(Error::Ipv6Unavailable)
    }
}

/// Issue one rtnetlink request and collect the inner reply messages
///
/// Negative kernel error codes surface as `io::Error` with the matching
/// errno; an empty ACK reply yields an empty vector.
pub(crate) fn blocking_request(message: RtnlMessage, flags: u16) -> io::Result<Vec<RtnlMessage>> {
    let mut socket = Socket::new(NETLINK_ROUTE)?;
    socket.bind_auto()?;
    socket.connect(&SocketAddr::new(0, 0))?;

    let mut packet = NetlinkMessage::from(message);
    packet.header.flags = NLM_F_REQUEST | flags;
    packet.header.sequence_number = 1;
    packet.finalize();

    let mut buf = vec![0u8; packet.header.length as usize];
    packet.serialize(&mut buf);
    socket.send(&buf, 0)?;

    let dump = flags & NLM_F_DUMP != 0;
    let mut replies = Vec::new();
    'recv: loop {
        let (bytes, _) = socket.recv_from_full()?;
        let mut offset = 0;
        while offset < bytes.len() {
            let reply = NetlinkMessage::<RtnlMessage>::deserialize(&bytes[offset..])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let length = reply.header.length as usize;
            match reply.payload {
                NetlinkPayload::Done(_) => break 'recv,
                NetlinkPayload::Error(err) => match err.code {
                    Some(code) => return Err(io::Error::from_raw_os_error(-code.get())),
                    None => break 'recv, // ack
                },
                NetlinkPayload::InnerMessage(inner) => replies.push(inner),
                _ => {}
            }
            if length == 0 {
                break 'recv;
            }
            offset += length;
        }
        // A non-dump reply fits in one datagram and carries no Done marker.
        if !dump {
            break;
        }
    }
    Ok(replies)
}

/// Async wrapper over [`blocking_request`]
pub(crate) async fn request(message: RtnlMessage, flags: u16) -> Result<Vec<RtnlMessage>> {
    tokio::task::spawn_blocking(move || blocking_request(message, flags))
        .await
        .map_err(|e| Error::os_state(format!("netlink request task failed: {e}")))?
        .map_err(Error::from)
}
