//! Link-level helpers shared by the backend modules

use std::ffi::CString;

use netlink_packet_core::NLM_F_ACK;
use netlink_packet_route::nlas::link::Nla;
use netlink_packet_route::{LinkMessage, RtnlMessage};

use tunroute_core::error::{Error, Result};

use crate::conn::request;

/// Fetch one link by index
pub(crate) async fn get_link(index: u32) -> Result<LinkMessage> {
    let mut msg = LinkMessage::default();
    msg.header.index = index;
    let replies = request(RtnlMessage::GetLink(msg), 0).await?;
    replies
        .into_iter()
        .find_map(|reply| match reply {
            RtnlMessage::NewLink(link) => Some(link),
            _ => None,
        })
        .ok_or_else(|| Error::os_state(format!("interface index {index} not found")))
}

pub(crate) fn link_name(link: &LinkMessage) -> Option<String> {
    link.nlas.iter().find_map(|nla| match nla {
        Nla::IfName(name) => Some(name.clone()),
        _ => None,
    })
}

pub(crate) fn link_mtu_of(link: &LinkMessage) -> Option<u32> {
    link.nlas.iter().find_map(|nla| match nla {
        Nla::Mtu(mtu) => Some(*mtu),
        _ => None,
    })
}

pub(crate) async fn link_mtu(index: u32) -> Result<u32> {
    let link = get_link(index).await?;
    link_mtu_of(&link)
        .ok_or_else(|| Error::os_state(format!("interface index {index} reports no MTU")))
}

pub(crate) async fn set_link_mtu(index: u32, mtu: u32) -> Result<()> {
    let mut msg = LinkMessage::default();
    msg.header.index = index;
    msg.nlas.push(Nla::Mtu(mtu));
    request(RtnlMessage::SetLink(msg), NLM_F_ACK).await?;
    Ok(())
}

/// Resolve an interface name to its index
pub(crate) fn name_to_index(name: &str) -> Result<u32> {
    let c_name = CString::new(name)
        .map_err(|_| Error::config(format!("interface name {name:?} contains a NUL byte")))?;
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(Error::os_state(format!("no such interface: {name}")));
    }
    Ok(index)
}
