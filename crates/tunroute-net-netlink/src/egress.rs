//! EgressBinder over SO_BINDTODEVICE
//!
//! The tunnel transport's own sockets register their fds here; on every
//! preferred-egress change the monitor re-points them at the physical
//! interface so tunnel traffic never routes back into the tunnel.

use std::io;
use std::os::fd::RawFd;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use tunroute_core::error::{Error, Result};
use tunroute_core::traits::EgressBinder;

pub struct SocketEgressBinder {
    v4_socks: Mutex<Vec<RawFd>>,
    v6_socks: Mutex<Vec<RawFd>>,
}

impl SocketEgressBinder {
    pub fn new() -> Self {
        Self {
            v4_socks: Mutex::new(Vec::new()),
            v6_socks: Mutex::new(Vec::new()),
        }
    }

    /// Register an IPv4 transport socket; the caller keeps the fd open
    /// for the binder's lifetime.
    pub fn register_v4(&self, fd: RawFd) {
        self.v4_socks.lock().unwrap().push(fd);
    }

    /// Register an IPv6 transport socket
    pub fn register_v6(&self, fd: RawFd) {
        self.v6_socks.lock().unwrap().push(fd);
    }

    fn apply(&self, fds: &[RawFd], index: u32) -> Result<()> {
        let name = index_to_name(index)?;
        let mut errors = Vec::new();
        for &fd in fds {
            if let Err(e) = bind_to_device(fd, &name) {
                errors.push(Error::from(e));
            }
        }
        if name.is_empty() {
            debug!("cleared device binding on {} socket(s)", fds.len());
        } else {
            debug!(
                "bound {} socket(s) to {}",
                fds.len(),
                String::from_utf8_lossy(&name)
            );
        }
        Error::collect(errors)
    }
}

impl Default for SocketEgressBinder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EgressBinder for SocketEgressBinder {
    async fn bind_v4(&self, index: u32) -> Result<()> {
        let fds = self.v4_socks.lock().unwrap().clone();
        self.apply(&fds, index)
    }

    async fn bind_v6(&self, index: u32) -> Result<()> {
        let fds = self.v6_socks.lock().unwrap().clone();
        self.apply(&fds, index)
    }
}

/// An empty name clears the binding; index 0 maps to it.
fn index_to_name(index: u32) -> Result<Vec<u8>> {
    if index == 0 {
        return Ok(Vec::new());
    }
    let mut buf = [0u8; libc::IF_NAMESIZE];
    let ret = unsafe { libc::if_indextoname(index, buf.as_mut_ptr() as *mut libc::c_char) };
    if ret.is_null() {
        return Err(Error::os_state(format!(
            "interface index {index} has no name"
        )));
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(buf[..len].to_vec())
}

fn bind_to_device(fd: RawFd, name: &[u8]) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            name.as_ptr() as *const libc::c_void,
            name.len() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
