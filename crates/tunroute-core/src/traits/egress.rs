//! Egress socket binding seam
//!
//! The process's own outbound sockets carry the tunnel transport; they
//! must route via the physical path, never recursively via the tunnel.

use async_trait::async_trait;

use crate::error::Result;

/// Directs the process's outbound sockets to a specific interface
///
/// `index` is the interface's numeric index; 0 means "unbound", resetting
/// the sockets to default OS selection, and is the correct action when no
/// non-tunnel default route exists.
#[async_trait]
pub trait EgressBinder: Send + Sync {
    async fn bind_v4(&self, index: u32) -> Result<()>;

    async fn bind_v6(&self, index: u32) -> Result<()>;
}
