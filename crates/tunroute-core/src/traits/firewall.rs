//! Firewall classification seam
//!
//! A best-effort collaborator: the engine polls it after bring-up until
//! the interface is visible to the firewall layer, then stops. Failures
//! are logged and never escalate.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::InterfaceId;

#[async_trait]
pub trait FirewallClassifier: Send + Sync {
    /// Try to classify the interface for firewall purposes
    ///
    /// Returns `Ok(true)` once the interface was found and its category
    /// ensured, `Ok(false)` while the OS has not noticed the interface
    /// yet. The caller keeps polling on `Ok(false)` and on errors.
    async fn classify(&self, iface: InterfaceId) -> Result<bool>;
}
