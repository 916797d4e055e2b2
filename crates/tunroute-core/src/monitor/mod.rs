//! Default route monitor
//!
//! A long-lived subscription to OS routing-table change notifications.
//! Whenever a default route (zero-length prefix) changes in either
//! family, the monitor rescans the live table, picks the lowest-metric
//! non-tunnel interface per family, re-points the process's own outbound
//! sockets at it, and re-derives the tunnel MTU from the new path.
//!
//! ## Structure
//!
//! The monitor is a message-passing actor: one spawned task owns all
//! per-family mutable state (last selected interface, last applied MTU)
//! and processes notifications one at a time from the subscription
//! stream. No locks are needed and delivery order is preserved.
//!
//! ## Debounce
//!
//! Notification storms are common (a single link flap fans out into many
//! table changes). The selected interface identity is compared against
//! the previous selection per family; when unchanged, socket rebinding
//! and MTU recomputation are skipped for that family.
//!
//! ## Errors
//!
//! Per-notification failures are logged and never terminate the
//! subscription; the next notification retries naturally.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{AddressFamily, InterfaceId, PreferredEgress, RouteEntry};
use crate::mtu::{MtuAdaptor, MtuState};
use crate::traits::{EgressBinder, InterfaceState, RouteTable, TunDevice};

/// Live handle to a running monitor
///
/// Dropping the handle without calling [`MonitorHandle::stop`] detaches
/// the task; it keeps running until the subscription stream ends.
pub struct MonitorHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor and release the OS subscription
    ///
    /// Guarantees no further notification handling occurs after this
    /// returns.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

/// Actor state and collaborators for the running monitor
pub struct DefaultRouteMonitor {
    routes: Arc<dyn RouteTable>,
    binder: Arc<dyn EgressBinder>,
    mtu: MtuAdaptor,
    tun: InterfaceId,
    auto_mtu: bool,
    preferred_v4: PreferredEgress,
    preferred_v6: PreferredEgress,
    mtu_state: MtuState,
}

impl DefaultRouteMonitor {
    /// Run an initial selection pass, then subscribe and spawn the actor
    ///
    /// The initial pass applies the current preferred egress and MTU
    /// before any notification arrives; its errors fail `start`.
    pub async fn start(
        routes: Arc<dyn RouteTable>,
        ifstate: Arc<dyn InterfaceState>,
        device: Arc<dyn TunDevice>,
        binder: Arc<dyn EgressBinder>,
        auto_mtu: bool,
    ) -> Result<MonitorHandle> {
        let tun = device.id();
        let mut monitor = DefaultRouteMonitor {
            routes,
            binder,
            mtu: MtuAdaptor::new(ifstate, device),
            tun,
            auto_mtu,
            preferred_v4: PreferredEgress::unbound(),
            preferred_v6: PreferredEgress::unbound(),
            mtu_state: MtuState::default(),
        };

        monitor.refresh().await?;

        let mut stream = monitor.routes.watch();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("default route monitor stopping");
                        break;
                    }
                    event = stream.next() => match event {
                        Some(event) if event.concerns_default_route() => {
                            debug!("default route change: {:?} {}", event.kind, event.dest);
                            if let Err(e) = monitor.refresh().await {
                                warn!("default route refresh failed: {e}");
                            }
                        }
                        Some(_) => {}
                        None => {
                            warn!("route change subscription ended");
                            break;
                        }
                    }
                }
            }
        });

        Ok(MonitorHandle { shutdown_tx, task })
    }

    /// Recompute preferred egress per family and re-derive the MTU
    async fn refresh(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        // Both families are always attempted; one family's failure must
        // not block the other.
        let changed_v4 = match self.rebind_family(AddressFamily::V4).await {
            Ok(changed) => changed,
            Err(e) => {
                errors.push(e);
                false
            }
        };
        let changed_v6 = match self.rebind_family(AddressFamily::V6).await {
            Ok(changed) => changed,
            Err(e) => {
                errors.push(e);
                false
            }
        };

        // v4 and v6 MTU are coupled through the shared minimum, so a
        // change in either family re-derives both. The adaptor itself
        // skips when the derived value is unchanged.
        if (changed_v4 || changed_v6) && self.auto_mtu {
            if let Err(e) = self
                .mtu
                .apply(self.preferred_v4, self.preferred_v6, &mut self.mtu_state)
                .await
            {
                errors.push(e);
            }
        }

        Error::collect(errors)
    }

    /// Re-select one family's egress interface; true if it changed
    async fn rebind_family(&mut self, family: AddressFamily) -> Result<bool> {
        let table = match self.routes.list_routes(family).await {
            Ok(table) => table,
            Err(Error::Ipv6Unavailable) => Vec::new(),
            Err(e) => return Err(e),
        };
        let selected = select_preferred(&table, self.tun);

        let previous = match family {
            AddressFamily::V4 => self.preferred_v4,
            AddressFamily::V6 => self.preferred_v6,
        };
        if selected.iface == previous.iface {
            return Ok(false);
        }

        if selected.is_unbound() {
            info!("{family}: no non-tunnel default route, unbinding egress sockets");
        } else {
            info!(
                "{family}: preferred egress now {} (metric {})",
                selected.iface, selected.metric
            );
        }
        match family {
            AddressFamily::V4 => self.binder.bind_v4(selected.iface.index()).await?,
            AddressFamily::V6 => self.binder.bind_v6(selected.iface.index()).await?,
        }
        // Recorded only after a successful bind so a failed bind is
        // retried on the next notification instead of debounced away.
        match family {
            AddressFamily::V4 => self.preferred_v4 = selected,
            AddressFamily::V6 => self.preferred_v6 = selected,
        }
        Ok(true)
    }
}

/// Lowest-metric default route not owned by the tunnel; first seen wins ties
fn select_preferred(table: &[RouteEntry], tun: InterfaceId) -> PreferredEgress {
    let mut best = PreferredEgress::unbound();
    for route in table {
        if !route.is_default() || route.iface == tun {
            continue;
        }
        if best.is_unbound() || route.metric < best.metric {
            best = PreferredEgress {
                iface: route.iface,
                metric: route.metric,
            };
        }
    }
    best
}
