//! Bring-up orchestration
//!
//! The RouteEngine owns the trait seams and exposes the two entry points
//! callers use:
//!
//! 1. [`RouteEngine::configure`]: applies a [`TunnelConfig`] to the OS
//!    once per interface activation: derive gateways, build and dedupe
//!    the route set, synchronize addresses then routes, then fix up the
//!    per-family interface records (metric policy, static MTU, IPv6
//!    duplicate-address-detection and router-discovery suppression).
//! 2. [`RouteEngine::start_monitor`]: starts the long-lived default
//!    route monitor and returns its handle.
//!
//! Bring-up errors are aggregated: every step is still attempted so a
//! v6-specific failure does not prevent v4 bring-up, and the first error
//! is reported.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::builder::{build_routes, RouteSet};
use crate::config::TunnelConfig;
use crate::error::{Error, Result};
use crate::gateway::derive_gateways;
use crate::model::AddressFamily;
use crate::monitor::{DefaultRouteMonitor, MonitorHandle};
use crate::sync::StateSynchronizer;
use crate::traits::{
    EgressBinder, FirewallClassifier, InterfaceState, RouteTable, TunDevice,
};

/// How long the firewall classifier keeps polling for the interface
///
/// The OS can take a surprisingly long time to notice a new interface;
/// poll until it does, bounded.
const CLASSIFY_ATTEMPTS: u32 = 20;
const CLASSIFY_INTERVAL: Duration = Duration::from_secs(1);

/// The route/address synchronization engine for one tunnel interface
pub struct RouteEngine {
    routes: Arc<dyn RouteTable>,
    ifstate: Arc<dyn InterfaceState>,
    device: Arc<dyn TunDevice>,
    binder: Arc<dyn EgressBinder>,
    firewall: Option<Arc<dyn FirewallClassifier>>,
    classify_attempts: u32,
    classify_interval: Duration,
}

impl RouteEngine {
    pub fn new(
        routes: Arc<dyn RouteTable>,
        ifstate: Arc<dyn InterfaceState>,
        device: Arc<dyn TunDevice>,
        binder: Arc<dyn EgressBinder>,
    ) -> Self {
        Self {
            routes,
            ifstate,
            device,
            binder,
            firewall: None,
            classify_attempts: CLASSIFY_ATTEMPTS,
            classify_interval: CLASSIFY_INTERVAL,
        }
    }

    /// Attach a firewall classifier, polled best-effort after bring-up
    pub fn with_firewall(mut self, firewall: Arc<dyn FirewallClassifier>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    /// Override the classifier polling schedule
    pub fn with_classify_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.classify_attempts = attempts;
        self.classify_interval = interval;
        self
    }

    /// Apply the desired configuration to the OS
    ///
    /// Runs exactly once per interface activation and blocks until all
    /// steps completed or failed. Configuration errors abort before any
    /// OS state is touched; OS errors are collected so the remaining
    /// steps still run.
    pub async fn configure(&self, cfg: &TunnelConfig) -> Result<()> {
        cfg.validate()?;

        let tun = self.device.id();
        info!("configuring tunnel interface {tun}");

        let gateways = derive_gateways(&cfg.local_addrs);
        let route_set = build_routes(&cfg.routes, &gateways, tun)?;

        if let Some(firewall) = &self.firewall {
            spawn_classifier(
                Arc::clone(firewall),
                tun,
                self.classify_attempts,
                self.classify_interval,
            );
        }

        let sync = StateSynchronizer::new(Arc::clone(&self.routes), Arc::clone(&self.ifstate));
        let mut errors = Vec::new();

        if let Err(e) = sync.sync_addresses(tun, &cfg.local_addrs).await {
            warn!("address sync: {e}");
            errors.push(e);
        }
        if let Err(e) = sync.sync_routes(tun, &route_set.routes).await {
            warn!("route sync: {e}");
            errors.push(e);
        }

        if let Err(e) = self.finish_v4(cfg, &route_set).await {
            warn!("IPv4 interface record: {e}");
            errors.push(e);
        }
        match self.finish_v6(cfg, &route_set).await {
            Ok(()) => {}
            Err(Error::Ipv6Unavailable) if !cfg.wants_v6() => {
                debug!("IPv6 not present and not requested, skipping");
            }
            Err(e) => {
                warn!("IPv6 interface record: {e}");
                errors.push(e);
            }
        }

        Error::collect(errors)
    }

    /// Start the default route monitor for this interface
    pub async fn start_monitor(&self, cfg: &TunnelConfig) -> Result<MonitorHandle> {
        DefaultRouteMonitor::start(
            Arc::clone(&self.routes),
            Arc::clone(&self.ifstate),
            Arc::clone(&self.device),
            Arc::clone(&self.binder),
            cfg.auto_mtu,
        )
        .await
    }

    async fn finish_v4(&self, cfg: &TunnelConfig, route_set: &RouteSet) -> Result<()> {
        let tun = self.device.id();
        let mut record = self.ifstate.ip_interface(tun, AddressFamily::V4).await?;
        if route_set.found_default_v4 {
            // The tunnel must win default-route selection in this family.
            record.automatic_metric = false;
            record.metric = 0;
        }
        if let Some(mtu) = cfg.mtu {
            record.mtu = mtu;
            self.device.force_mtu(mtu).await?;
        }
        self.ifstate.set_ip_interface(&record).await
    }

    async fn finish_v6(&self, cfg: &TunnelConfig, route_set: &RouteSet) -> Result<()> {
        let tun = self.device.id();
        let mut record = self.ifstate.ip_interface(tun, AddressFamily::V6).await?;
        if route_set.found_default_v6 {
            record.automatic_metric = false;
            record.metric = 0;
        }
        if let Some(mtu) = cfg.mtu {
            record.mtu = mtu;
        }
        // The tunnel needs neither duplicate-address detection nor router
        // discovery; both add latency and noise on a point-to-point link.
        record.dad_transmits = 0;
        record.router_discovery = false;
        self.ifstate.set_ip_interface(&record).await
    }
}

/// Poll the firewall classifier until the interface shows up
///
/// Fire-and-forget: bounded attempts, fixed interval, errors logged and
/// never escalated to the caller.
fn spawn_classifier(
    firewall: Arc<dyn FirewallClassifier>,
    iface: crate::model::InterfaceId,
    attempts: u32,
    interval: Duration,
) {
    tokio::spawn(async move {
        for attempt in 1..=attempts {
            match firewall.classify(iface).await {
                Ok(true) => {
                    debug!("firewall classified {iface} after {attempt} attempt(s)");
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!("firewall classification attempt {attempt}: {e}"),
            }
            tokio::time::sleep(interval).await;
        }
        warn!("firewall never classified {iface} after {attempts} attempts");
    });
}
