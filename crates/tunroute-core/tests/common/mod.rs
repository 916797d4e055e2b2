//! Test doubles and common utilities for architecture contract tests
//!
//! A single in-memory network stack stands in for the OS seams, with
//! atomic call counters so tests can assert exactly how many mutations
//! and queries an operation performed.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ipnet::IpNet;
use tokio::sync::mpsc;
use tokio_stream::Stream;

use tunroute_core::error::{Error, Result};
use tunroute_core::model::{AddressFamily, InterfaceId, RouteEntry};
use tunroute_core::traits::{
    EgressBinder, FirewallClassifier, InterfaceState, IpInterfaceRecord, RouteChangeEvent,
    RouteChangeKind, RouteTable, TunDevice,
};

pub fn net(s: &str) -> IpNet {
    s.parse().unwrap()
}

/// An in-memory routing table + interface state with call counters
pub struct MockNetStack {
    routes: Mutex<Vec<RouteEntry>>,
    addrs: Mutex<HashMap<InterfaceId, Vec<IpNet>>>,
    records: Mutex<HashMap<(InterfaceId, AddressFamily), IpInterfaceRecord>>,
    mtus: Mutex<HashMap<(InterfaceId, AddressFamily), u32>>,
    /// Counter for add_route() + remove_route()
    pub route_mutations: AtomicUsize,
    /// Counter for add_address() + remove_address()
    pub addr_mutations: AtomicUsize,
    /// Counter for set_ip_interface()
    pub record_writes: AtomicUsize,
    /// Counter for interface_mtu()
    pub mtu_queries: AtomicUsize,
    /// Whether the "host" has IPv6 at all
    pub ipv6_available: AtomicBool,
    /// Route destinations whose add_route() call should fail
    fail_add_dests: Mutex<HashSet<IpNet>>,
    /// Fail the next N list_routes() calls
    fail_lists: AtomicUsize,
    watch_tx: mpsc::UnboundedSender<RouteChangeEvent>,
    watch_rx: Mutex<Option<mpsc::UnboundedReceiver<RouteChangeEvent>>>,
}

impl MockNetStack {
    pub fn new() -> Self {
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        Self {
            routes: Mutex::new(Vec::new()),
            addrs: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            mtus: Mutex::new(HashMap::new()),
            route_mutations: AtomicUsize::new(0),
            addr_mutations: AtomicUsize::new(0),
            record_writes: AtomicUsize::new(0),
            mtu_queries: AtomicUsize::new(0),
            ipv6_available: AtomicBool::new(true),
            fail_add_dests: Mutex::new(HashSet::new()),
            fail_lists: AtomicUsize::new(0),
            watch_tx,
            watch_rx: Mutex::new(Some(watch_rx)),
        }
    }

    /// Seed a route into the "live" table without counting a mutation
    pub fn seed_route(&self, route: RouteEntry) {
        self.routes.lock().unwrap().push(route);
    }

    /// Remove seeded routes matching a predicate, without counting
    pub fn drop_routes(&self, predicate: impl Fn(&RouteEntry) -> bool) {
        self.routes.lock().unwrap().retain(|r| !predicate(r));
    }

    /// Seed an address assignment, without counting
    pub fn seed_address(&self, iface: InterfaceId, addr: IpNet) {
        self.addrs.lock().unwrap().entry(iface).or_default().push(addr);
    }

    pub fn addresses(&self, iface: InterfaceId) -> Vec<IpNet> {
        self.addrs.lock().unwrap().get(&iface).cloned().unwrap_or_default()
    }

    pub fn live_routes(&self) -> Vec<RouteEntry> {
        self.routes.lock().unwrap().clone()
    }

    /// Set a physical interface's MTU as seen by interface_mtu()
    pub fn set_mtu(&self, iface: InterfaceId, family: AddressFamily, mtu: u32) {
        self.mtus.lock().unwrap().insert((iface, family), mtu);
    }

    pub fn record(&self, iface: InterfaceId, family: AddressFamily) -> Option<IpInterfaceRecord> {
        self.records.lock().unwrap().get(&(iface, family)).cloned()
    }

    /// Make the next add_route() for this destination fail
    pub fn fail_add_route(&self, dest: IpNet) {
        self.fail_add_dests.lock().unwrap().insert(dest);
    }

    /// Make the next `n` list_routes() calls fail
    pub fn fail_next_lists(&self, n: usize) {
        self.fail_lists.store(n, Ordering::SeqCst);
    }

    /// Emit a routing-table change notification to the watch stream
    pub fn emit(&self, event: RouteChangeEvent) {
        let _ = self.watch_tx.send(event);
    }

    /// A default-route change notification with no interesting payload
    pub fn default_change() -> RouteChangeEvent {
        RouteChangeEvent {
            kind: RouteChangeKind::Modify,
            dest: net("0.0.0.0/0"),
            iface: InterfaceId::UNSPECIFIED,
            metric: 0,
        }
    }

    /// A change notification for a non-default route
    pub fn non_default_change() -> RouteChangeEvent {
        RouteChangeEvent {
            kind: RouteChangeKind::Add,
            dest: net("10.20.0.0/16"),
            iface: InterfaceId::UNSPECIFIED,
            metric: 0,
        }
    }

    fn default_record(iface: InterfaceId, family: AddressFamily) -> IpInterfaceRecord {
        IpInterfaceRecord {
            iface,
            family,
            mtu: 0,
            metric: 0,
            automatic_metric: true,
            dad_transmits: 1,
            router_discovery: true,
        }
    }
}

#[async_trait]
impl RouteTable for MockNetStack {
    async fn list_routes(&self, family: AddressFamily) -> Result<Vec<RouteEntry>> {
        if self
            .fail_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::os_state("injected list failure"));
        }
        if family == AddressFamily::V6 && !self.ipv6_available.load(Ordering::SeqCst) {
            return Err(Error::Ipv6Unavailable);
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.family() == family)
            .cloned()
            .collect())
    }

    async fn add_route(&self, route: &RouteEntry) -> Result<()> {
        if self.fail_add_dests.lock().unwrap().remove(&route.dest) {
            return Err(Error::os_state(format!("injected add failure for {route}")));
        }
        self.route_mutations.fetch_add(1, Ordering::SeqCst);
        self.routes.lock().unwrap().push(route.clone());
        Ok(())
    }

    async fn remove_route(&self, route: &RouteEntry) -> Result<()> {
        self.route_mutations.fetch_add(1, Ordering::SeqCst);
        self.routes.lock().unwrap().retain(|r| r != route);
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = RouteChangeEvent> + Send + 'static>> {
        let rx = self
            .watch_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

#[async_trait]
impl InterfaceState for MockNetStack {
    async fn list_addresses(&self, iface: InterfaceId) -> Result<Vec<IpNet>> {
        Ok(self.addresses(iface))
    }

    async fn add_address(&self, iface: InterfaceId, addr: &IpNet) -> Result<()> {
        self.addr_mutations.fetch_add(1, Ordering::SeqCst);
        self.addrs.lock().unwrap().entry(iface).or_default().push(*addr);
        Ok(())
    }

    async fn remove_address(&self, iface: InterfaceId, addr: &IpNet) -> Result<()> {
        self.addr_mutations.fetch_add(1, Ordering::SeqCst);
        if let Some(list) = self.addrs.lock().unwrap().get_mut(&iface) {
            list.retain(|a| a != addr);
        }
        Ok(())
    }

    async fn ip_interface(
        &self,
        iface: InterfaceId,
        family: AddressFamily,
    ) -> Result<IpInterfaceRecord> {
        if family == AddressFamily::V6 && !self.ipv6_available.load(Ordering::SeqCst) {
            return Err(Error::Ipv6Unavailable);
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .entry((iface, family))
            .or_insert_with(|| Self::default_record(iface, family))
            .clone())
    }

    async fn set_ip_interface(&self, record: &IpInterfaceRecord) -> Result<()> {
        self.record_writes.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert((record.iface, record.family), record.clone());
        Ok(())
    }

    async fn interface_mtu(&self, iface: InterfaceId, family: AddressFamily) -> Result<u32> {
        self.mtu_queries.fetch_add(1, Ordering::SeqCst);
        if family == AddressFamily::V6 && !self.ipv6_available.load(Ordering::SeqCst) {
            return Err(Error::Ipv6Unavailable);
        }
        Ok(self
            .mtus
            .lock()
            .unwrap()
            .get(&(iface, family))
            .copied()
            .unwrap_or(0))
    }
}

/// A tunnel device double with a fixed MTU ceiling
pub struct MockTunDevice {
    id: InterfaceId,
    ceiling: u32,
    /// Every value pushed through force_mtu(), in order
    pub forced: Mutex<Vec<u32>>,
}

impl MockTunDevice {
    pub fn new(id: InterfaceId, ceiling: u32) -> Self {
        Self {
            id,
            ceiling,
            forced: Mutex::new(Vec::new()),
        }
    }

    pub fn forced_mtus(&self) -> Vec<u32> {
        self.forced.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunDevice for MockTunDevice {
    fn id(&self) -> InterfaceId {
        self.id
    }

    async fn mtu(&self) -> Result<u32> {
        Ok(self.ceiling)
    }

    async fn force_mtu(&self, mtu: u32) -> Result<()> {
        self.forced.lock().unwrap().push(mtu);
        Ok(())
    }
}

/// An egress binder double recording every bind call
pub struct MockEgressBinder {
    pub v4_binds: Mutex<Vec<u32>>,
    pub v6_binds: Mutex<Vec<u32>>,
    pub fail_v4: AtomicBool,
}

impl MockEgressBinder {
    pub fn new() -> Self {
        Self {
            v4_binds: Mutex::new(Vec::new()),
            v6_binds: Mutex::new(Vec::new()),
            fail_v4: AtomicBool::new(false),
        }
    }

    pub fn v4_bind_calls(&self) -> Vec<u32> {
        self.v4_binds.lock().unwrap().clone()
    }

    pub fn v6_bind_calls(&self) -> Vec<u32> {
        self.v6_binds.lock().unwrap().clone()
    }
}

#[async_trait]
impl EgressBinder for MockEgressBinder {
    async fn bind_v4(&self, index: u32) -> Result<()> {
        if self.fail_v4.load(Ordering::SeqCst) {
            return Err(Error::os_state("injected v4 bind failure"));
        }
        self.v4_binds.lock().unwrap().push(index);
        Ok(())
    }

    async fn bind_v6(&self, index: u32) -> Result<()> {
        self.v6_binds.lock().unwrap().push(index);
        Ok(())
    }
}

/// A firewall classifier double that succeeds on the nth call
pub struct MockFirewallClassifier {
    pub calls: AtomicUsize,
    succeed_on: usize,
}

impl MockFirewallClassifier {
    pub fn new(succeed_on: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            succeed_on,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FirewallClassifier for MockFirewallClassifier {
    async fn classify(&self, _iface: InterfaceId) -> Result<bool> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(n >= self.succeed_on)
    }
}
