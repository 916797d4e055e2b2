// # tunrouted - Tunnel Route Daemon
//
// A thin integration layer: everything interesting lives in
// tunroute-core (engine, monitor, synchronizer) and tunroute-net-netlink
// (the OS seams). This binary only reads configuration, wires the
// backend into the engine, and handles signals.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `TUNROUTE_INTERFACE`: name of the already-created tunnel interface
// - `TUNROUTE_ADDRESSES`: comma-separated local addresses with prefix
//   lengths (e.g. `10.0.0.5/24,fd00::5/64`); the first per family is
//   that family's gateway
// - `TUNROUTE_ROUTES`: comma-separated destination prefixes to route via
//   the tunnel (e.g. `0.0.0.0/0,::/0`)
// - `TUNROUTE_AUTO_MTU`: derive the tunnel MTU from the physical path
//   (`true`/`false`, default true)
// - `TUNROUTE_MTU`: static MTU applied at bring-up (optional)
// - `TUNROUTE_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export TUNROUTE_INTERFACE=tun0
// export TUNROUTE_ADDRESSES=10.0.0.5/24
// export TUNROUTE_ROUTES=0.0.0.0/0
//
// tunrouted
// ```

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use ipnet::IpNet;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tunroute_core::TunnelConfig;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum TunrouteExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<TunrouteExitCode> for ExitCode {
    fn from(code: TunrouteExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    interface: String,
    tunnel: TunnelConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let interface = env::var("TUNROUTE_INTERFACE").map_err(|_| {
            anyhow::anyhow!(
                "TUNROUTE_INTERFACE is required. \
                Set it via: export TUNROUTE_INTERFACE=tun0"
            )
        })?;

        let local_addrs = parse_net_list(&env::var("TUNROUTE_ADDRESSES").map_err(|_| {
            anyhow::anyhow!(
                "TUNROUTE_ADDRESSES is required. \
                Set it via: export TUNROUTE_ADDRESSES=10.0.0.5/24"
            )
        })?)?;

        let routes = parse_net_list(&env::var("TUNROUTE_ROUTES").unwrap_or_default())?;

        let mut tunnel = TunnelConfig::new(local_addrs, routes);
        if let Ok(raw) = env::var("TUNROUTE_AUTO_MTU") {
            tunnel.auto_mtu = match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => anyhow::bail!(
                    "TUNROUTE_AUTO_MTU must be true or false. Got: {}",
                    other
                ),
            };
        }
        if let Ok(raw) = env::var("TUNROUTE_MTU") {
            let mtu = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("TUNROUTE_MTU must be a number. Got: {}", raw))?;
            tunnel.mtu = Some(mtu);
        }

        Ok(Self {
            interface,
            tunnel,
            log_level: env::var("TUNROUTE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            anyhow::bail!("TUNROUTE_INTERFACE cannot be empty");
        }

        self.tunnel.validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "TUNROUTE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn parse_net_list(raw: &str) -> Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                anyhow::anyhow!(
                    "'{}' is not a valid prefix. \
                    Expected address/prefix-length, e.g. 10.0.0.5/24",
                    s
                )
            })
        })
        .collect()
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return TunrouteExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return TunrouteExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TunrouteExitCode::ConfigError.into();
    }

    info!("Starting tunrouted daemon");
    info!(
        "Interface {}: {} address(es), {} route(s)",
        config.interface,
        config.tunnel.local_addrs.len(),
        config.tunnel.routes.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TunrouteExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            TunrouteExitCode::RuntimeError
        } else {
            TunrouteExitCode::CleanShutdown
        }
    })
    .into()
}

/// Run the daemon
#[cfg(target_os = "linux")]
async fn run_daemon(config: Config) -> Result<()> {
    use std::sync::Arc;

    use tunroute_core::{RouteEngine, TunDevice};
    use tunroute_net_netlink::{
        LinkReadyClassifier, NetlinkInterfaceState, NetlinkRouteTable, NetlinkTunDevice,
        SocketEgressBinder,
    };

    let device = Arc::new(NetlinkTunDevice::open(&config.interface).await?);
    info!("Resolved tunnel interface {} as {}", config.interface, device.id());

    let engine = RouteEngine::new(
        Arc::new(NetlinkRouteTable::new(device.id())),
        Arc::new(NetlinkInterfaceState::new()),
        device,
        Arc::new(SocketEgressBinder::new()),
    )
    .with_firewall(Arc::new(LinkReadyClassifier::new()));

    engine.configure(&config.tunnel).await?;
    info!("Tunnel interface configured");

    let monitor = engine.start_monitor(&config.tunnel).await?;
    info!("Default route monitor running");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    monitor.stop().await;
    info!("Shutting down daemon");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run_daemon(_config: Config) -> Result<()> {
    anyhow::bail!("tunrouted requires the netlink backend and only runs on Linux")
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Fallback for non-Unix platforms
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
