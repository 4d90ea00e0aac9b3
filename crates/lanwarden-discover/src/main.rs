//! CLI entry point for the lanwarden-discover scanner.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use lanwarden_store::{JsonSnapshotStore, SnapshotStore};

use lanwarden_discover::config::{DiscoverConfig, ScanTier};
use lanwarden_discover::orchestrator::{ScanOrchestrator, ScanRequest};
use lanwarden_discover::ports::parse_port_list;
use lanwarden_discover::scheduler::{run_watched, ScanScheduler};

#[derive(Parser)]
#[command(name = "lanwarden-discover")]
#[command(about = "LAN host discovery, threat classification, and drift detection")]
struct Cli {
    /// Target to scan (CIDR, e.g. 192.168.1.0/24, or a prefix like 192.168.1).
    #[arg(short, long)]
    target: Option<String>,

    /// Port tier: quick, standard, full, backdoors, home-automation,
    /// ai-services, custom. Defaults to the configured tier.
    #[arg(long)]
    tier: Option<String>,

    /// Explicit ports, e.g. 22,80,8000-8010. Overrides the tier.
    #[arg(short, long)]
    ports: Option<String>,

    /// Run a single one-shot scan and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled scans.
    #[arg(long)]
    daemon: bool,

    /// Print the cycle report as JSON on stdout (--once only).
    #[arg(long)]
    json: bool,

    /// Config file prefix (default: lanwarden).
    #[arg(short, long, default_value = "lanwarden")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let discover_config = load_discover_config(&cli.config)?;

    let store: Arc<dyn SnapshotStore> =
        Arc::new(JsonSnapshotStore::new(&discover_config.snapshot_dir)?);
    tracing::info!(dir = %discover_config.snapshot_dir, "Snapshot store ready");

    if cli.once {
        let target = cli
            .target
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--target is required in --once mode"))?;
        let tier = match cli.tier.as_deref() {
            Some(raw) => raw.parse::<ScanTier>()?,
            None => discover_config.default_tier,
        };
        let mut request = ScanRequest::new(target, tier);
        if let Some(raw) = cli.ports.as_deref() {
            request = request.with_ports(parse_port_list(raw)?);
        }

        let watchdog = std::time::Duration::from_secs(discover_config.cycle_timeout_secs.max(1));
        let orchestrator = ScanOrchestrator::new(discover_config, store)?;

        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling scan");
                on_signal.cancel();
            }
        });

        let report = run_watched(&orchestrator, &request, watchdog, &shutdown).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        if !report.store_errors.is_empty() {
            anyhow::bail!("Snapshot persistence failed: {}", report.store_errors.join("; "));
        }
    } else if cli.daemon {
        if cli.target.is_some() || cli.ports.is_some() {
            tracing::warn!("--target and --ports are ignored in --daemon mode; subnets come from config");
        }
        let orchestrator = Arc::new(ScanOrchestrator::new(discover_config, store)?);
        let scheduler = ScanScheduler::new(orchestrator);

        let shutdown = scheduler.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping scheduler");
                shutdown.cancel();
            }
        });

        scheduler.run().await?;
    } else {
        anyhow::bail!("Specify --once (one-shot scan) or --daemon (scheduled scanning)");
    }

    Ok(())
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANWARDEN_DISCOVER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(anyhow::anyhow!("Invalid [discover] configuration: {e}")),
    }
}
