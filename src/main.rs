use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chainnode_monitor::alert::StallWatcher;
use chainnode_monitor::client::HttpChainClient;
use chainnode_monitor::clock::SystemClock;
use chainnode_monitor::config::MonitorConfig;
use chainnode_monitor::events::EventHub;
use chainnode_monitor::http::{self, ApiState};
use chainnode_monitor::mail;
use chainnode_monitor::reconcile::Reconciler;
use chainnode_monitor::registry::Registry;
use chainnode_monitor::roster::Roster;
use chainnode_monitor::scheduler::{self, PollContext};
use chainnode_monitor::store::SledStore;

#[derive(Parser, Debug)]
#[command(name = "chainnode-monitor", version, about = "Chain node and delegate monitor")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, short, env = "MONITOR_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = std::env::var("MONITOR_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = MonitorConfig::load(cli.config.as_deref())?;
    info!(listen = %cfg.server.listen, data_dir = %cfg.server.data_dir.display(), "chainnode monitor starting up");

    let store = Arc::new(
        SledStore::open(&cfg.server.data_dir)
            .with_context(|| format!("failed to open store at {}", cfg.server.data_dir.display()))?,
    );
    let roster = Arc::new(Roster::new());
    let hub = Arc::new(EventHub::default());
    let clock = Arc::new(SystemClock);
    let reconciler = Reconciler::new(
        roster.clone(),
        store.clone(),
        hub.clone(),
        cfg.chain.genesis_ms(),
    );

    let mailer: Arc<dyn mail::Mailer> = Arc::from(mail::from_config(&cfg.mail)?);
    let watcher = Arc::new(StallWatcher::new(
        roster.clone(),
        store.clone(),
        hub.clone(),
        mailer,
        clock.clone(),
        cfg.alert.clone(),
    ));

    let registry = Registry::new(reconciler.clone(), watcher.clone());
    registry.load().context("failed to load persisted roster")?;

    let client = HttpChainClient::new(&cfg.chain).context("failed to build chain client")?;
    let ctx = PollContext {
        reconciler,
        client: Arc::new(client),
        clock,
        poll: cfg.monitor.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pollers = scheduler::spawn_all(ctx, shutdown_rx);
    if cfg.alert.enabled {
        watcher.start();
    }

    let app = http::router(ApiState { registry, hub });
    let listener = tokio::net::TcpListener::bind(&cfg.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.listen))?;
    info!(listen = %cfg.server.listen, "chainnode monitor listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
            }
        })
        .await
        .context("http server failed")?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    watcher.stop();
    for handle in pollers {
        let _ = handle.await;
    }
    store.flush()?;
    Ok(())
}
