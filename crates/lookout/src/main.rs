mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::LookoutConfig;
use lookout_agent::{HttpAgentClient, StaticAgentRegistry};
use lookout_apiserver::{ApiServer, AppState, Config as ApiConfig};
use lookout_storage::Store;
use lookout_watcher::{
    BroadcastNotifier, EventIngestor, HttpJobExecutor, InMemoryJobExecutor, JobExecutor,
    StaticCatalog, WatcherService,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "lookout", about = "Lookout Kubernetes Event Watcher Control Plane")]
struct Cli {
    /// Log output format
    #[arg(
        long,
        env = "LOOKOUT_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        global = true
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Address to listen on
        #[arg(long, env = "LOOKOUT_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Directory holding the redb database
        #[arg(long, env = "LOOKOUT_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
        /// YAML file with clusters, job catalog and executor URL
        #[arg(long, env = "LOOKOUT_CONFIG", default_value = "./lookout.yaml")]
        config: PathBuf,
        /// Per-call timeout for agent and executor requests
        #[arg(long, env = "LOOKOUT_AGENT_TIMEOUT_SECS", default_value_t = 5)]
        agent_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    match cli.command {
        Commands::Serve {
            bind,
            data_dir,
            config,
            agent_timeout_secs,
        } => run_serve(&bind, &data_dir, &config, Duration::from_secs(agent_timeout_secs)).await,
    }
}

/// Run the API server until Ctrl-C
async fn run_serve(
    bind: &str,
    data_dir: &Path,
    config_path: &Path,
    timeout: Duration,
) -> miette::Result<()> {
    info!("Starting lookout API server");

    let listen_addr: std::net::SocketAddr = bind
        .parse()
        .map_err(|e| miette::miette!("Invalid bind address '{}': {}", bind, e))?;
    let config = LookoutConfig::load(config_path)?;

    let token = CancellationToken::new();
    let notifier = Arc::new(BroadcastNotifier::default());
    let state = create_app_state(data_dir, config, timeout, notifier.clone())?;
    let broadcasts = state.service.broadcast_tasks();

    // 1. Spawn API server
    let api_server = ApiServer::new(ApiConfig { listen_addr }, state);
    let api_token = token.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_token).await {
            error!("API server error: {}", e);
        }
    });

    // 2. Spawn notification logger
    let notify_token = token.clone();
    let notify_handle = tokio::spawn(log_notifications(notifier, notify_token));

    info!("All components started. API server on {}", bind);

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    // Wait for all tasks, including agent broadcasts in flight, with a timeout
    broadcasts.close();
    let shutdown_timeout = Duration::from_secs(5);
    let finished = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(api_handle, notify_handle);
        broadcasts.wait().await;
    })
    .await;
    if finished.is_err() {
        warn!(
            "Shutdown timed out with {} agent broadcasts still running",
            broadcasts.len()
        );
    }

    info!("Shutdown complete");

    Ok(())
}

/// Log every execution notification until shutdown
async fn log_notifications(notifier: Arc<BroadcastNotifier>, token: CancellationToken) {
    let mut rx = notifier.subscribe();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            received = rx.recv() => match received {
                Ok(n) => debug!(
                    watcher_id = n.watcher_id,
                    cluster_id = n.cluster_id,
                    action = %n.action,
                    "Execution {} is {}",
                    n.intercepted_event_id,
                    n.status.as_str()
                ),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Notification log lagged by {} entries", missed)
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Create the shared application state
fn create_app_state(
    data_dir: &Path,
    config: LookoutConfig,
    timeout: Duration,
    notifier: Arc<BroadcastNotifier>,
) -> miette::Result<Arc<AppState>> {
    std::fs::create_dir_all(data_dir).map_err(|e| {
        miette::miette!("Failed to create data dir '{}': {}", data_dir.display(), e)
    })?;
    let db_path = data_dir.join("lookout.redb");
    let store = Store::open(&db_path)
        .map_err(|e| miette::miette!("Failed to open storage at '{}': {}", db_path.display(), e))?;

    let registry = Arc::new(StaticAgentRegistry::new(config.clusters)?);
    let catalog = Arc::new(StaticCatalog::new(config.catalog)?);

    let executor: Arc<dyn JobExecutor> = match config.executor_url.as_deref() {
        Some(url) => {
            info!("Using executor at {}", url);
            Arc::new(HttpJobExecutor::new(url, timeout))
        }
        None => {
            info!("No executor configured, job runs stay in memory");
            Arc::new(InMemoryJobExecutor::new())
        }
    };

    let service = WatcherService::new(
        store.clone(),
        registry,
        Arc::new(HttpAgentClient::new(timeout)),
        catalog,
        executor.clone(),
    );
    let ingestor = EventIngestor::new(store, executor, notifier);

    Ok(Arc::new(AppState::new(Arc::new(service), Arc::new(ingestor))))
}
