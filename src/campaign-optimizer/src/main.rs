//! Campaign Optimizer: scheduled campaign analysis and recommendation engine.
//!
//! `serve` exposes the run trigger over HTTP for an external cron; `run`
//! and `analyze` execute a single batch or campaign from the command line.

use anyhow::Context;
use campaign_advisor::{ActionExecutor, RecommendationTypeRegistry};
use campaign_api::ApiServer;
use campaign_core::config::{AppConfig, StoreBackend};
use campaign_core::CampaignTracking;
use campaign_metrics::MetricsAggregator;
use campaign_scheduler::AnalysisOrchestrator;
use campaign_store::{AnalysisStore, MemoryStore, RedisStore};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Every workspace crate logs at info unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_FILTER: &str = "campaign_optimizer=info,campaign_scheduler=info,campaign_metrics=info,\
campaign_advisor=info,campaign_store=info,campaign_api=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "campaign-optimizer")]
#[command(about = "Scheduled campaign analysis and recommendation engine")]
#[command(version)]
struct Cli {
    /// Optional config file (TOML/YAML/JSON); environment variables win
    #[arg(long, env = "CAMPAIGN_OPTIMIZER_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "CAMPAIGN_OPTIMIZER__NODE_ID")]
    node_id: Option<String>,

    /// Storage backend (overrides config)
    #[arg(long, value_parser = ["memory", "redis"])]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP trigger and admin API
    Serve {
        /// HTTP port (overrides config)
        #[arg(long, env = "CAMPAIGN_OPTIMIZER__API__HTTP_PORT")]
        http_port: Option<u16>,
    },
    /// Analyze every campaign that is due now, then exit
    Run,
    /// Analyze one tracked campaign regardless of its schedule
    Analyze { campaign_id: String },
    /// Start tracking a campaign
    Track {
        campaign_id: String,
        campaign_name: String,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Serve { .. } => "serve",
            Command::Run => "run",
            Command::Analyze { .. } => "analyze",
            Command::Track { .. } => "track",
        }
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn AnalysisStore>> {
    let store: Arc<dyn AnalysisStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; state is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redis => Arc::new(
            RedisStore::connect(&config.redis)
                .await
                .context("connecting to redis store")?,
        ),
    };
    Ok(store)
}

fn build_orchestrator(config: &AppConfig, store: Arc<dyn AnalysisStore>) -> anyhow::Result<AnalysisOrchestrator> {
    let (aggregator, ad_platform) =
        MetricsAggregator::from_config(&config.sources).context("building metrics clients")?;

    let mut executor = ActionExecutor::new();
    match ad_platform {
        Some(client) => executor = executor.with_negative_keywords(client),
        None => warn!("No ad platform configured; automatic actions are disabled"),
    }

    let registry = RecommendationTypeRegistry::from_config(&config.registry);

    Ok(AnalysisOrchestrator::new(
        store,
        Arc::new(aggregator),
        Arc::new(registry),
        Arc::new(executor),
        config,
    ))
}

/// One-shot commands would act on a store that vanishes when the process
/// exits, so they need a shared backend.
fn ensure_durable_store(command: &Command, backend: StoreBackend) -> anyhow::Result<()> {
    match (command, backend) {
        (Command::Serve { .. }, _) | (_, StoreBackend::Redis) => Ok(()),
        (_, StoreBackend::Memory) => anyhow::bail!(
            "`{}` needs a persistent store; pass --store redis or set CAMPAIGN_OPTIMIZER__STORE__BACKEND=redis",
            command.name()
        ),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    match cli.store.as_deref() {
        Some("redis") => config.store.backend = StoreBackend::Redis,
        Some("memory") => config.store.backend = StoreBackend::Memory,
        _ => {}
    }

    info!(
        node_id = %config.node_id,
        store = ?config.store.backend,
        registry_version = %config.registry.version,
        "Configuration loaded"
    );

    ensure_durable_store(&cli.command, config.store.backend)?;
    let store = open_store(&config).await?;

    match cli.command {
        Command::Serve { http_port } => {
            if let Some(port) = http_port {
                config.api.http_port = port;
            }
            let orchestrator = Arc::new(build_orchestrator(&config, store.clone())?);
            let api_server = ApiServer::new(config.clone(), orchestrator, store);

            if let Err(e) = api_server.start_metrics().await {
                error!(error = %e, "Failed to start metrics exporter");
            }

            info!(http_port = config.api.http_port, "Campaign Optimizer is ready");
            api_server.start_http().await?;
        }
        Command::Run => {
            let orchestrator = build_orchestrator(&config, store)?;
            let report = orchestrator.run_due(Utc::now()).await?;
            print_json(&report)?;
        }
        Command::Analyze { campaign_id } => {
            let orchestrator = build_orchestrator(&config, store)?;
            let summary = orchestrator.analyze_campaign(&campaign_id, Utc::now()).await?;
            print_json(&summary)?;
        }
        Command::Track {
            campaign_id,
            campaign_name,
        } => {
            let tracking = store
                .track_campaign(CampaignTracking::new(campaign_id, campaign_name, Utc::now()))
                .await?;
            print_json(&tracking)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_filter_keeps_library_logs() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            warn!(target: "campaign_metrics::aggregator", "source line");
            info!(target: "campaign_advisor::gate", "gate line");
            info!(target: "campaign_store::redis_store", "store line");
            info!(target: "campaign_api::rest", "api line");
            warn!(target: "campaign_scheduler::orchestrator", "scheduler line");
            tracing::debug!(target: "campaign_advisor::gate", "debug line");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        for line in ["source line", "gate line", "store line", "api line", "scheduler line"] {
            assert!(output.contains(line), "missing {line:?} in {output}");
        }
        assert!(!output.contains("debug line"));
    }

    #[test]
    fn test_one_shot_commands_refuse_memory_store() {
        let track = Command::Track {
            campaign_id: "cmp-1".into(),
            campaign_name: "Brand".into(),
        };
        let err = ensure_durable_store(&track, StoreBackend::Memory).unwrap_err();
        assert!(err.to_string().contains("`track`"));
        assert!(ensure_durable_store(&Command::Run, StoreBackend::Memory).is_err());
        assert!(ensure_durable_store(&Command::Analyze { campaign_id: "cmp-1".into() }, StoreBackend::Memory).is_err());

        assert!(ensure_durable_store(&track, StoreBackend::Redis).is_ok());
        assert!(ensure_durable_store(&Command::Serve { http_port: None }, StoreBackend::Memory).is_ok());
    }
}
