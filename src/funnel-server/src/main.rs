//! Funnel attribution server.
//!
//! Collects visitor telemetry, attributes sales to visitors, and forwards
//! matched purchases to the conversions API.

use clap::Parser;
use funnel_api::{ApiServer, AppState};
use funnel_attribution::AttributionEngine;
use funnel_capi::CapiClient;
use funnel_core::config::AppConfig;
use funnel_core::event_bus::tracing_sink;
use funnel_core::VisitorRepository;
use funnel_pipeline::{SaleProcessor, SalesPoller};
use funnel_sales::HotmartSalesFeed;
use funnel_tracking::{InMemoryVisitorStore, RetentionPolicy, VisitorCollector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "funnel-server")]
#[command(about = "Sale-to-visitor attribution and conversion forwarding")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "FUNNEL__NODE_ID")]
    node_id: Option<String>,

    /// Bind address (overrides config)
    #[arg(long, env = "FUNNEL__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "FUNNEL__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "FUNNEL__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Disable the periodic sales-history poll
    #[arg(long, default_value_t = false)]
    no_poll: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "funnel_server=info,funnel_tracking=info,funnel_sales=info,\
                     funnel_attribution=info,funnel_capi=info,funnel_pipeline=info,\
                     funnel_api=info,tower_http=info"
                        .into()
                }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Funnel server starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if cli.no_poll {
        config.sales.poll_enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        retention_hours = config.retention.horizon_hours,
        poll_enabled = config.sales.poll_enabled,
        capi_configured = config.capi.token_configured(),
        "Configuration loaded"
    );

    let events = tracing_sink(config.node_id.clone());

    // Visitor pool and retention
    let store: Arc<dyn VisitorRepository> = Arc::new(InMemoryVisitorStore::new());
    let retention = RetentionPolicy::from_config(&config.retention).with_event_sink(events.clone());
    let mut collector = VisitorCollector::new(store.clone()).with_event_sink(events.clone());
    if config.retention.sweep_on_ingest {
        collector = collector.with_retention(retention.clone());
    }
    let collector = Arc::new(collector);
    retention.spawn_sweeper(
        store.clone(),
        Duration::from_secs(config.retention.sweep_interval_secs),
    );

    // Attribution and delivery
    let engine = Arc::new(
        AttributionEngine::new(&config.matcher, store).with_event_sink(events.clone()),
    );
    let capi = Arc::new(CapiClient::new(config.capi.clone())?.with_event_sink(events.clone()));
    let processor = Arc::new(
        SaleProcessor::new(engine)
            .with_conversion_sink(capi.clone())
            .with_event_sink(events),
    );

    let poller = match HotmartSalesFeed::from_config(&config.sales) {
        Ok(feed) => Some(Arc::new(SalesPoller::new(
            Arc::new(feed),
            processor.clone(),
            &config.sales,
        ))),
        Err(e) => {
            error!(error = %e, "Failed to build sales feed, polling disabled");
            None
        }
    };
    if let (Some(poller), true) = (&poller, config.sales.poll_enabled) {
        poller
            .clone()
            .spawn(Duration::from_secs(config.sales.poll_interval_secs));
        info!(
            interval_secs = config.sales.poll_interval_secs,
            "Sales poller started"
        );
    }

    let state = AppState {
        collector,
        processor,
        poller,
        capi,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config, state);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Funnel server is ready to serve traffic");

    // Blocks until shutdown
    api_server.start_http().await?;

    Ok(())
}
