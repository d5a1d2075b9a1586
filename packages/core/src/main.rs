use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use feed_harvester::api::{create_ops_router, OpsState};
use feed_harvester::cli::Cli;
use feed_harvester::config::{gate_interval, Config, SourceKind};
use feed_harvester::db;
use feed_harvester::error::AppError;
use feed_harvester::logging::init_logging;
use feed_harvester::metrics::HarvestMetrics;
use feed_harvester::repository::SqliteRecordStore;
use feed_harvester::scheduler::{harvest_once, run_harvester};
use feed_harvester::sources::endpoint::load_endpoints;
use feed_harvester::sources::{
    flight_track, radar_image, DataSource, FlightTrackSource, HttpTransport, RadarImageSource,
    Transport,
};
use feed_harvester::store::RecordStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run(Cli::parse()).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut config = match &cli.sources {
        Some(list) => SourceKind::parse_list(list).and_then(|kinds| Config::from_env_for(&kinds)),
        None => Config::from_env(),
    }
    .map_err(AppError::Config)?;

    if let Some(tick) = cli.tick_seconds {
        if tick == 0 {
            return Err(AppError::Config("--tick-seconds must be greater than zero".into()));
        }
        config.tick_seconds = tick;
    }
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    if let Some(addr) = &cli.ops_addr {
        config.ops_addr = Some(addr.clone());
    }
    Ok(config)
}

/// Build every configured source. Any configuration problem aborts startup.
fn build_sources(config: &Config) -> Result<Vec<Arc<dyn DataSource>>, AppError> {
    let timeout = Duration::from_secs(config.request_timeout_seconds);
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(timeout, config.http_proxy.as_deref())
            .map_err(|err| AppError::Config(format!("HTTP client: {}", err)))?,
    );

    let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();

    if let Some(track) = &config.flight_track {
        let endpoints = load_endpoints(flight_track::NAME, &track.endpoints_path)?;
        let min_interval = gate_interval(flight_track::NAME, track.min_interval_seconds)
            .map_err(AppError::Config)?;
        let source = FlightTrackSource::new(
            track.credentials.clone(),
            endpoints,
            transport.clone(),
            timeout,
        )?
        .with_min_interval(min_interval);
        sources.push(Arc::new(source));
    }

    if let Some(radar) = &config.radar_image {
        let endpoints = load_endpoints(radar_image::NAME, &radar.endpoints_path)?;
        let min_interval = gate_interval(radar_image::NAME, radar.min_interval_seconds)
            .map_err(AppError::Config)?;
        let source = RadarImageSource::new(
            radar.credentials.clone(),
            endpoints,
            transport.clone(),
            timeout,
        )?
        .with_min_interval(min_interval);
        sources.push(Arc::new(source));
    }

    for source in &sources {
        tracing::info!("Source enabled: {} ({})", source.name(), source.record_kind().as_str());
    }
    Ok(sources)
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;
    tracing::info!(
        "Harvester configured: tick {}s, request timeout {}s, database {}",
        config.tick_seconds,
        config.request_timeout_seconds,
        config.database_url
    );

    let sources = build_sources(&config)?;
    let pool = db::create_pool(&config.database_url).await?;
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool));
    let metrics = Arc::new(
        HarvestMetrics::new().map_err(|err| AppError::Server(format!("metrics: {}", err)))?,
    );

    if cli.once {
        let summary = harvest_once(&sources, &store, &metrics, chrono::Utc::now()).await;
        tracing::info!(?summary, "Single harvest pass finished");
        return Ok(());
    }

    if let Some(addr) = &config.ops_addr {
        let router = create_ops_router(OpsState {
            sources: Arc::new(sources.clone()),
            metrics: metrics.clone(),
        });
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| AppError::Server(format!("bind {}: {}", addr, err)))?;
        tracing::info!("Ops endpoint listening on {}", addr);

        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!("Ops endpoint stopped: {}", err);
            }
        });
    }

    run_harvester(
        sources,
        store,
        metrics,
        Duration::from_secs(config.tick_seconds),
    )
    .await;

    Ok(())
}
