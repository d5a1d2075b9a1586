//! Harvester loop.
//!
//! Drives every configured data source on a fixed tick: each tick calls
//! `collect` on all sources concurrently, transforms every payload as soon
//! as it arrives and persists the resulting batch. Each source's polling
//! gate decides whether a tick actually reaches its provider, so the tick
//! only needs to be at least as frequent as the fastest source.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;

use crate::metrics::HarvestMetrics;
use crate::sources::{CollectOutcome, DataSource, FetchResult};
use crate::store::RecordStore;

/// Counters for one harvest pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestSummary {
    pub sources_skipped: usize,
    pub payloads_received: usize,
    pub fetch_errors: usize,
    pub records_saved: usize,
    pub duplicates_dropped: usize,
    pub persist_errors: usize,
}

impl HarvestSummary {
    fn merge(&mut self, other: HarvestSummary) {
        self.sources_skipped += other.sources_skipped;
        self.payloads_received += other.payloads_received;
        self.fetch_errors += other.fetch_errors;
        self.records_saved += other.records_saved;
        self.duplicates_dropped += other.duplicates_dropped;
        self.persist_errors += other.persist_errors;
    }
}

/// Run the harvest loop until `Ctrl+C` (SIGINT) is received.
pub async fn run_harvester(
    sources: Vec<Arc<dyn DataSource>>,
    store: Arc<dyn RecordStore>,
    metrics: Arc<HarvestMetrics>,
    tick: Duration,
) {
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    tracing::info!(
        "Harvester started ({} source(s), tick: {}s)",
        sources.len(),
        tick.as_secs()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let summary = harvest_once(&sources, &store, &metrics, Utc::now()).await;
                tracing::debug!(?summary, "Harvest pass finished");
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping harvester.");
                break;
            }
        }
    }

    tracing::info!("Harvester stopped cleanly");
}

/// One pass over every source. Sources run concurrently; a failing or slow
/// source never blocks the others, and no error escapes this function.
pub async fn harvest_once(
    sources: &[Arc<dyn DataSource>],
    store: &Arc<dyn RecordStore>,
    metrics: &Arc<HarvestMetrics>,
    now: DateTime<Utc>,
) -> HarvestSummary {
    let mut cycles = JoinSet::new();
    for source in sources {
        cycles.spawn(run_source_cycle(
            source.clone(),
            store.clone(),
            metrics.clone(),
            now,
        ));
    }

    let mut summary = HarvestSummary::default();
    while let Some(joined) = cycles.join_next().await {
        match joined {
            Ok(cycle) => summary.merge(cycle),
            Err(err) => tracing::error!("Source cycle task failed: {}", err),
        }
    }
    summary
}

/// Collect from one source and process results while they stream in.
async fn run_source_cycle(
    source: Arc<dyn DataSource>,
    store: Arc<dyn RecordStore>,
    metrics: Arc<HarvestMetrics>,
    now: DateTime<Utc>,
) -> HarvestSummary {
    let (tx, mut rx) = mpsc::unbounded_channel::<FetchResult>();
    let name = source.name().to_string();

    let consume = async {
        let mut summary = HarvestSummary::default();
        while let Some(result) = rx.recv().await {
            summary.merge(process_result(source.as_ref(), store.as_ref(), &metrics, result).await);
        }
        summary
    };

    let (outcome, mut summary) = tokio::join!(source.collect(now, tx), consume);

    match outcome {
        CollectOutcome::Skipped => {
            metrics.collects_skipped_total.with_label_values(&[name.as_str()]).inc();
            summary.sources_skipped += 1;
            tracing::debug!("{} skipped: polled too recently", name);
        }
        CollectOutcome::Completed { dispatched } => {
            metrics.collects_total.with_label_values(&[name.as_str()]).inc();
            tracing::info!(
                "{} cycle done: {} request(s), {} payload(s), {} error(s), {} record(s) saved",
                name,
                dispatched,
                summary.payloads_received,
                summary.fetch_errors,
                summary.records_saved
            );
        }
    }

    summary
}

/// Transform and persist one endpoint result, logging any failure.
async fn process_result(
    source: &dyn DataSource,
    store: &dyn RecordStore,
    metrics: &HarvestMetrics,
    result: FetchResult,
) -> HarvestSummary {
    let mut summary = HarvestSummary::default();
    let name = source.name();

    let payload = match result.outcome {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(
                source = name,
                site = %result.site_id,
                url = %result.url,
                kind = err.kind(),
                "Fetch failed: {}",
                err
            );
            metrics
                .fetch_errors_total
                .with_label_values(&[name, err.kind()])
                .inc();
            summary.fetch_errors += 1;
            return summary;
        }
    };
    summary.payloads_received += 1;

    let batch = match source.transform(payload).await {
        Ok(batch) => batch,
        Err(err) => {
            tracing::error!(source = name, site = %result.site_id, "Transform failed: {}", err);
            metrics
                .fetch_errors_total
                .with_label_values(&[name, err.kind()])
                .inc();
            summary.fetch_errors += 1;
            return summary;
        }
    };

    match source.persist(store, batch).await {
        Ok(persisted) => {
            metrics
                .records_persisted_total
                .with_label_values(&[name])
                .inc_by(persisted.saved as f64);
            metrics
                .duplicates_dropped_total
                .inc_by(persisted.duplicates_dropped as f64);
            summary.records_saved += persisted.saved;
            summary.duplicates_dropped += persisted.duplicates_dropped;
        }
        Err(err) => {
            tracing::error!(source = name, site = %result.site_id, "Persist failed: {}", err);
            metrics.persist_errors_total.inc();
            summary.persist_errors += 1;
        }
    }

    summary
}
