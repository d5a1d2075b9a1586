//! Data sources.
//!
//! A data source binds one external provider (its endpoint list, credentials
//! and response shape) to a uniform contract the harvester drives:
//!
//! 1. [`DataSource::collect`] checks the source's [`PollingGate`] and, when
//!    permitted, fetches every enabled endpoint, pushing one [`FetchResult`]
//!    per endpoint into the result sink as soon as it arrives.
//! 2. [`DataSource::transform`] turns one raw payload into a [`RecordBatch`].
//! 3. [`DataSource::persist`] deduplicates the batch and hands it to a
//!    [`RecordStore`].
//!
//! Adding a provider means implementing [`DataSource`]; the harvester loop
//! is provider-agnostic.

pub mod dedupe;
pub mod endpoint;
pub mod error;
pub mod flight_track;
pub mod gate;
pub mod mapper;
pub mod radar_image;
pub mod transport;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::store::RecordStore;

pub use dedupe::{dedupe, Identified};
pub use endpoint::EndpointDescriptor;
pub use error::{ConfigError, SourceError, SourceResult, StoreError};
pub use flight_track::{FlightTrackCredentials, FlightTrackSource};
pub use gate::PollingGate;
pub use radar_image::{RadarImageCredentials, RadarImageSource};
pub use transport::{HttpTransport, RequestTemplate, Transport, TransportResponse};

/// Which backing collection a batch belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Position,
    Image,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Position => "position",
            RecordKind::Image => "image",
        }
    }

    /// Whether records of this kind carry a meaningful identity key.
    pub fn has_identity(&self) -> bool {
        matches!(self, RecordKind::Position)
    }
}

/// Binary artifact fetched from an image-style feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub site_id: String,
    pub content_type: String,
    pub tags: HashMap<String, String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ImageArtifact {
    /// File name under which the artifact is stored, e.g. `SYD.png`.
    pub fn file_name(&self) -> String {
        let ext = match self.content_type.split(';').next().map(str::trim) {
            Some("image/png") => "png",
            Some("image/jpeg") => "jpg",
            Some("image/gif") => "gif",
            _ => "bin",
        };
        format!("{}.{}", self.site_id, ext)
    }
}

/// Provider payload for one endpoint, already attributed to its site.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Json { site_id: String, body: Value },
    Image(ImageArtifact),
}

impl RawPayload {
    pub fn site_id(&self) -> &str {
        match self {
            RawPayload::Json { site_id, .. } => site_id,
            RawPayload::Image(artifact) => &artifact.site_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RecordBody {
    Fields(Map<String, Value>),
    Image(ImageArtifact),
}

/// Provider-independent record handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub identity_key: Option<String>,
    pub site_id: String,
    pub collected_at: DateTime<Utc>,
    pub body: RecordBody,
}

impl Identified for CanonicalRecord {
    fn identity_key(&self) -> Option<&str> {
        self.identity_key.as_deref()
    }
}

/// Output of one `transform` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub kind: RecordKind,
    pub records: Vec<CanonicalRecord>,
}

impl RecordBatch {
    pub fn new(kind: RecordKind, records: Vec<CanonicalRecord>) -> Self {
        Self { kind, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One endpoint's result: either an attributed payload or the normalized error.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub source: String,
    pub site_id: String,
    pub url: String,
    pub outcome: SourceResult<RawPayload>,
}

/// Channel that receives per-endpoint results from `collect`.
pub type ResultSink = mpsc::UnboundedSender<FetchResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Too soon since the last permitted run. Not an error.
    Skipped,
    /// Every dispatched request has delivered its result to the sink.
    Completed { dispatched: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub saved: usize,
    pub duplicates_dropped: usize,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Human-readable provider name, used in logs and metric labels.
    fn name(&self) -> &str;

    fn record_kind(&self) -> RecordKind;

    /// When the polling gate last permitted a collect cycle.
    fn last_run_at(&self) -> Option<DateTime<Utc>>;

    /// Fetch every enabled endpoint if the polling gate allows it at `now`.
    ///
    /// Results go to `sink`, one per endpoint, in arrival order. Errors are
    /// delivered there too; this method itself never fails.
    async fn collect(&self, now: DateTime<Utc>, sink: ResultSink) -> CollectOutcome;

    /// Turn one payload into canonical records.
    async fn transform(&self, payload: RawPayload) -> SourceResult<RecordBatch>;

    /// Deduplicate `batch` (for kinds with an identity key) and save it.
    async fn persist(
        &self,
        store: &dyn RecordStore,
        batch: RecordBatch,
    ) -> Result<PersistSummary, StoreError> {
        let kind = batch.kind;
        let (records, duplicates_dropped) = if kind.has_identity() {
            dedupe(batch.records)
        } else {
            (batch.records, 0)
        };

        tracing::info!("{} saving {} {} record(s)", self.name(), records.len(), kind.as_str());

        let saved = records.len();
        store.save(kind, records).await?;
        Ok(PersistSummary {
            saved,
            duplicates_dropped,
        })
    }
}

/// Push a result into the sink, tolerating a receiver that has gone away.
pub(crate) fn deliver(sink: &ResultSink, result: FetchResult) {
    if sink.send(result).is_err() {
        tracing::debug!("Result receiver dropped; discarding fetch result");
    }
}
