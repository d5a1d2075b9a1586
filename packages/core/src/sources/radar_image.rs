//! WeatherZone radar image adapter.
//!
//! Each endpoint is a WMS `GetMap` URL for one location. The response body
//! is a PNG that is stored as-is, so there is no field mapping and no
//! identity key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::sources::endpoint::{validate_endpoints, EndpointDescriptor};
use crate::sources::error::{ConfigError, SourceError, SourceResult};
use crate::sources::gate::PollingGate;
use crate::sources::transport::{dispatch, Dispatch, RequestTemplate, Transport, TransportResponse};
use crate::sources::{
    deliver, CanonicalRecord, CollectOutcome, DataSource, FetchResult, ImageArtifact, RawPayload,
    RecordBatch, RecordBody, RecordKind, ResultSink,
};

pub const NAME: &str = "WeatherZone Radar Image";

pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 5 * 60;

const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone)]
pub struct RadarImageCredentials {
    pub user: String,
    pub pass: String,
}

pub struct RadarImageSource {
    endpoints: Vec<EndpointDescriptor>,
    template: Arc<RequestTemplate>,
    transport: Arc<dyn Transport>,
    gate: PollingGate,
}

impl RadarImageSource {
    pub fn new(
        credentials: RadarImageCredentials,
        endpoints: Vec<EndpointDescriptor>,
        transport: Arc<dyn Transport>,
        timeout: std::time::Duration,
    ) -> Result<Self, ConfigError> {
        if credentials.user.trim().is_empty() || credentials.pass.trim().is_empty() {
            return Err(ConfigError::MissingCredentials {
                source_name: NAME.to_string(),
            });
        }
        validate_endpoints(NAME, &endpoints)?;

        let template = RequestTemplate::default()
            .query("service", "WMS")
            .query("version", "1.1.0")
            .query("request", "GetMap")
            .query("width", "1024")
            .query("height", "1024")
            .query("srs", "EPSG:4326")
            .query("format", DEFAULT_CONTENT_TYPE)
            .basic_auth(credentials.user, credentials.pass)
            .accept_status(304)
            .timeout(timeout);

        Ok(Self {
            endpoints,
            template: Arc::new(template),
            transport,
            gate: PollingGate::new(Duration::seconds(DEFAULT_MIN_INTERVAL_SECS)),
        })
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.gate = PollingGate::new(min_interval);
        self
    }

    pub fn gate(&self) -> &PollingGate {
        &self.gate
    }

    fn interpret_response(
        &self,
        endpoint: &EndpointDescriptor,
        response: TransportResponse,
    ) -> SourceResult<RawPayload> {
        tracing::debug!("{} responded {} for {}", endpoint.url, response.status, endpoint.site_id);

        if !(response.status == 200 || self.template.accept_status.contains(&response.status)) {
            return Err(SourceError::Status {
                status: response.status,
            });
        }

        Ok(RawPayload::Image(ImageArtifact {
            site_id: endpoint.site_id.clone(),
            content_type: response
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            tags: endpoint.tags.clone(),
            data: response.body,
        }))
    }
}

#[async_trait]
impl DataSource for RadarImageSource {
    fn name(&self) -> &str {
        NAME
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Image
    }

    fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.gate.last_run_at()
    }

    async fn collect(&self, now: DateTime<Utc>, sink: ResultSink) -> CollectOutcome {
        let outcome = dispatch(
            self.transport.clone(),
            &self.endpoints,
            self.template.clone(),
            || self.gate.should_run(now),
            |endpoint, result| {
                let outcome = result.and_then(|response| self.interpret_response(endpoint, response));
                deliver(
                    &sink,
                    FetchResult {
                        source: NAME.to_string(),
                        site_id: endpoint.site_id.clone(),
                        url: endpoint.url.clone(),
                        outcome,
                    },
                );
            },
        )
        .await;

        match outcome {
            Dispatch::Denied => CollectOutcome::Skipped,
            Dispatch::Completed { requests } => CollectOutcome::Completed {
                dispatched: requests,
            },
        }
    }

    /// Pass-through: the artifact becomes a single-record batch.
    async fn transform(&self, payload: RawPayload) -> SourceResult<RecordBatch> {
        // Completion is never synchronous, whatever the adapter.
        tokio::task::yield_now().await;

        let artifact = match payload {
            RawPayload::Image(artifact) => artifact,
            RawPayload::Json { .. } => {
                return Err(SourceError::mapping("json payload given to an image source"))
            }
        };

        let record = CanonicalRecord {
            identity_key: None,
            site_id: artifact.site_id.clone(),
            collected_at: Utc::now(),
            body: RecordBody::Image(artifact),
        };
        Ok(RecordBatch::new(RecordKind::Image, vec![record]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::transport::mock::MockTransport;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    fn credentials() -> RadarImageCredentials {
        RadarImageCredentials {
            user: "user".into(),
            pass: "pass".into(),
        }
    }

    fn source(transport: MockTransport, endpoints: Vec<EndpointDescriptor>) -> RadarImageSource {
        RadarImageSource::new(credentials(), endpoints, Arc::new(transport), TIMEOUT).unwrap()
    }

    async fn collect_all(source: &RadarImageSource) -> (CollectOutcome, Vec<FetchResult>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = source.collect(Utc::now(), tx).await;
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        (outcome, results)
    }

    #[test]
    fn missing_credentials_refuse_construction() {
        let result = RadarImageSource::new(
            RadarImageCredentials {
                user: "user".into(),
                pass: " ".into(),
            },
            vec![EndpointDescriptor::new("https://wms.test", "SYD")],
            Arc::new(MockTransport::new()),
            TIMEOUT,
        );
        assert!(matches!(result, Err(ConfigError::MissingCredentials { .. })));
    }

    #[tokio::test]
    async fn image_payload_carries_site_and_tags() {
        let transport = MockTransport::new().with_bytes("https://wms.test", 200, "image/png", PNG);
        let endpoint = EndpointDescriptor::new("https://wms.test", "SYD").with_tag("weather", "radar");
        let source = source(transport, vec![endpoint]);

        let (outcome, results) = collect_all(&source).await;

        assert_eq!(outcome, CollectOutcome::Completed { dispatched: 1 });
        match results[0].outcome.as_ref().unwrap() {
            RawPayload::Image(artifact) => {
                assert_eq!(artifact.site_id, "SYD");
                assert_eq!(artifact.data, PNG);
                assert_eq!(artifact.tags.get("weather").map(String::as_str), Some("radar"));
                assert_eq!(artifact.file_name(), "SYD.png");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_modified_is_accepted() {
        let transport = MockTransport::new().with_bytes("https://wms.test", 304, "image/png", b"");
        let source = source(transport, vec![EndpointDescriptor::new("https://wms.test", "SYD")]);

        let (_, results) = collect_all(&source).await;

        assert!(results[0].outcome.is_ok());
    }

    #[tokio::test]
    async fn unexpected_status_is_a_transport_level_error() {
        let transport =
            MockTransport::new().with_bytes("https://wms.test", 401, "text/plain", b"denied");
        let source = source(transport, vec![EndpointDescriptor::new("https://wms.test", "SYD")]);

        let (_, results) = collect_all(&source).await;

        let err = results[0].outcome.as_ref().unwrap_err();
        assert_eq!(err, &SourceError::Status { status: 401 });
        assert_eq!(err.to_string(), "Data source responded with status code 401");
    }

    #[tokio::test]
    async fn disabled_endpoints_are_never_requested() {
        let transport = Arc::new(MockTransport::new());
        let source = RadarImageSource::new(
            credentials(),
            vec![EndpointDescriptor::new("https://wms.test", "SYD").disabled()],
            transport.clone(),
            TIMEOUT,
        )
        .unwrap();

        let (outcome, results) = collect_all(&source).await;

        assert_eq!(outcome, CollectOutcome::Completed { dispatched: 0 });
        assert!(results.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn transform_wraps_artifact_in_single_record_batch() {
        let source = source(
            MockTransport::new(),
            vec![EndpointDescriptor::new("https://wms.test", "SYD")],
        );
        let artifact = ImageArtifact {
            site_id: "SYD".into(),
            content_type: "image/png".into(),
            tags: Default::default(),
            data: PNG.to_vec(),
        };

        let batch = source
            .transform(RawPayload::Image(artifact.clone()))
            .await
            .unwrap();

        assert_eq!(batch.kind, RecordKind::Image);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].site_id, "SYD");
        assert!(batch.records[0].identity_key.is_none());
        assert_eq!(batch.records[0].body, RecordBody::Image(artifact));
    }

    #[tokio::test]
    async fn persist_keeps_every_image() {
        let source = source(
            MockTransport::new(),
            vec![EndpointDescriptor::new("https://wms.test", "SYD")],
        );
        let make = || CanonicalRecord {
            identity_key: None,
            site_id: "SYD".into(),
            collected_at: Utc::now(),
            body: RecordBody::Image(ImageArtifact {
                site_id: "SYD".into(),
                content_type: "image/png".into(),
                tags: Default::default(),
                data: PNG.to_vec(),
            }),
        };
        let store = MemoryStore::new(10);

        let summary = source
            .persist(&store, RecordBatch::new(RecordKind::Image, vec![make(), make()]))
            .await
            .unwrap();

        assert_eq!(summary.saved, 2);
        assert_eq!(summary.duplicates_dropped, 0);
        assert_eq!(store.records(RecordKind::Image).await.len(), 2);
    }
}
