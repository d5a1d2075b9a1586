//! FlightStats aircraft track adapter.
//!
//! Polls the FlightStats flight-track-by-airport API for every configured
//! airport and maps each `flightPositions` entry to a position record keyed
//! by flight code (carrier code + flight number).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::sources::endpoint::{validate_endpoints, EndpointDescriptor};
use crate::sources::error::{ConfigError, SourceError, SourceResult};
use crate::sources::gate::PollingGate;
use crate::sources::mapper::{FieldMap, FieldRule, Mapper, PointerMapper};
use crate::sources::transport::{dispatch, Dispatch, RequestTemplate, Transport, TransportResponse};
use crate::sources::{
    deliver, CanonicalRecord, CollectOutcome, DataSource, FetchResult, RawPayload, RecordBatch,
    RecordBody, RecordKind, ResultSink,
};

pub const NAME: &str = "FlightStats Aircraft Track";

/// Minimum time between two polls of the track API.
pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 30;

/// Canonical field used as the record identity key.
pub const IDENTITY_FIELD: &str = "fcode";

const DATA_FIELD: &str = "flightPositions";

/// FlightStats position entry → canonical position fields.
pub const FIELD_MAP: FieldMap = &[
    (IDENTITY_FIELD, FieldRule::Join(&["/carrierFsCode", "/flightNumber"])),
    ("flight_id", FieldRule::Path("/flightId")),
    ("callsign", FieldRule::Path("/callsign")),
    ("carrier", FieldRule::Path("/carrierFsCode")),
    ("flight_number", FieldRule::Path("/flightNumber")),
    ("origin", FieldRule::Path("/departureAirportFsCode")),
    ("destination", FieldRule::Path("/arrivalAirportFsCode")),
    ("heading", FieldRule::Path("/heading")),
    ("source", FieldRule::Path("/source")),
    ("latitude", FieldRule::Path("/positions/0/lat")),
    ("longitude", FieldRule::Path("/positions/0/lon")),
    ("altitude_ft", FieldRule::Path("/positions/0/altitudeFt")),
    ("speed_mph", FieldRule::Path("/positions/0/speedMph")),
    ("position_at", FieldRule::Path("/positions/0/date")),
];

#[derive(Debug, Clone)]
pub struct FlightTrackCredentials {
    pub app_id: String,
    pub app_key: String,
}

pub struct FlightTrackSource {
    endpoints: Vec<EndpointDescriptor>,
    template: Arc<RequestTemplate>,
    transport: Arc<dyn Transport>,
    mapper: Box<dyn Mapper>,
    gate: PollingGate,
}

impl FlightTrackSource {
    /// Build the adapter. Missing credentials or an unusable endpoint list
    /// are fatal: the source refuses to exist rather than run degraded.
    pub fn new(
        credentials: FlightTrackCredentials,
        endpoints: Vec<EndpointDescriptor>,
        transport: Arc<dyn Transport>,
        timeout: std::time::Duration,
    ) -> Result<Self, ConfigError> {
        if credentials.app_id.trim().is_empty() || credentials.app_key.trim().is_empty() {
            return Err(ConfigError::MissingCredentials {
                source_name: NAME.to_string(),
            });
        }
        validate_endpoints(NAME, &endpoints)?;

        let template = RequestTemplate::default()
            .query("appId", credentials.app_id)
            .query("appKey", credentials.app_key)
            .header("Accept", "application/json")
            .timeout(timeout);

        Ok(Self {
            endpoints,
            template: Arc::new(template),
            transport,
            mapper: Box::new(PointerMapper),
            gate: PollingGate::new(Duration::seconds(DEFAULT_MIN_INTERVAL_SECS)),
        })
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.gate = PollingGate::new(min_interval);
        self
    }

    pub fn with_mapper(mut self, mapper: Box<dyn Mapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn gate(&self) -> &PollingGate {
        &self.gate
    }
}

/// Promote body-level errors to the error channel and attach the site id.
///
/// FlightStats reports many failures as a 200 response whose body carries an
/// `error` object, so the body is inspected before the status code.
pub(crate) fn interpret_response(
    endpoint: &EndpointDescriptor,
    response: TransportResponse,
) -> SourceResult<RawPayload> {
    let mut body = match response.json() {
        Ok(body) => body,
        Err(_) if !response.is_success() => {
            return Err(SourceError::Status {
                status: response.status,
            })
        }
        Err(err) => return Err(err),
    };

    let provider_error = body.get("error").and_then(provider_error_message);
    if let Some(message) = &provider_error {
        tracing::warn!(
            "{} reported an error for {} ({}): {}",
            NAME,
            endpoint.site_id,
            endpoint.url,
            message
        );
    }

    let positions = body.get(DATA_FIELD).and_then(Value::as_array).map(Vec::len);
    match (positions, provider_error) {
        (_, Some(message)) => Err(SourceError::provider(message)),
        (Some(count), None) => {
            tracing::info!("Collected [{}] track entries for {}", count, endpoint.site_id);
            if let Value::Object(fields) = &mut body {
                fields.insert("siteId".to_string(), Value::String(endpoint.site_id.clone()));
            }
            Ok(RawPayload::Json {
                site_id: endpoint.site_id.clone(),
                body,
            })
        }
        (None, None) if !response.is_success() => Err(SourceError::Status {
            status: response.status,
        }),
        (None, None) => {
            tracing::warn!(
                "Did not collect data from {} ({}): {}",
                endpoint.site_id,
                endpoint.url,
                response.body_preview(256)
            );
            Err(SourceError::no_data())
        }
    }
}

/// Extract a readable message from an `error` field, which may be a plain
/// string or an object with an `errorMessage`. Falsy markers (`null`,
/// `false`, `""`, `0`) mean no error; empty arrays and objects still count.
fn provider_error_message(error: &Value) -> Option<String> {
    match error {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(fields) => Some(
            fields
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl DataSource for FlightTrackSource {
    fn name(&self) -> &str {
        NAME
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Position
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
                let outcome = result.and_then(|response| interpret_response(endpoint, response));
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

    async fn transform(&self, payload: RawPayload) -> SourceResult<RecordBatch> {
        let (site_id, body) = match payload {
            RawPayload::Json { site_id, body } => (site_id, body),
            RawPayload::Image(_) => {
                return Err(SourceError::mapping("image payload given to a position source"))
            }
        };

        let positions = body
            .get(DATA_FIELD)
            .and_then(Value::as_array)
            .ok_or_else(SourceError::no_data)?;

        let site = Value::String(site_id.clone());
        let mut stamp_site = |record: &mut Map<String, Value>| {
            record.insert("site_id".to_string(), site.clone());
        };
        let mapped = self
            .mapper
            .map(positions, FIELD_MAP, None, Some(&mut stamp_site));

        let collected_at = Utc::now();
        let records = mapped
            .into_iter()
            .map(|fields| CanonicalRecord {
                identity_key: fields
                    .get(IDENTITY_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                site_id: site_id.clone(),
                collected_at,
                body: RecordBody::Fields(fields),
            })
            .collect();

        Ok(RecordBatch::new(RecordKind::Position, records))
    }
}
