//! Transport: issues one request per enabled endpoint and hands each
//! response back as soon as it arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::sources::endpoint::EndpointDescriptor;
use crate::sources::error::{SourceError, SourceResult};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request shape shared by every endpoint of one source.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
    /// Status codes accepted as success in addition to 2xx.
    pub accept_status: Vec<u16>,
    pub timeout: Duration,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            headers: Vec::new(),
            basic_auth: None,
            accept_status: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RequestTemplate {
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), pass.into()));
        self
    }

    pub fn accept_status(mut self, status: u16) -> Self {
        self.accept_status.push(status);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One raw response, before any provider-specific interpretation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> SourceResult<Value> {
        serde_json::from_slice(&self.body).map_err(|err| SourceError::malformed(err.to_string()))
    }

    /// Lossy, length-capped body text for log lines.
    pub fn body_preview(&self, max: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        match text.char_indices().nth(max) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text.into_owned(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        endpoint: &EndpointDescriptor,
        template: &RequestTemplate,
    ) -> SourceResult<TransportResponse>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self {
            http: builder.build()?,
        })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> SourceError {
    if err.is_timeout() {
        SourceError::timeout(timeout)
    } else {
        SourceError::transport(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        endpoint: &EndpointDescriptor,
        template: &RequestTemplate,
    ) -> SourceResult<TransportResponse> {
        let mut request = self
            .http
            .get(&endpoint.url)
            .query(&template.query)
            .timeout(template.timeout);

        for (key, value) in &template.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some((user, pass)) = &template.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, template.timeout))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, template.timeout))?;

        Ok(TransportResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// How a dispatch round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The permit check refused the round; nothing was requested.
    Denied,
    /// Every issued request has reported back.
    Completed { requests: usize },
}

/// Issue one request per enabled endpoint.
///
/// `permit` is consulted once before anything is sent. Disabled endpoints
/// are skipped silently. `on_response` runs exactly once per issued request,
/// in arrival order (a task that dies without answering is reported last as
/// a transport error), and each request is bounded by `template.timeout` so a
/// hung provider surfaces as [`SourceError::Timeout`] instead of stalling
/// the round.
pub async fn dispatch<P, F>(
    transport: Arc<dyn Transport>,
    endpoints: &[EndpointDescriptor],
    template: Arc<RequestTemplate>,
    permit: P,
    mut on_response: F,
) -> Dispatch
where
    P: FnOnce() -> bool,
    F: FnMut(&EndpointDescriptor, SourceResult<TransportResponse>),
{
    if !permit() {
        return Dispatch::Denied;
    }

    let mut pending = HashMap::new();
    let mut in_flight = JoinSet::new();
    for (index, endpoint) in endpoints.iter().filter(|e| e.enabled).cloned().enumerate() {
        let transport = transport.clone();
        let template = template.clone();
        pending.insert(index, endpoint.clone());

        in_flight.spawn(async move {
            let result =
                match tokio::time::timeout(template.timeout, transport.fetch(&endpoint, &template))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::timeout(template.timeout)),
                };
            (index, result)
        });
    }

    let mut requests = 0;
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Some(endpoint) = pending.remove(&index) {
                    requests += 1;
                    on_response(&endpoint, result);
                }
            }
            Err(err) => {
                tracing::error!("Request task aborted: {}", err);
            }
        }
    }

    // Tasks that panicked or were cancelled never reported back.
    let mut orphaned: Vec<_> = pending.into_iter().collect();
    orphaned.sort_by_key(|(index, _)| *index);
    for (_, endpoint) in orphaned {
        requests += 1;
        on_response(
            &endpoint,
            Err(SourceError::transport("request task failed before responding")),
        );
    }

    Dispatch::Completed { requests }
}
