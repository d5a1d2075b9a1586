//! Endpoint descriptors: one per physical feed or location.
//!
//! Descriptors are loaded once from a JSON array file at startup and stay
//! immutable for the lifetime of the owning source.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sources::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub url: String,

    #[serde(alias = "portCode")]
    pub site_id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

/// On-disk shape. Loose scalar fields next to the known ones (e.g. a radar
/// feed's `weather`) are folded into `tags`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    #[serde(default)]
    url: String,

    #[serde(default, alias = "portCode")]
    site_id: String,

    #[serde(default = "default_enabled")]
    enabled: bool,

    #[serde(default)]
    tags: HashMap<String, String>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

impl From<RawEndpoint> for EndpointDescriptor {
    fn from(raw: RawEndpoint) -> Self {
        let mut tags = raw.tags;
        for (key, value) in raw.extra {
            let text = match value {
                Value::String(s) => s,
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => continue,
                other => other.to_string(),
            };
            tags.entry(key).or_insert(text);
        }

        Self {
            url: raw.url,
            site_id: raw.site_id,
            enabled: raw.enabled,
            tags,
        }
    }
}

impl EndpointDescriptor {
    pub fn new(url: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            site_id: site_id.into(),
            enabled: true,
            tags: HashMap::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Parse and validate a JSON array of endpoint descriptors.
pub fn parse_endpoints(
    source_name: &str,
    json: &str,
) -> Result<Vec<EndpointDescriptor>, ConfigError> {
    let raw: Vec<RawEndpoint> =
        serde_json::from_str(json).map_err(|err| ConfigError::Invalid {
            message: format!("{} endpoint list is not valid JSON: {}", source_name, err),
        })?;

    let endpoints: Vec<EndpointDescriptor> = raw.into_iter().map(Into::into).collect();
    validate_endpoints(source_name, &endpoints)?;
    Ok(endpoints)
}

/// Read, parse and validate an endpoint list file.
pub fn load_endpoints(
    source_name: &str,
    path: impl AsRef<Path>,
) -> Result<Vec<EndpointDescriptor>, ConfigError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|err| ConfigError::EndpointFile {
        source_name: source_name.to_string(),
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let endpoints = parse_endpoints(source_name, &json)?;
    tracing::info!(
        "Loaded {} endpoint(s) for {} from {}",
        endpoints.len(),
        source_name,
        path.display()
    );
    Ok(endpoints)
}

/// Reject empty lists and descriptors missing a url or site id.
pub fn validate_endpoints(
    source_name: &str,
    endpoints: &[EndpointDescriptor],
) -> Result<(), ConfigError> {
    if endpoints.is_empty() {
        return Err(ConfigError::NoEndpoints {
            source_name: source_name.to_string(),
        });
    }

    for (index, endpoint) in endpoints.iter().enumerate() {
        let reason = if endpoint.url.trim().is_empty() {
            "missing url"
        } else if endpoint.site_id.trim().is_empty() {
            "missing site id"
        } else {
            continue;
        };

        return Err(ConfigError::IncompleteEndpoint {
            source_name: source_name.to_string(),
            index,
            reason: reason.to_string(),
        });
    }

    Ok(())
}
