//! Configuration types for the bridge
//!
//! Three layers feed the bridge:
//!
//! - [`ComponentConfig`]: process-wide defaults (spec version, base path,
//!   component-level header overrides, timeouts)
//! - [`Environment`]: service descriptors produced by the external config
//!   loader, one [`ServiceDefinition`] per endpoint, event or channel
//! - [`EndpointOptions`]: per-route options parsed from an endpoint URI

mod endpoint;
mod environment;

pub use endpoint::EndpointOptions;
pub use environment::{Environment, ServiceDefinition, DEFAULT_EVENT_SERVICE};

use crate::cloudevents::SpecVersion;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Metadata keys understood on service descriptors
pub mod meta {
    /// Sub-path a source is served on, or a sink is invoked on
    pub const SERVICE_PATH: &str = "service.path";
    /// Absolute URL overriding host, port and path of a sink
    pub const SERVICE_URL: &str = "service.url";
    /// Event type attached to outbound events
    pub const EVENT_TYPE: &str = "knative.event.type";
    /// Data content type attached to outbound events
    pub const CONTENT_TYPE: &str = "content.type";
    /// Prefix of `(header, value)` filter entries
    pub const FILTER_PREFIX: &str = "knative.filter.";
    /// Prefix of header override entries
    pub const CE_OVERRIDE_PREFIX: &str = "ce.override.";
    /// Whether a source replies with the consumer's result
    pub const REPLY: &str = "knative.reply";
    /// Whether a source reply carries CloudEvent headers
    pub const REPLY_WITH_CLOUD_EVENT: &str = "knative.reply.cloudevent";
    /// Resource kind used to narrow service lookup
    pub const KIND: &str = "knative.kind";
    /// Resource API version used to narrow service lookup
    pub const API_VERSION: &str = "knative.apiVersion";
}

/// Collect `ce.override.<header>` entries into a map keyed by the lowercased
/// header name
pub fn ce_overrides<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> BTreeMap<String, String> {
    prefixed(entries, meta::CE_OVERRIDE_PREFIX)
}

pub(crate) fn prefixed<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a String)>,
    prefix: &str,
) -> BTreeMap<String, String> {
    entries
        .into_iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(prefix)
                .filter(|h| !h.is_empty())
                .map(|h| (h.to_ascii_lowercase(), v.clone()))
        })
        .collect()
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::Config(format!(
            "option '{}' expects true or false, got '{}'",
            key, other
        ))),
    }
}

/// What a service descriptor or endpoint URI addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A point-to-point HTTP endpoint
    Endpoint,
    /// A named event type on a broker
    Event,
    /// A channel
    Channel,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::Event => "event",
            ResourceKind::Channel => "channel",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "endpoint" => Ok(ResourceKind::Endpoint),
            "event" => Ok(ResourceKind::Event),
            "channel" => Ok(ResourceKind::Channel),
            other => Err(Error::Config(format!("Unknown resource type: {}", other))),
        }
    }
}

/// Direction of a service from the bridge's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Events flow into the bridge (inbound consumers)
    Source,
    /// Events flow out of the bridge (outbound sends)
    Sink,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndpointKind::Source => "source",
            EndpointKind::Sink => "sink",
        })
    }
}

/// Process-wide bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// CloudEvents version used on the wire
    pub spec_version: SpecVersion,

    /// Path prefix every source is served under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,

    /// Component-wide header overrides, keyed `ce.override.<header>`
    pub ce_override: BTreeMap<String, String>,

    /// Default for sources that do not say whether replies carry CloudEvent headers
    pub reply_with_cloud_event: bool,

    /// Scheme of the default `source` attribute (`<scheme>://<kind>/<name>`)
    pub scheme: String,

    /// Timeout of a single outbound HTTP exchange
    pub request_timeout_ms: u64,

    /// Address the inbound server binds to
    pub bind_address: String,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            spec_version: SpecVersion::default(),
            base_path: None,
            ce_override: BTreeMap::new(),
            reply_with_cloud_event: false,
            scheme: "knative".to_string(),
            request_timeout_ms: 30_000,
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ComponentConfig {
    /// Defaults overlaid with `KNBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from a variable lookup
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(addr) = lookup("KNBRIDGE_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Some(version) = lookup("KNBRIDGE_SPEC_VERSION") {
            self.spec_version = version.parse()?;
        }
        if let Some(path) = lookup("KNBRIDGE_BASE_PATH") {
            self.base_path = Some(path);
        }
        if let Some(timeout) = lookup("KNBRIDGE_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = timeout.parse().map_err(|e| {
                Error::Config(format!("KNBRIDGE_REQUEST_TIMEOUT_MS is not a number: {}", e))
            })?;
        }
        Ok(self)
    }

    pub fn with_spec_version(mut self, version: SpecVersion) -> Self {
        self.spec_version = version;
        self
    }

    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Add a component-level override for `header`
    pub fn with_ce_override(mut self, header: &str, value: impl Into<String>) -> Self {
        self.ce_override
            .insert(format!("{}{}", meta::CE_OVERRIDE_PREFIX, header), value.into());
        self
    }

    pub fn with_reply_with_cloud_event(mut self, enabled: bool) -> Self {
        self.reply_with_cloud_event = enabled;
        self
    }

    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    /// Component overrides keyed by lowercased header name
    pub fn ce_overrides(&self) -> BTreeMap<String, String> {
        ce_overrides(&self.ce_override)
    }

    /// Base path, or `/`
    pub fn base_path(&self) -> &str {
        self.base_path.as_deref().unwrap_or("/")
    }
}
