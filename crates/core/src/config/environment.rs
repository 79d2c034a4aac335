//! Service descriptors
//!
//! An [`Environment`] is the JSON document the external config loader
//! produces:
//!
//! ```json
//! {
//!   "services": [
//!     {
//!       "type": "endpoint",
//!       "endpointKind": "sink",
//!       "name": "myEndpoint",
//!       "host": "localhost",
//!       "port": 8080,
//!       "metadata": {
//!         "service.path": "/a/path",
//!         "knative.event.type": "org.apache.camel.event",
//!         "content.type": "text/plain"
//!       }
//!     }
//!   ]
//! }
//! ```

use super::{ce_overrides, meta, parse_bool, prefixed, EndpointKind, EndpointOptions, ResourceKind};
use crate::error::{Error, Result};
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the event service used when no service matches an event name
pub const DEFAULT_EVENT_SERVICE: &str = "default";

/// One endpoint, event or channel known to the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    #[serde(rename = "type")]
    pub resource_kind: ResourceKind,
    pub endpoint_kind: EndpointKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceDefinition {
    /// Inbound service served by the bridge itself
    pub fn source(resource_kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            resource_kind,
            endpoint_kind: EndpointKind::Source,
            name: name.into(),
            host: None,
            port: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Outbound service reachable at `host:port`
    pub fn sink(
        resource_kind: ResourceKind,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            resource_kind,
            endpoint_kind: EndpointKind::Sink,
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Sub-path, or `/`
    pub fn path(&self) -> &str {
        self.meta(meta::SERVICE_PATH).unwrap_or("/")
    }

    pub fn url(&self) -> Option<&str> {
        self.meta(meta::SERVICE_URL).filter(|u| !u.is_empty())
    }

    pub fn event_type(&self) -> Option<&str> {
        self.meta(meta::EVENT_TYPE)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.meta(meta::CONTENT_TYPE)
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("")
    }

    /// Filters declared with `knative.filter.<header>`
    pub fn filters(&self) -> Vec<Filter> {
        prefixed(&self.metadata, meta::FILTER_PREFIX)
            .into_iter()
            .map(|(header, value)| Filter::new(header, value))
            .collect()
    }

    /// Header overrides declared with `ce.override.<header>`
    pub fn ce_overrides(&self) -> BTreeMap<String, String> {
        ce_overrides(&self.metadata)
    }

    /// `knative.reply`, if declared
    pub fn reply(&self) -> Result<Option<bool>> {
        self.meta_flag(meta::REPLY)
    }

    /// `knative.reply.cloudevent`, if declared
    pub fn reply_with_cloud_event(&self) -> Result<Option<bool>> {
        self.meta_flag(meta::REPLY_WITH_CLOUD_EVENT)
    }

    fn meta_flag(&self, key: &str) -> Result<Option<bool>> {
        self.meta(key).map(|v| parse_bool(key, v)).transpose()
    }

    fn matches_options(&self, options: &EndpointOptions) -> bool {
        let narrow = |wanted: &Option<String>, key: &str| match wanted {
            Some(w) => self.meta(key) == Some(w.as_str()),
            None => true,
        };
        narrow(&options.kind, meta::KIND) && narrow(&options.api_version, meta::API_VERSION)
    }
}

/// All services known to the bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl Environment {
    pub fn new(services: Vec<ServiceDefinition>) -> Self {
        Self { services }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid environment descriptor: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loading environment descriptor");
        Self::from_json(&content)
    }

    pub fn with_service(mut self, service: ServiceDefinition) -> Self {
        self.services.push(service);
        self
    }

    /// Find the service an endpoint URI refers to
    ///
    /// Candidates must agree on resource kind, endpoint kind and name, and on
    /// `knative.kind` / `knative.apiVersion` when the options ask for them.
    /// The first candidate in declaration order wins. Event lookups fall back
    /// to the service named [`DEFAULT_EVENT_SERVICE`].
    pub fn lookup(
        &self,
        endpoint_kind: EndpointKind,
        options: &EndpointOptions,
    ) -> Result<&ServiceDefinition> {
        let name = options.service_name();
        let find = |name: &str| {
            self.services.iter().find(|s| {
                s.resource_kind == options.resource_kind
                    && s.endpoint_kind == endpoint_kind
                    && s.name == name
                    && s.matches_options(options)
            })
        };

        find(name)
            .or_else(|| match options.resource_kind {
                ResourceKind::Event if name != DEFAULT_EVENT_SERVICE => find(DEFAULT_EVENT_SERVICE),
                _ => None,
            })
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unable to find a service definition for {}/{} ({})",
                    options.resource_kind, name, endpoint_kind
                ))
            })
    }
}
