//! Endpoint URIs
//!
//! Two forms are accepted:
//!
//! - `knative:<type>[/<name>][?options]`
//! - `knative://<type>/<name>[?options]`
//!
//! Options: `reply`, `replyWithCloudEvent`, `kind`, `apiVersion`,
//! `filter.<header>` and `ce.override.<header>`.

use super::environment::DEFAULT_EVENT_SERVICE;
use super::{meta, parse_bool, ResourceKind};
use crate::error::{Error, Result};
use crate::filter::Filter;
use std::collections::BTreeMap;
use url::Url;

const FILTER_OPTION_PREFIX: &str = "filter.";

/// Per-route options parsed from an endpoint URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOptions {
    pub resource_kind: ResourceKind,
    pub name: Option<String>,
    pub reply: Option<bool>,
    pub reply_with_cloud_event: Option<bool>,
    /// Header overrides keyed by lowercased header name
    pub ce_override: BTreeMap<String, String>,
    /// Extra `(header, value)` filters keyed by lowercased header name
    pub filters: BTreeMap<String, String>,
    pub kind: Option<String>,
    pub api_version: Option<String>,
}

impl EndpointOptions {
    /// Options addressing `name` with nothing overridden
    pub fn new(resource_kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            resource_kind,
            name: Some(name.into()),
            reply: None,
            reply_with_cloud_event: None,
            ce_override: BTreeMap::new(),
            filters: BTreeMap::new(),
            kind: None,
            api_version: None,
        }
    }

    /// Parse an endpoint URI
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| Error::Config(format!("Invalid endpoint URI '{}': {}", uri, e)))?;

        let (resource, name) = match url.host_str() {
            Some(host) => (host.to_string(), url.path().trim_matches('/').to_string()),
            None => {
                let path = url.path().trim_matches('/');
                match path.split_once('/') {
                    Some((resource, name)) => (resource.to_string(), name.to_string()),
                    None => (path.to_string(), String::new()),
                }
            }
        };

        let mut options = Self {
            name: (!name.is_empty()).then_some(name),
            ..Self::new(resource.parse()?, String::new())
        };

        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "reply" => options.reply = Some(parse_bool(&key, &value)?),
                "replyWithCloudEvent" => {
                    options.reply_with_cloud_event = Some(parse_bool(&key, &value)?)
                }
                "kind" => options.kind = Some(value),
                "apiVersion" => options.api_version = Some(value),
                other => {
                    if let Some(header) = other.strip_prefix(meta::CE_OVERRIDE_PREFIX) {
                        options.ce_override.insert(header.to_ascii_lowercase(), value);
                    } else if let Some(header) = other.strip_prefix(FILTER_OPTION_PREFIX) {
                        options.filters.insert(header.to_ascii_lowercase(), value);
                    } else {
                        tracing::warn!(uri = %uri, option = %other, "Ignoring unknown endpoint option");
                    }
                }
            }
        }

        Ok(options)
    }

    /// Name used for service lookup; unnamed events address the default service
    pub fn service_name(&self) -> &str {
        match (&self.name, self.resource_kind) {
            (Some(name), _) => name,
            (None, ResourceKind::Event) => DEFAULT_EVENT_SERVICE,
            (None, _) => "",
        }
    }

    /// Filters declared on the URI
    pub fn uri_filters(&self) -> Vec<Filter> {
        self.filters
            .iter()
            .map(|(h, v)| Filter::new(h.clone(), v.clone()))
            .collect()
    }

    pub fn with_reply(mut self, reply: bool) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn with_reply_with_cloud_event(mut self, enabled: bool) -> Self {
        self.reply_with_cloud_event = Some(enabled);
        self
    }

    pub fn with_ce_override(mut self, header: &str, value: impl Into<String>) -> Self {
        self.ce_override.insert(header.to_ascii_lowercase(), value.into());
        self
    }
}
