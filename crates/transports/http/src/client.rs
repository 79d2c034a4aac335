//! Outbound sender
//!
//! Encodes an [`Envelope`] as a binary-mode CloudEvent POST and interprets the
//! answer:
//!
//! - no body: `body must not be null`, before anything else
//! - no explicit URL and an empty host: `host is not defined`, before any I/O
//! - non-2xx: [`Error::RemoteInvocation`] with status code, reason and URL
//! - 204: the caller's envelope comes back with a null body
//! - other 2xx: the response is decoded and merged into the caller's envelope

use crate::error::Error as TransportError;
use http::{HeaderMap, HeaderName};
use knbridge_core::cloudevents::codec::{header_name, header_value, Codec};
use knbridge_core::config::{ComponentConfig, EndpointOptions, ResourceKind, ServiceDefinition};
use knbridge_core::error::{Error, Result};
use knbridge_core::headers::HeaderResolver;
use knbridge_core::{Attribute, Envelope, SpecVersion};
use std::collections::BTreeMap;
use std::time::Duration;

/// Headers owned by the HTTP connection, never copied from an envelope
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "upgrade",
    "te",
    "trailer",
    "proxy-connection",
];

/// Whether `name` is managed by the HTTP connection rather than the message
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Headers describing a response rather than the event it carries
pub const RESPONSE_ONLY_HEADERS: &[&str] = &["date", "server"];

/// Whether a reply header may be carried over into the caller's envelope
fn is_event_header(name: &HeaderName) -> bool {
    !is_hop_by_hop(name) && !RESPONSE_ONLY_HEADERS.contains(&name.as_str())
}

/// Where and how an outbound event is sent
#[derive(Debug, Clone)]
pub struct OutboundTarget {
    /// Host of the sink; empty means undefined
    pub host: String,
    pub port: Option<u16>,
    /// Absolute URL overriding host, port and path
    pub url: Option<String>,
    pub path: String,
    /// Content type used when the envelope does not carry one
    pub content_type: Option<String>,
    /// Attribute header precedence for this target
    pub resolver: HeaderResolver,
}

impl OutboundTarget {
    /// Target at `host:port` with root path and no overrides
    pub fn new(host: impl Into<String>, port: u16, version: SpecVersion) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            url: None,
            path: "/".to_string(),
            content_type: None,
            resolver: HeaderResolver::new(version),
        }
    }

    /// Build the target for a sink service addressed by an endpoint URI
    pub fn from_service(
        service: &ServiceDefinition,
        options: &EndpointOptions,
        config: &ComponentConfig,
    ) -> Self {
        let name = options.name.as_deref().unwrap_or(&service.name);
        let mut resolver = HeaderResolver::new(config.spec_version)
            .with_call_site(options.ce_override.clone())
            .with_endpoint(service.ce_overrides())
            .with_component(config.ce_overrides())
            .with_default_type(service.event_type())
            .with_default_source(format!(
                "{}://{}/{}",
                config.scheme, options.resource_kind, name
            ));
        if options.resource_kind == ResourceKind::Event {
            if let Some(event) = &options.name {
                resolver = resolver.with_call_site_type(event.clone());
            }
        }

        Self {
            host: service.host().to_string(),
            port: service.port,
            url: service.url().map(str::to_string),
            path: service.path().to_string(),
            content_type: service.content_type().map(str::to_string),
            resolver,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_resolver(mut self, resolver: HeaderResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Destination URL; an explicit URL wins over host and port
    pub fn url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        if self.host.trim().is_empty() {
            return Err(Error::undefined_host(&self.describe()));
        }

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(match self.port {
            Some(port) => format!("http://{}:{}{}", self.host, port, path),
            None => format!("http://{}{}", self.host, path),
        })
    }

    fn describe(&self) -> String {
        match self.port {
            Some(port) => format!("port {}, path {}", port, self.path),
            None => format!("path {}", self.path),
        }
    }
}

/// HTTP client sending CloudEvents in binary mode
#[derive(Debug, Clone)]
pub struct HttpEventSender {
    /// Reqwest HTTP client
    client: reqwest::Client,
    /// Codec used to decode replies
    codec: Codec,
}

impl HttpEventSender {
    /// Create a sender whose exchanges time out after `timeout`
    pub fn new(version: SpecVersion, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                TransportError::ConnectionError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            codec: Codec::new(version),
        })
    }

    /// Sender with the default 30 s timeout
    pub fn with_defaults(version: SpecVersion) -> crate::Result<Self> {
        Self::new(version, Duration::from_secs(30))
    }

    pub fn version(&self) -> SpecVersion {
        self.codec.version()
    }

    /// Build the outbound headers: transport headers of the envelope, then
    /// the resolved CloudEvent headers, then the content type
    ///
    /// Also returns the attributes as they go out on the wire.
    fn request_headers(
        &self,
        target: &OutboundTarget,
        envelope: &Envelope,
    ) -> Result<(HeaderMap, BTreeMap<Attribute, String>)> {
        let mut headers = HeaderMap::new();
        for (name, value) in &envelope.headers {
            if !is_hop_by_hop(name) && name != http::header::CONTENT_TYPE {
                headers.append(name.clone(), value.clone());
            }
        }

        let mut attributes = BTreeMap::new();
        for resolved in target.resolver.resolve(envelope) {
            headers.insert(header_name(&resolved.name)?, header_value(&resolved.value)?);
            if let Some(attribute) = resolved.attribute {
                attributes.insert(attribute, resolved.value);
            }
        }

        if let Some(content_type) = envelope
            .content_type
            .as_deref()
            .or(target.content_type.as_deref())
        {
            headers.insert(http::header::CONTENT_TYPE, header_value(content_type)?);
        }
        Ok((headers, attributes))
    }

    /// Send `envelope` to `target` and wait for the answer
    pub async fn send(&self, target: &OutboundTarget, envelope: Envelope) -> Result<Envelope> {
        let body = envelope.body.clone().ok_or_else(Error::missing_body)?;
        let url = target.url()?;
        let (headers, sent) = self.request_headers(target, &envelope)?;

        tracing::debug!(url = %url, "Sending CloudEvent");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                Error::Transport(format!("HTTP operation failed invoking {}: {}", url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = status.as_u16(), "Remote invocation failed");
            return Err(Error::RemoteInvocation {
                url,
                status_code: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: text,
            });
        }

        let mut result = Envelope {
            attributes: sent,
            response_code: Some(status.as_u16()),
            ..envelope
        };

        if status == http::StatusCode::NO_CONTENT {
            result.body = None;
            return Ok(result);
        }

        let response_headers = response.headers().clone();
        let response_body = response.bytes().await.map_err(|e| {
            Error::Transport(format!("Failed to read response from {}: {}", url, e))
        })?;
        let reply = self.codec.decode(&response_headers, response_body)?;

        Ok(merge_reply(result, reply))
    }
}

/// Merge a decoded reply into the caller's envelope
///
/// Reply attributes replace the outbound ones. Caller headers are kept
/// verbatim; reply headers are only added where the caller set none, and
/// never connection or response metadata such as `date`.
fn merge_reply(mut result: Envelope, reply: Envelope) -> Envelope {
    result.attributes.extend(reply.attributes);

    for (name, value) in &reply.headers {
        if is_event_header(name) && !result.headers.contains_key(name) {
            result.headers.insert(name.clone(), value.clone());
        }
    }

    result.content_type = reply.content_type.or(result.content_type);
    result.body = reply.body;
    result.mode = reply.mode;
    result
}
