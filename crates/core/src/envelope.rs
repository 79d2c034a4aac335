//! Version-independent in-memory CloudEvent

use crate::cloudevents::{Attribute, ContentMode};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// A received or to-be-sent event
///
/// `attributes` is keyed by canonical [`Attribute`] only. Wire names live in
/// the [`Codec`](crate::cloudevents::codec::Codec); the data content type is
/// kept in `content_type`, never in `attributes`.
///
/// `headers` carries the non-CloudEvent transport headers of the exchange.
/// A caller may also place a CloudEvent wire name there on purpose: on send
/// that header wins over every other source of the attribute value.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Canonical CloudEvent attributes
    pub attributes: BTreeMap<Attribute, String>,
    /// Data content type
    pub content_type: Option<String>,
    /// Event payload; `None` is a null body
    pub body: Option<Bytes>,
    /// Content mode the envelope was decoded from (or should be encoded in)
    pub mode: ContentMode,
    /// Non-CloudEvent headers
    pub headers: HeaderMap,
    /// HTTP status of the exchange that produced this envelope on an outbound send
    pub response_code: Option<u16>,
}

impl Envelope {
    /// Create an envelope holding `body`
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Create an envelope with a null body
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set an attribute, routing the data content type to `content_type`
    pub fn set_attribute(&mut self, attribute: Attribute, value: impl Into<String>) {
        let value = value.into();
        if attribute == Attribute::DataContentType {
            self.content_type = Some(value);
        } else {
            self.attributes.insert(attribute, value);
        }
    }

    /// Builder form of [`set_attribute`](Self::set_attribute)
    pub fn with_attribute(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.set_attribute(attribute, value);
        self
    }

    /// Attribute value, reading the data content type from `content_type`
    pub fn attribute(&self, attribute: Attribute) -> Option<&str> {
        if attribute == Attribute::DataContentType {
            self.content_type.as_deref()
        } else {
            self.attributes.get(&attribute).map(String::as_str)
        }
    }

    /// Remove an attribute and return its previous value
    pub fn remove_attribute(&mut self, attribute: Attribute) -> Option<String> {
        if attribute == Attribute::DataContentType {
            self.content_type.take()
        } else {
            self.attributes.remove(&attribute)
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute(Attribute::Id)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.attribute(Attribute::Type)
    }

    pub fn source(&self) -> Option<&str> {
        self.attribute(Attribute::Source)
    }

    pub fn time(&self) -> Option<&str> {
        self.attribute(Attribute::Time)
    }

    /// Set the data content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set a transport header.
    ///
    /// Invalid names or values are ignored with a warning.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Ignoring invalid header"),
        }
    }

    /// Builder form of [`set_header`](Self::set_header)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// First value of a transport header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as UTF-8 text, if present and valid
    pub fn body_str(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Replace the body
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }
}
