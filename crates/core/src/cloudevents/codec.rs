//! Binary and structured content-mode codec
//!
//! Binary mode carries each attribute as its own HTTP header and the data as
//! the raw body. Structured mode carries everything in one JSON document
//! whose keys are the version's field names.

use super::{Attribute, SpecVersion, MIME_STRUCTURED_CONTENT_MODE};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

/// Content type assumed for binary requests that do not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const DATA_FIELD: &str = "data";
const DATA_BASE64_FIELD: &str = "data_base64";
const DATA_ENCODING_FIELD: &str = "datacontentencoding";

/// How the event is laid out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentMode {
    /// One header per attribute, raw body
    #[default]
    Binary,
    /// Single JSON document
    Structured,
}

/// Encoder/decoder bound to one spec version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    version: SpecVersion,
}

impl Codec {
    pub fn new(version: SpecVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Decode an HTTP message into an envelope
    ///
    /// A structured content type selects structured decoding, which fails
    /// when the JSON is malformed or a required field is missing. Anything
    /// else is decoded in binary mode and never fails on missing attributes:
    /// plain requests pass through as envelopes with no attributes.
    pub fn decode(&self, headers: &HeaderMap, body: Bytes) -> Result<Envelope> {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match content_type.as_deref() {
            Some(ct) if is_structured(ct) => self.decode_structured(headers, &body),
            _ => self.decode_binary(headers, body, content_type),
        }
    }

    fn decode_binary(
        &self,
        headers: &HeaderMap,
        body: Bytes,
        content_type: Option<String>,
    ) -> Result<Envelope> {
        let mut envelope = Envelope {
            content_type: Some(content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())),
            body: Some(body),
            mode: ContentMode::Binary,
            ..Default::default()
        };

        for (name, value) in headers {
            if name == http::header::CONTENT_TYPE {
                continue;
            }
            match self.version.attribute_for_header(name.as_str()) {
                Some(attribute) if attribute != Attribute::DataContentType => {
                    let value = value.to_str().map_err(|_| {
                        Error::Decode(format!("header '{}' is not valid UTF-8", name))
                    })?;
                    envelope.attributes.insert(attribute, value.to_string());
                }
                _ => {
                    envelope.headers.append(name.clone(), value.clone());
                }
            }
        }

        Ok(envelope)
    }

    fn decode_structured(&self, headers: &HeaderMap, body: &[u8]) -> Result<Envelope> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|e| Error::Decode(format!("structured event is not valid JSON: {}", e)))?;
        let object = document
            .as_object()
            .ok_or_else(|| Error::Decode("structured event must be a JSON object".to_string()))?;

        let mut envelope = Envelope {
            mode: ContentMode::Structured,
            ..Default::default()
        };

        for spec in self.version.attributes() {
            match object.get(spec.json) {
                Some(Value::Null) | None if spec.required => {
                    return Err(Error::Decode(format!(
                        "missing required field '{}' for CloudEvents {}",
                        spec.json, self.version
                    )));
                }
                Some(Value::Null) | None => {}
                Some(Value::String(s)) => envelope.set_attribute(spec.attribute, s.clone()),
                Some(other) => envelope.set_attribute(spec.attribute, other.to_string()),
            }
        }

        envelope.body = self.decode_data(object)?;

        for (name, value) in headers {
            if name != http::header::CONTENT_TYPE {
                envelope.headers.append(name.clone(), value.clone());
            }
        }

        Ok(envelope)
    }

    fn decode_data(&self, object: &Map<String, Value>) -> Result<Option<Bytes>> {
        if let Some(Value::String(encoded)) = object.get(DATA_BASE64_FIELD) {
            return decode_base64(encoded).map(Some);
        }

        let base64_encoded = matches!(
            object.get(DATA_ENCODING_FIELD),
            Some(Value::String(enc)) if enc.eq_ignore_ascii_case("base64")
        );

        match object.get(DATA_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if base64_encoded => decode_base64(s).map(Some),
            Some(Value::String(s)) => Ok(Some(Bytes::from(s.clone()))),
            Some(other) => Ok(Some(Bytes::from(serde_json::to_vec(other)?))),
        }
    }

    /// Encode an envelope into HTTP headers and body
    pub fn encode(&self, envelope: &Envelope, mode: ContentMode) -> Result<(HeaderMap, Bytes)> {
        let body = envelope.body.clone().ok_or_else(Error::missing_body)?;
        match mode {
            ContentMode::Binary => Ok((self.binary_headers(envelope)?, body)),
            ContentMode::Structured => self.encode_structured(envelope, &body),
        }
    }

    /// CloudEvent attribute headers plus `Content-Type` for binary mode
    pub fn binary_headers(&self, envelope: &Envelope) -> Result<HeaderMap> {
        let mut headers = self.attribute_headers(envelope)?;
        if let Some(content_type) = &envelope.content_type {
            headers.insert(http::header::CONTENT_TYPE, header_value(content_type)?);
        }
        Ok(headers)
    }

    /// CloudEvent attribute headers only, one per attribute present
    pub fn attribute_headers(&self, envelope: &Envelope) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (attribute, value) in &envelope.attributes {
            if let Some(name) = self.version.http_name(*attribute) {
                headers.insert(header_name(name)?, header_value(value)?);
            }
        }
        Ok(headers)
    }

    /// Transport headers merged with the attribute headers
    ///
    /// This is the view filters are evaluated against, so that a filter on a
    /// CloudEvent header matches regardless of the content mode the event
    /// arrived in.
    pub fn wire_view(&self, envelope: &Envelope) -> HeaderMap {
        let mut view = envelope.headers.clone();
        for (attribute, value) in &envelope.attributes {
            let Some(name) = self.version.http_name(*attribute) else {
                continue;
            };
            if let (Ok(name), Ok(value)) = (header_name(name), header_value(value)) {
                view.insert(name, value);
            }
        }
        view
    }

    fn encode_structured(&self, envelope: &Envelope, body: &Bytes) -> Result<(HeaderMap, Bytes)> {
        let mut object = Map::new();
        for spec in self.version.attributes() {
            if let Some(value) = envelope.attribute(spec.attribute) {
                object.insert(spec.json.to_string(), Value::String(value.to_string()));
            }
        }

        let is_json = envelope
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or("").trim().ends_with("json"))
            .unwrap_or(false);

        if let Some(value) = is_json
            .then(|| serde_json::from_slice::<Value>(body).ok())
            .flatten()
        {
            object.insert(DATA_FIELD.to_string(), value);
        } else if let Ok(text) = std::str::from_utf8(body) {
            object.insert(DATA_FIELD.to_string(), Value::String(text.to_string()));
        } else if self.version == SpecVersion::V1_0 {
            object.insert(DATA_BASE64_FIELD.to_string(), Value::String(BASE64.encode(body)));
        } else {
            object.insert(DATA_ENCODING_FIELD.to_string(), Value::String("base64".to_string()));
            object.insert(DATA_FIELD.to_string(), Value::String(BASE64.encode(body)));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(MIME_STRUCTURED_CONTENT_MODE),
        );
        Ok((headers, Bytes::from(serde_json::to_vec(&Value::Object(object))?)))
    }
}

/// Whether a content type announces a structured-mode event
pub fn is_structured(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case(MIME_STRUCTURED_CONTENT_MODE))
        .unwrap_or(false)
}

/// Parse a header name, accepting the mixed-case names of CloudEvents 0.1
pub fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::Validation(format!("invalid header name '{}': {}", name, e)))
}

/// Parse a header value
pub fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Validation(format!("invalid header value '{}': {}", value, e)))
}

fn decode_base64(encoded: &str) -> Result<Bytes> {
    BASE64
        .decode(encoded.trim())
        .map(Bytes::from)
        .map_err(|e| Error::Decode(format!("data is not valid base64: {}", e)))
}
