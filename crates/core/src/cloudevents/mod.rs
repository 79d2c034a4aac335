//! CloudEvents spec versions and their wire naming
//!
//! Each [`SpecVersion`] owns a fixed table of [`AttributeSpec`] records that
//! map a canonical [`Attribute`] to its binary-mode HTTP header and its
//! structured-mode JSON field. Nothing outside this module spells wire names;
//! callers go through [`SpecVersion::http_name`] / [`SpecVersion::json_name`].

pub mod codec;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use codec::ContentMode;

/// MIME type announcing a structured-mode CloudEvent
pub const MIME_STRUCTURED_CONTENT_MODE: &str = "application/cloudevents+json";

/// HTTP header carrying the data content type in binary mode
pub const CONTENT_TYPE: &str = "content-type";

/// Canonical, version-independent CloudEvent attribute names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    /// Spec version the event was produced with
    SpecVersion,
    /// Event identifier
    Id,
    /// Event type
    Type,
    /// Event source
    Source,
    /// Event timestamp
    Time,
    /// Schema the data adheres to (`schemaurl` / `dataschema`)
    DataSchema,
    /// Subject of the event in the context of the source
    Subject,
    /// Content type of the data
    DataContentType,
}

impl Attribute {
    /// Canonical name of the attribute
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::SpecVersion => "specversion",
            Attribute::Id => "id",
            Attribute::Type => "type",
            Attribute::Source => "source",
            Attribute::Time => "time",
            Attribute::DataSchema => "dataschema",
            Attribute::Subject => "subject",
            Attribute::DataContentType => "datacontenttype",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wire names of one attribute under one spec version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Canonical attribute
    pub attribute: Attribute,
    /// Binary-mode HTTP header name
    pub http: &'static str,
    /// Structured-mode JSON field name
    pub json: &'static str,
    /// Whether a structured event must carry the field
    pub required: bool,
}

const fn attr(
    attribute: Attribute,
    http: &'static str,
    json: &'static str,
    required: bool,
) -> AttributeSpec {
    AttributeSpec {
        attribute,
        http,
        json,
        required,
    }
}

const V0_1_ATTRIBUTES: &[AttributeSpec] = &[
    attr(Attribute::SpecVersion, "CE-CloudEventsVersion", "cloudEventsVersion", true),
    attr(Attribute::Id, "CE-EventID", "eventID", true),
    attr(Attribute::Type, "CE-EventType", "eventType", true),
    attr(Attribute::Source, "CE-Source", "source", true),
    attr(Attribute::Time, "CE-EventTime", "eventTime", false),
    attr(Attribute::DataSchema, "CE-SchemaURL", "schemaURL", false),
    attr(Attribute::DataContentType, CONTENT_TYPE, "contentType", false),
];

const V0_2_ATTRIBUTES: &[AttributeSpec] = &[
    attr(Attribute::SpecVersion, "ce-specversion", "specversion", true),
    attr(Attribute::Id, "ce-id", "id", true),
    attr(Attribute::Type, "ce-type", "type", true),
    attr(Attribute::Source, "ce-source", "source", true),
    attr(Attribute::Time, "ce-time", "time", false),
    attr(Attribute::DataSchema, "ce-schemaurl", "schemaurl", false),
    attr(Attribute::DataContentType, CONTENT_TYPE, "contenttype", false),
];

const V0_3_ATTRIBUTES: &[AttributeSpec] = &[
    attr(Attribute::SpecVersion, "ce-specversion", "specversion", true),
    attr(Attribute::Id, "ce-id", "id", true),
    attr(Attribute::Type, "ce-type", "type", true),
    attr(Attribute::Source, "ce-source", "source", true),
    attr(Attribute::Time, "ce-time", "time", false),
    attr(Attribute::DataSchema, "ce-schemaurl", "schemaurl", false),
    attr(Attribute::Subject, "ce-subject", "subject", false),
    attr(Attribute::DataContentType, CONTENT_TYPE, "datacontenttype", false),
];

const V1_0_ATTRIBUTES: &[AttributeSpec] = &[
    attr(Attribute::SpecVersion, "ce-specversion", "specversion", true),
    attr(Attribute::Id, "ce-id", "id", true),
    attr(Attribute::Type, "ce-type", "type", true),
    attr(Attribute::Source, "ce-source", "source", true),
    attr(Attribute::Time, "ce-time", "time", false),
    attr(Attribute::DataSchema, "ce-dataschema", "dataschema", false),
    attr(Attribute::Subject, "ce-subject", "subject", false),
    attr(Attribute::DataContentType, CONTENT_TYPE, "datacontenttype", false),
];

/// Supported CloudEvents spec versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecVersion {
    /// CloudEvents 0.1
    V0_1,
    /// CloudEvents 0.2
    V0_2,
    /// CloudEvents 0.3
    V0_3,
    /// CloudEvents 1.0
    #[default]
    V1_0,
}

impl SpecVersion {
    /// All supported versions, oldest first
    pub const ALL: [SpecVersion; 4] = [
        SpecVersion::V0_1,
        SpecVersion::V0_2,
        SpecVersion::V0_3,
        SpecVersion::V1_0,
    ];

    /// Version string as it appears on the wire
    pub fn version(&self) -> &'static str {
        match self {
            SpecVersion::V0_1 => "0.1",
            SpecVersion::V0_2 => "0.2",
            SpecVersion::V0_3 => "0.3",
            SpecVersion::V1_0 => "1.0",
        }
    }

    /// Attribute table of this version
    pub fn attributes(&self) -> &'static [AttributeSpec] {
        match self {
            SpecVersion::V0_1 => V0_1_ATTRIBUTES,
            SpecVersion::V0_2 => V0_2_ATTRIBUTES,
            SpecVersion::V0_3 => V0_3_ATTRIBUTES,
            SpecVersion::V1_0 => V1_0_ATTRIBUTES,
        }
    }

    /// Table entry for `attribute`, if this version defines it
    pub fn attribute(&self, attribute: Attribute) -> Option<&'static AttributeSpec> {
        self.attributes().iter().find(|a| a.attribute == attribute)
    }

    /// Binary-mode header name of `attribute`
    pub fn http_name(&self, attribute: Attribute) -> Option<&'static str> {
        self.attribute(attribute).map(|a| a.http)
    }

    /// Structured-mode field name of `attribute`
    pub fn json_name(&self, attribute: Attribute) -> Option<&'static str> {
        self.attribute(attribute).map(|a| a.json)
    }

    /// Reverse lookup from a header name (case-insensitive)
    pub fn attribute_for_header(&self, header: &str) -> Option<Attribute> {
        self.attributes()
            .iter()
            .find(|a| a.http.eq_ignore_ascii_case(header))
            .map(|a| a.attribute)
    }

    /// Whether `header` names a CloudEvent attribute carried as its own header.
    ///
    /// `Content-Type` is excluded: it is the data content type in binary mode
    /// but also an ordinary HTTP header.
    pub fn is_attribute_header(&self, header: &str) -> bool {
        matches!(
            self.attribute_for_header(header),
            Some(a) if a != Attribute::DataContentType
        )
    }

    /// MIME type of structured-mode events
    pub fn mime_structured(&self) -> &'static str {
        MIME_STRUCTURED_CONTENT_MODE
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}

impl FromStr for SpecVersion {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecVersion::ALL
            .into_iter()
            .find(|v| v.version() == s.trim())
            .ok_or_else(|| crate::Error::Config(format!("Unknown CloudEvents spec version: {}", s)))
    }
}

impl Serialize for SpecVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.version())
    }
}

impl<'de> Deserialize<'de> for SpecVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
