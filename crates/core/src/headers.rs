//! Override precedence for outbound headers and reply flags
//!
//! Every value the bridge puts on the wire is resolved by walking an ordered
//! list of tiers and stopping at the first one that supplies a value. The
//! same [`OverrideChain`] resolves CloudEvent attribute headers and the two
//! reply flags.
//!
//! Outbound attribute headers use, highest first:
//!
//! 1. [`Tier::Message`]: a header with the exact wire name set on the envelope
//! 2. [`Tier::CallSite`]: `ce.override.<header>` on the endpoint URI
//! 3. [`Tier::Endpoint`]: `ce.override.<header>` in the service metadata
//! 4. [`Tier::Component`]: `ce.override.<header>` in the component config
//! 5. [`Tier::Envelope`]: the envelope's canonical attribute
//! 6. [`Tier::Default`]: a computed value (fresh id, current time, ...)

use crate::cloudevents::codec::{header_name, header_value};
use crate::cloudevents::{Attribute, SpecVersion};
use crate::envelope::Envelope;
use crate::error::Result;
use http::HeaderMap;
use std::collections::BTreeMap;
use std::fmt;

/// Source of a resolved value, highest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Message,
    CallSite,
    Endpoint,
    Component,
    Envelope,
    Default,
}

type Lookup<'a, T> = Box<dyn Fn(&str) -> Option<T> + Send + Sync + 'a>;

/// Ordered list of per-key lookups, short-circuiting on the first hit
pub struct OverrideChain<'a, T> {
    tiers: Vec<(Tier, Lookup<'a, T>)>,
}

impl<'a, T> Default for OverrideChain<'a, T> {
    fn default() -> Self {
        Self { tiers: Vec::new() }
    }
}

impl<'a, T> OverrideChain<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tier below every tier added so far
    pub fn tier(
        mut self,
        tier: Tier,
        lookup: impl Fn(&str) -> Option<T> + Send + Sync + 'a,
    ) -> Self {
        self.tiers.push((tier, Box::new(lookup)));
        self
    }

    /// Value for `key` from the highest tier that has one
    pub fn resolve(&self, key: &str) -> Option<(Tier, T)> {
        self.tiers
            .iter()
            .find_map(|(tier, lookup)| lookup(key).map(|v| (*tier, v)))
    }

    /// Value for `key`, discarding the tier
    pub fn value(&self, key: &str) -> Option<T> {
        self.resolve(key).map(|(_, v)| v)
    }
}

impl<T> fmt::Debug for OverrideChain<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tiers.iter().map(|(t, _)| t))
            .finish()
    }
}

/// Reply behavior of an inbound registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyFlags {
    pub reply: bool,
    pub reply_with_cloud_event: bool,
}

const REPLY_KEY: &str = "reply";
const REPLY_WITH_CLOUD_EVENT_KEY: &str = "reply_with_cloud_event";

impl ReplyFlags {
    /// Resolve both flags: endpoint URI > service metadata > component default
    ///
    /// `reply` defaults to true when no tier sets it.
    pub fn resolve(
        call_site: (Option<bool>, Option<bool>),
        endpoint: (Option<bool>, Option<bool>),
        component_reply_with_cloud_event: bool,
    ) -> Self {
        let pick = |flags: (Option<bool>, Option<bool>), key: &str| match key {
            REPLY_KEY => flags.0,
            _ => flags.1,
        };
        let chain = OverrideChain::new()
            .tier(Tier::CallSite, move |k| pick(call_site, k))
            .tier(Tier::Endpoint, move |k| pick(endpoint, k))
            .tier(Tier::Component, move |k| {
                (k == REPLY_WITH_CLOUD_EVENT_KEY).then_some(component_reply_with_cloud_event)
            });

        Self {
            reply: chain.value(REPLY_KEY).unwrap_or(true),
            reply_with_cloud_event: chain.value(REPLY_WITH_CLOUD_EVENT_KEY).unwrap_or(false),
        }
    }
}

impl Default for ReplyFlags {
    fn default() -> Self {
        Self {
            reply: true,
            reply_with_cloud_event: false,
        }
    }
}

/// Final value of one outbound header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHeader {
    /// Wire name, as spelled by the CloudEvents version or the override key
    pub name: String,
    pub value: String,
    pub tier: Tier,
    /// Canonical attribute, when the header carries one
    pub attribute: Option<Attribute>,
}

/// Resolver for the CloudEvent headers of an outbound send
#[derive(Debug, Clone, Default)]
pub struct HeaderResolver {
    version: SpecVersion,
    call_site: BTreeMap<String, String>,
    endpoint: BTreeMap<String, String>,
    component: BTreeMap<String, String>,
    default_type: Option<String>,
    default_source: Option<String>,
}

impl HeaderResolver {
    pub fn new(version: SpecVersion) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Overrides from the endpoint URI, keyed by lowercased header name
    pub fn with_call_site(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.call_site = overrides;
        self
    }

    /// Overrides from the service metadata
    pub fn with_endpoint(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.endpoint = overrides;
        self
    }

    /// Overrides from the component config
    pub fn with_component(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.component = overrides;
        self
    }

    /// Event type used when nothing else provides one
    pub fn with_default_type(mut self, event_type: Option<impl Into<String>>) -> Self {
        self.default_type = event_type.map(Into::into);
        self
    }

    /// Source used when nothing else provides one
    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = Some(source.into());
        self
    }

    /// Event type supplied at the call site, ranked with the URI overrides
    pub fn with_call_site_type(mut self, event_type: impl Into<String>) -> Self {
        if let Some(name) = self.version.http_name(Attribute::Type) {
            self.call_site
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| event_type.into());
        }
        self
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    fn default_value(&self, attribute: Attribute) -> Option<String> {
        match attribute {
            Attribute::SpecVersion => Some(self.version.version().to_string()),
            Attribute::Id => Some(uuid::Uuid::new_v4().to_string()),
            Attribute::Time => Some(chrono::Local::now().to_rfc3339()),
            Attribute::Type => self.default_type.clone(),
            Attribute::Source => self.default_source.clone(),
            Attribute::DataSchema | Attribute::Subject | Attribute::DataContentType => None,
        }
    }

    /// Resolve every CloudEvent header for `envelope`
    ///
    /// Override keys that do not name an attribute of this version are
    /// emitted as-is, ranked by the same tiers.
    pub fn resolve(&self, envelope: &Envelope) -> Vec<ResolvedHeader> {
        let message = |key: &str| {
            envelope
                .headers
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let overrides = OverrideChain::new()
            .tier(Tier::Message, message)
            .tier(Tier::CallSite, |k| self.call_site.get(k).cloned())
            .tier(Tier::Endpoint, |k| self.endpoint.get(k).cloned())
            .tier(Tier::Component, |k| self.component.get(k).cloned());

        let mut resolved = Vec::new();
        for spec in self.version.attributes() {
            if spec.attribute == Attribute::DataContentType {
                continue;
            }
            let key = spec.http.to_ascii_lowercase();
            let value = overrides
                .resolve(&key)
                .or_else(|| {
                    envelope
                        .attribute(spec.attribute)
                        .map(|v| (Tier::Envelope, v.to_string()))
                })
                .or_else(|| self.default_value(spec.attribute).map(|v| (Tier::Default, v)));

            if let Some((tier, value)) = value {
                resolved.push(ResolvedHeader {
                    name: spec.http.to_string(),
                    value,
                    tier,
                    attribute: Some(spec.attribute),
                });
            }
        }

        let mut extra: Vec<&String> = self
            .call_site
            .keys()
            .chain(self.endpoint.keys())
            .chain(self.component.keys())
            .filter(|k| self.version.attribute_for_header(k).is_none())
            .collect();
        extra.sort();
        extra.dedup();
        for key in extra {
            if let Some((tier, value)) = overrides.resolve(key) {
                resolved.push(ResolvedHeader {
                    name: key.clone(),
                    value,
                    tier,
                    attribute: None,
                });
            }
        }

        resolved
    }

    /// Resolve and render as a header map
    pub fn resolve_headers(&self, envelope: &Envelope) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for header in self.resolve(envelope) {
            headers.insert(header_name(&header.name)?, header_value(&header.value)?);
        }
        Ok(headers)
    }
}

/// Attribute headers of a reply, taking a raw wire header set by the consumer
/// over the reply's canonical attribute
pub fn reply_headers(version: SpecVersion, reply: &Envelope) -> Result<HeaderMap> {
    let chain = OverrideChain::new()
        .tier(Tier::Message, |k: &str| {
            reply.headers.get(k).and_then(|v| v.to_str().ok()).map(str::to_string)
        })
        .tier(Tier::Envelope, |k: &str| {
            version
                .attribute_for_header(k)
                .and_then(|a| reply.attribute(a))
                .map(str::to_string)
        });

    let mut headers = HeaderMap::new();
    for spec in version.attributes() {
        if spec.attribute == Attribute::DataContentType {
            continue;
        }
        if let Some(value) = chain.value(&spec.http.to_ascii_lowercase()) {
            headers.insert(header_name(spec.http)?, header_value(&value)?);
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn header<'a>(resolved: &'a [ResolvedHeader], name: &str) -> Option<&'a ResolvedHeader> {
        resolved.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }

    #[test]
    fn test_chain_short_circuits_per_key() {
        let chain = OverrideChain::new()
            .tier(Tier::CallSite, |k: &str| (k == "a").then(|| "call".to_string()))
            .tier(Tier::Component, |k: &str| (k != "c").then(|| "component".to_string()));

        assert_eq!(chain.resolve("a"), Some((Tier::CallSite, "call".to_string())));
        assert_eq!(chain.resolve("b"), Some((Tier::Component, "component".to_string())));
        assert_eq!(chain.resolve("c"), None);
    }

    #[test]
    fn test_component_then_uri_then_message() {
        // GIVEN: component ce-type=X
        let resolver = HeaderResolver::new(SpecVersion::V1_0)
            .with_component(overrides(&[("ce-type", "X")]));
        let envelope = Envelope::new("test");
        let resolved = resolver.resolve(&envelope);
        assert_eq!(header(&resolved, "ce-type").unwrap().value, "X");

        // WHEN: the route also sets a URI override ce-type=Y
        let resolver = resolver.with_call_site(overrides(&[("ce-type", "Y")]));
        let resolved = resolver.resolve(&envelope);
        // THEN: Y wins
        assert_eq!(header(&resolved, "ce-type").unwrap().value, "Y");

        // WHEN: the route sets the raw message header to Z
        let envelope = envelope.with_header("ce-type", "Z");
        let resolved = resolver.resolve(&envelope);
        // THEN: Z wins
        let ce_type = header(&resolved, "ce-type").unwrap();
        assert_eq!(ce_type.value, "Z");
        assert_eq!(ce_type.tier, Tier::Message);
    }

    #[test]
    fn test_tiers_are_independent_per_attribute() {
        let resolver = HeaderResolver::new(SpecVersion::V1_0)
            .with_call_site(overrides(&[("ce-type", "from-uri")]))
            .with_endpoint(overrides(&[("ce-source", "from-metadata")]))
            .with_component(overrides(&[("ce-type", "X"), ("ce-id", "fixed")]));
        let resolved = resolver.resolve(&Envelope::new("test"));

        assert_eq!(header(&resolved, "ce-type").unwrap().value, "from-uri");
        assert_eq!(header(&resolved, "ce-source").unwrap().value, "from-metadata");
        assert_eq!(header(&resolved, "ce-id").unwrap().tier, Tier::Component);
    }

    #[test]
    fn test_canonical_attribute_ranks_below_overrides() {
        let envelope = Envelope::new("test").with_attribute(Attribute::Type, "canonical");

        let resolver = HeaderResolver::new(SpecVersion::V1_0)
            .with_default_type(Some("org.apache.camel.event"));
        assert_eq!(header(&resolver.resolve(&envelope), "ce-type").unwrap().value, "canonical");

        let resolver = resolver.with_call_site_type("myEvent");
        assert_eq!(header(&resolver.resolve(&envelope), "ce-type").unwrap().value, "myEvent");

        let envelope = envelope.with_header("ce-type", "raw");
        assert_eq!(header(&resolver.resolve(&envelope), "ce-type").unwrap().value, "raw");
    }

    #[test]
    fn test_computed_defaults() {
        for version in SpecVersion::ALL {
            let resolver = HeaderResolver::new(version)
                .with_default_type(Some("org.apache.camel.event"))
                .with_default_source("knative://endpoint/myEndpoint");
            let resolved = resolver.resolve(&Envelope::new("test"));

            let get = |a: Attribute| {
                resolved
                    .iter()
                    .find(|h| h.attribute == Some(a))
                    .map(|h| h.value.clone())
            };
            assert_eq!(get(Attribute::SpecVersion).as_deref(), Some(version.version()));
            assert_eq!(get(Attribute::Type).as_deref(), Some("org.apache.camel.event"));
            assert_eq!(get(Attribute::Source).as_deref(), Some("knative://endpoint/myEndpoint"));
            assert!(uuid::Uuid::parse_str(&get(Attribute::Id).unwrap()).is_ok());
            assert!(chrono::DateTime::parse_from_rfc3339(&get(Attribute::Time).unwrap()).is_ok());
            assert!(get(Attribute::Subject).is_none());
        }
    }

    #[test]
    fn test_v0_1_wire_names_and_extra_overrides() {
        let resolver = HeaderResolver::new(SpecVersion::V0_1)
            .with_endpoint(overrides(&[("ce-eventtype", "meta"), ("x-extra", "1")]));
        let headers = resolver.resolve_headers(&Envelope::new("test")).unwrap();

        assert_eq!(headers.get("ce-eventtype").unwrap(), "meta");
        assert_eq!(headers.get("x-extra").unwrap(), "1");
        assert!(headers.get("ce-type").is_none());
    }

    #[test]
    fn test_reply_flags() {
        assert_eq!(
            ReplyFlags::resolve((None, None), (None, None), false),
            ReplyFlags::default()
        );

        // Metadata disables reply, URI re-enables it
        let flags = ReplyFlags::resolve((Some(true), None), (Some(false), None), false);
        assert!(flags.reply);
        let flags = ReplyFlags::resolve((None, None), (Some(false), None), false);
        assert!(!flags.reply);

        // Component default applies only when nothing narrower is set
        let flags = ReplyFlags::resolve((None, None), (None, None), true);
        assert!(flags.reply_with_cloud_event);
        let flags = ReplyFlags::resolve((None, Some(false)), (None, None), true);
        assert!(!flags.reply_with_cloud_event);
    }

    #[test]
    fn test_reply_headers_prefer_raw_header() {
        let reply = Envelope::new("consumer")
            .with_attribute(Attribute::Type, "custom")
            .with_attribute(Attribute::Id, "myEventID")
            .with_header("ce-id", "overwritten");
        let headers = reply_headers(SpecVersion::V1_0, &reply).unwrap();

        assert_eq!(headers.get("ce-type").unwrap(), "custom");
        assert_eq!(headers.get("ce-id").unwrap(), "overwritten");
        assert!(headers.get("ce-source").is_none());
    }
}
