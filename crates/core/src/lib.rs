//! knbridge core - transport-agnostic CloudEvents bridging
//!
//! This crate holds everything about bridging CloudEvents over HTTP that does
//! not touch a socket:
//!
//! - [`cloudevents`]: the four supported spec versions, their wire names and
//!   the binary / structured [`Codec`](cloudevents::codec::Codec)
//! - [`envelope`]: the version-independent in-memory event
//! - [`filter`]: header filters (exact match, then full regex match)
//! - [`routing`]: the concurrent consumer registry
//! - [`headers`]: override precedence for outbound headers and reply flags
//! - [`config`]: component config, service descriptors and endpoint URIs
//!
//! The HTTP server and client live in the `knbridge-http` crate, which
//! depends on this one.
//!
//! # Example
//!
//! ```ignore
//! use knbridge_core::cloudevents::{codec::Codec, SpecVersion};
//! use knbridge_core::routing::{consumer_fn, ConsumerRegistration, RouteMatch, RoutingTable};
//! use knbridge_core::config::ResourceKind;
//!
//! let table = RoutingTable::new();
//! table.add(ConsumerRegistration::new(
//!     ResourceKind::Endpoint,
//!     "myEndpoint",
//!     "/",
//!     consumer_fn(|envelope| async move { Ok(Some(envelope)) }),
//! ));
//!
//! let codec = Codec::new(SpecVersion::V1_0);
//! let envelope = codec.decode(&headers, body)?;
//! if let RouteMatch::Matched(registration) = table.dispatch("/", &codec.wire_view(&envelope)) {
//!     let reply = registration.consumer.process(envelope).await?;
//! }
//! ```

#![warn(clippy::all)]

pub mod cloudevents;
pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod headers;
pub mod routing;

pub use cloudevents::codec::Codec;
pub use cloudevents::{Attribute, ContentMode, SpecVersion};
pub use config::{ComponentConfig, EndpointKind, EndpointOptions, Environment, ResourceKind, ServiceDefinition};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use filter::Filter;
pub use headers::{HeaderResolver, OverrideChain, ReplyFlags, Tier};
pub use routing::{
    consumer_fn, Consumer, ConsumerRegistration, RegistrationHandle, RouteMatch, RoutingTable,
};
