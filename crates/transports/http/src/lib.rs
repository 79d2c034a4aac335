//! HTTP transport for the knbridge CloudEvents bridge
//!
//! Provides the two HTTP halves of the bridge on top of `knbridge-core`.
//!
//! # Features
//!
//! - **Inbound dispatcher**: `POST <basePath><subPath>` decoded in binary or
//!   structured mode and routed to exactly one registered consumer
//! - **Outbound sender**: binary-mode POST with layered header overrides and
//!   reply / no-content handling
//! - **Transport facade**: endpoint URIs and service descriptors turned into
//!   registrations and producers
//!
//! # Usage
//!
//! ## Server
//!
//! ```ignore
//! use knbridge_http::HttpServer;
//! use knbridge_core::{RoutingTable, SpecVersion};
//!
//! let table = Arc::new(RoutingTable::new());
//! let server = HttpServer::new("127.0.0.1:8080", table.clone(), SpecVersion::V1_0);
//! server.serve().await?;
//! ```
//!
//! ## Client
//!
//! ```ignore
//! use knbridge_http::{HttpEventSender, OutboundTarget};
//!
//! let sender = HttpEventSender::with_defaults(SpecVersion::V1_0)?;
//! let target = OutboundTarget::new("localhost", 8080, SpecVersion::V1_0);
//! let reply = sender.send(&target, Envelope::new("test")).await?;
//! ```

pub mod client;
pub mod error;
pub mod server;
pub mod transport;

// Re-export main types
pub use client::{HttpEventSender, OutboundTarget};
pub use error::{Error, Result};
pub use server::HttpServer;
pub use transport::{EventProducer, HttpTransport};
