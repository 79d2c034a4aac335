//! HTTP transport facade
//!
//! [`HttpTransport`] ties the pieces together for a whole process: it owns
//! the component config, the service descriptors, the shared routing table
//! and one outbound sender, and turns endpoint URIs into consumer
//! registrations and [`EventProducer`]s.
//!
//! # Usage
//!
//! ```ignore
//! use knbridge_http::HttpTransport;
//! use knbridge_core::routing::consumer_fn;
//!
//! let transport = HttpTransport::new(config, environment)?;
//! let handle = transport.add_consumer(
//!     "knative:endpoint/from?replyWithCloudEvent=true",
//!     consumer_fn(|envelope| async move { Ok(Some(envelope)) }),
//! )?;
//!
//! let producer = transport.producer("knative://endpoint/to")?;
//! let reply = producer.send(Envelope::new("test")).await?;
//!
//! transport.server().serve().await?;
//! ```

use crate::client::{HttpEventSender, OutboundTarget};
use crate::server::HttpServer;
use knbridge_core::config::{
    ComponentConfig, EndpointKind, EndpointOptions, Environment, ResourceKind,
};
use knbridge_core::error::Result;
use knbridge_core::filter::Filter;
use knbridge_core::headers::ReplyFlags;
use knbridge_core::routing::{
    join_paths, Consumer, ConsumerRegistration, RegistrationHandle, RoutingTable,
};
use knbridge_core::{Attribute, Envelope};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide HTTP transport
pub struct HttpTransport {
    config: ComponentConfig,
    environment: Environment,
    table: Arc<RoutingTable>,
    sender: Arc<HttpEventSender>,
}

impl HttpTransport {
    /// Create a transport; no socket is opened until [`server`](Self::server)
    /// is served
    pub fn new(config: ComponentConfig, environment: Environment) -> crate::Result<Self> {
        let sender = HttpEventSender::new(
            config.spec_version,
            Duration::from_millis(config.request_timeout_ms),
        )?;

        tracing::info!(
            spec_version = %config.spec_version,
            services = environment.services.len(),
            "HTTP transport created"
        );

        Ok(Self {
            config,
            environment,
            table: Arc::new(RoutingTable::new()),
            sender: Arc::new(sender),
        })
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Routing table shared with the server
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.clone()
    }

    /// Inbound server on the configured bind address
    pub fn server(&self) -> HttpServer {
        HttpServer::new(
            self.config.bind_address.clone(),
            self.table.clone(),
            self.config.spec_version,
        )
    }

    /// Build the registration an endpoint URI describes
    ///
    /// The path is the component base path joined with the service path.
    /// Filters come from the service metadata and the URI; named event
    /// consumers also filter on the event type.
    pub fn registration(
        &self,
        uri: &str,
        consumer: Arc<dyn Consumer>,
    ) -> Result<ConsumerRegistration> {
        let options = EndpointOptions::parse(uri)?;
        let service = self.environment.lookup(EndpointKind::Source, &options)?;

        let mut filters = service.filters();
        filters.extend(options.uri_filters());
        if options.resource_kind == ResourceKind::Event {
            if let (Some(name), Some(header)) = (
                &options.name,
                self.config.spec_version.http_name(Attribute::Type),
            ) {
                filters.push(Filter::new(header, name.clone()));
            }
        }

        let flags = ReplyFlags::resolve(
            (options.reply, options.reply_with_cloud_event),
            (service.reply()?, service.reply_with_cloud_event()?),
            self.config.reply_with_cloud_event,
        );

        let name = options.name.clone().unwrap_or_else(|| service.name.clone());
        let path = join_paths(self.config.base_path(), service.path());

        Ok(
            ConsumerRegistration::new(options.resource_kind, name, path, consumer)
                .with_filters(filters)
                .with_reply(flags.reply)
                .with_reply_with_cloud_event(flags.reply_with_cloud_event),
        )
    }

    /// Register a consumer for an endpoint URI
    pub fn add_consumer(&self, uri: &str, consumer: Arc<dyn Consumer>) -> Result<RegistrationHandle> {
        let registration = self.registration(uri, consumer)?;
        Ok(self.table.add(registration))
    }

    /// Remove a consumer; requests dispatched afterwards no longer reach it
    pub fn remove_consumer(&self, handle: &RegistrationHandle) -> bool {
        self.table.remove(handle)
    }

    /// Producer sending to the sink an endpoint URI refers to
    pub fn producer(&self, uri: &str) -> Result<EventProducer> {
        let options = EndpointOptions::parse(uri)?;
        let service = self.environment.lookup(EndpointKind::Sink, &options)?;
        let target = OutboundTarget::from_service(service, &options, &self.config);

        tracing::debug!(uri, service = %service.name, "Created producer");

        Ok(EventProducer {
            target,
            sender: self.sender.clone(),
        })
    }
}

/// Sends events to one sink
#[derive(Debug, Clone)]
pub struct EventProducer {
    target: OutboundTarget,
    sender: Arc<HttpEventSender>,
}

impl EventProducer {
    pub fn new(target: OutboundTarget, sender: Arc<HttpEventSender>) -> Self {
        Self { target, sender }
    }

    pub fn target(&self) -> &OutboundTarget {
        &self.target
    }

    /// Send one event and wait for the answer
    pub async fn send(&self, envelope: Envelope) -> Result<Envelope> {
        self.sender.send(&self.target, envelope).await
    }
}
