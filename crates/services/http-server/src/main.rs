//! Bridge server binary entry point
//!
//! Serves every source service of the environment and forwards what it
//! receives to the sink service of the same kind and name, relaying the
//! sink's answer back to the caller. Sources without a matching sink log
//! the event and answer 204.
//!
//! # Usage
//!
//! ```bash
//! # Start with an environment file
//! KNBRIDGE_ENV_FILE=environment.json cargo run -p knbridge-http-server
//!
//! # With logging
//! RUST_LOG=debug cargo run -p knbridge-http-server
//! ```
//!
//! # Environment Variables
//!
//! - `KNBRIDGE_ENV_FILE`: path of the JSON service descriptors
//! - `KNBRIDGE_ENVIRONMENT`: inline JSON service descriptors, used when no file is given
//! - `KNBRIDGE_BIND_ADDRESS`: server bind address (default: `127.0.0.1:8080`)
//! - `KNBRIDGE_SPEC_VERSION`: CloudEvents version on the wire (default: `1.0`)
//! - `KNBRIDGE_BASE_PATH`: path prefix of every source
//! - `KNBRIDGE_REQUEST_TIMEOUT_MS`: outbound request timeout
//! - `RUST_LOG`: logging level (default: `info`)

use knbridge_core::config::{
    meta, ComponentConfig, EndpointKind, Environment, ResourceKind, ServiceDefinition,
    DEFAULT_EVENT_SERVICE,
};
use knbridge_core::routing::{consumer_fn, Consumer};
use knbridge_core::Envelope;
use knbridge_http::{EventProducer, HttpTransport};
use std::sync::Arc;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn load_environment() -> Result<Environment, BoxError> {
    if let Ok(path) = std::env::var("KNBRIDGE_ENV_FILE") {
        info!(path = %path, "Loading service descriptors");
        return Ok(Environment::from_file(path)?);
    }
    if let Ok(json) = std::env::var("KNBRIDGE_ENVIRONMENT") {
        return Ok(Environment::from_json(&json)?);
    }
    warn!("No service descriptors configured");
    Ok(Environment::default())
}

/// Endpoint URI a source service is consumed through, if it has one
///
/// Named event services filter on their own name; the default event
/// service needs `knative.event.type` to know which events it takes.
fn source_uri(service: &ServiceDefinition) -> Option<String> {
    match service.resource_kind {
        ResourceKind::Event if service.name == DEFAULT_EVENT_SERVICE => service
            .event_type()
            .map(|event_type| format!("knative:event/{}", event_type)),
        kind => Some(format!("knative:{}/{}", kind, service.name)),
    }
}

/// Consumer relaying every event to `producer`
fn forward_to(producer: EventProducer) -> Arc<dyn Consumer> {
    let producer = Arc::new(producer);
    consumer_fn(move |envelope: Envelope| {
        let producer = producer.clone();
        async move {
            let reply = producer.send(envelope).await?;
            Ok(reply.body.is_some().then_some(reply))
        }
    })
}

/// Consumer logging every event and answering without content
fn log_only(name: String) -> Arc<dyn Consumer> {
    consumer_fn(move |envelope: Envelope| {
        let name = name.clone();
        async move {
            info!(
                service = %name,
                id = envelope.id().unwrap_or(""),
                event_type = envelope.event_type().unwrap_or(""),
                "Received event"
            );
            Ok(None)
        }
    })
}

fn register_sources(transport: &HttpTransport) -> Result<usize, BoxError> {
    let environment = transport.environment();
    let mut registered = 0;

    for service in environment
        .services
        .iter()
        .filter(|s| s.endpoint_kind == EndpointKind::Source)
    {
        let Some(uri) = source_uri(service) else {
            warn!(
                service = %service.name,
                "Skipping event source without {}",
                meta::EVENT_TYPE
            );
            continue;
        };

        transport.add_consumer(&uri, consumer_for(transport, service, &uri))?;
        info!(uri = %uri, path = %service.path(), "Registered source");
        registered += 1;
    }

    Ok(registered)
}

/// Forwarding consumer when a sink resolves for `uri`, logging one otherwise
fn consumer_for(transport: &HttpTransport, service: &ServiceDefinition, uri: &str) -> Arc<dyn Consumer> {
    match transport.producer(uri) {
        Ok(producer) => forward_to(producer),
        Err(e) => {
            info!(uri = %uri, "No sink for source, logging events only: {}", e);
            log_only(service.name.clone())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn main() -> Result<(), BoxError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ComponentConfig::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.bind_address,
        spec_version = %config.spec_version,
        "knbridge server starting"
    );

    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("knbridge-http")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let environment = load_environment()?;
        let transport = HttpTransport::new(config, environment)?;

        let registered = register_sources(&transport)?;
        if registered == 0 {
            warn!("No source services registered; every request will be answered 404");
        }

        let server = transport.server();
        let listener = server.bind().await.map_err(|e| {
            error!("Failed to bind HTTP server: {}", e);
            e
        })?;

        info!("Bridge ready - listening for events");

        server
            .serve_with_shutdown(listener, shutdown_signal())
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;

        Ok::<(), BoxError>(())
    })?;

    info!("Bridge shutdown complete");
    Ok(())
}
