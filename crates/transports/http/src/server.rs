//! Inbound dispatcher
//!
//! A single fallback handler receives every request; path routing is done by
//! the shared [`RoutingTable`], not by the axum router:
//!
//! - non-POST requests get 404
//! - undecodable requests get 400
//! - requests no registration accepts get 404
//! - consumer failures get 500 with the failure text in the body
//! - no reply (by choice or by result) gets 204, a reply gets 200

use crate::error::{Error, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use knbridge_core::cloudevents::codec::{header_value, Codec};
use knbridge_core::headers::reply_headers;
use knbridge_core::routing::{RouteMatch, RoutingTable};
use knbridge_core::SpecVersion;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// HTTP server state shared across handlers
#[derive(Clone)]
struct ServerState {
    /// Consumer registrations, shared with whoever adds and removes consumers
    table: Arc<RoutingTable>,
    /// Codec for the configured spec version
    codec: Codec,
}

/// Inbound CloudEvents server
pub struct HttpServer {
    /// Server bind address
    bind_address: String,
    /// Shared server state
    state: ServerState,
}

impl HttpServer {
    /// Create a new HTTP server
    ///
    /// # Arguments
    ///
    /// * `bind_address` - Address to bind to (e.g., "127.0.0.1:8080")
    /// * `table` - Routing table consulted for every request
    /// * `version` - CloudEvents version expected on the wire
    pub fn new(
        bind_address: impl Into<String>,
        table: Arc<RoutingTable>,
        version: SpecVersion,
    ) -> Self {
        Self {
            bind_address: bind_address.into(),
            state: ServerState {
                table,
                codec: Codec::new(version),
            },
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.state.table
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(self.state.clone())
            .layer(tower::ServiceBuilder::new().layer(tower_http::trace::TraceLayer::new_for_http()))
    }

    /// Bind a listener on the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: std::net::SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e| Error::ServerError(format!("Invalid bind address: {}", e)))?;

        TcpListener::bind(addr)
            .await
            .map_err(|e| Error::ServerError(format!("Failed to bind: {}", e)))
    }

    /// Start the HTTP server
    ///
    /// This method blocks until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve on `listener` until `signal` resolves
    ///
    /// In-flight requests are allowed to finish once the signal fires.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                spec_version = %self.state.codec.version(),
                "Starting HTTP server on {}",
                addr
            );
        }

        let router = self.build_router();
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| Error::ServerError(format!("Server error: {}", e)))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error type ("not_found", "decode", "consumer", "encode")
    error_type: String,
    /// Human-readable error message
    message: String,
}

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error_type: error_type.to_string(),
            message,
        }),
    )
        .into_response()
}

/// Fallback handler for every method and path
async fn dispatch_handler(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();

    if method != Method::POST {
        tracing::debug!(%method, path, "Rejecting non-POST request");
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No consumer for {} {}", method, path),
        );
    }

    let envelope = match state.codec.decode(&headers, body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(path, "Failed to decode request: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "decode", e.to_string());
        }
    };

    let registration = match state.table.dispatch(path, &state.codec.wire_view(&envelope)) {
        RouteMatch::Matched(registration) => registration,
        RouteMatch::NoMatch => {
            tracing::debug!(path, "No consumer matches request");
            return error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("No consumer for POST {}", path),
            );
        }
    };

    tracing::debug!(
        path,
        consumer = %registration.name,
        id = envelope.id().unwrap_or(""),
        "Dispatching event"
    );

    let request_attributes = envelope.attributes.clone();
    let reply = match registration.consumer.process(envelope).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(consumer = %registration.name, "Consumer failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "consumer", e.to_string());
        }
    };

    let mut reply = match reply {
        Some(reply) if registration.reply && reply.body.is_some() => reply,
        _ => return StatusCode::NO_CONTENT.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    if registration.reply_with_cloud_event {
        for (attribute, value) in request_attributes {
            reply.attributes.entry(attribute).or_insert(value);
        }
        match reply_headers(state.codec.version(), &reply) {
            Ok(headers) => response_headers.extend(headers),
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "encode", e.to_string()),
        }
    }
    if let Some(content_type) = reply.content_type.as_deref() {
        match header_value(content_type) {
            Ok(value) => {
                response_headers.insert(axum::http::header::CONTENT_TYPE, value);
            }
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "encode", e.to_string()),
        }
    }

    let body = reply.body.take().unwrap_or_default();
    (StatusCode::OK, response_headers, body).into_response()
}
