//! Test servers for the HTTP transport
//!
//! - [`SinkServer`]: records every request it receives and answers with a
//!   configurable response
//! - [`BridgeServer`]: runs an [`HttpServer`] on a pre-bound listener
//! - [`Bridge`]: an [`HttpTransport`] plus its running server
//! - [`Recorder`]: consumers that remember what they received
//!
//! Both bind to `127.0.0.1:0` and stop through a oneshot shutdown signal.
//!
//! # Usage
//!
//! ```ignore
//! let sink = SinkServer::start(Reply::status(StatusCode::NO_CONTENT)).await?;
//! // send events to sink.port() ...
//! let requests = sink.captured();
//! sink.shutdown().await?;
//! ```

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use knbridge_core::cloudevents::codec::{header_name, header_value};
use knbridge_core::config::{ComponentConfig, Environment, ServiceDefinition};
use knbridge_core::routing::{consumer_fn, Consumer};
use knbridge_core::{Attribute, Envelope, SpecVersion};
use knbridge_http::{HttpServer, HttpTransport};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A request received by a [`SinkServer`]
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the wire header carrying `attribute` under `version`
    pub fn attribute(&self, version: SpecVersion, attribute: Attribute) -> Option<&str> {
        version.http_name(attribute).and_then(|name| self.header(name))
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }
}

/// Answer of a [`SinkServer`]
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    pub fn ok(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Self::status(StatusCode::OK)
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(header_name(name).unwrap(), header_value(value).unwrap());
        self
    }
}

type Responder = Arc<dyn Fn(&Captured) -> Reply + Send + Sync>;

#[derive(Clone)]
struct SinkState {
    captured: Arc<Mutex<Vec<Captured>>>,
    responder: Responder,
}

async fn capture_handler(
    State(state): State<SinkState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let captured = Captured {
        method,
        path: uri.path().to_string(),
        headers,
        body,
    };
    let reply = (state.responder)(&captured);
    state.captured.lock().push(captured);
    (reply.status, reply.headers, reply.body).into_response()
}

/// Recording HTTP sink
pub struct SinkServer {
    addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
}

impl SinkServer {
    /// Start a sink answering every request with `reply`
    pub async fn start(reply: Reply) -> anyhow::Result<Self> {
        Self::start_with(move |_| reply.clone()).await
    }

    /// Start a sink computing its answer per request
    pub async fn start_with(
        responder: impl Fn(&Captured) -> Reply + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let captured = Arc::new(Mutex::new(Vec::new()));

        let router = Router::new().fallback(capture_handler).with_state(SinkState {
            captured: captured.clone(),
            responder: Arc::new(responder),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });

        Ok(Self {
            addr,
            captured,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Requests received so far
    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().clone()
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.await??;
        }
        Ok(())
    }
}

/// Bridge server bound to a random local port
pub struct BridgeServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<knbridge_http::Result<()>>>,
}

impl BridgeServer {
    /// Bind a listener first so the port can be put into service descriptors
    pub async fn bind() -> anyhow::Result<TcpListener> {
        Ok(TcpListener::bind("127.0.0.1:0").await?)
    }

    /// Serve `server` on `listener` in the background
    pub async fn start(server: HttpServer, listener: TcpListener) -> anyhow::Result<Self> {
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_handle = tokio::spawn(server.serve_with_shutdown(listener, async move {
            shutdown_rx.await.ok();
        }));

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Absolute URL of `path` on this server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.await??;
        }
        Ok(())
    }
}

/// Binary-mode request headers for `version` with the given attributes
pub fn ce_headers(version: SpecVersion, attributes: &[(Attribute, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (attribute, value) in attributes {
        let name = version.http_name(*attribute).unwrap();
        headers.insert(header_name(name).unwrap(), header_value(value).unwrap());
    }
    headers
}

/// Event time used by requests built in tests
pub const EVENT_TIME: &str = "2024-01-01T10:00:00+01:00";

/// Transport and running server for end-to-end tests
pub struct Bridge {
    pub transport: HttpTransport,
    pub server: BridgeServer,
}

impl Bridge {
    /// Start a bridge; `services` receives the bridge port so sinks can
    /// point back at the bridge itself
    pub async fn start(
        config: ComponentConfig,
        services: impl FnOnce(u16) -> Vec<ServiceDefinition>,
    ) -> anyhow::Result<Self> {
        let listener = BridgeServer::bind().await?;
        let port = listener.local_addr()?.port();
        let transport = HttpTransport::new(config, Environment::new(services(port)))?;
        let server = BridgeServer::start(transport.server(), listener).await?;
        Ok(Self { transport, server })
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.server.shutdown().await
    }
}

/// Records envelopes handed to its consumers
#[derive(Clone, Default)]
pub struct Recorder {
    received: Arc<Mutex<Vec<Envelope>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumer recording the envelope and answering with `reply(envelope)`
    pub fn consumer(
        &self,
        reply: impl Fn(Envelope) -> Option<Envelope> + Send + Sync + 'static,
    ) -> Arc<dyn Consumer> {
        let received = self.received.clone();
        let reply = Arc::new(reply);
        consumer_fn(move |envelope: Envelope| {
            let received = received.clone();
            let reply = reply.clone();
            async move {
                received.lock().push(envelope.clone());
                Ok(reply(envelope))
            }
        })
    }

    /// Consumer recording the envelope and echoing it back
    pub fn echo(&self) -> Arc<dyn Consumer> {
        self.consumer(Some)
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}
