//! Concurrent consumer registry
//!
//! Registrations are grouped by path. Each path holds an immutable snapshot
//! (`Arc<[Arc<ConsumerRegistration>]>`) that is replaced wholesale on every
//! mutation, so a dispatch only holds the read lock long enough to clone the
//! snapshot pointer and then matches filters lock-free. Once
//! [`RoutingTable::remove`] returns, no later dispatch can observe the
//! removed registration.

use crate::config::ResourceKind;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::filter::{self, Filter};
use async_trait::async_trait;
use http::HeaderMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with a matched inbound envelope
///
/// Returning `Ok(None)` means "no reply"; the dispatcher answers 204.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn process(&self, envelope: Envelope) -> Result<Option<Envelope>>;
}

/// Adapter turning an async closure into a [`Consumer`]
pub struct FnConsumer<F>(F);

/// Wrap an async closure as a shareable consumer
pub fn consumer_fn<F, Fut>(f: F) -> Arc<dyn Consumer>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Envelope>>> + Send + 'static,
{
    Arc::new(FnConsumer(f))
}

#[async_trait]
impl<F, Fut> Consumer for FnConsumer<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Envelope>>> + Send,
{
    async fn process(&self, envelope: Envelope) -> Result<Option<Envelope>> {
        (self.0)(envelope).await
    }
}

/// Identifier assigned to a registration by the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

/// A consumer bound to a path with its filters and reply behavior
pub struct ConsumerRegistration {
    pub kind: ResourceKind,
    pub name: String,
    pub path: String,
    pub filters: Vec<Filter>,
    /// Whether the consumer's result is sent back as the HTTP response
    pub reply: bool,
    /// Whether the reply carries CloudEvent attribute headers
    pub reply_with_cloud_event: bool,
    pub consumer: Arc<dyn Consumer>,
}

impl ConsumerRegistration {
    /// Registration with no filters that replies with the consumer's result
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        path: impl Into<String>,
        consumer: Arc<dyn Consumer>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            path: normalize_path(&path.into()),
            filters: Vec::new(),
            reply: true,
            reply_with_cloud_event: false,
            consumer,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn with_reply(mut self, reply: bool) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_reply_with_cloud_event(mut self, enabled: bool) -> Self {
        self.reply_with_cloud_event = enabled;
        self
    }

    /// Whether the request headers satisfy every filter
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        filter::matches(&self.filters, headers)
    }
}

impl fmt::Debug for ConsumerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerRegistration")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("filters", &self.filters)
            .field("reply", &self.reply)
            .field("reply_with_cloud_event", &self.reply_with_cloud_event)
            .finish()
    }
}

/// Handle returned by [`RoutingTable::add`], used to remove the registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    id: RegistrationId,
    path: String,
}

impl RegistrationHandle {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Outcome of a routing lookup
#[derive(Debug, Clone)]
pub enum RouteMatch {
    /// First registration (in registration order) whose filters matched
    Matched(Arc<ConsumerRegistration>),
    /// No registration on the path accepts the request
    NoMatch,
}

type Entry = (RegistrationId, Arc<ConsumerRegistration>);

/// Registry mapping paths to ordered consumer registrations
#[derive(Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<String, Arc<[Entry]>>>,
    next_id: AtomicU64,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer; it becomes visible to dispatches that start
    /// after this call returns
    pub fn add(&self, registration: ConsumerRegistration) -> RegistrationHandle {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let path = registration.path.clone();

        tracing::info!(
            kind = %registration.kind,
            name = %registration.name,
            path = %path,
            filters = registration.filters.len(),
            "Registering consumer"
        );

        let entry = (id, Arc::new(registration));
        let mut routes = self.routes.write();
        let next: Arc<[Entry]> = match routes.get(&path) {
            Some(current) => current.iter().cloned().chain(Some(entry)).collect(),
            None => Arc::from(vec![entry]),
        };
        routes.insert(path.clone(), next);

        RegistrationHandle { id, path }
    }

    /// Remove the registration behind `handle`; returns whether it existed
    pub fn remove(&self, handle: &RegistrationHandle) -> bool {
        self.retain(&handle.path, |(id, _)| *id != handle.id) > 0
    }

    /// Remove every registration named `name` on `path`; returns how many
    pub fn unregister(&self, path: &str, name: &str) -> usize {
        self.retain(&normalize_path(path), |(_, r)| r.name != name)
    }

    fn retain(&self, path: &str, keep: impl Fn(&Entry) -> bool) -> usize {
        let mut routes = self.routes.write();
        let Some(current) = routes.get(path) else {
            return 0;
        };

        let next: Vec<Entry> = current.iter().filter(|e| keep(e)).cloned().collect();
        let removed = current.len() - next.len();
        if removed == 0 {
            return 0;
        }

        if next.is_empty() {
            routes.remove(path);
        } else {
            routes.insert(path.to_string(), Arc::from(next));
        }
        tracing::info!(path = %path, removed, "Removed consumer registration");
        removed
    }

    /// Find the first registration on `path` whose filters accept `headers`
    pub fn dispatch(&self, path: &str, headers: &HeaderMap) -> RouteMatch {
        let snapshot = self.routes.read().get(&normalize_path(path)).cloned();
        snapshot
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|(_, r)| r.matches(headers))
                    .map(|(_, r)| r.clone())
            })
            .map(RouteMatch::Matched)
            .unwrap_or(RouteMatch::NoMatch)
    }

    /// Number of registrations on `path`
    pub fn len(&self, path: &str) -> usize {
        self.routes
            .read()
            .get(&normalize_path(path))
            .map(|e| e.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Registered paths, unordered
    pub fn paths(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }
}

/// Canonical form of a route path: leading `/`, no trailing `/` except root,
/// no repeated separators
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join a base path and a sub-path into a normalized route path
pub fn join_paths(base: &str, sub: &str) -> String {
    normalize_path(&format!("{}/{}", base, sub))
}
