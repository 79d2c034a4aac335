//! Consumer lifecycle and request/reply tests
//!
//! Producers send through the bridge to its own consumers, so both halves
//! are exercised end to end: registration changes at runtime, reply and
//! no-reply contracts, and replies carrying CloudEvent headers.

mod fixtures;

use fixtures::{Bridge, Recorder};
use knbridge_core::config::{meta, ComponentConfig, ResourceKind, ServiceDefinition};
use knbridge_core::{Attribute, Envelope, SpecVersion};
use reqwest::StatusCode;

/// Source `from` served on `/a/path` and sink `to` pointing back at it
fn loopback(port: u16) -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition::source(ResourceKind::Endpoint, "from")
            .with_meta(meta::SERVICE_PATH, "/a/path")
            .with_meta(meta::EVENT_TYPE, "org.apache.camel.event.from"),
        ServiceDefinition::sink(ResourceKind::Endpoint, "to", "127.0.0.1", port)
            .with_meta(meta::SERVICE_PATH, "/a/path")
            .with_meta(meta::EVENT_TYPE, "org.apache.camel.event.to")
            .with_meta(meta::CONTENT_TYPE, "text/plain"),
    ]
}

fn reply_with(body: &'static str) -> impl Fn(Envelope) -> Option<Envelope> + Send + Sync + 'static {
    move |_| Some(Envelope::new(body).with_content_type("text/plain"))
}

#[tokio::test]
async fn test_remove_and_add_consumer_at_runtime() {
    // GIVEN: consumer h1 on the source path
    let bridge = Bridge::start(ComponentConfig::default(), loopback).await.unwrap();
    let producer = bridge.transport.producer("knative:endpoint/to").unwrap();
    let h1 = Recorder::new();
    let handle = bridge
        .transport
        .add_consumer("knative:endpoint/from", h1.consumer(reply_with("h1")))
        .unwrap();

    // WHEN / THEN: requests reach h1
    let reply = producer.send(Envelope::new("test")).await.unwrap();
    assert_eq!(reply.body_str(), Some("h1"));

    // WHEN: h1 is removed
    assert!(bridge.transport.remove_consumer(&handle));

    // THEN: the path is no longer served
    let err = producer.send(Envelope::new("test")).await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));

    // WHEN: h2 is added on the same path
    let h2 = Recorder::new();
    bridge
        .transport
        .add_consumer("knative:endpoint/from", h2.consumer(reply_with("h2")))
        .unwrap();

    // THEN: requests reach h2 only
    let reply = producer.send(Envelope::new("test")).await.unwrap();
    assert_eq!(reply.body_str(), Some("h2"));
    assert_eq!(h1.count(), 1);
    assert_eq!(h2.count(), 1);

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reply_for_every_version() {
    for version in SpecVersion::ALL {
        // GIVEN: a consumer answering "consumer" without CloudEvent headers
        let bridge = Bridge::start(ComponentConfig::default().with_spec_version(version), loopback)
            .await
            .unwrap();
        let recorder = Recorder::new();
        bridge
            .transport
            .add_consumer("knative:endpoint/from", recorder.consumer(reply_with("consumer")))
            .unwrap();

        // WHEN: the producer sends through the bridge
        let reply = bridge
            .transport
            .producer("knative:endpoint/to")
            .unwrap()
            .send(Envelope::new("test"))
            .await
            .unwrap();

        // THEN: the body is the consumer's, the attributes those sent
        assert_eq!(reply.response_code, Some(200), "version {}", version);
        assert_eq!(reply.body_str(), Some("consumer"));
        assert_eq!(reply.event_type(), Some("org.apache.camel.event.to"));
        assert_eq!(reply.source(), Some("knative://endpoint/to"));

        // AND: the consumer saw the attributes the producer resolved
        let received = recorder.received();
        assert_eq!(received[0].event_type(), Some("org.apache.camel.event.to"));
        assert_eq!(received[0].id(), reply.id());

        bridge.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_no_reply_option_answers_no_content() {
    // GIVEN: a consumer with reply=false on its URI
    let bridge = Bridge::start(ComponentConfig::default(), loopback).await.unwrap();
    let recorder = Recorder::new();
    bridge
        .transport
        .add_consumer(
            "knative:endpoint/from?reply=false",
            recorder.consumer(reply_with("consumer")),
        )
        .unwrap();

    // WHEN: the producer sends through the bridge
    let reply = bridge
        .transport
        .producer("knative:endpoint/to")
        .unwrap()
        .send(Envelope::new("test"))
        .await
        .unwrap();

    // THEN: the consumer ran but the answer is 204 with a null body
    assert_eq!(recorder.count(), 1);
    assert_eq!(reply.response_code, Some(204));
    assert!(reply.body.is_none());

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_uri_reply_option_overrides_metadata() {
    // GIVEN: source metadata disabling replies
    let bridge = Bridge::start(ComponentConfig::default(), |port| {
        let mut services = loopback(port);
        services[0] = services[0].clone().with_meta(meta::REPLY, "false");
        services
    })
    .await
    .unwrap();
    let producer = bridge.transport.producer("knative:endpoint/to").unwrap();

    // WHEN / THEN: metadata alone gives 204
    let handle = bridge
        .transport
        .add_consumer("knative:endpoint/from", Recorder::new().consumer(reply_with("consumer")))
        .unwrap();
    let reply = producer.send(Envelope::new("test")).await.unwrap();
    assert_eq!(reply.response_code, Some(204));
    bridge.transport.remove_consumer(&handle);

    // WHEN / THEN: reply=true on the URI restores the reply
    bridge
        .transport
        .add_consumer(
            "knative:endpoint/from?reply=true",
            Recorder::new().consumer(reply_with("consumer")),
        )
        .unwrap();
    let reply = producer.send(Envelope::new("test")).await.unwrap();
    assert_eq!(reply.response_code, Some(200));
    assert_eq!(reply.body_str(), Some("consumer"));

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reply_with_cloud_event_headers() {
    for version in SpecVersion::ALL {
        // GIVEN: a consumer replying with CloudEvent headers and its own type
        let bridge = Bridge::start(ComponentConfig::default().with_spec_version(version), loopback)
            .await
            .unwrap();
        bridge
            .transport
            .add_consumer(
                "knative:endpoint/from?replyWithCloudEvent=true",
                Recorder::new().consumer(|_| {
                    Some(
                        Envelope::new("consumer")
                            .with_content_type("text/plain")
                            .with_attribute(Attribute::Type, "custom"),
                    )
                }),
            )
            .unwrap();

        // WHEN: the producer sends through the bridge
        let reply = bridge
            .transport
            .producer("knative:endpoint/to")
            .unwrap()
            .send(Envelope::new("test").with_header("CamelDummyHeader", "test"))
            .await
            .unwrap();

        // THEN: the type is the consumer's, the rest inherited from the request
        assert_eq!(reply.body_str(), Some("consumer"), "version {}", version);
        assert_eq!(reply.event_type(), Some("custom"));
        assert_eq!(reply.source(), Some("knative://endpoint/to"));
        assert_eq!(reply.header("cameldummyheader"), Some("test"));

        bridge.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_reply_with_cloud_event_from_component_default() {
    // GIVEN: replies with CloudEvent headers enabled for the whole component
    let bridge = Bridge::start(
        ComponentConfig::default().with_reply_with_cloud_event(true),
        loopback,
    )
    .await
    .unwrap();
    bridge
        .transport
        .add_consumer("knative:endpoint/from", Recorder::new().consumer(reply_with("consumer")))
        .unwrap();

    // WHEN: a raw request is posted
    let response = reqwest::Client::new()
        .post(bridge.url("/a/path"))
        .header("ce-specversion", "1.0")
        .header("ce-type", "org.apache.camel.event")
        .header("ce-id", "myEventID")
        .header("ce-source", "/somewhere")
        .header("content-type", "text/plain")
        .body("test")
        .send()
        .await
        .unwrap();

    // THEN: the response carries the request's attributes back
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("ce-id").unwrap(), "myEventID");
    assert_eq!(headers.get("ce-type").unwrap(), "org.apache.camel.event");
    assert_eq!(headers.get("ce-source").unwrap(), "/somewhere");
    assert_eq!(headers.get("content-type").unwrap(), "text/plain");

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_event_bridge_through_default_services() {
    for version in SpecVersion::ALL {
        // GIVEN: default event source and sink, the sink pointing at the bridge
        let bridge = Bridge::start(ComponentConfig::default().with_spec_version(version), |port| {
            vec![
                ServiceDefinition::source(ResourceKind::Event, "default"),
                ServiceDefinition::sink(ResourceKind::Event, "default", "127.0.0.1", port),
            ]
        })
        .await
        .unwrap();
        let recorder = Recorder::new();
        bridge
            .transport
            .add_consumer("knative:event/myEvent", recorder.echo())
            .unwrap();

        // WHEN: an event named myEvent is produced
        bridge
            .transport
            .producer("knative:event/myEvent")
            .unwrap()
            .send(Envelope::new("test"))
            .await
            .unwrap();

        // WHEN: an unrelated event is produced
        let err = bridge
            .transport
            .producer("knative:event/otherEvent")
            .unwrap()
            .send(Envelope::new("test"))
            .await
            .unwrap_err();

        // THEN: only the matching event reached the consumer
        assert_eq!(err.status_code(), Some(404), "version {}", version);
        let received = recorder.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event_type(), Some("myEvent"));
        assert_eq!(received[0].source(), Some("knative://event/myEvent"));
        assert_eq!(received[0].body_str(), Some("test"));

        bridge.shutdown().await.unwrap();
    }
}
