//! End-to-end delivery through the factory and deferred queue, with an
//! in-memory transport standing in for the intake service.

use std::sync::Arc;

use eventbus::config::StreamSettings;
use eventbus::hooks::{PageDeletedListener, PAGE_DELETE_STREAM};
use eventbus::serializers::page::PageDeletion;
use eventbus::serializers::{PageRecord, Site, UserRecord};
use eventbus::{
    parse_config, DeferredQueue, EventBusConfig, EventBusFactory, EventBusHooks, EventTypes, HttpOutcome,
    MemoryTransport, RequestContext, SendOutcome,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const CONFIG: &str = r#"
producer_name = "mediawiki_eventbus"
default_service = "intake-main"
domain = "en.wikipedia.org"

[services.intake-main]
url = "http://intake.main"
timeout_secs = 2.5

[services.intake-analytics]
url = "http://intake.analytics"

[streams."mediawiki.revision-score".producers.mediawiki_eventbus]
event_service_name = "intake-analytics"

[streams."mediawiki.page-links-change".producers.mediawiki_eventbus]
enabled = false
"#;

fn factory(transport: Arc<MemoryTransport>) -> EventBusFactory {
    let config = parse_config(CONFIG).expect("fixture config parses");
    EventBusFactory::new(config, transport)
}

fn event(stream: &str, n: u32) -> Value {
    json!({
        "$schema": "/test/1.0.0",
        "meta": {"stream": stream, "uri": "https://en.wikipedia.org/wiki/X", "id": format!("id-{n}")},
        "n": n,
    })
}

fn sent_bodies(transport: &MemoryTransport) -> Vec<(String, Vec<Value>)> {
    transport
        .requests()
        .iter()
        .map(|r| (r.url.clone(), serde_json::from_slice(&r.body).expect("body is JSON")))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn page_deletes_flush_as_one_post_to_the_resolved_service() {
    let transport = Arc::new(MemoryTransport::new());
    let factory = factory(transport.clone());

    let mut queue = DeferredQueue::new();
    queue
        .enqueue(
            "mediawiki.page-delete",
            (1..=3).map(|n| event("mediawiki.page-delete", n)).collect(),
        )
        .unwrap();
    let report = queue.flush(&factory).await;

    assert!(report.is_success());
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://intake.main");
    assert_eq!(requests[0].header("content-type"), Some("application/json"));

    let body: Vec<Value> = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body.len(), 3);
    for e in &body {
        assert_eq!(e["meta"]["stream"], "mediawiki.page-delete");
    }
}

#[tokio::test]
async fn stream_override_routes_to_its_own_service() {
    let transport = Arc::new(MemoryTransport::new());
    let factory = factory(transport.clone());

    let other = factory.get_instance_for_stream("mediawiki.revision-score").unwrap();
    let default = factory.get_instance_for_stream("unconfigured.stream").unwrap();
    assert_eq!(other.url(), "http://intake.analytics");
    assert_eq!(default.url(), "http://intake.main");
    assert_eq!(default.service().timeout.as_millis(), 2500);
}

#[tokio::test]
async fn mixed_queue_splits_by_service_and_drops_disabled_streams() {
    let transport = Arc::new(MemoryTransport::new());
    let factory = factory(transport.clone());

    let mut queue = DeferredQueue::new();
    queue.enqueue("mediawiki.page-delete", vec![event("mediawiki.page-delete", 1)]).unwrap();
    queue.enqueue("mediawiki.revision-score", vec![event("mediawiki.revision-score", 2)]).unwrap();
    queue.enqueue("mediawiki.page-links-change", vec![event("mediawiki.page-links-change", 3)]).unwrap();
    queue.enqueue("mediawiki.page-move", vec![event("mediawiki.page-move", 4)]).unwrap();

    let report = queue.flush(&factory).await;

    assert_eq!(report.dropped, 1);
    let sent = sent_bodies(&transport);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "http://intake.main");
    assert_eq!(
        sent[0].1,
        vec![event("mediawiki.page-delete", 1), event("mediawiki.page-move", 4)]
    );
    assert_eq!(sent[1].0, "http://intake.analytics");
    assert_eq!(sent[1].1, vec![event("mediawiki.revision-score", 2)]);
}

#[tokio::test]
async fn large_batch_is_split_but_order_survives() {
    let transport = Arc::new(MemoryTransport::new());
    let mut config: EventBusConfig = parse_config(CONFIG).unwrap();
    config.max_batch_bytes = 400;
    let factory = EventBusFactory::new(config, transport.clone());

    let events: Vec<Value> = (0..12).map(|n| event("mediawiki.page-delete", n)).collect();
    let bus = factory.get_default_instance().unwrap();
    let outcome = bus.send(events.clone(), EventTypes::EVENT).await;

    assert_eq!(outcome, SendOutcome::Delivered);
    let requests = transport.requests();
    assert!(requests.len() > 1);
    let mut rejoined = Vec::new();
    for r in &requests {
        assert!(r.body.len() <= 400);
        let part: Vec<Value> = serde_json::from_slice(&r.body).unwrap();
        rejoined.extend(part);
    }
    assert_eq!(rejoined, events);
}

#[tokio::test]
async fn rejected_sub_batch_is_reported_with_code_and_reason() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond_with(HttpOutcome::status(400, "R"));
    let factory = factory(transport.clone());

    let bus = factory.get_default_instance().unwrap();
    let outcome = bus.send(vec![event("s", 1)], EventTypes::EVENT).await;

    assert!(outcome
        .errors()
        .contains(&"Unable to deliver all events: 400: R".to_string()));
}

#[tokio::test]
async fn disabled_event_types_never_reach_the_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let config = parse_config(CONFIG)
        .unwrap()
        .with_enabled_event_types(EventTypes::EVENT);
    let factory = EventBusFactory::new(config, transport.clone());

    let bus = factory.get_default_instance().unwrap();
    assert_eq!(bus.send(vec![event("s", 1)], EventTypes::CDN).await, SendOutcome::Suppressed);
    assert_eq!(transport.calls(), 0);

    assert_eq!(bus.send(vec![event("s", 1)], EventTypes::EVENT).await, SendOutcome::Delivered);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn listener_output_reaches_the_intake() {
    let transport = Arc::new(MemoryTransport::new());
    let config = EventBusConfig::default()
        .with_service("intake-main", "http://intake.main")
        .with_service("intake-deletes", "http://intake.deletes")
        .with_default_service("intake-main")
        .with_stream(
            PAGE_DELETE_STREAM,
            StreamSettings::for_producer("mediawiki_eventbus", "intake-deletes"),
        );
    let factory = Arc::new(EventBusFactory::new(config, transport.clone()));
    let hooks = EventBusHooks::new(factory.clone(), Site::new("https://en.wikipedia.org", "enwiki"));

    let page = PageRecord::new(42, 0, "Main Page");
    let admin = UserRecord::named(3, "Admin");
    let ctx = RequestContext::new("en.wikipedia.org").with_request_id("req-1");
    let mut queue = DeferredQueue::for_request(ctx.clone());
    hooks
        .on_page_deleted(
            &mut queue,
            &ctx,
            &PageDeletion {
                page: &page,
                performer: Some(&admin),
                reason: b"spam",
                latest_rev_id: Some(99),
                rev_count: Some(3),
                suppressed: false,
            },
        )
        .unwrap();

    let report = queue.flush(&factory).await;
    assert!(report.is_success());

    let sent = sent_bodies(&transport);
    assert_eq!(sent[0].0, "http://intake.deletes");
    let e = &sent[0].1[0];
    assert_eq!(e["meta"]["stream"], PAGE_DELETE_STREAM);
    assert_eq!(e["meta"]["request_id"], "req-1");
    assert_eq!(e["page_title"], "Main_Page");
}
