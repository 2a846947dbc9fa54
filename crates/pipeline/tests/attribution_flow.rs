#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use funnel_attribution::AttributionEngine;
use funnel_capi::CapiClient;
use funnel_core::config::{CapiConfig, MatcherConfig};
use funnel_core::event_bus::capture_sink;
use funnel_core::types::EventType;
use funnel_core::VisitorRepository;
use funnel_pipeline::{DeliveryOutcome, SaleProcessor};
use funnel_tracking::{InMemoryVisitorStore, RetentionPolicy, VisitorCollector};
use mockito::Matcher;
use serde_json::json;

fn visitor_payload(session: &str, minutes_ago: i64, city: &str) -> serde_json::Value {
    json!({
        "external_id": session,
        "timestamp": (Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339(),
        "visitor_data": {
            "ip": "200.10.20.30",
            "country": "Brazil",
            "countryCode": "BR",
            "regionName": "São Paulo",
            "city": city,
            "zip": "01310-100"
        },
        "page_data": { "user_agent": "Mozilla/5.0 (X11; Linux x86_64)" },
        "facebook_pixel": { "fbp": "fb.1.1714564800.42" }
    })
}

fn webhook(transaction: &str) -> serde_json::Value {
    json!({
        "body": {
            "event": "PURCHASE_APPROVED",
            "data": {
                "purchase": {
                    "transaction": transaction,
                    "order_date": Utc::now().timestamp_millis(),
                    "status": "APPROVED",
                    "price": { "value": 97.0, "currency_value": "BRL" }
                },
                "buyer": {
                    "email": "cliente@example.com",
                    "checkout_phone": "11999990000",
                    "address": { "city": "Sao Paulo", "state": "SP", "country": "BR", "zipcode": "01310100" }
                },
                "product": { "id": 3, "name": "Livro de Receitas" }
            }
        }
    })
}

#[tokio::test]
async fn test_visitor_to_conversion_flow() {
    let mut server = mockito::Server::new_async().await;
    let capi = server
        .mock("POST", "/v21.0/PIXEL/events")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""event_id":"HP-FLOW""#.into()),
            Matcher::Regex(r#""external_id":"close""#.into()),
            Matcher::Regex(r#""client_ip_address":"200.10.20.30""#.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"events_received":1}"#)
        .create_async()
        .await;

    let store: Arc<dyn VisitorRepository> = Arc::new(InMemoryVisitorStore::new());
    let events = capture_sink();
    let collector = VisitorCollector::new(store.clone())
        .with_retention(RetentionPolicy::new(Duration::hours(24)))
        .with_event_sink(events.clone());

    collector.record_visitor(&visitor_payload("far", 50, "Sao Paulo")).unwrap();
    collector.record_visitor(&visitor_payload("close", 2, "São Paulo")).unwrap();
    collector.record_visitor(&visitor_payload("stale", 60 * 30, "Sao Paulo")).unwrap();
    // The 30-hour-old visit is swept on ingest.
    assert_eq!(store.len(), 2);

    let engine = Arc::new(
        AttributionEngine::new(&MatcherConfig::default(), store.clone())
            .with_event_sink(events.clone()),
    );
    let client = CapiClient::new(CapiConfig {
        pixel_id: "PIXEL".into(),
        access_token: "token".into(),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let client = Arc::new(client);
    let processor = SaleProcessor::new(engine.clone())
        .with_conversion_sink(client.clone())
        .with_event_sink(events.clone());

    let outcome = processor.process_webhook(&webhook("HP-FLOW")).await.unwrap();

    let matched = outcome.matched.unwrap();
    assert_eq!(matched.session_id, "close");
    // "SP" does not contain "Sao Paulo", so no state points.
    assert_eq!(matched.confidence, 95);
    assert!(matches!(outcome.delivery, DeliveryOutcome::Delivered { .. }));
    capi.assert_async().await;

    assert_eq!(client.stats().successful_events, 1);
    assert_eq!(events.count_type(EventType::VisitorRecorded), 3);
    assert_eq!(events.count_type(EventType::MatchFound), 1);

    let stats = engine.stats(Utc::now());
    assert_eq!(stats.visitors.total, 2);
    assert_eq!(stats.matches.total, 1);
    assert_eq!(stats.match_rate, 50);
}

#[tokio::test]
async fn test_unconfigured_delivery_keeps_the_match() {
    let store: Arc<dyn VisitorRepository> = Arc::new(InMemoryVisitorStore::new());
    VisitorCollector::new(store.clone())
        .record_visitor(&visitor_payload("only", 1, "Sao Paulo"))
        .unwrap();

    let engine = Arc::new(AttributionEngine::new(&MatcherConfig::default(), store));
    let client = Arc::new(CapiClient::new(CapiConfig::default()).unwrap());
    let processor = SaleProcessor::new(engine.clone()).with_conversion_sink(client.clone());

    let outcome = processor.process_webhook(&webhook("HP-NOCFG")).await.unwrap();
    assert!(outcome.matched.is_some());
    match outcome.delivery {
        DeliveryOutcome::Failed { kind, retriable, .. } => {
            assert_eq!(kind, "not_configured");
            assert!(!retriable);
        }
        other => panic!("unexpected delivery outcome {other:?}"),
    }
    assert_eq!(client.stats().failed_events, 1);
    assert_eq!(engine.recent_matches(10).len(), 1);
}
