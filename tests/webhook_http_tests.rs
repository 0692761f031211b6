//! HTTP surface tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use shopfront_payments::config::AppConfig;
use shopfront_payments::handlers::{build_app, App};
use shopfront_payments::store::{Buyer, InMemoryStore, Product, SeedData};
use shopfront_payments::stripe::signature::SIGNATURE_HEADER;
use shopfront_payments::stripe::{InMemoryPaymentProvider, SignatureVerifier};

struct Service {
    app: App,
    store: Arc<InMemoryStore>,
    provider: Arc<InMemoryPaymentProvider>,
    config: AppConfig,
}

fn service() -> Service {
    let config = AppConfig::test_config();
    let store = Arc::new(InMemoryStore::with_seed(SeedData {
        buyers: vec![Buyer {
            id: "B1".into(),
            name: None,
            email: Some("b1@example.com".into()),
        }],
        products: vec![Product {
            id: "P1".into(),
            title: "Tee".into(),
            stock: 10,
        }],
    }));
    let provider = Arc::new(InMemoryPaymentProvider::new());
    let app = build_app(&config, store.clone(), provider.clone());
    Service {
        app,
        store,
        provider,
        config,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn json_post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn webhook(config: &AppConfig, body: &str) -> Request<Body> {
    let header = SignatureVerifier::from_config(&config.webhook)
        .sign(body.as_bytes(), chrono::Utc::now().timestamp())
        .unwrap();
    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header(SIGNATURE_HEADER, header)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn checkout_body() -> Value {
    json!({
        "buyer_id": "B1",
        "items": [{
            "product_id": "P1", "title": "Tee", "size": "M", "color": "black",
            "quantity": 3, "price": 1000, "discount": 10
        }]
    })
}

#[tokio::test]
async fn checkout_webhook_and_redelivery() {
    let Service {
        app,
        store,
        provider,
        config,
    } = service();
    let App {
        router,
        processor,
        metrics,
    } = app;
    let worker = tokio::spawn(processor.run());

    let (status, body) = send(&router, json_post("/api/checkout", &checkout_body())).await;
    assert_eq!(status, StatusCode::OK);
    let url = serde_json::from_slice::<Value>(&body).unwrap()["url"]
        .as_str()
        .unwrap()
        .to_string();

    let (session_id, request) = provider.session_requests().into_iter().next().unwrap();
    assert!(url.ends_with(&session_id));
    assert_eq!(request.line_items[0].unit_amount, 900);

    let event = json!({
        "id": "evt_http_1",
        "type": "checkout.session.completed",
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": {
            "id": session_id,
            "customer": request.customer_id,
            "payment_status": "paid",
            "shipping_details": { "address": { "line1": "1 Main St", "country": "US" } }
        }}
    })
    .to_string();

    let (status, _) = send(&router, webhook(&config, &event)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&router, webhook(&config, &event)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "received": true, "duplicate": true })
    );

    // Closing the queue lets the worker finish in-flight events
    drop(router);
    worker.await.unwrap();

    assert_eq!(store.orders().len(), 1);
    assert_eq!(store.stock_of("P1"), Some(7));
    assert!(!store.intake("evt_http_1").unwrap().is_pending());
    let prometheus = metrics.to_prometheus_format();
    assert!(prometheus.contains("shopfront_orders_created_total 1\n"));
    assert!(prometheus.contains("shopfront_webhooks_duplicate_total 1\n"));
}

#[tokio::test]
async fn webhook_rejects_reencoded_body() {
    let Service { app, config, store, .. } = service();
    let signed = r#"{"id":"evt_1","type":"checkout.session.completed","created":1700000000,"data":{"object":{"id":"cs_1","customer":"cus_1"}}}"#;

    let mut request = webhook(&config, signed);
    *request.body_mut() = Body::from(
        serde_json::to_string_pretty(&serde_json::from_str::<Value>(signed).unwrap()).unwrap(),
    );

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "error": "invalid_signature" })
    );
    assert!(store.orders().is_empty());
}

#[tokio::test]
async fn checkout_errors_are_structured() {
    let Service { app, provider, .. } = service();

    let mut unknown = checkout_body();
    unknown["buyer_id"] = json!("nobody");
    let (status, body) = send(&app.router, json_post("/api/checkout", &unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["error"], "not_found");

    let mut bad_discount = checkout_body();
    bad_discount["items"][0]["discount"] = json!(150);
    let (status, body) = send(&app.router, json_post("/api/checkout", &bad_discount)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["error"], "validation");

    let (status, _) = send(&app.router, json_post("/api/checkout", &json!({ "buyer_id": "B1" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(provider.customer_count(), 0);
}

#[tokio::test]
async fn status_health_and_metrics() {
    let Service { app, provider, .. } = service();

    let (status, _) = send(&app.router, json_post("/api/checkout", &checkout_body())).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = provider.session_requests().into_keys().next().unwrap();

    let (status, body) = send(&app.router, get(&format!("/api/checkout/status/{}", session_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "session_id": session_id, "payment_status": "unpaid" })
    );

    let (status, _) = send(&app.router, get("/api/checkout/status/cs_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["status"], "healthy");

    let (status, body) = send(&app.router, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body)
        .unwrap()
        .contains("shopfront_checkout_sessions_created_total 1"));
}
