//! HTTP intake and read API for ptrack.
//!
//! - `POST /products` writes a `PENDING` row and queues its creation event
//! - `GET /products`, `GET /products/:id` read the reconciliation store
//! - `POST /products/:id/retry` requeues a `FAILED` product
//! - `GET /ledger/products/:id` reads the ledger's own copy
//! - `GET /v1/health`
//!
//! Verification itself happens asynchronously in the worker; callers poll
//! the product's `status`.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ApiError, ServerError, ServerResult};
pub use handler::AppState;
pub use router::build_router;
pub use server::PtrackServer;

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use ptrack_broker::{Broker, BrokerConfig};
    use ptrack_gateway::{CreateRequest, Gateway, GatewayConfig, InProcessPeer, LedgerClient};
    use ptrack_ledger::LedgerNetwork;
    use ptrack_store::{InMemoryProductStore, ProductStore, StatusUpdate};
    use ptrack_types::{ProductFields, ProductId, TxId};
    use ptrack_worker::IntakeService;

    struct TestApp {
        router: Router,
        broker: Arc<Broker>,
        store: Arc<InMemoryProductStore>,
        ledger: Arc<Gateway<InProcessPeer>>,
    }

    fn app() -> TestApp {
        let broker = Arc::new(Broker::in_memory(BrokerConfig::default()));
        let store = Arc::new(InMemoryProductStore::new());
        let intake = Arc::new(IntakeService::new(store.clone(), broker.clone(), "product.create"));
        let ledger = Arc::new(Gateway::new(
            InProcessPeer::new(Arc::new(LedgerNetwork::default())),
            GatewayConfig::default(),
        ));
        let state = AppState::new(intake).with_ledger(ledger.clone());
        TestApp {
            router: build_router(state, &ServerConfig::default()),
            broker,
            store,
            ledger,
        }
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn product(id: &str) -> Value {
        json!({
            "id": id,
            "name": "Arabica beans",
            "producerId": "farm-7",
            "manufactureDate": "2024-03-01",
            "integrityHash": "h1",
            "status": "VERIFIED"
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = app();
        let (status, body) = send(&app.router, Method::GET, "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_writes_pending_row_and_queues_event() {
        let app = app();
        let (status, body) = send(&app.router, Method::POST, "/products", Some(product("P1"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Product creation requested");
        // The caller's status is ignored.
        assert_eq!(body["product"]["status"], "PENDING");
        assert_eq!(body["product"]["producerId"], "farm-7");

        let partition = ptrack_broker::partition_for(b"P1", 3);
        let events = app.broker.fetch("product.create", partition, 0, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, b"P1");
    }

    #[tokio::test]
    async fn snake_case_input_is_accepted() {
        let app = app();
        let body = json!({
            "id": "P1",
            "name": "n",
            "producer_id": "p",
            "manufacture_date": "d",
            "integrity_hash": "h"
        });
        let (status, _) = send(&app.router, Method::POST, "/products", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn invalid_bodies_are_bad_requests() {
        let app = app();
        let (status, body) =
            send(&app.router, Method::POST, "/products", Some(json!({ "id": "P1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let mut blank = product("P1");
        blank["integrityHash"] = json!("  ");
        let (status, _) = send(&app.router, Method::POST, "/products", Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app.router, Method::POST, "/products", Some(product(""))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_conflicts() {
        let app = app();
        send(&app.router, Method::POST, "/products", Some(product("P1"))).await;
        let (status, body) = send(&app.router, Method::POST, "/products", Some(product("P1"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn read_side_lists_by_recency() {
        let app = app();
        for id in ["P1", "P2", "P3"] {
            send(&app.router, Method::POST, "/products", Some(product(id))).await;
        }
        let (status, body) = send(&app.router, Method::GET, "/products", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["P3", "P2", "P1"]);

        let (status, body) = send(&app.router, Method::GET, "/products/P2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "P2");

        let (status, body) = send(&app.router, Method::GET, "/products/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Product not found");
    }

    #[tokio::test]
    async fn retry_requeues_failed_products() {
        let app = app();
        send(&app.router, Method::POST, "/products", Some(product("P1"))).await;
        let id = ProductId::new("P1").unwrap();
        app.store.record_attempt(&id).unwrap();

        // Submitted and still in flight.
        let (status, _) = send(&app.router, Method::POST, "/products/P1/retry", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        app.store
            .apply_outcome(&id, &StatusUpdate::failed("transport: connect timeout after 10s"))
            .unwrap();
        let (status, body) = send(&app.router, Method::POST, "/products/P1/retry", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["product"]["status"], "PENDING");
        assert_eq!(body["product"]["attempts"], 0);

        let partition = ptrack_broker::partition_for(b"P1", 3);
        assert_eq!(app.broker.end_offset("product.create", partition).unwrap(), 2);

        let (status, _) = send(&app.router, Method::POST, "/products/ghost/retry", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn verified_products_cannot_be_retried() {
        let app = app();
        send(&app.router, Method::POST, "/products", Some(product("P1"))).await;
        let id = ProductId::new("P1").unwrap();
        app.store
            .apply_outcome(&id, &StatusUpdate::verified(TxId::derive("mychannel", "product_cc", b"n")))
            .unwrap();

        let (status, body) = send(&app.router, Method::POST, "/products/P1/retry", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("VERIFIED"));
    }

    #[tokio::test]
    async fn ledger_view() {
        let app = app();
        let (status, _) = send(&app.router, Method::GET, "/ledger/products/P1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let receipt = app
            .ledger
            .submit_create(&CreateRequest {
                id: ProductId::new("P1").unwrap(),
                fields: ProductFields::new("n", "p", "d", "h"),
            })
            .await
            .unwrap();
        let (status, body) = send(&app.router, Method::GET, "/ledger/products/P1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cert_hash"], "h");
        assert_eq!(body["tx_id"], receipt.tx_id.to_hex());
    }

    #[tokio::test]
    async fn ledger_view_requires_a_ledger() {
        let broker = Arc::new(Broker::in_memory(BrokerConfig::default()));
        let store = Arc::new(InMemoryProductStore::new());
        let intake = Arc::new(IntakeService::new(store, broker, "product.create"));
        let router = build_router(AppState::new(intake), &ServerConfig::default());

        let (status, _) = send(&router, Method::GET, "/ledger/products/P1", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let app = app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/products")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
