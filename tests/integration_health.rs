#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    unreachable_pub,
    dead_code
)]
use reqwest::StatusCode;
use std::sync::Arc;
use stride_server::storage::memory::InMemoryTokenStore;
use stride_server::storage::token_store::TokenStore;

mod common;

#[tokio::test]
async fn test_health_probes() {
    let tokens = Arc::new(InMemoryTokenStore::new());
    let url = common::spawn_mgmt_router(tokens as Arc<dyn TokenStore>).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{url}/livez")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.get(format!("{url}/readyz")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"].as_str(), Some("ok"));
    assert_eq!(body["store"].as_str(), Some("ok"));
}
