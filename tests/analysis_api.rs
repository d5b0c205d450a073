use std::net::SocketAddr;

use serde_json::json;
use tokio::net::TcpListener;

use safewatch::{
    api,
    auth::AuthService,
    safety::{RateLimitConfig, RateLimiter},
    store::Store,
    AppState,
};

// Safe v1.3.0 singleton; recognized without any RPC lookup.
const SAFE_SINGLETON: &str = "0xd9Db270c1B5E3Bd161E8c8503c55ceabee709552";

const APPROVE_UNLIMITED: &str = "0x095ea7b30000000000000000000000003333333333333333333333333333333333333333ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

fn test_state() -> AppState {
    let store = Store::in_memory().unwrap();
    AppState::new(store, AuthService::new("test-secret"))
}

async fn start_server(state: AppState) -> (String, tokio::sync::oneshot::Sender<()>) {
    let app = api::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    (url, tx)
}

#[tokio::test]
async fn health_reports_service_name() {
    let (base, shutdown) = start_server(test_state()).await;
    let body: serde_json::Value = reqwest::get(format!("{base}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "SafeWatch API");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn unknown_endpoint_returns_404_envelope() {
    let (base, shutdown) = start_server(test_state()).await;
    let resp = reqwest::get(format!("{base}/api/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Endpoint not found");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn decode_identifies_erc20_approve() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/decode"))
        .json(&json!({
            "calldata": APPROVE_UNLIMITED,
            "contractAddress": SAFE_SINGLETON,
            "chainId": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["decoded"]["functionName"], "approve");
    assert_eq!(body["decoded"]["functionSource"], "local");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn decode_requires_calldata_and_address() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/decode"))
        .json(&json!({ "calldata": "0x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing calldata or contractAddress");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn decode_rejects_malformed_fields_with_details() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/decode"))
        .json(&json!({
            "calldata": "zzzz",
            "contractAddress": "0x1234",
            "chainId": 137
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Validation failed");
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 3);
    assert!(details.iter().any(|d| d["field"] == "chainId"));
    let _ = shutdown.send(());
}

#[tokio::test]
async fn simulate_returns_mock_result_without_tenderly() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/simulate"))
        .json(&json!({
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0",
            "data": APPROVE_UNLIMITED,
            "chainId": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["simulation"]["success"], true);
    assert!(body["simulation"]["gasUsed"].as_u64().unwrap() > 0);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn simulate_rejects_empty_transaction() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/simulate"))
        .json(&json!({
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0",
            "data": ""
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Transaction must have calldata or value");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn risk_flags_unlimited_approval_as_red() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/risk"))
        .json(&json!({
            "to": "0x2222222222222222222222222222222222222222",
            "data": APPROVE_UNLIMITED,
            "value": "0",
            "chainId": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["risk"]["score"], "red");
    let codes: Vec<&str> = body["risk"]["reasons"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["code"].as_str())
        .collect();
    assert!(codes.contains(&"UNLIMITED_APPROVAL"));
    let _ = shutdown.send(());
}

#[tokio::test]
async fn policies_always_report_all_five() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/policies/evaluate"))
        .json(&json!({
            "to": "0x2222222222222222222222222222222222222222",
            "data": APPROVE_UNLIMITED,
            "value": "0"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["summary"]["total"], 5);
    assert!(body["summary"]["triggered"].as_u64().unwrap() >= 1);
    let triggered: Vec<&str> = body["policies"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["triggered"] == true)
        .filter_map(|p| p["policyId"].as_str())
        .collect();
    assert!(triggered.contains(&"unlimited-approval"));
    let _ = shutdown.send(());
}

#[tokio::test]
async fn explain_requires_decoded_and_simulation() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/explain"))
        .json(&json!({ "decoded": null, "simulation": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing decoded or simulation data");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn explain_summarizes_a_transfer() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/explain"))
        .json(&json!({
            "decoded": {
                "functionName": "transfer",
                "functionSignature": "transfer(address,uint256)",
                "parameters": [
                    { "name": "to", "type": "address", "value": "0x3333333333333333333333333333333333333333" },
                    { "name": "amount", "type": "uint256", "value": "1000000" }
                ],
                "protocol": null,
                "contractVerified": true
            },
            "simulation": {
                "success": true,
                "gasUsed": 52000,
                "gasLimit": 78000,
                "balanceChanges": [],
                "events": []
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(!body["explanation"]["summary"].as_str().unwrap().is_empty());
    let _ = shutdown.send(());
}

#[tokio::test]
async fn per_ip_rate_limit_returns_429() {
    let mut state = test_state();
    state.rate_limiter = RateLimiter::new(RateLimitConfig {
        requests_per_window: 2,
        window_secs: 60,
        max_clients: 128,
    });
    let (base, shutdown) = start_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .get(format!("{base}/api/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let resp = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("Retry-After"));
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests, please try again later.");
    let _ = shutdown.send(());
}

#[tokio::test]
async fn metrics_endpoint_exposes_request_counters() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap();
    let text = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("safewatch_requests_total{endpoint=\"/api/health\"} 1"));
    let _ = shutdown.send(());
}
