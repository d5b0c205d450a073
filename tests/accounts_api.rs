use std::net::SocketAddr;

use serde_json::json;
use tokio::net::TcpListener;

use safewatch::{
    api,
    auth::AuthService,
    store::{ActivateSubscription, ProgressUpdate, Store},
    AppState,
};

const ALICE: &str = "0xaaaa00000000000000000000000000000000aaaa";
const BOB: &str = "0xbbbb00000000000000000000000000000000bbbb";

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
async fn signup_login_me_refresh_round_trip() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/auth/signup"))
        .json(&json!({ "address": ALICE }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["tier"], "scout");
    assert!(body["user"]["apiKey"].as_str().unwrap().starts_with("sg_"));

    // duplicate signup is rejected
    let resp = client
        .post(format!("{base}/api/auth/signup"))
        .json(&json!({ "address": ALICE }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "User already exists for this address");

    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({ "address": ALICE }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let resp = client
        .get(format!("{base}/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["user"]["address"], ALICE);
    assert_eq!(body["user"]["plan"], "scout");

    let resp = client
        .post(format!("{base}/api/auth/refresh"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(!body["token"].as_str().unwrap().is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn login_error_paths() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Address is required");

    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({ "address": ALICE }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No subscription found for this address");

    client
        .post(format!("{base}/api/auth/signup"))
        .json(&json!({ "address": ALICE }))
        .send()
        .await
        .unwrap();
    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({ "address": ALICE, "apiKey": "sg_wrongwrongwrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid API key for this address");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn promo_redeem_and_validate() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/promo/redeem"))
        .json(&json!({ "code": "sg-b8uk5ilu", "address": ALICE }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "activated");
    assert_eq!(body["plan"], "pro");
    assert!(body["apiKey"].as_str().unwrap().starts_with("sg_"));
    assert_eq!(
        body["message"],
        "Promo code redeemed! Your 90-day trial is active."
    );

    // single-use code shows as consumed afterwards
    let resp = client
        .get(format!("{base}/api/promo/validate/SG-B8UK5ILU"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "Code already used");

    let resp = client
        .get(format!("{base}/api/promo/validate/SG-NOTACODE"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "Invalid code");

    let resp = client
        .get(format!("{base}/api/promo/validate/SG-D5FKT83Y"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["durationDays"], 90);
    assert_eq!(body["message"], "Valid! 90-day pro access");

    let resp = client
        .post(format!("{base}/api/promo/redeem"))
        .json(&json!({ "code": "SG-B8UK5ILU" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "code and address are required");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn payment_info_and_status() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("{base}/api/payments/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["wallet"], "0xCc75959A8Fa6ed76F64172925c0799ad94ab0B84");
    assert_eq!(body["chainId"], 8453);
    assert_eq!(body["monthlyPriceUsd"], 20);

    let body: serde_json::Value = client
        .get(format!("{base}/api/payments/status/{ALICE}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["message"], "No active subscription");

    let resp = client
        .post(format!("{base}/api/payments/verify"))
        .json(&json!({ "txHash": "0xabc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "txHash and address are required");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn stripe_degrades_gracefully_when_unconfigured() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("{base}/api/stripe/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["configured"], false);
    assert_eq!(body["priceId"], "not set");

    let resp = client
        .post(format!("{base}/api/stripe/create-checkout"))
        .json(&json!({ "email": "user@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Stripe not configured yet");
    assert_eq!(body["ethPaymentUrl"], "/api/payments/info");

    // webhooks are always acknowledged
    let body: serde_json::Value = client
        .post(format!("{base}/api/stripe/webhook"))
        .json(&json!({ "type": "invoice.paid" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["received"], true);

    let _ = shutdown.send(());
}

fn daimo_event(status: &str, to_units: &str) -> serde_json::Value {
    json!({
        "id": "evt_1",
        "type": if status == "completed" { "payment_completed" } else { "payment_pending" },
        "payment": {
            "id": "pay_123",
            "status": status,
            "fromAddress": BOB,
            "toAddress": "0xCc75959A8Fa6ed76F64172925c0799ad94ab0B84",
            "toChain": 8453,
            "toToken": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "toUnits": to_units,
            "timestamp": 1700000000
        }
    })
}

#[tokio::test]
async fn daimo_webhook_activates_subscription() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    // missing Basic auth
    let resp = client
        .post(format!("{base}/api/webhooks/daimo"))
        .json(&daimo_event("completed", "20.00"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");

    // pending payments are acknowledged but not processed
    let body: serde_json::Value = client
        .post(format!("{base}/api/webhooks/daimo"))
        .header("Authorization", "Basic whatever")
        .json(&daimo_event("pending", "20.00"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "acknowledged");

    // out-of-range amount
    let resp = client
        .post(format!("{base}/api/webhooks/daimo"))
        .header("Authorization", "Basic whatever")
        .json(&daimo_event("completed", "5.00"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid payment amount");

    // valid completed payment activates a pro subscription
    let body: serde_json::Value = client
        .post(format!("{base}/api/webhooks/daimo"))
        .header("Authorization", "Basic whatever")
        .json(&daimo_event("completed", "20.00"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "processed");
    assert_eq!(body["subscription"]["plan"], "pro");

    let body: serde_json::Value = client
        .get(format!("{base}/api/payments/status/{BOB}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "active");
    assert!(body["apiKey"].as_str().unwrap().ends_with("..."));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn founders_public_endpoints() {
    let (base, shutdown) = start_server(test_state()).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("{base}/api/founders/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["cap"], 100);
    assert_eq!(body["remaining"], 100);
    assert_eq!(body["genesis10Remaining"], 10);
    assert_eq!(body["closed"], false);

    let resp = client
        .get(format!("{base}/api/founders/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid founder number. Must be 1-100.");

    let resp = client
        .get(format!("{base}/api/founders/5"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Founder #5 has not been claimed yet.");

    let resp = client
        .get(format!("{base}/api/founders/metadata/0"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{base}/api/founders/progress/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "API key required in Authorization header");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn founder_claim_profile_and_metadata() {
    let state = test_state();
    let store = state.store.clone();
    let (base, shutdown) = start_server(state).await;
    let client = reqwest::Client::new();

    let activation = store
        .activate_subscription(&ActivateSubscription {
            address: ALICE.to_string(),
            ..Default::default()
        })
        .unwrap();

    // not yet qualified
    let resp = client
        .post(format!("{base}/api/founders/claim"))
        .bearer_auth(&activation.api_key)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    store
        .update_founder_progress(
            ALICE,
            &ProgressUpdate {
                safe_configured: Some(true),
                txs_analyzed: Some(3),
                days_active: Some(7),
                ..Default::default()
            },
        )
        .unwrap();

    let body: serde_json::Value = client
        .get(format!("{base}/api/founders/progress/me"))
        .bearer_auth(&activation.api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "qualified");
    assert_eq!(body["requirements"]["txsAnalyzed"]["current"], 3);

    let resp = client
        .post(format!("{base}/api/founders/claim"))
        .bearer_auth(&activation.api_key)
        .json(&json!({ "displayName": "alice.eth" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "claimed");
    assert_eq!(body["founderNumber"], 1);
    assert_eq!(body["isGenesis10"], true);
    assert_eq!(body["umbraAllocated"], 100000);
    assert_eq!(body["plan"], "founder");

    let body: serde_json::Value = client
        .get(format!("{base}/api/founders/progress/me"))
        .bearer_auth(&activation.api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "founder");
    assert_eq!(body["message"], "You are Founder #1!");

    let resp = client
        .put(format!("{base}/api/founders/profile"))
        .bearer_auth(&activation.api_key)
        .json(&json!({ "displayName": "Alice", "twitterHandle": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "updated");

    let body: serde_json::Value = client
        .get(format!("{base}/api/founders/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["displayName"], "Alice");
    assert_eq!(body["isGenesis10"], true);
    assert!(body["address"].as_str().unwrap().contains("..."));

    let body: serde_json::Value = client
        .get(format!("{base}/api/founders/metadata/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["name"], "SafeWatch Founder #1");
    let attributes = body["attributes"].as_array().unwrap();
    assert!(attributes
        .iter()
        .any(|a| a["trait_type"] == "Tier" && a["value"] == "Genesis 10"));

    let body: serde_json::Value = client
        .get(format!("{base}/api/founders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["remaining"], 99);
    assert_eq!(body["founders"].as_array().unwrap().len(), 1);

    // a non-founder cannot edit a profile
    let other = store
        .activate_subscription(&ActivateSubscription {
            address: BOB.to_string(),
            ..Default::default()
        })
        .unwrap();
    let resp = client
        .put(format!("{base}/api/founders/profile"))
        .bearer_auth(&other.api_key)
        .json(&json!({ "displayName": "Bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "You are not a founder");

    let _ = shutdown.send(());
}
