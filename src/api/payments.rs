//! Billing endpoints: direct ETH payments verified on Base, Stripe
//! checkout, Daimo Pay webhooks, and promo code redemption.

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::AppError;
use crate::chain::ChainClient;
use crate::registry;
use crate::store::ActivateSubscription;
use crate::util;

pub async fn payment_info() -> impl IntoResponse {
    Json(json!({
        "wallet": registry::PAYMENT_WALLET,
        "chain": "base",
        "chainId": registry::PAYMENT_CHAIN_ID,
        "monthlyPriceUsd": registry::MONTHLY_PRICE_USD,
        "acceptedTokens": ["ETH"],
        "instructions": format!(
            "Send ${} worth of ETH to {} on Base chain. Then call POST /api/payments/verify with your tx hash to activate your subscription.",
            registry::MONTHLY_PRICE_USD,
            registry::PAYMENT_WALLET
        ),
    }))
}

pub async fn verify_payment(
    State(state): State<crate::AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tx_hash = body["txHash"].as_str().unwrap_or_default();
    let address = body["address"].as_str().unwrap_or_default();
    if tx_hash.is_empty() || address.is_empty() {
        return Err(AppError::bad_request("txHash and address are required"));
    }

    if let Some(existing) = state.store.subscription_by_address(address)? {
        if existing.is_active(util::now_ms()) {
            return Ok(Json(json!({
                "status": "active",
                "apiKey": existing.api_key,
                "expiresAt": existing.expires_at,
                "message": "Subscription already active",
            })));
        }
    }

    let chain = ChainClient::for_chain(registry::PAYMENT_CHAIN_ID)
        .ok_or_else(|| AppError::internal("Failed to verify payment"))?;
    let tx = chain
        .transaction_by_hash(tx_hash)
        .await
        .map_err(|e| {
            warn!(error = %e, tx_hash, "payment lookup failed");
            AppError::internal("Failed to verify payment")
        })?
        .ok_or_else(|| AppError::bad_request("Transaction not found on Base chain"))?;

    let to = tx.to.unwrap_or_default().to_lowercase();
    let from = tx.from.unwrap_or_default().to_lowercase();
    if to != registry::PAYMENT_WALLET.to_lowercase() {
        return Err(AppError::bad_request(
            "Transaction recipient does not match payment wallet",
        ));
    }
    if from != address.to_lowercase() {
        return Err(AppError::bad_request(
            "Transaction sender does not match provided address",
        ));
    }

    let value_wei = util::parse_wei(tx.value.as_deref().unwrap_or("0x0"));
    if value_wei < registry::MIN_PAYMENT_WEI {
        return Err(AppError::bad_request(
            "Payment amount too low. Minimum ~$20 in ETH required.",
        ));
    }

    let activation = state.store.activate_subscription(&ActivateSubscription {
        address: address.to_string(),
        paid_tx_hash: Some(tx_hash.to_string()),
        plan: Some("pro".to_string()),
        ..Default::default()
    })?;

    info!(address, tx_hash, "subscription activated via ETH payment");
    Ok(Json(json!({
        "status": "activated",
        "apiKey": activation.api_key,
        "expiresAt": activation.expires_at,
        "plan": "pro",
        "message": "Subscription activated! Use your API key in the Authorization header.",
    })))
}

pub async fn payment_status(
    State(state): State<crate::AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, AppError> {
    let Some(sub) = state.store.subscription_by_address(&address)? else {
        return Ok(Json(json!({
            "status": "inactive",
            "message": "No active subscription",
        })));
    };

    if !sub.is_active(util::now_ms()) {
        return Ok(Json(json!({
            "status": "expired",
            "expiresAt": sub.expires_at,
        })));
    }

    let visible: String = sub.api_key.chars().take(8).collect();
    Ok(Json(json!({
        "status": "active",
        "plan": sub.plan,
        "expiresAt": sub.expires_at,
        "apiKey": format!("{visible}..."),
    })))
}

// ── Stripe ──────────────────────────────────────────────────────────

pub async fn create_checkout(
    State(state): State<crate::AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let Some(secret_key) = state.payments.stripe_secret_key.clone() else {
        return Err(stripe_unconfigured());
    };

    let frontend = &state.payments.frontend_url;
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "subscription".into()),
        ("success_url".into(), format!("{frontend}/app?payment=success")),
        ("cancel_url".into(), format!("{frontend}/login?payment=cancelled")),
    ];
    if let Some(price_id) = &state.payments.stripe_price_id {
        form.push(("line_items[0][price]".into(), price_id.clone()));
        form.push(("line_items[0][quantity]".into(), "1".into()));
    }
    if let Some(email) = body["email"].as_str() {
        form.push(("customer_email".into(), email.to_string()));
    }

    let session: Value = state
        .http
        .post("https://api.stripe.com/v1/checkout/sessions")
        .bearer_auth(&secret_key)
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "stripe checkout request failed");
            AppError::internal("Failed to create checkout session")
        })?
        .json()
        .await
        .map_err(|_| AppError::internal("Failed to create checkout session"))?;

    if let Some(message) = session["error"]["message"].as_str() {
        return Err(AppError::bad_request(message));
    }

    Ok(Json(json!({
        "url": session["url"],
        "sessionId": session["id"],
    })))
}

fn stripe_unconfigured() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "Stripe not configured yet".to_string(),
        details: None,
        success_envelope: false,
        extra: Some(json!({
            "message": "Credit card payments coming soon. Pay with ETH in the meantime.",
            "ethPaymentUrl": "/api/payments/info",
        })),
    }
}

pub async fn stripe_webhook(
    State(state): State<crate::AppState>,
    Json(event): Json<Value>,
) -> Result<Json<Value>, AppError> {
    match event["type"].as_str().unwrap_or_default() {
        "checkout.session.completed" => {
            let object = &event["data"]["object"];
            info!(
                customer_email = %object["customer_email"],
                "stripe checkout completed"
            );
            // the checkout session carries the wallet address as
            // client_reference_id when the frontend set one; otherwise
            // fall back to the email on file
            let address = match object["client_reference_id"].as_str() {
                Some(addr) if !addr.is_empty() => Some(addr.to_string()),
                _ => match object["customer_email"].as_str() {
                    Some(email) => state
                        .store
                        .subscription_by_email(email)?
                        .map(|sub| sub.address),
                    None => None,
                },
            };
            match address {
                Some(address) => {
                    state.store.activate_subscription(&ActivateSubscription {
                        address,
                        email: object["customer_email"].as_str().map(|s| s.to_string()),
                        stripe_customer_id: object["customer"].as_str().map(|s| s.to_string()),
                        stripe_subscription_id: object["subscription"]
                            .as_str()
                            .map(|s| s.to_string()),
                        plan: Some("pro".to_string()),
                        ..Default::default()
                    })?;
                }
                None => warn!("stripe checkout completed with no resolvable address"),
            }
        }
        "customer.subscription.deleted" => {
            let subscription_id = event["data"]["object"]["id"].as_str().unwrap_or_default();
            info!(subscription_id, "stripe subscription cancelled");
            if !subscription_id.is_empty() {
                state
                    .store
                    .deactivate_by_stripe_subscription(subscription_id)?;
            }
        }
        other => info!(event_type = other, "unhandled stripe event"),
    }

    Ok(Json(json!({ "received": true })))
}

pub async fn stripe_status(State(state): State<crate::AppState>) -> impl IntoResponse {
    Json(json!({
        "configured": state.payments.stripe_secret_key.is_some(),
        "priceId": if state.payments.stripe_price_id.is_some() { "set" } else { "not set" },
        "monthlyPriceUsd": registry::MONTHLY_PRICE_USD,
    }))
}

// ── Promo codes ─────────────────────────────────────────────────────

pub async fn redeem_promo(
    State(state): State<crate::AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let code = body["code"].as_str().unwrap_or_default();
    let address = body["address"].as_str().unwrap_or_default();
    if code.is_empty() || address.is_empty() {
        return Err(AppError::bad_request("code and address are required"));
    }

    let code = code.trim().to_uppercase();
    let activation = state.store.redeem_promo_code(&code, address)?;

    Ok(Json(json!({
        "status": "activated",
        "apiKey": activation.api_key,
        "expiresAt": activation.expires_at,
        "plan": "pro",
        "message": "Promo code redeemed! Your 90-day trial is active.",
    })))
}

pub async fn validate_promo(
    State(state): State<crate::AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let code = code.to_uppercase().trim().to_string();
    let promo = state
        .store
        .all_promo_codes()?
        .into_iter()
        .find(|p| p.code == code && p.active);

    let Some(promo) = promo else {
        return Ok(Json(json!({ "valid": false, "message": "Invalid code" })));
    };
    if promo.used_count >= promo.max_uses {
        return Ok(Json(json!({ "valid": false, "message": "Code already used" })));
    }

    Ok(Json(json!({
        "valid": true,
        "plan": promo.plan,
        "durationDays": promo.duration_days,
        "message": format!("Valid! {}-day {} access", promo.duration_days, promo.plan),
    })))
}

// ── Daimo Pay ───────────────────────────────────────────────────────

pub async fn daimo_webhook(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(event): Json<Value>,
) -> Response {
    let credential = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "));
    let authorized = match (credential, &state.payments.daimo_webhook_token) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(cred), Some(expected)) => {
            let decoded = BASE64_STANDARD
                .decode(cred)
                .ok()
                .and_then(|b| String::from_utf8(b).ok());
            cred == expected || decoded.as_deref() == Some(expected.as_str())
        }
    };
    if !authorized {
        warn!("daimo webhook rejected, missing or invalid Basic auth");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let payment = &event["payment"];
    info!(
        event_id = %event["id"],
        event_type = %event["type"],
        payment_id = %payment["id"],
        payment_status = %payment["status"],
        "daimo webhook received"
    );

    let completed = event["type"].as_str() == Some("payment_completed")
        && payment["status"].as_str() == Some("completed");
    if !completed {
        return Json(json!({ "status": "acknowledged" })).into_response();
    }

    let to_address = payment["toAddress"].as_str().unwrap_or_default();
    if to_address.to_lowercase() != registry::PAYMENT_WALLET.to_lowercase() {
        warn!(to_address, "daimo webhook with wrong recipient");
        return bad_request("Invalid payment recipient");
    }
    if payment["toChain"].as_u64() != Some(registry::PAYMENT_CHAIN_ID) {
        return bad_request("Invalid payment chain");
    }
    let to_token = payment["toToken"].as_str().unwrap_or_default();
    if to_token.to_lowercase() != registry::PAYMENT_USDC_BASE.to_lowercase() {
        return bad_request("Invalid payment token");
    }
    let amount = payment["toUnits"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    if !(registry::DAIMO_AMOUNT_MIN..=registry::DAIMO_AMOUNT_MAX).contains(&amount) {
        warn!(amount, "daimo webhook with out-of-range amount");
        return bad_request("Invalid payment amount");
    }

    let from_address = payment["fromAddress"].as_str().unwrap_or_default();
    let payment_id = payment["id"].as_str().unwrap_or_default();
    let activation = state.store.activate_subscription(&ActivateSubscription {
        address: from_address.to_string(),
        paid_tx_hash: Some(payment_id.to_string()),
        plan: Some("pro".to_string()),
        ..Default::default()
    });

    match activation {
        Ok(activation) => {
            info!(from_address, payment_id, "subscription activated via Daimo");
            Json(json!({
                "status": "processed",
                "subscription": {
                    "address": from_address,
                    "plan": "pro",
                    "expiresAt": activation.expires_at,
                },
            }))
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, from_address, "daimo activation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to activate subscription" })),
            )
                .into_response()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}
