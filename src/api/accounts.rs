//! Account sessions and the Founders Program endpoints.

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::AppError;
use crate::chain::ChainClient;
use crate::registry;
use crate::store::{ActivateSubscription, ClaimFounderSpot, Subscription, FOUNDER_CAP};
use crate::util;
use crate::AppState;

const THIRTY_DAYS_MS: i64 = 30 * 24 * 60 * 60 * 1000;

fn user_json(sub: &Subscription) -> Value {
    json!({
        "id": sub.id,
        "address": sub.address,
        "tier": sub.plan,
        "apiKey": sub.api_key,
        "expiresAt": sub.expires_at,
    })
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let address = body["address"].as_str().unwrap_or_default();
    if address.is_empty() {
        return Err(AppError::bad_request("Address is required"));
    }
    let addr = address.to_lowercase();

    let sub = if let Some(api_key) = body["apiKey"].as_str().filter(|k| !k.is_empty()) {
        match state.store.subscription_by_api_key(api_key)? {
            Some(sub) if sub.address == addr => sub,
            _ => {
                return Err(AppError {
                    status: StatusCode::UNAUTHORIZED,
                    message: "Invalid API key for this address".to_string(),
                    details: None,
                    success_envelope: false,
                    extra: None,
                })
            }
        }
    } else {
        state
            .store
            .subscription_by_address(&addr)?
            .ok_or_else(|| AppError::not_found("No subscription found for this address"))?
    };

    if !sub.is_active(util::now_ms()) {
        return Err(AppError {
            status: StatusCode::UNAUTHORIZED,
            message: "Subscription expired".to_string(),
            details: None,
            success_envelope: false,
            extra: None,
        });
    }

    let token = state
        .auth
        .sign(sub.id, &sub.address, &sub.plan)
        .map_err(|_| AppError::internal("Login failed"))?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": user_json(&sub),
    })))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let address = body["address"].as_str().unwrap_or_default();
    if address.is_empty() {
        return Err(AppError::bad_request("Address is required"));
    }
    let addr = address.to_lowercase();
    let tier = body["tier"].as_str().unwrap_or("scout");

    if state.store.subscription_by_address(&addr)?.is_some() {
        return Err(AppError {
            status: StatusCode::CONFLICT,
            message: "User already exists for this address".to_string(),
            details: None,
            success_envelope: false,
            extra: None,
        });
    }

    if tier == "scout" {
        state.store.create_free_subscription(&addr)?;
    } else {
        state.store.activate_subscription(&ActivateSubscription {
            address: addr.clone(),
            plan: Some(tier.to_string()),
            duration_ms: Some(THIRTY_DAYS_MS),
            ..Default::default()
        })?;
    }

    let sub = state
        .store
        .subscription_by_address(&addr)?
        .ok_or_else(|| AppError::internal("Signup failed"))?;
    let token = state
        .auth
        .sign(sub.id, &sub.address, &sub.plan)
        .map_err(|_| AppError::internal("Signup failed"))?;

    info!(address = %addr, tier = %sub.plan, "account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "token": token,
            "user": user_json(&sub),
        })),
    )
        .into_response())
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.authenticate_jwt(&headers, &state.store)?;
    Ok(Json(json!({
        "success": true,
        "user": {
            "id": user.id,
            "address": user.address,
            "tier": user.tier,
            "apiKey": user.subscription.api_key,
            "expiresAt": user.subscription.expires_at,
            "email": user.subscription.email,
            "plan": user.subscription.plan,
            "createdAt": user.subscription.created_at,
        },
    })))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user = state.auth.authenticate_jwt(&headers, &state.store)?;
    let token = state
        .auth
        .sign(user.id, &user.address, &user.tier)
        .map_err(|_| AppError::internal("Token refresh failed"))?;
    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": user_json(&user.subscription),
    })))
}

// ── Founders Program ────────────────────────────────────────────────

/// API-key identity for the founders routes. Any failure collapses to
/// the same 401 so callers cannot probe key validity.
fn api_key_sub(state: &AppState, headers: &HeaderMap) -> Result<Subscription, AppError> {
    state
        .auth
        .authenticate_api_key(headers, &state.store)
        .map(|user| user.subscription)
        .map_err(|_| AppError {
            status: StatusCode::UNAUTHORIZED,
            message: "API key required in Authorization header".to_string(),
            details: None,
            success_envelope: false,
            extra: None,
        })
}

pub async fn founders_status(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let status = state.store.founder_status()?;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

pub async fn founders_roster(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let status = state.store.founder_status()?;
    let founders: Vec<Value> = state
        .store
        .all_founders()?
        .into_iter()
        .map(|f| {
            json!({
                "number": f.founder_number,
                "displayName": f
                    .display_name
                    .unwrap_or_else(|| format!("Founder #{}", f.founder_number)),
                "twitterHandle": f.twitter_handle,
                "moltbookUsername": f.moltbook_username,
                "isGenesis10": f.is_genesis_10,
                "nftMinted": f.nft_minted,
                "joinedAt": if f.qualified_at > 0 { json!(f.qualified_at) } else { Value::Null },
            })
        })
        .collect();

    let mut out = serde_json::to_value(status).unwrap_or_default();
    if let Some(obj) = out.as_object_mut() {
        obj.insert("founders".to_string(), Value::Array(founders));
    }
    Ok(Json(out))
}

fn parse_founder_number(raw: &str) -> Option<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|n| (1..=FOUNDER_CAP).contains(n))
}

pub async fn founder_profile(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<Value>, AppError> {
    let num = parse_founder_number(&number)
        .ok_or_else(|| AppError::bad_request("Invalid founder number. Must be 1-100."))?;
    let founder = state
        .store
        .founder_by_number(num)?
        .ok_or_else(|| AppError::not_found(format!("Founder #{num} has not been claimed yet.")))?;

    Ok(Json(json!({
        "number": founder.founder_number,
        "displayName": founder
            .display_name
            .unwrap_or_else(|| format!("Founder #{}", founder.founder_number)),
        "address": util::truncate_address(&founder.address),
        "twitterHandle": founder.twitter_handle,
        "moltbookUsername": founder.moltbook_username,
        "isGenesis10": founder.is_genesis_10,
        "nftMinted": founder.nft_minted,
        "umbraAllocated": founder.umbra_allocated,
        "joinedAt": founder.qualified_at,
    })))
}

pub async fn founder_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let sub = api_key_sub(&state, &headers)?;

    if let Some(founder) = state.store.founder_by_address(&sub.address)? {
        return Ok(Json(json!({
            "status": "founder",
            "founderNumber": founder.founder_number,
            "isGenesis10": founder.is_genesis_10,
            "message": format!("You are Founder #{}!", founder.founder_number),
        })));
    }

    let remaining = state.store.founder_status()?.remaining;
    let Some(progress) = state.store.founder_progress(&sub.address)? else {
        return Ok(Json(json!({
            "status": "not_started",
            "requirements": {
                "accountCreated": true,
                "safeConfigured": false,
                "txsAnalyzed": { "current": 0, "required": 3 },
                "daysActive": { "current": 0, "required": 7 },
            },
            "qualified": false,
            "spotsRemaining": remaining,
        })));
    };

    Ok(Json(json!({
        "status": if progress.qualified { "qualified" } else { "in_progress" },
        "requirements": {
            "accountCreated": true,
            "safeConfigured": progress.safe_configured,
            "txsAnalyzed": { "current": progress.txs_analyzed, "required": 3 },
            "daysActive": { "current": progress.days_active, "required": 7 },
            "fastTracked": progress.fast_tracked,
        },
        "qualified": progress.qualified,
        "qualifiedAt": progress.qualified_at,
        "spotsRemaining": remaining,
    })))
}

pub async fn claim_founder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let sub = api_key_sub(&state, &headers)?;

    let fast_track = body["fastTrack"].as_bool().unwrap_or(false);
    let tx_hash = body["txHash"].as_str().map(|s| s.to_string());

    if fast_track {
        if let Some(hash) = tx_hash.as_deref() {
            verify_fast_track_payment(hash, &sub.address).await?;
        }
    }

    let (founder, api_key) = state.store.claim_founder_spot(&ClaimFounderSpot {
        address: sub.address.clone(),
        display_name: body["displayName"].as_str().map(|s| s.to_string()),
        tx_hash,
        fast_track,
    })?;

    info!(
        address = %sub.address,
        founder_number = founder.founder_number,
        "founder spot claimed"
    );
    Ok(Json(json!({
        "status": "claimed",
        "founderNumber": founder.founder_number,
        "isGenesis10": founder.is_genesis_10,
        "umbraAllocated": founder.umbra_allocated,
        "apiKey": api_key,
        "plan": "founder",
        "message": format!(
            "🛡️ Welcome, Founder #{}! You now have lifetime Pro access.",
            founder.founder_number
        ),
    })))
}

async fn verify_fast_track_payment(tx_hash: &str, address: &str) -> Result<(), AppError> {
    let chain = ChainClient::for_chain(registry::PAYMENT_CHAIN_ID)
        .ok_or_else(|| AppError::internal("Failed to verify payment transaction"))?;
    let tx = chain
        .transaction_by_hash(tx_hash)
        .await
        .map_err(|e| {
            warn!(error = %e, tx_hash, "fast-track payment lookup failed");
            AppError::internal("Failed to verify payment transaction")
        })?
        .ok_or_else(|| AppError::bad_request("Transaction not found on Base chain"))?;

    if tx.to.unwrap_or_default().to_lowercase() != registry::PAYMENT_WALLET.to_lowercase() {
        return Err(AppError::bad_request(
            "Transaction recipient does not match payment wallet",
        ));
    }
    if tx.from.unwrap_or_default().to_lowercase() != address.to_lowercase() {
        return Err(AppError::bad_request(
            "Transaction sender does not match your address",
        ));
    }
    if util::parse_wei(tx.value.as_deref().unwrap_or("0x0")) < registry::MIN_PAYMENT_WEI {
        return Err(AppError::bad_request(
            "Payment amount too low. Minimum ~$20 in ETH required.",
        ));
    }
    Ok(())
}

pub async fn update_founder_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let sub = api_key_sub(&state, &headers)?;

    let founder = state
        .store
        .founder_by_address(&sub.address)?
        .ok_or_else(|| AppError {
            status: StatusCode::FORBIDDEN,
            message: "You are not a founder".to_string(),
            details: None,
            success_envelope: false,
            extra: None,
        })?;

    let updated = state.store.update_founder_profile(
        founder.founder_number,
        &sub.address,
        body["displayName"].as_str(),
        body["twitterHandle"].as_str(),
        body["moltbookUsername"].as_str(),
    )?;
    if !updated {
        return Err(AppError::internal("Failed to update profile"));
    }

    Ok(Json(json!({
        "status": "updated",
        "founderNumber": founder.founder_number,
        "message": "Founder profile updated successfully",
    })))
}

pub async fn founder_metadata(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<Value>, AppError> {
    let num = parse_founder_number(&number)
        .ok_or_else(|| AppError::bad_request("Invalid founder number"))?;
    let founder = state
        .store
        .founder_by_number(num)?
        .ok_or_else(|| AppError::not_found("Token does not exist"))?;

    let base = state.payments.frontend_url.trim_end_matches('/');
    Ok(Json(json!({
        "name": format!("SafeWatch Founder #{num}"),
        "description": format!(
            "One of {FOUNDER_CAP} founding members of SafeWatch, the transaction firewall for Safe multisig wallets. This pass grants lifetime Pro access, governance rights, and permanent Founder status."
        ),
        "image": format!("{base}/founders/nft/{num}.png"),
        "external_url": format!("{base}/founders/{num}"),
        "attributes": [
            { "trait_type": "Founder Number", "value": founder.founder_number, "display_type": "number" },
            { "trait_type": "Tier", "value": if founder.is_genesis_10 { "Genesis 10" } else { "Founder" } },
            { "trait_type": "Genesis 10", "value": if founder.is_genesis_10 { "Yes" } else { "No" } },
            { "trait_type": "Join Date", "value": founder.qualified_at / 1000, "display_type": "date" },
            { "trait_type": "UMBRA Allocated", "value": founder.umbra_allocated, "display_type": "number" },
        ],
    })))
}
