pub mod accounts;
pub mod handlers;
pub mod payments;

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::auth::AuthError;
use crate::store::StoreError;
use crate::validate::ValidationError;
use crate::AppState;

const MAX_REQUEST_BODY_BYTES: usize = 100 * 1024;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    details: Option<Vec<ValidationError>>,
    // analysis routes wrap failures in {"success": false, ...}
    success_envelope: bool,
    // additional top-level fields merged into the body
    extra: Option<serde_json::Value>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
            success_envelope: false,
            extra: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            details: None,
            success_envelope: false,
            extra: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            details: None,
            success_envelope: false,
            extra: None,
        }
    }

    /// Analysis-route failure, rendered as `{"success": false, "error": ...}`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            details: None,
            success_envelope: true,
            extra: None,
        }
    }

    pub fn failed_with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            success_envelope: true,
            extra: None,
        }
    }

    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Validation failed".to_string(),
            details: Some(errors),
            success_envelope: false,
            extra: None,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        Self {
            status: e.status(),
            message: e.message().to_string(),
            details: None,
            success_envelope: false,
            extra: None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(msg) => AppError::bad_request(msg),
            StoreError::Db(err) => AppError::internal(format!("database error: {err}")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = if let Some(details) = self.details {
            serde_json::json!({ "error": self.message, "details": details })
        } else if self.success_envelope {
            serde_json::json!({ "success": false, "error": self.message })
        } else {
            serde_json::json!({ "error": self.message })
        };
        if let (Some(dst), Some(serde_json::Value::Object(src))) = (body.as_object_mut(), self.extra)
        {
            for (k, v) in src {
                dst.insert(k, v);
            }
        }
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/decode", post(handlers::decode))
        .route("/api/simulate", post(handlers::simulate))
        .route("/api/risk", post(handlers::risk))
        .route("/api/explain", post(handlers::explain))
        .route("/api/policies/evaluate", post(handlers::evaluate_policies))
        .route(
            "/api/safe/:address/transactions",
            get(handlers::safe_transactions),
        )
        .route("/api/safe/:address/info", get(handlers::safe_info))
        .route("/api/poll/:address", get(handlers::poll))
        .route("/api/payments/info", get(payments::payment_info))
        .route("/api/payments/verify", post(payments::verify_payment))
        .route("/api/payments/status/:address", get(payments::payment_status))
        .route("/api/stripe/create-checkout", post(payments::create_checkout))
        .route("/api/stripe/webhook", post(payments::stripe_webhook))
        .route("/api/stripe/status", get(payments::stripe_status))
        .route("/api/promo/redeem", post(payments::redeem_promo))
        .route("/api/promo/validate/:code", get(payments::validate_promo))
        .route("/api/webhooks/daimo", post(payments::daimo_webhook))
        .route("/api/auth/login", post(accounts::login))
        .route("/api/auth/signup", post(accounts::signup))
        .route("/api/auth/me", get(accounts::me))
        .route("/api/auth/refresh", post(accounts::refresh))
        .route("/api/founders", get(accounts::founders_roster))
        .route("/api/founders/status", get(accounts::founders_status))
        .route("/api/founders/:number", get(accounts::founder_profile))
        .route("/api/founders/progress/me", get(accounts::founder_progress))
        .route("/api/founders/claim", post(accounts::claim_founder))
        .route("/api/founders/profile", put(accounts::update_founder_profile))
        .route(
            "/api/founders/metadata/:number",
            get(accounts::founder_metadata),
        )
        .route("/metrics", get(handlers::metrics))
        .fallback(endpoint_not_found)
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn endpoint_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Endpoint not found" })),
    )
}

/// Per-IP fixed-window limiting plus request metrics for every /api
/// route.
async fn track_request(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !path.starts_with("/api") {
        return next.run(req).await;
    }

    let verdict = state.rate_limiter.check(&addr.ip().to_string()).await;
    if !verdict.allowed {
        let body = serde_json::json!({ "error": "Too many requests, please try again later." });
        let mut resp = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(v) = verdict.retry_after_secs.to_string().parse() {
            resp.headers_mut().insert("Retry-After", v);
        }
        return resp;
    }

    let api_key = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| v.starts_with("sg_"))
        .map(|v| v.to_string());

    let start = Instant::now();
    let resp = next.run(req).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    state.metrics.observe_request(&path, elapsed_ms);
    if resp.status().is_server_error() {
        state.metrics.inc_error(&path);
    }
    if let Some(key) = api_key {
        if let Err(e) = state
            .store
            .log_api_usage(&key, &path, Some(elapsed_ms as i64))
        {
            tracing::warn!(error = %e, "could not record api usage");
        }
    }
    resp
}
