//! Analysis and Safe endpoints.

use axum::extract::{Json, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppError;
use crate::domain::{
    DecodeRequest, DecodedTransaction, PolicyRequest, PolicySeverity, Provenance, RiskLevel,
    RiskRequest, SimulationRequest, SimulationResult,
};
use crate::safe::{self, SafeError};
use crate::validate;
use crate::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "SafeWatch API" }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}

pub async fn decode(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let calldata = body["calldata"].as_str().unwrap_or_default();
    let contract_address = body["contractAddress"].as_str().unwrap_or_default();
    if calldata.is_empty() || contract_address.is_empty() {
        return Err(AppError::bad_request("Missing calldata or contractAddress"));
    }

    let req: DecodeRequest =
        serde_json::from_value(body).map_err(|e| AppError::bad_request(e.to_string()))?;
    let mut errors = Vec::new();
    validate::check_hex_data(&mut errors, "calldata", &req.calldata);
    validate::check_address(&mut errors, "contractAddress", &req.contract_address);
    validate::check_chain_id(&mut errors, req.chain_id);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let decoded = state.decoder.decode(&req).await;
    state.metrics.inc_abi_source(provenance_name(decoded.function_source));
    Ok(Json(json!({ "success": true, "decoded": decoded })))
}

pub async fn simulate(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let to = body["to"].as_str().unwrap_or_default();
    if !to.starts_with("0x") {
        return Err(AppError::bad_request("Missing or invalid \"to\" address"));
    }
    let data = body["data"].as_str().unwrap_or_default().to_string();
    let value = body["value"].as_str().unwrap_or("0").to_string();
    if data.is_empty() && (value.is_empty() || value == "0") {
        return Err(AppError::bad_request(
            "Transaction must have calldata or value",
        ));
    }

    let mut errors = Vec::new();
    validate::check_address(&mut errors, "to", to);
    if let Some(from) = body["from"].as_str() {
        validate::check_address(&mut errors, "from", from);
    }
    if !data.is_empty() {
        validate::check_hex_data(&mut errors, "data", &data);
    }
    let chain_id = body["chainId"].as_u64();
    validate::check_chain_id(&mut errors, chain_id);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let result = state
        .simulator
        .simulate(&SimulationRequest {
            to: to.to_string(),
            value,
            data: if data.is_empty() { "0x".to_string() } else { data },
            chain_id: Some(chain_id.unwrap_or(1)),
            from: body["from"].as_str().map(|s| s.to_string()),
        })
        .await;

    Ok(Json(json!({ "success": true, "simulation": result })))
}

pub async fn risk(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    if body["to"].as_str().unwrap_or_default().is_empty() {
        return Err(AppError::bad_request("Missing \"to\" address"));
    }
    let req: RiskRequest =
        serde_json::from_value(body).map_err(|e| AppError::bad_request(e.to_string()))?;
    let mut errors = Vec::new();
    validate::check_address(&mut errors, "to", &req.to);
    if let Some(data) = req.data.as_deref() {
        validate::check_hex_data(&mut errors, "data", data);
    }
    validate::check_chain_id(&mut errors, req.chain_id);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let result = crate::risk::assess(&req);
    let level = match result.score {
        RiskLevel::Green => "green",
        RiskLevel::Yellow => "yellow",
        RiskLevel::Red => "red",
    };
    state.metrics.inc_risk_score(level);
    Ok(Json(json!({ "success": true, "risk": result })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainRequest {
    decoded: Option<DecodedTransaction>,
    simulation: Option<SimulationResult>,
    calldata: Option<String>,
    contract_address: Option<String>,
    value: Option<String>,
    chain_id: Option<u64>,
}

/// Accepts either precomputed `{decoded, simulation}` or raw
/// `{calldata, contractAddress, ...}`, running the analysis inline for
/// the latter.
pub async fn explain(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let req: ExplainRequest =
        serde_json::from_value(body).map_err(|e| AppError::bad_request(e.to_string()))?;

    if let (Some(decoded), Some(simulation)) = (&req.decoded, &req.simulation) {
        let result = crate::explain::explain(decoded, simulation);
        return Ok(Json(json!({ "success": true, "explanation": result })));
    }

    let (Some(calldata), Some(contract_address)) = (req.calldata, req.contract_address) else {
        return Err(AppError::bad_request("Missing decoded or simulation data"));
    };
    let mut errors = Vec::new();
    validate::check_hex_data(&mut errors, "calldata", &calldata);
    validate::check_address(&mut errors, "contractAddress", &contract_address);
    validate::check_chain_id(&mut errors, req.chain_id);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let decoded = state
        .decoder
        .decode(&DecodeRequest {
            calldata: calldata.clone(),
            contract_address: contract_address.clone(),
            chain_id: req.chain_id,
        })
        .await;
    let simulation = state
        .simulator
        .simulate(&SimulationRequest {
            to: contract_address,
            value: req.value.unwrap_or_else(|| "0".to_string()),
            data: calldata,
            chain_id: req.chain_id,
            from: None,
        })
        .await;
    let result = crate::explain::explain(&decoded, &simulation);
    Ok(Json(json!({
        "success": true,
        "decoded": decoded,
        "simulation": simulation,
        "explanation": result,
    })))
}

pub async fn evaluate_policies(Json(body): Json<Value>) -> Result<Json<Value>, AppError> {
    if body["to"].as_str().unwrap_or_default().is_empty() {
        return Err(AppError::bad_request("Missing \"to\" address"));
    }
    if body["data"].as_str().unwrap_or_default().is_empty() {
        return Err(AppError::bad_request("Missing \"data\" field"));
    }
    if body["value"].as_str().unwrap_or_default().is_empty() {
        return Err(AppError::bad_request("Missing \"value\" field"));
    }
    let req: PolicyRequest =
        serde_json::from_value(body).map_err(|e| AppError::bad_request(e.to_string()))?;

    let policies = crate::policy::evaluate(&req);
    let triggered = |s: PolicySeverity| {
        policies
            .iter()
            .filter(|p| p.triggered && p.severity == s)
            .count()
    };
    let summary = json!({
        "total": policies.len(),
        "triggered": policies.iter().filter(|p| p.triggered).count(),
        "critical": triggered(PolicySeverity::Critical),
        "high": triggered(PolicySeverity::High),
        "warning": triggered(PolicySeverity::Warning),
        "medium": triggered(PolicySeverity::Medium),
        "low": triggered(PolicySeverity::Low),
    });
    Ok(Json(json!({ "success": true, "policies": policies, "summary": summary })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeQuery {
    chain_id: Option<u64>,
    all: Option<bool>,
}

pub async fn safe_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<SafeQuery>,
) -> Result<Json<Value>, AppError> {
    if !validate::is_valid_address(&address) {
        return Err(AppError::bad_request("Invalid Safe address"));
    }
    let chain_id = query.chain_id.unwrap_or(1);

    let data = if query.all.unwrap_or(false) {
        state.safe.all_transactions(&address, chain_id, 20).await
    } else {
        state.safe.pending_transactions(&address, chain_id).await
    }
    .map_err(safe_error)?;

    Ok(Json(json!({
        "success": true,
        "chain": chain_id,
        "address": address,
        "count": data.count,
        "transactions": data.results,
    })))
}

pub async fn safe_info(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<SafeQuery>,
) -> Result<Json<Value>, AppError> {
    if !validate::is_valid_address(&address) {
        return Err(AppError::bad_request("Invalid Safe address"));
    }
    let chain_id = query.chain_id.unwrap_or(1);
    let info = state
        .safe
        .safe_info(&address, chain_id)
        .await
        .map_err(safe_error)?;

    let mut out = json!({ "success": true });
    if let (Some(dst), Some(src)) = (out.as_object_mut(), info.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    Ok(Json(out))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    chain_id: Option<u64>,
}

pub async fn poll(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<Value>, AppError> {
    if !validate::is_valid_address(&address) {
        return Err(AppError::bad_request("Invalid Safe address"));
    }
    let chain_id = query.chain_id.unwrap_or(8453);

    let report = safe::poll(
        &state.safe,
        &state.decoder,
        &state.simulator,
        &address,
        chain_id,
    )
    .await
    .map_err(safe_error)?;

    Ok(Json(json!({
        "success": true,
        "count": report.count,
        "summary": report.summary,
        "transactions": report.transactions,
    })))
}

fn safe_error(e: SafeError) -> AppError {
    match e {
        SafeError::NotFound(_) => AppError::failed_with_status(StatusCode::NOT_FOUND, e.to_string()),
        _ => AppError::failed(e.to_string()),
    }
}

fn provenance_name(p: Provenance) -> &'static str {
    match p {
        Provenance::Local => "local",
        Provenance::Etherscan => "etherscan",
        Provenance::Sourcify => "sourcify",
        Provenance::FourByte => "4byte",
        Provenance::Raw => "raw",
    }
}
