//! REST API for the Withdrawal Queue Service
//!
//! Endpoints:
//! - `POST /api/requests` - Submit withdrawal request(s)
//! - `GET  /api/requests/:id` - Request status
//! - `GET  /api/owners/:address/requests` - Request ids owned by an address
//! - `POST /api/hints` - Resolve checkpoint hints for claiming
//! - `POST /api/claimable` - Claimable wei per request
//! - `POST /api/claim` - Claim finalized requests
//! - `POST /api/transfer` - Transfer request ownership
//! - `POST /api/approve` - Set or clear a per-request approval
//! - `POST /api/approve-all` - Grant/revoke a blanket operator approval
//! - `GET  /api/queue/info` - Queue summary
//! - `POST /api/oracle/report` - Submit an oracle report (oracle role)
//! - `POST /api/pause` / `POST /api/resume` - Lifecycle control (pause role)
//! - `GET  /api/health` - Health check
//!
//! Wei and share amounts are JSON numbers (serde_json handles u128);
//! addresses are 0x-prefixed hex strings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::service::{parse_address, OracleSnapshot, ServiceError, WithdrawalService};
use crate::types::{CheckpointIndex, ClaimReceipt, QueueInfo, RequestId, Timestamp, Wei};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub caller: String,
    /// Defaults to the caller when absent
    pub owner: Option<String>,
    pub amounts: Vec<Wei>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_ids: Vec<RequestId>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub id: RequestId,
    pub owner: String,
    pub amount_of_value: Wei,
    pub amount_of_shares: u128,
    pub created_at: Timestamp,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OwnedRequestsResponse {
    pub owner: String,
    pub request_ids: Vec<RequestId>,
}

#[derive(Debug, Deserialize)]
pub struct HintsRequest {
    /// Strictly ascending request ids
    pub request_ids: Vec<RequestId>,
}

#[derive(Debug, Serialize)]
pub struct HintsResponse {
    /// 0 means no covering checkpoint (not yet finalized)
    pub hints: Vec<CheckpointIndex>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimableRequest {
    pub request_ids: Vec<RequestId>,
    pub hints: Vec<CheckpointIndex>,
}

#[derive(Debug, Serialize)]
pub struct ClaimableResponse {
    pub claimable: Vec<Wei>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub caller: String,
    pub request_id: RequestId,
    /// Resolved server-side when absent
    pub hint: Option<CheckpointIndex>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub caller: String,
    pub from: String,
    pub to: String,
    pub request_id: RequestId,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub caller: String,
    /// The zero address clears the approval
    pub to: String,
    pub request_id: RequestId,
}

#[derive(Debug, Deserialize)]
pub struct ApproveAllRequest {
    pub caller: String,
    pub operator: String,
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct OracleReportRequest {
    pub caller: String,
    pub share_rate: u128,
    pub available_budget: Wei,
    pub is_bunker_mode: bool,
    pub bunker_start_timestamp: Timestamp,
    pub report_timestamp: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub caller: String,
    pub duration_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub caller: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub details: String,
}

// =============================================================================
// Application State and Error Mapping
// =============================================================================

pub type AppState = Arc<WithdrawalService>;

/// Service error wrapped for axum
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.error_code();
        let status = match code {
            "ROLE_DENIED" | "NOT_OWNER_OR_APPROVED" | "INCORRECT_OWNER" => StatusCode::FORBIDDEN,
            "INVALID_REQUEST_ID" | "REQUEST_NOT_FINALIZED" => StatusCode::NOT_FOUND,
            "REQUEST_ALREADY_CLAIMED" => StatusCode::CONFLICT,
            "PAUSED" => StatusCode::SERVICE_UNAVAILABLE,
            "STORAGE_ERROR" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = ErrorResponse {
            error: code,
            details: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// API Handlers
// =============================================================================

/// POST /api/requests
async fn handle_submit(
    State(service): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let owner = match &req.owner {
        Some(owner) => parse_address(owner)?,
        None => caller,
    };

    let request_ids = service.submit_requests(caller, owner, &req.amounts).await?;
    Ok(Json(SubmitResponse { request_ids }))
}

/// GET /api/requests/:id
async fn handle_request_status(
    State(service): State<AppState>,
    Path(id): Path<RequestId>,
) -> Result<Json<StatusResponse>, ApiError> {
    let statuses = service.withdrawal_status(&[id]).await?;
    let status = &statuses[0];
    Ok(Json(StatusResponse {
        id: status.id,
        owner: status.owner.to_string(),
        amount_of_value: status.amount_of_value,
        amount_of_shares: status.amount_of_shares,
        created_at: status.created_at,
        status: status.phase().to_string(),
    }))
}

/// GET /api/owners/:address/requests
async fn handle_owned_requests(
    State(service): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<OwnedRequestsResponse>, ApiError> {
    let owner = parse_address(&address)?;
    let request_ids = service.requests_by_owner(owner).await;
    Ok(Json(OwnedRequestsResponse {
        owner: owner.to_string(),
        request_ids,
    }))
}

/// POST /api/hints
async fn handle_hints(
    State(service): State<AppState>,
    Json(req): Json<HintsRequest>,
) -> Result<Json<HintsResponse>, ApiError> {
    let last = service.last_checkpoint_index().await;
    let hints = service
        .find_checkpoint_hints(&req.request_ids, 1, last)
        .await?;
    Ok(Json(HintsResponse {
        hints: hints.into_iter().map(|h| h.unwrap_or(0)).collect(),
    }))
}

/// POST /api/claimable
async fn handle_claimable(
    State(service): State<AppState>,
    Json(req): Json<ClaimableRequest>,
) -> Result<Json<ClaimableResponse>, ApiError> {
    let claimable = service.claimable_value(&req.request_ids, &req.hints).await?;
    Ok(Json(ClaimableResponse { claimable }))
}

/// POST /api/claim
async fn handle_claim(
    State(service): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimReceipt>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let receipt = service.claim(caller, req.request_id, req.hint).await?;
    Ok(Json(receipt))
}

/// POST /api/transfer
async fn handle_transfer(
    State(service): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let from = parse_address(&req.from)?;
    let to = parse_address(&req.to)?;

    service.transfer(caller, from, to, req.request_id).await?;
    Ok(Json(OkResponse { success: true }))
}

/// POST /api/approve
async fn handle_approve(
    State(service): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let to = parse_address(&req.to)?;

    service.approve(caller, to, req.request_id).await?;
    Ok(Json(OkResponse { success: true }))
}

/// POST /api/approve-all
async fn handle_approve_all(
    State(service): State<AppState>,
    Json(req): Json<ApproveAllRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let operator = parse_address(&req.operator)?;

    service
        .set_approval_for_all(caller, operator, req.approved)
        .await?;
    Ok(Json(OkResponse { success: true }))
}

/// GET /api/queue/info
async fn handle_queue_info(State(service): State<AppState>) -> Json<QueueInfo> {
    Json(service.info().await)
}

/// POST /api/oracle/report
async fn handle_oracle_report(
    State(service): State<AppState>,
    Json(req): Json<OracleReportRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let report = OracleSnapshot {
        share_rate: req.share_rate,
        available_budget: req.available_budget,
        is_bunker_mode: req.is_bunker_mode,
        bunker_start_timestamp: req.bunker_start_timestamp,
        report_timestamp: req.report_timestamp,
    };

    service.oracle_report(caller, report).await?;
    Ok(Json(OkResponse { success: true }))
}

/// POST /api/pause
async fn handle_pause(
    State(service): State<AppState>,
    Json(req): Json<PauseRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    service.pause_for(caller, req.duration_secs).await?;
    Ok(Json(OkResponse { success: true }))
}

/// POST /api/resume
async fn handle_resume(
    State(service): State<AppState>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    service.resume(caller).await?;
    Ok(Json(OkResponse { success: true }))
}

/// GET /api/health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "exitq-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Router Setup
// =============================================================================

/// Create the API router with all endpoints
pub fn create_router(service: Arc<WithdrawalService>) -> Router {
    // CORS configuration - allow frontend origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/requests", post(handle_submit))
        .route("/api/requests/:id", get(handle_request_status))
        .route("/api/owners/:address/requests", get(handle_owned_requests))
        .route("/api/hints", post(handle_hints))
        .route("/api/claimable", post(handle_claimable))
        .route("/api/claim", post(handle_claim))
        .route("/api/transfer", post(handle_transfer))
        .route("/api/approve", post(handle_approve))
        .route("/api/approve-all", post(handle_approve_all))
        .route("/api/queue/info", get(handle_queue_info))
        .route("/api/oracle/report", post(handle_oracle_report))
        .route("/api/pause", post(handle_pause))
        .route("/api/resume", post(handle_resume))
        .layer(cors)
        .with_state(service)
}

/// Start the API server
pub async fn start_server(
    service: Arc<WithdrawalService>,
    host: &str,
    port: u16,
) -> Result<(), std::io::Error> {
    let app = create_router(service);
    let addr = format!("{host}:{port}");

    info!(target: "exitq::api", %addr, "API server starting");
    println!("=== exitq Withdrawal Queue API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /api/requests               - Submit withdrawal request(s)");
    println!("  GET  /api/requests/:id           - Request status");
    println!("  GET  /api/owners/:addr/requests  - Requests by owner");
    println!("  POST /api/hints                  - Resolve checkpoint hints");
    println!("  POST /api/claim                  - Claim a finalized request");
    println!("  GET  /api/queue/info             - Queue summary");
    println!("  GET  /api/health                 - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::service::AccessPolicy;
    use crate::storage::MemoryQueueStore;
    use crate::types::units::{ether, SHARE_RATE_PRECISION};

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const ORACLE: &str = "0x9999999999999999999999999999999999999999";

    async fn test_app() -> Router {
        let mut config = Config::default_for_tests();
        config.safe_border_secs = 0;
        let service = WithdrawalService::open(
            &config,
            Arc::new(MemoryQueueStore::new()),
            AccessPolicy::allow_all(),
        )
        .await
        .unwrap();
        create_router(Arc::new(service))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        post_raw(uri, body.to_string())
    }

    /// For payloads carrying numbers wider than u64, which
    /// `serde_json::Value` cannot represent.
    fn post_raw(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_and_status() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/requests",
                serde_json::json!({ "caller": ALICE, "amounts": [ether(1)] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["request_ids"], serde_json::json!([1]));

        let response = app
            .oneshot(Request::builder().uri("/api/requests/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["amount_of_value"], serde_json::json!(ether(1)));
    }

    #[tokio::test]
    async fn test_unknown_request_is_404() {
        let app = test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/api/requests/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "INVALID_REQUEST_ID");
    }

    #[tokio::test]
    async fn test_bad_address_is_400() {
        let app = test_app().await;

        let response = app
            .oneshot(post_json(
                "/api/requests",
                serde_json::json!({ "caller": "nope", "amounts": [100] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "INVALID_ADDRESS");
    }

    #[tokio::test]
    async fn test_amount_below_minimum_is_400() {
        let app = test_app().await;

        let response = app
            .oneshot(post_json(
                "/api/requests",
                serde_json::json!({ "caller": ALICE, "amounts": [1] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "AMOUNT_TOO_SMALL");
    }

    #[tokio::test]
    async fn test_full_claim_flow_over_http() {
        let app = test_app().await;

        // submit
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/requests",
                serde_json::json!({ "caller": ALICE, "amounts": [ether(1)] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // oracle report funds one ether at rate 1.0; the E27 rate exceeds
        // u64, so the body is built as a raw string
        let report = format!(
            r#"{{"caller":"{ORACLE}","share_rate":{},"available_budget":{},"is_bunker_mode":false,"bunker_start_timestamp":0,"report_timestamp":1700000000}}"#,
            SHARE_RATE_PRECISION,
            ether(1),
        );
        let response = app
            .clone()
            .oneshot(post_raw("/api/oracle/report", report))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // claiming before finalization is a 404
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/claim",
                serde_json::json!({ "caller": ALICE, "request_id": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/pause",
                serde_json::json!({ "caller": ALICE, "duration_secs": 3600 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // submission is rejected while paused
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/requests",
                serde_json::json!({ "caller": ALICE, "amounts": [ether(1)] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .clone()
            .oneshot(post_json("/api/resume", serde_json::json!({ "caller": ALICE })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/api/queue/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["is_paused"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_owned_requests() {
        let app = test_app().await;

        app.clone()
            .oneshot(post_json(
                "/api/requests",
                serde_json::json!({ "caller": ALICE, "amounts": [ether(1), ether(2)] }),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/owners/{ALICE}/requests"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["request_ids"], serde_json::json!([1, 2]));
    }
}
