// 🌐 HTTP API - axum router over the compliance engine
//
// Routes (JSON, camelCase):
//   GET  /health
//   GET  /api/routes                  ?vesselType&fuelType&year
//   POST /api/routes/:id/baseline
//   GET  /api/routes/comparison       ?vesselType&fuelType&year
//   GET  /api/compliance/cb           ?shipId&year
//   GET  /api/compliance/adjusted-cb  ?year
//   GET  /api/banking/records         ?shipId&year
//   POST /api/banking/bank
//   POST /api/banking/apply
//   GET  /api/pools                   ?year
//   POST /api/pools
//   POST /api/pools/validate
//
// Errors: NotFound → 404, InvalidOperation / missing params → 400, storage → 500

use crate::banking::{BankEntry, BankRecord};
use crate::compliance::ComplianceBalance;
use crate::engine::{ComparisonReport, ComplianceEngine, PoolOutcome};
use crate::error::ComplianceError;
use crate::pooling::{Pool, PoolCreationRequest, PoolValidationResult};
use crate::routes::{Route, RouteFilter};
use crate::store::SqliteStore;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ComplianceEngine<SqliteStore>>,
}

impl AppState {
    pub fn new(engine: ComplianceEngine<SqliteStore>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error body: `{"error": "...", "details": [...]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Compliance(ComplianceError),
}

impl From<ComplianceError> for ApiError {
    fn from(err: ComplianceError) -> Self {
        ApiError::Compliance(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error,
                    details: Vec::new(),
                },
            ),
            ApiError::Compliance(err) => {
                let status = if err.is_not_found() {
                    StatusCode::NOT_FOUND
                } else if err.is_invalid_operation() {
                    StatusCode::BAD_REQUEST
                } else {
                    tracing::error!(error = %err, "request failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                let details = err.details().to_vec();
                (
                    status,
                    ErrorBody {
                        error: err.to_string(),
                        details,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn required<T>(value: Option<T>, message: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipYearQuery {
    pub ship_id: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

/// Body of POST /api/banking/bank and /api/banking/apply
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingRequest {
    pub ship_id: Option<String>,
    pub year: Option<i32>,
    pub cb_amount: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl BankingRequest {
    fn into_parts(self) -> ApiResult<(String, i32, f64, Option<String>)> {
        match (self.ship_id, self.year, self.cb_amount) {
            (Some(ship_id), Some(year), Some(amount)) if !ship_id.is_empty() => {
                Ok((ship_id, year, amount, self.description))
            }
            _ => Err(ApiError::BadRequest(
                "shipId, year, and cbAmount are required".to_string(),
            )),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/routes - Routes, optionally filtered
async fn get_routes(
    State(state): State<AppState>,
    Query(filter): Query<RouteFilter>,
) -> ApiResult<Json<Vec<Route>>> {
    Ok(Json(state.engine.list_routes(&filter)?))
}

/// POST /api/routes/:id/baseline - Make one route the baseline
async fn set_baseline(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
) -> ApiResult<Json<Route>> {
    Ok(Json(state.engine.set_baseline(&route_id)?))
}

/// GET /api/routes/comparison - Compare routes against the baseline
async fn get_comparison(
    State(state): State<AppState>,
    Query(filter): Query<RouteFilter>,
) -> ApiResult<Json<ComparisonReport>> {
    Ok(Json(state.engine.compare(&filter)?))
}

/// GET /api/compliance/cb - One ship's compliance balance
async fn get_compliance_balance(
    State(state): State<AppState>,
    Query(query): Query<ShipYearQuery>,
) -> ApiResult<Json<ComplianceBalance>> {
    let ship_id = required(query.ship_id, "shipId and year are required")?;
    let year = required(query.year, "shipId and year are required")?;

    Ok(Json(state.engine.get_balance(&ship_id, year)?))
}

/// GET /api/compliance/adjusted-cb - Every balance for a year
async fn get_adjusted_balances(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Json<Vec<ComplianceBalance>>> {
    let year = required(query.year, "year is required")?;
    Ok(Json(state.engine.adjusted_balances(year)?))
}

/// GET /api/banking/records - Bank record derived from the ledger
async fn get_bank_record(
    State(state): State<AppState>,
    Query(query): Query<ShipYearQuery>,
) -> ApiResult<Json<BankRecord>> {
    let ship_id = required(query.ship_id, "shipId and year are required")?;
    let year = required(query.year, "shipId and year are required")?;

    Ok(Json(state.engine.bank_record(&ship_id, year)?))
}

/// POST /api/banking/bank - Bank surplus
async fn bank_surplus(
    State(state): State<AppState>,
    Json(request): Json<BankingRequest>,
) -> ApiResult<(StatusCode, Json<BankEntry>)> {
    let (ship_id, year, amount, description) = request.into_parts()?;
    let entry = state.engine.bank(&ship_id, year, amount, description)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// POST /api/banking/apply - Apply banked surplus
async fn apply_banked(
    State(state): State<AppState>,
    Json(request): Json<BankingRequest>,
) -> ApiResult<(StatusCode, Json<BankEntry>)> {
    let (ship_id, year, amount, description) = request.into_parts()?;
    let entry = state.engine.apply(&ship_id, year, amount, description)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/pools - Pools of a year, newest first
async fn get_pools(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Json<Vec<Pool>>> {
    let year = required(query.year, "year is required")?;
    Ok(Json(state.engine.list_pools(year)?))
}

/// POST /api/pools - Validate and create a pool
async fn create_pool(
    State(state): State<AppState>,
    Json(request): Json<PoolCreationRequest>,
) -> ApiResult<(StatusCode, Json<PoolOutcome>)> {
    let outcome = state.engine.create_pool(&request)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/pools/validate - Dry run, nothing persisted
async fn validate_pool(
    State(state): State<AppState>,
    Json(request): Json<PoolCreationRequest>,
) -> ApiResult<Json<PoolValidationResult>> {
    Ok(Json(state.engine.validate_pool_request(&request)?))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/routes", get(get_routes))
        .route("/routes/comparison", get(get_comparison))
        .route("/routes/:id/baseline", post(set_baseline))
        .route("/compliance/cb", get(get_compliance_balance))
        .route("/compliance/adjusted-cb", get(get_adjusted_balances))
        .route("/banking/records", get(get_bank_record))
        .route("/banking/bank", post(bank_surplus))
        .route("/banking/apply", post(apply_banked))
        .route("/pools", get(get_pools).post(create_pool))
        .route("/pools/validate", post(validate_pool))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// ============================================================================
// TESTS
// ============================================================================
