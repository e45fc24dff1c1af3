//! REST API server for txledger
//!
//! Exposes balance lookups, transaction submission and ledger queries over
//! HTTP. Handlers validate input, call into the ledger / chain / gateway and
//! map their typed errors onto status codes.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

use crate::chain::{ChainClient, TokenReader};
use crate::error::{ChainError, GatewayError, LedgerError};
use crate::gateway::BalanceGateway;
use crate::persistence::LedgerStore;
use crate::transaction::{
    is_account_id, is_signed_payload, NewTransaction, TransactionFilter, TransactionRecord,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state behind every handler
pub struct ApiState {
    pub ledger: Arc<dyn LedgerStore>,
    pub chain: Arc<dyn ChainClient>,
    pub gateway: BalanceGateway,
    request_timeout: Duration,
    api_stats: RwLock<ApiStats>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_submitted: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl ApiState {
    /// The chain client doubles as the native balance source for the gateway.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainClient>,
        token: Arc<dyn TokenReader>,
    ) -> Self {
        Self {
            ledger,
            gateway: BalanceGateway::new(chain.clone(), token),
            chain,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            api_stats: RwLock::new(ApiStats::new()),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get API statistics
    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            transactions_submitted: stats.transactions_submitted,
            uptime_seconds: uptime,
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    NotFound(String),
    Ledger(LedgerError),
    Chain(ChainError),
    Gateway(GatewayError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Ledger(e) => {
                let status = match e {
                    LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                    LedgerError::Conflict { .. } => StatusCode::CONFLICT,
                    LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    LedgerError::Cancelled => StatusCode::REQUEST_TIMEOUT,
                };
                (status, e.to_string())
            }
            ApiError::Chain(e) => (StatusCode::BAD_GATEWAY, format!("Failed to submit transaction: {}", e)),
            ApiError::Gateway(GatewayError::Cancelled) => (
                StatusCode::REQUEST_TIMEOUT,
                GatewayError::Cancelled.to_string(),
            ),
            ApiError::Gateway(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::Gateway(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitTransactionRequest {
    pub signed_tx: String,
    pub sender: String,
    pub receiver: String,
    /// Decimal string, so no precision is lost in JSON number parsing
    #[serde(deserialize_with = "deserialize_exact_amount")]
    pub amount: Decimal,
}

/// Refuses amounts `Decimal` could only hold by rounding.
fn deserialize_exact_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Decimal::from_str_exact(raw.trim()).map_err(|e| {
        serde::de::Error::custom(format!("amount '{}' is not exactly representable: {}", raw, e))
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTransactionResponse {
    pub hash: String,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub native_balance: String,
    pub token_balance: String,
}

#[derive(Serialize)]
pub struct TransactionsPage {
    pub count: usize,
    pub offset: u64,
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_submitted: u64,
    pub uptime_seconds: u64,
}

#[derive(Deserialize)]
struct TransactionsQuery {
    sender: Option<String>,
    receiver: Option<String>,
    #[serde(default)]
    offset: u64,
}

// ============================================================================
// Utility Functions
// ============================================================================

/// A token cancelled when the returned guard drops, i.e. when the handler
/// finishes or its future is dropped by the timeout layer or a disconnect.
fn request_cancellation() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// Empty query parameters count as absent; present ones must be account ids.
fn parse_filter_param(name: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if is_account_id(&v) => Ok(Some(v)),
        Some(v) => {
            warn!(param = name, value = %v, "Invalid filter");
            Err(ApiError::InvalidInput(format!("Invalid {} filter", name)))
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
async fn stats_middleware(State(state): State<Arc<ApiState>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    let mut stats = state.api_stats.write().await;
    stats.record_request(success);

    response
}

/// Request logging middleware. Logs method, path, status and duration.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        // Balance endpoints
        .route("/balance/:address", get(get_balance))
        // Transaction endpoints
        .route("/transaction", post(submit_transaction))
        .route("/transaction/:hash", get(get_transaction))
        .route("/transactions", get(get_transactions))
        // System endpoints
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        // logging outermost so rejected and timed out requests are still logged
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API until `shutdown` resolves
pub async fn run_api_server<F>(
    state: Arc<ApiState>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_api_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_balance(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    if !is_account_id(&address) {
        warn!(address = %address, "Invalid address format");
        return Err(ApiError::InvalidInput("Invalid address".to_string()));
    }

    let (cancel, _guard) = request_cancellation();
    let view = state
        .gateway
        .get_balances(&address, &cancel)
        .await
        .map_err(|e| {
            error!(address = %address, error = %e, "Failed to get balances");
            ApiError::from(e)
        })?;

    info!(
        address = %address,
        native = %view.native_balance,
        token = %view.token_balance,
        "Balance retrieved"
    );
    Ok(Json(BalanceResponse {
        address,
        native_balance: view.native_balance,
        token_balance: view.token_balance,
    }))
}

async fn submit_transaction(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<SubmitTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTransactionResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "Invalid request body");
        ApiError::InvalidInput("Invalid request body".to_string())
    })?;

    if !is_signed_payload(&req.signed_tx) {
        warn!(signed_tx = %req.signed_tx, "Invalid signed transaction format");
        return Err(ApiError::InvalidInput(
            "Invalid signed transaction format".to_string(),
        ));
    }
    if !is_account_id(&req.sender) {
        warn!(sender = %req.sender, "Invalid sender address");
        return Err(ApiError::InvalidInput("Invalid sender address".to_string()));
    }
    if !is_account_id(&req.receiver) {
        warn!(receiver = %req.receiver, "Invalid receiver address");
        return Err(ApiError::InvalidInput("Invalid receiver address".to_string()));
    }
    if req.amount <= Decimal::ZERO {
        warn!(amount = %req.amount, "Invalid amount");
        return Err(ApiError::InvalidInput("Amount must be positive".to_string()));
    }

    let hash = state
        .chain
        .submit_signed_transaction(&req.signed_tx)
        .await
        .map_err(|e| {
            error!(signed_tx = %req.signed_tx, error = %e, "Failed to submit transaction");
            ApiError::Chain(e)
        })?;

    let (cancel, _guard) = request_cancellation();
    let tx = NewTransaction::pending(hash.clone(), req.sender, req.receiver, req.amount);
    let admission = state.ledger.admit(tx, &cancel).await.map_err(|e| {
        error!(hash = %hash, error = %e, "Failed to save transaction");
        ApiError::from(e)
    })?;

    {
        let mut stats = state.api_stats.write().await;
        stats.transactions_submitted += 1;
    }

    let record = admission.record();
    info!(
        hash = %record.hash,
        sender = %record.sender,
        receiver = %record.receiver,
        inserted = admission.inserted(),
        "Transaction submitted"
    );
    Ok((StatusCode::CREATED, Json(SubmitTransactionResponse { hash })))
}

async fn get_transactions(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Json<TransactionsPage>, ApiError> {
    let filter = TransactionFilter {
        sender: parse_filter_param("sender", params.sender)?,
        receiver: parse_filter_param("receiver", params.receiver)?,
    };

    let (cancel, _guard) = request_cancellation();
    let transactions = state
        .ledger
        .query(filter.clone(), params.offset, &cancel)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to retrieve transactions");
            ApiError::from(e)
        })?;

    info!(
        count = transactions.len(),
        sender = ?filter.sender,
        receiver = ?filter.receiver,
        offset = params.offset,
        "Transactions retrieved"
    );
    Ok(Json(TransactionsPage {
        count: transactions.len(),
        offset: params.offset,
        transactions,
    }))
}

async fn get_transaction(
    State(state): State<Arc<ApiState>>,
    Path(hash): Path<String>,
) -> Result<Json<TransactionRecord>, ApiError> {
    let (cancel, _guard) = request_cancellation();
    state
        .ledger
        .find_by_hash(&hash, &cancel)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {} not found", hash)))
}

async fn get_api_stats(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.get_stats().await)
}
