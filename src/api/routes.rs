//! HTTP surface: thin axum handlers over the ledger engine and the two
//! external collaborators. All state-changing trading routes require a JWT.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::analysis::AnalysisService;
use crate::api::auth::{self, AuthUser, AuthUserCredential};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::market::MarketData;
use crate::persistence::{self, PgPool};

pub type UserStore = Arc<RwLock<HashMap<String, AuthUserCredential>>>;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub market: Arc<dyn MarketData>,
    pub analysis: Arc<AnalysisService>,
    pub jwt_secret: Vec<u8>,
    pub user_store: UserStore,
    pub db: Option<PgPool>,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = match &self {
            LedgerError::Validation(_)
            | LedgerError::InsufficientFunds
            | LedgerError::InsufficientShares
            | LedgerError::InvalidSymbol(_) => StatusCode::BAD_REQUEST,
            LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn health() -> &'static str {
    "healthy"
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), LedgerError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(LedgerError::Validation(
            "username and password are required".into(),
        ));
    }
    let username = req.username.trim().to_lowercase();
    let password_hash = auth::hash_password(&req.password)
        .map_err(|err| LedgerError::StoreUnavailable(err.to_string()))?;
    let user_id = Uuid::new_v4();
    // The write lock spans check and insert so two concurrent registrations
    // of the same name cannot both pass the duplicate check.
    let mut store = state.user_store.write().await;
    if store.contains_key(&username) {
        return Err(LedgerError::Validation("username already taken".into()));
    }
    if let Some(pool) = &state.db {
        persistence::insert_user(pool, user_id, &username, &password_hash).await?;
    }
    store.insert(
        username.clone(),
        AuthUserCredential {
            user_id,
            username: username.clone(),
            password_hash,
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user_id": user_id, "username": username })),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let username = req.username.trim().to_lowercase();
    let cred = {
        let store = state.user_store.read().await;
        store.get(&username).cloned()
    };
    let Some(cred) = cred else {
        return Err(unauthorized_login());
    };
    if !auth::verify_password(&req.password, &cred.password_hash) {
        return Err(unauthorized_login());
    }
    let token = auth::create_token(&state.jwt_secret, cred.user_id).map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
    })?;
    // Session boundary: warm the cache from the durable log. A reconcile
    // failure must not block login; the cache stays cold until the next one.
    if let Err(err) = state.ledger.reconcile_from_log(cred.user_id).await {
        warn!(user_id = %cred.user_id, %err, "reconcile on login failed");
    }
    Ok(Json(json!({ "token": token, "user_id": cred.user_id })))
}

fn unauthorized_login() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "invalid credentials" })),
    )
}

#[derive(Deserialize)]
struct TradeRequest {
    symbol: String,
    price: Decimal,
    quantity: i64,
}

async fn buy(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TradeRequest>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    state.market.validate(&req.symbol).await?;
    let receipt = state
        .ledger
        .buy(user.user_id, &req.symbol, req.price, req.quantity)
        .await?;
    Ok(Json(json!({
        "msg": "bought",
        "balance": receipt.balance,
        "cost": receipt.amount,
    })))
}

async fn sell(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TradeRequest>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    state.market.validate(&req.symbol).await?;
    let receipt = state
        .ledger
        .sell(user.user_id, &req.symbol, req.price, req.quantity)
        .await?;
    Ok(Json(json!({
        "msg": "sold",
        "balance": receipt.balance,
        "proceeds": receipt.amount,
    })))
}

async fn holdings(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    let holdings = state.ledger.holdings(user.user_id).await;
    Json(json!({ "lots": holdings.lots, "balance": holdings.balance }))
}

async fn sync_holdings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let count = state.ledger.snapshot_to_log(user.user_id).await?;
    Ok(Json(json!({ "msg": "synced", "lots": count })))
}

async fn history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let records = state.ledger.history(user.user_id).await?;
    Ok(Json(json!(records)))
}

async fn balance(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    let amount = state.ledger.balance(user.user_id).await;
    Json(json!({ "balance": amount }))
}

async fn reset_balance(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    let amount = state.ledger.reset_balance(user.user_id).await;
    Json(json!({ "balance": amount }))
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    symbol: String,
}

async fn analyze(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let job_id = state.analysis.submit(&req.symbol).await?;
    Ok(Json(json!({ "job_id": job_id })))
}

async fn analyze_result(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Json<serde_json::Value> {
    let status = state.analysis.status(job_id).await;
    Json(json!(status))
}

#[derive(Deserialize)]
struct PriceQuery {
    symbol: String,
}

async fn price(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<PriceQuery>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    state.market.validate(&query.symbol).await?;
    let price = state.market.current_price(&query.symbol).await?;
    Ok(Json(json!({ "symbol": query.symbol, "price": price })))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/trade/buy", post(buy))
        .route("/trade/sell", post(sell))
        .route("/holdings", get(holdings))
        .route("/holdings/sync", post(sync_holdings))
        .route("/history", get(history))
        .route("/balance", get(balance))
        .route("/balance/reset", post(reset_balance))
        .route("/analyze", post(analyze))
        .route("/analyze/{job_id}", get(analyze_result))
        .route("/price", get(price))
        .with_state(state)
}
