use paper_trader::analysis::{AnalysisService, CannedAnalyst};
use paper_trader::api::auth::AuthUserCredential;
use paper_trader::api::routes::{AppState, UserStore, app_router};
use paper_trader::cache::FastStore;
use paper_trader::ledger::Ledger;
use paper_trader::market::{MarketData, StaticMarket};
use paper_trader::persistence::{self, DurableLog, MemLog, PgLog};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let jwt_secret = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "dev-secret-change-me".to_string())
        .into_bytes();

    let user_store: UserStore = Arc::new(RwLock::new(HashMap::new()));
    let (log, db): (Arc<dyn DurableLog>, _) = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = persistence::create_pool_and_migrate(&url)
                .await
                .expect("database connection and migrations");
            hydrate_user_store(&user_store, &pool).await;
            info!("durable log backed by postgres");
            (Arc::new(PgLog::new(pool.clone())), Some(pool))
        }
        Err(_) => {
            warn!("DATABASE_URL not set, trade log is in-memory and will not survive restarts");
            (Arc::new(MemLog::new()), None)
        }
    };

    let cache = FastStore::new();
    let market: Arc<dyn MarketData> = Arc::new(StaticMarket::new());
    let analyst = Arc::new(CannedAnalyst::new(Arc::clone(&market)));
    let analysis = Arc::new(AnalysisService::new(
        cache.clone(),
        Arc::clone(&market),
        analyst,
    ));
    let ledger = Arc::new(Ledger::new(cache, log));

    let state = AppState {
        ledger,
        market,
        analysis,
        jwt_secret,
        user_store,
        db,
    };

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    info!(%bind_addr, "listening");
    axum::serve(listener, app).await.unwrap();
}

async fn hydrate_user_store(store: &UserStore, pool: &persistence::PgPool) {
    match persistence::list_users(pool).await {
        Ok(rows) => {
            let mut guard = store.write().await;
            for row in rows {
                guard.insert(
                    row.username.clone(),
                    AuthUserCredential {
                        user_id: row.id,
                        username: row.username,
                        password_hash: row.password_hash,
                    },
                );
            }
            info!(users = guard.len(), "user store hydrated from database");
        }
        Err(err) => warn!(%err, "failed to hydrate user store"),
    }
}
