//! Durable log adapter: append-only trade records plus the holdings
//! snapshot table. Append and snapshot replacement are the only mutations;
//! trade records are never updated or deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::lot::Lot;
use crate::types::trade::{TradeRecord, TradeSide};

#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Append one trade record. Must be acknowledged before the engine
    /// reports trade success to its caller.
    async fn append_trade(&self, record: &TradeRecord) -> Result<(), sqlx::Error>;

    /// All trade records for a user, most recent first (canonical order).
    async fn trades_for_user(&self, user_id: Uuid) -> Result<Vec<TradeRecord>, sqlx::Error>;

    /// Replace the user's durable lot-list snapshot, preserving lot order.
    async fn replace_snapshot(&self, user_id: Uuid, lots: &[Lot]) -> Result<(), sqlx::Error>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgLog {
    pool: PgPool,
}

impl PgLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TradeRow {
    id: Uuid,
    user_id: Uuid,
    symbol: String,
    side: String,
    price: Decimal,
    quantity: i64,
    ts: DateTime<Utc>,
}

fn trade_row_to_record(row: TradeRow) -> Result<TradeRecord, sqlx::Error> {
    let side = TradeSide::parse(&row.side)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown trade side {:?}", row.side).into()))?;
    Ok(TradeRecord {
        id: row.id,
        user_id: row.user_id,
        symbol: row.symbol,
        side,
        price: row.price,
        quantity: row.quantity,
        ts: row.ts,
    })
}

#[async_trait]
impl DurableLog for PgLog {
    async fn append_trade(&self, record: &TradeRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO trade_history (id, user_id, symbol, side, price, quantity, ts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.symbol)
        .bind(record.side.as_str())
        .bind(record.price)
        .bind(record.quantity)
        .bind(record.ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn trades_for_user(&self, user_id: Uuid) -> Result<Vec<TradeRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT id, user_id, symbol, side, price, quantity, ts \
             FROM trade_history WHERE user_id = $1 ORDER BY ts DESC, seq DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(trade_row_to_record).collect()
    }

    async fn replace_snapshot(&self, user_id: Uuid, lots: &[Lot]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM holdings_snapshots WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        for (slot, lot) in lots.iter().enumerate() {
            sqlx::query(
                "INSERT INTO holdings_snapshots (user_id, slot, symbol, unit_price, quantity) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user_id)
            .bind(slot as i32)
            .bind(&lot.symbol)
            .bind(lot.unit_price)
            .bind(lot.quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests, DB-less dev runs)
// ---------------------------------------------------------------------------

/// In-memory durable log. Append order doubles as timestamp order, which
/// holds for a single process and keeps equal-timestamp records total.
#[derive(Default)]
pub struct MemLog {
    trades: RwLock<Vec<TradeRecord>>,
    snapshots: RwLock<HashMap<Uuid, Vec<Lot>>>,
}

impl MemLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for a user, if one has been taken.
    pub async fn snapshot_for_user(&self, user_id: Uuid) -> Option<Vec<Lot>> {
        self.snapshots.read().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl DurableLog for MemLog {
    async fn append_trade(&self, record: &TradeRecord) -> Result<(), sqlx::Error> {
        self.trades.write().await.push(record.clone());
        Ok(())
    }

    async fn trades_for_user(&self, user_id: Uuid) -> Result<Vec<TradeRecord>, sqlx::Error> {
        let guard = self.trades.read().await;
        Ok(guard
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn replace_snapshot(&self, user_id: Uuid, lots: &[Lot]) -> Result<(), sqlx::Error> {
        self.snapshots.write().await.insert(user_id, lots.to_vec());
        Ok(())
    }
}
