//! Ledger engine: buy/sell/query over the fast store and the durable log.
//!
//! The fast store holds live state (lot list + cash) and is mutated first;
//! the durable log is the audit source of truth and must acknowledge the
//! append before a trade is reported as successful. If the append fails the
//! fast-store mutation is rolled back, so caller-visible success always
//! matches durable truth. `reconcile_from_log` is the declared repair path
//! for the window where the two stores disagree.
//!
//! All operations for one user run under that user's async mutex; operations
//! for different users never contend.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use crate::cache::{self, FastStore};
use crate::error::LedgerError;
use crate::persistence::DurableLog;
use crate::types::lot::Lot;
use crate::types::trade::{TradeRecord, TradeSide};

/// Starting cash for every user the first time their balance is read.
pub const DEFAULT_BALANCE: Decimal = dec!(1_000_000);

/// Outcome of an executed trade: the updated balance and the cash moved
/// (cost for buys, proceeds for sells).
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub balance: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Holdings {
    pub lots: Vec<Lot>,
    pub balance: Decimal,
}

pub struct Ledger {
    cache: FastStore,
    log: Arc<dyn DurableLog>,
    // One entry per user id ever seen, never pruned; bounded by the
    // registered-user count, which is small enough not to warrant eviction.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

fn validate(symbol: &str, price: Decimal, quantity: i64) -> Result<(), LedgerError> {
    if symbol.trim().is_empty() {
        return Err(LedgerError::Validation("symbol is required".into()));
    }
    if price <= Decimal::ZERO {
        return Err(LedgerError::Validation("price must be positive".into()));
    }
    if quantity < 1 {
        return Err(LedgerError::Validation("quantity must be at least 1".into()));
    }
    Ok(())
}

/// Cost or proceeds of a trade. `Decimal` multiplication panics on
/// overflow and the price is caller-supplied, so the overflow maps to a
/// validation error instead.
fn trade_amount(price: Decimal, quantity: i64) -> Result<Decimal, LedgerError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| LedgerError::Validation("trade amount overflows".into()))
}

/// FIFO lot consumption: subtract `quantity` shares of `symbol` from the
/// lots in insertion order. Fully consumed lots are dropped, a partially
/// consumed lot is reduced in place, other symbols keep their order.
/// Returns `None` without touching anything when the symbol's total held
/// quantity is short.
fn consume_lots(lots: &[Lot], symbol: &str, quantity: i64) -> Option<Vec<Lot>> {
    let held: i64 = lots
        .iter()
        .filter(|l| l.symbol == symbol)
        .map(|l| l.quantity)
        .sum();
    if held < quantity {
        return None;
    }
    let mut remaining = quantity;
    let mut kept = Vec::with_capacity(lots.len());
    for lot in lots {
        if lot.symbol == symbol && remaining > 0 {
            if lot.quantity <= remaining {
                remaining -= lot.quantity;
                continue;
            }
            let mut reduced = lot.clone();
            reduced.quantity -= remaining;
            remaining = 0;
            kept.push(reduced);
        } else {
            kept.push(lot.clone());
        }
    }
    Some(kept)
}

impl Ledger {
    pub fn new(cache: FastStore, log: Arc<dyn DurableLog>) -> Self {
        Self {
            cache,
            log,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut guard = self.locks.lock().await;
        guard.entry(user_id).or_default().clone()
    }

    /// Cached lot list; a corrupt entry degrades to an empty list so the
    /// request path never fails on cache damage.
    async fn read_lots(&self, user_id: Uuid) -> Vec<Lot> {
        match self.cache.get(&cache::holdings_key(user_id)).await {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(lots) => lots,
                Err(err) => {
                    warn!(%user_id, %err, "corrupt cached lot list, treating cache as empty");
                    Vec::new()
                }
            },
        }
    }

    async fn write_lots(&self, user_id: Uuid, lots: &[Lot]) {
        let raw = serde_json::to_string(lots).expect("lot list serializes to JSON");
        self.cache
            .set(&cache::holdings_key(user_id), raw, None)
            .await;
    }

    /// Cash balance, initializing the cache entry to the default on first
    /// read (or on a corrupt entry).
    async fn balance_or_init(&self, user_id: Uuid) -> Decimal {
        let key = cache::cash_key(user_id);
        if let Some(raw) = self.cache.get(&key).await {
            match raw.parse::<Decimal>() {
                Ok(amount) => return amount,
                Err(err) => {
                    warn!(%user_id, %err, "corrupt cached balance, resetting to default")
                }
            }
        }
        self.cache.set(&key, DEFAULT_BALANCE.to_string(), None).await;
        DEFAULT_BALANCE
    }

    async fn write_balance(&self, user_id: Uuid, amount: Decimal) {
        self.cache
            .set(&cache::cash_key(user_id), amount.to_string(), None)
            .await;
    }

    async fn rollback(&self, user_id: Uuid, lots: &[Lot], balance: Decimal) {
        self.write_lots(user_id, lots).await;
        self.write_balance(user_id, balance).await;
    }

    pub async fn buy(
        &self,
        user_id: Uuid,
        symbol: &str,
        price: Decimal,
        quantity: i64,
    ) -> Result<TradeReceipt, LedgerError> {
        validate(symbol, price, quantity)?;
        let cost = trade_amount(price, quantity)?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let balance = self.balance_or_init(user_id).await;
        if cost > balance {
            return Err(LedgerError::InsufficientFunds);
        }

        let prior_lots = self.read_lots(user_id).await;
        let mut lots = prior_lots.clone();
        lots.push(Lot::new(symbol, price, quantity));
        let new_balance = balance - cost;

        self.write_lots(user_id, &lots).await;
        self.write_balance(user_id, new_balance).await;

        let record = TradeRecord::new(user_id, symbol, TradeSide::Buy, price, quantity);
        if let Err(err) = self.log.append_trade(&record).await {
            self.rollback(user_id, &prior_lots, balance).await;
            error!(%user_id, %err, "buy log append failed, fast store rolled back");
            return Err(err.into());
        }
        Ok(TradeReceipt {
            balance: new_balance,
            amount: cost,
        })
    }

    pub async fn sell(
        &self,
        user_id: Uuid,
        symbol: &str,
        price: Decimal,
        quantity: i64,
    ) -> Result<TradeReceipt, LedgerError> {
        validate(symbol, price, quantity)?;
        let proceeds = trade_amount(price, quantity)?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let prior_lots = self.read_lots(user_id).await;
        let lots =
            consume_lots(&prior_lots, symbol, quantity).ok_or(LedgerError::InsufficientShares)?;
        let balance = self.balance_or_init(user_id).await;
        let new_balance = balance
            .checked_add(proceeds)
            .ok_or_else(|| LedgerError::Validation("balance would overflow".into()))?;

        self.write_lots(user_id, &lots).await;
        self.write_balance(user_id, new_balance).await;

        let record = TradeRecord::new(user_id, symbol, TradeSide::Sell, price, quantity);
        if let Err(err) = self.log.append_trade(&record).await {
            self.rollback(user_id, &prior_lots, balance).await;
            error!(%user_id, %err, "sell log append failed, fast store rolled back");
            return Err(err.into());
        }
        Ok(TradeReceipt {
            balance: new_balance,
            amount: proceeds,
        })
    }

    /// Live lot list + balance. A cold cache yields an empty list and the
    /// default balance; call `reconcile_from_log` to warm it.
    pub async fn holdings(&self, user_id: Uuid) -> Holdings {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let lots = self.read_lots(user_id).await;
        let balance = self.balance_or_init(user_id).await;
        Holdings { lots, balance }
    }

    /// Full trade history, most recent first, from the durable log only.
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<TradeRecord>, LedgerError> {
        Ok(self.log.trades_for_user(user_id).await?)
    }

    pub async fn balance(&self, user_id: Uuid) -> Decimal {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        self.balance_or_init(user_id).await
    }

    /// Force-set the balance back to the default. Positions and history
    /// are untouched.
    pub async fn reset_balance(&self, user_id: Uuid) -> Decimal {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        self.write_balance(user_id, DEFAULT_BALANCE).await;
        DEFAULT_BALANCE
    }

    /// Rebuild the cached projection by replaying the user's trade records
    /// oldest-first through the same FIFO lot logic, starting empty. The
    /// balance is reconstructed as default - buy costs + sell proceeds.
    /// Idempotent; safe to call on every login.
    pub async fn reconcile_from_log(&self, user_id: Uuid) -> Result<Holdings, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut records = self.log.trades_for_user(user_id).await?;
        records.reverse();

        let mut lots: Vec<Lot> = Vec::new();
        let mut balance = DEFAULT_BALANCE;
        for rec in &records {
            let Some(amount) = rec.price.checked_mul(Decimal::from(rec.quantity)) else {
                warn!(%user_id, trade_id = %rec.id, "trade amount overflows during replay, skipped");
                continue;
            };
            match rec.side {
                TradeSide::Buy => match balance.checked_sub(amount) {
                    Some(next) => {
                        lots.push(Lot::new(&rec.symbol, rec.price, rec.quantity));
                        balance = next;
                    }
                    None => {
                        warn!(%user_id, trade_id = %rec.id, "balance underflows during replay, skipped");
                    }
                },
                TradeSide::Sell => match consume_lots(&lots, &rec.symbol, rec.quantity)
                    .and_then(|next| balance.checked_add(amount).map(|b| (next, b)))
                {
                    Some((next, credited)) => {
                        lots = next;
                        balance = credited;
                    }
                    None => {
                        warn!(%user_id, trade_id = %rec.id, "sell record exceeds replayed lots, skipped");
                    }
                },
            }
        }

        self.write_lots(user_id, &lots).await;
        self.write_balance(user_id, balance).await;
        Ok(Holdings { lots, balance })
    }

    /// Persist the current cached lot list as the user's durable snapshot,
    /// replacing any prior snapshot. Trade history is never touched.
    pub async fn snapshot_to_log(&self, user_id: Uuid) -> Result<usize, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let lots = self.read_lots(user_id).await;
        self.log.replace_snapshot(user_id, &lots).await?;
        Ok(lots.len())
    }
}
