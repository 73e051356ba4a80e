//! Market-data collaborator. The ledger only asks it to validate a symbol
//! or report a current price; it never interprets chart data.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use thiserror::Error;

use crate::error::LedgerError;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
    #[error("price unavailable for {0}")]
    Unavailable(String),
}

impl From<MarketError> for LedgerError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::InvalidSymbol(s) => LedgerError::InvalidSymbol(s),
            MarketError::Unavailable(s) => {
                LedgerError::StoreUnavailable(format!("market data unavailable for {s}"))
            }
        }
    }
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Accept or reject a symbol before any trade or price lookup.
    async fn validate(&self, symbol: &str) -> Result<(), MarketError>;

    /// Latest traded price for a validated symbol.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, MarketError>;
}

/// In-process quote table of TWSE listings. Stands in for the live feed in
/// tests and DB-less dev runs.
pub struct StaticMarket {
    quotes: HashMap<String, Decimal>,
}

impl StaticMarket {
    pub fn new() -> Self {
        let mut quotes = HashMap::new();
        for (symbol, price) in [
            ("2330", dec!(1080)),
            ("2317", dec!(185.5)),
            ("2454", dec!(1250)),
            ("2412", dec!(124)),
            ("2603", dec!(192.5)),
            ("2881", dec!(88.4)),
            ("3008", dec!(2500)),
            ("0050", dec!(188.1)),
        ] {
            quotes.insert(symbol.to_string(), price);
        }
        Self { quotes }
    }
}

impl Default for StaticMarket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketData for StaticMarket {
    async fn validate(&self, symbol: &str) -> Result<(), MarketError> {
        if self.quotes.contains_key(symbol) {
            Ok(())
        } else {
            Err(MarketError::InvalidSymbol(symbol.to_string()))
        }
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, MarketError> {
        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketError::InvalidSymbol(symbol.to_string()))
    }
}
