use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// One executed trade. Immutable once appended to the durable log; the
/// cached lot list must always be derivable by replaying a user's records
/// in ascending timestamp order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub price: Decimal,
    pub quantity: i64,
    pub ts: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(
        user_id: Uuid,
        symbol: impl Into<String>,
        side: TradeSide,
        price: Decimal,
        quantity: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.into(),
            side,
            price,
            quantity,
            ts: Utc::now(),
        }
    }
}
