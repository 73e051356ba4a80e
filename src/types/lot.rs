use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One buy lot: the remaining shares from a single buy at its original price.
/// Lots for the same symbol are NOT aggregated; a user's lot list keeps
/// insertion order, which is the FIFO consumption order for sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub symbol: String,
    pub unit_price: Decimal,
    pub quantity: i64,
}

impl Lot {
    pub fn new(symbol: impl Into<String>, unit_price: Decimal, quantity: i64) -> Self {
        Self {
            symbol: symbol.into(),
            unit_price,
            quantity,
        }
    }
}
