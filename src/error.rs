//! Error taxonomy for the ledger engine. Every variant is a distinct
//! caller-visible outcome; none is swallowed on the request path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input (non-positive price, zero quantity, empty symbol).
    /// Caller's fault; no state was touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Buy cost exceeds the current cash balance. No state change.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Sell quantity exceeds the shares held across all lots for the
    /// symbol. The lot list is left exactly as it was.
    #[error("insufficient shares")]
    InsufficientShares,

    /// Symbol rejected by the market-data collaborator. No state change.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// A store adapter or external collaborator failed. Any fast-store
    /// mutation made before the failure has been rolled back.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}
