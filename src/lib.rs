pub mod analysis;
pub mod api;
pub mod cache;
pub mod error;
pub mod ledger;
pub mod market;
pub mod persistence;
pub mod types;
