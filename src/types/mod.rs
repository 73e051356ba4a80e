pub mod lot;
pub mod trade;
