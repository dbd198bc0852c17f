//! Incentive Server - API for the incentive ledger and rules engine
//!
//! This crate serves bonus awards, manual credit adjustments, balance
//! history, bonus scheme and user segment administration, and promo code
//! redemption over HTTP.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod routes;
pub mod store;

pub use engine::Engine;
pub use error::AppError;
pub use routes::create_router;
