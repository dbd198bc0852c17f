//! Orchestration of every incentive operation.
//!
//! Each public method opens exactly one unit of work, makes its decision
//! against that snapshot and commits at most once. Methods never call each
//! other while a unit of work is open.

mod awards;
mod ledger;
mod promos;
mod schemes;
mod segments;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::store::IncentiveStore;

pub use awards::{AwardRequest, AwardResponse};
pub use ledger::{AdjustmentRequest, AdjustmentResponse, CreditsResponse};
pub use promos::{
    ApplyRequest, ApplyResponse, BatchRequest, BatchResponse, ValidateRequest, ValidateResponse,
};

/// Source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The rules engine shared by all request handlers.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn IncentiveStore>,
    currency: String,
    clock: Clock,
}

impl Engine {
    pub fn new(store: Arc<dyn IncentiveStore>, currency: impl Into<String>) -> Self {
        Self {
            store,
            currency: currency.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock, e.g. to pin "today" in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Trims a required text field, rejecting blank values.
fn required_text(value: Option<&str>, field: &'static str) -> Result<String, crate::AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| crate::AppError::BadRequest(format!("{} is required", field)))
}
