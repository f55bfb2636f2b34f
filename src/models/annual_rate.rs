//! Annual rate: yearly exchange-rate constant, unique per `(year, currency)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualRate {
    pub year: i32,
    pub currency: String,
    pub amount: i64,
    pub rate: f64,
    pub description: Option<String>,
}

impl AnnualRate {
    /// Reporting-currency amount per single unit of `currency`.
    pub fn per_unit(&self) -> f64 {
        self.rate / self.amount as f64
    }
}
