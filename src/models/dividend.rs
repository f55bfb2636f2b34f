//! Dividend: append-only record, composite natural key `(timestamp, isin_id)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub id: i64,
    pub timestamp: i64,
    pub isin_id: i64,
    pub number_of_shares: f64,
    pub price_for_share: f64,
    pub currency_of_price: String,
    pub total_czk: f64,
    pub withholding_tax_czk: f64,
}

impl Dividend {
    /// Net received amount: gross minus withholding tax.
    pub fn net_czk(&self) -> f64 {
        self.total_czk - self.withholding_tax_czk
    }
}

#[derive(Debug, Clone)]
pub struct NewDividend {
    pub timestamp: i64,
    pub isin_id: i64,
    pub number_of_shares: f64,
    pub price_for_share: f64,
    pub currency_of_price: String,
    pub total_czk: f64,
    pub withholding_tax_czk: f64,
}
