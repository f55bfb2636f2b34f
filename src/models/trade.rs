//! Trade: a BUY or SELL of a security, natural key is the broker's `id_string`.
//!
//! `number_of_shares` and `remaining_quantity` share a sign convention — positive
//! for BUY, negative for SELL — so net position is a plain sum with no branching
//! on trade type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum TradeType {
    Buy = 1,
    Sell = 2,
}

impl TradeType {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(TradeType::Buy),
            2 => Some(TradeType::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub timestamp: i64,
    pub isin_id: i64,
    pub id_string: String,
    pub trade_type: TradeType,
    pub number_of_shares: f64,
    pub remaining_quantity: f64,
    pub price_for_share: f64,
    pub currency_of_price: String,
    pub total_czk: f64,
    pub stamp_tax_czk: f64,
    pub conversion_fee_czk: f64,
    pub french_transaction_tax_czk: f64,
}

/// Fields required to insert a new trade. `remaining_quantity` is always
/// initialized to `number_of_shares` by the store, never supplied here.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub timestamp: i64,
    pub isin_id: i64,
    pub id_string: String,
    pub trade_type: TradeType,
    pub number_of_shares: f64,
    pub price_for_share: f64,
    pub currency_of_price: String,
    pub total_czk: f64,
    pub stamp_tax_czk: f64,
    pub conversion_fee_czk: f64,
    pub french_transaction_tax_czk: f64,
}
