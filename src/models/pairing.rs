//! Pairing: a (sale, purchase, quantity) match produced by the lot-pairing engine.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingMethod {
    Fifo,
    Lifo,
    MaxLose,
    MaxProfit,
    Manual,
}

impl PairingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairingMethod::Fifo => "FIFO",
            PairingMethod::Lifo => "LIFO",
            PairingMethod::MaxLose => "MaxLose",
            PairingMethod::MaxProfit => "MaxProfit",
            PairingMethod::Manual => "Manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FIFO" => Some(PairingMethod::Fifo),
            "LIFO" => Some(PairingMethod::Lifo),
            "MaxLose" => Some(PairingMethod::MaxLose),
            "MaxProfit" => Some(PairingMethod::MaxProfit),
            "Manual" => Some(PairingMethod::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for PairingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pairing {
    pub id: i64,
    pub sale_trade_id: i64,
    pub purchase_trade_id: i64,
    pub quantity: f64,
    pub method: PairingMethod,
    pub time_test_qualified: bool,
    pub holding_period_days: i64,
    pub locked: bool,
    pub locked_reason: Option<String>,
    pub notes: Option<String>,
}

/// Result of applying a selection-policy pairing loop to a single sale.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingOutcome {
    pub success: bool,
    pub pairings_created: u32,
    pub total_quantity_paired: f64,
    pub error: Option<String>,
}
