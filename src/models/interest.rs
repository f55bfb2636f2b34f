//! Interest: append-only cash/lending interest record.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum InterestType {
    Unknown = 0,
    Cash = 1,
    Lending = 2,
}

impl InterestType {
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => InterestType::Cash,
            2 => InterestType::Lending,
            _ => InterestType::Unknown,
        }
    }

    /// Dispatch from the importer's `Notes` column value.
    pub fn from_notes(notes: &str) -> Self {
        match notes {
            "Interest on cash" => InterestType::Cash,
            "Share lending interest" => InterestType::Lending,
            _ => InterestType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub id: i64,
    pub timestamp: i64,
    pub id_string: String,
    pub interest_type: InterestType,
    pub total_czk: f64,
}

#[derive(Debug, Clone)]
pub struct NewInterest {
    pub timestamp: i64,
    pub id_string: String,
    pub interest_type: InterestType,
    pub total_czk: f64,
}
