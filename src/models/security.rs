//! Security: identity by surrogate id, natural key is the ISIN.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub id: i64,
    pub isin: String,
    pub ticker: Option<String>,
    pub name: Option<String>,
}
