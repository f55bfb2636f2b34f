//! Models for the lot-pairing engine — Rust structs matching the database schema.

#![allow(dead_code)]

pub mod annual_rate;
pub mod dividend;
pub mod interest;
pub mod pairing;
pub mod security;
pub mod trade;

pub use annual_rate::*;
pub use dividend::*;
pub use interest::*;
pub use pairing::*;
pub use security::*;
pub use trade::*;
