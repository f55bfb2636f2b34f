//! Importer: broker CSV row dispatch into Trade/Interest/Dividend records.
//!
//! Every monetary column is paired with an explicit currency column; missing
//! amounts are `0.0`, missing currencies default to the reporting currency.
//! A single bad row never aborts the file — it is logged and counted as
//! failed, and the next row is still attempted.

use crate::config::Config;
use crate::db::Store;
use crate::error::{EngineError, Result};
use crate::models::{InterestType, TradeType};
use crate::services::date_parser::parse_trade_timestamp;
use crate::services::rate_provider;
use chrono::{Local, TimeZone};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "ISIN")]
    isin: Option<String>,
    #[serde(rename = "Ticker")]
    ticker: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "No. of shares")]
    no_of_shares: Option<f64>,
    #[serde(rename = "Price / share")]
    price_per_share: Option<f64>,
    #[serde(rename = "Currency (Price / share)")]
    price_currency: Option<String>,
    #[serde(rename = "Total")]
    total: Option<f64>,
    #[serde(rename = "Currency (Total)")]
    total_currency: Option<String>,
    #[serde(rename = "Withholding tax")]
    withholding_tax: Option<f64>,
    #[serde(rename = "Currency (Withholding tax)")]
    withholding_currency: Option<String>,
    #[serde(rename = "Notes")]
    notes: Option<String>,
    #[serde(rename = "Stamp duty reserve tax")]
    stamp_duty: Option<f64>,
    #[serde(rename = "Currency (Stamp duty reserve tax)")]
    stamp_duty_currency: Option<String>,
    #[serde(rename = "Currency conversion fee")]
    conversion_fee: Option<f64>,
    #[serde(rename = "Currency (Currency conversion fee)")]
    conversion_fee_currency: Option<String>,
    #[serde(rename = "French transaction tax")]
    french_tax: Option<f64>,
    #[serde(rename = "Currency (French transaction tax)")]
    french_tax_currency: Option<String>,
}

/// Per-category read/added counts produced by a single import run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImportReport {
    pub trades_read: u32,
    pub trades_added: u32,
    pub interests_read: u32,
    pub interests_added: u32,
    pub dividends_read: u32,
    pub dividends_added: u32,
    pub insignificant: u32,
    pub unknown: u32,
    pub failed: u32,
}

enum RowKind {
    Trade(TradeType),
    Interest,
    Dividend,
    Insignificant,
    Unknown,
}

fn classify(action: &str) -> RowKind {
    match action {
        "Market buy" | "Limit buy" | "Stock split open" => RowKind::Trade(TradeType::Buy),
        "Market sell" | "Limit sell" | "Stock split close" => RowKind::Trade(TradeType::Sell),
        "Interest on cash" | "Lending interest" => RowKind::Interest,
        "Dividend (Dividend)" | "Dividend (Dividend manufactured payment)" => RowKind::Dividend,
        "Deposit" | "Currency conversion" | "Card debit" | "Withdrawal" | "Result adjustment" => {
            RowKind::Insignificant
        }
        _ => RowKind::Unknown,
    }
}

async fn to_czk(store: &Store, amount: Option<f64>, currency: Option<&str>, date: chrono::NaiveDate) -> Result<f64> {
    let amount = match amount {
        Some(a) if a.is_finite() => a,
        _ => return Ok(0.0),
    };
    let currency = currency.filter(|c| !c.is_empty()).unwrap_or("CZK");
    let rate = rate_provider::rate(store, currency, date).await?;
    Ok(amount * rate)
}

fn get_or_create_security(store: &Store, isin: &str, ticker: Option<&str>, name: Option<&str>) -> Result<i64> {
    let isin_upper = isin.to_uppercase();
    store.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO securities (isin, ticker, name) VALUES (?1, ?2, ?3)",
            rusqlite::params![isin_upper, ticker, name],
        )?;
        conn.query_row(
            "SELECT id FROM securities WHERE isin = ?1",
            [&isin_upper],
            |row| row.get(0),
        )
        .map_err(EngineError::from)
    })
}

/// Import every row of `path` into `store`, converting amounts via the
/// configured Rate Provider. Never aborts on a single bad row.
pub async fn import_csv(store: &Store, _config: &Config, path: &Path) -> Result<ImportReport> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut report = ImportReport::default();

    let mut row_index = 0usize;
    for result in reader.deserialize::<RawRow>() {
        row_index += 1;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::warn!("row {row_index} failed to parse: {e}");
                report.failed += 1;
                continue;
            }
        };

        if let Err(e) = import_row(store, &row, row_index, &mut report).await {
            log::warn!("row {row_index} failed: {e}");
            report.failed += 1;
        }
    }

    Ok(report)
}

async fn import_row(store: &Store, row: &RawRow, row_index: usize, report: &mut ImportReport) -> Result<()> {
    match classify(&row.action) {
        RowKind::Insignificant => {
            report.insignificant += 1;
            Ok(())
        }
        RowKind::Unknown => {
            log::warn!("row {row_index}: unrecognized action {:?}", row.action);
            report.unknown += 1;
            Ok(())
        }
        RowKind::Trade(trade_type) => {
            report.trades_read += 1;
            let Some(isin) = row.isin.as_deref().filter(|s| !s.is_empty()) else {
                log::warn!("row {row_index}: trade missing ISIN, skipped");
                return Ok(());
            };
            let Some(id_string) = row.id.as_deref().filter(|s| !s.is_empty()) else {
                log::warn!("row {row_index}: trade missing ID, skipped");
                return Ok(());
            };
            let added = import_trade(store, row, trade_type, isin, id_string).await?;
            if added {
                report.trades_added += 1;
            }
            Ok(())
        }
        RowKind::Interest => {
            report.interests_read += 1;
            let Some(id_string) = row.id.as_deref().filter(|s| !s.is_empty()) else {
                log::warn!("row {row_index}: interest missing ID, skipped");
                return Ok(());
            };
            let added = import_interest(store, row, id_string).await?;
            if added {
                report.interests_added += 1;
            }
            Ok(())
        }
        RowKind::Dividend => {
            report.dividends_read += 1;
            let Some(isin) = row.isin.as_deref().filter(|s| !s.is_empty()) else {
                log::warn!("row {row_index}: dividend missing ISIN, skipped");
                return Ok(());
            };
            let added = import_dividend(store, row, isin).await?;
            if added {
                report.dividends_added += 1;
            }
            Ok(())
        }
    }
}

fn timestamp_and_date(raw: &str) -> Result<(i64, chrono::NaiveDate)> {
    let ts = parse_trade_timestamp(raw)
        .ok_or_else(|| EngineError::InvalidInput(format!("unparsable timestamp: {raw:?}")))?;
    let date = Local.timestamp_opt(ts, 0).unwrap().date_naive();
    Ok((ts, date))
}

async fn import_trade(store: &Store, row: &RawRow, trade_type: TradeType, isin: &str, id_string: &str) -> Result<bool> {
    let (timestamp, date) = timestamp_and_date(&row.time)?;
    let isin_id = get_or_create_security(store, isin, row.ticker.as_deref(), row.name.as_deref())?;

    let raw_shares = row.no_of_shares.unwrap_or(0.0).abs();
    let total_raw = to_czk(store, row.total, row.total_currency.as_deref(), date).await?;
    let stamp_raw = to_czk(store, row.stamp_duty, row.stamp_duty_currency.as_deref(), date).await?;
    let conversion_raw = to_czk(store, row.conversion_fee, row.conversion_fee_currency.as_deref(), date).await?;
    let french_raw = to_czk(store, row.french_tax, row.french_tax_currency.as_deref(), date).await?;

    let (number_of_shares, total_czk, stamp_tax_czk, conversion_fee_czk, french_transaction_tax_czk) =
        match trade_type {
            TradeType::Buy => (raw_shares, -total_raw, -stamp_raw, -conversion_raw, -french_raw),
            TradeType::Sell => (-raw_shares, total_raw, stamp_raw, conversion_raw, french_raw),
        };

    let price_for_share = row.price_per_share.unwrap_or(0.0);
    let currency_of_price = row
        .price_currency
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "CZK".to_string());

    store.with_conn(|conn| {
        let affected = conn.execute(
            "INSERT OR IGNORE INTO trades
             (timestamp, isin_id, id_string, trade_type, number_of_shares, remaining_quantity,
              price_for_share, currency_of_price, total_czk, stamp_tax_czk, conversion_fee_czk,
              french_transaction_tax_czk)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                timestamp,
                isin_id,
                id_string,
                trade_type as i64,
                number_of_shares,
                price_for_share,
                currency_of_price,
                total_czk,
                stamp_tax_czk,
                conversion_fee_czk,
                french_transaction_tax_czk,
            ],
        )?;
        Ok(affected > 0)
    })
}

async fn import_interest(store: &Store, row: &RawRow, id_string: &str) -> Result<bool> {
    let (timestamp, date) = timestamp_and_date(&row.time)?;
    let interest_type = InterestType::from_notes(row.notes.as_deref().unwrap_or(""));
    let total_czk = to_czk(store, row.total, row.total_currency.as_deref(), date).await?;

    store.with_conn(|conn| {
        let affected = conn.execute(
            "INSERT OR IGNORE INTO interests (timestamp, id_string, interest_type, total_czk)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![timestamp, id_string, interest_type as i64, total_czk],
        )?;
        Ok(affected > 0)
    })
}

async fn import_dividend(store: &Store, row: &RawRow, isin: &str) -> Result<bool> {
    let (timestamp, date) = timestamp_and_date(&row.time)?;
    let isin_id = get_or_create_security(store, isin, row.ticker.as_deref(), row.name.as_deref())?;

    let number_of_shares = row.no_of_shares.unwrap_or(0.0);
    let price_for_share = row.price_per_share.unwrap_or(0.0);
    let currency_of_price = row
        .price_currency
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "CZK".to_string());
    let total_czk = to_czk(store, row.total, row.total_currency.as_deref(), date).await?;
    let withholding_tax_czk = to_czk(store, row.withholding_tax, row.withholding_currency.as_deref(), date).await?;

    store.with_conn(|conn| {
        let affected = conn.execute(
            "INSERT OR IGNORE INTO dividends
             (timestamp, isin_id, number_of_shares, price_for_share, currency_of_price,
              total_czk, withholding_tax_czk)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                timestamp,
                isin_id,
                number_of_shares,
                price_for_share,
                currency_of_price,
                total_czk,
                withholding_tax_czk,
            ],
        )?;
        Ok(affected > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_actions() {
        assert!(matches!(classify("Market buy"), RowKind::Trade(TradeType::Buy)));
        assert!(matches!(classify("Limit sell"), RowKind::Trade(TradeType::Sell)));
        assert!(matches!(classify("Interest on cash"), RowKind::Interest));
        assert!(matches!(classify("Dividend (Dividend)"), RowKind::Dividend));
        assert!(matches!(classify("Deposit"), RowKind::Insignificant));
        assert!(matches!(classify("Something else"), RowKind::Unknown));
    }

    #[test]
    fn rejects_unparsable_timestamp() {
        assert!(timestamp_and_date("not-a-date").is_err());
    }
}
