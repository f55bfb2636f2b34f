//! Rate Provider: dated currency-conversion factors.
//!
//! Two mutually exclusive modes, fixed at store creation:
//! - *daily*: fetched on demand from the CNB daily fixing feed, cached
//!   in-process for the life of this binary.
//! - *annual*: looked up from the `annual_rates` table persisted in the store.

use crate::db::{RateMode, Store};
use crate::error::{EngineError, Result};
use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::RwLock;

const CNB_DAILY_URL: &str = "https://www.cnb.cz/en/financial-markets/foreign-exchange-market/central-bank-exchange-rate-fixing/central-bank-exchange-rate-fixing/daily.txt";

lazy_static! {
    /// date -> (currency -> CZK per one unit). Process-lifetime only, never persisted.
    static ref DAILY_CACHE: RwLock<HashMap<NaiveDate, HashMap<String, f64>>> =
        RwLock::new(HashMap::new());
}

fn validate_currency(currency: &str) -> Result<String> {
    let upper = currency.to_uppercase();
    if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(upper)
    } else {
        Err(EngineError::InvalidCurrency(currency.to_string()))
    }
}

/// Resolve a conversion factor: CZK per one unit of `currency` on `date`.
pub async fn rate(store: &Store, currency: &str, date: NaiveDate) -> Result<f64> {
    let currency = validate_currency(currency)?;
    if currency == "CZK" {
        return Ok(1.0);
    }

    match store.rate_mode()? {
        RateMode::Daily => rate_daily(&currency, date).await,
        RateMode::Annual => rate_annual(store, &currency, date),
    }
}

async fn rate_daily(currency: &str, date: NaiveDate) -> Result<f64> {
    if let Some(rates) = DAILY_CACHE.read().unwrap().get(&date) {
        return rates.get(currency).copied().ok_or_else(|| {
            EngineError::RateUnavailable {
                currency: currency.to_string(),
                date,
            }
        });
    }

    let fetched = fetch_daily_rates(date).await.map_err(|_| {
        EngineError::RateUnavailable {
            currency: currency.to_string(),
            date,
        }
    })?;

    let result = fetched.get(currency).copied();
    DAILY_CACHE.write().unwrap().insert(date, fetched);

    result.ok_or(EngineError::RateUnavailable {
        currency: currency.to_string(),
        date,
    })
}

async fn fetch_daily_rates(date: NaiveDate) -> Result<HashMap<String, f64>> {
    let url = format!("{CNB_DAILY_URL}?date={}", date.format("%d.%m.%Y"));
    log::debug!("fetching CNB daily rates for {date} from {url}");

    let body = reqwest::get(&url).await?.text().await?;
    Ok(parse_daily_feed(&body))
}

/// Parse the CNB daily feed: first two lines are headers, then
/// `country|currency|amount|code|rate` pipe-delimited rows.
fn parse_daily_feed(body: &str) -> HashMap<String, f64> {
    let mut rates = HashMap::new();
    for line in body.lines().skip(2) {
        let parts: Vec<&str> = line.trim().split('|').collect();
        if parts.len() != 5 {
            continue;
        }
        let code = parts[3].trim().to_uppercase();
        let (amount, rate_val) = match (parts[2].trim().parse::<f64>(), parts[4].trim().parse::<f64>()) {
            (Ok(a), Ok(r)) if a != 0.0 => (a, r),
            _ => continue,
        };
        rates.insert(code, rate_val / amount);
    }
    rates
}

fn rate_annual(store: &Store, currency: &str, date: NaiveDate) -> Result<f64> {
    let year = date.year();
    store.with_conn(|conn| {
        conn.query_row(
            "SELECT rate, amount FROM annual_rates WHERE year = ?1 AND currency = ?2",
            rusqlite::params![year, currency],
            |row| {
                let rate: f64 = row.get(0)?;
                let amount: i64 = row.get(1)?;
                Ok(rate / amount as f64)
            },
        )
        .map_err(|_| EngineError::RateUnavailable {
            currency: currency.to_string(),
            date,
        })
    })
}

/// Insert or replace an annual-rate row. Fails with `WrongRateMode` unless
/// the store was created in annual mode.
pub fn set_annual_rate(
    store: &Store,
    year: i32,
    currency: &str,
    amount: i64,
    annual_rate: f64,
    description: Option<&str>,
) -> Result<()> {
    let currency = validate_currency(currency)?;
    let mode = store.rate_mode()?;
    if mode != RateMode::Annual {
        return Err(EngineError::WrongRateMode {
            expected: "annual".into(),
            actual: mode.as_str().into(),
        });
    }

    store.with_conn(|conn| {
        conn.execute(
            "INSERT INTO annual_rates (year, currency, amount, rate, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(year, currency) DO UPDATE SET amount = ?3, rate = ?4, description = ?5",
            rusqlite::params![year, currency, amount, annual_rate, description],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cnb_daily_feed() {
        let body = "03 Nov 2025 #213\ncountry|currency|amount|code|rate\nAustralia|dollar|1|AUD|15.482\nJapan|yen|100|JPY|16.123\n";
        let rates = parse_daily_feed(body);
        assert_eq!(rates.get("AUD"), Some(&15.482));
        assert_eq!(rates.get("JPY"), Some(&0.16123));
    }

    #[test]
    fn skips_malformed_rows() {
        let body = "header1\nheader2\nonly|two|fields\nGermany|euro|1|EUR|not_a_number\nFrance|euro|1|EUR|25.3\n";
        let rates = parse_daily_feed(body);
        assert_eq!(rates.len(), 1);
        assert_eq!(rates.get("EUR"), Some(&25.3));
    }

    #[test]
    fn rejects_invalid_currency_code() {
        assert!(validate_currency("ZZZZ").is_err());
        assert!(validate_currency("12").is_err());
        assert!(validate_currency("eur").is_ok());
    }
}
