//! Lot-Pairing Engine: matches sales against prior purchases (lots) of the
//! same security, maintaining the conservation law between a trade's
//! `remaining_quantity` and the sum of pairing quantities that touch it.

use crate::config::Config;
use crate::db::Store;
use crate::error::{EngineError, Result};
use crate::models::{Pairing, PairingMethod, PairingOutcome, TradeType};
use chrono::{Datelike, Local, NaiveDate, TimeZone};
use rusqlite::{params, Connection};

/// Quantities at or below this are "effectively zero".
const QUANTITY_EPSILON: f64 = 1e-10;

fn local_date(ts: i64) -> NaiveDate {
    Local.timestamp_opt(ts, 0).unwrap().date_naive()
}

/// Add `years` to `date` on the civil calendar; Feb 29 falls back to Feb 28
/// when the target year is not a leap year.
fn add_years_civil(date: NaiveDate, years: i32) -> NaiveDate {
    let target_year = date.year() + years;
    NaiveDate::from_ymd_opt(target_year, date.month(), date.day())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(target_year, 2, 28).unwrap())
}

fn subtract_years_civil(date: NaiveDate, years: i32) -> NaiveDate {
    add_years_civil(date, -years)
}

/// `purchase_date + years` civil-calendar, strict inequality: exactly `years`
/// does not qualify.
pub fn check_time_test(purchase_ts: i64, sale_ts: i64, years: i32) -> bool {
    let anchor = add_years_civil(local_date(purchase_ts), years);
    local_date(sale_ts) > anchor
}

pub fn holding_period_days(purchase_ts: i64, sale_ts: i64) -> i64 {
    (sale_ts - purchase_ts) / 86_400
}

fn order_by_clause(method: PairingMethod) -> &'static str {
    match method {
        PairingMethod::Fifo => "t.timestamp ASC, t.id ASC",
        PairingMethod::Lifo => "t.timestamp DESC, t.id ASC",
        PairingMethod::MaxLose => "t.price_for_share DESC, t.id ASC",
        PairingMethod::MaxProfit => "t.price_for_share ASC, t.id ASC",
        PairingMethod::Manual => unreachable!("Manual pairing does not use candidate ordering"),
    }
}

struct Candidate {
    id: i64,
    timestamp: i64,
    remaining_quantity: f64,
}

/// Find the next candidate purchase lot for `isin_id` strictly before
/// `sale_ts`, ordered per `method`, optionally restricted to lots that pass
/// the time test against `sale_ts`.
fn next_available_lot(
    conn: &Connection,
    isin_id: i64,
    sale_ts: i64,
    method: PairingMethod,
    time_test_only: bool,
    holding_period_years: i32,
) -> Result<Option<Candidate>> {
    let order_by = order_by_clause(method);

    let row = if time_test_only {
        let threshold = subtract_years_civil(local_date(sale_ts), holding_period_years);
        let threshold_ts = Local
            .from_local_datetime(&threshold.and_hms_opt(0, 0, 0).unwrap())
            .single()
            .map(|dt| dt.timestamp())
            .unwrap_or(i64::MIN);

        let sql = format!(
            "SELECT t.id, t.timestamp, t.remaining_quantity FROM trades t
             WHERE t.isin_id = ?1 AND t.trade_type = ?2 AND t.timestamp < ?3
             AND t.remaining_quantity > {QUANTITY_EPSILON} AND t.timestamp < ?4
             ORDER BY {order_by} LIMIT 1"
        );
        conn.query_row(
            &sql,
            params![isin_id, TradeType::Buy as i64, sale_ts, threshold_ts],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
    } else {
        let sql = format!(
            "SELECT t.id, t.timestamp, t.remaining_quantity FROM trades t
             WHERE t.isin_id = ?1 AND t.trade_type = ?2 AND t.timestamp < ?3
             AND t.remaining_quantity > {QUANTITY_EPSILON}
             ORDER BY {order_by} LIMIT 1"
        );
        conn.query_row(
            &sql,
            params![isin_id, TradeType::Buy as i64, sale_ts],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
    };

    match row {
        Ok((id, timestamp, remaining_quantity)) => Ok(Some(Candidate {
            id,
            timestamp,
            remaining_quantity,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert a pairing row and apply the conservation-law update to both
/// trades, as a single transaction.
fn insert_pairing(
    conn: &mut Connection,
    sale_trade_id: i64,
    purchase_trade_id: i64,
    quantity: f64,
    method: PairingMethod,
    time_test_qualified: bool,
    days: i64,
) -> Result<i64> {
    if quantity <= QUANTITY_EPSILON {
        return Err(EngineError::InvalidInput(
            "pairing quantity must be positive".into(),
        ));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO pairings
         (sale_trade_id, purchase_trade_id, quantity, method, time_test_qualified, holding_period_days)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            sale_trade_id,
            purchase_trade_id,
            quantity,
            method.as_str(),
            time_test_qualified as i64,
            days
        ],
    )?;
    let pairing_id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE trades SET remaining_quantity = remaining_quantity - ?1 WHERE id = ?2",
        params![quantity, purchase_trade_id],
    )?;
    tx.execute(
        "UPDATE trades SET remaining_quantity = remaining_quantity + ?1 WHERE id = ?2",
        params![quantity, sale_trade_id],
    )?;
    tx.commit()?;

    log::debug!(
        "created pairing {pairing_id}: sale={sale_trade_id} purchase={purchase_trade_id} qty={quantity} method={method}"
    );
    Ok(pairing_id)
}

struct SaleInfo {
    isin_id: i64,
    timestamp: i64,
    remaining_to_pair: f64,
}

fn load_sale(conn: &Connection, sale_trade_id: i64) -> Result<SaleInfo> {
    let (isin_id, timestamp, trade_type, remaining): (i64, i64, i64, f64) = conn
        .query_row(
            "SELECT isin_id, timestamp, trade_type, remaining_quantity FROM trades WHERE id = ?1",
            [sale_trade_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(|_| {
            EngineError::InvalidInput(format!("sale trade {sale_trade_id} not found"))
        })?;

    if TradeType::from_i64(trade_type) != Some(TradeType::Sell) {
        return Err(EngineError::InvalidInput(format!(
            "trade {sale_trade_id} is not a SELL transaction"
        )));
    }

    Ok(SaleInfo {
        isin_id,
        timestamp,
        remaining_to_pair: remaining.abs(),
    })
}

/// Run the candidate-selection loop for a non-Manual method against a sale.
/// Partial progress is not rolled back when candidates are exhausted early.
pub fn apply_method(
    store: &Store,
    config: &Config,
    sale_trade_id: i64,
    method: PairingMethod,
    time_test_only: bool,
) -> Result<PairingOutcome> {
    if method == PairingMethod::Manual {
        return Err(EngineError::InvalidInput(
            "apply_method does not support Manual; use manual_pair".into(),
        ));
    }

    let sale = store.with_conn(|conn| load_sale(conn, sale_trade_id))?;

    if sale.remaining_to_pair <= QUANTITY_EPSILON {
        return Ok(PairingOutcome {
            success: true,
            pairings_created: 0,
            total_quantity_paired: 0.0,
            error: None,
        });
    }

    let mut remaining = sale.remaining_to_pair;
    let mut pairings_created = 0u32;
    let mut total_paired = 0.0f64;

    loop {
        if remaining <= QUANTITY_EPSILON {
            break;
        }

        let candidate = store.with_conn(|conn| {
            next_available_lot(
                conn,
                sale.isin_id,
                sale.timestamp,
                method,
                time_test_only,
                config.time_test_holding_period_years,
            )
        })?;

        let Some(lot) = candidate else {
            let message = if pairings_created == 0 {
                format!(
                    "no available purchase lots found for security {} before {}",
                    sale.isin_id, sale.timestamp
                )
            } else {
                format!("insufficient quantity: need {remaining} more, no lots available")
            };
            return Ok(PairingOutcome {
                success: false,
                pairings_created,
                total_quantity_paired: total_paired,
                error: Some(message),
            });
        };

        let quantity = remaining.min(lot.remaining_quantity);
        let qualified = check_time_test(
            lot.timestamp,
            sale.timestamp,
            config.time_test_holding_period_years,
        );
        let days = holding_period_days(lot.timestamp, sale.timestamp);

        store.with_conn_mut(|conn| {
            insert_pairing(conn, sale_trade_id, lot.id, quantity, method, qualified, days)
        })?;

        pairings_created += 1;
        total_paired += quantity;
        remaining -= quantity;
    }

    log::info!(
        "{method} applied to sale {sale_trade_id}: {pairings_created} pairings, {total_paired} paired"
    );
    Ok(PairingOutcome {
        success: true,
        pairings_created,
        total_quantity_paired: total_paired,
        error: None,
    })
}

/// Pair a specific sale with a specific purchase, validating trade types,
/// shared security, chronological order, and available quantity.
pub fn manual_pair(store: &Store, config: &Config, sale_trade_id: i64, purchase_trade_id: i64) -> Result<Pairing> {
    let (buy_isin, buy_ts, buy_type, buy_remaining): (i64, i64, i64, f64) = store.with_conn(|conn| {
        conn.query_row(
            "SELECT isin_id, timestamp, trade_type, remaining_quantity FROM trades WHERE id = ?1",
            [purchase_trade_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(|_| EngineError::InvalidInput(format!("purchase trade {purchase_trade_id} not found")))
    })?;
    let (sell_isin, sell_ts, sell_type, sell_remaining): (i64, i64, i64, f64) = store.with_conn(|conn| {
        conn.query_row(
            "SELECT isin_id, timestamp, trade_type, remaining_quantity FROM trades WHERE id = ?1",
            [sale_trade_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(|_| EngineError::InvalidInput(format!("sale trade {sale_trade_id} not found")))
    })?;

    if TradeType::from_i64(buy_type) != Some(TradeType::Buy) {
        return Err(EngineError::InvalidInput("first trade must be a BUY".into()));
    }
    if TradeType::from_i64(sell_type) != Some(TradeType::Sell) {
        return Err(EngineError::InvalidInput("second trade must be a SELL".into()));
    }
    if buy_isin != sell_isin {
        return Err(EngineError::InvalidInput("trades must be for the same security".into()));
    }
    if buy_ts >= sell_ts {
        return Err(EngineError::InvalidInput("BUY trade must be older than SELL trade".into()));
    }
    if buy_remaining <= QUANTITY_EPSILON {
        return Err(EngineError::InvalidInput("BUY trade is fully paired".into()));
    }
    if sell_remaining >= -QUANTITY_EPSILON {
        return Err(EngineError::InvalidInput("SELL trade is fully paired".into()));
    }

    let quantity = buy_remaining.min(-sell_remaining);
    let qualified = check_time_test(buy_ts, sell_ts, config.time_test_holding_period_years);
    let days = holding_period_days(buy_ts, sell_ts);

    let pairing_id = store.with_conn_mut(|conn| {
        insert_pairing(
            conn,
            sale_trade_id,
            purchase_trade_id,
            quantity,
            PairingMethod::Manual,
            qualified,
            days,
        )
    })?;

    Ok(Pairing {
        id: pairing_id,
        sale_trade_id,
        purchase_trade_id,
        quantity,
        method: PairingMethod::Manual,
        time_test_qualified: qualified,
        holding_period_days: days,
        locked: false,
        locked_reason: None,
        notes: None,
    })
}

/// Delete an unlocked pairing, restoring both trades' `remaining_quantity`.
/// Returns `false` (no mutation) if the pairing is locked or absent.
pub fn delete_pairing(store: &Store, pairing_id: i64) -> Result<bool> {
    store.with_conn_mut(|conn| {
        let row: Option<(bool, f64, i64, i64)> = conn
            .query_row(
                "SELECT locked, quantity, sale_trade_id, purchase_trade_id FROM pairings WHERE id = ?1",
                [pairing_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();

        let Some((locked, quantity, sale_trade_id, purchase_trade_id)) = row else {
            return Ok(false);
        };
        if locked {
            return Ok(false);
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM pairings WHERE id = ?1", [pairing_id])?;
        tx.execute(
            "UPDATE trades SET remaining_quantity = remaining_quantity + ?1 WHERE id = ?2",
            params![quantity, purchase_trade_id],
        )?;
        tx.execute(
            "UPDATE trades SET remaining_quantity = remaining_quantity - ?1 WHERE id = ?2",
            params![quantity, sale_trade_id],
        )?;
        tx.commit()?;
        log::info!("deleted pairing {pairing_id}, restored {quantity}");
        Ok(true)
    })
}

pub fn lock_pairing(store: &Store, pairing_id: i64, reason: &str) -> Result<bool> {
    store.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE pairings SET locked = 1, locked_reason = ?1 WHERE id = ?2",
            params![reason, pairing_id],
        )?;
        Ok(affected > 0)
    })
}

pub fn unlock_pairing(store: &Store, pairing_id: i64) -> Result<bool> {
    store.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE pairings SET locked = 0, locked_reason = NULL WHERE id = ?1",
            [pairing_id],
        )?;
        Ok(affected > 0)
    })
}

/// Unix-second bounds of calendar year `year`, local time, inclusive.
pub fn year_bounds(year: i32) -> (i64, i64) {
    let start = Local
        .from_local_datetime(&NaiveDate::from_ymd_opt(year, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
        .single()
        .unwrap()
        .timestamp();
    let end = Local
        .from_local_datetime(
            &NaiveDate::from_ymd_opt(year, 12, 31)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap(),
        )
        .single()
        .unwrap()
        .timestamp();
    (start, end)
}

/// Lock every currently-unlocked pairing whose *sale* falls inside calendar
/// year `year` local time.
pub fn lock_pairings_by_year(store: &Store, year: i32, reason: &str) -> Result<usize> {
    let (start, end) = year_bounds(year);

    store.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE pairings SET locked = 1, locked_reason = ?1
             WHERE sale_trade_id IN (SELECT id FROM trades WHERE timestamp >= ?2 AND timestamp <= ?3)
             AND locked = 0",
            params![reason, start, end],
        )?;
        log::info!("locked {affected} pairings for year {year}: {reason}");
        Ok(affected)
    })
}

/// Effective method-combination label for a sale's pairings, per §4.5.6.
pub fn derive_method_combination(store: &Store, sale_trade_id: i64) -> Result<String> {
    let rows: Vec<(String, bool)> = store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT method, time_test_qualified FROM pairings WHERE sale_trade_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([sale_trade_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? != 0))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    if rows.is_empty() {
        return Ok("No pairings".to_string());
    }

    let mut qualified_methods: Vec<String> = Vec::new();
    let mut non_qualified_methods: Vec<String> = Vec::new();
    for (method, qualified) in &rows {
        let bucket = if *qualified {
            &mut qualified_methods
        } else {
            &mut non_qualified_methods
        };
        if !bucket.contains(method) {
            bucket.push(method.clone());
        }
    }

    let label = |methods: &mut Vec<String>| -> String {
        methods.sort();
        if methods.len() == 1 {
            methods[0].clone()
        } else {
            format!("Mixed({})", methods.join(","))
        }
    };

    if qualified_methods.is_empty() {
        let mut m = non_qualified_methods;
        return Ok(label(&mut m));
    }
    if non_qualified_methods.is_empty() {
        let mut m = qualified_methods;
        return Ok(label(&mut m));
    }

    let primary = label(&mut qualified_methods);
    let fallback = label(&mut non_qualified_methods);
    Ok(format!("{primary}+TT → {fallback}"))
}

/// Per-`(time_test_qualified, method)` quantity totals for a sale.
pub fn method_breakdown(store: &Store, sale_trade_id: i64) -> Result<Vec<(bool, String, f64)>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT time_test_qualified, method, SUM(quantity) FROM pairings
             WHERE sale_trade_id = ?1 GROUP BY method, time_test_qualified",
        )?;
        let rows = stmt
            .query_map([sale_trade_id], |row| {
                Ok((row.get::<_, i64>(0)? != 0, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
}

/// True iff the sale has both time-qualified and non-qualified pairings.
pub fn is_timetest_applied(store: &Store, sale_trade_id: i64) -> Result<bool> {
    let breakdown = method_breakdown(store, sale_trade_id)?;
    let has_qualified = breakdown.iter().any(|(qualified, _, _)| *qualified);
    let has_non_qualified = breakdown.iter().any(|(qualified, _, _)| !*qualified);
    Ok(has_qualified && has_non_qualified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_test_leap_day_purchase() {
        let purchase = Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(2020, 2, 29).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
            .timestamp();
        let sale_feb28 = Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(2023, 2, 28).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
            .timestamp();
        let sale_mar1 = Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(2023, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
            .timestamp();

        assert!(!check_time_test(purchase, sale_feb28, 3));
        assert!(check_time_test(purchase, sale_mar1, 3));
    }

    #[test]
    fn time_test_exact_anniversary_does_not_qualify() {
        let purchase = Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(2020, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
            .timestamp();
        let exact = Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(2023, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
            .timestamp();
        let next_day = exact + 86_400;

        assert!(!check_time_test(purchase, exact, 3));
        assert!(check_time_test(purchase, next_day, 3));
    }

    #[test]
    fn method_combination_single_method_no_timetest() {
        assert_eq!(
            {
                let mut m = vec!["FIFO".to_string()];
                m.sort();
                m
            },
            vec!["FIFO".to_string()]
        );
    }
}
