//! Income Aggregator: per-year dividend, interest, and realized-gains summaries.
//!
//! Realized gains use explicit pairings for securities that have any, and
//! fall back to a streaming-FIFO walk of raw trades for securities that
//! were never paired.

use crate::db::Store;
use crate::error::Result;
use crate::services::country_resolver::CountryResolver;
use crate::services::lot_pairing::year_bounds;
use crate::services::tax_rates::TaxRateCatalog;
use std::collections::{HashMap, HashSet, VecDeque};

const QUANTITY_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CountryDividendTotals {
    pub gross_czk: f64,
    pub withholding_czk: f64,
    pub net_czk: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearlyIncomeReport {
    pub year: i32,
    pub dividends_gross_czk: f64,
    pub dividends_withholding_czk: f64,
    pub dividends_net_czk: f64,
    pub dividends_by_country: HashMap<String, CountryDividendTotals>,
    pub interest_cash_czk: f64,
    pub interest_lending_czk: f64,
    pub realized_gains_czk: f64,
}

/// Summarize dividends, interests, and realized gains for calendar year `year`.
pub fn aggregate_year(
    store: &Store,
    country_resolver: &CountryResolver,
    _tax_rates: &TaxRateCatalog,
    year: i32,
) -> Result<YearlyIncomeReport> {
    let (start, end) = year_bounds(year);

    let mut report = YearlyIncomeReport {
        year,
        ..Default::default()
    };

    aggregate_dividends(store, country_resolver, start, end, &mut report)?;
    aggregate_interests(store, start, end, &mut report)?;
    report.realized_gains_czk = aggregate_realized_gains(store, year, start, end)?;

    Ok(report)
}

fn aggregate_dividends(
    store: &Store,
    country_resolver: &CountryResolver,
    start: i64,
    end: i64,
    report: &mut YearlyIncomeReport,
) -> Result<()> {
    let rows: Vec<(f64, f64, String)> = store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT d.total_czk, d.withholding_tax_czk, s.isin
             FROM dividends d JOIN securities s ON s.id = d.isin_id
             WHERE d.timestamp >= ?1 AND d.timestamp <= ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![start, end], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    for (gross, withholding, isin) in rows {
        let net = gross - withholding;
        report.dividends_gross_czk += gross;
        report.dividends_withholding_czk += withholding;
        report.dividends_net_czk += net;

        let (country, _source) = country_resolver.resolve(&isin);
        let entry = report.dividends_by_country.entry(country).or_default();
        entry.gross_czk += gross;
        entry.withholding_czk += withholding;
        entry.net_czk += net;
    }

    Ok(())
}

fn aggregate_interests(store: &Store, start: i64, end: i64, report: &mut YearlyIncomeReport) -> Result<()> {
    let rows: Vec<(i64, f64)> = store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT interest_type, total_czk FROM interests WHERE timestamp >= ?1 AND timestamp <= ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![start, end], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    for (interest_type, total) in rows {
        match interest_type {
            1 => report.interest_cash_czk += total,
            2 => report.interest_lending_czk += total,
            _ => {}
        }
    }

    Ok(())
}

struct TradeRow {
    id: i64,
    timestamp: i64,
    isin_id: i64,
    number_of_shares: f64,
    total_czk: f64,
}

fn aggregate_realized_gains(store: &Store, year: i32, start: i64, end: i64) -> Result<f64> {
    let paired_securities = securities_with_any_pairing(store)?;
    let explicit = realized_gains_explicit(store, start, end)?;

    let all_securities = securities_with_trades(store)?;
    let mut streaming_total = 0.0;
    for isin_id in all_securities {
        if !paired_securities.contains(&isin_id) {
            streaming_total += realized_gains_streaming_fifo(store, isin_id, year)?;
        }
    }

    Ok(explicit + streaming_total)
}

fn securities_with_any_pairing(store: &Store) -> Result<HashSet<i64>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.isin_id FROM pairings p
             JOIN trades t ON t.id = p.sale_trade_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;
        Ok(ids)
    })
}

fn securities_with_trades(store: &Store) -> Result<HashSet<i64>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT isin_id FROM trades")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;
        Ok(ids)
    })
}

/// Sum `(sale_price_per_share_czk - purchase_price_per_share_czk) * quantity`
/// over every pairing whose sale falls in `[start, end]`.
fn realized_gains_explicit(store: &Store, start: i64, end: i64) -> Result<f64> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT p.quantity,
                    sale.total_czk, sale.number_of_shares,
                    purchase.total_czk, purchase.number_of_shares
             FROM pairings p
             JOIN trades sale ON sale.id = p.sale_trade_id
             JOIN trades purchase ON purchase.id = p.purchase_trade_id
             WHERE sale.timestamp >= ?1 AND sale.timestamp <= ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![start, end], |row| {
            let quantity: f64 = row.get(0)?;
            let sale_total: f64 = row.get(1)?;
            let sale_shares: f64 = row.get(2)?;
            let purchase_total: f64 = row.get(3)?;
            let purchase_shares: f64 = row.get(4)?;
            Ok((quantity, sale_total, sale_shares, purchase_total, purchase_shares))
        })?;

        let mut total = 0.0;
        for row in rows {
            let (quantity, sale_total, sale_shares, purchase_total, purchase_shares) = row?;
            let sale_price = sale_total.abs() / sale_shares.abs();
            let purchase_price = purchase_total.abs() / purchase_shares.abs();
            total += (sale_price - purchase_price) * quantity;
        }
        Ok(total)
    })
}

/// Streaming FIFO realized P&L for a single security, crediting only the
/// portion of each consumed slice whose sale falls in calendar year `year`.
fn realized_gains_streaming_fifo(store: &Store, isin_id: i64, year: i32) -> Result<f64> {
    let (year_start, year_end) = year_bounds(year);

    let trades: Vec<TradeRow> = store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, isin_id, number_of_shares, total_czk
             FROM trades WHERE isin_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([isin_id], |row| {
                Ok(TradeRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    isin_id: row.get(2)?,
                    number_of_shares: row.get(3)?,
                    total_czk: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    let mut queue: VecDeque<(f64, f64)> = VecDeque::new();
    let mut realized = 0.0;

    for trade in trades {
        if trade.number_of_shares > 0.0 {
            let qty = trade.number_of_shares;
            let cost_per_share = trade.total_czk.abs() / qty;
            queue.push_back((qty, cost_per_share));
            continue;
        }

        let mut remaining = trade.number_of_shares.abs();
        if remaining <= QUANTITY_EPSILON {
            continue;
        }
        let sell_price_per_share = trade.total_czk.abs() / remaining;
        let in_year = trade.timestamp >= year_start && trade.timestamp <= year_end;

        while remaining > QUANTITY_EPSILON {
            let Some((head_qty, head_cost)) = queue.front().copied() else {
                log::warn!(
                    "trade {} oversold security {}: {remaining} shares with no remaining lots",
                    trade.id,
                    isin_id
                );
                break;
            };

            let consumed = remaining.min(head_qty);
            if in_year {
                realized += (sell_price_per_share - head_cost) * consumed;
            }

            let left = head_qty - consumed;
            if left <= QUANTITY_EPSILON {
                queue.pop_front();
            } else {
                queue.front_mut().unwrap().0 = left;
            }
            remaining -= consumed;
        }
    }

    Ok(realized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_zero_totals() {
        let report = YearlyIncomeReport {
            year: 2024,
            ..Default::default()
        };
        assert_eq!(report.dividends_net_czk, 0.0);
        assert_eq!(report.realized_gains_czk, 0.0);
    }
}
