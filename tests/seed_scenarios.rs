//! Integration tests against a real file-backed store, covering the
//! concrete seed scenarios for the lot-pairing engine.

use chrono::TimeZone;
use trade_ledger::config::Config;
use trade_ledger::db::{RateMode, Store};
use trade_ledger::models::{PairingMethod, TradeType};
use trade_ledger::services::{lot_pairing, rate_provider};

fn ts(year: i32, month: u32, day: u32) -> i64 {
    chrono::Local.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap().timestamp()
}

fn new_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.sqlite3");
    let store = Store::new();
    store.create(path, RateMode::Daily).unwrap();
    (dir, store)
}

fn insert_security(store: &Store, isin: &str) -> i64 {
    store
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO securities (isin, ticker, name) VALUES (?1, NULL, NULL)",
                [isin],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap()
}

fn insert_trade(store: &Store, isin_id: i64, id_string: &str, timestamp: i64, trade_type: TradeType, shares: f64, price: f64, total_czk: f64) -> i64 {
    store
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO trades
                 (timestamp, isin_id, id_string, trade_type, number_of_shares, remaining_quantity,
                  price_for_share, currency_of_price, total_czk, stamp_tax_czk, conversion_fee_czk,
                  french_transaction_tax_czk)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, 'CZK', ?7, 0, 0, 0)",
                rusqlite::params![timestamp, isin_id, id_string, trade_type as i64, shares, price, total_czk],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap()
}

fn remaining_quantity(store: &Store, trade_id: i64) -> f64 {
    store
        .with_conn(|conn| {
            conn.query_row("SELECT remaining_quantity FROM trades WHERE id = ?1", [trade_id], |row| row.get(0))
                .map_err(Into::into)
        })
        .unwrap()
}

#[test]
fn fifo_single_pair() {
    let (_dir, store) = new_store();
    let config = Config::embedded();
    let isin_id = insert_security(&store, "US0000000001");

    let buy = insert_trade(&store, isin_id, "buy-1", ts(2020, 1, 15), TradeType::Buy, 100.0, 150.0, -15_000.0);
    let sell = insert_trade(&store, isin_id, "sell-1", ts(2024, 6, 15), TradeType::Sell, -50.0, 200.0, 10_000.0);

    let outcome = lot_pairing::apply_method(&store, &config, sell, PairingMethod::Fifo, false).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.pairings_created, 1);
    assert_eq!(outcome.total_quantity_paired, 50.0);

    assert_eq!(remaining_quantity(&store, buy), 50.0);
    assert_eq!(remaining_quantity(&store, sell), 0.0);
    assert!(lot_pairing::check_time_test(ts(2020, 1, 15), ts(2024, 6, 15), 3));
}

#[test]
fn fifo_split_across_two_lots() {
    let (_dir, store) = new_store();
    let config = Config::embedded();
    let isin_id = insert_security(&store, "US0000000002");

    let buy1 = insert_trade(&store, isin_id, "buy-1", ts(2020, 1, 15), TradeType::Buy, 100.0, 150.0, -15_000.0);
    let buy2 = insert_trade(&store, isin_id, "buy-2", ts(2021, 6, 20), TradeType::Buy, 50.0, 180.0, -9_000.0);
    let sell = insert_trade(&store, isin_id, "sell-1", ts(2024, 11, 10), TradeType::Sell, -130.0, 200.0, 26_000.0);

    let outcome = lot_pairing::apply_method(&store, &config, sell, PairingMethod::Fifo, false).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.pairings_created, 2);
    assert_eq!(outcome.total_quantity_paired, 130.0);

    assert_eq!(remaining_quantity(&store, buy1), 0.0);
    assert_eq!(remaining_quantity(&store, buy2), 20.0);
    assert_eq!(remaining_quantity(&store, sell), 0.0);
}

#[test]
fn insufficient_quantity_partial_pairing() {
    let (_dir, store) = new_store();
    let config = Config::embedded();
    let isin_id = insert_security(&store, "US0000000003");

    let buy = insert_trade(&store, isin_id, "buy-1", ts(2020, 1, 15), TradeType::Buy, 10.0, 150.0, -1_500.0);
    let sell = insert_trade(&store, isin_id, "sell-1", ts(2024, 6, 15), TradeType::Sell, -25.0, 200.0, 5_000.0);

    let outcome = lot_pairing::apply_method(&store, &config, sell, PairingMethod::Fifo, false).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.pairings_created, 1);
    assert_eq!(outcome.total_quantity_paired, 10.0);

    assert_eq!(remaining_quantity(&store, buy), 0.0);
    assert_eq!(remaining_quantity(&store, sell), -15.0);
}

#[test]
fn locked_pairing_survives_delete() {
    let (_dir, store) = new_store();
    let config = Config::embedded();
    let isin_id = insert_security(&store, "US0000000004");

    let buy = insert_trade(&store, isin_id, "buy-1", ts(2020, 1, 15), TradeType::Buy, 100.0, 150.0, -15_000.0);
    let sell = insert_trade(&store, isin_id, "sell-1", ts(2024, 6, 15), TradeType::Sell, -50.0, 200.0, 10_000.0);

    lot_pairing::apply_method(&store, &config, sell, PairingMethod::Fifo, false).unwrap();
    let pairing_id: i64 = store
        .with_conn(|conn| {
            conn.query_row("SELECT id FROM pairings WHERE sale_trade_id = ?1", [sell], |row| row.get(0))
                .map_err(Into::into)
        })
        .unwrap();

    assert!(lot_pairing::lock_pairing(&store, pairing_id, "Tax Return 2024").unwrap());
    assert!(!lot_pairing::delete_pairing(&store, pairing_id).unwrap());
    assert_eq!(remaining_quantity(&store, buy), 50.0);
    assert_eq!(remaining_quantity(&store, sell), 0.0);

    assert!(lot_pairing::unlock_pairing(&store, pairing_id).unwrap());
    assert!(lot_pairing::delete_pairing(&store, pairing_id).unwrap());
    assert_eq!(remaining_quantity(&store, buy), 100.0);
    assert_eq!(remaining_quantity(&store, sell), -50.0);
}

#[tokio::test]
async fn annual_rate_replaces_on_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annual.sqlite3");
    let store = Store::new();
    store.create(path, RateMode::Annual).unwrap();

    rate_provider::set_annual_rate(&store, 2025, "USD", 1, 24.50, None).unwrap();
    rate_provider::set_annual_rate(&store, 2025, "USD", 1, 24.75, None).unwrap();

    let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let rate = rate_provider::rate(&store, "USD", date).await.unwrap();
    assert_eq!(rate, 24.75);
}

#[test]
fn manual_pair_validates_chronology_and_security() {
    let (_dir, store) = new_store();
    let config = Config::embedded();
    let isin_id = insert_security(&store, "US0000000005");

    let buy = insert_trade(&store, isin_id, "buy-1", ts(2020, 1, 15), TradeType::Buy, 100.0, 150.0, -15_000.0);
    let sell = insert_trade(&store, isin_id, "sell-1", ts(2024, 6, 15), TradeType::Sell, -50.0, 200.0, 10_000.0);

    let pairing = lot_pairing::manual_pair(&store, &config, sell, buy).unwrap();
    assert_eq!(pairing.quantity, 50.0);
    assert_eq!(pairing.method, PairingMethod::Manual);
    assert!(pairing.time_test_qualified);

    // Same-security / chronology validation rejects a reversed pair.
    let err = lot_pairing::manual_pair(&store, &config, buy, sell);
    assert!(err.is_err());
}
