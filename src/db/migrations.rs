//! Schema migrations for the transaction store.
//!
//! Each migration is a named, idempotent SQL batch. Applied migrations are
//! recorded in `_migrations`; only unrecorded ones run on open.

use crate::error::Result;
use rusqlite::Connection;

/// Current application schema version, written into `versions` on create.
pub const CURRENT_VERSION: i64 = 1;

const MIGRATION_001_VERSIONS: &str = "
    CREATE TABLE IF NOT EXISTS versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version INTEGER NOT NULL,
        timestamp INTEGER NOT NULL,
        description TEXT
    );
";

const MIGRATION_002_SETTINGS: &str = "
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

const MIGRATION_003_SECURITIES: &str = "
    CREATE TABLE IF NOT EXISTS securities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        isin TEXT NOT NULL UNIQUE,
        ticker TEXT,
        name TEXT
    );
";

const MIGRATION_004_TRADES: &str = "
    CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        isin_id INTEGER NOT NULL,
        id_string TEXT NOT NULL UNIQUE,
        trade_type INTEGER NOT NULL,
        number_of_shares REAL NOT NULL,
        remaining_quantity REAL NOT NULL,
        price_for_share REAL NOT NULL,
        currency_of_price TEXT NOT NULL,
        total_czk REAL NOT NULL,
        stamp_tax_czk REAL NOT NULL DEFAULT 0,
        conversion_fee_czk REAL NOT NULL DEFAULT 0,
        french_transaction_tax_czk REAL NOT NULL DEFAULT 0,
        FOREIGN KEY (isin_id) REFERENCES securities(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
    CREATE INDEX IF NOT EXISTS idx_trades_isin_id ON trades(isin_id);
    CREATE INDEX IF NOT EXISTS idx_trades_remaining ON trades(remaining_quantity);
";

const MIGRATION_005_INTERESTS: &str = "
    CREATE TABLE IF NOT EXISTS interests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        id_string TEXT NOT NULL UNIQUE,
        interest_type INTEGER NOT NULL,
        total_czk REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_interests_timestamp ON interests(timestamp);
";

const MIGRATION_006_DIVIDENDS: &str = "
    CREATE TABLE IF NOT EXISTS dividends (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        isin_id INTEGER NOT NULL,
        number_of_shares REAL NOT NULL,
        price_for_share REAL NOT NULL,
        currency_of_price TEXT NOT NULL,
        total_czk REAL NOT NULL,
        withholding_tax_czk REAL NOT NULL DEFAULT 0,
        UNIQUE(timestamp, isin_id),
        FOREIGN KEY (isin_id) REFERENCES securities(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_dividends_timestamp ON dividends(timestamp);
    CREATE INDEX IF NOT EXISTS idx_dividends_isin_id ON dividends(isin_id);
";

const MIGRATION_007_PAIRINGS: &str = "
    CREATE TABLE IF NOT EXISTS pairings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sale_trade_id INTEGER NOT NULL,
        purchase_trade_id INTEGER NOT NULL,
        quantity REAL NOT NULL,
        method TEXT NOT NULL,
        time_test_qualified INTEGER NOT NULL DEFAULT 0,
        holding_period_days INTEGER,
        locked INTEGER NOT NULL DEFAULT 0,
        locked_reason TEXT,
        notes TEXT,
        FOREIGN KEY (sale_trade_id) REFERENCES trades(id) ON DELETE RESTRICT,
        FOREIGN KEY (purchase_trade_id) REFERENCES trades(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_pairings_sale ON pairings(sale_trade_id);
    CREATE INDEX IF NOT EXISTS idx_pairings_purchase ON pairings(purchase_trade_id);
    CREATE INDEX IF NOT EXISTS idx_pairings_time_test ON pairings(time_test_qualified);
    CREATE INDEX IF NOT EXISTS idx_pairings_method ON pairings(method);
";

const MIGRATION_008_ANNUAL_RATES: &str = "
    CREATE TABLE IF NOT EXISTS annual_rates (
        year INTEGER NOT NULL,
        currency TEXT NOT NULL,
        amount INTEGER NOT NULL,
        rate REAL NOT NULL,
        description TEXT,
        PRIMARY KEY (year, currency)
    );
";

/// Ordered, named migrations. Each entry is applied at most once, tracked by
/// name in `_migrations`.
fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        ("001_versions", MIGRATION_001_VERSIONS),
        ("002_settings", MIGRATION_002_SETTINGS),
        ("003_securities", MIGRATION_003_SECURITIES),
        ("004_trades", MIGRATION_004_TRADES),
        ("005_interests", MIGRATION_005_INTERESTS),
        ("006_dividends", MIGRATION_006_DIVIDENDS),
        ("007_pairings", MIGRATION_007_PAIRINGS),
        ("008_annual_rates", MIGRATION_008_ANNUAL_RATES),
    ]
}

/// Apply every migration that has not yet been recorded as applied.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    for (name, sql) in migrations() {
        let already_applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO _migrations (name, applied_at) VALUES (?1, strftime('%s', 'now'))",
            [name],
        )?;
        log::info!("applied migration {}", name);
    }

    Ok(())
}
