//! Broker timestamp parsing.
//!
//! Every import row carries a single fixed format, `"YYYY-MM-DD HH:MM:SS"`,
//! interpreted as local civil time and converted to Unix seconds. Calendar
//! arithmetic for the holding-period test lives in `lot_pairing`; this module
//! only turns broker strings into `i64` timestamps.

use chrono::{Local, NaiveDateTime, TimeZone};

const BROKER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a broker `Time` column value into Unix seconds, local civil time.
///
/// Ambiguous or nonexistent local times (DST transitions) resolve to the
/// earliest candidate instant — broker timestamps are a few seconds of
/// administrative clock, never a semantic "which occurrence did this fall
/// on" question.
pub fn parse_trade_timestamp(raw: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), BROKER_TIME_FORMAT).ok()?;
    local_seconds(naive)
}

fn local_seconds(naive: NaiveDateTime) -> Option<i64> {
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt.timestamp()),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        chrono::LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_fixed_broker_format() {
        let ts = parse_trade_timestamp("2024-06-15 09:30:00").unwrap();
        let back = Local.timestamp_opt(ts, 0).unwrap().naive_local();
        assert_eq!(back.date(), NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_trade_timestamp("15.06.2024"), None);
        assert_eq!(parse_trade_timestamp(""), None);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert!(parse_trade_timestamp("  2024-06-15 09:30:00  ").is_some());
    }
}
