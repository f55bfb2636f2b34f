//! Configuration for the lot-pairing engine
//!
//! Loads recognized keys from embedded defaults, optionally overridden by a
//! caller-supplied JSON document.

use serde::Deserialize;
use std::path::Path;

const EMBEDDED_CONFIG: &str = include_str!("../data/config.json");

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    tax: RawTax,
    #[serde(default)]
    pairing: RawPairing,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawTax {
    #[serde(default)]
    czech_republic: RawCzechTax,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawCzechTax {
    time_test_exemption: Option<RawTimeTest>,
    capital_gains: Option<RawCapitalGains>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTimeTest {
    holding_period_years: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCapitalGains {
    default_rate: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawPairing {
    methods: Option<Vec<String>>,
    default_method: Option<String>,
}

/// Engine configuration, merged from embedded defaults and an optional override file.
#[derive(Debug, Clone)]
pub struct Config {
    pub time_test_holding_period_years: i32,
    pub capital_gains_default_rate: f64,
    pub pairing_methods: Vec<String>,
    pub pairing_default_method: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::embedded()
    }
}

impl Config {
    /// Load the embedded default configuration, compiled into the binary.
    pub fn embedded() -> Self {
        Self::from_json(EMBEDDED_CONFIG).expect("embedded config.json must parse")
    }

    fn from_json(content: &str) -> serde_json::Result<Self> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Ok(Self {
            time_test_holding_period_years: raw
                .tax
                .czech_republic
                .time_test_exemption
                .map(|t| t.holding_period_years)
                .unwrap_or(3),
            capital_gains_default_rate: raw
                .tax
                .czech_republic
                .capital_gains
                .map(|c| c.default_rate)
                .unwrap_or(0.15),
            pairing_methods: raw.pairing.methods.unwrap_or_else(|| {
                ["FIFO", "LIFO", "MaxLose", "MaxProfit", "Manual"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }),
            pairing_default_method: raw.pairing.default_method.unwrap_or_else(|| "FIFO".into()),
        })
    }

    /// Load configuration, applying an optional override document on top of
    /// the embedded defaults. A missing or unparsable override file is
    /// logged and ignored rather than treated as fatal.
    pub fn load_with_override(override_path: Option<&Path>) -> Self {
        let mut config = Self::embedded();

        let Some(path) = override_path else {
            return config;
        };

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_json(&content) {
                Ok(overridden) => config = overridden,
                Err(e) => log::warn!("ignoring unparsable config override {:?}: {}", path, e),
            },
            Err(e) => log::warn!("could not read config override {:?}: {}", path, e),
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_documented_values() {
        let config = Config::embedded();
        assert_eq!(config.time_test_holding_period_years, 3);
        assert_eq!(config.capital_gains_default_rate, 0.15);
        assert_eq!(config.pairing_default_method, "FIFO");
        assert_eq!(
            config.pairing_methods,
            vec!["FIFO", "LIFO", "MaxLose", "MaxProfit", "Manual"]
        );
    }

    #[test]
    fn missing_override_path_falls_back_to_defaults() {
        let config = Config::load_with_override(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(config.time_test_holding_period_years, 3);
    }

    #[test]
    fn override_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.json");
        std::fs::write(
            &path,
            r#"{"tax":{"czech_republic":{"time_test_exemption":{"holding_period_years":5}}}}"#,
        )
        .unwrap();
        let config = Config::load_with_override(Some(&path));
        assert_eq!(config.time_test_holding_period_years, 5);
        // unset keys in the override document fall back to that parse's own
        // defaults (serde `#[serde(default)]`), not the embedded file's.
        assert_eq!(config.pairing_default_method, "FIFO");
    }
}
