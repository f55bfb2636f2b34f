//! Tax-Rate Catalog: per-country withholding rate, used to reconstruct
//! gross/tax from a precise net amount.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RateEntry {
    country_code: String,
    #[serde(rename = "rate_percent")]
    rate: f64,
}

#[derive(Debug, Deserialize, Default)]
struct RatesDocument {
    #[serde(default)]
    rates: Vec<RateEntry>,
}

pub struct TaxRateCatalog {
    rates_by_country: HashMap<String, f64>,
}

impl TaxRateCatalog {
    /// Load `[{country_code, rate_percent}]` from `path`, converting
    /// percentages to decimals. A missing or unparsable file yields an
    /// empty catalog.
    pub fn load(path: &Path) -> Self {
        let rates_by_country = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<RatesDocument>(&content) {
                Ok(doc) => doc
                    .rates
                    .into_iter()
                    .map(|e| (e.country_code.to_uppercase(), e.rate / 100.0))
                    .collect(),
                Err(e) => {
                    log::warn!("could not parse tax rates {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) => {
                log::warn!("could not load tax rates {:?}: {}", path, e);
                HashMap::new()
            }
        };
        Self { rates_by_country }
    }

    pub fn get_rate(&self, country_code: &str) -> Option<f64> {
        self.rates_by_country
            .get(&country_code.to_uppercase())
            .copied()
    }

    /// `tax = net * r / (1 - r)`. `None` if no rate is on file or `r >= 1.0`.
    pub fn calculate_tax_from_net(&self, net_amount: f64, country_code: &str) -> Option<f64> {
        let rate = self.get_rate(country_code)?;
        if rate >= 1.0 {
            return None;
        }
        Some(net_amount * rate / (1.0 - rate))
    }

    /// `gross = net / (1 - r)`. `None` if no rate is on file or `r >= 1.0`.
    pub fn calculate_gross_from_net(&self, net_amount: f64, country_code: &str) -> Option<f64> {
        let rate = self.get_rate(country_code)?;
        if rate >= 1.0 {
            return None;
        }
        Some(net_amount / (1.0 - rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_catalog(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("tax_rates.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn converts_percent_to_decimal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, r#"{"rates": [{"country_code": "US", "rate_percent": 15}]}"#);
        let catalog = TaxRateCatalog::load(&path);
        assert_eq!(catalog.get_rate("us"), Some(0.15));
    }

    #[test]
    fn reconstructs_gross_and_tax_from_net() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, r#"{"rates": [{"country_code": "US", "rate_percent": 15}]}"#);
        let catalog = TaxRateCatalog::load(&path);

        let net = 85.0;
        let gross = catalog.calculate_gross_from_net(net, "US").unwrap();
        let tax = catalog.calculate_tax_from_net(net, "US").unwrap();
        assert!((gross - tax - net).abs() < 1e-9);
        assert!((tax / gross - 0.15).abs() < 1e-9);
    }

    #[test]
    fn rate_at_or_above_one_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, r#"{"rates": [{"country_code": "ZZ", "rate_percent": 100}]}"#);
        let catalog = TaxRateCatalog::load(&path);
        assert_eq!(catalog.calculate_gross_from_net(10.0, "ZZ"), None);
    }

    #[test]
    fn missing_country_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, r#"{"rates": []}"#);
        let catalog = TaxRateCatalog::load(&path);
        assert_eq!(catalog.get_rate("US"), None);
    }

    #[test]
    fn missing_file_yields_empty_catalog() {
        let catalog = TaxRateCatalog::load(Path::new("/nonexistent/tax_rates.json"));
        assert_eq!(catalog.get_rate("US"), None);
    }
}
